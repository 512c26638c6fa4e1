use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_NUMBERS_FILE: &str = "numbers.txt";
pub const DEFAULT_CONTENT_FILE: &str = "content.txt";

/// Send one SMS to many recipients by driving Google Messages over adb.
#[derive(Parser, Debug, Clone)]
#[command(name = "bulk-sms", version, about = "Bulk SMS sender for Google Messages via ADB")]
pub struct Cli {
    #[arg(short = 's', long = "serialno", help = "The device or emulator serial number")]
    pub serialno: Option<String>,

    #[arg(short = 'd', long, help = "Save SMS as draft instead of sending")]
    pub draft: bool,

    #[arg(short = 'x', long, help = "Delete the conversation after sending")]
    pub delete: bool,

    #[arg(short = 't', long, default_value_t = 5, help = "Delay between messages in seconds")]
    pub delay: u64,

    #[arg(long, default_value = DEFAULT_NUMBERS_FILE, help = "Phone numbers, one per line")]
    pub numbers: PathBuf,

    #[arg(long, default_value = DEFAULT_CONTENT_FILE, help = "Message body (first line is used)")]
    pub content: PathBuf,

    #[arg(long, help = "Attempts per navigation step before giving up on a recipient")]
    pub max_attempts: Option<u32>,

    #[arg(long, help = "Country calling code for numbers written without a leading +")]
    pub country_code: Option<String>,

    #[arg(long, help = "Run against a simulated phone instead of a real device")]
    pub simulate: bool,

    #[arg(long, help = "Write the run summary as JSON to this path")]
    pub summary_json: Option<PathBuf>,

    #[arg(short = 'v', long, help = "Verbose logging")]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["bulk-sms"]);
        assert_eq!(cli.delay, 5);
        assert!(!cli.draft && !cli.delete && !cli.simulate);
        assert_eq!(cli.numbers, PathBuf::from(DEFAULT_NUMBERS_FILE));
        assert!(cli.serialno.is_none());
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::parse_from(["bulk-sms", "-s", "emulator-5554", "-d", "-x", "-t", "0"]);
        assert_eq!(cli.serialno.as_deref(), Some("emulator-5554"));
        assert!(cli.draft);
        assert!(cli.delete);
        assert_eq!(cli.delay, 0);
    }
}
