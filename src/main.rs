use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bulk_sms_agent::cli::Cli;
use bulk_sms_agent::config_manager::RunConfig;
use bulk_sms_agent::device::{AdbConnector, SimFaults, SimulatorConnector};
use bulk_sms_agent::error::AgentError;
use bulk_sms_agent::recipients::RecipientQueue;
use bulk_sms_agent::reporter::{print_banner, print_summary, RunAborted, RunSummary, Runner};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            match e.downcast_ref::<AgentError>() {
                Some(AgentError::Input(input)) => {
                    eprintln!("❌ {}", input);
                    ExitCode::from(input.exit_code())
                }
                _ => {
                    eprintln!("❌ {:#}", e);
                    ExitCode::from(1)
                }
            }
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("bulk_sms_agent=debug")
    } else {
        EnvFilter::new("bulk_sms_agent=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = RunConfig::from_env(&cli)?;
    let queue = RecipientQueue::load(&config.numbers_path, &config.content_path, config.country_code.as_deref())
        .map_err(AgentError::from)?;

    print_banner(&config, &queue);

    let runner = Runner::new(&config);
    let outcome = if config.simulate {
        info!("🧪 Simulation mode: no device will be touched");
        let connector = SimulatorConnector::new(SimFaults::default());
        let outcome = runner.run(&connector, queue).await;
        info!(screen = connector.report().screen, "simulated phone finished");
        outcome
    } else {
        info!(adb = %config.adb_path.display(), "using adb");
        let connector = AdbConnector::new(config.adb_path.clone(), config.timing.command_timeout);
        runner.run(&connector, queue).await
    };

    match outcome {
        Ok(summary) => {
            print_summary(&summary);
            write_summary(&config, &summary)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(RunAborted { error: e, partial }) => {
            error!(error = %e, "⛔️ Run aborted");
            eprintln!("⛔️ Run aborted: {}", e);
            if let Some(summary) = partial {
                print_summary(&summary);
                write_summary(&config, &summary)?;
            }
            Ok(ExitCode::from(1))
        }
    }
}

fn write_summary(config: &RunConfig, summary: &RunSummary) -> anyhow::Result<()> {
    let Some(path) = &config.summary_json else {
        return Ok(());
    };
    summary
        .write_json(path)
        .with_context(|| format!("writing summary to {}", path.display()))?;
    if summary.failed > 0 {
        warn!(failed = summary.failed, "some recipients failed, see summary");
    }
    info!(path = %path.display(), "📄 Summary written");
    Ok(())
}
