use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mongo_acceptance::run_suites;
use mongo_acceptance::AcceptanceConfig;
use mongo_acceptance::MongoConnector;
use mongo_acceptance::Result;
use mongo_acceptance::ScenarioContext;
use mongo_acceptance::SuiteKind;
use tracing::error;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// readwrite, replicaset, sharding or all
    #[arg(long, default_value_t = SuiteKind::All)]
    suite: SuiteKind,

    /// Configuration file applied on top of `CONFIG_PATH`
    #[arg(long)]
    config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_observability(cli.log_json);

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return ExitCode::FAILURE;
        }
    };

    let ctx = ScenarioContext::new(config, Arc::new(MongoConnector));
    let report = run_suites(cli.suite, &ctx).await;

    for scenario in report.scenarios() {
        println!("{scenario}");
    }
    println!(
        "{} passed, {} failed, {} skipped",
        report.passed(),
        report.failed(),
        report.skipped()
    );

    if report.has_failures() {
        error!(suite = %cli.suite, "acceptance run failed");
        ExitCode::FAILURE
    } else {
        info!(suite = %cli.suite, "acceptance run passed");
        ExitCode::SUCCESS
    }
}

fn load_config(override_path: Option<&str>) -> Result<AcceptanceConfig> {
    let mut config = AcceptanceConfig::load()?;
    if let Some(path) = override_path {
        config = config.with_override_config(path)?;
    }
    config.validate()
}

fn init_observability(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = if json {
        tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        tracing_subscriber::fmt::layer().with_writer(std::io::stderr).boxed()
    };
    tracing_subscriber::registry().with(layer.with_filter(filter)).init();
}
