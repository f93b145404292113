//! runwatch - run a command and report its output to chat destinations.

use anyhow::Result;
use clap::Parser;
use runwatch::{
    app::App,
    cli::{display_invocation, Cli},
    config::Config,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    let plan = cli.command_plan()?;
    let mut config = Config::load(&cli)?;
    init_tracing(&config.log_level);

    if std::env::var_os("NO_COLOR").is_some() {
        config.no_color = true;
    }

    info!(command = %plan.describe(), "runwatch starting");
    debug!(
        callbacks = ?config.notify.callbacks,
        mode = ?config.notify.mode,
        notify_each = ?config.notify.notify_each,
        "Notification settings"
    );

    let invocation = display_invocation(std::env::args());
    App::builder(config)
        .invocation(invocation)
        .build()
        .run(&plan)
        .await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("runwatch: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}
