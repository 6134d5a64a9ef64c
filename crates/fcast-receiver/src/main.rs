//! fcast-receiver entry point.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use fcast_receiver::cli::{Cli, Command, ConfigAction};
use fcast_receiver::logging::init_tracing;
use fcast_receiver::{
    HeadlessPlayer, Player, Receiver, ReceiverConfig, ReceiverResult, SignalHandler,
    notifier_from_settings,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.tracing_config()) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ReceiverResult<()> {
    let config = match cli.config {
        Some(ref path) => ReceiverConfig::load_from(path)?,
        None => ReceiverConfig::load()?,
    };
    let config = cli.apply_overrides(config);

    if let Some(Command::Config { action }) = &cli.command {
        match action {
            ConfigAction::Dump => {
                println!("# config.toml ({})", cli.config_path().display());
                println!("{}", config.to_toml()?);
            }
            ConfigAction::Path => println!("config: {}", cli.config_path().display()),
        }
        return Ok(());
    }

    let signals = SignalHandler::new();
    signals.spawn_listener();

    let notifier = notifier_from_settings(&config.notifications);
    let player: Arc<dyn Player> = Arc::new(HeadlessPlayer::new());

    let receiver = Receiver::bind(config, player, notifier, signals.shutdown_handle()).await?;
    receiver.run().await
}
