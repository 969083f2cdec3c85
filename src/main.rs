use anyhow::Result;
use chatrelay::cli::{Cli, Commands};
use chatrelay::messaging::{ConsoleAdapter, TelegramAdapter};
use chatrelay::{init_tracing, utils, RelaySystem, Settings, Turn, UserId};
use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::new()?,
    };
    init_tracing(&settings.logging.level);

    let system = RelaySystem::new(settings)?;

    let result = match cli.command {
        Commands::Telegram => handle_telegram(&system).await,
        Commands::Console { user_id } => handle_console(&system, user_id).await,
        Commands::Ask { prompt } => handle_ask(&system, prompt).await,
    };

    system.shutdown();

    result
}

async fn handle_telegram(system: &RelaySystem) -> Result<()> {
    let token = Settings::telegram_token()?;
    let adapter = Arc::new(TelegramAdapter::new(token, system.settings().telegram.clone()));

    tracing::info!("Bot started");
    system.serve(adapter).await
}

async fn handle_console(system: &RelaySystem, user_id: u64) -> Result<()> {
    let adapter = Arc::new(ConsoleAdapter::new(UserId(user_id)));
    system.serve(adapter).await
}

async fn handle_ask(system: &RelaySystem, prompt: String) -> Result<()> {
    utils::print_info("Sending request...");

    let gateway = system.dispatcher().gateway();
    match gateway.complete(&[Turn::user(prompt)]).await {
        Ok(reply) => {
            println!("\n{}", reply);
            Ok(())
        }
        Err(failure) => {
            utils::print_error(&failure.fallback);
            Err(failure.into())
        }
    }
}
