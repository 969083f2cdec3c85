use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(author, version, about = "Relay chat messages to an LLM completion endpoint", long_about = None)]
pub struct Cli {
    /// Settings file (defaults to config/$CONFIG_ENV)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the Telegram bot (needs TELEGRAM_TOKEN and OPENAI_API_KEY)
    Telegram,

    /// Chat from the terminal through the same dispatcher
    Console {
        /// User id the console conversation is stored under
        #[arg(short, long, default_value = "0")]
        user_id: u64,
    },

    /// Send a single prompt without any history
    Ask { prompt: String },
}
