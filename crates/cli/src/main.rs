//! ridechat - customer/driver chat over a shared local store.
//!
//! Every invocation is one context: run `watch` as the driver in one
//! terminal and `send` as the customer in another, and the messages meet in
//! the store directory both processes open.

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use ridechat_core::chat::{CustomerSide, DriverSide};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::Session;

/// Ride chat between a customer and a driver
#[derive(Parser)]
#[command(name = "ridechat")]
#[command(about = "Customer/driver chat synced through a shared local store", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Which side of the conversation this process acts as.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Customer,
    Driver,
}

#[derive(Args)]
struct Target {
    /// Side to act as
    #[arg(short, long, value_enum)]
    role: RoleArg,

    /// Ride order (conversation) id; defaults to the configured one
    #[arg(short, long)]
    order: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the counterpart's messages as they arrive
    Watch {
        #[command(flatten)]
        target: Target,
        /// Mark messages read as soon as they are shown
        #[arg(long)]
        mark_read: bool,
    },

    /// Send a text message
    Send {
        #[command(flatten)]
        target: Target,
        /// Message text
        text: String,
        /// Explicit message id (resending the same id is a no-op)
        #[arg(long)]
        id: Option<String>,
    },

    /// Send an image file
    SendImage {
        #[command(flatten)]
        target: Target,
        /// Image to embed
        path: PathBuf,
    },

    /// Show the conversation history
    History {
        #[command(flatten)]
        target: Target,
        /// Print the stored JSON instead
        #[arg(long)]
        json: bool,
    },

    /// Show this side's unread count
    Unread {
        #[command(flatten)]
        target: Target,
    },

    /// Mark every incoming message read
    Read {
        #[command(flatten)]
        target: Target,
    },

    /// Clear the conversation for both sides
    Clear {
        #[command(flatten)]
        target: Target,
    },

    /// Post a system notice both sides see
    Notice {
        #[command(flatten)]
        target: Target,
        /// Notice text
        text: String,
    },

    /// Show store location and conversations
    Status,

    /// Show or modify configuration
    Config {
        /// Key to get or set
        key: Option<String>,
        /// Value to set
        value: Option<String>,
    },
}

/// Call a command generic over the endpoint side chosen on the command line.
macro_rules! as_role {
    ($role:expr, $($func:ident)::+ ( $($arg:expr),* $(,)? )) => {
        match $role {
            RoleArg::Customer => $($func)::+::<CustomerSide>($($arg),*).await,
            RoleArg::Driver => $($func)::+::<DriverSide>($($arg),*).await,
        }
    };
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Watch { target, mark_read } => {
            let session = Session::open()?;
            as_role!(target.role, commands::watch::execute(&session, target.order, mark_read))
        }
        Commands::Send { target, text, id } => {
            let session = Session::open()?;
            as_role!(target.role, commands::send::execute(&session, target.order, &text, id))
        }
        Commands::SendImage { target, path } => {
            let session = Session::open()?;
            as_role!(target.role, commands::send_image::execute(&session, target.order, &path))
        }
        Commands::History { target, json } => {
            let session = Session::open()?;
            as_role!(target.role, commands::history::execute(&session, target.order, json))
        }
        Commands::Unread { target } => {
            let session = Session::open()?;
            as_role!(target.role, commands::unread::execute(&session, target.order))
        }
        Commands::Read { target } => {
            let session = Session::open()?;
            as_role!(target.role, commands::read::execute(&session, target.order))
        }
        Commands::Clear { target } => {
            let session = Session::open()?;
            as_role!(target.role, commands::clear::execute(&session, target.order))
        }
        Commands::Notice { target, text } => {
            let session = Session::open()?;
            as_role!(target.role, commands::notice::execute(&session, target.order, &text))
        }
        Commands::Status => {
            let session = Session::open()?;
            commands::status::execute(&session).await
        }
        Commands::Config { key, value } => commands::config::execute(key, value).await,
    }
}
