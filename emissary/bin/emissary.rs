#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::{io::Read, path::PathBuf};

use clap::{Parser, Subcommand};
use emissary::{
    Emissary,
    config::{CONFIG_ENV, find_config_file},
};
use emissary_common::{QueuedMessage, logging};
use emissary_delivery::{MailDelivery, Transaction};

/// Transactional outbound mail queue
#[derive(Parser, Debug)]
#[command(name = "emissary")]
#[command(about = "Queue outbound mail and hand it to a mailer", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to $EMISSARY_CONFIG, then the standard locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process the queue until interrupted
    Run,
    /// List queued messages with their envelopes
    List {
        /// List quarantined files instead
        #[arg(long)]
        quarantined: bool,
    },
    /// Submit the message read from stdin
    Send {
        /// Envelope sender
        #[arg(short, long)]
        from: String,

        /// Envelope recipient, repeat for more than one
        #[arg(short, long, required = true)]
        to: Vec<String>,

        /// Hand the message to the mailer now instead of queueing it
        #[arg(long)]
        direct: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = find_config_file(cli.config, std::env::var_os(CONFIG_ENV).map(PathBuf::from))?;
    let emissary = Emissary::load(&config_path)?;

    match cli.command {
        Command::Run => emissary.run().await,
        Command::List { quarantined } => list(&emissary, quarantined),
        Command::Send { from, to, direct } => send(&emissary, &from, &to, direct).await,
    }
}

fn list(emissary: &Emissary, quarantined: bool) -> anyhow::Result<()> {
    let maildir = emissary.open_queue()?;
    let entries = if quarantined {
        maildir.quarantined()?
    } else {
        maildir.messages()?
    };

    for path in &entries {
        let content = std::fs::read_to_string(path)?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());

        match QueuedMessage::parse(&content).envelope {
            Some(envelope) => println!("{name}: {envelope}"),
            None => println!("{name}: (no envelope)"),
        }
    }

    println!("{} message(s)", entries.len());

    Ok(())
}

async fn send(emissary: &Emissary, from: &str, to: &[String], direct: bool) -> anyhow::Result<()> {
    logging::init();

    let mut message = String::new();
    std::io::stdin().read_to_string(&mut message)?;

    let mut transaction = Transaction::new();
    let message_id = if direct {
        emissary
            .direct_delivery()
            .send(&mut transaction, from, to, &message)?
    } else {
        emissary
            .queued_delivery()
            .send(&mut transaction, from, to, &message)?
    };
    transaction.commit().await?;

    println!("{message_id}");

    Ok(())
}
