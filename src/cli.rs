use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{self, CommandReport};
use crate::logging;

#[derive(Parser, Debug)]
#[command(
    name = "chatvault",
    version,
    about = "Archive chat media locally and mirror it to a GitHub repository"
)]
pub struct Cli {
    /// Print the command report as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one sync pass now and wait for it
    Sync,
    /// Count archived media files
    Count,
    /// Download new channel attachments into the media directory
    Ingest {
        /// Channel to read (defaults to the configured channel)
        #[arg(long)]
        channel: Option<String>,
    },
    /// Write each channel's message history to a text transcript
    Save {
        /// Server whose text channels are saved (defaults to the configured guild)
        #[arg(long)]
        guild: Option<String>,
        /// Save only this channel
        #[arg(long, conflicts_with = "guild")]
        channel: Option<String>,
    },
    /// Sync on a timer until stopped
    Watch {
        /// Ingest the configured channel before every tick
        #[arg(long)]
        ingest: bool,
    },
    /// Stop a running watcher
    Stop,
    /// Show resolved paths, config and recognized env vars
    Status,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let state = if report.ok { "ok" } else { "failed" };
    println!("{}: {state}", report.command);
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  issue: {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let report = match cli.command {
        Command::Sync => commands::sync::run()?,
        Command::Count => commands::count::run()?,
        Command::Ingest { channel } => commands::ingest::run(channel.as_deref())?,
        Command::Save { guild, channel } => {
            commands::save::run(guild.as_deref(), channel.as_deref())?
        }
        Command::Watch { ingest } => commands::watch::run(ingest)?,
        Command::Stop => commands::stop::run()?,
        Command::Status => commands::status::run()?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        std::process::exit(2);
    }
    Ok(())
}
