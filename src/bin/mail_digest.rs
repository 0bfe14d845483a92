use anyhow::{Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use mail_digest::auth::token_store;
use mail_digest::config::{Config, load_config};
use mail_digest::daemon::run_daemon;
use mail_digest::delivery::SmtpDelivery;
use mail_digest::domain::digest::Period;
use mail_digest::mail::source_from_config;
use mail_digest::pipeline::{DigestPipeline, PipelineSettings, RunOutcome};
use mail_digest::summarizer::{OpenAiClient, Summarizer};

#[derive(Parser)]
#[command(name = "mail_digest")]
#[command(about = "Summarize recent mail into a morning/evening digest", long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/mail_digest/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one digest cycle and exit
    Run {
        #[arg(long, value_parser = parse_period)]
        period: Period,
    },

    /// Run both cycles on their cron schedules until Ctrl-C
    Daemon,

    /// Store the OAuth client secret in keyring
    SetClientSecret {
        #[arg(long)]
        client_id: String,
    },
}

fn parse_period(s: &str) -> Result<Period, String> {
    s.parse()
}

fn build_pipeline(cfg: &Config) -> Result<DigestPipeline> {
    let source = source_from_config(cfg)?;
    let api_key = cfg
        .api_key()
        .ok_or_else(|| anyhow!("summarizer.api_key not set"))?;
    let client = OpenAiClient::new(&cfg.summarizer, api_key)?;
    let delivery = SmtpDelivery::new(cfg)?;
    Ok(DigestPipeline::new(
        source,
        Summarizer::new(Box::new(client)),
        Box::new(delivery),
        PipelineSettings::from_config(cfg),
    ))
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::SetClientSecret { client_id } => {
            eprintln!("Paste client secret (end with Ctrl-D):");
            let mut secret = String::new();
            std::io::Read::read_to_string(&mut std::io::stdin(), &mut secret)?;
            token_store::save_client_secret(&client_id, secret.trim())?;
            println!("Saved client secret for client_id {client_id}");
            Ok(())
        }

        Command::Run { period } => {
            let cfg = load_config(cli.config.as_deref())
                .map_err(|e| anyhow!("Configuration error: {e}"))?;
            let pipeline = build_pipeline(&cfg)?;
            match pipeline.run(period) {
                RunOutcome::Empty => println!("No new emails; no {period} digest sent"),
                RunOutcome::Completed { report, delivered } => println!(
                    "Digest {} ({} emails, {} high priority) {}",
                    report.report_id,
                    report.email_count,
                    report.high_priority_count,
                    if delivered { "sent" } else { "NOT sent" }
                ),
                RunOutcome::Failed { state, reason } => {
                    bail!("{period} digest failed during {state:?}: {reason}")
                }
            }
            Ok(())
        }

        Command::Daemon => {
            let cfg = load_config(cli.config.as_deref())
                .map_err(|e| anyhow!("Configuration error: {e}"))?;
            let pipeline = build_pipeline(&cfg)?;
            run_daemon(&pipeline, &cfg)
        }
    }
}
