//! Command-line utility for managing the carrier email queue
//!
//! This tool works directly against the configured record store:
//! - Submitting emails (queued, deferred or sent immediately)
//! - Viewing, listing, amending and deleting email records
//! - Running a single processor invocation

use std::path::PathBuf;

use carrier::{Carrier, config};
use carrier_common::logging;
use carrier_delivery::{
    EmailId, NewEmail, SendStatus,
    intake::{self, Amendment, Reschedule},
};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

/// Command-line utility for managing the carrier email queue
#[derive(Parser, Debug)]
#[command(name = "carrierctl")]
#[command(about = "Manage the carrier email queue", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (RON)
    #[arg(short, long, env = config::CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Emit service logs while running
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a new email
    Submit {
        /// Recipient address (repeatable)
        #[arg(long = "to", required = true)]
        recipients: Vec<String>,

        /// Provider template ID
        #[arg(long)]
        template: String,

        /// Template substitution as key=value (repeatable)
        #[arg(long = "sub", value_parser = parse_substitution)]
        substitutions: Vec<(String, String)>,

        /// Attempt delivery immediately instead of queueing
        #[arg(long, conflicts_with = "at")]
        now: bool,

        /// Earliest delivery time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Show a single email record
    Show {
        /// Email ID
        id: EmailId,
    },
    /// List email records in creation order
    List {
        #[arg(long, default_value = "1")]
        page: usize,

        #[arg(long, default_value = "25")]
        limit: usize,
    },
    /// Amend a stored email, e.g. to requeue a failed or stuck one
    Update(UpdateArgs),
    /// Delete an email record
    Delete {
        /// Email ID
        id: EmailId,
    },
    /// Run one processor invocation and report what it did
    Process,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum StatusArg {
    Queued,
    Processing,
    Complete,
    Failed,
}

impl From<StatusArg> for SendStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Queued => Self::Queued,
            StatusArg::Processing => Self::Processing,
            StatusArg::Complete => Self::Complete,
            StatusArg::Failed => Self::Failed,
        }
    }
}

#[derive(Args, Debug)]
struct UpdateArgs {
    /// Email ID
    id: EmailId,

    /// Replace the recipients (repeatable)
    #[arg(long = "to")]
    recipients: Vec<String>,

    /// Replace the provider template ID
    #[arg(long)]
    template: Option<String>,

    /// Replace the substitutions as key=value (repeatable)
    #[arg(long = "sub", value_parser = parse_substitution)]
    substitutions: Vec<(String, String)>,

    /// Drop every substitution
    #[arg(long, conflicts_with = "substitutions")]
    clear_subs: bool,

    /// Set the send status
    #[arg(long, value_enum)]
    status: Option<StatusArg>,

    /// Reschedule delivery (RFC 3339)
    #[arg(long, conflicts_with = "clear_schedule")]
    at: Option<DateTime<Utc>>,

    /// Remove the schedule, taking the email out of the queue
    #[arg(long)]
    clear_schedule: bool,

    /// Start counting delivery attempts from zero again
    #[arg(long)]
    reset_attempts: bool,
}

impl UpdateArgs {
    fn amendment(self) -> Amendment {
        let substitutions = if self.clear_subs || !self.substitutions.is_empty() {
            Some(self.substitutions.into_iter().collect())
        } else {
            None
        };
        let schedule = if self.clear_schedule {
            Some(Reschedule::Clear)
        } else {
            self.at.map(Reschedule::At)
        };

        Amendment {
            recipients: (!self.recipients.is_empty()).then_some(self.recipients),
            template: self.template,
            substitutions,
            send_status: self.status.map(SendStatus::from),
            schedule,
            reset_attempts: self.reset_attempts,
        }
    }
}

fn parse_substitution(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.is_empty() => Ok((key.to_string(), val.to_string())),
        _ => Err(format!("expected key=value, got {value:?}")),
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        logging::init();
    }

    let config_path = config::find_config_file(cli.config.as_deref())?;
    let carrier = Carrier::load(&config_path)?;
    let repository = carrier.repository()?;

    match cli.command {
        Commands::Submit {
            recipients,
            template,
            substitutions,
            now,
            at,
        } => {
            let email = substitutions.into_iter().fold(
                NewEmail::new(recipients, template),
                |email, (key, value)| email.with_substitution(key, value),
            );

            let record = if now {
                let mut provider = carrier.provider();
                intake::send_now(&repository, &mut provider, email, Utc::now()).await?
            } else {
                intake::enqueue(&repository, email, at.unwrap_or_else(Utc::now)).await?
            };
            print_json(&record)?;
        }
        Commands::Show { id } => {
            print_json(&repository.get(&id).await?)?;
        }
        Commands::List { page, limit } => {
            print_json(&repository.list(page, limit).await?)?;
        }
        Commands::Update(args) => {
            let id = args.id;
            let record = intake::amend(&repository, &id, args.amendment(), Utc::now()).await?;
            print_json(&record)?;
        }
        Commands::Delete { id } => {
            repository.delete(&id).await?;
            println!("Deleted {id}");
        }
        Commands::Process => {
            let mut provider = carrier.provider();
            let report = carrier
                .processor
                .run_once(&repository, &mut provider)
                .await?;
            print_json(&report)?;
        }
    }

    Ok(())
}
