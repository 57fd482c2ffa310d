use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use ecall_incidents::client::IncidentClient;
use ecall_incidents::models::{IncidentPatch, NewIncident, TranscriptMessage};
use serde::Serialize;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "ecall-cli")]
#[command(about = "Emergency call incident CLI", long_about = None)]
struct Cli {
    /// Base URL of the incident API, including any path prefix
    #[arg(short, long, env = "ECALL_ENDPOINT", default_value = "http://localhost:8080")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a new incident
    Create {
        #[arg(short, long)]
        phone_number: Option<String>,

        #[arg(short, long)]
        caller_name: Option<String>,

        #[arg(short, long)]
        location: Option<String>,

        #[arg(short = 't', long)]
        incident_type: Option<String>,

        #[arg(short, long)]
        severity: Option<String>,

        #[arg(short, long)]
        operator_id: Option<String>,

        #[arg(long, default_value = "active")]
        status: String,
    },

    /// List incidents in the active index
    List {
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Get incident details
    Get {
        #[arg(value_name = "INCIDENT_ID")]
        id: String,
    },

    /// Append a transcript message
    Transcript {
        #[arg(value_name = "INCIDENT_ID")]
        id: String,

        #[arg(short, long)]
        sender: String,

        #[arg(short, long)]
        message: String,

        /// Defaults to the current local time
        #[arg(short, long)]
        timestamp: Option<String>,
    },

    /// Mark an incident completed
    Complete {
        #[arg(value_name = "INCIDENT_ID")]
        id: String,
    },

    /// Apply a partial update
    Patch {
        #[arg(value_name = "INCIDENT_ID")]
        id: String,

        /// `key=value`; values that parse as JSON are sent as JSON
        #[arg(short, long = "field", value_name = "KEY=VALUE", required = true)]
        fields: Vec<String>,
    },

    /// Check server health
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = IncidentClient::new(cli.endpoint);

    match cli.command {
        Commands::Create {
            phone_number,
            caller_name,
            location,
            incident_type,
            severity,
            operator_id,
            status,
        } => {
            let mut payload = NewIncident::new().with("status", status);
            for (key, value) in [
                ("phoneNumber", phone_number),
                ("callerName", caller_name),
                ("location", location),
                ("incidentType", incident_type),
                ("severity", severity),
                ("operatorId", operator_id),
            ] {
                if let Some(value) = value {
                    payload = payload.with(key, value);
                }
            }

            print_json(&client.create(&payload).await?)?;
        }

        Commands::List { status } => {
            print_json(&client.list(status.as_deref()).await?)?;
        }

        Commands::Get { id } => {
            print_json(&client.get(&id).await?)?;
        }

        Commands::Transcript {
            id,
            sender,
            message,
            timestamp,
        } => {
            let timestamp = timestamp
                .unwrap_or_else(|| chrono::Local::now().format("%H:%M:%S").to_string());
            let entry = TranscriptMessage::new(sender, message, timestamp);
            print_json(&client.append_transcript(&id, &entry).await?)?;
        }

        Commands::Complete { id } => {
            print_json(&client.complete(&id).await?)?;
        }

        Commands::Patch { id, fields } => {
            let mut patch = IncidentPatch::new();
            for field in &fields {
                let (key, value) = parse_field(field)?;
                patch = patch.with(key, value);
            }
            print_json(&client.patch(&id, &patch).await?)?;
        }

        Commands::Health => {
            print_json(&client.health().await?)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `severity=high` → string, `priority=3` → number, `tags=["a"]` → array
fn parse_field(field: &str) -> anyhow::Result<(String, Value)> {
    let (key, raw) = field
        .split_once('=')
        .with_context(|| format!("expected KEY=VALUE, got '{}'", field))?;
    if key.is_empty() {
        bail!("empty key in '{}'", field);
    }

    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
