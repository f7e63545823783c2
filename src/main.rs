use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use geozone::{Config, ShapeId, ShapeRecord, ZoneColor, ZoneDraft, ZoneService};

/// Radius zones on a map, stored locally and synced through a shared file
#[derive(Parser, Debug)]
#[command(name = "geozone")]
#[command(version, about, long_about = None)]
struct Args {
    /// Config file to read instead of the default location
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Shape file to use instead of the configured one
    #[arg(long, value_name = "FILE")]
    data: Option<PathBuf>,

    /// Shared remote file to sync with
    #[arg(long, value_name = "FILE")]
    remote: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List active zones
    List,
    /// Add a circular zone
    Add {
        title: String,
        /// Centre, in any coordinate notation
        #[arg(long)]
        at: String,
        /// Radius in metres
        #[arg(long, default_value_t = 100.0)]
        radius: f64,
        /// Zone stays valid for this many days from now
        #[arg(long)]
        days: Option<i64>,
        #[arg(long)]
        memo: Option<String>,
        /// Palette name or hex value
        #[arg(long)]
        color: Option<String>,
    },
    /// Soft-delete a zone
    Delete { id: ShapeId },
    /// Bring a deleted zone back
    Restore { id: ShapeId },
    /// Set every zone to one colour
    Recolor { color: String },
    /// Drop zones whose validity window has closed
    Purge,
    /// Reconcile with the remote file
    Sync,
    /// Resolve text to a coordinate
    Locate { text: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("geozone=info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    if let Some(data) = args.data {
        config.data_path = data;
    }
    if let Some(remote) = args.remote {
        config.remote_path = Some(remote);
    }

    let service = ZoneService::from_config(&config).await;
    run(&service, args.command).await
}

async fn run(service: &ZoneService, command: Command) -> Result<()> {
    match command {
        Command::List => {
            let now = Utc::now();
            for record in service.active_records() {
                print_record(&record, now);
            }
        }
        Command::Add {
            title,
            at,
            radius,
            days,
            memo,
            color,
        } => {
            let located = service
                .locate(&at)
                .await
                .ok_or_else(|| anyhow!("unrecognized location: {at}"))?;
            let now = Utc::now();
            let mut draft = ZoneDraft::circle(title, located.coordinate, radius)
                .flight_window(Some(now), days.map(|d| now + Duration::days(d)));
            draft.address = located.address;
            if let Some(memo) = memo {
                draft = draft.memo(memo);
            }
            if let Some(color) = color {
                draft = draft.color(parse_color(&color)?);
            }
            let record = service.create_zone(draft).await.context("zone rejected")?;
            println!("{}", record.id);
        }
        Command::Delete { id } => {
            if !service.delete_zone(id).await {
                bail!("no active zone {id}");
            }
        }
        Command::Restore { id } => {
            if !service.restore_zone(id).await {
                bail!("no deleted zone {id}");
            }
        }
        Command::Recolor { color } => {
            let count = service.recolor_all(&parse_color(&color)?).await;
            println!("recolored {count} zones");
        }
        Command::Purge => {
            let removed = service.purge_expired().await;
            println!("purged {removed} expired zones");
        }
        Command::Sync => {
            let report = service.sync_now().await?;
            println!(
                "adopted {}, updated {}, pushed {}, unchanged {}, skipped expired {}",
                report.adopted, report.overwritten_locally, report.pushed, report.unchanged, report.skipped_expired
            );
        }
        Command::Locate { text } => match service.locate(&text).await {
            Some(hit) => println!(
                "{}  ({})  {}",
                hit.coordinate,
                hit.coordinate.format_decimal(6),
                hit.address.unwrap_or_default()
            ),
            None => bail!("unrecognized location: {text}"),
        },
    }
    Ok(())
}

fn parse_color(text: &str) -> Result<String> {
    if let Some(color) = ZoneColor::from_name(text) {
        return Ok(color.to_hex().to_string());
    }
    if ZoneColor::from_hex(text).is_some() || (text.starts_with('#') && text.len() == 7) {
        return Ok(text.to_uppercase());
    }
    bail!("unknown colour {text:?}")
}

fn print_record(record: &ShapeRecord, now: chrono::DateTime<Utc>) {
    let remaining = match record.remaining(now) {
        Some(left) => format!("{}d {}h left", left.num_days(), left.num_hours() % 24),
        None if record.is_expired(now) => "expired".to_string(),
        None => "open-ended".to_string(),
    };
    println!(
        "{}  {:<24} {:<9} {}  {}  {}",
        record.id,
        record.title,
        record.shape_kind(),
        record.color,
        record.center(),
        remaining
    );
}
