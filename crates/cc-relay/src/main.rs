mod config;
mod logging;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use cc_core::{GeoPoint, NewReport, ReportCategory, SYNC_TAG_NEW_REPORTS};
use cc_storage::{Durability, QueueHandle, ReportStore};
use cc_sync::{
    sync_channel, HttpDelivery, ItemOutcome, SyncError, SyncReport, SyncWorker, TriggerError, Url,
    DEFAULT_SIGNAL_CAPACITY,
};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "cc-relay")]
#[command(about = "Citizen Connect offline report queue and sync relay", long_about = None)]
struct Cli {
    /// Queue database file
    #[arg(long, global = true, env = "CC_DB_PATH")]
    db_path: Option<PathBuf>,
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,
    #[arg(long, global = true, default_value = "")]
    log_dir: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Queue a complaint for later delivery
    Enqueue {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        category: Option<ReportCategory>,
        #[arg(long)]
        subcategory: Option<String>,
        #[arg(long, requires = "lng", allow_negative_numbers = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lng: Option<f64>,
    },
    /// List reports awaiting upload
    Pending {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Cache the credential used for unattended delivery
    Login { token: String },
    /// Forget the cached credential
    Logout,
    /// Run one sync cycle and exit
    Sync {
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Sync on an interval until interrupted
    Watch {
        #[command(flatten)]
        api: ApiArgs,
        #[arg(long, env = "CC_SYNC_INTERVAL_SECS", default_value_t = 60)]
        interval_secs: u64,
    },
}

#[derive(Args, Debug)]
struct ApiArgs {
    #[arg(long, env = "CC_API_URL", default_value = config::DEFAULT_API_URL)]
    api_url: Url,
    #[arg(long, env = "CC_HTTP_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let debug = cli.debug || config::env_true("CC_DEBUG");
    let log_dir = config::resolve_log_dir(&cli.log_dir);
    let _log_guard = logging::init_logging(debug, log_dir.as_deref());

    // One-shot commands must not report success against a memory-only queue.
    let open_mode = match cli.command {
        Commands::Watch { .. } => OpenMode::AllowEphemeral,
        _ => OpenMode::DurableOnly,
    };
    let queue = open_queue(cli.db_path.as_deref(), open_mode)?;

    match cli.command {
        Commands::Enqueue {
            title,
            description,
            category,
            subcategory,
            lat,
            lng,
        } => {
            let mut report = NewReport::new(title, description);
            report.category = category;
            report.subcategory = subcategory;
            if let (Some(lat), Some(lng)) = (lat, lng) {
                report.location = Some(GeoPoint::new(lat, lng).context("invalid location")?);
            }
            let stored = queue
                .enqueue_report(report)
                .await
                .context("failed to queue report")?;
            let waiting = queue.pending_count().await.context("failed to count queue")?;
            info!(event = "report_queued", report_id = stored.id);
            println!(
                "Queued report #{} ({}); {} awaiting upload",
                stored.id, stored.idempotency_key, waiting
            );
        }
        Commands::Pending { json } => {
            let reports = queue
                .list_pending_reports()
                .await
                .context("failed to read queue")?;
            if json {
                let body =
                    serde_json::to_string_pretty(&reports).context("failed to encode reports")?;
                println!("{body}");
            } else if reports.is_empty() {
                println!("No reports awaiting upload");
            } else {
                println!("{} reports awaiting upload:", reports.len());
                for report in &reports {
                    let category = report.category.map(|c| c.as_str()).unwrap_or("-");
                    println!(
                        "- [{}] {} ({}) queued {}",
                        report.id,
                        report.title,
                        category,
                        report.created_at.to_rfc3339()
                    );
                }
            }
        }
        Commands::Login { token } => {
            queue
                .set_credential(token)
                .await
                .context("failed to store credential")?;
            println!("Credential cached");
        }
        Commands::Logout => {
            let removed = queue
                .clear_credential()
                .await
                .context("failed to clear credential")?;
            if removed {
                println!("Credential cleared");
            } else {
                println!("No credential was cached");
            }
        }
        Commands::Sync { api } => {
            let worker = build_worker(&queue, api)?;
            match worker.run_cycle().await {
                Ok(report) => print_report(&report),
                Err(SyncError::MissingCredential) => {
                    bail!("no cached credential; run `cc-relay login <token>` first")
                }
                Err(err) => return Err(err).context("sync cycle failed"),
            }
        }
        Commands::Watch { api, interval_secs } => {
            watch(&queue, api, interval_secs).await?;
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenMode {
    DurableOnly,
    AllowEphemeral,
}

fn open_queue(flag: Option<&Path>, mode: OpenMode) -> Result<QueueHandle> {
    let path = config::resolve_db_path(flag);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(err) = std::fs::create_dir_all(parent) {
            debug!(event = "db_dir_error", path = %parent.display(), error = %err);
        }
    }
    let store = match mode {
        OpenMode::DurableOnly => ReportStore::open(&path),
        OpenMode::AllowEphemeral => ReportStore::open_or_in_memory(&path),
    }
    .with_context(|| format!("failed to open report queue at {}", path.display()))?;
    if store.durability() == Durability::Ephemeral {
        warn!(
            event = "queue_not_durable",
            path = %path.display(),
            "queued reports will be lost when this process exits"
        );
    }
    Ok(QueueHandle::new(store))
}

fn build_worker(
    queue: &QueueHandle,
    api: ApiArgs,
) -> Result<SyncWorker<QueueHandle, QueueHandle, HttpDelivery>> {
    let delivery = HttpDelivery::new(config::delivery_config(api.api_url, api.timeout_secs))
        .context("failed to build http client")?;
    info!(event = "delivery_endpoint", endpoint = %delivery.endpoint());
    Ok(SyncWorker::new(queue.clone(), queue.clone(), delivery))
}

async fn watch(queue: &QueueHandle, api: ApiArgs, interval_secs: u64) -> Result<()> {
    let worker = build_worker(queue, api)?;
    let (trigger, dispatcher) = sync_channel(worker, DEFAULT_SIGNAL_CAPACITY);
    let period = Duration::from_secs(interval_secs.max(1));

    // The first tick fires immediately, so anything left over from an
    // earlier run is retried on startup.
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            match trigger.request(SYNC_TAG_NEW_REPORTS) {
                Ok(outcome) => debug!(event = "sync_requested", outcome = ?outcome),
                Err(TriggerError::Closed) => break,
            }
        }
    });

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!(event = "shutdown_requested");
    };

    info!(event = "watch_started", interval_secs = period.as_secs());
    let summary = dispatcher.run(shutdown).await;
    ticker.abort();

    println!(
        "Ran {} sync cycles, delivered {} reports ({} skipped without credential, {} storage failures)",
        summary.cycles,
        summary.delivered,
        summary.skipped_without_credential,
        summary.storage_failures
    );
    let remaining = queue.pending_count().await.context("failed to count queue")?;
    println!("{remaining} reports awaiting upload");
    Ok(())
}

fn print_report(report: &SyncReport) {
    if report.attempted() == 0 {
        println!("Nothing to sync");
        return;
    }
    println!(
        "Attempted {}, delivered {}, failed {}",
        report.attempted(),
        report.delivered(),
        report.failed()
    );
    for (id, outcome) in &report.outcomes {
        match outcome {
            ItemOutcome::Delivered { status } => println!("- [{id}] delivered ({status})"),
            ItemOutcome::DeliveredElsewhere { status } => {
                println!("- [{id}] delivered ({status}), already removed by another sync")
            }
            ItemOutcome::Failed(err) => println!("- [{id}] kept for retry: {err}"),
            ItemOutcome::DeleteFailed { status, reason } => {
                println!("- [{id}] delivered ({status}) but not removed: {reason}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn enqueue_parses_category_and_location() {
        let cli = Cli::try_parse_from([
            "cc-relay",
            "enqueue",
            "--title",
            "Pothole",
            "--description",
            "Large pothole on Main St",
            "--category",
            "civic-issue",
            "--lat",
            "-12.5",
            "--lng",
            "77.25",
        ])
        .expect("parse");
        match cli.command {
            Commands::Enqueue {
                category, lat, lng, ..
            } => {
                assert_eq!(category, Some(ReportCategory::CivicIssue));
                assert_eq!(lat, Some(-12.5));
                assert_eq!(lng, Some(77.25));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn latitude_requires_longitude() {
        let result = Cli::try_parse_from([
            "cc-relay",
            "enqueue",
            "--title",
            "t",
            "--description",
            "d",
            "--lat",
            "1.0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn sync_accepts_api_url_and_global_db_path() {
        let cli = Cli::try_parse_from([
            "cc-relay",
            "sync",
            "--api-url",
            "https://api.example.org/v1",
            "--db-path",
            "/tmp/queue.db",
        ])
        .expect("parse");
        assert_eq!(cli.db_path, Some(PathBuf::from("/tmp/queue.db")));
        match cli.command {
            Commands::Sync { api } => {
                assert_eq!(api.api_url.as_str(), "https://api.example.org/v1");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    fn garbage_db() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("queue.db");
        std::fs::write(&path, "not a sqlite database ".repeat(64)).expect("write garbage");
        (dir, path)
    }

    #[test]
    fn one_shot_commands_refuse_a_memory_only_queue() {
        let (_dir, path) = garbage_db();
        let err = open_queue(Some(&path), OpenMode::DurableOnly).expect_err("unusable store");
        assert!(format!("{err:#}").contains("failed to open report queue"));
    }

    #[test]
    fn watcher_falls_back_to_memory() {
        let (_dir, path) = garbage_db();
        let queue = open_queue(Some(&path), OpenMode::AllowEphemeral).expect("fallback");
        assert_eq!(queue.durability(), Durability::Ephemeral);
    }

    #[test]
    fn durable_open_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("citizen-connect.db");
        let queue = open_queue(Some(&path), OpenMode::DurableOnly).expect("open");
        assert_eq!(queue.durability(), Durability::Durable);
        assert!(path.exists());
    }
}
