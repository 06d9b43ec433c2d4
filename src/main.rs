use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use inbox_digest::auth::{CredentialProvider, TokenFileCredentials};
use inbox_digest::config::{AppConfig, StoreKind};
use inbox_digest::error::{AuthError, Error, Result};
use inbox_digest::dashboard::{self, Dashboard, ReportFilter};
use inbox_digest::mailbox::GmailSource;
use inbox_digest::oracle::{Annotator, LanguageOracle, ProcessOracle};
use inbox_digest::pipeline::AnnotationPipeline;
use inbox_digest::store::{self, RecordStore};

#[derive(Parser)]
#[command(name = "inbox-digest", version, about = "Summarize and categorize unread mail with a local model")]
struct Cli {
    /// Record store backend: `sheets` or `local`.
    #[arg(long, global = true)]
    store: Option<String>,

    /// Spreadsheet id (implies `--store sheets`).
    #[arg(long, global = true)]
    sheet_id: Option<String>,

    /// Local database file for `--store local`.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process one batch of unread messages and exit.
    Run {
        /// Maximum messages per run.
        #[arg(long, short = 'n')]
        batch_size: Option<usize>,
    },
    /// Process a batch every poll interval until Ctrl-C.
    Watch {
        #[arg(long, short = 'n')]
        batch_size: Option<usize>,
        /// Seconds between runs.
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Print the dashboard.
    Report {
        /// Keyword query, e.g. "show job emails".
        #[arg(long, short = 'q')]
        query: Option<String>,
        /// Only rows with exactly this category.
        #[arg(long, short = 'c')]
        category: Option<String>,
        /// Skip the model-generated digest.
        #[arg(long)]
        no_digest: bool,
    },
    /// Verify mailbox and store connectivity.
    Check,
}

fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "inbox-digest.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(file)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

fn describe_store(kind: &StoreKind) -> String {
    match kind {
        StoreKind::Sheets { sheet_id } => format!("sheets ({sheet_id})"),
        StoreKind::Local { path } => format!("local ({})", path.display()),
    }
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("Warning: a rustls crypto provider was already installed");
    }

    let cli = Cli::parse();

    let mut config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(2);
    });
    if let Err(e) = config.select_store(cli.store.as_deref(), cli.sheet_id.clone(), cli.db_path.clone()) {
        eprintln!("Error: {e}");
        std::process::exit(2);
    }

    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("📬 Inbox Digest v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} {}", config.oracle.command, config.oracle.model);
    eprintln!("   Store: {}", describe_store(&config.store));

    let token_path = config.token_path.clone();
    if let Err(e) = run(cli.command, config).await {
        eprintln!("Error: {e}");
        if matches!(e, Error::Auth(AuthError::Missing { .. })) {
            eprintln!("  Create {} with an OAuth token (see README).", token_path.display());
        }
        std::process::exit(1);
    }
}

async fn run(command: Command, mut config: AppConfig) -> Result<()> {
    // ── Credentials ──────────────────────────────────────────────────────
    let credentials: Arc<dyn CredentialProvider> =
        Arc::new(TokenFileCredentials::load(&config.token_path).await?);

    // ── Record store ─────────────────────────────────────────────────────
    let store: Arc<dyn RecordStore> = store::open_store(&config.store, Arc::clone(&credentials)).await?;

    let oracle: Arc<dyn LanguageOracle> = Arc::new(ProcessOracle::from_config(&config.oracle));
    let annotator = Annotator::new(oracle, config.oracle.clone());

    match command {
        Command::Run { batch_size } => {
            if let Some(n) = batch_size {
                config.pipeline.batch_size = n.max(1);
            }
            eprintln!("   Batch size: {}\n", config.pipeline.batch_size);

            let source = Arc::new(GmailSource::new(credentials)?);
            let pipeline = AnnotationPipeline::new(source, store, annotator, config.pipeline);
            let stats = pipeline.run_once().await?;
            if stats.seen == 0 {
                println!("No unread emails found.");
            }
            println!("{stats}");
            if stats.deferred() > 0 {
                println!("{} unread left for the next run.", stats.deferred());
            }
        }
        Command::Watch {
            batch_size,
            interval,
        } => {
            if let Some(n) = batch_size {
                config.pipeline.batch_size = n.max(1);
            }
            if let Some(secs) = interval {
                config.pipeline.poll_interval = std::time::Duration::from_secs(secs.max(1));
            }
            eprintln!(
                "   Batch size: {} every {}s. Ctrl-C to stop.\n",
                config.pipeline.batch_size,
                config.pipeline.poll_interval.as_secs()
            );

            let source = Arc::new(GmailSource::new(credentials)?);
            let pipeline = AnnotationPipeline::new(source, store, annotator, config.pipeline);
            let summary = pipeline
                .watch(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                        std::future::pending::<()>().await;
                    }
                })
                .await;
            println!(
                "{} runs ({} failed): {}",
                summary.runs + summary.failed_runs,
                summary.failed_runs,
                summary.totals
            );
        }
        Command::Report {
            query,
            category,
            no_digest,
        } => {
            let dashboard = Dashboard::new(store, annotator);
            let filter = ReportFilter { query, category };
            match dashboard.build(&filter, !no_digest).await? {
                Some(report) => print!("{}", dashboard::render(&report)),
                None => println!("{}", dashboard::NO_DATA),
            }
        }
        Command::Check => {
            let source = GmailSource::new(credentials)?;
            let labels = source.labels().await?;
            println!("Mailbox OK: {} labels", labels.len());
            for label in &labels {
                println!("  - {label}");
            }
            let records = store.read_all().await?;
            println!("Store OK ({}): {} records", store.name(), records.len());
        }
    }

    Ok(())
}
