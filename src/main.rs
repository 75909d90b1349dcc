use chrono::Utc;
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use pixvip::application::lifecycle::PurchaseLifecycle;
use pixvip::application::reconciler::{PaymentReconciler, ReconcileOutcome};
use pixvip::config::CheckoutConfig;
use pixvip::domain::amount::Amount;
use pixvip::domain::payload::{self, PayloadCodec, PaymentRequest, TransactionId};
use pixvip::domain::ports::{Clock, ClockRef, OracleRef, PurchaseStoreRef, SubscriptionStoreRef};
use pixvip::domain::purchase::UserId;
use pixvip::infrastructure::clock::SystemClock;
use pixvip::infrastructure::in_memory::{InMemoryPurchaseStore, InMemorySubscriptionStore};
use pixvip::infrastructure::oracle::DelayedApprovalOracle;
use pixvip::interfaces::csv::event_reader::EventReader;
use pixvip::interfaces::csv::report_writer::ReportWriter;
use pixvip::interfaces::simulator::Simulator;
use rust_decimal::Decimal;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file (merchant profile, plans, windows, timeouts)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a fresh payment string
    Payload {
        /// Amount to charge; required unless --static
        #[arg(long)]
        amount: Option<Decimal>,

        /// Reusable code without an amount
        #[arg(long = "static", conflicts_with = "amount")]
        is_static: bool,
    },
    /// Check a payment string's structure and checksum
    Validate { code: String },
    /// Open a purchase against the sandbox oracle and poll until it settles
    Checkout {
        #[arg(long)]
        user: String,

        #[arg(long)]
        plan: String,

        /// Seconds after creation at which the sandbox reports the transfer
        #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(i64).range(0..=86_400))]
        settle_after: i64,

        /// Delay between reconciliation attempts
        #[arg(long, default_value_t = 1000)]
        poll_ms: u64,
    },
    /// Replay a CSV of purchase events and print the resulting state
    Simulate {
        /// Input events CSV file
        input: PathBuf,

        /// Path to persistent database (optional). If provided, uses RocksDB.
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "pixvip=debug" } else { "pixvip=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => CheckoutConfig::load(path).into_diagnostic()?,
        None => CheckoutConfig::default(),
    };

    match cli.command {
        Command::Payload { amount, is_static } => {
            let txid = TransactionId::generate(&config.txid_prefix, Utc::now());
            let request = if is_static {
                PaymentRequest::Static { txid }
            } else {
                let amount = amount
                    .ok_or_else(|| miette::miette!("--amount is required for a dynamic code"))?;
                PaymentRequest::Dynamic {
                    amount: Amount::new(amount).into_diagnostic()?,
                    txid,
                }
            };
            let codec = PayloadCodec::new(config.merchant.clone())
                .with_initiation_method(config.include_initiation_method);
            println!("{}", codec.build(&request).into_diagnostic()?);
        }
        Command::Validate { code } => {
            let code = code.trim();
            payload::verify(code).into_diagnostic()?;
            for field in payload::decode_fields(code).into_diagnostic()? {
                println!("{} {:02} {}", field.tag, field.value.len(), field.value);
            }
            println!("valid");
        }
        Command::Checkout {
            user,
            plan,
            settle_after,
            poll_ms,
        } => {
            let plan = config.plans.get(&plan).into_diagnostic()?.clone();
            let (purchases, subscriptions) = in_memory_stores();
            let clock: ClockRef = Arc::new(SystemClock);
            let oracle: OracleRef = Arc::new(DelayedApprovalOracle::new(
                purchases.clone(),
                clock.clone(),
                chrono::Duration::seconds(settle_after),
            ));
            let lifecycle = Arc::new(PurchaseLifecycle::from_config(purchases, &config));
            let reconciler =
                PaymentReconciler::new(lifecycle.clone(), oracle, subscriptions, clock.clone())
                    .with_config(&config);

            let purchase = lifecycle
                .create(UserId::new(user), &plan, clock.now())
                .await
                .into_diagnostic()?;
            println!("{}", purchase.payment_code);

            let mut ticker = tokio::time::interval(Duration::from_millis(poll_ms.max(1)));
            loop {
                ticker.tick().await;
                match reconciler.reconcile(purchase.id).await {
                    Ok(ReconcileOutcome::StillPending(pending)) => {
                        let remaining = pending.remaining(clock.now()).num_seconds();
                        debug!(remaining, "waiting for payment");
                    }
                    Ok(ReconcileOutcome::Completed { subscription, .. }) => {
                        println!(
                            "completed: {} active until {}",
                            subscription.plan_id, subscription.end
                        );
                        break;
                    }
                    Ok(ReconcileOutcome::Expired(_)) => {
                        println!("expired");
                        break;
                    }
                    Ok(ReconcileOutcome::Finalized(status)) => {
                        println!("{status}");
                        break;
                    }
                    Err(e) if e.is_retryable() => warn!(error = %e, "reconcile failed, retrying"),
                    Err(e) => return Err(e).into_diagnostic(),
                }
            }
        }
        Command::Simulate { input, db_path } => {
            let (purchases, subscriptions) = open_stores(db_path)?;
            let mut simulator = Simulator::new(config, purchases, subscriptions);

            let file = File::open(input).into_diagnostic()?;
            for event in EventReader::new(file).events() {
                match event {
                    Ok(event) => {
                        if let Err(e) = simulator.apply(event).await {
                            error!(error = %e, retryable = e.is_retryable(), "event failed");
                            eprintln!("Error applying event: {}", e);
                        }
                    }
                    Err(e) => {
                        eprintln!("Error reading event: {}", e);
                    }
                }
            }

            let purchases = simulator.purchases().await.into_diagnostic()?;
            let subscriptions = simulator.subscriptions().await.into_diagnostic()?;
            let stdout = io::stdout();
            let mut writer = ReportWriter::new(stdout.lock());
            writer
                .write_purchases(&purchases, |p| simulator.label_of(p))
                .into_diagnostic()?;
            writer
                .write_subscriptions(&subscriptions, simulator.now())
                .into_diagnostic()?;
        }
    }

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<PathBuf>) -> Result<(PurchaseStoreRef, SubscriptionStoreRef)> {
    use pixvip::infrastructure::rocksdb::RocksDBStore;

    if let Some(db_path) = db_path {
        let store = Arc::new(RocksDBStore::open(db_path).into_diagnostic()?);
        let purchases: PurchaseStoreRef = store.clone();
        let subscriptions: SubscriptionStoreRef = store;
        return Ok((purchases, subscriptions));
    }
    Ok(in_memory_stores())
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<PathBuf>) -> Result<(PurchaseStoreRef, SubscriptionStoreRef)> {
    if db_path.is_some() {
        tracing::warn!("persistent storage requested without the storage-rocksdb feature");
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_stores())
}

fn in_memory_stores() -> (PurchaseStoreRef, SubscriptionStoreRef) {
    let purchases: PurchaseStoreRef = Arc::new(InMemoryPurchaseStore::new());
    let subscriptions: SubscriptionStoreRef = Arc::new(InMemorySubscriptionStore::new());
    (purchases, subscriptions)
}
