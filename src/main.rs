use chrono::{NaiveDate, Utc};
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use subrenew::application::orchestrator::RenewalOrchestrator;
use subrenew::application::processor::TransactionProcessor;
use subrenew::application::renewal::SubscriptionRenewalService;
use subrenew::application::triggers::TriggerService;
use subrenew::config::{self, RenewalConfig};
use subrenew::domain::ports::{
    EventPublisherRef, PaymentGatewayRef, SubscriptionStoreRef, TransactionStoreRef,
};
use subrenew::infrastructure::broker::InProcessBroker;
use subrenew::infrastructure::gateway::{HttpPaymentGateway, SimulatedGateway};
use subrenew::infrastructure::in_memory::{InMemorySubscriptionStore, InMemoryTransactionStore};
use subrenew::interfaces::csv::report_writer::ReportWriter;
use subrenew::interfaces::csv::subscription_reader::SubscriptionReader;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subscriptions seed CSV file
    input: PathBuf,

    /// Path to persistent database (optional). Requires the storage-rocksdb
    /// feature; without it, in-memory stores are used.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Payment gateway endpoint. Without it, charges are simulated locally.
    #[arg(long)]
    gateway_url: Option<String>,

    /// Renewal date to process (defaults to today).
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Maximum transactions claimed per enqueue pass.
    #[arg(long)]
    batch_limit: Option<usize>,

    /// Concurrent renewal consumers.
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    config::init_tracing();
    let cli = Cli::parse();
    let config = RenewalConfig::from_env();

    let (subscriptions, transactions) = build_stores(cli.db_path.as_ref())?;

    // Seed subscriptions from the input file.
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = SubscriptionReader::new(file);
    for result in reader.subscriptions() {
        let subscription = result.into_diagnostic()?;
        subscriptions
            .store(subscription)
            .await
            .into_diagnostic()?;
    }

    let gateway: PaymentGatewayRef = match &cli.gateway_url {
        Some(url) => Arc::new(
            HttpPaymentGateway::new(url.clone(), config.gateway_timeout).into_diagnostic()?,
        ),
        None => Arc::new(SimulatedGateway),
    };

    let broker = InProcessBroker::new();
    let publisher: EventPublisherRef = Arc::new(broker.clone());

    let triggers = TriggerService::new(
        subscriptions.clone(),
        transactions.clone(),
        publisher.clone(),
    );
    let orchestrator = Arc::new(RenewalOrchestrator::new(
        TransactionProcessor::new(transactions.clone(), gateway),
        SubscriptionRenewalService::new(subscriptions.clone()),
        publisher,
        &config,
    ));

    let date = cli.date.unwrap_or_else(|| Utc::now().date_naive());
    let generated = triggers
        .generate_due_transactions(date)
        .await
        .into_diagnostic()?;
    let enqueued = triggers
        .enqueue_due_transactions(cli.batch_limit.unwrap_or(config.claim_batch_size))
        .await
        .into_diagnostic()?;
    tracing::info!(generated, enqueued, %date, "pipeline primed");

    broker
        .run_until_idle(
            orchestrator,
            cli.concurrency.unwrap_or(config.consumer_concurrency),
        )
        .await;

    for letter in broker.dead_letters().await {
        tracing::warn!(reason = %letter.reason, "dead-lettered message");
    }

    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());
    writer
        .write_transactions(transactions.all().await.into_diagnostic()?)
        .into_diagnostic()?;

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn build_stores(db_path: Option<&PathBuf>) -> Result<(SubscriptionStoreRef, TransactionStoreRef)> {
    use subrenew::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => {
            let store = RocksDBStore::open(path).into_diagnostic()?;
            let subscriptions: SubscriptionStoreRef = Arc::new(store.clone());
            let transactions: TransactionStoreRef = Arc::new(store);
            Ok((subscriptions, transactions))
        }
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn build_stores(db_path: Option<&PathBuf>) -> Result<(SubscriptionStoreRef, TransactionStoreRef)> {
    if db_path.is_some() {
        miette::bail!("--db-path requires building with the storage-rocksdb feature");
    }
    Ok(in_memory_stores())
}

fn in_memory_stores() -> (SubscriptionStoreRef, TransactionStoreRef) {
    let subscriptions: SubscriptionStoreRef = Arc::new(InMemorySubscriptionStore::new());
    let transactions: TransactionStoreRef = Arc::new(InMemoryTransactionStore::new());
    (subscriptions, transactions)
}
