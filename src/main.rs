use clap::Parser;
use miette::{IntoDiagnostic, Result, WrapErr};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use telebank::application::accounts::AccountRegistry;
use telebank::domain::account::Amount;
use telebank::domain::bill::BillType;
use telebank::domain::ports::{FundsPlan, LedgerRef, NewBill};
use telebank::domain::transaction::{CallId, Reference};
use telebank::infrastructure::in_memory::{InMemoryDirectory, InMemoryLedger};
use telebank::interfaces::csv::seed_reader::{
    AccountRecord, BillRecord, CustomerRecord, SeedReader,
};
use telebank::interfaces::csv::summary_writer::SummaryWriter;
use telebank::interfaces::dispatcher::{CallContext, ToolDispatcher};
use telebank::interfaces::replay::CallReader;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input tool-call log (JSONL), one record per line
    calls: PathBuf,

    /// Customer seed CSV: user_id,phone_number
    #[arg(long)]
    customers: Option<PathBuf>,

    /// Account seed CSV: user_id,title,balance
    #[arg(long)]
    accounts: Option<PathBuf>,

    /// Bill seed CSV: user_id,bill_type,amount,description,due_date
    #[arg(long)]
    bills: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Write the final account table to stdout as CSV
    #[arg(long)]
    summary: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let store = build_store(&cli)?;
    let directory = Arc::new(InMemoryDirectory::new());

    if let Some(path) = &cli.customers {
        seed_customers(&directory, path).await?;
    }
    if let Some(path) = &cli.accounts {
        seed_accounts(&store, path).await?;
    }
    if let Some(path) = &cli.bills {
        seed_bills(&store, path).await?;
    }

    let dispatcher = ToolDispatcher::new(store.clone(), directory);

    let file = File::open(&cli.calls)
        .into_diagnostic()
        .wrap_err_with(|| format!("opening call log {}", cli.calls.display()))?;
    for item in CallReader::new(file).calls() {
        match item {
            Ok(record) => {
                // Stale OTPs are expired lazily, ahead of each call.
                if let Err(err) = dispatcher.expire_stale_otps().await {
                    eprintln!("Error expiring OTPs: {err}");
                }
                let ctx = CallContext {
                    user_id: record.user_id.clone(),
                    call_id: record.call_id.map(CallId),
                };
                match dispatcher.dispatch(&ctx, &record.call).await {
                    Ok(reply) => println!("{reply}"),
                    Err(err) => eprintln!("Error handling tool call: {err}"),
                }
            }
            Err(err) => eprintln!("Error reading call record: {err}"),
        }
    }

    if cli.summary {
        let accounts = store.all_accounts().await.into_diagnostic()?;
        let stdout = io::stdout();
        let mut writer = SummaryWriter::new(stdout.lock());
        writer.write_accounts(&accounts).into_diagnostic()?;
    }

    Ok(())
}

fn build_store(cli: &Cli) -> Result<LedgerRef> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(path) = &cli.db_path {
        let store = telebank::infrastructure::rocksdb::RocksDbLedger::open(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("opening database {}", path.display()))?;
        return Ok(Arc::new(store));
    }
    #[cfg(not(feature = "storage-rocksdb"))]
    if cli.db_path.is_some() {
        miette::bail!("--db-path requires the storage-rocksdb feature");
    }
    Ok(Arc::new(InMemoryLedger::new()))
}

async fn seed_customers(directory: &InMemoryDirectory, path: &Path) -> Result<()> {
    let file = open_seed(path)?;
    for record in SeedReader::new(file).records::<CustomerRecord>() {
        let record = record.into_diagnostic()?;
        directory.insert(record.phone_number, record.user_id).await;
    }
    Ok(())
}

async fn seed_accounts(store: &LedgerRef, path: &Path) -> Result<()> {
    let registry = AccountRegistry::new(store.clone());
    let file = open_seed(path)?;
    for record in SeedReader::new(file).records::<AccountRecord>() {
        let record = record.into_diagnostic()?;
        let account = registry
            .open(&record.user_id, &record.title)
            .await
            .into_diagnostic()?;
        if record.balance.is_zero() {
            continue;
        }
        let amount = Amount::try_from(record.balance).into_diagnostic()?;
        let plan = FundsPlan {
            amount,
            reference: Reference::deposit(&account.account_number),
            description: Some("Opening balance".to_string()),
            call_id: None,
        };
        store
            .deposit_funds(account.id, plan)
            .await
            .into_diagnostic()?;
    }
    Ok(())
}

async fn seed_bills(store: &LedgerRef, path: &Path) -> Result<()> {
    let file = open_seed(path)?;
    for record in SeedReader::new(file).records::<BillRecord>() {
        let record = record.into_diagnostic()?;
        let kind = BillType::parse(&record.bill_type).into_diagnostic()?;
        let amount = Amount::new(record.amount).into_diagnostic()?;
        let due_date = record.due_at();
        store
            .create_bill(NewBill {
                user_id: record.user_id,
                kind,
                amount,
                description: record.description,
                due_date,
            })
            .await
            .into_diagnostic()?;
    }
    Ok(())
}

fn open_seed(path: &Path) -> Result<File> {
    File::open(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("opening seed file {}", path.display()))
}
