//! AtlasTable operation tool
//!
//! Decodes files of framed requests, or replays them against an in-memory
//! store and reports results and charges.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use atlastable::protocol::{self, Request};
use atlastable::schema::Catalog;
use atlastable::store::{MemStore, Partition, RecordStore};
use atlastable::tracker::ThroughputTracker;
use atlastable::{Config, ExecContext, OperationHandler};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// AtlasTable operation tool
#[derive(Parser, Debug)]
#[command(name = "atlastable-opctl")]
#[command(about = "Decode and replay framed AtlasTable requests")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print every request in a frame file
    Decode {
        /// File of framed requests
        file: PathBuf,
    },

    /// Execute every request in a frame file against an empty in-memory store
    Replay {
        /// File of framed requests
        file: PathBuf,

        /// Write framed results here
        #[arg(short, long)]
        results: Option<PathBuf>,

        /// Region id stamped on local writes
        #[arg(long, default_value = "1")]
        region: u32,

        /// Partition id the requests target
        #[arg(short, long, default_value = "1")]
        partition: u32,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atlastable=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();
    tracing::info!("AtlasTable opctl v{}", atlastable::VERSION);

    let outcome = match args.command {
        Commands::Decode { file } => decode(&file),
        Commands::Replay {
            file,
            results,
            region,
            partition,
        } => replay(&file, results.as_deref(), region, partition),
    };

    if let Err(e) = outcome {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

/// Read every framed request in `path`
fn read_requests(path: &Path) -> atlastable::Result<Vec<Request>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut requests = Vec::new();
    while !reader.fill_buf()?.is_empty() {
        requests.push(protocol::read_request(&mut reader)?);
    }
    tracing::debug!("Read {} requests from {}", requests.len(), path.display());
    Ok(requests)
}

fn decode(path: &Path) -> atlastable::Result<()> {
    for (i, request) in read_requests(path)?.iter().enumerate() {
        println!(
            "#{} v{} timeout={}ms {} {:?}",
            i,
            request.serial_version,
            request.timeout_ms,
            request.operation.opcode(),
            request.operation
        );
    }
    Ok(())
}

fn replay(path: &Path, results: Option<&Path>, region: u32, partition_id: u32) -> atlastable::Result<()> {
    let requests = read_requests(path)?;

    let store = Arc::new(MemStore::default());
    let config = Config::builder().local_region_id(region).build();
    let handler = OperationHandler::builder(store.clone(), Arc::new(Catalog::new()))
        .config(config)
        .build();
    let tracker = Arc::new(ThroughputTracker::new());
    let partition = Partition::new(partition_id, store.shard_id());

    let mut out = match results {
        Some(p) => Some(BufWriter::new(File::create(p)?)),
        None => None,
    };

    let mut failed = 0;
    for (i, request) in requests.iter().enumerate() {
        let txn = store.begin_transaction();
        let mut ctx = ExecContext::new()
            .with_tracker(tracker.clone())
            .with_timeout_ms(request.timeout_ms as u64);

        match handler.execute(&request.operation, &mut ctx, &txn, &partition) {
            Ok(result) => {
                println!(
                    "#{} {} success={} read={}KB write={}KB",
                    i,
                    result.opcode,
                    result.success(),
                    result.read_kb,
                    result.write_kb
                );
                if let Some(w) = out.as_mut() {
                    protocol::write_result(w, &result, request.serial_version)?;
                }
            }
            Err(e) => {
                failed += 1;
                tracing::warn!("Request #{} ({}) failed: {}", i, request.operation.opcode(), e);
            }
        }
        txn.commit();
    }

    if let Some(mut w) = out {
        w.flush()?;
    }
    tracing::info!(
        "Replayed {} requests ({} failed): {} read KB, {} write KB, {} records stored",
        requests.len(),
        failed,
        tracker.read_kb(),
        tracker.write_kb(),
        store.len()
    );
    Ok(())
}
