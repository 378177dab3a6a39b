//! Runs one side of the bucketed PIR based PSI protocol over TCP.
//!
//! The client listens and the server dials it. Inputs are read from `--data-dir`, see
//! `bucketpir_common::serialization` for the file layout.

use anyhow::{Context, Result, bail};
use bucketpir_client::{read_client_inputs, run_client};
use bucketpir_common::{
    AnswerEncoding, BucketSchema, LweConfig,
    net::{accept_one, connect},
    params::{DEFAULT_LOGQ, DEFAULT_LWE_DIMENSION},
    pir::SeedSource,
    workers::WorkerPool,
};
use bucketpir_server::{read_server_databases, run_server, setup_server_states};
use clap::{Parser, ValueEnum};
use std::{net::TcpListener, path::PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AnswerMode {
    /// Four bytes per answer element.
    Raw,
    /// Modulus switched, bit-packed answers.
    Switched,
}

impl From<AnswerMode> for AnswerEncoding {
    fn from(mode: AnswerMode) -> Self {
        match mode {
            AnswerMode::Raw => AnswerEncoding::Raw,
            AnswerMode::Switched => AnswerEncoding::ModulusSwitched,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "bucketpir")]
#[command(about = "Private set intersection over a bucketed hash table, using LWE based PIR")]
#[command(version)]
struct Args {
    /// Run the protocol as the client
    #[arg(long, conflicts_with = "server", required_unless_present = "server")]
    client: bool,

    /// Run the protocol as the server
    #[arg(long)]
    server: bool,

    /// Total number of buckets in the server's hash table
    #[arg(long)]
    bucket_n: u64,

    /// Records per bucket, until the server announces the size read from its database file
    #[arg(long, default_value_t = 1)]
    bucket_size: u64,

    /// Number of buckets which must share a database column
    #[arg(long)]
    buckets_per_col: u64,

    /// Number of cuckoo slots, each with its own database
    #[arg(long, alias = "cuckoo-size", default_value_t = 1)]
    cuckoo_n: u64,

    /// Worker threads for per-bucket work
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// LWE secret dimension
    #[arg(long, default_value_t = DEFAULT_LWE_DIMENSION)]
    lwe_n: u32,

    /// Pin the LWE error standard deviation instead of taking it from the parameter table
    #[arg(long)]
    lwe_sigma: Option<f64>,

    /// Bit-width of the ciphertext modulus
    #[arg(long, default_value_t = DEFAULT_LOGQ)]
    logq: u32,

    /// Wire encoding of answers
    #[arg(long = "mod", value_enum, default_value_t = AnswerMode::Switched)]
    answer_mode: AnswerMode,

    /// Expected size of the intersection (client only)
    #[arg(long)]
    expected: Option<u64>,

    /// Number of queries answered from a single database (server only)
    #[arg(long, conflicts_with = "queries_log")]
    queries: Option<usize>,

    /// Log2 of the number of queries answered from a single database (server only)
    #[arg(long)]
    queries_log: Option<u32>,

    /// Directory holding the input files
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Address the client listens on and the server dials
    #[arg(long, default_value = "127.0.0.1:8000")]
    addr: String,
}

impl Args {
    fn schema(&self) -> BucketSchema {
        BucketSchema {
            bucket_count: self.bucket_n,
            bucket_size: self.bucket_size,
            buckets_per_col: self.buckets_per_col,
            cuckoo_slots: self.cuckoo_n,
            threads: self.threads,
            lwe: LweConfig {
                n: self.lwe_n,
                logq: self.logq,
                sigma: self.lwe_sigma,
            },
            answer_encoding: self.answer_mode.into(),
            ..Default::default()
        }
    }

    fn num_queries(&self) -> Result<usize> {
        match (self.queries, self.queries_log) {
            (Some(queries), _) => Ok(queries),
            (None, Some(log)) if log < usize::BITS => Ok(1usize << log),
            (None, Some(log)) => bail!("--queries-log {log} is too large"),
            (None, None) => bail!("expected --queries or --queries-log argument"),
        }
    }
}

fn run_as_client(args: &Args, schema: &BucketSchema) -> Result<()> {
    let expected = args.expected.context("need --expected argument")?;

    let inputs = read_client_inputs(&args.data_dir, schema).with_context(|| format!("reading client inputs from {}", args.data_dir.display()))?;
    let pool = WorkerPool::new(schema.threads)?;

    let listener = TcpListener::bind(&args.addr).with_context(|| format!("listening on {}", args.addr))?;
    info!(addr = %args.addr, "waiting for server");
    let stream = accept_one(&listener)?;

    let report = run_client(stream, schema, &inputs, &pool)?;

    if report.found == expected {
        info!(found = report.found, "SUCCESS");
    } else {
        error!(found = report.found, expected, "FAILURE");
    }

    Ok(())
}

fn run_as_server(args: &Args, schema: &BucketSchema) -> Result<()> {
    let num_queries = if schema.is_cuckoo() { schema.cuckoo_slots as usize } else { args.num_queries()? };

    let databases = read_server_databases(&args.data_dir, schema).with_context(|| format!("reading server databases from {}", args.data_dir.display()))?;
    let pool = WorkerPool::new(schema.threads)?;

    let states = setup_server_states(schema, &databases, &SeedSource::from_os_rng(), &pool)?;
    drop(databases);

    let stream = connect(args.addr.as_str())?;
    let report = run_server(stream, &states, num_queries, &pool)?;

    info!(
        offline_sent = report.offline_sent,
        online_received = report.online_received,
        online_sent = report.online_sent,
        "session done"
    );

    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let schema = args.schema();
    schema.validate()?;

    if args.client { run_as_client(&args, &schema) } else { run_as_server(&args, &schema) }
}
