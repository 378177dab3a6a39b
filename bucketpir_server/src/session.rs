use crate::server::ServerState;
use bucketpir_common::{
    BucketPIRError, BucketSchema,
    net::{self, MeteredStream},
    pir::SeedSource,
    serialization::{BUCKET_SIZE_FIELD, read_database_file, server_database_path},
    workers::WorkerPool,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::{
    io::{Read, Write},
    path::Path,
    time::Instant,
};
use tracing::info;

const BYTES_PER_MB: f64 = 1_000_000.0;

/// One server database as read from disk.
#[derive(Clone, Debug)]
pub struct BucketDatabase {
    /// Records per bucket, as announced by the file's metadata.
    pub bucket_size: u64,
    pub bytes: Vec<u8>,
}

/// Traffic of one completed server session, in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServerReport {
    pub offline_sent: u64,
    pub online_received: u64,
    pub online_sent: u64,
}

/// Reads every database the schema asks for, from `<dir>/server.edb` or, with cuckoo slots, `<dir>/<slot>/server.edb`.
pub fn read_server_databases(dir: &Path, schema: &BucketSchema) -> Result<Vec<BucketDatabase>, BucketPIRError> {
    let slots: Vec<Option<usize>> = if schema.is_cuckoo() {
        (0..schema.cuckoo_slots as usize).map(Some).collect()
    } else {
        vec![None]
    };

    slots
        .into_iter()
        .map(|slot| {
            let (metadata, bytes) = read_database_file(&server_database_path(dir, slot), &[BUCKET_SIZE_FIELD])?;
            let bucket_size = metadata
                .get(BUCKET_SIZE_FIELD)
                .copied()
                .ok_or(BucketPIRError::MissingDatabaseMetadata(BUCKET_SIZE_FIELD))?;

            let expected = schema.with_bucket_size(bucket_size).db_bytes() as usize;
            if bytes.len() != expected {
                return Err(BucketPIRError::DatabaseSizeMismatch {
                    expected,
                    actual: bytes.len(),
                });
            }

            Ok(BucketDatabase { bucket_size, bytes })
        })
        .collect()
}

/// Sets up one server state per database, spreading setups over the worker pool.
pub fn setup_server_states(schema: &BucketSchema, databases: &[BucketDatabase], seeds: &SeedSource, pool: &WorkerPool) -> Result<Vec<ServerState>, BucketPIRError> {
    let start = Instant::now();

    let states = pool.run(databases, |_, db| ServerState::setup(&schema.with_bucket_size(db.bucket_size), &db.bytes, seeds))?;

    for (slot, state) in states.iter().enumerate() {
        let params = state.params();
        info!(
            slot,
            rows = params.l,
            cols = params.m,
            p = params.p,
            packed_db_mb = params.packed_db_size_mb(),
            "database dimensions"
        );
    }
    info!(elapsed = ?start.elapsed(), "pir offline");

    Ok(states)
}

/// Runs the server side of one session over `stream`.
///
/// Offline, every state's bucket size and offline payload are sent, bracketed by the server's and then the client's
/// ready byte. Online, all requests of the round are read, answered on the worker pool, and all answers are written
/// back in request order.
///
/// # Arguments
///
/// * `stream` - Byte stream connected to the client.
/// * `states` - One state per cuckoo slot, or a single state.
/// * `num_queries` - Requests expected in the online round when a single database is served. With cuckoo slots,
///   exactly one request per slot is expected.
/// * `pool` - Worker pool answering the requests.
pub fn run_server<S: Read + Write>(stream: S, states: &[ServerState], num_queries: usize, pool: &WorkerPool) -> Result<ServerReport, BucketPIRError> {
    if states.is_empty() {
        return Err(BucketPIRError::ZeroValuedSchemaField("cuckoo_slots"));
    }

    let mut stream = MeteredStream::new(stream);

    // Offline
    net::write_ready(&mut stream)?;
    for state in states {
        net::write_u64(&mut stream, state.bucket_size())?;
        net::write_chunked(&mut stream, state.offline_payload())?;
    }

    let offline_sent = stream.sent();
    info!(hint_comm_mb = offline_sent as f64 / BYTES_PER_MB, "offline payload sent");

    net::read_ready(&mut stream)?;

    // Online
    let start = Instant::now();

    let targets: Vec<&ServerState> = if states.len() == 1 {
        vec![&states[0]; num_queries]
    } else {
        states.iter().collect()
    };

    let received_before = stream.received();
    let requests = targets
        .iter()
        .map(|state| net::read_chunked(&mut stream, state.query_len()))
        .collect::<Result<Vec<_>, _>>()?;
    let online_received = stream.received() - received_before;

    let comp_start = Instant::now();
    let responses = pool.run(&requests, |idx, request| {
        let mut rng = ChaCha8Rng::from_os_rng();
        targets[idx].respond(request, &mut rng)
    })?;
    info!(elapsed = ?comp_start.elapsed(), "online comp");

    for response in &responses {
        net::write_chunked(&mut stream, response)?;
    }

    let report = ServerReport {
        offline_sent,
        online_received,
        online_sent: stream.sent() - offline_sent,
    };

    info!(
        elapsed = ?start.elapsed(),
        upload_mb = report.online_received as f64 / BYTES_PER_MB,
        download_mb = report.online_sent as f64 / BYTES_PER_MB,
        "pir online"
    );

    Ok(report)
}
