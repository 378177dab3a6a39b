use crate::{
    client::ClientState,
    intersection::{count_cuckoo_matches, count_matches},
};
use bucketpir_common::{
    BLANK_QUERY, BucketPIRError, BucketSchema,
    net::{self, MeteredStream},
    serialization::{CLIENT_QUERIES_FILE, CLIENT_TAGS_FILE, read_query_file, read_tag_file},
    workers::WorkerPool,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::{
    collections::HashSet,
    io::{Read, Write},
    path::Path,
    time::Instant,
};
use tracing::{debug, info};

const BYTES_PER_MB: f64 = 1_000_000.0;

/// Bucket hashes to look up, and the OPRF tags recovered records are compared against.
#[derive(Clone, Debug, Default)]
pub struct ClientInputs {
    pub queries: Vec<u64>,
    pub tags: Vec<Vec<u8>>,
}

/// Outcome of one completed client session. Traffic is counted in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientReport {
    /// Recovered records matching a tag.
    pub found: u64,
    pub offline_received: u64,
    pub online_sent: u64,
    pub online_received: u64,
}

/// One request of the online round.
#[derive(Clone, Copy, Debug)]
struct Request {
    slot: usize,
    column: u64,
    /// Whether the answer must be recovered, false for blank queries and repeated columns.
    recover: bool,
}

/// Reads `<dir>/queries.db` and `<dir>/client.edb`.
pub fn read_client_inputs(dir: &Path, schema: &BucketSchema) -> Result<ClientInputs, BucketPIRError> {
    Ok(ClientInputs {
        queries: read_query_file(&dir.join(CLIENT_QUERIES_FILE))?,
        tags: read_tag_file(&dir.join(CLIENT_TAGS_FILE), schema.entry_size)?,
    })
}

/// Plans the online round. Blank queries ask for column 0 and are never recovered. A column already asked for in the
/// same database is asked for again, so traffic stays per query, but recovered only once.
fn plan_requests(states: &[ClientState], queries: &[u64], cuckoo: bool) -> Result<Vec<Request>, BucketPIRError> {
    let mut seen = HashSet::new();

    queries
        .iter()
        .enumerate()
        .map(|(idx, &hash)| {
            let slot = if cuckoo { idx } else { 0 };

            if hash == BLANK_QUERY {
                return Ok(Request { slot, column: 0, recover: false });
            }

            let column = states[slot].translate(hash)?;
            Ok(Request {
                slot,
                column,
                recover: seen.insert((slot, column)),
            })
        })
        .collect()
}

/// Runs the client side of one session over `stream`, returning the intersection count.
///
/// Offline, the client waits for the server's ready byte, then reads one bucket size and offline payload per
/// database, and finally signals it is ready for the online round. Online, all queries are written before any answer
/// is read. Query generation and recovery are spread over the worker pool.
///
/// # Arguments
///
/// * `stream` - Byte stream connected to the server.
/// * `schema` - Geometry shared with the server. Bucket sizes are taken from the server.
/// * `inputs` - Bucket hashes and OPRF tags, exactly one of each per cuckoo slot in cuckoo mode.
/// * `pool` - Worker pool for per-bucket work.
pub fn run_client<S: Read + Write>(stream: S, schema: &BucketSchema, inputs: &ClientInputs, pool: &WorkerPool) -> Result<ClientReport, BucketPIRError> {
    schema.validate()?;

    let cuckoo = schema.is_cuckoo();
    if cuckoo && inputs.queries.len() as u64 != schema.cuckoo_slots {
        return Err(BucketPIRError::QueryCountMismatch {
            expected: schema.cuckoo_slots,
            actual: inputs.queries.len() as u64,
        });
    }
    if cuckoo && inputs.tags.len() as u64 != schema.cuckoo_slots {
        return Err(BucketPIRError::TagCountMismatch {
            expected: schema.cuckoo_slots,
            actual: inputs.tags.len() as u64,
        });
    }

    let mut stream = MeteredStream::new(stream);

    // Offline
    net::read_ready(&mut stream)?;
    let start = Instant::now();
    let offline_before = stream.received();

    let num_databases = if cuckoo { schema.cuckoo_slots as usize } else { 1 };

    let mut offline = Vec::with_capacity(num_databases);
    for slot in 0..num_databases {
        let bucket_size = net::read_u64(&mut stream)?;
        let slot_schema = schema.with_bucket_size(bucket_size);

        let (params, _) = ClientState::derive_params(&slot_schema)?;
        let payload = net::read_chunked(&mut stream, ClientState::offline_payload_len(&params))?;
        debug!(slot, bucket_size, rows = params.l, cols = params.m, p = params.p, "offline payload received");

        offline.push((slot_schema, payload));
    }

    let states = pool.run(&offline, |_, (slot_schema, payload)| ClientState::setup(slot_schema, payload))?;
    drop(offline);

    let offline_received = stream.received() - offline_before;
    info!(elapsed = ?start.elapsed(), offline_comm_mb = offline_received as f64 / BYTES_PER_MB, "pir offline");

    net::write_ready(&mut stream)?;

    // Online
    let start = Instant::now();
    let requests = plan_requests(&states, &inputs.queries, cuckoo)?;

    let queries = pool.run(&requests, |_, request| {
        let mut rng = ChaCha8Rng::from_os_rng();
        states[request.slot].query(request.column, &mut rng)
    })?;

    let sent_before = stream.sent();
    for query in &queries {
        net::write_chunked(&mut stream, &query.to_bytes())?;
    }
    let online_sent = stream.sent() - sent_before;

    let received_before = stream.received();
    let answers = requests
        .iter()
        .map(|request| net::read_chunked(&mut stream, states[request.slot].answer_len()))
        .collect::<Result<Vec<_>, _>>()?;
    let online_received = stream.received() - received_before;

    let recover_start = Instant::now();
    let columns = pool.run(&requests, |idx, request| {
        if request.recover {
            states[request.slot].recover(&queries[idx], &answers[idx]).map(Some)
        } else {
            Ok(None)
        }
    })?;
    info!(elapsed = ?recover_start.elapsed(), "pir recover");

    let entry_size = schema.entry_size as usize;
    let found = if cuckoo {
        let columns: Vec<Vec<u8>> = columns.into_iter().map(Option::unwrap_or_default).collect();
        count_cuckoo_matches(&columns, &inputs.tags, entry_size)
    } else {
        let columns: Vec<Vec<u8>> = columns.into_iter().flatten().collect();
        count_matches(&columns, &inputs.tags, entry_size)
    };

    info!(
        elapsed = ?start.elapsed(),
        upload_mb = online_sent as f64 / BYTES_PER_MB,
        download_mb = online_received as f64 / BYTES_PER_MB,
        found,
        "pir online"
    );

    Ok(ClientReport {
        found,
        offline_received,
        online_sent,
        online_received,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use bucketpir_common::{pir::SeedSource, serialization::write_query_file};
    use bucketpir_server::ServerState;
    use std::fs;
    use test_case::test_case;

    fn states(schema: &BucketSchema, slots: usize) -> Vec<ClientState> {
        (0..slots)
            .map(|_| {
                let server = ServerState::setup(schema, &vec![0u8; schema.db_bytes() as usize], &SeedSource::default()).unwrap();
                ClientState::setup(schema, server.offline_payload()).unwrap()
            })
            .collect()
    }

    fn schema() -> BucketSchema {
        BucketSchema {
            bucket_count: 16,
            bucket_size: 4,
            ..Default::default()
        }
    }

    #[test]
    fn repeated_columns_are_recovered_once() {
        let states = states(&schema(), 1);
        let plan = plan_requests(&states, &[3, 5, 3, BLANK_QUERY, 5, 0], false).unwrap();

        let recovered: Vec<(u64, bool)> = plan.iter().map(|r| (r.column, r.recover)).collect();
        assert_eq!(recovered, vec![(3, true), (5, true), (3, false), (0, false), (5, false), (0, true)]);
    }

    #[test]
    fn cuckoo_slots_never_share_a_column() {
        let states = states(&schema(), 2);
        let plan = plan_requests(&states, &[7, 7], true).unwrap();

        assert!(plan.iter().all(|r| r.recover));
        assert_eq!((plan[0].slot, plan[1].slot), (0, 1));
    }

    #[test]
    fn out_of_range_hash_is_fatal() {
        let states = states(&schema(), 1);
        assert!(matches!(plan_requests(&states, &[16], false), Err(BucketPIRError::ColumnOutOfRange { .. })));
    }

    #[test]
    fn client_inputs_are_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        write_query_file(&dir.path().join(CLIENT_QUERIES_FILE), &[1, 2, BLANK_QUERY]).unwrap();
        fs::write(dir.path().join(CLIENT_TAGS_FILE), [0xabu8; 30]).unwrap();

        let inputs = read_client_inputs(dir.path(), &schema()).unwrap();
        assert_eq!(inputs.queries, vec![1, 2, BLANK_QUERY]);
        assert_eq!(inputs.tags.len(), 3);
    }

    #[test]
    fn cuckoo_mode_needs_one_query_per_slot() {
        let schema = BucketSchema { cuckoo_slots: 3, ..schema() };
        let inputs = ClientInputs {
            queries: vec![1, 2],
            tags: vec![],
        };

        let res = run_client(std::io::Cursor::new(Vec::new()), &schema, &inputs, &WorkerPool::new(1).unwrap());
        assert!(matches!(res, Err(BucketPIRError::QueryCountMismatch { expected: 3, actual: 2 })));
    }

    #[test_case(2 => matches Err(BucketPIRError::TagCountMismatch { expected: 3, actual: 2 }); "missing tag")]
    #[test_case(4 => matches Err(BucketPIRError::TagCountMismatch { expected: 3, actual: 4 }); "extra tag")]
    fn cuckoo_mode_needs_one_tag_per_slot(num_tags: usize) -> Result<ClientReport, BucketPIRError> {
        let schema = BucketSchema { cuckoo_slots: 3, ..schema() };
        let inputs = ClientInputs {
            queries: vec![1, 2, 3],
            tags: vec![vec![0xab; schema.entry_size as usize]; num_tags],
        };

        run_client(std::io::Cursor::new(Vec::new()), &schema, &inputs, &WorkerPool::new(1).unwrap())
    }
}
