#![cfg(test)]

use bucketpir_client::{AnswerEncoding, BLANK_QUERY, BucketSchema, ClientInputs, ClientState, run_client};
use bucketpir_common::{
    BucketPIRError,
    net::{accept_one, connect},
    pir::SeedSource,
    workers::WorkerPool,
};
use bucketpir_server::{BucketDatabase, ServerState, run_server, setup_server_states};

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::{net::TcpListener, thread};
use test_case::test_case;

/// Hash table whose records are random tags, with the last record of every bucket left as zero padding.
fn generate_hash_table(rng: &mut ChaCha8Rng, schema: &BucketSchema) -> Vec<u8> {
    let entry_size = schema.entry_size as usize;
    let bucket_size = schema.bucket_size as usize;

    let mut table = vec![0u8; schema.db_bytes() as usize];
    table.chunks_exact_mut(entry_size).enumerate().for_each(|(idx, record)| {
        if idx % bucket_size != bucket_size - 1 {
            rng.fill_bytes(record);
        }
    });

    table
}

fn record(schema: &BucketSchema, table: &[u8], bucket: u64, idx: u64) -> Vec<u8> {
    let entry_size = schema.entry_size as usize;
    let at = ((bucket * schema.bucket_size + idx) * schema.entry_size) as usize;

    table[at..at + entry_size].to_vec()
}

/// Runs the server on its own thread, dialing the listening client, and returns the client's intersection count.
fn run_over_loopback(schema: &BucketSchema, databases: Vec<BucketDatabase>, num_queries: usize, inputs: &ClientInputs) -> Result<u64, BucketPIRError> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    let server_schema = schema.clone();
    let server = thread::spawn(move || -> Result<(), BucketPIRError> {
        let pool = WorkerPool::new(server_schema.threads)?;
        let states = setup_server_states(&server_schema, &databases, &SeedSource::from_os_rng(), &pool)?;

        let stream = connect(addr)?;
        run_server(stream, &states, num_queries, &pool)?;

        Ok(())
    });

    let stream = accept_one(&listener)?;
    let report = run_client(stream, schema, inputs, &WorkerPool::new(schema.threads)?)?;

    server.join().expect("Server thread panicked")?;

    Ok(report.found)
}

#[test_case(1, AnswerEncoding::ModulusSwitched; "sequential, modulus switched answers")]
#[test_case(4, AnswerEncoding::ModulusSwitched; "parallel, modulus switched answers")]
#[test_case(3, AnswerEncoding::Raw; "parallel, raw answers")]
fn cuckoo_psi_over_tcp(threads: usize, answer_encoding: AnswerEncoding) {
    const CUCKOO_SLOTS: u64 = 4;

    let mut rng = ChaCha8Rng::from_os_rng();

    let schema = BucketSchema {
        bucket_count: 32,
        bucket_size: 4,
        buckets_per_col: 2,
        cuckoo_slots: CUCKOO_SLOTS,
        threads,
        answer_encoding,
        ..Default::default()
    };

    let tables: Vec<Vec<u8>> = (0..CUCKOO_SLOTS).map(|_| generate_hash_table(&mut rng, &schema)).collect();
    let databases = tables
        .iter()
        .map(|table| BucketDatabase {
            bucket_size: schema.bucket_size,
            bytes: table.clone(),
        })
        .collect();

    // Slot 0 and 1 hold a member, slot 2 a non-member, slot 3 holds no item at all.
    let mut non_member = vec![0u8; schema.entry_size as usize];
    rng.fill_bytes(&mut non_member);

    let inputs = ClientInputs {
        queries: vec![5, 30, 17, BLANK_QUERY],
        tags: vec![
            record(&schema, &tables[0], 5, 2),
            record(&schema, &tables[1], 30, 0),
            non_member,
            record(&schema, &tables[3], 0, 0),
        ],
    };

    let found = run_over_loopback(&schema, databases, 0, &inputs).unwrap();
    assert_eq!(found, 2);
}

#[test_case(1; "sequential")]
#[test_case(2; "parallel")]
fn single_database_psi_over_tcp(threads: usize) {
    let mut rng = ChaCha8Rng::from_os_rng();

    let schema = BucketSchema {
        bucket_count: 64,
        bucket_size: 8,
        threads,
        ..Default::default()
    };

    let table = generate_hash_table(&mut rng, &schema);
    let databases = vec![BucketDatabase {
        bucket_size: schema.bucket_size,
        bytes: table.clone(),
    }];

    // Bucket 9 is queried twice, its records must still count once.
    let inputs = ClientInputs {
        queries: vec![9, 40, 9, BLANK_QUERY],
        tags: vec![
            record(&schema, &table, 9, 0),
            record(&schema, &table, 9, 6),
            record(&schema, &table, 40, 3),
            record(&schema, &table, 41, 3),
        ],
    };

    let found = run_over_loopback(&schema, databases, inputs.queries.len(), &inputs).unwrap();

    // Bucket 41 may share a column with bucket 40, in which case its record is recovered too.
    let client = ClientState::setup(
        &schema,
        &vec![0u8; ClientState::offline_payload_len(&ClientState::derive_params(&schema).unwrap().0)],
    )
    .unwrap();
    let shares_column = client.translate(40).unwrap() == client.translate(41).unwrap();

    assert_eq!(found, if shares_column { 4 } else { 3 });
}

#[test]
fn in_memory_protocol_recovers_every_bucket() {
    let mut rng = ChaCha8Rng::from_os_rng();

    let schema = BucketSchema {
        bucket_count: 128,
        bucket_size: 2,
        buckets_per_col: 4,
        ..Default::default()
    };
    let table = generate_hash_table(&mut rng, &schema);

    let server = ServerState::setup(&schema, &table, &SeedSource::from_os_rng()).unwrap();
    let client = ClientState::setup(&schema, server.offline_payload()).unwrap();

    let bucket_bytes = (schema.bucket_size * schema.entry_size) as usize;
    let per_column = client.buckets_in_column();
    assert_eq!(per_column % schema.buckets_per_col, 0);

    for column in 0..client.params().m {
        let query = client.query(column, &mut rng).unwrap();
        let answer = server.respond(&query.to_bytes(), &mut rng).unwrap();
        let recovered = client.recover(&query, &answer).unwrap();

        let first_bucket = column * per_column;
        for bucket in first_bucket..(first_bucket + per_column).min(schema.bucket_count) {
            let offset = ((bucket - first_bucket) as usize) * bucket_bytes;
            let expected = (bucket as usize) * bucket_bytes;

            assert_eq!(client.translate(bucket).unwrap(), column);
            assert_eq!(recovered[offset..offset + bucket_bytes], table[expected..expected + bucket_bytes]);
        }
    }
}

#[test]
fn mismatched_bucket_size_is_detected() {
    let mut rng = ChaCha8Rng::from_os_rng();

    let schema = BucketSchema {
        bucket_count: 16,
        bucket_size: 4,
        ..Default::default()
    };
    let table = generate_hash_table(&mut rng, &schema);

    let server = ServerState::setup(&schema, &table, &SeedSource::from_os_rng()).unwrap();

    // A client assuming twice the bucket size expects a different payload length.
    let res = ClientState::setup(&schema.with_bucket_size(8), server.offline_payload());
    assert!(matches!(res, Err(BucketPIRError::UnexpectedPayloadLength { .. })));
}
