use std::{error::Error, net::TcpListener};

use bucketpir_client::{BucketSchema, ClientInputs, run_client};
use bucketpir_common::{net, workers::WorkerPool};

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

const HOST_IP: &str = "127.0.0.1";
const HOST_PORT: u16 = 8080;

// Same table as the server example.
const TABLE_SEED: u64 = 42;

fn main() -> Result<(), Box<dyn Error>> {
    let schema = BucketSchema {
        bucket_count: 64,
        bucket_size: 4,
        ..Default::default()
    };

    let mut table = vec![0u8; schema.db_bytes() as usize];
    ChaCha8Rng::seed_from_u64(TABLE_SEED).fill_bytes(&mut table);

    let entry_size = schema.entry_size as usize;
    let record = |bucket: u64, idx: u64| {
        let at = ((bucket * schema.bucket_size + idx) * schema.entry_size) as usize;
        table[at..at + entry_size].to_vec()
    };

    // Two tags stored in the queried buckets, one which is not.
    let inputs = ClientInputs {
        queries: vec![3, 17, 40],
        tags: vec![record(3, 1), record(40, 2), vec![0xff; entry_size]],
    };

    let host_address = format!("{}:{}", HOST_IP, HOST_PORT);
    let listener = TcpListener::bind(&host_address)?;
    println!("PIR client listening @ {}", &host_address);

    let stream = net::accept_one(&listener)?;
    println!("Connected to PIR server");

    let report = run_client(stream, &schema, &inputs, &WorkerPool::new(2)?)?;
    println!("Found {} of {} tags in the server's hash table", report.found, inputs.tags.len());
    println!(
        "Received {}B offline, sent {}B of queries, received {}B of answers",
        report.offline_received, report.online_sent, report.online_received
    );

    Ok(())
}
