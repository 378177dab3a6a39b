use std::error::Error;

use bucketpir_common::{net, pir::SeedSource, workers::WorkerPool};
use bucketpir_server::{BucketDatabase, BucketSchema, run_server, setup_server_states};

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

const CLIENT_IP: &str = "127.0.0.1";
const CLIENT_PORT: u16 = 8080;

// Shared with the client example, so that it knows some of the records.
const TABLE_SEED: u64 = 42;
const NUM_QUERIES: usize = 3;

fn main() -> Result<(), Box<dyn Error>> {
    let schema = BucketSchema {
        bucket_count: 64,
        bucket_size: 4,
        ..Default::default()
    };

    let mut table = vec![0u8; schema.db_bytes() as usize];
    ChaCha8Rng::seed_from_u64(TABLE_SEED).fill_bytes(&mut table);

    let databases = vec![BucketDatabase {
        bucket_size: schema.bucket_size,
        bytes: table,
    }];

    let pool = WorkerPool::new(2)?;
    let states = setup_server_states(&schema, &databases, &SeedSource::from_os_rng(), &pool)?;
    println!("PIR server ready, {} x {} database", states[0].params().l, states[0].params().m);

    let client_address = format!("{}:{}", CLIENT_IP, CLIENT_PORT);
    let stream = net::connect(client_address.as_str())?;
    println!("Connected to PIR client @ {}", &client_address);

    let report = run_server(stream, &states, NUM_QUERIES, &pool)?;
    println!(
        "Sent {}B offline, received {}B of queries, sent {}B of answers",
        report.offline_sent, report.online_received, report.online_sent
    );

    Ok(())
}
