use bucketpir_client::ClientState;
use bucketpir_common::{BucketSchema, pir::SeedSource};
use bucketpir_server::ServerState;
use divan;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

fn main() {
    divan::main();
}

fn generate_hash_table(rng: &mut ChaCha8Rng, schema: &BucketSchema) -> Vec<u8> {
    let mut table = vec![0u8; schema.db_bytes() as usize];
    rng.fill_bytes(&mut table);

    table
}

#[derive(Debug)]
struct DBConfig {
    bucket_count: u64,
    bucket_size: u64,
    buckets_per_col: u64,
}

impl DBConfig {
    fn schema(&self) -> BucketSchema {
        BucketSchema {
            bucket_count: self.bucket_count,
            bucket_size: self.bucket_size,
            buckets_per_col: self.buckets_per_col,
            ..Default::default()
        }
    }
}

const ARGS: &[DBConfig] = &[
    DBConfig {
        bucket_count: 1u64 << 10,
        bucket_size: 4,
        buckets_per_col: 1,
    },
    DBConfig {
        bucket_count: 1u64 << 12,
        bucket_size: 8,
        buckets_per_col: 2,
    },
];

#[divan::bench(args = ARGS, max_time = Duration::from_secs(300), skip_ext_time = true)]
fn server_setup(bencher: divan::Bencher, db_config: &DBConfig) {
    let mut rng = ChaCha8Rng::from_os_rng();

    let schema = db_config.schema();
    let table = generate_hash_table(&mut rng, &schema);
    let seeds = SeedSource::from_os_rng();

    bencher
        .with_inputs(|| table.clone())
        .bench_values(|table| ServerState::setup(divan::black_box(&schema), divan::black_box(&table), divan::black_box(&seeds)));
}

#[divan::bench(args = ARGS, max_time = Duration::from_secs(300), skip_ext_time = true)]
fn client_setup(bencher: divan::Bencher, db_config: &DBConfig) {
    let mut rng = ChaCha8Rng::from_os_rng();

    let schema = db_config.schema();
    let table = generate_hash_table(&mut rng, &schema);
    let server = ServerState::setup(&schema, &table, &SeedSource::from_os_rng()).unwrap();

    bencher.bench(|| ClientState::setup(divan::black_box(&schema), divan::black_box(server.offline_payload())));
}
