use bucketpir_client::ClientState;
use bucketpir_common::{AnswerEncoding, BucketSchema, pir::SeedSource};
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
    answer_encoding: AnswerEncoding,
}

const ARGS: &[DBConfig] = &[
    DBConfig {
        bucket_count: 1u64 << 12,
        bucket_size: 8,
        answer_encoding: AnswerEncoding::Raw,
    },
    DBConfig {
        bucket_count: 1u64 << 12,
        bucket_size: 8,
        answer_encoding: AnswerEncoding::ModulusSwitched,
    },
];

fn setup(rng: &mut ChaCha8Rng, db_config: &DBConfig) -> (ServerState, ClientState) {
    let schema = BucketSchema {
        bucket_count: db_config.bucket_count,
        bucket_size: db_config.bucket_size,
        answer_encoding: db_config.answer_encoding,
        ..Default::default()
    };

    let table = generate_hash_table(rng, &schema);
    let server = ServerState::setup(&schema, &table, &SeedSource::from_os_rng()).unwrap();
    let client = ClientState::setup(&schema, server.offline_payload()).unwrap();

    (server, client)
}

#[divan::bench(args = ARGS, max_time = Duration::from_secs(300), skip_ext_time = true)]
fn client_query(bencher: divan::Bencher, db_config: &DBConfig) {
    let mut rng = ChaCha8Rng::from_os_rng();
    let (_, client) = setup(&mut rng, db_config);

    let column = client.translate(db_config.bucket_count - 1).unwrap();

    bencher.bench_local(|| client.query(divan::black_box(column), &mut rng));
}

#[divan::bench(args = ARGS, max_time = Duration::from_secs(300), skip_ext_time = true)]
fn server_respond(bencher: divan::Bencher, db_config: &DBConfig) {
    let mut rng = ChaCha8Rng::from_os_rng();
    let (server, client) = setup(&mut rng, db_config);

    let column = client.translate(db_config.bucket_count - 1).unwrap();
    let query_bytes = client.query(column, &mut rng).unwrap().to_bytes();

    bencher.bench_local(|| divan::black_box(&server).respond(divan::black_box(&query_bytes), &mut rng));
}

#[divan::bench(args = ARGS, max_time = Duration::from_secs(300), skip_ext_time = true)]
fn client_recover(bencher: divan::Bencher, db_config: &DBConfig) {
    let mut rng = ChaCha8Rng::from_os_rng();
    let (server, client) = setup(&mut rng, db_config);

    let column = client.translate(db_config.bucket_count - 1).unwrap();
    let query = client.query(column, &mut rng).unwrap();
    let answer = server.respond(&query.to_bytes(), &mut rng).unwrap();

    bencher.bench(|| client.recover(divan::black_box(&query), divan::black_box(&answer)));
}
