//! Server side of BucketPIR, a private set intersection protocol built on single-server, SimplePIR style
//! **P**rivate **I**nformation **R**etrieval over a bucketed hash table.
//!
//! The server holds one or more hash tables of OPRF tags, one per cuckoo slot. For every table it picks LWE parameters,
//! encodes the table as a database matrix and publishes a hint, offline. Online, it answers encrypted column queries
//! without learning which bucket a client asked for.
//!
//! ## Usage
//!
//! [`ServerState`] handles a single table and is independent of any transport. [`run_server`] drives a complete
//! session over any blocking byte stream, typically a `TcpStream`:
//!
//! ```rust
//! use bucketpir_server::{BucketSchema, ServerState};
//! use bucketpir_common::pir::SeedSource;
//!
//! use rand::prelude::*;
//! use rand_chacha::ChaCha8Rng;
//!
//! let schema = BucketSchema {
//!     bucket_count: 16,
//!     bucket_size: 4,
//!     ..Default::default()
//! };
//! let hash_table = vec![0u8; schema.db_bytes() as usize];
//!
//! let server = ServerState::setup(&schema, &hash_table, &SeedSource::from_os_rng()).expect("Server setup failed");
//!
//! // Send `server.offline_payload()` to the client, then answer its queries.
//! let query = vec![0u8; server.query_len()];
//!
//! let mut rng = ChaCha8Rng::from_os_rng();
//! if let Ok(answer) = server.respond(&query, &mut rng) {
//!     println!("Generated answer of size: {} bytes", answer.len());
//! }
//! ```

mod server;
mod session;

pub use bucketpir_common::{AnswerEncoding, BucketPIRError, BucketSchema, LweConfig, SEED_BYTE_LEN};
pub use server::ServerState;
pub use session::{BucketDatabase, ServerReport, read_server_databases, run_server, setup_server_states};
