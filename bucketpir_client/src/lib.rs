//! Client side of BucketPIR, a private set intersection protocol built on single-server, SimplePIR style
//! **P**rivate **I**nformation **R**etrieval over a bucketed hash table.
//!
//! The client holds bucket hashes of its set members and the OPRF tags of those members. It retrieves whole database
//! columns holding the buckets it is interested in, without the server learning which ones, and counts recovered
//! records matching its tags.
//!
//! ## Usage
//!
//! [`ClientState`] handles a single database and is independent of any transport. [`run_client`] drives a complete
//! session over any blocking byte stream, typically a `TcpStream`:
//!
//! ```rust
//! use bucketpir_client::{BucketSchema, ClientState};
//!
//! use rand::prelude::*;
//! use rand_chacha::ChaCha8Rng;
//!
//! let schema = BucketSchema {
//!     bucket_count: 16,
//!     bucket_size: 4,
//!     ..Default::default()
//! };
//!
//! // Assume this is the offline payload, i.e. seed and hint, received from the server.
//! let (params, _) = ClientState::derive_params(&schema).expect("Unsupported bucket schema");
//! let payload = vec![0u8; ClientState::offline_payload_len(&params)];
//!
//! match ClientState::setup(&schema, &payload) {
//!     Ok(client) => {
//!         let mut rng = ChaCha8Rng::from_os_rng();
//!
//!         let column = client.translate(5).expect("Bucket hash out of range");
//!         if let Ok(query) = client.query(column, &mut rng) {
//!             // Send `query.to_bytes()` to the server, then recover the column from its answer.
//!             let answer = vec![0u8; client.answer_len()];
//!             if let Ok(records) = client.recover(&query, &answer) {
//!                 println!("Recovered {} bytes", records.len());
//!             }
//!         }
//!     }
//!     Err(err) => {
//!         println!("Client setup failed: {}", err);
//!     }
//! };
//! ```

mod client;
mod intersection;
mod session;

pub use bucketpir_common::{AnswerEncoding, BLANK_QUERY, BucketPIRError, BucketSchema, LweConfig};
pub use client::{ClientState, Query};
pub use intersection::{count_cuckoo_matches, count_matches};
pub use session::{ClientInputs, ClientReport, read_client_inputs, run_client};
