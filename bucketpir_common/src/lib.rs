//! Common building blocks of BucketPIR, a private set intersection protocol built on single-server, SimplePIR style
//! **P**rivate **I**nformation **R**etrieval over a bucketed hash table.
//!
//! This crate hosts everything both peers agree on: LWE matrices over Z_(2^32), the plaintext modulus search, the
//! database codec, the Init/Setup/Query/Answer/Recover protocol steps, the modulus switching codec used for answers,
//! the bucket schema, file and wire formats, and the worker pool driving per-bucket fan-out.
//!
//! You'll typically use it through `bucketpir_server` and `bucketpir_client`, which drive complete sessions over a
//! byte stream. The protocol steps can also be run directly:
//!
//! ```rust
//! use bucketpir_common::{
//!     database::Database,
//!     params::select_params,
//!     pir::{self, SeedSource, SharedState},
//!     schema::LweConfig,
//! };
//! use rand::prelude::*;
//! use rand_chacha::ChaCha8Rng;
//!
//! let values: Vec<u64> = (0..32).collect();
//! let params = select_params(values.len() as u64, 4, 8, &LweConfig::default()).unwrap();
//!
//! let mut db = Database::encode(&values, 8, &params).unwrap();
//! let shared = SharedState::init(&params, &SeedSource::from_os_rng()).unwrap();
//! let hint = pir::setup(&mut db, &shared, &params).unwrap();
//!
//! let mut rng = ChaCha8Rng::from_os_rng();
//! let (secret, query) = pir::query(2, &shared, &params, &mut rng).unwrap();
//! let answer = pir::answer(&db, &query, &params).unwrap();
//!
//! let column = pir::recover_column(&hint, &query, &answer, &secret, &params, db.info()).unwrap();
//! assert_eq!(column, vec![8, 9, 10, 11]);
//! ```

pub mod database;
pub mod error;
pub mod matrix;
pub mod modulus_switch;
pub mod net;
pub mod params;
pub mod pir;
pub mod schema;
pub mod serialization;
pub mod workers;

pub use error::{BucketPIRError, ErrorKind};
pub use params::{BLANK_QUERY, SEED_BYTE_LEN};
pub use schema::{AnswerEncoding, BucketSchema, LweConfig};
