use bucketpir_common::{
    AnswerEncoding, BucketPIRError, BucketSchema,
    database::Database,
    matrix::{Matrix, checked_dim},
    modulus_switch,
    params::{ELEMENT_BYTE_LEN, ENTRY_BITS, Params, SEED_BYTE_LEN, select_params},
    pir::{self, SeedSource, SharedState},
};
use rand::Rng;
use tracing::debug;

/// Server side state of one bucketed database, i.e. of one PIR instance.
///
/// The database is kept squished, so answering a query multiplies the packed matrix directly.
pub struct ServerState {
    params: Params,
    bucket_size: u64,
    answer_encoding: AnswerEncoding,
    db: Database,
    offline_payload: Vec<u8>,
}

impl ServerState {
    /// Sets up the PIR server for one bucketed hash table.
    ///
    /// Steps:
    /// 1. Validate the schema and check that `db_bytes` holds exactly `schema.db_bytes()` bytes.
    /// 2. Search for parameters, such that every column holds whole groups of `buckets_per_col` buckets.
    /// 3. Encode every byte as one plaintext entry.
    /// 4. Sample a seed from `seeds`, expand the public matrix and compute the hint.
    /// 5. Serialize `seed || hint` as the offline payload.
    ///
    /// # Arguments
    ///
    /// * `schema` - Geometry of the hash table, with the bucket size of this database.
    /// * `db_bytes` - Flat hash table, `entry_size` bytes per record, absent records zero-padded.
    /// * `seeds` - Shared seed source, safe to use from many setups running at once.
    ///
    /// # Returns
    ///
    /// * `Result<ServerState, BucketPIRError>` - Server ready to send its offline payload and answer queries. Fails on
    ///   any configuration error.
    pub fn setup(schema: &BucketSchema, db_bytes: &[u8], seeds: &SeedSource) -> Result<ServerState, BucketPIRError> {
        schema.validate()?;

        let expected = schema.db_bytes() as usize;
        if db_bytes.len() != expected {
            return Err(BucketPIRError::DatabaseSizeMismatch {
                expected,
                actual: db_bytes.len(),
            });
        }

        let params = select_params(schema.db_entries(), schema.column_group_entries(), ENTRY_BITS, &schema.lwe)?;

        let values: Vec<u64> = db_bytes.iter().map(|&b| b as u64).collect();
        let mut db = Database::encode(&values, ENTRY_BITS, &params)?;

        let shared = SharedState::init(&params, seeds)?;
        let hint = pir::setup(&mut db, &shared, &params)?;

        let mut offline_payload = Vec::with_capacity(SEED_BYTE_LEN + hint.num_elems() * ELEMENT_BYTE_LEN);
        offline_payload.extend_from_slice(shared.seed());
        offline_payload.extend_from_slice(&hint.to_le_bytes());

        debug!(rows = params.l, cols = params.m, p = params.p, hint_bytes = offline_payload.len(), "bucket database ready");

        Ok(ServerState {
            params,
            bucket_size: schema.bucket_size,
            answer_encoding: schema.answer_encoding,
            db,
            offline_payload,
        })
    }

    #[inline(always)]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    #[inline(always)]
    pub const fn bucket_size(&self) -> u64 {
        self.bucket_size
    }

    #[inline(always)]
    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// Public matrix seed followed by the raw hint.
    #[inline(always)]
    pub fn offline_payload(&self) -> &[u8] {
        &self.offline_payload
    }

    /// Byte length of one incoming query.
    #[inline(always)]
    pub const fn query_len(&self) -> usize {
        self.params.query_size() as usize * ELEMENT_BYTE_LEN
    }

    /// Byte length of one outgoing answer.
    pub const fn answer_len(&self) -> usize {
        match self.answer_encoding {
            AnswerEncoding::Raw => self.params.l as usize * ELEMENT_BYTE_LEN,
            AnswerEncoding::ModulusSwitched => modulus_switch::switched_len(self.params.l as usize),
        }
    }

    /// Answers one serialized query vector.
    ///
    /// # Arguments
    ///
    /// * `query` - `query_size` little-endian 32 -bit words.
    /// * `rng` - Source of the randomized rounding, used only when answers are modulus switched.
    ///
    /// # Returns
    ///
    /// * `Result<Vec<u8>, BucketPIRError>` - `answer_len()` bytes. Fails if the query has the wrong length.
    pub fn respond<R: Rng>(&self, query: &[u8], rng: &mut R) -> Result<Vec<u8>, BucketPIRError> {
        if query.len() != self.query_len() {
            return Err(BucketPIRError::UnexpectedPayloadLength {
                what: "query",
                expected: self.query_len(),
                actual: query.len(),
            });
        }

        let query_vector = Matrix::from_le_bytes(query, checked_dim(self.params.query_size())?, 1)?;
        let answer = pir::answer(&self.db, &query_vector, &self.params)?;

        Ok(match self.answer_encoding {
            AnswerEncoding::Raw => answer.to_le_bytes(),
            AnswerEncoding::ModulusSwitched => modulus_switch::switch(&answer, self.params.logq, rng),
        })
    }
}
