use bucketpir_common::{
    AnswerEncoding, BucketPIRError, BucketSchema,
    database::DatabaseInfo,
    matrix::{Matrix, checked_dim},
    modulus_switch,
    params::{ELEMENT_BYTE_LEN, ENTRY_BITS, Params, SEED_BYTE_LEN, select_params},
    pir::{self, Secret, SharedState},
};
use rand::Rng;

/// Encrypted query for one database column, along with what the client needs to recover its answer.
pub struct Query {
    column: u64,
    secret: Secret,
    vector: Matrix,
}

impl Query {
    #[inline(always)]
    pub const fn column(&self) -> u64 {
        self.column
    }

    /// Query vector as sent on the wire, little-endian 32 -bit words.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.vector.to_le_bytes()
    }
}

/// Client side state of one bucketed database, i.e. of one PIR instance.
pub struct ClientState {
    params: Params,
    info: DatabaseInfo,
    schema: BucketSchema,
    shared: SharedState,
    hint: Matrix,
}

impl ClientState {
    /// Derives the parameters the server picked for a database of `schema`'s geometry. Both peers run the same
    /// deterministic search, so nothing but the bucket size travels on the wire.
    pub fn derive_params(schema: &BucketSchema) -> Result<(Params, DatabaseInfo), BucketPIRError> {
        schema.validate()?;

        let params = select_params(schema.db_entries(), schema.column_group_entries(), ENTRY_BITS, &schema.lwe)?;
        let info = DatabaseInfo::new(schema.db_entries(), ENTRY_BITS, &params)?;

        Ok((params, info))
    }

    /// Byte length of the offline payload sent for a database with `params`.
    #[inline(always)]
    pub const fn offline_payload_len(params: &Params) -> usize {
        SEED_BYTE_LEN + params.l as usize * params.n as usize * ELEMENT_BYTE_LEN
    }

    /// Sets up the client from the server's offline payload.
    ///
    /// # Arguments
    ///
    /// * `schema` - Geometry of the hash table, with the bucket size announced by the server.
    /// * `payload` - Public matrix seed followed by the raw hint.
    ///
    /// # Returns
    ///
    /// * `Result<ClientState, BucketPIRError>` - Client ready to query this database. Fails if the payload doesn't have
    ///   the length implied by the parameters.
    pub fn setup(schema: &BucketSchema, payload: &[u8]) -> Result<ClientState, BucketPIRError> {
        let (params, info) = Self::derive_params(schema)?;

        let expected = Self::offline_payload_len(&params);
        if payload.len() != expected {
            return Err(BucketPIRError::UnexpectedPayloadLength {
                what: "offline payload",
                expected,
                actual: payload.len(),
            });
        }

        let (seed, hint_bytes) = payload.split_at(SEED_BYTE_LEN);

        let mut seed_bytes = [0u8; SEED_BYTE_LEN];
        seed_bytes.copy_from_slice(seed);

        let shared = SharedState::from_seed(&params, seed_bytes)?;
        let hint = Matrix::from_le_bytes(hint_bytes, checked_dim(params.l)?, params.n)?;

        Ok(ClientState {
            params,
            info,
            schema: schema.clone(),
            shared,
            hint,
        })
    }

    #[inline(always)]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    #[inline(always)]
    pub const fn info(&self) -> &DatabaseInfo {
        &self.info
    }

    /// Number of whole buckets stored in one database column.
    pub const fn buckets_in_column(&self) -> u64 {
        self.info.entries_per_column(self.params.l) / (self.schema.bucket_size * self.schema.entry_size)
    }

    /// Maps a bucket hash to the database column holding that bucket.
    pub fn translate(&self, hash: u64) -> Result<u64, BucketPIRError> {
        let column = hash / self.buckets_in_column();
        if column >= self.params.m {
            return Err(BucketPIRError::ColumnOutOfRange { column, cols: self.params.m });
        }

        Ok(column)
    }

    /// Byte length of one answer from the server.
    pub const fn answer_len(&self) -> usize {
        match self.schema.answer_encoding {
            AnswerEncoding::Raw => self.params.l as usize * ELEMENT_BYTE_LEN,
            AnswerEncoding::ModulusSwitched => modulus_switch::switched_len(self.params.l as usize),
        }
    }

    pub fn query<R: Rng>(&self, column: u64, rng: &mut R) -> Result<Query, BucketPIRError> {
        let (secret, vector) = pir::query(column, &self.shared, &self.params, rng)?;
        Ok(Query { column, secret, vector })
    }

    /// Recovers every entry of the queried column from the server's answer.
    ///
    /// # Returns
    ///
    /// * `Result<Vec<u8>, BucketPIRError>` - Column content, one byte per entry, i.e. whole `entry_size` records.
    ///   Fails if the answer has the wrong length.
    pub fn recover(&self, query: &Query, answer: &[u8]) -> Result<Vec<u8>, BucketPIRError> {
        if answer.len() != self.answer_len() {
            return Err(BucketPIRError::UnexpectedPayloadLength {
                what: "answer",
                expected: self.answer_len(),
                actual: answer.len(),
            });
        }

        let rows = checked_dim(self.params.l)?;
        let answer = match self.schema.answer_encoding {
            AnswerEncoding::Raw => Matrix::from_le_bytes(answer, rows, 1)?,
            AnswerEncoding::ModulusSwitched => modulus_switch::switch_back(answer, rows, 1, self.params.logq)?,
        };

        let entries = pir::recover_column(&self.hint, &query.vector, &answer, &query.secret, &self.params, &self.info)?;

        // Entries are ENTRY_BITS wide.
        Ok(entries.into_iter().map(|v| v as u8).collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bucketpir_common::pir::SeedSource;
    use bucketpir_server::ServerState;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;
    use test_case::test_case;

    fn schema(buckets_per_col: u64, answer_encoding: AnswerEncoding) -> BucketSchema {
        BucketSchema {
            bucket_count: 16,
            bucket_size: 4,
            buckets_per_col,
            answer_encoding,
            ..Default::default()
        }
    }

    fn setup(schema: &BucketSchema) -> (Vec<u8>, ServerState, ClientState) {
        let mut rng = ChaCha8Rng::from_os_rng();
        let table: Vec<u8> = (0..schema.db_bytes()).map(|_| rng.random()).collect();

        let server = ServerState::setup(schema, &table, &SeedSource::default()).unwrap();
        let client = ClientState::setup(schema, server.offline_payload()).unwrap();

        (table, server, client)
    }

    #[test_case(AnswerEncoding::Raw; "raw answers")]
    #[test_case(AnswerEncoding::ModulusSwitched; "modulus switched answers")]
    fn every_bucket_can_be_retrieved(encoding: AnswerEncoding) {
        let schema = schema(1, encoding);
        let (table, server, client) = setup(&schema);
        let mut rng = ChaCha8Rng::from_os_rng();

        let bucket_bytes = (schema.bucket_size * schema.entry_size) as usize;
        let column_bytes = client.buckets_in_column() as usize * bucket_bytes;

        for hash in 0..schema.bucket_count {
            let column = client.translate(hash).unwrap();
            let query = client.query(column, &mut rng).unwrap();

            let answer = server.respond(&query.to_bytes(), &mut rng).unwrap();
            let recovered = client.recover(&query, &answer).unwrap();
            assert_eq!(recovered.len(), client.info().entries_per_column(client.params().l) as usize);

            let start = column as usize * column_bytes;
            let bucket_start = hash as usize * bucket_bytes;
            let offset = bucket_start - start;

            assert_eq!(recovered[offset..offset + bucket_bytes], table[bucket_start..bucket_start + bucket_bytes]);
        }
    }

    #[test_case(1; "one bucket per column")]
    #[test_case(2; "two buckets per column")]
    #[test_case(4; "four buckets per column")]
    fn columns_hold_whole_bucket_groups(buckets_per_col: u64) {
        let schema = schema(buckets_per_col, AnswerEncoding::Raw);
        let (params, info) = ClientState::derive_params(&schema).unwrap();

        let bucket_entries = schema.bucket_size * schema.entry_size;
        let per_column = info.entries_per_column(params.l);

        assert_eq!(per_column % (bucket_entries * buckets_per_col), 0);
    }

    #[test]
    fn translation_rejects_hashes_beyond_the_table() {
        let schema = schema(1, AnswerEncoding::Raw);
        let (_, _, client) = setup(&schema);

        assert_eq!(client.buckets_in_column(), 1);
        assert_eq!(client.translate(15).unwrap(), 15);
        assert!(matches!(client.translate(16), Err(BucketPIRError::ColumnOutOfRange { column: 16, cols: 16 })));
    }

    #[test]
    fn truncated_offline_payload_is_rejected() {
        let schema = schema(1, AnswerEncoding::Raw);
        let (_, server, _) = setup(&schema);
        let payload = server.offline_payload();

        assert!(matches!(
            ClientState::setup(&schema, &payload[..payload.len() - 1]),
            Err(BucketPIRError::UnexpectedPayloadLength { what: "offline payload", .. })
        ));
    }

    #[test]
    fn answer_length_is_checked() {
        let schema = schema(1, AnswerEncoding::ModulusSwitched);
        let (_, _, client) = setup(&schema);
        let mut rng = ChaCha8Rng::from_os_rng();

        let query = client.query(0, &mut rng).unwrap();
        assert!(matches!(
            client.recover(&query, &vec![0u8; client.answer_len() + 4]),
            Err(BucketPIRError::UnexpectedPayloadLength { what: "answer", .. })
        ));
    }
}
