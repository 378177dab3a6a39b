use crate::{
    error::BucketPIRError,
    params::{DEFAULT_LOGQ, DEFAULT_LWE_DIMENSION, ENTRY_BITS, ENTRY_BYTE_LEN, SQUISH_BASIS, SQUISH_FACTOR},
};

/// LWE parameters fixed up front, the plaintext modulus is always searched for.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LweConfig {
    /// LWE secret dimension.
    pub n: u32,
    /// Bit-width of the ciphertext modulus.
    pub logq: u32,
    /// Pinned error standard deviation, the parameter table's own value is used when absent.
    pub sigma: Option<f64>,
}

impl Default for LweConfig {
    fn default() -> Self {
        LweConfig {
            n: DEFAULT_LWE_DIMENSION,
            logq: DEFAULT_LOGQ,
            sigma: None,
        }
    }
}

/// Wire encoding of answer vectors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AnswerEncoding {
    /// Four little-endian bytes per element.
    Raw,
    /// Elements re-quantized to `MOD_SWITCH_BITS` bits and bit-packed.
    #[default]
    ModulusSwitched,
}

/// Geometry of the server's bucketed hash table and the knobs of one protocol run.
/// Both peers must agree on every field, except `bucket_size` which the server announces per database.
#[derive(Clone, Debug, PartialEq)]
pub struct BucketSchema {
    /// Number of buckets in the hash table.
    pub bucket_count: u64,
    /// Records per bucket.
    pub bucket_size: u64,
    /// Buckets which must share one database column.
    pub buckets_per_col: u64,
    /// Bytes per record.
    pub entry_size: u64,
    /// Number of independent cuckoo sub-databases, one means a single database.
    pub cuckoo_slots: u64,
    /// Worker threads used for per-bucket fan-out.
    pub threads: usize,
    pub lwe: LweConfig,
    pub answer_encoding: AnswerEncoding,
}

impl Default for BucketSchema {
    fn default() -> Self {
        BucketSchema {
            bucket_count: 0,
            bucket_size: 0,
            buckets_per_col: 1,
            entry_size: ENTRY_BYTE_LEN as u64,
            cuckoo_slots: 1,
            threads: 1,
            lwe: LweConfig::default(),
            answer_encoding: AnswerEncoding::default(),
        }
    }
}

impl BucketSchema {
    pub fn validate(&self) -> Result<(), BucketPIRError> {
        let nonzero = [
            ("bucket_count", self.bucket_count),
            ("bucket_size", self.bucket_size),
            ("buckets_per_col", self.buckets_per_col),
            ("entry_size", self.entry_size),
            ("cuckoo_slots", self.cuckoo_slots),
            ("threads", self.threads as u64),
            ("lwe_n", self.lwe.n as u64),
        ];

        if let Some((field, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(BucketPIRError::ZeroValuedSchemaField(*field));
        }

        let min_logq = SQUISH_BASIS * SQUISH_FACTOR;
        if self.lwe.logq < min_logq || self.lwe.logq > u32::BITS {
            return Err(BucketPIRError::UnsupportedCiphertextModulus(self.lwe.logq, min_logq));
        }

        Ok(())
    }

    /// Whether every cuckoo slot has its own database.
    #[inline(always)]
    pub const fn is_cuckoo(&self) -> bool {
        self.cuckoo_slots > 1
    }

    /// Byte length of one database.
    #[inline(always)]
    pub const fn db_bytes(&self) -> u64 {
        self.bucket_count * self.bucket_size * self.entry_size
    }

    /// Number of plaintext entries, each `ENTRY_BITS` wide, in one database.
    #[inline(always)]
    pub const fn db_entries(&self) -> u64 {
        self.db_bytes() * u8::BITS as u64 / ENTRY_BITS as u64
    }

    /// Number of plaintext entries in the buckets which must share a column.
    #[inline(always)]
    pub const fn column_group_entries(&self) -> u64 {
        self.buckets_per_col * self.bucket_size * self.entry_size * u8::BITS as u64 / ENTRY_BITS as u64
    }

    /// Copy of this schema describing a database whose bucket size was announced by the server.
    pub fn with_bucket_size(&self, bucket_size: u64) -> BucketSchema {
        BucketSchema {
            bucket_size,
            ..self.clone()
        }
    }
}
