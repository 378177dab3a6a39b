use thiserror::Error;

/// Coarse family an error belongs to. Every family is fatal for the running session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Matrix,
    Configuration,
    Protocol,
    Network,
}

#[derive(Debug, Error)]
pub enum BucketPIRError {
    // Matrix
    #[error("The number of rows and columns in the matrix must be non-zero.")]
    InvalidMatrixDimension,
    #[error("The matrix dimensions do not allow multiplication.")]
    IncompatibleDimensionForMatrixMultiplication,
    #[error("The matrix dimensions do not allow addition or subtraction.")]
    IncompatibleDimensionForMatrixAddition,
    #[error("The matrix must have 'rows * columns' elements.")]
    InvalidNumberOfElementsInMatrix,
    #[error("A vector must have exactly one column.")]
    InvalidDimensionForVector,
    #[error("Matrix deserialization failed, expected {expected} bytes but got {actual}.")]
    FailedToDeserializeMatrixFromBytes { expected: usize, actual: usize },

    // Configuration
    #[error("Bucket schema field '{0}' must be non-zero.")]
    ZeroValuedSchemaField(&'static str),
    #[error("Ciphertext modulus bit-width {0} is not supported, expected a value in [{1}, 32].")]
    UnsupportedCiphertextModulus(u32, u32),
    #[error("No LWE parameter row for n = {n}, logq = {logq} and m = {m}.")]
    UnknownLweParameters { n: u32, logq: u32, m: u64 },
    #[error("Plaintext modulus search did not converge for {num_entries} entries of {entry_bits} bits.")]
    ParameterSearchDidNotConverge { num_entries: u64, entry_bits: u32 },
    #[error("Bucket footprint of {group_entries} entries is not a multiple of {packing} entries per plaintext element.")]
    UnsupportedBucketGeometry { group_entries: u64, packing: u64 },
    #[error("Database needs {elems} plaintext elements but the parameters only provide {capacity}.")]
    ParamsDoNotFitDatabase { elems: u64, capacity: u64 },
    #[error("Database rows {rows} are not divisible by {ne} plaintext elements per entry.")]
    RowsNotDivisibleByElementsPerEntry { rows: u64, ne: u64 },
    #[error("Squishing with basis {basis} and factor {factor} needs P <= 2^basis and logq >= basis * factor, got P = {p} and logq = {logq}.")]
    SquishConstraintViolated { basis: u32, factor: u32, p: u64, logq: u32 },
    #[error("Database holds {actual} bytes but the bucket schema expects {expected}.")]
    DatabaseSizeMismatch { expected: usize, actual: usize },
    #[error("Database file is missing metadata field '{0}'.")]
    MissingDatabaseMetadata(&'static str),
    #[error("Query file length {0} is not a multiple of 8 bytes.")]
    MalformedQueryFile(usize),
    #[error("Expected {expected} queries, one per cuckoo slot, but got {actual}.")]
    QueryCountMismatch { expected: u64, actual: u64 },
    #[error("Expected {expected} tags, one per cuckoo slot, but got {actual}.")]
    TagCountMismatch { expected: u64, actual: u64 },
    #[error("Tag file length {len} is not a multiple of the {entry_size} -byte entry size.")]
    MalformedTagFile { len: usize, entry_size: u64 },
    #[error("Entry of {0} bits can't be represented, at most 64 bits per entry are supported.")]
    UnsupportedEntryWidth(u32),
    #[error("Error distribution with standard deviation {0} can't be sampled.")]
    InvalidErrorDistribution(f64),
    #[error("Failed to build worker pool: {0}")]
    WorkerPool(String),

    // Protocol
    #[error("Queried column {column} is out of range for a database with {cols} columns.")]
    ColumnOutOfRange { column: u64, cols: u64 },
    #[error("Entry {index} is out of range for a database with {num} entries.")]
    EntryOutOfRange { index: u64, num: u64 },
    #[error("Expected handshake byte {expected}, received {actual}.")]
    UnexpectedHandshakeByte { expected: u8, actual: u8 },
    #[error("Unexpected length of {what}, expected {expected} but got {actual}.")]
    UnexpectedPayloadLength { what: &'static str, expected: usize, actual: usize },
    #[error("Recover was asked to use a hint, query or answer that doesn't match the session parameters.")]
    InvalidRecoverInputs,

    // Network
    #[error("Failed to connect to {addr} after {attempts} attempts: {source}")]
    ConnectionFailed {
        addr: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BucketPIRError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMatrixDimension
            | Self::IncompatibleDimensionForMatrixMultiplication
            | Self::IncompatibleDimensionForMatrixAddition
            | Self::InvalidNumberOfElementsInMatrix
            | Self::InvalidDimensionForVector
            | Self::FailedToDeserializeMatrixFromBytes { .. } => ErrorKind::Matrix,

            Self::ZeroValuedSchemaField(_)
            | Self::UnsupportedCiphertextModulus(..)
            | Self::UnknownLweParameters { .. }
            | Self::ParameterSearchDidNotConverge { .. }
            | Self::UnsupportedBucketGeometry { .. }
            | Self::ParamsDoNotFitDatabase { .. }
            | Self::RowsNotDivisibleByElementsPerEntry { .. }
            | Self::SquishConstraintViolated { .. }
            | Self::DatabaseSizeMismatch { .. }
            | Self::MissingDatabaseMetadata(_)
            | Self::MalformedQueryFile(_)
            | Self::MalformedTagFile { .. }
            | Self::QueryCountMismatch { .. }
            | Self::TagCountMismatch { .. }
            | Self::UnsupportedEntryWidth(_)
            | Self::InvalidErrorDistribution(_)
            | Self::WorkerPool(_) => ErrorKind::Configuration,

            Self::ColumnOutOfRange { .. }
            | Self::EntryOutOfRange { .. }
            | Self::UnexpectedHandshakeByte { .. }
            | Self::UnexpectedPayloadLength { .. }
            | Self::InvalidRecoverInputs => ErrorKind::Protocol,

            Self::ConnectionFailed { .. } | Self::Io(_) => ErrorKind::Network,
        }
    }
}
