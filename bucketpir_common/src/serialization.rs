//! On-disk inputs of both peers.
//!
//! A database file starts with little-endian `u64` metadata fields, in an order agreed upon out of band, followed by
//! the raw bytes of the hash table. A query file is a flat sequence of little-endian `u64` bucket hashes, and a tag
//! file is a flat sequence of fixed size OPRF tags.

use crate::error::BucketPIRError;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

pub const SERVER_DATABASE_FILE: &str = "server.edb";
pub const CLIENT_QUERIES_FILE: &str = "queries.db";
pub const CLIENT_TAGS_FILE: &str = "client.edb";
/// Metadata field announcing the bucket size of a server database.
pub const BUCKET_SIZE_FIELD: &str = "bucketSize";
/// Metadata field announcing the number of buckets of a server database.
pub const HASHTABLE_SIZE_FIELD: &str = "hashtableSize";

const U64_BYTE_LEN: usize = std::mem::size_of::<u64>();

/// Path of the server database file, for cuckoo slot `slot` or for the single database.
pub fn server_database_path(dir: &Path, slot: Option<usize>) -> PathBuf {
    match slot {
        Some(slot) => dir.join(slot.to_string()).join(SERVER_DATABASE_FILE),
        None => dir.join(SERVER_DATABASE_FILE),
    }
}

/// Reads a database file, parsing one `u64` metadata value per name in `metadata`.
///
/// # Returns
///
/// * `Result<(HashMap<&'static str, u64>, Vec<u8>), BucketPIRError>` - Metadata by name, and the database bytes which
///   follow it. Fails if the file can't be read or is too short to hold every metadata field.
pub fn read_database_file(path: &Path, metadata: &[&'static str]) -> Result<(HashMap<&'static str, u64>, Vec<u8>), BucketPIRError> {
    let bytes = fs::read(path)?;

    let mut fields = HashMap::with_capacity(metadata.len());
    let mut rest = bytes.as_slice();

    for &name in metadata {
        let (value, tail) = rest.split_first_chunk::<U64_BYTE_LEN>().ok_or(BucketPIRError::MissingDatabaseMetadata(name))?;

        fields.insert(name, u64::from_le_bytes(*value));
        rest = tail;
    }

    Ok((fields, rest.to_vec()))
}

pub fn write_database_file(path: &Path, metadata: &[u64], entries: &[u8]) -> Result<(), BucketPIRError> {
    let mut bytes = Vec::with_capacity(metadata.len() * U64_BYTE_LEN + entries.len());

    metadata.iter().for_each(|v| bytes.extend_from_slice(&v.to_le_bytes()));
    bytes.extend_from_slice(entries);

    fs::write(path, bytes)?;
    Ok(())
}

/// Reads bucket hashes. Fails if the file length is not a whole number of `u64`s.
pub fn read_query_file(path: &Path) -> Result<Vec<u64>, BucketPIRError> {
    let bytes = fs::read(path)?;
    if bytes.len() % U64_BYTE_LEN != 0 {
        return Err(BucketPIRError::MalformedQueryFile(bytes.len()));
    }

    Ok(bytes
        .chunks_exact(U64_BYTE_LEN)
        .map(|word| {
            let mut buf = [0u8; U64_BYTE_LEN];
            buf.copy_from_slice(word);
            u64::from_le_bytes(buf)
        })
        .collect())
}

pub fn write_query_file(path: &Path, queries: &[u64]) -> Result<(), BucketPIRError> {
    let bytes: Vec<u8> = queries.iter().flat_map(|v| v.to_le_bytes()).collect();

    fs::write(path, bytes)?;
    Ok(())
}

/// Reads OPRF tags of `entry_size` bytes each.
pub fn read_tag_file(path: &Path, entry_size: u64) -> Result<Vec<Vec<u8>>, BucketPIRError> {
    let bytes = fs::read(path)?;
    if entry_size == 0 || bytes.len() % entry_size as usize != 0 {
        return Err(BucketPIRError::MalformedTagFile {
            len: bytes.len(),
            entry_size,
        });
    }

    Ok(bytes.chunks_exact(entry_size as usize).map(<[u8]>::to_vec).collect())
}
