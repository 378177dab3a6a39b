/// Counts recovered records matching the client's OPRF tags, when every cuckoo slot has its own database.
///
/// `columns[c]` holds the records recovered from slot `c`, which are compared against `tags[c]` only. All-zero
/// records pad buckets and never count.
pub fn count_cuckoo_matches(columns: &[Vec<u8>], tags: &[Vec<u8>], entry_size: usize) -> u64 {
    columns
        .iter()
        .zip(tags)
        .map(|(column, tag)| {
            column
                .chunks_exact(entry_size)
                .filter(|record| record.iter().any(|&b| b != 0))
                .filter(|record| *record == tag.as_slice())
                .count() as u64
        })
        .sum()
}

/// Counts recovered records matching any of the client's OPRF tags, when a single database is queried. Every record
/// is compared against every tag.
pub fn count_matches(columns: &[Vec<u8>], tags: &[Vec<u8>], entry_size: usize) -> u64 {
    columns
        .iter()
        .flat_map(|column| column.chunks_exact(entry_size))
        .map(|record| tags.iter().filter(|tag| record == tag.as_slice()).count() as u64)
        .sum()
}
