use crate::{error::BucketPIRError, schema::LweConfig};

/// Byte length of the seed from which the public LWE matrix is expanded.
pub const SEED_BYTE_LEN: usize = 16;
/// Byte length of one serialized ciphertext element.
pub const ELEMENT_BYTE_LEN: usize = std::mem::size_of::<u32>();
/// Largest single read/ write issued on the byte stream.
pub const CHUNK_SIZE: usize = 512;
/// Bit-width of a modulus switched ciphertext element.
pub const MOD_SWITCH_BITS: u32 = 19;
pub const SQUISH_BASIS: u32 = 10;
pub const SQUISH_FACTOR: u32 = 3;
/// Byte length of one OPRF tag, i.e. one logical hash table record.
pub const ENTRY_BYTE_LEN: usize = 10;
/// Every database byte is one plaintext entry.
pub const ENTRY_BITS: u32 = 8;
/// Query index reserved for cuckoo slots holding no real item.
pub const BLANK_QUERY: u64 = u64::MAX;
pub const CONNECTION_RETRIES: u32 = 5;

pub const DEFAULT_LWE_DIMENSION: u32 = 1024;
pub const DEFAULT_LOGQ: u32 = 32;
pub const DEFAULT_SIGMA: f64 = 6.4;

/// Rows of the LWE parameter table, as `(n, logq, logm, p)`, for error distribution with standard deviation `DEFAULT_SIGMA`.
/// A row is usable for any number of samples `m <= 2^logm`.
const LWE_PARAMS_TABLE: [(u32, u32, u32, u64); 24] = [
    (1024, 32, 13, 991),
    (1024, 32, 14, 833),
    (1024, 32, 15, 701),
    (1024, 32, 16, 589),
    (1024, 32, 17, 495),
    (1024, 32, 18, 416),
    (1024, 32, 19, 350),
    (1024, 32, 20, 294),
    (1024, 32, 21, 247),
    (1024, 32, 22, 208),
    (1024, 32, 23, 175),
    (1024, 32, 24, 147),
    (2048, 32, 13, 991),
    (2048, 32, 14, 833),
    (2048, 32, 15, 701),
    (2048, 32, 16, 589),
    (2048, 32, 17, 495),
    (2048, 32, 18, 416),
    (2048, 32, 19, 350),
    (2048, 32, 20, 294),
    (2048, 32, 21, 247),
    (2048, 32, 22, 208),
    (2048, 32, 23, 175),
    (2048, 32, 24, 147),
];

/// LWE and database rectangle parameters of one PIR instance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Params {
    /// LWE secret dimension.
    pub n: u32,
    /// Bit-width of the ciphertext modulus q.
    pub logq: u32,
    /// Plaintext modulus.
    pub p: u64,
    /// Standard deviation of the LWE error distribution.
    pub sigma: f64,
    /// Database rows.
    pub l: u64,
    /// Database columns.
    pub m: u64,
}

impl Params {
    #[inline(always)]
    pub const fn q(&self) -> u64 {
        1u64 << self.logq
    }

    /// Mask reducing a native `u32` modulo q.
    #[inline(always)]
    pub const fn q_mask(&self) -> u32 {
        (self.q() - 1) as u32
    }

    /// Scaling factor between plaintext and ciphertext space, floor(q / p).
    #[inline(always)]
    pub const fn delta(&self) -> u64 {
        self.q() / self.p
    }

    /// Rounds a ciphertext space value `x < q` to the nearest multiple of delta, returning the plaintext digit in `[0, p)`.
    #[inline(always)]
    pub const fn round(&self, x: u64) -> u64 {
        let delta = self.delta();
        ((x + delta / 2) / delta) % self.p
    }

    /// Length of a query vector on the wire, i.e. `m` padded up to the next multiple of the squishing factor.
    #[inline(always)]
    pub const fn query_size(&self) -> u64 {
        let factor = SQUISH_FACTOR as u64;
        self.m + (factor - self.m % factor) % factor
    }

    /// Approximate size of the packed database, in MB.
    pub fn packed_db_size_mb(&self) -> f64 {
        (self.l * self.m) as f64 * (self.p as f64).log2() / (1024.0 * 1024.0 * 8.0)
    }
}

/// How logical entries map onto plaintext elements, for a given plaintext modulus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryLayout {
    /// Number of plaintext elements needed to hold all entries.
    pub elems: u64,
    /// Plaintext elements per entry, greater than one only when an entry is wider than log2(p).
    pub ne: u64,
    /// Entries per plaintext element, zero when an entry spans more than one element.
    pub packing: u64,
}

/// Computes how `num_entries` entries, each of `entry_bits` bits, are laid out as elements of Z_p.
pub fn num_db_entries(num_entries: u64, entry_bits: u32, p: u64) -> EntryLayout {
    let logp = (p as f64).log2();

    if entry_bits as f64 <= logp {
        let packing = logp.floor() as u64 / entry_bits as u64;
        EntryLayout {
            elems: num_entries.div_ceil(packing),
            ne: 1,
            packing,
        }
    } else {
        let ne = (entry_bits as f64 / logp).ceil() as u64;
        EntryLayout {
            elems: num_entries * ne,
            ne,
            packing: 0,
        }
    }
}

/// Chooses database dimensions `(rows, cols)` for `num_entries` entries of `entry_bits` bits under plaintext modulus `p`.
///
/// Rows are a multiple of the plaintext element footprint of `group_entries` entries, which is the number of entries
/// that must never straddle a column boundary. Rows are picked as close to the square root of the element count as
/// that constraint allows, rounding half up, and the columns then cover every element.
///
/// # Arguments
///
/// * `num_entries` - Number of logical entries in the database.
/// * `group_entries` - Number of entries which must live together in a single column.
/// * `entry_bits` - Bit-width of a logical entry.
/// * `p` - Candidate plaintext modulus.
///
/// # Returns
///
/// * `Result<(u64, u64), BucketPIRError>` - Database rows and columns. Fails if the group footprint isn't a whole number
///   of plaintext elements.
pub fn compute_dims(num_entries: u64, group_entries: u64, entry_bits: u32, p: u64) -> Result<(u64, u64), BucketPIRError> {
    if entry_bits == 0 || entry_bits > u64::BITS {
        return Err(BucketPIRError::UnsupportedEntryWidth(entry_bits));
    }

    let layout = num_db_entries(num_entries, entry_bits, p);

    let footprint = if layout.packing > 0 {
        if group_entries == 0 || group_entries % layout.packing != 0 {
            return Err(BucketPIRError::UnsupportedBucketGeometry {
                group_entries,
                packing: layout.packing,
            });
        }
        group_entries / layout.packing
    } else if group_entries == 0 {
        return Err(BucketPIRError::UnsupportedBucketGeometry { group_entries, packing: 0 });
    } else {
        group_entries * layout.ne
    };

    let multiples = ((layout.elems as f64).sqrt() / footprint as f64 + 0.5).floor() as u64;
    let rows = multiples.max(1) * footprint;
    let cols = layout.elems.div_ceil(rows);

    Ok((rows, cols))
}

/// Looks up the plaintext modulus supported by `m` LWE samples at dimension `n` and modulus bit-width `logq`.
/// When `sigma` is pinned to something other than the table's error width, the modulus is scaled accordingly.
pub fn lwe_plaintext_modulus(n: u32, logq: u32, m: u64, sigma: Option<f64>) -> Result<(u64, f64), BucketPIRError> {
    let (_, _, _, table_p) = LWE_PARAMS_TABLE
        .iter()
        .find(|&&(tn, tlogq, tlogm, _)| tn == n && tlogq == logq && m <= (1u64 << tlogm))
        .ok_or(BucketPIRError::UnknownLweParameters { n, logq, m })?;

    match sigma {
        Some(sigma) if sigma != DEFAULT_SIGMA => {
            let scaled = (*table_p as f64 * (DEFAULT_SIGMA / sigma).sqrt()).floor() as u64;
            Ok((scaled, sigma))
        }
        _ => Ok((*table_p, DEFAULT_SIGMA)),
    }
}

/// Searches for the tightest plaintext modulus for a database of `num_entries` entries, grouped in columns of
/// `group_entries` entries.
///
/// Candidates `p = 2, 3, ...` are tried in order. Each candidate fixes database dimensions, which in turn fix the number
/// of LWE samples and hence the plaintext modulus the LWE parameters support. The search stops at the first candidate
/// exceeding what the LWE parameters support and returns the previous candidate, whose dimensions are consistent with
/// its own plaintext modulus.
pub fn select_params(num_entries: u64, group_entries: u64, entry_bits: u32, lwe: &LweConfig) -> Result<Params, BucketPIRError> {
    let did_not_converge = BucketPIRError::ParameterSearchDidNotConverge { num_entries, entry_bits };

    if num_entries == 0 || group_entries == 0 || entry_bits == 0 {
        return Err(did_not_converge);
    }

    let mut selected: Option<Params> = None;

    for p in 2..(1u64 << lwe.logq) {
        let (rows, cols) = compute_dims(num_entries, group_entries, entry_bits, p)?;
        let (supported_p, sigma) = lwe_plaintext_modulus(lwe.n, lwe.logq, cols, lwe.sigma)?;

        if supported_p < p {
            return selected.ok_or(did_not_converge);
        }

        selected = Some(Params {
            n: lwe.n,
            logq: lwe.logq,
            p,
            sigma,
            l: rows,
            m: cols,
        });
    }

    Err(did_not_converge)
}
