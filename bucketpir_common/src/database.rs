use crate::{
    error::BucketPIRError,
    matrix::{Matrix, checked_dim},
    params::{Params, SQUISH_BASIS, SQUISH_FACTOR, num_db_entries},
};

/// Shape of a database as seen through the plaintext modulus. The client derives the same value from the bucket
/// schema alone, without ever seeing the database.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// Number of logical entries.
    pub num: u64,
    /// Bits per logical entry.
    pub entry_bits: u32,
    /// Z_p elements per entry, if an entry is wider than log2(p).
    pub ne: u64,
    /// Entries per Z_p element, if log2(p) is at least the entry width.
    pub packing: u64,
    /// Repetition factor, a divisor of `ne`.
    pub x: u64,
    /// Plaintext modulus.
    pub p: u64,
    /// Bit-width of the ciphertext modulus.
    pub logq: u32,
    /// Bits per element in squished form.
    pub basis: u32,
    /// Elements packed together in squished form.
    pub squishing: u32,
    /// Columns of the unsquished database.
    pub cols: u64,
}

impl DatabaseInfo {
    /// Derives database information for `num_entries` entries of `entry_bits` bits, validating that `params` can hold
    /// them and that the database can be squished.
    pub fn new(num_entries: u64, entry_bits: u32, params: &Params) -> Result<DatabaseInfo, BucketPIRError> {
        if entry_bits == 0 || entry_bits > u64::BITS {
            return Err(BucketPIRError::UnsupportedEntryWidth(entry_bits));
        }

        let layout = num_db_entries(num_entries, entry_bits, params.p);

        let capacity = params.l * params.m;
        if layout.elems > capacity {
            return Err(BucketPIRError::ParamsDoNotFitDatabase { elems: layout.elems, capacity });
        }
        if params.l % layout.ne != 0 {
            return Err(BucketPIRError::RowsNotDivisibleByElementsPerEntry { rows: params.l, ne: layout.ne });
        }
        if params.p > (1u64 << SQUISH_BASIS) || params.logq < SQUISH_BASIS * SQUISH_FACTOR {
            return Err(BucketPIRError::SquishConstraintViolated {
                basis: SQUISH_BASIS,
                factor: SQUISH_FACTOR,
                p: params.p,
                logq: params.logq,
            });
        }

        Ok(DatabaseInfo {
            num: num_entries,
            entry_bits,
            ne: layout.ne,
            packing: layout.packing,
            x: layout.ne,
            p: params.p,
            logq: params.logq,
            basis: SQUISH_BASIS,
            squishing: SQUISH_FACTOR,
            cols: params.m,
        })
    }

    /// Number of logical entries held by one column of a database with `rows` rows.
    #[inline(always)]
    pub const fn entries_per_column(&self, rows: u64) -> u64 {
        if self.packing > 0 { rows * self.packing } else { rows / self.ne }
    }

    #[inline(always)]
    const fn q_mask(&self) -> u32 {
        ((1u64 << self.logq) - 1) as u32
    }

    /// Reassembles logical entries from plaintext digits, as produced by rounding, of one database column.
    /// Digits are still shifted by `-p/2`, which is undone here.
    pub fn reconstruct_entries(&self, digits: &[u64]) -> Vec<u64> {
        let half_p = self.p / 2;

        digits
            .chunks_exact(self.ne as usize)
            .flat_map(|group| {
                let shifted = group.iter().map(|&d| (d + half_p) % self.p);
                let elem = reconstruct_from_base_p(self.p, shifted);

                if self.packing > 0 {
                    (0..self.packing).map(|k| base_p(1u128 << self.entry_bits, elem, k)).collect()
                } else {
                    vec![elem]
                }
            })
            .collect()
    }
}

/// `i`-th digit of `m` in base `p`.
#[inline]
pub fn base_p(p: u128, m: u64, i: u64) -> u64 {
    let mut m = m as u128;
    for _ in 0..i {
        m /= p;
    }
    (m % p) as u64
}

/// Inverse of repeated [`base_p`], digits are given least significant first.
#[inline]
pub fn reconstruct_from_base_p<I: IntoIterator<Item = u64>>(p: u64, digits: I) -> u64 {
    let (res, _) = digits.into_iter().fold((0u64, 1u64), |(res, coeff), digit| {
        (res.wrapping_add(coeff.wrapping_mul(digit)), coeff.wrapping_mul(p))
    });
    res
}

/// Database laid out as an `l x m` matrix of zero-centered Z_p elements, or its squished form.
///
/// Elements fill the matrix column by column. When an entry spans `ne` elements, they are stacked vertically in one
/// column, so a column always holds whole entries.
#[derive(Clone, Debug)]
pub struct Database {
    info: DatabaseInfo,
    rows: u64,
    data: Matrix,
    squished: bool,
}

impl Database {
    /// Encodes `values`, each at most `entry_bits` wide, as a database matrix with dimensions chosen by `params`.
    ///
    /// # Arguments
    ///
    /// * `values` - Logical entries, in order.
    /// * `entry_bits` - Bit-width of every entry.
    /// * `params` - Parameters fixing the plaintext modulus and the matrix dimensions.
    ///
    /// # Returns
    ///
    /// * `Result<Database, BucketPIRError>` - Zero-centered, unsquished database. Fails if the parameters can't hold
    ///   the entries or violate the squishing constraints.
    pub fn encode(values: &[u64], entry_bits: u32, params: &Params) -> Result<Database, BucketPIRError> {
        let info = DatabaseInfo::new(values.len() as u64, entry_bits, params)?;

        let rows = checked_dim(params.l)?;
        let cols = checked_dim(params.m)?;
        let mut data = Matrix::new(rows, cols)?;

        let l = params.l as usize;

        if info.packing > 0 {
            let packing = info.packing as usize;

            values.chunks(packing).enumerate().for_each(|(at, group)| {
                let packed = group.iter().rev().fold(0u64, |acc, &v| (acc << entry_bits) | v);
                data[(at % l, at / l)] = packed as u32;
            });
        } else {
            let ne = info.ne as usize;
            let per_col = l / ne;

            values.iter().enumerate().for_each(|(i, &v)| {
                let (col, row) = (i / per_col, (i % per_col) * ne);

                (0..ne).for_each(|j| {
                    data[(row + j, col)] = base_p(params.p as u128, v, j as u64) as u32;
                });
            });
        }

        // Map elements to [-p/2, p/2]
        data.sub_scalar((params.p / 2) as u32);
        data.reduce(params.q_mask());

        Ok(Database {
            info,
            rows: params.l,
            data,
            squished: false,
        })
    }

    #[inline(always)]
    pub const fn info(&self) -> &DatabaseInfo {
        &self.info
    }

    #[inline(always)]
    pub const fn data(&self) -> &Matrix {
        &self.data
    }

    #[inline(always)]
    pub const fn is_squished(&self) -> bool {
        self.squished
    }

    /// Shifts elements back to `[0, p)` and packs `squishing` of them, `basis` bits each, into one matrix element.
    /// Arithmetic against the database is only defined on this form afterwards.
    pub fn squish(&mut self) -> Result<(), BucketPIRError> {
        if self.squished {
            return Ok(());
        }

        let info = &self.info;
        if info.p > (1u64 << info.basis) || info.logq < info.basis * info.squishing {
            return Err(BucketPIRError::SquishConstraintViolated {
                basis: info.basis,
                factor: info.squishing,
                p: info.p,
                logq: info.logq,
            });
        }

        self.data.add_scalar((info.p / 2) as u32);
        self.data.reduce(info.q_mask());
        self.data = self.data.squish(info.basis, info.squishing);
        self.squished = true;

        Ok(())
    }

    /// Exact inverse of [`Database::squish`].
    pub fn unsquish(&mut self) -> Result<(), BucketPIRError> {
        if !self.squished {
            return Ok(());
        }

        let info = &self.info;
        let mut data = self.data.unsquish(info.basis, info.squishing, checked_dim(info.cols)?)?;
        data.sub_scalar((info.p / 2) as u32);
        data.reduce(info.q_mask());

        self.data = data;
        self.squished = false;

        Ok(())
    }

    /// Plaintext digit in `[0, p)` stored at `(row, col)` of the unsquished layout.
    fn digit(&self, row: usize, col: usize) -> u64 {
        let info = &self.info;

        if self.squished {
            let factor = info.squishing as usize;
            let mask = (1u32 << info.basis) - 1;

            ((self.data[(row, col / factor)] >> (info.basis as usize * (col % factor))) & mask) as u64
        } else {
            let half_p = (info.p / 2) as u32;
            (self.data[(row, col)].wrapping_add(half_p) & info.q_mask()) as u64 % info.p
        }
    }

    /// Looks up the `i`-th logical entry. Works on both the squished and the unsquished form.
    pub fn get_elem(&self, i: u64) -> Result<u64, BucketPIRError> {
        let info = &self.info;
        if i >= info.num {
            return Err(BucketPIRError::EntryOutOfRange { index: i, num: info.num });
        }

        let l = self.rows;

        if info.packing > 0 {
            let at = i / info.packing;
            let elem = self.digit((at % l) as usize, (at / l) as usize);

            Ok(base_p(1u128 << info.entry_bits, elem, i % info.packing))
        } else {
            let per_col = l / info.ne;
            let (col, row) = ((i / per_col) as usize, ((i % per_col) * info.ne) as usize);
            let digits = (0..info.ne as usize).map(|j| self.digit(row + j, col));

            Ok(reconstruct_from_base_p(info.p, digits))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::DEFAULT_SIGMA;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;
    use test_case::test_case;

    fn params(p: u64, l: u64, m: u64) -> Params {
        Params {
            n: 1024,
            logq: 32,
            p,
            sigma: DEFAULT_SIGMA,
            l,
            m,
        }
    }

    #[test_case(32, 8, params(991, 4, 8); "one byte per element")]
    #[test_case(64, 4, params(991, 4, 8); "two nibbles per element")]
    #[test_case(32, 8, params(147, 8, 8); "two elements per byte")]
    #[test_case(30, 8, params(147, 8, 8); "partially filled last column")]
    #[test_case(10, 16, params(991, 4, 8); "wide entries")]
    fn encoded_entries_can_be_looked_up(num: usize, entry_bits: u32, params: Params) {
        let mut rng = ChaCha8Rng::from_os_rng();
        let values: Vec<u64> = (0..num).map(|_| rng.random_range(0..(1u64 << entry_bits))).collect();

        let mut db = Database::encode(&values, entry_bits, &params).unwrap();
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(db.get_elem(i as u64).unwrap(), v);
        }

        db.squish().unwrap();
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(db.get_elem(i as u64).unwrap(), v);
        }

        assert!(matches!(db.get_elem(num as u64), Err(BucketPIRError::EntryOutOfRange { .. })));
    }

    #[test]
    fn columns_hold_consecutive_entries() {
        let values: Vec<u64> = (0..32).collect();
        let db = Database::encode(&values, 8, &params(991, 4, 8)).unwrap();
        let half_p = 991 / 2;

        for col in 0..8 {
            for row in 0..4 {
                let centered = db.data()[(row, col)];
                assert_eq!(centered.wrapping_add(half_p), (col * 4 + row) as u32);
            }
        }
    }

    #[test]
    fn squished_database_can_be_unsquished() {
        let mut rng = ChaCha8Rng::from_os_rng();
        let values: Vec<u64> = (0..128).map(|_| rng.random_range(0..256)).collect();

        let mut db = Database::encode(&values, 8, &params(991, 8, 16)).unwrap();
        let original = db.data().clone();

        db.squish().unwrap();
        assert!(db.is_squished());
        assert_eq!(db.data().num_cols(), 6);

        db.unsquish().unwrap();
        assert!(!db.is_squished());
        assert_eq!(db.data(), &original);
    }

    #[test_case(32, 8, params(991, 4, 7) => matches Err(BucketPIRError::ParamsDoNotFitDatabase { elems: 32, capacity: 28 }); "too few elements")]
    #[test_case(32, 8, params(147, 5, 16) => matches Err(BucketPIRError::RowsNotDivisibleByElementsPerEntry { rows: 5, ne: 2 }); "split entries straddle rows")]
    #[test_case(32, 8, params(2039, 4, 8) => matches Err(BucketPIRError::SquishConstraintViolated { .. }); "plaintext modulus too wide to squish")]
    #[test_case(32, 0, params(991, 4, 8) => matches Err(BucketPIRError::UnsupportedEntryWidth(0)); "zero width entries")]
    fn database_info_validation(num: u64, entry_bits: u32, params: Params) -> Result<DatabaseInfo, BucketPIRError> {
        DatabaseInfo::new(num, entry_bits, &params)
    }

    #[test]
    fn base_p_digits_reconstruct() {
        for m in [0u64, 1, 990, 991, 123_456_789, u64::MAX] {
            let digits = (0..8).map(|i| base_p(991, m, i));
            assert_eq!(reconstruct_from_base_p(991, digits), m);
        }
    }

    #[test]
    fn reconstruct_entries_undoes_centering_and_packing() {
        let info = DatabaseInfo::new(64, 4, &params(991, 4, 8)).unwrap();
        assert_eq!(info.packing, 2);

        // Element 0x21 holds entries 1 and 2, digits are shifted by -p/2 mod p.
        let digit = (0x21 + 991 - 991 / 2) % 991;
        assert_eq!(info.reconstruct_entries(&[digit]), vec![1, 2]);
    }
}
