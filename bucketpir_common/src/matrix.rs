use crate::{error::BucketPIRError, params::SEED_BYTE_LEN};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use std::ops::{Add, Index, IndexMut, Mul, Sub};
use turboshake::TurboShake128;

/// Narrows a database or LWE dimension to the matrix index width.
#[inline(always)]
pub fn checked_dim(dim: u64) -> Result<u32, BucketPIRError> {
    match u32::try_from(dim) {
        Ok(dim) if dim > 0 => Ok(dim),
        _ => Err(BucketPIRError::InvalidMatrixDimension),
    }
}

/// Dense row-major matrix over Z_(2^32). Arithmetic wraps at the native word, callers reduce to a narrower modulus with
/// [`Matrix::reduce`].
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    rows: u32,
    cols: u32,
    elems: Vec<u32>,
}

impl Matrix {
    /// Creates a new matrix with the given number of rows and columns, s.t. all elements are zero-initialized.
    ///
    /// # Arguments
    ///
    /// * `rows` - The number of rows in the matrix.
    /// * `cols` - The number of columns in the matrix.
    ///
    /// # Returns
    ///
    /// * `Result<Matrix, BucketPIRError>` - A new matrix if the input is valid (rows and cols are positive).
    ///   Returns an error if either rows or cols is zero.
    pub fn new(rows: u32, cols: u32) -> Result<Matrix, BucketPIRError> {
        if rows > 0 && cols > 0 {
            Ok(Matrix {
                rows,
                cols,
                elems: vec![0; rows as usize * cols as usize],
            })
        } else {
            Err(BucketPIRError::InvalidMatrixDimension)
        }
    }

    /// Creates a new matrix with the given number of rows and columns, s.t. elements are initialized with the given values,
    /// in row-major order.
    ///
    /// # Returns
    ///
    /// * `Result<Matrix, BucketPIRError>` - Fails if either rows or cols is zero, or if the number of values does not match
    ///   the number of required elements.
    pub fn from_values(rows: u32, cols: u32, values: Vec<u32>) -> Result<Matrix, BucketPIRError> {
        if rows == 0 || cols == 0 {
            return Err(BucketPIRError::InvalidMatrixDimension);
        }
        if rows as usize * cols as usize != values.len() {
            return Err(BucketPIRError::InvalidNumberOfElementsInMatrix);
        }

        Ok(Matrix { rows, cols, elems: values })
    }

    #[inline(always)]
    pub const fn num_rows(&self) -> u32 {
        self.rows
    }
    #[inline(always)]
    pub const fn num_cols(&self) -> u32 {
        self.cols
    }
    #[inline(always)]
    pub fn num_elems(&self) -> usize {
        self.elems.len()
    }
    #[inline(always)]
    pub fn elems(&self) -> &[u32] {
        &self.elems
    }

    /// Generates a matrix with the given dimensions from a SEED_BYTE_LEN -byte seed using TurboSHAKE128 xof.
    /// Both peers expand the same seed into the same public matrix.
    ///
    /// # Arguments
    ///
    /// * `rows` - The number of rows in the matrix.
    /// * `cols` - The number of columns in the matrix.
    /// * `seed` - The SEED_BYTE_LEN -byte seed to use for generation.
    ///
    /// # Returns
    ///
    /// * `Result<Matrix, BucketPIRError>` - A new matrix if the input is valid (rows and cols are positive).
    ///   Returns an error if either rows or cols is zero.
    pub fn generate_from_seed(rows: u32, cols: u32, seed: &[u8; SEED_BYTE_LEN]) -> Result<Matrix, BucketPIRError> {
        let mut hasher = TurboShake128::default();
        hasher.absorb(seed);
        hasher.finalize::<{ TurboShake128::DEFAULT_DOMAIN_SEPARATOR }>();

        let mut elem_bytes = vec![0u8; rows as usize * cols as usize * std::mem::size_of::<u32>()];
        hasher.squeeze(&mut elem_bytes);

        let elems = elem_bytes
            .chunks_exact(std::mem::size_of::<u32>())
            .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
            .collect();

        Matrix::from_values(rows, cols, elems)
    }

    /// Samples a column vector with elements uniformly distributed over Z_(2^32).
    pub fn sample_uniform_vector<R: Rng>(rows: u32, rng: &mut R) -> Result<Matrix, BucketPIRError> {
        let elems = (0..rows).map(|_| rng.random::<u32>()).collect();
        Matrix::from_values(rows, 1, elems)
    }

    /// Samples a column vector from a rounded normal distribution centered at zero. Negative values are represented
    /// by their two's complement, so they wrap correctly under native arithmetic.
    pub fn sample_gaussian_vector<R: Rng>(rows: u32, sigma: f64, rng: &mut R) -> Result<Matrix, BucketPIRError> {
        let normal = Normal::new(0.0, sigma).map_err(|_| BucketPIRError::InvalidErrorDistribution(sigma))?;
        let elems = (0..rows).map(|_| normal.sample(rng).round() as i64 as u32).collect();

        Matrix::from_values(rows, 1, elems)
    }

    /// Reduces every element modulo `mask + 1`, which must be a power of two.
    pub fn reduce(&mut self, mask: u32) {
        self.elems.iter_mut().for_each(|v| *v &= mask);
    }

    /// Adds `scalar` to every element, wrapping at the native word.
    pub fn add_scalar(&mut self, scalar: u32) {
        self.elems.iter_mut().for_each(|v| *v = v.wrapping_add(scalar));
    }

    /// Subtracts `scalar` from every element, wrapping at the native word.
    pub fn sub_scalar(&mut self, scalar: u32) {
        self.elems.iter_mut().for_each(|v| *v = v.wrapping_sub(scalar));
    }

    /// Extends a column vector with zeros up to `rows` rows. Asking for fewer rows than present is an error.
    pub fn pad_rows(mut self, rows: u32) -> Result<Matrix, BucketPIRError> {
        if self.cols != 1 {
            return Err(BucketPIRError::InvalidDimensionForVector);
        }
        if rows < self.rows {
            return Err(BucketPIRError::InvalidMatrixDimension);
        }

        self.elems.resize(rows as usize, 0);
        self.rows = rows;

        Ok(self)
    }

    /// Packs `factor` horizontally adjacent elements, each assumed to fit in `basis` bits, into one element, so the
    /// result has `ceil(cols / factor)` columns. Missing trailing elements of the last group are taken as zero.
    pub fn squish(&self, basis: u32, factor: u32) -> Matrix {
        let mask = ((1u64 << basis) - 1) as u32;
        let res_num_cols = self.cols.div_ceil(factor);

        let mut res_elems = vec![0u32; self.rows as usize * res_num_cols as usize];

        res_elems.par_iter_mut().enumerate().for_each(|(lin_idx, v)| {
            let ridx = lin_idx / res_num_cols as usize;
            let cidx = lin_idx % res_num_cols as usize;

            *v = (0..factor as usize)
                .map(|k| cidx * factor as usize + k)
                .take_while(|&src_cidx| src_cidx < self.cols as usize)
                .enumerate()
                .fold(0u32, |acc, (k, src_cidx)| acc | ((self[(ridx, src_cidx)] & mask) << (basis as usize * k)));
        });

        Matrix {
            rows: self.rows,
            cols: res_num_cols,
            elems: res_elems,
        }
    }

    /// Inverse of [`Matrix::squish`], restoring a matrix of `num_cols` columns.
    pub fn unsquish(&self, basis: u32, factor: u32, num_cols: u32) -> Result<Matrix, BucketPIRError> {
        if num_cols.div_ceil(factor) != self.cols {
            return Err(BucketPIRError::InvalidMatrixDimension);
        }

        let mask = ((1u64 << basis) - 1) as u32;
        let mut res = Matrix::new(self.rows, num_cols)?;

        (0..self.rows as usize)
            .flat_map(|ridx| (0..num_cols as usize).map(move |cidx| (ridx, cidx)))
            .for_each(|(ridx, cidx)| {
                let packed = self[(ridx, cidx / factor as usize)];
                let k = cidx % factor as usize;

                res[(ridx, cidx)] = (packed >> (basis as usize * k)) & mask;
            });

        Ok(res)
    }

    /// Multiplies a squished matrix with a column vector, unpacking elements on the fly.
    ///
    /// # Arguments
    ///
    /// * `rhs` - Column vector with exactly `num_cols() * factor` rows, i.e. padded to the squished width.
    /// * `basis` - Bit-width of each packed element.
    /// * `factor` - Number of elements packed into one.
    ///
    /// # Returns
    ///
    /// * `Result<Matrix, BucketPIRError>` - Column vector with `num_rows()` rows. Returns an error if `rhs` is not a
    ///   column vector of the expected length.
    pub fn squished_matrix_x_vector(&self, rhs: &Matrix, basis: u32, factor: u32) -> Result<Matrix, BucketPIRError> {
        if rhs.cols != 1 || rhs.rows as u64 != self.cols as u64 * factor as u64 {
            return Err(BucketPIRError::IncompatibleDimensionForMatrixMultiplication);
        }

        let mask = ((1u64 << basis) - 1) as u32;
        let mut res_elems = vec![0u32; self.rows as usize];

        res_elems.par_iter_mut().enumerate().for_each(|(ridx, v)| {
            *v = (0..self.cols as usize).fold(0u32, |acc, cidx| {
                let packed = self[(ridx, cidx)];

                (0..factor as usize).fold(acc, |acc, k| {
                    let elem = (packed >> (basis as usize * k)) & mask;
                    acc.wrapping_add(elem.wrapping_mul(rhs.elems[cidx * factor as usize + k]))
                })
            });
        });

        Matrix::from_values(self.rows, 1, res_elems)
    }

    /// Serializes elements, in row-major order, as little-endian 32 -bit words. Dimensions are not encoded.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.elems.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Deserializes a `rows x cols` matrix from little-endian 32 -bit words.
    pub fn from_le_bytes(bytes: &[u8], rows: u32, cols: u32) -> Result<Matrix, BucketPIRError> {
        let expected = rows as usize * cols as usize * std::mem::size_of::<u32>();
        if bytes.len() != expected {
            return Err(BucketPIRError::FailedToDeserializeMatrixFromBytes {
                expected,
                actual: bytes.len(),
            });
        }

        let elems = bytes
            .chunks_exact(std::mem::size_of::<u32>())
            .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
            .collect();

        Matrix::from_values(rows, cols, elems)
    }

    /// Creates a new identity matrix of requested dimension.
    #[cfg(test)]
    pub fn identity(rows: u32) -> Result<Matrix, BucketPIRError> {
        let mut mat = Matrix::new(rows, rows)?;

        (0..mat.rows as usize).for_each(|idx| {
            mat[(idx, idx)] = 1;
        });

        Ok(mat)
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = u32;

    #[inline(always)]
    fn index(&self, index: (usize, usize)) -> &Self::Output {
        let (ridx, cidx) = index;
        &self.elems[ridx * self.cols as usize + cidx]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    #[inline(always)]
    fn index_mut(&mut self, index: (usize, usize)) -> &mut Self::Output {
        let (ridx, cidx) = index;
        &mut self.elems[ridx * self.cols as usize + cidx]
    }
}

impl Mul for Matrix {
    type Output = Result<Matrix, BucketPIRError>;

    #[inline(always)]
    fn mul(self, rhs: Self) -> Self::Output {
        &self * &rhs
    }
}

impl<'b> Mul<&'b Matrix> for &Matrix {
    type Output = Result<Matrix, BucketPIRError>;

    fn mul(self, rhs: &'b Matrix) -> Self::Output {
        if self.cols != rhs.rows {
            return Err(BucketPIRError::IncompatibleDimensionForMatrixMultiplication);
        }

        let mut res_elems = vec![0u32; self.rows as usize * rhs.cols as usize];

        // Rows of the result are independent, and each one walks a row of `self` and all of `rhs` row by row,
        // keeping both accesses sequential.
        res_elems.par_chunks_mut(rhs.cols as usize).enumerate().for_each(|(r_idx, res_row)| {
            (0..self.cols as usize).for_each(|k| {
                let lhs_elem = self[(r_idx, k)];
                let rhs_row = &rhs.elems[k * rhs.cols as usize..(k + 1) * rhs.cols as usize];

                res_row
                    .iter_mut()
                    .zip(rhs_row)
                    .for_each(|(v, &rhs_elem)| *v = v.wrapping_add(lhs_elem.wrapping_mul(rhs_elem)));
            });
        });

        Matrix::from_values(self.rows, rhs.cols, res_elems)
    }
}

impl Add for Matrix {
    type Output = Result<Matrix, BucketPIRError>;

    #[inline(always)]
    fn add(self, rhs: Self) -> Self::Output {
        &self + &rhs
    }
}

impl<'b> Add<&'b Matrix> for &Matrix {
    type Output = Result<Matrix, BucketPIRError>;

    fn add(self, rhs: &'b Matrix) -> Self::Output {
        if self.rows != rhs.rows || self.cols != rhs.cols {
            return Err(BucketPIRError::IncompatibleDimensionForMatrixAddition);
        }

        let res_elems = self.elems.par_iter().zip(rhs.elems.par_iter()).map(|(&a, &b)| a.wrapping_add(b)).collect();

        Matrix::from_values(self.rows, self.cols, res_elems)
    }
}

impl<'b> Sub<&'b Matrix> for &Matrix {
    type Output = Result<Matrix, BucketPIRError>;

    fn sub(self, rhs: &'b Matrix) -> Self::Output {
        if self.rows != rhs.rows || self.cols != rhs.cols {
            return Err(BucketPIRError::IncompatibleDimensionForMatrixAddition);
        }

        let res_elems = self.elems.par_iter().zip(rhs.elems.par_iter()).map(|(&a, &b)| a.wrapping_sub(b)).collect();

        Matrix::from_values(self.rows, self.cols, res_elems)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;
    use test_case::test_case;

    #[test_case(1024, 1024 => matches Ok(_);  "Non-zero number of rows and columns are valid")]
    #[test_case(0, 1024 => matches Err(BucketPIRError::InvalidMatrixDimension);  "Number of rows must be greater than zero")]
    #[test_case(1024, 0 => matches Err(BucketPIRError::InvalidMatrixDimension);  "Number of columns must be greater than zero")]
    fn new_empty_matrix_constructor_api(num_rows: u32, num_cols: u32) -> Result<Matrix, BucketPIRError> {
        Matrix::new(num_rows, num_cols)
    }

    #[test_case(16, 8, vec![0u32; 16 * 8] => matches Ok(_);  "Non-zero number of rows and columns are valid")]
    #[test_case(0, 8, vec![] => matches Err(BucketPIRError::InvalidMatrixDimension);  "Number of rows must be greater than zero")]
    #[test_case(16, 8, vec![0u32; 16 * 8 - 1] => matches Err(BucketPIRError::InvalidNumberOfElementsInMatrix);  "Number of elements must be equal to number of rows times number of columns")]
    fn from_values_matrix_constructor_api(num_rows: u32, num_cols: u32, elems: Vec<u32>) -> Result<Matrix, BucketPIRError> {
        Matrix::from_values(num_rows, num_cols, elems)
    }

    #[test_case((16, 1), (1, 16) => matches Ok(_); "Matrix multiplication should work for valid dimensions")]
    #[test_case((16, 1), (16, 1) => matches Err(BucketPIRError::IncompatibleDimensionForMatrixMultiplication); "Matrix multiplication should not work for incompatible dimensions")]
    fn matrix_multiplication_failures(lhs_mat_dim: (u32, u32), rhs_mat_dim: (u32, u32)) -> Result<Matrix, BucketPIRError> {
        let lhs = Matrix::new(lhs_mat_dim.0, lhs_mat_dim.1).unwrap();
        let rhs = Matrix::new(rhs_mat_dim.0, rhs_mat_dim.1).unwrap();

        lhs * rhs
    }

    #[test_case((16, 1), (16, 1) => matches Ok(_); "Matrix addition should work for valid dimensions")]
    #[test_case((16, 1), (1, 16) => matches Err(BucketPIRError::IncompatibleDimensionForMatrixAddition); "Matrix addition should not work for incompatible dimensions")]
    fn matrix_addition_failures(lhs_mat_dim: (u32, u32), rhs_mat_dim: (u32, u32)) -> Result<Matrix, BucketPIRError> {
        let lhs = Matrix::new(lhs_mat_dim.0, lhs_mat_dim.1).unwrap();
        let rhs = Matrix::new(rhs_mat_dim.0, rhs_mat_dim.1).unwrap();

        lhs + rhs
    }

    #[test]
    fn matrix_multiplication_is_correct() {
        const NUM_ROWS: u32 = 64;
        const NUM_COLS: u32 = 96;

        let mut rng = ChaCha8Rng::from_os_rng();
        let mut seed = [0u8; SEED_BYTE_LEN];
        rng.fill_bytes(&mut seed);

        let matrix_a = Matrix::generate_from_seed(NUM_ROWS, NUM_COLS, &seed).unwrap();
        let matrix_i = Matrix::identity(NUM_COLS).unwrap();

        assert_eq!((&matrix_a * &matrix_i).unwrap(), matrix_a);
    }

    #[test]
    fn matrix_multiplication_matches_schoolbook() {
        let lhs = Matrix::from_values(2, 3, vec![1, 2, 3, 4, 5, u32::MAX]).unwrap();
        let rhs = Matrix::from_values(3, 2, vec![7, 8, 9, 10, 11, 12]).unwrap();

        let res = (&lhs * &rhs).unwrap();

        assert_eq!(res.elems(), &[58, 64, 62, 70]);
    }

    #[test]
    fn subtraction_undoes_addition() {
        let mut rng = ChaCha8Rng::from_os_rng();

        let a = Matrix::sample_uniform_vector(257, &mut rng).unwrap();
        let b = Matrix::sample_uniform_vector(257, &mut rng).unwrap();

        let sum = (&a + &b).unwrap();
        assert_eq!((&sum - &b).unwrap(), a);
    }

    #[test]
    fn seed_expansion_is_deterministic() {
        let seed = [7u8; SEED_BYTE_LEN];
        let mut other_seed = seed;
        other_seed[0] ^= 1;

        let a = Matrix::generate_from_seed(32, 16, &seed).unwrap();
        let b = Matrix::generate_from_seed(32, 16, &seed).unwrap();
        let c = Matrix::generate_from_seed(32, 16, &other_seed).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn gaussian_samples_stay_small() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let vec = Matrix::sample_gaussian_vector(4096, 6.4, &mut rng).unwrap();

        // Ten standard deviations.
        assert!(vec.elems().iter().all(|&v| (v as i32).unsigned_abs() <= 64));
        assert!(vec.elems().iter().any(|&v| (v as i32) < 0));
    }

    #[test_case(8, 16, 10, 3; "columns not a multiple of the factor")]
    #[test_case(5, 18, 10, 3; "columns a multiple of the factor")]
    #[test_case(3, 7, 16, 2; "two elements per word")]
    #[test_case(4, 1, 10, 3; "single column")]
    fn squished_matrix_can_be_unsquished(rows: u32, cols: u32, basis: u32, factor: u32) {
        let mut rng = ChaCha8Rng::from_os_rng();
        let elems = (0..rows * cols).map(|_| rng.random_range(0..(1u32 << basis))).collect();
        let matrix = Matrix::from_values(rows, cols, elems).unwrap();

        let squished = matrix.squish(basis, factor);
        assert_eq!(squished.num_cols(), cols.div_ceil(factor));

        let unsquished = squished.unsquish(basis, factor, cols).unwrap();
        assert_eq!(unsquished, matrix);
    }

    #[test]
    fn squished_multiplication_matches_plain_multiplication() {
        const ROWS: u32 = 8;
        const COLS: u32 = 16;
        const BASIS: u32 = 10;
        const FACTOR: u32 = 3;

        let mut rng = ChaCha8Rng::from_os_rng();
        let elems = (0..ROWS * COLS).map(|_| rng.random_range(0..991)).collect();
        let matrix = Matrix::from_values(ROWS, COLS, elems).unwrap();
        let vector = Matrix::sample_uniform_vector(COLS, &mut rng).unwrap();

        let expected = (&matrix * &vector).unwrap();

        let squished = matrix.squish(BASIS, FACTOR);
        let padded = vector.pad_rows(COLS.div_ceil(FACTOR) * FACTOR).unwrap();
        let actual = squished.squished_matrix_x_vector(&padded, BASIS, FACTOR).unwrap();

        assert_eq!(actual, expected);
    }

    #[test_case(18 => matches Ok(_); "query padded to squished width")]
    #[test_case(16 => matches Err(BucketPIRError::IncompatibleDimensionForMatrixMultiplication); "unpadded query")]
    fn squished_multiplication_checks_vector_length(rows: u32) -> Result<Matrix, BucketPIRError> {
        let squished = Matrix::new(8, 16).unwrap().squish(10, 3);
        let vector = Matrix::new(rows, 1).unwrap();

        squished.squished_matrix_x_vector(&vector, 10, 3)
    }

    #[test]
    fn serialized_matrix_can_be_deserialized() {
        let mut rng = ChaCha8Rng::from_os_rng();
        let matrix = Matrix::sample_uniform_vector(100, &mut rng).unwrap();

        let bytes = matrix.to_le_bytes();
        assert_eq!(bytes.len(), 100 * 4);
        assert_eq!(Matrix::from_le_bytes(&bytes, 100, 1).unwrap(), matrix);
        assert!(matches!(
            Matrix::from_le_bytes(&bytes[1..], 100, 1),
            Err(BucketPIRError::FailedToDeserializeMatrixFromBytes { expected: 400, actual: 399 })
        ));
    }
}
