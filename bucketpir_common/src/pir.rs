//! SimplePIR style single-server PIR, answering a whole database column per query.
//!
//! The server encodes its database as an `l x m` matrix `D` of zero-centered Z_p elements, expands a public matrix
//! `A` (`m x n`) from a seed and publishes the hint `H = D x A`. To fetch column `c` the client sends
//! `q = A s + e + delta * u_c`, the server answers `D' q` over its squished database `D' = D + p/2` and the client
//! strips `H s` and the `p/2 * sum(q)` term introduced by `D'`, before rounding away the noise.

use crate::{
    database::{Database, DatabaseInfo},
    error::BucketPIRError,
    matrix::{Matrix, checked_dim},
    params::{Params, SEED_BYTE_LEN},
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::sync::{Mutex, PoisonError};

/// Injectable source of public matrix seeds. Many buckets may be set up concurrently, each drawing its seed from the
/// same generator; the lock is held only while a seed is sampled.
pub struct SeedSource {
    rng: Mutex<ChaCha8Rng>,
}

impl SeedSource {
    pub fn from_os_rng() -> SeedSource {
        SeedSource {
            rng: Mutex::new(ChaCha8Rng::from_os_rng()),
        }
    }

    /// Deterministic source, for reproducible benchmarks and tests.
    pub fn seed_from_u64(state: u64) -> SeedSource {
        SeedSource {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(state)),
        }
    }

    pub fn sample(&self) -> [u8; SEED_BYTE_LEN] {
        let mut seed = [0u8; SEED_BYTE_LEN];

        // A poisoned lock still guards a usable generator.
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.fill_bytes(&mut seed);

        seed
    }
}

impl Default for SeedSource {
    fn default() -> Self {
        SeedSource::from_os_rng()
    }
}

/// Public LWE matrix `A`, along with the seed it was expanded from.
#[derive(Clone, Debug)]
pub struct SharedState {
    seed: [u8; SEED_BYTE_LEN],
    lwe_matrix: Matrix,
}

impl SharedState {
    /// Samples a fresh seed from `seeds` and expands it.
    pub fn init(params: &Params, seeds: &SeedSource) -> Result<SharedState, BucketPIRError> {
        SharedState::from_seed(params, seeds.sample())
    }

    /// Expands `seed` into the `m x n` public matrix, reduced modulo q.
    pub fn from_seed(params: &Params, seed: [u8; SEED_BYTE_LEN]) -> Result<SharedState, BucketPIRError> {
        let mut lwe_matrix = Matrix::generate_from_seed(checked_dim(params.m)?, checked_dim(params.n as u64)?, &seed)?;
        lwe_matrix.reduce(params.q_mask());

        Ok(SharedState { seed, lwe_matrix })
    }

    #[inline(always)]
    pub const fn seed(&self) -> &[u8; SEED_BYTE_LEN] {
        &self.seed
    }

    #[inline(always)]
    pub const fn lwe_matrix(&self) -> &Matrix {
        &self.lwe_matrix
    }
}

/// Client secret belonging to exactly one query.
#[derive(Clone, Debug)]
pub struct Secret(Matrix);

/// Computes the hint `H = D x A` over the zero-centered database, then squishes the database for answering.
///
/// # Returns
///
/// * `Result<Matrix, BucketPIRError>` - The `l x n` hint matrix.
pub fn setup(db: &mut Database, shared: &SharedState, params: &Params) -> Result<Matrix, BucketPIRError> {
    db.unsquish()?;

    let mut hint = (db.data() * shared.lwe_matrix())?;
    hint.reduce(params.q_mask());

    db.squish()?;

    Ok(hint)
}

/// Builds an encrypted query for database column `column`.
///
/// # Arguments
///
/// * `column` - Target column, in `[0, m)`.
/// * `shared` - Public matrix of the database being queried.
/// * `params` - Parameters of the database being queried.
/// * `rng` - Source of the secret and the error.
///
/// # Returns
///
/// * `Result<(Secret, Matrix), BucketPIRError>` - The secret, needed to recover the answer, and the query vector
///   already padded to `params.query_size()` rows. Fails if the column is out of range.
pub fn query<R: Rng>(column: u64, shared: &SharedState, params: &Params, rng: &mut R) -> Result<(Secret, Matrix), BucketPIRError> {
    if column >= params.m {
        return Err(BucketPIRError::ColumnOutOfRange { column, cols: params.m });
    }

    let mut secret = Matrix::sample_uniform_vector(checked_dim(params.n as u64)?, rng)?;
    secret.reduce(params.q_mask());

    let error = Matrix::sample_gaussian_vector(checked_dim(params.m)?, params.sigma, rng)?;

    let mut query = (&(shared.lwe_matrix() * &secret)? + &error)?;
    query[(column as usize, 0)] = query[(column as usize, 0)].wrapping_add(params.delta() as u32);
    query.reduce(params.q_mask());

    let query = query.pad_rows(checked_dim(params.query_size())?)?;

    Ok((Secret(secret), query))
}

/// Computes the answer `D' q` for one query.
///
/// A squished database is multiplied in packed form. An unsquished one yields the same answer, by adding the `p/2`
/// shift to the product explicitly.
pub fn answer(db: &Database, query: &Matrix, params: &Params) -> Result<Matrix, BucketPIRError> {
    if query.num_cols() != 1 || query.num_rows() as u64 != params.query_size() {
        return Err(BucketPIRError::UnexpectedPayloadLength {
            what: "query vector",
            expected: params.query_size() as usize,
            actual: query.num_elems(),
        });
    }

    let info = db.info();

    let mut answer = if db.is_squished() {
        db.data().squished_matrix_x_vector(query, info.basis, info.squishing)?
    } else {
        let truncated = Matrix::from_values(checked_dim(params.m)?, 1, query.elems()[..params.m as usize].to_vec())?;
        let mut answer = (db.data() * &truncated)?;

        let shift = truncated
            .elems()
            .iter()
            .fold(0u32, |acc, &v| acc.wrapping_add(v))
            .wrapping_mul((params.p / 2) as u32);
        answer.add_scalar(shift);
        answer
    };
    answer.reduce(params.q_mask());

    Ok(answer)
}

/// Decrypts an answer and reconstructs every entry stored in the queried column.
///
/// # Arguments
///
/// * `hint` - The `l x n` hint received offline.
/// * `query` - The query vector which was sent, padded or not.
/// * `answer` - The `l x 1` answer.
/// * `secret` - Secret returned along with `query`.
/// * `params` - Parameters of the database being queried.
/// * `info` - Shape of the database being queried.
///
/// # Returns
///
/// * `Result<Vec<u64>, BucketPIRError>` - `info.entries_per_column(params.l)` logical entries, in row order. Fails if
///   any input's shape doesn't match the parameters.
pub fn recover_column(
    hint: &Matrix,
    query: &Matrix,
    answer: &Matrix,
    secret: &Secret,
    params: &Params,
    info: &DatabaseInfo,
) -> Result<Vec<u64>, BucketPIRError> {
    let (l, n) = (params.l, params.n as u64);

    let shapes_match = hint.num_rows() as u64 == l
        && hint.num_cols() as u64 == n
        && answer.num_rows() as u64 == l
        && answer.num_cols() == 1
        && query.num_cols() == 1
        && query.num_rows() as u64 >= params.m
        && secret.0.num_rows() as u64 == n;
    if !shapes_match {
        return Err(BucketPIRError::InvalidRecoverInputs);
    }

    let mask = params.q_mask();

    // Cancels the p/2 shift of the squished database.
    let ratio = (params.p / 2) as u32;
    let offset = query.elems()[..params.m as usize]
        .iter()
        .fold(0u32, |acc, &v| acc.wrapping_add(ratio.wrapping_mul(v)))
        .wrapping_neg()
        & mask;

    let interm = (hint * &secret.0)?;

    let digits: Vec<u64> = answer
        .elems()
        .iter()
        .zip(interm.elems())
        .map(|(&ans, &hs)| {
            let noised = ans.wrapping_sub(hs).wrapping_add(offset) & mask;
            params.round(noised as u64)
        })
        .collect();

    Ok(info.reconstruct_entries(&digits))
}
