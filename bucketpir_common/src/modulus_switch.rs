//! Lossy wire codec shrinking ciphertext elements from `logq` to `MOD_SWITCH_BITS` bits.

use crate::{error::BucketPIRError, matrix::Matrix, params::MOD_SWITCH_BITS};
use rand::Rng;

/// Byte length of `num_elems` modulus switched elements. Always a multiple of four, and always carrying at least one
/// word past the last packed bit.
pub const fn switched_len(num_elems: usize) -> usize {
    let len = (num_elems * MOD_SWITCH_BITS as usize).div_ceil(u8::BITS as usize);
    len + 4 - len % 4
}

#[inline(always)]
const fn digit_mask() -> u64 {
    (1u64 << MOD_SWITCH_BITS) - 1
}

/// Re-quantizes every element of `matrix`, assumed reduced modulo `2^logq`, to `MOD_SWITCH_BITS` bits and packs the
/// digits contiguously, least significant bit first, into little-endian 32 -bit words.
///
/// Division by `2^(logq - MOD_SWITCH_BITS)` is rounded up with probability equal to its fractional remainder, so the
/// expected quantization error is zero.
pub fn switch<R: Rng>(matrix: &Matrix, logq: u32, rng: &mut R) -> Vec<u8> {
    let shift = logq.saturating_sub(MOD_SWITCH_BITS);
    let rem_mask = (1u64 << shift) - 1;

    let mut output = Vec::with_capacity(switched_len(matrix.num_elems()));

    let mut floating = 0u64;
    let mut floating_bits = 0u32;

    for &elem in matrix.elems() {
        let elem = elem as u64;
        let mut digit = elem >> shift;

        let remainder = elem & rem_mask;
        if remainder > 0 && rng.random_range(0..(1u64 << shift)) < remainder {
            digit += 1;
        }

        // Rounding up the largest digit wraps to zero, which is still correct modulo q.
        floating |= (digit & digit_mask()) << floating_bits;
        floating_bits += MOD_SWITCH_BITS;

        if floating_bits >= u32::BITS {
            output.extend_from_slice(&(floating as u32).to_le_bytes());
            floating >>= u32::BITS;
            floating_bits -= u32::BITS;
        }
    }

    if floating_bits > 0 {
        output.extend_from_slice(&(floating as u32).to_le_bytes());
    }

    output.resize(switched_len(matrix.num_elems()), 0);
    output
}

/// Unpacks `rows * cols` modulus switched elements, placing every digit in the high bits of a `logq` -bit element.
///
/// # Returns
///
/// * `Result<Matrix, BucketPIRError>` - Matrix whose elements are within one switched unit of the originals. Fails if
///   `bytes` isn't exactly `switched_len(rows * cols)` long.
pub fn switch_back(bytes: &[u8], rows: u32, cols: u32, logq: u32) -> Result<Matrix, BucketPIRError> {
    let num_elems = rows as usize * cols as usize;

    let expected = switched_len(num_elems);
    if bytes.len() != expected {
        return Err(BucketPIRError::UnexpectedPayloadLength {
            what: "modulus switched matrix",
            expected,
            actual: bytes.len(),
        });
    }

    let shift = logq.saturating_sub(MOD_SWITCH_BITS);

    let elems = (0..num_elems)
        .map(|i| {
            let bit = i * MOD_SWITCH_BITS as usize;
            let from = bit / u8::BITS as usize;

            let mut word = [0u8; 4];
            let available = (bytes.len() - from).min(word.len());
            word[..available].copy_from_slice(&bytes[from..from + available]);

            let digit = (u32::from_le_bytes(word) >> (bit % u8::BITS as usize)) as u64 & digit_mask();
            (digit << shift) as u32
        })
        .collect();

    Matrix::from_values(rows, cols, elems)
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;
    use test_case::test_case;

    /// Distance, in switched units, from the truncated original to the restored value.
    fn drift(original: u32, restored: u32, logq: u32) -> u64 {
        let shift = logq - MOD_SWITCH_BITS;
        let truncated = original as u64 >> shift;
        let restored = restored as u64 >> shift;

        restored.wrapping_sub(truncated) & digit_mask()
    }

    #[test_case(512, 32; "full width elements")]
    #[test_case(513, 32; "element count not word aligned")]
    #[test_case(1, 32; "single element")]
    #[test_case(257, 30; "narrower ciphertext modulus")]
    fn switched_elements_are_accurate_within_one_unit(num_elems: u32, logq: u32) {
        let mut rng = ChaCha8Rng::from_os_rng();

        let mut matrix = Matrix::sample_uniform_vector(num_elems, &mut rng).unwrap();
        matrix.reduce(((1u64 << logq) - 1) as u32);

        let bytes = switch(&matrix, logq, &mut rng);
        assert_eq!(bytes.len(), switched_len(num_elems as usize));

        let restored = switch_back(&bytes, num_elems, 1, logq).unwrap();
        for (&original, &restored) in matrix.elems().iter().zip(restored.elems()) {
            assert!(drift(original, restored, logq) <= 1);
        }
    }

    #[test]
    fn zeros_stay_zeros() {
        let mut rng = ChaCha8Rng::from_os_rng();
        let matrix = Matrix::new(512, 1).unwrap();

        let restored = switch_back(&switch(&matrix, 32, &mut rng), 512, 1, 32).unwrap();
        assert!(restored.elems().iter().all(|&v| v == 0));
    }

    #[test]
    fn exact_multiples_are_not_rounded() {
        let mut rng = ChaCha8Rng::from_os_rng();
        let elems = (0..100u32).map(|i| i << (32 - MOD_SWITCH_BITS)).collect();
        let matrix = Matrix::from_values(100, 1, elems).unwrap();

        let restored = switch_back(&switch(&matrix, 32, &mut rng), 100, 1, 32).unwrap();
        assert_eq!(restored, matrix);
    }

    #[test_case(0 => 4; "empty payload still carries one word")]
    #[test_case(1 => 4; "one element")]
    #[test_case(32 => 80; "whole number of words gets an extra word")]
    #[test_case(33 => 80; "partial trailing byte")]
    fn switched_payload_length(num_elems: usize) -> usize {
        switched_len(num_elems)
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let mut rng = ChaCha8Rng::from_os_rng();
        let matrix = Matrix::new(16, 1).unwrap();
        let bytes = switch(&matrix, 32, &mut rng);

        assert!(matches!(
            switch_back(&bytes[..bytes.len() - 1], 16, 1, 32),
            Err(BucketPIRError::UnexpectedPayloadLength { .. })
        ));
    }
}
