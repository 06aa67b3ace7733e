//! # GCD Computation
//!
//! `n = gcd(s1^e - em1, s2^e - em2)` over arbitrary-precision integers, with
//! the same small-prime cleanup the recovery engine applies.

use kr_01_key_recovery::domain::keys::MAX_MODULUS_BITS;
use kr_01_key_recovery::{power_difference_gcd, strip_small_primes};
use num_bigint::BigUint;

use super::errors::ComputeError;
use super::request::Operands;

/// Fixed exponent and cleanup primes for one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcdComputation {
    pub exponent: u32,
    pub small_primes: Vec<u32>,
    /// Operands above this size are refused rather than exponentiated.
    pub max_operand_bits: u64,
}

impl Default for GcdComputation {
    fn default() -> Self {
        Self {
            exponent: 65537,
            small_primes: vec![2, 3, 5, 17, 257, 65537],
            max_operand_bits: MAX_MODULUS_BITS as u64,
        }
    }
}

impl GcdComputation {
    pub fn with_exponent(mut self, exponent: u32) -> Self {
        self.exponent = exponent;
        self
    }

    pub fn compute(&self, operands: &Operands) -> Result<BigUint, ComputeError> {
        for (name, value) in operands.named() {
            let bits = value.bits();
            if bits > self.max_operand_bits {
                return Err(ComputeError::OperandTooLarge {
                    name,
                    bits,
                    max: self.max_operand_bits,
                });
            }
        }

        let n = power_difference_gcd(
            (&operands.s1, &operands.em1),
            (&operands.s2, &operands.em2),
            self.exponent,
        );
        Ok(strip_small_primes(n, &self.small_primes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const N: u32 = 1_000_003;

    fn operands(s1: i64, em1: i64, s2: i64, em2: i64) -> Operands {
        Operands {
            s1: s1.into(),
            s2: s2.into(),
            em1: em1.into(),
            em2: em2.into(),
        }
    }

    fn cube() -> GcdComputation {
        GcdComputation::default().with_exponent(3)
    }

    /// Test: two "signatures" under the same modulus yield the modulus
    #[test]
    fn test_recovers_modulus() {
        // 200^3 mod N, 300^3 mod N
        let ops = operands(200, 999_979, 300, 999_922);
        assert_eq!(cube().compute(&ops).unwrap(), BigUint::from(N));
    }

    /// Test: a shared factor of 8 is stripped
    #[test]
    fn test_strips_cofactor() {
        // gcd is 8 * N before cleanup
        let ops = operands(201, 120_577, 202, 242_384);
        assert_eq!(cube().compute(&ops).unwrap(), BigUint::from(N));

        let no_cleanup = GcdComputation {
            small_primes: vec![],
            ..cube()
        };
        assert_eq!(no_cleanup.compute(&ops).unwrap(), BigUint::from(8 * N));
    }

    /// Test: negative terms use the magnitude of the gcd
    #[test]
    fn test_negative_term() {
        let ops = operands(1, 1 + N as i64, 200, 999_979);
        assert_eq!(cube().compute(&ops).unwrap(), BigUint::from(N));
    }

    /// Test: oversized operands are refused before exponentiation
    #[test]
    fn test_operand_too_large() {
        let computation = GcdComputation {
            max_operand_bits: 16,
            ..cube()
        };
        let ops = operands(200, 999_979, 300, 999_922);
        assert_eq!(
            computation.compute(&ops),
            Err(ComputeError::OperandTooLarge {
                name: "em1",
                bits: 20,
                max: 16
            })
        );
    }

    /// Test: default exponent and cleanup primes
    #[test]
    fn test_defaults() {
        let computation = GcdComputation::default();
        assert_eq!(computation.exponent, 65537);
        assert_eq!(computation.small_primes, vec![2, 3, 5, 17, 257, 65537]);
    }
}
