// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Primality testing and random prime search.
//!
//! Both prime searches in this crate share the oracle defined here: a sieve
//! over small odd primes followed by [`PRIMALITY_TEST_ROUNDS`] rounds of
//! Miller-Rabin with bases drawn from the caller's rng.

use crate::{
    cancellation::CancellationToken,
    errors::{InternalError, Result},
    instrumentation::{Event, Recorder},
    parameters::PRIMALITY_TEST_ROUNDS,
    utils::{random_bits, random_bn_below},
};
use lazy_static::lazy_static;
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};

/// Odd primes up to 53. Their product still fits in a `u64`.
const SMALL_PRIMES: [u64; 15] = [3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53];

lazy_static! {
    static ref SMALL_PRIMES_PRODUCT: BigNumber =
        BigNumber::from(SMALL_PRIMES.iter().product::<u64>());
}

/// Interpret a value known to be below 2^64 as a `u64`.
fn to_u64(n: &BigNumber) -> u64 {
    n.to_bytes()
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Returns `true` if `n` has a factor among [`SMALL_PRIMES`] (or 2) other than
/// itself.
pub(crate) fn has_small_factor(n: &BigNumber) -> bool {
    if n % BigNumber::from(2u64) == BigNumber::zero() {
        return n != &BigNumber::from(2u64);
    }
    let residue = to_u64(&(n % &*SMALL_PRIMES_PRODUCT));
    SMALL_PRIMES
        .iter()
        .any(|&p| residue % p == 0 && n != &BigNumber::from(p))
}

/// Probabilistic primality test with error probability at most `2^-128`.
///
/// Witnesses are drawn from `rng`, so the verdict is reproducible for a
/// seeded `rng`. Every call is reported to `recorder` as
/// [`Event::PrimalityTest`].
#[cfg_attr(feature = "flame_it", flame("primes"))]
pub(crate) fn is_probable_prime<R: RngCore + CryptoRng>(
    n: &BigNumber,
    rng: &mut R,
    recorder: &dyn Recorder,
) -> bool {
    recorder.record_event(Event::PrimalityTest);

    let one = BigNumber::one();
    let two = BigNumber::from(2u64);
    if n <= &one {
        return false;
    }
    if has_small_factor(n) {
        return false;
    }
    // Everything up to 53 that survived the sieve is one of the sieve primes.
    if n <= &BigNumber::from(53u64) {
        return true;
    }

    let n_minus_one = n - &one;
    let mut d = n_minus_one.clone();
    let mut s = 0usize;
    while &d % &two == BigNumber::zero() {
        d = d / &two;
        s += 1;
    }

    // Witnesses are uniform in [2, n - 2].
    let witness_range = n - BigNumber::from(3u64);
    'witness: for _ in 0..PRIMALITY_TEST_ROUNDS {
        let a = random_bn_below(rng, &witness_range) + &two;
        let mut x = a.modpow(&d, n);
        if x == one || x == n_minus_one {
            continue;
        }
        for _ in 1..s {
            x = x.modmul(&x, n);
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Sample a random odd number of exactly `bits` bits whose `top_bits` most
/// significant bits are all set.
pub(crate) fn random_odd_candidate<R: RngCore + CryptoRng>(
    rng: &mut R,
    bits: usize,
    top_bits: usize,
) -> BigNumber {
    let mut bytes = random_bits(rng, bits);
    for i in 0..top_bits.min(bits) {
        let bit = bits - 1 - i;
        let byte = bytes.len() - 1 - bit / 8;
        bytes[byte] |= 1 << (bit % 8);
    }
    if let Some(low) = bytes.last_mut() {
        *low |= 1;
    }
    BigNumber::from_slice(bytes)
}

/// Search for a random prime of exactly `bits` bits with the two top bits
/// set, so that the product of two such primes has exactly `2 * bits` bits.
///
/// The token is checked between candidates; a cancelled search returns
/// [`InternalError::Cancelled`].
pub(crate) fn random_prime<R: RngCore + CryptoRng>(
    bits: usize,
    rng: &mut R,
    recorder: &dyn Recorder,
    token: &CancellationToken,
) -> Result<BigNumber> {
    if bits < 3 {
        return arg_err!("prime bit length must be at least 3");
    }
    loop {
        if token.is_cancelled() {
            recorder.record_event(Event::SearchCancelled);
            return Err(InternalError::Cancelled);
        }
        let candidate = random_odd_candidate(rng, bits, 2);
        debug_assert_eq!(candidate.bit_length(), bits);
        if is_probable_prime(&candidate, rng, recorder) {
            return Ok(candidate);
        }
    }
}
