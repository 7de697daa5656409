// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::{
    errors::{InternalError, Result},
    parameters::SAMPLING_MAX_ATTEMPTS,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use tracing::error;

/// Computes a^e (mod n)
#[cfg_attr(feature = "flame_it", flame("utils"))]
pub(crate) fn modpow(a: &BigNumber, e: &BigNumber, n: &BigNumber) -> BigNumber {
    a.modpow(e, n)
}

/// Computes `x^-1 (mod n)`, or `None` if `x` has no inverse modulo `n`.
///
/// The gcd is checked first; `BigNumber::invert` is only called on values
/// that are known to be invertible.
pub(crate) fn mod_inverse(x: &BigNumber, n: &BigNumber) -> Option<BigNumber> {
    if n <= &BigNumber::one() || !x.gcd(n).is_one() {
        return None;
    }
    x.invert(n)
}

/// Fill a big-endian buffer with `bits` random bits.
pub(crate) fn random_bits<R: RngCore + CryptoRng>(rng: &mut R, bits: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; (bits + 7) / 8];
    rng.fill_bytes(&mut bytes);
    let excess = bytes.len() * 8 - bits;
    if let Some(top) = bytes.first_mut() {
        *top &= 0xff >> excess;
    }
    bytes
}

/// Generate a uniformly random BigNumber in the range 0..n.
///
/// Rejection sampling over `n.bit_length()` bits, so every draw comes from
/// `rng` and a seeded `rng` yields a reproducible value.
pub(crate) fn random_bn_below<R: RngCore + CryptoRng>(rng: &mut R, n: &BigNumber) -> BigNumber {
    let bits = n.bit_length();
    loop {
        let candidate = BigNumber::from_slice(random_bits(rng, bits));
        if &candidate < n {
            return candidate;
        }
    }
}

/// Generate a uniformly random BigNumber in the range 1..n (n >= 2).
pub(crate) fn random_positive_bn<R: RngCore + CryptoRng>(rng: &mut R, n: &BigNumber) -> BigNumber {
    random_bn_below(rng, &(n - BigNumber::one())) + BigNumber::one()
}

/// Returns `true` if `x` lies in the multiplicative group `Z*_n`.
pub(crate) fn is_in_z_star(x: &BigNumber, n: &BigNumber) -> bool {
    x > &BigNumber::zero() && x < n && x.gcd(n).is_one()
}

/// Generate a uniformly random element of `Z*_n`.
///
/// Non-invertible draws are resampled; after [`SAMPLING_MAX_ATTEMPTS`]
/// failures this gives up rather than looping forever.
pub(crate) fn random_bn_in_z_star<R: RngCore + CryptoRng>(
    rng: &mut R,
    n: &BigNumber,
) -> Result<BigNumber> {
    if n <= &BigNumber::one() {
        return arg_err!("Z*_n is empty for n <= 1");
    }
    for _ in 0..SAMPLING_MAX_ATTEMPTS {
        let candidate = random_positive_bn(rng, n);
        if candidate.gcd(n).is_one() {
            return Ok(candidate);
        }
    }
    error!("Could not sample an invertible element modulo n");
    Err(InternalError::GenerationFailed(String::from(
        "could not sample an element of Z*_n",
    )))
}
