// Copyright (c) 2023 Bolt Labs, Inc.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Ring-Pedersen commitment setup.
//!
//! The setup is a modulus `NTilde = p1 * p2` built from two safe primes,
//! together with generators `h1` and `h2 = h1^alpha mod NTilde`. The exponent
//! `alpha` is the trapdoor and stays with the party that generated it.

use crate::{
    errors::{InternalError, Result},
    instrumentation::{Recorder, Step},
    parameters::SAMPLING_MAX_ATTEMPTS,
    safe_primes::SafePrime,
    utils::{is_in_z_star, mod_inverse, modpow, random_bn_in_z_star, random_positive_bn},
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The public part of a ring-Pedersen commitment setup.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RingPedersen {
    /// The RSA modulus, corresponding to `NTilde` in the paper.
    modulus: BigNumber,
    /// Ring-Pedersen parameter `h1`.
    h1: BigNumber,
    /// Ring-Pedersen parameter `h2 = h1^alpha`.
    h2: BigNumber,
}

/// The trapdoor behind a [`RingPedersen`] setup.
///
/// `alpha` relates the generators, `beta` is its inverse modulo `p'q'`, and
/// `p'`, `q'` are the Sophie Germain components of the two safe primes.
/// All four are zeroized when dropped.
#[derive(Serialize, Deserialize, ZeroizeOnDrop)]
pub struct RingPedersenSecrets {
    alpha: BigNumber,
    beta: BigNumber,
    p: BigNumber,
    q: BigNumber,
}

impl std::fmt::Debug for RingPedersenSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RingPedersenSecrets([redacted])")
    }
}

impl RingPedersenSecrets {
    /// The trapdoor exponent `alpha` with `h2 = h1^alpha mod NTilde`.
    pub fn alpha(&self) -> &BigNumber {
        &self.alpha
    }

    /// `beta = alpha^-1 mod p'q'`. For any quadratic residue `x` modulo
    /// `NTilde`, `(x^alpha)^beta = x`.
    pub fn beta(&self) -> &BigNumber {
        &self.beta
    }

    /// The Sophie Germain components `(p', q')` of the factors of `NTilde`.
    pub fn sophie_germain_primes(&self) -> (&BigNumber, &BigNumber) {
        (&self.p, &self.q)
    }

    fn order(&self) -> BigNumber {
        &self.p * &self.q
    }
}

impl RingPedersen {
    /// Derive a setup and its trapdoor from two distinct safe primes.
    ///
    /// `h1` is drawn uniformly from `Z*_NTilde`, `alpha` uniformly from
    /// `[1, NTilde)` and `h2 = h1^alpha mod NTilde`. A draw of `alpha` that is
    /// not invertible modulo `p'q'` is resampled. Exhausting the resampling
    /// bound for either value is a [`InternalError::GenerationFailed`].
    pub fn from_safe_primes<R: RngCore + CryptoRng>(
        primes: [&SafePrime; 2],
        rng: &mut R,
        recorder: &dyn Recorder,
    ) -> Result<(Self, RingPedersenSecrets)> {
        let [first, second] = primes;
        if first.safe_prime() == second.safe_prime() {
            error!("Tried to build NTilde from a repeated safe prime");
            return arg_err!("safe primes must be distinct");
        }
        let start = Instant::now();

        let modulus = first.safe_prime() * second.safe_prime();
        let h1 = random_bn_in_z_star(rng, &modulus)?;

        let mut order = first.sophie_germain() * second.sophie_germain();
        let sampled = (0..SAMPLING_MAX_ATTEMPTS).find_map(|_| {
            let mut alpha = random_positive_bn(rng, &modulus);
            match mod_inverse(&alpha, &order) {
                Some(beta) => Some((alpha, beta)),
                None => {
                    alpha.zeroize();
                    None
                }
            }
        });
        order.zeroize();
        let (alpha, beta) = sampled.ok_or_else(|| {
            error!("Could not sample an invertible trapdoor exponent");
            InternalError::GenerationFailed(String::from(
                "could not sample an invertible trapdoor exponent",
            ))
        })?;
        let h2 = modpow(&h1, &alpha, &modulus);

        recorder.record_duration(Step::CommitmentSetup, start.elapsed());
        Ok((
            Self { modulus, h1, h2 },
            RingPedersenSecrets {
                alpha,
                beta,
                p: first.sophie_germain().clone(),
                q: second.sophie_germain().clone(),
            },
        ))
    }

    /// Returns the underlying modulus `NTilde`.
    pub fn modulus(&self) -> &BigNumber {
        &self.modulus
    }

    /// Returns the underlying `h1` parameter.
    pub fn h1(&self) -> &BigNumber {
        &self.h1
    }

    /// Returns the underlying `h2` parameter.
    pub fn h2(&self) -> &BigNumber {
        &self.h2
    }

    /// Check that the setup is well formed and matches `secrets`.
    pub(crate) fn is_consistent_with(&self, secrets: &RingPedersenSecrets) -> bool {
        let two = BigNumber::from(2u64);
        let one = BigNumber::one();
        if secrets.p <= one || secrets.q <= one {
            return false;
        }
        let p1 = &secrets.p * &two + &one;
        let p2 = &secrets.q * &two + &one;
        let mut order = secrets.order();
        let consistent = p1 != p2
            && self.modulus == &p1 * &p2
            && is_in_z_star(&self.h1, &self.modulus)
            && is_in_z_star(&self.h2, &self.modulus)
            && modpow(&self.h1, &secrets.alpha, &self.modulus) == self.h2
            && secrets.alpha.modmul(&secrets.beta, &order).is_one();
        order.zeroize();
        consistent
    }

    #[cfg(test)]
    pub(crate) fn with_h1(mut self, h1: BigNumber) -> Self {
        self.h1 = h1;
        self
    }
}
