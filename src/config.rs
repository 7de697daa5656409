// Copyright (c) 2023 Bolt Labs, Inc.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Configuration for a preparation run.

use crate::{
    errors::Result,
    parameters::{
        MIN_PAILLIER_MODULUS_BITS, MIN_SAFE_PRIME_BITS, PAILLIER_MODULUS_BITS, SAFE_PRIME_BITS,
    },
};
use std::{num::NonZeroUsize, thread, time::Duration};
use tracing::{error, warn};

/// Settings for [`PreparationResult::generate`](crate::PreparationResult::generate).
///
/// The defaults are the protocol parameters; smaller bit lengths are only
/// meant for tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparationConfig {
    concurrency: Option<usize>,
    safe_prime_bits: usize,
    paillier_modulus_bits: usize,
    timeout: Option<Duration>,
}

impl Default for PreparationConfig {
    fn default() -> Self {
        Self {
            concurrency: None,
            safe_prime_bits: SAFE_PRIME_BITS,
            paillier_modulus_bits: PAILLIER_MODULUS_BITS,
            timeout: None,
        }
    }
}

impl PreparationConfig {
    /// Number of safe-prime search workers. `None` uses the host's available
    /// parallelism.
    pub fn with_concurrency(mut self, concurrency: Option<usize>) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Bit length of the Sophie Germain component of each safe prime.
    pub fn with_safe_prime_bits(mut self, bits: usize) -> Self {
        self.safe_prime_bits = bits;
        self
    }

    /// Bit length of the Paillier modulus.
    pub fn with_paillier_modulus_bits(mut self, bits: usize) -> Self {
        self.paillier_modulus_bits = bits;
        self
    }

    /// Abort the safe-prime search with
    /// [`InternalError::TimedOut`](crate::InternalError::TimedOut) once
    /// `timeout` has passed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn safe_prime_bits(&self) -> usize {
        self.safe_prime_bits
    }

    pub(crate) fn paillier_modulus_bits(&self) -> usize {
        self.paillier_modulus_bits
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The number of search workers this configuration asks for.
    ///
    /// An explicit zero is rejected rather than replaced by a default.
    pub fn resolve_concurrency(&self) -> Result<usize> {
        match self.concurrency {
            Some(0) => {
                error!("Concurrency must be a positive integer, got 0");
                config_err!("concurrency must be a positive integer")
            }
            Some(concurrency) => Ok(concurrency),
            None => Ok(thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or_else(|e| {
                    warn!("Could not determine host parallelism ({}), using 1", e);
                    1
                })),
        }
    }

    /// Check the bit lengths before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.safe_prime_bits < MIN_SAFE_PRIME_BITS {
            error!(
                "Safe prime bit length {} is below the minimum of {}",
                self.safe_prime_bits, MIN_SAFE_PRIME_BITS
            );
            return config_err!("safe prime bit length is too small");
        }
        if self.paillier_modulus_bits < MIN_PAILLIER_MODULUS_BITS
            || self.paillier_modulus_bits % 2 != 0
        {
            error!(
                "Paillier modulus bit length {} must be even and at least {}",
                self.paillier_modulus_bits, MIN_PAILLIER_MODULUS_BITS
            );
            return config_err!("invalid Paillier modulus bit length");
        }
        Ok(())
    }
}
