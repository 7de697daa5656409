// Copyright (c) 2023 Bolt Labs, Inc.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Generation of a party's preparation parameters.
//!
//! The Paillier keypair and the two safe primes behind `NTilde` are found by
//! two tasks running side by side. If either task fails, the other one is
//! cancelled and the first error is returned. Once both succeed the
//! ring-Pedersen setup is derived from the safe primes.

use crate::{
    cancellation::CancellationToken,
    config::PreparationConfig,
    errors::{InternalError, Result},
    instrumentation::{Recorder, Step, TracingRecorder},
    paillier::DecryptionKey,
    parameters::SAFE_PRIME_COUNT,
    ring_pedersen::{RingPedersen, RingPedersenSecrets},
    safe_primes::{SafePrime, SafePrimeSearch},
};
use libpaillier::unknown_order::BigNumber;
use rand::{rngs::OsRng, CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::{sync::mpsc::channel, thread, time::Instant};
use tracing::{error, info, instrument};

/// The preparation parameters of a single party.
///
/// Owns the Paillier secret key, the public ring-Pedersen setup
/// `(NTilde, h1, h2)` and the trapdoor behind it. Not `Clone`; the secret
/// parts are zeroized when dropped.
#[derive(Serialize, Deserialize)]
pub struct PreparationResult {
    paillier_sk: DecryptionKey,
    setup: RingPedersen,
    secrets: RingPedersenSecrets,
}

impl std::fmt::Debug for PreparationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparationResult")
            .field("paillier_sk", &self.paillier_sk)
            .field("setup", &self.setup)
            .field("secrets", &self.secrets)
            .finish()
    }
}

impl PreparationResult {
    /// Generate fresh preparation parameters.
    ///
    /// The configuration is checked before anything else happens, so an
    /// invalid configuration never costs a primality test. All randomness is
    /// drawn from `rng`; a seeded `rng` reproduces the same result no matter
    /// how many workers ran the search.
    #[cfg_attr(feature = "flame_it", flame("preparation"))]
    #[instrument(skip_all, err(Debug))]
    pub fn generate<R: RngCore + CryptoRng>(
        config: &PreparationConfig,
        rng: &mut R,
        recorder: &dyn Recorder,
    ) -> Result<Self> {
        Self::generate_with(config, rng, recorder, DecryptionKey::generate::<ChaCha20Rng>)
    }

    /// [`PreparationResult::generate`] with the Paillier generator supplied
    /// by the caller.
    fn generate_with<R, G>(
        config: &PreparationConfig,
        rng: &mut R,
        recorder: &dyn Recorder,
        paillier_keygen: G,
    ) -> Result<Self>
    where
        R: RngCore + CryptoRng,
        G: FnOnce(usize, &mut ChaCha20Rng, &dyn Recorder, &CancellationToken) -> Result<DecryptionKey>
            + Send,
    {
        let concurrency = config.resolve_concurrency()?;
        config.validate()?;
        let mut search =
            SafePrimeSearch::new(config.safe_prime_bits(), SAFE_PRIME_COUNT, concurrency)?;
        if let Some(timeout) = config.timeout() {
            search = search.with_timeout(timeout);
        }

        let start = Instant::now();
        let mut search_seed = [0u8; 32];
        rng.fill_bytes(&mut search_seed);
        let mut paillier_seed = [0u8; 32];
        rng.fill_bytes(&mut paillier_seed);

        let modulus_bits = config.paillier_modulus_bits();
        let token = CancellationToken::new();
        let (paillier_sk, primes) = join_fail_fast(
            &token,
            move |token| {
                let mut paillier_rng = ChaCha20Rng::from_seed(paillier_seed);
                paillier_keygen(modulus_bits, &mut paillier_rng, recorder, token)
            },
            |token| search.run(search_seed, recorder, token),
        )?;

        // The safe primes are zeroized when `primes` goes out of scope.
        let result = Self::assemble(paillier_sk, &primes, rng, recorder)?;

        recorder.record_duration(Step::Preparation, start.elapsed());
        info!("Generated preparation parameters.");
        Ok(result)
    }

    fn assemble<R: RngCore + CryptoRng>(
        paillier_sk: DecryptionKey,
        primes: &[SafePrime],
        rng: &mut R,
        recorder: &dyn Recorder,
    ) -> Result<Self> {
        let [first, second] = primes else {
            error!("Expected exactly {} safe primes", SAFE_PRIME_COUNT);
            return Err(InternalError::InternalInvariantFailed);
        };
        let (p, q) = paillier_sk.primes();
        if [first, second]
            .iter()
            .any(|prime| prime.safe_prime() == p || prime.safe_prime() == q)
        {
            error!("A Paillier prime coincides with a safe prime");
            return Err(InternalError::GenerationFailed(String::from(
                "Paillier primes must differ from the safe primes",
            )));
        }
        let (setup, secrets) = RingPedersen::from_safe_primes([first, second], rng, recorder)?;
        Ok(Self {
            paillier_sk,
            setup,
            secrets,
        })
    }

    /// The Paillier secret key, which contains the public key.
    pub fn paillier_key(&self) -> &DecryptionKey {
        &self.paillier_sk
    }

    /// The public ring-Pedersen setup.
    pub fn commitment_setup(&self) -> &RingPedersen {
        &self.setup
    }

    /// The trapdoor of the ring-Pedersen setup.
    pub fn trapdoor(&self) -> &RingPedersenSecrets {
        &self.secrets
    }

    /// `NTilde`, the product of the two safe primes.
    pub fn n_tilde(&self) -> &BigNumber {
        self.setup.modulus()
    }

    /// The generator `h1` of `Z*_NTilde`.
    pub fn h1(&self) -> &BigNumber {
        self.setup.h1()
    }

    /// `h2 = h1^alpha mod NTilde`.
    pub fn h2(&self) -> &BigNumber {
        self.setup.h2()
    }

    /// Check that all parts fit together.
    pub fn validate(&self) -> Result<()> {
        if !self.paillier_sk.is_consistent() {
            error!("Paillier key is inconsistent");
            return arg_err!("inconsistent Paillier key");
        }
        if !self.setup.is_consistent_with(&self.secrets) {
            error!("Ring-Pedersen setup does not match its trapdoor");
            return arg_err!("inconsistent ring-Pedersen setup");
        }
        let (p, q) = self.paillier_sk.primes();
        let (p_tilde, q_tilde) = self.secrets.sophie_germain_primes();
        let two = BigNumber::from(2u64);
        let overlaps = [p_tilde, q_tilde].iter().any(|&component| {
            let safe_prime = component * &two + BigNumber::one();
            &safe_prime == p || &safe_prime == q
        });
        if overlaps {
            error!("Paillier modulus shares a factor with NTilde");
            return arg_err!("Paillier primes must differ from the safe primes");
        }
        Ok(())
    }

    /// Serialize with bincode.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serialize!(self)
    }

    /// Deserialize with bincode, rejecting parameters that fail
    /// [`PreparationResult::validate`].
    pub fn from_slice<B: AsRef<[u8]>>(bytes: B) -> Result<Self> {
        let result: Self = deserialize!(bytes.as_ref())?;
        result.validate()?;
        Ok(result)
    }
}

enum Joined<A, B> {
    First(Result<A>),
    Second(Result<B>),
}

/// Run two tasks on their own threads and wait for both.
///
/// The first error cancels `token`, which both tasks receive, and is returned
/// as soon as the sibling has wound down.
fn join_fail_fast<A, B, FA, FB>(token: &CancellationToken, first: FA, second: FB) -> Result<(A, B)>
where
    A: Send,
    B: Send,
    FA: FnOnce(&CancellationToken) -> Result<A> + Send,
    FB: FnOnce(&CancellationToken) -> Result<B> + Send,
{
    let (tx, rx) = channel();
    thread::scope(|scope| {
        let first_tx = tx.clone();
        let _ = scope.spawn(move || {
            let _ = first_tx.send(Joined::First(first(token)));
        });
        let _ = scope.spawn(move || {
            let _ = tx.send(Joined::Second(second(token)));
        });

        let (mut a, mut b) = (None, None);
        while a.is_none() || b.is_none() {
            match rx.recv() {
                Ok(Joined::First(Ok(value))) => a = Some(value),
                Ok(Joined::Second(Ok(value))) => b = Some(value),
                Ok(Joined::First(Err(e))) | Ok(Joined::Second(Err(e))) => {
                    error!("Preparation task failed, cancelling its sibling: {}", e);
                    token.cancel();
                    return Err(e);
                }
                Err(_) => {
                    error!("A preparation task exited without reporting a result");
                    token.cancel();
                    return Err(InternalError::InternalInvariantFailed);
                }
            }
        }
        a.zip(b).ok_or(InternalError::InternalInvariantFailed)
    })
}

/// Generate preparation parameters with the protocol bit lengths and the
/// operating system's randomness.
///
/// `concurrency` is the number of safe-prime search workers; `None` uses the
/// host's available parallelism and `Some(0)` is a configuration error.
pub fn generate_preparation_params(concurrency: Option<usize>) -> Result<PreparationResult> {
    let config = PreparationConfig::default().with_concurrency(concurrency);
    PreparationResult::generate(&config, &mut OsRng, &TracingRecorder)
}
