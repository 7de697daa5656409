// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Concurrent search for safe primes.
//!
//! A safe prime is a prime `p = 2q + 1` whose Sophie Germain component `q` is
//! prime too. Safe primes are rare, so [`SafePrimeSearch`] spreads random
//! candidates over a pool of worker threads.
//!
//! Candidate `i` is sampled from ChaCha20 stream `i` under a single 32-byte
//! seed. Workers claim indices from a shared counter, and the coordinator only
//! accepts results in ascending index order. For a fixed seed the search
//! therefore returns the same primes regardless of how many workers ran it or
//! how they were scheduled.

use crate::{
    cancellation::CancellationToken,
    errors::{InternalError, Result},
    instrumentation::{Event, Recorder, Step, TracingRecorder},
    parameters::{CANDIDATES_PER_SQUARED_BIT, MIN_SAFE_PRIME_BITS},
    primes::{has_small_factor, is_probable_prime, random_odd_candidate},
};
use libpaillier::unknown_order::BigNumber;
use rand::{rngs::OsRng, CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{channel, RecvTimeoutError, Sender},
    },
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, error, instrument};
use zeroize::ZeroizeOnDrop;

/// A Sophie Germain prime `q` together with its safe prime `p = 2q + 1`.
///
/// Both values are zeroized when dropped.
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct SafePrime {
    q: BigNumber,
    p: BigNumber,
}

impl std::fmt::Debug for SafePrime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafePrime")
            .field("q", &"[redacted]")
            .field("p", &"[redacted]")
            .finish()
    }
}

impl SafePrime {
    /// Builds a [`SafePrime`] from its Sophie Germain component, checking
    /// that both `q` and `2q + 1` are prime.
    pub fn from_sophie_germain<R: RngCore + CryptoRng>(
        q: BigNumber,
        rng: &mut R,
        recorder: &dyn Recorder,
    ) -> Result<Self> {
        let p = safe_prime_of(&q);
        if !is_probable_prime(&q, rng, recorder) || !is_probable_prime(&p, rng, recorder) {
            error!("Value is not a Sophie Germain prime");
            return arg_err!("value is not a Sophie Germain prime");
        }
        Ok(Self { q, p })
    }

    /// The Sophie Germain component `q`.
    pub fn sophie_germain(&self) -> &BigNumber {
        &self.q
    }

    /// The safe prime `p = 2q + 1`.
    pub fn safe_prime(&self) -> &BigNumber {
        &self.p
    }
}

fn safe_prime_of(q: &BigNumber) -> BigNumber {
    q * BigNumber::from(2u64) + BigNumber::one()
}

/// A configured safe-prime search.
#[derive(Clone, Debug)]
pub struct SafePrimeSearch {
    bit_length: usize,
    count: usize,
    concurrency: usize,
    timeout: Option<Duration>,
    max_candidates: u64,
}

impl SafePrimeSearch {
    /// Configure a search for `count` distinct safe primes whose Sophie
    /// Germain components have `bit_length` bits, run by `concurrency`
    /// workers.
    ///
    /// A `concurrency` of zero is a configuration error. The search gives up
    /// with [`InternalError::RetryFailed`] after
    /// `count * bit_length^2 * 64` candidates, which is far beyond the
    /// expected cost at any size but stops requests that cannot be met, such
    /// as more distinct primes than exist at a tiny bit length.
    pub fn new(bit_length: usize, count: usize, concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            error!("Safe prime search needs at least one worker");
            return config_err!("concurrency must be a positive integer");
        }
        if bit_length < MIN_SAFE_PRIME_BITS {
            error!(
                "Safe prime bit length {} is below the minimum of {}",
                bit_length, MIN_SAFE_PRIME_BITS
            );
            return arg_err!("safe prime bit length is too small");
        }
        if count == 0 {
            return arg_err!("number of safe primes must be greater than 0");
        }
        let max_candidates = (count as u64)
            .saturating_mul((bit_length as u64).saturating_pow(2))
            .saturating_mul(CANDIDATES_PER_SQUARED_BIT);
        Ok(Self {
            bit_length,
            count,
            concurrency,
            timeout: None,
            max_candidates,
        })
    }

    /// Give up with [`InternalError::RetryFailed`] after testing
    /// `max_candidates` candidates (at least one).
    pub fn with_max_candidates(mut self, max_candidates: u64) -> Self {
        self.max_candidates = max_candidates.max(1);
        self
    }

    /// Give up with [`InternalError::TimedOut`] if the search takes longer
    /// than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run the search with all candidates derived from `seed`.
    ///
    /// Returns [`InternalError::Cancelled`] if `token` is cancelled before
    /// enough primes were found.
    #[cfg_attr(feature = "flame_it", flame("safe_primes"))]
    #[instrument(skip_all, err(Debug))]
    pub fn run(
        &self,
        seed: [u8; 32],
        recorder: &dyn Recorder,
        token: &CancellationToken,
    ) -> Result<Vec<SafePrime>> {
        debug!(
            bit_length = self.bit_length,
            count = self.count,
            concurrency = self.concurrency,
            "Searching for safe primes."
        );
        let start = Instant::now();
        let deadline = self.timeout.map(|timeout| start + timeout);

        // Cancelled by us once the search is over, or by the caller.
        let pool_token = token.child();
        let next_index = AtomicU64::new(0);
        let (tx, rx) = channel::<(u64, Option<SafePrime>)>();

        let result = thread::scope(|scope| {
            for _ in 0..self.concurrency {
                let tx = tx.clone();
                let pool_token = &pool_token;
                let next_index = &next_index;
                let _ = scope.spawn(move || {
                    self.worker(seed, next_index, tx, recorder, pool_token)
                });
            }
            // The workers hold the only remaining senders.
            drop(tx);

            let mut accepted: Vec<SafePrime> = Vec::with_capacity(self.count);
            let mut pending = BTreeMap::new();
            let mut next_to_process = 0u64;

            let outcome = loop {
                let received = match deadline {
                    Some(deadline) => {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        rx.recv_timeout(remaining)
                    }
                    None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                };
                let (index, candidate) = match received {
                    Ok(message) => message,
                    Err(RecvTimeoutError::Timeout) => {
                        error!("Safe prime search timed out");
                        break Err(InternalError::TimedOut);
                    }
                    Err(RecvTimeoutError::Disconnected) if token.is_cancelled() => {
                        recorder.record_event(Event::SearchCancelled);
                        break Err(InternalError::Cancelled);
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        error!("Every safe prime worker stopped before the search completed");
                        break Err(InternalError::InternalInvariantFailed);
                    }
                };
                let _ = pending.insert(index, candidate);

                // Accept in index order, so the output only depends on the seed.
                while let Some(candidate) = pending.remove(&next_to_process) {
                    next_to_process += 1;
                    let Some(candidate) = candidate else {
                        continue;
                    };
                    if accepted.iter().any(|prime| prime.p == candidate.p) {
                        recorder.record_event(Event::DuplicatePrimeRejected);
                        continue;
                    }
                    recorder.record_event(Event::SafePrimeAccepted);
                    accepted.push(candidate);
                    if accepted.len() == self.count {
                        break;
                    }
                }
                if accepted.len() == self.count {
                    break Ok(());
                }
                if next_to_process >= self.max_candidates {
                    error!(
                        "Found only {} of {} safe primes in {} candidates",
                        accepted.len(),
                        self.count,
                        self.max_candidates
                    );
                    break Err(InternalError::RetryFailed);
                }
            };
            // Stop the pool; anything still in flight is discarded.
            pool_token.cancel();
            outcome.map(|()| accepted)
        });

        recorder.record_duration(Step::SafePrimeSearch, start.elapsed());
        result
    }

    /// Claim candidate indices until the pool is cancelled.
    fn worker(
        &self,
        seed: [u8; 32],
        next_index: &AtomicU64,
        tx: Sender<(u64, Option<SafePrime>)>,
        recorder: &dyn Recorder,
        token: &CancellationToken,
    ) {
        while !token.is_cancelled() {
            let index = next_index.fetch_add(1, Ordering::SeqCst);
            if index >= self.max_candidates {
                break;
            }
            let Some(outcome) = self.try_candidate(seed, index, recorder, token) else {
                break;
            };
            if tx.send((index, outcome)).is_err() {
                break;
            }
        }
    }

    /// Test candidate `index`. Returns `None` if the search was cancelled
    /// partway through, `Some(None)` if the candidate is not a safe prime.
    fn try_candidate(
        &self,
        seed: [u8; 32],
        index: u64,
        recorder: &dyn Recorder,
        token: &CancellationToken,
    ) -> Option<Option<SafePrime>> {
        let mut rng = ChaCha20Rng::from_seed(seed);
        rng.set_stream(index);

        let q = random_odd_candidate(&mut rng, self.bit_length, 1);
        let p = safe_prime_of(&q);
        // Cheap sieve on both halves before any Miller-Rabin work.
        if has_small_factor(&q) || has_small_factor(&p) {
            return Some(None);
        }
        if !is_probable_prime(&q, &mut rng, recorder) {
            return Some(None);
        }
        if token.is_cancelled() {
            return None;
        }
        if !is_probable_prime(&p, &mut rng, recorder) {
            return Some(None);
        }
        Some(Some(SafePrime { q, p }))
    }
}

/// Find `count` distinct safe primes whose Sophie Germain components have
/// `bit_length` bits, using `concurrency` worker threads and the operating
/// system's randomness.
pub fn find_safe_primes(
    bit_length: usize,
    count: usize,
    concurrency: usize,
) -> Result<Vec<SafePrime>> {
    let search = SafePrimeSearch::new(bit_length, count, concurrency)?;
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    search.run(seed, &TracingRecorder, &CancellationToken::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        instrumentation::{
            testing::{CountingRecorder, SlowRecorder},
            NoopRecorder,
        },
        utils::testing::init_testing,
    };
    use test_log::test;

    fn seed_from(rng: &mut impl RngCore) -> [u8; 32] {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        seed
    }

    /// Checks the safe prime against an independent primality oracle.
    fn assert_valid(prime: &SafePrime, bits: usize) {
        assert!(prime.sophie_germain().is_prime());
        assert!(prime.safe_prime().is_prime());
        assert_eq!(prime.safe_prime(), &safe_prime_of(prime.sophie_germain()));
        assert_eq!(prime.sophie_germain().bit_length(), bits);
    }

    fn assert_distinct(primes: &[SafePrime]) {
        for (i, a) in primes.iter().enumerate() {
            for b in &primes[i + 1..] {
                assert_ne!(a.safe_prime(), b.safe_prime());
            }
        }
    }

    #[test]
    fn zero_concurrency_is_a_configuration_error() {
        assert!(matches!(
            SafePrimeSearch::new(32, 2, 0),
            Err(InternalError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            find_safe_primes(32, 2, 0),
            Err(InternalError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        assert!(matches!(
            SafePrimeSearch::new(MIN_SAFE_PRIME_BITS - 1, 2, 1),
            Err(InternalError::InvalidArgument(_))
        ));
        assert!(matches!(
            SafePrimeSearch::new(32, 0, 1),
            Err(InternalError::InvalidArgument(_))
        ));
    }

    #[test]
    fn finds_valid_distinct_safe_primes() -> Result<()> {
        let mut rng = init_testing();
        let recorder = CountingRecorder::default();
        let primes = SafePrimeSearch::new(64, 2, 4)?.run(
            seed_from(&mut rng),
            &recorder,
            &CancellationToken::new(),
        )?;
        assert_eq!(primes.len(), 2);
        primes.iter().for_each(|prime| assert_valid(prime, 64));
        assert_distinct(&primes);
        assert_eq!(recorder.count(Event::SafePrimeAccepted), 2);
        assert_eq!(recorder.steps(), vec![Step::SafePrimeSearch]);
        Ok(())
    }

    #[test]
    fn tiny_bit_lengths_reject_duplicates() -> Result<()> {
        // There are only seven 8-bit Sophie Germain primes, so duplicates
        // show up quickly and must be skipped.
        let mut rng = init_testing();
        let recorder = CountingRecorder::default();
        let primes = SafePrimeSearch::new(8, 5, 3)?.run(
            seed_from(&mut rng),
            &recorder,
            &CancellationToken::new(),
        )?;
        assert_eq!(primes.len(), 5);
        primes.iter().for_each(|prime| assert_valid(prime, 8));
        assert_distinct(&primes);
        Ok(())
    }

    #[test]
    fn unreachable_count_gives_up() -> Result<()> {
        // Only 41 and 53 are 6-bit Sophie Germain primes.
        let recorder = CountingRecorder::default();
        let result = SafePrimeSearch::new(6, 3, 2)?.run(
            seed_from(&mut init_testing()),
            &recorder,
            &CancellationToken::new(),
        );
        assert_eq!(result, Err(InternalError::RetryFailed));
        assert_eq!(recorder.count(Event::SafePrimeAccepted), 2);
        assert!(find_safe_primes(6, 3, 2).is_err());
        Ok(())
    }

    #[test]
    fn candidate_budget_is_respected() -> Result<()> {
        let recorder = CountingRecorder::default();
        let result = SafePrimeSearch::new(512, 2, 4)?
            .with_max_candidates(10)
            .run([3; 32], &recorder, &CancellationToken::new());
        assert_eq!(result, Err(InternalError::RetryFailed));
        // Each candidate runs at most two primality tests.
        assert!(recorder.primality_tests() <= 20);
        Ok(())
    }

    #[test]
    fn output_does_not_depend_on_concurrency() -> Result<()> {
        let mut rng = init_testing();
        let seed = seed_from(&mut rng);
        let token = CancellationToken::new();
        let single = SafePrimeSearch::new(32, 2, 1)?.run(seed, &NoopRecorder, &token)?;
        let many = SafePrimeSearch::new(32, 2, 8)?.run(seed, &NoopRecorder, &token)?;
        assert_eq!(single, many);
        Ok(())
    }

    #[test]
    fn cancelled_search_reports_cancellation() -> Result<()> {
        let token = CancellationToken::new();
        token.cancel();
        let recorder = CountingRecorder::default();
        let result = SafePrimeSearch::new(512, 2, 2)?.run([7; 32], &recorder, &token);
        assert_eq!(result, Err(InternalError::Cancelled));
        Ok(())
    }

    #[test]
    fn search_stops_at_the_deadline() -> Result<()> {
        let recorder = SlowRecorder {
            delay: Duration::from_millis(50),
            inner: CountingRecorder::default(),
        };
        let start = Instant::now();
        let result = SafePrimeSearch::new(1024, 2, 2)?
            .with_timeout(Duration::from_millis(100))
            .run([9; 32], &recorder, &CancellationToken::new());
        assert_eq!(result, Err(InternalError::TimedOut));
        assert!(start.elapsed() < Duration::from_secs(10));
        Ok(())
    }

    #[test]
    fn sophie_germain_constructor_validates_input() {
        let mut rng = init_testing();
        // 11 -> 23 is a safe prime; 13 -> 27 is not.
        let valid = SafePrime::from_sophie_germain(BigNumber::from(11u64), &mut rng, &NoopRecorder);
        assert_eq!(valid.map(|prime| prime.safe_prime().clone()), Ok(BigNumber::from(23u64)));
        let invalid =
            SafePrime::from_sophie_germain(BigNumber::from(13u64), &mut rng, &NoopRecorder);
        assert!(invalid.is_err());
    }

    #[test]
    #[ignore = "slow"]
    fn finds_production_size_safe_primes() -> Result<()> {
        let primes = find_safe_primes(crate::parameters::SAFE_PRIME_BITS, 2, 8)?;
        primes
            .iter()
            .for_each(|prime| assert_valid(prime, crate::parameters::SAFE_PRIME_BITS));
        assert_distinct(&primes);
        Ok(())
    }
}
