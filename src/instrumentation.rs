// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Observation hooks for the generation path.
//!
//! Preparation is slow, so operators want to know how long each sub-step
//! took. Instead of reaching for a process-wide logger, every generation
//! function takes a [`Recorder`] and reports to it. [`TracingRecorder`]
//! forwards everything to [`tracing`]; tests plug in their own recorder to
//! count events.

use std::time::Duration;
use tracing::{debug, trace};

/// An expensive sub-step of preparation whose duration is reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    /// Generating the Paillier keypair.
    PaillierKeygen,
    /// Searching for the safe primes that make up `NTilde`.
    SafePrimeSearch,
    /// Deriving `(NTilde, h1, h2)` from the safe primes.
    CommitmentSetup,
    /// The whole preparation call.
    Preparation,
}

/// A point event on the generation path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// A primality test was run on a candidate.
    PrimalityTest,
    /// The searcher accepted a safe prime.
    SafePrimeAccepted,
    /// The searcher rejected a safe prime it had already accepted.
    DuplicatePrimeRejected,
    /// A search stopped early because its token was cancelled.
    SearchCancelled,
}

/// Receives timing and event reports from the generation path.
///
/// Recorders are shared by all search workers, so they must be usable from
/// several threads at once.
pub trait Recorder: Send + Sync {
    /// Record that `step` completed after `elapsed`.
    fn record_duration(&self, step: Step, elapsed: Duration);
    /// Record a point event.
    fn record_event(&self, event: Event);
}

/// A [`Recorder`] that emits [`tracing`] events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingRecorder;

impl Recorder for TracingRecorder {
    fn record_duration(&self, step: Step, elapsed: Duration) {
        debug!(?step, ?elapsed, "step done");
    }

    fn record_event(&self, event: Event) {
        match event {
            // Fires once per candidate; too noisy for debug.
            Event::PrimalityTest => trace!(?event),
            _ => debug!(?event),
        }
    }
}

/// A [`Recorder`] that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRecorder;

impl Recorder for NoopRecorder {
    fn record_duration(&self, _step: Step, _elapsed: Duration) {}
    fn record_event(&self, _event: Event) {}
}
