// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Preparation parameters for multi-party threshold ECDSA
//!
//! Before a party can take part in distributed key generation and signing,
//! it needs a Paillier keypair and a ring-Pedersen commitment setup: a
//! modulus `NTilde = p1 * p2` built from two safe primes, together with
//! generators `h1` and `h2 = h1^alpha`. The other parties use the setup to
//! check range proofs produced by this party, which is why its trapdoor
//! `alpha` must stay secret.
//!
//! Finding safe primes of the sizes the protocol needs is by far the most
//! expensive part of bootstrapping a party, so this crate spreads the search
//! over a pool of worker threads and runs it alongside the Paillier key
//! generation. Parameters are meant to be generated out of band, ahead of any
//! protocol session.
//!
//! The main entry point is [`generate_preparation_params`]. For control over
//! bit lengths, deadlines, randomness and instrumentation, use
//! [`PreparationResult::generate`] with a [`PreparationConfig`].
//!
//! ```no_run
//! use tss_ecdsa_preparams::generate_preparation_params;
//!
//! let params = generate_preparation_params(None)?;
//! assert!(params.validate().is_ok());
//! # Ok::<(), tss_ecdsa_preparams::InternalError>(())
//! ```

#![warn(missing_docs)]
#![cfg_attr(feature = "flame_it", feature(proc_macro_hygiene))]
#[cfg(feature = "flame_it")]
extern crate flame;
#[cfg(feature = "flame_it")]
#[macro_use]
extern crate flamer;

#[macro_use]
pub mod errors;

mod cancellation;
mod config;
mod instrumentation;
mod paillier;
mod parameters;
mod preparation;
mod primes;
mod ring_pedersen;
mod safe_primes;
mod utils;

pub use cancellation::CancellationToken;
pub use config::PreparationConfig;
pub use errors::{InternalError, Result};
pub use instrumentation::{Event, NoopRecorder, Recorder, Step, TracingRecorder};
pub use paillier::{generate_keypair, Ciphertext, DecryptionKey, EncryptionKey, Nonce};
pub use parameters::{PAILLIER_MODULUS_BITS, SAFE_PRIME_BITS};
pub use preparation::{generate_preparation_params, PreparationResult};
pub use ring_pedersen::{RingPedersen, RingPedersenSecrets};
pub use safe_primes::{find_safe_primes, SafePrime, SafePrimeSearch};
