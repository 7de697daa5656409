// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Protocol parameter definitions.
//!
//! The bit lengths defined here must match the values expected by the
//! downstream multi-party protocol. Parties that disagree on them cannot
//! verify each other's range proofs.
//!
//! The Paillier modulus and ring-Pedersen modulus sizes follow the
//! GG18 deployment: a 2048-bit Paillier modulus and an `NTilde` built from two
//! 1025-bit safe primes (1024-bit Sophie Germain components).

/// Bit length of the Paillier modulus `N'`.
///
/// The product of two 1024-bit primes will produce 2048-bit Paillier moduli.
pub const PAILLIER_MODULUS_BITS: usize = 2048;

/// Bit length of the Sophie Germain component `q` of each safe prime
/// `p = 2q + 1` used to build `NTilde`.
pub const SAFE_PRIME_BITS: usize = 1024;

/// Number of safe primes the preparation step needs (one per factor of
/// `NTilde`).
pub(crate) const SAFE_PRIME_COUNT: usize = 2;

/// Number of Miller-Rabin rounds run per primality test.
///
/// Each round passes a composite with probability at most 1/4, so 64 rounds
/// bound the false-positive probability by `2^-128`.
pub(crate) const PRIMALITY_TEST_ROUNDS: usize = 64;

/// Smallest Sophie Germain bit length the searcher accepts. Below this there
/// are not enough safe primes to pick two distinct ones.
pub(crate) const MIN_SAFE_PRIME_BITS: usize = 6;

/// Smallest Paillier modulus bit length accepted (test sizes only).
pub(crate) const MIN_PAILLIER_MODULUS_BITS: usize = 16;

/// Maximum number of prime pairs the Paillier generator tries before giving
/// up.
pub(crate) const PAILLIER_MAX_ATTEMPTS: usize = 64;

/// Maximum number of resampling attempts when drawing an invertible element
/// of `Z*_N` or an invertible trapdoor exponent.
pub(crate) const SAMPLING_MAX_ATTEMPTS: usize = 256;

/// Candidate budget of a safe-prime search, per safe prime requested and per
/// squared bit of the Sophie Germain component.
pub(crate) const CANDIDATES_PER_SQUARED_BIT: u64 = 64;
