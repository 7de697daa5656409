// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Paillier keypair generation.
//!
//! Thin wrappers around the [`libpaillier`] keys. Key generation draws its
//! primes with this crate's prime search so that it can be seeded, cancelled
//! and instrumented.

use crate::{
    cancellation::CancellationToken,
    errors::{InternalError, Result},
    instrumentation::{Recorder, Step, TracingRecorder},
    parameters::{MIN_PAILLIER_MODULUS_BITS, PAILLIER_MAX_ATTEMPTS},
    primes::random_prime,
    utils::random_bn_in_z_star,
};
use libpaillier::unknown_order::BigNumber;
use rand::{rngs::OsRng, CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, instrument};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A Paillier ciphertext.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext(BigNumber);

/// The randomness used to produce a [`Ciphertext`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce(BigNumber);

/// The public half of a Paillier keypair.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptionKey(libpaillier::EncryptionKey);

impl PartialEq for EncryptionKey {
    fn eq(&self, other: &Self) -> bool {
        self.n() == other.n()
    }
}

impl Eq for EncryptionKey {}

impl EncryptionKey {
    /// The Paillier modulus `N'`.
    pub fn n(&self) -> &BigNumber {
        self.0.n()
    }

    /// Encrypt `x`, which must lie in `[0, N')`.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        x: &BigNumber,
        rng: &mut R,
    ) -> Result<(Ciphertext, Nonce)> {
        if x < &BigNumber::zero() || x >= self.n() {
            error!("Tried to encrypt a plaintext outside of [0, N)");
            return arg_err!("plaintext must lie in [0, N)");
        }
        let nonce = random_bn_in_z_star(rng, self.n())?;

        let one = BigNumber::one();
        let base = one + self.n();
        let a = base.modpow(x, self.0.nn());
        let b = nonce.modpow(self.n(), self.0.nn());
        let c = a.modmul(&b, self.0.nn());
        Ok((Ciphertext(c), Nonce(nonce)))
    }

    /// Homomorphically add two ciphertexts: the result decrypts to the sum of
    /// the plaintexts modulo `N'`.
    pub fn add(&self, c1: &Ciphertext, c2: &Ciphertext) -> Result<Ciphertext> {
        match self.0.add(&c1.0, &c2.0) {
            Some(c) => Ok(Ciphertext(c)),
            None => {
                error!("Tried to add a ciphertext outside of [1, N^2)");
                arg_err!("ciphertext must lie in [1, N^2)")
            }
        }
    }
}

/// The secret half of a Paillier keypair, containing the public half.
///
/// Keeps the prime factors of `N'` next to the [`libpaillier`] key. Not
/// `Clone`; the secret values are zeroized when the key is dropped.
#[derive(Serialize, Deserialize, ZeroizeOnDrop)]
pub struct DecryptionKey {
    sk: libpaillier::DecryptionKey,
    #[zeroize(skip)]
    pk: EncryptionKey,
    p: BigNumber,
    q: BigNumber,
}

impl std::fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("secrets", &"[redacted]")
            .field("pk", &self.pk)
            .finish()
    }
}

impl DecryptionKey {
    /// Generate a keypair whose modulus has exactly `modulus_bits` bits.
    ///
    /// Each attempt searches for two `modulus_bits / 2`-bit primes and keeps
    /// them only if they are distinct and `gcd(N', φ(N')) = 1`. After
    /// [`PAILLIER_MAX_ATTEMPTS`] rejected pairs this fails with
    /// [`InternalError::RetryFailed`].
    #[cfg_attr(feature = "flame_it", flame("paillier"))]
    #[instrument(skip_all, err(Debug))]
    pub fn generate<R: RngCore + CryptoRng>(
        modulus_bits: usize,
        rng: &mut R,
        recorder: &dyn Recorder,
        token: &CancellationToken,
    ) -> Result<Self> {
        if modulus_bits < MIN_PAILLIER_MODULUS_BITS || modulus_bits % 2 != 0 {
            error!(
                "Paillier modulus bit length {} must be even and at least {}",
                modulus_bits, MIN_PAILLIER_MODULUS_BITS
            );
            return arg_err!("invalid Paillier modulus bit length");
        }
        debug!(modulus_bits, "Generating Paillier keypair.");
        let start = Instant::now();

        for _ in 0..PAILLIER_MAX_ATTEMPTS {
            let mut p = random_prime(modulus_bits / 2, rng, recorder, token)?;
            let mut q = random_prime(modulus_bits / 2, rng, recorder, token)?;
            let key = if (&p * &q).bit_length() == modulus_bits {
                Self::from_primes(&p, &q).ok()
            } else {
                None
            };
            p.zeroize();
            q.zeroize();
            if let Some(key) = key {
                recorder.record_duration(Step::PaillierKeygen, start.elapsed());
                return Ok(key);
            }
        }
        error!("Failed to generate a valid Paillier keypair");
        Err(InternalError::RetryFailed)
    }

    /// Build a keypair from two primes.
    ///
    /// The primes are not tested for primality here; the caller is trusted to
    /// supply primes. Pairs with `gcd(N', φ(N')) != 1` are rejected.
    pub(crate) fn from_primes(p: &BigNumber, q: &BigNumber) -> Result<Self> {
        let one = BigNumber::one();
        if p <= &one || q <= &one {
            return arg_err!("Paillier primes must be greater than 1");
        }
        if p == q {
            return arg_err!("Paillier primes must be distinct");
        }
        let n = p * q;
        let mut totient = (p - &one) * (q - &one);
        let coprime = n.gcd(&totient).is_one();
        totient.zeroize();
        if !coprime {
            return arg_err!("gcd(N, phi(N)) must be 1");
        }
        let sk = libpaillier::DecryptionKey::with_primes_unchecked(p, q)
            .ok_or(InternalError::CouldNotInvertBigNumber)?;
        let pk = EncryptionKey(libpaillier::EncryptionKey::from(&sk));
        Ok(Self {
            sk,
            pk,
            p: p.clone(),
            q: q.clone(),
        })
    }

    /// The public half of this keypair.
    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.pk
    }

    /// The Paillier modulus `N'`.
    pub fn modulus(&self) -> &BigNumber {
        self.sk.n()
    }

    /// Euler's totient of the modulus.
    pub fn totient(&self) -> &BigNumber {
        self.sk.totient()
    }

    /// The two prime factors of the modulus.
    pub fn primes(&self) -> (&BigNumber, &BigNumber) {
        (&self.p, &self.q)
    }

    /// Decrypt a ciphertext, returning the plaintext in `[0, N')`.
    pub fn decrypt(&self, c: &Ciphertext) -> Result<BigNumber> {
        self.sk.decrypt(&c.0).map(BigNumber::from_slice).ok_or_else(|| {
            error!("Ciphertext is outside of Z*_{{N^2}}");
            InternalError::PaillierDecryptionFailed
        })
    }

    /// Check that the stored values are consistent with each other.
    pub(crate) fn is_consistent(&self) -> bool {
        let one = BigNumber::one();
        if self.p <= one || self.q <= one {
            return false;
        }
        let n = self.sk.n();
        let p_minus_one = &self.p - &one;
        let q_minus_one = &self.q - &one;
        &(&self.p * &self.q) == n
            && self.pk.n() == n
            && self.sk.totient() == &(&p_minus_one * &q_minus_one)
            && self.sk.lambda() == &p_minus_one.lcm(&q_minus_one)
            && self.sk.lambda().modmul(self.sk.u(), n).is_one()
    }
}

/// Generate a Paillier keypair whose modulus has `modulus_bits` bits, using
/// the operating system's randomness.
pub fn generate_keypair(modulus_bits: usize) -> Result<DecryptionKey> {
    DecryptionKey::generate(
        modulus_bits,
        &mut OsRng,
        &TracingRecorder,
        &CancellationToken::new(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        instrumentation::{testing::CountingRecorder, NoopRecorder},
        utils::testing::init_testing,
    };

    fn random_plaintext(rng: &mut (impl RngCore + CryptoRng), pk: &EncryptionKey) -> BigNumber {
        crate::utils::random_bn_below(rng, pk.n())
    }

    fn toy_key(rng: &mut (impl RngCore + CryptoRng)) -> DecryptionKey {
        DecryptionKey::generate(128, rng, &NoopRecorder, &CancellationToken::new()).unwrap()
    }

    #[test]
    fn generated_key_has_requested_size_and_is_consistent() -> Result<()> {
        let mut rng = init_testing();
        let recorder = CountingRecorder::default();
        for bits in [16, 64, 256] {
            let key = DecryptionKey::generate(bits, &mut rng, &recorder, &CancellationToken::new())?;
            assert_eq!(key.modulus().bit_length(), bits);
            assert!(key.is_consistent());
            let (p, q) = key.primes();
            assert_ne!(p, q);
        }
        assert_eq!(recorder.steps(), vec![Step::PaillierKeygen; 3]);
        Ok(())
    }

    #[test]
    fn encryption_decryption_roundtrip() -> Result<()> {
        let mut rng = init_testing();
        let key = toy_key(&mut rng);
        let pk = key.encryption_key();
        for _ in 0..100 {
            let m = random_plaintext(&mut rng, pk);
            let (c, _) = pk.encrypt(&m, &mut rng)?;
            assert_eq!(key.decrypt(&c)?, m);
        }
        // Boundary plaintexts.
        for m in [BigNumber::zero(), pk.n() - BigNumber::one()] {
            let (c, _) = pk.encrypt(&m, &mut rng)?;
            assert_eq!(key.decrypt(&c)?, m);
        }
        Ok(())
    }

    #[test]
    fn homomorphic_addition_works() -> Result<()> {
        let mut rng = init_testing();
        let key = toy_key(&mut rng);
        let pk = key.encryption_key();
        let a = random_plaintext(&mut rng, pk);
        let b = random_plaintext(&mut rng, pk);
        let (ca, _) = pk.encrypt(&a, &mut rng)?;
        let (cb, _) = pk.encrypt(&b, &mut rng)?;
        let sum = key.decrypt(&pk.add(&ca, &cb)?)?;
        assert_eq!(sum, (a + b) % pk.n());
        Ok(())
    }

    #[test]
    fn plaintexts_outside_message_space_are_rejected() {
        let mut rng = init_testing();
        let key = toy_key(&mut rng);
        let pk = key.encryption_key();
        assert!(pk.encrypt(pk.n(), &mut rng).is_err());
        assert!(pk.encrypt(&-BigNumber::one(), &mut rng).is_err());
    }

    #[test]
    fn invalid_ciphertexts_are_rejected() {
        let mut rng = init_testing();
        let key = toy_key(&mut rng);
        assert_eq!(
            key.decrypt(&Ciphertext(BigNumber::zero())),
            Err(InternalError::PaillierDecryptionFailed)
        );
        let nn = key.modulus() * key.modulus();
        assert_eq!(
            key.decrypt(&Ciphertext(nn)),
            Err(InternalError::PaillierDecryptionFailed)
        );
    }

    #[test]
    fn equal_primes_are_rejected() {
        let p = BigNumber::from(65537u64);
        assert!(DecryptionKey::from_primes(&p, &p).is_err());
    }

    #[test]
    fn primes_sharing_a_factor_with_the_totient_are_rejected() {
        // 7 divides 29 - 1, so gcd(N, phi(N)) = 7.
        let (p, q) = (BigNumber::from(7u64), BigNumber::from(29u64));
        assert!(matches!(
            DecryptionKey::from_primes(&p, &q),
            Err(InternalError::InvalidArgument(_))
        ));
        assert!(DecryptionKey::from_primes(&q, &p).is_err());
        assert!(DecryptionKey::from_primes(&BigNumber::one(), &q).is_err());
        assert!(DecryptionKey::from_primes(&BigNumber::from(11u64), &q).is_ok());
    }

    #[test]
    fn small_keys_never_fail_to_build() -> Result<()> {
        // Only eleven 8-bit primes are drawn at this size, so attempts with
        // repeated primes are common.
        let mut rng = init_testing();
        let token = CancellationToken::new();
        for _ in 0..200 {
            let key = DecryptionKey::generate(16, &mut rng, &NoopRecorder, &token)?;
            assert!(key.is_consistent());
        }
        Ok(())
    }

    #[test]
    fn adding_invalid_ciphertexts_is_rejected() -> Result<()> {
        let mut rng = init_testing();
        let key = toy_key(&mut rng);
        let pk = key.encryption_key();
        let (c, _) = pk.encrypt(&BigNumber::one(), &mut rng)?;
        assert!(pk.add(&c, &Ciphertext(BigNumber::zero())).is_err());
        Ok(())
    }

    #[test]
    fn tampered_keys_are_inconsistent() -> Result<()> {
        let mut rng = init_testing();
        let key = toy_key(&mut rng);
        let mut tampered: DecryptionKey = deserialize!(&serialize!(&key)?)?;
        tampered.p = BigNumber::zero();
        assert!(!tampered.is_consistent());
        let other = toy_key(&mut rng);
        let mut tampered: DecryptionKey = deserialize!(&serialize!(&key)?)?;
        tampered.pk = other.encryption_key().clone();
        assert!(!tampered.is_consistent());
        Ok(())
    }

    #[test]
    fn invalid_modulus_lengths_are_rejected() {
        let mut rng = init_testing();
        let token = CancellationToken::new();
        for bits in [0, 8, MIN_PAILLIER_MODULUS_BITS + 1] {
            assert!(matches!(
                DecryptionKey::generate(bits, &mut rng, &NoopRecorder, &token),
                Err(InternalError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn cancelled_generation_stops() {
        let mut rng = init_testing();
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            DecryptionKey::generate(2048, &mut rng, &NoopRecorder, &token),
            Err(InternalError::Cancelled)
        ));
    }

    #[test]
    fn serialization_roundtrip() -> Result<()> {
        let mut rng = init_testing();
        let key = toy_key(&mut rng);
        let bytes = serialize!(&key)?;
        let roundtrip: DecryptionKey = deserialize!(&bytes)?;
        assert!(roundtrip.is_consistent());
        assert_eq!(roundtrip.encryption_key(), key.encryption_key());
        assert_eq!(bytes, serialize!(&roundtrip)?);
        Ok(())
    }

    #[test]
    #[ignore = "slow"]
    fn production_size_keypair_roundtrips() -> Result<()> {
        let key = generate_keypair(crate::parameters::PAILLIER_MODULUS_BITS)?;
        assert_eq!(
            key.modulus().bit_length(),
            crate::parameters::PAILLIER_MODULUS_BITS
        );
        let mut rng = init_testing();
        let m = random_plaintext(&mut rng, key.encryption_key());
        let (c, _) = key.encryption_key().encrypt(&m, &mut rng)?;
        assert_eq!(key.decrypt(&c)?, m);
        Ok(())
    }
}
