// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rand::{rngs::OsRng, RngCore};
use tss_ecdsa_preparams::{
    CancellationToken, DecryptionKey, NoopRecorder, PreparationConfig, PreparationResult,
    SafePrimeSearch,
};

const SAFE_PRIME_SIZE: usize = 256;
const PAILLIER_SIZE: usize = 1024;

criterion_group! {
    name = slow_primegen;
    config = Criterion::default().sample_size(10);
    targets = safe_prime_search, paillier_keygen, preparation
}
criterion_main!(slow_primegen);

fn fresh_seed() -> [u8; 32] {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    seed
}

/// Two safe primes, with one worker and with all of the host's cores.
fn safe_prime_search(c: &mut Criterion) {
    let token = CancellationToken::new();
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
    for concurrency in [1, cores] {
        let search = SafePrimeSearch::new(SAFE_PRIME_SIZE, 2, concurrency).unwrap();
        c.bench_function(
            &format!(
                "safe prime search ({} bits, {} workers)",
                SAFE_PRIME_SIZE, concurrency
            ),
            |b| {
                b.iter_batched(
                    fresh_seed,
                    |seed| search.run(seed, &NoopRecorder, &token).unwrap(),
                    BatchSize::SmallInput,
                )
            },
        );
    }
}

fn paillier_keygen(c: &mut Criterion) {
    let token = CancellationToken::new();
    c.bench_function(&format!("paillier keygen ({} bits)", PAILLIER_SIZE), |b| {
        b.iter(|| DecryptionKey::generate(PAILLIER_SIZE, &mut OsRng, &NoopRecorder, &token).unwrap())
    });
}

fn preparation(c: &mut Criterion) {
    let config = PreparationConfig::default()
        .with_safe_prime_bits(SAFE_PRIME_SIZE)
        .with_paillier_modulus_bits(PAILLIER_SIZE);
    c.bench_function("preparation (reduced sizes)", |b| {
        b.iter(|| PreparationResult::generate(&config, &mut OsRng, &NoopRecorder).unwrap())
    });
}
