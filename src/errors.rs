// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! A list of error types which are produced while generating preparation
//! parameters.
use thiserror::Error;

/// The default Result type used in this crate
pub type Result<T> = std::result::Result<T, InternalError>;

/// Represents an error in the generation or handling of preparation
/// parameters.
#[derive(Clone, Eq, PartialEq, Error, Debug)]
#[allow(missing_docs)]
pub enum InternalError {
    #[error("Invalid configuration: `{0}`")]
    InvalidConfiguration(String),
    #[error("Function call contained invalid arguments: `{0}`")]
    InvalidArgument(String),
    #[error("Could not generate preparation parameters: `{0}`")]
    GenerationFailed(String),
    #[error("Reached the maximum allowed number of retries")]
    RetryFailed,
    #[error("Generation was cancelled before it completed")]
    Cancelled,
    #[error("Generation did not complete before the configured deadline")]
    TimedOut,
    #[error("Could not invert a BigNumber")]
    CouldNotInvertBigNumber,
    #[error("Paillier decryption failed")]
    PaillierDecryptionFailed,
    #[error("Represents some code assumption that was checked at runtime but failed to be true")]
    InternalInvariantFailed,
    #[error("Serialization Error")]
    Serialization,
}

macro_rules! serialize {
    ($x:expr) => {{
        bincode::serialize($x).or(Err(crate::errors::InternalError::Serialization))
    }};
}

macro_rules! deserialize {
    ($x:expr) => {{
        bincode::deserialize($x).or(Err(crate::errors::InternalError::Serialization))
    }};
}

macro_rules! arg_err {
    ($x:expr) => {{
        Err(crate::errors::InternalError::InvalidArgument(String::from(
            $x,
        )))
    }};
}

macro_rules! config_err {
    ($x:expr) => {{
        Err(crate::errors::InternalError::InvalidConfiguration(
            String::from($x),
        ))
    }};
}
