//! Error types for the matchmaking core.
//!
//! [`ConfigError`] is the one fallible constructor surface the data model
//! has ([`crate::model::WaitRoomConfig::new`]). Key building itself is
//! total (see [`crate::rule::Rule::build_key`]), so no error variant for
//! it exists here.

use std::time::Duration;

/// Errors raised while validating a [`crate::model::WaitRoomConfig`].
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    /// `min_size` was zero.
    #[error("min_size must be greater than zero")]
    ZeroMinSize,

    /// `min_size` exceeded `size`.
    #[error("min_size ({min_size}) must not exceed size ({size})")]
    MinExceedsSize { min_size: usize, size: usize },

    /// `ttl` was zero.
    #[error("ttl must be greater than zero")]
    ZeroTtl,
}

impl ConfigError {
    pub(crate) fn check(size: usize, min_size: usize, ttl: Duration) -> Result<(), Self> {
        if min_size == 0 {
            return Err(Self::ZeroMinSize);
        }
        if min_size > size {
            return Err(Self::MinExceedsSize { min_size, size });
        }
        if ttl.is_zero() {
            return Err(Self::ZeroTtl);
        }
        Ok(())
    }
}
