//! Core data model: sessions, requests, and wait-room configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;
use crate::rule::Rule;

/// An opaque identifier for a connected player.
///
/// The core never interprets this beyond equality of [`Session::id`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Session {
    pub id: String,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A parameter tag usable in a request's attribute map.
///
/// This is the closed set a [`Rule`] composes keys from, modeled as a plain
/// enum so the closed set is enforced by the type system rather than by a
/// runtime validity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamTag {
    Table,
    League,
    Level,
    Game,
}

/// A request's attribute map: parameter tag to integer value.
pub type Attrs = HashMap<ParamTag, i64>;

/// A transient request to join a wait room.
///
/// Only [`Request::session`] survives past admission; the rest is consumed
/// by [`Rule::matches`] and [`Rule::build_key`].
#[derive(Clone)]
pub struct Request {
    pub session: Session,
    pub attrs: Attrs,
    pub room_config: WaitRoomConfig,
    pub rule: Arc<Rule>,
}

/// Fixed shape of a wait room: capacity, readiness threshold, and TTL.
///
/// Two configs are "compatible for reuse" iff they are structurally equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitRoomConfig {
    size: usize,
    min_size: usize,
    ttl: Duration,
}

impl WaitRoomConfig {
    /// Builds a validated config, enforcing `0 < min_size <= size` and
    /// `ttl > 0`.
    pub fn new(size: usize, min_size: usize, ttl: Duration) -> Result<Self, ConfigError> {
        ConfigError::check(size, min_size, ttl)?;
        Ok(Self {
            size,
            min_size,
            ttl,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
