//! Matchmaking core
//!
//! A concurrent library that groups incoming player session requests into
//! fixed-capacity wait rooms according to a configurable [`Rule`], then
//! releases each room as a finished match when either its capacity is
//! reached or its time-to-live expires.
//!
//! Three cooperating pieces: [`Rule`] derives a bucket key from a
//! request's attributes and decides admissibility; [`WaitRoom`] is the
//! bounded, TTL-bounded collection with its close/deliver state machine;
//! [`Controller`] serializes admission per bucket, owns the delivery
//! channel, and coordinates graceful shutdown.
//!
//! This crate is a library, not a network service: there is no file
//! format, no wire protocol, no CLI. The caller owns the process entry
//! point, logging sinks, and the downstream consumer that actually
//! "starts the game" once a room is delivered via [`OnRoomReady`].

mod bucket;
mod controller;
mod error;
mod model;
mod rule;
mod wait_room;

pub use controller::{Controller, OnRoomReady, Submission, DEFAULT_SHUTDOWN_TIMEOUT};
pub use error::ConfigError;
pub use model::{Attrs, ParamTag, Request, Session, WaitRoomConfig};
pub use rule::{KeyBuilder, MatchPredicate, Rule};
pub use wait_room::WaitRoom;
