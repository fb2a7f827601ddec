//! Matchmaking queue, pairing rules and coordinator

pub mod compat;
pub mod queue;
pub mod service;

pub use queue::{MatchmakingQueue, QueueEntry, QueueNotice};
pub use service::{MatchmakingService, QueueSubscription};
