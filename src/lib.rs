//! Duel Arena server
//!
//! Live matchmaking for head-to-head quiz duels and the synchronized battle
//! sessions that follow. Players wait in a rating-windowed queue, get paired,
//! then answer the same questions round by round while the server resolves
//! each round's attack, defense and counter-hit from both submissions.

pub mod app;
pub mod config;
pub mod error;
pub mod game;
pub mod http;
pub mod matchmaking;
pub mod store;
pub mod util;
pub mod ws;
