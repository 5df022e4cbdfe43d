//! Tandem - discovery, matching and messaging gate for the Tandem dating app
//!
//! The decision engine has three parts:
//! - [`EligibilityFilter`]: who appears in whose discovery queue
//! - [`MatchResolver`]: records decisions and turns mutual likes into matches
//! - [`MessagingGate`]: who may send the first message, and match expiry
//!
//! Storage sits behind the [`Store`] trait with PostgreSQL and in-memory
//! backends; the HTTP surface lives in [`routes`].

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{
    Clock, CoreError, CoreResult, EligibilityFilter, ManualClock, MatchResolver, MatchState,
    MessagingGate, SafetyService, SystemClock,
};
pub use models::{Decision, Gender, Match, Message, Preferences, User};
pub use services::{MemoryStore, PostgresStore, Store};
