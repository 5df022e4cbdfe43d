//! The `Store` trait and its outcome types.
//!
//! The decision engine depends on this abstraction; `PostgresStore` backs
//! production and `MemoryStore` backs tests and local runs. Compound
//! operations (`record_decision`, `insert_block`, `purge_pair`,
//! `append_message`) must be atomic with respect to other writers on the
//! same pair or match. Photo writers are atomic per user.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Block, BoundingBox, CandidateQuery, Coordinates, Decision, Match, Message, PairKey, Photo,
    Preferences, Report, User,
};

/// Errors that can occur in a storage backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Result of inserting a match on a uniqueness-constrained pair key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchInsert {
    Created(Match),
    /// Another writer created the match first
    Existing(Match),
}

impl MatchInsert {
    pub fn into_match(self) -> Match {
        match self {
            MatchInsert::Created(m) | MatchInsert::Existing(m) => m,
        }
    }
}

/// Outcome of the atomic decision write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionOutcome {
    Recorded {
        decision: Decision,
        /// Set when the decision closed a mutual like
        matched: Option<MatchInsert>,
    },
    Duplicate,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    Created(Block),
    AlreadyExists(Block),
}

/// What a pair purge removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    pub matches_removed: u64,
    pub messages_removed: u64,
    pub decisions_removed: u64,
}

/// A match as listed for one of its parties
#[derive(Debug, Clone, PartialEq)]
pub struct MatchWithLatest {
    pub record: Match,
    pub last_message: Option<Message>,
    pub message_count: u64,
}

/// Abstraction over a storage backend.
///
/// All methods return `Send` futures so backends can be shared across the
/// actix worker runtimes.
pub trait Store: Send + Sync + 'static {
    // ── Users ─────────────────────────────────────────────────────────────

    fn insert_user(
        &self,
        user: User,
    ) -> impl Future<Output = Result<User, StoreError>> + Send + '_;

    fn get_user(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<User>, StoreError>> + Send + '_;

    fn update_location(
        &self,
        id: Uuid,
        location: Coordinates,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_;

    fn touch_activity(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_;

    fn update_preferences(
        &self,
        id: Uuid,
        preferences: Preferences,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_;

    fn set_moderation_flag(
        &self,
        id: Uuid,
        flagged: bool,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_;

    // ── Discovery ─────────────────────────────────────────────────────────

    /// One page of prefiltered candidates, see [`CandidateQuery`]
    fn candidates<'a>(
        &'a self,
        query: &'a CandidateQuery,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<User>, StoreError>> + Send + 'a;

    /// Users inside the box, excluding `user_id`, moderated users and users
    /// in a block with `user_id`
    fn within_box(
        &self,
        user_id: Uuid,
        bbox: BoundingBox,
    ) -> impl Future<Output = Result<Vec<User>, StoreError>> + Send + '_;

    // ── Decisions ─────────────────────────────────────────────────────────

    fn get_decision(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
    ) -> impl Future<Output = Result<Option<Decision>, StoreError>> + Send + '_;

    /// Insert a decision and, if it closes a mutual like, insert-or-get the
    /// match. Serialized per unordered pair; re-checks blocks and duplicates.
    fn record_decision(
        &self,
        decision: Decision,
    ) -> impl Future<Output = Result<DecisionOutcome, StoreError>> + Send + '_;

    // ── Blocks ────────────────────────────────────────────────────────────

    fn insert_block(
        &self,
        block: Block,
    ) -> impl Future<Output = Result<BlockOutcome, StoreError>> + Send + '_;

    /// Returns `false` when no such block existed
    fn delete_block(
        &self,
        blocker_id: Uuid,
        blocked_id: Uuid,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_;

    /// True when either user has blocked the other
    fn is_blocked(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_;

    fn blocks_by(
        &self,
        blocker_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Block>, StoreError>> + Send + '_;

    /// Remove the pair's match (with its messages) and both decisions
    fn purge_pair(
        &self,
        pair: PairKey,
    ) -> impl Future<Output = Result<PurgeReport, StoreError>> + Send + '_;

    // ── Matches ───────────────────────────────────────────────────────────

    fn get_match(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Match>, StoreError>> + Send + '_;

    fn match_for_pair(
        &self,
        pair: PairKey,
    ) -> impl Future<Output = Result<Option<Match>, StoreError>> + Send + '_;

    /// Matches of a user, newest first
    fn matches_for(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Vec<MatchWithLatest>, StoreError>> + Send + '_;

    // ── Messages ──────────────────────────────────────────────────────────

    /// Persist a message and bump the match's `last_message_at`.
    /// Fails with `NotFound` if the match no longer exists.
    ///
    /// `last_message_at` is never cleared, not even by `delete_message`;
    /// the messaging gate reads it as the consummation marker.
    fn append_message(
        &self,
        message: Message,
    ) -> impl Future<Output = Result<Message, StoreError>> + Send + '_;

    /// Messages of a match, newest first
    fn messages(
        &self,
        match_id: Uuid,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Message>, StoreError>> + Send + '_;

    /// Mark every unread message not sent by `reader_id` as read
    fn mark_read_for(
        &self,
        match_id: Uuid,
        reader_id: Uuid,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send + '_;

    fn get_message(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Message>, StoreError>> + Send + '_;

    fn mark_message_read(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_;

    fn delete_message(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_;

    /// Unread messages addressed to `user_id` across all matches
    fn unread_count(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send + '_;

    // ── Reports ───────────────────────────────────────────────────────────

    /// Persist a report. Returns `None` without writing anything if the
    /// reporter already reported this user.
    fn insert_report(
        &self,
        report: Report,
    ) -> impl Future<Output = Result<Option<Report>, StoreError>> + Send + '_;

    /// Distinct reporters of `reported_id` since `since`
    fn reports_against_since(
        &self,
        reported_id: Uuid,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send + '_;

    // ── Photos ────────────────────────────────────────────────────────────

    /// Store a photo unless its owner already has `max` photos, in which
    /// case nothing is written and `None` comes back. The stored photo is
    /// primary exactly when it is the owner's first.
    fn add_photo(
        &self,
        photo: Photo,
        max: usize,
    ) -> impl Future<Output = Result<Option<Photo>, StoreError>> + Send + '_;

    fn get_photo(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Photo>, StoreError>> + Send + '_;

    /// Photos of a user, primary first then oldest first
    fn photos_for(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Photo>, StoreError>> + Send + '_;

    /// Make `photo_id` the user's only primary photo. `None` when the user
    /// has no such photo.
    fn set_primary_photo(
        &self,
        user_id: Uuid,
        photo_id: Uuid,
    ) -> impl Future<Output = Result<Option<Photo>, StoreError>> + Send + '_;

    /// Remove one of the user's photos. If it was primary, the oldest
    /// remaining photo becomes primary. Returns `false` when the user has no
    /// such photo.
    fn delete_photo(
        &self,
        user_id: Uuid,
        photo_id: Uuid,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_;

    // ── Health ────────────────────────────────────────────────────────────

    fn health_check(&self) -> impl Future<Output = Result<bool, StoreError>> + Send + '_;
}
