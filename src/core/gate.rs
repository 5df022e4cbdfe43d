use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::clock::Clock;
use crate::core::error::{CoreError, CoreResult};
use crate::models::{Gender, Match, Message};
use crate::services::store::{Store, StoreError};

pub const DEFAULT_WINDOW_HOURS: i64 = 24;
pub const MAX_MESSAGE_LEN: usize = 2000;
pub const MAX_PAGE_SIZE: usize = 100;

/// Messaging state of a match, derived from the clock and message history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MatchState {
    /// No message has ever been sent
    Unconsummated {
        #[serde(rename = "windowOpen")]
        window_open: bool,
    },
    /// At least one message has been sent; permanent
    Consummated,
}

/// Compute the state of a match at `now`.
///
/// The window is measured from match creation and is inclusive: a match
/// created exactly `window` ago is still open.
pub fn state_of(created_at: DateTime<Utc>, consummated: bool, now: DateTime<Utc>, window: Duration) -> MatchState {
    if consummated {
        return MatchState::Consummated;
    }
    MatchState::Unconsummated {
        window_open: now - created_at <= window,
    }
}

/// Who may open an unconsummated match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstMoverPolicy {
    /// The party with this gender opens; if neither or both have it, either may
    Gender(Gender),
    Anyone,
}

impl Default for FirstMoverPolicy {
    fn default() -> Self {
        FirstMoverPolicy::Gender(Gender::Female)
    }
}

impl FromStr for FirstMoverPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anyone" | "any" => Ok(FirstMoverPolicy::Anyone),
            other => other.parse::<Gender>().map(FirstMoverPolicy::Gender),
        }
    }
}

impl FirstMoverPolicy {
    pub fn allows(&self, sender: Gender, counterpart: Gender) -> bool {
        match *self {
            FirstMoverPolicy::Anyone => true,
            FirstMoverPolicy::Gender(designated) => sender == designated || counterpart != designated,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GatePolicy {
    pub first_mover: FirstMoverPolicy,
    pub window: Duration,
    pub max_message_len: usize,
    /// Default page size for message listings
    pub page_size: usize,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            first_mover: FirstMoverPolicy::default(),
            window: Duration::hours(DEFAULT_WINDOW_HOURS),
            max_message_len: MAX_MESSAGE_LEN,
            page_size: 50,
        }
    }
}

/// Decides who may message whom, and persists the messages it lets through
pub struct MessagingGate<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    policy: GatePolicy,
}

impl<S: Store> MessagingGate<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, policy: GatePolicy) -> Self {
        Self { store, clock, policy }
    }

    pub fn policy(&self) -> GatePolicy {
        self.policy
    }

    /// Load a match, failing unless `user_id` is one of its parties
    async fn match_for_party(&self, match_id: Uuid, user_id: Uuid) -> CoreResult<Match> {
        let record = self
            .store
            .get_match(match_id)
            .await?
            .ok_or_else(|| CoreError::match_not_found(match_id))?;

        if !record.is_party(user_id) {
            return Err(CoreError::Forbidden(format!(
                "user {} is not a party to match {}",
                user_id, match_id
            )));
        }
        Ok(record)
    }

    /// Messaging state of `record` at the clock's current time
    pub fn state(&self, record: &Match) -> MatchState {
        state_of(
            record.created_at,
            record.last_message_at.is_some(),
            self.clock.now(),
            self.policy.window,
        )
    }

    async fn is_first_mover(&self, record: &Match, sender_id: Uuid) -> CoreResult<bool> {
        if self.policy.first_mover == FirstMoverPolicy::Anyone {
            return Ok(true);
        }
        let counterpart_id = record
            .counterpart(sender_id)
            .ok_or_else(|| CoreError::Forbidden(format!("user {} is not a party", sender_id)))?;

        let sender = self
            .store
            .get_user(sender_id)
            .await?
            .ok_or_else(|| CoreError::user_not_found(sender_id))?;
        let counterpart = self
            .store
            .get_user(counterpart_id)
            .await?
            .ok_or_else(|| CoreError::user_not_found(counterpart_id))?;

        Ok(self.policy.first_mover.allows(sender.gender, counterpart.gender))
    }

    /// Messaging state of a match as seen by one of its parties
    pub async fn match_state(&self, match_id: Uuid, user_id: Uuid) -> CoreResult<MatchState> {
        let record = self.match_for_party(match_id, user_id).await?;
        Ok(self.state(&record))
    }

    /// True only while the match is unconsummated, inside its window, and
    /// `sender_id` is an allowed first mover
    pub async fn can_send_first_message(&self, match_id: Uuid, sender_id: Uuid) -> CoreResult<bool> {
        let record = self.match_for_party(match_id, sender_id).await?;
        match self.state(&record) {
            MatchState::Unconsummated { window_open: true } => {
                self.is_first_mover(&record, sender_id).await
            }
            _ => Ok(false),
        }
    }

    /// Gate consulted before any message is persisted
    pub async fn authorize_send(&self, match_id: Uuid, sender_id: Uuid) -> CoreResult<Match> {
        let record = self.match_for_party(match_id, sender_id).await?;
        match self.state(&record) {
            MatchState::Consummated => Ok(record),
            MatchState::Unconsummated { window_open: false } => Err(CoreError::MatchExpired),
            MatchState::Unconsummated { window_open: true } => {
                if self.is_first_mover(&record, sender_id).await? {
                    Ok(record)
                } else {
                    Err(CoreError::NotYourTurn)
                }
            }
        }
    }

    /// Authorize and persist a message
    pub async fn send_message(&self, match_id: Uuid, sender_id: Uuid, content: &str) -> CoreResult<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(CoreError::invalid("message content cannot be empty"));
        }
        if content.chars().count() > self.policy.max_message_len {
            return Err(CoreError::invalid(format!(
                "message content exceeds {} characters",
                self.policy.max_message_len
            )));
        }

        self.authorize_send(match_id, sender_id).await?;

        let message = Message {
            id: Uuid::new_v4(),
            match_id,
            sender_id,
            content: content.to_string(),
            is_read: false,
            created_at: self.clock.now(),
        };

        match self.store.append_message(message).await {
            Ok(saved) => {
                tracing::debug!("Message {} sent in match {}", saved.id, match_id);
                Ok(saved)
            }
            // Match was purged between the gate check and the write
            Err(StoreError::NotFound(_)) => Err(CoreError::match_not_found(match_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// One page of a match's messages in chronological order.
    ///
    /// Page 1 holds the most recent messages. Marks the counterpart's
    /// messages as read.
    pub async fn list_messages(
        &self,
        match_id: Uuid,
        reader_id: Uuid,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Message>> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(self.policy.page_size);
        if page == 0 {
            return Err(CoreError::invalid("page must be at least 1"));
        }
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(CoreError::invalid(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        self.match_for_party(match_id, reader_id).await?;

        let offset = (page - 1).saturating_mul(limit);
        let mut messages = self.store.messages(match_id, offset, limit).await?;
        messages.reverse();

        let marked = self.store.mark_read_for(match_id, reader_id).await?;
        if marked > 0 {
            tracing::trace!("Marked {} message(s) read in match {}", marked, match_id);
        }

        Ok(messages)
    }

    /// Mark a single received message as read
    pub async fn mark_read(&self, message_id: Uuid, reader_id: Uuid) -> CoreResult<()> {
        let message = self
            .store
            .get_message(message_id)
            .await?
            .ok_or_else(|| CoreError::message_not_found(message_id))?;

        self.match_for_party(message.match_id, reader_id).await?;

        if message.sender_id == reader_id {
            return Err(CoreError::invalid("cannot mark your own message as read"));
        }

        if !self.store.mark_message_read(message_id).await? {
            return Err(CoreError::message_not_found(message_id));
        }
        Ok(())
    }

    /// Delete a message; only its sender may
    pub async fn delete_message(&self, message_id: Uuid, requester_id: Uuid) -> CoreResult<()> {
        let message = self
            .store
            .get_message(message_id)
            .await?
            .ok_or_else(|| CoreError::message_not_found(message_id))?;

        if message.sender_id != requester_id {
            return Err(CoreError::Forbidden("only the sender can delete a message".into()));
        }

        if !self.store.delete_message(message_id).await? {
            return Err(CoreError::message_not_found(message_id));
        }
        Ok(())
    }

    pub async fn unread_count(&self, user_id: Uuid) -> CoreResult<u64> {
        Ok(self.store.unread_count(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_window_is_inclusive() {
        let window = Duration::hours(24);
        assert_eq!(
            state_of(t0(), false, t0() + window, window),
            MatchState::Unconsummated { window_open: true }
        );
        assert_eq!(
            state_of(t0(), false, t0() + window + Duration::seconds(1), window),
            MatchState::Unconsummated { window_open: false }
        );
    }

    #[test]
    fn test_consummated_ignores_elapsed_time() {
        let window = Duration::hours(24);
        assert_eq!(
            state_of(t0(), true, t0() + Duration::days(365), window),
            MatchState::Consummated
        );
    }

    #[test]
    fn test_first_mover_policy() {
        let policy = FirstMoverPolicy::default();
        assert!(policy.allows(Gender::Female, Gender::Male));
        assert!(!policy.allows(Gender::Male, Gender::Female));
        // Neither party is female
        assert!(policy.allows(Gender::Male, Gender::Male));
        assert!(policy.allows(Gender::NonBinary, Gender::Male));
        // Both are
        assert!(policy.allows(Gender::Female, Gender::Female));

        assert!(FirstMoverPolicy::Anyone.allows(Gender::Male, Gender::Female));
    }

    #[test]
    fn test_parse_first_mover() {
        assert_eq!("female".parse::<FirstMoverPolicy>(), Ok(FirstMoverPolicy::Gender(Gender::Female)));
        assert_eq!("anyone".parse::<FirstMoverPolicy>(), Ok(FirstMoverPolicy::Anyone));
        assert!("nobody".parse::<FirstMoverPolicy>().is_err());
    }

    #[test]
    fn test_state_serializes_with_tag() {
        let json = serde_json::to_value(MatchState::Unconsummated { window_open: true }).unwrap();
        assert_eq!(json, serde_json::json!({"state": "unconsummated", "windowOpen": true}));
    }
}
