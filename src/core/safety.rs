use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use uuid::Uuid;

use crate::core::clock::Clock;
use crate::core::error::{CoreError, CoreResult};
use crate::core::events::PairEvent;
use crate::core::resolver::MatchResolver;
use crate::models::{Block, Report, ReportReason};
use crate::services::store::{BlockOutcome, PurgeReport, Store};

pub const MAX_REPORT_DESCRIPTION_LEN: usize = 1000;

#[derive(Debug, Clone, Copy)]
pub struct SafetyPolicy {
    /// Reports within `report_window` that set the moderation flag
    pub auto_flag_reports: u64,
    pub report_window: Duration,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            auto_flag_reports: 3,
            report_window: Duration::hours(24),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BlockResult {
    Blocked { block: Block, purged: PurgeReport },
    AlreadyBlocked { block: Block, purged: PurgeReport },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResult {
    pub report: Report,
    /// The reported user crossed the auto-flag threshold with this report
    pub flagged: bool,
}

/// Blocks and reports.
///
/// A new block is published as a [`PairEvent`] to the match resolver, which
/// removes the pair's match, messages and decisions.
pub struct SafetyService<S> {
    store: Arc<S>,
    resolver: Arc<MatchResolver<S>>,
    clock: Arc<dyn Clock>,
    policy: SafetyPolicy,
}

impl<S: Store> SafetyService<S> {
    pub fn new(
        store: Arc<S>,
        resolver: Arc<MatchResolver<S>>,
        clock: Arc<dyn Clock>,
        policy: SafetyPolicy,
    ) -> Self {
        Self { store, resolver, clock, policy }
    }

    async fn ensure_user(&self, id: Uuid) -> CoreResult<()> {
        match self.store.get_user(id).await? {
            Some(_) => Ok(()),
            None => Err(CoreError::user_not_found(id)),
        }
    }

    /// Block `blocked_id`. Idempotent: a repeat block succeeds without
    /// creating a second record.
    ///
    /// The pair is purged on every call, so repeating a block whose purge
    /// failed after the block was stored finishes the cascade.
    pub async fn block(&self, blocker_id: Uuid, blocked_id: Uuid) -> CoreResult<BlockResult> {
        if blocker_id == blocked_id {
            return Err(CoreError::SelfReference);
        }
        self.ensure_user(blocked_id).await?;

        let block = Block {
            blocker_id,
            blocked_id,
            created_at: self.clock.now(),
        };

        let outcome = self.store.insert_block(block).await?;
        if let BlockOutcome::Created(_) = outcome {
            tracing::info!("User {} blocked {}", blocker_id, blocked_id);
        }

        let purged = self
            .resolver
            .handle_pair_event(&PairEvent::Blocked { blocker: blocker_id, blocked: blocked_id })
            .await?
            .unwrap_or_default();

        Ok(match outcome {
            BlockOutcome::Created(block) => BlockResult::Blocked { block, purged },
            BlockOutcome::AlreadyExists(block) => BlockResult::AlreadyBlocked { block, purged },
        })
    }

    /// Remove a block. Nothing that was purged comes back.
    pub async fn unblock(&self, blocker_id: Uuid, blocked_id: Uuid) -> CoreResult<()> {
        if !self.store.delete_block(blocker_id, blocked_id).await? {
            return Err(CoreError::NotFound { entity: "Block", id: blocked_id });
        }
        tracing::info!("User {} unblocked {}", blocker_id, blocked_id);
        self.resolver
            .handle_pair_event(&PairEvent::Unblocked { blocker: blocker_id, blocked: blocked_id })
            .await?;
        Ok(())
    }

    pub async fn blocked_users(&self, blocker_id: Uuid) -> CoreResult<Vec<Block>> {
        Ok(self.store.blocks_by(blocker_id).await?)
    }

    /// File a report; enough distinct recent reporters set the moderation
    /// flag. A reporter gets one report per user.
    pub async fn report(
        &self,
        reporter_id: Uuid,
        reported_id: Uuid,
        reason: ReportReason,
        description: Option<String>,
    ) -> CoreResult<ReportResult> {
        if reporter_id == reported_id {
            return Err(CoreError::SelfReference);
        }
        let description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        if description
            .as_ref()
            .map_or(false, |d| d.chars().count() > MAX_REPORT_DESCRIPTION_LEN)
        {
            return Err(CoreError::invalid(format!(
                "description exceeds {} characters",
                MAX_REPORT_DESCRIPTION_LEN
            )));
        }
        self.ensure_user(reported_id).await?;

        let now = self.clock.now();
        let report = self
            .store
            .insert_report(Report {
                id: Uuid::new_v4(),
                reporter_id,
                reported_id,
                reason,
                description,
                created_at: now,
            })
            .await?
            .ok_or(CoreError::DuplicateReport { reporter: reporter_id, reported: reported_id })?;

        let recent = self
            .store
            .reports_against_since(reported_id, now - self.policy.report_window)
            .await?;

        let flagged = recent >= self.policy.auto_flag_reports;
        if flagged {
            self.store.set_moderation_flag(reported_id, true).await?;
            tracing::warn!(
                "User {} flagged for moderation after {} reports",
                reported_id,
                recent
            );
        }

        Ok(ReportResult { report, flagged })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::models::{Entitlement, Gender, PairKey, Preferences, User};
    use crate::services::billing::StaticEntitlements;
    use crate::services::MemoryStore;
    use chrono::{NaiveDate, Utc};

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: ManualClock,
        resolver: Arc<MatchResolver<MemoryStore>>,
        safety: SafetyService<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(Utc::now());
        let resolver = Arc::new(MatchResolver::new(
            store.clone(),
            Arc::new(StaticEntitlements::new(Entitlement::default())),
            Arc::new(clock.clone()),
        ));
        let safety = SafetyService::new(
            store.clone(),
            resolver.clone(),
            Arc::new(clock.clone()),
            SafetyPolicy::default(),
        );
        Fixture { store, clock, resolver, safety }
    }

    async fn add_user(store: &MemoryStore) -> Uuid {
        let user = User {
            id: Uuid::new_v4(),
            name: "User".to_string(),
            gender: Gender::Male,
            date_of_birth: NaiveDate::from_ymd_opt(1990, 5, 5).unwrap(),
            location: None,
            preferences: Preferences::default(),
            last_active: Utc::now(),
            is_blocked: false,
            created_at: Utc::now(),
        };
        store.insert_user(user).await.unwrap().id
    }

    #[tokio::test]
    async fn test_block_is_idempotent_and_cascades() {
        let f = fixture();
        let a = add_user(&f.store).await;
        let b = add_user(&f.store).await;
        f.resolver.record_decision(a, b, true, false).await.unwrap();
        f.resolver.record_decision(b, a, true, false).await.unwrap();

        let first = f.safety.block(b, a).await.unwrap();
        match first {
            BlockResult::Blocked { purged, .. } => assert_eq!(purged.matches_removed, 1),
            other => panic!("expected a new block, got {:?}", other),
        }
        assert!(matches!(f.safety.block(b, a).await.unwrap(), BlockResult::AlreadyBlocked { .. }));
        assert_eq!(f.safety.blocked_users(b).await.unwrap().len(), 1);
        assert!(f.store.match_for_pair(PairKey::new(a, b)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_repeat_block_finishes_interrupted_purge() {
        let f = fixture();
        let a = add_user(&f.store).await;
        let b = add_user(&f.store).await;
        f.resolver.record_decision(a, b, true, false).await.unwrap();
        f.resolver.record_decision(b, a, true, false).await.unwrap();

        // Block row committed, purge never ran
        f.store
            .insert_block(Block { blocker_id: a, blocked_id: b, created_at: f.clock.now() })
            .await
            .unwrap();
        assert!(f.store.match_for_pair(PairKey::new(a, b)).await.unwrap().is_some());

        match f.safety.block(a, b).await.unwrap() {
            BlockResult::AlreadyBlocked { purged, .. } => {
                assert_eq!(purged.matches_removed, 1);
                assert_eq!(purged.decisions_removed, 2);
            }
            other => panic!("expected an existing block, got {:?}", other),
        }
        assert!(f.store.match_for_pair(PairKey::new(a, b)).await.unwrap().is_none());
        assert!(f.store.get_decision(b, a).await.unwrap().is_none());

        // Nothing left to remove on the next repeat
        match f.safety.block(a, b).await.unwrap() {
            BlockResult::AlreadyBlocked { purged, .. } => assert_eq!(purged, PurgeReport::default()),
            other => panic!("expected an existing block, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unblock_restores_nothing() {
        let f = fixture();
        let a = add_user(&f.store).await;
        let b = add_user(&f.store).await;
        f.resolver.record_decision(a, b, true, false).await.unwrap();
        f.safety.block(a, b).await.unwrap();
        f.safety.unblock(a, b).await.unwrap();

        assert!(f.store.get_decision(a, b).await.unwrap().is_none());
        assert!(matches!(f.safety.unblock(a, b).await, Err(CoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_self_block_rejected() {
        let f = fixture();
        let a = add_user(&f.store).await;
        assert!(matches!(f.safety.block(a, a).await, Err(CoreError::SelfReference)));
    }

    #[tokio::test]
    async fn test_reports_auto_flag_within_window() {
        let f = fixture();
        let target = add_user(&f.store).await;

        let first = f.safety.report(add_user(&f.store).await, target, ReportReason::Spam, None).await.unwrap();
        assert!(!first.flagged);

        // Falls out of the window
        f.clock.advance(Duration::hours(25));
        let second = f.safety.report(add_user(&f.store).await, target, ReportReason::Spam, None).await.unwrap();
        let third = f.safety.report(add_user(&f.store).await, target, ReportReason::Harassment, None).await.unwrap();
        assert!(!second.flagged && !third.flagged);

        let fourth = f
            .safety
            .report(add_user(&f.store).await, target, ReportReason::FakeProfile, Some("  fake  ".into()))
            .await
            .unwrap();
        assert!(fourth.flagged);
        assert_eq!(fourth.report.description.as_deref(), Some("fake"));
        assert!(f.store.get_user(target).await.unwrap().unwrap().is_blocked);
    }

    #[tokio::test]
    async fn test_single_reporter_cannot_flag_alone() {
        let f = fixture();
        let reporter = add_user(&f.store).await;
        let target = add_user(&f.store).await;

        let first = f.safety.report(reporter, target, ReportReason::Spam, None).await.unwrap();
        assert!(!first.flagged);

        for reason in [ReportReason::Harassment, ReportReason::Other] {
            let err = f.safety.report(reporter, target, reason, None).await.unwrap_err();
            assert!(matches!(err, CoreError::DuplicateReport { .. }));
        }

        assert!(!f.store.get_user(target).await.unwrap().unwrap().is_blocked);
        assert_eq!(f.store.reports_against_since(target, f.clock.now() - Duration::hours(1)).await.unwrap(), 1);
    }
}
