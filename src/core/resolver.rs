use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::core::clock::Clock;
use crate::core::error::{CoreError, CoreResult};
use crate::core::events::PairEvent;
use crate::models::{Decision, Match};
use crate::services::billing::SubscriptionService;
use crate::services::store::{DecisionOutcome, MatchInsert, MatchWithLatest, PurgeReport, Store};

/// Result of recording a decision
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResult {
    pub decision: Decision,
    /// True when this decision closed a mutual like
    pub matched: bool,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_record: Option<Match>,
}

/// Records likes, super-likes and passes and turns mutual likes into matches
pub struct MatchResolver<S> {
    store: Arc<S>,
    billing: Arc<dyn SubscriptionService>,
    clock: Arc<dyn Clock>,
}

impl<S: Store> MatchResolver<S> {
    pub fn new(store: Arc<S>, billing: Arc<dyn SubscriptionService>, clock: Arc<dyn Clock>) -> Self {
        Self { store, billing, clock }
    }

    /// Record `actor_id`'s decision on `target_id`.
    ///
    /// A positive decision whose reverse is also positive creates the pair's
    /// match. Two concurrent closing likes both report `matched`; only one
    /// match row ever exists.
    ///
    /// Super-likes are metered best-effort: the allowance is read before the
    /// decision is stored and consumed after, as separate billing calls. Two
    /// concurrent super-likes against a last remaining unit can both pass,
    /// and a failed consumption is logged without failing the decision.
    pub async fn record_decision(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
        is_positive: bool,
        is_super: bool,
    ) -> CoreResult<DecisionResult> {
        if actor_id == target_id {
            return Err(CoreError::SelfReference);
        }
        if is_super && !is_positive {
            return Err(CoreError::invalid("a pass cannot be a super-like"));
        }

        if self.store.get_user(actor_id).await?.is_none() {
            return Err(CoreError::user_not_found(actor_id));
        }
        if self.store.get_user(target_id).await?.is_none() {
            return Err(CoreError::user_not_found(target_id));
        }

        if self.store.is_blocked(actor_id, target_id).await? {
            return Err(CoreError::Blocked);
        }
        if self.store.get_decision(actor_id, target_id).await?.is_some() {
            return Err(CoreError::DuplicateDecision { actor: actor_id, target: target_id });
        }

        let mut consume_after = false;
        if is_super {
            let entitlement = self.billing.entitlement(actor_id).await?;
            if !entitlement.can_super_like() {
                return Err(CoreError::QuotaExceeded);
            }
            consume_after = !entitlement.premium;
        }

        let decision = Decision {
            actor_id,
            target_id,
            is_positive,
            is_super,
            created_at: self.clock.now(),
        };

        let (decision, matched) = match self.store.record_decision(decision).await? {
            DecisionOutcome::Recorded { decision, matched } => (decision, matched),
            DecisionOutcome::Duplicate => {
                return Err(CoreError::DuplicateDecision { actor: actor_id, target: target_id })
            }
            DecisionOutcome::Blocked => return Err(CoreError::Blocked),
        };

        if consume_after {
            if let Err(e) = self.billing.consume_super_like(actor_id).await {
                tracing::warn!("Failed to consume super-like for {}: {}", actor_id, e);
            }
        }

        let match_record = matched.map(|inserted| {
            match &inserted {
                MatchInsert::Created(m) => {
                    tracing::info!("Match {} created for {} and {}", m.id, m.user1_id, m.user2_id)
                }
                MatchInsert::Existing(m) => {
                    tracing::debug!("Match {} already existed", m.id)
                }
            }
            inserted.into_match()
        });

        Ok(DecisionResult {
            decision,
            matched: match_record.is_some(),
            match_record,
        })
    }

    /// Matches of `user_id`, newest first
    pub async fn matches_for(&self, user_id: Uuid) -> CoreResult<Vec<MatchWithLatest>> {
        Ok(self.store.matches_for(user_id).await?)
    }

    /// React to a safety event. A block removes the pair's match, its
    /// messages and both decisions; an unblock restores nothing.
    pub async fn handle_pair_event(&self, event: &PairEvent) -> CoreResult<Option<PurgeReport>> {
        match event {
            PairEvent::Blocked { .. } => {
                let report = self.store.purge_pair(event.pair()).await?;
                tracing::info!(
                    "Purged pair {}: {} match(es), {} message(s), {} decision(s)",
                    event.pair().lock_key(),
                    report.matches_removed,
                    report.messages_removed,
                    report.decisions_removed
                );
                Ok(Some(report))
            }
            PairEvent::Unblocked { .. } => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::models::{Block, Entitlement, Gender, PairKey, Preferences, User};
    use crate::services::billing::{BillingError, BoxFuture, StaticEntitlements, SubscriptionService};
    use crate::services::MemoryStore;
    use chrono::{NaiveDate, Utc};

    struct Fixture {
        store: Arc<MemoryStore>,
        billing: Arc<StaticEntitlements>,
        resolver: MatchResolver<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let billing = Arc::new(StaticEntitlements::new(Entitlement {
            premium: false,
            super_likes_remaining: 1,
        }));
        let resolver = MatchResolver::new(
            store.clone(),
            billing.clone(),
            Arc::new(ManualClock::new(Utc::now())),
        );
        Fixture { store, billing, resolver }
    }

    async fn add_user(store: &MemoryStore) -> Uuid {
        let user = User {
            id: Uuid::new_v4(),
            name: "User".to_string(),
            gender: Gender::Female,
            date_of_birth: NaiveDate::from_ymd_opt(1994, 2, 2).unwrap(),
            location: None,
            preferences: Preferences::default(),
            last_active: Utc::now(),
            is_blocked: false,
            created_at: Utc::now(),
        };
        store.insert_user(user).await.unwrap().id
    }

    #[tokio::test]
    async fn test_mutual_like_creates_match() {
        let f = fixture();
        let a = add_user(&f.store).await;
        let b = add_user(&f.store).await;

        let first = f.resolver.record_decision(a, b, true, false).await.unwrap();
        assert!(!first.matched);

        let second = f.resolver.record_decision(b, a, true, false).await.unwrap();
        assert!(second.matched);
        let m = second.match_record.unwrap();
        assert_eq!(m.pair(), PairKey::new(a, b));
    }

    #[tokio::test]
    async fn test_pass_never_matches() {
        let f = fixture();
        let a = add_user(&f.store).await;
        let b = add_user(&f.store).await;

        f.resolver.record_decision(a, b, true, false).await.unwrap();
        let result = f.resolver.record_decision(b, a, false, false).await.unwrap();
        assert!(!result.matched);
        assert!(f.store.match_for_pair(PairKey::new(a, b)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejections() {
        let f = fixture();
        let a = add_user(&f.store).await;
        let b = add_user(&f.store).await;

        assert!(matches!(
            f.resolver.record_decision(a, a, true, false).await,
            Err(CoreError::SelfReference)
        ));
        assert!(matches!(
            f.resolver.record_decision(a, Uuid::new_v4(), true, false).await,
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            f.resolver.record_decision(a, b, false, true).await,
            Err(CoreError::InvalidInput(_))
        ));

        f.resolver.record_decision(a, b, false, false).await.unwrap();
        assert!(matches!(
            f.resolver.record_decision(a, b, true, false).await,
            Err(CoreError::DuplicateDecision { .. })
        ));
    }

    #[tokio::test]
    async fn test_blocked_pair_rejected() {
        let f = fixture();
        let a = add_user(&f.store).await;
        let b = add_user(&f.store).await;
        f.store
            .insert_block(Block { blocker_id: b, blocked_id: a, created_at: Utc::now() })
            .await
            .unwrap();

        assert!(matches!(
            f.resolver.record_decision(a, b, true, false).await,
            Err(CoreError::Blocked)
        ));
        assert!(f.store.get_decision(a, b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_super_like_quota() {
        let f = fixture();
        let a = add_user(&f.store).await;
        let b = add_user(&f.store).await;
        let c = add_user(&f.store).await;

        let result = f.resolver.record_decision(a, b, true, true).await.unwrap();
        assert!(result.decision.is_super);

        assert!(matches!(
            f.resolver.record_decision(a, c, true, true).await,
            Err(CoreError::QuotaExceeded)
        ));
        assert!(f.store.get_decision(a, c).await.unwrap().is_none());

        f.billing.grant(a, Entitlement { premium: true, super_likes_remaining: 0 });
        assert!(f.resolver.record_decision(a, c, true, true).await.is_ok());
    }

    /// Always reports one unit left and never manages to consume it
    struct StaleAllowance;

    impl SubscriptionService for StaleAllowance {
        fn entitlement(&self, _user_id: Uuid) -> BoxFuture<'_, Result<Entitlement, BillingError>> {
            Box::pin(async { Ok(Entitlement { premium: false, super_likes_remaining: 1 }) })
        }

        fn consume_super_like(&self, user_id: Uuid) -> BoxFuture<'_, Result<(), BillingError>> {
            Box::pin(async move { Err(BillingError::Api(format!("ledger busy for {}", user_id))) })
        }
    }

    #[tokio::test]
    async fn test_super_like_metering_is_best_effort() {
        let store = Arc::new(MemoryStore::new());
        let resolver = MatchResolver::new(
            store.clone(),
            Arc::new(StaleAllowance),
            Arc::new(ManualClock::new(Utc::now())),
        );
        let a = add_user(&store).await;
        let b = add_user(&store).await;
        let c = add_user(&store).await;

        // Both see the same last unit; neither consumption lands
        let first = resolver.record_decision(a, b, true, true).await.unwrap();
        let second = resolver.record_decision(a, c, true, true).await.unwrap();
        assert!(first.decision.is_super && second.decision.is_super);
        assert!(store.get_decision(a, c).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_block_event_purges_pair() {
        let f = fixture();
        let a = add_user(&f.store).await;
        let b = add_user(&f.store).await;
        f.resolver.record_decision(a, b, true, false).await.unwrap();
        f.resolver.record_decision(b, a, true, false).await.unwrap();

        let report = f
            .resolver
            .handle_pair_event(&PairEvent::Blocked { blocker: a, blocked: b })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.matches_removed, 1);
        assert_eq!(report.decisions_removed, 2);

        let none = f
            .resolver
            .handle_pair_event(&PairEvent::Unblocked { blocker: a, blocked: b })
            .await
            .unwrap();
        assert!(none.is_none());
    }
}
