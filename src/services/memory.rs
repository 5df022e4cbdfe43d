use std::collections::{HashMap, HashSet};
use std::future::{ready, Future, Ready};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::distance::is_within_bounding_box;
use crate::models::{
    Block, BoundingBox, CandidateQuery, Coordinates, Decision, Match, Message, PairKey, Photo,
    Preferences, Report, User,
};
use crate::services::store::{
    BlockOutcome, DecisionOutcome, MatchInsert, MatchWithLatest, PurgeReport, Store, StoreError,
};

#[derive(Debug, Default)]
struct State {
    users: HashMap<Uuid, User>,
    decisions: HashMap<(Uuid, Uuid), Decision>,
    matches: HashMap<Uuid, Match>,
    match_by_pair: HashMap<PairKey, Uuid>,
    blocks: HashMap<(Uuid, Uuid), Block>,
    /// Insertion order doubles as the tie-breaker for equal timestamps
    messages: Vec<Message>,
    reports: Vec<Report>,
    photos: Vec<Photo>,
}

impl State {
    fn is_blocked(&self, a: Uuid, b: Uuid) -> bool {
        self.blocks.contains_key(&(a, b)) || self.blocks.contains_key(&(b, a))
    }

    fn is_hidden_from(&self, requester: Uuid, user: &User) -> bool {
        user.id == requester || user.is_blocked || self.is_blocked(requester, user.id)
    }
}

/// In-process store.
///
/// Every operation runs under one mutex, which gives the compound
/// operations the same atomicity the Postgres backend gets from
/// transactions and advisory locks.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> Ready<T> {
        let mut state = self.lock();
        ready(f(&mut state))
    }
}

fn sort_by_recency(users: &mut [User]) {
    users.sort_by(|a, b| {
        b.last_active
            .cmp(&a.last_active)
            .then_with(|| a.id.cmp(&b.id))
    });
}

impl Store for MemoryStore {
    fn insert_user(
        &self,
        user: User,
    ) -> impl Future<Output = Result<User, StoreError>> + Send + '_ {
        self.with(|s| {
            if s.users.contains_key(&user.id) {
                return Err(StoreError::Conflict(format!("user {} already exists", user.id)));
            }
            s.users.insert(user.id, user.clone());
            Ok(user)
        })
    }

    fn get_user(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<User>, StoreError>> + Send + '_ {
        self.with(|s| Ok(s.users.get(&id).cloned()))
    }

    fn update_location(
        &self,
        id: Uuid,
        location: Coordinates,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_ {
        self.with(|s| {
            Ok(s.users
                .get_mut(&id)
                .map(|u| u.location = Some(location))
                .is_some())
        })
    }

    fn touch_activity(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_ {
        self.with(|s| Ok(s.users.get_mut(&id).map(|u| u.last_active = at).is_some()))
    }

    fn update_preferences(
        &self,
        id: Uuid,
        preferences: Preferences,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_ {
        self.with(|s| {
            Ok(s.users
                .get_mut(&id)
                .map(|u| u.preferences = preferences)
                .is_some())
        })
    }

    fn set_moderation_flag(
        &self,
        id: Uuid,
        flagged: bool,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_ {
        self.with(|s| Ok(s.users.get_mut(&id).map(|u| u.is_blocked = flagged).is_some()))
    }

    fn candidates<'a>(
        &'a self,
        query: &'a CandidateQuery,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<User>, StoreError>> + Send + 'a {
        self.with(|s| {
            let requester = query.requester_id;
            let mut users: Vec<User> = s
                .users
                .values()
                .filter(|u| !s.is_hidden_from(requester, u))
                .filter(|u| !s.decisions.contains_key(&(requester, u.id)))
                .filter(|u| query.gender.map_or(true, |g| u.gender == g))
                .filter(|u| {
                    u.date_of_birth > query.born_after
                        && u.date_of_birth <= query.born_on_or_before
                })
                .filter(|u| match (&query.bounding_box, u.location) {
                    (None, _) => true,
                    (Some(bbox), Some(loc)) => {
                        is_within_bounding_box(loc.latitude, loc.longitude, bbox)
                    }
                    (Some(_), None) => false,
                })
                .cloned()
                .collect();

            sort_by_recency(&mut users);
            Ok(users.into_iter().skip(offset).take(limit).collect())
        })
    }

    fn within_box(
        &self,
        user_id: Uuid,
        bbox: BoundingBox,
    ) -> impl Future<Output = Result<Vec<User>, StoreError>> + Send + '_ {
        self.with(|s| {
            Ok(s.users
                .values()
                .filter(|u| !s.is_hidden_from(user_id, u))
                .filter(|u| {
                    u.location.map_or(false, |loc| {
                        is_within_bounding_box(loc.latitude, loc.longitude, &bbox)
                    })
                })
                .cloned()
                .collect())
        })
    }

    fn get_decision(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
    ) -> impl Future<Output = Result<Option<Decision>, StoreError>> + Send + '_ {
        self.with(|s| Ok(s.decisions.get(&(actor_id, target_id)).cloned()))
    }

    fn record_decision(
        &self,
        decision: Decision,
    ) -> impl Future<Output = Result<DecisionOutcome, StoreError>> + Send + '_ {
        self.with(|s| {
            let (actor, target) = (decision.actor_id, decision.target_id);

            if s.is_blocked(actor, target) {
                return Ok(DecisionOutcome::Blocked);
            }
            if s.decisions.contains_key(&(actor, target)) {
                return Ok(DecisionOutcome::Duplicate);
            }
            s.decisions.insert((actor, target), decision.clone());

            if !decision.is_positive {
                return Ok(DecisionOutcome::Recorded { decision, matched: None });
            }

            let reverse_positive = s
                .decisions
                .get(&(target, actor))
                .map_or(false, |d| d.is_positive);
            if !reverse_positive {
                return Ok(DecisionOutcome::Recorded { decision, matched: None });
            }

            let pair = PairKey::new(actor, target);
            let matched = match s.match_by_pair.get(&pair).and_then(|id| s.matches.get(id)) {
                Some(existing) => MatchInsert::Existing(existing.clone()),
                None => {
                    let created = Match::new(pair, decision.created_at);
                    s.match_by_pair.insert(pair, created.id);
                    s.matches.insert(created.id, created.clone());
                    MatchInsert::Created(created)
                }
            };

            Ok(DecisionOutcome::Recorded { decision, matched: Some(matched) })
        })
    }

    fn insert_block(
        &self,
        block: Block,
    ) -> impl Future<Output = Result<BlockOutcome, StoreError>> + Send + '_ {
        self.with(|s| {
            let key = (block.blocker_id, block.blocked_id);
            if let Some(existing) = s.blocks.get(&key) {
                return Ok(BlockOutcome::AlreadyExists(existing.clone()));
            }
            s.blocks.insert(key, block.clone());
            Ok(BlockOutcome::Created(block))
        })
    }

    fn delete_block(
        &self,
        blocker_id: Uuid,
        blocked_id: Uuid,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_ {
        self.with(|s| Ok(s.blocks.remove(&(blocker_id, blocked_id)).is_some()))
    }

    fn is_blocked(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_ {
        self.with(|s| Ok(s.is_blocked(a, b)))
    }

    fn blocks_by(
        &self,
        blocker_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Block>, StoreError>> + Send + '_ {
        self.with(|s| {
            let mut blocks: Vec<Block> = s
                .blocks
                .values()
                .filter(|b| b.blocker_id == blocker_id)
                .cloned()
                .collect();
            blocks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(blocks)
        })
    }

    fn purge_pair(
        &self,
        pair: PairKey,
    ) -> impl Future<Output = Result<PurgeReport, StoreError>> + Send + '_ {
        self.with(|s| {
            let mut report = PurgeReport::default();

            if let Some(match_id) = s.match_by_pair.remove(&pair) {
                s.matches.remove(&match_id);
                report.matches_removed = 1;

                let before = s.messages.len();
                s.messages.retain(|m| m.match_id != match_id);
                report.messages_removed = (before - s.messages.len()) as u64;
            }

            for key in [(pair.low, pair.high), (pair.high, pair.low)] {
                if s.decisions.remove(&key).is_some() {
                    report.decisions_removed += 1;
                }
            }

            Ok(report)
        })
    }

    fn get_match(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Match>, StoreError>> + Send + '_ {
        self.with(|s| Ok(s.matches.get(&id).cloned()))
    }

    fn match_for_pair(
        &self,
        pair: PairKey,
    ) -> impl Future<Output = Result<Option<Match>, StoreError>> + Send + '_ {
        self.with(|s| {
            Ok(s.match_by_pair
                .get(&pair)
                .and_then(|id| s.matches.get(id))
                .cloned())
        })
    }

    fn matches_for(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Vec<MatchWithLatest>, StoreError>> + Send + '_ {
        self.with(|s| {
            let mut found: Vec<MatchWithLatest> = s
                .matches
                .values()
                .filter(|m| m.is_party(user_id))
                .map(|m| {
                    let thread: Vec<&Message> =
                        s.messages.iter().filter(|msg| msg.match_id == m.id).collect();
                    MatchWithLatest {
                        record: m.clone(),
                        last_message: thread.last().map(|msg| (*msg).clone()),
                        message_count: thread.len() as u64,
                    }
                })
                .collect();
            found.sort_by(|a, b| b.record.created_at.cmp(&a.record.created_at));
            Ok(found)
        })
    }

    fn append_message(
        &self,
        message: Message,
    ) -> impl Future<Output = Result<Message, StoreError>> + Send + '_ {
        self.with(|s| {
            let Some(record) = s.matches.get_mut(&message.match_id) else {
                return Err(StoreError::NotFound(format!("match {}", message.match_id)));
            };
            record.last_message_at = Some(message.created_at);
            s.messages.push(message.clone());
            Ok(message)
        })
    }

    fn messages(
        &self,
        match_id: Uuid,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Message>, StoreError>> + Send + '_ {
        self.with(|s| {
            Ok(s.messages
                .iter()
                .rev()
                .filter(|m| m.match_id == match_id)
                .skip(offset)
                .take(limit)
                .cloned()
                .collect())
        })
    }

    fn mark_read_for(
        &self,
        match_id: Uuid,
        reader_id: Uuid,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send + '_ {
        self.with(|s| {
            let mut marked = 0;
            for m in s
                .messages
                .iter_mut()
                .filter(|m| m.match_id == match_id && m.sender_id != reader_id && !m.is_read)
            {
                m.is_read = true;
                marked += 1;
            }
            Ok(marked)
        })
    }

    fn get_message(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Message>, StoreError>> + Send + '_ {
        self.with(|s| Ok(s.messages.iter().find(|m| m.id == id).cloned()))
    }

    fn mark_message_read(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_ {
        self.with(|s| {
            Ok(s.messages
                .iter_mut()
                .find(|m| m.id == id)
                .map(|m| m.is_read = true)
                .is_some())
        })
    }

    fn delete_message(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_ {
        self.with(|s| {
            let before = s.messages.len();
            s.messages.retain(|m| m.id != id);
            Ok(s.messages.len() < before)
        })
    }

    fn unread_count(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send + '_ {
        self.with(|s| {
            Ok(s.messages
                .iter()
                .filter(|m| !m.is_read && m.sender_id != user_id)
                .filter(|m| s.matches.get(&m.match_id).map_or(false, |x| x.is_party(user_id)))
                .count() as u64)
        })
    }

    fn insert_report(
        &self,
        report: Report,
    ) -> impl Future<Output = Result<Option<Report>, StoreError>> + Send + '_ {
        self.with(|s| {
            let duplicate = s
                .reports
                .iter()
                .any(|r| r.reporter_id == report.reporter_id && r.reported_id == report.reported_id);
            if duplicate {
                return Ok(None);
            }
            s.reports.push(report.clone());
            Ok(Some(report))
        })
    }

    fn reports_against_since(
        &self,
        reported_id: Uuid,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send + '_ {
        self.with(|s| {
            Ok(s.reports
                .iter()
                .filter(|r| r.reported_id == reported_id && r.created_at >= since)
                .map(|r| r.reporter_id)
                .collect::<HashSet<_>>()
                .len() as u64)
        })
    }

    fn add_photo(
        &self,
        photo: Photo,
        max: usize,
    ) -> impl Future<Output = Result<Option<Photo>, StoreError>> + Send + '_ {
        self.with(|s| {
            let owned = s.photos.iter().filter(|p| p.user_id == photo.user_id).count();
            if owned >= max {
                return Ok(None);
            }
            let photo = Photo { is_primary: owned == 0, ..photo };
            s.photos.push(photo.clone());
            Ok(Some(photo))
        })
    }

    fn get_photo(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Photo>, StoreError>> + Send + '_ {
        self.with(|s| Ok(s.photos.iter().find(|p| p.id == id).cloned()))
    }

    fn photos_for(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Photo>, StoreError>> + Send + '_ {
        self.with(|s| {
            let mut photos: Vec<Photo> = s.photos.iter().filter(|p| p.user_id == user_id).cloned().collect();
            photos.sort_by(|a, b| {
                b.is_primary
                    .cmp(&a.is_primary)
                    .then_with(|| a.created_at.cmp(&b.created_at))
            });
            Ok(photos)
        })
    }

    fn set_primary_photo(
        &self,
        user_id: Uuid,
        photo_id: Uuid,
    ) -> impl Future<Output = Result<Option<Photo>, StoreError>> + Send + '_ {
        self.with(|s| {
            if !s.photos.iter().any(|p| p.id == photo_id && p.user_id == user_id) {
                return Ok(None);
            }
            let mut primary = None;
            for photo in s.photos.iter_mut().filter(|p| p.user_id == user_id) {
                photo.is_primary = photo.id == photo_id;
                if photo.is_primary {
                    primary = Some(photo.clone());
                }
            }
            Ok(primary)
        })
    }

    fn delete_photo(
        &self,
        user_id: Uuid,
        photo_id: Uuid,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_ {
        self.with(|s| {
            let Some(index) = s.photos.iter().position(|p| p.id == photo_id && p.user_id == user_id) else {
                return Ok(false);
            };
            let removed = s.photos.remove(index);
            if removed.is_primary {
                if let Some(next) = s
                    .photos
                    .iter_mut()
                    .filter(|p| p.user_id == user_id)
                    .min_by_key(|p| p.created_at)
                {
                    next.is_primary = true;
                }
            }
            Ok(true)
        })
    }

    fn health_check(&self) -> impl Future<Output = Result<bool, StoreError>> + Send + '_ {
        ready(Ok(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gender, Preferences};
    use chrono::NaiveDate;

    fn user(name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            gender: Gender::Female,
            date_of_birth: NaiveDate::from_ymd_opt(1995, 6, 1).unwrap(),
            location: None,
            preferences: Preferences::default(),
            last_active: Utc::now(),
            is_blocked: false,
            created_at: Utc::now(),
        }
    }

    fn decision(actor: Uuid, target: Uuid, positive: bool) -> Decision {
        Decision {
            actor_id: actor,
            target_id: target,
            is_positive: positive,
            is_super: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_user_rejected() {
        let store = MemoryStore::new();
        let u = user("a");
        store.insert_user(u.clone()).await.unwrap();
        assert!(matches!(
            store.insert_user(u).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_mutual_decisions_create_single_match() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let first = store.record_decision(decision(a, b, true)).await.unwrap();
        assert!(matches!(first, DecisionOutcome::Recorded { matched: None, .. }));

        let second = store.record_decision(decision(b, a, true)).await.unwrap();
        let m = match second {
            DecisionOutcome::Recorded { matched: Some(MatchInsert::Created(m)), .. } => m,
            other => panic!("expected a new match, got {:?}", other),
        };
        assert_eq!(m.pair(), PairKey::new(a, b));
        assert_eq!(
            store.match_for_pair(PairKey::new(b, a)).await.unwrap(),
            Some(m)
        );
    }

    #[tokio::test]
    async fn test_purge_pair_removes_everything() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.record_decision(decision(a, b, true)).await.unwrap();
        let DecisionOutcome::Recorded { matched: Some(inserted), .. } =
            store.record_decision(decision(b, a, true)).await.unwrap()
        else {
            panic!("expected match");
        };
        let m = inserted.into_match();

        store
            .append_message(Message {
                id: Uuid::new_v4(),
                match_id: m.id,
                sender_id: a,
                content: "hi".into(),
                is_read: false,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let report = store.purge_pair(PairKey::new(a, b)).await.unwrap();
        assert_eq!(
            report,
            PurgeReport { matches_removed: 1, messages_removed: 1, decisions_removed: 2 }
        );
        assert!(store.get_match(m.id).await.unwrap().is_none());
        assert!(store.get_decision(a, b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_message_to_missing_match() {
        let store = MemoryStore::new();
        let result = store
            .append_message(Message {
                id: Uuid::new_v4(),
                match_id: Uuid::new_v4(),
                sender_id: Uuid::new_v4(),
                content: "hello?".into(),
                is_read: false,
                created_at: Utc::now(),
            })
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    fn photo(user_id: Uuid, minutes: i64) -> Photo {
        Photo {
            id: Uuid::new_v4(),
            user_id,
            url: format!("https://cdn.example.com/{}.jpg", minutes),
            is_primary: true,
            created_at: Utc::now() + chrono::Duration::minutes(minutes),
        }
    }

    #[tokio::test]
    async fn test_photo_cap_and_primary_promotion() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();

        let mut ids = Vec::new();
        for minutes in 0..3 {
            let saved = store.add_photo(photo(owner, minutes), 3).await.unwrap().unwrap();
            assert_eq!(saved.is_primary, minutes == 0);
            ids.push(saved.id);
        }
        assert!(store.add_photo(photo(owner, 9), 3).await.unwrap().is_none());
        // Another user's cap is separate
        assert!(store.add_photo(photo(Uuid::new_v4(), 0), 3).await.unwrap().is_some());

        let primary = store.set_primary_photo(owner, ids[2]).await.unwrap().unwrap();
        assert_eq!(primary.id, ids[2]);
        let listed = store.photos_for(owner).await.unwrap();
        assert_eq!(listed.iter().map(|p| p.id).collect::<Vec<_>>(), vec![ids[2], ids[0], ids[1]]);
        assert_eq!(listed.iter().filter(|p| p.is_primary).count(), 1);

        // Oldest remaining photo takes over
        assert!(store.delete_photo(owner, ids[2]).await.unwrap());
        let listed = store.photos_for(owner).await.unwrap();
        assert_eq!(listed[0].id, ids[0]);
        assert!(listed[0].is_primary && !listed[1].is_primary);

        assert!(!store.delete_photo(Uuid::new_v4(), ids[0]).await.unwrap());
        assert!(store.set_primary_photo(Uuid::new_v4(), ids[1]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_one_report_per_reporter() {
        let store = MemoryStore::new();
        let (reporter, reported) = (Uuid::new_v4(), Uuid::new_v4());
        let report = |id| Report {
            id,
            reporter_id: reporter,
            reported_id: reported,
            reason: crate::models::ReportReason::Spam,
            description: None,
            created_at: Utc::now(),
        };

        assert!(store.insert_report(report(Uuid::new_v4())).await.unwrap().is_some());
        assert!(store.insert_report(report(Uuid::new_v4())).await.unwrap().is_none());
        let since = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(store.reports_against_since(reported, since).await.unwrap(), 1);
    }
}
