use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Youngest age a preference range may start at
pub const MIN_AGE: u8 = 18;
/// Oldest age a preference range may end at
pub const MAX_AGE: u8 = 99;

/// Self-reported gender, stored as the `gender` Postgres enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "gender", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    NonBinary,
    Other,
}

impl std::str::FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "non_binary" | "nonbinary" => Ok(Gender::NonBinary),
            "other" => Ok(Gender::Other),
            _ => Err(format!("unknown gender: {}", s)),
        }
    }
}

/// A point on the globe in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Discovery preferences owned by the profile collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub min_age: Option<u8>,
    #[serde(default)]
    pub max_age: Option<u8>,
    #[serde(default)]
    pub interested_in: Option<Gender>,
    #[serde(default)]
    pub max_distance_km: Option<u16>,
}

impl Preferences {
    /// Inclusive age bounds, falling back to 18-99 when unset
    pub fn age_bounds(&self) -> (u8, u8) {
        (
            self.min_age.unwrap_or(MIN_AGE),
            self.max_age.unwrap_or(MAX_AGE),
        )
    }
}

/// A user as seen by the decision engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub gender: Gender,
    pub date_of_birth: NaiveDate,
    #[serde(default)]
    pub location: Option<Coordinates>,
    #[serde(default)]
    pub preferences: Preferences,
    pub last_active: DateTime<Utc>,
    /// Moderation flag; flagged users never surface in discovery
    #[serde(default)]
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
}

/// A directional like, super-like or pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub actor_id: Uuid,
    pub target_id: Uuid,
    pub is_positive: bool,
    pub is_super: bool,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    pub fn kind(&self) -> DecisionKind {
        match (self.is_positive, self.is_super) {
            (true, true) => DecisionKind::SuperLike,
            (true, false) => DecisionKind::Like,
            (false, _) => DecisionKind::Pass,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Like,
    SuperLike,
    Pass,
}

/// Unordered pair of users with a stable ordering (`low < high`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub low: Uuid,
    pub high: Uuid,
}

impl PairKey {
    pub fn new(a: Uuid, b: Uuid) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.low == id || self.high == id
    }

    /// Key used for the per-pair advisory lock
    pub fn lock_key(&self) -> String {
        format!("pair:{}:{}", self.low, self.high)
    }
}

/// A mutual like between two users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: Uuid,
    pub user1_id: Uuid,
    pub user2_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Match {
    /// Build a new match; parties are stored in pair order
    pub fn new(pair: PairKey, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user1_id: pair.low,
            user2_id: pair.high,
            created_at,
            last_message_at: None,
        }
    }

    pub fn pair(&self) -> PairKey {
        PairKey::new(self.user1_id, self.user2_id)
    }

    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }

    /// The other party, or `None` if `user_id` is not in this match
    pub fn counterpart(&self, user_id: Uuid) -> Option<Uuid> {
        if self.user1_id == user_id {
            Some(self.user2_id)
        } else if self.user2_id == user_id {
            Some(self.user1_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub blocker_id: Uuid,
    pub blocked_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub match_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "report_reason", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    Spam,
    Harassment,
    InappropriateContent,
    FakeProfile,
    Underage,
    Other,
}

/// A user report; review happens outside this service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: Uuid,
    pub reporter_id: Uuid,
    pub reported_id: Uuid,
    pub reason: ReportReason,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Profile photo metadata. The image itself lives wherever `url` points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub url: String,
    /// Exactly one photo of a user with any photos is primary
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// Storage-side prefilter for the discovery queue.
///
/// Backends must exclude the requester, every target the requester has a
/// decision on, every user in a block with the requester (either direction)
/// and moderated users, and must order by `last_active` desc then `id`.
/// The remaining fields narrow the scan; the engine re-checks them exactly.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub requester_id: Uuid,
    pub gender: Option<Gender>,
    /// Candidates must be born strictly after this date
    pub born_after: NaiveDate,
    /// Candidates must be born on or before this date
    pub born_on_or_before: NaiveDate,
    pub bounding_box: Option<BoundingBox>,
}

/// Subscription state supplied by the billing collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entitlement {
    pub premium: bool,
    pub super_likes_remaining: u32,
}

impl Entitlement {
    pub fn can_super_like(&self) -> bool {
        self.premium || self.super_likes_remaining > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(PairKey::new(a, b), PairKey::new(b, a));
        assert!(PairKey::new(a, b).low <= PairKey::new(a, b).high);
        assert_eq!(PairKey::new(a, b).lock_key(), PairKey::new(b, a).lock_key());
    }

    #[test]
    fn test_match_counterpart() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let m = Match::new(PairKey::new(a, b), Utc::now());

        assert_eq!(m.counterpart(a), Some(b));
        assert_eq!(m.counterpart(b), Some(a));
        assert_eq!(m.counterpart(Uuid::new_v4()), None);
    }

    #[test]
    fn test_default_age_bounds() {
        let prefs = Preferences::default();
        assert_eq!(prefs.age_bounds(), (18, 99));

        let prefs = Preferences { min_age: Some(25), ..Default::default() };
        assert_eq!(prefs.age_bounds(), (25, 99));
    }

    #[test]
    fn test_entitlement_super_like() {
        assert!(!Entitlement::default().can_super_like());
        assert!(Entitlement { premium: true, super_likes_remaining: 0 }.can_super_like());
        assert!(Entitlement { premium: false, super_likes_remaining: 2 }.can_super_like());
    }

    #[test]
    fn test_gender_parse() {
        assert_eq!("Female".parse::<Gender>(), Ok(Gender::Female));
        assert_eq!("non_binary".parse::<Gender>(), Ok(Gender::NonBinary));
        assert!("robot".parse::<Gender>().is_err());
    }
}
