use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::config::DatabaseSettings;
use crate::models::{
    Block, BoundingBox, CandidateQuery, Coordinates, Decision, Gender, Match, Message, PairKey,
    Photo, Preferences, Report, User,
};
use crate::services::store::{
    BlockOutcome, DecisionOutcome, MatchInsert, MatchWithLatest, PurgeReport, Store, StoreError,
};

const USER_COLUMNS: &str = "u.id, u.name, u.gender, u.date_of_birth, u.latitude, u.longitude, \
     u.min_age, u.max_age, u.interested_in, u.max_distance_km, u.last_active, u.is_blocked, u.created_at";

const MATCH_COLUMNS: &str = "id, user1_id, user2_id, created_at, last_message_at";

const MESSAGE_COLUMNS: &str = "id, match_id, sender_id, content, is_read, created_at";

const DECISION_COLUMNS: &str = "actor_id, target_id, is_positive, is_super, created_at";

const PHOTO_COLUMNS: &str = "id, user_id, url, is_primary, created_at";

/// Either direction of a block between $1 and the row's user
const NOT_BLOCKED_WITH: &str = "NOT EXISTS (
        SELECT 1 FROM blocks b
        WHERE (b.blocker_id = $1 AND b.blocked_id = u.id)
           OR (b.blocker_id = u.id AND b.blocked_id = $1)
    )";

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    gender: Gender,
    date_of_birth: NaiveDate,
    latitude: Option<f64>,
    longitude: Option<f64>,
    min_age: Option<i16>,
    max_age: Option<i16>,
    interested_in: Option<Gender>,
    max_distance_km: Option<i32>,
    last_active: DateTime<Utc>,
    is_blocked: bool,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let location = row
            .latitude
            .zip(row.longitude)
            .map(|(latitude, longitude)| Coordinates { latitude, longitude });

        User {
            id: row.id,
            name: row.name,
            gender: row.gender,
            date_of_birth: row.date_of_birth,
            location,
            preferences: Preferences {
                min_age: row.min_age.and_then(|v| u8::try_from(v).ok()),
                max_age: row.max_age.and_then(|v| u8::try_from(v).ok()),
                interested_in: row.interested_in,
                max_distance_km: row.max_distance_km.and_then(|v| u16::try_from(v).ok()),
            },
            last_active: row.last_active,
            is_blocked: row.is_blocked,
            created_at: row.created_at,
        }
    }
}

/// Match listing row with the latest message joined laterally
#[derive(Debug, FromRow)]
struct MatchListRow {
    id: Uuid,
    user1_id: Uuid,
    user2_id: Uuid,
    created_at: DateTime<Utc>,
    last_message_at: Option<DateTime<Utc>>,
    message_count: i64,
    msg_id: Option<Uuid>,
    msg_sender_id: Option<Uuid>,
    msg_content: Option<String>,
    msg_is_read: Option<bool>,
    msg_created_at: Option<DateTime<Utc>>,
}

impl From<MatchListRow> for MatchWithLatest {
    fn from(row: MatchListRow) -> Self {
        let last_message = match (row.msg_id, row.msg_sender_id, row.msg_content, row.msg_created_at) {
            (Some(id), Some(sender_id), Some(content), Some(created_at)) => Some(Message {
                id,
                match_id: row.id,
                sender_id,
                content,
                is_read: row.msg_is_read.unwrap_or(false),
                created_at,
            }),
            _ => None,
        };

        MatchWithLatest {
            record: Match {
                id: row.id,
                user1_id: row.user1_id,
                user2_id: row.user2_id,
                created_at: row.created_at,
                last_message_at: row.last_message_at,
            },
            last_message,
            message_count: to_count(row.message_count),
        }
    }
}

fn to_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// PostgreSQL-backed store.
///
/// Writes that touch a pair (decisions, purges) run in a transaction that
/// first takes a transaction-scoped advisory lock on the pair key, so the
/// closing like of a mutual pair always sees the reverse decision.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and run pending migrations
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new store from settings
    pub async fn from_settings(settings: &DatabaseSettings) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            &settings.url,
            settings.max_connections.unwrap_or(10),
            settings.min_connections.unwrap_or(1),
            Duration::from_secs(settings.acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(settings.idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_pair(tx: &mut Transaction<'_, Postgres>, pair: PairKey) -> Result<(), StoreError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(pair.lock_key())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn blocked_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        a: Uuid,
        b: Uuid,
    ) -> Result<bool, StoreError> {
        let blocked: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM blocks
                WHERE (blocker_id = $1 AND blocked_id = $2)
                   OR (blocker_id = $2 AND blocked_id = $1)
            )
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_one(&mut **tx)
        .await?;
        Ok(blocked)
    }

    async fn insert_or_get_match(
        tx: &mut Transaction<'_, Postgres>,
        pair: PairKey,
        created_at: DateTime<Utc>,
    ) -> Result<MatchInsert, StoreError> {
        let candidate = Match::new(pair, created_at);
        let inserted = sqlx::query_as::<_, Match>(&format!(
            r#"
            INSERT INTO matches (id, user1_id, user2_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user1_id, user2_id) DO NOTHING
            RETURNING {}
            "#,
            MATCH_COLUMNS
        ))
        .bind(candidate.id)
        .bind(candidate.user1_id)
        .bind(candidate.user2_id)
        .bind(candidate.created_at)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(created) = inserted {
            return Ok(MatchInsert::Created(created));
        }

        let existing = sqlx::query_as::<_, Match>(&format!(
            "SELECT {} FROM matches WHERE user1_id = $1 AND user2_id = $2",
            MATCH_COLUMNS
        ))
        .bind(pair.low)
        .bind(pair.high)
        .fetch_one(&mut **tx)
        .await?;

        Ok(MatchInsert::Existing(existing))
    }

    async fn record_decision_tx(&self, decision: Decision) -> Result<DecisionOutcome, StoreError> {
        let (actor, target) = (decision.actor_id, decision.target_id);
        let pair = PairKey::new(actor, target);

        let mut tx = self.pool.begin().await?;
        Self::lock_pair(&mut tx, pair).await?;

        if Self::blocked_in_tx(&mut tx, actor, target).await? {
            tx.rollback().await?;
            return Ok(DecisionOutcome::Blocked);
        }

        let inserted = sqlx::query_as::<_, Decision>(&format!(
            r#"
            INSERT INTO decisions (actor_id, target_id, is_positive, is_super, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (actor_id, target_id) DO NOTHING
            RETURNING {}
            "#,
            DECISION_COLUMNS
        ))
        .bind(actor)
        .bind(target)
        .bind(decision.is_positive)
        .bind(decision.is_super)
        .bind(decision.created_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(decision) = inserted else {
            tx.rollback().await?;
            return Ok(DecisionOutcome::Duplicate);
        };

        let mut matched = None;
        if decision.is_positive {
            let reverse: Option<bool> = sqlx::query_scalar(
                "SELECT is_positive FROM decisions WHERE actor_id = $1 AND target_id = $2",
            )
            .bind(target)
            .bind(actor)
            .fetch_optional(&mut *tx)
            .await?;

            if reverse == Some(true) {
                matched = Some(Self::insert_or_get_match(&mut tx, pair, decision.created_at).await?);
            }
        }

        tx.commit().await?;

        tracing::debug!(
            "Recorded decision {} -> {} (positive: {}, matched: {})",
            actor,
            target,
            decision.is_positive,
            matched.is_some()
        );

        Ok(DecisionOutcome::Recorded { decision, matched })
    }

    async fn purge_pair_tx(&self, pair: PairKey) -> Result<PurgeReport, StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_pair(&mut tx, pair).await?;

        let messages_removed: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM messages msg
            JOIN matches m ON m.id = msg.match_id
            WHERE m.user1_id = $1 AND m.user2_id = $2
            "#,
        )
        .bind(pair.low)
        .bind(pair.high)
        .fetch_one(&mut *tx)
        .await?;

        // Messages go with the match via ON DELETE CASCADE
        let matches = sqlx::query("DELETE FROM matches WHERE user1_id = $1 AND user2_id = $2")
            .bind(pair.low)
            .bind(pair.high)
            .execute(&mut *tx)
            .await?;

        let decisions = sqlx::query(
            r#"
            DELETE FROM decisions
            WHERE (actor_id = $1 AND target_id = $2)
               OR (actor_id = $2 AND target_id = $1)
            "#,
        )
        .bind(pair.low)
        .bind(pair.high)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(PurgeReport {
            matches_removed: matches.rows_affected(),
            messages_removed: if matches.rows_affected() > 0 { to_count(messages_removed) } else { 0 },
            decisions_removed: decisions.rows_affected(),
        })
    }

    async fn append_message_tx(&self, message: Message) -> Result<Message, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Row lock on the match orders this against a concurrent purge
        let touched = sqlx::query("UPDATE matches SET last_message_at = $2 WHERE id = $1")
            .bind(message.match_id)
            .bind(message.created_at)
            .execute(&mut *tx)
            .await?;

        if touched.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::NotFound(format!("match {}", message.match_id)));
        }

        let saved = sqlx::query_as::<_, Message>(&format!(
            r#"
            INSERT INTO messages (id, match_id, sender_id, content, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(message.id)
        .bind(message.match_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(message.is_read)
        .bind(message.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(saved)
    }

    /// Row lock on the owner serializes photo writers for one user
    async fn lock_user(tx: &mut Transaction<'_, Postgres>, user_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;
        Ok(())
    }

    async fn add_photo_tx(&self, photo: Photo, max: usize) -> Result<Option<Photo>, StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_user(&mut tx, photo.user_id).await?;

        let owned: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM photos WHERE user_id = $1")
            .bind(photo.user_id)
            .fetch_one(&mut *tx)
            .await?;
        if to_count(owned) >= max as u64 {
            return Ok(None);
        }

        let saved = sqlx::query_as::<_, Photo>(&format!(
            "INSERT INTO photos ({PHOTO_COLUMNS}) VALUES ($1, $2, $3, $4, $5) RETURNING {PHOTO_COLUMNS}"
        ))
        .bind(photo.id)
        .bind(photo.user_id)
        .bind(&photo.url)
        .bind(owned == 0)
        .bind(photo.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(saved))
    }

    async fn set_primary_photo_tx(&self, user_id: Uuid, photo_id: Uuid) -> Result<Option<Photo>, StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_user(&mut tx, user_id).await?;

        let owned: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM photos WHERE id = $1 AND user_id = $2)")
            .bind(photo_id)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        if !owned {
            return Ok(None);
        }

        // Clear first; the partial unique index allows one primary per user
        sqlx::query("UPDATE photos SET is_primary = FALSE WHERE user_id = $1 AND is_primary")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let primary = sqlx::query_as::<_, Photo>(&format!(
            "UPDATE photos SET is_primary = TRUE WHERE id = $1 RETURNING {PHOTO_COLUMNS}"
        ))
        .bind(photo_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(primary))
    }

    async fn delete_photo_tx(&self, user_id: Uuid, photo_id: Uuid) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_user(&mut tx, user_id).await?;

        let removed: Option<bool> =
            sqlx::query_scalar("DELETE FROM photos WHERE id = $1 AND user_id = $2 RETURNING is_primary")
                .bind(photo_id)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(was_primary) = removed else {
            return Ok(false);
        };

        if was_primary {
            sqlx::query(
                r#"
                UPDATE photos SET is_primary = TRUE
                WHERE id = (
                    SELECT id FROM photos WHERE user_id = $1
                    ORDER BY created_at, id
                    LIMIT 1
                )
                "#,
            )
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn insert_block_tx(&self, block: Block) -> Result<BlockOutcome, StoreError> {
        let inserted = sqlx::query_as::<_, Block>(
            r#"
            INSERT INTO blocks (blocker_id, blocked_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (blocker_id, blocked_id) DO NOTHING
            RETURNING blocker_id, blocked_id, created_at
            "#,
        )
        .bind(block.blocker_id)
        .bind(block.blocked_id)
        .bind(block.created_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(created) = inserted {
            return Ok(BlockOutcome::Created(created));
        }

        let existing = sqlx::query_as::<_, Block>(
            "SELECT blocker_id, blocked_id, created_at FROM blocks WHERE blocker_id = $1 AND blocked_id = $2",
        )
        .bind(block.blocker_id)
        .bind(block.blocked_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(BlockOutcome::AlreadyExists(existing))
    }
}

impl Store for PostgresStore {
    fn insert_user(
        &self,
        user: User,
    ) -> impl Future<Output = Result<User, StoreError>> + Send + '_ {
        async move {
            let result = sqlx::query(
                r#"
                INSERT INTO users (
                    id, name, gender, date_of_birth, latitude, longitude,
                    min_age, max_age, interested_in, max_distance_km,
                    last_active, is_blocked, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(user.id)
            .bind(&user.name)
            .bind(user.gender)
            .bind(user.date_of_birth)
            .bind(user.location.map(|l| l.latitude))
            .bind(user.location.map(|l| l.longitude))
            .bind(user.preferences.min_age.map(i16::from))
            .bind(user.preferences.max_age.map(i16::from))
            .bind(user.preferences.interested_in)
            .bind(user.preferences.max_distance_km.map(i32::from))
            .bind(user.last_active)
            .bind(user.is_blocked)
            .bind(user.created_at)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(StoreError::Conflict(format!("user {} already exists", user.id)));
            }
            Ok(user)
        }
    }

    fn get_user(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<User>, StoreError>> + Send + '_ {
        async move {
            let row = sqlx::query_as::<_, UserRow>(&format!(
                "SELECT {} FROM users u WHERE u.id = $1",
                USER_COLUMNS
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(User::from))
        }
    }

    fn update_location(
        &self,
        id: Uuid,
        location: Coordinates,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_ {
        async move {
            let result = sqlx::query("UPDATE users SET latitude = $2, longitude = $3 WHERE id = $1")
                .bind(id)
                .bind(location.latitude)
                .bind(location.longitude)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }
    }

    fn touch_activity(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_ {
        async move {
            let result = sqlx::query("UPDATE users SET last_active = $2 WHERE id = $1")
                .bind(id)
                .bind(at)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }
    }

    fn update_preferences(
        &self,
        id: Uuid,
        preferences: Preferences,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_ {
        async move {
            let result = sqlx::query(
                r#"
                UPDATE users
                SET min_age = $2, max_age = $3, interested_in = $4, max_distance_km = $5
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(preferences.min_age.map(i16::from))
            .bind(preferences.max_age.map(i16::from))
            .bind(preferences.interested_in)
            .bind(preferences.max_distance_km.map(i32::from))
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }
    }

    fn set_moderation_flag(
        &self,
        id: Uuid,
        flagged: bool,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_ {
        async move {
            let result = sqlx::query("UPDATE users SET is_blocked = $2 WHERE id = $1")
                .bind(id)
                .bind(flagged)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }
    }

    fn candidates<'a>(
        &'a self,
        query: &'a CandidateQuery,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<User>, StoreError>> + Send + 'a {
        async move {
            let sql = format!(
                r#"
                SELECT {columns}
                FROM users u
                WHERE u.id <> $1
                  AND NOT u.is_blocked
                  AND NOT EXISTS (
                      SELECT 1 FROM decisions d WHERE d.actor_id = $1 AND d.target_id = u.id
                  )
                  AND {not_blocked}
                  AND ($2::gender IS NULL OR u.gender = $2)
                  AND u.date_of_birth > $3
                  AND u.date_of_birth <= $4
                  AND ($5::float8 IS NULL OR (
                      u.latitude BETWEEN $5 AND $6 AND u.longitude BETWEEN $7 AND $8
                  ))
                ORDER BY u.last_active DESC, u.id
                LIMIT $9 OFFSET $10
                "#,
                columns = USER_COLUMNS,
                not_blocked = NOT_BLOCKED_WITH,
            );

            let bbox = query.bounding_box;
            let rows = sqlx::query_as::<_, UserRow>(&sql)
                .bind(query.requester_id)
                .bind(query.gender)
                .bind(query.born_after)
                .bind(query.born_on_or_before)
                .bind(bbox.map(|b| b.min_lat))
                .bind(bbox.map(|b| b.max_lat))
                .bind(bbox.map(|b| b.min_lon))
                .bind(bbox.map(|b| b.max_lon))
                .bind(to_i64(limit))
                .bind(to_i64(offset))
                .fetch_all(&self.pool)
                .await?;

            Ok(rows.into_iter().map(User::from).collect())
        }
    }

    fn within_box(
        &self,
        user_id: Uuid,
        bbox: BoundingBox,
    ) -> impl Future<Output = Result<Vec<User>, StoreError>> + Send + '_ {
        async move {
            let sql = format!(
                r#"
                SELECT {columns}
                FROM users u
                WHERE u.id <> $1
                  AND NOT u.is_blocked
                  AND {not_blocked}
                  AND u.latitude BETWEEN $2 AND $3
                  AND u.longitude BETWEEN $4 AND $5
                "#,
                columns = USER_COLUMNS,
                not_blocked = NOT_BLOCKED_WITH,
            );

            let rows = sqlx::query_as::<_, UserRow>(&sql)
                .bind(user_id)
                .bind(bbox.min_lat)
                .bind(bbox.max_lat)
                .bind(bbox.min_lon)
                .bind(bbox.max_lon)
                .fetch_all(&self.pool)
                .await?;

            Ok(rows.into_iter().map(User::from).collect())
        }
    }

    fn get_decision(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
    ) -> impl Future<Output = Result<Option<Decision>, StoreError>> + Send + '_ {
        async move {
            let decision = sqlx::query_as::<_, Decision>(&format!(
                "SELECT {} FROM decisions WHERE actor_id = $1 AND target_id = $2",
                DECISION_COLUMNS
            ))
            .bind(actor_id)
            .bind(target_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(decision)
        }
    }

    fn record_decision(
        &self,
        decision: Decision,
    ) -> impl Future<Output = Result<DecisionOutcome, StoreError>> + Send + '_ {
        self.record_decision_tx(decision)
    }

    fn insert_block(
        &self,
        block: Block,
    ) -> impl Future<Output = Result<BlockOutcome, StoreError>> + Send + '_ {
        self.insert_block_tx(block)
    }

    fn delete_block(
        &self,
        blocker_id: Uuid,
        blocked_id: Uuid,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_ {
        async move {
            let result = sqlx::query("DELETE FROM blocks WHERE blocker_id = $1 AND blocked_id = $2")
                .bind(blocker_id)
                .bind(blocked_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }
    }

    fn is_blocked(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_ {
        async move {
            let blocked: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM blocks
                    WHERE (blocker_id = $1 AND blocked_id = $2)
                       OR (blocker_id = $2 AND blocked_id = $1)
                )
                "#,
            )
            .bind(a)
            .bind(b)
            .fetch_one(&self.pool)
            .await?;
            Ok(blocked)
        }
    }

    fn blocks_by(
        &self,
        blocker_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Block>, StoreError>> + Send + '_ {
        async move {
            let blocks = sqlx::query_as::<_, Block>(
                r#"
                SELECT blocker_id, blocked_id, created_at
                FROM blocks
                WHERE blocker_id = $1
                ORDER BY created_at DESC
                "#,
            )
            .bind(blocker_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(blocks)
        }
    }

    fn purge_pair(
        &self,
        pair: PairKey,
    ) -> impl Future<Output = Result<PurgeReport, StoreError>> + Send + '_ {
        self.purge_pair_tx(pair)
    }

    fn get_match(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Match>, StoreError>> + Send + '_ {
        async move {
            let record = sqlx::query_as::<_, Match>(&format!(
                "SELECT {} FROM matches WHERE id = $1",
                MATCH_COLUMNS
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(record)
        }
    }

    fn match_for_pair(
        &self,
        pair: PairKey,
    ) -> impl Future<Output = Result<Option<Match>, StoreError>> + Send + '_ {
        async move {
            let record = sqlx::query_as::<_, Match>(&format!(
                "SELECT {} FROM matches WHERE user1_id = $1 AND user2_id = $2",
                MATCH_COLUMNS
            ))
            .bind(pair.low)
            .bind(pair.high)
            .fetch_optional(&self.pool)
            .await?;
            Ok(record)
        }
    }

    fn matches_for(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Vec<MatchWithLatest>, StoreError>> + Send + '_ {
        async move {
            let rows = sqlx::query_as::<_, MatchListRow>(
                r#"
                SELECT
                    m.id, m.user1_id, m.user2_id, m.created_at, m.last_message_at,
                    (SELECT COUNT(*) FROM messages c WHERE c.match_id = m.id) AS message_count,
                    lm.id AS msg_id,
                    lm.sender_id AS msg_sender_id,
                    lm.content AS msg_content,
                    lm.is_read AS msg_is_read,
                    lm.created_at AS msg_created_at
                FROM matches m
                LEFT JOIN LATERAL (
                    SELECT id, sender_id, content, is_read, created_at
                    FROM messages
                    WHERE match_id = m.id
                    ORDER BY seq DESC
                    LIMIT 1
                ) lm ON TRUE
                WHERE m.user1_id = $1 OR m.user2_id = $1
                ORDER BY m.created_at DESC
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

            Ok(rows.into_iter().map(MatchWithLatest::from).collect())
        }
    }

    fn append_message(
        &self,
        message: Message,
    ) -> impl Future<Output = Result<Message, StoreError>> + Send + '_ {
        self.append_message_tx(message)
    }

    fn messages(
        &self,
        match_id: Uuid,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Message>, StoreError>> + Send + '_ {
        async move {
            let messages = sqlx::query_as::<_, Message>(&format!(
                r#"
                SELECT {}
                FROM messages
                WHERE match_id = $1
                ORDER BY seq DESC
                LIMIT $2 OFFSET $3
                "#,
                MESSAGE_COLUMNS
            ))
            .bind(match_id)
            .bind(to_i64(limit))
            .bind(to_i64(offset))
            .fetch_all(&self.pool)
            .await?;
            Ok(messages)
        }
    }

    fn mark_read_for(
        &self,
        match_id: Uuid,
        reader_id: Uuid,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send + '_ {
        async move {
            let result = sqlx::query(
                r#"
                UPDATE messages SET is_read = TRUE
                WHERE match_id = $1 AND sender_id <> $2 AND NOT is_read
                "#,
            )
            .bind(match_id)
            .bind(reader_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        }
    }

    fn get_message(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Message>, StoreError>> + Send + '_ {
        async move {
            let message = sqlx::query_as::<_, Message>(&format!(
                "SELECT {} FROM messages WHERE id = $1",
                MESSAGE_COLUMNS
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(message)
        }
    }

    fn mark_message_read(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_ {
        async move {
            let result = sqlx::query("UPDATE messages SET is_read = TRUE WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }
    }

    fn delete_message(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_ {
        async move {
            let result = sqlx::query("DELETE FROM messages WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }
    }

    fn unread_count(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send + '_ {
        async move {
            let count: i64 = sqlx::query_scalar(
                r#"
                SELECT COUNT(*)
                FROM messages msg
                JOIN matches m ON m.id = msg.match_id
                WHERE (m.user1_id = $1 OR m.user2_id = $1)
                  AND msg.sender_id <> $1
                  AND NOT msg.is_read
                "#,
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(to_count(count))
        }
    }

    fn insert_report(
        &self,
        report: Report,
    ) -> impl Future<Output = Result<Option<Report>, StoreError>> + Send + '_ {
        async move {
            let saved = sqlx::query_as::<_, Report>(
                r#"
                INSERT INTO reports (id, reporter_id, reported_id, reason, description, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (reporter_id, reported_id) DO NOTHING
                RETURNING id, reporter_id, reported_id, reason, description, created_at
                "#,
            )
            .bind(report.id)
            .bind(report.reporter_id)
            .bind(report.reported_id)
            .bind(report.reason)
            .bind(&report.description)
            .bind(report.created_at)
            .fetch_optional(&self.pool)
            .await?;
            Ok(saved)
        }
    }

    fn reports_against_since(
        &self,
        reported_id: Uuid,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send + '_ {
        async move {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(DISTINCT reporter_id) FROM reports WHERE reported_id = $1 AND created_at >= $2",
            )
            .bind(reported_id)
            .bind(since)
            .fetch_one(&self.pool)
            .await?;
            Ok(to_count(count))
        }
    }

    fn add_photo(
        &self,
        photo: Photo,
        max: usize,
    ) -> impl Future<Output = Result<Option<Photo>, StoreError>> + Send + '_ {
        self.add_photo_tx(photo, max)
    }

    fn get_photo(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Photo>, StoreError>> + Send + '_ {
        async move {
            let photo = sqlx::query_as::<_, Photo>(&format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(photo)
        }
    }

    fn photos_for(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Photo>, StoreError>> + Send + '_ {
        async move {
            let photos = sqlx::query_as::<_, Photo>(&format!(
                "SELECT {PHOTO_COLUMNS} FROM photos WHERE user_id = $1 ORDER BY is_primary DESC, created_at, id"
            ))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(photos)
        }
    }

    fn set_primary_photo(
        &self,
        user_id: Uuid,
        photo_id: Uuid,
    ) -> impl Future<Output = Result<Option<Photo>, StoreError>> + Send + '_ {
        self.set_primary_photo_tx(user_id, photo_id)
    }

    fn delete_photo(
        &self,
        user_id: Uuid,
        photo_id: Uuid,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send + '_ {
        self.delete_photo_tx(user_id, photo_id)
    }

    /// Health check for the database connection
    fn health_check(&self) -> impl Future<Output = Result<bool, StoreError>> + Send + '_ {
        async move {
            sqlx::query("SELECT 1")
                .fetch_one(&self.pool)
                .await
                .map(|_| true)
                .map_err(Into::into)
        }
    }
}
