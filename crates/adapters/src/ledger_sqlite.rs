//! SQLite ledger implementation

use async_trait::async_trait;
use skyrelay_domain::{
    ChannelSubscription, ClaimOutcome, LedgerError, LedgerStore, PostKind, ProcessedPost,
    RemovalOutcome, SubscriptionFilter, TrackedAccount, UpsertOutcome,
};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::path::Path;
use std::str::FromStr;
use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};

/// SQLite-backed ledger
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Open (or create) the ledger database and apply migrations
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let db_path = db_path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LedgerError::Database(format!("Failed to create directory: {}", e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_error)?;

        let ledger = Self { pool };
        ledger.run_migrations().await?;

        Ok(ledger)
    }

    /// Create an in-memory SQLite ledger (for testing)
    pub async fn in_memory() -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(db_error)?
            .foreign_keys(true);

        // A second connection would open a second, empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(db_error)?;

        let ledger = Self { pool };
        ledger.run_migrations().await?;

        Ok(ledger)
    }

    async fn run_migrations(&self) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tracked_accounts (
                did TEXT PRIMARY KEY,
                last_checked_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS channel_subscriptions (
                did TEXT NOT NULL REFERENCES tracked_accounts(did),
                channel_id TEXT NOT NULL,
                track_top_level INTEGER NOT NULL DEFAULT 1,
                track_replies INTEGER NOT NULL DEFAULT 0,
                track_reposts INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (did, channel_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_subscriptions_channel
            ON channel_subscriptions(channel_id)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        // No foreign key: dedup rows outlive an unsubscribe that races a tick
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS processed_posts (
                post_uri TEXT PRIMARY KEY,
                did TEXT NOT NULL,
                post_type TEXT NOT NULL,
                processed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_processed_did
            ON processed_posts(did)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    /// Number of processed-post rows (used by `doctor`)
    pub async fn processed_count(&self) -> Result<u64, LedgerError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM processed_posts")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count.0 as u64)
    }
}

fn db_error(e: sqlx::Error) -> LedgerError {
    LedgerError::Database(e.to_string())
}

/// Stored timestamps are always UTC
fn format_time(at: OffsetDateTime) -> Result<String, LedgerError> {
    at.to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn parse_time(value: &str) -> Result<OffsetDateTime, LedgerError> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn flag_column(kind: PostKind) -> &'static str {
    match kind {
        PostKind::TopLevel => "track_top_level",
        PostKind::Reply => "track_replies",
        PostKind::Repost => "track_reposts",
    }
}

type SubscriptionRow = (String, String, bool, bool, bool);

fn subscription_from_row(
    (did, channel_id, top_level, replies, reposts): SubscriptionRow,
) -> ChannelSubscription {
    ChannelSubscription {
        did,
        channel_id,
        filter: SubscriptionFilter {
            top_level,
            replies,
            reposts,
        },
    }
}

#[async_trait]
impl LedgerStore for SqliteLedger {
    async fn tracked_accounts(&self) -> Result<Vec<TrackedAccount>, LedgerError> {
        let rows: Vec<(String, Option<String>)> =
            sqlx::query_as("SELECT did, last_checked_at FROM tracked_accounts ORDER BY did")
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;

        rows.into_iter()
            .map(|(did, last_checked_at)| {
                Ok(TrackedAccount {
                    did,
                    last_checked_at: last_checked_at.as_deref().map(parse_time).transpose()?,
                })
            })
            .collect()
    }

    async fn tracked_account(&self, did: &str) -> Result<Option<TrackedAccount>, LedgerError> {
        let row: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT did, last_checked_at FROM tracked_accounts WHERE did = ?")
                .bind(did)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        match row {
            Some((did, last_checked_at)) => Ok(Some(TrackedAccount {
                did,
                last_checked_at: last_checked_at.as_deref().map(parse_time).transpose()?,
            })),
            None => Ok(None),
        }
    }

    async fn advance_watermark(&self, did: &str, at: OffsetDateTime) -> Result<bool, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // Take the write lock before reading, so no other writer can commit
        // between the read and the update
        let locked = sqlx::query(
            "UPDATE tracked_accounts SET last_checked_at = last_checked_at WHERE did = ?",
        )
        .bind(did)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if locked.rows_affected() == 0 {
            return Ok(false);
        }

        let (current,): (Option<String>,) =
            sqlx::query_as("SELECT last_checked_at FROM tracked_accounts WHERE did = ?")
                .bind(did)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_error)?;

        // Compared as timestamps; RFC 3339 text with offsets does not sort
        if let Some(current) = current.as_deref().map(parse_time).transpose()? {
            if current >= at {
                return Ok(true);
            }
        }

        sqlx::query("UPDATE tracked_accounts SET last_checked_at = ? WHERE did = ?")
            .bind(format_time(at)?)
            .bind(did)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(true)
    }

    async fn try_claim(&self, post: &ProcessedPost) -> Result<ClaimOutcome, LedgerError> {
        let processed_at = format_time(post.processed_at)?;
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO processed_posts (post_uri, did, post_type, processed_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&post.post_uri)
        .bind(&post.did)
        .bind(post.kind.as_str())
        .bind(&processed_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {
                tx.commit().await.map_err(db_error)?;
                Ok(ClaimOutcome::Novel)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(ClaimOutcome::Duplicate),
            Err(e) => Err(db_error(e)),
        }
    }

    async fn is_processed(&self, post_uri: &str) -> Result<bool, LedgerError> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM processed_posts WHERE post_uri = ?")
                .bind(post_uri)
                .fetch_one(&self.pool)
                .await
                .map_err(db_error)?;

        Ok(count.0 > 0)
    }

    async fn subscribers(&self, did: &str, kind: PostKind) -> Result<Vec<String>, LedgerError> {
        let sql = format!(
            "SELECT channel_id FROM channel_subscriptions WHERE did = ? AND {} = 1 ORDER BY channel_id",
            flag_column(kind)
        );
        let rows: Vec<(String,)> = sqlx::query_as(&sql)
            .bind(did)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(rows.into_iter().map(|(channel_id,)| channel_id).collect())
    }

    async fn upsert_subscription(
        &self,
        subscription: &ChannelSubscription,
    ) -> Result<UpsertOutcome, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query(
            "INSERT INTO tracked_accounts (did, last_checked_at) VALUES (?, NULL) ON CONFLICT(did) DO NOTHING",
        )
        .bind(&subscription.did)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM channel_subscriptions WHERE did = ? AND channel_id = ?",
        )
        .bind(&subscription.did)
        .bind(&subscription.channel_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?;

        sqlx::query(
            r#"
            INSERT INTO channel_subscriptions
            (did, channel_id, track_top_level, track_replies, track_reposts)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(did, channel_id) DO UPDATE SET
                track_top_level = excluded.track_top_level,
                track_replies = excluded.track_replies,
                track_reposts = excluded.track_reposts
            "#,
        )
        .bind(&subscription.did)
        .bind(&subscription.channel_id)
        .bind(subscription.filter.top_level)
        .bind(subscription.filter.replies)
        .bind(subscription.filter.reposts)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;

        Ok(if existing.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        })
    }

    async fn remove_subscription(
        &self,
        did: &str,
        channel_id: &str,
    ) -> Result<RemovalOutcome, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let deleted = sqlx::query("DELETE FROM channel_subscriptions WHERE did = ? AND channel_id = ?")
            .bind(did)
            .bind(channel_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?
            .rows_affected();

        let remaining: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM channel_subscriptions WHERE did = ?")
                .bind(did)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_error)?;
        let remaining = remaining.0 as u64;

        if deleted == 0 {
            return Ok(RemovalOutcome {
                removed: false,
                remaining,
                account_untracked: false,
            });
        }

        let account_untracked = remaining == 0;
        if account_untracked {
            sqlx::query("DELETE FROM tracked_accounts WHERE did = ?")
                .bind(did)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }

        tx.commit().await.map_err(db_error)?;

        Ok(RemovalOutcome {
            removed: true,
            remaining,
            account_untracked,
        })
    }

    async fn channel_subscriptions(
        &self,
        channel_id: &str,
    ) -> Result<Vec<ChannelSubscription>, LedgerError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT did, channel_id, track_top_level, track_replies, track_reposts
            FROM channel_subscriptions
            WHERE channel_id = ?
            ORDER BY did
            "#,
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(subscription_from_row).collect())
    }

    async fn prune_processed(&self, did: &str, keep: usize) -> Result<u64, LedgerError> {
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // rowid follows claim order, newest claims have the largest rowids
        let pruned = sqlx::query(
            r#"
            DELETE FROM processed_posts
            WHERE did = ?
              AND rowid NOT IN (
                SELECT rowid FROM processed_posts
                WHERE did = ?
                ORDER BY rowid DESC
                LIMIT ?
              )
            "#,
        )
        .bind(did)
        .bind(did)
        .bind(keep)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?
        .rows_affected();

        tx.commit().await.map_err(db_error)?;

        if pruned > 0 {
            tracing::debug!(account = %did, pruned, "Pruned processed posts");
        }

        Ok(pruned)
    }
}
