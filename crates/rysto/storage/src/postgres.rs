//! PostgreSQL adapter for Rysto storage.
//!
//! Filters are rendered as one parameterised statement with nullable
//! arguments, so every filtered write is a single `UPDATE`/`DELETE` and keeps
//! the conditional-write atomicity the acceptance workflow depends on.
//! Session entries carry an `expires_at` column; expired rows are ignored on
//! read and purged lazily on write.

use crate::model::{
    ContinuationFilter, ContinuationPatch, SlotFilter, StoryFilter, StoryPatch, WriteOutcome,
};
use crate::traits::{ContinuationStore, CredentialStore, SessionCache, StoryStore, VoteStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rysto_types::{
    Continuation, ContinuationId, Credential, CredentialId, Identity, Story, StoryId, Vote, VoteId,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

const STORY_COLUMNS: &str =
    "id, author_id, title, content, tags, created_at, accepted_continuation_id";
const CONTINUATION_COLUMNS: &str = "id, story_id, author_id, content, created_at, accepted";

const STORY_WHERE: &str = r#"
     WHERE ($1::uuid IS NULL OR id = $1)
       AND ($2::text IS NULL OR author_id = $2)
       AND ($3::text IS NULL OR title = $3)
       AND ($4::text IS NULL
            OR ($4 = 'open' AND accepted_continuation_id IS NULL)
            OR ($4 = 'holding' AND accepted_continuation_id = $5))
"#;

const CONTINUATION_WHERE: &str = r#"
     WHERE ($1::uuid IS NULL OR id = $1)
       AND ($2::uuid IS NULL OR story_id = $2)
       AND ($3::text IS NULL OR author_id = $3)
       AND (NOT $4 OR accepted = FALSE)
"#;

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresRystoStorage {
    pool: PgPool,
}

impl PostgresRystoStorage {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS rysto_credentials (
                id UUID PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS rysto_stories (
                id UUID PRIMARY KEY,
                author_id TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                tags JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                accepted_continuation_id UUID
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS rysto_continuations (
                id UUID PRIMARY KEY,
                story_id UUID NOT NULL,
                author_id TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                accepted BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS rysto_votes (
                id UUID PRIMARY KEY,
                continuation_id UUID NOT NULL,
                voter_email TEXT NOT NULL,
                voted_at TIMESTAMPTZ NOT NULL,
                UNIQUE (continuation_id, voter_email)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS rysto_sessions (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS rysto_continuations_story_idx ON rysto_continuations (story_id)",
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PostgresRystoStorage {
    async fn find_credential(&self, email: &Identity) -> StorageResult<Option<Credential>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash FROM rysto_credentials WHERE email = $1",
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(credential_row_to_record).transpose()
    }

    async fn count_credentials(&self, email: &Identity) -> StorageResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM rysto_credentials WHERE email = $1")
                .bind(email.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(count.max(0) as u64)
    }

    async fn insert_credential(&self, credential: Credential) -> StorageResult<CredentialId> {
        sqlx::query(
            "INSERT INTO rysto_credentials (id, email, password_hash) VALUES ($1, $2, $3)",
        )
        .bind(credential.id.0)
        .bind(credential.email.as_str())
        .bind(&credential.password_hash)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;
        Ok(credential.id)
    }
}

#[async_trait]
impl StoryStore for PostgresRystoStorage {
    async fn insert_story(&self, story: Story) -> StorageResult<StoryId> {
        let tags = serde_json::to_value(&story.tags)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO rysto_stories
                (id, author_id, title, content, tags, created_at, accepted_continuation_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(story.id.0)
        .bind(story.author_id.as_str())
        .bind(&story.title)
        .bind(&story.content)
        .bind(tags)
        .bind(story.created_at)
        .bind(story.accepted_continuation_id.map(|id| id.0))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        Ok(story.id)
    }

    async fn get_story(&self, id: &StoryId) -> StorageResult<Option<Story>> {
        let row = sqlx::query(&format!(
            "SELECT {STORY_COLUMNS} FROM rysto_stories WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(story_row_to_record).transpose()
    }

    async fn find_stories(&self, filter: &StoryFilter) -> StorageResult<Vec<Story>> {
        let sql = format!(
            "SELECT {STORY_COLUMNS} FROM rysto_stories {STORY_WHERE} ORDER BY created_at ASC, id ASC"
        );
        let (slot_mode, slot_id) = slot_params(filter.slot);
        let rows = sqlx::query(&sql)
            .bind(filter.id.map(|id| id.0))
            .bind(filter.author_id.as_ref().map(Identity::as_str))
            .bind(filter.title.as_deref())
            .bind(slot_mode)
            .bind(slot_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(story_row_to_record).collect()
    }

    async fn update_story(
        &self,
        filter: &StoryFilter,
        patch: StoryPatch,
    ) -> StorageResult<WriteOutcome> {
        if filter.id.is_none() {
            return Err(StorageError::InvalidInput(
                "story update filter must name an id".to_string(),
            ));
        }
        let (slot_mode, slot_id) = slot_params(filter.slot);
        let set_clause = match &patch {
            StoryPatch::Content(_) => "content = $6",
            StoryPatch::Accept(_) => "accepted_continuation_id = $6",
            StoryPatch::ReleaseAcceptance => "accepted_continuation_id = NULL",
        };
        let sql = format!("UPDATE rysto_stories SET {set_clause} {STORY_WHERE}");

        let query = sqlx::query(&sql)
            .bind(filter.id.map(|id| id.0))
            .bind(filter.author_id.as_ref().map(Identity::as_str))
            .bind(filter.title.as_deref())
            .bind(slot_mode)
            .bind(slot_id);
        let query = match patch {
            StoryPatch::Content(content) => query.bind(content),
            StoryPatch::Accept(id) => query.bind(id.0),
            StoryPatch::ReleaseAcceptance => query,
        };
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(outcome(result.rows_affected()))
    }

    async fn delete_story(&self, filter: &StoryFilter) -> StorageResult<u64> {
        if filter.id.is_none() {
            return Err(StorageError::InvalidInput(
                "story delete filter must name an id".to_string(),
            ));
        }
        let (slot_mode, slot_id) = slot_params(filter.slot);
        let result = sqlx::query(&format!("DELETE FROM rysto_stories {STORY_WHERE}"))
            .bind(filter.id.map(|id| id.0))
            .bind(filter.author_id.as_ref().map(Identity::as_str))
            .bind(filter.title.as_deref())
            .bind(slot_mode)
            .bind(slot_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ContinuationStore for PostgresRystoStorage {
    async fn insert_continuation(
        &self,
        continuation: Continuation,
    ) -> StorageResult<ContinuationId> {
        sqlx::query(
            r#"
            INSERT INTO rysto_continuations
                (id, story_id, author_id, content, created_at, accepted)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(continuation.id.0)
        .bind(continuation.story_id.0)
        .bind(continuation.author_id.as_str())
        .bind(&continuation.content)
        .bind(continuation.created_at)
        .bind(continuation.accepted)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        Ok(continuation.id)
    }

    async fn get_continuation(&self, id: &ContinuationId) -> StorageResult<Option<Continuation>> {
        let row = sqlx::query(&format!(
            "SELECT {CONTINUATION_COLUMNS} FROM rysto_continuations WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(continuation_row_to_record).transpose()
    }

    async fn find_continuations(
        &self,
        filter: &ContinuationFilter,
    ) -> StorageResult<Vec<Continuation>> {
        let sql = format!(
            "SELECT {CONTINUATION_COLUMNS} FROM rysto_continuations {CONTINUATION_WHERE} ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(filter.id.map(|id| id.0))
            .bind(filter.story_id.map(|id| id.0))
            .bind(filter.author_id.as_ref().map(Identity::as_str))
            .bind(filter.unaccepted_only)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(continuation_row_to_record).collect()
    }

    async fn update_continuation(
        &self,
        filter: &ContinuationFilter,
        patch: ContinuationPatch,
    ) -> StorageResult<WriteOutcome> {
        if filter.id.is_none() {
            return Err(StorageError::InvalidInput(
                "continuation update filter must name an id".to_string(),
            ));
        }
        let set_clause = match &patch {
            ContinuationPatch::Content(_) => "content = $5",
            ContinuationPatch::MarkAccepted => "accepted = TRUE",
        };
        let sql = format!("UPDATE rysto_continuations SET {set_clause} {CONTINUATION_WHERE}");

        let query = sqlx::query(&sql)
            .bind(filter.id.map(|id| id.0))
            .bind(filter.story_id.map(|id| id.0))
            .bind(filter.author_id.as_ref().map(Identity::as_str))
            .bind(filter.unaccepted_only);
        let query = match patch {
            ContinuationPatch::Content(content) => query.bind(content),
            ContinuationPatch::MarkAccepted => query,
        };
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(outcome(result.rows_affected()))
    }

    async fn delete_continuation(&self, filter: &ContinuationFilter) -> StorageResult<u64> {
        if filter.id.is_none() {
            return Err(StorageError::InvalidInput(
                "continuation delete filter must name an id".to_string(),
            ));
        }
        self.delete_continuations(filter).await
    }

    async fn delete_continuations(&self, filter: &ContinuationFilter) -> StorageResult<u64> {
        let result = sqlx::query(&format!(
            "DELETE FROM rysto_continuations {CONTINUATION_WHERE}"
        ))
        .bind(filter.id.map(|id| id.0))
        .bind(filter.story_id.map(|id| id.0))
        .bind(filter.author_id.as_ref().map(Identity::as_str))
        .bind(filter.unaccepted_only)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl VoteStore for PostgresRystoStorage {
    async fn insert_vote(&self, vote: Vote) -> StorageResult<VoteId> {
        sqlx::query(
            r#"
            INSERT INTO rysto_votes (id, continuation_id, voter_email, voted_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(vote.id.0)
        .bind(vote.continuation_id.0)
        .bind(vote.voter_email.as_str())
        .bind(vote.voted_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        Ok(vote.id)
    }

    async fn find_votes(&self, continuation_id: &ContinuationId) -> StorageResult<Vec<Vote>> {
        let rows = sqlx::query(
            r#"
            SELECT id, continuation_id, voter_email, voted_at
              FROM rysto_votes
             WHERE continuation_id = $1
             ORDER BY voted_at ASC, id ASC
            "#,
        )
        .bind(continuation_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(vote_row_to_record).collect()
    }

    async fn delete_vote(
        &self,
        continuation_id: &ContinuationId,
        voter: &Identity,
    ) -> StorageResult<u64> {
        let result =
            sqlx::query("DELETE FROM rysto_votes WHERE continuation_id = $1 AND voter_email = $2")
                .bind(continuation_id.0)
                .bind(voter.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SessionCache for PostgresRystoStorage {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<()> {
        if ttl <= Duration::zero() {
            return Err(StorageError::InvalidInput(
                "session ttl must be positive".to_string(),
            ));
        }
        let now = Utc::now();

        sqlx::query("DELETE FROM rysto_sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO rysto_sessions (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
               SET value = EXCLUDED.value,
                   expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now + ttl)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT value FROM rysto_sessions WHERE key = $1 AND expires_at > $2",
        )
        .bind(key)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(value)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM rysto_sessions WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

fn credential_row_to_record(row: PgRow) -> StorageResult<Credential> {
    let email: String = row
        .try_get("email")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(Credential {
        id: CredentialId(
            row.try_get::<Uuid, _>("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        email: Identity::new(email),
        password_hash: row
            .try_get("password_hash")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn story_row_to_record(row: PgRow) -> StorageResult<Story> {
    let tags_json: serde_json::Value = row
        .try_get("tags")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let tags: Vec<String> = serde_json::from_value(tags_json)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let author: String = row
        .try_get("author_id")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let accepted: Option<Uuid> = row
        .try_get("accepted_continuation_id")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let created_at: DateTime<Utc> = row
        .try_get("created_at")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(Story {
        id: StoryId(
            row.try_get::<Uuid, _>("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        author_id: Identity::new(author),
        title: row
            .try_get("title")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        content: row
            .try_get("content")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        tags,
        created_at,
        accepted_continuation_id: accepted.map(ContinuationId),
    })
}

fn continuation_row_to_record(row: PgRow) -> StorageResult<Continuation> {
    let author: String = row
        .try_get("author_id")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(Continuation {
        id: ContinuationId(
            row.try_get::<Uuid, _>("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        story_id: StoryId(
            row.try_get::<Uuid, _>("story_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        author_id: Identity::new(author),
        content: row
            .try_get("content")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        accepted: row
            .try_get("accepted")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn vote_row_to_record(row: PgRow) -> StorageResult<Vote> {
    let voter: String = row
        .try_get("voter_email")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(Vote {
        id: VoteId(
            row.try_get::<Uuid, _>("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        continuation_id: ContinuationId(
            row.try_get::<Uuid, _>("continuation_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        voter_email: Identity::new(voter),
        voted_at: row
            .try_get("voted_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn slot_params(slot: Option<SlotFilter>) -> (Option<&'static str>, Option<Uuid>) {
    match slot {
        None => (None, None),
        Some(SlotFilter::Open) => (Some("open"), None),
        Some(SlotFilter::Holding(id)) => (Some("holding"), Some(id.0)),
    }
}

fn outcome(rows_affected: u64) -> WriteOutcome {
    if rows_affected == 0 {
        WriteOutcome::NoMatch
    } else {
        WriteOutcome::Updated
    }
}

fn map_sqlx_conflict(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StorageError::Conflict(db_err.message().to_string());
        }
    }
    StorageError::Backend(err.to_string())
}
