// store/mod.rs — Document store over SQLite.
//
// Named collections backed by SQLite tables, plus a generic `user_documents`
// table for per-user
// subcollections (enrolledCourses, achievements, certificates, payments,
// progress, consent, privacy). Atomic batches are transactions; terminal
// state transitions are enforced with guarded UPDATEs so a second transition
// is a no-op rather than an overwrite.

use anyhow::{Context as _, Result};
use chrono::Utc;
use serde_json::Value;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking the service indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
async fn with_timeout<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "database query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        )),
    }
}

/// Placeholder values written by anonymization and account deletion.
pub const ANONYMOUS_NAME: &str = "Anonymous User";
pub const DELETED_EMAIL: &str = "deleted@user.com";
pub const DELETED_NAME: &str = "Deleted User";

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub photo_url: Option<String>,
    /// Personal-data subfields. Null/placeholder once `is_anonymized` is set.
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<String>,
    pub is_anonymized: bool,
    /// Unix seconds of the user's last recorded activity.
    pub last_activity: i64,
    pub anonymized_at: Option<String>,
    /// Set only by account deletion. Implies `is_anonymized`.
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CourseRow {
    pub id: String,
    pub title: String,
    pub price: f64,
    pub status: String,
    pub content: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    /// JSON blob: grade level, track, model, token usage.
    pub metadata: Option<String>,
}

/// Read-only input to the certificate state machine — created once per
/// (user, course) by the external enrollment subsystem.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CompletionRow {
    pub user_id: String,
    pub course_id: String,
    /// RFC3339 completion timestamp.
    pub completed_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CertificateRow {
    pub id: String,
    pub student_id: String,
    pub course_id: String,
    pub student_name: String,
    pub course_name: String,
    /// Completion date as rendered on the certificate (YYYY-MM-DD).
    pub completion_date: String,
    /// pending | generated | failed
    pub status: String,
    pub pdf_url: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
    pub generated_at: Option<String>,
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        Self::new_with_slow_query(data_dir, 0).await
    }

    /// Create storage with slow-query logging enabled.
    ///
    /// `slow_query_ms` is the threshold in milliseconds — queries exceeding it
    /// are logged at WARN level. Set to 0 to disable slow-query logging.
    pub async fn new_with_slow_query(data_dir: &Path, slow_query_ms: u64) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("academyd.db");
        let mut opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        if slow_query_ms > 0 {
            use sqlx::ConnectOptions as _;
            opts = opts.log_slow_statements(
                log::LevelFilter::Warn,
                std::time::Duration::from_millis(slow_query_ms),
            );
        }

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        let stmts = [
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                display_name TEXT NOT NULL DEFAULT '',
                photo_url TEXT,
                name TEXT,
                phone TEXT,
                address TEXT,
                date_of_birth TEXT,
                is_anonymized INTEGER NOT NULL DEFAULT 0,
                last_activity INTEGER NOT NULL DEFAULT 0,
                anonymized_at TEXT,
                deleted_at TEXT
            )",
            "CREATE TABLE IF NOT EXISTS courses (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                price REAL NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'draft',
                content TEXT,
                created_by TEXT,
                created_at TEXT NOT NULL,
                metadata TEXT
            )",
            "CREATE TABLE IF NOT EXISTS completions (
                user_id TEXT NOT NULL,
                course_id TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                PRIMARY KEY (user_id, course_id)
            )",
            "CREATE TABLE IF NOT EXISTS certificates (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL,
                course_id TEXT NOT NULL,
                student_name TEXT NOT NULL,
                course_name TEXT NOT NULL,
                completion_date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                pdf_url TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                generated_at TEXT
            )",
            "CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                user_id TEXT,
                timestamp INTEGER NOT NULL,
                payload TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
            "CREATE TABLE IF NOT EXISTS user_documents (
                user_id TEXT NOT NULL,
                collection TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (user_id, collection, doc_id)
            )",
        ];
        for stmt in stmts {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .context("failed to run schema migration")?;
        }
        Ok(())
    }

    // ─── Users ──────────────────────────────────────────────────────────────

    pub async fn put_user(&self, user: &UserRow) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO users
             (id, email, display_name, photo_url, name, phone, address, date_of_birth,
              is_anonymized, last_activity, anonymized_at, deleted_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.photo_url)
        .bind(&user.name)
        .bind(&user.phone)
        .bind(&user.address)
        .bind(&user.date_of_birth)
        .bind(user.is_anonymized)
        .bind(user.last_activity)
        .bind(&user.anonymized_at)
        .bind(&user.deleted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// IDs of users eligible for scheduled anonymization: last activity before
    /// `cutoff` (unix seconds) and not yet anonymized.
    pub async fn stale_user_ids(&self, cutoff: i64) -> Result<Vec<String>> {
        with_timeout(async {
            let rows: Vec<(String,)> = sqlx::query_as(
                "SELECT id FROM users WHERE last_activity < ? AND is_anonymized = 0",
            )
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(|(id,)| id).collect())
        })
        .await
    }

    /// Replace the personal-data subfields with fixed placeholders and stamp
    /// `anonymized_at`. Guarded on `is_anonymized = 0` — calling this twice is
    /// a no-op, which makes concurrent duplicate calls harmless.
    ///
    /// Returns `true` if the user was anonymized by this call.
    pub async fn anonymize_user(&self, id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE users SET
                 name = ?,
                 phone = NULL,
                 address = NULL,
                 date_of_birth = NULL,
                 is_anonymized = 1,
                 anonymized_at = ?
             WHERE id = ? AND is_anonymized = 0",
        )
        .bind(ANONYMOUS_NAME)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Account deletion: purge every document in the given subcollections and
    /// anonymize the main user row with `deleted_at` set — one transaction.
    /// Either the whole erasure commits or none of it does.
    pub async fn delete_user_account(&self, id: &str, collections: &[&str]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for collection in collections {
            sqlx::query("DELETE FROM user_documents WHERE user_id = ? AND collection = ?")
                .bind(id)
                .bind(collection)
                .execute(&mut *tx)
                .await?;
        }

        let result = sqlx::query(
            "UPDATE users SET
                 email = ?,
                 display_name = ?,
                 photo_url = NULL,
                 name = NULL,
                 phone = NULL,
                 address = NULL,
                 date_of_birth = NULL,
                 is_anonymized = 1,
                 anonymized_at = COALESCE(anonymized_at, ?),
                 deleted_at = ?
             WHERE id = ?",
        )
        .bind(DELETED_EMAIL)
        .bind(DELETED_NAME)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Roll back the subcollection deletes rather than half-applying.
            tx.rollback().await?;
            return Err(anyhow::anyhow!("user '{id}' not found"));
        }

        tx.commit().await?;
        Ok(())
    }

    // ─── Courses & completions ──────────────────────────────────────────────

    pub async fn put_course(&self, course: &CourseRow) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO courses
             (id, title, price, status, content, created_by, created_at, metadata)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&course.id)
        .bind(&course.title)
        .bind(course.price)
        .bind(&course.status)
        .bind(&course.content)
        .bind(&course.created_by)
        .bind(&course.created_at)
        .bind(&course.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_course(&self, id: &str) -> Result<Option<CourseRow>> {
        Ok(sqlx::query_as("SELECT * FROM courses WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn put_completion(
        &self,
        user_id: &str,
        course_id: &str,
        completed_at: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO completions (user_id, course_id, completed_at)
             VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(course_id)
        .bind(completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_completion(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<CompletionRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM completions WHERE user_id = ? AND course_id = ?")
                .bind(user_id)
                .bind(course_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    // ─── Certificates ───────────────────────────────────────────────────────

    pub async fn insert_certificate(&self, cert: &CertificateRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO certificates
             (id, student_id, course_id, student_name, course_name, completion_date,
              status, pdf_url, error, created_at, generated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&cert.id)
        .bind(&cert.student_id)
        .bind(&cert.course_id)
        .bind(&cert.student_name)
        .bind(&cert.course_name)
        .bind(&cert.completion_date)
        .bind(&cert.status)
        .bind(&cert.pdf_url)
        .bind(&cert.error)
        .bind(&cert.created_at)
        .bind(&cert.generated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_certificate(&self, id: &str) -> Result<Option<CertificateRow>> {
        Ok(sqlx::query_as("SELECT * FROM certificates WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Transition `pending -> generated`, recording the artifact reference.
    /// Guarded on the current status — terminal certificates are never
    /// mutated, so a duplicate transition is a no-op. Returns `true` if this
    /// call performed the transition.
    pub async fn mark_certificate_generated(&self, id: &str, pdf_url: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE certificates SET status = 'generated', pdf_url = ?, generated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(pdf_url)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Transition `pending -> failed` with the captured error message.
    /// Same guard as [`Self::mark_certificate_generated`].
    pub async fn mark_certificate_failed(&self, id: &str, error: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE certificates SET status = 'failed', error = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Certificates still awaiting generation — used by the worker's recovery
    /// sweep at startup so a crash never strands a `pending` certificate.
    pub async fn pending_certificate_ids(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT id FROM certificates WHERE status = 'pending' ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    // ─── Analytics events ───────────────────────────────────────────────────

    pub async fn insert_event(
        &self,
        name: &str,
        user_id: Option<&str>,
        timestamp: i64,
        payload: Option<&Value>,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO events (id, name, user_id, timestamp, payload) VALUES (?, ?, ?, ?, ?)")
            .bind(&id)
            .bind(name)
            .bind(user_id)
            .bind(timestamp)
            .bind(payload.map(|p| p.to_string()))
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    /// Delete every analytics event with `timestamp < cutoff` as one atomic
    /// batch. A single DELETE is all-or-nothing: either the whole batch
    /// commits or zero rows are deleted.
    pub async fn delete_events_before(&self, cutoff: i64) -> Result<u64> {
        with_timeout(async {
            let result = sqlx::query("DELETE FROM events WHERE timestamp < ?")
                .bind(cutoff)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        })
        .await
    }

    pub async fn count_events(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }

    pub async fn event_timestamps(&self) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT timestamp FROM events ORDER BY timestamp")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    // ─── User subcollections ────────────────────────────────────────────────

    pub async fn put_user_document(
        &self,
        user_id: &str,
        collection: &str,
        doc_id: &str,
        body: &Value,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT OR REPLACE INTO user_documents (user_id, collection, doc_id, body, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(collection)
        .bind(doc_id)
        .bind(body.to_string())
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Every document in one subcollection, parsed back to JSON. A corrupt
    /// body is an error, not a silent skip — exports must not be partial.
    pub async fn list_user_documents(&self, user_id: &str, collection: &str) -> Result<Vec<Value>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT doc_id, body FROM user_documents
             WHERE user_id = ? AND collection = ? ORDER BY doc_id",
        )
        .bind(user_id)
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(doc_id, body)| {
                serde_json::from_str(&body).with_context(|| {
                    format!("corrupt document body in {collection}/{doc_id} for user {user_id}")
                })
            })
            .collect()
    }

    pub async fn count_user_documents(&self, user_id: &str, collection: &str) -> Result<u64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM user_documents WHERE user_id = ? AND collection = ?",
        )
        .bind(user_id)
        .bind(collection)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 as u64)
    }
}
