//! PostgreSQL adapter for Quill storage.
//!
//! This adapter is the transactional source-of-truth backend. The
//! one-pending-proposal rule is a partial unique index, and every lifecycle
//! unit runs in a single transaction that row-locks what it touches.
//! Serialization failures and deadlocks are retried inside the adapter.

use crate::model::{
    Document, DocumentId, DocumentPatch, MergeCommit, Proposal, ProposalFilter, ProposalId,
    ProposalStatus, ReviewStamp, UserId,
};
use crate::traits::{DocumentStore, LifecycleStore, ProposalStore, QueryWindow};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row, Transaction};
use std::time::Duration;

const MAX_TX_ATTEMPTS: u32 = 5;

const DOCUMENT_COLUMNS: &str =
    "id, title, body, form, tone, owner_id, owner_name, is_public, created_at, updated_at";
const PROPOSAL_COLUMNS: &str = "id, document_id, original_body, proposed_body, proposed_title, \
     proposer_id, proposer_name, status, created_at, reviewed_at, message, review_message";

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresQuillStorage {
    pool: PgPool,
}

impl PostgresQuillStorage {
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
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
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
            CREATE TABLE IF NOT EXISTS quill_documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                form TEXT,
                tone TEXT,
                owner_id TEXT NOT NULL,
                owner_name TEXT NOT NULL,
                is_public BOOLEAN NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS quill_documents_owner ON quill_documents (owner_id)",
            r#"
            CREATE TABLE IF NOT EXISTS quill_proposals (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES quill_documents (id),
                original_body TEXT NOT NULL,
                proposed_body TEXT NOT NULL,
                proposed_title TEXT NOT NULL,
                proposer_id TEXT NOT NULL,
                proposer_name TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                reviewed_at TIMESTAMPTZ,
                message TEXT,
                review_message TEXT
            )
            "#,
            "CREATE INDEX IF NOT EXISTS quill_proposals_document ON quill_proposals (document_id)",
            "CREATE INDEX IF NOT EXISTS quill_proposals_proposer ON quill_proposals (proposer_id)",
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS quill_proposals_one_pending
                ON quill_proposals (document_id, proposer_id)
             WHERE status = 'pending'
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }

    async fn begin(&self) -> StorageResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(backend)
    }

    async fn try_merge(&self, merge: &MergeCommit) -> StorageResult<(Document, Proposal)> {
        let mut tx = self.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {PROPOSAL_COLUMNS} FROM quill_proposals WHERE id = $1 FOR UPDATE"
        ))
        .bind(merge.proposal_id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?
        .ok_or_else(|| {
            StorageError::NotFound(format!("proposal {} not found", merge.proposal_id))
        })?;
        let proposal = proposal_row_to_record(row)?;
        if proposal.status != ProposalStatus::Pending {
            return Err(StorageError::StatusMismatch {
                expected: ProposalStatus::Pending,
                found: proposal.status,
            });
        }
        if proposal.document_id != merge.document_id {
            return Err(StorageError::InvariantViolation(format!(
                "proposal {} targets document {}, not {}",
                merge.proposal_id, proposal.document_id, merge.document_id
            )));
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE quill_documents
               SET body = $1,
                   title = COALESCE($2, title),
                   updated_at = GREATEST($3, updated_at + INTERVAL '1 microsecond')
             WHERE id = $4
            RETURNING {DOCUMENT_COLUMNS}
            "#
        ))
        .bind(&merge.body)
        .bind(merge.title.as_deref())
        .bind(merge.reviewed_at)
        .bind(merge.document_id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?
        .ok_or_else(|| {
            StorageError::NotFound(format!("document {} not found", merge.document_id))
        })?;
        let document = document_row_to_record(row)?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE quill_proposals
               SET status = 'approved',
                   reviewed_at = $1,
                   review_message = $2
             WHERE id = $3
            RETURNING {PROPOSAL_COLUMNS}
            "#
        ))
        .bind(merge.reviewed_at)
        .bind(merge.review_message.as_deref())
        .bind(merge.proposal_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;
        let proposal = proposal_row_to_record(row)?;

        tx.commit().await.map_err(backend)?;
        Ok((document, proposal))
    }

    async fn try_delete_cascade(&self, document_id: &DocumentId) -> StorageResult<usize> {
        let mut tx = self.begin().await?;

        let locked = sqlx::query("SELECT id FROM quill_documents WHERE id = $1 FOR UPDATE")
            .bind(document_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?;
        if locked.is_none() {
            return Err(StorageError::NotFound(format!(
                "document {document_id} not found"
            )));
        }

        let removed = sqlx::query("DELETE FROM quill_proposals WHERE document_id = $1")
            .bind(document_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(backend)?
            .rows_affected();
        sqlx::query("DELETE FROM quill_documents WHERE id = $1")
            .bind(document_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        usize::try_from(removed)
            .map_err(|_| StorageError::Backend("deleted row count overflow".to_string()))
    }
}

#[async_trait]
impl DocumentStore for PostgresQuillStorage {
    async fn create_document(&self, document: Document) -> StorageResult<()> {
        sqlx::query(&format!(
            "INSERT INTO quill_documents ({DOCUMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(document.id.as_str())
        .bind(&document.title)
        .bind(&document.body)
        .bind(document.form.as_deref())
        .bind(document.tone.as_deref())
        .bind(document.owner_id.as_str())
        .bind(&document.owner_name)
        .bind(document.is_public)
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_constraint)?;
        Ok(())
    }

    async fn get_document(&self, document_id: &DocumentId) -> StorageResult<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM quill_documents WHERE id = $1"
        ))
        .bind(document_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(document_row_to_record).transpose()
    }

    async fn update_document(
        &self,
        document_id: &DocumentId,
        patch: DocumentPatch,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<Document> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE quill_documents
               SET title = COALESCE($1, title),
                   body = COALESCE($2, body),
                   form = COALESCE($3, form),
                   tone = COALESCE($4, tone),
                   is_public = COALESCE($5, is_public),
                   updated_at = GREATEST($6, updated_at + INTERVAL '1 microsecond')
             WHERE id = $7
            RETURNING {DOCUMENT_COLUMNS}
            "#
        ))
        .bind(patch.title)
        .bind(patch.body)
        .bind(patch.form)
        .bind(patch.tone)
        .bind(patch.is_public)
        .bind(updated_at)
        .bind(document_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or_else(|| StorageError::NotFound(format!("document {document_id} not found")))?;

        document_row_to_record(row)
    }

    async fn delete_document(&self, document_id: &DocumentId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM quill_documents WHERE id = $1")
            .bind(document_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|err| match map_sqlx_constraint(err) {
                StorageError::NotFound(_) => StorageError::Conflict(format!(
                    "document {document_id} is still referenced by proposals"
                )),
                other => other,
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_documents_by_owner(&self, owner_id: &UserId) -> StorageResult<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM quill_documents \
             WHERE owner_id = $1 ORDER BY created_at DESC"
        ))
        .bind(owner_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(document_row_to_record).collect()
    }

    async fn list_public_documents(&self, window: QueryWindow) -> StorageResult<Vec<Document>> {
        let rows = if window.limit == 0 {
            sqlx::query(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM quill_documents \
                 WHERE is_public ORDER BY created_at DESC OFFSET $1"
            ))
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?
        } else {
            sqlx::query(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM quill_documents \
                 WHERE is_public ORDER BY created_at DESC LIMIT $1 OFFSET $2"
            ))
            .bind(to_i64(window.limit)?)
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?
        };

        rows.into_iter().map(document_row_to_record).collect()
    }
}

#[async_trait]
impl ProposalStore for PostgresQuillStorage {
    async fn create_proposal(&self, proposal: Proposal) -> StorageResult<()> {
        sqlx::query(&format!(
            "INSERT INTO quill_proposals ({PROPOSAL_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(proposal.id.as_str())
        .bind(proposal.document_id.as_str())
        .bind(&proposal.original_body)
        .bind(&proposal.proposed_body)
        .bind(&proposal.proposed_title)
        .bind(proposal.proposer_id.as_str())
        .bind(&proposal.proposer_name)
        .bind(proposal.status.as_str())
        .bind(proposal.created_at)
        .bind(proposal.reviewed_at)
        .bind(proposal.message.as_deref())
        .bind(proposal.review_message.as_deref())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_constraint)?;
        Ok(())
    }

    async fn get_proposal(&self, proposal_id: &ProposalId) -> StorageResult<Option<Proposal>> {
        let row = sqlx::query(&format!(
            "SELECT {PROPOSAL_COLUMNS} FROM quill_proposals WHERE id = $1"
        ))
        .bind(proposal_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(proposal_row_to_record).transpose()
    }

    async fn update_proposal_status(
        &self,
        proposal_id: &ProposalId,
        expected_from: ProposalStatus,
        to: ProposalStatus,
        stamp: ReviewStamp,
    ) -> StorageResult<Proposal> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE quill_proposals
               SET status = $1,
                   reviewed_at = $2,
                   review_message = $3
             WHERE id = $4
               AND status = $5
            RETURNING {PROPOSAL_COLUMNS}
            "#
        ))
        .bind(to.as_str())
        .bind(stamp.reviewed_at)
        .bind(stamp.review_message.as_deref())
        .bind(proposal_id.as_str())
        .bind(expected_from.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(row) => proposal_row_to_record(row),
            None => match self.get_proposal(proposal_id).await? {
                Some(current) => Err(StorageError::StatusMismatch {
                    expected: expected_from,
                    found: current.status,
                }),
                None => Err(StorageError::NotFound(format!(
                    "proposal {proposal_id} not found"
                ))),
            },
        }
    }

    async fn list_proposals(&self, filter: &ProposalFilter) -> StorageResult<Vec<Proposal>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PROPOSAL_COLUMNS} FROM quill_proposals WHERE TRUE"
        ));
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(proposer_id) = &filter.proposer_id {
            builder
                .push(" AND proposer_id = ")
                .push_bind(proposer_id.as_str().to_string());
        }
        if let Some(document_ids) = &filter.document_ids {
            let ids = document_ids
                .iter()
                .map(|id| id.as_str().to_string())
                .collect::<Vec<_>>();
            builder.push(" AND document_id = ANY(").push_bind(ids).push(")");
        }
        builder.push(" ORDER BY created_at DESC");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.into_iter().map(proposal_row_to_record).collect()
    }

    async fn delete_proposals_for_document(
        &self,
        document_id: &DocumentId,
    ) -> StorageResult<usize> {
        let removed = sqlx::query("DELETE FROM quill_proposals WHERE document_id = $1")
            .bind(document_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?
            .rows_affected();
        usize::try_from(removed)
            .map_err(|_| StorageError::Backend("deleted row count overflow".to_string()))
    }
}

#[async_trait]
impl LifecycleStore for PostgresQuillStorage {
    async fn merge_proposal(&self, merge: MergeCommit) -> StorageResult<(Document, Proposal)> {
        let mut attempt = 1;
        loop {
            match self.try_merge(&merge).await {
                Err(StorageError::Backend(message))
                    if attempt < MAX_TX_ATTEMPTS && is_retryable(&message) =>
                {
                    tracing::debug!(attempt, proposal_id = %merge.proposal_id, "retrying merge");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn delete_document_cascade(&self, document_id: &DocumentId) -> StorageResult<usize> {
        let mut attempt = 1;
        loop {
            match self.try_delete_cascade(document_id).await {
                Err(StorageError::Backend(message))
                    if attempt < MAX_TX_ATTEMPTS && is_retryable(&message) =>
                {
                    tracing::debug!(attempt, document_id = %document_id, "retrying cascade delete");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn backend_label(&self) -> &'static str {
        "postgres"
    }
}

fn document_row_to_record(row: PgRow) -> StorageResult<Document> {
    Ok(Document {
        id: DocumentId::new(column::<String>(&row, "id")?),
        title: column(&row, "title")?,
        body: column(&row, "body")?,
        form: column(&row, "form")?,
        tone: column(&row, "tone")?,
        owner_id: UserId::new(column::<String>(&row, "owner_id")?),
        owner_name: column(&row, "owner_name")?,
        is_public: column(&row, "is_public")?,
        created_at: column(&row, "created_at")?,
        updated_at: column(&row, "updated_at")?,
    })
}

fn proposal_row_to_record(row: PgRow) -> StorageResult<Proposal> {
    let status: String = column(&row, "status")?;
    Ok(Proposal {
        id: ProposalId::new(column::<String>(&row, "id")?),
        document_id: DocumentId::new(column::<String>(&row, "document_id")?),
        original_body: column(&row, "original_body")?,
        proposed_body: column(&row, "proposed_body")?,
        proposed_title: column(&row, "proposed_title")?,
        proposer_id: UserId::new(column::<String>(&row, "proposer_id")?),
        proposer_name: column(&row, "proposer_name")?,
        status: status
            .parse()
            .map_err(|_| StorageError::Serialization(format!("unknown status `{status}`")))?,
        created_at: column(&row, "created_at")?,
        reviewed_at: column(&row, "reviewed_at")?,
        message: column(&row, "message")?,
        review_message: column(&row, "review_message")?,
    })
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> StorageResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name).map_err(backend)
}

fn backend(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if let Some(code) = db_err.code() {
            return StorageError::Backend(format!("[{code}] {}", db_err.message()));
        }
    }
    StorageError::Backend(err.to_string())
}

fn map_sqlx_constraint(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23505") => return StorageError::Conflict(db_err.message().to_string()),
            Some("23503") => return StorageError::NotFound(db_err.message().to_string()),
            _ => {}
        }
    }
    backend(err)
}

/// Serialization failure or deadlock, as tagged by [`backend`].
fn is_retryable(message: &str) -> bool {
    message.starts_with("[40001]") || message.starts_with("[40P01]")
}

fn to_i64(value: usize) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidInput("window value too large".to_string()))
}
