//! Database repository layer with optimized connection pool separation
//!
//! Uses separate connection pools for different operation types to prevent
//! resource contention. Every tenant-scoped statement binds `tenant_id` -
//! the isolation invariant is enforced here, not in callers.

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use crate::error::{DatabaseError, DatabaseErrorExt, DatabaseOperation, DatabaseResult};
use crate::models::{
    Chunk, Document, DocumentStatus, Job, JobPayload, JobStatus, NewDocument, NewJob, ServiceStats,
    Stage, Tenant, TenantMetrics,
};
use crate::pool_manager::PoolManager;
use crate::traits::MetaRepository;

/// Repository for metadata operations with optimized connection pools
pub struct PgMetaRepository {
    pools: PoolManager,
}

impl PgMetaRepository {
    pub const fn new(pools: PoolManager) -> Self {
        Self { pools }
    }

    fn row_to_document(row: &PgRow) -> DatabaseResult<Document> {
        let status: String = row.get("status");
        let status = status.parse::<DocumentStatus>().map_err(|e| {
            DatabaseError::integrity(
                DatabaseOperation::Query {
                    description: "decode_document".to_string(),
                },
                e,
            )
        })?;
        Ok(Document {
            document_id: row.get("document_id"),
            tenant_id: row.get("tenant_id"),
            filename: row.get("filename"),
            blob_path: row.get("blob_path"),
            size_bytes: row.get("size_bytes"),
            status,
            metadata: row.get("metadata"),
            failed_deletion: row.get("failed_deletion"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn row_to_job(row: &PgRow) -> DatabaseResult<Job> {
        let operation = DatabaseOperation::Query {
            description: "decode_job".to_string(),
        };
        let stage: String = row.get("stage");
        let stage = stage
            .parse::<Stage>()
            .map_err(|e| DatabaseError::integrity(operation.clone(), e))?;
        let status: String = row.get("status");
        let status = status
            .parse::<JobStatus>()
            .map_err(|e| DatabaseError::integrity(operation.clone(), e))?;
        let payload: serde_json::Value = row.get("payload");
        let payload: JobPayload = serde_json::from_value(payload)
            .map_err(|e| DatabaseError::integrity(operation, e.to_string()))?;
        Ok(Job {
            job_id: row.get("job_id"),
            tenant_id: row.get("tenant_id"),
            document_id: row.get("document_id"),
            stage,
            status,
            payload,
            retry_count: row.get("retry_count"),
            max_retries: row.get("max_retries"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn row_to_chunk(row: &PgRow) -> Chunk {
        Chunk {
            chunk_id: row.get("chunk_id"),
            document_id: row.get("document_id"),
            tenant_id: row.get("tenant_id"),
            chunk_index: row.get("chunk_index"),
            text: row.get("text"),
            vector_snapshot_path: row.get("vector_snapshot_path"),
            metadata: row.get("metadata"),
        }
    }
}

const JOB_COLUMNS: &str = "job_id, tenant_id, document_id, stage, status, payload, \
     retry_count, max_retries, error_message, created_at, updated_at";

const DOCUMENT_COLUMNS: &str = "document_id, tenant_id, filename, blob_path, size_bytes, status, \
     metadata, failed_deletion, error_message, created_at, updated_at";

#[async_trait]
impl MetaRepository for PgMetaRepository {
    async fn create_tenant(
        &self,
        name: &str,
        credential_fingerprint: &str,
        rate_limit_per_minute: i32,
    ) -> DatabaseResult<Tenant> {
        let pool = self.pools.write_pool();

        let operation = DatabaseOperation::Query {
            description: "create_tenant".to_string(),
        };

        let row = sqlx::query(
            r"
            INSERT INTO tenants (name, credential_fingerprint, rate_limit_per_minute)
            VALUES ($1, $2, $3)
            RETURNING tenant_id, name, credential_fingerprint, rate_limit_per_minute, created_at
            ",
        )
        .bind(name)
        .bind(credential_fingerprint)
        .bind(rate_limit_per_minute)
        .fetch_one(pool)
        .await
        .map_db_err(operation, None)?;

        Ok(Tenant {
            tenant_id: row.get("tenant_id"),
            name: row.get("name"),
            credential_fingerprint: row.get("credential_fingerprint"),
            rate_limit_per_minute: row.get("rate_limit_per_minute"),
            created_at: row.get("created_at"),
        })
    }

    async fn get_tenant(&self, tenant_id: &Uuid) -> DatabaseResult<Option<Tenant>> {
        let pool = self.pools.read_pool();

        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
            .map_db_err(DatabaseOperation::TenantLookup, None)?;

        Ok(tenant)
    }

    async fn get_tenant_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> DatabaseResult<Option<Tenant>> {
        let pool = self.pools.read_pool();

        let tenant =
            sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE credential_fingerprint = $1")
                .bind(fingerprint)
                .fetch_optional(pool)
                .await
                .map_db_err(DatabaseOperation::TenantLookup, None)?;

        Ok(tenant)
    }

    async fn list_tenants(&self) -> DatabaseResult<Vec<Tenant>> {
        let pool = self.pools.read_pool();

        let tenants = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants ORDER BY created_at")
            .fetch_all(pool)
            .await
            .map_db_err(DatabaseOperation::TenantLookup, None)?;

        Ok(tenants)
    }

    async fn rotate_tenant_credential(
        &self,
        tenant_id: &Uuid,
        new_fingerprint: &str,
    ) -> DatabaseResult<bool> {
        let pool = self.pools.write_pool();

        let operation = DatabaseOperation::Query {
            description: "rotate_tenant_credential".to_string(),
        };

        let result =
            sqlx::query("UPDATE tenants SET credential_fingerprint = $2 WHERE tenant_id = $1")
                .bind(tenant_id)
                .bind(new_fingerprint)
                .execute(pool)
                .await
                .map_db_err(operation, None)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_tenant(&self, tenant_id: &Uuid) -> DatabaseResult<bool> {
        let pool = self.pools.write_pool();

        let operation = DatabaseOperation::Query {
            description: "delete_tenant".to_string(),
        };

        // chunks and jobs carry tenant_id without an FK so they are removed
        // explicitly before the tenant row (documents cascade).
        let mut tx = pool.begin().await.map_db_err(operation.clone(), None)?;
        sqlx::query("DELETE FROM chunks WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await
            .map_db_err(operation.clone(), None)?;
        sqlx::query("DELETE FROM jobs WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await
            .map_db_err(operation.clone(), None)?;
        let result = sqlx::query("DELETE FROM tenants WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await
            .map_db_err(operation.clone(), None)?;
        tx.commit().await.map_db_err(operation, None)?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_document(&self, doc: NewDocument) -> DatabaseResult<Document> {
        let pool = self.pools.write_pool();

        let operation = DatabaseOperation::Query {
            description: "insert_document".to_string(),
        };

        let row = sqlx::query(&format!(
            r"
            INSERT INTO documents (document_id, tenant_id, filename, blob_path, size_bytes, status, metadata)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6)
            RETURNING {DOCUMENT_COLUMNS}
            ",
        ))
        .bind(doc.document_id)
        .bind(doc.tenant_id)
        .bind(&doc.filename)
        .bind(&doc.blob_path)
        .bind(doc.size_bytes)
        .bind(&doc.metadata)
        .fetch_one(pool)
        .await
        .map_db_err(operation, None)?;

        Self::row_to_document(&row)
    }

    async fn get_document(
        &self,
        tenant_id: &Uuid,
        document_id: &Uuid,
    ) -> DatabaseResult<Option<Document>> {
        let pool = self.pools.read_pool();

        let operation = DatabaseOperation::Query {
            description: "get_document".to_string(),
        };

        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE tenant_id = $1 AND document_id = $2"
        ))
        .bind(tenant_id)
        .bind(document_id)
        .fetch_optional(pool)
        .await
        .map_db_err(operation, None)?;

        row.map(|r| Self::row_to_document(&r)).transpose()
    }

    async fn get_document_any_tenant(
        &self,
        document_id: &Uuid,
    ) -> DatabaseResult<Option<Document>> {
        let pool = self.pools.read_pool();

        let operation = DatabaseOperation::Query {
            description: "get_document_any_tenant".to_string(),
        };

        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE document_id = $1"
        ))
        .bind(document_id)
        .fetch_optional(pool)
        .await
        .map_db_err(operation, None)?;

        row.map(|r| Self::row_to_document(&r)).transpose()
    }

    async fn list_documents(
        &self,
        tenant_id: Option<&Uuid>,
        limit: i64,
    ) -> DatabaseResult<Vec<Document>> {
        let pool = self.pools.read_pool();

        let operation = DatabaseOperation::Query {
            description: "list_documents".to_string(),
        };

        let rows = match tenant_id {
            Some(tid) => {
                sqlx::query(&format!(
                    r"
                    SELECT {DOCUMENT_COLUMNS} FROM documents
                    WHERE tenant_id = $1
                    ORDER BY created_at DESC
                    LIMIT $2
                    "
                ))
                .bind(tid)
                .bind(limit)
                .fetch_all(pool)
                .await
                .map_db_err(operation, None)?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY created_at DESC LIMIT $1"
                ))
                .bind(limit)
                .fetch_all(pool)
                .await
                .map_db_err(operation, None)?
            }
        };

        rows.iter().map(Self::row_to_document).collect()
    }

    #[tracing::instrument(skip(self), fields(%document_id, %from, %to))]
    async fn advance_document_status(
        &self,
        tenant_id: &Uuid,
        document_id: &Uuid,
        from: DocumentStatus,
        to: DocumentStatus,
    ) -> DatabaseResult<bool> {
        let pool = self.pools.write_pool();

        let operation = DatabaseOperation::AdvanceDocumentStatus {
            document_id: *document_id,
        };

        // Guarded update: only advances out of the expected state, so
        // concurrent workers and replays cannot regress the row.
        let result = sqlx::query(
            r"
            UPDATE documents
            SET status = $4, updated_at = NOW()
            WHERE tenant_id = $1 AND document_id = $2 AND status = $3
            ",
        )
        .bind(tenant_id)
        .bind(document_id)
        .bind(from.to_string())
        .bind(to.to_string())
        .execute(pool)
        .await
        .map_db_err(operation, None)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_document_failed(
        &self,
        tenant_id: &Uuid,
        document_id: &Uuid,
        error: &str,
    ) -> DatabaseResult<bool> {
        let pool = self.pools.write_pool();

        let operation = DatabaseOperation::AdvanceDocumentStatus {
            document_id: *document_id,
        };

        let result = sqlx::query(
            r"
            UPDATE documents
            SET status = 'failed', error_message = $3, updated_at = NOW()
            WHERE tenant_id = $1 AND document_id = $2
              AND status NOT IN ('completed', 'failed')
            ",
        )
        .bind(tenant_id)
        .bind(document_id)
        .bind(error)
        .execute(pool)
        .await
        .map_db_err(operation, None)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed_deletion(
        &self,
        tenant_id: &Uuid,
        document_id: &Uuid,
    ) -> DatabaseResult<()> {
        let pool = self.pools.write_pool();

        let operation = DatabaseOperation::Query {
            description: "mark_failed_deletion".to_string(),
        };

        sqlx::query(
            r"
            UPDATE documents
            SET failed_deletion = TRUE, updated_at = NOW()
            WHERE tenant_id = $1 AND document_id = $2
            ",
        )
        .bind(tenant_id)
        .bind(document_id)
        .execute(pool)
        .await
        .map_db_err(operation, None)?;

        Ok(())
    }

    async fn delete_document_row(
        &self,
        tenant_id: &Uuid,
        document_id: &Uuid,
    ) -> DatabaseResult<bool> {
        let pool = self.pools.write_pool();

        let operation = DatabaseOperation::Query {
            description: "delete_document_row".to_string(),
        };

        let result = sqlx::query("DELETE FROM documents WHERE tenant_id = $1 AND document_id = $2")
            .bind(tenant_id)
            .bind(document_id)
            .execute(pool)
            .await
            .map_db_err(operation, None)?;

        Ok(result.rows_affected() > 0)
    }

    async fn tenant_metrics(&self, tenant_id: &Uuid) -> DatabaseResult<TenantMetrics> {
        let pool = self.pools.analytics_pool();

        let operation = DatabaseOperation::Query {
            description: "tenant_metrics".to_string(),
        };

        let row = sqlx::query(
            r"
            SELECT
                COUNT(*) AS documents_total,
                COUNT(*) FILTER (WHERE status = 'completed') AS documents_completed,
                COUNT(*) FILTER (WHERE status = 'failed') AS documents_failed,
                COALESCE(SUM(size_bytes), 0)::BIGINT AS bytes_total,
                MAX(created_at) AS last_upload_at
            FROM documents
            WHERE tenant_id = $1
            ",
        )
        .bind(tenant_id)
        .fetch_one(pool)
        .await
        .map_db_err(operation.clone(), None)?;

        let chunk_row = sqlx::query("SELECT COUNT(*) AS count FROM chunks WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_one(pool)
            .await
            .map_db_err(operation, None)?;

        Ok(TenantMetrics {
            documents_total: row.get("documents_total"),
            documents_completed: row.get("documents_completed"),
            documents_failed: row.get("documents_failed"),
            chunks_total: chunk_row.get("count"),
            bytes_total: row.get("bytes_total"),
            last_upload_at: row.get("last_upload_at"),
        })
    }

    async fn service_stats(&self) -> DatabaseResult<ServiceStats> {
        let pool = self.pools.analytics_pool();

        let operation = DatabaseOperation::Query {
            description: "service_stats".to_string(),
        };

        let row = sqlx::query(
            r"
            SELECT
                (SELECT COUNT(*) FROM tenants) AS tenants,
                (SELECT COUNT(*) FROM documents) AS documents,
                (SELECT COUNT(*) FROM chunks) AS chunks,
                (SELECT COUNT(*) FROM jobs WHERE status = 'pending') AS jobs_pending,
                (SELECT COUNT(*) FROM jobs WHERE status = 'processing') AS jobs_processing,
                (SELECT COUNT(*) FROM jobs WHERE status = 'completed') AS jobs_completed,
                (SELECT COUNT(*) FROM jobs WHERE status = 'dead') AS jobs_dead
            ",
        )
        .fetch_one(pool)
        .await
        .map_db_err(operation, None)?;

        Ok(ServiceStats {
            tenants: row.get("tenants"),
            documents: row.get("documents"),
            chunks: row.get("chunks"),
            jobs_pending: row.get("jobs_pending"),
            jobs_processing: row.get("jobs_processing"),
            jobs_completed: row.get("jobs_completed"),
            jobs_dead: row.get("jobs_dead"),
        })
    }

    #[tracing::instrument(skip(self, chunks), fields(chunk_count = chunks.len()))]
    async fn insert_chunks(&self, chunks: &[Chunk]) -> DatabaseResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let pool = self.pools.write_pool();

        let operation = DatabaseOperation::InsertChunks {
            document_id: chunks.first().map(|c| c.document_id).unwrap_or_default(),
            chunk_count: chunks.len(),
        };

        // UNNEST bulk insert - drastically faster than a loop of INSERTs
        let len = chunks.len();
        let mut chunk_ids = Vec::with_capacity(len);
        let mut document_ids = Vec::with_capacity(len);
        let mut tenant_ids = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut texts = Vec::with_capacity(len);
        let mut metadatas = Vec::with_capacity(len);

        for chunk in chunks {
            chunk_ids.push(chunk.chunk_id);
            document_ids.push(chunk.document_id);
            tenant_ids.push(chunk.tenant_id);
            chunk_indices.push(chunk.chunk_index);
            texts.push(chunk.text.clone());
            metadatas.push(chunk.metadata.clone());
        }

        sqlx::query(
            r"
            INSERT INTO chunks (chunk_id, document_id, tenant_id, chunk_index, text, metadata)
            SELECT
                unnest($1::uuid[]),
                unnest($2::uuid[]),
                unnest($3::uuid[]),
                unnest($4::int[]),
                unnest($5::text[]),
                unnest($6::jsonb[])
            ON CONFLICT (chunk_id) DO NOTHING
            ",
        )
        .bind(&chunk_ids)
        .bind(&document_ids)
        .bind(&tenant_ids)
        .bind(&chunk_indices)
        .bind(&texts)
        .bind(&metadatas)
        .execute(pool)
        .await
        .map_db_err(operation, None)?;

        Ok(())
    }

    async fn get_chunks(&self, tenant_id: &Uuid, document_id: &Uuid) -> DatabaseResult<Vec<Chunk>> {
        let pool = self.pools.read_pool();

        let operation = DatabaseOperation::Query {
            description: "get_chunks".to_string(),
        };

        let rows = sqlx::query(
            r"
            SELECT chunk_id, document_id, tenant_id, chunk_index, text, vector_snapshot_path, metadata
            FROM chunks
            WHERE tenant_id = $1 AND document_id = $2
            ORDER BY chunk_index
            ",
        )
        .bind(tenant_id)
        .bind(document_id)
        .fetch_all(pool)
        .await
        .map_db_err(operation, None)?;

        Ok(rows.iter().map(Self::row_to_chunk).collect())
    }

    async fn get_chunks_by_ids(
        &self,
        tenant_id: &Uuid,
        chunk_ids: &[Uuid],
    ) -> DatabaseResult<Vec<Chunk>> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }

        let pool = self.pools.read_pool();

        let operation = DatabaseOperation::Query {
            description: "get_chunks_by_ids".to_string(),
        };

        let rows = sqlx::query(
            r"
            SELECT chunk_id, document_id, tenant_id, chunk_index, text, vector_snapshot_path, metadata
            FROM chunks
            WHERE tenant_id = $1 AND chunk_id = ANY($2)
            ORDER BY chunk_index
            ",
        )
        .bind(tenant_id)
        .bind(chunk_ids)
        .fetch_all(pool)
        .await
        .map_db_err(operation, None)?;

        Ok(rows.iter().map(Self::row_to_chunk).collect())
    }

    async fn set_vector_snapshot_path(
        &self,
        tenant_id: &Uuid,
        chunk_ids: &[Uuid],
        snapshot_path: &str,
    ) -> DatabaseResult<()> {
        let pool = self.pools.write_pool();

        let operation = DatabaseOperation::Query {
            description: "set_vector_snapshot_path".to_string(),
        };

        sqlx::query(
            r"
            UPDATE chunks
            SET vector_snapshot_path = $3
            WHERE tenant_id = $1 AND chunk_id = ANY($2)
            ",
        )
        .bind(tenant_id)
        .bind(chunk_ids)
        .bind(snapshot_path)
        .execute(pool)
        .await
        .map_db_err(operation, None)?;

        Ok(())
    }

    async fn all_chunks_embedded(
        &self,
        tenant_id: &Uuid,
        document_id: &Uuid,
    ) -> DatabaseResult<bool> {
        let pool = self.pools.read_pool();

        let operation = DatabaseOperation::Query {
            description: "all_chunks_embedded".to_string(),
        };

        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS remaining
            FROM chunks
            WHERE tenant_id = $1 AND document_id = $2 AND vector_snapshot_path IS NULL
            ",
        )
        .bind(tenant_id)
        .bind(document_id)
        .fetch_one(pool)
        .await
        .map_db_err(operation, None)?;

        let remaining: i64 = row.get("remaining");
        Ok(remaining == 0)
    }

    async fn delete_chunks(&self, tenant_id: &Uuid, document_id: &Uuid) -> DatabaseResult<u64> {
        let pool = self.pools.write_pool();

        let operation = DatabaseOperation::Query {
            description: "delete_chunks".to_string(),
        };

        let result = sqlx::query("DELETE FROM chunks WHERE tenant_id = $1 AND document_id = $2")
            .bind(tenant_id)
            .bind(document_id)
            .execute(pool)
            .await
            .map_db_err(operation, None)?;

        Ok(result.rows_affected())
    }

    async fn create_job(&self, job: NewJob) -> DatabaseResult<Job> {
        let pool = self.pools.write_pool();

        let operation = DatabaseOperation::Query {
            description: "create_job".to_string(),
        };

        let payload = serde_json::to_value(&job.payload)
            .map_err(|e| DatabaseError::integrity(operation.clone(), e.to_string()))?;

        let row = sqlx::query(&format!(
            r"
            INSERT INTO jobs (job_id, tenant_id, document_id, stage, status, payload, max_retries)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6)
            RETURNING {JOB_COLUMNS}
            "
        ))
        .bind(job.job_id)
        .bind(job.tenant_id)
        .bind(job.document_id)
        .bind(job.payload.stage().to_string())
        .bind(&payload)
        .bind(job.max_retries)
        .fetch_one(pool)
        .await
        .map_db_err(operation, None)?;

        Self::row_to_job(&row)
    }

    async fn get_job(&self, job_id: &Uuid) -> DatabaseResult<Option<Job>> {
        let pool = self.pools.read_pool();

        let operation = DatabaseOperation::Query {
            description: "get_job".to_string(),
        };

        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = $1"))
            .bind(job_id)
            .fetch_optional(pool)
            .await
            .map_db_err(operation, None)?;

        row.map(|r| Self::row_to_job(&r)).transpose()
    }

    #[tracing::instrument(skip(self), fields(%job_id))]
    async fn claim_job(&self, job_id: &Uuid) -> DatabaseResult<Option<Job>> {
        let pool = self.pools.write_pool();

        let operation = DatabaseOperation::ClaimJob { job_id: *job_id };

        // Lease fence: only one worker wins the pending -> processing
        // transition even if the queue hands the same id out twice.
        let row = sqlx::query(&format!(
            r"
            UPDATE jobs
            SET status = 'processing', updated_at = NOW()
            WHERE job_id = $1 AND status = 'pending'
            RETURNING {JOB_COLUMNS}
            "
        ))
        .bind(job_id)
        .fetch_optional(pool)
        .await
        .map_db_err(operation, None)?;

        row.map(|r| Self::row_to_job(&r)).transpose()
    }

    async fn complete_job(&self, job_id: &Uuid) -> DatabaseResult<()> {
        let pool = self.pools.write_pool();

        let operation = DatabaseOperation::Query {
            description: "complete_job".to_string(),
        };

        sqlx::query(
            "UPDATE jobs SET status = 'completed', updated_at = NOW() WHERE job_id = $1",
        )
        .bind(job_id)
        .execute(pool)
        .await
        .map_db_err(operation, None)?;

        Ok(())
    }

    #[tracing::instrument(skip(self, next_jobs), fields(%job_id, next_count = next_jobs.len()))]
    async fn complete_job_and_advance(
        &self,
        job_id: &Uuid,
        tenant_id: &Uuid,
        document_id: &Uuid,
        from: DocumentStatus,
        to: DocumentStatus,
        next_jobs: Vec<NewJob>,
    ) -> DatabaseResult<Vec<Job>> {
        let pool = self.pools.write_pool();

        let operation = DatabaseOperation::Query {
            description: "complete_job_and_advance".to_string(),
        };

        let mut tx = pool.begin().await.map_db_err(operation.clone(), None)?;

        sqlx::query("UPDATE jobs SET status = 'completed', updated_at = NOW() WHERE job_id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_db_err(operation.clone(), None)?;

        sqlx::query(
            r"
            UPDATE documents
            SET status = $4, updated_at = NOW()
            WHERE tenant_id = $1 AND document_id = $2 AND status = $3
            ",
        )
        .bind(tenant_id)
        .bind(document_id)
        .bind(from.to_string())
        .bind(to.to_string())
        .execute(&mut *tx)
        .await
        .map_db_err(operation.clone(), None)?;

        let mut created = Vec::with_capacity(next_jobs.len());
        for job in next_jobs {
            let payload = serde_json::to_value(&job.payload)
                .map_err(|e| DatabaseError::integrity(operation.clone(), e.to_string()))?;
            let row = sqlx::query(&format!(
                r"
                INSERT INTO jobs (job_id, tenant_id, document_id, stage, status, payload, max_retries)
                VALUES ($1, $2, $3, $4, 'pending', $5, $6)
                RETURNING {JOB_COLUMNS}
                "
            ))
            .bind(job.job_id)
            .bind(job.tenant_id)
            .bind(job.document_id)
            .bind(job.payload.stage().to_string())
            .bind(&payload)
            .bind(job.max_retries)
            .fetch_one(&mut *tx)
            .await
            .map_db_err(operation.clone(), None)?;
            created.push(Self::row_to_job(&row)?);
        }

        tx.commit().await.map_db_err(operation, None)?;

        Ok(created)
    }

    async fn release_job_for_retry(&self, job_id: &Uuid, error: &str) -> DatabaseResult<i32> {
        let pool = self.pools.write_pool();

        let operation = DatabaseOperation::Query {
            description: "release_job_for_retry".to_string(),
        };

        let row = sqlx::query(
            r"
            UPDATE jobs
            SET status = 'pending',
                retry_count = retry_count + 1,
                error_message = $2,
                updated_at = NOW()
            WHERE job_id = $1 AND status = 'processing'
            RETURNING retry_count
            ",
        )
        .bind(job_id)
        .bind(error)
        .fetch_optional(pool)
        .await
        .map_db_err(operation.clone(), None)?;

        row.map_or_else(
            || {
                Err(DatabaseError::integrity(
                    operation,
                    format!("job {job_id} was not processing"),
                ))
            },
            |r| Ok(r.get("retry_count")),
        )
    }

    async fn mark_job_dead(&self, job_id: &Uuid, error: &str) -> DatabaseResult<()> {
        let pool = self.pools.write_pool();

        let operation = DatabaseOperation::Query {
            description: "mark_job_dead".to_string(),
        };

        sqlx::query(
            r"
            UPDATE jobs
            SET status = 'dead', error_message = $2, updated_at = NOW()
            WHERE job_id = $1
            ",
        )
        .bind(job_id)
        .bind(error)
        .execute(pool)
        .await
        .map_db_err(operation, None)?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(%cutoff))]
    async fn reset_stale_processing_jobs(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> DatabaseResult<Vec<Job>> {
        let pool = self.pools.write_pool();

        let operation = DatabaseOperation::Query {
            description: "reset_stale_processing_jobs".to_string(),
        };

        let rows = sqlx::query(&format!(
            r"
            UPDATE jobs
            SET status = 'pending', updated_at = NOW()
            WHERE status = 'processing' AND updated_at < $1
            RETURNING {JOB_COLUMNS}
            "
        ))
        .bind(cutoff)
        .fetch_all(pool)
        .await
        .map_db_err(operation, None)?;

        rows.iter().map(Self::row_to_job).collect()
    }

    async fn jobs_for_document(
        &self,
        tenant_id: &Uuid,
        document_id: &Uuid,
    ) -> DatabaseResult<Vec<Job>> {
        let pool = self.pools.read_pool();

        let operation = DatabaseOperation::Query {
            description: "jobs_for_document".to_string(),
        };

        let rows = sqlx::query(&format!(
            r"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE tenant_id = $1 AND document_id = $2
            ORDER BY created_at
            "
        ))
        .bind(tenant_id)
        .bind(document_id)
        .fetch_all(pool)
        .await
        .map_db_err(operation, None)?;

        rows.iter().map(Self::row_to_job).collect()
    }

    async fn delete_jobs(&self, tenant_id: &Uuid, document_id: &Uuid) -> DatabaseResult<u64> {
        let pool = self.pools.write_pool();

        let operation = DatabaseOperation::Query {
            description: "delete_jobs".to_string(),
        };

        let result = sqlx::query("DELETE FROM jobs WHERE tenant_id = $1 AND document_id = $2")
            .bind(tenant_id)
            .bind(document_id)
            .execute(pool)
            .await
            .map_db_err(operation, None)?;

        Ok(result.rows_affected())
    }
}
