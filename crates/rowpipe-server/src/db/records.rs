//! `ingested_records` table
//!
//! Rows are unique on `(job_id, line_number)`, so replaying a batch after a restart
//! inserts nothing twice.

use async_trait::async_trait;
use sqlx::{types::Json, PgPool, Postgres, QueryBuilder};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ingest::store::{RecordSink, StoreError, StoreResult};
use crate::ingest::types::ParsedRecord;

/// Postgres caps a statement at 65535 bind parameters; each row uses 4
const MAX_ROWS_PER_STATEMENT: usize = 1000;

#[derive(Clone)]
pub struct PgRecordSink {
    pool: PgPool,
}

impl PgRecordSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_rows(
        &self,
        file_id: Uuid,
        job_id: Uuid,
        rows: &[ParsedRecord],
    ) -> Result<u64, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO ingested_records (file_id, job_id, line_number, data) ");

        builder.push_values(rows, |mut row, record| {
            row.push_bind(file_id)
                .push_bind(job_id)
                .push_bind(record.line_number as i64)
                .push_bind(Json(record.data.clone()));
        });
        builder.push(" ON CONFLICT (job_id, line_number) DO NOTHING");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Salvage what can be written from a rejected chunk
    async fn insert_individually(&self, file_id: Uuid, job_id: Uuid, rows: &[ParsedRecord]) {
        let mut salvaged = 0usize;
        for record in rows {
            match self
                .insert_rows(file_id, job_id, std::slice::from_ref(record))
                .await
            {
                Ok(_) => salvaged += 1,
                Err(e) => debug!(
                    job_id = %job_id,
                    line = record.line_number,
                    error = %e,
                    "Row rejected"
                ),
            }
        }

        warn!(
            job_id = %job_id,
            attempted = rows.len(),
            salvaged,
            "Retried rejected rows individually"
        );
    }
}

#[async_trait]
impl RecordSink for PgRecordSink {
    async fn insert_batch(
        &self,
        file_id: Uuid,
        job_id: Uuid,
        records: &[ParsedRecord],
    ) -> StoreResult<()> {
        let mut first_error: Option<sqlx::Error> = None;

        for chunk in records.chunks(MAX_ROWS_PER_STATEMENT) {
            if let Err(e) = self.insert_rows(file_id, job_id, chunk).await {
                warn!(
                    job_id = %job_id,
                    rows = chunk.len(),
                    error = %e,
                    "Multi-row insert failed"
                );
                self.insert_individually(file_id, job_id, chunk).await;
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(StoreError::Database(e)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_size_fits_bind_limit() {
        assert!(MAX_ROWS_PER_STATEMENT * 4 <= u16::MAX as usize);
    }
}
