/// PostgreSQL + pgvector implementation of PassageStore
///
/// All collections share one `passages` table; each store handle is bound to a single
/// collection name. Cosine distance uses pgvector's `<=>` operator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    postgres::{PgPool, PgPoolOptions, PgRow},
    Row,
};
use std::time::Duration;

use super::{validate_upsert, PassageStore, VectorMatch};
use crate::embedding::{Embedding, Representation};
use crate::errors::SecragError;
use crate::passage::{ChunkType, Passage, PassageMetadata};

const PASSAGE_COLUMNS: &str = "content, file_path, symbol_name, symbol_type, start_line, end_line, \
                               language, revision, module_path, chunk_type, last_modified";

/// Open a connection pool, optionally running pending migrations.
pub async fn connect(database_url: &str, run_migrations: bool) -> Result<PgPool, SecragError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .idle_timeout(Duration::from_secs(300))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
        .map_err(|e| SecragError::Storage(format!("Failed to connect to database: {}", e)))?;

    if run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| SecragError::Storage(format!("Migration failed: {}", e)))?;
    }

    Ok(pool)
}

/// One collection inside the shared `passages` table.
#[derive(Clone)]
pub struct PostgresPassageStore {
    pool: PgPool,
    collection: String,
}

impl PostgresPassageStore {
    /// Connect and bind to `collection`.
    pub async fn new(database_url: &str, collection: &str, run_migrations: bool) -> Result<Self, SecragError> {
        let pool = connect(database_url, run_migrations).await?;
        Ok(Self::with_pool(pool, collection))
    }

    /// Bind another collection to an existing pool; collections share connections.
    pub fn with_pool(pool: PgPool, collection: &str) -> Self {
        PostgresPassageStore {
            pool,
            collection: collection.to_string(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_metadata(row: &PgRow) -> Result<PassageMetadata, SecragError> {
    let get_str = |col: &str| -> Result<String, SecragError> {
        row.try_get::<String, _>(col)
            .map_err(|e| SecragError::Storage(format!("Failed to read column {}: {}", col, e)))
    };
    let get_line = |col: &str| -> Result<u32, SecragError> {
        let value: i32 = row
            .try_get(col)
            .map_err(|e| SecragError::Storage(format!("Failed to read column {}: {}", col, e)))?;
        u32::try_from(value).map_err(|_| SecragError::Storage(format!("Negative {} in passages row", col)))
    };
    let last_modified: DateTime<Utc> = row
        .try_get("last_modified")
        .map_err(|e| SecragError::Storage(format!("Failed to read column last_modified: {}", e)))?;

    Ok(PassageMetadata {
        file_path: get_str("file_path")?,
        symbol_name: get_str("symbol_name")?,
        symbol_type: get_str("symbol_type")?,
        start_line: get_line("start_line")?,
        end_line: get_line("end_line")?,
        language: get_str("language")?,
        revision: get_str("revision")?,
        module_path: get_str("module_path")?,
        chunk_type: ChunkType::from(get_str("chunk_type")?),
        last_modified,
    })
}

fn row_to_passage(row: &PgRow) -> Result<Passage, SecragError> {
    let content: String = row
        .try_get("content")
        .map_err(|e| SecragError::Storage(format!("Failed to read column content: {}", e)))?;
    Ok(Passage::new(content, row_to_metadata(row)?))
}

fn line_to_db(line: u32) -> Result<i32, SecragError> {
    i32::try_from(line).map_err(|_| SecragError::validation("start_line", "Line number exceeds storage range"))
}

#[async_trait]
impl PassageStore for PostgresPassageStore {
    async fn upsert(
        &self,
        ids: &[String],
        documents: &[String],
        embeddings: &[Option<Embedding>],
        metadata: &[PassageMetadata],
    ) -> Result<(), SecragError> {
        validate_upsert(ids, documents, embeddings, metadata)?;
        if ids.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SecragError::Storage(format!("Failed to begin transaction: {}", e)))?;

        for (((id, document), embedding), meta) in ids.iter().zip(documents).zip(embeddings).zip(metadata) {
            let representation = embedding.as_ref().map(|e| e.representation().to_string());
            let vector = embedding.as_ref().map(|e| pgvector::Vector::from(e.vector().to_vec()));

            sqlx::query(
                "INSERT INTO passages \
                 (collection, id, content, file_path, symbol_name, symbol_type, start_line, end_line, \
                  language, revision, module_path, chunk_type, last_modified, representation, embedding) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
                 ON CONFLICT (collection, id) DO UPDATE SET \
                 content = EXCLUDED.content, file_path = EXCLUDED.file_path, \
                 symbol_name = EXCLUDED.symbol_name, symbol_type = EXCLUDED.symbol_type, \
                 start_line = EXCLUDED.start_line, end_line = EXCLUDED.end_line, \
                 language = EXCLUDED.language, revision = EXCLUDED.revision, \
                 module_path = EXCLUDED.module_path, chunk_type = EXCLUDED.chunk_type, \
                 last_modified = EXCLUDED.last_modified, representation = EXCLUDED.representation, \
                 embedding = EXCLUDED.embedding",
            )
            .bind(&self.collection)
            .bind(id)
            .bind(document)
            .bind(&meta.file_path)
            .bind(&meta.symbol_name)
            .bind(&meta.symbol_type)
            .bind(line_to_db(meta.start_line)?)
            .bind(line_to_db(meta.end_line)?)
            .bind(&meta.language)
            .bind(&meta.revision)
            .bind(&meta.module_path)
            .bind(meta.chunk_type.to_string())
            .bind(meta.last_modified)
            .bind(representation)
            .bind(vector)
            .execute(&mut *tx)
            .await
            .map_err(|e| SecragError::Storage(format!("Failed to upsert passage {}: {}", id, e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| SecragError::Storage(format!("Failed to commit upsert: {}", e)))?;

        tracing::debug!(collection = %self.collection, count = ids.len(), "Upserted passages");
        Ok(())
    }

    async fn query(&self, embedding: &Embedding, top_k: usize) -> Result<Vec<VectorMatch>, SecragError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let representation: Representation = embedding.representation();
        let dimension = embedding.vector().len() as i32;
        let vector = pgvector::Vector::from(embedding.vector().to_vec());

        let sql = format!(
            "SELECT {}, (embedding <=> $1)::float8 AS distance FROM passages \
             WHERE collection = $2 AND representation = $3 AND vector_dims(embedding) = $4 \
             ORDER BY distance ASC, file_path ASC, start_line ASC \
             LIMIT $5",
            PASSAGE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(&vector)
            .bind(&self.collection)
            .bind(representation.to_string())
            .bind(dimension)
            .bind(top_k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SecragError::Storage(format!("Vector query failed: {}", e)))?;

        rows.iter()
            .map(|row| {
                let distance: f64 = row
                    .try_get("distance")
                    .map_err(|e| SecragError::Storage(format!("Failed to read distance: {}", e)))?;
                Ok(VectorMatch {
                    passage: row_to_passage(row)?,
                    distance,
                })
            })
            .collect()
    }

    async fn get_all(&self) -> Result<(Vec<String>, Vec<PassageMetadata>), SecragError> {
        let sql = format!(
            "SELECT {} FROM passages WHERE collection = $1 ORDER BY id ASC",
            PASSAGE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(&self.collection)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SecragError::Storage(format!("Failed to load passages: {}", e)))?;

        let mut documents = Vec::with_capacity(rows.len());
        let mut metadata = Vec::with_capacity(rows.len());
        for row in &rows {
            let passage = row_to_passage(row)?;
            documents.push(passage.content);
            metadata.push(passage.metadata);
        }
        Ok((documents, metadata))
    }

    async fn count(&self) -> Result<usize, SecragError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM passages WHERE collection = $1")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SecragError::Storage(format!("Failed to count passages: {}", e)))?;
        Ok(count.max(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_to_db_range() {
        assert_eq!(line_to_db(42).unwrap(), 42);
        assert!(matches!(line_to_db(u32::MAX), Err(SecragError::Validation { .. })));
    }

    #[test]
    fn test_passage_columns_cover_metadata() {
        for column in ["file_path", "symbol_name", "start_line", "end_line", "revision", "chunk_type"] {
            assert!(PASSAGE_COLUMNS.contains(column), "missing {}", column);
        }
    }
}
