//! LanceDB-backed embedding store.
//!
//! One table per namespace under a shared database directory. Passages are
//! embedded at load time; questions are embedded with the same provider at
//! query time.

use crate::embeddings::EmbeddingProvider;
use crate::store::{EmbeddingStore, StoreConnection};
use crate::types::{LoadStats, RetrievedPassage};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt32Array,
};
use arrow_schema::{DataType, Field, Schema};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use ragline_core::{AppError, AppResult};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// LanceDB store rooted at one directory.
pub struct LanceDbStore {
    path: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl LanceDbStore {
    pub fn new(path: impl Into<PathBuf>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            path: path.into(),
            embedder,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Table holding a namespace's passages.
    ///
    /// Namespaces made of `[A-Za-z0-9_-]` map to `user_<namespace>`; anything
    /// else is hashed so arbitrary strings stay valid table names.
    pub fn table_name(namespace: &str) -> String {
        let safe = namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if safe {
            format!("user_{}", namespace)
        } else {
            let digest = Sha256::digest(namespace.as_bytes());
            let hex: String = digest.iter().take(16).map(|b| format!("{:02x}", b)).collect();
            format!("user_h{}", hex)
        }
    }

    async fn open_db(&self) -> AppResult<Connection> {
        std::fs::create_dir_all(&self.path).map_err(|e| {
            AppError::Knowledge(format!(
                "Failed to create store directory {:?}: {}",
                self.path, e
            ))
        })?;

        let uri = self.path.to_string_lossy().to_string();
        lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to connect to LanceDB: {}", e)))
    }

    fn schema(dimensions: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("position", DataType::UInt32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimensions as i32,
                ),
                false,
            ),
            Field::new("created_at", DataType::Int64, false),
        ]))
    }

    /// Content-addressed passage id: same namespace, position and text give
    /// the same id.
    fn passage_id(namespace: &str, position: u32, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(namespace.as_bytes());
        hasher.update(position.to_le_bytes());
        hasher.update(text.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    fn passages_to_batch(
        &self,
        namespace: &str,
        first_position: u32,
        texts: &[String],
        embeddings: Vec<Vec<f32>>,
    ) -> AppResult<RecordBatch> {
        let dimensions = self.embedder.dimensions();
        let schema = Self::schema(dimensions);

        let mut flat = Vec::with_capacity(texts.len() * dimensions);
        for embedding in embeddings {
            if embedding.len() != dimensions {
                return Err(AppError::Knowledge(format!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    dimensions,
                    embedding.len()
                )));
            }
            flat.extend(embedding);
        }

        let positions: Vec<u32> = (0..texts.len() as u32).map(|i| first_position + i).collect();
        let ids: Vec<String> = positions
            .iter()
            .zip(texts)
            .map(|(position, text)| Self::passage_id(namespace, *position, text))
            .collect();
        let now = Utc::now().timestamp();

        let embedding_array = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            dimensions as i32,
            Arc::new(Float32Array::from(flat)),
            None,
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to build embedding column: {}", e)))?;

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(UInt32Array::from(positions)),
                Arc::new(StringArray::from(texts.to_vec())),
                Arc::new(embedding_array),
                Arc::new(Int64Array::from(vec![now; texts.len()])),
            ],
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to create RecordBatch: {}", e)))
    }

    /// Embed and append passages to a namespace, optionally clearing it first.
    pub async fn load_passages(
        &self,
        namespace: &str,
        passages: &[String],
        reset: bool,
    ) -> AppResult<LoadStats> {
        if namespace.trim().is_empty() {
            return Err(AppError::InvalidInput("Namespace cannot be empty".to_string()));
        }

        let db = self.open_db().await?;
        let table_name = Self::table_name(namespace);
        let existing = open_if_exists(&db, &table_name).await?;

        let mut first_position = 0u32;
        if let Some(table) = &existing {
            if reset {
                table
                    .delete("id IS NOT NULL")
                    .await
                    .map_err(|e| AppError::Knowledge(format!("Failed to reset namespace: {}", e)))?;
                tracing::info!(namespace, "Cleared namespace");
            } else {
                first_position = table
                    .count_rows(None)
                    .await
                    .map_err(|e| AppError::Knowledge(format!("Failed to count rows: {}", e)))?
                    as u32;
            }
        }

        let stats = LoadStats {
            namespace: namespace.to_string(),
            passages: passages.len(),
            reset,
        };

        if passages.is_empty() {
            return Ok(stats);
        }

        tracing::info!(
            namespace,
            passages = passages.len(),
            provider = self.embedder.provider_name(),
            model = self.embedder.model_name(),
            "Embedding passages"
        );

        let embeddings = self.embedder.embed_batch(passages).await?;
        let batch = self.passages_to_batch(namespace, first_position, passages, embeddings)?;
        let schema = batch.schema();

        match existing {
            Some(table) => {
                table
                    .add(RecordBatchIterator::new(vec![Ok(batch)], schema))
                    .execute()
                    .await
                    .map_err(|e| AppError::Knowledge(format!("Failed to add passages: {}", e)))?;
            }
            None => {
                db.create_table(&table_name, RecordBatchIterator::new(vec![Ok(batch)], schema))
                    .execute()
                    .await
                    .map_err(|e| AppError::Knowledge(format!("Failed to create table: {}", e)))?;
            }
        }

        tracing::debug!(namespace, table = %table_name, "Stored passages in LanceDB");
        Ok(stats)
    }

    /// Number of stored passages for a namespace (0 when it has none).
    pub async fn count(&self, namespace: &str) -> AppResult<usize> {
        let db = self.open_db().await?;
        match open_if_exists(&db, &Self::table_name(namespace)).await? {
            Some(table) => table
                .count_rows(None)
                .await
                .map_err(|e| AppError::Knowledge(format!("Failed to count rows: {}", e))),
            None => Ok(0),
        }
    }
}

async fn open_if_exists(db: &Connection, table_name: &str) -> AppResult<Option<Table>> {
    let names = db
        .table_names()
        .execute()
        .await
        .map_err(|e| AppError::Knowledge(format!("Failed to list tables: {}", e)))?;

    if !names.iter().any(|n| n == table_name) {
        return Ok(None);
    }

    let table = db
        .open_table(table_name)
        .execute()
        .await
        .map_err(|e| AppError::Knowledge(format!("Failed to open table: {}", e)))?;
    Ok(Some(table))
}

#[async_trait::async_trait]
impl EmbeddingStore for LanceDbStore {
    fn name(&self) -> &str {
        "lancedb"
    }

    async fn connect(&self, namespace: &str) -> AppResult<Arc<dyn StoreConnection>> {
        let db = self.open_db().await?;
        let table_name = Self::table_name(namespace);
        tracing::debug!(namespace, table = %table_name, "Opened LanceDB connection");

        Ok(Arc::new(LanceDbConnection {
            db,
            table_name,
            table: OnceCell::new(),
            embedder: Arc::clone(&self.embedder),
        }))
    }
}

/// Connection scoped to one namespace table.
///
/// The table is opened on first search so a namespace loaded after the
/// connection was made becomes visible without reconnecting.
struct LanceDbConnection {
    db: Connection,
    table_name: String,
    table: OnceCell<Table>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl LanceDbConnection {
    async fn table(&self) -> AppResult<Option<&Table>> {
        if let Some(table) = self.table.get() {
            return Ok(Some(table));
        }

        match open_if_exists(&self.db, &self.table_name).await? {
            Some(opened) => {
                let table = self.table.get_or_init(|| async { opened }).await;
                Ok(Some(table))
            }
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl StoreConnection for LanceDbConnection {
    async fn similarity_search(&self, query: &str, k: usize) -> AppResult<Vec<RetrievedPassage>> {
        let Some(table) = self.table().await? else {
            tracing::debug!(table = %self.table_name, "Namespace has no passages");
            return Ok(Vec::new());
        };

        let query_embedding = self.embedder.embed(query).await?;
        if query_embedding.iter().all(|x| *x == 0.0) {
            // Nothing to compare against (e.g. punctuation-only question)
            return Ok(Vec::new());
        }

        let batches: Vec<RecordBatch> = table
            .query()
            .nearest_to(query_embedding.clone())
            .map_err(|e| AppError::Knowledge(format!("Failed to create query: {}", e)))?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to execute search: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to collect results: {}", e)))?;

        let mut passages = Vec::new();
        for batch in &batches {
            passages.extend(batch_to_passages(batch, &query_embedding)?);
        }

        passages.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        passages.truncate(k);

        tracing::debug!(
            table = %self.table_name,
            results = passages.len(),
            requested = k,
            "Similarity search finished"
        );

        Ok(passages)
    }
}

fn batch_to_passages(batch: &RecordBatch, query: &[f32]) -> AppResult<Vec<RetrievedPassage>> {
    let texts = batch
        .column_by_name("text")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| AppError::Knowledge("Invalid text column".to_string()))?;

    let embeddings = batch
        .column_by_name("embedding")
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| AppError::Knowledge("Invalid embedding column".to_string()))?;

    let mut out = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let values = embeddings.value(row);
        let values = values
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| AppError::Knowledge("Invalid embedding values".to_string()))?;

        let score = cosine_similarity(query, values.values());
        out.push(RetrievedPassage::new(texts.value(row), Some(score)));
    }

    Ok(out)
}

/// Cosine similarity between two vectors; 0.0 on length mismatch or zero norm.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::trigram::TrigramProvider;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> LanceDbStore {
        LanceDbStore::new(dir.path().join("store"), Arc::new(TrigramProvider::new(384)))
    }

    #[test]
    fn test_table_name_mapping() {
        assert_eq!(LanceDbStore::table_name("docs"), "user_docs");
        assert_eq!(LanceDbStore::table_name("Atomix-growth"), "user_Atomix-growth");

        let hashed = LanceDbStore::table_name("acme corp/support");
        assert!(hashed.starts_with("user_h"));
        assert_eq!(hashed.len(), "user_h".len() + 32);
        assert_eq!(hashed, LanceDbStore::table_name("acme corp/support"));
    }

    #[test]
    fn test_passage_id_is_content_addressed() {
        let a = LanceDbStore::passage_id("docs", 0, "Returns within 30 days.");
        assert_eq!(a, LanceDbStore::passage_id("docs", 0, "Returns within 30 days."));
        assert_ne!(a, LanceDbStore::passage_id("docs", 1, "Returns within 30 days."));
        assert_ne!(a, LanceDbStore::passage_id("faq", 0, "Returns within 30 days."));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_load_and_search() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let passages = vec![
            "Our return window is 30 days from delivery.".to_string(),
            "Shipping to Canada takes about a week.".to_string(),
        ];
        let stats = store.load_passages("docs", &passages, false).await.unwrap();
        assert_eq!(stats.passages, 2);
        assert_eq!(store.count("docs").await.unwrap(), 2);

        let conn = store.connect("docs").await.unwrap();
        let results = conn
            .similarity_search("What is your return window?", 2)
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].text, passages[0]);
        assert!(results[0].score.unwrap() > 0.5);
    }

    #[tokio::test]
    async fn test_unknown_namespace_returns_nothing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let conn = store.connect("empty").await.unwrap();
        let results = conn.similarity_search("anything at all", 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_connection_sees_passages_loaded_later() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let conn = store.connect("late").await.unwrap();
        assert!(conn.similarity_search("return window", 3).await.unwrap().is_empty());

        store
            .load_passages("late", &["The return window is 30 days.".to_string()], false)
            .await
            .unwrap();

        let results = conn.similarity_search("return window", 3).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_clears_namespace() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store
            .load_passages("docs", &["first passage text".to_string()], false)
            .await
            .unwrap();
        store
            .load_passages("docs", &["second passage text".to_string()], true)
            .await
            .unwrap();

        assert_eq!(store.count("docs").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_namespace_rejected() {
        let dir = TempDir::new().unwrap();
        let result = store(&dir).load_passages(" ", &[], false).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }
}
