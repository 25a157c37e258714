//! Retrieval pipeline: namespace handle, top-k search, score filter.

use crate::session::SessionCache;
use crate::types::{RetrievalResult, RetrievedPassage};
use ragline_core::config::RetrievalConfig;
use ragline_core::{AppError, AppResult};
use std::sync::Arc;

/// Fetches context passages for a question.
pub struct Retriever {
    sessions: Arc<SessionCache>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(sessions: Arc<SessionCache>, config: RetrievalConfig) -> Self {
        Self { sessions, config }
    }

    pub fn sessions(&self) -> &Arc<SessionCache> {
        &self.sessions
    }

    /// Retrieve up to `k` passages for `question` from `namespace`.
    ///
    /// Passages whose score is present and at or below `min_score` are
    /// dropped; unscored passages are kept. The whole operation is bounded
    /// by the retrieval timeout.
    ///
    /// # Errors
    /// `AppError::RetrievalUnavailable` on connect failure, search failure,
    /// or timeout.
    pub async fn retrieve(
        &self,
        namespace: &str,
        question: &str,
        k: usize,
    ) -> AppResult<RetrievalResult> {
        let search = async {
            let handle = self.sessions.acquire(namespace).await?;
            handle
                .similarity_search(question, k)
                .await
                .map_err(|e| match e {
                    AppError::RetrievalUnavailable(_) => e,
                    other => AppError::RetrievalUnavailable(format!("Search failed: {}", other)),
                })
        };

        let passages = tokio::time::timeout(self.config.timeout(), search)
            .await
            .map_err(|_| {
                AppError::RetrievalUnavailable(format!(
                    "Retrieval timed out after {:?}",
                    self.config.timeout()
                ))
            })??;

        let found = passages.len();
        let kept = filter_by_score(passages, self.config.min_score);

        tracing::debug!(
            namespace,
            found,
            kept = kept.len(),
            min_score = self.config.min_score,
            "Retrieved passages"
        );

        Ok(RetrievalResult::from_passages(kept))
    }
}

fn filter_by_score(passages: Vec<RetrievedPassage>, min_score: f32) -> Vec<RetrievedPassage> {
    passages
        .into_iter()
        .filter(|p| p.score.map_or(true, |s| s > min_score))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EmbeddingStore, StoreConnection};
    use std::time::Duration;

    struct FixedStore {
        passages: Vec<RetrievedPassage>,
        search_delay: Duration,
        fail_search: bool,
    }

    struct FixedConnection {
        passages: Vec<RetrievedPassage>,
        search_delay: Duration,
        fail_search: bool,
    }

    #[async_trait::async_trait]
    impl EmbeddingStore for FixedStore {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn connect(&self, _namespace: &str) -> AppResult<Arc<dyn StoreConnection>> {
            Ok(Arc::new(FixedConnection {
                passages: self.passages.clone(),
                search_delay: self.search_delay,
                fail_search: self.fail_search,
            }))
        }
    }

    #[async_trait::async_trait]
    impl StoreConnection for FixedConnection {
        async fn similarity_search(&self, _query: &str, k: usize) -> AppResult<Vec<RetrievedPassage>> {
            tokio::time::sleep(self.search_delay).await;
            if self.fail_search {
                return Err(AppError::Knowledge("index corrupted".to_string()));
            }
            Ok(self.passages.iter().take(k).cloned().collect())
        }
    }

    fn retriever(store: FixedStore, timeout_secs: u64) -> Retriever {
        let sessions = Arc::new(SessionCache::new(Arc::new(store), Duration::from_secs(60)));
        Retriever::new(
            sessions,
            RetrievalConfig {
                min_score: 0.7,
                timeout_secs,
            },
        )
    }

    fn store_with(passages: Vec<RetrievedPassage>) -> FixedStore {
        FixedStore {
            passages,
            search_delay: Duration::ZERO,
            fail_search: false,
        }
    }

    #[tokio::test]
    async fn test_low_scores_dropped_and_context_joined() {
        let retriever = retriever(
            store_with(vec![
                RetrievedPassage::new("Returns are accepted within 30 days.", Some(0.92)),
                RetrievedPassage::new("Exchanges are free.", Some(0.81)),
                RetrievedPassage::new("Exactly at the bar.", Some(0.7)),
                RetrievedPassage::new("Our office dog is named Biscuit.", Some(0.2)),
            ]),
            5,
        );

        let result = retriever
            .retrieve("docs", "What is your return window?", 5)
            .await
            .unwrap();

        assert_eq!(result.passages.len(), 2);
        assert_eq!(
            result.context,
            "Returns are accepted within 30 days.\n\nExchanges are free."
        );
    }

    #[tokio::test]
    async fn test_unscored_passages_kept() {
        let retriever = retriever(
            store_with(vec![RetrievedPassage::new("No score here.", None)]),
            5,
        );

        let result = retriever.retrieve("docs", "q", 5).await.unwrap();
        assert_eq!(result.passages.len(), 1);
    }

    #[tokio::test]
    async fn test_k_limits_results() {
        let passages = (0..10)
            .map(|i| RetrievedPassage::new(format!("passage {}", i), Some(0.9)))
            .collect();
        let retriever = retriever(store_with(passages), 5);

        let result = retriever.retrieve("docs", "q", 5).await.unwrap();
        assert_eq!(result.passages.len(), 5);
    }

    #[tokio::test]
    async fn test_search_error_is_retrieval_unavailable() {
        let retriever = retriever(
            FixedStore {
                fail_search: true,
                ..store_with(Vec::new())
            },
            5,
        );

        let err = retriever.retrieve("docs", "q", 5).await.unwrap_err();
        assert!(matches!(err, AppError::RetrievalUnavailable(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_retrieval_unavailable() {
        let retriever = retriever(
            FixedStore {
                search_delay: Duration::from_secs(30),
                ..store_with(Vec::new())
            },
            0,
        );

        let err = retriever.retrieve("docs", "q", 5).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
