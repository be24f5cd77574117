use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::common::{ResultDocument, SearchRequest, SearchResult};
use super::handle::IndexHandle;
use crate::error::{GroupFailure, IndexError, IndexResult};

/// Runs one request against several indexes and merges the hits.
///
/// Every index is queried in parallel with its own timeout. Offline, closed
/// and timed-out indexes contribute nothing; any other failure is reported
/// as a [`GroupFailure`]. Merging only starts once every index has answered,
/// so the final order never depends on which index finished first.
#[derive(Debug)]
pub struct SearchGroup<'a> {
    handles: &'a [Arc<dyn IndexHandle>],
    timeout: Duration,
}

impl<'a> SearchGroup<'a> {
    pub fn new(handles: &'a [Arc<dyn IndexHandle>], timeout: Duration) -> Self {
        Self { handles, timeout }
    }

    /// Search across all indices and merge results
    pub async fn search(&self, request: &SearchRequest) -> IndexResult<SearchResult> {
        // Each index must return everything up to the end of the window
        let per_index = SearchRequest {
            query: request.query.clone(),
            start: 0,
            rows: request.window_end(),
        };

        let outcomes = join_all(
            self.handles
                .iter()
                .map(|handle| self.query(handle, &per_index)),
        )
        .await;

        let results = self.collect(outcomes)?;
        let merged = merge_results(results, request);
        debug!(
            "Group search completed: {} of {} results",
            merged.documents.len(),
            merged.num_found
        );
        Ok(merged)
    }

    /// Search a group expected to hold one index.
    ///
    /// The index keeps its own window and ranking, but availability is
    /// handled as in [`SearchGroup::search`]: an offline, closed or
    /// timed-out index yields an empty result.
    pub async fn search_single(&self, request: &SearchRequest) -> IndexResult<SearchResult> {
        let [handle] = self.handles else {
            return self.search(request).await;
        };
        let outcome = self.query(handle, request).await;
        Ok(self.collect(vec![outcome])?.pop().unwrap_or_default())
    }

    async fn query(
        &self,
        handle: &Arc<dyn IndexHandle>,
        request: &SearchRequest,
    ) -> IndexResult<Option<SearchResult>> {
        if !handle.is_online() {
            debug!("Skipping offline index '{}'", handle.name());
            return Ok(None);
        }
        match tokio::time::timeout(self.timeout, handle.search(request)).await {
            Ok(result) => result.map(Some),
            Err(_) => Err(IndexError::Timeout(handle.name().to_string())),
        }
    }

    /// Fetch stored documents from every index, in index order
    pub async fn documents(&self, unique_keys: &[String]) -> IndexResult<Vec<ResultDocument>> {
        let outcomes = join_all(self.handles.iter().map(|handle| async move {
            if !handle.is_online() {
                return Ok(None);
            }
            match tokio::time::timeout(self.timeout, handle.documents(unique_keys)).await {
                Ok(result) => result.map(Some),
                Err(_) => Err(IndexError::Timeout(handle.name().to_string())),
            }
        }))
        .await;

        Ok(self.collect(outcomes)?.into_iter().flatten().collect())
    }

    /// Keep answers in handle order; drop transient failures, gather the rest
    fn collect<T>(&self, outcomes: Vec<IndexResult<Option<T>>>) -> IndexResult<Vec<T>> {
        let mut answers = Vec::with_capacity(outcomes.len());
        let mut failure = GroupFailure::default();

        for (handle, outcome) in self.handles.iter().zip(outcomes) {
            match outcome {
                Ok(Some(answer)) => answers.push(answer),
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    warn!("Index '{}' contributes nothing: {}", handle.name(), e);
                }
                Err(e) => {
                    warn!("Search failed for index '{}': {}", handle.name(), e);
                    failure.push(handle.name(), e);
                }
            }
        }

        failure.into_result()?;
        Ok(answers)
    }
}

/// Merge per-index results given in handle order.
///
/// Hits are ordered by score (descending), then by handle order, then by
/// in-index rank, and the request window is applied last. Duplicates across
/// indexes are kept: each index is an independent corpus.
pub fn merge_results(results: Vec<SearchResult>, request: &SearchRequest) -> SearchResult {
    let num_found = results.iter().map(|result| result.num_found).sum();
    let max_score = results
        .iter()
        .filter(|result| result.num_found > 0)
        .map(|result| result.max_score)
        .fold(None, |max: Option<f32>, score| {
            Some(max.map_or(score, |max| max.max(score)))
        })
        .unwrap_or(0.0);

    let mut hits: Vec<(usize, ResultDocument)> = results
        .into_iter()
        .enumerate()
        .flat_map(|(order, result)| result.documents.into_iter().map(move |doc| (order, doc)))
        .collect();

    hits.sort_by(|(order_a, a), (order_b, b)| {
        b.score
            .total_cmp(&a.score)
            .then(order_a.cmp(order_b))
            .then(a.rank.cmp(&b.rank))
    });

    let documents = hits
        .into_iter()
        .skip(request.start)
        .take(request.rows)
        .map(|(_, doc)| doc)
        .collect();

    SearchResult {
        documents,
        num_found,
        max_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::IndexDocument;

    fn create_result(index: &str, scores: &[f32]) -> SearchResult {
        let documents: Vec<ResultDocument> = scores
            .iter()
            .enumerate()
            .map(|(rank, score)| {
                let mut fields = IndexDocument::new();
                fields.set("path", format!("/{index}/{rank}"));
                ResultDocument {
                    index: index.to_string(),
                    score: *score,
                    rank,
                    fields,
                }
            })
            .collect();
        SearchResult {
            num_found: documents.len() as u64,
            max_score: scores.first().copied().unwrap_or(0.0),
            documents,
        }
    }

    fn labels(result: &SearchResult) -> Vec<(String, f32)> {
        result
            .documents
            .iter()
            .map(|doc| (doc.index.clone(), doc.score))
            .collect()
    }

    #[test]
    fn test_merge_top_two() {
        let merged = merge_results(
            vec![create_result("A", &[0.9, 0.5]), create_result("B", &[0.8, 0.3])],
            &SearchRequest::new("q").with_rows(2),
        );

        assert_eq!(
            labels(&merged),
            vec![("A".to_string(), 0.9), ("B".to_string(), 0.8)]
        );
        assert_eq!(merged.num_found, 4);
        assert_eq!(merged.max_score, 0.9);
    }

    #[test]
    fn test_ties_follow_handle_order_then_rank() {
        let merged = merge_results(
            vec![create_result("A", &[0.5, 0.5]), create_result("B", &[0.7, 0.5])],
            &SearchRequest::new("q").with_rows(10),
        );

        let paths: Vec<_> = merged
            .documents
            .iter()
            .map(|doc| doc.fields.get_first("path").unwrap().to_string())
            .collect();
        assert_eq!(paths, vec!["/B/0", "/A/0", "/A/1", "/B/1"]);
    }

    #[test]
    fn test_duplicates_are_not_collapsed() {
        let mut a = create_result("A", &[0.4]);
        let mut b = create_result("B", &[0.6]);
        a.documents[0].fields.set("path", "/same");
        b.documents[0].fields.set("path", "/same");

        let merged = merge_results(vec![a, b], &SearchRequest::new("q"));
        assert_eq!(merged.documents.len(), 2);
    }

    #[test]
    fn test_window_applied_after_merge() {
        let merged = merge_results(
            vec![create_result("A", &[0.9, 0.5]), create_result("B", &[0.8, 0.3])],
            &SearchRequest::new("q").with_start(1).with_rows(2),
        );
        assert_eq!(
            labels(&merged),
            vec![("B".to_string(), 0.8), ("A".to_string(), 0.5)]
        );
    }

    #[test]
    fn test_empty_results() {
        let merged = merge_results(vec![], &SearchRequest::default());
        assert_eq!(merged, SearchResult::default());
    }
}
