use super::types::{RetrievalConfig, RetrievalError, RetrievalResult, SourceType};
use crate::memory::{EpisodicLog, SemanticStore, WorkingStateStore};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

type NowProvider = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Merges working-state, semantic and episodic recall into one [0, 1]
/// ranking. Sources that fail or return nothing contribute zero results;
/// only an empty query is an error.
pub struct HybridRetriever {
    working: Arc<WorkingStateStore>,
    semantic: Arc<SemanticStore>,
    episodic: Arc<EpisodicLog>,
    config: RetrievalConfig,
    now_provider: NowProvider,
}

impl HybridRetriever {
    pub fn new(
        working: Arc<WorkingStateStore>,
        semantic: Arc<SemanticStore>,
        episodic: Arc<EpisodicLog>,
        config: RetrievalConfig,
    ) -> Result<Self, RetrievalError> {
        config.validate()?;
        Ok(Self {
            working,
            semantic,
            episodic,
            config,
            now_provider: Box::new(Utc::now),
        })
    }

    pub fn with_now_provider(
        mut self,
        now_provider: impl Fn() -> DateTime<Utc> + Send + Sync + 'static,
    ) -> Self {
        self.now_provider = Box::new(now_provider);
        self
    }

    pub fn retrieve(
        &self,
        query: &str,
        task_id: Option<&str>,
    ) -> Result<Vec<RetrievalResult>, RetrievalError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }

        let mut results = Vec::new();
        if let Some(task_id) = task_id {
            results.extend(self.retrieve_working_state(query, task_id));
        }
        results.extend(self.retrieve_semantic(query));
        results.extend(self.retrieve_episodic(query, task_id));

        let mut filtered = results
            .into_iter()
            .filter(|item| item.final_score >= self.config.min_final_score_threshold)
            .collect::<Vec<_>>();

        filtered.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| content_hash(&a.content).cmp(&content_hash(&b.content)))
        });
        filtered.truncate(self.config.max_total_results);
        Ok(filtered)
    }

    fn retrieve_working_state(&self, query: &str, task_id: &str) -> Vec<RetrievalResult> {
        let Ok(Some(doc)) = self.working.load(task_id) else {
            return Vec::new();
        };
        let skip = doc
            .messages
            .len()
            .saturating_sub(self.config.max_working_state_messages);
        let window = &doc.messages[skip..];
        if window.is_empty() {
            return Vec::new();
        }

        let query_words = fold_words(query);
        if query_words.is_empty() {
            return Vec::new();
        }

        let newest = window.len() - 1;
        let weights = self.config.weights_for(SourceType::WorkingState);
        let mut out = Vec::new();
        for (position, message) in window.iter().enumerate() {
            let message_words = fold_words(&message.content);
            let overlap = query_words
                .iter()
                .filter(|word| message_words.contains(*word))
                .count();
            let relevance = (overlap as f64 / query_words.len() as f64).min(1.0);
            let recency = if newest == 0 {
                1.0
            } else {
                0.1 + 0.9 * (position as f64 / newest as f64)
            };

            let metadata = Map::from_iter([
                (
                    "role".to_string(),
                    Value::String(message.role.as_str().to_string()),
                ),
                ("position".to_string(), json!(position)),
            ]);
            if let Ok(result) = RetrievalResult::from_scores(
                SourceType::WorkingState,
                message.content.clone(),
                relevance,
                recency,
                weights,
                metadata,
            ) {
                out.push(result);
            }
        }
        out
    }

    fn retrieve_semantic(&self, query: &str) -> Vec<RetrievalResult> {
        let hits = match self
            .semantic
            .search_text(query, self.config.max_total_results)
        {
            Ok(hits) => hits,
            Err(_) => return Vec::new(),
        };

        let weights = self.config.weights_for(SourceType::Semantic);
        let mut out = Vec::new();
        for hit in hits {
            let timestamp = hit
                .metadata
                .get("timestamp")
                .and_then(Value::as_str)
                .map(|v| v.to_string());
            let recency = self.timestamp_recency(timestamp.as_deref());

            let mut metadata = Map::from_iter([
                ("vector_id".to_string(), json!(hit.vector_id)),
                ("distance".to_string(), json!(hit.distance)),
            ]);
            if let Value::Object(extra) = &hit.metadata {
                for (key, value) in extra {
                    metadata.insert(key.clone(), value.clone());
                }
            }

            if let Ok(result) = RetrievalResult::from_scores(
                SourceType::Semantic,
                hit.text.clone(),
                hit.similarity.clamp(0.0, 1.0),
                recency,
                weights,
                metadata,
            ) {
                out.push(result);
            }
        }
        out
    }

    fn retrieve_episodic(&self, query: &str, task_id: Option<&str>) -> Vec<RetrievalResult> {
        let keywords = fold_words(query)
            .into_iter()
            .filter(|word| word.chars().count() > 3)
            .collect::<Vec<_>>();
        if keywords.is_empty() {
            return Vec::new();
        }

        let mut merged: BTreeMap<i64, crate::memory::DecisionRecord> = BTreeMap::new();
        for keyword in &keywords {
            let Ok(rows) =
                self.episodic
                    .search_decisions(keyword, task_id, self.config.max_total_results)
            else {
                continue;
            };
            for row in rows {
                merged.entry(row.id).or_insert(row);
            }
        }

        let weights = self.config.weights_for(SourceType::Episodic);
        let mut out = Vec::new();
        for decision in merged.into_values() {
            let content_folded = decision.content.to_lowercase();
            let matched = keywords
                .iter()
                .filter(|keyword| content_folded.contains(keyword.as_str()))
                .count();
            let relevance = matched as f64 / keywords.len() as f64;
            let recency = self.timestamp_recency(Some(&decision.timestamp));

            let metadata = Map::from_iter([
                ("kind".to_string(), Value::String("decision".to_string())),
                ("id".to_string(), json!(decision.id)),
                (
                    "action_type".to_string(),
                    Value::String(decision.action_type.as_str().to_string()),
                ),
                (
                    "status".to_string(),
                    Value::String(decision.status.as_str().to_string()),
                ),
            ]);
            if let Ok(result) = RetrievalResult::from_scores(
                SourceType::Episodic,
                decision.content.clone(),
                relevance,
                recency,
                weights,
                metadata,
            ) {
                out.push(result);
            }
        }
        out
    }

    /// `exp(-age_hours / decay_hours)` clamped to [0.1, 1.0]; a missing
    /// or unparsable timestamp scores the configured midpoint.
    fn timestamp_recency(&self, timestamp: Option<&str>) -> f64 {
        let Some(raw) = timestamp else {
            return self.config.missing_timestamp_recency;
        };
        let Ok(parsed) = DateTime::parse_from_rfc3339(raw) else {
            return self.config.missing_timestamp_recency;
        };
        let now = (self.now_provider)();
        let age_seconds = (now - parsed.with_timezone(&Utc)).num_seconds().max(0) as f64;
        let age_hours = age_seconds / 3600.0;
        (-age_hours / self.config.decay_hours).exp().clamp(0.1, 1.0)
    }
}

fn fold_words(text: &str) -> Vec<String> {
    let mut words = text
        .to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| word.to_string())
        .collect::<Vec<_>>();
    words.sort();
    words.dedup();
    words
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
