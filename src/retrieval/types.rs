use crate::config::RetrievalWeightSettings;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("query must be non-empty")]
    EmptyQuery,
    #[error("score `{name}` = {value} is outside [0, 1]")]
    ScoreOutOfRange { name: &'static str, value: f64 },
    #[error("retrieval config invalid: {0}")]
    InvalidConfig(String),
}

impl RetrievalError {
    pub fn code(&self) -> &'static str {
        "invalid_argument"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SourceType {
    WorkingState,
    Semantic,
    Episodic,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WorkingState => "working_state",
            Self::Semantic => "semantic",
            Self::Episodic => "episodic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceWeights {
    pub relevance: f64,
    pub recency: f64,
}

impl SourceWeights {
    fn validate(&self, source: &str) -> Result<(), RetrievalError> {
        for (name, value) in [("relevance", self.relevance), ("recency", self.recency)] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(RetrievalError::InvalidConfig(format!(
                    "{source} {name} weight {value} must be within [0, 1]"
                )));
            }
        }
        let sum = self.relevance + self.recency;
        if sum <= 0.0 || sum > 1.0 {
            return Err(RetrievalError::InvalidConfig(format!(
                "{source} weights must sum into (0, 1], got {sum}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    pub working: SourceWeights,
    pub semantic: SourceWeights,
    pub episodic: SourceWeights,
    pub max_working_state_messages: usize,
    pub decay_hours: f64,
    pub missing_timestamp_recency: f64,
    pub min_final_score_threshold: f64,
    pub max_total_results: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            working: SourceWeights {
                relevance: 0.3,
                recency: 0.7,
            },
            semantic: SourceWeights {
                relevance: 0.9,
                recency: 0.1,
            },
            episodic: SourceWeights {
                relevance: 0.7,
                recency: 0.3,
            },
            max_working_state_messages: 50,
            decay_hours: 24.0,
            missing_timestamp_recency: 0.5,
            min_final_score_threshold: 0.0,
            max_total_results: 10,
        }
    }
}

impl RetrievalConfig {
    pub fn from_settings(settings: &RetrievalWeightSettings) -> Self {
        Self {
            working: SourceWeights {
                relevance: settings.working_relevance_weight,
                recency: settings.working_recency_weight,
            },
            semantic: SourceWeights {
                relevance: settings.semantic_relevance_weight,
                recency: settings.semantic_recency_weight,
            },
            episodic: SourceWeights {
                relevance: settings.episodic_relevance_weight,
                recency: settings.episodic_recency_weight,
            },
            max_working_state_messages: settings.max_working_state_messages,
            decay_hours: settings.decay_hours,
            missing_timestamp_recency: 0.5,
            min_final_score_threshold: settings.min_final_score_threshold,
            max_total_results: settings.max_total_results,
        }
    }

    pub fn validate(&self) -> Result<(), RetrievalError> {
        self.working.validate("working")?;
        self.semantic.validate("semantic")?;
        self.episodic.validate("episodic")?;
        if !self.decay_hours.is_finite() || self.decay_hours <= 0.0 {
            return Err(RetrievalError::InvalidConfig(
                "decay_hours must be a finite number > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_final_score_threshold) {
            return Err(RetrievalError::InvalidConfig(
                "min_final_score_threshold must be within [0, 1]".to_string(),
            ));
        }
        if self.max_total_results == 0 || self.max_working_state_messages == 0 {
            return Err(RetrievalError::InvalidConfig(
                "result and window limits must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn weights_for(&self, source: SourceType) -> SourceWeights {
        match source {
            SourceType::WorkingState => self.working,
            SourceType::Semantic => self.semantic,
            SourceType::Episodic => self.episodic,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub source: SourceType,
    pub content: String,
    pub relevance_score: f64,
    pub recency_score: f64,
    pub final_score: f64,
    pub metadata: Map<String, Value>,
}

impl RetrievalResult {
    /// `final_score` is derived, never caller-supplied. Inputs outside
    /// [0, 1] are rejected rather than clamped.
    pub fn from_scores(
        source: SourceType,
        content: String,
        relevance_score: f64,
        recency_score: f64,
        weights: SourceWeights,
        metadata: Map<String, Value>,
    ) -> Result<Self, RetrievalError> {
        for (name, value) in [
            ("relevance_score", relevance_score),
            ("recency_score", recency_score),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(RetrievalError::ScoreOutOfRange { name, value });
            }
        }
        let final_score = relevance_score * weights.relevance + recency_score * weights.recency;
        Ok(Self {
            source,
            content,
            relevance_score,
            recency_score,
            final_score,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_documented_weights() {
        let config = RetrievalConfig::default();
        config.validate().expect("defaults valid");
        assert_eq!(config.working.relevance, 0.3);
        assert_eq!(config.working.recency, 0.7);
        assert_eq!(config.semantic.relevance, 0.9);
        assert_eq!(config.semantic.recency, 0.1);
        assert_eq!(config.episodic.relevance, 0.7);
        assert_eq!(config.episodic.recency, 0.3);
    }

    #[test]
    fn out_of_range_scores_are_rejected() {
        let weights = SourceWeights {
            relevance: 0.5,
            recency: 0.5,
        };
        let err = RetrievalResult::from_scores(
            SourceType::Semantic,
            "x".to_string(),
            1.2,
            0.5,
            weights,
            Map::new(),
        )
        .expect_err("relevance over 1 must fail");
        assert_eq!(err.code(), "invalid_argument");

        assert!(RetrievalResult::from_scores(
            SourceType::Semantic,
            "x".to_string(),
            0.9,
            f64::NAN,
            weights,
            Map::new(),
        )
        .is_err());
    }

    #[test]
    fn final_score_follows_weighted_formula_and_stays_in_unit_range() {
        let weights = SourceWeights {
            relevance: 0.9,
            recency: 0.1,
        };
        let result = RetrievalResult::from_scores(
            SourceType::Semantic,
            "answer".to_string(),
            0.9,
            0.1,
            weights,
            Map::new(),
        )
        .expect("scores valid");
        assert!((result.final_score - (0.9 * 0.9 + 0.1 * 0.1)).abs() < 1e-12);
        assert!((0.0..=1.0).contains(&result.final_score));
    }

    #[test]
    fn weight_pairs_summing_over_one_fail_validation() {
        let mut config = RetrievalConfig::default();
        config.working = SourceWeights {
            relevance: 0.8,
            recency: 0.8,
        };
        assert!(config.validate().is_err());
    }
}
