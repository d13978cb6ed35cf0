use serde_json::{json, Value};
use std::collections::BTreeMap;

fn normalize_category(category: &str) -> String {
    let normalized = category.trim();
    if normalized.is_empty() {
        "general".to_string()
    } else {
        normalized.to_string()
    }
}

/// In-process cache counters with per-category hit/miss breakdowns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub category_hits: BTreeMap<String, u64>,
    pub category_misses: BTreeMap<String, u64>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&mut self, category: &str) {
        let name = normalize_category(category);
        self.hits += 1;
        *self.category_hits.entry(name).or_insert(0) += 1;
    }

    pub fn record_miss(&mut self, category: &str) {
        let name = normalize_category(category);
        self.misses += 1;
        *self.category_misses.entry(name).or_insert(0) += 1;
    }

    pub fn record_set(&mut self) {
        self.sets += 1;
    }

    pub fn record_delete(&mut self) {
        self.deletes += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }

    pub fn category_hit_rate(&self, category: &str) -> f64 {
        let name = normalize_category(category);
        let hits = *self.category_hits.get(&name).unwrap_or(&0);
        let misses = *self.category_misses.get(&name).unwrap_or(&0);
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }

    /// Summary with raw rates and percent strings; categories sorted.
    pub fn summary(&self) -> Value {
        let mut categories = self
            .category_hits
            .keys()
            .chain(self.category_misses.keys())
            .cloned()
            .collect::<Vec<_>>();
        categories.sort();
        categories.dedup();

        let mut category_summary = serde_json::Map::new();
        for category in categories {
            let rate = self.category_hit_rate(&category);
            category_summary.insert(
                category.clone(),
                json!({
                    "hits": self.category_hits.get(&category).copied().unwrap_or(0),
                    "misses": self.category_misses.get(&category).copied().unwrap_or(0),
                    "hit_rate": rate,
                    "hit_rate_pct": format_pct(rate),
                }),
            );
        }

        let overall = self.hit_rate();
        json!({
            "total_requests": self.hits + self.misses,
            "hits": self.hits,
            "misses": self.misses,
            "hit_rate": overall,
            "hit_rate_pct": format_pct(overall),
            "sets": self.sets,
            "deletes": self.deletes,
            "errors": self.errors,
            "categories": Value::Object(category_summary),
        })
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn format_pct(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}
