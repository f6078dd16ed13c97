use serde::{Deserialize, Serialize};

/// Tunables for [`crate::SearchEngine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Documents whose summed score falls below this are dropped as noise.
    pub min_score_threshold: f64,
    /// Hard cap on the number of hits returned by any query.
    pub max_results: usize,
    /// Query cache capacity in entries; 0 disables caching.
    pub cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_score_threshold: 0.01,
            max_results: 500,
            cache_capacity: 100,
        }
    }
}

impl EngineConfig {
    pub fn without_cache(mut self) -> Self {
        self.cache_capacity = 0;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"max_results": 50}"#).unwrap();
        assert_eq!(cfg.max_results, 50);
        assert_eq!(cfg.cache_capacity, 100);
        assert!((cfg.min_score_threshold - 0.01).abs() < f64::EPSILON);
    }
}
