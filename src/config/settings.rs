use super::ConfigError;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const TRUE_VALUES: &[&str] = &["1", "true", "yes", "on"];
const FALSE_VALUES: &[&str] = &["0", "false", "no", "off"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugMode {
    Dev,
    Release,
}

impl DebugMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Release => "release",
        }
    }

    /// Accepts `dev` or `release`; any other host value falls back to
    /// `release` rather than propagating arbitrary input.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dev" => Self::Dev,
            _ => Self::Release,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalWeightSettings {
    pub working_relevance_weight: f64,
    pub working_recency_weight: f64,
    pub semantic_relevance_weight: f64,
    pub semantic_recency_weight: f64,
    pub episodic_relevance_weight: f64,
    pub episodic_recency_weight: f64,
    pub min_final_score_threshold: f64,
    pub max_total_results: usize,
    pub max_working_state_messages: usize,
    pub decay_hours: f64,
}

impl Default for RetrievalWeightSettings {
    fn default() -> Self {
        Self {
            working_relevance_weight: 0.3,
            working_recency_weight: 0.7,
            semantic_relevance_weight: 0.9,
            semantic_recency_weight: 0.1,
            episodic_relevance_weight: 0.7,
            episodic_recency_weight: 0.3,
            min_final_score_threshold: 0.0,
            max_total_results: 10,
            max_working_state_messages: 50,
            decay_hours: 24.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorSettings {
    pub max_output_chars: usize,
    pub forbidden_tokens: Vec<String>,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            max_output_chars: 8000,
            forbidden_tokens: vec!["Instruction:".to_string(), "User:".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub debug: DebugMode,
    pub data_path: PathBuf,
    pub cache_enabled: bool,
    pub cache_default_ttl: u64,
    pub context_cache_ttl_seconds: u64,
    pub tool_cache_ttl_seconds: u64,
    pub enable_pii_detection: bool,
    pub enable_pii_redaction: bool,
    pub enable_security_audit: bool,
    pub enable_hybrid_retrieval: bool,
    pub max_transcript_messages: usize,
    pub retrieval: RetrievalWeightSettings,
    pub validator: ValidatorSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: DebugMode::Release,
            data_path: PathBuf::from("data"),
            cache_enabled: true,
            cache_default_ttl: 3600,
            context_cache_ttl_seconds: 3600,
            tool_cache_ttl_seconds: 1800,
            enable_pii_detection: true,
            enable_pii_redaction: true,
            enable_security_audit: true,
            enable_hybrid_retrieval: false,
            max_transcript_messages: 50,
            retrieval: RetrievalWeightSettings::default(),
            validator: ValidatorSettings::default(),
        }
    }
}

pub fn parse_bool(value: Option<&str>, default: bool) -> bool {
    let Some(raw) = value else {
        return default;
    };
    let normalized = raw.trim().to_ascii_lowercase();
    if TRUE_VALUES.contains(&normalized.as_str()) {
        return true;
    }
    if FALSE_VALUES.contains(&normalized.as_str()) {
        return false;
    }
    default
}

fn parse_positive_u64(value: Option<&str>, default: u64) -> u64 {
    let Some(raw) = value else {
        return default;
    };
    match raw.trim().parse::<u64>() {
        Ok(parsed) if parsed > 0 => parsed,
        _ => default,
    }
}

fn parse_positive_usize(value: Option<&str>, default: usize) -> usize {
    let Some(raw) = value else {
        return default;
    };
    match raw.trim().parse::<usize>() {
        Ok(parsed) if parsed > 0 => parsed,
        _ => default,
    }
}

fn parse_unit_float(value: Option<&str>, default: f64) -> f64 {
    let Some(raw) = value else {
        return default;
    };
    match raw.trim().parse::<f64>() {
        Ok(parsed) if parsed.is_finite() && (0.0..=1.0).contains(&parsed) => parsed,
        _ => default,
    }
}

fn parse_positive_float(value: Option<&str>, default: f64) -> f64 {
    let Some(raw) = value else {
        return default;
    };
    match raw.trim().parse::<f64>() {
        Ok(parsed) if parsed.is_finite() && parsed > 0.0 => parsed,
        _ => default,
    }
}

/// Parse a `.env` file: `KEY=VALUE` lines, `#` comments, optional single
/// or double quotes around the value. Missing file yields an empty map.
pub fn read_env_file(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let mut out = BTreeMap::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let mut value = value.trim();
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = &value[1..value.len() - 1];
        }
        out.insert(key.to_string(), value.to_string());
    }
    Ok(out)
}

/// Resolve settings with precedence: process environment, then the
/// `.env` file, then built-in defaults.
pub fn load_settings(env_file: Option<&Path>) -> Result<Settings, ConfigError> {
    let dotenv = match env_file {
        Some(path) => read_env_file(path)?,
        None => read_env_file(Path::new(".env"))?,
    };
    let mut process_env = BTreeMap::new();
    for (key, value) in std::env::vars() {
        process_env.insert(key, value);
    }
    Ok(settings_from_sources(&process_env, &dotenv))
}

pub fn settings_from_sources(
    process_env: &BTreeMap<String, String>,
    dotenv: &BTreeMap<String, String>,
) -> Settings {
    let get = |key: &str| -> Option<&str> {
        process_env
            .get(key)
            .or_else(|| dotenv.get(key))
            .map(|v| v.as_str())
    };

    let defaults = Settings::default();
    let retrieval_defaults = RetrievalWeightSettings::default();
    let validator_defaults = ValidatorSettings::default();

    Settings {
        debug: get("DEBUG")
            .map(DebugMode::parse)
            .unwrap_or(defaults.debug),
        data_path: get("DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_path),
        cache_enabled: parse_bool(get("CACHE_ENABLED"), defaults.cache_enabled),
        cache_default_ttl: parse_positive_u64(get("CACHE_DEFAULT_TTL"), defaults.cache_default_ttl),
        context_cache_ttl_seconds: parse_positive_u64(
            get("CONTEXT_CACHE_TTL_SECONDS"),
            defaults.context_cache_ttl_seconds,
        ),
        tool_cache_ttl_seconds: parse_positive_u64(
            get("TOOL_CACHE_TTL_SECONDS"),
            defaults.tool_cache_ttl_seconds,
        ),
        enable_pii_detection: parse_bool(get("ENABLE_PII_DETECTION"), defaults.enable_pii_detection),
        enable_pii_redaction: parse_bool(get("ENABLE_PII_REDACTION"), defaults.enable_pii_redaction),
        enable_security_audit: parse_bool(
            get("ENABLE_SECURITY_AUDIT"),
            defaults.enable_security_audit,
        ),
        enable_hybrid_retrieval: parse_bool(
            get("ENABLE_HYBRID_RETRIEVAL"),
            defaults.enable_hybrid_retrieval,
        ),
        max_transcript_messages: parse_positive_usize(
            get("MAX_TRANSCRIPT_MESSAGES"),
            defaults.max_transcript_messages,
        ),
        retrieval: RetrievalWeightSettings {
            working_relevance_weight: parse_unit_float(
                get("RETRIEVAL_WORKING_RELEVANCE_WEIGHT"),
                retrieval_defaults.working_relevance_weight,
            ),
            working_recency_weight: parse_unit_float(
                get("RETRIEVAL_WORKING_RECENCY_WEIGHT"),
                retrieval_defaults.working_recency_weight,
            ),
            semantic_relevance_weight: parse_unit_float(
                get("RETRIEVAL_SEMANTIC_RELEVANCE_WEIGHT"),
                retrieval_defaults.semantic_relevance_weight,
            ),
            semantic_recency_weight: parse_unit_float(
                get("RETRIEVAL_SEMANTIC_RECENCY_WEIGHT"),
                retrieval_defaults.semantic_recency_weight,
            ),
            episodic_relevance_weight: parse_unit_float(
                get("RETRIEVAL_EPISODIC_RELEVANCE_WEIGHT"),
                retrieval_defaults.episodic_relevance_weight,
            ),
            episodic_recency_weight: parse_unit_float(
                get("RETRIEVAL_EPISODIC_RECENCY_WEIGHT"),
                retrieval_defaults.episodic_recency_weight,
            ),
            min_final_score_threshold: parse_unit_float(
                get("RETRIEVAL_MIN_FINAL_SCORE"),
                retrieval_defaults.min_final_score_threshold,
            ),
            max_total_results: parse_positive_usize(
                get("RETRIEVAL_MAX_RESULTS"),
                retrieval_defaults.max_total_results,
            ),
            max_working_state_messages: parse_positive_usize(
                get("RETRIEVAL_MAX_WORKING_STATE_MESSAGES"),
                retrieval_defaults.max_working_state_messages,
            ),
            decay_hours: parse_positive_float(
                get("RETRIEVAL_DECAY_HOURS"),
                retrieval_defaults.decay_hours,
            ),
        },
        validator: ValidatorSettings {
            max_output_chars: parse_positive_usize(
                get("VALIDATOR_MAX_OUTPUT_CHARS"),
                validator_defaults.max_output_chars,
            ),
            forbidden_tokens: validator_defaults.forbidden_tokens,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_sources_are_empty() {
        let settings = settings_from_sources(&BTreeMap::new(), &BTreeMap::new());
        assert_eq!(settings, Settings::default());
        assert!(settings.cache_enabled);
        assert_eq!(settings.cache_default_ttl, 3600);
        assert_eq!(settings.tool_cache_ttl_seconds, 1800);
        assert!(!settings.enable_hybrid_retrieval);
    }

    #[test]
    fn process_env_overrides_dotenv() {
        let process_env = map(&[("CACHE_ENABLED", "off")]);
        let dotenv = map(&[("CACHE_ENABLED", "on"), ("CACHE_DEFAULT_TTL", "120")]);
        let settings = settings_from_sources(&process_env, &dotenv);
        assert!(!settings.cache_enabled);
        assert_eq!(settings.cache_default_ttl, 120);
    }

    #[test]
    fn boolean_forms_are_case_insensitive() {
        for raw in ["1", "TRUE", "Yes", "ON"] {
            assert!(parse_bool(Some(raw), false));
        }
        for raw in ["0", "False", "no", "OFF"] {
            assert!(!parse_bool(Some(raw), true));
        }
        assert!(parse_bool(Some("maybe"), true));
        assert!(!parse_bool(Some("maybe"), false));
    }

    #[test]
    fn debug_mode_rejects_arbitrary_host_values() {
        assert_eq!(DebugMode::parse("dev"), DebugMode::Dev);
        assert_eq!(DebugMode::parse("release"), DebugMode::Release);
        assert_eq!(DebugMode::parse("production; rm -rf"), DebugMode::Release);
    }

    #[test]
    fn invalid_retrieval_weights_fall_back_to_defaults() {
        let process_env = map(&[
            ("RETRIEVAL_WORKING_RELEVANCE_WEIGHT", "1.5"),
            ("RETRIEVAL_SEMANTIC_RELEVANCE_WEIGHT", "0.8"),
            ("RETRIEVAL_MIN_FINAL_SCORE", "nan"),
        ]);
        let settings = settings_from_sources(&process_env, &BTreeMap::new());
        assert_eq!(settings.retrieval.working_relevance_weight, 0.3);
        assert_eq!(settings.retrieval.semantic_relevance_weight, 0.8);
        assert_eq!(settings.retrieval.min_final_score_threshold, 0.0);
    }

    #[test]
    fn env_file_parsing_handles_comments_and_quotes() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "# cache tuning\nCACHE_ENABLED=false\nDATA_PATH=\"/tmp/jarvis data\"\nBROKEN LINE\n",
        )
        .expect("write env file");

        let parsed = read_env_file(&path).expect("parse env file");
        assert_eq!(parsed.get("CACHE_ENABLED").map(String::as_str), Some("false"));
        assert_eq!(
            parsed.get("DATA_PATH").map(String::as_str),
            Some("/tmp/jarvis data")
        );
        assert_eq!(parsed.len(), 2);
    }
}
