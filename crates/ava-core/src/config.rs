//! Layered settings for Ava.
//!
//! Precedence, lowest first: built-in defaults, an optional TOML file
//! (`--config` or `AVA_CONFIG`), then `.env` and the process environment.
//!
//! Environment keys use the `AVA_` prefix and `__` as the nesting delimiter,
//! e.g. `AVA_EMOTIONAL__CONFIDENCE_THRESHOLD=0.8` or
//! `AVA_MEMORY__MAX_MEMORY_AGE=120`. Keys are case-insensitive and unknown
//! keys are ignored.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "AVA_";
/// Nesting delimiter inside environment keys.
pub const ENV_NESTING: &str = "__";
/// Upper bound for `memory.max_memory_age`, in days.
pub const MAX_MEMORY_AGE_DAYS: i64 = 36_500;

/// Errors produced while loading or validating settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Parse { key: String, value: String },

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Per-hour decay applied to the emotional state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayRates {
    pub intensity: f64,
    pub valence: f64,
    pub arousal: f64,
}

impl Default for DecayRates {
    fn default() -> Self {
        Self {
            intensity: 0.1,
            valence: 0.05,
            arousal: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionalConfig {
    /// Label of the sentiment model; analysis itself is lexicon based.
    pub sentiment_model: String,
    pub decay_rates: DecayRates,
    /// Contexts below this confidence do not change the primary emotion.
    pub confidence_threshold: f64,
}

impl Default for EmotionalConfig {
    fn default() -> Self {
        Self {
            sentiment_model: "distilbert-base-uncased-finetuned-sst-2-english".to_string(),
            decay_rates: DecayRates::default(),
            confidence_threshold: 0.6,
        }
    }
}

impl EmotionalConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(invalid(
                "emotional.confidence_threshold",
                format!("{} is outside [0, 1]", self.confidence_threshold),
            ));
        }
        let rates = [
            ("emotional.decay_rates.intensity", self.decay_rates.intensity),
            ("emotional.decay_rates.valence", self.decay_rates.valence),
            ("emotional.decay_rates.arousal", self.decay_rates.arousal),
        ];
        for (field, rate) in rates {
            if !(rate > 0.0 && rate < 1.0) {
                return Err(invalid(field, format!("{rate} is outside (0, 1)")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Defaults to `<data_dir>/memories` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_dir: Option<PathBuf>,
    /// Label of the embedding model; similarity is computed lexically.
    pub embedding_model: String,
    /// Days after which unimportant memories expire.
    pub max_memory_age: i64,
    pub retrieval_limit: usize,
    pub error_log_capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            memory_dir: None,
            embedding_model: "sentence-transformers/all-mpnet-base-v2".to_string(),
            max_memory_age: 30,
            retrieval_limit: 5,
            error_log_capacity: 100,
        }
    }
}

impl MemoryConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_memory_age <= 0 {
            return Err(invalid("memory.max_memory_age", "must be positive"));
        }
        if self.max_memory_age > MAX_MEMORY_AGE_DAYS {
            return Err(invalid(
                "memory.max_memory_age",
                format!("must be at most {MAX_MEMORY_AGE_DAYS} days"),
            ));
        }
        if self.retrieval_limit == 0 {
            return Err(invalid("memory.retrieval_limit", "must be positive"));
        }
        if self.error_log_capacity == 0 {
            return Err(invalid("memory.error_log_capacity", "must be positive"));
        }
        Ok(())
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 512,
            timeout_secs: 30,
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl LlmConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid("llm.temperature", "must be within [0, 2]"));
        }
        if self.model.trim().is_empty() {
            return Err(invalid("llm.model", "must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub consolidation_interval_secs: u64,
    pub reflection_interval_secs: u64,
    pub personality_interval_secs: u64,
    pub health_check_interval_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            consolidation_interval_secs: 3600,
            reflection_interval_secs: 1800,
            personality_interval_secs: 7200,
            health_check_interval_secs: 300,
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        let intervals = [
            ("orchestrator.consolidation_interval_secs", self.consolidation_interval_secs),
            ("orchestrator.reflection_interval_secs", self.reflection_interval_secs),
            ("orchestrator.personality_interval_secs", self.personality_interval_secs),
            ("orchestrator.health_check_interval_secs", self.health_check_interval_secs),
        ];
        for (field, secs) in intervals {
            if secs == 0 {
                return Err(invalid(field, "must be positive"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub host: String,
    pub port: u16,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Complete application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub env: String,
    pub debug: bool,
    pub base_dir: PathBuf,
    /// Defaults to `<base_dir>/data` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Label only; no model inference happens on a device.
    pub device: String,
    pub batch_size: usize,
    pub log_level: String,
    pub emotional: EmotionalConfig,
    pub memory: MemoryConfig,
    pub llm: LlmConfig,
    pub orchestrator: OrchestratorConfig,
    pub admin: AdminConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: "development".to_string(),
            debug: false,
            base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            data_dir: None,
            device: "cpu".to_string(),
            batch_size: 32,
            log_level: "info".to_string(),
            emotional: EmotionalConfig::default(),
            memory: MemoryConfig::default(),
            llm: LlmConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

impl Settings {
    /// Settings rooted at `base_dir`, everything else defaulted.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Load settings from all sources.
    ///
    /// `config_file` overrides `AVA_CONFIG`. A `.env` file in the working
    /// directory is loaded first if present.
    pub fn load(config_file: Option<&Path>) -> ConfigResult<Self> {
        dotenvy::dotenv().ok();

        let file = config_file
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("AVA_CONFIG").map(PathBuf::from));

        let mut settings = match file {
            Some(path) => Self::from_toml_file(&path)?,
            None => Self::default(),
        };
        settings.apply_env(std::env::vars())?;
        settings.validate()?;

        tracing::debug!(
            env = %settings.env,
            data_dir = %settings.data_dir().display(),
            "settings loaded"
        );
        Ok(settings)
    }

    /// Defaults overlaid with the given environment pairs, then validated.
    pub fn from_vars<I, K, V>(vars: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut settings = Self::default();
        settings.apply_env(vars)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_file(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Overlay `AVA_*` environment pairs onto these settings.
    ///
    /// `OPENAI_API_KEY` is honoured when no `AVA_LLM__API_KEY` is given.
    pub fn apply_env<I, K, V>(&mut self, vars: I) -> ConfigResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut openai_key = None;
        for (key, value) in vars {
            let key = key.as_ref();
            let value = value.as_ref();
            if key.eq_ignore_ascii_case("OPENAI_API_KEY") {
                openai_key = Some(value.to_string());
                continue;
            }
            let Some(rest) = key
                .get(..ENV_PREFIX.len())
                .filter(|prefix| prefix.eq_ignore_ascii_case(ENV_PREFIX))
                .and_then(|_| key.get(ENV_PREFIX.len()..))
                .filter(|rest| !rest.is_empty())
            else {
                continue;
            };
            let path = rest.to_ascii_lowercase();
            let segments: Vec<&str> = path.split(ENV_NESTING).collect();
            self.apply_one(key, &segments, value)?;
        }
        if self.llm.api_key.is_none() {
            self.llm.api_key = openai_key.filter(|k| !k.is_empty());
        }
        Ok(())
    }

    fn apply_one(&mut self, key: &str, path: &[&str], value: &str) -> ConfigResult<()> {
        match path {
            ["env"] => self.env = value.to_string(),
            ["debug"] => self.debug = parse_bool(key, value)?,
            ["base_dir"] => self.base_dir = PathBuf::from(value),
            ["data_dir"] => self.data_dir = Some(PathBuf::from(value)),
            ["device"] => self.device = value.to_string(),
            ["batch_size"] => self.batch_size = parse(key, value)?,
            ["log_level"] => self.log_level = value.to_string(),

            ["emotional", "sentiment_model"] => self.emotional.sentiment_model = value.to_string(),
            ["emotional", "confidence_threshold"] => {
                self.emotional.confidence_threshold = parse(key, value)?
            }
            ["emotional", "decay_rates", "intensity"] => {
                self.emotional.decay_rates.intensity = parse(key, value)?
            }
            ["emotional", "decay_rates", "valence"] => {
                self.emotional.decay_rates.valence = parse(key, value)?
            }
            ["emotional", "decay_rates", "arousal"] => {
                self.emotional.decay_rates.arousal = parse(key, value)?
            }

            ["memory", "memory_dir"] => self.memory.memory_dir = Some(PathBuf::from(value)),
            ["memory", "embedding_model"] => self.memory.embedding_model = value.to_string(),
            ["memory", "max_memory_age"] => self.memory.max_memory_age = parse(key, value)?,
            ["memory", "retrieval_limit"] => self.memory.retrieval_limit = parse(key, value)?,
            ["memory", "error_log_capacity"] => {
                self.memory.error_log_capacity = parse(key, value)?
            }

            ["llm", "api_key"] => self.llm.api_key = Some(value.to_string()),
            ["llm", "base_url"] => self.llm.base_url = value.to_string(),
            ["llm", "model"] => self.llm.model = value.to_string(),
            ["llm", "temperature"] => self.llm.temperature = parse(key, value)?,
            ["llm", "max_tokens"] => self.llm.max_tokens = parse(key, value)?,
            ["llm", "timeout_secs"] => self.llm.timeout_secs = parse(key, value)?,

            ["orchestrator", "consolidation_interval_secs"] => {
                self.orchestrator.consolidation_interval_secs = parse(key, value)?
            }
            ["orchestrator", "reflection_interval_secs"] => {
                self.orchestrator.reflection_interval_secs = parse(key, value)?
            }
            ["orchestrator", "personality_interval_secs"] => {
                self.orchestrator.personality_interval_secs = parse(key, value)?
            }
            ["orchestrator", "health_check_interval_secs"] => {
                self.orchestrator.health_check_interval_secs = parse(key, value)?
            }

            ["admin", "host"] => self.admin.host = value.to_string(),
            ["admin", "port"] => self.admin.port = parse(key, value)?,

            _ => tracing::trace!(key, "ignoring unknown setting"),
        }
        Ok(())
    }

    /// Check every section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be positive"));
        }
        self.emotional.validate()?;
        self.memory.validate()?;
        self.llm.validate()?;
        self.orchestrator.validate()?;
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("data"))
    }

    pub fn memory_dir(&self) -> PathBuf {
        self.memory
            .memory_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("memories"))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.data_dir().join("models")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir().join("backups")
    }

    pub fn is_production(&self) -> bool {
        self.env.eq_ignore_ascii_case("production")
    }

    /// Create every directory the application writes into.
    pub fn setup_directories(&self) -> ConfigResult<()> {
        for dir in [
            self.data_dir(),
            self.memory_dir(),
            self.log_dir(),
            self.models_dir(),
            self.backup_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::Parse {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Parse {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_VARS: [(&str, &str); 0] = [];

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::from_vars(NO_VARS).unwrap();
        assert_eq!(settings.env, "development");
        assert!(!settings.debug);
        assert_eq!(settings.device, "cpu");
        assert_eq!(settings.batch_size, 32);
        assert_eq!(settings.data_dir(), settings.base_dir.join("data"));
    }

    #[test]
    fn test_emotional_defaults() {
        let config = EmotionalConfig::default();
        assert_eq!(
            config.sentiment_model,
            "distilbert-base-uncased-finetuned-sst-2-english"
        );
        for rate in [
            config.decay_rates.intensity,
            config.decay_rates.valence,
            config.decay_rates.arousal,
        ] {
            assert!(rate > 0.0 && rate < 1.0);
        }
        assert!((0.0..1.0).contains(&config.confidence_threshold));
    }

    #[test]
    fn test_memory_defaults() {
        let config = MemoryConfig::default();
        let model = config.embedding_model.as_str();
        assert_eq!(model, "sentence-transformers/all-mpnet-base-v2");
        assert!(config.max_memory_age > 0);
        assert!(config.retrieval_limit > 0);
    }

    #[test]
    fn test_environment_override() {
        let settings = Settings::from_vars([
            ("AVA_ENV", "production"),
            ("AVA_DEBUG", "true"),
            ("AVA_DEVICE", "cuda"),
            ("AVA_BATCH_SIZE", "64"),
            ("AVA_EMOTIONAL__CONFIDENCE_THRESHOLD", "0.8"),
            ("AVA_MEMORY__MAX_MEMORY_AGE", "120"),
            ("PATH", "/usr/bin"),
        ])
        .unwrap();

        assert_eq!(settings.env, "production");
        assert!(settings.debug);
        assert!(settings.is_production());
        assert_eq!(settings.device, "cuda");
        assert_eq!(settings.batch_size, 64);
        assert_eq!(settings.emotional.confidence_threshold, 0.8);
        assert_eq!(settings.memory.max_memory_age, 120);
    }

    #[test]
    fn test_env_keys_are_case_insensitive() {
        let settings =
            Settings::from_vars([("ava_emotional__decay_rates__valence", "0.2")]).unwrap();
        assert_eq!(settings.emotional.decay_rates.valence, 0.2);
    }

    #[test]
    fn test_openai_key_fallback() {
        let settings = Settings::from_vars([("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert_eq!(settings.llm.api_key.as_deref(), Some("sk-test"));

        let settings = Settings::from_vars([
            ("OPENAI_API_KEY", "sk-fallback"),
            ("AVA_LLM__API_KEY", "sk-primary"),
        ])
        .unwrap();
        assert_eq!(settings.llm.api_key.as_deref(), Some("sk-primary"));
    }

    #[test]
    fn test_api_key_redacted_in_debug() {
        let mut config = LlmConfig::default();
        config.api_key = Some("sk-secret".into());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_unparsable_value_rejected() {
        let err = Settings::from_vars([("AVA_BATCH_SIZE", "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let err = Settings::from_vars([("AVA_DEBUG", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_invalid_settings() {
        let config = EmotionalConfig {
            confidence_threshold: 1.5,
            ..EmotionalConfig::default()
        };
        assert!(config.validate().is_err());

        let config = MemoryConfig {
            max_memory_age: -1,
            ..MemoryConfig::default()
        };
        assert!(config.validate().is_err());

        let config = MemoryConfig {
            retrieval_limit: 0,
            ..MemoryConfig::default()
        };
        assert!(config.validate().is_err());

        let err = Settings::from_vars([("AVA_MEMORY__RETRIEVAL_LIMIT", "0")]).unwrap_err();
        assert!(err.to_string().contains("memory.retrieval_limit"));
    }

    #[test]
    fn test_memory_age_upper_bound() {
        let config = MemoryConfig {
            max_memory_age: MAX_MEMORY_AGE_DAYS,
            ..MemoryConfig::default()
        };
        assert!(config.validate().is_ok());

        let vars = [("AVA_MEMORY__MAX_MEMORY_AGE", "100000000")];
        let err = Settings::from_vars(vars).unwrap_err();
        assert!(err.to_string().contains("memory.max_memory_age"));
    }

    #[test]
    fn test_toml_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ava.toml");
        std::fs::write(
            &path,
            r#"
env = "staging"
batch_size = 16

[memory]
retrieval_limit = 9

[llm]
model = "local-model"
"#,
        )
        .unwrap();

        let mut settings = Settings::from_toml_file(&path).unwrap();
        assert_eq!(settings.env, "staging");
        assert_eq!(settings.memory.retrieval_limit, 9);
        assert_eq!(settings.llm.model, "local-model");
        // untouched sections keep their defaults
        assert_eq!(settings.emotional.confidence_threshold, 0.6);

        settings.apply_env([("AVA_BATCH_SIZE", "8")]).unwrap();
        assert_eq!(settings.batch_size, 8);
    }

    #[test]
    fn test_missing_config_file() {
        let err = Settings::from_toml_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_directory_creation() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::with_base_dir(dir.path());
        settings.data_dir = Some(dir.path().join("data"));

        settings.setup_directories().unwrap();

        assert!(settings.data_dir().exists());
        assert!(settings.memory_dir().exists());
        assert!(dir.path().join("data/logs").exists());
        assert!(dir.path().join("data/models").exists());
        assert!(dir.path().join("data/backups").exists());
    }

    #[test]
    fn test_explicit_memory_dir_wins() {
        let settings = Settings::from_vars([
            ("AVA_BASE_DIR", "/srv/ava"),
            ("AVA_MEMORY__MEMORY_DIR", "/mnt/memories"),
        ])
        .unwrap();
        assert_eq!(settings.data_dir(), PathBuf::from("/srv/ava/data"));
        assert_eq!(settings.memory_dir(), PathBuf::from("/mnt/memories"));
    }
}
