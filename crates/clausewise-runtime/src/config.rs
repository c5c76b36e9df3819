//! Runtime configuration.
//!
//! Every field has a default, so an empty YAML document (or no file at all)
//! yields a working configuration. Durations are written the human way:
//! `90s`, `5m`, `1h 30m`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use clausewise_core::{QualityThresholds, DEFAULT_MAX_TOOL_ATTEMPTS};

use crate::cache::CacheConfig;
use crate::providers::CompletionConfig;
use crate::resilience::{BudgetConfig, CircuitBreakerConfig};

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde adapter for `Duration` as a humantime string.
pub mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Routing policy for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// Parser, Clause Extractor, Risk Assessor, Summariser
    #[default]
    Fixed,

    /// Parser retries extraction tools before moving on
    Adaptive,
}

impl PipelineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineMode::Fixed => "fixed",
            PipelineMode::Adaptive => "adaptive",
        }
    }
}

impl std::fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PipelineMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" | "fixed-order" => Ok(PipelineMode::Fixed),
            "adaptive" => Ok(PipelineMode::Adaptive),
            other => Err(ConfigError::Invalid(format!("unknown pipeline mode '{}'", other))),
        }
    }
}

/// What the Clause Extractor does when it finds no clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyClausePolicy {
    /// Fail the run with `ValidationFailed`
    #[default]
    FailFast,

    /// Continue with an empty clause list
    Proceed,
}

/// An external command used as an extraction tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extra arguments appended when the tool is retried
    #[serde(default)]
    pub retry_args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            retry_args: Vec::new(),
        }
    }

    pub fn with_retry_args(mut self, args: &[&str]) -> Self {
        self.retry_args = args.iter().map(|a| a.to_string()).collect();
        self
    }
}

/// Document reader tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Upper bound for one tool invocation
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,

    /// Converter for office formats; `None` disables the tool
    pub format_command: Option<CommandSpec>,

    /// OCR engine; `None` disables the tool
    pub ocr_command: Option<CommandSpec>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            format_command: Some(CommandSpec::new("pandoc", &["-f", "docx", "-t", "plain"])),
            ocr_command: Some(
                CommandSpec::new("tesseract", &["stdin", "stdout"]).with_retry_args(&["--psm", "6"]),
            ),
        }
    }
}

/// Model-backed agent settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub completion: CompletionConfig,

    pub circuit_breaker: CircuitBreakerConfig,

    pub budget: BudgetConfig,

    pub cache: CacheConfig,
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub mode: PipelineMode,

    /// Parser tool attempts in adaptive mode
    pub max_tool_attempts: u32,

    /// Upper bound for one stage invocation
    #[serde(with = "humantime_duration")]
    pub stage_timeout: Duration,

    pub quality: QualityThresholds,

    pub empty_clauses: EmptyClausePolicy,

    /// Stage dispatches allowed per run before it is failed
    pub max_dispatches: u32,

    pub tools: ToolsConfig,

    pub llm: LlmSettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mode: PipelineMode::Fixed,
            max_tool_attempts: DEFAULT_MAX_TOOL_ATTEMPTS,
            stage_timeout: Duration::from_secs(300),
            quality: QualityThresholds::default(),
            empty_clauses: EmptyClausePolicy::FailFast,
            max_dispatches: 32,
            tools: ToolsConfig::default(),
            llm: LlmSettings::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file (`.json` files are parsed as JSON).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Reject settings no run could satisfy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tool_attempts == 0 {
            return Err(ConfigError::Invalid("max_tool_attempts must be at least 1".into()));
        }
        // Parser, three forward stages, error handler
        let Some(minimum) = self.max_tool_attempts.checked_add(4) else {
            return Err(ConfigError::Invalid(format!(
                "max_tool_attempts ({}) is too large",
                self.max_tool_attempts
            )));
        };
        if self.max_dispatches < minimum {
            return Err(ConfigError::Invalid(format!(
                "max_dispatches ({}) must be at least max_tool_attempts + 4 ({})",
                self.max_dispatches, minimum
            )));
        }
        if self.stage_timeout.is_zero() || self.tools.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&self.quality.min_printable_ratio) {
            return Err(ConfigError::Invalid(
                "quality.min_printable_ratio must be within 0.0..=1.0".into(),
            ));
        }
        Ok(())
    }

    pub fn with_mode(mut self, mode: PipelineMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_tool_attempts(mut self, attempts: u32) -> Self {
        self.max_tool_attempts = attempts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let config = RuntimeConfig::from_yaml("{}").unwrap();
        assert_eq!(config.mode, PipelineMode::Fixed);
        assert_eq!(config.max_tool_attempts, 3);
        assert_eq!(config.empty_clauses, EmptyClausePolicy::FailFast);
        assert_eq!(config.stage_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_yaml_overrides() {
        let yaml = r#"
mode: adaptive
max_tool_attempts: 5
stage_timeout: 2m
empty_clauses: proceed
quality:
  min_chars: 10
tools:
  timeout: 15s
  ocr_command: null
llm:
  completion:
    model: claude-haiku-4-5
  budget:
    run_limit: 1000
"#;
        let config = RuntimeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.mode, PipelineMode::Adaptive);
        assert_eq!(config.max_tool_attempts, 5);
        assert_eq!(config.stage_timeout, Duration::from_secs(120));
        assert_eq!(config.empty_clauses, EmptyClausePolicy::Proceed);
        assert_eq!(config.quality.min_chars, 10);
        assert_eq!(config.quality.min_printable_ratio, 0.9);
        assert_eq!(config.tools.timeout, Duration::from_secs(15));
        assert!(config.tools.ocr_command.is_none());
        assert!(config.tools.format_command.is_some());
        assert_eq!(config.llm.completion.model, "claude-haiku-4-5");
        assert_eq!(config.llm.budget.run_limit, 1000);
        assert_eq!(config.llm.budget.role_limit, 80_000);
    }

    #[test]
    fn test_json_config() {
        let config = RuntimeConfig::from_json(r#"{"mode": "adaptive", "max_tool_attempts": 2}"#)
            .unwrap();
        assert_eq!(config.mode, PipelineMode::Adaptive);
        assert_eq!(config.max_tool_attempts, 2);
    }

    #[test]
    fn test_validation_rejects_attempts_near_u32_max() {
        let err = RuntimeConfig::default()
            .with_max_tool_attempts(u32::MAX)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("too large")));

        let mut config = RuntimeConfig::default().with_max_tool_attempts(u32::MAX - 4);
        config.max_dispatches = u32::MAX;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let err = RuntimeConfig::from_yaml("max_tool_attempts: 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_validation_rejects_small_dispatch_ceiling() {
        let err = RuntimeConfig::from_yaml("max_tool_attempts: 10\nmax_dispatches: 8").unwrap_err();
        assert!(err.to_string().contains("max_dispatches"));
    }

    #[test]
    fn test_bad_duration_is_yaml_error() {
        let err = RuntimeConfig::from_yaml("stage_timeout: soon").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_duration_round_trips_as_text() {
        let yaml = serde_yaml::to_string(&RuntimeConfig::default()).unwrap();
        assert!(yaml.contains("stage_timeout: 5m"));
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("Adaptive".parse::<PipelineMode>().unwrap(), PipelineMode::Adaptive);
        assert!("random".parse::<PipelineMode>().is_err());
    }
}
