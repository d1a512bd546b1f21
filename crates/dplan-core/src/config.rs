use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs::config_dir;
use serde::{Deserialize, Serialize};

const CONFIG_DIR_NAME: &str = "dplan";
const CONFIG_FILE_NAME: &str = "config.toml";
const CURRENT_SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_ORACLE_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ORACLE_MODEL: &str = "gpt-4o";
pub const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_RECOMMENDER_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_EDITOR_TIMEOUT_SECS: u64 = 120;
pub const ORACLE_API_KEY_ENV: &str = "DPLAN_ORACLE_API_KEY";
pub const FALLBACK_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Result returned by [`load_config`], capturing the source and any non-fatal issues.
#[derive(Debug, Clone)]
pub struct ConfigLoadResult {
    pub config: PlannerConfig,
    pub warnings: Vec<String>,
    pub source: ConfigSource,
}

/// Indicates where the configuration was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// No persisted configuration was found or usable; defaults were synthesized.
    Default,
    /// Configuration was read from `config.toml`.
    File,
}

/// Errors that can occur when persisting configuration or building
/// collaborators from it.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Ser(toml::ser::Error),
    Client(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "IO error: {err}"),
            ConfigError::Ser(err) => write!(f, "TOML serialization error: {err}"),
            ConfigError::Client(err) => write!(f, "Collaborator setup error: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Ser(value)
    }
}

/// Disk-backed configuration schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "PlannerConfig::schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub recommender: EndpointConfig,
    #[serde(default)]
    pub engine: EndpointConfig,
    #[serde(default)]
    pub editor: EndpointConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            oracle: OracleConfig::default(),
            recommender: EndpointConfig::default(),
            engine: EndpointConfig::default(),
            editor: EndpointConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}

impl PlannerConfig {
    const fn schema_version() -> u32 {
        CURRENT_SCHEMA_VERSION
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle.timeout_secs)
    }

    pub fn recommender_timeout(&self) -> Duration {
        self.recommender
            .timeout(Duration::from_secs(DEFAULT_RECOMMENDER_TIMEOUT_SECS))
    }

    pub fn engine_timeout(&self) -> Duration {
        self.engine
            .timeout(Duration::from_secs(DEFAULT_ENGINE_TIMEOUT_SECS))
    }

    pub fn editor_timeout(&self) -> Duration {
        self.editor
            .timeout(Duration::from_secs(DEFAULT_EDITOR_TIMEOUT_SECS))
    }
}

/// OpenAI-compatible chat endpoint used as the decision oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "OracleConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "OracleConfig::default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "OracleConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            model: Self::default_model(),
            api_key: None,
            temperature: 0.0,
            timeout_secs: DEFAULT_ORACLE_TIMEOUT_SECS,
        }
    }
}

impl OracleConfig {
    fn default_base_url() -> String {
        DEFAULT_ORACLE_BASE_URL.to_string()
    }

    fn default_model() -> String {
        DEFAULT_ORACLE_MODEL.to_string()
    }

    const fn default_timeout_secs() -> u64 {
        DEFAULT_ORACLE_TIMEOUT_SECS
    }

    /// Configured key, then `DPLAN_ORACLE_API_KEY`, then `OPENAI_API_KEY`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .into_iter()
            .chain(env::var(ORACLE_API_KEY_ENV).ok())
            .chain(env::var(FALLBACK_API_KEY_ENV).ok())
            .map(|key| key.trim().to_string())
            .find(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointKind {
    #[default]
    Process,
    Http,
}

/// How an out-of-process collaborator is reached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub kind: EndpointKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl EndpointConfig {
    pub fn process(command: &str, args: &[&str]) -> Self {
        Self {
            kind: EndpointKind::Process,
            command: Some(command.to_string()),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn http(url: &str) -> Self {
        Self {
            kind: EndpointKind::Http,
            url: Some(url.to_string()),
            ..Self::default()
        }
    }

    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(default)
    }

    pub fn is_configured(&self) -> bool {
        match self.kind {
            EndpointKind::Process => self.command.as_deref().is_some_and(|c| !c.trim().is_empty()),
            EndpointKind::Http => self.url.as_deref().is_some_and(|u| !u.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl CatalogConfig {
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(|path| PathBuf::from(shellexpand::tilde(path).into_owned()))
    }
}

/// Represents overrides sourced from runtime inputs (CLI flags, environment).
#[derive(Debug, Default, Clone)]
pub struct RuntimeOverrides {
    pub oracle_base_url: Option<String>,
    pub oracle_model: Option<String>,
    pub oracle_api_key: Option<String>,
    pub oracle_timeout_secs: Option<u64>,
    pub recommender_command: Option<String>,
    pub recommender_url: Option<String>,
    pub engine_command: Option<String>,
    pub engine_url: Option<String>,
    pub editor_command: Option<String>,
    pub editor_url: Option<String>,
    pub catalog_path: Option<String>,
}

impl RuntimeOverrides {
    pub fn is_empty(&self) -> bool {
        self.oracle_base_url.is_none()
            && self.oracle_model.is_none()
            && self.oracle_api_key.is_none()
            && self.oracle_timeout_secs.is_none()
            && self.recommender_command.is_none()
            && self.recommender_url.is_none()
            && self.engine_command.is_none()
            && self.engine_url.is_none()
            && self.editor_command.is_none()
            && self.editor_url.is_none()
            && self.catalog_path.is_none()
    }
}

/// Path to the configuration directory.
pub fn config_directory() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Path to `config.toml`.
pub fn config_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}

/// Load the configuration, falling back to defaults.
pub fn load_config() -> ConfigLoadResult {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> ConfigLoadResult {
    let mut warnings = Vec::new();

    if path.exists() {
        match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str::<PlannerConfig>(&raw) {
                Ok(cfg) => {
                    let (cfg, mut sanitize_warnings) = sanitize_config(cfg);
                    warnings.append(&mut sanitize_warnings);
                    return ConfigLoadResult {
                        config: cfg,
                        warnings,
                        source: ConfigSource::File,
                    };
                }
                Err(err) => {
                    warnings.push(format!(
                        "Failed to parse {} as TOML: {}. Falling back to defaults.",
                        path.display(),
                        err
                    ));
                }
            },
            Err(err) => {
                warnings.push(format!(
                    "Failed to read {}: {}. Falling back to defaults.",
                    path.display(),
                    err
                ));
            }
        }
    }

    ConfigLoadResult {
        config: PlannerConfig::default(),
        warnings,
        source: ConfigSource::Default,
    }
}

/// Persist the configuration to `path`, creating its directory.
pub fn save_config_to(config: &PlannerConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let serialized = toml::to_string_pretty(config)?;
    fs::write(path, serialized)?;
    Ok(())
}

pub fn sanitize_config(mut config: PlannerConfig) -> (PlannerConfig, Vec<String>) {
    let mut warnings = Vec::new();

    if config.schema_version != CURRENT_SCHEMA_VERSION {
        warnings.push(format!(
            "Unknown config schema version {}. Resetting to {}.",
            config.schema_version, CURRENT_SCHEMA_VERSION
        ));
        return (PlannerConfig::default(), warnings);
    }

    let oracle = &mut config.oracle;
    if oracle.base_url.trim().is_empty() {
        warnings.push(format!(
            "Oracle base_url is empty. Resetting to {DEFAULT_ORACLE_BASE_URL}."
        ));
        oracle.base_url = OracleConfig::default_base_url();
    }
    if oracle.model.trim().is_empty() {
        warnings.push(format!(
            "Oracle model is empty. Resetting to {DEFAULT_ORACLE_MODEL}."
        ));
        oracle.model = OracleConfig::default_model();
    }
    if !oracle.temperature.is_finite() || !(0.0..=2.0).contains(&oracle.temperature) {
        warnings.push(format!(
            "Oracle temperature {} is outside 0.0-2.0. Resetting to 0.0.",
            oracle.temperature
        ));
        oracle.temperature = 0.0;
    }
    if oracle.timeout_secs == 0 {
        warnings.push(format!(
            "Oracle timeout_secs must be positive. Resetting to {DEFAULT_ORACLE_TIMEOUT_SECS}."
        ));
        oracle.timeout_secs = DEFAULT_ORACLE_TIMEOUT_SECS;
    }
    if oracle.api_key.as_deref().is_some_and(|key| key.trim().is_empty()) {
        oracle.api_key = None;
    }

    for (name, endpoint) in [
        ("recommender", &mut config.recommender),
        ("engine", &mut config.engine),
        ("editor", &mut config.editor),
    ] {
        sanitize_endpoint(name, endpoint, &mut warnings);
    }

    (config, warnings)
}

fn sanitize_endpoint(name: &str, endpoint: &mut EndpointConfig, warnings: &mut Vec<String>) {
    if endpoint.timeout_secs == Some(0) {
        warnings.push(format!(
            "[{name}] timeout_secs must be positive. Using the default."
        ));
        endpoint.timeout_secs = None;
    }
    match endpoint.kind {
        EndpointKind::Http if endpoint.url.as_deref().is_none_or(|u| u.trim().is_empty()) => {
            warnings.push(format!(
                "[{name}] kind is \"http\" but no url is set. The {name} is disabled."
            ));
        }
        EndpointKind::Process
            if !endpoint.args.is_empty()
                && endpoint.command.as_deref().is_none_or(|c| c.trim().is_empty()) =>
        {
            warnings.push(format!(
                "[{name}] has args but no command. The {name} is disabled."
            ));
        }
        _ => {}
    }
}

/// Merge runtime overrides into an existing configuration.
pub fn apply_runtime_overrides(
    config: &mut PlannerConfig,
    overrides: &RuntimeOverrides,
    warnings: &mut Vec<String>,
) {
    if let Some(ref value) = overrides.oracle_base_url {
        config.oracle.base_url = value.clone();
    }
    if let Some(ref value) = overrides.oracle_model {
        config.oracle.model = value.clone();
    }
    if let Some(ref value) = overrides.oracle_api_key {
        config.oracle.api_key = Some(value.clone());
    }
    if let Some(value) = overrides.oracle_timeout_secs {
        if value == 0 {
            warnings.push("Oracle timeout must be positive. Ignoring override.".to_string());
        } else {
            config.oracle.timeout_secs = value;
        }
    }

    override_endpoint(
        "recommender",
        &mut config.recommender,
        overrides.recommender_command.as_deref(),
        overrides.recommender_url.as_deref(),
        warnings,
    );
    override_endpoint(
        "engine",
        &mut config.engine,
        overrides.engine_command.as_deref(),
        overrides.engine_url.as_deref(),
        warnings,
    );
    override_endpoint(
        "editor",
        &mut config.editor,
        overrides.editor_command.as_deref(),
        overrides.editor_url.as_deref(),
        warnings,
    );

    if let Some(ref value) = overrides.catalog_path {
        config.catalog.path = Some(value.clone());
    }
}

/// A command override is a whitespace-separated command line; its first token
/// is the program and the rest replace the configured args.
fn override_endpoint(
    name: &str,
    endpoint: &mut EndpointConfig,
    command: Option<&str>,
    url: Option<&str>,
    warnings: &mut Vec<String>,
) {
    if command.is_some() && url.is_some() {
        warnings.push(format!(
            "Both a command and a url were given for the {name}. Using the url."
        ));
    }
    if let Some(url) = url {
        endpoint.kind = EndpointKind::Http;
        endpoint.url = Some(url.to_string());
        return;
    }
    if let Some(command_line) = command {
        let mut tokens = command_line.split_whitespace();
        let Some(program) = tokens.next() else {
            warnings.push(format!("Empty {name} command ignored."));
            return;
        };
        endpoint.kind = EndpointKind::Process;
        endpoint.command = Some(program.to_string());
        endpoint.args = tokens.map(str::to_string).collect();
    }
}
