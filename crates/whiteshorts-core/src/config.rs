// Configuration loading and parsing (broadcast.toml, credentials.toml, env).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("unknown backend `{name}` (expected supabase, webhook, file or sqlite)")]
    UnknownBackend { name: String },

    #[error("backend `{backend}` requires `{name}` but it is not set")]
    MissingCredential { backend: Backend, name: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

/// Where the processed payload is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Supabase / PostgREST upsert.
    Supabase,
    Webhook,
    File,
    Sqlite,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Supabase => "supabase",
            Backend::Webhook => "webhook",
            Backend::File => "file",
            Backend::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "supabase" | "rest" => Ok(Backend::Supabase),
            "webhook" => Ok(Backend::Webhook),
            "file" => Ok(Backend::File),
            "sqlite" => Ok(Backend::Sqlite),
            _ => Err(ConfigError::UnknownBackend {
                name: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline settings
// ---------------------------------------------------------------------------

/// Inclusive numeric bounds; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(default)]
    pub lo: Option<f64>,
    #[serde(default)]
    pub hi: Option<f64>,
}

impl Bounds {
    pub fn new(lo: Option<f64>, hi: Option<f64>) -> Self {
        Self { lo, hi }
    }

    pub fn at_least(lo: f64) -> Self {
        Self { lo: Some(lo), hi: None }
    }

    pub fn at_most(hi: f64) -> Self {
        Self { lo: None, hi: Some(hi) }
    }

    pub fn between(lo: f64, hi: f64) -> Self {
        Self {
            lo: Some(lo),
            hi: Some(hi),
        }
    }

    /// Whether `value` lies within the bounds. NaN is never contained.
    pub fn contains(&self, value: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        self.lo.map_or(true, |lo| lo <= value) && self.hi.map_or(true, |hi| value <= hi)
    }

    /// Clamp `value` into the bounds.
    pub fn clamp(&self, value: f64) -> f64 {
        let mut v = value;
        if let Some(lo) = self.lo {
            v = v.max(lo);
        }
        if let Some(hi) = self.hi {
            v = v.min(hi);
        }
        v
    }
}

/// Column name -> bounds.
pub type RangeMap = BTreeMap<String, Bounds>;

fn default_pred_col() -> String {
    "lambda_or_mu".into()
}

fn default_q10_col() -> String {
    "q10".into()
}

fn default_q90_col() -> String {
    "q90".into()
}

fn default_out_col() -> String {
    "elfies_number".into()
}

fn default_group_by() -> Vec<String> {
    vec!["team".into()]
}

fn default_top_k() -> usize {
    4
}

/// One elfies-number computation followed by a per-group top-K cut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingPass {
    /// Bounds applied right before this pass.
    #[serde(default)]
    pub pre_filter: RangeMap,
    #[serde(default = "default_pred_col")]
    pub pred_col: String,
    #[serde(default = "default_q10_col")]
    pub q10_col: String,
    #[serde(default = "default_q90_col")]
    pub q90_col: String,
    #[serde(default = "default_out_col")]
    pub out_col: String,
    #[serde(default = "default_group_by")]
    pub group_by: Vec<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub keep_ties: bool,
}

impl Default for RankingPass {
    fn default() -> Self {
        Self {
            pre_filter: RangeMap::new(),
            pred_col: default_pred_col(),
            q10_col: default_q10_col(),
            q90_col: default_q90_col(),
            out_col: default_out_col(),
            group_by: default_group_by(),
            top_k: default_top_k(),
            keep_ties: false,
        }
    }
}

/// Everything the post-processing pipeline needs, resolved up front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Raw column name -> canonical name, applied before snake-casing.
    pub rename_map: BTreeMap<String, String>,
    pub required_cols: Vec<String>,
    /// Columns rendered as digit strings (`123.0` -> `"123"`).
    pub id_cols: Vec<String>,
    /// Early plausibility bounds, applied before any ranking pass.
    pub plausibility: RangeMap,
    /// Numeric columns clamped into bounds before ranking.
    pub clip: RangeMap,
    pub ranking: Vec<RankingPass>,
    /// Bounds applied after the last ranking pass.
    pub post_rank: RangeMap,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rename_map: BTreeMap::new(),
            required_cols: Vec::new(),
            id_cols: vec!["player_id".into(), "game_id".into()],
            plausibility: RangeMap::new(),
            clip: RangeMap::new(),
            ranking: vec![RankingPass::default()],
            post_rank: RangeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Publish settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RestConfig {
    pub url: String,
    pub key: String,
    pub table: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SqliteConfig {
    pub path: String,
    #[serde(default = "default_sqlite_table")]
    pub table: String,
}

fn default_sqlite_table() -> String {
    "broadcast_rows".into()
}

/// Resolved publish settings for the selected backend.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishConfig {
    pub backend: Backend,
    /// Composite conflict key for upserting backends.
    pub upsert_on: Vec<String>,
    pub timeout_secs: u64,
    pub rest: RestConfig,
    pub webhook: WebhookConfig,
    pub file: FileConfig,
    pub sqlite: SqliteConfig,
}

// ---------------------------------------------------------------------------
// credentials.toml
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Top-level assembled config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub publish: PublishConfig,
    pub pipeline: PipelineConfig,
}

// ---------------------------------------------------------------------------
// broadcast.toml raw structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct BroadcastFile {
    publish: PublishSection,
    #[serde(default)]
    pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct PublishSection {
    backend: String,
    #[serde(default = "default_upsert_on")]
    upsert_on: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default)]
    rest: RestSection,
    #[serde(default)]
    webhook: WebhookConfig,
    #[serde(default = "default_file_section")]
    file: FileConfig,
    #[serde(default = "default_sqlite_section")]
    sqlite: SqliteConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct RestSection {
    #[serde(default)]
    url: String,
    #[serde(default = "default_rest_table")]
    table: String,
}

impl Default for RestSection {
    fn default() -> Self {
        Self {
            url: String::new(),
            table: default_rest_table(),
        }
    }
}

fn default_upsert_on() -> Vec<String> {
    vec!["date".into(), "player_id".into(), "target".into()]
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_rest_table() -> String {
    "predictions_for_broadcast".into()
}

fn default_file_section() -> FileConfig {
    FileConfig {
        path: PathBuf::from("predictions_for_broadcast_payload.json"),
    }
}

fn default_sqlite_section() -> SqliteConfig {
    SqliteConfig {
        path: "broadcast.db".into(),
        table: default_sqlite_table(),
    }
}

// ---------------------------------------------------------------------------
// Overrides (environment / command line)
// ---------------------------------------------------------------------------

/// Values that take precedence over the config files. Read once at the
/// entry point and never consulted again.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub backend: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub supabase_table: Option<String>,
    pub webhook_url: Option<String>,
}

impl Overrides {
    /// Collect overrides from the process environment. Empty variables are
    /// treated as unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Collect overrides through an arbitrary lookup (used by tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            backend: get("WS_BACKEND"),
            supabase_url: get("SUPABASE_URL"),
            supabase_key: get("SUPABASE_SERVICE_KEY"),
            supabase_table: get("SUPABASE_TABLE"),
            webhook_url: get("WS_WEBHOOK_URL"),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/broadcast.toml` and
/// (optionally) `config/credentials.toml` under `base_dir`, with
/// `overrides` applied on top.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub fn load_config_from(base_dir: &Path, overrides: &Overrides) -> Result<BroadcastConfig, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- broadcast.toml (required) ---
    let broadcast_path = config_dir.join("broadcast.toml");
    let broadcast_text = read_file(&broadcast_path)?;
    let file: BroadcastFile =
        toml::from_str(&broadcast_text).map_err(|e| ConfigError::ParseError {
            path: broadcast_path.clone(),
            source: e,
        })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials: CredentialsConfig = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = resolve(file, credentials, overrides)?;
    validate(&config)?;
    debug!(
        "config loaded from {}: backend={}, {} ranking passes",
        config_dir.display(),
        config.publish.backend,
        config.pipeline.ranking.len()
    );
    Ok(config)
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures default config files are copied before loading.
pub fn load_config(overrides: &Overrides) -> Result<BroadcastConfig, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    load_config_in(&cwd, overrides)
}

/// Copy missing defaults into `base_dir/config`, then load from there.
pub fn load_config_in(base_dir: &Path, overrides: &Overrides) -> Result<BroadcastConfig, ConfigError> {
    ensure_config_files(base_dir)?;
    load_config_from(base_dir, overrides)
}

fn copy_error(message: String) -> ConfigError {
    ConfigError::DefaultsCopyError { message }
}

/// `*.toml` files under `defaults/`, sorted by name. Templates such as
/// `credentials.toml.example` do not match.
fn default_toml_files(defaults_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = std::fs::read_dir(defaults_dir)
        .map_err(|e| copy_error(format!("failed to read {}: {e}", defaults_dir.display())))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| copy_error(format!("failed to read defaults entry: {e}")))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Copy `source` to `target` unless `target` already exists. Returns
/// whether a copy happened. The target is opened with `create_new`, so an
/// existing file is never overwritten.
fn copy_if_absent(source: &Path, target: &Path) -> Result<bool, ConfigError> {
    let mut dest = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
    {
        Ok(dest) => dest,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(copy_error(format!("failed to create {}: {e}", target.display()))),
    };
    let mut src = std::fs::File::open(source)
        .map_err(|e| copy_error(format!("failed to read {}: {e}", source.display())))?;
    std::io::copy(&mut src, &mut dest)
        .map_err(|e| copy_error(format!("failed to write {}: {e}", target.display())))?;
    Ok(true)
}

/// Seed `base_dir/config` with every `defaults/*.toml` it lacks and return
/// the files written. Existing files are never touched, so local edits to
/// `broadcast.toml` survive. Without `defaults/`, an existing `config/` is
/// used as is.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.is_dir() {
        if config_dir.is_dir() {
            return Ok(Vec::new());
        }
        return Err(copy_error(format!(
            "no defaults/ or config/ in {}; run from the directory holding \
             defaults/broadcast.toml or pass --config-dir",
            base_dir.display()
        )));
    }

    std::fs::create_dir_all(&config_dir)
        .map_err(|e| copy_error(format!("failed to create {}: {e}", config_dir.display())))?;

    let mut copied = Vec::new();
    for source in default_toml_files(&defaults_dir)? {
        let Some(name) = source.file_name() else {
            continue;
        };
        let target = config_dir.join(name);
        if copy_if_absent(&source, &target)? {
            info!("seeded {} from {}", target.display(), source.display());
            copied.push(target);
        }
    }
    Ok(copied)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

/// Merge file values, credentials and overrides. Precedence: overrides,
/// then credentials.toml, then broadcast.toml.
fn resolve(
    file: BroadcastFile,
    credentials: CredentialsConfig,
    overrides: &Overrides,
) -> Result<BroadcastConfig, ConfigError> {
    let section = file.publish;
    let backend: Backend = overrides
        .backend
        .as_deref()
        .unwrap_or(&section.backend)
        .parse()?;

    let rest = RestConfig {
        url: overrides
            .supabase_url
            .clone()
            .or(credentials.supabase_url)
            .unwrap_or(section.rest.url),
        key: overrides
            .supabase_key
            .clone()
            .or(credentials.supabase_key)
            .unwrap_or_default(),
        table: overrides
            .supabase_table
            .clone()
            .unwrap_or(section.rest.table),
    };

    let mut webhook = section.webhook;
    if let Some(url) = &overrides.webhook_url {
        webhook.url = url.clone();
    }

    Ok(BroadcastConfig {
        publish: PublishConfig {
            backend,
            upsert_on: section.upsert_on,
            timeout_secs: section.timeout_secs,
            rest,
            webhook,
            file: section.file,
            sqlite: section.sqlite,
        },
        pipeline: file.pipeline,
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &BroadcastConfig) -> Result<(), ConfigError> {
    let publish = &config.publish;

    if publish.timeout_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "publish.timeout_secs".into(),
            message: "must be greater than 0".into(),
        });
    }

    match publish.backend {
        Backend::Supabase => {
            if publish.rest.url.trim().is_empty() {
                return Err(ConfigError::MissingCredential {
                    backend: Backend::Supabase,
                    name: "SUPABASE_URL".into(),
                });
            }
            if publish.rest.key.trim().is_empty() {
                return Err(ConfigError::MissingCredential {
                    backend: Backend::Supabase,
                    name: "SUPABASE_SERVICE_KEY".into(),
                });
            }
            require_upsert_key(publish)?;
        }
        Backend::Webhook => {
            if publish.webhook.url.trim().is_empty() {
                return Err(ConfigError::MissingCredential {
                    backend: Backend::Webhook,
                    name: "WS_WEBHOOK_URL".into(),
                });
            }
        }
        Backend::Sqlite => require_upsert_key(publish)?,
        Backend::File => {}
    }

    validate_pipeline(&config.pipeline)
}

fn require_upsert_key(publish: &PublishConfig) -> Result<(), ConfigError> {
    if publish.upsert_on.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "publish.upsert_on".into(),
            message: format!("backend `{}` needs at least one key column", publish.backend),
        });
    }
    Ok(())
}

/// Check bound pairs and ranking passes. Exposed so callers that build a
/// `PipelineConfig` in code get the same checks as file-loaded configs.
pub fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
    check_ranges("pipeline.plausibility", &pipeline.plausibility)?;
    check_ranges("pipeline.clip", &pipeline.clip)?;
    check_ranges("pipeline.post_rank", &pipeline.post_rank)?;

    for (i, pass) in pipeline.ranking.iter().enumerate() {
        let prefix = format!("pipeline.ranking[{i}]");
        check_ranges(&format!("{prefix}.pre_filter"), &pass.pre_filter)?;
        if pass.group_by.is_empty() || pass.group_by.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::ValidationError {
                field: format!("{prefix}.group_by"),
                message: "must name at least one non-empty column".into(),
            });
        }
        if pass.out_col.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: format!("{prefix}.out_col"),
                message: "must not be empty".into(),
            });
        }
    }
    Ok(())
}

fn check_ranges(prefix: &str, ranges: &RangeMap) -> Result<(), ConfigError> {
    for (column, bounds) in ranges {
        let bad = [bounds.lo, bounds.hi].iter().flatten().any(|v| v.is_nan());
        if bad {
            return Err(ConfigError::ValidationError {
                field: format!("{prefix}.{column}"),
                message: "bounds must be numbers".into(),
            });
        }
        if let (Some(lo), Some(hi)) = (bounds.lo, bounds.hi) {
            if lo > hi {
                return Err(ConfigError::ValidationError {
                    field: format!("{prefix}.{column}"),
                    message: format!("lo ({lo}) must not exceed hi ({hi})"),
                });
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
