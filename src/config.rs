//! Configuration types for fileferry
//!
//! All settings are plain serde structs. Validation is a separate load-time
//! pass ([`validate`]) that returns a structured list of violations rather
//! than failing on the first problem; nothing registers while any violation
//! exists. A malformed poller is the one exception: validation reports it,
//! and the trigger layer independently degrades to a fixed fallback delay.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Format for poll window times (`start_time` / `end_time`)
pub const WINDOW_TIME_FORMAT: &str = "%H:%M";

/// Parse an `HH:mm` window time
pub(crate) fn parse_window_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, WINDOW_TIME_FORMAT).ok()
}

/// One field-level validation failure
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Dotted path of the offending field (e.g., "servers[1].poller.time_zone")
    pub field: String,
    /// What is wrong with it
    pub message: String,
}

impl Violation {
    /// Create a new violation
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Polling mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollerKind {
    /// Fire at a fixed delay after the previous execution
    Fixed,
    /// Fire at an interval, but only inside a daily time window
    TimeWindow,
}

/// Poller configuration for one pipeline
///
/// Only the fields required by the declared `kind` matter; the rest are
/// ignored. A poller missing a required field falls back to
/// `fallback_fixed_delay` (or the 5 s system default) instead of firing never.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Polling mode
    pub kind: PollerKind,

    /// For fixed polling: the delay between executions
    #[serde(default, with = "option_duration_millis")]
    pub fixed_interval: Option<Duration>,

    /// For time-window polling: window start (`HH:mm`, inclusive)
    #[serde(default)]
    pub start_time: Option<String>,

    /// For time-window polling: window end (`HH:mm`, inclusive)
    #[serde(default)]
    pub end_time: Option<String>,

    /// For time-window polling: the interval inside the active window
    #[serde(default, with = "option_duration_millis")]
    pub window_interval: Option<Duration>,

    /// For time-window polling: IANA zone name (e.g., "UTC", "America/New_York")
    #[serde(default)]
    pub time_zone: Option<String>,

    /// Fixed delay used when the poller is malformed for its kind
    #[serde(default, with = "option_duration_millis")]
    pub fallback_fixed_delay: Option<Duration>,
}

impl PollerConfig {
    /// A fixed-delay poller
    pub fn fixed(interval: Duration) -> Self {
        Self {
            kind: PollerKind::Fixed,
            fixed_interval: Some(interval),
            start_time: None,
            end_time: None,
            window_interval: None,
            time_zone: None,
            fallback_fixed_delay: None,
        }
    }

    /// A time-window poller
    pub fn time_window(
        interval: Duration,
        start: impl Into<String>,
        end: impl Into<String>,
        zone: impl Into<String>,
    ) -> Self {
        Self {
            kind: PollerKind::TimeWindow,
            fixed_interval: None,
            start_time: Some(start.into()),
            end_time: Some(end.into()),
            window_interval: Some(interval),
            time_zone: Some(zone.into()),
            fallback_fixed_delay: None,
        }
    }
}

impl Default for PollerConfig {
    /// Fixed polling every 5 seconds
    fn default() -> Self {
        Self::fixed(Duration::from_millis(5000))
    }
}

/// Backoff policy for retrying processing hooks
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of total attempts, initial attempt included (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wait before the first retry (default: 1.5 seconds)
    #[serde(default = "default_initial_interval", with = "duration_millis")]
    pub initial_interval: Duration,

    /// Multiplier applied to the wait after each failed attempt (default: 2.0)
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Cap on the wait between attempts (default: 5 seconds)
    #[serde(default = "default_max_interval", with = "duration_millis")]
    pub max_interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_interval: default_initial_interval(),
            multiplier: default_multiplier(),
            max_interval: default_max_interval(),
        }
    }
}

/// What to do when the worker pool queue is full
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for a permit (default)
    #[default]
    Block,
    /// Fail the candidate for this tick only
    Reject,
}

/// Shared worker pool sizing
///
/// All pipelines dispatch accepted candidates onto one bounded pool.
/// `max_pool_size` bounds concurrent workers; `queue_capacity` bounds how
/// many candidates may wait for a permit when the policy is `reject`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Baseline worker count kept warm (default: 10)
    ///
    /// Tokio schedules tasks on its own runtime threads, so this collapses
    /// into documentation of expected steady-state parallelism; the hard
    /// bound is `max_pool_size`.
    #[serde(default = "default_core_pool_size")]
    pub core_pool_size: usize,

    /// Maximum concurrent candidate workers (default: 20)
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,

    /// Waiting-candidate capacity under the `reject` policy (default: 100)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Behavior when the pool and queue are both full
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            core_pool_size: default_core_pool_size(),
            max_pool_size: default_max_pool_size(),
            queue_capacity: default_queue_capacity(),
            overflow: OverflowPolicy::default(),
        }
    }
}

/// Data storage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path of the SQLite metadata store used by the persistent dedup filter
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// One remote server channel
///
/// Which pipelines run for a server is decided by which remote paths are
/// present: `from` enables download, `to` enables upload, `archive` enables
/// archive. At least one must be set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerChannelConfig {
    /// Unique server identifier
    pub name: String,

    /// Remote host address
    pub host: String,

    /// Remote port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Password for authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Content or path of the private key, for key-based authentication
    #[serde(default)]
    pub private_key: Option<String>,

    /// Passphrase for the private key
    #[serde(default)]
    pub private_key_passphrase: Option<String>,

    /// Remote directory files are downloaded from; enables the download pipeline
    #[serde(default)]
    pub from: Option<String>,

    /// Remote directory files are uploaded to; enables the upload pipeline
    #[serde(default)]
    pub to: Option<String>,

    /// Remote directory files are archived into; enables the archive pipeline
    #[serde(default)]
    pub archive: Option<String>,

    /// Override for the local download staging directory
    #[serde(default)]
    pub local_download_dir: Option<PathBuf>,

    /// Override for the local upload staging directory
    #[serde(default)]
    pub local_upload_dir: Option<PathBuf>,

    /// Override for the local archive trigger directory
    #[serde(default)]
    pub local_archive_dir: Option<PathBuf>,

    /// Delete remote files after a successful download transfer
    #[serde(default)]
    pub delete_after_download: bool,

    /// Install the dedup filter so each candidate identity is processed once
    #[serde(default)]
    pub enable_metadata_store: bool,

    /// Regex over candidate names; only matches are processed
    #[serde(default)]
    pub file_pattern: Option<String>,

    /// Minimum candidate size in bytes (inclusive)
    #[serde(default)]
    pub min_file_size: Option<u64>,

    /// Maximum candidate size in bytes (inclusive)
    #[serde(default)]
    pub max_file_size: Option<u64>,

    /// Per-server poller override
    #[serde(default)]
    pub poller: Option<PollerConfig>,

    /// Per-server retry override
    #[serde(default)]
    pub retry: Option<RetryConfig>,

    /// Cached-session bound for this server's session pool (default: 10)
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

impl ServerChannelConfig {
    /// A minimal config for the given server name and host, with every
    /// direction disabled
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: default_port(),
            username: None,
            password: None,
            private_key: None,
            private_key_passphrase: None,
            from: None,
            to: None,
            archive: None,
            local_download_dir: None,
            local_upload_dir: None,
            local_archive_dir: None,
            delete_after_download: false,
            enable_metadata_store: false,
            file_pattern: None,
            min_file_size: None,
            max_file_size: None,
            poller: None,
            retry: None,
            cache_size: default_cache_size(),
        }
    }

    /// Directions enabled by this server's remote paths
    pub fn enabled_directions(&self) -> Vec<crate::types::Direction> {
        use crate::types::Direction;
        let mut dirs = Vec::new();
        if self.from.is_some() {
            dirs.push(Direction::Download);
        }
        if self.to.is_some() {
            dirs.push(Direction::Upload);
        }
        if self.archive.is_some() {
            dirs.push(Direction::Archive);
        }
        dirs
    }
}

/// Root configuration for the transfer engine
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Base directory for local staging/trigger directories
    /// (`{local_dir}/{direction}/{server}` unless overridden per server)
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,

    /// Poller used by pipelines without a per-server override
    #[serde(default)]
    pub default_poller: PollerConfig,

    /// Retry policy used by pipelines without a per-server override
    #[serde(default)]
    pub default_retry: RetryConfig,

    /// Shared worker pool sizing
    #[serde(default)]
    pub throughput: WorkerPoolConfig,

    /// Data storage and state management
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Remote server channels
    #[serde(default)]
    pub servers: Vec<ServerChannelConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_dir: default_local_dir(),
            default_poller: PollerConfig::default(),
            default_retry: RetryConfig::default(),
            throughput: WorkerPoolConfig::default(),
            persistence: PersistenceConfig::default(),
            servers: Vec::new(),
        }
    }
}

impl Config {
    /// Validate, turning any violations into [`Error::Validation`]
    pub fn validated(self) -> Result<Self> {
        let violations = validate(&self);
        if violations.is_empty() {
            Ok(self)
        } else {
            Err(Error::Validation { violations })
        }
    }
}

/// Validate the whole configuration, collecting every field-level violation
///
/// Runs once at load time, before any pipeline is constructed.
pub fn validate(config: &Config) -> Vec<Violation> {
    let mut violations = Vec::new();

    validate_poller(&config.default_poller, "default_poller", &mut violations);
    validate_retry(&config.default_retry, "default_retry", &mut violations);
    validate_throughput(&config.throughput, &mut violations);

    let mut seen_names = std::collections::HashSet::new();
    for (idx, server) in config.servers.iter().enumerate() {
        let prefix = format!("servers[{idx}]");
        validate_server(server, &prefix, &mut violations);
        if !server.name.trim().is_empty() && !seen_names.insert(server.name.as_str()) {
            violations.push(Violation::new(
                format!("{prefix}.name"),
                format!("duplicate server name '{}'", server.name),
            ));
        }
    }

    violations
}

fn validate_server(server: &ServerChannelConfig, prefix: &str, violations: &mut Vec<Violation>) {
    if server.name.trim().is_empty() {
        violations.push(Violation::new(
            format!("{prefix}.name"),
            "server name must not be blank",
        ));
    }
    if server.host.trim().is_empty() {
        violations.push(Violation::new(
            format!("{prefix}.host"),
            "server host must not be blank",
        ));
    }
    if server.port == 0 {
        violations.push(Violation::new(
            format!("{prefix}.port"),
            "server port must be greater than 0",
        ));
    }
    if server.from.is_none() && server.to.is_none() && server.archive.is_none() {
        violations.push(Violation::new(
            prefix.to_string(),
            "at least one of from/to/archive must be set",
        ));
    }
    // The archive pipeline renames remote files out of the `from` directory,
    // so it cannot run without one.
    if server.archive.is_some() && server.from.is_none() {
        violations.push(Violation::new(
            format!("{prefix}.archive"),
            "archive requires from, which locates the remote source file",
        ));
    }
    if let Some(pattern) = &server.file_pattern
        && let Err(e) = regex::Regex::new(pattern)
    {
        violations.push(Violation::new(
            format!("{prefix}.file_pattern"),
            format!("invalid regex: {e}"),
        ));
    }
    if let Some(max) = server.max_file_size {
        if max == 0 {
            violations.push(Violation::new(
                format!("{prefix}.max_file_size"),
                "maximum file size must be greater than 0",
            ));
        }
        if let Some(min) = server.min_file_size
            && min > max
        {
            violations.push(Violation::new(
                format!("{prefix}.min_file_size"),
                "minimum file size must not exceed maximum file size",
            ));
        }
    }
    if server.cache_size == 0 {
        violations.push(Violation::new(
            format!("{prefix}.cache_size"),
            "cache size must be at least 1",
        ));
    }
    if let Some(poller) = &server.poller {
        validate_poller(poller, &format!("{prefix}.poller"), violations);
    }
    if let Some(retry) = &server.retry {
        validate_retry(retry, &format!("{prefix}.retry"), violations);
    }
}

fn validate_poller(poller: &PollerConfig, prefix: &str, violations: &mut Vec<Violation>) {
    match poller.kind {
        PollerKind::Fixed => {
            if poller.fixed_interval.is_none_or(|i| i < Duration::from_millis(1)) {
                violations.push(Violation::new(
                    format!("{prefix}.fixed_interval"),
                    "for fixed polling, fixed_interval must be provided and be at least 1 millisecond",
                ));
            }
        }
        PollerKind::TimeWindow => {
            match &poller.start_time {
                None => violations.push(Violation::new(
                    format!("{prefix}.start_time"),
                    "for time-window polling, start_time must be provided",
                )),
                Some(s) if parse_window_time(s).is_none() => violations.push(Violation::new(
                    format!("{prefix}.start_time"),
                    format!("start_time must match {WINDOW_TIME_FORMAT}"),
                )),
                Some(_) => {}
            }
            match &poller.end_time {
                None => violations.push(Violation::new(
                    format!("{prefix}.end_time"),
                    "for time-window polling, end_time must be provided",
                )),
                Some(s) if parse_window_time(s).is_none() => violations.push(Violation::new(
                    format!("{prefix}.end_time"),
                    format!("end_time must match {WINDOW_TIME_FORMAT}"),
                )),
                Some(_) => {}
            }
            if poller.window_interval.is_none_or(|i| i < Duration::from_millis(1)) {
                violations.push(Violation::new(
                    format!("{prefix}.window_interval"),
                    "for time-window polling, window_interval must be provided and be at least 1 millisecond",
                ));
            }
            match &poller.time_zone {
                None => violations.push(Violation::new(
                    format!("{prefix}.time_zone"),
                    "for time-window polling, time_zone must be provided",
                )),
                Some(z) if z.parse::<chrono_tz::Tz>().is_err() => violations.push(Violation::new(
                    format!("{prefix}.time_zone"),
                    format!("unknown time zone '{z}'"),
                )),
                Some(_) => {}
            }
        }
    }
    if let Some(delay) = poller.fallback_fixed_delay
        && delay < Duration::from_millis(1)
    {
        violations.push(Violation::new(
            format!("{prefix}.fallback_fixed_delay"),
            "fallback fixed delay must be at least 1 millisecond if provided",
        ));
    }
}

fn validate_retry(retry: &RetryConfig, prefix: &str, violations: &mut Vec<Violation>) {
    if retry.max_attempts < 1 {
        violations.push(Violation::new(
            format!("{prefix}.max_attempts"),
            "max attempts must be at least 1",
        ));
    }
    if retry.initial_interval < Duration::from_millis(1) {
        violations.push(Violation::new(
            format!("{prefix}.initial_interval"),
            "initial retry interval must be at least 1 millisecond",
        ));
    }
    if retry.multiplier <= 0.0 || !retry.multiplier.is_finite() {
        violations.push(Violation::new(
            format!("{prefix}.multiplier"),
            "multiplier must be a positive finite number",
        ));
    }
    if retry.max_interval < Duration::from_millis(1) {
        violations.push(Violation::new(
            format!("{prefix}.max_interval"),
            "max retry interval must be at least 1 millisecond",
        ));
    }
}

fn validate_throughput(throughput: &WorkerPoolConfig, violations: &mut Vec<Violation>) {
    if throughput.core_pool_size < 1 {
        violations.push(Violation::new(
            "throughput.core_pool_size",
            "core pool size must be at least 1",
        ));
    }
    if throughput.max_pool_size < 1 {
        violations.push(Violation::new(
            "throughput.max_pool_size",
            "maximum pool size must be at least 1",
        ));
    }
    if throughput.max_pool_size < throughput.core_pool_size {
        violations.push(Violation::new(
            "throughput.max_pool_size",
            "maximum pool size must not be below core pool size",
        ));
    }
    if throughput.queue_capacity < 1 {
        violations.push(Violation::new(
            "throughput.queue_capacity",
            "queue capacity must be at least 1",
        ));
    }
}

fn default_port() -> u16 {
    22
}

fn default_cache_size() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_interval() -> Duration {
    Duration::from_millis(1500)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_interval() -> Duration {
    Duration::from_millis(5000)
}

fn default_core_pool_size() -> usize {
    10
}

fn default_max_pool_size() -> usize {
    20
}

fn default_queue_capacity() -> usize {
    100
}

fn default_local_dir() -> PathBuf {
    PathBuf::from("./staging")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./fileferry.db")
}

/// Serde module for `Duration` as integer milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Serde module for `Option<Duration>` as integer milliseconds
mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
