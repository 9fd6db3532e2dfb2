//! # Perfmon Engine - Real-Time Performance Monitoring Core
//!
//! A concurrent metrics collection and analysis core for monitoring the
//! latency, throughput, and resource usage of a running data-processing
//! workload.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          PERFMON ENGINE                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  PRODUCERS → METRIC BUFFER → SNAPSHOT → ANALYZER → REPORT/ISSUES        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Producers record timestamped samples into per-category rolling windows
//! without coordinating with each other; an analysis driver periodically takes
//! a consistent snapshot and derives statistics, threshold breaches, trends,
//! and before/after impact verdicts from it. Analysis never mutates the
//! buffer, and the buffer's fixed capacity bounds memory regardless of the
//! producer rate.
//!
//! ## Features
//!
//! - **Non-blocking writes**: one short per-category critical section
//! - **Fixed memory**: strict FIFO eviction once a window reaches capacity
//! - **Consistent reads**: snapshots never observe a partially written sample
//! - **Heuristic analysis**: percentile stats, threshold issues, trend and
//!   impact classification over noisy series

// ============================================================================
// SECTION 1: IMPORTS & DEPENDENCIES
// ============================================================================
// All external crate imports organized by functionality.
// ============================================================================

#![allow(dead_code)]
#![allow(unused_imports)]
#![warn(rust_2018_idioms)]
#![warn(missing_debug_implementations)]

// ----------------------------------------------------------------------------
// Standard Library Imports
// ----------------------------------------------------------------------------
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::fmt::{self, Debug, Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

// ----------------------------------------------------------------------------
// Async Runtime - Tokio
// ----------------------------------------------------------------------------
use tokio::signal;
use tokio::sync::Notify;
use tokio::task::JoinHandle as TokioJoinHandle;
use tokio::time::interval;

// ----------------------------------------------------------------------------
// Concurrency Primitives - Crossbeam & Parking Lot
// ----------------------------------------------------------------------------
use arc_swap::ArcSwap;
use crossbeam::utils::CachePadded;
use crossbeam_channel::{bounded, Receiver as CrossbeamReceiver, Sender as CrossbeamSender};
use parking_lot::Mutex;

// ----------------------------------------------------------------------------
// Serialization
// ----------------------------------------------------------------------------
use serde::{Deserialize, Serialize};
use serde_json::json;

// ----------------------------------------------------------------------------
// String & Memory Optimization
// ----------------------------------------------------------------------------
use compact_str::CompactString;
use smallvec::{smallvec, SmallVec};

// ----------------------------------------------------------------------------
// Error Handling
// ----------------------------------------------------------------------------
use anyhow::{Context as AnyhowContext, Result as AnyhowResult};
use thiserror::Error;

// ----------------------------------------------------------------------------
// Logging & Tracing
// ----------------------------------------------------------------------------
use tracing::{debug, error, info, trace, warn, Level};
use tracing_subscriber::{
    fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

// ----------------------------------------------------------------------------
// Time & Timestamps
// ----------------------------------------------------------------------------
use chrono::{DateTime, Utc};

// ----------------------------------------------------------------------------
// Statistics & Math
// ----------------------------------------------------------------------------
use ordered_float::OrderedFloat;

// ----------------------------------------------------------------------------
// Randomness (workload simulation)
// ----------------------------------------------------------------------------
use rand::Rng;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};

// ----------------------------------------------------------------------------
// CLI
// ----------------------------------------------------------------------------
use clap::{Parser, Subcommand};

// ============================================================================
// SECTION 2: CONSTANTS & VERSION INFORMATION
// ============================================================================
// Global constants that define the behavior and limits of the monitor.
// ============================================================================

/// Engine version - follows semantic versioning
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ENGINE_NAME: &str = "perfmon-engine";
pub const ENGINE_FULL_NAME: &str = "Perfmon Performance Monitor";

// ----------------------------------------------------------------------------
// Buffer Sizes
// ----------------------------------------------------------------------------

/// Default capacity for each per-category metric window
pub const DEFAULT_WINDOW_CAPACITY: usize = 10_000;

/// Minimum allowed window capacity
pub const MIN_WINDOW_CAPACITY: usize = 16;

/// Number of metric categories (fixed by the `MetricCategory` enum)
pub const CATEGORY_COUNT: usize = 5;

/// Capacity of the simulator's event queue (generator -> processors)
pub const SIMULATOR_QUEUE_CAPACITY: usize = 65_536;

// ----------------------------------------------------------------------------
// Timing & Intervals
// ----------------------------------------------------------------------------

/// Default interval between synthetic resource samples (milliseconds)
pub const DEFAULT_COLLECTION_INTERVAL_MS: u64 = 1000;

/// Default interval between analysis cycles (seconds)
pub const DEFAULT_ANALYSIS_INTERVAL_SECS: u64 = 60;

/// Minimum allowed analysis interval (seconds)
pub const MIN_ANALYSIS_INTERVAL_SECS: u64 = 1;

/// Default simulation duration (seconds)
pub const DEFAULT_SIMULATION_DURATION_SECS: u64 = 300;

// ----------------------------------------------------------------------------
// Analysis Defaults
// ----------------------------------------------------------------------------

/// Breach ratio at which a threshold issue escalates from Warning to Critical
pub const CRITICAL_BREACH_RATIO: f64 = 1.2;

/// Percent-change band inside which a trend is classified Stable
pub const DEFAULT_STABLE_THRESHOLD_PCT: f64 = 5.0;

/// Percent-change below which an impact comparison is not significant
pub const DEFAULT_SIGNIFICANCE_PCT: f64 = 5.0;

/// Minimum samples for a trend classification
pub const MIN_TREND_SAMPLES: usize = 2;

// ----------------------------------------------------------------------------
// Threshold Defaults (mirroring the stock monitoring profile)
// ----------------------------------------------------------------------------

/// Default upper bound on mean CPU usage (percent)
pub const DEFAULT_CPU_THRESHOLD: f64 = 80.0;

/// Default upper bound on mean memory usage (percent)
pub const DEFAULT_MEMORY_THRESHOLD: f64 = 85.0;

/// Default upper bound on p95 latency (milliseconds)
pub const DEFAULT_LATENCY_P95_THRESHOLD_MS: f64 = 1000.0;

/// Default lower bound on mean throughput (events per second)
pub const DEFAULT_MIN_THROUGHPUT: f64 = 100.0;

// ============================================================================
// SECTION 3: CORE TYPE SYSTEM
// ============================================================================
// The fundamental data types that represent every observation flowing through
// the monitor. Samples are immutable after creation; everything derived from
// them (snapshots, stats, issues) is computed, never mutated in place.
// ============================================================================

// ----------------------------------------------------------------------------
// 3.1 Timestamp - Nanosecond Precision Time Handling
// ----------------------------------------------------------------------------

/// High-precision timestamp in nanoseconds since Unix epoch.
/// Using i64 allows representing times from ~1677 to ~2262.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Create a new timestamp from nanoseconds since Unix epoch
    #[inline]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Create a new timestamp from milliseconds since Unix epoch
    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis * 1_000_000)
    }

    /// Create a new timestamp from seconds since Unix epoch
    #[inline]
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs * 1_000_000_000)
    }

    /// Get the current timestamp with nanosecond precision
    #[inline]
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_nanos() as i64)
    }

    /// Get nanoseconds value
    #[inline]
    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Get milliseconds value
    #[inline]
    pub const fn as_millis(&self) -> i64 {
        self.0 / 1_000_000
    }

    /// Get seconds value
    #[inline]
    pub const fn as_secs(&self) -> i64 {
        self.0 / 1_000_000_000
    }

    /// Calculate duration between two timestamps
    #[inline]
    pub fn duration_since(&self, earlier: Timestamp) -> Duration {
        let nanos = self.0.saturating_sub(earlier.0);
        Duration::from_nanos(nanos.max(0) as u64)
    }

    /// Add duration to timestamp
    #[inline]
    pub fn add_duration(&self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.as_nanos() as i64))
    }

    /// Subtract duration from timestamp
    #[inline]
    pub fn sub_duration(&self, duration: Duration) -> Self {
        Self(self.0.saturating_sub(duration.as_nanos() as i64))
    }

    /// Check if timestamp is within a time range (inclusive)
    #[inline]
    pub fn is_within(&self, start: Timestamp, end: Timestamp) -> bool {
        self.0 >= start.0 && self.0 <= end.0
    }

    /// Convert to chrono DateTime<Utc>
    #[inline]
    pub fn to_datetime(&self) -> DateTime<Utc> {
        let secs = self.0 / 1_000_000_000;
        let nanos = (self.0 % 1_000_000_000) as u32;
        DateTime::from_timestamp(secs, nanos).unwrap_or_default()
    }

    /// Zero timestamp (Unix epoch)
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Maximum representable timestamp
    pub const MAX: Timestamp = Timestamp(i64::MAX);
}

impl Default for Timestamp {
    #[inline]
    fn default() -> Self {
        Self::now()
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().format("%Y-%m-%d %H:%M:%S%.3f UTC"))
    }
}

impl From<i64> for Timestamp {
    #[inline]
    fn from(nanos: i64) -> Self {
        Self(nanos)
    }
}

impl From<Timestamp> for i64 {
    #[inline]
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

/// Atomic timestamp for lock-free bookkeeping (last cycle time, etc.)
#[derive(Debug)]
#[repr(transparent)]
pub struct AtomicTimestamp(AtomicI64);

impl AtomicTimestamp {
    /// Create a new atomic timestamp
    #[inline]
    pub const fn new(ts: Timestamp) -> Self {
        Self(AtomicI64::new(ts.0))
    }

    /// Load the timestamp with specified ordering
    #[inline]
    pub fn load(&self, ordering: AtomicOrdering) -> Timestamp {
        Timestamp(self.0.load(ordering))
    }

    /// Store a timestamp with specified ordering
    #[inline]
    pub fn store(&self, ts: Timestamp, ordering: AtomicOrdering) {
        self.0.store(ts.0, ordering);
    }
}

impl Default for AtomicTimestamp {
    fn default() -> Self {
        Self::new(Timestamp::EPOCH)
    }
}

// ----------------------------------------------------------------------------
// 3.2 Metric Category - The Partitioning Key
// ----------------------------------------------------------------------------

/// The closed set of metric categories the buffer partitions by.
///
/// Custom metrics are a single category discriminated by the sample's `label`
/// field rather than an open-ended type, which keeps the statistics and
/// threshold logic exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MetricCategory {
    /// Per-operation processing latency (ms)
    Latency = 0,
    /// Event throughput rate (events/sec)
    Throughput = 1,
    /// CPU utilization (%)
    Cpu = 2,
    /// Memory utilization (%)
    Memory = 3,
    /// User-defined metric, discriminated by the sample label
    Custom = 4,
}

impl MetricCategory {
    /// All categories in detection order. Issue and report output follow this
    /// order, not severity order.
    pub const ALL: [MetricCategory; CATEGORY_COUNT] = [
        MetricCategory::Latency,
        MetricCategory::Throughput,
        MetricCategory::Cpu,
        MetricCategory::Memory,
        MetricCategory::Custom,
    ];

    /// Index into per-category storage arrays
    #[inline]
    pub const fn index(&self) -> usize {
        *self as usize
    }

    /// Get string representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricCategory::Latency => "latency",
            MetricCategory::Throughput => "throughput",
            MetricCategory::Cpu => "cpu_usage",
            MetricCategory::Memory => "memory_usage",
            MetricCategory::Custom => "custom",
        }
    }

    /// Default unit for samples in this category
    pub const fn default_unit(&self) -> &'static str {
        match self {
            MetricCategory::Latency => "ms",
            MetricCategory::Throughput => "events/sec",
            MetricCategory::Cpu => "%",
            MetricCategory::Memory => "%",
            MetricCategory::Custom => "",
        }
    }

    /// Whether a larger value is better for this category.
    ///
    /// Drives the polarity of impact verdicts: a latency decrease is an
    /// improvement, a throughput decrease is a regression.
    pub const fn higher_is_better(&self) -> bool {
        matches!(self, MetricCategory::Throughput)
    }
}

impl Display for MetricCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ----------------------------------------------------------------------------
// 3.3 Severity - Breach Classification
// ----------------------------------------------------------------------------

/// Severity of a detected performance issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Severity {
    /// Threshold breached, but within the critical ratio
    Warning = 0,
    /// Breach at or beyond `CRITICAL_BREACH_RATIO` times the threshold
    Critical = 1,
}

impl Severity {
    /// Get string representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    /// Classify a breach by how far the observed value exceeds the bound.
    /// `breach_ratio` must be >= 1.0 (a breach already happened).
    #[inline]
    pub fn from_breach_ratio(breach_ratio: f64) -> Self {
        if breach_ratio >= CRITICAL_BREACH_RATIO {
            Severity::Critical
        } else {
            Severity::Warning
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ----------------------------------------------------------------------------
// 3.4 Tags - Sample Dimensions
// ----------------------------------------------------------------------------

/// A single key/value tag on a sample (operation name, processor id, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: CompactString,
    pub value: CompactString,
}

impl Tag {
    /// Create a new tag
    #[inline]
    pub fn new(key: impl Into<CompactString>, value: impl Into<CompactString>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Small inline collection of tags. Most samples carry zero to two.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags(SmallVec<[Tag; 4]>);

impl Tags {
    /// Create an empty tag set
    #[inline]
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    /// Look up a tag value by key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }

    /// Insert or replace a tag
    pub fn set(&mut self, key: impl Into<CompactString>, value: impl Into<CompactString>) {
        let key = key.into();
        let value = value.into();
        if let Some(tag) = self.0.iter_mut().find(|t| t.key == key) {
            tag.value = value;
        } else {
            self.0.push(Tag { key, value });
        }
    }

    /// Number of tags
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over tags
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }
}

impl FromIterator<Tag> for Tags {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ----------------------------------------------------------------------------
// 3.5 Metric Sample - THE ATOMIC UNIT
// ----------------------------------------------------------------------------

/// A single timestamped observation. Immutable once recorded.
///
/// Builder-style constructors cover the common categories; `custom` takes a
/// label that discriminates between user-defined metrics sharing the Custom
/// window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// When the observation was made
    pub timestamp: Timestamp,

    /// Category for window routing and analysis
    pub category: MetricCategory,

    /// The observed value
    pub value: f64,

    /// Unit string (e.g. "ms", "events/sec", "%")
    pub unit: CompactString,

    /// Dimensions (operation name, processor id, ...)
    pub tags: Tags,

    /// Discriminator for `MetricCategory::Custom` samples
    pub label: Option<CompactString>,
}

impl MetricSample {
    /// Create a sample in the given category at the current time
    pub fn new(category: MetricCategory, value: f64) -> Self {
        Self {
            timestamp: Timestamp::now(),
            category,
            value,
            unit: CompactString::const_new(category.default_unit()),
            tags: Tags::new(),
            label: None,
        }
    }

    /// Create a latency observation in milliseconds
    #[inline]
    pub fn latency(value_ms: f64) -> Self {
        Self::new(MetricCategory::Latency, value_ms)
    }

    /// Create a throughput observation in events per second
    #[inline]
    pub fn throughput(events_per_sec: f64) -> Self {
        Self::new(MetricCategory::Throughput, events_per_sec)
    }

    /// Create a CPU utilization observation in percent
    #[inline]
    pub fn cpu(percent: f64) -> Self {
        Self::new(MetricCategory::Cpu, percent)
    }

    /// Create a memory utilization observation in percent
    #[inline]
    pub fn memory(percent: f64) -> Self {
        Self::new(MetricCategory::Memory, percent)
    }

    /// Create a custom observation with a discriminating label
    pub fn custom(label: impl Into<CompactString>, value: f64, unit: impl Into<CompactString>) -> Self {
        Self {
            timestamp: Timestamp::now(),
            category: MetricCategory::Custom,
            value,
            unit: unit.into(),
            tags: Tags::new(),
            label: Some(label.into()),
        }
    }

    /// Set an explicit timestamp (builder style)
    pub fn with_timestamp(mut self, ts: Timestamp) -> Self {
        self.timestamp = ts;
        self
    }

    /// Add a tag (builder style)
    pub fn with_tag(mut self, key: impl Into<CompactString>, value: impl Into<CompactString>) -> Self {
        self.tags.set(key, value);
        self
    }

    /// Override the unit (builder style)
    pub fn with_unit(mut self, unit: impl Into<CompactString>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Validate the sample for recording.
    ///
    /// A rejected sample must never be partially written, so this runs before
    /// the window lock is taken.
    pub fn validate(&self) -> Result<(), SampleError> {
        if !self.value.is_finite() {
            return Err(SampleError::NonFiniteValue {
                category: self.category,
            });
        }
        if self.category == MetricCategory::Custom
            && self.label.as_ref().map_or(true, |l| l.is_empty())
        {
            return Err(SampleError::MissingCustomLabel);
        }
        if self.tags.iter().any(|t| t.key.is_empty()) {
            return Err(SampleError::EmptyTagKey {
                category: self.category,
            });
        }
        Ok(())
    }
}

impl Display for MetricSample {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(
                f,
                "{}[{}]={}{} @ {}",
                self.category, label, self.value, self.unit, self.timestamp
            ),
            None => write!(
                f,
                "{}={}{} @ {}",
                self.category, self.value, self.unit, self.timestamp
            ),
        }
    }
}

// ============================================================================
// SECTION 4: ERROR HANDLING FRAMEWORK
// ============================================================================
// Error types for every subsystem in the monitor. The core performs no
// network or disk I/O and never retries internally: validation failures are
// signaled at the offending call, and analysis over too few samples is an
// explicit "no result" condition rather than an error to propagate.
// ============================================================================

/// Convenient result alias for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;

// ----------------------------------------------------------------------------
// 4.1 Top-Level Monitor Errors
// ----------------------------------------------------------------------------

/// The main error type for the monitor. All subsystem errors convert into it.
#[derive(Error, Debug)]
pub enum MonitorError {
    // ---- Configuration Errors ----
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // ---- Sample Validation Errors ----
    #[error("Sample error: {0}")]
    Sample(#[from] SampleError),

    // ---- IO Errors (report output only) ----
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ---- Generic Errors ----
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MonitorError {
    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            MonitorError::Config(_) => "config",
            MonitorError::Sample(_) => "sample",
            MonitorError::Io(_) => "io",
            MonitorError::Internal(_) => "internal",
        }
    }

    /// Check if this error is recoverable by the caller.
    ///
    /// Configuration errors are fatal to the wiring collaborator; a rejected
    /// sample or an insufficient-data cycle is routine.
    pub fn is_recoverable(&self) -> bool {
        match self {
            MonitorError::Config(_) => false,
            MonitorError::Sample(_) => true,
            MonitorError::Io(_) => true,
            MonitorError::Internal(_) => false,
        }
    }
}

// ----------------------------------------------------------------------------
// 4.2 Configuration Errors
// ----------------------------------------------------------------------------

/// Errors raised while loading or validating configuration. These surface at
/// startup and are not recoverable by the core.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to parse configuration: {message}")]
    ParseError { message: String },

    #[error("Invalid configuration value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("Unknown threshold key '{key}' (expected one of: cpu_usage, memory_usage, latency_p95, min_throughput)")]
    UnknownThresholdKey { key: String },

    #[error("Threshold '{key}' has negative bound {bound}")]
    NegativeBound { key: String, bound: f64 },
}

impl ConfigError {
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// 4.3 Sample Validation Errors
// ----------------------------------------------------------------------------

/// Errors from `record`: malformed input rejected at the boundary. The
/// producer is expected to count or log rejections, not surface them per
/// event; a rejected sample never reaches a window.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SampleError {
    #[error("Non-finite value for {category} sample (NaN or infinity)")]
    NonFiniteValue { category: MetricCategory },

    #[error("Custom sample requires a non-empty label")]
    MissingCustomLabel,

    #[error("Empty tag key on {category} sample")]
    EmptyTagKey { category: MetricCategory },
}

// ============================================================================
// SECTION 5: CONFIGURATION SYSTEM
// ============================================================================
// TOML configuration with environment variable overrides (PERFMON_*).
// Thresholds and buffer capacity are construction-time inputs to the core;
// there is no runtime reconfiguration beyond re-construction. Malformed
// threshold configuration fails fast here, never inside the analyzer.
// ============================================================================

// ----------------------------------------------------------------------------
// 5.1 Main Configuration Structure
// ----------------------------------------------------------------------------

/// Root configuration for the monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// General settings
    #[serde(default)]
    pub monitor: GeneralConfig,

    /// Metric buffer settings
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Threshold bounds, keyed by statistic name
    #[serde(default = "default_thresholds")]
    pub thresholds: BTreeMap<String, f64>,

    /// Analysis tuning
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Workload simulation settings
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            monitor: GeneralConfig::default(),
            buffer: BufferConfig::default(),
            thresholds: default_thresholds(),
            analysis: AnalysisConfig::default(),
            simulation: SimulationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from file with environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("PERFMON_").split("__"));

        let config: Self = figment.extract().map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load from string (for testing)
    pub fn from_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration. Bad threshold wiring is fatal at load
    /// time; the analyzer never sees an unvalidated threshold map.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer.window_capacity < MIN_WINDOW_CAPACITY {
            return Err(ConfigError::invalid_value(
                "buffer.window_capacity",
                format!("window capacity must be at least {}", MIN_WINDOW_CAPACITY),
            ));
        }

        if self.monitor.analysis_interval_secs < MIN_ANALYSIS_INTERVAL_SECS {
            return Err(ConfigError::invalid_value(
                "monitor.analysis_interval_secs",
                format!(
                    "analysis interval must be at least {}s",
                    MIN_ANALYSIS_INTERVAL_SECS
                ),
            ));
        }

        for (key, bound) in &self.thresholds {
            if ThresholdKey::from_config_key(key).is_none() {
                return Err(ConfigError::UnknownThresholdKey { key: key.clone() });
            }
            if *bound < 0.0 || !bound.is_finite() {
                return Err(ConfigError::NegativeBound {
                    key: key.clone(),
                    bound: *bound,
                });
            }
        }

        if self.analysis.stable_threshold_pct < 0.0 {
            return Err(ConfigError::invalid_value(
                "analysis.stable_threshold_pct",
                "stable threshold must be non-negative",
            ));
        }

        if self.analysis.significance_threshold_pct < 0.0 {
            return Err(ConfigError::invalid_value(
                "analysis.significance_threshold_pct",
                "significance threshold must be non-negative",
            ));
        }

        if self.simulation.processors == 0 {
            return Err(ConfigError::invalid_value(
                "simulation.processors",
                "at least one processor is required",
            ));
        }

        Ok(())
    }

    /// Render a default configuration file
    pub fn generate_default_config() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Stock threshold profile: mean CPU/memory upper bounds, p95 latency upper
/// bound, mean throughput lower bound.
fn default_thresholds() -> BTreeMap<String, f64> {
    let mut map = BTreeMap::new();
    map.insert("cpu_usage".to_string(), DEFAULT_CPU_THRESHOLD);
    map.insert("memory_usage".to_string(), DEFAULT_MEMORY_THRESHOLD);
    map.insert("latency_p95".to_string(), DEFAULT_LATENCY_P95_THRESHOLD_MS);
    map.insert("min_throughput".to_string(), DEFAULT_MIN_THROUGHPUT);
    map
}

// ----------------------------------------------------------------------------
// 5.2 General Settings
// ----------------------------------------------------------------------------

/// General monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Instance name (for identification in logs)
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Interval between synthetic resource samples in milliseconds
    #[serde(default = "default_collection_interval")]
    pub collection_interval_ms: u64,

    /// Interval between analysis cycles in seconds
    #[serde(default = "default_analysis_interval")]
    pub analysis_interval_secs: u64,

    /// Environment name (prod, staging, dev)
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            collection_interval_ms: default_collection_interval(),
            analysis_interval_secs: default_analysis_interval(),
            environment: default_environment(),
        }
    }
}

fn default_instance_name() -> String {
    ENGINE_NAME.into()
}

fn default_collection_interval() -> u64 {
    DEFAULT_COLLECTION_INTERVAL_MS
}

fn default_analysis_interval() -> u64 {
    DEFAULT_ANALYSIS_INTERVAL_SECS
}

fn default_environment() -> String {
    "production".into()
}

// ----------------------------------------------------------------------------
// 5.3 Buffer Settings
// ----------------------------------------------------------------------------

/// Metric buffer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Capacity of each per-category rolling window
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            window_capacity: default_window_capacity(),
        }
    }
}

fn default_window_capacity() -> usize {
    DEFAULT_WINDOW_CAPACITY
}

// ----------------------------------------------------------------------------
// 5.4 Analysis Settings
// ----------------------------------------------------------------------------

/// Analysis tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Percent-change band classified as Stable in trend analysis
    #[serde(default = "default_stable_threshold")]
    pub stable_threshold_pct: f64,

    /// Percent-change below which an impact comparison is not significant
    #[serde(default = "default_significance_threshold")]
    pub significance_threshold_pct: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            stable_threshold_pct: default_stable_threshold(),
            significance_threshold_pct: default_significance_threshold(),
        }
    }
}

fn default_stable_threshold() -> f64 {
    DEFAULT_STABLE_THRESHOLD_PCT
}

fn default_significance_threshold() -> f64 {
    DEFAULT_SIGNIFICANCE_PCT
}

// ----------------------------------------------------------------------------
// 5.5 Simulation Settings
// ----------------------------------------------------------------------------

/// Workload simulation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Default scenario name
    #[serde(default = "default_scenario")]
    pub default_scenario: String,

    /// Default run duration in seconds
    #[serde(default = "default_duration")]
    pub default_duration_secs: u64,

    /// Number of processor threads consuming simulated events
    #[serde(default = "default_processors")]
    pub processors: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            default_scenario: default_scenario(),
            default_duration_secs: default_duration(),
            processors: default_processors(),
        }
    }
}

fn default_scenario() -> String {
    "normal_load".into()
}

fn default_duration() -> u64 {
    DEFAULT_SIMULATION_DURATION_SECS
}

fn default_processors() -> usize {
    2
}

// ----------------------------------------------------------------------------
// 5.6 Logging Settings
// ----------------------------------------------------------------------------

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Enable ANSI colors
    #[serde(default = "default_true")]
    pub colors: bool,

    /// Include file/line in output
    #[serde(default)]
    pub source_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            colors: true,
            source_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

fn default_true() -> bool {
    true
}

// ----------------------------------------------------------------------------
// 5.7 Threshold Model
// ----------------------------------------------------------------------------

/// Direction of a threshold bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundDirection {
    /// Breach when the statistic exceeds the bound
    Upper,
    /// Breach when the statistic falls below the bound
    Lower,
}

/// Which window statistic a threshold compares against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdStatistic {
    Mean,
    P95,
}

/// The closed set of configurable threshold keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdKey {
    CpuUsage,
    MemoryUsage,
    LatencyP95,
    MinThroughput,
}

impl ThresholdKey {
    /// Parse a configuration key; `None` for an unrecognized key
    pub fn from_config_key(key: &str) -> Option<Self> {
        match key {
            "cpu_usage" => Some(ThresholdKey::CpuUsage),
            "memory_usage" => Some(ThresholdKey::MemoryUsage),
            "latency_p95" => Some(ThresholdKey::LatencyP95),
            "min_throughput" => Some(ThresholdKey::MinThroughput),
            _ => None,
        }
    }

    /// The category this threshold watches
    pub const fn category(&self) -> MetricCategory {
        match self {
            ThresholdKey::CpuUsage => MetricCategory::Cpu,
            ThresholdKey::MemoryUsage => MetricCategory::Memory,
            ThresholdKey::LatencyP95 => MetricCategory::Latency,
            ThresholdKey::MinThroughput => MetricCategory::Throughput,
        }
    }

    /// The statistic this threshold compares against
    pub const fn statistic(&self) -> ThresholdStatistic {
        match self {
            ThresholdKey::LatencyP95 => ThresholdStatistic::P95,
            _ => ThresholdStatistic::Mean,
        }
    }

    /// Whether the bound is an upper or lower limit
    pub const fn direction(&self) -> BoundDirection {
        match self {
            ThresholdKey::MinThroughput => BoundDirection::Lower,
            _ => BoundDirection::Upper,
        }
    }

    /// The issue kind emitted on breach
    pub const fn issue_kind(&self) -> IssueKind {
        match self {
            ThresholdKey::CpuUsage => IssueKind::HighCpu,
            ThresholdKey::MemoryUsage => IssueKind::HighMemory,
            ThresholdKey::LatencyP95 => IssueKind::LatencySpike,
            ThresholdKey::MinThroughput => IssueKind::LowThroughput,
        }
    }

    /// Configuration key string
    pub const fn as_str(&self) -> &'static str {
        match self {
            ThresholdKey::CpuUsage => "cpu_usage",
            ThresholdKey::MemoryUsage => "memory_usage",
            ThresholdKey::LatencyP95 => "latency_p95",
            ThresholdKey::MinThroughput => "min_throughput",
        }
    }
}

/// A single named bound the analyzer checks every cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Threshold {
    /// Configuration key (e.g. "cpu_usage")
    pub key: CompactString,
    /// Category whose window the statistic is computed from
    pub category: MetricCategory,
    /// The statistic to compare
    pub statistic: ThresholdStatistic,
    /// Upper or lower bound
    pub direction: BoundDirection,
    /// The numeric limit
    pub bound: f64,
}

/// The validated set of thresholds, held in category detection order so that
/// issue output is deterministic.
#[derive(Debug, Clone, Default)]
pub struct ThresholdSet {
    entries: Vec<Threshold>,
}

impl ThresholdSet {
    /// Build from a validated configuration map. Fails on unknown keys or
    /// negative bounds; validation here mirrors `MonitorConfig::validate` so
    /// a hand-built map gets the same fail-fast treatment.
    pub fn from_config(map: &BTreeMap<String, f64>) -> Result<Self, ConfigError> {
        let mut entries = Vec::with_capacity(map.len());

        for (key, bound) in map {
            let parsed = ThresholdKey::from_config_key(key)
                .ok_or_else(|| ConfigError::UnknownThresholdKey { key: key.clone() })?;
            if *bound < 0.0 || !bound.is_finite() {
                return Err(ConfigError::NegativeBound {
                    key: key.clone(),
                    bound: *bound,
                });
            }
            entries.push(Threshold {
                key: CompactString::const_new(parsed.as_str()),
                category: parsed.category(),
                statistic: parsed.statistic(),
                direction: parsed.direction(),
                bound: *bound,
            });
        }

        // Detection order: category enumeration order, not map order.
        entries.sort_by_key(|t| t.category.index());

        Ok(Self { entries })
    }

    /// Stock threshold profile
    pub fn standard() -> Self {
        Self::from_config(&default_thresholds()).expect("default thresholds are valid")
    }

    /// Iterate bounds in detection order
    pub fn iter(&self) -> impl Iterator<Item = &Threshold> {
        self.entries.iter()
    }

    /// Bounds watching one category
    pub fn for_category(&self, category: MetricCategory) -> impl Iterator<Item = &Threshold> {
        self.entries.iter().filter(move |t| t.category == category)
    }

    /// Number of configured bounds
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no bounds are configured
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// SECTION 6: LOGGING & TRACING INFRASTRUCTURE
// ============================================================================
// Structured logging built on the tracing ecosystem. The format and level
// come from configuration, overridable via RUST_LOG.
// ============================================================================

/// Initialize the logging system based on configuration
pub fn init_logging(config: &LoggingConfig) -> AnyhowResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(false)
                        .with_file(config.source_location)
                        .with_line_number(config.source_location),
                )
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to init json logging: {e}"))?;
        }
        "compact" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_fmt::layer()
                        .compact()
                        .with_ansi(config.colors)
                        .with_file(config.source_location)
                        .with_line_number(config.source_location),
                )
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to init compact logging: {e}"))?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_fmt::layer()
                        .pretty()
                        .with_ansi(config.colors)
                        .with_file(config.source_location)
                        .with_line_number(config.source_location),
                )
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to init pretty logging: {e}"))?;
        }
    }

    info!(
        version = ENGINE_VERSION,
        format = %config.format,
        level = %config.level,
        "{} logging initialized",
        ENGINE_NAME
    );

    Ok(())
}

/// Log a detected issue with structured fields
macro_rules! log_issue {
    ($issue:expr) => {
        match $issue.severity {
            Severity::Critical => {
                error!(
                    category = %$issue.category,
                    kind = %$issue.kind,
                    observed = $issue.observed,
                    bound = $issue.bound,
                    "critical threshold breach"
                );
            }
            Severity::Warning => {
                warn!(
                    category = %$issue.category,
                    kind = %$issue.kind,
                    observed = $issue.observed,
                    bound = $issue.bound,
                    "threshold breach"
                );
            }
        }
    };
}

/// Simple timer for measuring operation durations, logged on drop
pub struct PerfTimer {
    name: &'static str,
    start: Instant,
    threshold: Duration,
}

impl PerfTimer {
    /// Create a new timer that logs when dropped
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
            threshold: Duration::from_millis(100),
        }
    }

    /// Create a timer that only warns if duration exceeds threshold
    pub fn with_threshold(name: &'static str, threshold: Duration) -> Self {
        Self {
            name,
            start: Instant::now(),
            threshold,
        }
    }

    /// Get elapsed time without consuming the timer
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for PerfTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        if elapsed > self.threshold {
            warn!(
                operation = self.name,
                elapsed_ms = elapsed.as_millis() as u64,
                "slow operation detected"
            );
        } else {
            trace!(
                operation = self.name,
                elapsed_us = elapsed.as_micros() as u64,
                "operation timed"
            );
        }
    }
}

impl Debug for PerfTimer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerfTimer")
            .field("name", &self.name)
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

// ============================================================================
// SECTION 7: CONCURRENT METRIC BUFFER
// ============================================================================
// Per-category rolling windows behind short mutex critical sections. Writers
// touch exactly one window per record; readers copy a window out under the
// same lock. Capacity is fixed at construction and enforced with strict FIFO
// eviction, so memory stays bounded no matter how fast producers run.
// ============================================================================

// ----------------------------------------------------------------------------
// 7.1 Rolling Window
// ----------------------------------------------------------------------------

/// A single category's rolling window of samples, oldest first.
#[derive(Debug)]
struct MetricWindow {
    samples: VecDeque<MetricSample>,
    capacity: usize,
    evicted: u64,
}

impl MetricWindow {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    /// Push a sample, evicting the oldest if at capacity.
    fn push(&mut self, sample: MetricSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
            self.evicted += 1;
        }
        self.samples.push_back(sample);
    }

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn clear(&mut self) {
        self.samples.clear();
    }

    /// Copy out the window contents in arrival order.
    fn to_vec(&self) -> Vec<MetricSample> {
        self.samples.iter().cloned().collect()
    }
}

// ----------------------------------------------------------------------------
// 7.2 Metric Buffer
// ----------------------------------------------------------------------------

/// The shared metric buffer: one independently locked window per category.
///
/// Record and snapshot are safe to call from any number of threads. A record
/// only contends with records and snapshots of the same category.
#[derive(Debug)]
pub struct MetricBuffer {
    windows: [CachePadded<Mutex<MetricWindow>>; CATEGORY_COUNT],
    capacity: usize,
    total_recorded: CachePadded<AtomicU64>,
    total_rejected: CachePadded<AtomicU64>,
    created_at: Timestamp,
}

impl MetricBuffer {
    /// Create a buffer with the given per-category window capacity.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_WINDOW_CAPACITY);
        Self {
            windows: std::array::from_fn(|_| CachePadded::new(Mutex::new(MetricWindow::new(capacity)))),
            capacity,
            total_recorded: CachePadded::new(AtomicU64::new(0)),
            total_rejected: CachePadded::new(AtomicU64::new(0)),
            created_at: Timestamp::now(),
        }
    }

    /// Per-category window capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a sample into its category's window.
    ///
    /// Validation happens before the lock is taken; a rejected sample never
    /// enters a window and never disturbs existing contents.
    pub fn record(&self, sample: MetricSample) -> Result<(), SampleError> {
        sample.validate().map_err(|e| {
            self.total_rejected.fetch_add(1, AtomicOrdering::Relaxed);
            debug!(category = %sample.category, error = %e, "sample rejected");
            e
        })?;

        let mut window = self.windows[sample.category.index()].lock();
        window.push(sample);
        drop(window);

        self.total_recorded.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(())
    }

    /// Record a batch of samples. Stops at the first invalid sample and
    /// reports how many were recorded before it.
    pub fn record_batch(&self, samples: Vec<MetricSample>) -> Result<usize, (usize, SampleError)> {
        let mut recorded = 0;
        for sample in samples {
            match self.record(sample) {
                Ok(()) => recorded += 1,
                Err(e) => return Err((recorded, e)),
            }
        }
        Ok(recorded)
    }

    /// Copy out one category's window, oldest first.
    pub fn snapshot_category(&self, category: MetricCategory) -> Vec<MetricSample> {
        self.windows[category.index()].lock().to_vec()
    }

    /// Take a point-in-time snapshot of every window.
    ///
    /// Locks are taken one category at a time, so the snapshot is consistent
    /// per category rather than globally. No window ever exposes a partially
    /// written sample.
    pub fn snapshot(&self) -> Snapshot {
        let _timer = PerfTimer::with_threshold("buffer_snapshot", Duration::from_millis(50));
        let taken_at = Timestamp::now();
        let windows = std::array::from_fn(|i| self.windows[i].lock().to_vec());
        Snapshot { taken_at, windows }
    }

    /// Number of samples currently held for one category.
    pub fn len(&self, category: MetricCategory) -> usize {
        self.windows[category.index()].lock().len()
    }

    /// Total samples currently held across all categories.
    pub fn total_len(&self) -> usize {
        MetricCategory::ALL
            .iter()
            .map(|c| self.len(*c))
            .sum()
    }

    /// Check whether every window is empty.
    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    /// Clear one category's window. Counters are cumulative and unaffected.
    pub fn clear_category(&self, category: MetricCategory) {
        self.windows[category.index()].lock().clear();
        debug!(category = %category, "window cleared");
    }

    /// Clear every window.
    pub fn clear(&self) {
        for category in MetricCategory::ALL {
            self.clear_category(category);
        }
        info!("all metric windows cleared");
    }

    /// Cumulative buffer counters and per-category occupancy.
    pub fn stats(&self) -> BufferStatsSnapshot {
        let mut window_lens = [0usize; CATEGORY_COUNT];
        let mut total_evicted = 0u64;
        for (i, slot) in self.windows.iter().enumerate() {
            let window = slot.lock();
            window_lens[i] = window.len();
            total_evicted += window.evicted;
        }
        BufferStatsSnapshot {
            capacity: self.capacity,
            window_lens,
            total_recorded: self.total_recorded.load(AtomicOrdering::Relaxed),
            total_rejected: self.total_rejected.load(AtomicOrdering::Relaxed),
            total_evicted,
            uptime: Timestamp::now().duration_since(self.created_at),
        }
    }
}

impl Default for MetricBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

// ----------------------------------------------------------------------------
// 7.3 Snapshots
// ----------------------------------------------------------------------------

/// A point-in-time copy of every category window.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// When the snapshot was started
    pub taken_at: Timestamp,
    /// Per-category sample copies, oldest first, indexed by category
    windows: [Vec<MetricSample>; CATEGORY_COUNT],
}

impl Snapshot {
    /// An empty snapshot (used when analysis runs before any data arrives).
    pub fn empty() -> Self {
        Self {
            taken_at: Timestamp::now(),
            windows: std::array::from_fn(|_| Vec::new()),
        }
    }

    /// Samples for one category, oldest first.
    #[inline]
    pub fn category(&self, category: MetricCategory) -> &[MetricSample] {
        &self.windows[category.index()]
    }

    /// Number of samples for one category.
    #[inline]
    pub fn len(&self, category: MetricCategory) -> usize {
        self.windows[category.index()].len()
    }

    /// Total samples across all categories.
    pub fn total_len(&self) -> usize {
        self.windows.iter().map(Vec::len).sum()
    }

    /// Check whether the snapshot holds no samples at all.
    pub fn is_empty(&self) -> bool {
        self.windows.iter().all(Vec::is_empty)
    }
}

/// Cumulative buffer counters captured by `MetricBuffer::stats`.
#[derive(Debug, Clone, Serialize)]
pub struct BufferStatsSnapshot {
    /// Per-category window capacity
    pub capacity: usize,
    /// Current occupancy per category, indexed by category
    pub window_lens: [usize; CATEGORY_COUNT],
    /// Samples accepted since construction
    pub total_recorded: u64,
    /// Samples rejected by validation since construction
    pub total_rejected: u64,
    /// Samples evicted by FIFO overflow since construction
    pub total_evicted: u64,
    /// Time since the buffer was created
    #[serde(skip)]
    pub uptime: Duration,
}

// ============================================================================
// SECTION 8: WINDOW STATISTICS
// ============================================================================
// Descriptive statistics over one window's values. Percentiles use the
// nearest-rank method: p-th percentile = sorted[ceil(p/100 * n) - 1].
// ============================================================================

/// Descriptive statistics for one category window.
///
/// `count` is always present; the remaining fields are `None` when the window
/// is empty so that "no data" is never confused with a measured zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

impl WindowStats {
    /// Statistics of an empty window.
    pub const fn empty() -> Self {
        Self {
            count: 0,
            mean: None,
            median: None,
            min: None,
            max: None,
            p95: None,
            p99: None,
        }
    }

    /// Check whether any data contributed to these statistics.
    #[inline]
    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}

impl Default for WindowStats {
    fn default() -> Self {
        Self::empty()
    }
}

/// Nearest-rank percentile over a sorted ascending slice.
///
/// `p` is in (0, 100]. Returns `None` for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let rank = ((p / 100.0) * n as f64).ceil() as usize;
    let rank = rank.clamp(1, n);
    Some(sorted[rank - 1])
}

/// Compute descriptive statistics over one window's samples.
pub fn compute_stats(samples: &[MetricSample]) -> WindowStats {
    if samples.is_empty() {
        return WindowStats::empty();
    }

    let mut values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    values.sort_by_key(|v| OrderedFloat(*v));

    let n = values.len();
    let sum: f64 = values.iter().sum();
    let mean = sum / n as f64;

    let median = if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    };

    WindowStats {
        count: n,
        mean: Some(mean),
        median: Some(median),
        min: Some(values[0]),
        max: Some(values[n - 1]),
        p95: percentile(&values, 95.0),
        p99: percentile(&values, 99.0),
    }
}

/// Mean of a sample slice. `None` when empty.
#[inline]
pub fn mean_of(samples: &[MetricSample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let sum: f64 = samples.iter().map(|s| s.value).sum();
    Some(sum / samples.len() as f64)
}

// ============================================================================
// SECTION 9: PERFORMANCE ANALYZER
// ============================================================================
// Read-only analysis over snapshots: threshold breaches, trend direction,
// and before/after impact verdicts. The analyzer never touches the buffer's
// locks; it only consumes copies the buffer handed out.
//
// Issue detection and trend classification are pluggable strategies so a
// deployment can swap heuristics without touching the cycle driver.
// ============================================================================

// ----------------------------------------------------------------------------
// 9.1 Issues
// ----------------------------------------------------------------------------

/// What kind of threshold breach an issue describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    LatencySpike,
    LowThroughput,
    HighCpu,
    HighMemory,
    /// Breach raised by a non-stock issue rule
    Custom,
}

impl Display for IssueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            IssueKind::LatencySpike => "latency_spike",
            IssueKind::LowThroughput => "low_throughput",
            IssueKind::HighCpu => "high_cpu",
            IssueKind::HighMemory => "high_memory",
            IssueKind::Custom => "custom",
        };
        write!(f, "{s}")
    }
}

/// One detected threshold breach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub category: MetricCategory,
    pub severity: Severity,
    /// The statistic value that breached
    pub observed: f64,
    /// The configured bound it breached
    pub bound: f64,
    /// Which statistic was compared
    pub statistic: ThresholdStatistic,
    /// Human-readable summary
    pub message: CompactString,
    pub detected_at: Timestamp,
}

// ----------------------------------------------------------------------------
// 9.2 Trends
// ----------------------------------------------------------------------------

/// Direction of change between the older and newer halves of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
    /// Fewer than two samples; no classification possible
    InsufficientData,
}

impl Display for TrendDirection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
            TrendDirection::InsufficientData => "insufficient_data",
        };
        write!(f, "{s}")
    }
}

/// Result of classifying one category's trend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub category: MetricCategory,
    pub direction: TrendDirection,
    /// Percent change from the older half's mean to the newer half's mean.
    /// Zero when classification was not possible.
    pub magnitude_pct: f64,
    /// Mean of the older half (None when insufficient data)
    pub first_mean: Option<f64>,
    /// Mean of the newer half (None when insufficient data)
    pub second_mean: Option<f64>,
    pub sample_count: usize,
    /// Timestamp of the oldest sample in the classified window
    pub window_start: Option<Timestamp>,
    /// Timestamp of the newest sample in the classified window
    pub window_end: Option<Timestamp>,
}

impl TrendResult {
    fn insufficient(category: MetricCategory, sample_count: usize) -> Self {
        Self {
            category,
            direction: TrendDirection::InsufficientData,
            magnitude_pct: 0.0,
            first_mean: None,
            second_mean: None,
            sample_count,
            window_start: None,
            window_end: None,
        }
    }
}

// ----------------------------------------------------------------------------
// 9.3 Impact
// ----------------------------------------------------------------------------

/// Verdict on one category's before/after comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactVerdict {
    Improved,
    Regressed,
    NoSignificantChange,
}

impl Display for ImpactVerdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImpactVerdict::Improved => "improved",
            ImpactVerdict::Regressed => "regressed",
            ImpactVerdict::NoSignificantChange => "no_significant_change",
        };
        write!(f, "{s}")
    }
}

/// Before/after comparison for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryImpact {
    pub category: MetricCategory,
    pub verdict: ImpactVerdict,
    pub before_mean: f64,
    pub after_mean: f64,
    /// Absolute change, `after_mean - before_mean`
    pub delta: f64,
    /// Percent change from before to after
    pub change_pct: f64,
    pub before_count: usize,
    pub after_count: usize,
}

/// Full before/after impact assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactResult {
    pub before_cutoff: Timestamp,
    pub after_cutoff: Timestamp,
    /// Per-category verdicts in category order. Categories with no data on
    /// either side of the split are omitted.
    pub categories: Vec<CategoryImpact>,
    /// Worst verdict across categories: any regression dominates
    pub overall: ImpactVerdict,
}

// ----------------------------------------------------------------------------
// 9.4 Analysis Strategies
// ----------------------------------------------------------------------------

/// Pluggable issue detection over a snapshot's per-category statistics
pub trait IssueRule: Send + Sync {
    /// Inspect the per-category statistics and emit any detected issues
    fn evaluate(&self, stats: &[WindowStats; CATEGORY_COUNT], now: Timestamp) -> Vec<Issue>;
}

/// Pluggable trend classification over one category's samples
pub trait TrendClassifier: Send + Sync {
    /// Classify the trend of a window, oldest first
    fn classify(&self, category: MetricCategory, samples: &[MetricSample]) -> TrendResult;
}

/// The stock issue rule: compare each configured threshold's statistic
/// against its bound, escalating to Critical on a deep breach.
#[derive(Debug, Clone)]
pub struct ThresholdIssueRule {
    thresholds: ThresholdSet,
}

impl ThresholdIssueRule {
    pub fn new(thresholds: ThresholdSet) -> Self {
        Self { thresholds }
    }
}

impl IssueRule for ThresholdIssueRule {
    fn evaluate(&self, stats: &[WindowStats; CATEGORY_COUNT], now: Timestamp) -> Vec<Issue> {
        let mut issues = Vec::new();

        for threshold in self.thresholds.iter() {
            let window = &stats[threshold.category.index()];
            let observed = match threshold.statistic {
                ThresholdStatistic::Mean => window.mean,
                ThresholdStatistic::P95 => window.p95,
            };
            // A category with no data this cycle produces no issue.
            let Some(observed) = observed else { continue };

            let (breached, ratio) = match threshold.direction {
                BoundDirection::Upper => (
                    observed > threshold.bound,
                    observed / threshold.bound.max(f64::MIN_POSITIVE),
                ),
                BoundDirection::Lower => (
                    observed < threshold.bound,
                    threshold.bound / observed.max(f64::MIN_POSITIVE),
                ),
            };
            if !breached {
                continue;
            }

            let severity = Severity::from_breach_ratio(ratio);
            let comparator = match threshold.direction {
                BoundDirection::Upper => "above",
                BoundDirection::Lower => "below",
            };
            let statistic = match threshold.statistic {
                ThresholdStatistic::Mean => "mean",
                ThresholdStatistic::P95 => "p95",
            };

            issues.push(Issue {
                kind: ThresholdKey::from_config_key(&threshold.key)
                    .map(|k| k.issue_kind())
                    .unwrap_or(IssueKind::Custom),
                category: threshold.category,
                severity,
                observed,
                bound: threshold.bound,
                statistic: threshold.statistic,
                message: compact_str::format_compact!(
                    "{} {} {:.2} is {} bound {:.2}",
                    threshold.category,
                    statistic,
                    observed,
                    comparator,
                    threshold.bound
                ),
                detected_at: now,
            });
        }

        issues
    }
}

/// The stock trend classifier: split the window into halves, compare mean
/// levels, and call anything inside the stable band flat.
#[derive(Debug, Clone)]
pub struct StableBandClassifier {
    /// Percent-change band classified as Stable
    pub stable_threshold_pct: f64,
}

impl StableBandClassifier {
    pub fn new(stable_threshold_pct: f64) -> Self {
        Self {
            stable_threshold_pct,
        }
    }
}

impl Default for StableBandClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_STABLE_THRESHOLD_PCT)
    }
}

impl TrendClassifier for StableBandClassifier {
    fn classify(&self, category: MetricCategory, samples: &[MetricSample]) -> TrendResult {
        if samples.len() < MIN_TREND_SAMPLES {
            return TrendResult::insufficient(category, samples.len());
        }

        // Odd counts give the extra sample to the newer half.
        let mid = samples.len() / 2;
        let first_mean = mean_of(&samples[..mid]).unwrap_or(0.0);
        let second_mean = mean_of(&samples[mid..]).unwrap_or(0.0);

        let magnitude_pct = percent_change(first_mean, second_mean);

        let direction = if magnitude_pct.abs() < self.stable_threshold_pct {
            TrendDirection::Stable
        } else if magnitude_pct > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        };

        TrendResult {
            category,
            direction,
            magnitude_pct,
            first_mean: Some(first_mean),
            second_mean: Some(second_mean),
            sample_count: samples.len(),
            window_start: samples.first().map(|s| s.timestamp),
            window_end: samples.last().map(|s| s.timestamp),
        }
    }
}

/// Percent change from `from` to `to`. A zero baseline yields zero when the
/// new level is also zero, and a signed infinity otherwise.
#[inline]
fn percent_change(from: f64, to: f64) -> f64 {
    if from == 0.0 {
        if to == 0.0 {
            0.0
        } else if to > 0.0 {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        }
    } else {
        (to - from) / from.abs() * 100.0
    }
}

// ----------------------------------------------------------------------------
// 9.5 Analysis Report
// ----------------------------------------------------------------------------

/// The output of one analysis cycle
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub generated_at: Timestamp,
    pub snapshot_taken_at: Timestamp,
    /// Per-category statistics, indexed by category
    pub stats: [WindowStats; CATEGORY_COUNT],
    /// Threshold breaches, in category detection order
    pub issues: Vec<Issue>,
    /// Per-category trends, indexed by category
    pub trends: Vec<TrendResult>,
    /// Total samples the snapshot covered
    pub sample_count: usize,
}

impl AnalysisReport {
    /// A report over no data (the state before the first cycle runs)
    pub fn empty() -> Self {
        let now = Timestamp::now();
        Self {
            generated_at: now,
            snapshot_taken_at: now,
            stats: std::array::from_fn(|_| WindowStats::empty()),
            issues: Vec::new(),
            trends: MetricCategory::ALL
                .iter()
                .map(|c| TrendResult::insufficient(*c, 0))
                .collect(),
            sample_count: 0,
        }
    }

    /// Statistics for one category
    #[inline]
    pub fn stats_for(&self, category: MetricCategory) -> &WindowStats {
        &self.stats[category.index()]
    }

    /// Trend for one category
    pub fn trend_for(&self, category: MetricCategory) -> Option<&TrendResult> {
        self.trends.iter().find(|t| t.category == category)
    }

    /// Whether any issue is Critical
    pub fn has_critical_issues(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }
}

// ----------------------------------------------------------------------------
// 9.6 Performance Analyzer
// ----------------------------------------------------------------------------

/// Derives statistics, issues, trends, and impact verdicts from snapshots.
///
/// The most recent report is published through an `ArcSwap`, so readers see
/// either the previous complete report or the new one, never a partial state.
pub struct PerformanceAnalyzer {
    issue_rules: Vec<Box<dyn IssueRule>>,
    trend_classifier: Box<dyn TrendClassifier>,
    significance_pct: f64,
    last_report: ArcSwap<AnalysisReport>,
    cycles_run: AtomicU64,
}

impl Debug for PerformanceAnalyzer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerformanceAnalyzer")
            .field("issue_rules", &self.issue_rules.len())
            .field("significance_pct", &self.significance_pct)
            .field("cycles_run", &self.cycles_run.load(AtomicOrdering::Relaxed))
            .finish()
    }
}

impl PerformanceAnalyzer {
    /// Analyzer with the stock strategies and the given thresholds
    pub fn new(thresholds: ThresholdSet, analysis: &AnalysisConfig) -> Self {
        Self {
            issue_rules: vec![Box::new(ThresholdIssueRule::new(thresholds))],
            trend_classifier: Box::new(StableBandClassifier::new(analysis.stable_threshold_pct)),
            significance_pct: analysis.significance_threshold_pct,
            last_report: ArcSwap::from_pointee(AnalysisReport::empty()),
            cycles_run: AtomicU64::new(0),
        }
    }

    /// Analyzer with the stock strategies and default tuning
    pub fn standard() -> Self {
        Self::new(ThresholdSet::standard(), &AnalysisConfig::default())
    }

    /// Add an issue rule alongside the existing ones
    pub fn with_issue_rule(mut self, rule: Box<dyn IssueRule>) -> Self {
        self.issue_rules.push(rule);
        self
    }

    /// Replace the trend classifier
    pub fn with_trend_classifier(mut self, classifier: Box<dyn TrendClassifier>) -> Self {
        self.trend_classifier = classifier;
        self
    }

    /// The most recently published report
    pub fn last_report(&self) -> Arc<AnalysisReport> {
        self.last_report.load_full()
    }

    /// Number of completed analysis cycles
    pub fn cycles_run(&self) -> u64 {
        self.cycles_run.load(AtomicOrdering::Relaxed)
    }

    /// Identify threshold breaches over a snapshot
    pub fn identify_issues(&self, snapshot: &Snapshot) -> Vec<Issue> {
        let stats = self.compute_all_stats(snapshot);
        let now = Timestamp::now();
        let mut issues = Vec::new();
        for rule in &self.issue_rules {
            issues.extend(rule.evaluate(&stats, now));
        }
        issues
    }

    /// Classify the trend of one category's window
    pub fn analyze_trend(&self, category: MetricCategory, snapshot: &Snapshot) -> TrendResult {
        self.trend_classifier
            .classify(category, snapshot.category(category))
    }

    /// Compare samples before and after a change point.
    ///
    /// Samples at or before `before_cutoff` form the baseline; samples at or
    /// after `after_cutoff` form the comparison set. Categories with no data
    /// on either side are omitted from the result.
    pub fn analyze_impact(
        &self,
        snapshot: &Snapshot,
        before_cutoff: Timestamp,
        after_cutoff: Timestamp,
    ) -> ImpactResult {
        let mut categories = Vec::new();

        for category in MetricCategory::ALL {
            let samples = snapshot.category(category);
            let before: Vec<&MetricSample> = samples
                .iter()
                .filter(|s| s.timestamp <= before_cutoff)
                .collect();
            let after: Vec<&MetricSample> = samples
                .iter()
                .filter(|s| s.timestamp >= after_cutoff)
                .collect();

            if before.is_empty() || after.is_empty() {
                continue;
            }

            let before_mean =
                before.iter().map(|s| s.value).sum::<f64>() / before.len() as f64;
            let after_mean = after.iter().map(|s| s.value).sum::<f64>() / after.len() as f64;
            let delta = after_mean - before_mean;
            let change_pct = percent_change(before_mean, after_mean);

            let verdict = if change_pct.abs() < self.significance_pct {
                ImpactVerdict::NoSignificantChange
            } else {
                let improved = if category.higher_is_better() {
                    change_pct > 0.0
                } else {
                    change_pct < 0.0
                };
                if improved {
                    ImpactVerdict::Improved
                } else {
                    ImpactVerdict::Regressed
                }
            };

            categories.push(CategoryImpact {
                category,
                verdict,
                before_mean,
                after_mean,
                delta,
                change_pct,
                before_count: before.len(),
                after_count: after.len(),
            });
        }

        let overall = if categories
            .iter()
            .any(|c| c.verdict == ImpactVerdict::Regressed)
        {
            ImpactVerdict::Regressed
        } else if categories
            .iter()
            .any(|c| c.verdict == ImpactVerdict::Improved)
        {
            ImpactVerdict::Improved
        } else {
            ImpactVerdict::NoSignificantChange
        };

        ImpactResult {
            before_cutoff,
            after_cutoff,
            categories,
            overall,
        }
    }

    /// Run one full analysis cycle over a snapshot and publish the report.
    pub fn run_cycle(&self, snapshot: &Snapshot) -> Arc<AnalysisReport> {
        let _timer = PerfTimer::with_threshold("analysis_cycle", Duration::from_millis(250));
        let now = Timestamp::now();

        let stats = self.compute_all_stats(snapshot);

        let mut issues = Vec::new();
        for rule in &self.issue_rules {
            issues.extend(rule.evaluate(&stats, now));
        }
        for issue in &issues {
            log_issue!(issue);
        }

        let trends = MetricCategory::ALL
            .iter()
            .map(|c| self.trend_classifier.classify(*c, snapshot.category(*c)))
            .collect();

        let report = Arc::new(AnalysisReport {
            generated_at: now,
            snapshot_taken_at: snapshot.taken_at,
            stats,
            issues,
            trends,
            sample_count: snapshot.total_len(),
        });

        self.last_report.store(Arc::clone(&report));
        self.cycles_run.fetch_add(1, AtomicOrdering::Relaxed);

        debug!(
            samples = report.sample_count,
            issues = report.issues.len(),
            "analysis cycle complete"
        );

        report
    }

    fn compute_all_stats(&self, snapshot: &Snapshot) -> [WindowStats; CATEGORY_COUNT] {
        std::array::from_fn(|i| compute_stats(snapshot.category(MetricCategory::ALL[i])))
    }
}

// ============================================================================
// SECTION 10: PERFORMANCE MONITOR FACADE
// ============================================================================
// The top-level handle wiring the buffer and the analyzer together. Clone the
// Arc'd monitor freely; producers record through it while one analysis driver
// runs cycles on a timer. Overlapping cycles are skipped, not queued.
// ============================================================================

/// The monitoring facade: concurrent sample intake plus periodic analysis.
#[derive(Debug)]
pub struct PerformanceMonitor {
    buffer: MetricBuffer,
    analyzer: PerformanceAnalyzer,
    /// Held for the duration of an analysis cycle. `try_lock` failure means a
    /// cycle is already in flight and the caller's cycle is skipped.
    cycle_guard: Mutex<()>,
    last_cycle_at: AtomicTimestamp,
    cycles_skipped: AtomicU64,
    instance_name: CompactString,
}

impl PerformanceMonitor {
    /// Build a monitor from validated configuration.
    pub fn from_config(config: &MonitorConfig) -> Result<Self, ConfigError> {
        let thresholds = ThresholdSet::from_config(&config.thresholds)?;
        Ok(Self {
            buffer: MetricBuffer::new(config.buffer.window_capacity),
            analyzer: PerformanceAnalyzer::new(thresholds, &config.analysis),
            cycle_guard: Mutex::new(()),
            last_cycle_at: AtomicTimestamp::default(),
            cycles_skipped: AtomicU64::new(0),
            instance_name: CompactString::new(&config.monitor.instance_name),
        })
    }

    /// Monitor with stock thresholds and default tuning.
    pub fn standard() -> Self {
        Self::from_config(&MonitorConfig::default()).expect("default config is valid")
    }

    /// The underlying metric buffer.
    #[inline]
    pub fn buffer(&self) -> &MetricBuffer {
        &self.buffer
    }

    /// The underlying analyzer.
    #[inline]
    pub fn analyzer(&self) -> &PerformanceAnalyzer {
        &self.analyzer
    }

    // ---- Recording -------------------------------------------------------

    /// Record a prepared sample.
    #[inline]
    pub fn record(&self, sample: MetricSample) -> Result<(), SampleError> {
        self.buffer.record(sample)
    }

    /// Record a latency observation in milliseconds.
    pub fn record_latency(&self, operation: &str, value_ms: f64) -> Result<(), SampleError> {
        self.buffer
            .record(MetricSample::latency(value_ms).with_tag("operation", operation))
    }

    /// Record a throughput observation in events per second.
    pub fn record_throughput(&self, events_per_sec: f64) -> Result<(), SampleError> {
        self.buffer.record(MetricSample::throughput(events_per_sec))
    }

    /// Record a CPU utilization observation in percent.
    pub fn record_cpu(&self, percent: f64) -> Result<(), SampleError> {
        self.buffer.record(MetricSample::cpu(percent))
    }

    /// Record a memory utilization observation in percent.
    pub fn record_memory(&self, percent: f64) -> Result<(), SampleError> {
        self.buffer.record(MetricSample::memory(percent))
    }

    /// Record a custom observation with a discriminating label.
    pub fn record_custom(
        &self,
        label: &str,
        value: f64,
        unit: &str,
    ) -> Result<(), SampleError> {
        self.buffer.record(MetricSample::custom(label, value, unit))
    }

    // ---- Queries ---------------------------------------------------------

    /// Current statistics for one category, computed over a fresh snapshot
    /// of that category's window.
    pub fn get_stats(&self, category: MetricCategory) -> WindowStats {
        compute_stats(&self.buffer.snapshot_category(category))
    }

    /// Current statistics for every category.
    pub fn get_all_stats(&self) -> [WindowStats; CATEGORY_COUNT] {
        let snapshot = self.buffer.snapshot();
        std::array::from_fn(|i| compute_stats(snapshot.category(MetricCategory::ALL[i])))
    }

    /// Issues from the most recent completed analysis cycle.
    ///
    /// Empty until the first cycle runs. For an on-demand check against the
    /// live windows use `analyzer().identify_issues` with a fresh snapshot.
    pub fn get_issues(&self) -> Vec<Issue> {
        self.analyzer.last_report().issues.clone()
    }

    /// Trend for one category from the most recent completed cycle.
    pub fn get_trend(&self, category: MetricCategory) -> Option<TrendResult> {
        self.analyzer
            .last_report()
            .trend_for(category)
            .cloned()
    }

    /// Per-category trends from the most recent completed cycle.
    pub fn get_trends(&self) -> Vec<TrendResult> {
        self.analyzer.last_report().trends.clone()
    }

    /// Before/after impact assessment around a change point.
    pub fn get_impact(&self, before_cutoff: Timestamp, after_cutoff: Timestamp) -> ImpactResult {
        self.analyzer
            .analyze_impact(&self.buffer.snapshot(), before_cutoff, after_cutoff)
    }

    /// The report from the most recent completed cycle.
    pub fn last_report(&self) -> Arc<AnalysisReport> {
        self.analyzer.last_report()
    }

    /// Cumulative buffer counters.
    pub fn buffer_stats(&self) -> BufferStatsSnapshot {
        self.buffer.stats()
    }

    /// Number of cycles skipped because another cycle was in flight.
    pub fn cycles_skipped(&self) -> u64 {
        self.cycles_skipped.load(AtomicOrdering::Relaxed)
    }

    // ---- Analysis Cycle --------------------------------------------------

    /// Run one analysis cycle if none is in flight.
    ///
    /// Returns `None` when another cycle held the guard; the caller's cycle
    /// is dropped rather than queued, since the in-flight cycle will publish
    /// a report covering approximately the same data.
    pub fn run_analysis_cycle(&self) -> Option<Arc<AnalysisReport>> {
        let Some(_guard) = self.cycle_guard.try_lock() else {
            self.cycles_skipped.fetch_add(1, AtomicOrdering::Relaxed);
            debug!("analysis cycle skipped, previous cycle still running");
            return None;
        };

        let snapshot = self.buffer.snapshot();
        let report = self.analyzer.run_cycle(&snapshot);
        self.last_cycle_at
            .store(report.generated_at, AtomicOrdering::Release);
        Some(report)
    }

    /// Spawn the periodic analysis driver on the tokio runtime.
    ///
    /// Runs a cycle every `period` until `shutdown` is notified. The driver
    /// never blocks producers; it only takes snapshots.
    pub fn spawn_analysis_driver(
        self: Arc<Self>,
        period: Duration,
        shutdown: Arc<Notify>,
    ) -> TokioJoinHandle<()> {
        let monitor = self;
        tokio::spawn(async move {
            let mut ticker = interval(period);
            // The first tick fires immediately; skip it so the first cycle
            // sees a full period of data.
            ticker.tick().await;
            info!(
                instance = %monitor.instance_name,
                period_secs = period.as_secs(),
                "analysis driver started"
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if monitor.run_analysis_cycle().is_none() {
                            warn!("analysis cycle overlapped and was skipped");
                        }
                    }
                    _ = shutdown.notified() => {
                        info!("analysis driver shutting down");
                        break;
                    }
                }
            }
        })
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// SECTION 11: WORKLOAD SIMULATOR
// ============================================================================
// Synthetic data-processing pipeline that exercises the monitor end to end:
// a generator thread pushes events through a bounded channel to processor
// threads, which record per-event latency; a sampler thread derives the
// throughput rate and synthetic resource usage on a fixed interval.
// ============================================================================

// ----------------------------------------------------------------------------
// 11.1 Workload Shapes
// ----------------------------------------------------------------------------

/// Intensity profile of a simulation phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadKind {
    Light,
    Medium,
    Heavy,
    Bursty,
}

impl WorkloadKind {
    /// Target event generation rate (events per second)
    pub const fn events_per_sec(&self) -> u64 {
        match self {
            WorkloadKind::Light => 200,
            WorkloadKind::Medium => 800,
            WorkloadKind::Heavy => 2_500,
            WorkloadKind::Bursty => 1_200,
        }
    }

    /// Base simulated processing latency in milliseconds
    pub const fn base_latency_ms(&self) -> f64 {
        match self {
            WorkloadKind::Light => 5.0,
            WorkloadKind::Medium => 20.0,
            WorkloadKind::Heavy => 120.0,
            WorkloadKind::Bursty => 40.0,
        }
    }

    /// Latency jitter span in milliseconds
    pub const fn latency_jitter_ms(&self) -> f64 {
        match self {
            WorkloadKind::Light => 3.0,
            WorkloadKind::Medium => 15.0,
            WorkloadKind::Heavy => 400.0,
            WorkloadKind::Bursty => 250.0,
        }
    }

    /// Baseline simulated CPU utilization in percent
    pub const fn base_cpu_pct(&self) -> f64 {
        match self {
            WorkloadKind::Light => 15.0,
            WorkloadKind::Medium => 45.0,
            WorkloadKind::Heavy => 88.0,
            WorkloadKind::Bursty => 60.0,
        }
    }

    /// Baseline simulated memory utilization in percent
    pub const fn base_memory_pct(&self) -> f64 {
        match self {
            WorkloadKind::Light => 30.0,
            WorkloadKind::Medium => 50.0,
            WorkloadKind::Heavy => 82.0,
            WorkloadKind::Bursty => 55.0,
        }
    }
}

impl Display for WorkloadKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkloadKind::Light => "light",
            WorkloadKind::Medium => "medium",
            WorkloadKind::Heavy => "heavy",
            WorkloadKind::Bursty => "bursty",
        };
        write!(f, "{s}")
    }
}

/// A named sequence of workload phases
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: CompactString,
    /// Each phase's shape and its share of the total run, as a weight
    pub phases: Vec<(WorkloadKind, u32)>,
}

impl Scenario {
    /// Look up a built-in scenario by name
    pub fn by_name(name: &str) -> Option<Self> {
        let phases: Vec<(WorkloadKind, u32)> = match name {
            "normal_load" => vec![(WorkloadKind::Medium, 1)],
            "high_load" => vec![(WorkloadKind::Medium, 1), (WorkloadKind::Heavy, 3)],
            "spike_test" => vec![
                (WorkloadKind::Light, 2),
                (WorkloadKind::Bursty, 1),
                (WorkloadKind::Light, 2),
            ],
            "stress_test" => vec![
                (WorkloadKind::Medium, 1),
                (WorkloadKind::Heavy, 2),
                (WorkloadKind::Heavy, 2),
            ],
            _ => return None,
        };
        Some(Self {
            name: CompactString::new(name),
            phases,
        })
    }

    /// Names of all built-in scenarios
    pub const BUILTIN: [&'static str; 4] =
        ["normal_load", "high_load", "spike_test", "stress_test"];

    /// The workload shape active at `elapsed` out of `total`
    fn shape_at(&self, elapsed: Duration, total: Duration) -> WorkloadKind {
        let weight_sum: u32 = self.phases.iter().map(|(_, w)| *w).sum();
        if weight_sum == 0 || total.is_zero() {
            return self.phases.first().map(|(k, _)| *k).unwrap_or(WorkloadKind::Medium);
        }
        let progress = (elapsed.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0);
        let target = progress * weight_sum as f64;
        let mut cumulative = 0.0;
        for (kind, weight) in &self.phases {
            cumulative += *weight as f64;
            if target < cumulative {
                return *kind;
            }
        }
        self.phases.last().map(|(k, _)| *k).unwrap_or(WorkloadKind::Medium)
    }
}

// ----------------------------------------------------------------------------
// 11.2 Pipeline
// ----------------------------------------------------------------------------

/// One unit of simulated work flowing through the pipeline
#[derive(Debug, Clone, Copy)]
struct SimulatedEvent {
    sequence: u64,
    shape: WorkloadKind,
}

/// Outcome counters from a finished simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    pub scenario: CompactString,
    pub duration: Duration,
    pub events_generated: u64,
    pub events_processed: u64,
    pub events_dropped: u64,
}

/// Run a workload simulation against the monitor.
///
/// Blocks the calling thread until the scenario finishes. All pipeline
/// threads are joined before this returns, so every sample they recorded is
/// visible to subsequent analysis.
pub fn run_simulation(
    monitor: &PerformanceMonitor,
    scenario: &Scenario,
    duration: Duration,
    processors: usize,
    collection_interval: Duration,
) -> SimulationSummary {
    info!(
        scenario = %scenario.name,
        duration_secs = duration.as_secs(),
        processors,
        "simulation starting"
    );

    let (tx, rx) = bounded::<SimulatedEvent>(SIMULATOR_QUEUE_CAPACITY);
    let stop = AtomicBool::new(false);
    let generated = AtomicU64::new(0);
    let processed = AtomicU64::new(0);
    let dropped = AtomicU64::new(0);

    let started = Instant::now();

    thread::scope(|scope| {
        let stop = &stop;
        let generated = &generated;
        let processed = &processed;
        let dropped = &dropped;

        // Generator: emits events at the active phase's target rate in
        // 10ms batches.
        let gen_tx = tx;
        scope.spawn(move || {
            let mut rng = rand::thread_rng();
            let tick = Duration::from_millis(10);
            let mut sequence = 0u64;
            while !stop.load(AtomicOrdering::Relaxed) && started.elapsed() < duration {
                let shape = scenario.shape_at(started.elapsed(), duration);
                let mut batch = (shape.events_per_sec() / 100).max(1);
                if shape == WorkloadKind::Bursty && rng.gen_bool(0.1) {
                    batch *= 8;
                }
                for _ in 0..batch {
                    sequence += 1;
                    let event = SimulatedEvent { sequence, shape };
                    match gen_tx.try_send(event) {
                        Ok(()) => {
                            generated.fetch_add(1, AtomicOrdering::Relaxed);
                        }
                        Err(_) => {
                            dropped.fetch_add(1, AtomicOrdering::Relaxed);
                        }
                    }
                }
                thread::sleep(tick);
            }
            drop(gen_tx);
        });

        // Processors: consume events and record per-event latency.
        for worker in 0..processors {
            let rx = rx.clone();
            scope.spawn(move || {
                let mut rng = rand::thread_rng();
                let worker_id = format!("processor-{worker}");
                for event in rx.iter() {
                    let latency_ms = event.shape.base_latency_ms()
                        + rng.gen::<f64>() * event.shape.latency_jitter_ms();
                    let sample = MetricSample::latency(latency_ms)
                        .with_tag("processor", worker_id.as_str());
                    if monitor.record(sample).is_ok() {
                        processed.fetch_add(1, AtomicOrdering::Relaxed);
                    }
                    let _ = event.sequence;
                }
            });
        }
        drop(rx);

        // Sampler: derives throughput from the processed counter and emits
        // synthetic resource usage for the active shape.
        scope.spawn(move || {
            let mut rng = rand::thread_rng();
            let mut last_count = 0u64;
            let mut last_tick = Instant::now();
            while !stop.load(AtomicOrdering::Relaxed) && started.elapsed() < duration {
                thread::sleep(collection_interval);
                let now = Instant::now();
                let count = processed.load(AtomicOrdering::Relaxed);
                let elapsed = now.duration_since(last_tick).as_secs_f64();
                if elapsed > 0.0 {
                    let rate = (count - last_count) as f64 / elapsed;
                    let _ = monitor.record_throughput(rate);
                }
                last_count = count;
                last_tick = now;

                let shape = scenario.shape_at(started.elapsed(), duration);
                let cpu = (shape.base_cpu_pct() + rng.gen_range(-5.0..10.0)).clamp(0.0, 100.0);
                let mem = (shape.base_memory_pct() + rng.gen_range(-3.0..6.0)).clamp(0.0, 100.0);
                let _ = monitor.record_cpu(cpu);
                let _ = monitor.record_memory(mem);
            }
            stop.store(true, AtomicOrdering::Relaxed);
        });
    });

    let summary = SimulationSummary {
        scenario: scenario.name.clone(),
        duration: started.elapsed(),
        events_generated: generated.load(AtomicOrdering::Relaxed),
        events_processed: processed.load(AtomicOrdering::Relaxed),
        events_dropped: dropped.load(AtomicOrdering::Relaxed),
    };

    info!(
        scenario = %summary.scenario,
        generated = summary.events_generated,
        processed = summary.events_processed,
        dropped = summary.events_dropped,
        "simulation finished"
    );

    summary
}

// ============================================================================
// SECTION 12: REPORT RENDERING
// ============================================================================
// Console and JSON views over an analysis report. Rendering is pure; writing
// to a file is the only I/O and surfaces as MonitorError::Io.
// ============================================================================

fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:.2}"),
        Some(_) => "inf".to_string(),
        None => "-".to_string(),
    }
}

/// Render a human-readable console report.
pub fn render_console_report(report: &AnalysisReport, buffer: &BufferStatsSnapshot) -> String {
    let mut out = String::with_capacity(2048);

    out.push_str(&format!(
        "{} v{}\nGenerated: {}\n",
        ENGINE_FULL_NAME, ENGINE_VERSION, report.generated_at
    ));
    out.push_str(&format!(
        "Samples: {} in window, {} recorded, {} rejected, {} evicted\n\n",
        report.sample_count, buffer.total_recorded, buffer.total_rejected, buffer.total_evicted
    ));

    out.push_str("CATEGORY STATISTICS\n");
    out.push_str(&format!(
        "  {:<12} {:>7} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}\n",
        "category", "count", "mean", "median", "min", "max", "p95", "p99"
    ));
    for category in MetricCategory::ALL {
        let s = report.stats_for(category);
        out.push_str(&format!(
            "  {:<12} {:>7} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}\n",
            category.as_str(),
            s.count,
            fmt_opt(s.mean),
            fmt_opt(s.median),
            fmt_opt(s.min),
            fmt_opt(s.max),
            fmt_opt(s.p95),
            fmt_opt(s.p99),
        ));
    }

    out.push_str("\nTRENDS\n");
    for trend in &report.trends {
        match trend.direction {
            TrendDirection::InsufficientData => {
                out.push_str(&format!(
                    "  {:<12} insufficient data ({} samples)\n",
                    trend.category.as_str(),
                    trend.sample_count
                ));
            }
            _ => {
                out.push_str(&format!(
                    "  {:<12} {:<12} {:+.1}%\n",
                    trend.category.as_str(),
                    trend.direction.to_string(),
                    trend.magnitude_pct
                ));
            }
        }
    }

    out.push_str("\nISSUES\n");
    if report.issues.is_empty() {
        out.push_str("  none detected\n");
    } else {
        for issue in &report.issues {
            out.push_str(&format!(
                "  [{}] {}: {}\n",
                issue.severity.as_str().to_uppercase(),
                issue.kind,
                issue.message
            ));
        }
    }

    out
}

/// Render a machine-readable JSON report.
pub fn render_json_report(
    report: &AnalysisReport,
    buffer: &BufferStatsSnapshot,
) -> serde_json::Value {
    let stats: BTreeMap<&str, &WindowStats> = MetricCategory::ALL
        .iter()
        .map(|c| (c.as_str(), report.stats_for(*c)))
        .collect();

    json!({
        "engine": ENGINE_NAME,
        "version": ENGINE_VERSION,
        "generated_at_ms": report.generated_at.as_millis(),
        "snapshot_taken_at_ms": report.snapshot_taken_at.as_millis(),
        "sample_count": report.sample_count,
        "buffer": {
            "capacity": buffer.capacity,
            "total_recorded": buffer.total_recorded,
            "total_rejected": buffer.total_rejected,
            "total_evicted": buffer.total_evicted,
        },
        "stats": stats,
        "trends": report.trends,
        "issues": report.issues,
    })
}

/// Write a report to a file, format selected by `as_json`.
pub fn write_report(
    report: &AnalysisReport,
    buffer: &BufferStatsSnapshot,
    path: &Path,
    as_json: bool,
) -> MonitorResult<()> {
    let contents = if as_json {
        serde_json::to_string_pretty(&render_json_report(report, buffer))
            .map_err(|e| MonitorError::Internal(format!("report serialization failed: {e}")))?
    } else {
        render_console_report(report, buffer)
    };
    fs::write(path, contents)?;
    info!(path = %path.display(), json = as_json, "report written");
    Ok(())
}

// ============================================================================
// SECTION 13: COMMAND LINE INTERFACE
// ============================================================================

/// Real-time performance monitoring engine
#[derive(Debug, Parser)]
#[command(name = "perfmon", version = ENGINE_VERSION, about = ENGINE_FULL_NAME)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "perfmon.toml", env = "PERFMON_CONFIG")]
    pub config: PathBuf,

    /// Override the configured log level
    #[arg(long, env = "PERFMON_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a monitored workload simulation with periodic analysis
    Run {
        /// Scenario name (normal_load, high_load, spike_test, stress_test)
        #[arg(short, long)]
        scenario: Option<String>,

        /// Run duration in seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Number of processor threads
        #[arg(short, long)]
        processors: Option<usize>,

        /// Write the final report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit the final report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a short sampling burst and print an analysis report
    Report {
        /// Scenario name for the sampling burst
        #[arg(short, long)]
        scenario: Option<String>,

        /// Sampling duration in seconds
        #[arg(short, long, default_value_t = 10)]
        duration: u64,

        /// Emit JSON instead of the console format
        #[arg(long)]
        json: bool,

        /// Write the report to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate the configuration file and exit
    Validate,

    /// Print a default configuration file to stdout
    GenerateConfig,

    /// Print version information
    Version,
}

// ============================================================================
// SECTION 14: MAIN ENTRY POINT
// ============================================================================

#[tokio::main]
async fn main() -> AnyhowResult<()> {
    let cli = Cli::parse();

    // Subcommands that need no configuration or logging.
    match &cli.command {
        Command::GenerateConfig => {
            print!("{}", MonitorConfig::generate_default_config());
            return Ok(());
        }
        Command::Version => {
            println!("{} v{}", ENGINE_FULL_NAME, ENGINE_VERSION);
            return Ok(());
        }
        _ => {}
    }

    let mut config = if cli.config.exists() {
        MonitorConfig::load(&cli.config)
            .with_context(|| format!("loading configuration from {}", cli.config.display()))?
    } else {
        MonitorConfig::default()
    };

    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    if matches!(&cli.command, Command::Validate) {
        // Reaching this point means load + validate already succeeded.
        println!("configuration ok: {}", cli.config.display());
        return Ok(());
    }

    init_logging(&config.logging)?;
    info!(
        version = ENGINE_VERSION,
        config = %cli.config.display(),
        environment = %config.monitor.environment,
        "starting {}",
        ENGINE_NAME
    );

    match cli.command {
        Command::Run {
            scenario,
            duration,
            processors,
            output,
            json,
        } => {
            let scenario_name = scenario.unwrap_or(config.simulation.default_scenario.clone());
            let scenario = Scenario::by_name(&scenario_name).ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown scenario '{}' (available: {})",
                    scenario_name,
                    Scenario::BUILTIN.join(", ")
                )
            })?;
            let duration =
                Duration::from_secs(duration.unwrap_or(config.simulation.default_duration_secs));
            let processors = processors.unwrap_or(config.simulation.processors);

            let monitor = Arc::new(PerformanceMonitor::from_config(&config)?);
            let shutdown = Arc::new(Notify::new());
            let driver = Arc::clone(&monitor).spawn_analysis_driver(
                Duration::from_secs(config.monitor.analysis_interval_secs),
                Arc::clone(&shutdown),
            );

            // The simulation pipeline is synchronous; keep the runtime free.
            let sim_monitor = Arc::clone(&monitor);
            let collection_interval =
                Duration::from_millis(config.monitor.collection_interval_ms);
            let sim = tokio::task::spawn_blocking(move || {
                run_simulation(
                    &sim_monitor,
                    &scenario,
                    duration,
                    processors,
                    collection_interval,
                )
            });

            tokio::select! {
                result = sim => {
                    let summary = result.context("simulation task panicked")?;
                    info!(
                        processed = summary.events_processed,
                        dropped = summary.events_dropped,
                        "simulation complete"
                    );
                }
                _ = signal::ctrl_c() => {
                    warn!("interrupt received, shutting down");
                }
            }

            shutdown.notify_one();
            let _ = driver.await;

            // Final cycle over everything recorded.
            let report = monitor
                .run_analysis_cycle()
                .unwrap_or_else(|| monitor.last_report());
            let buffer_stats = monitor.buffer_stats();

            match output {
                Some(path) => write_report(&report, &buffer_stats, &path, json)?,
                None if json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&render_json_report(&report, &buffer_stats))?
                    );
                }
                None => print!("{}", render_console_report(&report, &buffer_stats)),
            }
        }

        Command::Report {
            scenario,
            duration,
            json,
            output,
        } => {
            let scenario_name = scenario.unwrap_or(config.simulation.default_scenario.clone());
            let scenario = Scenario::by_name(&scenario_name).ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown scenario '{}' (available: {})",
                    scenario_name,
                    Scenario::BUILTIN.join(", ")
                )
            })?;

            let monitor = Arc::new(PerformanceMonitor::from_config(&config)?);
            let collection_interval =
                Duration::from_millis(config.monitor.collection_interval_ms);
            let sim_monitor = Arc::clone(&monitor);
            tokio::task::spawn_blocking(move || {
                run_simulation(
                    &sim_monitor,
                    &scenario,
                    Duration::from_secs(duration),
                    config.simulation.processors,
                    collection_interval,
                )
            })
            .await
            .context("sampling burst panicked")?;

            let report = monitor
                .run_analysis_cycle()
                .unwrap_or_else(|| monitor.last_report());
            let buffer_stats = monitor.buffer_stats();

            match output {
                Some(path) => write_report(&report, &buffer_stats, &path, json)?,
                None if json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&render_json_report(&report, &buffer_stats))?
                    );
                }
                None => print!("{}", render_console_report(&report, &buffer_stats)),
            }
        }

        Command::Validate | Command::GenerateConfig | Command::Version => unreachable!(),
    }

    Ok(())
}

// ============================================================================
// SECTION 15: CORE TYPE & CONFIGURATION TESTS
// ============================================================================

#[cfg(test)]
mod core_tests {
    use super::*;

    #[test]
    fn timestamp_conversions() {
        let ts = Timestamp::from_millis(1_500);
        assert_eq!(ts.as_nanos(), 1_500_000_000);
        assert_eq!(ts.as_millis(), 1_500);
        assert_eq!(ts.as_secs(), 1);
    }

    #[test]
    fn timestamp_ordering_and_arithmetic() {
        let a = Timestamp::from_secs(100);
        let b = a.add_duration(Duration::from_secs(5));
        assert!(b > a);
        assert_eq!(b.duration_since(a), Duration::from_secs(5));
        assert_eq!(a.duration_since(b), Duration::ZERO);
        assert!(b.is_within(a, Timestamp::from_secs(200)));
    }

    #[test]
    fn category_indices_are_dense() {
        for (i, category) in MetricCategory::ALL.iter().enumerate() {
            assert_eq!(category.index(), i);
        }
        assert_eq!(MetricCategory::ALL.len(), CATEGORY_COUNT);
    }

    #[test]
    fn throughput_is_the_only_higher_is_better_category() {
        for category in MetricCategory::ALL {
            assert_eq!(
                category.higher_is_better(),
                category == MetricCategory::Throughput
            );
        }
    }

    #[test]
    fn severity_escalates_at_critical_ratio() {
        assert_eq!(Severity::from_breach_ratio(1.05), Severity::Warning);
        assert_eq!(Severity::from_breach_ratio(1.19), Severity::Warning);
        assert_eq!(Severity::from_breach_ratio(1.2), Severity::Critical);
        assert_eq!(Severity::from_breach_ratio(2.0), Severity::Critical);
    }

    #[test]
    fn sample_validation_rejects_non_finite_values() {
        assert_eq!(
            MetricSample::latency(f64::NAN).validate(),
            Err(SampleError::NonFiniteValue {
                category: MetricCategory::Latency
            })
        );
        assert_eq!(
            MetricSample::cpu(f64::INFINITY).validate(),
            Err(SampleError::NonFiniteValue {
                category: MetricCategory::Cpu
            })
        );
        assert!(MetricSample::latency(0.0).validate().is_ok());
    }

    #[test]
    fn custom_sample_requires_label() {
        let mut sample = MetricSample::new(MetricCategory::Custom, 1.0);
        assert_eq!(sample.validate(), Err(SampleError::MissingCustomLabel));
        sample.label = Some("".into());
        assert_eq!(sample.validate(), Err(SampleError::MissingCustomLabel));
        assert!(MetricSample::custom("queue_depth", 1.0, "items")
            .validate()
            .is_ok());
    }

    #[test]
    fn empty_tag_key_is_rejected() {
        let sample = MetricSample::latency(10.0).with_tag("", "value");
        assert_eq!(
            sample.validate(),
            Err(SampleError::EmptyTagKey {
                category: MetricCategory::Latency
            })
        );
    }

    #[test]
    fn tags_set_replaces_existing_key() {
        let mut tags = Tags::new();
        tags.set("operation", "parse");
        tags.set("operation", "encode");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags.get("operation"), Some("encode"));
    }
}


// ============================================================================
// SECTION 16: METRIC BUFFER TESTS
// ============================================================================

#[cfg(test)]
mod buffer_tests {
    use super::*;

    #[test]
    fn records_are_kept_in_arrival_order() {
        let buffer = MetricBuffer::new(100);
        for i in 0..10 {
            buffer.record(MetricSample::latency(i as f64)).unwrap();
        }
        let window = buffer.snapshot_category(MetricCategory::Latency);
        let values: Vec<f64> = window.iter().map(|s| s.value).collect();
        assert_eq!(values, (0..10).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[test]
    fn window_evicts_oldest_at_capacity() {
        let buffer = MetricBuffer::new(MIN_WINDOW_CAPACITY);
        for i in 0..(MIN_WINDOW_CAPACITY + 5) {
            buffer.record(MetricSample::latency(i as f64)).unwrap();
        }
        let window = buffer.snapshot_category(MetricCategory::Latency);
        assert_eq!(window.len(), MIN_WINDOW_CAPACITY);
        // The five oldest samples are gone, order preserved.
        assert_eq!(window[0].value, 5.0);
        assert_eq!(window.last().unwrap().value, (MIN_WINDOW_CAPACITY + 4) as f64);
        assert_eq!(buffer.stats().total_evicted, 5);
    }

    #[test]
    fn categories_are_isolated() {
        let buffer = MetricBuffer::new(100);
        buffer.record(MetricSample::latency(1.0)).unwrap();
        buffer.record(MetricSample::cpu(50.0)).unwrap();
        buffer.record(MetricSample::cpu(60.0)).unwrap();

        assert_eq!(buffer.len(MetricCategory::Latency), 1);
        assert_eq!(buffer.len(MetricCategory::Cpu), 2);
        assert_eq!(buffer.len(MetricCategory::Memory), 0);

        buffer.clear_category(MetricCategory::Cpu);
        assert_eq!(buffer.len(MetricCategory::Cpu), 0);
        assert_eq!(buffer.len(MetricCategory::Latency), 1);
    }

    #[test]
    fn rejected_samples_never_enter_a_window() {
        let buffer = MetricBuffer::new(100);
        assert!(buffer.record(MetricSample::latency(f64::NAN)).is_err());
        assert!(buffer.is_empty());
        let stats = buffer.stats();
        assert_eq!(stats.total_recorded, 0);
        assert_eq!(stats.total_rejected, 1);
    }

    #[test]
    fn record_batch_stops_at_first_invalid_sample() {
        let buffer = MetricBuffer::new(100);
        let samples = vec![
            MetricSample::latency(1.0),
            MetricSample::latency(2.0),
            MetricSample::latency(f64::NAN),
            MetricSample::latency(4.0),
        ];
        let err = buffer.record_batch(samples).unwrap_err();
        assert_eq!(err.0, 2);
        assert_eq!(buffer.len(MetricCategory::Latency), 2);
    }

    #[test]
    fn snapshot_is_a_stable_copy() {
        let buffer = MetricBuffer::new(100);
        buffer.record(MetricSample::cpu(10.0)).unwrap();
        let snapshot = buffer.snapshot();
        buffer.record(MetricSample::cpu(99.0)).unwrap();
        buffer.clear();

        assert_eq!(snapshot.len(MetricCategory::Cpu), 1);
        assert_eq!(snapshot.category(MetricCategory::Cpu)[0].value, 10.0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn snapshots_without_intervening_writes_are_identical() {
        let buffer = MetricBuffer::new(100);
        buffer.record(MetricSample::cpu(10.0)).unwrap();
        buffer.record(MetricSample::latency(3.0)).unwrap();

        let first = buffer.snapshot();
        let second = buffer.snapshot();
        for category in MetricCategory::ALL {
            assert_eq!(first.category(category), second.category(category));
        }
    }

    #[test]
    fn clear_does_not_reset_cumulative_counters() {
        let buffer = MetricBuffer::new(100);
        buffer.record(MetricSample::memory(40.0)).unwrap();
        buffer.clear();
        assert_eq!(buffer.stats().total_recorded, 1);
    }

    #[test]
    fn concurrent_producers_lose_nothing_under_capacity() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 500;

        let buffer = Arc::new(MetricBuffer::new(PRODUCERS * PER_PRODUCER));
        thread::scope(|scope| {
            for producer in 0..PRODUCERS {
                let buffer = Arc::clone(&buffer);
                scope.spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let sample = MetricSample::latency((producer * PER_PRODUCER + i) as f64)
                            .with_tag("producer", format!("{producer}"));
                        buffer.record(sample).unwrap();
                    }
                });
            }
        });

        let window = buffer.snapshot_category(MetricCategory::Latency);
        assert_eq!(window.len(), PRODUCERS * PER_PRODUCER);

        // Every sample arrived exactly once.
        let mut values: Vec<u64> = window.iter().map(|s| s.value as u64).collect();
        values.sort_unstable();
        values.dedup();
        assert_eq!(values.len(), PRODUCERS * PER_PRODUCER);

        // Per-producer arrival order is preserved even under interleaving.
        for producer in 0..PRODUCERS {
            let tag = format!("{producer}");
            let mine: Vec<f64> = window
                .iter()
                .filter(|s| s.tags.get("producer") == Some(tag.as_str()))
                .map(|s| s.value)
                .collect();
            assert!(mine.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn concurrent_producers_beyond_capacity_stay_bounded() {
        const CAPACITY: usize = 64;
        let buffer = Arc::new(MetricBuffer::new(CAPACITY));
        thread::scope(|scope| {
            for _ in 0..4 {
                let buffer = Arc::clone(&buffer);
                scope.spawn(move || {
                    for i in 0..1_000 {
                        buffer.record(MetricSample::throughput(i as f64)).unwrap();
                    }
                });
            }
        });
        assert_eq!(buffer.len(MetricCategory::Throughput), CAPACITY);
        assert_eq!(buffer.stats().total_recorded, 4_000);
    }
}

// ============================================================================
// SECTION 17: STATISTICS TESTS
// ============================================================================

#[cfg(test)]
mod stats_tests {
    use super::*;

    fn latency_samples(values: &[f64]) -> Vec<MetricSample> {
        values.iter().map(|v| MetricSample::latency(*v)).collect()
    }

    #[test]
    fn empty_window_has_no_statistics() {
        let stats = compute_stats(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean, None);
        assert_eq!(stats.median, None);
        assert_eq!(stats.min, None);
        assert_eq!(stats.max, None);
        assert_eq!(stats.p95, None);
        assert_eq!(stats.p99, None);
        assert!(!stats.has_data());
    }

    #[test]
    fn five_sample_percentiles_use_nearest_rank() {
        let samples = latency_samples(&[100.0, 200.0, 300.0, 400.0, 500.0]);
        let stats = compute_stats(&samples);
        assert_eq!(stats.count, 5);
        assert_eq!(stats.mean, Some(300.0));
        assert_eq!(stats.median, Some(300.0));
        assert_eq!(stats.min, Some(100.0));
        assert_eq!(stats.max, Some(500.0));
        // ceil(0.95 * 5) = 5 and ceil(0.99 * 5) = 5, both land on the last
        // sample for a window this small.
        assert_eq!(stats.p95, Some(500.0));
        assert_eq!(stats.p99, Some(500.0));
    }

    #[test]
    fn percentile_ranks_on_larger_window() {
        let values: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        assert_eq!(percentile(&values, 50.0), Some(50.0));
        assert_eq!(percentile(&values, 95.0), Some(95.0));
        assert_eq!(percentile(&values, 99.0), Some(99.0));
        assert_eq!(percentile(&values, 100.0), Some(100.0));
    }

    #[test]
    fn percentile_of_single_value() {
        assert_eq!(percentile(&[42.0], 95.0), Some(42.0));
        assert_eq!(percentile(&[], 95.0), None);
    }

    #[test]
    fn median_of_even_count_averages_the_middle_pair() {
        let stats = compute_stats(&latency_samples(&[1.0, 2.0, 3.0, 4.0]));
        assert_eq!(stats.median, Some(2.5));
    }

    #[test]
    fn stats_are_insensitive_to_arrival_order() {
        let sorted = compute_stats(&latency_samples(&[1.0, 2.0, 3.0, 4.0, 5.0]));
        let shuffled = compute_stats(&latency_samples(&[4.0, 1.0, 5.0, 3.0, 2.0]));
        assert_eq!(sorted, shuffled);
    }
}

// ============================================================================
// SECTION 18: ANALYZER TESTS
// ============================================================================

#[cfg(test)]
mod analyzer_tests {
    use super::*;

    fn snapshot_with(samples: Vec<MetricSample>) -> Snapshot {
        let buffer = MetricBuffer::new(DEFAULT_WINDOW_CAPACITY);
        for sample in samples {
            buffer.record(sample).unwrap();
        }
        buffer.snapshot()
    }

    fn repeated(category: MetricCategory, value: f64, count: usize) -> Vec<MetricSample> {
        (0..count)
            .map(|_| MetricSample::new(category, value))
            .collect()
    }

    #[test]
    fn cpu_above_threshold_raises_a_warning() {
        let analyzer = PerformanceAnalyzer::standard();
        let snapshot = snapshot_with(repeated(MetricCategory::Cpu, 85.0, 10));
        let issues = analyzer.identify_issues(&snapshot);

        assert_eq!(issues.len(), 1);
        let issue = &issues[0];
        assert_eq!(issue.kind, IssueKind::HighCpu);
        assert_eq!(issue.category, MetricCategory::Cpu);
        assert_eq!(issue.severity, Severity::Warning);
        assert_eq!(issue.observed, 85.0);
        assert_eq!(issue.bound, DEFAULT_CPU_THRESHOLD);
    }

    #[test]
    fn cpu_below_threshold_raises_nothing() {
        let analyzer = PerformanceAnalyzer::standard();
        let snapshot = snapshot_with(repeated(MetricCategory::Cpu, 75.0, 10));
        assert!(analyzer.identify_issues(&snapshot).is_empty());
    }

    #[test]
    fn deep_breach_is_critical() {
        let analyzer = PerformanceAnalyzer::standard();
        // 96 / 80 = 1.2, exactly at the critical ratio.
        let snapshot = snapshot_with(repeated(MetricCategory::Cpu, 96.0, 5));
        let issues = analyzer.identify_issues(&snapshot);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Critical);
    }

    #[test]
    fn latency_threshold_compares_p95_not_mean() {
        let analyzer = PerformanceAnalyzer::standard();
        // 19 fast samples and one slow one: mean stays low, p95 breaches.
        let mut samples = repeated(MetricCategory::Latency, 10.0, 19);
        samples.push(MetricSample::latency(5_000.0));
        let snapshot = snapshot_with(samples);

        let issues = analyzer.identify_issues(&snapshot);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::LatencySpike);
        assert_eq!(issues[0].statistic, ThresholdStatistic::P95);
    }

    #[test]
    fn low_throughput_breaches_the_lower_bound() {
        let analyzer = PerformanceAnalyzer::standard();
        let snapshot = snapshot_with(repeated(MetricCategory::Throughput, 50.0, 10));
        let issues = analyzer.identify_issues(&snapshot);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::LowThroughput);
        // 100 / 50 = 2.0, well past the critical ratio.
        assert_eq!(issues[0].severity, Severity::Critical);
    }

    #[test]
    fn category_without_data_raises_no_issue() {
        let analyzer = PerformanceAnalyzer::standard();
        let snapshot = snapshot_with(Vec::new());
        assert!(analyzer.identify_issues(&snapshot).is_empty());
    }

    #[test]
    fn issues_come_out_in_category_order() {
        let analyzer = PerformanceAnalyzer::standard();
        let mut samples = Vec::new();
        samples.extend(repeated(MetricCategory::Memory, 95.0, 5));
        samples.extend(repeated(MetricCategory::Cpu, 90.0, 5));
        samples.extend(repeated(MetricCategory::Latency, 2_000.0, 5));
        let snapshot = snapshot_with(samples);

        let issues = analyzer.identify_issues(&snapshot);
        let categories: Vec<MetricCategory> = issues.iter().map(|i| i.category).collect();
        assert_eq!(
            categories,
            vec![
                MetricCategory::Latency,
                MetricCategory::Cpu,
                MetricCategory::Memory
            ]
        );
    }

    #[test]
    fn rising_series_is_classified_increasing() {
        let analyzer = PerformanceAnalyzer::standard();
        let mut samples = repeated(MetricCategory::Latency, 100.0, 10);
        samples.extend(repeated(MetricCategory::Latency, 110.0, 10));
        let snapshot = snapshot_with(samples);

        let trend = analyzer.analyze_trend(MetricCategory::Latency, &snapshot);
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert!((trend.magnitude_pct - 10.0).abs() < 1e-9);
        assert_eq!(trend.first_mean, Some(100.0));
        assert_eq!(trend.second_mean, Some(110.0));
    }

    #[test]
    fn small_drift_is_classified_stable() {
        let analyzer = PerformanceAnalyzer::standard();
        let mut samples = repeated(MetricCategory::Cpu, 50.0, 10);
        samples.extend(repeated(MetricCategory::Cpu, 51.0, 10));
        let snapshot = snapshot_with(samples);

        let trend = analyzer.analyze_trend(MetricCategory::Cpu, &snapshot);
        assert_eq!(trend.direction, TrendDirection::Stable);
    }

    #[test]
    fn falling_series_is_classified_decreasing() {
        let analyzer = PerformanceAnalyzer::standard();
        let mut samples = repeated(MetricCategory::Memory, 80.0, 6);
        samples.extend(repeated(MetricCategory::Memory, 60.0, 6));
        let snapshot = snapshot_with(samples);

        let trend = analyzer.analyze_trend(MetricCategory::Memory, &snapshot);
        assert_eq!(trend.direction, TrendDirection::Decreasing);
        assert!((trend.magnitude_pct + 25.0).abs() < 1e-9);
    }

    #[test]
    fn single_sample_is_insufficient_for_a_trend() {
        let analyzer = PerformanceAnalyzer::standard();
        let snapshot = snapshot_with(vec![MetricSample::latency(10.0)]);
        let trend = analyzer.analyze_trend(MetricCategory::Latency, &snapshot);
        assert_eq!(trend.direction, TrendDirection::InsufficientData);
        assert_eq!(trend.sample_count, 1);
    }

    #[test]
    fn odd_count_gives_the_extra_sample_to_the_newer_half() {
        let classifier = StableBandClassifier::default();
        let samples: Vec<MetricSample> = [10.0, 20.0, 30.0]
            .iter()
            .map(|v| MetricSample::latency(*v))
            .collect();
        let trend = classifier.classify(MetricCategory::Latency, &samples);
        // Older half is [10], newer half is [20, 30].
        assert_eq!(trend.first_mean, Some(10.0));
        assert_eq!(trend.second_mean, Some(25.0));
    }

    #[test]
    fn zero_baseline_trend_does_not_panic() {
        let classifier = StableBandClassifier::default();
        let samples: Vec<MetricSample> = [0.0, 0.0, 0.0, 5.0]
            .iter()
            .map(|v| MetricSample::throughput(*v))
            .collect();
        let trend = classifier.classify(MetricCategory::Throughput, &samples);
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert!(trend.magnitude_pct.is_infinite());
    }

    fn timestamped(category: MetricCategory, value: f64, secs: i64) -> MetricSample {
        MetricSample::new(category, value).with_timestamp(Timestamp::from_secs(secs))
    }

    #[test]
    fn latency_drop_after_change_is_an_improvement() {
        let analyzer = PerformanceAnalyzer::standard();
        let mut samples = Vec::new();
        for s in 0..10 {
            samples.push(timestamped(MetricCategory::Latency, 200.0, s));
        }
        for s in 20..30 {
            samples.push(timestamped(MetricCategory::Latency, 100.0, s));
        }
        let snapshot = snapshot_with(samples);

        let impact =
            analyzer.analyze_impact(&snapshot, Timestamp::from_secs(10), Timestamp::from_secs(20));
        assert_eq!(impact.categories.len(), 1);
        let latency = &impact.categories[0];
        assert_eq!(latency.category, MetricCategory::Latency);
        assert_eq!(latency.verdict, ImpactVerdict::Improved);
        assert!((latency.change_pct + 50.0).abs() < 1e-9);
        assert!((latency.delta + 100.0).abs() < 1e-9);
        assert_eq!(impact.overall, ImpactVerdict::Improved);
    }

    #[test]
    fn throughput_drop_after_change_is_a_regression() {
        let analyzer = PerformanceAnalyzer::standard();
        let mut samples = Vec::new();
        for s in 0..10 {
            samples.push(timestamped(MetricCategory::Throughput, 500.0, s));
        }
        for s in 20..30 {
            samples.push(timestamped(MetricCategory::Throughput, 300.0, s));
        }
        let snapshot = snapshot_with(samples);

        let impact =
            analyzer.analyze_impact(&snapshot, Timestamp::from_secs(10), Timestamp::from_secs(20));
        assert_eq!(impact.categories[0].verdict, ImpactVerdict::Regressed);
        assert_eq!(impact.overall, ImpactVerdict::Regressed);
    }

    #[test]
    fn insignificant_change_is_neutral() {
        let analyzer = PerformanceAnalyzer::standard();
        let mut samples = Vec::new();
        for s in 0..10 {
            samples.push(timestamped(MetricCategory::Cpu, 50.0, s));
        }
        for s in 20..30 {
            samples.push(timestamped(MetricCategory::Cpu, 51.0, s));
        }
        let snapshot = snapshot_with(samples);

        let impact =
            analyzer.analyze_impact(&snapshot, Timestamp::from_secs(10), Timestamp::from_secs(20));
        assert_eq!(
            impact.categories[0].verdict,
            ImpactVerdict::NoSignificantChange
        );
        assert_eq!(impact.overall, ImpactVerdict::NoSignificantChange);
    }

    #[test]
    fn category_with_data_on_only_one_side_is_omitted() {
        let analyzer = PerformanceAnalyzer::standard();
        let samples = vec![
            timestamped(MetricCategory::Latency, 100.0, 5),
            timestamped(MetricCategory::Latency, 90.0, 25),
            // Memory has samples only after the change point.
            timestamped(MetricCategory::Memory, 60.0, 25),
        ];
        let snapshot = snapshot_with(samples);

        let impact =
            analyzer.analyze_impact(&snapshot, Timestamp::from_secs(10), Timestamp::from_secs(20));
        assert_eq!(impact.categories.len(), 1);
        assert_eq!(impact.categories[0].category, MetricCategory::Latency);
    }

    #[test]
    fn run_cycle_publishes_the_latest_report() {
        let analyzer = PerformanceAnalyzer::standard();
        assert_eq!(analyzer.last_report().sample_count, 0);

        let snapshot = snapshot_with(repeated(MetricCategory::Cpu, 90.0, 5));
        let report = analyzer.run_cycle(&snapshot);

        assert_eq!(report.sample_count, 5);
        assert_eq!(report.issues.len(), 1);
        // 90 / 80 = 1.125, inside the warning band.
        assert_eq!(report.issues[0].severity, Severity::Warning);
        assert!(!report.has_critical_issues());
        assert_eq!(analyzer.last_report().sample_count, 5);
        assert_eq!(analyzer.cycles_run(), 1);
    }

    #[test]
    fn custom_issue_rules_compose() {
        struct AlwaysFires;
        impl IssueRule for AlwaysFires {
            fn evaluate(&self, _: &[WindowStats; CATEGORY_COUNT], now: Timestamp) -> Vec<Issue> {
                vec![Issue {
                    kind: IssueKind::HighMemory,
                    category: MetricCategory::Memory,
                    severity: Severity::Warning,
                    observed: 0.0,
                    bound: 0.0,
                    statistic: ThresholdStatistic::Mean,
                    message: "synthetic".into(),
                    detected_at: now,
                }]
            }
        }

        let analyzer = PerformanceAnalyzer::standard().with_issue_rule(Box::new(AlwaysFires));
        let snapshot = snapshot_with(Vec::new());
        let issues = analyzer.identify_issues(&snapshot);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].message, "synthetic");
    }
}

// ============================================================================
// SECTION 19: MONITOR FACADE TESTS
// ============================================================================

#[cfg(test)]
mod monitor_tests {
    use super::*;

    #[test]
    fn record_helpers_route_to_the_right_category() {
        let monitor = PerformanceMonitor::standard();
        monitor.record_latency("parse", 12.5).unwrap();
        monitor.record_throughput(250.0).unwrap();
        monitor.record_cpu(40.0).unwrap();
        monitor.record_memory(55.0).unwrap();
        monitor.record_custom("queue_depth", 17.0, "items").unwrap();

        for category in MetricCategory::ALL {
            assert_eq!(monitor.buffer().len(category), 1, "{category}");
        }

        let latency = monitor.get_stats(MetricCategory::Latency);
        assert_eq!(latency.count, 1);
        assert_eq!(latency.mean, Some(12.5));
    }

    #[test]
    fn pull_interface_serves_the_cached_cycle() {
        let monitor = PerformanceMonitor::standard();
        for _ in 0..5 {
            monitor.record_cpu(95.0).unwrap();
        }
        // Nothing cached before the first cycle.
        assert!(monitor.get_issues().is_empty());
        assert_eq!(
            monitor.get_trend(MetricCategory::Cpu).unwrap().direction,
            TrendDirection::InsufficientData
        );

        monitor.run_analysis_cycle().unwrap();

        let issues = monitor.get_issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::HighCpu);
        assert_eq!(monitor.get_trends().len(), CATEGORY_COUNT);
        assert_eq!(
            monitor.get_trend(MetricCategory::Cpu).unwrap().direction,
            TrendDirection::Stable
        );
    }

    #[test]
    fn analysis_cycle_publishes_and_counts() {
        let monitor = PerformanceMonitor::standard();
        monitor.record_latency("op", 5.0).unwrap();

        let report = monitor.run_analysis_cycle().expect("no cycle in flight");
        assert_eq!(report.sample_count, 1);
        assert_eq!(monitor.last_report().sample_count, 1);
        assert_eq!(monitor.cycles_skipped(), 0);
    }

    #[test]
    fn overlapping_cycle_is_skipped_not_queued() {
        let monitor = PerformanceMonitor::standard();
        let guard = monitor.cycle_guard.lock();
        assert!(monitor.run_analysis_cycle().is_none());
        assert_eq!(monitor.cycles_skipped(), 1);
        drop(guard);
        assert!(monitor.run_analysis_cycle().is_some());
    }

    #[test]
    fn custom_thresholds_flow_through_from_config() {
        let toml_str = r#"
            [thresholds]
            cpu_usage = 50.0
        "#;
        let config = MonitorConfig::from_str(toml_str).unwrap();
        let monitor = PerformanceMonitor::from_config(&config).unwrap();
        for _ in 0..3 {
            monitor.record_cpu(55.0).unwrap();
        }
        let report = monitor.run_analysis_cycle().unwrap();
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].bound, 50.0);
    }

    #[tokio::test]
    async fn analysis_driver_runs_cycles_until_shutdown() {
        let monitor = Arc::new(PerformanceMonitor::standard());
        monitor.record_latency("op", 1.0).unwrap();

        let shutdown = Arc::new(Notify::new());
        let driver = Arc::clone(&monitor)
            .spawn_analysis_driver(Duration::from_millis(20), Arc::clone(&shutdown));

        tokio::time::sleep(Duration::from_millis(120)).await;
        shutdown.notify_one();
        driver.await.unwrap();

        assert!(monitor.analyzer().cycles_run() >= 1);
        assert_eq!(monitor.last_report().sample_count, 1);
    }
}

// ============================================================================
// SECTION 20: SIMULATOR & REPORT TESTS
// ============================================================================

#[cfg(test)]
mod simulator_tests {
    use super::*;

    #[test]
    fn builtin_scenarios_resolve() {
        for name in Scenario::BUILTIN {
            let scenario = Scenario::by_name(name).expect(name);
            assert!(!scenario.phases.is_empty());
        }
        assert!(Scenario::by_name("made_up").is_none());
    }

    #[test]
    fn spike_scenario_phases_in_order() {
        let scenario = Scenario::by_name("spike_test").unwrap();
        let total = Duration::from_secs(100);
        assert_eq!(
            scenario.shape_at(Duration::from_secs(10), total),
            WorkloadKind::Light
        );
        assert_eq!(
            scenario.shape_at(Duration::from_secs(50), total),
            WorkloadKind::Bursty
        );
        assert_eq!(
            scenario.shape_at(Duration::from_secs(90), total),
            WorkloadKind::Light
        );
    }

    #[test]
    fn short_simulation_feeds_the_monitor() {
        let monitor = PerformanceMonitor::standard();
        let scenario = Scenario::by_name("normal_load").unwrap();
        let summary = run_simulation(
            &monitor,
            &scenario,
            Duration::from_millis(600),
            2,
            Duration::from_millis(100),
        );

        assert!(summary.events_processed > 0);
        assert_eq!(
            summary.events_processed,
            monitor.buffer_stats().window_lens[MetricCategory::Latency.index()] as u64
        );
        assert!(monitor.buffer().len(MetricCategory::Throughput) > 0);
        assert!(monitor.buffer().len(MetricCategory::Cpu) > 0);
    }
}

#[cfg(test)]
mod report_tests {
    use super::*;

    fn sample_report() -> (AnalysisReport, BufferStatsSnapshot) {
        let monitor = PerformanceMonitor::standard();
        for _ in 0..5 {
            // 98 / 80 = 1.225, past the critical ratio.
            monitor.record_cpu(98.0).unwrap();
            monitor.record_latency("op", 12.0).unwrap();
        }
        let report = monitor.run_analysis_cycle().unwrap();
        let stats = monitor.buffer_stats();
        ((*report).clone(), stats)
    }

    #[test]
    fn console_report_names_every_category() {
        let (report, buffer) = sample_report();
        let rendered = render_console_report(&report, &buffer);
        for category in MetricCategory::ALL {
            assert!(rendered.contains(category.as_str()), "{category}");
        }
        assert!(rendered.contains("high_cpu"));
    }

    #[test]
    fn json_report_is_machine_readable() {
        let (report, buffer) = sample_report();
        let value = render_json_report(&report, &buffer);

        assert_eq!(value["engine"], ENGINE_NAME);
        assert_eq!(value["sample_count"], 10);
        assert_eq!(value["stats"]["cpu_usage"]["count"], 5);
        assert_eq!(value["issues"][0]["kind"], "high_cpu");
        assert_eq!(value["issues"][0]["severity"], "critical");
    }

    #[test]
    fn write_report_creates_the_file() {
        let (report, buffer) = sample_report();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_report(&report, &buffer, &path, true).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["engine"], ENGINE_NAME);
    }
}

// ============================================================================
// SECTION 21: PROPERTY-BASED TESTS
// ============================================================================
