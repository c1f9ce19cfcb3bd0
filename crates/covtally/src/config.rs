//! Configuration for recording, aggregation and verification.
//!
//! Every struct here is plain serde data so that whatever owns the config
//! file can produce it; the JSON helpers are conveniences for tools.

use crate::aggregate::Request;
use crate::diagnostics::Severity;
use crate::result::CovResult;
use crate::verify::Rule;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which file format the recorder writes on exit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Structured snapshot (class/line/branch records)
    #[default]
    Snapshot,
    /// Flat per-class hit arrays, attributed to lines later
    RawHits,
}

/// Recording configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Diagnostics below this severity are dropped
    pub diagnostic_threshold: Severity,
    /// Where [`crate::HitStore::save_on_exit`] writes
    pub output_path: Option<PathBuf>,
    /// Output format
    pub output_format: OutputFormat,
    /// Tag covered lines with the name of the test that covered them
    pub tag_tests: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            diagnostic_threshold: Severity::Warn,
            output_path: None,
            output_format: OutputFormat::Snapshot,
            tag_tests: false,
        }
    }
}

impl RecorderConfig {
    /// Create a builder for recorder config
    #[must_use]
    pub fn builder() -> RecorderConfigBuilder {
        RecorderConfigBuilder::default()
    }
}

/// Builder for recorder configuration
#[derive(Debug, Default)]
pub struct RecorderConfigBuilder {
    config: RecorderConfig,
}

impl RecorderConfigBuilder {
    /// Set the diagnostic threshold
    #[must_use]
    pub fn diagnostic_threshold(mut self, threshold: Severity) -> Self {
        self.config.diagnostic_threshold = threshold;
        self
    }

    /// Set the output path
    #[must_use]
    pub fn output_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.output_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the output format
    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    /// Enable per-test tagging
    #[must_use]
    pub fn tag_tests(mut self, enabled: bool) -> Self {
        self.config.tag_tests = enabled;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> RecorderConfig {
        self.config
    }
}

/// One aggregation request as written in a config file
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Class name patterns to include (regex, whole-name match)
    pub include: Vec<String>,
    /// Class name patterns to exclude (regex, whole-name match)
    pub exclude: Vec<String>,
    /// Where the merged snapshot for this request is written
    pub output: Option<PathBuf>,
}

impl RequestConfig {
    /// Compile patterns into a runtime request
    pub fn compile(&self) -> CovResult<Request> {
        Request::new(&self.include, &self.exclude, self.output.clone())
    }
}

/// Aggregation configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Requests, each producing one merged snapshot
    pub requests: Vec<RequestConfig>,
    /// Recorded coverage files (snapshot or raw-hits format)
    pub reports: Vec<PathBuf>,
    /// Module output roots establishing the class structure
    pub output_roots: Vec<PathBuf>,
    /// Diagnostics below this severity are dropped
    pub diagnostic_threshold: Severity,
}

impl AggregatorConfig {
    /// Parse from JSON
    pub fn from_json_str(json: &str) -> CovResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Compile every request
    pub fn compile_requests(&self) -> CovResult<Vec<Request>> {
        self.requests.iter().map(RequestConfig::compile).collect()
    }
}

/// Verification configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Rules in evaluation order
    pub rules: Vec<Rule>,
}

impl VerifierConfig {
    /// Parse from JSON
    pub fn from_json_str(json: &str) -> CovResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
