use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::{ReportError, Result};
use crate::fetch::RetryPolicy;

/// Plain-value configuration for one report run. The CLI (or any other
/// entry point) builds this once and passes it down; no component reads the
/// environment on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Patch-baseline name prefixes to query.
    pub baseline_prefixes: Vec<String>,
    /// Destination identifier handed to the upload sink.
    pub bucket: String,
    /// Directory the workbook is written into.
    pub output_dir: PathBuf,
    /// Retry policy shared by every network-calling component.
    pub retry: RetryPolicy,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            baseline_prefixes: vec![
                "WindowsApprovedPatches".to_string(),
                "AmazonLinuxApprovedPatches".to_string(),
                "LinuxApprovedPatches".to_string(),
            ],
            bucket: "madhav-ssm-logs".to_string(),
            output_dir: PathBuf::from("."),
            retry: RetryPolicy::default(),
        }
    }
}

/// Installs the global tracing subscriber using the given filter directive.
/// The directive is an explicit configuration value, not something read
/// lazily from the environment by the components themselves.
pub fn init_logging(directive: &str) -> Result<()> {
    let filter =
        EnvFilter::try_new(directive).map_err(|error| ReportError::Logging(error.to_string()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|error| ReportError::Logging(error.to_string()))
}
