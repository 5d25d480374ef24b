//! Standardized metrics collection and reporting for CI/CD integration.
//!
//! Worldtests build a [`MetricsReport`] describing how the simulation behaved
//! and export it as JSON for regression tracking.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Top-level metrics report containing all subsystem metrics.
///
/// This is the standardized format for metrics.json files exported by tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    /// Test/benchmark identifier
    pub test_name: String,

    /// Timestamp when metrics were collected (ISO 8601)
    pub timestamp: String,

    /// Git commit hash (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,

    /// Overall test result
    pub result: TestResult,

    /// Entity population metrics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<EntityMetrics>,

    /// Activation/deactivation metrics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<LifecycleMetrics>,

    /// Tick scheduling metrics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerMetrics>,

    /// Block save metrics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence: Option<PersistenceMetrics>,

    /// Test execution metrics
    pub test_execution: TestExecutionMetrics,
}

/// Overall test result status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResult {
    /// Test passed all validations
    Pass,
    /// Test failed
    Fail,
    /// Test was skipped
    Skip,
}

/// Entity population over a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMetrics {
    /// Entities registered during the run
    pub total_spawned: usize,

    /// Entities destroyed by sweeps
    pub total_destroyed: usize,

    /// Entities registered at the end of the run
    pub alive_at_end: usize,

    /// Peak registered entity count
    pub peak_alive: usize,

    /// Breakdown of live entities by species or kind
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_kind: Option<BTreeMap<String, usize>>,
}

/// Entity lifecycle metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleMetrics {
    /// Entities moved from static lists into the registry
    pub activated: u64,

    /// Entities stored into static lists
    pub stored: u64,

    /// Deactivations deferred because clients still knew the entity
    pub deferred: u64,

    /// Static records kept because they failed to reconstruct
    pub reconstruction_failures: u64,

    /// Blocks whose static list was purged as corrupt
    pub purged_blocks: u64,
}

/// Tick scheduling metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerMetrics {
    /// Ticks simulated
    pub ticks: u64,

    /// Simulated seconds
    pub simulated_seconds: f64,

    /// Average wall time per tick (microseconds)
    pub avg_tick_time_us: f64,

    /// Messages drained from the outbox
    pub messages_sent: u64,

    /// Ambient events emitted
    pub ambient_events: u64,
}

/// Block save metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceMetrics {
    /// Blocks written to the archive
    pub blocks_saved: usize,

    /// Total compressed bytes held by the archive
    pub bytes_written: u64,
}

/// Test execution and infrastructure metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestExecutionMetrics {
    /// Total test duration (seconds)
    pub duration_seconds: f64,

    /// Number of assertions checked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertions_checked: Option<usize>,

    /// Number of validations passed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validations_passed: Option<usize>,
}

/// Builder for constructing metrics reports
pub struct MetricsReportBuilder {
    report: MetricsReport,
}

impl MetricsReportBuilder {
    /// Create a new builder with test name
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            report: MetricsReport {
                test_name: test_name.into(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                commit_hash: None,
                result: TestResult::Pass,
                entities: None,
                lifecycle: None,
                scheduler: None,
                persistence: None,
                test_execution: TestExecutionMetrics {
                    duration_seconds: 0.0,
                    assertions_checked: None,
                    validations_passed: None,
                },
            },
        }
    }

    /// Set test result
    pub fn result(mut self, result: TestResult) -> Self {
        self.report.result = result;
        self
    }

    /// Set commit hash
    pub fn commit_hash(mut self, hash: impl Into<String>) -> Self {
        self.report.commit_hash = Some(hash.into());
        self
    }

    /// Set entity metrics
    pub fn entities(mut self, metrics: EntityMetrics) -> Self {
        self.report.entities = Some(metrics);
        self
    }

    /// Set lifecycle metrics
    pub fn lifecycle(mut self, metrics: LifecycleMetrics) -> Self {
        self.report.lifecycle = Some(metrics);
        self
    }

    /// Set scheduler metrics
    pub fn scheduler(mut self, metrics: SchedulerMetrics) -> Self {
        self.report.scheduler = Some(metrics);
        self
    }

    /// Set persistence metrics
    pub fn persistence(mut self, metrics: PersistenceMetrics) -> Self {
        self.report.persistence = Some(metrics);
        self
    }

    /// Set test execution metrics
    pub fn execution(mut self, metrics: TestExecutionMetrics) -> Self {
        self.report.test_execution = metrics;
        self
    }

    /// Build the metrics report
    pub fn build(self) -> MetricsReport {
        self.report
    }
}

/// Sink for writing metrics reports to JSON files
pub struct MetricsSink {
    path: std::path::PathBuf,
}

impl MetricsSink {
    /// Create a new metrics sink at the specified path
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(Self { path })
    }

    /// Write metrics report to file
    pub fn write(&self, report: &MetricsReport) -> Result<()> {
        let json = serde_json::to_string_pretty(report)?;
        let mut file = File::create(&self.path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
