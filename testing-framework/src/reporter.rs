// File: testing-framework/src/reporter.rs
//
// Execution Reporter
//
// Records every build step, handshake step, relay loop event and teardown
// step of a topology. When a build fails the record is written next to a
// snapshot of the topology as a JSON report, so the failure can be inspected
// without rerunning.

use crate::link::{HandshakeRecord, LinkState};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

/// Outcome of a recorded step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Step completed
    Ok,
    /// Step failed
    Failed,
}

/// One recorded step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecEvent {
    /// RFC 3339 timestamp at completion
    pub timestamp: String,
    /// Component the step ran against (`network`, `chain:gaia`, `link:gaia-osmo`)
    pub component: String,
    /// Step name
    pub action: String,
    /// Outcome
    pub outcome: Outcome,
    /// Step duration (milliseconds)
    pub duration_ms: u64,
    /// Error text for failed steps
    pub detail: Option<String>,
}

/// Chain entry of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    /// Logical name
    pub name: String,
    /// Chain id
    pub chain_id: String,
    /// Protocol family
    pub family: String,
    /// Lifecycle state at report time
    pub state: String,
}

/// Link entry of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSnapshot {
    /// Path name
    pub path: String,
    /// Chain A name
    pub chain_a: String,
    /// Chain B name
    pub chain_b: String,
    /// Relayer name
    pub relayer: String,
    /// Handshake state
    pub state: String,
    /// Confirmed artifacts
    pub record: serde_json::Value,
}

impl LinkSnapshot {
    /// Snapshot from a link's current record
    pub fn new(
        path: &str,
        chain_a: &str,
        chain_b: &str,
        relayer: &str,
        state: LinkState,
        record: &HandshakeRecord,
    ) -> Self {
        Self {
            path: path.to_string(),
            chain_a: chain_a.to_string(),
            chain_b: chain_b.to_string(),
            relayer: relayer.to_string(),
            state: state.to_string(),
            record: serde_json::to_value(record).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Report metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Test name
    pub test_name: String,
    /// Correlation label (`key=value`)
    pub label: String,
    /// Seed of the run's RNG
    pub rng_seed: Option<u64>,
    /// RFC 3339 timestamp of report creation
    pub timestamp: String,
    /// Time since the reporter was created (milliseconds)
    pub duration_ms: u64,
    /// Rendered build error
    pub failure_reason: Option<String>,
}

/// Full JSON report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Metadata
    pub metadata: ReportMetadata,
    /// Chains
    pub chains: Vec<ChainSnapshot>,
    /// Relayer names
    pub relayers: Vec<String>,
    /// Links
    pub links: Vec<LinkSnapshot>,
    /// Recorded steps, in completion order
    pub events: Vec<ExecEvent>,
    /// Problems reported by teardown
    pub teardown_issues: Vec<String>,
}

impl BuildReport {
    /// Write the report as pretty JSON into `output_dir`, returning the file
    /// path
    pub async fn save(&self, output_dir: impl AsRef<Path>) -> Result<PathBuf> {
        let output_dir = output_dir.as_ref();
        fs::create_dir_all(output_dir)
            .await
            .context("Failed to create report directory")?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let filename = format!("{}_{}.json", sanitize(&self.metadata.test_name), timestamp);
        let filepath = output_dir.join(filename);

        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;

        let mut file = fs::File::create(&filepath)
            .await
            .context("Failed to create report file")?;
        file.write_all(json.as_bytes())
            .await
            .context("Failed to write report data")?;
        file.flush().await.context("Failed to flush report file")?;

        Ok(filepath)
    }

    /// Load a report written by `save`
    pub async fn load(filepath: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(filepath.as_ref())
            .await
            .context("Failed to read report file")?;
        serde_json::from_str(&content).context("Failed to parse report JSON")
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Thread-safe step recorder shared by every component of a topology
pub struct ExecReporter {
    test_name: String,
    started: Instant,
    events: Mutex<Vec<ExecEvent>>,
}

impl ExecReporter {
    /// Reporter for `test_name`
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            started: Instant::now(),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Test name this reporter was created for
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// Record a completed step
    pub fn record(
        &self,
        component: impl Into<String>,
        action: impl Into<String>,
        started: Instant,
        failure: Option<String>,
    ) {
        let event = ExecEvent {
            timestamp: chrono::Utc::now().to_rfc3339(),
            component: component.into(),
            action: action.into(),
            outcome: if failure.is_some() {
                Outcome::Failed
            } else {
                Outcome::Ok
            },
            duration_ms: started.elapsed().as_millis() as u64,
            detail: failure,
        };
        self.events.lock().push(event);
    }

    /// Run `fut` and record its outcome
    pub async fn track<T, E, F>(&self, component: &str, action: &str, fut: F) -> Result<T, E>
    where
        E: fmt::Display,
        F: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let result = fut.await;
        let failure = result.as_ref().err().map(|e| format!("{:#}", e));
        self.record(component, action, started, failure);
        result
    }

    /// Snapshot of recorded events
    pub fn events(&self) -> Vec<ExecEvent> {
        self.events.lock().clone()
    }

    /// Events for one component
    pub fn events_for(&self, component: &str) -> Vec<ExecEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.component == component)
            .cloned()
            .collect()
    }

    /// Time since creation (milliseconds)
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

impl fmt::Debug for ExecReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecReporter")
            .field("test_name", &self.test_name)
            .field("events", &self.events.lock().len())
            .finish()
    }
}
