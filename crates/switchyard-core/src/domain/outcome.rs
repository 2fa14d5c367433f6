//! Execution results reported back by backends.
//!
//! Backends report their output in their own shape. The router keeps it as
//! JSON plus a list of artifacts so dashboards can render it without knowing
//! which backend produced it.

use serde::{Deserialize, Serialize};

/// A reference to something produced or observed during execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Artifact {
    /// Standard output captured from a command, etc.
    Stdout(String),

    /// Standard error captured from a command, etc.
    Stderr(String),

    /// Path to a file produced/used.
    FilePath(String),

    /// URL reference (e.g., a generated report).
    Url(String),

    /// Arbitrary JSON payload (structured observation/output).
    Json(serde_json::Value),
}

/// Result carried by a `Completed` status.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default)]
    pub output: serde_json::Value,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
}

impl ExecutionResult {
    pub fn new(output: serde_json::Value) -> Self {
        Self {
            output,
            artifacts: Vec::new(),
        }
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }
}
