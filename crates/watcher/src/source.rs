//! Workload snapshots from a `kubectl ... --watch --output json` process.
//!
//! The watch prints concatenated JSON documents on stdout, either bare
//! Deployment objects or `{type, object}` watch events. Documents may span
//! several reads, so output is buffered until a complete value parses.

use std::process::Stdio;

use chrono::{DateTime, Utc};
use futures::SinkExt;
use futures::channel::mpsc;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

use lookout_common::error::{LookoutError, Result};
use lookout_common::types::{
    Condition, ConditionStatus, ContainerImage, WorkloadKey, WorkloadSnapshot,
};

const READ_CHUNK: usize = 8192;
const CHANNEL_CAPACITY: usize = 64;

// ============================================================
// Wire format
// ============================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Deployment {
    metadata: ObjectMeta,
    #[serde(default)]
    spec: DeploymentSpec,
    #[serde(default)]
    status: DeploymentStatus,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
    namespace: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentSpec {
    replicas: Option<u32>,
    #[serde(default)]
    template: PodTemplate,
}

#[derive(Debug, Default, Deserialize)]
struct PodTemplate {
    #[serde(default)]
    spec: PodSpec,
}

#[derive(Debug, Default, Deserialize)]
struct PodSpec {
    #[serde(default)]
    containers: Vec<ContainerImage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentStatus {
    ready_replicas: Option<u32>,
    updated_replicas: Option<u32>,
    unavailable_replicas: Option<u32>,
    #[serde(default)]
    conditions: Vec<DeploymentCondition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentCondition {
    #[serde(rename = "type")]
    kind: String,
    status: String,
    #[serde(default)]
    message: String,
    last_update_time: Option<DateTime<Utc>>,
    last_transition_time: Option<DateTime<Utc>>,
}

/// One top-level document on the watch output.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WatchDocument {
    Event {
        #[serde(rename = "type")]
        kind: String,
        object: Deployment,
    },
    List {
        items: Vec<Deployment>,
    },
    Object(Deployment),
}

impl WatchDocument {
    fn into_snapshots(self) -> Vec<WorkloadSnapshot> {
        match self {
            WatchDocument::Event { kind, object } if kind == "DELETED" => {
                tracing::debug!(name = %object.metadata.name, "Skipping deleted deployment");
                vec![]
            }
            WatchDocument::Event { object, .. } | WatchDocument::Object(object) => {
                vec![object.into()]
            }
            WatchDocument::List { items } => items.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Deployment> for WorkloadSnapshot {
    fn from(deployment: Deployment) -> Self {
        let Deployment {
            metadata,
            spec,
            status,
        } = deployment;
        WorkloadSnapshot {
            key: WorkloadKey::new(
                metadata.namespace.unwrap_or_else(|| "default".to_string()),
                metadata.name,
            ),
            desired: spec.replicas.unwrap_or(1),
            ready: status.ready_replicas,
            updated: status.updated_replicas,
            unavailable: status.unavailable_replicas,
            conditions: status
                .conditions
                .into_iter()
                .map(|c| Condition {
                    status: ConditionStatus::from(c.status.as_str()),
                    timestamp: c.last_update_time.or(c.last_transition_time),
                    kind: c.kind,
                    message: c.message,
                })
                .collect(),
            containers: spec.template.spec.containers,
        }
    }
}

// ============================================================
// Incremental decoder
// ============================================================

/// Splits a byte stream of concatenated JSON documents into snapshots.
///
/// Document boundaries are found by tracking bracket depth outside string
/// literals, so every byte is scanned once and each document is parsed once
/// it is complete, however many reads it spans.
#[derive(Debug, Default)]
pub struct SnapshotDecoder {
    buf: Vec<u8>,
    /// Prefix of `buf` already scanned for boundaries.
    scanned: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl SnapshotDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more output; returns every snapshot completed by it.
    ///
    /// A malformed document yields one error; decoding resumes with the
    /// next document.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<WorkloadSnapshot>> {
        self.buf.extend_from_slice(chunk);

        let mut out = Vec::new();
        let mut start = 0;
        let mut pos = self.scanned;
        while pos < self.buf.len() {
            let byte = self.buf[pos];
            pos += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }
            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        out.extend(decode_document(&self.buf[start..pos]));
                        start = pos;
                    }
                }
                _ => {}
            }
        }

        self.buf.drain(..start);
        self.scanned = self.buf.len();
        out
    }

    /// Check that the output did not end halfway through a document.
    pub fn finish(&mut self) -> Result<()> {
        let trailing = std::mem::take(self).buf;
        if trailing.iter().all(u8::is_ascii_whitespace) {
            Ok(())
        } else {
            Err(LookoutError::Watch(format!(
                "watch output ended inside a document ({} bytes pending)",
                trailing.len()
            )))
        }
    }
}

fn decode_document(bytes: &[u8]) -> Vec<Result<WorkloadSnapshot>> {
    match serde_json::from_slice::<WatchDocument>(bytes) {
        Ok(document) => document.into_snapshots().into_iter().map(Ok).collect(),
        Err(e) => vec![Err(LookoutError::Watch(format!(
            "malformed watch document: {e}"
        )))],
    }
}

// ============================================================
// Watch process
// ============================================================

/// A command line whose stdout streams Deployment documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchCommand {
    program: String,
    args: Vec<String>,
}

impl WatchCommand {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a whitespace-separated command line. No shell quoting.
    pub fn parse(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| LookoutError::Config("watch command is empty".to_string()))?;
        Ok(Self::new(program, parts))
    }

    /// Start the process and stream its snapshots.
    ///
    /// The stream ends when the process exits successfully. A non-zero exit
    /// or unreadable output is delivered as a final `Watch` error. Dropping
    /// the receiver kills the process.
    pub fn spawn(&self) -> Result<mpsc::Receiver<Result<WorkloadSnapshot>>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LookoutError::Watch(format!("failed to start {}: {e}", self.program)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LookoutError::Watch("watch process has no stdout".to_string()))?;

        tracing::info!(program = %self.program, args = ?self.args, "Watch started");

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(pump(child, stdout, tx));
        Ok(rx)
    }
}

async fn pump(
    mut child: Child,
    mut stdout: ChildStdout,
    mut tx: mpsc::Sender<Result<WorkloadSnapshot>>,
) {
    let mut decoder = SnapshotDecoder::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = match stdout.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                let _ = tx
                    .send(Err(LookoutError::Watch(format!("reading watch output: {e}"))))
                    .await;
                return;
            }
        };
        for item in decoder.push(&chunk[..n]) {
            if tx.send(item).await.is_err() {
                // Receiver dropped
                return;
            }
        }
    }

    if let Err(e) = decoder.finish() {
        let _ = tx.send(Err(e)).await;
        return;
    }

    let outcome = match child.wait().await {
        Ok(status) if status.success() => {
            tracing::info!("Watch process exited cleanly");
            return;
        }
        Ok(status) => LookoutError::Watch(format!("watch process exited with {status}")),
        Err(e) => LookoutError::Watch(format!("waiting for watch process: {e}")),
    };
    let _ = tx.send(Err(outcome)).await;
}
