//! Kubernetes watch ingestion for kube-lookout.

pub mod source;

pub use source::{SnapshotDecoder, WatchCommand};
