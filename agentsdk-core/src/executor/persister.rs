//! Output persister: diverts large tool output to disk (§4.4 step 8, §6).
//!
//! Grounded on the dual-channel/metadata split in
//! `vtcode-core/src/tools/builder.rs`'s `ToolResponseBuilder` — here the
//! "channel" decision is made purely on output length rather than a
//! builder flag, since the executor has no UI to address separately.

use crate::tool::OutputRef;
use agentsdk_commons::utils::current_timestamp_nanos;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

#[async_trait]
pub trait OutputPersister: Send + Sync {
    /// Byte threshold past which this tool's output is diverted to disk.
    fn threshold_for(&self, tool_name: &str) -> usize;

    async fn persist(
        &self,
        session_id: &str,
        tool_name: &str,
        output: &str,
    ) -> std::io::Result<OutputRef>;
}

/// Writes diverted output under `<base>/<session_id or "default">/<tool_name>/<timestamp>.output`.
pub struct FileOutputPersister {
    base: PathBuf,
    default_threshold: usize,
    overrides: HashMap<String, usize>,
}

impl FileOutputPersister {
    pub fn new(base: impl Into<PathBuf>, default_threshold: usize) -> Self {
        Self {
            base: base.into(),
            default_threshold,
            overrides: HashMap::new(),
        }
    }

    pub fn with_threshold(mut self, tool_name: impl Into<String>, threshold: usize) -> Self {
        self.overrides.insert(tool_name.into(), threshold);
        self
    }
}

#[async_trait]
impl OutputPersister for FileOutputPersister {
    fn threshold_for(&self, tool_name: &str) -> usize {
        self.overrides
            .get(tool_name)
            .copied()
            .unwrap_or(self.default_threshold)
    }

    async fn persist(
        &self,
        session_id: &str,
        tool_name: &str,
        output: &str,
    ) -> std::io::Result<OutputRef> {
        let session = if session_id.is_empty() { "default" } else { session_id };
        let dir = self.base.join(session).join(tool_name);
        tokio::fs::create_dir_all(&dir).await?;
        let file = dir.join(format!("{}.output", current_timestamp_nanos()));
        tokio::fs::write(&file, output).await?;
        Ok(OutputRef {
            path: file.display().to_string(),
            size_bytes: output.len() as u64,
            truncated: false,
        })
    }
}
