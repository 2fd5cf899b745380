//! Tool result type and the persisted-output reference invariant.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reference to a large tool output that was diverted to disk by the
/// output persister (§4.4 step 8).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputRef {
    pub path: String,
    pub size_bytes: u64,
    pub truncated: bool,
}

/// Result carried by a completed tool execution.
///
/// Invariant: when `output_ref` is `Some`, `output` is exactly
/// `"[Output saved to: " + path + "]"`. Constructors here enforce it so
/// callers cannot build an inconsistent result by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub data: Option<Value>,
    pub output_ref: Option<OutputRef>,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
            output_ref: None,
        }
    }

    pub fn success_with_data(output: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: Some(data),
            output_ref: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
            data: None,
            output_ref: None,
        }
    }

    /// Replace `output` with the persisted-output reference, maintaining
    /// the invariant between `output` and `output_ref`.
    pub fn with_output_ref(mut self, output_ref: OutputRef) -> Self {
        self.output = format!("[Output saved to: {}]", output_ref.path);
        self.output_ref = Some(output_ref);
        self
    }

    /// True iff the invariant linking `output` to `output_ref` holds.
    pub fn invariant_holds(&self) -> bool {
        match &self.output_ref {
            None => true,
            Some(r) => self.output == format!("[Output saved to: {}]", r.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_has_no_output_ref() {
        let r = ToolResult::success("hi");
        assert!(r.success);
        assert_eq!(r.output, "hi");
        assert!(r.output_ref.is_none());
        assert!(r.invariant_holds());
    }

    #[test]
    fn with_output_ref_maintains_invariant() {
        let r = ToolResult::success("123456").with_output_ref(OutputRef {
            path: "/tmp/s/tool/1.output".into(),
            size_bytes: 6,
            truncated: false,
        });
        assert_eq!(r.output, "[Output saved to: /tmp/s/tool/1.output]");
        assert!(r.invariant_holds());
    }
}
