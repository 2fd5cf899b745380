//! Filesystem and command sandbox (§4.2): confines tool-initiated file
//! access to a workspace root (plus an explicit allow-list of extra
//! roots) and screens shell commands for metacharacters and known
//! destructive patterns.

pub mod command;
pub mod policy;
pub mod validate;

pub use command::{validate_command, CommandViolation};
pub use policy::{SandboxPolicy, SandboxPolicyBuilder};
pub use validate::{validate_path, PathViolation};
