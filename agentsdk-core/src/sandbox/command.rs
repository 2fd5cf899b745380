//! Shell-command screening: metacharacter rejection and a small hardcoded
//! list of destructive commands, scaled down from the teacher's
//! `command_safety/dangerous_commands.rs` (which additionally parses
//! chained `bash -c "..."` scripts; this subset only needs the leaf
//! check since chaining is rejected outright by the metacharacter scan).

use super::policy::SandboxPolicy;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandViolation {
    #[error("command contains a disallowed shell metacharacter: {0}")]
    Metacharacter(char),
    #[error("command '{0}' is blocked as destructive")]
    Destructive(String),
    #[error("argument '{0}' contains a path traversal component")]
    PathTraversal(String),
}

const SHELL_METACHARACTERS: &[char] = &['|', '&', ';', '$', '`', '\n', '<', '>', '(', ')'];

/// Commands that are never allowed regardless of arguments, mirroring the
/// teacher's hardcoded-destructive-command rationale (commands that are
/// "inherently destructive ... regardless of their options").
const ALWAYS_BLOCKED: &[&str] = &["mkfs", "dd", "shutdown", "reboot", "init"];

fn contains_metacharacter(arg: &str) -> Option<char> {
    arg.chars().find(|c| SHELL_METACHARACTERS.contains(c))
}

fn is_destructive(command: &[String]) -> Option<String> {
    let head = command.first()?;
    let base = head.rsplit('/').next().unwrap_or(head);
    if ALWAYS_BLOCKED.contains(&base) {
        return Some(base.to_string());
    }
    if base == "rm" && command.iter().any(|a| a == "-rf" || a == "-fr") {
        return Some("rm -rf".to_string());
    }
    if base == "git"
        && command.windows(2).any(|w| w[0] == "reset" && w[1] == "--hard")
    {
        return Some("git reset --hard".to_string());
    }
    None
}

fn contains_traversal(arg: &str) -> bool {
    std::path::Path::new(arg)
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
}

/// Validate a command vector against the sandbox's metacharacter policy,
/// the destructive-command list, and `..` path traversal in arguments.
pub fn validate_command(policy: &SandboxPolicy, command: &[String]) -> Result<(), CommandViolation> {
    if !policy.allow_shell_metacharacters {
        for arg in command {
            if let Some(ch) = contains_metacharacter(arg) {
                return Err(CommandViolation::Metacharacter(ch));
            }
        }
    }
    if let Some(name) = is_destructive(command) {
        return Err(CommandViolation::Destructive(name));
    }
    for arg in command {
        if contains_traversal(arg) {
            return Err(CommandViolation::PathTraversal(arg.clone()));
        }
    }
    Ok(())
}
