//! Ordered selector matching: deny beats ask beats allow, mirroring the
//! teacher's `CommandPolicyEvaluator::allows_text` precedence ("Deny
//! takes precedence") but with a third, explicit "ask" tier instead of
//! the teacher's implicit default-allow.

use super::settings::PermissionSettings;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Deny,
    Ask,
    Allow,
}

struct CompiledRule {
    regex: Regex,
    source: String,
}

pub struct PermissionEngine {
    deny: Vec<CompiledRule>,
    ask: Vec<CompiledRule>,
    allow: Vec<CompiledRule>,
    default: Decision,
}

/// Canonicalize a selector the way the teacher trims/lowercases command
/// text before matching, so rule authors don't have to account for case
/// or incidental whitespace.
fn canonicalize(selector: &str) -> String {
    selector.trim().to_ascii_lowercase()
}

/// Compile a glob selector (`*` = any run of characters, `?` = exactly one
/// character) into an anchored, case-insensitive regex.
fn compile_glob(pattern: &str) -> Regex {
    let mut out = String::from("(?i)^");
    for ch in canonicalize(pattern).chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c if "\\.+()|[]{}^$".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    Regex::new(&out).unwrap_or_else(|_| Regex::new("^$").expect("empty regex always compiles"))
}

fn compile_rules(patterns: &[String]) -> Vec<CompiledRule> {
    patterns
        .iter()
        .map(|p| CompiledRule {
            regex: compile_glob(p),
            source: p.clone(),
        })
        .collect()
}

impl PermissionEngine {
    pub fn from_settings(settings: &PermissionSettings) -> Self {
        Self {
            deny: compile_rules(&settings.deny),
            ask: compile_rules(&settings.ask),
            allow: compile_rules(&settings.allow),
            default: settings.default,
        }
    }

    fn first_match<'a>(rules: &'a [CompiledRule], selector: &str) -> Option<&'a str> {
        rules
            .iter()
            .find(|r| r.regex.is_match(selector))
            .map(|r| r.source.as_str())
    }

    /// Evaluate a selector string (typically `<tool name>` or
    /// `<tool name> <primary argument>` for shell-executing tools)
    /// against the ordered deny/ask/allow lists, returning the decision
    /// and, when a rule fired, the selector pattern responsible.
    pub fn evaluate(&self, selector: &str) -> (Decision, Option<&str>) {
        let canon = canonicalize(selector);
        if let Some(src) = Self::first_match(&self.deny, &canon) {
            return (Decision::Deny, Some(src));
        }
        if let Some(src) = Self::first_match(&self.ask, &canon) {
            return (Decision::Ask, Some(src));
        }
        if let Some(src) = Self::first_match(&self.allow, &canon) {
            return (Decision::Allow, Some(src));
        }
        (self.default, None)
    }
}
