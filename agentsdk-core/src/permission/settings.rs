//! `settings.json`-sourced permission rule lists (§6).

use super::engine::Decision;
use serde::Deserialize;

/// Permission rule lists as they appear under the `"permissions"` key of
/// `settings.json`. Unknown keys elsewhere in the document are tolerated
/// (§6: "parsing must not fail on an unrecognized top-level key").
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PermissionSettings {
    pub deny: Vec<String>,
    pub ask: Vec<String>,
    pub allow: Vec<String>,
    #[serde(with = "default_decision")]
    pub default: Decision,
}

impl Default for PermissionSettings {
    fn default() -> Self {
        Self {
            deny: Vec::new(),
            ask: Vec::new(),
            allow: Vec::new(),
            default: Decision::Ask,
        }
    }
}

/// `Decision` has no meaningful external representation beyond
/// "deny"/"ask"/"allow", so give it a tiny hand-rolled serde adapter
/// rather than deriving (De)serialize on the enum itself, keeping the
/// wire vocabulary separate from the in-memory one used by the engine.
mod default_decision {
    use super::Decision;
    use serde::de::{self, Deserializer};
    use serde::Deserialize;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Decision, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match raw.as_str() {
            "deny" => Ok(Decision::Deny),
            "ask" => Ok(Decision::Ask),
            "allow" => Ok(Decision::Allow),
            other => Err(de::Error::custom(format!(
                "unknown default permission decision '{other}', expected deny/ask/allow"
            ))),
        }
    }
}

impl PermissionSettings {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct Document {
            #[serde(default)]
            permissions: PermissionSettings,
        }
        let doc: Document = serde_json::from_str(raw)?;
        Ok(doc.permissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_permissions_key_yields_defaults() {
        let settings = PermissionSettings::parse("{}").unwrap();
        assert!(settings.deny.is_empty());
        assert_eq!(settings.default, Decision::Ask);
    }

    #[test]
    fn unknown_top_level_keys_are_tolerated() {
        let settings = PermissionSettings::parse(
            r#"{"unrelated_feature": true, "permissions": {"allow": ["git status"]}}"#,
        )
        .unwrap();
        assert_eq!(settings.allow, vec!["git status".to_string()]);
    }

    #[test]
    fn full_rule_set_parses() {
        let settings = PermissionSettings::parse(
            r#"{
                "permissions": {
                    "deny": ["rm *"],
                    "ask": ["git push*"],
                    "allow": ["cargo *"],
                    "default": "deny"
                }
            }"#,
        )
        .unwrap();
        assert_eq!(settings.deny, vec!["rm *".to_string()]);
        assert_eq!(settings.default, Decision::Deny);
    }
}
