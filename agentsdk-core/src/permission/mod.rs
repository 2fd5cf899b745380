//! Permission engine (§4.3): evaluates a tool call against ordered
//! deny/ask/allow selector lists loaded from `settings.json` (§6).

pub mod engine;
pub mod settings;

pub use engine::{Decision, PermissionEngine};
pub use settings::PermissionSettings;
