//! Todo middleware (§4.6): restores a task-list snapshot from context,
//! then on every `after_step` extracts new tasks from free-form text
//! written by a node and applies them, emitting progress events.
//!
//! Grounded on the builtin todo tool pattern scattered across agent
//! frameworks (checklist/numbered/JSON extraction); this middleware
//! applies the same extraction to the step's output text rather than to a
//! dedicated tool call. Each `after_step` treats the extracted list as the
//! full current state of the checklist: tasks missing from it relative to
//! the prior snapshot are reported via `todo_deleted`.

use super::{Middleware, Step};
use crate::error::AgentError;
use crate::workflow::context::ExecutionContext;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

pub const SNAPSHOT_KEY: &str = "todo_snapshot";
pub const TEXT_KEY: &str = "text";
pub const PROGRESS_EVENTS_KEY: &str = "progress_events";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub text: String,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoListSnapshot {
    pub tasks: Vec<Task>,
}

impl TodoListSnapshot {
    /// Accept a full snapshot, a bare task list, a JSON byte string, or a
    /// plain string, per §4.6's "snapshot, task slice, bytes, or string
    /// forms".
    fn from_value(raw: serde_json::Value) -> Option<Self> {
        if let Ok(snapshot) = serde_json::from_value::<TodoListSnapshot>(raw.clone()) {
            return Some(snapshot);
        }
        if let Ok(tasks) = serde_json::from_value::<Vec<Task>>(raw.clone()) {
            return Some(TodoListSnapshot { tasks });
        }
        if let Some(text) = raw.as_str() {
            if let Ok(tasks) = serde_json::from_str::<Vec<Task>>(text) {
                return Some(TodoListSnapshot { tasks });
            }
            return Some(TodoListSnapshot {
                tasks: extract_tasks(text),
            });
        }
        None
    }
}

fn checklist_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*-\s*\[( |x|X)\]\s*(.+?)\s*$").unwrap())
}

fn numbered_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*\d+[.)]\s*(.+?)\s*$").unwrap())
}

/// Trailing status hints: `(done)`, `[in progress]`, ` - completed`,
/// `status: pending`.
fn status_hint_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)[\(\[]\s*(pending|in.progress|completed|done)\s*[\)\]]$|\s-\s*(pending|in.progress|completed|done)$|status:\s*(pending|in.progress|completed|done)$").unwrap()
    })
}

fn parse_status_hint(text: &str) -> (String, TaskStatus) {
    if let Some(caps) = status_hint_regex().captures(text) {
        let raw = caps
            .iter()
            .skip(1)
            .flatten()
            .next()
            .map(|m| m.as_str().to_ascii_lowercase())
            .unwrap_or_default();
        let status = match raw.replace([' ', '_'], "").as_str() {
            "inprogress" => TaskStatus::InProgress,
            "completed" | "done" => TaskStatus::Completed,
            _ => TaskStatus::Pending,
        };
        let clean = status_hint_regex().replace(text, "").trim().to_string();
        return (clean, status);
    }
    (text.to_string(), TaskStatus::Pending)
}

fn extract_tasks(text: &str) -> Vec<Task> {
    if let Ok(tasks) = serde_json::from_str::<Vec<Task>>(text) {
        return tasks;
    }

    let mut tasks = Vec::new();
    for caps in checklist_regex().captures_iter(text) {
        let checked = matches!(&caps[1], "x" | "X");
        let (body, hint_status) = parse_status_hint(&caps[2]);
        let status = if checked { TaskStatus::Completed } else { hint_status };
        tasks.push(Task { text: body, status });
    }
    if tasks.is_empty() {
        for caps in numbered_regex().captures_iter(text) {
            let (body, status) = parse_status_hint(&caps[1]);
            tasks.push(Task { text: body, status });
        }
    }
    tasks
}

pub struct TodoMiddleware {
    restored: std::sync::atomic::AtomicBool,
}

impl Default for TodoMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl TodoMiddleware {
    pub fn new() -> Self {
        Self {
            restored: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn push_event(ctx: &ExecutionContext, event: &str, text: &str) {
        let mut events = ctx
            .get(PROGRESS_EVENTS_KEY)
            .and_then(|v| serde_json::from_value::<Vec<serde_json::Value>>(v).ok())
            .unwrap_or_default();
        events.push(serde_json::json!({"event": event, "task": text}));
        ctx.set(PROGRESS_EVENTS_KEY, serde_json::json!(events));
    }
}

#[async_trait]
impl Middleware for TodoMiddleware {
    async fn before_step(&self, ctx: &Arc<ExecutionContext>, _step: &Step) -> Result<(), AgentError> {
        use std::sync::atomic::Ordering;
        if self.restored.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(raw) = ctx.get(SNAPSHOT_KEY) {
            if let Some(snapshot) = TodoListSnapshot::from_value(raw) {
                ctx.set(SNAPSHOT_KEY, serde_json::to_value(&snapshot).unwrap());
            }
        }
        Ok(())
    }

    async fn after_step(
        &self,
        ctx: &Arc<ExecutionContext>,
        _step: &Step,
        _run_error: Option<&AgentError>,
    ) -> Result<(), AgentError> {
        let Some(text) = ctx.get(TEXT_KEY).and_then(|v| v.as_str().map(str::to_string)) else {
            return Ok(());
        };
        let extracted = extract_tasks(&text);
        if extracted.is_empty() {
            return Ok(());
        }

        let snapshot: TodoListSnapshot = ctx
            .get(SNAPSHOT_KEY)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        // `extracted` is parsed fresh from the step's full text each time, so
        // it represents the current state of the whole list: tasks present
        // before but absent now were removed.
        let mut merged: Vec<Task> = Vec::with_capacity(extracted.len());
        for task in &extracted {
            match snapshot.tasks.iter().find(|t| t.text == task.text) {
                Some(existing) if existing.status != task.status => {
                    Self::push_event(ctx, "todo_status", &task.text);
                }
                Some(_) => {}
                None => {
                    Self::push_event(ctx, "todo_added", &task.text);
                }
            }
            merged.push(task.clone());
        }
        for existing in &snapshot.tasks {
            if !extracted.iter().any(|t| t.text == existing.text) {
                Self::push_event(ctx, "todo_deleted", &existing.text);
            }
        }

        ctx.set(SNAPSHOT_KEY, serde_json::to_value(&TodoListSnapshot { tasks: merged }).unwrap());
        Ok(())
    }
}
