pub mod add_task;
pub mod complete_task;
pub mod delete_task;
pub mod list_tasks;
pub mod update_task;

use serde_json::{Map, Value};

use crate::core::store::{Store, Task};

/// Result from executing a tool. `message` is user-facing and, when present,
/// replaces the interpreter's reply text; `error` is machine-readable.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub success: bool,
    pub message: Option<String>,
    pub error: Option<String>,
    pub task: Option<Task>,
    pub tasks: Option<Vec<Task>>,
}

impl ToolResult {
    pub fn ok(message: String) -> Self {
        Self {
            success: true,
            message: Some(message),
            error: None,
            task: None,
            tasks: None,
        }
    }

    pub fn ok_with_task(message: String, task: Task) -> Self {
        Self {
            task: Some(task),
            ..Self::ok(message)
        }
    }

    pub fn ok_with_tasks(message: String, tasks: Vec<Task>) -> Self {
        Self {
            tasks: Some(tasks),
            ..Self::ok(message)
        }
    }

    pub fn fail(error: String, message: String) -> Self {
        Self {
            success: false,
            message: Some(message),
            error: Some(error),
            task: None,
            tasks: None,
        }
    }

    /// Failure with no user-facing message; the orchestrator renders the
    /// error string instead.
    pub fn fail_bare(error: String) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error),
            task: None,
            tasks: None,
        }
    }
}

/// Tool schemas advertised to the interpreter.
pub fn definitions() -> Vec<Value> {
    vec![
        add_task::definition(),
        list_tasks::definition(),
        complete_task::definition(),
        delete_task::definition(),
        update_task::definition(),
    ]
}

/// Execute a normalized invocation by tool name. Unknown names fail without
/// touching the store.
pub fn execute_tool(store: &Store, name: &str, args: &Map<String, Value>) -> ToolResult {
    match name {
        "add_task" => add_task::execute(store, args),
        "list_tasks" => list_tasks::execute(store, args),
        "complete_task" => complete_task::execute(store, args),
        "delete_task" => delete_task::execute(store, args),
        "update_task" => update_task::execute(store, args),
        _ => ToolResult::fail_bare(format!("Unknown tool: {}", name)),
    }
}

/// Read the user id the normalizer injected into the argument map.
pub(crate) fn arg_user_id(args: &Map<String, Value>) -> &str {
    args.get("user_id").and_then(|v| v.as_str()).unwrap_or("")
}

pub(crate) fn arg_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

pub(crate) fn arg_task_id(args: &Map<String, Value>) -> Option<i64> {
    match args.get("task_id") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
