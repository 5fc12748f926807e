use serde_json::{Map, Value};

use super::{arg_str, arg_user_id, ToolResult};
use crate::core::store::{StatusFilter, Store, Task};

pub fn definition() -> Value {
    serde_json::json!({
        "name": "list_tasks",
        "description": "List tasks for the user",
        "parameter_definitions": {
            "user_id": {
                "description": "The ID of the user",
                "type": "str",
                "required": true
            },
            "status": {
                "description": "Filter tasks by status (all, pending, completed)",
                "type": "str",
                "required": false
            }
        }
    })
}

pub fn execute(store: &Store, args: &Map<String, Value>) -> ToolResult {
    let user_id = arg_user_id(args);
    let status = arg_str(args, "status").unwrap_or("all");

    let tasks = match store.list_tasks(user_id, StatusFilter::parse(status)) {
        Ok(tasks) => tasks,
        Err(e) => {
            return ToolResult::fail(
                format!("An error occurred while listing tasks: {}", e),
                "Sorry, I couldn't retrieve your tasks. Please try again.".to_string(),
            )
        }
    };

    let message = summarize(&tasks, status);
    ToolResult::ok_with_tasks(message, tasks)
}

/// Human-readable enumeration of the listing, e.g.
/// "You have 2 tasks (pending): 1. Buy milk; 3. Walk dog"
fn summarize(tasks: &[Task], status: &str) -> String {
    let status_text = if status != "all" {
        format!(" ({})", status)
    } else {
        String::new()
    };

    match tasks {
        [] => format!("You have no tasks{}.", status_text),
        [task] => format!("You have 1 task{}: {}. {}", status_text, task.id, task.title),
        _ => {
            let items: Vec<String> = tasks
                .iter()
                .map(|t| format!("{}. {}", t.id, t.title))
                .collect();
            format!(
                "You have {} tasks{}: {}",
                tasks.len(),
                status_text,
                items.join("; ")
            )
        }
    }
}
