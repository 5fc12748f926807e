use serde_json::{Map, Value};

use super::{arg_str, arg_user_id, ToolResult};
use crate::core::store::Store;

pub fn definition() -> Value {
    serde_json::json!({
        "name": "add_task",
        "description": "Add a new task for the user",
        "parameter_definitions": {
            "user_id": {
                "description": "The ID of the user",
                "type": "str",
                "required": true
            },
            "title": {
                "description": "The title of the task",
                "type": "str",
                "required": true
            },
            "description": {
                "description": "The description of the task",
                "type": "str",
                "required": false
            }
        }
    })
}

pub fn execute(store: &Store, args: &Map<String, Value>) -> ToolResult {
    let user_id = arg_user_id(args);
    // The normalizer guarantees a title; this guards direct callers.
    let title = match arg_str(args, "title") {
        Some(t) => t,
        None => {
            return ToolResult::fail(
                "Either 'title' or 'task' parameter must be provided".to_string(),
                "Sorry, I couldn't add the task. Missing title information. Please try again."
                    .to_string(),
            )
        }
    };
    let description = arg_str(args, "description").unwrap_or("");

    match store.create_task(user_id, title, description) {
        Ok(task) => ToolResult::ok_with_task(
            format!("Task '{}' has been added successfully.", title),
            task,
        ),
        Err(e) => ToolResult::fail(
            format!("An error occurred while adding the task: {}", e),
            format!("Sorry, I couldn't add the task '{}'. Please try again.", title),
        ),
    }
}
