use serde_json::{Map, Value};

use super::{arg_str, arg_task_id, arg_user_id, ToolResult};
use crate::core::store::Store;

pub fn definition() -> Value {
    serde_json::json!({
        "name": "update_task",
        "description": "Update a task's details",
        "parameter_definitions": {
            "user_id": {
                "description": "The ID of the user",
                "type": "str",
                "required": true
            },
            "task_id": {
                "description": "The ID of the task to update",
                "type": "int",
                "required": true
            },
            "title": {
                "description": "The new title of the task",
                "type": "str",
                "required": false
            },
            "description": {
                "description": "The new description of the task",
                "type": "str",
                "required": false
            }
        }
    })
}

pub fn execute(store: &Store, args: &Map<String, Value>) -> ToolResult {
    let user_id = arg_user_id(args);
    let task_id = match arg_task_id(args) {
        Some(id) => id,
        None => {
            return ToolResult::fail_bare(
                "Missing required parameter 'task_id' for update_task".to_string(),
            )
        }
    };
    let title = arg_str(args, "title");
    let description = arg_str(args, "description");

    match store.update_task(user_id, task_id, title, description, None) {
        Ok(Some(task)) => {
            let mut changes = Vec::new();
            if let Some(t) = title {
                changes.push(format!("title to '{}'", t));
            }
            if let Some(d) = description {
                changes.push(format!("description to '{}'", d));
            }
            let message = format!(
                "Task '{}' has been updated ({}).",
                task.title,
                changes.join(" and ")
            );
            ToolResult::ok_with_task(message, task)
        }
        Ok(None) => ToolResult::fail(
            format!("Task with ID {} not found.", task_id),
            format!(
                "I couldn't find a task with ID {}. Could you please check the task ID?",
                task_id
            ),
        ),
        Err(e) => ToolResult::fail(
            format!("An error occurred while updating the task: {}", e),
            "Sorry, I couldn't update the task. Please try again.".to_string(),
        ),
    }
}
