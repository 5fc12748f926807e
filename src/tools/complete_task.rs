use serde_json::{Map, Value};

use super::{arg_task_id, arg_user_id, ToolResult};
use crate::core::store::Store;

pub fn definition() -> Value {
    serde_json::json!({
        "name": "complete_task",
        "description": "Mark a task as completed",
        "parameter_definitions": {
            "user_id": {
                "description": "The ID of the user",
                "type": "str",
                "required": true
            },
            "task_id": {
                "description": "The ID of the task to complete",
                "type": "int",
                "required": true
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
                "Missing required parameter 'task_id' for complete_task".to_string(),
            )
        }
    };

    match store.update_task(user_id, task_id, None, None, Some(true)) {
        Ok(Some(task)) => ToolResult::ok_with_task(
            format!("Task '{}' has been marked as completed.", task.title),
            task,
        ),
        Ok(None) => ToolResult::fail(
            format!("Task with ID {} not found.", task_id),
            format!(
                "I couldn't find a task with ID {}. Could you please check the task ID?",
                task_id
            ),
        ),
        Err(e) => ToolResult::fail(
            format!("An error occurred while completing the task: {}", e),
            "Sorry, I couldn't complete the task. Please try again.".to_string(),
        ),
    }
}
