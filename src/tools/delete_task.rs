use serde_json::{Map, Value};

use super::{arg_task_id, arg_user_id, ToolResult};
use crate::core::store::Store;

pub fn definition() -> Value {
    serde_json::json!({
        "name": "delete_task",
        "description": "Delete a task",
        "parameter_definitions": {
            "user_id": {
                "description": "The ID of the user",
                "type": "str",
                "required": true
            },
            "task_id": {
                "description": "The ID of the task to delete",
                "type": "int",
                "required": true
            }
        }
    })
}

// Deletion is a hard row delete; there is no recovery path.
pub fn execute(store: &Store, args: &Map<String, Value>) -> ToolResult {
    let user_id = arg_user_id(args);
    let task_id = match arg_task_id(args) {
        Some(id) => id,
        None => {
            return ToolResult::fail_bare(
                "Missing required parameter 'task_id' for delete_task".to_string(),
            )
        }
    };

    match store.delete_task(user_id, task_id) {
        Ok(true) => ToolResult::ok(format!("Task with ID {} has been deleted.", task_id)),
        Ok(false) => ToolResult::fail(
            format!("Task with ID {} not found.", task_id),
            format!(
                "I couldn't find a task with ID {}. Could you please check the task ID?",
                task_id
            ),
        ),
        Err(e) => ToolResult::fail(
            format!("An error occurred while deleting the task: {}", e),
            "Sorry, I couldn't delete the task. Please try again.".to_string(),
        ),
    }
}
