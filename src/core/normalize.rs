//! Argument normalization for interpreter-proposed tool calls.
//!
//! The interpreter is free-form about argument names: a task title may arrive
//! as `title`, `task`, or `task_title`, and a task reference as `task_id`,
//! `id`, a numeric-looking `task`, or a bare title that has to be resolved
//! against the user's own tasks. This module rewrites each proposed call into
//! the canonical shape the executors expect, or rejects it with a terminal
//! `ToolResult` that the orchestrator folds into the reply. Rejected calls are
//! never executed.
//!
//! Resolution reads the store but never writes to it.

use anyhow::Result;
use serde_json::{Map, Value};

use crate::core::store::Store;
use crate::tools::ToolResult;

/// Outcome of normalizing one proposed invocation.
#[derive(Debug)]
pub enum Normalized {
    /// Canonical argument map, ready for the executor.
    Ready(Map<String, Value>),
    /// Terminal failure; carries the user-facing message.
    Rejected(ToolResult),
}

/// An accepted way for an identifier-bearing tool to reference its task,
/// tried in declaration order. First hit wins.
enum IdSource {
    /// The argument already is the id; renamed to `task_id` if needed.
    Direct(&'static str),
    /// A numeric-looking value parsed as the id. Non-numeric values fall
    /// through to the lookup stages below.
    Numeric(&'static str),
    /// The value is treated as a title and resolved against the user's
    /// tasks. `noun` picks the wording of the not-found message.
    Lookup {
        key: &'static str,
        noun: &'static str,
    },
}

const ID_SOURCES: &[IdSource] = &[
    IdSource::Direct("task_id"),
    IdSource::Direct("id"),
    IdSource::Numeric("task"),
    IdSource::Lookup {
        key: "title",
        noun: "title",
    },
    IdSource::Lookup {
        key: "task",
        noun: "name",
    },
    IdSource::Lookup {
        key: "task_title",
        noun: "title",
    },
];

/// Alternate spellings for the task title on `add_task`, in precedence order.
const TITLE_ALIASES: &[&str] = &["title", "task", "task_title"];

const ID_BEARING_TOOLS: &[&str] = &["update_task", "delete_task", "complete_task"];

/// Normalize a raw invocation. Store access is read-only (title lookups);
/// store faults surface as `Err` for the orchestrator's fault handler.
pub fn normalize(
    store: &Store,
    user_id: &str,
    tool_name: &str,
    raw_args: &Map<String, Value>,
) -> Result<Normalized> {
    let mut args = raw_args.clone();

    if tool_name == "add_task" {
        if let Some(rejection) = canonicalize_title(&mut args) {
            return Ok(Normalized::Rejected(rejection));
        }
    } else if ID_BEARING_TOOLS.contains(&tool_name) {
        if let Some(rejection) = resolve_task_id(store, user_id, tool_name, &mut args)? {
            return Ok(Normalized::Rejected(rejection));
        }
    }

    // The interpreter is not trusted to name the right user; always stamp
    // the authenticated identity over whatever it supplied.
    args.insert("user_id".to_string(), Value::String(user_id.to_string()));

    Ok(Normalized::Ready(args))
}

/// Fold `task` / `task_title` into the canonical `title` argument.
fn canonicalize_title(args: &mut Map<String, Value>) -> Option<ToolResult> {
    for alias in TITLE_ALIASES {
        if args.contains_key(*alias) {
            if *alias != "title" {
                let value = args.remove(*alias).unwrap();
                args.insert("title".to_string(), value);
            }
            return None;
        }
    }
    Some(ToolResult::fail(
        "Either 'title' or 'task' parameter must be provided".to_string(),
        "Sorry, I couldn't add the task. Missing title information. Please try again.".to_string(),
    ))
}

/// Work through `ID_SOURCES` until a task reference resolves. Leaves the map
/// untouched when no source is present at all; the executor reports the
/// missing parameter in that case.
fn resolve_task_id(
    store: &Store,
    user_id: &str,
    tool_name: &str,
    args: &mut Map<String, Value>,
) -> Result<Option<ToolResult>> {
    for source in ID_SOURCES {
        match source {
            IdSource::Direct(key) => {
                if args.contains_key(*key) {
                    if *key != "task_id" {
                        let value = args.remove(*key).unwrap();
                        args.insert("task_id".to_string(), value);
                    }
                    return Ok(None);
                }
            }
            IdSource::Numeric(key) => {
                if let Some(id) = parse_numeric(args.get(*key)) {
                    args.remove(*key);
                    args.insert("task_id".to_string(), Value::from(id));
                    return Ok(None);
                }
            }
            IdSource::Lookup { key, noun } => {
                let Some(title) = args.get(*key).and_then(|v| v.as_str()).map(String::from)
                else {
                    continue;
                };
                match store.find_task_by_title(user_id, &title)? {
                    Some(task) => {
                        args.insert("task_id".to_string(), Value::from(task.id));
                        // On update_task an explicit `title` doubles as the
                        // rename value; every other lookup key has served its
                        // purpose once the id is known.
                        let keep = *key == "title" && tool_name == "update_task";
                        if !keep {
                            args.remove(*key);
                        }
                        return Ok(None);
                    }
                    None => {
                        return Ok(Some(ToolResult::fail(
                            format!("Could not find a task with the {} '{}'.", noun, title),
                            format!(
                                "Could not find a task with the {} '{}'. Please check the task name and try again.",
                                noun, title
                            ),
                        )))
                    }
                }
            }
        }
    }
    Ok(None)
}

fn parse_numeric(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
