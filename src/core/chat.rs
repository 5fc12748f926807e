//! One conversational turn: load context, interpret, normalize and execute
//! the proposed tool calls, persist both sides of the exchange, respond.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::core::api::{ContextHints, HistoryMessage, Interpretation, Interpreter, ToolCall};
use crate::core::normalize::{normalize, Normalized};
use crate::core::store::{Role, StatusFilter, Store};
use crate::core::ChatError;
use crate::tools;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub conversation_id: Option<i64>,
}

/// The turn envelope returned to the caller. `tool_calls` are the
/// interpreter's proposals verbatim, not the normalized forms.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub conversation_id: i64,
    pub response: String,
    pub tool_calls: Vec<ToolCall>,
}

pub struct ChatEngine<I> {
    interpreter: I,
    store: Arc<Store>,
}

impl<I: Interpreter> ChatEngine<I> {
    pub fn new(interpreter: I, store: Arc<Store>) -> Self {
        Self { interpreter, store }
    }

    /// Process one chat turn for `user_id`. `caller_id` is the externally
    /// verified identity; a mismatch is rejected before any store access.
    pub async fn handle_turn(
        &self,
        caller_id: &str,
        user_id: &str,
        request: &ChatRequest,
    ) -> Result<ChatResponse, ChatError> {
        if caller_id != user_id {
            warn!(
                caller = caller_id,
                user = user_id,
                "chat turn rejected: caller identity does not match requested user"
            );
            return Err(ChatError::Forbidden);
        }

        // LoadContext: an explicit conversation id must belong to the user.
        let conversation = match request.conversation_id {
            Some(id) => self
                .store
                .get_conversation(user_id, id)?
                .ok_or(ChatError::ConversationNotFound)?,
            None => self.store.create_conversation(user_id)?,
        };

        let history: Vec<HistoryMessage> = self
            .store
            .list_messages(user_id, conversation.id)?
            .into_iter()
            .map(|m| HistoryMessage {
                role: m.role,
                content: m.content,
            })
            .collect();

        let hints = self.build_hints(user_id, &request.message)?;

        // The user message is persisted before interpretation so it survives
        // an interpreter failure.
        self.store
            .append_message(conversation.id, user_id, Role::User, &request.message)?;

        let interpretation = match self
            .interpreter
            .interpret(&request.message, &history, &hints)
            .await
        {
            Ok(interpretation) => interpretation,
            Err(e) => {
                warn!(error = %e, "interpreter call failed; degrading to apology");
                Interpretation {
                    response: format!(
                        "I encountered an error processing your request: {}. Could you please try again?",
                        e
                    ),
                    tool_calls: Vec::new(),
                }
            }
        };

        let mut response = interpretation.response.clone();

        for call in &interpretation.tool_calls {
            match normalize(&self.store, user_id, &call.name, &call.arguments) {
                Ok(Normalized::Rejected(result)) => {
                    // Tool skipped; its message becomes the reply. Remaining
                    // calls still get their chance.
                    if let Some(message) = result.message {
                        response = message;
                    }
                }
                Ok(Normalized::Ready(args)) => {
                    let result = tools::execute_tool(&self.store, &call.name, &args);
                    if let Some(message) = &result.message {
                        response = message.clone();
                    } else if !result.success {
                        if let Some(err) = &result.error {
                            response = format!("Error: {}", err);
                        }
                    }
                }
                Err(e) => {
                    // Store fault mid-normalization aborts the batch.
                    error!(tool = %call.name, error = %e, "tool processing fault; aborting batch");
                    response = format!("Error executing tool {}: {}", call.name, e);
                    break;
                }
            }
        }

        // Persist failures are logged but the envelope still goes out.
        if let Err(e) =
            self.store
                .append_message(conversation.id, user_id, Role::Assistant, &response)
        {
            error!(error = %e, "failed to persist assistant reply");
        }
        if let Err(e) = self.store.touch_conversation(conversation.id) {
            error!(error = %e, "failed to update conversation timestamp");
        }

        Ok(ChatResponse {
            conversation_id: conversation.id,
            response,
            tool_calls: interpretation.tool_calls,
        })
    }

    /// Listing-style requests pre-fetch the user's tasks so the interpreter
    /// can ground positional references ("the second one").
    fn build_hints(&self, user_id: &str, message: &str) -> Result<ContextHints, ChatError> {
        let lower = message.to_lowercase();
        if !lower.contains("list") && !lower.contains("show") {
            return Ok(ContextHints::default());
        }
        let tasks = self.store.list_tasks(user_id, StatusFilter::All)?;
        if tasks.is_empty() {
            return Ok(ContextHints::default());
        }
        let listing = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{}. {} (ID: {})", i + 1, t.title, t.id))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ContextHints {
            recent_task_list: Some(listing),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use serde_json::Map;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Script {
        Reply(Interpretation),
        Fail(String),
    }

    /// Interpreter stand-in that plays back a queue of canned outcomes and
    /// records what it was asked.
    struct ScriptedInterpreter {
        script: Mutex<VecDeque<Script>>,
        seen_hints: Mutex<Vec<ContextHints>>,
        seen_history_lens: Mutex<Vec<usize>>,
    }

    impl ScriptedInterpreter {
        fn new(script: Vec<Script>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                seen_hints: Mutex::new(Vec::new()),
                seen_history_lens: Mutex::new(Vec::new()),
            }
        }
    }

    impl Interpreter for &ScriptedInterpreter {
        async fn interpret(
            &self,
            _message: &str,
            history: &[HistoryMessage],
            hints: &ContextHints,
        ) -> anyhow::Result<Interpretation> {
            self.seen_hints.lock().unwrap().push(hints.clone());
            self.seen_history_lens.lock().unwrap().push(history.len());
            match self.script.lock().unwrap().pop_front() {
                Some(Script::Reply(interpretation)) => Ok(interpretation),
                Some(Script::Fail(msg)) => Err(anyhow!(msg)),
                None => Ok(Interpretation {
                    response: "OK".to_string(),
                    tool_calls: Vec::new(),
                }),
            }
        }
    }

    fn call(name: &str, pairs: &[(&str, serde_json::Value)]) -> ToolCall {
        let arguments: Map<String, serde_json::Value> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        ToolCall {
            name: name.to_string(),
            arguments,
        }
    }

    fn reply(text: &str, calls: Vec<ToolCall>) -> Script {
        Script::Reply(Interpretation {
            response: text.to_string(),
            tool_calls: calls,
        })
    }

    fn engine(script: Vec<Script>) -> (ChatEngine<&'static ScriptedInterpreter>, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let interpreter: &'static ScriptedInterpreter =
            Box::leak(Box::new(ScriptedInterpreter::new(script)));
        (ChatEngine::new(interpreter, store.clone()), store)
    }

    fn request(message: &str, conversation_id: Option<i64>) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            conversation_id,
        }
    }

    #[tokio::test]
    async fn add_turn_executes_tool_and_reports_original_calls() {
        let (engine, store) = engine(vec![reply(
            "Adding that now.",
            vec![call("add_task", &[("task", serde_json::json!("Buy milk"))])],
        )]);

        let response = engine
            .handle_turn("alice", "alice", &request("add a task: buy milk", None))
            .await
            .unwrap();

        assert_eq!(
            response.response,
            "Task 'Buy milk' has been added successfully."
        );
        // The envelope carries the interpreter's raw proposal, not the
        // normalized arguments.
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].arguments["task"], "Buy milk");
        assert!(!response.tool_calls[0].arguments.contains_key("user_id"));

        let tasks = store.list_tasks("alice", StatusFilter::All).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Buy milk");
    }

    #[tokio::test]
    async fn caller_mismatch_is_a_hard_reject() {
        let (engine, store) = engine(vec![]);
        let result = engine
            .handle_turn("mallory", "alice", &request("hi", None))
            .await;
        assert!(matches!(result, Err(ChatError::Forbidden)));
        // Nothing was created for either identity.
        assert!(store.list_messages("alice", 1).unwrap().is_empty());
    }

    #[tokio::test]
    async fn explicit_foreign_conversation_is_not_found() {
        let (engine, store) = engine(vec![]);
        let theirs = store.create_conversation("bob").unwrap();

        let result = engine
            .handle_turn("alice", "alice", &request("hi", Some(theirs.id)))
            .await;
        assert!(matches!(result, Err(ChatError::ConversationNotFound)));
    }

    #[tokio::test]
    async fn two_turns_share_one_conversation_in_order() {
        let (engine, store) = engine(vec![
            reply("Hello!", vec![]),
            reply("Hello again!", vec![]),
        ]);

        let first = engine
            .handle_turn("alice", "alice", &request("hi", None))
            .await
            .unwrap();
        let second = engine
            .handle_turn(
                "alice",
                "alice",
                &request("hi again", Some(first.conversation_id)),
            )
            .await
            .unwrap();

        assert_eq!(first.conversation_id, second.conversation_id);
        let messages = store
            .list_messages("alice", first.conversation_id)
            .unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "Hello!", "hi again", "Hello again!"]);
    }

    #[tokio::test]
    async fn interpreter_fault_degrades_to_apology() {
        let (engine, store) = engine(vec![Script::Fail("connection reset".to_string())]);

        let response = engine
            .handle_turn("alice", "alice", &request("add a task", None))
            .await
            .unwrap();

        assert!(response
            .response
            .starts_with("I encountered an error processing your request:"));
        assert!(response.response.contains("connection reset"));
        assert!(response.tool_calls.is_empty());

        // The user message was persisted before the failure, and the apology
        // after it.
        let messages = store
            .list_messages("alice", response.conversation_id)
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
    }

    #[tokio::test]
    async fn normalization_failure_replaces_reply_and_skips_execution() {
        let (engine, store) = engine(vec![reply(
            "Deleting it.",
            vec![call("delete_task", &[("task", serde_json::json!("Nope"))])],
        )]);

        let response = engine
            .handle_turn("alice", "alice", &request("delete Nope", None))
            .await
            .unwrap();

        assert_eq!(
            response.response,
            "Could not find a task with the name 'Nope'. Please check the task name and try again."
        );
        assert!(store.list_tasks("alice", StatusFilter::All).unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_renders_bare_error() {
        let (engine, _store) = engine(vec![reply(
            "On it.",
            vec![call("make_coffee", &[])],
        )]);

        let response = engine
            .handle_turn("alice", "alice", &request("coffee please", None))
            .await
            .unwrap();
        assert_eq!(response.response, "Error: Unknown tool: make_coffee");
    }

    #[tokio::test]
    async fn later_tool_message_wins() {
        let (engine, store) = engine(vec![reply(
            "Working...",
            vec![
                call("add_task", &[("title", serde_json::json!("One"))]),
                call("add_task", &[("title", serde_json::json!("Two"))]),
            ],
        )]);

        let response = engine
            .handle_turn("alice", "alice", &request("add two tasks", None))
            .await
            .unwrap();

        assert_eq!(response.response, "Task 'Two' has been added successfully.");
        assert_eq!(store.list_tasks("alice", StatusFilter::All).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn listing_request_prefetches_reference_hint() {
        let (engine, store) = engine(vec![reply("Here you go.", vec![])]);
        let t1 = store.create_task("alice", "Buy milk", "").unwrap();
        store.create_task("alice", "Walk dog", "").unwrap();

        let _ = engine
            .handle_turn("alice", "alice", &request("show my tasks", None))
            .await
            .unwrap();

        let hints = engine.interpreter.seen_hints.lock().unwrap();
        let listing = hints[0].recent_task_list.as_ref().unwrap();
        assert!(listing.contains(&format!("1. Buy milk (ID: {})", t1.id)));
        assert!(listing.contains("2. Walk dog"));
    }

    #[tokio::test]
    async fn non_listing_request_skips_hint() {
        let (engine, store) = engine(vec![reply("Sure.", vec![])]);
        store.create_task("alice", "Buy milk", "").unwrap();

        let _ = engine
            .handle_turn("alice", "alice", &request("complete buy milk", None))
            .await
            .unwrap();

        let hints = engine.interpreter.seen_hints.lock().unwrap();
        assert!(hints[0].recent_task_list.is_none());
    }

    #[tokio::test]
    async fn history_replays_prior_turns_only() {
        let (engine, _store) = engine(vec![
            reply("First reply", vec![]),
            reply("Second reply", vec![]),
        ]);

        let first = engine
            .handle_turn("alice", "alice", &request("one", None))
            .await
            .unwrap();
        let _ = engine
            .handle_turn(
                "alice",
                "alice",
                &request("two", Some(first.conversation_id)),
            )
            .await
            .unwrap();

        let lens = engine.interpreter.seen_history_lens.lock().unwrap();
        // Empty on the first turn; user+assistant of turn one on the second.
        assert_eq!(*lens, vec![0, 2]);
    }

    #[tokio::test]
    async fn full_lifecycle_leaves_store_empty() {
        let (engine, store) = engine(vec![
            reply(
                "Adding.",
                vec![call("add_task", &[("title", serde_json::json!("Buy milk"))])],
            ),
            reply("Listing.", vec![call("list_tasks", &[])]),
            reply(
                "Renaming.",
                vec![call(
                    "update_task",
                    &[
                        ("task", serde_json::json!("Buy milk")),
                        ("description", serde_json::json!("2 liters")),
                    ],
                )],
            ),
            reply(
                "Completing.",
                vec![call(
                    "complete_task",
                    &[("task", serde_json::json!("Buy milk"))],
                )],
            ),
            reply(
                "Deleting.",
                vec![call(
                    "delete_task",
                    &[("task", serde_json::json!("Buy milk"))],
                )],
            ),
            reply("Listing.", vec![call("list_tasks", &[])]),
        ]);

        let turn = |msg: &str, id: Option<i64>| request(msg, id);

        let added = engine
            .handle_turn("alice", "alice", &turn("add buy milk", None))
            .await
            .unwrap();
        let id = Some(added.conversation_id);
        assert!(added.response.contains("added successfully"));

        let listed = engine
            .handle_turn("alice", "alice", &turn("list my tasks", id))
            .await
            .unwrap();
        assert!(listed.response.contains("Buy milk"));

        let updated = engine
            .handle_turn("alice", "alice", &turn("update buy milk", id))
            .await
            .unwrap();
        assert!(updated.response.contains("has been updated"));

        let completed = engine
            .handle_turn("alice", "alice", &turn("complete buy milk", id))
            .await
            .unwrap();
        assert_eq!(
            completed.response,
            "Task 'Buy milk' has been marked as completed."
        );

        let deleted = engine
            .handle_turn("alice", "alice", &turn("delete buy milk", id))
            .await
            .unwrap();
        assert!(deleted.response.contains("has been deleted"));

        let empty = engine
            .handle_turn("alice", "alice", &turn("list my tasks", id))
            .await
            .unwrap();
        assert_eq!(empty.response, "You have no tasks.");
        assert!(store.list_tasks("alice", StatusFilter::All).unwrap().is_empty());
    }
}
