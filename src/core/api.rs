use anyhow::{anyhow, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tools;

const BASE_URL: &str = "https://api.cohere.com/v1";

/// Message markers that suggest the user is referring to a task by position
/// rather than by name ("complete the second one").
const POSITION_MARKERS: &[&str] = &[
    "#1", "#2", "#3", "#4", "#5", "first", "second", "third", "last",
];

// ── Types ───────────────────────────────────────────────────────────────

/// A tool invocation proposed by the interpreter, verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// What one interpretation round produced: a reply and zero or more
/// proposed tool calls.
#[derive(Debug, Clone, Default)]
pub struct Interpretation {
    pub response: String,
    pub tool_calls: Vec<ToolCall>,
}

/// One prior conversation turn, as replayed to the interpreter.
#[derive(Debug, Clone)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

/// Optional context gathered before interpretation.
#[derive(Debug, Clone, Default)]
pub struct ContextHints {
    /// Numbered "1. {title} (ID: {id})" lines of the user's current tasks,
    /// attached when the turn looks like a listing request.
    pub recent_task_list: Option<String>,
}

/// The intent-interpretation boundary. Production uses [`CohereClient`];
/// tests script it.
#[allow(async_fn_in_trait)]
pub trait Interpreter {
    async fn interpret(
        &self,
        message: &str,
        history: &[HistoryMessage],
        hints: &ContextHints,
    ) -> Result<Interpretation>;
}

// ── Client ──────────────────────────────────────────────────────────────

/// Stateless Cohere chat client, constructed once at startup and shared by
/// reference for the life of the process.
#[derive(Clone)]
pub struct CohereClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl CohereClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: BASE_URL.to_string(),
            model: model.to_string(),
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .unwrap_or_else(|_| HeaderValue::from_static("")),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }
}

impl Interpreter for CohereClient {
    async fn interpret(
        &self,
        message: &str,
        history: &[HistoryMessage],
        hints: &ContextHints,
    ) -> Result<Interpretation> {
        let body = serde_json::json!({
            "model": self.model,
            "message": enhance_message(message, hints),
            "chat_history": build_chat_history(history),
            "tools": tools::definitions(),
            "force_single_step": true,
        });

        let url = format!("{}/chat", self.base_url);
        let response = self
            .http
            .post(&url)
            .headers(self.headers())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if let Ok(json) = serde_json::from_str::<Value>(&text) {
                if let Some(msg) = json.get("message").and_then(|v| v.as_str()) {
                    return Err(anyhow!("Cohere API error {}: {}", status, msg));
                }
            }
            return Err(anyhow!("Cohere API error {}: {}", status, text));
        }

        let data: Value = response.json().await?;
        Ok(parse_interpretation(&data))
    }
}

// ── Request/response shaping ────────────────────────────────────────────

/// Append the numbered task list when the user seems to reference tasks by
/// position; otherwise pass the message through untouched.
fn enhance_message(message: &str, hints: &ContextHints) -> String {
    let Some(task_list) = &hints.recent_task_list else {
        return message.to_string();
    };
    let lower = message.to_lowercase();
    if POSITION_MARKERS.iter().any(|m| lower.contains(m)) {
        format!(
            "{}\n\nFor reference, here is the recent task list: {}",
            message, task_list
        )
    } else {
        message.to_string()
    }
}

/// Cohere wants USER/CHATBOT roles and rejects empty turns.
fn build_chat_history(history: &[HistoryMessage]) -> Vec<Value> {
    history
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .map(|m| {
            let role = if m.role == "user" { "USER" } else { "CHATBOT" };
            serde_json::json!({ "role": role, "message": m.content.trim() })
        })
        .collect()
}

fn parse_interpretation(data: &Value) -> Interpretation {
    let text = data.get("text").and_then(|v| v.as_str()).unwrap_or("");

    let tool_calls: Vec<ToolCall> = data
        .get("tool_calls")
        .and_then(|v| v.as_array())
        .map(|calls| {
            calls
                .iter()
                .filter_map(|call| {
                    let name = call.get("name")?.as_str()?.to_string();
                    let arguments = call
                        .get("parameters")
                        .and_then(|p| p.as_object())
                        .cloned()
                        .unwrap_or_default();
                    Some(ToolCall { name, arguments })
                })
                .collect()
        })
        .unwrap_or_default();

    // An empty reply with pending tool calls gets a placeholder; the
    // executor's result message replaces it downstream.
    let response = if text.trim().is_empty() {
        "Processing your request...".to_string()
    } else {
        text.to_string()
    };

    Interpretation {
        response,
        tool_calls,
    }
}
