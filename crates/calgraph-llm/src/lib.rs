//! Planner and rewriter backends.
//!
//! The validator/compiler core has zero network dependency; everything that
//! talks to a model lives here, behind the [`Planner`] type:
//!
//! - `Rules` runs the deterministic rule planner from `calgraph-plan` and is
//!   the default (and the fixture backend for tests and demos);
//! - `Ollama`/`OpenAI`/`Anthropic` ask a model for a strict-JSON plan,
//!   feature-gated so the crate builds without `reqwest`.
//!
//! Planner replies are untrusted: the first JSON object found in the reply is
//! handed to the validator as-is. A failed call or an unparsable reply falls
//! back to a degraded plan (term-only when a term hint exists, otherwise a
//! clarification), never to an error the caller must handle.

use serde_json::{json, Value};
use thiserror::Error;

#[cfg(any(feature = "llm-ollama", feature = "llm-openai", feature = "llm-anthropic"))]
use tracing::warn;

use calgraph_cypher::Row;
#[cfg(any(feature = "llm-ollama", feature = "llm-openai", feature = "llm-anthropic"))]
use calgraph_plan::extract_hints;
use calgraph_plan::{rule_plan, Hints, SchemaRegistry};

#[cfg(any(feature = "llm-ollama", feature = "llm-openai", feature = "llm-anthropic"))]
use std::time::Duration;

pub const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";
pub const OLLAMA_MODEL_ENV: &str = "OLLAMA_MODEL";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const OPENAI_MODEL_ENV: &str = "OPENAI_MODEL";
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const ANTHROPIC_BASE_URL_ENV: &str = "ANTHROPIC_BASE_URL";
pub const ANTHROPIC_MODEL_ENV: &str = "ANTHROPIC_MODEL";
pub const ANTHROPIC_VERSION_ENV: &str = "ANTHROPIC_VERSION";
/// Per-call timeout in seconds; 0 disables the timeout.
pub const LLM_TIMEOUT_SECS_ENV: &str = "CALGRAPH_LLM_TIMEOUT_SECS";

const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";
const DEFAULT_OLLAMA_MODEL: &str = "llama3.2:3b";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm backend not configured: {0}")]
    NotConfigured(String),
    #[error("llm request failed: {0}")]
    Http(String),
    #[error("llm returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// The planner contract given to models. The schema block matches the graph
/// the compiler targets; the plan block matches what the validator accepts.
const PLANNER_SYSTEM: &str = r#"You are a planner that converts a user's natural-language question into a STRICT JSON plan.
The graph schema:
- Nodes:
  - (:Term { name })
  - (:Event { name, start_date, end_date, start_weekday, end_weekday, source })
- Relationship: (:Term)-[:HAS_EVENT]->(:Event)
- Dates are ISO strings YYYY-MM-DD; weekdays are Monday..Sunday.

Return a JSON object with fields:
{
  "intent": "query" | "ask_clarification",
  "term": "Fall 2025" | null,
  "filters": [
    // allowed types:
    // {"type":"anchor_exact", "anchor_event":"Classes Begin"}
    // {"type":"after_anchor", "anchor_event":"Classes End"}
    // {"type":"before_anchor", "anchor_event":"Classes Begin"}
    // {"type":"weekday_in", "weekday":"Monday"}
    // {"type":"month_eq", "year":2025, "month":9}
    // {"type":"date_window", "start":"2025-09-01", "end":"2025-09-30"}
    // {"type":"same_day_pairs"}
    // {"type":"overlap_pairs"}
  ],
  "group_by": [],
  "select": ["name","start_date","end_date","source"],
  "order_by": [ {"field":"start_date","dir":"asc"} ],
  "limit": null,
  "missing": []
}

Guidelines:
- Prefer "query" with explicit filters. Only use "ask_clarification" if key info is missing (like the term).
- Normalize casual phrases (e.g. "classes start" means anchor "Classes Begin").
- "group_by" supports: iso_year, iso_week (from start_date).
- "same_day_pairs" and "overlap_pairs" imply pairwise results.
- Do not invent data or output Cypher. Only output the JSON plan.
Strict JSON only, no prose."#;

const REWRITER_SYSTEM: &str = r#"You are a precise assistant. You will be given a user question, a plain factual summary that is already CORRECT, and the raw result rows.
Your job is ONLY to rewrite the factual summary into a clearer, more natural answer.
VERY IMPORTANT RULES:
1) Do NOT change any facts, numbers, dates, weekdays, or names.
2) Do NOT contradict the summary (if it says there are 4 events, you must not say there are 0 events).
3) You may shorten or slightly rephrase sentences, but keep all the important details.
4) If you are unsure, repeat the summary exactly."#;

/// Which service produces raw plans (and, optionally, rewrites answers).
#[derive(Debug, Clone, Default)]
pub enum PlannerBackend {
    /// Deterministic rule planner; no network.
    #[default]
    Rules,
    /// Local Ollama server, native `/api/chat` endpoint.
    ///
    /// IPv4 loopback by default: `localhost` resolves to ::1 on some
    /// platforms while Ollama listens on IPv4 only. Override via
    /// `OLLAMA_HOST`.
    #[cfg(feature = "llm-ollama")]
    Ollama { host: String },
    /// OpenAI chat completions; key from `OPENAI_API_KEY`.
    #[cfg(feature = "llm-openai")]
    OpenAI { base_url: String },
    /// Anthropic messages API; key from `ANTHROPIC_API_KEY`.
    #[cfg(feature = "llm-anthropic")]
    Anthropic { base_url: String },
}

#[derive(Debug, Clone, Default)]
pub struct Planner {
    pub backend: PlannerBackend,
    pub model: Option<String>,
}

impl Planner {
    pub fn rules() -> Self {
        Self::default()
    }

    #[cfg(feature = "llm-ollama")]
    pub fn ollama_from_env(model: Option<String>) -> Self {
        let host = std::env::var(OLLAMA_HOST_ENV)
            .ok()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string());
        Self {
            backend: PlannerBackend::Ollama { host },
            model,
        }
    }

    #[cfg(feature = "llm-openai")]
    pub fn openai_from_env(model: Option<String>) -> Self {
        let base_url = std::env::var(OPENAI_BASE_URL_ENV)
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Self {
            backend: PlannerBackend::OpenAI { base_url },
            model,
        }
    }

    #[cfg(feature = "llm-anthropic")]
    pub fn anthropic_from_env(model: Option<String>) -> Self {
        let base_url = std::env::var(ANTHROPIC_BASE_URL_ENV)
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| "https://api.anthropic.com".to_string());
        Self {
            backend: PlannerBackend::Anthropic { base_url },
            model,
        }
    }

    pub fn status_line(&self) -> String {
        let backend = match &self.backend {
            PlannerBackend::Rules => "rules".to_string(),
            #[cfg(feature = "llm-ollama")]
            PlannerBackend::Ollama { host } => format!("ollama({host})"),
            #[cfg(feature = "llm-openai")]
            PlannerBackend::OpenAI { base_url } => format!("openai({base_url})"),
            #[cfg(feature = "llm-anthropic")]
            PlannerBackend::Anthropic { base_url } => format!("anthropic({base_url})"),
        };
        let model = self.model.as_deref().unwrap_or("(none)");
        format!("planner: backend={backend} model={model}")
    }

    /// Produce a raw (untrusted) plan for the question. Never fails: LLM
    /// errors and unparsable replies degrade via [`degraded_plan`].
    pub fn propose_raw(
        &self,
        registry: &SchemaRegistry,
        question: &str,
        fallback_year: Option<i32>,
    ) -> Value {
        match &self.backend {
            PlannerBackend::Rules => {
                let plan = rule_plan(question, registry, fallback_year);
                serde_json::to_value(&plan)
                    .unwrap_or_else(|_| json!({"intent": "ask_clarification", "missing": ["term"]}))
            }
            #[cfg(feature = "llm-ollama")]
            PlannerBackend::Ollama { host } => {
                let hints = extract_hints(question, registry, fallback_year);
                let model = self
                    .model
                    .clone()
                    .or_else(|| std::env::var(OLLAMA_MODEL_ENV).ok())
                    .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string());
                let user = planner_user_prompt(question, &hints);
                let reply = llm_timeout().and_then(|timeout| {
                    ollama_chat(
                        host,
                        &model,
                        &user,
                        Some(PLANNER_SYSTEM),
                        Some(json!("json")),
                        timeout,
                    )
                });
                self.plan_from_reply(reply, &hints)
            }
            #[cfg(feature = "llm-openai")]
            PlannerBackend::OpenAI { base_url } => {
                let hints = extract_hints(question, registry, fallback_year);
                let user = planner_user_prompt(question, &hints);
                let reply = self.require_model(OPENAI_MODEL_ENV).and_then(|model| {
                    llm_timeout().and_then(|timeout| {
                        openai_chat(base_url, &model, &user, Some(PLANNER_SYSTEM), true, timeout)
                    })
                });
                self.plan_from_reply(reply, &hints)
            }
            #[cfg(feature = "llm-anthropic")]
            PlannerBackend::Anthropic { base_url } => {
                let hints = extract_hints(question, registry, fallback_year);
                let user = planner_user_prompt(question, &hints);
                let reply = self.require_model(ANTHROPIC_MODEL_ENV).and_then(|model| {
                    llm_timeout().and_then(|timeout| {
                        anthropic_chat(base_url, &model, &user, Some(PLANNER_SYSTEM), timeout)
                    })
                });
                self.plan_from_reply(reply, &hints)
            }
        }
    }

    /// Rewrite the factual summary into a friendlier answer. `Ok(None)` means
    /// the backend does not rewrite (rules mode); callers print the summary.
    pub fn rewrite(
        &self,
        question: &str,
        summary: &str,
        rows: &[Row],
    ) -> Result<Option<String>, LlmError> {
        match &self.backend {
            PlannerBackend::Rules => {
                let _ = (question, summary, rows);
                Ok(None)
            }
            #[cfg(feature = "llm-ollama")]
            PlannerBackend::Ollama { host } => {
                let user = rewriter_user_prompt(question, summary, rows);
                let model = self
                    .model
                    .clone()
                    .or_else(|| std::env::var(OLLAMA_MODEL_ENV).ok())
                    .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string());
                let timeout = llm_timeout()?;
                let text = ollama_chat(host, &model, &user, Some(REWRITER_SYSTEM), None, timeout)?;
                Ok(Some(text.trim().to_string()))
            }
            #[cfg(feature = "llm-openai")]
            PlannerBackend::OpenAI { base_url } => {
                let user = rewriter_user_prompt(question, summary, rows);
                let model = self.require_model(OPENAI_MODEL_ENV)?;
                let timeout = llm_timeout()?;
                let text =
                    openai_chat(base_url, &model, &user, Some(REWRITER_SYSTEM), false, timeout)?;
                Ok(Some(text.trim().to_string()))
            }
            #[cfg(feature = "llm-anthropic")]
            PlannerBackend::Anthropic { base_url } => {
                let user = rewriter_user_prompt(question, summary, rows);
                let model = self.require_model(ANTHROPIC_MODEL_ENV)?;
                let timeout = llm_timeout()?;
                let text =
                    anthropic_chat(base_url, &model, &user, Some(REWRITER_SYSTEM), timeout)?;
                Ok(Some(text.trim().to_string()))
            }
        }
    }

    #[cfg(any(feature = "llm-openai", feature = "llm-anthropic"))]
    fn require_model(&self, env: &str) -> Result<String, LlmError> {
        self.model
            .clone()
            .or_else(|| std::env::var(env).ok().filter(|m| !m.trim().is_empty()))
            .ok_or_else(|| {
                LlmError::NotConfigured(format!("no model selected (pass --model or set {env})"))
            })
    }

    #[cfg(any(feature = "llm-ollama", feature = "llm-openai", feature = "llm-anthropic"))]
    fn plan_from_reply(&self, reply: Result<String, LlmError>, hints: &Hints) -> Value {
        match reply {
            Ok(text) => match extract_first_json_object(&text) {
                Some(plan) => plan,
                None => {
                    warn!("planner reply contained no JSON object; using degraded plan");
                    degraded_plan(hints)
                }
            },
            Err(err) => {
                warn!(%err, "planner call failed; using degraded plan");
                degraded_plan(hints)
            }
        }
    }
}

/// Minimal raw plan used when the model is unreachable or unparsable:
/// term-only query when a term hint exists, otherwise a clarification.
pub fn degraded_plan(hints: &Hints) -> Value {
    match &hints.term {
        Some(term) => json!({
            "intent": "query",
            "term": term,
            "filters": [],
            "group_by": [],
            "select": ["name", "start_date", "end_date", "source"],
            "order_by": [{"field": "start_date", "dir": "asc"}],
            "limit": null
        }),
        None => json!({"intent": "ask_clarification", "missing": ["term"]}),
    }
}

/// First balanced-looking JSON object in the reply, greedily matched. Models
/// frequently wrap the plan in prose or code fences; everything around the
/// outermost braces is ignored.
pub fn extract_first_json_object(text: &str) -> Option<Value> {
    let re = regex::Regex::new(r"(?s)\{.*\}").unwrap();
    let m = re.find(text)?;
    serde_json::from_str(m.as_str()).ok()
}

#[cfg(any(feature = "llm-ollama", feature = "llm-openai", feature = "llm-anthropic"))]
fn planner_user_prompt(question: &str, hints: &Hints) -> String {
    let hints_json = serde_json::to_value(hints).unwrap_or(Value::Null);
    format!(
        "User question:\n{question}\n\nHINTS:\n{hints_json}\n\nJSON plan:"
    )
}

#[cfg(any(feature = "llm-ollama", feature = "llm-openai", feature = "llm-anthropic"))]
fn rewriter_user_prompt(question: &str, summary: &str, rows: &[Row]) -> String {
    let table = serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string());
    format!(
        "QUESTION:\n{question}\n\nFACTUAL SUMMARY:\n{summary}\n\nRAW ROWS (for reference, do not contradict them):\n{table}\n\nNow rewrite the FACTUAL SUMMARY as a concise, clear answer without changing any of its facts."
    )
}

#[cfg(any(feature = "llm-ollama", feature = "llm-openai", feature = "llm-anthropic"))]
fn llm_timeout() -> Result<Option<Duration>, LlmError> {
    let raw = match std::env::var(LLM_TIMEOUT_SECS_ENV) {
        Ok(v) => v,
        Err(_) => return Ok(Some(Duration::from_secs(120))),
    };
    let secs: u64 = raw.trim().parse().map_err(|_| {
        LlmError::NotConfigured(format!("invalid {LLM_TIMEOUT_SECS_ENV} value `{raw}`"))
    })?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

#[cfg(any(feature = "llm-ollama", feature = "llm-openai", feature = "llm-anthropic"))]
fn http_client(timeout: Option<Duration>) -> Result<reqwest::blocking::Client, LlmError> {
    let mut builder = reqwest::blocking::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| LlmError::Http(format!("failed to build http client: {e}")))
}

#[cfg(feature = "llm-ollama")]
fn ollama_chat(
    host: &str,
    model: &str,
    user: &str,
    system: Option<&str>,
    format: Option<Value>,
    timeout: Option<Duration>,
) -> Result<String, LlmError> {
    let host = host.trim_end_matches('/');
    let url = format!("{host}/api/chat");

    let mut messages = Vec::new();
    if let Some(system) = system {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": user}));

    let mut body = json!({
        "model": model,
        "stream": false,
        "messages": messages,
        "options": {"temperature": 0}
    });
    if let Some(format) = format {
        body["format"] = format;
    }

    let client = http_client(timeout)?;
    let resp = client.post(&url).json(&body).send().map_err(|e| {
        LlmError::Http(format!(
            "failed to reach ollama at {url} (is it running? try `ollama serve` or set {OLLAMA_HOST_ENV}): {e}"
        ))
    })?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        return Err(LlmError::Http(format!("ollama http error {status}: {text}")));
    }

    #[derive(serde::Deserialize)]
    struct ChatResponse {
        message: ChatMessage,
    }
    #[derive(serde::Deserialize)]
    struct ChatMessage {
        content: String,
    }

    let out: ChatResponse = resp
        .json()
        .map_err(|e| LlmError::InvalidResponse(format!("ollama returned invalid JSON: {e}")))?;
    Ok(out.message.content)
}

#[cfg(feature = "llm-openai")]
fn openai_chat(
    base_url: &str,
    model: &str,
    user: &str,
    system: Option<&str>,
    json_object: bool,
    timeout: Option<Duration>,
) -> Result<String, LlmError> {
    let key = std::env::var(OPENAI_API_KEY_ENV)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            LlmError::NotConfigured(format!("OpenAI backend requires {OPENAI_API_KEY_ENV}"))
        })?;

    let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
    let mut messages = Vec::new();
    if let Some(system) = system {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": user}));

    let mut body = json!({
        "model": model,
        "messages": messages,
        "temperature": 0
    });
    if json_object {
        body["response_format"] = json!({"type": "json_object"});
    }

    let client = http_client(timeout)?;
    let resp = client
        .post(&url)
        .bearer_auth(&key)
        .json(&body)
        .send()
        .map_err(|e| LlmError::Http(format!("openai request failed: {e}")))?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        return Err(LlmError::Http(format!("openai http error {status}: {text}")));
    }

    let data: Value = resp
        .json()
        .map_err(|e| LlmError::InvalidResponse(format!("openai returned invalid JSON: {e}")))?;
    data["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| LlmError::InvalidResponse("openai reply had no message content".to_string()))
}

#[cfg(feature = "llm-anthropic")]
fn anthropic_chat(
    base_url: &str,
    model: &str,
    user: &str,
    system: Option<&str>,
    timeout: Option<Duration>,
) -> Result<String, LlmError> {
    let key = std::env::var(ANTHROPIC_API_KEY_ENV)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            LlmError::NotConfigured(format!("Anthropic backend requires {ANTHROPIC_API_KEY_ENV}"))
        })?;
    let version =
        std::env::var(ANTHROPIC_VERSION_ENV).unwrap_or_else(|_| "2023-06-01".to_string());

    let url = format!("{}/v1/messages", base_url.trim_end_matches('/'));
    let mut body = json!({
        "model": model,
        "max_tokens": 1024,
        "temperature": 0,
        "messages": [{"role": "user", "content": user}]
    });
    if let Some(system) = system {
        body["system"] = json!(system);
    }

    let client = http_client(timeout)?;
    let resp = client
        .post(&url)
        .header("x-api-key", &key)
        .header("anthropic-version", &version)
        .json(&body)
        .send()
        .map_err(|e| LlmError::Http(format!("anthropic request failed: {e}")))?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        return Err(LlmError::Http(format!(
            "anthropic http error {status}: {text}"
        )));
    }

    let data: Value = resp
        .json()
        .map_err(|e| LlmError::InvalidResponse(format!("anthropic returned invalid JSON: {e}")))?;
    data["content"][0]["text"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| {
            LlmError::InvalidResponse("anthropic reply had no text content".to_string())
        })
}
