use crate::batch::Batch;
use crate::config::{ApiType, Config};
use crate::error::{Result, TranslatorError};
use crate::prompt::{unescape_line, PromptTemplate};
use crate::validator::TranslationValidator;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// OpenAI Chat Completion request for one batch
#[derive(Debug, Serialize)]
struct TranslationRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    /// Understood by hybrid reasoning models (Qwen3 and compatible servers)
    #[serde(skip_serializing_if = "Option::is_none")]
    enable_thinking: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

/// Reasoning models may answer with `content: null` when they run out of tokens
#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Check if a model is a reasoning model that doesn't support temperature
fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("gpt-5")
        || model.starts_with("o1")
        || model.starts_with("o3")
        || model.starts_with("o4")
}

static INDEXED_LINE_REGEX: OnceLock<Regex> = OnceLock::new();
static THINK_BLOCK_REGEX: OnceLock<Regex> = OnceLock::new();
static THINK_OPEN_REGEX: OnceLock<Regex> = OnceLock::new();
static THINK_CLOSE_REGEX: OnceLock<Regex> = OnceLock::new();

/// Sends one batch per request to an OpenAI-compatible endpoint and decodes
/// the indexed reply. Performs no retries of its own.
#[derive(Debug, Clone)]
pub struct TranslationClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    api_type: ApiType,
    model: String,
    max_tokens: u32,
    temperature: f32,
    enable_thinking: Option<bool>,
    source_language: String,
    target_language: String,
}

impl TranslationClient {
    /// Build a client; the request timeout is enforced by the HTTP client.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TranslatorError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            api_type: config.api_type,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            enable_thinking: config.enable_thinking,
            source_language: config.source_language.clone(),
            target_language: config.target_language.clone(),
        })
    }

    fn build_request(&self, prompt: String) -> TranslationRequest {
        // Reasoning models don't support temperature
        let is_reasoning = is_reasoning_model(&self.model);

        TranslationRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: if is_reasoning {
                None
            } else {
                Some(self.temperature)
            },
            enable_thinking: self.enable_thinking,
        }
    }

    /// Translate one batch, returning translations keyed by batch index.
    ///
    /// Indices the model skipped (or answered with an unusable line) are
    /// simply absent from the map.
    pub async fn translate(
        &self,
        batch: &Batch,
        prompt: &PromptTemplate,
    ) -> Result<HashMap<usize, String>> {
        if batch.is_empty() {
            return Ok(HashMap::new());
        }

        let request = self.build_request(prompt.render(
            &self.source_language,
            &self.target_language,
            batch,
        ));

        let reply = self.send(&request).await?;
        parse_reply(&reply, batch)
    }

    async fn send(&self, request: &TranslationRequest) -> Result<String> {
        let builder = self.http.post(&self.api_url);
        let builder = match self.api_type {
            ApiType::OpenAi => builder.header("Authorization", format!("Bearer {}", self.api_key)),
            ApiType::Google => builder.query(&[("key", self.api_key.as_str())]),
        };

        let response = builder
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() { "timed out" } else { "failed" };
                TranslatorError::api(None, format!("Request {}: {}", kind, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(TranslatorError::api(Some(status.as_u16()), body));
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            TranslatorError::api(
                Some(status.as_u16()),
                format!("Failed to decode completion response: {}", e),
            )
        })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| {
                TranslatorError::api(
                    Some(status.as_u16()),
                    "Completion response contained no choices",
                )
            })
    }
}

/// Remove `<think>` blocks, including a block cut off at either end.
pub fn strip_thinking(text: &str) -> String {
    let block = THINK_BLOCK_REGEX
        .get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));
    let open = THINK_OPEN_REGEX.get_or_init(|| Regex::new(r"(?s)<think>.*").expect("valid regex"));
    let close =
        THINK_CLOSE_REGEX.get_or_init(|| Regex::new(r"(?s).*</think>").expect("valid regex"));

    let text = block.replace_all(text, "");
    let text = open.replace_all(&text, "");
    close.replace_all(&text, "").into_owned()
}

/// Parse `[index] translation` lines out of a model reply.
///
/// Only indices present in `batch` are kept; the first answer for an index
/// wins. A reply without a single indexed line is a `Parse` error.
pub fn parse_reply(reply: &str, batch: &Batch) -> Result<HashMap<usize, String>> {
    let regex = INDEXED_LINE_REGEX.get_or_init(|| {
        Regex::new(r"^\s*[\[［](\d+)[\]］]\s*(.*?)\s*$").expect("valid regex")
    });

    let cleaned = strip_thinking(reply);
    let mut recognised = 0;
    let mut translations = HashMap::new();

    for line in cleaned.lines() {
        let Some(caps) = regex.captures(line) else {
            continue;
        };
        recognised += 1;

        let Ok(index) = caps[1].parse::<usize>() else {
            continue;
        };
        let Some(source) = batch.source_for(index) else {
            debug!("Batch {}: reply index {} is not in the batch", batch.number(), index);
            continue;
        };
        if translations.contains_key(&index) {
            debug!("Batch {}: duplicate reply index {}", batch.number(), index);
            continue;
        }

        let text = unescape_line(&caps[2], source);
        let report = TranslationValidator::validate(source, &text);
        if report.has_errors() {
            warn!(
                "Batch {}: rejecting translation for {:?}: {:?}",
                batch.number(),
                source,
                report.errors
            );
            continue;
        }
        if report.has_warnings() {
            warn!(
                "Batch {}: translation warnings for {:?}: {:?}",
                batch.number(),
                source,
                report.warnings
            );
        }

        translations.insert(index, text);
    }

    if recognised == 0 {
        let preview: String = cleaned.chars().take(200).collect();
        return Err(TranslatorError::Parse(format!(
            "no indexed lines in reply for batch {}: {:?}",
            batch.number(),
            preview
        )));
    }

    Ok(translations)
}
