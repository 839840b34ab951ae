//! Integration tests for the game text translator
//!
//! These tests run the whole pipeline against a mocked chat completion
//! endpoint: loading source and resume files, batching, parsing indexed
//! replies, checkpointing and resuming after an interrupt.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{
    matchers::{body_string_contains, header, method, path},
    Mock, MockServer, Request, Respond, ResponseTemplate,
};

use game_text_translator::{
    ApiType, Config, EntrySet, Pipeline, RunOutcome, ShutdownSignal, TranslatorError,
};

// ==================== Test Helpers ====================

fn create_test_config(api_url: &str) -> Config {
    Config {
        api_url: api_url.to_string(),
        api_key: "test-api-key".to_string(),
        api_type: ApiType::OpenAi,
        model: "gpt-4o-mini".to_string(),
        request_timeout: Duration::from_secs(5),
        max_tokens: 4000,
        temperature: 0.3,
        enable_thinking: None,
        source_language: "Japanese".to_string(),
        target_language: "English".to_string(),
        prompt_template_file: None,
        batch_size: 2,
        save_interval: 2,
        max_attempts_per_key: 1,
        retry_max_attempts: 1,
        retry_delay: Duration::from_millis(10),
        request_interval: Duration::ZERO,
    }
}

fn create_openai_response(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "choices": [
            {
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }
        ]
    })
}

fn write_json(dir: &TempDir, name: &str, value: serde_json::Value) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, serde_json::to_string_pretty(&value).unwrap())
        .expect("Failed to write fixture");
    path
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).expect("Output missing"))
        .expect("Output is not JSON")
}

fn greetings_source() -> serde_json::Value {
    serde_json::json!({"こんにちは": "", "さようなら": ""})
}

/// Replies successfully and requests shutdown, like Ctrl-C arriving mid-request
struct InterruptingResponder {
    shutdown: ShutdownSignal,
    reply: String,
}

impl Respond for InterruptingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.shutdown.request();
        ResponseTemplate::new(200).set_body_json(create_openai_response(&self.reply))
    }
}

// ==================== Scenario Tests ====================

#[tokio::test]
async fn test_full_batch_translated() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer test-api-key"))
        .and(body_string_contains("[1] こんにちは"))
        .and(body_string_contains("[2] さようなら"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(create_openai_response("[1] Hello\n[2] Goodbye")),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let source = write_json(&dir, "ManualTransFile.json", greetings_source());
    let output = dir.path().join("translated.json");
    let config = create_test_config(&format!("{}/v1/chat/completions", mock_server.uri()));

    let entries = EntrySet::load(&source, Some(&output)).unwrap();
    let mut pipeline = Pipeline::new(config, entries, &output).unwrap();
    let report = pipeline.run(&ShutdownSignal::new()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(
        read_json(&output),
        serde_json::json!({"こんにちは": "Hello", "さようなら": "Goodbye"})
    );
}

#[tokio::test]
async fn test_partial_reply_uses_fallback() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(create_openai_response("[1] Hello")))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let source = write_json(&dir, "source.json", greetings_source());
    let output = dir.path().join("out.json");

    let entries = EntrySet::load(&source, None).unwrap();
    let mut pipeline =
        Pipeline::new(create_test_config(&mock_server.uri()), entries, &output).unwrap();
    let report = pipeline.run(&ShutdownSignal::new()).await.unwrap();

    assert_eq!(report.entries_untranslated, 1);
    assert_eq!(
        read_json(&output),
        serde_json::json!({"こんにちは": "Hello", "さようなら": "さようなら"})
    );
}

#[tokio::test]
async fn test_resume_only_sends_pending_entries() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("[1] さようなら"))
        .respond_with(ResponseTemplate::new(200).set_body_json(create_openai_response("[1] Goodbye")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let source = write_json(&dir, "source.json", greetings_source());
    let resume = write_json(
        &dir,
        "resume.json",
        serde_json::json!({"こんにちは": "Hello", "さようなら": ""}),
    );
    let output = dir.path().join("out.json");

    let entries = EntrySet::load(&source, Some(&resume)).unwrap();
    assert_eq!(entries.pending_keys(), vec!["さようなら"]);

    let mut pipeline =
        Pipeline::new(create_test_config(&mock_server.uri()), entries, &output).unwrap();
    pipeline.run(&ShutdownSignal::new()).await.unwrap();

    assert_eq!(
        read_json(&output),
        serde_json::json!({"こんにちは": "Hello", "さようなら": "Goodbye"})
    );
}

// ==================== Resume Tests ====================

#[tokio::test]
async fn test_interrupt_then_resume_keeps_completed_entries() {
    let dir = TempDir::new().unwrap();
    let source = write_json(
        &dir,
        "source.json",
        serde_json::json!({"一": "", "二": "", "三": "", "四": ""}),
    );
    let output = dir.path().join("out.json");

    // First run: the interrupt lands while batch 1 is in flight
    let first_server = MockServer::start().await;
    let shutdown = ShutdownSignal::new();
    Mock::given(method("POST"))
        .respond_with(InterruptingResponder {
            shutdown: shutdown.clone(),
            reply: "[1] One\n[2] Two".to_string(),
        })
        .expect(1)
        .mount(&first_server)
        .await;

    let entries = EntrySet::load(&source, Some(&output)).unwrap();
    let mut pipeline =
        Pipeline::new(create_test_config(&first_server.uri()), entries, &output).unwrap();
    let report = pipeline.run(&shutdown).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Interrupted);
    let checkpoint = read_json(&output);
    assert_eq!(
        checkpoint,
        serde_json::json!({"一": "One", "二": "Two", "三": "三", "四": "四"})
    );

    // Second run resumes from the checkpoint and only sends the rest
    let second_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("[1] 三"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(create_openai_response("[1] Three\n[2] Four")),
        )
        .expect(1)
        .mount(&second_server)
        .await;

    let entries = EntrySet::load(&source, Some(&output)).unwrap();
    assert_eq!(entries.pending_keys(), vec!["三", "四"]);
    let mut pipeline =
        Pipeline::new(create_test_config(&second_server.uri()), entries, &output).unwrap();
    let report = pipeline.run(&ShutdownSignal::new()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Done);
    assert!(report.is_complete());
    let final_output = read_json(&output);
    for (key, value) in checkpoint.as_object().unwrap() {
        if value.as_str() != Some(key.as_str()) {
            assert_eq!(&final_output[key], value, "lost translation for {}", key);
        }
    }
    assert_eq!(final_output["四"], "Four");
}

#[tokio::test]
async fn test_output_key_set_matches_source_despite_noisy_replies() {
    let mock_server = MockServer::start().await;
    // Reordered, with foreign indices, chatter and a thinking trace
    let reply = "<think>[1] draft</think>\nSure!\n[3] Extra\n[2] B\n[9] Nine\n[1] A";
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(create_openai_response(reply)))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let source = write_json(
        &dir,
        "source.json",
        serde_json::json!({"あ": "", "い": "", "う": "", "": "", "あ ": ""}),
    );
    let output = dir.path().join("out.json");

    let entries = EntrySet::load(&source, None).unwrap();
    let mut pipeline =
        Pipeline::new(create_test_config(&mock_server.uri()), entries, &output).unwrap();
    pipeline.run(&ShutdownSignal::new()).await.unwrap();

    let out = read_json(&output);
    let mut out_keys: Vec<&String> = out.as_object().unwrap().keys().collect();
    out_keys.sort();
    let source_json = read_json(&source);
    let mut source_keys: Vec<&String> = source_json.as_object().unwrap().keys().collect();
    source_keys.sort();

    assert_eq!(out_keys, source_keys);
    assert!(out
        .as_object()
        .unwrap()
        .values()
        .all(|v| v.as_str().is_some()));
    assert_eq!(out["あ"], "A");
    assert_eq!(out["い"], "B");
}

// ==================== Failure Handling Tests ====================

#[tokio::test]
async fn test_api_down_still_produces_complete_output() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let source = write_json(&dir, "source.json", greetings_source());
    let output = dir.path().join("out.json");

    let entries = EntrySet::load(&source, None).unwrap();
    let mut config = create_test_config(&mock_server.uri());
    config.max_attempts_per_key = 3;
    let mut pipeline = Pipeline::new(config, entries, &output).unwrap();
    let report = pipeline.run(&ShutdownSignal::new()).await.unwrap();

    // Each pass: the pair fails, then each entry fails on its own
    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(report.batches_attempted, 9);
    assert_eq!(report.batches_failed, 9);
    assert_eq!(report.entries_exhausted, 2);
    assert_eq!(
        read_json(&output),
        serde_json::json!({"こんにちは": "こんにちは", "さようなら": "さようなら"})
    );
}

#[tokio::test]
async fn test_malformed_source_aborts_before_any_request() {
    let dir = TempDir::new().unwrap();
    let source = write_json(&dir, "source.json", serde_json::json!({"a": ["not", "flat"]}));

    let result = EntrySet::load(&source, None);

    assert!(matches!(result, Err(TranslatorError::MalformedInput { .. })));
}

#[test]
fn test_invalid_batch_size_aborts_before_any_request() {
    let mut config = create_test_config("http://127.0.0.1:9");
    config.batch_size = 0;

    let result = Pipeline::new(config, EntrySet::from_sources(["a"]), "unused.json");

    assert!(matches!(result, Err(TranslatorError::Config(_))));
}
