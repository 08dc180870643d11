//! Integration test: the real HTTP transport and tool loop against a mock Messages API.
//! The mock serves SSE bodies, so no network access or API key is needed.

use std::sync::Arc;

use futures_util::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::Value;
use tokio::sync::mpsc;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use claudette::agent::{AgentSettings, ChatAgent};
use claudette::conversation::{ContentBlock, ConversationStore, Role};
use claudette::filesystem::LocalFileSystem;
use claudette::kv::MemoryKvStore;
use claudette::llm::{AnthropicClient, LlmError, MessagesRequest, StreamEvent};
use claudette::secrets::MemoryKeyStore;
use claudette::tools::ToolRegistry;

const KEY: &str = "sk-ant-test";

fn sse(lines: &[&str]) -> ResponseTemplate {
    let mut body = lines.join("\n");
    body.push('\n');
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

fn client(server: &MockServer) -> AnthropicClient {
    AnthropicClient::new(Some(server.uri()), Arc::new(MemoryKeyStore::with_key(KEY)))
}

fn request() -> MessagesRequest {
    MessagesRequest {
        model: "claude-test".to_string(),
        messages: Vec::new(),
        max_tokens: 16,
        temperature: 1.0,
        system: None,
        stream: false,
        tools: None,
    }
}

#[tokio::test]
async fn malformed_line_is_skipped_and_done_ends_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", KEY))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_string_contains("\"stream\":true"))
        .respond_with(sse(&[
            ": keepalive",
            "",
            "data: {not json",
            "data: {\"type\":\"ping\"}",
            "data: [DONE]",
            "data: {\"type\":\"message_stop\"}",
        ]))
        .expect(1)
        .mount(&server)
        .await;

    let events: Vec<StreamEvent> = client(&server)
        .stream_messages(request())
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;
    assert_eq!(events, vec![StreamEvent::Ping]);
}

#[tokio::test]
async fn error_status_carries_provider_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string(
            r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#,
        ))
        .mount(&server)
        .await;

    match client(&server).stream_messages(request()).await {
        Err(LlmError::Api(message)) => assert_eq!(message, "invalid x-api-key"),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("expected an error"),
    }
}

#[tokio::test]
async fn list_models_and_validate_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(header("x-api-key", KEY))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"data":[{"type":"model","id":"claude-test","display_name":"Claude Test","created_at":"2025-01-01T00:00:00Z"}],"has_more":false}"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(401))
        .with_priority(10)
        .mount(&server)
        .await;

    let c = client(&server);
    let models = c.list_models().await.unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].id, "claude-test");
    assert!(c.validate_api_key(KEY).await.unwrap());
    assert!(!c.validate_api_key("sk-ant-wrong").await.unwrap());
}

#[tokio::test]
async fn tool_loop_over_http() {
    let server = MockServer::start().await;
    // second request: carries the tool result
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_string_contains("tool_result"))
        .respond_with(sse(&[
            r#"data: {"type":"message_start","message":{"id":"msg_2","role":"assistant","model":"claude-test"}}"#,
            r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"There is "}}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"one file."}}"#,
            r#"data: {"type":"content_block_stop","index":0}"#,
            r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"}}"#,
            r#"data: {"type":"message_stop"}"#,
        ]))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(sse(&[
            r#"data: {"type":"message_start","message":{"id":"msg_1","role":"assistant","model":"claude-test"}}"#,
            r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_1","name":"list_files","input":{}}}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"path\":"}}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"\".\"}"}}"#,
            r#"data: {"type":"content_block_stop","index":0}"#,
            r#"data: {"type":"message_delta","delta":{"stop_reason":"tool_use"}}"#,
            r#"data: {"type":"message_stop"}"#,
        ]))
        .expect(1)
        .mount(&server)
        .await;

    let workspace = tempfile::tempdir().unwrap();
    std::fs::write(workspace.path().join("notes.md"), "# notes").unwrap();
    let store = Arc::new(ConversationStore::open(Arc::new(MemoryKvStore::new())).await);
    let conv = store.create_conversation("list files in .").await.unwrap();
    let tools = ToolRegistry::with_default_tools(
        Arc::new(LocalFileSystem::new(workspace.path())),
        Some(workspace.path().to_path_buf()),
    );
    let agent = ChatAgent::new(
        store.clone(),
        Arc::new(client(&server)),
        Arc::new(tools),
        AgentSettings {
            model: "claude-test".to_string(),
            ..Default::default()
        },
    );

    let (tx, _rx) = mpsc::channel(1024);
    let summary = agent.send_message(&conv.id, "list files in .", &tx).await.unwrap();
    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.final_message.text(), "There is one file.");
    assert_eq!(summary.stop_reason.as_deref(), Some("end_turn"));

    let stored = store.get_messages(&conv.id).await;
    assert_eq!(stored.len(), 4);
    assert_eq!(stored[2].role, Role::User);
    assert_eq!(
        stored[2].content,
        vec![ContentBlock::ToolResult {
            tool_use_id: "toolu_1".to_string(),
            content: "Files in .:\n[FILE] notes.md (7 bytes)\n".to_string(),
            is_error: false,
        }]
    );

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let second: Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(second["model"], "claude-test");
    assert_eq!(second["stream"], true);
    assert_eq!(second["tools"].as_array().map(Vec::len), Some(7));
    assert_eq!(
        second["messages"][1]["content"][0],
        serde_json::json!({"type": "tool_use", "id": "toolu_1", "name": "list_files", "input": {"path": "."}})
    );
    assert_eq!(second["messages"][2]["content"][0]["tool_use_id"], "toolu_1");
}
