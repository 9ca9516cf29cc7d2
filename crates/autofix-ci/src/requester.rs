//! Repair requester: asks a hosted completion service for a fixed version of
//! the source.
//!
//! The request body is always built from typed payload structs and
//! serialized with `serde_json`, so quotes, backslashes and newlines in the
//! source are escaped by the encoder rather than spliced into text.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use autofix_core::{AutofixError, RepairRequest, RepairResponse, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Legacy text-completions endpoint.
pub const COMPLETIONS_URL: &str = "https://api.openai.com/v1/completions";

/// Chat-completions endpoint.
pub const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Longest slice of an error body quoted back in error messages.
const ERROR_BODY_LIMIT: usize = 200;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// API credential. `Debug` and `Display` never show the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        ApiKey(key.into())
    }

    /// The raw secret, for the `Authorization` header only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

/// Wire format spoken by the completion endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompletionApi {
    /// `prompt` in, `choices[0].text` out.
    #[default]
    Completions,

    /// `messages` in, `choices[0].message.content` out.
    Chat,
}

impl CompletionApi {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "completions" | "legacy" => Ok(CompletionApi::Completions),
            "chat" => Ok(CompletionApi::Chat),
            other => Err(AutofixError::InvalidConfig(format!(
                "unknown completion api: {other}"
            ))),
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            CompletionApi::Completions => COMPLETIONS_URL,
            CompletionApi::Chat => CHAT_COMPLETIONS_URL,
        }
    }
}

/// Completion service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Endpoint URL the request is POSTed to.
    pub endpoint: String,

    /// Wire format.
    pub api: CompletionApi,

    /// Bearer credential.
    #[serde(skip)]
    pub api_key: Option<ApiKey>,

    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        let api = std::env::var("AUTOFIX_API")
            .ok()
            .and_then(|a| CompletionApi::parse(&a).ok())
            .unwrap_or_default();
        CompletionConfig {
            endpoint: std::env::var("AUTOFIX_ENDPOINT")
                .unwrap_or_else(|_| api.default_endpoint().to_string()),
            api,
            api_key: std::env::var("OPENAI_API_KEY").ok().map(ApiKey::new),
            timeout_secs: std::env::var("AUTOFIX_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl CompletionConfig {
    /// Create a new config from environment variables.
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific endpoint.
    pub fn new(endpoint: &str, api: CompletionApi) -> Self {
        CompletionConfig {
            endpoint: endpoint.to_string(),
            api,
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set the bearer credential.
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(ApiKey::new(key));
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

/// A service that turns a [`RepairRequest`] into a candidate.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Perform exactly one completion call.
    async fn complete(&self, request: &RepairRequest) -> Result<RepairResponse>;
}

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CompletionsPayload<'a> {
    model: &'a str,
    prompt: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Option<Vec<Choice>>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Build the JSON request body for `api`.
pub fn build_payload(api: CompletionApi, request: &RepairRequest) -> Result<serde_json::Value> {
    let params = &request.params;
    let value = match api {
        CompletionApi::Completions => serde_json::to_value(CompletionsPayload {
            model: &params.model,
            prompt: request.prompt(),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        })?,
        CompletionApi::Chat => serde_json::to_value(ChatPayload {
            model: &params.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some(request.prompt()),
            }],
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        })?,
    };
    Ok(value)
}

fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// Map an HTTP status and body to a [`RepairResponse`] or error.
pub fn parse_response(api: CompletionApi, status: u16, body: &str) -> Result<RepairResponse> {
    if status == 401 || status == 403 {
        return Err(AutofixError::AuthError { status });
    }
    if !(200..300).contains(&status) {
        let detail = serde_json::from_str::<ErrorBody>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.to_string());
        return Err(AutofixError::ServiceUnavailable(format!(
            "status {}: {}",
            status,
            snippet(&detail)
        )));
    }

    let parsed: ResponseBody = serde_json::from_str(body)
        .map_err(|e| AutofixError::MalformedResponse(format!("body is not valid JSON: {e}")))?;

    let choice = parsed
        .choices
        .and_then(|choices| choices.into_iter().next())
        .ok_or_else(|| AutofixError::MalformedResponse("no candidates in response".to_string()))?;

    let text = match api {
        CompletionApi::Completions => choice.text,
        CompletionApi::Chat => choice.message.and_then(|m| m.content),
    }
    .filter(|t| !t.trim().is_empty())
    .ok_or_else(|| AutofixError::MalformedResponse("first candidate has no text".to_string()))?;

    Ok(RepairResponse {
        candidate: normalize_candidate(&text),
        model: parsed.model,
        finish_reason: choice.finish_reason,
    })
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)\A\s*```[\w+#.-]*[ \t]*\r?\n(.*?)\r?\n?```\s*\z")
            .expect("fence pattern is valid")
    })
}

/// Clean up a raw completion.
///
/// Unwraps a single markdown code fence around the whole text, drops the
/// blank lines completions tend to start with, trims trailing whitespace and
/// ends the text with exactly one newline. Indentation of the first code
/// line is kept.
pub fn normalize_candidate(raw: &str) -> String {
    let body = fence_regex()
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw);

    let mut rest = body;
    while let Some(idx) = rest.find('\n') {
        if rest[..idx].trim().is_empty() {
            rest = &rest[idx + 1..];
        } else {
            break;
        }
    }

    let mut out = rest.trim_end().to_string();
    out.push('\n');
    out
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Completion client over HTTPS with bearer auth.
pub struct HttpCompletionClient {
    config: CompletionConfig,
    api_key: ApiKey,
    http_client: reqwest::Client,
}

impl HttpCompletionClient {
    /// Create a new client. Fails if no API key is configured.
    pub fn new(config: CompletionConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.expose().trim().is_empty())
            .ok_or_else(|| AutofixError::InvalidConfig("no API key configured".to_string()))?;

        let mut builder =
            reqwest::Client::builder().user_agent(concat!("autofix/", env!("CARGO_PKG_VERSION")));
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let http_client = builder
            .build()
            .map_err(|e| AutofixError::InvalidConfig(format!("failed to create HTTP client: {e}")))?;

        Ok(HttpCompletionClient {
            config,
            api_key,
            http_client,
        })
    }

    /// Create client from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(CompletionConfig::from_env())
    }

    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }

    fn transport_error(&self, err: reqwest::Error) -> AutofixError {
        if err.is_timeout() {
            AutofixError::ServiceUnavailable(format!(
                "request timed out after {}s",
                self.config.timeout_secs
            ))
        } else {
            AutofixError::ServiceUnavailable(err.to_string())
        }
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: &RepairRequest) -> Result<RepairResponse> {
        request.params.validate()?;
        let payload = build_payload(self.config.api, request)?;

        info!(
            endpoint = %self.config.endpoint,
            model = %request.params.model,
            max_tokens = request.params.max_tokens,
            "Requesting repair"
        );

        let response = self
            .http_client
            .post(&self.config.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        debug!(status = status, bytes = body.len(), "Completion response received");

        parse_response(self.config.api, status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autofix_core::{GenerationParams, DEFAULT_INSTRUCTION};

    const BROKEN: &str =
        "public class Main { public static void main(String[] a){ System.out.prinlnt(\"hi\"); } }";

    fn request() -> RepairRequest {
        RepairRequest::new(DEFAULT_INSTRUCTION, BROKEN.to_string(), GenerationParams::default())
    }

    #[test]
    fn test_api_key_is_redacted() {
        let key = ApiKey::new("sk-secret-value");
        assert_eq!(format!("{key:?}"), "ApiKey(***)");
        assert_eq!(key.to_string(), "***");

        let config = CompletionConfig::new(COMPLETIONS_URL, CompletionApi::Completions)
            .with_api_key("sk-secret-value");
        assert!(!format!("{config:?}").contains("sk-secret"));
        assert!(!serde_json::to_string(&config).unwrap().contains("sk-secret"));
    }

    #[test]
    fn test_completions_payload_escapes_source() {
        let payload = build_payload(CompletionApi::Completions, &request()).unwrap();
        assert_eq!(payload["model"], "text-davinci-003");
        assert_eq!(payload["max_tokens"], 300);
        assert!((payload["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);

        // The prompt survives encoding byte for byte, quotes and newline included.
        let encoded = serde_json::to_string(&payload).unwrap();
        let decoded: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(
            decoded["prompt"].as_str().unwrap(),
            format!("Fix this Java code:\n{BROKEN}")
        );
        assert!(encoded.contains(r#"\"hi\""#));
        assert!(encoded.contains(r"\n"));
    }

    #[test]
    fn test_chat_payload_shape() {
        let payload = build_payload(CompletionApi::Chat, &request()).unwrap();
        assert!(payload.get("prompt").is_none());
        assert_eq!(payload["messages"][0]["role"], "user");
        assert!(payload["messages"][0]["content"]
            .as_str()
            .unwrap()
            .starts_with("Fix this Java code:\n"));
    }

    #[test]
    fn test_parse_completions_success() {
        let body = r#"{"model":"text-davinci-003","choices":[{"text":"\n\nclass Main {}","finish_reason":"stop"}]}"#;
        let resp = parse_response(CompletionApi::Completions, 200, body).unwrap();
        assert_eq!(resp.candidate, "class Main {}\n");
        assert_eq!(resp.model.as_deref(), Some("text-davinci-003"));
        assert!(!resp.truncated());
    }

    #[test]
    fn test_parse_chat_success() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"```java\nclass Main {}\n```"},"finish_reason":"length"}]}"#;
        let resp = parse_response(CompletionApi::Chat, 200, body).unwrap();
        assert_eq!(resp.candidate, "class Main {}\n");
        assert!(resp.truncated());
    }

    #[test]
    fn test_parse_empty_choices_is_malformed() {
        let err = parse_response(CompletionApi::Completions, 200, r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, AutofixError::MalformedResponse(_)));

        let err = parse_response(CompletionApi::Completions, 200, r#"{"id":"x"}"#).unwrap_err();
        assert!(matches!(err, AutofixError::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_blank_text_is_malformed() {
        let err = parse_response(CompletionApi::Completions, 200, r#"{"choices":[{"text":"  \n"}]}"#)
            .unwrap_err();
        assert!(matches!(err, AutofixError::MalformedResponse(_)));

        // A chat-shaped body read as completions has no text either.
        let err = parse_response(
            CompletionApi::Completions,
            200,
            r#"{"choices":[{"message":{"role":"assistant","content":"x"}}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, AutofixError::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_non_json_is_malformed() {
        let err = parse_response(CompletionApi::Completions, 200, "<html>oops</html>").unwrap_err();
        assert!(matches!(err, AutofixError::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_auth_rejection() {
        for status in [401, 403] {
            let err = parse_response(CompletionApi::Completions, status, "{}").unwrap_err();
            assert!(matches!(err, AutofixError::AuthError { status: s } if s == status));
        }
    }

    #[test]
    fn test_parse_server_error_is_unavailable() {
        let body = r#"{"error":{"message":"The server is overloaded"}}"#;
        let err = parse_response(CompletionApi::Completions, 503, body).unwrap_err();
        match err {
            AutofixError::ServiceUnavailable(msg) => {
                assert!(msg.contains("503"));
                assert!(msg.contains("overloaded"));
            }
            other => panic!("expected ServiceUnavailable, got {other:?}"),
        }

        let err = parse_response(CompletionApi::Completions, 429, "slow down").unwrap_err();
        assert!(matches!(err, AutofixError::ServiceUnavailable(_)));
    }

    #[test]
    fn test_normalize_candidate() {
        assert_eq!(normalize_candidate("\n\nclass A {}"), "class A {}\n");
        assert_eq!(normalize_candidate("  \n    int x;\n\n\n"), "    int x;\n");
        assert_eq!(
            normalize_candidate("```\nline1\nline2\n```\n"),
            "line1\nline2\n"
        );
        assert_eq!(normalize_candidate("```java\nclass A {}```"), "class A {}\n");
        // Fences in the middle of the text are content, not wrappers.
        let mixed = "// see ```example```\nclass A {}";
        assert_eq!(normalize_candidate(mixed), format!("{mixed}\n"));
    }

    #[test]
    fn test_new_requires_api_key() {
        let config = CompletionConfig::new(COMPLETIONS_URL, CompletionApi::Completions);
        assert!(matches!(
            HttpCompletionClient::new(config),
            Err(AutofixError::InvalidConfig(_))
        ));

        let blank = CompletionConfig::new(COMPLETIONS_URL, CompletionApi::Completions).with_api_key("  ");
        assert!(HttpCompletionClient::new(blank).is_err());
    }

    #[test]
    fn test_completion_api_parse() {
        assert_eq!(CompletionApi::parse("chat").unwrap(), CompletionApi::Chat);
        assert_eq!(
            CompletionApi::parse("legacy").unwrap(),
            CompletionApi::Completions
        );
        assert!(CompletionApi::parse("grpc").is_err());
        assert_eq!(CompletionApi::Chat.default_endpoint(), CHAT_COMPLETIONS_URL);
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = CompletionConfig::new(&format!("http://{addr}/v1/completions"), CompletionApi::Completions)
            .with_api_key("sk-test")
            .with_timeout(5);
        let client = HttpCompletionClient::new(config).unwrap();

        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(err, AutofixError::ServiceUnavailable(_)));
        assert!(!err.to_string().contains("sk-test"));
    }
}
