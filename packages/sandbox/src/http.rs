// ABOUTME: HTTP-backed sandbox provider speaking an E2B-style REST API
// ABOUTME: Filesystem and command calls with SSE-streamed command output

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use codex_config::{CODEX_SANDBOX_API_KEY, CODEX_SANDBOX_API_URL, CODEX_SANDBOX_TEMPLATE};

use crate::error::{Result, SandboxError};
use crate::provider::{Sandbox, SandboxProvider};
use crate::types::{ExecResult, OutputChunk, RunOptions, SandboxInfo, StreamType, WrittenFile};

const DEFAULT_API_URL: &str = "https://api.sandbox.codex.dev";

/// Provider for remote sandboxes behind an E2B-style REST API.
pub struct HttpSandboxProvider {
    client: Client,
    base_url: String,
    api_key: String,
    template: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    sandbox_id: String,
}

#[derive(Debug, Deserialize)]
struct ExistsResponse {
    exists: bool,
}

#[derive(Debug, Deserialize)]
struct HostResponse {
    host: String,
}

impl HttpSandboxProvider {
    fn create_client() -> Client {
        Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client")
    }

    pub fn new(base_url: String, api_key: String, template: Option<String>) -> Result<Self> {
        if api_key.is_empty() {
            return Err(SandboxError::Config(
                "Sandbox API key is required".to_string(),
            ));
        }

        Ok(Self {
            client: Self::create_client(),
            base_url,
            api_key,
            template,
        })
    }

    /// Build a provider from `CODEX_SANDBOX_API_KEY` / `CODEX_SANDBOX_API_URL`.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var(CODEX_SANDBOX_API_KEY)
            .map_err(|_| SandboxError::Config(format!("{} not set", CODEX_SANDBOX_API_KEY)))?;
        let base_url =
            env::var(CODEX_SANDBOX_API_URL).unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let template = env::var(CODEX_SANDBOX_TEMPLATE).ok();

        Self::new(base_url, api_key, template)
    }

    fn sandbox(&self, id: String) -> HttpSandbox {
        HttpSandbox {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            id,
        }
    }
}

#[async_trait]
impl SandboxProvider for HttpSandboxProvider {
    async fn connect(&self, sandbox_id: &str) -> Result<Box<dyn Sandbox>> {
        let response = self
            .client
            .get(format!("{}/v1/sandboxes/{}", self.base_url, sandbox_id))
            .header("x-api-key", &self.api_key)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(SandboxError::NotFound(sandbox_id.to_string()));
        }
        let response = check_status(response).await?;
        // Body is sandbox metadata; only liveness matters for reconnect
        let _ = response.bytes().await?;

        info!("Reconnected to sandbox {}", sandbox_id);
        Ok(Box::new(self.sandbox(sandbox_id.to_string())))
    }

    async fn create(&self, timeout: Duration) -> Result<Box<dyn Sandbox>> {
        let response = self
            .client
            .post(format!("{}/v1/sandboxes", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(&serde_json::json!({
                "template": self.template,
                "timeout_ms": timeout.as_millis() as u64,
            }))
            .send()
            .await?;

        let response = check_status(response).await?;
        let created: CreateResponse = response
            .json()
            .await
            .map_err(|e| SandboxError::Protocol(e.to_string()))?;

        info!("Created sandbox {}", created.sandbox_id);
        Ok(Box::new(self.sandbox(created.sandbox_id)))
    }
}

/// A live sandbox reached over the REST API.
pub struct HttpSandbox {
    client: Client,
    base_url: String,
    api_key: String,
    id: String,
}

impl HttpSandbox {
    fn url(&self, suffix: &str) -> String {
        format!("{}/v1/sandboxes/{}{}", self.base_url, self.id, suffix)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("x-api-key", &self.api_key)
    }

    /// Consume the SSE response of a command call, forwarding chunks live
    /// and accumulating the full streams until the terminal exit event.
    async fn consume_command_stream(
        response: Response,
        output: Option<&tokio::sync::mpsc::UnboundedSender<OutputChunk>>,
    ) -> Result<ExecResult> {
        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut exit_code: Option<i64> = None;

        while let Some(chunk_result) = byte_stream.next().await {
            let bytes = chunk_result?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            // Process complete SSE events
            while let Some(event_end) = buffer.find("\n\n") {
                let event = buffer[..event_end].to_string();
                buffer = buffer[event_end + 2..].to_string();

                for line in event.lines() {
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let Ok(event_json) = serde_json::from_str::<serde_json::Value>(data) else {
                        debug!("Skipping undecodable command event: {}", data);
                        continue;
                    };

                    if let Some(code) = event_json["exit_code"].as_i64() {
                        exit_code = Some(code);
                        continue;
                    }

                    let Some(text) = event_json["data"].as_str() else {
                        continue;
                    };
                    let stream = match event_json["stream"].as_str() {
                        Some("stderr") => StreamType::Stderr,
                        _ => StreamType::Stdout,
                    };
                    match stream {
                        StreamType::Stdout => stdout.push_str(text),
                        StreamType::Stderr => stderr.push_str(text),
                    }
                    if let Some(sender) = output {
                        // Receiver may already be gone; streaming is best-effort
                        let _ = sender.send(OutputChunk {
                            stream,
                            data: text.to_string(),
                        });
                    }
                }
            }
        }

        let exit_code = exit_code
            .ok_or_else(|| SandboxError::Protocol("Command stream ended without exit code".to_string()))?;

        Ok(ExecResult {
            exit_code,
            stdout,
            stderr,
        })
    }
}

#[async_trait]
impl Sandbox for HttpSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        let response = self
            .authed(self.client.get(self.url("/files/exists")))
            .query(&[("path", path)])
            .send()
            .await?;

        let response = check_status(response).await?;
        let body: ExistsResponse = response
            .json()
            .await
            .map_err(|e| SandboxError::Protocol(e.to_string()))?;
        Ok(body.exists)
    }

    async fn make_dir(&self, path: &str) -> Result<()> {
        let response = self
            .authed(self.client.post(self.url("/files/mkdir")))
            .json(&serde_json::json!({ "path": path }))
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<WrittenFile> {
        let response = self
            .authed(self.client.put(self.url("/files")))
            .json(&serde_json::json!({ "path": path, "content": content }))
            .send()
            .await?;

        let response = check_status(response).await?;
        let written: WrittenFile = response
            .json()
            .await
            .map_err(|e| SandboxError::Protocol(e.to_string()))?;
        Ok(written)
    }

    async fn run_command(&self, command: &str, options: RunOptions) -> Result<ExecResult> {
        let request = self
            .authed(self.client.post(self.url("/commands")))
            .json(&serde_json::json!({
                "command": command,
                "timeout_ms": options.timeout.as_millis() as u64,
            }));

        let run = async {
            let response = request.send().await?;
            let response = check_status(response).await?;
            Self::consume_command_stream(response, options.output.as_ref()).await
        };

        // The API enforces the timeout server-side; this guard covers a
        // stalled connection as well.
        match tokio::time::timeout(options.timeout + Duration::from_secs(10), run).await {
            Ok(result) => result,
            Err(_) => Err(SandboxError::Timeout {
                seconds: options.timeout.as_secs(),
            }),
        }
    }

    async fn get_host(&self, port: u16) -> Result<String> {
        let response = self
            .authed(self.client.get(self.url("/host")))
            .query(&[("port", port.to_string())])
            .send()
            .await?;

        let response = check_status(response).await?;
        let body: HostResponse = response
            .json()
            .await
            .map_err(|e| SandboxError::Protocol(e.to_string()))?;
        Ok(body.host)
    }

    async fn get_info(&self) -> Result<SandboxInfo> {
        let response = self.authed(self.client.get(self.url("/info"))).send().await?;

        let response = check_status(response).await?;
        let info: SandboxInfo = response
            .json()
            .await
            .map_err(|e| SandboxError::Protocol(e.to_string()))?;
        Ok(info)
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(SandboxError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider(server: &MockServer) -> HttpSandboxProvider {
        HttpSandboxProvider::new(server.uri(), "test-key".to_string(), None).unwrap()
    }

    #[tokio::test]
    async fn test_create_returns_sandbox_with_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sandboxes"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"sandbox_id": "sbx-42"})),
            )
            .mount(&server)
            .await;

        let sandbox = provider(&server)
            .await
            .create(Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(sandbox.id(), "sbx-42");
    }

    #[tokio::test]
    async fn test_connect_missing_sandbox_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/sandboxes/sbx-gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = provider(&server)
            .await
            .connect("sbx-gone")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SandboxError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_run_command_streams_chunks_and_exit_code() {
        let server = MockServer::start().await;
        let sse_body = concat!(
            "data: {\"stream\":\"stdout\",\"data\":\"a\\n\"}\n\n",
            "data: {\"stream\":\"stdout\",\"data\":\"b\\n\"}\n\n",
            "data: {\"stream\":\"stderr\",\"data\":\"warn\\n\"}\n\n",
            "data: {\"exit_code\":0}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/sandboxes/sbx-1/commands"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse_body))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/sandboxes"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"sandbox_id": "sbx-1"})),
            )
            .mount(&server)
            .await;

        let sandbox = provider(&server)
            .await
            .create(Duration::from_secs(600))
            .await
            .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let result = sandbox
            .run_command(
                "echo a; echo b",
                RunOptions {
                    timeout: Duration::from_secs(30),
                    output: Some(tx),
                },
            )
            .await
            .unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "a\nb\n");
        assert_eq!(result.stderr, "warn\n");

        let mut streamed = Vec::new();
        while let Some(chunk) = rx.recv().await {
            streamed.push((chunk.stream, chunk.data));
        }
        assert_eq!(
            streamed,
            vec![
                (StreamType::Stdout, "a\n".to_string()),
                (StreamType::Stdout, "b\n".to_string()),
                (StreamType::Stderr, "warn\n".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_command_stream_without_exit_code_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sandboxes/sbx-1/commands"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("data: {\"stream\":\"stdout\",\"data\":\"x\"}\n\n"),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/sandboxes"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"sandbox_id": "sbx-1"})),
            )
            .mount(&server)
            .await;

        let sandbox = provider(&server)
            .await
            .create(Duration::from_secs(600))
            .await
            .unwrap();
        let err = sandbox
            .run_command("true", RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Protocol(_)));
    }
}
