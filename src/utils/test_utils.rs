//! Shared fixtures for tests: a scripted HTTP server and an in-memory writer.

use crate::core::client::{ApiClient, ClientConfig};
use crate::core::config::defaults::DEFAULT_SYSTEM_MESSAGE;
use crate::core::keys::KeyRing;
use crate::core::retry::RetryPolicy;
use crate::core::session::Session;
use crate::ui::display::Display;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// What the mock server saw for one exchange.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The bearer token, without its `Bearer ` prefix.
    pub fn bearer(&self) -> &str {
        self.header("authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub enum MockResponse {
    Json { status: u16, body: String },
    EventStream { body: String },
    /// An event stream whose `content-length` promises more than `body`;
    /// the connection closes after `body` is written.
    TruncatedStream { body: String },
    /// Close the connection without answering.
    Hangup,
}

impl MockResponse {
    pub fn ok_json(body: serde_json::Value) -> Self {
        MockResponse::Json {
            status: 200,
            body: body.to_string(),
        }
    }

    pub fn error(status: u16, message: &str) -> Self {
        MockResponse::Json {
            status,
            body: serde_json::json!({ "error": { "message": message } }).to_string(),
        }
    }

    /// A buffered completion answering with `content`.
    pub fn completion(content: &str) -> Self {
        Self::ok_json(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }],
            "usage": { "prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5 },
            "citations": ["https://example.com/a"]
        }))
    }

    pub fn events(frames: &[&str]) -> Self {
        MockResponse::EventStream {
            body: event_body(frames),
        }
    }

    /// Like [`MockResponse::events`], but the body is cut off mid-response.
    pub fn truncated_events(frames: &[&str]) -> Self {
        MockResponse::TruncatedStream {
            body: event_body(frames),
        }
    }
}

fn event_body(frames: &[&str]) -> String {
    frames
        .iter()
        .map(|frame| format!("data: {frame}\n\n"))
        .collect()
}

type Responder = dyn Fn(&CapturedRequest) -> MockResponse + Send + Sync;

/// A one-request-per-connection HTTP/1.1 server on a loopback port.
pub struct MockServer {
    pub url: String,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
    task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&CapturedRequest) -> MockResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("local addr should resolve");
        let captured = Arc::new(Mutex::new(Vec::new()));
        let responder: Arc<Responder> = Arc::new(responder);

        let captured_for_server = Arc::clone(&captured);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let captured = Arc::clone(&captured_for_server);
                let responder = Arc::clone(&responder);
                tokio::spawn(async move {
                    let _ = serve_connection(stream, captured, responder).await;
                });
            }
        });

        Self {
            url: format!("http://{addr}/chat/completions"),
            captured,
            task,
        }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.captured.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.captured.lock().unwrap().len()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
    responder: Arc<Responder>,
) -> Result<(), String> {
    let (request_line, headers, body) = read_http_request(&mut stream).await?;
    let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    let request = CapturedRequest {
        request_line,
        headers,
        body,
    };
    let response = responder(&request);
    captured.lock().unwrap().push(request);

    let raw = match response {
        MockResponse::Json { status, body } => {
            http_response(status, "application/json", body.len(), &body)
        }
        MockResponse::EventStream { body } => {
            http_response(200, "text/event-stream", body.len(), &body)
        }
        MockResponse::TruncatedStream { body } => {
            http_response(200, "text/event-stream", body.len() + 4096, &body)
        }
        MockResponse::Hangup => return Ok(()),
    };
    stream
        .write_all(raw.as_bytes())
        .await
        .map_err(|err| err.to_string())?;
    stream.shutdown().await.map_err(|err| err.to_string())
}

fn http_response(status: u16, content_type: &str, content_length: usize, body: &str) -> String {
    format!(
        "HTTP/1.1 {status} {}\r\ncontent-type: {content_type}\r\n\
         content-length: {content_length}\r\nconnection: close\r\n\r\n{body}",
        reason(status)
    )
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

async fn read_http_request(
    stream: &mut TcpStream,
) -> Result<(String, Vec<(String, String)>, Vec<u8>), String> {
    let mut buffer = Vec::new();
    let header_end = loop {
        if let Some(end) = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
        {
            break end + 4;
        }
        let mut chunk = [0_u8; 1024];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
    };

    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?
        .to_string();

    let mut headers = Vec::new();
    let mut content_length = 0_usize;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
        headers.push((name.to_string(), value));
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length - body.len()];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok((request_line, headers, body))
}

/// A cloneable `Write` sink whose contents tests can inspect.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A client pointed at `endpoint` with a single key and a fast retry policy.
pub fn create_test_client(endpoint: &str, model: &str) -> ApiClient {
    let http = reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("http client");
    let mut client = ApiClient::with_http_client(
        http,
        ClientConfig {
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            timeout: Duration::from_secs(10),
            rate_limit: 0.0,
            system_prompt: DEFAULT_SYSTEM_MESSAGE.to_string(),
        },
        Arc::new(KeyRing::new(vec!["pplx-test-key-0123456789".to_string()])),
    );
    client.set_retry_policy(RetryPolicy {
        max_retries: 1,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(10),
        multiplier: 2.0,
        jitter: 0.0,
    });
    client
}

/// An interactive session without spinner or clipboard side effects,
/// printing into the returned buffer.
pub fn create_test_session(endpoint: &str) -> (Session, SharedBuffer) {
    let buffer = SharedBuffer::new();
    let display = Display::new(Box::new(buffer.clone()), false);
    let mut session = Session::new(
        create_test_client(endpoint, "sonar-pro"),
        display,
        DEFAULT_SYSTEM_MESSAGE,
    );
    session.spinner = false;
    session.clipboard = |_| Ok(());
    (session, buffer)
}

/// Endpoint nothing listens on; requests to it fail to connect.
pub const UNREACHABLE_ENDPOINT: &str = "http://127.0.0.1:9/chat/completions";
