//! Test doubles: a scripted in-process transport and a raw TCP HTTP server.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex as TokioMutex;

use crate::transport::{Transport, TransportError, TransportRequest, TransportResponse};

// ─────────────────────────────────────────────────────────────────────────────
// Scripted transport
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    Respond { status: u16, body: String },
    RespondWithHeaders {
        status: u16,
        body: String,
        headers: Vec<(&'static str, String)>,
    },
    Fail(TransportError),
    /// Never resolves within any test timeout.
    Hang,
}

impl Scripted {
    pub(crate) fn status(status: u16, body: &str) -> Self {
        Self::Respond {
            status,
            body: body.to_string(),
        }
    }
}

type Responder = dyn Fn(&TransportRequest, usize) -> Scripted + Send + Sync;

/// Transport that answers from a closure and records every request it saw.
pub(crate) struct MockTransport {
    responder: Box<Responder>,
    calls: AtomicUsize,
    requests: Mutex<Vec<TransportRequest>>,
}

impl MockTransport {
    pub(crate) fn from_fn(
        responder: impl Fn(&TransportRequest, usize) -> Scripted + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Answers in order; the last entry repeats once the script runs out.
    pub(crate) fn sequence(script: Vec<Scripted>) -> Arc<Self> {
        Self::from_fn(move |_, index| {
            script
                .get(index)
                .or_else(|| script.last())
                .cloned()
                .unwrap_or_else(|| Scripted::status(500, "{}"))
        })
    }

    pub(crate) fn always(scripted: Scripted) -> Arc<Self> {
        Self::from_fn(move |_, _| scripted.clone())
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = (self.responder)(&request, index);
        self.requests.lock().expect("requests lock").push(request);

        match scripted {
            Scripted::Respond { status, body } => Ok(TransportResponse {
                status,
                headers: HeaderMap::new(),
                body: body.into_bytes(),
            }),
            Scripted::RespondWithHeaders {
                status,
                body,
                headers,
            } => {
                let mut map = HeaderMap::new();
                for (name, value) in headers {
                    map.insert(name, value.parse().expect("header value"));
                }
                Ok(TransportResponse {
                    status,
                    headers: map,
                    body: body.into_bytes(),
                })
            }
            Scripted::Fail(err) => Err(err),
            Scripted::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(TransportError::network("hang elapsed"))
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Raw TCP HTTP server
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub(crate) enum MockOutcome {
    DropConnection,
    Respond {
        status: u16,
        body: String,
        delay_ms: u64,
    },
}

impl MockOutcome {
    pub(crate) fn respond(status: u16, body: &str) -> Self {
        Self::Respond {
            status,
            body: body.to_string(),
            delay_ms: 0,
        }
    }
}

fn header_end_offset(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
    let mut buffer = Vec::new();
    loop {
        let mut chunk = [0_u8; 2048];
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if header_end_offset(&buffer).is_some() {
            break;
        }
    }

    let header_end = header_end_offset(&buffer)?;
    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next()?.to_string();
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let content_length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buffer[header_end + 4..].to_vec();
    while body.len() < content_length {
        let mut chunk = [0_u8; 2048];
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
    }

    Some(CapturedRequest {
        method,
        path,
        headers,
        body,
    })
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        408 => "Request Timeout",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

async fn write_http_response(
    stream: &mut tokio::net::TcpStream,
    status: u16,
    body: &str,
) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text(status),
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await
}

/// Serve scripted outcomes in order; extra requests get a 500.
pub(crate) async fn start_mock_server(
    outcomes: Vec<MockOutcome>,
) -> (
    String,
    Arc<TokioMutex<Vec<CapturedRequest>>>,
    tokio::task::JoinHandle<()>,
) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let captured = Arc::new(TokioMutex::new(Vec::<CapturedRequest>::new()));
    let scripted = Arc::new(TokioMutex::new(VecDeque::from(outcomes)));
    let captured_clone = Arc::clone(&captured);
    let scripted_clone = Arc::clone(&scripted);

    let handle = tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(value) => value,
                Err(_) => break,
            };
            let captured_inner = Arc::clone(&captured_clone);
            let scripted_inner = Arc::clone(&scripted_clone);
            tokio::spawn(async move {
                let Some(request) = read_http_request(&mut stream).await else {
                    return;
                };
                captured_inner.lock().await.push(request);

                let outcome = scripted_inner
                    .lock()
                    .await
                    .pop_front()
                    .unwrap_or_else(|| MockOutcome::respond(500, r#"{"message":"unexpected request"}"#));

                match outcome {
                    MockOutcome::DropConnection => {}
                    MockOutcome::Respond {
                        status,
                        body,
                        delay_ms,
                    } => {
                        if delay_ms > 0 {
                            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        }
                        let _ = write_http_response(&mut stream, status, &body).await;
                    }
                }
            });
        }
    });

    (format!("http://{}", addr), captured, handle)
}
