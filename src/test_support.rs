//! Loopback HTTP/1.1 server with canned JSON answers, for exercising the
//! reqwest code paths without reaching Spotify.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: String,
    /// Path plus query string, as sent on the request line.
    pub target: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn query(&self) -> HashMap<String, String> {
        let url = reqwest::Url::parse(&format!("http://stub{}", self.target)).unwrap();
        url.query_pairs().into_owned().collect()
    }

    pub fn form(&self) -> HashMap<String, String> {
        let url = reqwest::Url::parse(&format!("http://stub/?{}", self.body)).unwrap();
        url.query_pairs().into_owned().collect()
    }
}

#[derive(Clone)]
struct Canned {
    status: u16,
    body: String,
    delay: Duration,
}

#[derive(Default)]
struct StubState {
    routes: HashMap<String, Canned>,
    requests: Vec<RecordedRequest>,
}

pub(crate) struct StubServer {
    url: String,
    state: Arc<Mutex<StubState>>,
}

impl StubServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let state = Arc::new(Mutex::new(StubState::default()));

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, Arc::clone(&accept_state)));
            }
        });

        Self { url, state }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Answer requests for `path` (query ignored) with `status` and `body`.
    pub fn respond(&self, path: &str, status: u16, body: &str) {
        self.respond_after(path, status, body, Duration::ZERO);
    }

    pub fn respond_after(&self, path: &str, status: u16, body: &str, delay: Duration) {
        self.state.lock().routes.insert(
            path.to_string(),
            Canned {
                status,
                body: body.to_string(),
                delay,
            },
        );
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }
}

async fn serve(stream: TcpStream, state: Arc<Mutex<StubState>>) {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await.unwrap_or(0) == 0 {
        return;
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    if reader.read_exact(&mut body).await.is_err() {
        return;
    }

    let request = RecordedRequest {
        method,
        target,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    };
    let canned = {
        let mut state = state.lock();
        let canned = state.routes.get(request.path()).cloned();
        state.requests.push(request);
        canned
    }
    .unwrap_or(Canned {
        status: 404,
        body: r#"{"error":{"status":404,"message":"Not found."}}"#.to_string(),
        delay: Duration::ZERO,
    });

    if !canned.delay.is_zero() {
        tokio::time::sleep(canned.delay).await;
    }

    let response = format!(
        "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        canned.status,
        canned.body.len(),
        canned.body
    );
    let mut stream = reader.into_inner();
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}
