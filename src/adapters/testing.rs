//! Canned HTTP responder for adapter tests.
//!
//! Listens on an ephemeral local port, answers each request from a fixed
//! route table (500 when nothing matches), and records what it received.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct Route {
    method: &'static str,
    path: &'static str,
    status: u16,
    body: String,
}

pub fn route(method: &'static str, path: &'static str, status: u16, body: impl Into<String>) -> Route {
    Route {
        method,
        path,
        status,
        body: body.into(),
    }
}

/// One request as received
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    /// Request line and headers, lowercased
    pub head: String,
    pub body: Vec<u8>,
}

pub struct CannedServer {
    url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl CannedServer {
    pub async fn start(routes: Vec<Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let routes = Arc::new(routes);

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = routes.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let _ = respond(stream, &routes, &recorded).await;
                });
            }
        });

        Self { url, requests }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

fn header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim() == "content-length")
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

async fn respond(
    mut stream: TcpStream,
    routes: &[Route],
    recorded: &Mutex<Vec<Recorded>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = header_end(&buf) {
            break end;
        }
    };

    let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
    let expected = end + content_length(&head);
    while buf.len() < expected {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let raw_head = String::from_utf8_lossy(&buf[..end]).to_string();
    let mut request_line = raw_head.split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();

    let (status, body) = routes
        .iter()
        .find(|r| r.method == method && r.path == path)
        .map(|r| (r.status, r.body.clone()))
        .unwrap_or((500, "no route".to_string()));

    recorded.lock().unwrap().push(Recorded {
        method: method.clone(),
        path,
        head,
        body: buf[end..].to_vec(),
    });

    let mut response = format!("HTTP/1.1 {} Canned\r\nConnection: close\r\n", status);
    if status != 204 {
        response.push_str("Content-Type: application/json\r\n");
        response.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    response.push_str("\r\n");
    if method != "HEAD" && status != 204 {
        response.push_str(&body);
    }

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}
