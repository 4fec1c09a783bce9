//! Minimal HTTP/1.1 server for exercising the network paths in tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use reqwest::Client;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub fn test_client() -> Client {
    Client::builder()
        .no_proxy()
        .build()
        .expect("test client builds")
}

#[derive(Debug, Clone)]
pub enum StubResponse {
    Body {
        status: u16,
        content_type: &'static str,
        body: Vec<u8>,
    },
    /// Advertises `declared` bytes, sends `body`, then hangs up.
    Truncated { declared: usize, body: Vec<u8> },
    /// Advertises `declared` bytes, sends `body`, then keeps the socket open.
    Stall { declared: usize, body: Vec<u8> },
}

impl StubResponse {
    pub fn html(body: String) -> Self {
        Self::Body {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body: body.into_bytes(),
        }
    }

    pub fn bytes(body: Vec<u8>) -> Self {
        Self::Body {
            status: 200,
            content_type: "video/mp4",
            body,
        }
    }

    pub fn status(status: u16) -> Self {
        Self::Body {
            status,
            content_type: "text/plain",
            body: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub referer: Option<String>,
}

type Routes = Arc<Mutex<HashMap<String, StubResponse>>>;
type Requests = Arc<Mutex<Vec<RecordedRequest>>>;

pub struct StubServer {
    addr: SocketAddr,
    routes: Routes,
    requests: Requests,
    task: JoinHandle<()>,
}

impl StubServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub server");
        let addr = listener.local_addr().expect("stub server address");
        let routes: Routes = Arc::default();
        let requests: Requests = Arc::default();

        let task = tokio::spawn({
            let routes = routes.clone();
            let requests = requests.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let routes = routes.clone();
                    let requests = requests.clone();
                    tokio::spawn(async move {
                        let _ = serve(stream, routes, requests).await;
                    });
                }
            }
        });

        Self {
            addr,
            routes,
            requests,
            task,
        }
    }

    pub fn route(&self, path_and_query: &str, response: StubResponse) {
        self.routes
            .lock()
            .unwrap()
            .insert(path_and_query.to_string(), response);
    }

    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.addr, path_and_query)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn hits(&self, path_and_query: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.path == path_and_query)
            .count()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: TcpStream, routes: Routes, requests: Requests) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&buf).to_string();
    let mut lines = head.lines();
    let path = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let referer = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("referer"))
        .map(|(_, value)| value.trim().to_string());

    requests.lock().unwrap().push(RecordedRequest {
        path: path.clone(),
        referer,
    });

    let response = routes
        .lock()
        .unwrap()
        .get(&path)
        .cloned()
        .unwrap_or_else(|| StubResponse::status(404));

    match response {
        StubResponse::Body {
            status,
            content_type,
            body,
        } => {
            write_head(&mut stream, status, content_type, body.len()).await?;
            stream.write_all(&body).await?;
            stream.shutdown().await?;
        }
        StubResponse::Truncated { declared, body } => {
            write_head(&mut stream, 200, "video/mp4", declared).await?;
            stream.write_all(&body).await?;
            stream.flush().await?;
            stream.shutdown().await?;
        }
        StubResponse::Stall { declared, body } => {
            write_head(&mut stream, 200, "video/mp4", declared).await?;
            stream.write_all(&body).await?;
            stream.flush().await?;
            std::future::pending::<()>().await;
        }
    }

    Ok(())
}

async fn write_head(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    content_length: usize,
) -> std::io::Result<()> {
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        _ => "Error",
    };
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status, reason, content_type, content_length
    );
    stream.write_all(head.as_bytes()).await
}
