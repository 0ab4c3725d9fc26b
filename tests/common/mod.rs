#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const API_PREFIX: &str = "/api/v2/component-analyses";

/// How the stub answers one package path.
#[derive(Clone)]
pub enum Route {
    Json(String),
    Status(u16),
    /// Close the connection without answering.
    Drop,
    /// Never answer.
    Hang,
}

#[derive(Default)]
struct State {
    routes: HashMap<String, Route>,
    delay: Duration,
    requests: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    seen: Mutex<Vec<SeenRequest>>,
}

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub target: String,
    pub user_agent: Option<String>,
}

/// A stand-in for the component analyses API on a local port.
pub struct StubService {
    addr: SocketAddr,
    state: Arc<State>,
    handle: JoinHandle<()>,
}

pub struct StubBuilder {
    state: State,
}

impl StubBuilder {
    /// Answers `GET {API_PREFIX}/{ecosystem}/{name}/{version}` with `route`.
    pub fn route(mut self, ecosystem: &str, name: &str, version: &str, route: Route) -> Self {
        self.state
            .routes
            .insert(format!("{API_PREFIX}/{ecosystem}/{name}/{version}"), route);
        self
    }

    /// Sleeps before every answer.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.state.delay = delay;
        self
    }

    pub async fn start(self) -> StubService {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let addr = listener.local_addr().expect("stub address");
        let state = Arc::new(self.state);

        let accept_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = Arc::clone(&accept_state);
                tokio::spawn(async move {
                    let _ = serve(stream, state).await;
                });
            }
        });

        StubService {
            addr,
            state,
            handle,
        }
    }
}

impl StubService {
    pub fn builder() -> StubBuilder {
        StubBuilder {
            state: State::default(),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.state.seen.lock().expect("seen lock").clone()
    }
}

impl Drop for StubService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Returns a URL nothing listens on.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("address");
    drop(listener);
    format!("http://{addr}")
}

async fn serve(mut stream: TcpStream, state: Arc<State>) -> std::io::Result<()> {
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
    let target = lines
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string();
    let user_agent = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("user-agent"))
        .map(|(_, v)| v.trim().to_string());

    state.requests.fetch_add(1, Ordering::SeqCst);
    state.seen.lock().expect("seen lock").push(SeenRequest {
        target: target.clone(),
        user_agent,
    });
    let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.peak.fetch_max(now, Ordering::SeqCst);

    tokio::time::sleep(state.delay).await;

    let path = target.split('?').next().unwrap_or_default();
    let route = state
        .routes
        .get(path)
        .cloned()
        .unwrap_or(Route::Status(404));

    let result = match route {
        Route::Json(body) => respond(&mut stream, 200, &body).await,
        Route::Status(code) => respond(&mut stream, code, r#"{"error": "stub"}"#).await,
        Route::Drop => Ok(()),
        Route::Hang => {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    };

    state.in_flight.fetch_sub(1, Ordering::SeqCst);
    result
}

async fn respond(stream: &mut TcpStream, code: u16, body: &str) -> std::io::Result<()> {
    let reason = match code {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    };
    let response = format!(
        "HTTP/1.1 {code} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// A report with one vulnerability per `(id, severity)` pair.
pub fn report(vulns: &[(&str, &str)]) -> String {
    let vulns: Vec<serde_json::Value> = vulns
        .iter()
        .map(|(id, severity)| {
            serde_json::json!({
                "id": id,
                "cvss": "7.5",
                "cve_ids": [format!("CVE-{id}")],
                "severity": severity,
                "title": format!("{id} title"),
                "url": format!("https://security.example.com/{id}"),
                "fixed_in": ["99.0"],
            })
        })
        .collect();

    serde_json::json!({
        "message": format!("{} known security vulnerabilities", vulns.len()),
        "recommended_versions": "99.0",
        "vulnerability": vulns,
    })
    .to_string()
}
