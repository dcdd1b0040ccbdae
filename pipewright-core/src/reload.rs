//! Browser reload notifications and the proxying dev server.
//!
//! The hub serves three things:
//!
//! - `/__pipewright/reload`, a websocket on which every connected page
//!   receives [`ReloadKind`] messages as JSON.
//! - `/__pipewright/client.js`, the snippet those pages load.
//! - `/__pipewright/status`, a JSON summary of the session.
//!
//! Everything else is proxied to the app server; HTML responses get the
//! client snippet injected before the configured marker.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use regex::Regex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::error::{Error, Result};
use crate::options::BrowserSyncOptions;

pub const RELOAD_ROUTE: &str = "/__pipewright/reload";
pub const CLIENT_ROUTE: &str = "/__pipewright/client.js";
pub const STATUS_ROUTE: &str = "/__pipewright/status";

const MAX_PROXY_BODY: usize = 64 * 1024 * 1024;

const CLIENT_SCRIPT: &str = r#"(function () {
  var proto = location.protocol === "https:" ? "wss://" : "ws://";
  var socket = new WebSocket(proto + location.host + "/__pipewright/reload");
  socket.onmessage = function (msg) {
    var data = JSON.parse(msg.data);
    if (data.type === "css") {
      document.querySelectorAll('link[rel="stylesheet"]').forEach(function (link) {
        link.href = link.href.split("?")[0] + "?pw=" + Date.now();
      });
    } else {
      location.reload();
    }
  };
})();
"#;

/// What connected browsers should do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ReloadKind {
    /// Swap stylesheets in place.
    #[serde(rename = "css")]
    InjectCss { paths: Vec<PathBuf> },
    /// Reload the whole page.
    #[serde(rename = "reload")]
    Full,
}

/// Receives reload requests from the watch loop and the session.
pub trait ReloadNotifier: Send + Sync {
    fn notify(&self, kind: ReloadKind);
}

/// Sends `kind` to `notifier` once `delay` has passed.
pub fn schedule_reload(
    notifier: Arc<dyn ReloadNotifier>,
    kind: ReloadKind,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        notifier.notify(kind);
    })
}

#[derive(Clone)]
struct HubState {
    tx: broadcast::Sender<ReloadKind>,
    connections: Arc<AtomicUsize>,
    reloads: Arc<AtomicUsize>,
    last_broadcast: Arc<Mutex<Option<Instant>>>,
    client: reqwest::Client,
    proxy_url: Option<String>,
    port: u16,
    inject_changes: bool,
    debounce: Duration,
    log_connections: bool,
    snippet_rule: Regex,
    snippet_blacklist: Vec<String>,
    rewrite_rules: Arc<Vec<(Regex, String)>>,
}

/// Websocket fan-out of reload messages plus the proxy in front of the app.
#[derive(Clone)]
pub struct ReloadHub {
    state: HubState,
}

impl ReloadHub {
    pub fn new(options: &BrowserSyncOptions) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| Error::Session(format!("Invalid pattern {}: {}", pattern, e)))
        };

        let rewrite_rules = options
            .rewrite_rules
            .iter()
            .map(|rule| Ok((compile(&rule.pattern)?, rule.replace.clone())))
            .collect::<Result<Vec<_>>>()?;

        let (tx, _) = broadcast::channel(64);
        Ok(Self {
            state: HubState {
                tx,
                connections: Arc::new(AtomicUsize::new(0)),
                reloads: Arc::new(AtomicUsize::new(0)),
                last_broadcast: Arc::new(Mutex::new(None)),
                client: reqwest::Client::new(),
                proxy_url: options.proxy.as_ref().map(|p| p.url()),
                port: options.port,
                inject_changes: options.inject_changes,
                debounce: Duration::from_millis(options.reload_debounce),
                log_connections: options.log_connections,
                snippet_rule: compile(&options.snippet_options.rule_match)?,
                snippet_blacklist: options.snippet_options.blacklist.clone(),
                rewrite_rules: Arc::new(rewrite_rules),
            },
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadKind> {
        self.state.tx.subscribe()
    }

    /// Number of browsers currently connected.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn reloads(&self) -> usize {
        self.state.reloads.load(Ordering::SeqCst)
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(RELOAD_ROUTE, get(reload_socket))
            .route(CLIENT_ROUTE, get(client_script))
            .route(STATUS_ROUTE, get(status))
            .fallback(proxy)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Binds `addr` and serves in the background.
    pub async fn serve(&self, addr: SocketAddr) -> Result<HubHandle> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let app = self.router();

        tracing::info!("Reload server listening on http://{}", local_addr);
        if let Some(target) = &self.state.proxy_url {
            tracing::info!("Proxying {}", target);
        }

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("reload server stopped: {}", e);
            }
        });

        Ok(HubHandle {
            addr: local_addr,
            task,
        })
    }
}

impl ReloadNotifier for ReloadHub {
    fn notify(&self, kind: ReloadKind) {
        let kind = match kind {
            ReloadKind::InjectCss { .. } if !self.state.inject_changes => ReloadKind::Full,
            other => other,
        };

        if let Ok(mut last) = self.state.last_broadcast.lock() {
            let now = Instant::now();
            if last.is_some_and(|t| now.duration_since(t) < self.state.debounce) {
                tracing::debug!("reload debounced");
                return;
            }
            *last = Some(now);
        }

        self.state.reloads.fetch_add(1, Ordering::SeqCst);
        match &kind {
            ReloadKind::Full => tracing::info!("Reloading browsers"),
            ReloadKind::InjectCss { paths } => {
                tracing::info!("Injecting {} stylesheet(s)", paths.len())
            }
        }
        // No subscribers just means no browser is open yet.
        let _ = self.state.tx.send(kind);
    }
}

/// A running hub server.
pub struct HubHandle {
    pub addr: SocketAddr,
    task: JoinHandle<()>,
}

impl HubHandle {
    pub fn shutdown(self) {
        self.task.abort();
    }
}

async fn reload_socket(ws: WebSocketUpgrade, State(state): State<HubState>) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, state))
}

async fn client_session(mut socket: WebSocket, state: HubState) {
    let mut rx = state.tx.subscribe();
    let open = state.connections.fetch_add(1, Ordering::SeqCst) + 1;
    if state.log_connections {
        tracing::info!("Browser connected ({} open)", open);
    }

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Ok(kind) => {
                    let Ok(text) = serde_json::to_string(&kind) else { continue };
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    let open = state.connections.fetch_sub(1, Ordering::SeqCst) - 1;
    if state.log_connections {
        tracing::info!("Browser disconnected ({} open)", open);
    }
}

async fn client_script() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript")], CLIENT_SCRIPT)
}

async fn status(State(state): State<HubState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "port": state.port,
        "proxy": state.proxy_url,
        "connections": state.connections.load(Ordering::SeqCst),
        "reloads": state.reloads.load(Ordering::SeqCst),
    }))
}

async fn proxy(State(state): State<HubState>, req: Request) -> std::result::Result<Response, HubError> {
    let target = state.proxy_url.as_ref().ok_or(HubError::NotFound)?;
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let blacklisted = state
        .snippet_blacklist
        .iter()
        .any(|prefix| path_and_query.starts_with(prefix.as_str()));

    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, MAX_PROXY_BODY)
        .await
        .map_err(|e| HubError::BadRequest(format!("Failed to read request body: {}", e)))?;

    let mut upstream = state
        .client
        .request(parts.method, format!("{}{}", target, path_and_query))
        .body(body);
    for (name, value) in parts.headers.iter() {
        if *name != header::HOST && *name != header::ACCEPT_ENCODING {
            upstream = upstream.header(name, value);
        }
    }

    let response = upstream
        .send()
        .await
        .map_err(|e| HubError::BadGateway(format!("{}: {}", target, e)))?;
    let status = response.status();
    let headers = response.headers().clone();
    let is_html = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    let bytes = response
        .bytes()
        .await
        .map_err(|e| HubError::BadGateway(format!("{}: {}", target, e)))?;

    let body = if is_html && !blacklisted {
        let html = String::from_utf8_lossy(&bytes);
        let html = state
            .rewrite_rules
            .iter()
            .fold(html.into_owned(), |acc, (re, replace)| {
                re.replace_all(&acc, replace.as_str()).into_owned()
            });
        Body::from(inject_snippet(&html, &state.snippet_rule))
    } else {
        Body::from(bytes)
    };

    let mut builder = Response::builder().status(status);
    for (name, value) in headers.iter() {
        if *name != header::CONTENT_LENGTH && *name != header::TRANSFER_ENCODING {
            builder = builder.header(name, value);
        }
    }
    builder
        .body(body)
        .map_err(|e| HubError::Internal(format!("Failed to create response: {}", e)))
}

/// Inserts the client script tag before the first `rule` match, or at the
/// end when the page has no match.
pub fn inject_snippet(html: &str, rule: &Regex) -> String {
    let tag = format!(r#"<script async src="{}"></script>"#, CLIENT_ROUTE);
    match rule.find(html) {
        Some(m) => format!("{}{}{}", &html[..m.start()], tag, &html[m.start()..]),
        None => format!("{}{}", html, tag),
    }
}

#[derive(Debug)]
enum HubError {
    BadRequest(String),
    BadGateway(String),
    NotFound,
    Internal(String),
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            HubError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            HubError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            HubError::NotFound => (StatusCode::NOT_FOUND, "No proxy target".to_string()),
            HubError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
