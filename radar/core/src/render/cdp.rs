//! Chrome DevTools Protocol Backend
//!
//! [`BrowserAutomation`] over a DevTools WebSocket. One connection is shared
//! by all pages; each page is its own target attached in flattened mode, so
//! page commands carry a `sessionId` on the same socket.
//!
//! # Connection
//!
//! The socket is split into a writer task (fed through an unbounded
//! channel) and a reader task that routes responses to the waiting caller
//! by command id. Protocol events are ignored. Every command round trip is
//! bounded by the configured command timeout.
//!
//! # Endpoints
//!
//! - `ws://…` / `wss://…`: used as the browser WebSocket directly
//! - `http://host:port`: resolved through `/json/version`

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::{BrowserAutomation, BrowserPage, RenderError, ScreenshotOptions, Viewport};

/// Interval between selector polls
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(50);

type Reply = Result<Value, CdpFailure>;

#[derive(Debug, Deserialize)]
struct CdpFailure {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CdpIncoming {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<CdpFailure>,
    method: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionInfo {
    web_socket_debugger_url: String,
}

/// Find the browser WebSocket URL for a configured endpoint
pub async fn resolve_ws_url(endpoint: &str, timeout: Duration) -> Result<String, RenderError> {
    let endpoint = endpoint.trim();
    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        return Ok(endpoint.to_string());
    }

    let base = url::Url::parse(endpoint)
        .map_err(|e| RenderError::Connect(format!("invalid endpoint '{endpoint}': {e}")))?;
    let version_url = base
        .join("/json/version")
        .map_err(|e| RenderError::Connect(e.to_string()))?;

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RenderError::Connect(e.to_string()))?;
    let info: VersionInfo = client
        .get(version_url.clone())
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| RenderError::Connect(format!("{version_url}: {e}")))?
        .json()
        .await
        .map_err(|e| RenderError::Connect(format!("{version_url}: {e}")))?;

    Ok(info.web_socket_debugger_url)
}

/// Shared DevTools connection
struct CdpConnection {
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>,
    outgoing: mpsc::UnboundedSender<String>,
    command_timeout: Duration,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl CdpConnection {
    async fn open(ws_url: &str, command_timeout: Duration) -> Result<Self, RenderError> {
        let (stream, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| RenderError::Connect(format!("{ws_url}: {e}")))?;
        let (mut sink, mut source) = stream.split();

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>> = Arc::default();

        let writer = tokio::spawn(async move {
            while let Some(text) = outgoing_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::warn!(error = %e, "DevTools write error");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let routes = Arc::clone(&pending);
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => dispatch(&routes, &text),
                    Ok(Message::Close(_)) => {
                        tracing::debug!("DevTools connection closed by browser");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "DevTools read error");
                        break;
                    }
                }
            }
            // dropping the senders fails every waiting command
            routes.lock().clear();
        });

        tracing::info!(url = %ws_url, "Connected to DevTools");

        Ok(Self {
            next_id: AtomicU64::new(1),
            pending,
            outgoing,
            command_timeout,
            reader,
            writer,
        })
    }

    /// Whether both socket tasks are still running
    fn is_alive(&self) -> bool {
        !self.reader.is_finished() && !self.writer.is_finished()
    }

    async fn call(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<Value, RenderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut request = json!({ "id": id, "method": method, "params": params });
        if let Some(session_id) = session_id {
            request["sessionId"] = json!(session_id);
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        if self.outgoing.send(request.to_string()).is_err() {
            self.pending.lock().remove(&id);
            return Err(RenderError::ConnectionClosed);
        }

        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(failure))) => Err(RenderError::Protocol {
                method: method.to_string(),
                message: format!("{} (code {})", failure.message, failure.code),
            }),
            Ok(Err(_)) => Err(RenderError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(RenderError::Timeout {
                    what: format!("reply to {method}"),
                    after: self.command_timeout,
                })
            }
        }
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

fn dispatch(routes: &Mutex<HashMap<u64, oneshot::Sender<Reply>>>, text: &str) {
    let incoming: CdpIncoming = match serde_json::from_str(text) {
        Ok(incoming) => incoming,
        Err(e) => {
            tracing::debug!(error = %e, "Unparseable DevTools frame");
            return;
        }
    };

    let Some(id) = incoming.id else {
        tracing::trace!(method = ?incoming.method, "DevTools event");
        return;
    };

    let reply = match incoming.error {
        Some(failure) => Err(failure),
        None => Ok(incoming.result.unwrap_or(Value::Null)),
    };

    if let Some(tx) = routes.lock().remove(&id) {
        let _ = tx.send(reply);
    }
}

fn field<'a>(value: &'a Value, pointer: &str, method: &str) -> Result<&'a Value, RenderError> {
    value
        .pointer(pointer)
        .ok_or_else(|| RenderError::UnexpectedResponse {
            method: method.to_string(),
            detail: format!("missing {pointer}"),
        })
}

fn str_field(value: &Value, pointer: &str, method: &str) -> Result<String, RenderError> {
    field(value, pointer, method)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| RenderError::UnexpectedResponse {
            method: method.to_string(),
            detail: format!("{pointer} is not a string"),
        })
}

/// Chromium reached over the DevTools protocol.
///
/// The connection is re-established on the next page request once the
/// socket is gone, for example after the browser restarted.
pub struct CdpBrowser {
    endpoint: String,
    command_timeout: Duration,
    connection: tokio::sync::Mutex<Arc<CdpConnection>>,
}

impl CdpBrowser {
    /// Connect to `endpoint` (see the module docs for accepted forms)
    pub async fn connect(endpoint: &str, command_timeout: Duration) -> Result<Self, RenderError> {
        let connection = Self::open(endpoint, command_timeout).await?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            command_timeout,
            connection: tokio::sync::Mutex::new(connection),
        })
    }

    async fn open(
        endpoint: &str,
        command_timeout: Duration,
    ) -> Result<Arc<CdpConnection>, RenderError> {
        let ws_url = resolve_ws_url(endpoint, command_timeout).await?;
        Ok(Arc::new(CdpConnection::open(&ws_url, command_timeout).await?))
    }

    /// Whether the current DevTools socket is still up
    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_alive()
    }

    async fn live_connection(&self) -> Result<Arc<CdpConnection>, RenderError> {
        let mut current = self.connection.lock().await;
        if current.is_alive() {
            return Ok(Arc::clone(&current));
        }

        tracing::warn!(endpoint = %self.endpoint, "DevTools connection lost, reconnecting");
        let fresh = Self::open(&self.endpoint, self.command_timeout).await?;
        *current = Arc::clone(&fresh);
        Ok(fresh)
    }
}

async fn close_target(connection: &CdpConnection, target_id: &str) -> Result<(), RenderError> {
    connection
        .call("Target.closeTarget", json!({ "targetId": target_id }), None)
        .await?;
    Ok(())
}

#[async_trait]
impl BrowserAutomation for CdpBrowser {
    fn name(&self) -> &str {
        "cdp"
    }

    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, RenderError> {
        const CREATE: &str = "Target.createTarget";
        const ATTACH: &str = "Target.attachToTarget";

        let connection = self.live_connection().await?;
        let created = connection
            .call(CREATE, json!({ "url": "about:blank" }), None)
            .await?;
        let target_id = str_field(&created, "/targetId", CREATE)?;

        let attached = connection
            .call(ATTACH, json!({ "targetId": target_id, "flatten": true }), None)
            .await
            .and_then(|reply| str_field(&reply, "/sessionId", ATTACH));
        let session_id = match attached {
            Ok(session_id) => session_id,
            Err(e) => {
                if let Err(close_err) = close_target(&connection, &target_id).await {
                    tracing::debug!(%target_id, error = %close_err, "Failed to close unattached target");
                }
                return Err(e);
            }
        };

        tracing::debug!(%target_id, %session_id, "Opened DevTools page");

        Ok(Box::new(CdpPage {
            connection,
            target_id,
            session_id,
        }))
    }
}

struct CdpPage {
    connection: Arc<CdpConnection>,
    target_id: String,
    session_id: String,
}

impl CdpPage {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RenderError> {
        self.connection
            .call(method, params, Some(&self.session_id))
            .await
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, RenderError> {
        const METHOD: &str = "Runtime.evaluate";
        let reply = self
            .call(
                METHOD,
                json!({ "expression": expression, "returnByValue": true }),
            )
            .await?;
        if let Some(exception) = reply.get("exceptionDetails") {
            return Err(RenderError::Protocol {
                method: METHOD.to_string(),
                message: exception
                    .pointer("/exception/description")
                    .and_then(Value::as_str)
                    .unwrap_or("script exception")
                    .to_string(),
            });
        }
        Ok(reply
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }
}

#[async_trait]
impl BrowserPage for CdpPage {
    async fn set_viewport(&self, viewport: Viewport) -> Result<(), RenderError> {
        self.call(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": viewport.width,
                "height": viewport.height,
                "deviceScaleFactor": viewport.device_scale_factor,
                "mobile": false,
            }),
        )
        .await?;
        Ok(())
    }

    async fn set_content(&self, html: &str) -> Result<(), RenderError> {
        const TREE: &str = "Page.getFrameTree";
        let tree = self.call(TREE, json!({})).await?;
        let frame_id = str_field(&tree, "/frameTree/frame/id", TREE)?;

        self.call(
            "Page.setDocumentContent",
            json!({ "frameId": frame_id, "html": html }),
        )
        .await?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str) -> Result<(), RenderError> {
        let quoted = Value::String(selector.to_string()).to_string();
        let expression = format!("document.querySelector({quoted}) !== null");
        loop {
            if self.evaluate(&expression).await?.as_bool() == Some(true) {
                return Ok(());
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn content_height(&self) -> Result<u32, RenderError> {
        let value = self
            .evaluate("document.documentElement.scrollHeight")
            .await?;
        value
            .as_f64()
            .filter(|h| h.is_finite() && *h >= 0.0)
            .map(|h| h.ceil() as u32)
            .ok_or_else(|| RenderError::UnexpectedResponse {
                method: "Runtime.evaluate".to_string(),
                detail: format!("scrollHeight was {value}"),
            })
    }

    async fn screenshot(&self, options: &ScreenshotOptions) -> Result<String, RenderError> {
        const METHOD: &str = "Page.captureScreenshot";
        let mut params = json!({
            "format": options.format.as_str(),
            "captureBeyondViewport": true,
            "fromSurface": true,
        });
        if let Some(quality) = options.quality {
            params["quality"] = json!(quality);
        }
        let reply = self.call(METHOD, params).await?;
        str_field(&reply, "/data", METHOD)
    }

    async fn close(self: Box<Self>) -> Result<(), RenderError> {
        close_target(&self.connection, &self.target_id).await?;
        tracing::debug!(target_id = %self.target_id, "Closed DevTools page");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{ImageFormat, Rasterizer};
    use crate::layout::{ComposedPage, PageSize};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_ws_endpoint_used_verbatim() {
        let url = resolve_ws_url(" ws://127.0.0.1:9222/devtools/browser/abc ", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(url, "ws://127.0.0.1:9222/devtools/browser/abc");
    }

    #[tokio::test]
    async fn test_invalid_endpoint() {
        let err = resolve_ws_url("not a url", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Connect(_)));
    }

    #[test]
    fn test_dispatch_routes_by_id() {
        let routes = Mutex::new(HashMap::new());
        let (tx, mut rx) = oneshot::channel();
        routes.lock().insert(7, tx);

        dispatch(&routes, r#"{"method":"Page.loadEventFired","params":{}}"#);
        assert!(rx.try_recv().is_err());

        dispatch(&routes, r#"{"id":7,"result":{"data":"QUJD"}}"#);
        let reply = rx.try_recv().unwrap().unwrap();
        assert_eq!(reply["data"], "QUJD");
        assert!(routes.lock().is_empty());
    }

    #[test]
    fn test_dispatch_error_reply() {
        let routes = Mutex::new(HashMap::new());
        let (tx, mut rx) = oneshot::channel();
        routes.lock().insert(1, tx);

        dispatch(&routes, r#"{"id":1,"error":{"code":-32000,"message":"No target"}}"#);
        let failure = rx.try_recv().unwrap().unwrap_err();
        assert_eq!(failure.code, -32000);
        assert_eq!(failure.message, "No target");
    }

    type PeerSocket = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    async fn accept_peer(listener: &TcpListener) -> PeerSocket {
        let (tcp, _) = listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(tcp).await.unwrap()
    }

    /// Answer DevTools commands on `ws`, recording each method.
    /// `attach_session` controls whether attaching yields a session id.
    async fn answer_commands(
        mut ws: PeerSocket,
        methods: Arc<Mutex<Vec<String>>>,
        attach_session: bool,
    ) {
        while let Some(Ok(frame)) = ws.next().await {
            let Message::Text(text) = frame else { continue };
            let request: Value = serde_json::from_str(&text).unwrap();
            let method = request["method"].as_str().unwrap().to_string();
            methods.lock().push(method.clone());

            let result = match method.as_str() {
                "Target.createTarget" => json!({ "targetId": "T1" }),
                "Target.attachToTarget" if attach_session => json!({ "sessionId": "S1" }),
                "Page.getFrameTree" => json!({ "frameTree": { "frame": { "id": "F1" } } }),
                "Runtime.evaluate" => {
                    let expr = request["params"]["expression"].as_str().unwrap();
                    if expr.contains("scrollHeight") {
                        json!({ "result": { "type": "number", "value": 1024.4 } })
                    } else {
                        json!({ "result": { "type": "boolean", "value": true } })
                    }
                }
                "Page.captureScreenshot" => {
                    assert!(request["params"].get("quality").is_none());
                    json!({ "data": "UE5H" })
                }
                _ => json!({}),
            };
            let reply = json!({ "id": request["id"], "result": result });
            ws.send(Message::Text(reply.to_string())).await.unwrap();
        }
    }

    async fn fake_devtools(listener: TcpListener, methods: Arc<Mutex<Vec<String>>>) {
        let ws = accept_peer(&listener).await;
        answer_commands(ws, methods, true).await;
    }

    #[tokio::test]
    async fn test_target_closed_when_attach_has_no_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let methods = Arc::new(Mutex::new(Vec::new()));
        let peer_methods = Arc::clone(&methods);
        tokio::spawn(async move {
            let ws = accept_peer(&listener).await;
            answer_commands(ws, peer_methods, false).await;
        });

        let browser = CdpBrowser::connect(&format!("ws://{addr}"), Duration::from_secs(5))
            .await
            .unwrap();
        let err = browser.new_page().await.err().unwrap();

        assert!(matches!(err, RenderError::UnexpectedResponse { .. }));
        assert_eq!(
            *methods.lock(),
            vec![
                "Target.createTarget",
                "Target.attachToTarget",
                "Target.closeTarget",
            ]
        );
    }

    #[tokio::test]
    async fn test_reconnects_after_browser_restart() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let methods = Arc::new(Mutex::new(Vec::new()));
        let peer_methods = Arc::clone(&methods);
        tokio::spawn(async move {
            // first browser goes away right after the handshake
            drop(accept_peer(&listener).await);
            let ws = accept_peer(&listener).await;
            answer_commands(ws, peer_methods, true).await;
        });

        let browser = CdpBrowser::connect(&format!("ws://{addr}"), Duration::from_secs(5))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while browser.is_connected().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let page = browser.new_page().await.unwrap();
        page.close().await.unwrap();

        assert!(browser.is_connected().await);
        assert_eq!(
            *methods.lock(),
            vec![
                "Target.createTarget",
                "Target.attachToTarget",
                "Target.closeTarget",
            ]
        );
    }

    #[tokio::test]
    async fn test_rasterize_over_devtools() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let methods = Arc::new(Mutex::new(Vec::new()));
        tokio::spawn(fake_devtools(listener, Arc::clone(&methods)));

        let browser = CdpBrowser::connect(&format!("ws://{addr}"), Duration::from_secs(5))
            .await
            .unwrap();
        let rasterizer = Rasterizer::new(
            Arc::new(browser),
            ScreenshotOptions::new(ImageFormat::Png, 80),
        );
        let page = ComposedPage {
            html: "<html><body>ok</body></html>".to_string(),
            size: PageSize::DETAIL,
        };

        let image = rasterizer.rasterize(&page).await.unwrap();

        assert_eq!(image.base64, "UE5H");
        assert_eq!(
            *methods.lock(),
            vec![
                "Target.createTarget",
                "Target.attachToTarget",
                "Emulation.setDeviceMetricsOverride",
                "Page.getFrameTree",
                "Page.setDocumentContent",
                "Runtime.evaluate",
                "Runtime.evaluate",
                "Emulation.setDeviceMetricsOverride",
                "Page.captureScreenshot",
                "Target.closeTarget",
            ]
        );
    }
}
