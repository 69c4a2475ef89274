//! Console Transport
//!
//! Every stdin line is a message from one configured user; replies are
//! printed to stdout. Images are summarized, or written to `--image-dir`
//! when one is given.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use con_radar_core::{ChatSession, InboundMessage, OutgoingMessage, Segment, TransportError};

/// Who the console user is
#[derive(Clone, Debug)]
pub struct ConsoleIdentity {
    pub user_id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
}

/// Forward stdin lines into a channel until EOF
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
        debug!("Stdin reader finished");
    });
    rx
}

/// Shared console state
pub struct Console {
    identity: ConsoleIdentity,
    lines: Mutex<mpsc::Receiver<String>>,
    next_id: AtomicU64,
    image_dir: Option<PathBuf>,
}

impl Console {
    pub fn new(
        identity: ConsoleIdentity,
        lines: mpsc::Receiver<String>,
        image_dir: Option<PathBuf>,
    ) -> Arc<Self> {
        Arc::new(Self {
            identity,
            lines: Mutex::new(lines),
            next_id: AtomicU64::new(1),
            image_dir,
        })
    }

    /// Next input line, `None` once stdin is closed
    pub async fn next_line(&self) -> Option<String> {
        self.lines.lock().await.recv().await
    }

    /// Session for one inbound line
    pub fn session(self: &Arc<Self>, content: String) -> ConsoleSession {
        let message = InboundMessage {
            user_id: self.identity.user_id.clone(),
            channel_id: self.identity.channel_id.clone(),
            guild_id: self.identity.guild_id.clone(),
            message_id: Some(self.allocate_id()),
            content,
        };
        ConsoleSession {
            console: Arc::clone(self),
            message,
        }
    }

    fn allocate_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    async fn print(&self, id: &str, message: &OutgoingMessage) -> Result<(), TransportError> {
        let mut out = String::new();
        for (n, segment) in message.segments().iter().enumerate() {
            match segment {
                Segment::Quote(quoted) => out.push_str(&format!("> #{quoted}\n")),
                Segment::Text(text) => out.push_str(text),
                Segment::Image(uri) => {
                    let line = match &self.image_dir {
                        Some(dir) => {
                            let path = save_image(dir, &format!("{id}-{n}"), uri).await?;
                            format!("[image saved to {}]", path.display())
                        }
                        None => describe_image(uri),
                    };
                    out.push_str(&line);
                }
            }
        }
        println!("[#{id}] {out}");
        Ok(())
    }
}

/// One inbound console line
pub struct ConsoleSession {
    console: Arc<Console>,
    message: InboundMessage,
}

#[async_trait]
impl ChatSession for ConsoleSession {
    fn message(&self) -> &InboundMessage {
        &self.message
    }

    async fn send(&self, message: OutgoingMessage) -> Result<Vec<String>, TransportError> {
        let id = self.console.allocate_id();
        self.console.print(&id, &message).await?;
        Ok(vec![id])
    }

    async fn delete_message(&self, message_id: &str) -> Result<(), TransportError> {
        println!("[#{message_id} deleted]");
        Ok(())
    }

    async fn prompt(&self, timeout: Duration) -> Option<String> {
        tokio::time::timeout(timeout, self.console.next_line())
            .await
            .ok()
            .flatten()
    }
}

/// Split `data:<mime>;base64,<payload>`
fn split_data_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("data:")?;
    let (mime, payload) = rest.split_once(";base64,")?;
    Some((mime, payload))
}

/// One-line summary of an inline image
fn describe_image(uri: &str) -> String {
    match split_data_uri(uri) {
        Some((mime, payload)) => format!("[image {mime}, {} bytes]", payload.len() / 4 * 3),
        None => "[image]".to_string(),
    }
}

async fn save_image(dir: &std::path::Path, stem: &str, uri: &str) -> Result<PathBuf, TransportError> {
    let (mime, payload) =
        split_data_uri(uri).ok_or_else(|| TransportError::Failed("not a data URI".to_string()))?;
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| TransportError::Failed(format!("bad image payload: {e}")))?;

    let extension = mime.rsplit('/').next().unwrap_or("bin");
    let path = dir.join(format!("{stem}.{extension}"));
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| TransportError::Failed(e.to_string()))?;
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| TransportError::Failed(e.to_string()))?;
    Ok(path)
}
