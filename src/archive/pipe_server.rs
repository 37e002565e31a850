//! Local multicast of live events to at most one attached reader.
//!
//! A Unix `SOCK_SEQPACKET` socket would preserve message boundaries
//! directly, but it has no portable counterpart in the async Rust
//! ecosystem. This uses a `UnixListener` plus
//! `tokio_util::codec::LengthDelimitedCodec` instead, which gives the same
//! "one write is one message" contract over a stream socket. See
//! DESIGN.md for the full rationale.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{info, warn};

use futures::{SinkExt, StreamExt};

use crate::codec::EventWriter;
use crate::model::LogEvent;

/// Bound on the server's internal send queue, a ~64 KiB allowance per
/// consumer. Tracked as a running count of queued byte lengths rather than
/// a literal ring, since `tokio::sync::mpsc` already gives us a bounded,
/// ordered, contiguous-message queue per consumer.
const WRITE_BUFFER_BYTES: usize = 64 * 1024;

struct Consumer {
    tx: mpsc::Sender<Vec<u8>>,
    /// Current queue depth in bytes, not lifetime throughput: incremented
    /// here on enqueue, decremented by `drive_consumer` once a message
    /// actually goes out over the socket.
    queued_bytes: Arc<AtomicUsize>,
}

/// Shared state behind the pipe server: at most one attached consumer.
struct Inner {
    consumer: Option<Consumer>,
}

/// Handle passed to the [`crate::archive::writer::Writer`] so it can tee
/// events to whichever consumer is currently attached.
#[derive(Clone)]
pub struct PipeServer {
    inner: Arc<Mutex<Inner>>,
}

impl PipeServer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner { consumer: None })),
        }
    }

    /// Binds the pipe's Unix socket and accepts connections forever,
    /// displacing any previously-attached consumer on each new connection.
    pub async fn listen(&self, path: &Path) -> std::io::Result<()> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let listener = UnixListener::bind(path)?;
        info!(path = %path.display(), "pipe server listening");

        loop {
            let (stream, _) = listener.accept().await?;
            self.accept(stream).await;
        }
    }

    async fn accept(&self, stream: UnixStream) {
        let (tx, rx) = mpsc::channel::<Vec<u8>>(1024);
        let queued_bytes = Arc::new(AtomicUsize::new(0));
        {
            let mut inner = self.inner.lock().await;
            if inner.consumer.is_some() {
                info!("pipe consumer displaced by new connection");
            }
            inner.consumer = Some(Consumer {
                tx,
                queued_bytes: queued_bytes.clone(),
            });
        }
        info!("pipe consumer attached");
        tokio::spawn(drive_consumer(stream, rx, queued_bytes));
    }

    /// Encodes and enqueues `event` for the attached consumer, if any. A
    /// full write buffer forcibly disconnects the consumer rather than
    /// blocking the producer — the pipe is fail-open.
    pub async fn write(&self, event: &LogEvent) {
        let mut body = Vec::new();
        {
            let mut w = EventWriter::new(&mut body);
            if let Err(err) = w.write(event) {
                warn!(error = %err, "failed to encode event for pipe");
                return;
            }
        }

        let mut inner = self.inner.lock().await;
        let Some(consumer) = inner.consumer.as_mut() else {
            return;
        };

        let queued = consumer.queued_bytes.load(Ordering::Acquire);
        if queued + body.len() > WRITE_BUFFER_BYTES {
            warn!("pipe write buffer overflow, disconnecting consumer");
            inner.consumer = None;
            return;
        }

        consumer.queued_bytes.fetch_add(body.len(), Ordering::AcqRel);
        if consumer.tx.try_send(body).is_err() {
            warn!("pipe consumer channel closed, disconnecting");
            inner.consumer = None;
        }
    }
}

impl Default for PipeServer {
    fn default() -> Self {
        Self::new()
    }
}

async fn drive_consumer(stream: UnixStream, mut rx: mpsc::Receiver<Vec<u8>>, queued_bytes: Arc<AtomicUsize>) {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(bytes) => {
                        let len = bytes.len();
                        if let Err(err) = framed.send(bytes::Bytes::from(bytes)).await {
                            warn!(error = %err, "pipe write failed, resetting consumer");
                            return;
                        }
                        queued_bytes.fetch_sub(len, Ordering::AcqRel);
                    }
                    None => return,
                }
            }
            incoming = framed.next() => {
                match incoming {
                    Some(Ok(_)) => {
                        warn!("unexpected input from pipe consumer, resetting");
                        return;
                    }
                    _ => return,
                }
            }
        }
    }
}

/// A client-side connection to a remote `PipeServer`, used by the stalker
/// subsystem to tail live events. Kept here since it shares the framing.
pub struct PipeClient {
    framed: Framed<UnixStream, LengthDelimitedCodec>,
}

impl PipeClient {
    pub async fn connect(path: &Path) -> std::io::Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self {
            framed: Framed::new(stream, LengthDelimitedCodec::new()),
        })
    }

    /// Reads one framed message. `None` on clean disconnect.
    pub async fn read_frame(&mut self) -> Option<std::io::Result<Vec<u8>>> {
        self.framed.next().await.map(|r| r.map(|b| b.to_vec()))
    }
}

pub fn default_socket_path(dir: &Path) -> PathBuf {
    dir.join("esologs.sock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LogEvent;

    fn event() -> LogEvent {
        LogEvent::new(Some("alice!u@h".into()), "PRIVMSG", vec!["#c".into(), "hi".into()])
    }

    #[tokio::test]
    async fn queued_bytes_drains_as_consumer_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = default_socket_path(dir.path());
        let server = PipeServer::new();

        let listener_path = path.clone();
        let server_clone = server.clone();
        tokio::spawn(async move {
            server_clone.listen(&listener_path).await.ok();
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let mut client = PipeClient::connect(&path).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        for _ in 0..10 {
            server.write(&event()).await;
        }

        for _ in 0..10 {
            assert!(client.read_frame().await.unwrap().is_ok());
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let inner = server.inner.lock().await;
        let consumer = inner.consumer.as_ref().unwrap();
        assert_eq!(consumer.queued_bytes.load(Ordering::Acquire), 0);
    }

    #[tokio::test]
    async fn a_drained_consumer_survives_more_than_one_buffers_worth_of_throughput() {
        let dir = tempfile::tempdir().unwrap();
        let path = default_socket_path(dir.path());
        let server = PipeServer::new();

        let listener_path = path.clone();
        let server_clone = server.clone();
        tokio::spawn(async move {
            server_clone.listen(&listener_path).await.ok();
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let mut client = PipeClient::connect(&path).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // A promptly-draining consumer must not be disconnected just because
        // cumulative throughput exceeds the buffer size.
        for _ in 0..200 {
            server.write(&event()).await;
            assert!(client.read_frame().await.unwrap().is_ok());
        }

        let inner = server.inner.lock().await;
        assert!(inner.consumer.is_some());
    }
}
