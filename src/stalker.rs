//! Reconnecting pipe client; ring buffer per target; websocket fan-out.
//!
//! Each websocket client is stored in an owner map keyed by a generated
//! [`ClientId`] rather than reached via a raw pointer from a callback: the
//! close path removes its own entry under the lock and drops it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::codec::EventReader;
use crate::format::{Formatter, RowId};
use crate::index::Index;
use crate::model::{EventId, LogEvent, Ymd};

pub const RING_CAPACITY: usize = 1000;
pub const BACKFILL_DAYS: i64 = 3;
pub const RECONNECT_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// One message delivered to a websocket client: an 8-byte binary cursor
/// header followed by a text HTML fragment, sent back-to-back.
pub struct Delivery {
    pub header: [u8; 8],
    pub html: String,
}

fn encode_header(day: i64, line: u64) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf[0..4].copy_from_slice(&(day as i32).to_le_bytes());
    buf[4..8].copy_from_slice(&(line as u32).to_le_bytes());
    buf
}

/// Bounded FIFO of the most recent ~1000 events for one target, in strict
/// `(day, line)` order. Duplicate or out-of-order events are dropped.
struct TargetRing {
    events: VecDeque<LogEvent>,
    last: Option<(i64, u64)>,
}

impl TargetRing {
    fn new() -> Self {
        Self {
            events: VecDeque::new(),
            last: None,
        }
    }

    fn push(&mut self, event: LogEvent) -> bool {
        let id = event.event_id.as_ref().expect("ring only holds tee'd events");
        let key = (id.day, id.line);
        if let Some(last) = self.last {
            if key <= last {
                return false;
            }
        }
        self.last = Some(key);
        self.events.push_back(event);
        if self.events.len() > RING_CAPACITY {
            self.events.pop_front();
        }
        true
    }

    fn events_after(&self, cursor: (i64, u64)) -> impl Iterator<Item = &LogEvent> {
        self.events.iter().filter(move |e| {
            let id = e.event_id.as_ref().expect("ring only holds tee'd events");
            (id.day, id.line) > cursor
        })
    }
}

struct ClientState {
    target: String,
    sent: (i64, u64),
    tx: mpsc::Sender<Delivery>,
    /// Set by the first resume-cursor message. Live pushes from `on_event`
    /// are withheld until then, so a client can't receive the whole ring
    /// before it has told us where it wants to resume from.
    activated: bool,
}

struct Target {
    config: crate::format::TargetConfig,
    ring: Mutex<TargetRing>,
}

/// Observability hook for stalker activity, mirroring [`crate::archive::WriterMetrics`]
/// on the writer side.
pub trait StalkerMetrics: Send + Sync {
    fn set_active_clients(&self, count: i64);
    fn record_received(&self, now_unix_secs: i64);
}

/// Multiplexes live events from the writer-side pipe to websocket clients.
pub struct Stalker {
    targets: HashMap<String, Target>,
    clients: Mutex<HashMap<ClientId, ClientState>>,
    clients_active: AtomicBool,
    index: Arc<HashMap<String, Arc<Index>>>,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<dyn StalkerMetrics>>,
}

impl Stalker {
    pub fn new(
        targets: Vec<crate::format::TargetConfig>,
        index: Arc<HashMap<String, Arc<Index>>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let targets = targets
            .into_iter()
            .map(|config| {
                (
                    config.name.clone(),
                    Target {
                        config,
                        ring: Mutex::new(TargetRing::new()),
                    },
                )
            })
            .collect();
        Self {
            targets,
            clients: Mutex::new(HashMap::new()),
            clients_active: AtomicBool::new(false),
            index,
            clock,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn StalkerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Backfills every target's ring from disk — the last [`BACKFILL_DAYS`]
    /// calendar days up to today. Done once, on first successful pipe
    /// connect.
    pub async fn backfill(&self) {
        let (today, _) = crate::clock::floor_days(self.clock.now_us());
        for (name, target) in &self.targets {
            let Some(index) = self.index.get(name) else {
                continue;
            };
            let mut ring = target.ring.lock().await;
            for day in (today - BACKFILL_DAYS + 1)..=today {
                let ymd = Ymd::from_day_number(day);
                let Ok(Some(reader)) = index.open(ymd.year, ymd.month, ymd.day).await else {
                    continue;
                };
                let mut reader = EventReader::new(reader);
                let mut line = 0u64;
                while let Ok(Some(mut event)) = reader.read() {
                    event.event_id = Some(EventId {
                        target: name.clone(),
                        day,
                        line,
                    });
                    ring.push(event);
                    line += 1;
                }
            }
            info!(target = %name, "backfill complete");
        }
    }

    /// Routes a freshly received pipe event into its target's ring and,
    /// if any client is waiting, delivers it.
    pub async fn on_event(&self, event: LogEvent) {
        let Some(id) = &event.event_id else {
            warn!("pipe event missing event_id, dropping");
            return;
        };
        let target_name = id.target.clone();
        let Some(target) = self.targets.get(&target_name) else {
            return;
        };

        let accepted = {
            let mut ring = target.ring.lock().await;
            ring.push(event)
        };
        if !accepted {
            return;
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_received(self.clock.now_unix_secs());
        }

        if self.clients_active.load(Ordering::Relaxed) {
            self.update_clients(&target_name).await;
        }
    }

    /// Renders a full snapshot of `target_name`'s current ring into `out`:
    /// every event still held, in order, with a day header on each day
    /// transition and an elision marker when the first visible event of a
    /// day isn't that day's first line (meaning earlier lines from that day
    /// already fell off the ring).
    pub async fn format_snapshot(&self, target_name: &str, formatter: &Formatter, out: &mut String) {
        let Some(target) = self.targets.get(target_name) else {
            return;
        };
        let ring = target.ring.lock().await;
        let mut last_day: Option<i64> = None;
        for event in &ring.events {
            let id_info = event.event_id.as_ref().expect("ring only holds tee'd events");
            let day = Ymd::from_day_number(id_info.day);
            if last_day != Some(id_info.day) {
                formatter.format_day(out, true, day);
                if id_info.line > 0 {
                    formatter.format_elision(out);
                }
                last_day = Some(id_info.day);
            }
            formatter.format_event(
                out,
                event,
                &target.config,
                day,
                RowId::Stalker {
                    day,
                    line: id_info.line,
                },
            );
        }
    }

    /// Registers a new websocket client for `target`, returning its id and
    /// the receiver end the connection handler forwards into the socket.
    pub async fn register_client(&self, target: &str) -> (ClientId, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(64);
        let id = ClientId::new();
        let mut clients = self.clients.lock().await;
        clients.insert(
            id,
            ClientState {
                target: target.to_string(),
                sent: (i64::MIN, 0),
                tx,
                activated: false,
            },
        );
        self.clients_active.store(true, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.set_active_clients(clients.len() as i64);
        }
        (id, rx)
    }

    /// Applies a client's resume cursor (the 8-byte binary message) and
    /// immediately delivers any backlog after it.
    pub async fn update_cursor(&self, id: ClientId, day: i64, line: u64) {
        {
            let mut clients = self.clients.lock().await;
            let Some(state) = clients.get_mut(&id) else {
                return;
            };
            state.sent = (day, line);
            state.activated = true;
        }
        let target = {
            let clients = self.clients.lock().await;
            clients.get(&id).map(|s| s.target.clone())
        };
        if let Some(target) = target {
            self.deliver_to_one(&target, id).await;
        }
    }

    pub async fn unregister_client(&self, id: ClientId) {
        let mut clients = self.clients.lock().await;
        clients.remove(&id);
        self.clients_active.store(!clients.is_empty(), Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.set_active_clients(clients.len() as i64);
        }
    }

    /// Pushes a freshly routed event to every already-activated client
    /// watching `target_name`. A client that hasn't sent its resume cursor
    /// yet is skipped — it gets caught up once it does, via
    /// [`Stalker::update_cursor`].
    async fn update_clients(&self, target_name: &str) {
        let ids: Vec<ClientId> = {
            let clients = self.clients.lock().await;
            clients
                .iter()
                .filter(|(_, s)| s.target == target_name && s.activated)
                .map(|(id, _)| *id)
                .collect()
        };
        for id in ids {
            self.deliver_to_one(target_name, id).await;
        }
    }

    async fn deliver_to_one(&self, target_name: &str, id: ClientId) {
        let Some(target) = self.targets.get(target_name) else {
            return;
        };

        let (cursor, tx) = {
            let clients = self.clients.lock().await;
            let Some(state) = clients.get(&id) else { return };
            (state.sent, state.tx.clone())
        };

        let pending: Vec<LogEvent> = {
            let ring = target.ring.lock().await;
            ring.events_after(cursor).cloned().collect()
        };
        if pending.is_empty() {
            return;
        }

        let formatter = Formatter::new(crate::format::FormatKind::Html);
        let mut last_day = cursor.0;
        let mut new_cursor = cursor;
        for event in &pending {
            let id_info = event.event_id.as_ref().expect("ring only holds tee'd events");
            let day = Ymd::from_day_number(id_info.day);
            let mut html = String::new();
            if id_info.day != last_day {
                formatter.format_day(&mut html, true, day);
                last_day = id_info.day;
            }
            formatter.format_event(
                &mut html,
                event,
                &target.config,
                day,
                RowId::Stalker {
                    day,
                    line: id_info.line,
                },
            );
            let header = encode_header(id_info.day, id_info.line);
            new_cursor = (id_info.day, id_info.line);

            if tx.send(Delivery { header, html }).await.is_err() {
                self.unregister_client(id).await;
                return;
            }
        }

        let mut clients = self.clients.lock().await;
        if let Some(state) = clients.get_mut(&id) {
            state.sent = new_cursor;
        }
    }
}

/// Drives the reconnecting pipe-client side of the stalker: connects,
/// backfills once, then forwards every decoded event to [`Stalker::on_event`]
/// until the connection drops, at which point it reconnects after
/// [`RECONNECT_DELAY`].
pub async fn run_pipe_client(stalker: Arc<Stalker>, socket_path: std::path::PathBuf) {
    let mut backfilled = false;
    loop {
        match crate::archive::PipeClient::connect(&socket_path).await {
            Ok(mut client) => {
                info!(path = %socket_path.display(), "stalker pipe connected");
                if !backfilled {
                    stalker.backfill().await;
                    backfilled = true;
                }
                loop {
                    match client.read_frame().await {
                        Some(Ok(bytes)) => match crate::codec::EventReader::new(&bytes[..]).read() {
                            Ok(Some(event)) => stalker.on_event(event).await,
                            Ok(None) => {}
                            Err(err) => warn!(error = %err, "malformed event from pipe"),
                        },
                        Some(Err(err)) => {
                            warn!(error = %err, "pipe read error, reconnecting");
                            break;
                        }
                        None => {
                            warn!("pipe connection closed, reconnecting");
                            break;
                        }
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "pipe connect failed, retrying");
            }
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Direction;

    fn event_with_id(day: i64, line: u64) -> LogEvent {
        LogEvent {
            prefix: Some("a!u@h".to_string()),
            command: "PRIVMSG".to_string(),
            args: vec!["#c".to_string(), "hi".to_string()],
            direction: Direction::Received,
            time_us: 0,
            event_id: Some(EventId {
                target: "t".to_string(),
                day,
                line,
            }),
        }
    }

    #[test]
    fn ring_drops_out_of_order_duplicates() {
        let mut ring = TargetRing::new();
        assert!(ring.push(event_with_id(100, 0)));
        assert!(ring.push(event_with_id(100, 1)));
        assert!(!ring.push(event_with_id(100, 1)));
        assert!(!ring.push(event_with_id(100, 0)));
        assert!(ring.push(event_with_id(100, 2)));
    }

    #[test]
    fn ring_evicts_oldest_past_capacity() {
        let mut ring = TargetRing::new();
        for i in 0..(RING_CAPACITY as u64 + 10) {
            ring.push(event_with_id(1, i));
        }
        assert_eq!(ring.events.len(), RING_CAPACITY);
        assert_eq!(ring.events.front().unwrap().event_id.as_ref().unwrap().line, 10);
    }

    #[test]
    fn events_after_excludes_cursor_and_earlier() {
        let mut ring = TargetRing::new();
        for i in 0..5 {
            ring.push(event_with_id(100, i));
        }
        let after: Vec<_> = ring.events_after((100, 2)).collect();
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].event_id.as_ref().unwrap().line, 3);
        assert_eq!(after[1].event_id.as_ref().unwrap().line, 4);
    }

    fn target_config() -> crate::format::TargetConfig {
        crate::format::TargetConfig {
            name: "t".to_string(),
            nick: "bot".to_string(),
            title: "Test".to_string(),
            about: None,
            announce: None,
        }
    }

    #[tokio::test]
    async fn unactivated_client_receives_nothing_from_live_events() {
        let clock: Arc<dyn Clock> = Arc::new(crate::clock::FixedClock::new(0));
        let stalker = Stalker::new(vec![target_config()], Arc::new(HashMap::new()), clock);

        let (_id, mut rx) = stalker.register_client("t").await;
        stalker.on_event(event_with_id(100, 0)).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn first_cursor_message_activates_and_delivers_backlog() {
        let clock: Arc<dyn Clock> = Arc::new(crate::clock::FixedClock::new(0));
        let stalker = Stalker::new(vec![target_config()], Arc::new(HashMap::new()), clock);

        let (id, mut rx) = stalker.register_client("t").await;
        stalker.on_event(event_with_id(100, 0)).await;
        stalker.update_cursor(id, i64::MIN, 0).await;

        assert!(rx.try_recv().is_ok());

        stalker.on_event(event_with_id(100, 1)).await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn format_snapshot_renders_day_headers_and_elision() {
        let clock: Arc<dyn Clock> = Arc::new(crate::clock::FixedClock::new(0));
        let stalker = Stalker::new(vec![target_config()], Arc::new(HashMap::new()), clock);

        // Day 100's line 0 has already fallen off the ring, so the first
        // visible event of day 100 has line > 0, and day 101 starts fresh.
        stalker.on_event(event_with_id(100, 1)).await;
        stalker.on_event(event_with_id(100, 2)).await;
        stalker.on_event(event_with_id(101, 0)).await;

        let formatter = Formatter::new(crate::format::FormatKind::Html);
        let mut out = String::new();
        stalker.format_snapshot("t", &formatter, &mut out).await;

        assert!(out.contains(r#"class="elision""#));
        assert_eq!(out.matches("<h2").count(), 2);
    }

    #[tokio::test]
    async fn resume_cursor_delivers_only_strictly_later_events() {
        let targets = vec![crate::format::TargetConfig {
            name: "t".to_string(),
            nick: "bot".to_string(),
            title: "Test".to_string(),
            about: None,
            announce: None,
        }];
        let clock: Arc<dyn Clock> = Arc::new(crate::clock::FixedClock::new(0));
        let stalker = Stalker::new(targets, Arc::new(HashMap::new()), clock);

        for i in 0..5 {
            stalker.on_event(event_with_id(100, i)).await;
        }

        let (id, mut rx) = stalker.register_client("t").await;
        stalker.update_cursor(id, 100, 2).await;

        let mut received = Vec::new();
        while let Ok(delivery) = rx.try_recv() {
            received.push(delivery);
        }
        assert_eq!(received.len(), 2);
    }
}
