// Grounded on fuurin's WorkerSession (src/sessionworker.cpp): produces
// topics (dispatch) and/or consumes them (subscription and/or snapshot
// sync), tracking broker liveness via `ConnMachine` and snapshot download
// via `SyncMachine`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::WorkerConfig;
use crate::connmachine::{ConnMachine, ConnObserver, State as ConnState};
use crate::error::{Error, Result};
use crate::event::{Event, Notification as EvtNotification, Payload as EvtPayload, Type as EvtType};
use crate::id::Id;
use crate::lru::LruCache;
use crate::operation::{Operation, Payload as OpPayload, Type as OpType};
use crate::part::Part;
use crate::runner::Runner;
use crate::session::{Outcome, SessionHandler, SessionRunner};
use crate::syncmachine::{ReplyResult, ReplyType, State as SyncState, SyncMachine, SyncObserver};
use crate::topic::{Kind as TopicKind, Name, Topic};
use crate::transport::{Context, Poller, Socket, SocketKind, Token};
use crate::wire::{self, SnapshotFrame};

const CONN_RETRY_INTERVAL: Duration = Duration::from_millis(500);
const CONN_TIMEOUT_INTERVAL: Duration = Duration::from_secs(3);
const SYNC_TIMEOUT_INTERVAL: Duration = Duration::from_secs(3);
const SYNC_MAX_RETRY: u32 = 1;
const WORKER_SEQ_CAPACITY: usize = 64;

const TOKEN_DELIVERY: Token = Token(0);
const TOKEN_SNAPSHOT: Token = Token(1);
const TOKEN_CONN_RETRY: Token = Token(2);
const TOKEN_CONN_TIMEOUT: Token = Token(3);
const TOKEN_SYNC_TIMEOUT: Token = Token(4);

/// Owner-side handle for a worker: produces and/or consumes topics through
/// a broker, tracking connection liveness and snapshot sync state.
pub struct Worker {
    runner: Runner,
    config: WorkerConfig,
    seq_num: Arc<AtomicU64>,
}

impl Worker {
    pub fn new(id: Id) -> Worker {
        Worker {
            runner: Runner::new(),
            config: WorkerConfig::new(id),
            seq_num: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn id(&self) -> &Id {
        &self.config.uuid
    }

    pub fn set_endpoints(&mut self, delivery: Vec<String>, dispatch: Vec<String>, snapshot: Vec<String>) {
        self.config.endpoints_delivery = delivery;
        self.config.endpoints_dispatch = dispatch;
        self.config.endpoints_snapshot = snapshot;
    }

    pub fn set_topics_all(&mut self) {
        self.config.topics_all = true;
        self.config.topics_names.clear();
    }

    pub fn set_topics_names(&mut self, names: Vec<Name>) {
        self.config.topics_all = false;
        self.config.topics_names = names;
    }

    pub fn topics_names(&self) -> (bool, &[Name]) {
        (self.config.topics_all, &self.config.topics_names)
    }

    pub fn is_running(&self) -> bool {
        self.runner.is_running()
    }

    pub fn seq_number(&self) -> u64 {
        self.seq_num.load(Ordering::Acquire)
    }

    pub fn start(&mut self) -> Result<()> {
        let config = self.config.clone();
        let seq_num = Arc::clone(&self.seq_num);
        self.runner.start(move |op_rx, evt_tx, finish_tx, token| {
            let handler = WorkerSessionHandler::new(config, seq_num);
            SessionRunner::new(op_rx, evt_tx, finish_tx, token, handler).run();
        })?;
        self.runner.send_operation(OpType::Start, OpPayload::Config(self.config.to_part()))
    }

    pub fn stop(&mut self) -> bool {
        self.runner.stop()
    }

    pub fn dispatch(&self, name: Name, data: Part, kind: TopicKind) -> Result<()> {
        let topic = Topic::new(self.config.uuid.clone(), name, data, kind);
        self.runner.send_operation(OpType::Dispatch, OpPayload::Topic(topic))
    }

    pub fn sync(&self) -> Result<()> {
        self.runner.send_operation(OpType::Sync, OpPayload::None)
    }

    pub fn wait_for_event(&self, timeout: Duration) -> Event {
        self.runner.wait_for_event(timeout)
    }

    pub fn wait_for_event_matching<P>(&self, timeout: Duration, pred: P) -> Event
    where
        P: Fn(&Event) -> bool,
    {
        self.runner.wait_for_event_matching(timeout, pred)
    }
}

/// Holds the sockets, configuration and pending-event queue that
/// `ConnMachine`/`SyncMachine` observers need, kept in a field separate
/// from the machines themselves so the borrow checker can see the calls
/// `self.conn.on_ping(&mut self.plumbing)` touch disjoint fields of
/// `WorkerSessionHandler`.
struct Plumbing {
    ctx: Context,
    config: WorkerConfig,
    delivery: Option<Socket>,
    dispatch: Option<Socket>,
    snapshot: Option<Socket>,
    seq_num: u64,
    seq_num_shared: Arc<AtomicU64>,
    broker_uuid: Id,
    is_online: bool,
    is_snapshot: bool,
    pending_events: Vec<Event>,
}

impl Plumbing {
    fn publish_seq_num(&self) {
        self.seq_num_shared.store(self.seq_num, Ordering::Release);
    }

    fn open_delivery_dispatch(&mut self) {
        self.delivery = None;
        self.dispatch = None;

        match Socket::new(&self.ctx, SocketKind::Dish) {
            Ok(delivery) => {
                for ep in &self.config.endpoints_delivery {
                    if let Err(e) = delivery.connect(ep) {
                        log::error!("failed to connect delivery socket to '{ep}': {e}");
                    }
                }
                if let Err(e) = delivery.join(wire::GROUP_HUGZ) {
                    log::error!("failed to join {}: {e}", wire::GROUP_HUGZ);
                }
                if self.config.topics_all {
                    if let Err(e) = delivery.join(wire::GROUP_UPDT) {
                        log::error!("failed to join {}: {e}", wire::GROUP_UPDT);
                    }
                } else {
                    for name in &self.config.topics_names {
                        if let Err(e) = delivery.join(name.as_str()) {
                            log::error!("failed to join '{}': {e}", name.as_str());
                        }
                    }
                }
                self.delivery = Some(delivery);
            }
            Err(e) => log::error!("failed to create delivery socket: {e}"),
        }

        match Socket::new(&self.ctx, SocketKind::Radio) {
            Ok(dispatch) => {
                for ep in &self.config.endpoints_dispatch {
                    if let Err(e) = dispatch.connect(ep) {
                        log::error!("failed to connect dispatch socket to '{ep}': {e}");
                    }
                }
                self.dispatch = Some(dispatch);
            }
            Err(e) => log::error!("failed to create dispatch socket: {e}"),
        }
    }
}

impl ConnObserver for Plumbing {
    fn do_reset(&mut self) {
        self.open_delivery_dispatch();
    }

    fn do_pong(&mut self) {
        if let Some(dispatch) = &self.dispatch {
            if let Err(e) = dispatch.send_group(wire::GROUP_HUGZ, &Part::empty()) {
                log::warn!("failed to send announce: {e}");
            }
        }
    }

    fn on_change(&mut self, state: ConnState) {
        match state {
            ConnState::Stable => {
                if !self.is_online {
                    self.is_online = true;
                    self.pending_events.push(Event::new(EvtType::Online, EvtNotification::Success, EvtPayload::None));
                }
            }
            ConnState::Trying => {
                if self.is_online {
                    self.is_online = false;
                    self.pending_events.push(Event::new(EvtType::Offline, EvtNotification::Success, EvtPayload::None));
                }
            }
        }
    }
}

impl SyncObserver for Plumbing {
    fn close(&mut self, index: i32) {
        if index < 0 {
            return;
        }
        self.snapshot = None;
    }

    fn open(&mut self, index: i32) {
        if index < 0 {
            return;
        }
        let Some(ep) = self.config.endpoints_snapshot.get(index as usize) else {
            log::error!("no snapshot endpoint configured at index {index}");
            return;
        };
        match Socket::new(&self.ctx, SocketKind::Client) {
            Ok(socket) => {
                if let Err(e) = socket.connect(ep) {
                    log::error!("failed to connect snapshot socket to '{ep}': {e}");
                }
                self.snapshot = Some(socket);
            }
            Err(e) => log::error!("failed to create snapshot socket: {e}"),
        }
    }

    fn sync(&mut self, index: i32, seq_num: u64) {
        let Some(snapshot) = &self.snapshot else { return };
        let mut req = self.config.clone();
        req.seq_num = self.seq_num;
        let frame = SnapshotFrame::new(wire::VERB_SYNC, seq_num as u8, req.to_part());
        if let Err(e) = snapshot.send(&frame.to_part()) {
            log::error!("failed to send sync request on endpoint {index}: {e}");
            return;
        }
        self.pending_events.push(Event::new(EvtType::SyncRequest, EvtNotification::Success, EvtPayload::None));
    }

    fn on_change(&mut self, state: SyncState) {
        match state {
            SyncState::Download => {
                self.is_snapshot = true;
                self.pending_events.push(Event::new(EvtType::SyncDownloadOn, EvtNotification::Success, EvtPayload::None));
            }
            SyncState::Synced => {
                self.pending_events.push(Event::new(
                    EvtType::SyncSuccess,
                    EvtNotification::Success,
                    EvtPayload::BrokerId(self.broker_uuid.clone()),
                ));
                if self.is_snapshot {
                    self.is_snapshot = false;
                    self.pending_events.push(Event::new(EvtType::SyncDownloadOff, EvtNotification::Success, EvtPayload::None));
                }
            }
            SyncState::Failed => {
                self.pending_events.push(Event::new(
                    EvtType::SyncError,
                    EvtNotification::Success,
                    EvtPayload::BrokerId(self.broker_uuid.clone()),
                ));
                if self.is_snapshot {
                    self.is_snapshot = false;
                    self.pending_events.push(Event::new(EvtType::SyncDownloadOff, EvtNotification::Success, EvtPayload::None));
                }
            }
            SyncState::Halted => {
                if self.is_snapshot {
                    self.pending_events.push(Event::new(
                        EvtType::SyncError,
                        EvtNotification::Success,
                        EvtPayload::BrokerId(self.broker_uuid.clone()),
                    ));
                    self.is_snapshot = false;
                    self.pending_events.push(Event::new(EvtType::SyncDownloadOff, EvtNotification::Success, EvtPayload::None));
                }
            }
        }
    }
}

struct WorkerSessionHandler {
    conn: ConnMachine,
    sync: SyncMachine,
    plumbing: Plumbing,
    worker_seq_num: LruCache<Id, u64>,
}

impl WorkerSessionHandler {
    fn new(config: WorkerConfig, seq_num_shared: Arc<AtomicU64>) -> WorkerSessionHandler {
        let max_index = (config.endpoints_snapshot.len().max(1) - 1) as i32;
        let seq_num = config.seq_num;
        WorkerSessionHandler {
            conn: ConnMachine::new(CONN_RETRY_INTERVAL, CONN_TIMEOUT_INTERVAL),
            sync: SyncMachine::new(max_index, SYNC_MAX_RETRY, SYNC_TIMEOUT_INTERVAL),
            plumbing: Plumbing {
                ctx: Context::new(),
                config,
                delivery: None,
                dispatch: None,
                snapshot: None,
                seq_num,
                seq_num_shared,
                broker_uuid: Id::null(),
                is_online: false,
                is_snapshot: false,
                pending_events: Vec::new(),
            },
            worker_seq_num: LruCache::new(WORKER_SEQ_CAPACITY),
        }
    }

    fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.plumbing.pending_events)
    }

    /// Accepts `topic` if newer than anything seen from its producer.
    /// `update_own_seq` additionally advances this worker's own published
    /// sequence number when the topic is an echo of our own update that
    /// arrived via the broker (e.g. on reconnection).
    fn accept_topic(&mut self, topic: &Topic, update_own_seq: bool) -> bool {
        let last = self.worker_seq_num.find(topic.worker()).copied().unwrap_or(0);
        if topic.seq_num() <= last {
            return false;
        }
        self.worker_seq_num.put(topic.worker().clone(), topic.seq_num());

        if update_own_seq && *topic.worker() == self.plumbing.config.uuid && topic.seq_num() > self.plumbing.seq_num {
            self.plumbing.seq_num = topic.seq_num();
            self.plumbing.publish_seq_num();
        }
        true
    }

    fn handle_delivery_frame(&mut self, payload: Part, group: Option<String>) -> Vec<Event> {
        let mut events = Vec::new();
        match group.as_deref() {
            Some(g) if g == wire::GROUP_HUGZ => {
                self.conn.on_ping(&mut self.plumbing);
            }
            Some(g) => {
                let subscribed = self.plumbing.config.topics_all
                    || g == wire::GROUP_UPDT
                    || self.plumbing.config.topics_names.iter().any(|n| n.as_str() == g);
                if !subscribed {
                    log::warn!("delivery frame on unexpected group '{g}'");
                    return events;
                }
                match Topic::from_part(&payload) {
                    Ok(topic) => {
                        if self.accept_topic(&topic, true) {
                            events.push(Event::new(EvtType::Delivery, EvtNotification::Success, EvtPayload::Topic(topic)));
                        }
                    }
                    Err(e) => log::warn!("dropping malformed delivery frame: {e}"),
                }
            }
            None => log::warn!("delivery frame without a group"),
        }
        events.extend(self.drain_events());
        events
    }

    fn handle_snapshot_frame(&mut self, payload: Part) -> Vec<Event> {
        let mut events = Vec::new();
        let frame = match SnapshotFrame::from_part(&payload) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("malformed snapshot frame: {e}");
                return events;
            }
        };

        if frame.verb == wire::VERB_BEGN {
            match Id::from_part(&frame.payload) {
                Ok(id) => {
                    self.plumbing.broker_uuid = id.clone();
                    events.push(Event::new(EvtType::SyncBegin, EvtNotification::Success, EvtPayload::BrokerId(id)));
                }
                Err(e) => log::warn!("malformed snapshot begin: {e}"),
            }
        } else if frame.verb == wire::VERB_ELEM {
            match Topic::from_part(&frame.payload) {
                Ok(topic) => {
                    self.accept_topic(&topic, false);
                    events.push(Event::new(EvtType::SyncElement, EvtNotification::Success, EvtPayload::Topic(topic)));
                    let index = self.sync.current_index();
                    match self.sync.on_reply(index, frame.syncseq as u64, ReplyType::Snapshot) {
                        ReplyResult::Accepted => {}
                        ReplyResult::Discarded => log::debug!("discarding stale snapshot element"),
                        ReplyResult::Unexpected => log::warn!("unexpected snapshot element outside a download"),
                    }
                }
                Err(e) => log::warn!("malformed snapshot element: {e}"),
            }
        } else if frame.verb == wire::VERB_SONC {
            match Id::from_part(&frame.payload) {
                Ok(id) => {
                    if id != self.plumbing.broker_uuid {
                        log::warn!("snapshot complete from a different broker than began it, replacing");
                        self.plumbing.broker_uuid = id;
                    }
                    let index = self.sync.current_index();
                    match self.sync.on_reply(index, frame.syncseq as u64, ReplyType::Complete) {
                        ReplyResult::Accepted => self.sync.on_reply_complete(&mut self.plumbing),
                        ReplyResult::Discarded => log::debug!("discarding stale snapshot complete"),
                        ReplyResult::Unexpected => log::warn!("unexpected snapshot complete outside a download"),
                    }
                }
                Err(e) => log::warn!("malformed snapshot complete: {e}"),
            }
        } else {
            log::warn!("unexpected snapshot verb '{}'", frame.verb);
        }

        events.extend(self.drain_events());
        events
    }
}

impl SessionHandler for WorkerSessionHandler {
    fn operation_ready(&mut self, op: Operation) -> Result<Outcome> {
        match op.kind() {
            OpType::Start => {
                let OpPayload::Config(part) = op.payload() else {
                    return Err(Error::Protocol("Start operation missing config payload".into()));
                };
                self.plumbing.seq_num = self.plumbing.config.seq_num;
                self.plumbing.publish_seq_num();
                self.conn.on_start(&mut self.plumbing);
                let mut events = self.drain_events();
                events.push(Event::new(
                    EvtType::Started,
                    EvtNotification::Success,
                    EvtPayload::Raw(part.clone()),
                ));
                Ok(Outcome { events, keep_running: true })
            }
            OpType::Stop => {
                self.conn.on_stop();
                self.sync.on_halt(&mut self.plumbing);
                let mut events = self.drain_events();
                events.push(Event::new(EvtType::Stopped, EvtNotification::Success, EvtPayload::None));
                Ok(Outcome { events, keep_running: false })
            }
            OpType::Dispatch => {
                let OpPayload::Topic(topic) = op.payload() else {
                    return Err(Error::Protocol("Dispatch operation missing topic payload".into()));
                };
                self.plumbing.seq_num += 1;
                self.plumbing.publish_seq_num();
                let stamped = topic.clone().with_seq_num(self.plumbing.seq_num);
                if let Some(dispatch) = &self.plumbing.dispatch {
                    dispatch.send_group(wire::GROUP_UPDT, &stamped.to_part())?;
                }
                Ok(Outcome::cont())
            }
            OpType::Sync => {
                self.plumbing.broker_uuid = Id::null();
                self.sync.on_sync(&mut self.plumbing);
                Ok(Outcome { events: self.drain_events(), keep_running: true })
            }
            OpType::Invalid => Ok(Outcome::cont()),
        }
    }

    fn register<'a>(&'a self, poller: &mut Poller<'a>) {
        if let Some(s) = &self.plumbing.delivery {
            poller.add_socket(TOKEN_DELIVERY, s);
        }
        if let Some(s) = &self.plumbing.snapshot {
            poller.add_socket(TOKEN_SNAPSHOT, s);
        }
        poller.add_timer(TOKEN_CONN_RETRY, self.conn.retry_timer());
        poller.add_timer(TOKEN_CONN_TIMEOUT, self.conn.timeout_timer());
        poller.add_timer(TOKEN_SYNC_TIMEOUT, self.sync.timeout_timer());
    }

    fn socket_ready(&mut self, token: Token) -> Result<Outcome> {
        let events = match token {
            TOKEN_DELIVERY => {
                if let Some((payload, group, _rid)) =
                    self.plumbing.delivery.as_ref().map(|s| s.recv_nowait()).transpose()?.flatten()
                {
                    self.handle_delivery_frame(payload, group)
                } else {
                    Vec::new()
                }
            }
            TOKEN_SNAPSHOT => {
                if let Some((payload, _group, _rid)) =
                    self.plumbing.snapshot.as_ref().map(|s| s.recv_nowait()).transpose()?.flatten()
                {
                    self.handle_snapshot_frame(payload)
                } else {
                    Vec::new()
                }
            }
            TOKEN_CONN_RETRY => {
                self.conn.on_timer_retry_fired(&mut self.plumbing)?;
                self.drain_events()
            }
            TOKEN_CONN_TIMEOUT => {
                self.conn.on_timer_timeout_fired(&mut self.plumbing);
                self.drain_events()
            }
            TOKEN_SYNC_TIMEOUT => {
                self.sync.on_timer_timeout_fired(&mut self.plumbing);
                self.drain_events()
            }
            _ => return Err(Error::Protocol("unknown poll token in worker session".into())),
        };
        Ok(Outcome { events, keep_running: true })
    }
}
