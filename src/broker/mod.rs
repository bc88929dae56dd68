// Grounded on fuurin's BrokerSession (src/sessionbroker.cpp): stores the
// latest topic per (name, worker) pair and redistributes updates, serving
// snapshots to workers that (re)connect.

use std::time::Duration;

use crate::config::BrokerConfig;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::id::Id;
use crate::lru::LruCache;
use crate::operation::{Operation, Payload as OpPayload, Type as OpType};
use crate::runner::Runner;
use crate::session::{Outcome, SessionHandler, SessionRunner};
use crate::topic::{Kind as TopicKind, Name, Topic};
use crate::transport::{Context, Poller, Socket, SocketKind, Timer, Token};
use crate::wire::{self, SnapshotFrame};

const HUGZ_INTERVAL: Duration = Duration::from_secs(1);
const STOR_TOPIC_CAPACITY: usize = 1024;
const STOR_TOPIC_WORKER_CAPACITY: usize = 8;
const STOR_WORKER_CAPACITY: usize = 64;

const TOKEN_DELIVERY: Token = Token(0);
const TOKEN_SNAPSHOT: Token = Token(1);
const TOKEN_HUGZ: Token = Token(2);

/// Owner-side handle for a broker: stores the latest state per topic and
/// redistributes it to connected workers.
pub struct Broker {
    runner: Runner,
    id: Id,
    config: BrokerConfig,
}

impl Broker {
    pub fn new(id: Id) -> Broker {
        Broker { runner: Runner::new(), id: id.clone(), config: BrokerConfig::new(id) }
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn set_endpoints(&mut self, delivery: Vec<String>, dispatch: Vec<String>, snapshot: Vec<String>) {
        self.config.endpoints_delivery = delivery;
        self.config.endpoints_dispatch = dispatch;
        self.config.endpoints_snapshot = snapshot;
    }

    pub fn is_running(&self) -> bool {
        self.runner.is_running()
    }

    pub fn start(&mut self) -> Result<()> {
        let config = self.config.clone();
        self.runner.start(move |op_rx, evt_tx, finish_tx, token| {
            let handler = BrokerSessionHandler::new(config);
            SessionRunner::new(op_rx, evt_tx, finish_tx, token, handler).run();
        })?;
        self.runner.send_operation(OpType::Start, OpPayload::None)
    }

    pub fn stop(&mut self) -> bool {
        self.runner.stop()
    }

    pub fn wait_for_event(&self, timeout: Duration) -> Event {
        self.runner.wait_for_event(timeout)
    }
}

struct BrokerSessionHandler {
    ctx: Context,
    config: BrokerConfig,
    delivery: Option<Socket>,
    snapshot: Option<Socket>,
    dispatch: Option<Socket>,
    hugz: Timer,
    stor_topic: LruCache<Name, LruCache<Id, Topic>>,
    stor_worker: LruCache<Id, u64>,
}

impl BrokerSessionHandler {
    fn new(config: BrokerConfig) -> BrokerSessionHandler {
        BrokerSessionHandler {
            ctx: Context::new(),
            config,
            delivery: None,
            snapshot: None,
            dispatch: None,
            hugz: Timer::new(HUGZ_INTERVAL, true),
            stor_topic: LruCache::new(STOR_TOPIC_CAPACITY),
            stor_worker: LruCache::new(STOR_WORKER_CAPACITY),
        }
    }

    fn open_sockets(&mut self) -> Result<()> {
        // Cross-wired per sessionbroker.cpp: the broker's receiving (DISH)
        // socket binds on the *dispatch* endpoints and its sending (RADIO)
        // socket binds on the *delivery* endpoints, so the same
        // (delivery, dispatch, snapshot) triple handed to both a broker and
        // a worker connects them to each other rather than to themselves.
        let delivery = Socket::new(&self.ctx, SocketKind::Dish)?;
        for ep in &self.config.endpoints_dispatch {
            delivery.bind(ep, Duration::from_secs(2))?;
        }
        delivery.join(wire::GROUP_HUGZ)?;
        delivery.join(wire::GROUP_UPDT)?;

        let dispatch = Socket::new(&self.ctx, SocketKind::Radio)?;
        for ep in &self.config.endpoints_delivery {
            dispatch.bind(ep, Duration::from_secs(2))?;
        }

        let snapshot = Socket::new(&self.ctx, SocketKind::Server)?;
        for ep in &self.config.endpoints_snapshot {
            snapshot.bind(ep, Duration::from_secs(2))?;
        }

        self.delivery = Some(delivery);
        self.dispatch = Some(dispatch);
        self.snapshot = Some(snapshot);
        self.hugz.start();
        Ok(())
    }

    fn close_sockets(&mut self) {
        self.delivery = None;
        self.dispatch = None;
        self.snapshot = None;
        self.hugz.stop();
    }

    /// Stores `topic` if it is newer than anything seen from its producer.
    /// Returns `true` if it was stored (and should be republished).
    fn store_topic(&mut self, topic: Topic) -> bool {
        let last = self.stor_worker.find(topic.worker()).copied().unwrap_or(0);
        if topic.seq_num() <= last {
            return false;
        }
        self.stor_worker.put(topic.worker().clone(), topic.seq_num());

        let name = topic.name().clone();
        // `get` (rather than `find`) pulls the per-name cache out so its
        // own recency in the outer LRU is bumped on every update too.
        let mut per_worker = self
            .stor_topic
            .get(&name)
            .unwrap_or_else(|| LruCache::new(STOR_TOPIC_WORKER_CAPACITY));
        per_worker.put(topic.worker().clone(), topic);
        self.stor_topic.put(name, per_worker);
        true
    }

    fn handle_delivery_frame(&mut self, payload: crate::part::Part, group: Option<String>) {
        match group.as_deref() {
            Some(g) if g == wire::GROUP_HUGZ => {
                self.hugz.start_if_not_active();
            }
            Some(g) if g == wire::GROUP_UPDT => {
                let topic = match Topic::from_part(&payload) {
                    Ok(t) => t,
                    Err(e) => {
                        log::warn!("dropping malformed update: {e}");
                        return;
                    }
                };
                let topic = topic.with_broker(self.config.uuid.clone());
                if self.store_topic(topic.clone()) {
                    self.republish(&topic);
                } else {
                    log::debug!("discarding out-of-order update from {:?}", topic.worker());
                }
            }
            other => log::warn!("unexpected delivery group: {other:?}"),
        }
    }

    fn republish(&self, topic: &Topic) {
        let Some(dispatch) = &self.dispatch else { return };
        let part = topic.to_part();
        if let Err(e) = dispatch.send_group(topic.name().as_str(), &part) {
            log::warn!("failed to republish on name group: {e}");
        }
        if let Err(e) = dispatch.send_group(wire::GROUP_UPDT, &part) {
            log::warn!("failed to republish on wildcard group: {e}");
        }
    }

    fn handle_snapshot_request(&mut self, payload: crate::part::Part, routing_id: Option<u32>) {
        let Some(routing_id) = routing_id else {
            log::warn!("snapshot request without a routing id");
            return;
        };
        let frame = match SnapshotFrame::from_part(&payload) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("malformed snapshot request: {e}");
                return;
            }
        };
        if wire::expect_verb(&frame, wire::VERB_SYNC).is_err() {
            log::warn!("unexpected verb in snapshot request: {}", frame.verb);
            return;
        }
        let config = match crate::config::WorkerConfig::from_part(&frame.payload) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("malformed worker config in snapshot request: {e}");
                return;
            }
        };
        self.reply_snapshot(routing_id, frame.syncseq, &config);
    }

    fn reply_snapshot(&self, routing_id: u32, syncseq: u8, requester: &crate::config::WorkerConfig) {
        let Some(snapshot) = &self.snapshot else { return };

        let begin = SnapshotFrame::new(wire::VERB_BEGN, syncseq, self.config.uuid.to_part());
        if let Err(e) = snapshot.send_to_nowait(routing_id, &begin.to_part()) {
            if e.would_block() || e.host_unreachable() {
                log::warn!("requester unreachable, aborting snapshot reply: {e}");
            } else {
                log::error!("unexpected error sending snapshot begin: {e}");
            }
            return;
        }

        for name in self.stor_topic.keys().cloned().collect::<Vec<_>>() {
            if !requester.topics_all && !requester.topics_names.contains(&name) {
                continue;
            }
            let Some(per_worker) = self.stor_topic.find(&name) else { continue };
            let Some(topic) = per_worker.back() else { continue };
            if topic.kind() == TopicKind::Event {
                continue;
            }
            let elem = SnapshotFrame::new(wire::VERB_ELEM, syncseq, topic.to_part());
            match snapshot.send_to_nowait(routing_id, &elem.to_part()) {
                Ok(()) => {}
                Err(e) if e.would_block() || e.host_unreachable() => {
                    log::warn!("requester went unreachable mid-snapshot: {e}");
                    return;
                }
                Err(e) => {
                    log::error!("unexpected error sending snapshot element: {e}");
                    return;
                }
            }
        }

        let complete = SnapshotFrame::new(wire::VERB_SONC, syncseq, self.config.uuid.to_part());
        if let Err(e) = snapshot.send_to_nowait(routing_id, &complete.to_part()) {
            if e.would_block() || e.host_unreachable() {
                log::warn!("requester unreachable at snapshot completion: {e}");
            } else {
                log::error!("unexpected error sending snapshot complete: {e}");
            }
        }
    }
}

impl SessionHandler for BrokerSessionHandler {
    fn operation_ready(&mut self, op: Operation) -> Result<Outcome> {
        match op.kind() {
            OpType::Start => {
                self.open_sockets()?;
                Ok(Outcome::cont())
            }
            OpType::Stop => {
                self.close_sockets();
                Ok(Outcome::stop())
            }
            other => {
                log::warn!("broker session does not support operation {other:?}");
                Ok(Outcome::cont())
            }
        }
    }

    fn register<'a>(&'a self, poller: &mut Poller<'a>) {
        if let Some(s) = &self.delivery {
            poller.add_socket(TOKEN_DELIVERY, s);
        }
        if let Some(s) = &self.snapshot {
            poller.add_socket(TOKEN_SNAPSHOT, s);
        }
        poller.add_timer(TOKEN_HUGZ, &self.hugz);
    }

    fn socket_ready(&mut self, token: Token) -> Result<Outcome> {
        match token {
            TOKEN_DELIVERY => {
                if let Some(s) = &self.delivery {
                    if let Some((payload, group, _rid)) = s.recv_nowait()? {
                        self.handle_delivery_frame(payload, group);
                    }
                }
                Ok(Outcome::cont())
            }
            TOKEN_SNAPSHOT => {
                if let Some(s) = &self.snapshot {
                    if let Some((payload, _group, rid)) = s.recv_nowait()? {
                        self.handle_snapshot_request(payload, rid);
                    }
                }
                Ok(Outcome::cont())
            }
            TOKEN_HUGZ => {
                if let Some(dispatch) = &self.dispatch {
                    dispatch.send_group(wire::GROUP_HUGZ, &crate::part::Part::empty())?;
                }
                Ok(Outcome::cont())
            }
            _ => Err(Error::Protocol("unknown poll token in broker session".into())),
        }
    }
}
