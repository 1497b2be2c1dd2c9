//! The reactor: a single-threaded cooperative scheduler multiplexing every
//! peer socket this process owns, non-blocking and multiplexed instead of
//! thread-per-connection.

pub mod alert;
pub mod conn_table;
pub mod connection;
pub mod facade;
pub mod fair_share;
pub mod ip_filter;
pub mod peer_record;
pub mod stat;
pub mod tracker_manager;

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mio::net::TcpListener as MioTcpListener;

use logger::logger_sender::LoggerSender;

use crate::peer_id;
use crate::selector::{SelectorToken, Selector};
use crate::torrent::runtime::{Torrent, TrackerEvent};

use self::alert::{Alert, AlertSink};
use self::conn_table::{ConnId, ConnTable};
use self::connection::{Connection, ConnectionError, ReceivedFrame};
use self::fair_share::{allocate, Demand};
use self::ip_filter::IpFilter;
use self::stat::Stat;
use self::tracker_manager::{AnnounceResult, HttpAnnouncer, QueuedAnnounce, TrackerManager};

/// Identifies the listen socket in selector batches; distinct from every
/// `ConnId` token, which are small indices handed out by `ConnTable`.
const LISTEN_TOKEN: SelectorToken = usize::MAX;

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// `-1` means unlimited, mirroring `Cfg`'s sentinel for the same settings.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub upload_rate_limit: i64,
    pub download_rate_limit: i64,
    pub max_uploads: i32,
    pub max_connections: i32,
    pub half_open_limit: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upload_rate_limit: -1,
            download_rate_limit: -1,
            max_uploads: -1,
            max_connections: -1,
            half_open_limit: 8,
        }
    }
}

/// All state the reactor thread and the public façade share under one
/// mutex, per §5's lock-ordering discipline (`session.mutex` before
/// `checker.mutex`, never the reverse).
pub struct SessionCore {
    pub settings: Settings,
    pub peer_id: [u8; 20],
    pub key: u32,
    pub listen_port_range: (u16, u16),
    pub listen_port: u16,
    pub abort: bool,
    pub incoming_connection: bool,
    pub ip_filter: IpFilter,
    pub stat: Stat,

    pub torrents: HashMap<[u8; 20], Torrent>,

    selector: Selector,
    conn_table: ConnTable,
    connection_queue: VecDeque<ConnId>,
    half_open: HashMap<SelectorToken, ConnId>,
    connections: HashMap<SelectorToken, ConnId>,
    disconnect_peer: Vec<ConnId>,
    listen_socket: Option<MioTcpListener>,

    tracker_manager: TrackerManager,

    alert_sink: AlertSink,
    logger: LoggerSender,
    last_tick: Instant,
}

impl SessionCore {
    pub fn new(alert_sink: AlertSink, logger: LoggerSender, extensions_enabled: bool) -> io::Result<Self> {
        Ok(Self {
            settings: Settings::default(),
            peer_id: peer_id::generate(extensions_enabled),
            key: rand::random(),
            listen_port_range: (6881, 6889),
            listen_port: 0,
            abort: false,
            incoming_connection: false,
            ip_filter: IpFilter::new(),
            stat: Stat::new(),
            torrents: HashMap::new(),
            selector: Selector::new(1024)?,
            conn_table: ConnTable::new(),
            connection_queue: VecDeque::new(),
            half_open: HashMap::new(),
            connections: HashMap::new(),
            disconnect_peer: Vec::new(),
            listen_socket: None,
            tracker_manager: TrackerManager::new(Box::new(HttpAnnouncer)),
            alert_sink,
            logger,
            last_tick: Instant::now(),
        })
    }

    pub fn is_listening(&self) -> bool {
        self.listen_socket.is_some()
    }

    pub fn alert_sink_mut(&mut self) -> &mut AlertSink {
        &mut self.alert_sink
    }

    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    /// Starting at `listen_port_range.0`, attempt to bind and listen;
    /// on "address not available" give up immediately, on any other bind
    /// failure advance to the next port, give up past `.1`.
    pub fn open_listen_port(&mut self) {
        let (lo, hi) = self.listen_port_range;
        let mut port = lo;
        loop {
            let addr: SocketAddr = format!("0.0.0.0:{}", port).parse().expect("valid socket addr");
            match MioTcpListener::bind(addr) {
                Ok(mut listener) => {
                    let _ = self.selector.add(LISTEN_TOKEN, &mut listener);
                    let _ = self.selector.monitor_readability(LISTEN_TOKEN, &mut listener);
                    self.selector.monitor_errors(LISTEN_TOKEN);
                    self.listen_socket = Some(listener);
                    self.listen_port = port;
                    return;
                }
                Err(e) if e.kind() == io::ErrorKind::AddrNotAvailable => {
                    self.alert_sink.post(Alert::ListenFailed {
                        message: format!("address not available: {}", e),
                    });
                    return;
                }
                Err(_) => {
                    if port >= hi {
                        self.alert_sink.post(Alert::ListenFailed {
                            message: format!("no free port in range {}..={}", lo, hi),
                        });
                        return;
                    }
                    port += 1;
                }
            }
        }
    }

    pub fn add_torrent(&mut self, torrent: Torrent) {
        let info_hash = torrent.tracker_login().info_hash;
        if info_hash.len() == 20 {
            let mut key = [0u8; 20];
            key.copy_from_slice(&info_hash);
            self.torrents.insert(key, torrent);
        }
    }

    /// Queues an outbound attempt to `addr` for `info_hash`'s torrent and
    /// attaches the new `Connection`'s id to the matching `Peer` record, per
    /// the back-reference invariant §3/§9 requires (zeroing that peer's
    /// cached `prev_amount_*` as a side effect of `attach_connection`).
    pub fn queue_outbound(&mut self, info_hash: [u8; 20], addr: peer_record::PeerAddr, port: u16) {
        let ip = peer_addr_to_ip_string(&addr);
        let mut connection = Connection::new_queued(info_hash, ip, port);
        connection.set_local_peer_id(self.peer_id);
        let id = self.conn_table.insert(connection);
        self.connection_queue.push_back(id);
        if let Some(torrent) = self.torrents.get_mut(&info_hash) {
            if let Some(peer) = torrent.get_policy_mut().get_mut(&addr, port) {
                peer.attach_connection(id);
            }
        }
    }

    /// Enqueues one outbound attempt for every peer each torrent's policy
    /// currently considers connectable and not already attached to a
    /// connection — the other half of spec.md §1's "initiating outbound
    /// [connections]", which otherwise never happens once a peer is only
    /// known from a tracker response or fast-resume's `peer_map`.
    fn queue_connectable_peers(&mut self) {
        let mut to_connect: Vec<([u8; 20], peer_record::PeerAddr, u16)> = Vec::new();
        for (key, torrent) in self.torrents.iter() {
            for peer in torrent.get_policy().connectable_peers() {
                to_connect.push((*key, peer.address().clone(), peer.port));
            }
        }
        for (info_hash, addr, port) in to_connect {
            self.queue_outbound(info_hash, addr, port);
        }
        self.process_connection_queue();
    }

    /// Finds the `Peer` record `id` is attached to (if any) and detaches it,
    /// folding the connection's last-known byte totals into the peer's
    /// cached `prev_amount_*` fields. Must be called before `id` is removed
    /// from `conn_table`, since it needs the `Connection` to recover which
    /// torrent/address/port the peer record is keyed by.
    fn detach_connection_from_peer(&mut self, id: ConnId) {
        let Some(conn) = self.conn_table.get(id) else {
            return;
        };
        let info_hash = conn.associated_torrent();
        let (ip, port) = conn.peer_addr();
        let addr = ip_string_to_peer_addr(&ip);
        if let Some(torrent) = self.torrents.get_mut(&info_hash) {
            if let Some(peer) = torrent.get_policy_mut().get_mut(&addr, port) {
                if peer.connection() == Some(id) {
                    peer.detach_connection(0, 0);
                }
            }
        }
    }

    /// While the queue is non-empty and the half-open limit allows it, pop
    /// the head, move it into `half_open`, and kick off its TCP handshake.
    pub fn process_connection_queue(&mut self) {
        while let Some(id) = self.connection_queue.front().copied() {
            let limit = self.settings.half_open_limit;
            if limit != -1 && self.half_open.len() >= limit as usize {
                break;
            }
            self.connection_queue.pop_front();
            if let Some(conn) = self.conn_table.get_mut(id) {
                if conn.connect().is_err() {
                    self.conn_table.remove(id);
                    continue;
                }
                self.half_open.insert(id.token(), id);
            }
        }
    }

    /// Drains `disconnect_peer`: each queued id is removed from whichever
    /// of the three live collections holds it, and the socket deregistered.
    pub fn purge_connections(&mut self) {
        let pending: Vec<ConnId> = self.disconnect_peer.drain(..).collect();
        let mut reopened_half_open = false;
        for id in pending {
            self.connection_queue.retain(|queued| *queued != id);
            if self.half_open.remove(&id.token()).is_some() {
                reopened_half_open = true;
            }
            self.connections.remove(&id.token());
            self.detach_connection_from_peer(id);
            if let Some(mut conn) = self.conn_table.remove(id) {
                if let Some(socket) = conn.socket_mut() {
                    let _ = self.selector.remove(id.token(), socket);
                }
            }
        }
        if reopened_half_open {
            self.process_connection_queue();
        }
    }

    /// Tri-way lookup per §4.E: the listen socket, an established
    /// connection, or a half-open attempt each get a different alert and
    /// cleanup path.
    fn connection_failed(&mut self, token: SelectorToken, message: &str) {
        if token == LISTEN_TOKEN {
            self.alert_sink.post(Alert::ListenFailed {
                message: message.to_string(),
            });
            self.listen_socket = None;
            return;
        }
        if let Some(&id) = self.connections.get(&token) {
            self.alert_sink.post(Alert::PeerError {
                message: message.to_string(),
            });
            self.connections.remove(&token);
            self.detach_connection_from_peer(id);
            if let Some(mut conn) = self.conn_table.remove(id) {
                if let Some(socket) = conn.socket_mut() {
                    let _ = self.selector.remove(token, socket);
                }
            }
            return;
        }
        if let Some(&id) = self.half_open.get(&token) {
            self.alert_sink.post(Alert::PeerError {
                message: message.to_string(),
            });
            self.half_open.remove(&token);
            self.detach_connection_from_peer(id);
            if let Some(mut conn) = self.conn_table.remove(id) {
                if let Some(socket) = conn.socket_mut() {
                    let _ = self.selector.remove(token, socket);
                }
            }
            self.process_connection_queue();
        }
    }

    fn handle_connection_error(&mut self, token: SelectorToken, id: ConnId, err: ConnectionError) {
        match err {
            ConnectionError::File(e) => {
                if let Some(info_hash) = self.conn_table.get(id).map(|c| c.associated_torrent()) {
                    if let Some(torrent) = self.torrents.get_mut(&info_hash) {
                        torrent.abort();
                    }
                    self.alert_sink.post(Alert::FileError {
                        info_hash,
                        message: e.to_string(),
                    });
                }
                self.disconnect_peer.push(id);
            }
            ConnectionError::Peer(e) => {
                self.alert_sink.post(Alert::PeerError { message: e.to_string() });
                self.connections.remove(&token);
                self.half_open.remove(&token);
                self.disconnect_peer.push(id);
            }
        }
    }

    fn send_phase(&mut self, writable: &[SelectorToken]) {
        for &token in writable {
            if let Some(&id) = self.connections.get(&token) {
                let result = self.conn_table.get_mut(id).map(|c| c.send_data());
                if let Some(Err(err)) = result {
                    self.handle_connection_error(token, id, err);
                }
            } else if let Some(&id) = self.half_open.get(&token) {
                let result = self.conn_table.get_mut(id).map(|c| c.connection_complete());
                match result {
                    Some(Ok(())) => {
                        self.half_open.remove(&token);
                        self.connections.insert(token, id);
                        self.process_connection_queue();
                    }
                    Some(Err(err)) => self.handle_connection_error(token, id, err),
                    None => {}
                }
            } else {
                self.disconnect_unknown(token);
            }
        }
    }

    fn receive_phase(&mut self, readable: &[SelectorToken]) {
        for &token in readable {
            if token == LISTEN_TOKEN {
                self.accept_incoming();
                continue;
            }
            if let Some(&id) = self.connections.get(&token) {
                let result = self.conn_table.get_mut(id).map(|c| c.receive_data());
                match result {
                    Some(Ok(frames)) => self.dispatch_frames(id, frames),
                    Some(Err(err)) => self.handle_connection_error(token, id, err),
                    None => {}
                }
            } else {
                self.disconnect_unknown(token);
            }
        }
    }

    /// Frame handling itself belongs to the peer-session layer this runtime
    /// hands connections to; here we only keep the torrent's activity
    /// accounting current so Tick-phase bookkeeping stays correct.
    fn dispatch_frames(&mut self, id: ConnId, frames: Vec<ReceivedFrame>) {
        let info_hash = match self.conn_table.get(id) {
            Some(conn) => conn.associated_torrent(),
            None => return,
        };
        if let Some(torrent) = self.torrents.get_mut(&info_hash) {
            for frame in &frames {
                if let ReceivedFrame::Message(_) = frame {
                    torrent.record_downloaded(0);
                }
            }
        }
    }

    fn disconnect_unknown(&mut self, token: SelectorToken) {
        self.connection_failed(token, "unknown socket");
    }

    fn accept_incoming(&mut self) {
        let accepted = match &self.listen_socket {
            Some(listener) => listener.accept(),
            None => return,
        };
        let (stream, addr) = match accepted {
            Ok(pair) => pair,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                self.logger.warn(&format!("accept failed: {}", e));
                return;
            }
        };

        let blocked_addr = peer_record::PeerAddr::V4(match addr.ip() {
            std::net::IpAddr::V4(v4) => v4.octets(),
            std::net::IpAddr::V6(_) => [0, 0, 0, 0],
        });
        if self.ip_filter.is_blocked(&blocked_addr) {
            return;
        }

        // The torrent this peer is about to handshake into is not known
        // until the handshake's info-hash arrives; dispatch_frames() fills
        // in the real association once the first frame is decoded.
        let connection = Connection::from_accepted(stream, addr, [0u8; 20]);
        let id = self.conn_table.insert(connection);
        let token = id.token();
        if let Some(conn) = self.conn_table.get_mut(id) {
            if let Some(socket) = conn.socket_mut() {
                if self.selector.add(token, socket).is_ok() {
                    let _ = self.selector.monitor_readability(token, socket);
                    self.selector.monitor_errors(token);
                }
            }
        }
        self.connections.insert(token, id);
        self.incoming_connection = true;
    }

    fn second_tick_work(&mut self) {
        self.stat.second_tick();

        let mut demands = Vec::new();
        let mut torrent_keys: Vec<[u8; 20]> = Vec::new();
        for (key, torrent) in self.torrents.iter() {
            torrent_keys.push(*key);
            demands.push(Demand {
                requested: torrent.num_peers() as u64,
                ceiling: None,
            });
        }
        let upload_cap = (self.settings.upload_rate_limit >= 0)
            .then(|| self.settings.upload_rate_limit as u64);
        let allocations = allocate(upload_cap, &demands);
        for (key, allocation) in torrent_keys.iter().zip(allocations.iter()) {
            if let Some(torrent) = self.torrents.get_mut(key) {
                torrent.set_quotas(crate::torrent::runtime::Quotas {
                    upload_rate: Some(*allocation),
                    ..Default::default()
                });
                let _ = torrent.distribute_resources();
            }
        }

        let mut finished = Vec::new();
        for (key, torrent) in self.torrents.iter_mut() {
            if torrent.is_aborted() {
                finished.push(*key);
            } else if torrent.should_request() {
                self.queue_announce(*key, TrackerEvent::None);
            } else {
                torrent.second_tick(&mut self.stat);
            }
        }
        for key in finished {
            self.torrents.remove(&key);
        }

        self.queue_connectable_peers();
        self.drain_tracker_announce();
    }

    /// Stamps a tracker request with this session's `listen_port`/`key`
    /// (per §6, the torrent itself knows neither) and queues it; the
    /// announce itself happens later, one queued entry per tick, via
    /// `drain_tracker_announce`.
    fn queue_announce(&mut self, info_hash: [u8; 20], event: TrackerEvent) {
        let Some(torrent) = self.torrents.get_mut(&info_hash) else {
            return;
        };
        let mut request = torrent.generate_tracker_request(event);
        request.listen_port = self.listen_port;
        request.key = self.key;
        self.tracker_manager.enqueue(QueuedAnnounce {
            info_hash,
            metadata: torrent.metadata().clone(),
            request,
            peer_id: String::from_utf8_lossy(&self.peer_id).into_owned(),
        });
    }

    /// Pops and dispatches one queued announce, if any, folding its result
    /// back into the torrent's policy or into an alert.
    fn drain_tracker_announce(&mut self) -> bool {
        let Some(result) = self.tracker_manager.tick() else {
            return false;
        };
        self.apply_announce_result(result);
        true
    }

    fn apply_announce_result(&mut self, result: AnnounceResult) {
        match result.outcome {
            Ok(peers) => {
                if let Some(torrent) = self.torrents.get_mut(&result.info_hash) {
                    torrent.get_policy_mut().seed_from_tracker(&peers);
                }
                self.alert_sink.post(Alert::TrackerAnnounce {
                    info_hash: result.info_hash,
                    message: format!("announce succeeded, {} peers", peers.len()),
                });
            }
            Err(message) => {
                self.alert_sink.post(Alert::TrackerAnnounce {
                    info_hash: result.info_hash,
                    message: format!("announce failed: {message}"),
                });
            }
        }
    }

    /// True while the tracker manager still has entries to drain; the
    /// reactor thread spins on this after `abort` is set so every
    /// `Stopped` announce queued below gets a chance to fire before the
    /// process exits.
    pub fn has_pending_announces(&self) -> bool {
        self.tracker_manager.has_pending()
    }

    /// Pops and dispatches one queued announce without touching the
    /// selector, then reports whether any remain. Used by the shutdown
    /// drain loop (§4.E: "spin-tick the tracker manager ... sleeping 100ms
    /// between ticks"), which must not call `tick()`/`selector.wait` again
    /// once the reactor has run its final normal iteration.
    pub fn drain_one_pending_announce(&mut self) -> bool {
        self.drain_tracker_announce();
        self.has_pending_announces()
    }

    fn tick_phase(&mut self) {
        let timed_out: Vec<(SelectorToken, ConnId)> = self
            .connections
            .iter()
            .filter_map(|(&token, &id)| {
                self.conn_table
                    .get(id)
                    .filter(|c| c.has_timed_out(CONNECTION_TIMEOUT))
                    .map(|_| (token, id))
            })
            .collect();
        for (token, id) in timed_out {
            self.alert_sink.post(Alert::PeerError {
                message: "connection timed out".to_string(),
            });
            self.connections.remove(&token);
            self.disconnect_peer.push(id);
        }
        for (_, id) in self.connections.iter() {
            if let Some(conn) = self.conn_table.get_mut(*id) {
                conn.keep_alive();
            }
        }

        self.second_tick_work();
        self.purge_connections();
    }

    /// One iteration of §4.E's reactor loop.
    pub fn tick(&mut self) {
        let batches = match self.selector.wait(Duration::from_millis(500)) {
            Ok(b) => b,
            Err(_) => return,
        };

        self.purge_connections();
        if self.abort {
            let keys: Vec<[u8; 20]> = self.torrents.keys().copied().collect();
            for key in keys {
                self.queue_announce(key, TrackerEvent::Stopped);
            }
            self.torrents.clear();
            self.drain_tracker_announce();
            return;
        }

        self.send_phase(&batches.writable);
        self.purge_connections();
        self.receive_phase(&batches.readable);
        self.purge_connections();
        for &token in &batches.errored {
            self.connection_failed(token, "connection exception");
        }

        if self.last_tick.elapsed() >= TICK_INTERVAL {
            self.tick_phase();
            self.last_tick = Instant::now();
        }
    }

    pub fn run(&mut self) {
        self.open_listen_port();
        loop {
            self.tick();
            if self.abort && !self.has_pending_announces() {
                break;
            }
        }
    }
}

/// `Connection`'s `peer_addr()`/`new_queued()` deal in a bare `String`/`u16`
/// (the shape `std::net::TcpStream::connect` and `SocketAddr::to_string`
/// want); `Policy` keys peers by the tagged `PeerAddr` spec.md §9 calls for.
/// These two convert between the representations at the boundary.
fn peer_addr_to_ip_string(addr: &peer_record::PeerAddr) -> String {
    match addr {
        peer_record::PeerAddr::V4(octets) => std::net::Ipv4Addr::from(*octets).to_string(),
        peer_record::PeerAddr::V6(octets) => std::net::Ipv6Addr::from(*octets).to_string(),
        peer_record::PeerAddr::I2p(destination) => destination.clone(),
    }
}

fn ip_string_to_peer_addr(ip: &str) -> peer_record::PeerAddr {
    if let Ok(v4) = ip.parse::<std::net::Ipv4Addr>() {
        return peer_record::PeerAddr::V4(v4.octets());
    }
    if let Ok(v6) = ip.parse::<std::net::Ipv6Addr>() {
        return peer_record::PeerAddr::V6(v6.octets());
    }
    peer_record::PeerAddr::I2p(ip.to_string())
}
