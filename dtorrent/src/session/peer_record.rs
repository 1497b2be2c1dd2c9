//! Persistent per-endpoint state, independent of whether a connection to
//! that endpoint is currently open.

use std::time::Instant;

use super::conn_table::{ConnId, ConnTable};

/// Remote address, tagged by family. Replaces an inheritance hierarchy
/// (base peer + IPv4/IPv6/I2P derived types) with a sum type: exactly one
/// arm is ever inhabited.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PeerAddr {
    V4([u8; 4]),
    V6([u8; 16]),
    I2p(String),
}

/// Which discovery mechanism learned this peer. Only the low byte is
/// meaningful; multiple bits may be set if more than one source reported
/// the same endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerSource(pub u8);

impl PeerSource {
    pub const TRACKER: PeerSource = PeerSource(1 << 0);
    pub const DHT: PeerSource = PeerSource(1 << 1);
    pub const PEX: PeerSource = PeerSource(1 << 2);
    pub const LSD: PeerSource = PeerSource(1 << 3);
    pub const RESUME_DATA: PeerSource = PeerSource(1 << 4);
    pub const INCOMING: PeerSource = PeerSource(1 << 5);

    pub fn contains(&self, other: PeerSource) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: PeerSource) {
        self.0 |= other.0;
    }
}

/// Per-endpoint state that outlives any single `Connection`: counters,
/// flags, and a weak back-pointer to the connection currently attached, if
/// any.
#[derive(Debug, Clone)]
pub struct Peer {
    pub port: u16,
    pub addr: PeerAddr,
    pub source: PeerSource,

    pub hashfails: u32,
    pub failcount: u32,
    pub fast_reconnects: u32,
    pub trust_points: i32,

    pub last_connected: Option<Instant>,
    pub last_optimistic_unchoke: Option<Instant>,

    pub connectable: bool,
    pub seed: bool,
    pub on_parole: bool,
    pub banned: bool,
    pub optimistically_unchoked: bool,
    pub supports_utp: bool,
    pub confirmed_supports_utp: bool,
    pub supports_holepunch: bool,
    pub web_seed: bool,
    pub added_to_dht: bool,

    connection: Option<ConnId>,
    /// Kilobytes-shifted cache of byte totals while no connection is
    /// attached; zero whenever `connection.is_some()`.
    prev_amount_download: u64,
    prev_amount_upload: u64,
}

impl Peer {
    pub fn new(addr: PeerAddr, port: u16, source: PeerSource) -> Self {
        Self {
            port,
            addr,
            source,
            hashfails: 0,
            failcount: 0,
            fast_reconnects: 0,
            trust_points: 0,
            last_connected: None,
            last_optimistic_unchoke: None,
            connectable: true,
            seed: false,
            on_parole: false,
            banned: false,
            optimistically_unchoked: false,
            supports_utp: false,
            confirmed_supports_utp: false,
            supports_holepunch: false,
            web_seed: false,
            added_to_dht: false,
            connection: None,
            prev_amount_download: 0,
            prev_amount_upload: 0,
        }
    }

    pub fn address(&self) -> &PeerAddr {
        &self.addr
    }

    pub fn connection(&self) -> Option<ConnId> {
        self.connection
    }

    /// Attaches a live connection, per the invariant zeroing the cached
    /// pre-connection totals.
    pub fn attach_connection(&mut self, id: ConnId) {
        self.connection = Some(id);
        self.prev_amount_download = 0;
        self.prev_amount_upload = 0;
    }

    /// Detaches the connection, folding its live byte counts into the
    /// kilobytes-shifted cache so `total_download`/`total_upload` keep
    /// returning a sensible figure once it's gone.
    pub fn detach_connection(&mut self, download_bytes: u64, upload_bytes: u64) {
        self.connection = None;
        self.prev_amount_download = download_bytes >> 10;
        self.prev_amount_upload = upload_bytes >> 10;
    }

    pub fn total_download(&self, stats: Option<(u64, u64)>) -> u64 {
        match (self.connection, stats) {
            (Some(_), Some((down, _))) => down,
            _ => self.prev_amount_download << 10,
        }
    }

    pub fn total_upload(&self, stats: Option<(u64, u64)>) -> u64 {
        match (self.connection, stats) {
            (Some(_), Some((_, up))) => up,
            _ => self.prev_amount_upload << 10,
        }
    }

    pub fn is_connected(&self, conn_table: &ConnTable) -> bool {
        self.connection
            .map(|id| conn_table.get(id).is_some())
            .unwrap_or(false)
    }
}
