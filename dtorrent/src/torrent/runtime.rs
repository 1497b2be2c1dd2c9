//! The concrete `Torrent` a session owns: metadata plus the peer policy and
//! piece table, implementing every method the reactor and checker call on
//! it, built around `torrent_parser::torrent::Torrent`'s parsed metadata.

use std::time::{Duration, Instant};

use crate::torrent_parser::torrent::Torrent as TorrentMetadata;

use super::piece_table::PieceTable;
use super::policy::Policy;
use crate::session::fair_share::{self as torrent_fair_share, Demand};
use crate::session::stat::Stat;

const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerEvent {
    Started,
    None,
    Stopped,
    Completed,
}

/// Populated by the torrent; the session stamps `listen_port` and `key`
/// before handing this to the tracker collaborator.
#[derive(Debug, Clone)]
pub struct TrackerRequest {
    pub info_hash: Vec<u8>,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
    pub event: TrackerEvent,
    pub listen_port: u16,
    pub key: u32,
}

/// What the session needs to authenticate an announce to this torrent's
/// tracker.
#[derive(Debug, Clone)]
pub struct TrackerLogin {
    pub announce_url: String,
    pub info_hash: Vec<u8>,
}

/// Per-torrent ceilings, each `None` meaning unlimited — mirrors the
/// session-wide settings in `Cfg`, but scoped to one swarm.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quotas {
    pub upload_rate: Option<u64>,
    pub download_rate: Option<u64>,
    pub max_uploads: Option<u64>,
    pub max_connections: Option<u64>,
}

pub struct Torrent {
    metadata: TorrentMetadata,
    policy: Policy,
    pieces: PieceTable,
    aborted: bool,
    quotas: Quotas,
    uploaded_this_tick: u64,
    downloaded_this_tick: u64,
    total_uploaded: u64,
    total_downloaded: u64,
    last_announce: Option<Instant>,
}

impl Torrent {
    pub fn new(metadata: TorrentMetadata) -> Self {
        let total_pieces = metadata.total_pieces();
        Self {
            metadata,
            policy: Policy::new(),
            pieces: PieceTable::new(total_pieces),
            aborted: false,
            quotas: Quotas::default(),
            uploaded_this_tick: 0,
            downloaded_this_tick: 0,
            total_uploaded: 0,
            total_downloaded: 0,
            last_announce: None,
        }
    }

    pub fn metadata(&self) -> &TorrentMetadata {
        &self.metadata
    }

    pub fn pieces(&self) -> &PieceTable {
        &self.pieces
    }

    pub fn pieces_mut(&mut self) -> &mut PieceTable {
        &mut self.pieces
    }

    pub fn set_quotas(&mut self, quotas: Quotas) {
        self.quotas = quotas;
    }

    pub fn is_seed(&self) -> bool {
        self.pieces.is_finished()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn abort(&mut self) {
        self.aborted = true;
    }

    /// True once `ANNOUNCE_INTERVAL` has elapsed since the last announce,
    /// or immediately if none has happened yet.
    pub fn should_request(&self) -> bool {
        match self.last_announce {
            None => true,
            Some(t) => t.elapsed() >= ANNOUNCE_INTERVAL,
        }
    }

    pub fn num_peers(&self) -> usize {
        self.policy.num_peers()
    }

    pub fn get_policy(&self) -> &Policy {
        &self.policy
    }

    pub fn get_policy_mut(&mut self) -> &mut Policy {
        &mut self.policy
    }

    /// Rolls this torrent's per-tick byte counts into the session-wide
    /// `Stat` and resets them; called once per second, same cadence as
    /// `Stat::second_tick`.
    pub fn second_tick(&mut self, stat: &mut Stat) {
        stat.add_upload(self.uploaded_this_tick);
        stat.add_download(self.downloaded_this_tick);
        self.total_uploaded += self.uploaded_this_tick;
        self.total_downloaded += self.downloaded_this_tick;
        self.uploaded_this_tick = 0;
        self.downloaded_this_tick = 0;
    }

    pub fn record_uploaded(&mut self, bytes: u64) {
        self.uploaded_this_tick += bytes;
    }

    pub fn record_downloaded(&mut self, bytes: u64) {
        self.downloaded_this_tick += bytes;
    }

    /// Torrent-internal redistribution of its own quotas across its
    /// connected peers, using the same fair-share allocator the session
    /// uses across torrents.
    pub fn distribute_resources(&self) -> Vec<u64> {
        let demands: Vec<Demand> = self
            .policy
            .peers()
            .map(|_| Demand {
                requested: 1,
                ceiling: None,
            })
            .collect();
        torrent_fair_share::allocate(self.quotas.upload_rate, &demands)
    }

    pub fn generate_tracker_request(&mut self, event: TrackerEvent) -> TrackerRequest {
        self.last_announce = Some(Instant::now());
        let left = self
            .metadata
            .length()
            .saturating_sub((self.pieces.finished_count() as u32) * self.metadata.piece_length());
        TrackerRequest {
            info_hash: self.metadata.get_info_hash_as_bytes().unwrap_or_default(),
            uploaded: self.total_uploaded,
            downloaded: self.total_downloaded,
            left: left as u64,
            event,
            listen_port: 0,
            key: 0,
        }
    }

    pub fn tracker_login(&self) -> TrackerLogin {
        TrackerLogin {
            announce_url: self.metadata.announce_url.clone(),
            info_hash: self.metadata.get_info_hash_as_bytes().unwrap_or_default(),
        }
    }

    pub fn upload_quota(&self) -> Option<u64> {
        self.quotas.upload_rate
    }

    pub fn download_quota(&self) -> Option<u64> {
        self.quotas.download_rate
    }

    pub fn max_uploads_quota(&self) -> Option<u64> {
        self.quotas.max_uploads
    }

    pub fn max_connections_quota(&self) -> Option<u64> {
        self.quotas.max_connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent_parser::info::Info;

    fn test_metadata() -> TorrentMetadata {
        TorrentMetadata {
            announce_url: "http://example.com/announce".to_string(),
            info: Info {
                length: 100,
                name: "example".to_string(),
                piece_length: 10,
                pieces: vec![],
            },
            info_hash: "2c6b6858d61da9543d4231a71db4b1c9264b0685".to_string(),
        }
    }

    #[test]
    fn fresh_torrent_should_request_immediately() {
        let torrent = Torrent::new(test_metadata());
        assert!(torrent.should_request());
    }

    #[test]
    fn generating_a_tracker_request_resets_should_request() {
        let mut torrent = Torrent::new(test_metadata());
        let _ = torrent.generate_tracker_request(TrackerEvent::Started);
        assert!(!torrent.should_request());
    }

    #[test]
    fn abort_is_observable() {
        let mut torrent = Torrent::new(test_metadata());
        assert!(!torrent.is_aborted());
        torrent.abort();
        assert!(torrent.is_aborted());
    }

    #[test]
    fn second_tick_moves_counts_into_session_stat() {
        let mut torrent = Torrent::new(test_metadata());
        torrent.record_uploaded(500);
        torrent.record_downloaded(1000);

        let mut stat = Stat::new();
        torrent.second_tick(&mut stat);
        stat.second_tick();

        assert_eq!(stat.upload_rate(), 500.0);
        assert_eq!(stat.download_rate(), 1000.0);
    }
}
