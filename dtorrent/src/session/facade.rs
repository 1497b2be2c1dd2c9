//! The public entry point: every operation here acquires `session.mutex`
//! (and, when it also touches the checker, `checker.mutex` strictly after
//! it), matching the lock-ordering discipline the reactor and checker loops
//! themselves observe.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use logger::logger_sender::LoggerSender;

use crate::checker::job::CheckerJob;
use crate::checker::CheckerHandle;
use crate::torrent::runtime::Torrent as TorrentRuntime;
use crate::torrent_parser::torrent::Torrent as TorrentMetadata;

use super::alert::{alert_channel, Alert, AlertSource, Severity};
use super::{SessionCore, Settings};

#[derive(Debug)]
pub enum SessionError {
    DuplicateTorrent,
    EmptySavePath,
    BlockSizeNotPowerOfTwo,
    Io(std::io::Error),
}

/// A cheap-to-clone handle to a running session: the reactor thread owns
/// nothing the handle doesn't also reach through the shared mutex.
#[derive(Clone)]
pub struct Session {
    core: Arc<Mutex<SessionCore>>,
    checker: CheckerHandle,
    alerts: Arc<AlertSource>,
}

impl Session {
    pub fn new(logger: LoggerSender, extensions_enabled: bool) -> std::io::Result<Self> {
        let (alert_sink, alert_source) = alert_channel();
        let core = Arc::new(Mutex::new(SessionCore::new(
            alert_sink.clone(),
            logger.clone(),
            extensions_enabled,
        )?));
        let checker = CheckerHandle::spawn(core.clone(), alert_sink, logger.clone());

        let reactor_core = core.clone();
        let reactor_logger = logger;
        thread::Builder::new()
            .name("session-reactor".to_string())
            .spawn(move || {
                {
                    let mut session = reactor_core.lock().expect("session mutex poisoned");
                    session.open_listen_port();
                }
                loop {
                    let abort = {
                        let mut session = reactor_core.lock().expect("session mutex poisoned");
                        session.tick();
                        session.abort
                    };
                    if abort {
                        break;
                    }
                }

                // §4.E: once aborted, stop calling `tick()` (it always opens with
                // `selector.wait(500ms)`) and spin-tick only the tracker manager,
                // sleeping 100ms between ticks, until every queued `Stopped`
                // announce has drained.
                loop {
                    let pending = {
                        let mut session = reactor_core.lock().expect("session mutex poisoned");
                        session.drain_one_pending_announce()
                    };
                    if !pending {
                        break;
                    }
                    thread::sleep(Duration::from_millis(100));
                }
                reactor_logger.info("session reactor shutting down");
            })
            .expect("failed to spawn reactor thread");

        Ok(Self {
            core,
            checker,
            alerts: Arc::new(alert_source),
        })
    }

    /// Enqueues a checker job for a torrent read from disk; skipped if the
    /// info-hash is already known to either the session or the checker.
    pub fn add_torrent(
        &self,
        metadata: TorrentMetadata,
        save_path: String,
        resume_data: Vec<u8>,
        compact: bool,
        block_size: u32,
    ) -> Result<(), SessionError> {
        if save_path.trim().is_empty() {
            return Err(SessionError::EmptySavePath);
        }
        if !block_size.is_power_of_two() {
            return Err(SessionError::BlockSizeNotPowerOfTwo);
        }
        let info_hash = metadata
            .get_info_hash_as_bytes()
            .map_err(|_| SessionError::DuplicateTorrent)?;
        if info_hash.len() != 20 {
            return Err(SessionError::DuplicateTorrent);
        }
        let mut key = [0u8; 20];
        key.copy_from_slice(&info_hash);

        {
            let session = self.core.lock().expect("session mutex poisoned");
            if session.torrents.contains_key(&key) {
                return Err(SessionError::DuplicateTorrent);
            }
        }
        if self.checker.contains(&key) {
            return Err(SessionError::DuplicateTorrent);
        }

        let job = CheckerJob::new(key, metadata, save_path, resume_data, compact, block_size);
        self.checker.enqueue(job);
        Ok(())
    }

    /// Inserts a tracker-seeded torrent directly into `session.torrents`,
    /// bypassing the checker entirely.
    pub fn add_torrent_from_tracker(&self, metadata: TorrentMetadata) -> Result<(), SessionError> {
        let info_hash = metadata
            .get_info_hash_as_bytes()
            .map_err(|_| SessionError::DuplicateTorrent)?;
        if info_hash.len() != 20 {
            return Err(SessionError::DuplicateTorrent);
        }
        let mut key = [0u8; 20];
        key.copy_from_slice(&info_hash);

        let mut session = self.core.lock().expect("session mutex poisoned");
        if session.torrents.contains_key(&key) {
            return Err(SessionError::DuplicateTorrent);
        }
        session.add_torrent(TorrentRuntime::new(metadata));
        Ok(())
    }

    pub fn remove_torrent(&self, info_hash: [u8; 20]) {
        let mut found_in_session = false;
        {
            let mut session = self.core.lock().expect("session mutex poisoned");
            if let Some(torrent) = session.torrents.get_mut(&info_hash) {
                torrent.abort();
                found_in_session = true;
            }
        }
        if !found_in_session {
            self.checker.abort(&info_hash);
        }
    }

    pub fn listen_on(&self, lo: u16, hi: u16) {
        let mut session = self.core.lock().expect("session mutex poisoned");
        session.listen_port_range = (lo, hi);
        session.open_listen_port();
    }

    pub fn listen_port(&self) -> u16 {
        self.core.lock().expect("session mutex poisoned").listen_port()
    }

    pub fn is_listening(&self) -> bool {
        self.core.lock().expect("session mutex poisoned").is_listening()
    }

    pub fn status(&self) -> (u64, u64, f64, f64) {
        let session = self.core.lock().expect("session mutex poisoned");
        (
            session.stat.total_download(),
            session.stat.total_upload(),
            session.stat.download_rate(),
            session.stat.upload_rate(),
        )
    }

    pub fn set_max_uploads(&self, value: i32) {
        self.core.lock().expect("session mutex poisoned").settings.max_uploads = value;
    }

    pub fn set_max_connections(&self, value: i32) {
        self.core.lock().expect("session mutex poisoned").settings.max_connections = value;
    }

    pub fn set_max_half_open_connections(&self, value: i32) {
        self.core.lock().expect("session mutex poisoned").settings.half_open_limit = value;
    }

    pub fn set_upload_rate_limit(&self, value: i64) {
        self.core.lock().expect("session mutex poisoned").settings.upload_rate_limit = value;
    }

    pub fn set_download_rate_limit(&self, value: i64) {
        self.core.lock().expect("session mutex poisoned").settings.download_rate_limit = value;
    }

    /// Swapping in a stricter filter never needs to evict already-established
    /// peers retroactively here: `IpFilter` is permissive-by-default in this
    /// build (see `ip_filter.rs`), so there is nothing yet to re-check.
    pub fn set_ip_filter(&self, filter: super::ip_filter::IpFilter) {
        self.core.lock().expect("session mutex poisoned").ip_filter = filter;
    }

    pub fn set_peer_id(&self, peer_id: [u8; 20]) {
        self.core.lock().expect("session mutex poisoned").peer_id = peer_id;
    }

    pub fn set_key(&self, key: u32) {
        self.core.lock().expect("session mutex poisoned").key = key;
    }

    pub fn enable_extension(&self) {
        let mut session = self.core.lock().expect("session mutex poisoned");
        let mut peer_id = session.peer_id;
        crate::peer_id::enable_extensions(&mut peer_id);
        session.peer_id = peer_id;
    }

    pub fn disable_extensions(&self) {
        let mut session = self.core.lock().expect("session mutex poisoned");
        let mut peer_id = session.peer_id;
        crate::peer_id::disable_extensions(&mut peer_id);
        session.peer_id = peer_id;
    }

    /// Union of checker-pending and session-resident info-hashes, skipping
    /// anything already aborted.
    pub fn get_torrents(&self) -> Vec<[u8; 20]> {
        let mut hashes: Vec<[u8; 20]> = {
            let session = self.core.lock().expect("session mutex poisoned");
            session
                .torrents
                .iter()
                .filter(|(_, t)| !t.is_aborted())
                .map(|(k, _)| *k)
                .collect()
        };
        hashes.extend(self.checker.pending_info_hashes());
        hashes
    }

    pub fn pop_alert(&self) -> Option<Alert> {
        self.alerts.pop()
    }

    pub fn set_severity_level(&self, severity: Severity) {
        let mut session = self.core.lock().expect("session mutex poisoned");
        session.alert_sink_mut().set_severity_level(severity);
    }

    pub fn shutdown(&self) {
        self.core.lock().expect("session mutex poisoned").abort = true;
        self.checker.shutdown();
    }
}
