//! Queues and drains tracker announces on the reactor's behalf. Torrents
//! decide *when* to announce (`Torrent::should_request`, `Torrent::abort`);
//! this module decides *how*, working one queued entry at a time so a
//! single announce never holds up more than the tick that pops it.
//!
//! The actual wire protocol is the teacher's `tracker::tracker_handler`
//! stack unchanged — a synchronous HTTP GET. `Announcer` exists only so
//! that stands behind a trait object: production code wires up
//! `HttpAnnouncer`, unit tests wire up a fake that never touches the
//! network.

use std::collections::VecDeque;

use crate::session::peer_record::PeerAddr;
use crate::torrent::runtime::{TrackerEvent, TrackerRequest};
use crate::torrent_parser::torrent::Torrent as TorrentMetadata;
use crate::tracker::tracker_handler::TrackerHandler;

/// One torrent's pending announce: the metadata the HTTP client needs plus
/// the request the torrent already stamped with its own counters.
pub struct QueuedAnnounce {
    pub info_hash: [u8; 20],
    pub metadata: TorrentMetadata,
    pub request: TrackerRequest,
    pub peer_id: String,
}

pub trait Announcer {
    fn announce(&self, queued: &QueuedAnnounce) -> Result<Vec<(PeerAddr, u16)>, String>;
}

/// The real collaborator: one blocking HTTP GET per announce, same as the
/// teacher's `TrackerHandler::get_peers_list`.
pub struct HttpAnnouncer;

impl Announcer for HttpAnnouncer {
    fn announce(&self, queued: &QueuedAnnounce) -> Result<Vec<(PeerAddr, u16)>, String> {
        let handler = TrackerHandler::new(
            queued.metadata.clone(),
            queued.request.listen_port as u32,
            queued.peer_id.clone(),
        )
        .map_err(|e| format!("{:?}", e))?;

        let response = handler.get_peers_list().map_err(|e| format!("{:?}", e))?;
        Ok(response
            .peers
            .iter()
            .map(|peer| {
                let octets: Vec<u8> = peer.ip.split('.').filter_map(|s| s.parse().ok()).collect();
                let addr = if octets.len() == 4 {
                    PeerAddr::V4([octets[0], octets[1], octets[2], octets[3]])
                } else {
                    PeerAddr::I2p(peer.ip.clone())
                };
                (addr, peer.port as u16)
            })
            .collect())
    }
}

/// Outcome of draining one queued entry, handed back to the session so it
/// can seed the torrent's policy with fresh peers or post an alert.
pub struct AnnounceResult {
    pub info_hash: [u8; 20],
    pub event: TrackerEvent,
    pub outcome: Result<Vec<(PeerAddr, u16)>, String>,
}

pub struct TrackerManager {
    queue: VecDeque<QueuedAnnounce>,
    announcer: Box<dyn Announcer + Send>,
}

impl TrackerManager {
    pub fn new(announcer: Box<dyn Announcer + Send>) -> Self {
        Self {
            queue: VecDeque::new(),
            announcer,
        }
    }

    pub fn enqueue(&mut self, queued: QueuedAnnounce) {
        self.queue.push_back(queued);
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Pops and dispatches one queued announce, if any. `Stopped` events go
    /// through `send_finished`, everything else through `send_announce`;
    /// both actually perform the HTTP round trip, the split only exists so
    /// the shutdown drain has a named method to call.
    pub fn tick(&mut self) -> Option<AnnounceResult> {
        let queued = self.queue.pop_front()?;
        let event = queued.request.event;
        if event == TrackerEvent::Stopped {
            Some(self.send_finished(queued))
        } else {
            Some(self.send_announce(queued))
        }
    }

    fn send_announce(&self, queued: QueuedAnnounce) -> AnnounceResult {
        let info_hash = queued.info_hash;
        let event = queued.request.event;
        let outcome = self.announcer.announce(&queued);
        AnnounceResult {
            info_hash,
            event,
            outcome,
        }
    }

    /// Fires a `Stopped` announce. The response's peer list is discarded by
    /// the session (`distribute_resources` has nothing left to attach
    /// peers to), but the round trip itself still matters: trackers use it
    /// to drop the peer's slot immediately instead of waiting for its
    /// interval to expire.
    fn send_finished(&self, queued: QueuedAnnounce) -> AnnounceResult {
        self.send_announce(queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent_parser::info::Info;

    struct FakeAnnouncer {
        result: Result<Vec<(PeerAddr, u16)>, String>,
    }

    impl Announcer for FakeAnnouncer {
        fn announce(&self, _queued: &QueuedAnnounce) -> Result<Vec<(PeerAddr, u16)>, String> {
            self.result.clone()
        }
    }

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

    fn test_request(event: TrackerEvent) -> TrackerRequest {
        TrackerRequest {
            info_hash: vec![0; 20],
            uploaded: 0,
            downloaded: 0,
            left: 100,
            event,
            listen_port: 6881,
            key: 42,
        }
    }

    #[test]
    fn tick_on_empty_queue_returns_none() {
        let mut manager = TrackerManager::new(Box::new(FakeAnnouncer { result: Ok(vec![]) }));
        assert!(manager.tick().is_none());
    }

    #[test]
    fn enqueued_announce_drains_on_next_tick() {
        let mut manager = TrackerManager::new(Box::new(FakeAnnouncer {
            result: Ok(vec![(PeerAddr::V4([127, 0, 0, 1]), 6881)]),
        }));
        manager.enqueue(QueuedAnnounce {
            info_hash: [1; 20],
            metadata: test_metadata(),
            request: test_request(TrackerEvent::Started),
            peer_id: "-DT0100-aaaaaaaaaaaa".to_string(),
        });
        assert!(manager.has_pending());

        let result = manager.tick().expect("one queued announce");
        assert_eq!(result.info_hash, [1; 20]);
        assert_eq!(result.event, TrackerEvent::Started);
        assert_eq!(result.outcome.unwrap().len(), 1);
        assert!(!manager.has_pending());
    }

    #[test]
    fn stopped_event_drains_through_send_finished() {
        let mut manager = TrackerManager::new(Box::new(FakeAnnouncer { result: Ok(vec![]) }));
        manager.enqueue(QueuedAnnounce {
            info_hash: [2; 20],
            metadata: test_metadata(),
            request: test_request(TrackerEvent::Stopped),
            peer_id: "-DT0100-aaaaaaaaaaaa".to_string(),
        });

        let result = manager.tick().expect("one queued announce");
        assert_eq!(result.event, TrackerEvent::Stopped);
        assert!(result.outcome.is_ok());
    }

    #[test]
    fn failed_announce_is_reported_without_panicking() {
        let mut manager = TrackerManager::new(Box::new(FakeAnnouncer {
            result: Err("connection refused".to_string()),
        }));
        manager.enqueue(QueuedAnnounce {
            info_hash: [3; 20],
            metadata: test_metadata(),
            request: test_request(TrackerEvent::None),
            peer_id: "-DT0100-aaaaaaaaaaaa".to_string(),
        });

        let result = manager.tick().unwrap();
        assert!(result.outcome.is_err());
    }
}
