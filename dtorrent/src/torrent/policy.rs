//! Per-torrent peer policy: the set of known endpoints for one swarm,
//! seeded from tracker responses and from fast-resume's `peer_map`.

use std::collections::HashMap;

use crate::session::peer_record::{Peer, PeerAddr, PeerSource};

#[derive(Debug, Default)]
pub struct Policy {
    peers: HashMap<(PeerAddr, u16), Peer>,
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a peer learned from `source`, leaving an already-known
    /// peer's counters and flags untouched but recording the extra source.
    pub fn add_peer(&mut self, addr: PeerAddr, port: u16, source: PeerSource) {
        self.peers
            .entry((addr.clone(), port))
            .and_modify(|p| p.source.insert(source))
            .or_insert_with(|| Peer::new(addr, port, source));
    }

    /// Seeds the policy from fast-resume's `peer_map` (tracker-seeded
    /// addresses recorded in a previous session).
    pub fn seed_from_resume(&mut self, peers: &[(PeerAddr, u16)]) {
        for (addr, port) in peers {
            self.add_peer(addr.clone(), *port, PeerSource::RESUME_DATA);
        }
    }

    /// Seeds the policy from a live tracker announce response.
    pub fn seed_from_tracker(&mut self, peers: &[(PeerAddr, u16)]) {
        for (addr, port) in peers {
            self.add_peer(addr.clone(), *port, PeerSource::TRACKER);
        }
    }

    pub fn num_peers(&self) -> usize {
        self.peers.len()
    }

    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    pub fn get_mut(&mut self, addr: &PeerAddr, port: u16) -> Option<&mut Peer> {
        self.peers.get_mut(&(addr.clone(), port))
    }

    pub fn connectable_peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers
            .values()
            .filter(|p| p.connectable && !p.banned && p.connection().is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_adding_a_known_peer_merges_sources_without_duplicating() {
        let mut policy = Policy::new();
        policy.add_peer(PeerAddr::V4([1, 2, 3, 4]), 6881, PeerSource::TRACKER);
        policy.add_peer(PeerAddr::V4([1, 2, 3, 4]), 6881, PeerSource::RESUME_DATA);

        assert_eq!(policy.num_peers(), 1);
        let peer = policy.get_mut(&PeerAddr::V4([1, 2, 3, 4]), 6881).unwrap();
        assert!(peer.source.contains(PeerSource::TRACKER));
        assert!(peer.source.contains(PeerSource::RESUME_DATA));
    }
}
