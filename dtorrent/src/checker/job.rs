//! One torrent's journey through the checker: from raw fast-resume bytes to
//! a `Torrent` ready for `session.torrents`.

use crate::session::peer_record::PeerAddr;
use crate::torrent::runtime::Torrent as TorrentRuntime;
use crate::torrent_parser::torrent::Torrent as TorrentMetadata;

/// One `unfinished` entry from the resume file: a partially-downloaded
/// piece and which of its blocks are done.
#[derive(Debug, Clone)]
pub struct UnfinishedPiece {
    pub piece: usize,
    pub bitmask: Vec<u8>,
    pub adler32: u32,
}

pub struct CheckerJob {
    pub info_hash: [u8; 20],
    pub torrent: TorrentRuntime,
    pub save_path: String,
    pub resume_data: Vec<u8>,
    pub compact: bool,
    pub block_size: u32,

    pub peer_map: Vec<(PeerAddr, u16)>,
    pub piece_map: Vec<i32>,
    pub unfinished_pieces: Vec<UnfinishedPiece>,

    /// True once this job has reached `current` and is being actively
    /// hashed, one step at a time, across loop iterations.
    pub processing: bool,
    /// Set if a `remove_torrent` call raced the checker while this job was
    /// in flight.
    pub abort: bool,
    pub progress: f32,
}

impl CheckerJob {
    pub fn new(
        info_hash: [u8; 20],
        metadata: TorrentMetadata,
        save_path: String,
        resume_data: Vec<u8>,
        compact: bool,
        block_size: u32,
    ) -> Self {
        let total_pieces = metadata.total_pieces() as usize;
        Self {
            info_hash,
            torrent: TorrentRuntime::new(metadata),
            save_path,
            resume_data,
            compact,
            block_size,
            peer_map: Vec::new(),
            piece_map: vec![-2; total_pieces],
            unfinished_pieces: Vec::new(),
            processing: false,
            abort: false,
            progress: 0.0,
        }
    }

    /// A "complete" piece map has a non-negative entry for every piece: no
    /// empty (`-2`) or unknown (`-1`) slots left.
    pub fn piece_map_is_complete(&self) -> bool {
        !self.piece_map.is_empty() && self.piece_map.iter().all(|&slot| slot >= 0)
    }

    pub fn has_live_peers(&self) -> bool {
        self.torrent.num_peers() > 0
    }
}
