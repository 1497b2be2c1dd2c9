pub mod checker;
pub mod config;
pub mod peer;
pub mod peer_id;
pub mod selector;
pub mod session;
pub mod torrent;
pub mod torrent_parser;
pub mod tracker;
