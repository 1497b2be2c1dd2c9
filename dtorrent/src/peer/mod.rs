pub mod bt_peer;
pub mod handshake;
pub mod peer_message;
