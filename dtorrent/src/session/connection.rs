//! One active TCP attempt/session with a peer.
//!
//! Frames with `peer::handshake::Handshake` and `peer::peer_message::Message`,
//! the same wire formats the protocol always used; this module only adds
//! the buffering a non-blocking socket needs, since a single `write`/`read`
//! call is no longer guaranteed to move every byte.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mio::net::TcpStream;

use crate::peer::handshake::Handshake;
use crate::peer::peer_message::message::{Message, MessageId};

use super::conn_table::ConnId;

const HANDSHAKE_LEN: usize = 68;
const LENGTH_PREFIX_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Queued,
    Connecting,
    Established,
    PendingDisconnect,
}

#[derive(Debug)]
pub enum ConnectionError {
    /// Disk/storage failure surfaced through this connection; the owning
    /// torrent must be paused.
    File(io::Error),
    /// Protocol or socket failure local to this one peer; drop the
    /// connection and keep the torrent running.
    Peer(io::Error),
}

/// One TCP connection to a peer, in one of the four lifecycle states a
/// reactor iteration moves it through.
pub struct Connection {
    id: Option<ConnId>,
    state: ConnState,
    stream: Option<TcpStream>,
    peer_ip: String,
    peer_port: u16,
    info_hash: [u8; 20],
    local_peer_id: [u8; 20],
    remote_peer_id: Option<Vec<u8>>,
    incoming: bool,
    handshake_sent: bool,
    handshake_received: bool,
    send_buf: VecDeque<u8>,
    recv_buf: Vec<u8>,
    last_activity: Instant,
    failed: bool,
}

impl Connection {
    /// A fresh outbound connection, not yet initiating the TCP handshake.
    pub fn new_queued(info_hash: [u8; 20], peer_ip: String, peer_port: u16) -> Self {
        Self {
            id: None,
            state: ConnState::Queued,
            stream: None,
            peer_ip,
            peer_port,
            info_hash,
            local_peer_id: [0; 20],
            remote_peer_id: None,
            incoming: false,
            handshake_sent: false,
            handshake_received: false,
            send_buf: VecDeque::new(),
            recv_buf: Vec::new(),
            last_activity: Instant::now(),
            failed: false,
        }
    }

    /// An already-accepted inbound connection; starts in `Established`.
    pub fn from_accepted(stream: TcpStream, addr: SocketAddr, info_hash: [u8; 20]) -> Self {
        Self {
            id: None,
            state: ConnState::Established,
            stream: Some(stream),
            peer_ip: addr.ip().to_string(),
            peer_port: addr.port(),
            info_hash,
            local_peer_id: [0; 20],
            remote_peer_id: None,
            incoming: true,
            handshake_sent: false,
            handshake_received: false,
            send_buf: VecDeque::new(),
            recv_buf: Vec::new(),
            last_activity: Instant::now(),
            failed: false,
        }
    }

    pub fn set_id(&mut self, id: ConnId) {
        self.id = Some(id);
    }

    pub fn id(&self) -> Option<ConnId> {
        self.id
    }

    pub fn set_local_peer_id(&mut self, peer_id: [u8; 20]) {
        self.local_peer_id = peer_id;
    }

    /// Begins the outbound TCP handshake. Moves `Queued` -> `Connecting`.
    pub fn connect(&mut self) -> io::Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.peer_ip, self.peer_port)
            .parse()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad peer address"))?;
        let stream = TcpStream::connect(addr)?;
        self.stream = Some(stream);
        self.state = ConnState::Connecting;
        Ok(())
    }

    /// Called by the session when writability is first observed after
    /// `connect()`. Moves `Connecting` -> `Established` and queues the
    /// handshake as the first outbound bytes.
    pub fn connection_complete(&mut self) -> Result<(), ConnectionError> {
        if let Some(stream) = &self.stream {
            if let Some(err) = stream.take_error().map_err(ConnectionError::Peer)? {
                return Err(ConnectionError::Peer(err));
            }
        }
        self.state = ConnState::Established;
        let handshake = Handshake::new(self.info_hash.to_vec(), self.local_peer_id.to_vec());
        self.send_buf.extend(handshake.as_bytes());
        self.handshake_sent = true;
        Ok(())
    }

    pub fn queue_handshake_reply(&mut self) {
        if self.handshake_sent {
            return;
        }
        let handshake = Handshake::new(self.info_hash.to_vec(), self.local_peer_id.to_vec());
        self.send_buf.extend(handshake.as_bytes());
        self.handshake_sent = true;
    }

    pub fn queue_message(&mut self, id: MessageId, payload: Vec<u8>) {
        self.send_buf.extend(Message::new(id, payload).as_bytes());
    }

    pub fn keep_alive(&mut self) {
        self.send_buf.extend(0u32.to_be_bytes());
    }

    /// Drains as much of the outbound buffer as the socket accepts right
    /// now. A `WouldBlock` simply means "try again next iteration", not a
    /// failure.
    pub fn send_data(&mut self) -> Result<(), ConnectionError> {
        let stream = match &mut self.stream {
            Some(s) => s,
            None => return Ok(()),
        };
        while !self.send_buf.is_empty() {
            let chunk: Vec<u8> = self.send_buf.iter().copied().collect();
            match stream.write(&chunk) {
                Ok(0) => {
                    return Err(ConnectionError::Peer(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "peer closed connection",
                    )))
                }
                Ok(n) => {
                    self.send_buf.drain(..n);
                    self.last_activity = Instant::now();
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(ConnectionError::Peer(e)),
            }
        }
        Ok(())
    }

    /// Reads whatever bytes are available and returns every complete frame
    /// decoded so far: the handshake (once, 68 bytes) followed by
    /// length-prefixed messages. Incomplete trailing bytes stay buffered.
    pub fn receive_data(&mut self) -> Result<Vec<ReceivedFrame>, ConnectionError> {
        let stream = match &mut self.stream {
            Some(s) => s,
            None => return Ok(Vec::new()),
        };
        let mut tmp = [0u8; 4096];
        loop {
            match stream.read(&mut tmp) {
                Ok(0) => {
                    return Err(ConnectionError::Peer(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "peer closed connection",
                    )))
                }
                Ok(n) => {
                    self.recv_buf.extend_from_slice(&tmp[..n]);
                    self.last_activity = Instant::now();
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(ConnectionError::Peer(e)),
            }
        }
        self.drain_frames()
    }

    fn drain_frames(&mut self) -> Result<Vec<ReceivedFrame>, ConnectionError> {
        let mut frames = Vec::new();

        if !self.handshake_received {
            if self.recv_buf.len() < HANDSHAKE_LEN {
                return Ok(frames);
            }
            let raw: Vec<u8> = self.recv_buf.drain(..HANDSHAKE_LEN).collect();
            let handshake = Handshake::from_bytes(&raw).map_err(|_| {
                ConnectionError::Peer(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "malformed handshake",
                ))
            })?;
            self.remote_peer_id = Some(handshake.peer_id.clone());
            self.handshake_received = true;
            frames.push(ReceivedFrame::Handshake(handshake));
        }

        loop {
            if self.recv_buf.len() < LENGTH_PREFIX_LEN {
                break;
            }
            let len = u32::from_be_bytes([
                self.recv_buf[0],
                self.recv_buf[1],
                self.recv_buf[2],
                self.recv_buf[3],
            ]) as usize;
            if len == 0 {
                self.recv_buf.drain(..LENGTH_PREFIX_LEN);
                frames.push(ReceivedFrame::KeepAlive);
                continue;
            }
            if self.recv_buf.len() < LENGTH_PREFIX_LEN + len {
                break;
            }
            let frame: Vec<u8> = self
                .recv_buf
                .drain(..LENGTH_PREFIX_LEN + len)
                .skip(LENGTH_PREFIX_LEN)
                .collect();
            let message = Message::from_bytes(&frame).map_err(|_| {
                ConnectionError::Peer(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "malformed message",
                ))
            })?;
            frames.push(ReceivedFrame::Message(message));
        }
        Ok(frames)
    }

    pub fn has_timed_out(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }

    pub fn can_read(&self) -> bool {
        matches!(self.state, ConnState::Established)
    }

    pub fn can_write(&self) -> bool {
        self.is_connecting() || !self.send_buf.is_empty()
    }

    pub fn is_connecting(&self) -> bool {
        self.state == ConnState::Connecting
    }

    pub fn is_disconnecting(&self) -> bool {
        self.state == ConnState::PendingDisconnect
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn mark_pending_disconnect(&mut self) {
        self.state = ConnState::PendingDisconnect;
    }

    pub fn set_failed(&mut self) {
        self.failed = true;
        self.state = ConnState::PendingDisconnect;
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub fn socket_mut(&mut self) -> Option<&mut TcpStream> {
        self.stream.as_mut()
    }

    pub fn associated_torrent(&self) -> [u8; 20] {
        self.info_hash
    }

    pub fn peer_addr(&self) -> (String, u16) {
        (self.peer_ip.clone(), self.peer_port)
    }

    pub fn remote_peer_id(&self) -> Option<&[u8]> {
        self.remote_peer_id.as_deref()
    }

    pub fn is_incoming(&self) -> bool {
        self.incoming
    }
}

#[derive(Debug)]
pub enum ReceivedFrame {
    Handshake(Handshake),
    KeepAlive,
    Message(Message),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_connection_is_neither_reading_nor_writing() {
        let conn = Connection::new_queued([1u8; 20], "127.0.0.1".to_string(), 6881);
        assert!(!conn.can_read());
        assert!(!conn.can_write());
        assert!(!conn.is_connecting());
    }

    #[test]
    fn keep_alive_queues_four_zero_bytes() {
        let mut conn = Connection::new_queued([1u8; 20], "127.0.0.1".to_string(), 6881);
        conn.keep_alive();
        assert_eq!(conn.send_buf.len(), 4);
        assert!(conn.send_buf.iter().all(|&b| b == 0));
    }
}
