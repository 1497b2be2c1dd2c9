//! Readiness multiplexor over a set of sockets: reports readable/writable/
//! error batches within a timeout. Backed by `mio`.

use std::collections::HashMap;
use std::io;
use std::time::Duration;

use mio::event::Source;
use mio::{Events, Interest, Poll, Token};

/// Identity a `Selector` hands back in `wait()`'s batches. Reactor code maps
/// this to a `ConnId`/socket the same way it maps a raw fd anywhere else.
pub type SelectorToken = usize;

#[derive(Debug, Default, Clone, Copy)]
struct Monitored {
    readable: bool,
    writable: bool,
    errors: bool,
}

impl Monitored {
    fn interest(&self) -> Option<Interest> {
        match (self.readable, self.writable) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }
}

/// Three disjoint batches returned by a single `wait()` call.
#[derive(Debug, Default)]
pub struct ReadyBatches {
    pub readable: Vec<SelectorToken>,
    pub writable: Vec<SelectorToken>,
    pub errored: Vec<SelectorToken>,
}

/// Non-blocking readiness multiplexor. One `Selector` per reactor.
pub struct Selector {
    poll: Poll,
    events: Events,
    monitored: HashMap<SelectorToken, Monitored>,
}

impl Selector {
    pub fn new(events_capacity: usize) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(events_capacity),
            monitored: HashMap::new(),
        })
    }

    /// Registers `source` under `token` with no interests monitored yet.
    pub fn add<S: Source + ?Sized>(&mut self, token: SelectorToken, source: &mut S) -> io::Result<()> {
        self.monitored.insert(token, Monitored::default());
        // mio requires at least one interest at registration time; errors
        // alone aren't an `Interest` variant, so register readable and
        // immediately drop back to the caller's actual desired state.
        self.poll
            .registry()
            .register(source, Token(token), Interest::READABLE)?;
        self.monitored.get_mut(&token).unwrap().readable = false;
        Ok(())
    }

    pub fn remove<S: Source + ?Sized>(&mut self, token: SelectorToken, source: &mut S) -> io::Result<()> {
        self.monitored.remove(&token);
        self.poll.registry().deregister(source)
    }

    pub fn monitor_readability<S: Source + ?Sized>(
        &mut self,
        token: SelectorToken,
        source: &mut S,
    ) -> io::Result<()> {
        self.set_interest(token, source, |m| m.readable = true)
    }

    pub fn monitor_writability<S: Source + ?Sized>(
        &mut self,
        token: SelectorToken,
        source: &mut S,
    ) -> io::Result<()> {
        self.set_interest(token, source, |m| m.writable = true)
    }

    /// mio reports errors unconditionally once registered; this only tracks
    /// the monitored-flag so `is_*_monitored` assertions can be honest about
    /// intent, matching libtorrent's own selector bookkeeping.
    pub fn monitor_errors(&mut self, token: SelectorToken) {
        if let Some(m) = self.monitored.get_mut(&token) {
            m.errors = true;
        }
    }

    pub fn is_readability_monitored(&self, token: SelectorToken) -> bool {
        self.monitored.get(&token).map(|m| m.readable).unwrap_or(false)
    }

    pub fn is_writability_monitored(&self, token: SelectorToken) -> bool {
        self.monitored.get(&token).map(|m| m.writable).unwrap_or(false)
    }

    fn set_interest<S: Source + ?Sized>(
        &mut self,
        token: SelectorToken,
        source: &mut S,
        mutate: impl FnOnce(&mut Monitored),
    ) -> io::Result<()> {
        let entry = self
            .monitored
            .entry(token)
            .or_insert_with(Monitored::default);
        mutate(entry);
        let interest = entry.interest().unwrap_or(Interest::READABLE);
        self.poll.registry().reregister(source, Token(token), interest)
    }

    /// Blocks up to `timeout`, returning the readable/writable/error batches
    /// observed. Classification is derived from what each event reports AND
    /// from what this selector believes it asked for, so a connection never
    /// sees writability it didn't request.
    pub fn wait(&mut self, timeout: Duration) -> io::Result<ReadyBatches> {
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {
                return Ok(ReadyBatches::default())
            }
            Err(e) => return Err(e),
        }

        let mut batches = ReadyBatches::default();
        for event in self.events.iter() {
            let token = event.token().0;
            let monitored = self.monitored.get(&token).copied().unwrap_or_default();

            if event.is_error() || event.is_read_closed() || event.is_write_closed() {
                if monitored.errors {
                    batches.errored.push(token);
                }
                continue;
            }
            if event.is_readable() && monitored.readable {
                batches.readable.push(token);
            }
            if event.is_writable() && monitored.writable {
                batches.writable.push(token);
            }
        }
        Ok(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::net::{TcpListener, TcpStream};

    #[test]
    fn connect_is_observed_as_writable() {
        let mut selector = Selector::new(16).unwrap();

        let mut listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        selector.add(1, &mut listener).unwrap();
        selector.monitor_readability(1, &mut listener).unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        selector.add(2, &mut client).unwrap();
        selector.monitor_writability(2, &mut client).unwrap();

        assert!(selector.is_writability_monitored(2));
        assert!(!selector.is_readability_monitored(2));

        let batches = selector.wait(Duration::from_millis(500)).unwrap();
        assert!(batches.writable.contains(&2) || batches.readable.contains(&1));
    }

    #[test]
    fn removed_token_is_no_longer_monitored() {
        let mut selector = Selector::new(16).unwrap();
        let mut listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        selector.add(1, &mut listener).unwrap();
        selector.monitor_readability(1, &mut listener).unwrap();
        assert!(selector.is_readability_monitored(1));

        selector.remove(1, &mut listener).unwrap();
        assert!(!selector.is_readability_monitored(1));
    }
}
