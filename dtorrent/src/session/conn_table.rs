//! Generation-counted handles into the reactor's connection collections.
//!
//! Peer records keep a weak, non-owning back-pointer to an attached
//! `Connection` (spec'd in §3/§9 of the design this mirrors). A raw index
//! would dangle once a slot is reused; a generation counter lets a stale
//! `ConnId` be detected instead of silently aliasing the wrong connection.

use super::connection::Connection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId {
    index: usize,
    generation: u64,
}

impl ConnId {
    /// The slab index, doubling as the `mio` token / selector identity for
    /// this connection's socket.
    pub fn token(&self) -> usize {
        self.index
    }
}

struct Slot {
    generation: u64,
    connection: Option<Connection>,
}

/// Owns every `Connection` the reactor currently knows about, indexed by
/// `ConnId`. Insertion reuses the lowest free slot so token churn stays
/// bounded instead of growing without end.
#[derive(Default)]
pub struct ConnTable {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl ConnTable {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn insert(&mut self, connection: Connection) -> ConnId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.generation += 1;
            slot.connection = Some(connection);
            return ConnId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len();
        self.slots.push(Slot {
            generation: 0,
            connection: Some(connection),
        });
        ConnId {
            index,
            generation: 0,
        }
    }

    pub fn remove(&mut self, id: ConnId) -> Option<Connection> {
        let slot = self.slots.get_mut(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        let connection = slot.connection.take();
        if connection.is_some() {
            self.free.push(id.index);
        }
        connection
    }

    pub fn get(&self, id: ConnId) -> Option<&Connection> {
        let slot = self.slots.get(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.connection.as_ref()
    }

    pub fn get_mut(&mut self, id: ConnId) -> Option<&mut Connection> {
        let slot = self.slots.get_mut(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.connection.as_mut()
    }

    /// Reconstructs a live `ConnId` from a raw selector token, used when the
    /// reactor only has the bare `usize` a readiness batch handed back.
    pub fn id_for_token(&self, token: usize) -> Option<ConnId> {
        let slot = self.slots.get(token)?;
        if slot.connection.is_none() {
            return None;
        }
        Some(ConnId {
            index: token,
            generation: slot.generation,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConnId, &Connection)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.connection.as_ref().map(|c| {
                (
                    ConnId {
                        index,
                        generation: slot.generation,
                    },
                    c,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ConnId, &mut Connection)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.connection
                .as_mut()
                .map(|c| (ConnId { index, generation }, c))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::connection::Connection;

    #[test]
    fn reused_slot_gets_a_new_generation() {
        let mut table = ConnTable::new();
        let a = table.insert(Connection::new_queued([0u8; 20], "127.0.0.1".to_string(), 6881));
        assert!(table.get(a).is_some());

        table.remove(a);
        assert!(table.get(a).is_none());

        let b = table.insert(Connection::new_queued([0u8; 20], "127.0.0.1".to_string(), 6881));
        assert_eq!(a.token(), b.token());
        assert!(table.get(a).is_none());
        assert!(table.get(b).is_some());
    }
}
