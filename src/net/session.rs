use std::fmt;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::game::constants::arena::MAX_PLAYERS;
use crate::game::constants::net::OUTBOUND_QUEUE_DEPTH;
use crate::game::state::{PlayerColor, SlotIndex};

/// Identifies one transport connection for its whole lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Instruction for a connection's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    /// Finish the stream and close the connection
    Close,
}

/// What happened to one queued record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Queue full, the record was discarded
    Dropped,
    /// Writer is gone
    Closed,
}

/// Session-side handle to a connection: its id plus a bounded,
/// non-blocking outbound queue drained by the transport
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    outbound: mpsc::Sender<Outbound>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, outbound: mpsc::Sender<Outbound>) -> Self {
        Self { id, outbound }
    }

    /// Handle plus the receiving end, for the transport writer or tests
    pub fn channel() -> (Self, mpsc::Receiver<Outbound>) {
        Self::with_depth(OUTBOUND_QUEUE_DEPTH)
    }

    pub fn with_depth(depth: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(depth);
        (Self::new(ConnectionId::new(), tx), rx)
    }

    /// Queue a record without waiting on a slow reader
    pub fn send(&self, text: impl Into<String>) -> Delivery {
        match self.outbound.try_send(Outbound::Text(text.into())) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Ask the writer to finish. A full queue still ends the stream once
    /// every handle is dropped. Returns false if the connection is gone.
    pub fn close(&self) -> bool {
        !matches!(
            self.outbound.try_send(Outbound::Close),
            Err(TrySendError::Closed(_))
        )
    }
}

/// One occupied player slot
#[derive(Debug, Clone)]
pub struct PlayerSlot {
    pub index: SlotIndex,
    pub color: PlayerColor,
    pub connection: ConnectionHandle,
    /// Client has sent CONFIRMED and receives updates
    pub confirmed: bool,
}

/// Result of a join attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinResult {
    Joined(SlotIndex),
    Full,
}

/// Per-broadcast delivery counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub queued: usize,
    pub dropped: usize,
}

/// The four player slots of a session
#[derive(Debug, Default)]
pub struct SessionManager {
    slots: [Option<PlayerSlot>; MAX_PLAYERS],
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lowest free slot for `connection`
    pub fn join(&mut self, connection: ConnectionHandle) -> JoinResult {
        if let Some(existing) = self.slot_of(connection.id) {
            return JoinResult::Joined(existing);
        }

        let Some(index) = self.slots.iter().position(Option::is_none) else {
            return JoinResult::Full;
        };
        let Some(color) = PlayerColor::for_slot(index) else {
            return JoinResult::Full;
        };

        self.slots[index] = Some(PlayerSlot {
            index,
            color,
            connection,
            confirmed: false,
        });
        JoinResult::Joined(index)
    }

    /// Mark the slot ready. Returns true when this confirm took the
    /// ready count from zero to one.
    pub fn confirm(&mut self, index: SlotIndex) -> bool {
        let was_idle = self.confirmed_count() == 0;
        let Some(slot) = self.slots.get_mut(index).and_then(Option::as_mut) else {
            return false;
        };
        if slot.confirmed {
            return false;
        }
        slot.confirmed = true;
        was_idle
    }

    /// Free the slot and return what occupied it
    pub fn leave(&mut self, index: SlotIndex) -> Option<PlayerSlot> {
        self.slots.get_mut(index)?.take()
    }

    pub fn slot(&self, index: SlotIndex) -> Option<&PlayerSlot> {
        self.slots.get(index)?.as_ref()
    }

    pub fn slot_of(&self, id: ConnectionId) -> Option<SlotIndex> {
        self.slots
            .iter()
            .flatten()
            .find(|slot| slot.connection.id == id)
            .map(|slot| slot.index)
    }

    /// Occupied slot count
    pub fn population(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn confirmed_count(&self) -> usize {
        self.slots.iter().flatten().filter(|s| s.confirmed).count()
    }

    /// Send to every confirmed slot
    pub fn broadcast(&self, text: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for slot in self.slots.iter().flatten().filter(|slot| slot.confirmed) {
            match slot.connection.send(text) {
                Delivery::Queued => report.queued += 1,
                Delivery::Dropped => report.dropped += 1,
                Delivery::Closed => {}
            }
        }
        report
    }

    pub fn send_to(&self, index: SlotIndex, text: &str) -> Delivery {
        self.slot(index)
            .map(|slot| slot.connection.send(text))
            .unwrap_or(Delivery::Closed)
    }

    pub fn slots(&self) -> impl Iterator<Item = &PlayerSlot> {
        self.slots.iter().flatten()
    }
}
