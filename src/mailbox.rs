//! Typed per-tick message exchange with the physical units.
//!
//! A [`Mailbox`] is an ordered multiset of tagged messages. The driver
//! hands the controller a read-only inbound box and a write-only
//! outbound box on every tick; neither is retained across ticks.
//!
//! Storage is a fixed-capacity `heapless::Vec` — per-tick traffic is
//! bounded (two readings, two reports per pump, and a handful of
//! handshake messages), so [`MAILBOX_CAPACITY`] leaves generous room.

use log::error;

// ---------------------------------------------------------------------------
// Wire mode report
// ---------------------------------------------------------------------------

/// Mode announced to the plant in the per-tick MODE message.
///
/// The wire protocol does not distinguish the two start-up states:
/// both WAITING and READY report `Initialisation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeReport {
    Initialisation,
    Normal,
    Degraded,
    Rescue,
    EmergencyStop,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Every message the controller can receive from or send to the plant.
///
/// Pump indices count from zero. Readings are litres (level) and
/// litres/second (steam).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    // -- Inbound: start-up handshake --
    SteamBoilerWaiting,
    PhysicalUnitsReady,

    // -- Inbound: sensor readings --
    Level(f64),
    Steam(f64),
    PumpState { pump: usize, open: bool },
    PumpControlState { pump: usize, open: bool },

    // -- Inbound: repair handshake --
    LevelRepaired,
    SteamRepaired,
    PumpRepaired(usize),
    PumpControlRepaired(usize),
    LevelFailureAcknowledgement,
    SteamFailureAcknowledgement,
    PumpFailureAcknowledgement(usize),
    PumpControlFailureAcknowledgement(usize),

    // -- Outbound: mode and start-up --
    Mode(ModeReport),
    ProgramReady,

    // -- Outbound: actuator commands --
    OpenPump(usize),
    ClosePump(usize),
    /// Toggle the evacuation valve. Not idempotent: every emission
    /// inverts the physical valve, so the controller tracks the open
    /// bit itself.
    Valve,

    // -- Outbound: failure reporting --
    LevelFailureDetection,
    SteamFailureDetection,
    PumpFailureDetection(usize),
    PumpControlFailureDetection(usize),
    LevelRepairedAcknowledgement,
    SteamRepairedAcknowledgement,
    PumpRepairedAcknowledgement(usize),
    PumpControlRepairedAcknowledgement(usize),
}

/// Fieldless discriminant of [`Message`], used to extract by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    SteamBoilerWaiting,
    PhysicalUnitsReady,
    Level,
    Steam,
    PumpState,
    PumpControlState,
    LevelRepaired,
    SteamRepaired,
    PumpRepaired,
    PumpControlRepaired,
    LevelFailureAcknowledgement,
    SteamFailureAcknowledgement,
    PumpFailureAcknowledgement,
    PumpControlFailureAcknowledgement,
    Mode,
    ProgramReady,
    OpenPump,
    ClosePump,
    Valve,
    LevelFailureDetection,
    SteamFailureDetection,
    PumpFailureDetection,
    PumpControlFailureDetection,
    LevelRepairedAcknowledgement,
    SteamRepairedAcknowledgement,
    PumpRepairedAcknowledgement,
    PumpControlRepairedAcknowledgement,
}

impl Message {
    /// The discriminant of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::SteamBoilerWaiting => MessageKind::SteamBoilerWaiting,
            Self::PhysicalUnitsReady => MessageKind::PhysicalUnitsReady,
            Self::Level(_) => MessageKind::Level,
            Self::Steam(_) => MessageKind::Steam,
            Self::PumpState { .. } => MessageKind::PumpState,
            Self::PumpControlState { .. } => MessageKind::PumpControlState,
            Self::LevelRepaired => MessageKind::LevelRepaired,
            Self::SteamRepaired => MessageKind::SteamRepaired,
            Self::PumpRepaired(_) => MessageKind::PumpRepaired,
            Self::PumpControlRepaired(_) => MessageKind::PumpControlRepaired,
            Self::LevelFailureAcknowledgement => MessageKind::LevelFailureAcknowledgement,
            Self::SteamFailureAcknowledgement => MessageKind::SteamFailureAcknowledgement,
            Self::PumpFailureAcknowledgement(_) => MessageKind::PumpFailureAcknowledgement,
            Self::PumpControlFailureAcknowledgement(_) => {
                MessageKind::PumpControlFailureAcknowledgement
            }
            Self::Mode(_) => MessageKind::Mode,
            Self::ProgramReady => MessageKind::ProgramReady,
            Self::OpenPump(_) => MessageKind::OpenPump,
            Self::ClosePump(_) => MessageKind::ClosePump,
            Self::Valve => MessageKind::Valve,
            Self::LevelFailureDetection => MessageKind::LevelFailureDetection,
            Self::SteamFailureDetection => MessageKind::SteamFailureDetection,
            Self::PumpFailureDetection(_) => MessageKind::PumpFailureDetection,
            Self::PumpControlFailureDetection(_) => MessageKind::PumpControlFailureDetection,
            Self::LevelRepairedAcknowledgement => MessageKind::LevelRepairedAcknowledgement,
            Self::SteamRepairedAcknowledgement => MessageKind::SteamRepairedAcknowledgement,
            Self::PumpRepairedAcknowledgement(_) => MessageKind::PumpRepairedAcknowledgement,
            Self::PumpControlRepairedAcknowledgement(_) => {
                MessageKind::PumpControlRepairedAcknowledgement
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Mailbox
// ---------------------------------------------------------------------------

/// Upper bound on messages per tick. Two readings plus two reports per
/// pump plus the repair handshake stays well below this for any
/// realistic pump count.
pub const MAILBOX_CAPACITY: usize = 64;

/// Ordered multiset of tagged messages exchanged in one tick.
#[derive(Debug, Default, Clone)]
pub struct Mailbox {
    messages: heapless::Vec<Message, MAILBOX_CAPACITY>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message. A full mailbox drops the message and logs;
    /// overflow indicates a driver bug, not a recoverable condition.
    pub fn send(&mut self, message: Message) {
        if self.messages.push(message).is_err() {
            error!("mailbox full ({MAILBOX_CAPACITY}), dropping message");
        }
    }

    /// The single message of the given kind, or `None` when there are
    /// zero or several matches. Required readings arrive exactly once
    /// per tick; anything else is a transmission failure.
    pub fn extract_unique(&self, kind: MessageKind) -> Option<&Message> {
        let mut found = None;
        for m in self.messages.iter() {
            if m.kind() == kind {
                if found.is_some() {
                    return None;
                }
                found = Some(m);
            }
        }
        found
    }

    /// All messages of the given kind, in arrival order.
    pub fn extract_all(&self, kind: MessageKind) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.kind() == kind)
    }

    /// Number of messages of the given kind.
    pub fn count(&self, kind: MessageKind) -> usize {
        self.extract_all(kind).count()
    }

    /// Whether at least one message of the given kind is present.
    pub fn contains(&self, kind: MessageKind) -> bool {
        self.extract_all(kind).next().is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
