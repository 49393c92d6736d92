//! Inbound mailbox validation.
//!
//! Turns the raw per-tick message multiset into a typed
//! [`Intake`](crate::fsm::context::Intake), or reports a transmission
//! failure. The rules are strict: the two readings must arrive exactly
//! once, must be finite, and every pump and pump controller must report
//! exactly once with an index inside the configured range. Anything
//! else means the link to the plant cannot be trusted.

use crate::config::BoilerConfig;
use crate::error::TransmissionError;
use crate::fsm::context::Intake;
use crate::mailbox::{Mailbox, Message, MessageKind};

/// Validate one tick's inbound messages.
pub fn parse(incoming: &Mailbox, config: &BoilerConfig) -> Result<Intake, TransmissionError> {
    let level = match incoming.extract_unique(MessageKind::Level) {
        Some(Message::Level(v)) => *v,
        _ => return Err(TransmissionError::MissingLevel),
    };
    let steam = match incoming.extract_unique(MessageKind::Steam) {
        Some(Message::Steam(v)) => *v,
        _ => return Err(TransmissionError::MissingSteam),
    };
    if !level.is_finite() || !steam.is_finite() {
        return Err(TransmissionError::MalformedReading);
    }

    let pump_state = collect_states(incoming, MessageKind::PumpState, config.pump_count)
        .ok_or(TransmissionError::PumpStateMismatch)?;
    let control_state = collect_states(incoming, MessageKind::PumpControlState, config.pump_count)
        .ok_or(TransmissionError::ControlStateMismatch)?;

    let repairs = incoming
        .iter()
        .filter(|m| {
            matches!(
                m.kind(),
                MessageKind::LevelRepaired
                    | MessageKind::SteamRepaired
                    | MessageKind::PumpRepaired
                    | MessageKind::PumpControlRepaired
            )
        })
        .cloned()
        .collect();
    let acks = incoming
        .iter()
        .filter(|m| {
            matches!(
                m.kind(),
                MessageKind::LevelFailureAcknowledgement
                    | MessageKind::SteamFailureAcknowledgement
                    | MessageKind::PumpFailureAcknowledgement
                    | MessageKind::PumpControlFailureAcknowledgement
            )
        })
        .cloned()
        .collect();

    Ok(Intake {
        boiler_waiting: incoming.count(MessageKind::SteamBoilerWaiting) == 1,
        units_ready: incoming.count(MessageKind::PhysicalUnitsReady) == 1,
        level,
        steam,
        pump_state,
        control_state,
        repairs,
        acks,
    })
}

/// Gather one boolean per pump, rejecting missing, duplicate, or
/// out-of-range indices.
fn collect_states(incoming: &Mailbox, kind: MessageKind, count: usize) -> Option<Vec<bool>> {
    let mut states: Vec<Option<bool>> = vec![None; count];
    for m in incoming.extract_all(kind) {
        let (pump, open) = match m {
            Message::PumpState { pump, open } | Message::PumpControlState { pump, open } => {
                (*pump, *open)
            }
            _ => return None,
        };
        if pump >= count || states[pump].is_some() {
            return None;
        }
        states[pump] = Some(open);
    }
    states.into_iter().collect()
}
