//! Full / delta / idle decision per slot.

use super::SlotTable;

/// Limits applied when planning one slot update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmissionPolicy {
    /// Full payloads allowed per update.
    pub full_budget: usize,
    /// Missed acks before a full payload is re-sent.
    pub ack_retry_threshold: u32,
}

impl Default for TransmissionPolicy {
    fn default() -> Self {
        Self {
            full_budget: 3,
            ack_retry_threshold: 5,
        }
    }
}

/// What to write for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transmission {
    Empty,
    Unchanged,
    /// Vehicle state of the player.
    Delta(u32),
    /// Identity blobs and vehicle state of the player.
    Full(u32),
}

impl Transmission {
    pub fn is_full(&self) -> bool {
        matches!(self, Transmission::Full(_))
    }
}

/// Decide what each slot carries in the update going out as `seq`, and
/// record the sends on the slots.
///
/// `revision_of` yields the current vehicle revision of a player, or `None`
/// if the player is gone; such slots render empty until the next retarget
/// drops them.
pub fn plan_transmissions(
    table: &mut SlotTable,
    seq: u16,
    policy: TransmissionPolicy,
    revision_of: impl Fn(u32) -> Option<u64>,
) -> Vec<Transmission> {
    let mut fulls_sent = 0;
    let mut plan = Vec::with_capacity(table.capacity());

    for slot in table.iter_mut() {
        let Some(slot) = slot else {
            plan.push(Transmission::Empty);
            continue;
        };
        let Some(revision) = revision_of(slot.player) else {
            plan.push(Transmission::Empty);
            continue;
        };

        let transmission = if slot.has_sent_full
            && slot.acked
            && slot.last_sent_revision == Some(revision)
        {
            Transmission::Unchanged
        } else if fulls_sent >= policy.full_budget {
            Transmission::Delta(slot.player)
        } else if !slot.has_sent_full {
            slot.has_sent_full = true;
            slot.acked = false;
            slot.pending_seq = seq;
            fulls_sent += 1;
            Transmission::Full(slot.player)
        } else if slot.acked || slot.missed_acks < policy.ack_retry_threshold {
            Transmission::Delta(slot.player)
        } else {
            slot.missed_acks = 0;
            slot.pending_seq = seq;
            fulls_sent += 1;
            Transmission::Full(slot.player)
        };

        if transmission != Transmission::Unchanged {
            slot.last_sent_revision = Some(revision);
        }
        plan.push(transmission);
    }

    plan
}
