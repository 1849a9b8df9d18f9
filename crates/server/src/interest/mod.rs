//! Interest management: which nearby players each viewer sees, and what
//! each of its slots carries per update.
//!
//! Per viewer, a recompute selects the nearest ready players
//! ([`select_nearest`]) and moves the [`SlotTable`] toward that set one
//! side of the diff at a time. Every slot update then runs
//! [`plan_transmissions`] to pick empty / unchanged / delta / full per slot.

mod policy;
mod select;
mod slots;

pub use policy::{Transmission, TransmissionPolicy, plan_transmissions};
pub use select::{Candidate, select_nearest};
pub use slots::{DiffApplied, Slot, SlotDiff, SlotTable};
