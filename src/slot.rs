//! Slot activator (spec §4.8). G2/G3 only; G1 has no slot metadata.

use crate::collaborators::{RedundancyLevel, Smd};
use crate::error::Result;
use crate::planner::Mode;
use crate::soc::{Platform, SocType};

/// Outcome of a slot-activation attempt, for dry-run reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOutcome {
    /// G1, or an explicit `-s` suffix was given: slot metadata untouched.
    NotApplicable,
    Activated { new_slot: u32 },
    DryRun { new_slot: u32 },
}

/// Flips the active slot and raises redundancy to `Full` if needed.
///
/// `initializing` selects slot 0 rather than the flip of the current slot.
/// An explicit `-s` target (`Mode::Update` with a non-empty suffix) skips
/// activation entirely: the caller picked a specific slot to write, not to
/// boot from next.
pub fn activate(
    platform: Platform,
    mode: &Mode,
    smd: &mut dyn Smd,
    dry_run: bool,
) -> Result<SlotOutcome> {
    if platform.soc == SocType::G1 {
        return Ok(SlotOutcome::NotApplicable);
    }

    if let Mode::Update { target_suffix } = mode {
        if !target_suffix.is_empty() {
            return Ok(SlotOutcome::NotApplicable);
        }
    }

    let new_slot = match mode {
        Mode::Initialize => 0,
        Mode::Update { .. } => 1 - smd.current_slot(),
    };

    if dry_run {
        log::info!("[OK] (dry run) activate slot {new_slot}");
        return Ok(SlotOutcome::DryRun { new_slot });
    }

    if smd.redundancy_level() != RedundancyLevel::Full {
        smd.set_redundancy_level(RedundancyLevel::Full)?;
    }
    smd.mark_slot_active(new_slot)?;
    smd.persist()?;

    Ok(SlotOutcome::Activated { new_slot })
}
