//! Repartition-needed check (spec §4.9): read-only comparison of the
//! on-device GPT against the BUP's configured layout. Never writes
//! anything; used by the `-N` flag, which implies dry-run.

use crate::collaborators::{GptReader, LayoutMatch};
use crate::soc::SocType;

/// Process exit code for `-N`, per spec §4.9/§7: 0 means a repartition is
/// needed, 1 means the layout already matches, 2 means the comparison
/// itself failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepartitionCheck {
    Needed,
    NotNeeded,
    ComparisonFailed,
}

impl RepartitionCheck {
    pub fn exit_code(self) -> i32 {
        match self {
            RepartitionCheck::Needed => 0,
            RepartitionCheck::NotNeeded => 1,
            RepartitionCheck::ComparisonFailed => 2,
        }
    }
}

/// G1 has no concept of a configured GPT layout separate from its fixed
/// partition table, so a repartition is unconditionally reported as not
/// needed.
pub fn check(soc: SocType, gpt: &dyn GptReader) -> RepartitionCheck {
    if soc == SocType::G1 {
        return RepartitionCheck::NotNeeded;
    }

    match gpt.layout_config_match() {
        LayoutMatch::Match => RepartitionCheck::NotNeeded,
        LayoutMatch::Mismatch => RepartitionCheck::Needed,
        LayoutMatch::Error => RepartitionCheck::ComparisonFailed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fakes::FakeGpt;

    fn gpt_with(layout_match: LayoutMatch) -> FakeGpt {
        FakeGpt {
            layout_match: Some(layout_match),
            ..Default::default()
        }
    }

    #[test]
    fn g1_never_needs_repartitioning() {
        let gpt = gpt_with(LayoutMatch::Mismatch);
        assert_eq!(check(SocType::G1, &gpt), RepartitionCheck::NotNeeded);
    }

    #[test]
    fn matching_layout_reports_not_needed() {
        let gpt = gpt_with(LayoutMatch::Match);
        assert_eq!(check(SocType::G2, &gpt), RepartitionCheck::NotNeeded);
        assert_eq!(RepartitionCheck::NotNeeded.exit_code(), 1);
    }

    #[test]
    fn mismatched_layout_reports_needed() {
        let gpt = gpt_with(LayoutMatch::Mismatch);
        assert_eq!(check(SocType::G3, &gpt), RepartitionCheck::Needed);
        assert_eq!(RepartitionCheck::Needed.exit_code(), 0);
    }

    #[test]
    fn comparison_error_is_distinct_from_mismatch() {
        let gpt = gpt_with(LayoutMatch::Error);
        assert_eq!(
            check(SocType::G2, &gpt),
            RepartitionCheck::ComparisonFailed
        );
        assert_eq!(RepartitionCheck::ComparisonFailed.exit_code(), 2);
    }
}
