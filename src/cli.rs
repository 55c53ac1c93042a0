//! Command-line interface (spec §6.1).

use std::path::PathBuf;

use clap::Parser;

use crate::error::{Error, Result};
use crate::planner::Mode;

/// Plans and applies an in-place bootloader-partition update from a vendor
/// BUP package.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the BUP package to apply.
    pub bup_package_path: PathBuf,

    /// Initialize all redundant partitions from scratch instead of
    /// updating in place.
    #[arg(short = 'i', long, default_value_t = false)]
    pub initialize: bool,

    /// Target one slot explicitly (`_a` or `_b`, G2/G3 only) instead of
    /// flipping the inactive slot.
    #[arg(short = 's', long, value_name = "SUFFIX")]
    pub slot_suffix: Option<String>,

    /// Plan the update and report what would happen without writing
    /// anything.
    #[arg(short = 'n', long, default_value_t = false)]
    pub dry_run: bool,

    /// Compare the on-device partition layout against the BUP's configured
    /// layout and exit; implies `--dry-run`. See spec §4.9 for the exit
    /// code meaning.
    #[arg(short = 'N', long, default_value_t = false)]
    pub needs_repartition: bool,
}

/// The resolved, validated configuration derived from `Args` (spec §6.1
/// flag-combination rules).
pub struct Config {
    pub bup_package_path: PathBuf,
    pub mode: Mode,
    pub dry_run: bool,
    pub needs_repartition: bool,
}

impl Args {
    /// Validates flag combinations and normalizes `-s` (spec §6.1: `-i`
    /// and `-s` are mutually exclusive; `-N` forces dry-run; `_a` is
    /// normalized to the empty suffix).
    pub fn into_config(self) -> Result<Config> {
        if self.initialize && self.slot_suffix.is_some() {
            return Err(Error::configuration(
                "--initialize and --slot-suffix are mutually exclusive",
            ));
        }

        let mode = if self.initialize {
            Mode::Initialize
        } else {
            let target_suffix = match self.slot_suffix.as_deref() {
                None | Some("_a") => String::new(),
                Some("_b") => "_b".to_string(),
                Some(other) => {
                    return Err(Error::configuration(format!(
                        "--slot-suffix must be _a or _b, got {other}"
                    )))
                }
            };
            Mode::Update { target_suffix }
        };

        Ok(Config {
            bup_package_path: self.bup_package_path,
            mode,
            dry_run: self.dry_run || self.needs_repartition,
            needs_repartition: self.needs_repartition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(initialize: bool, slot_suffix: Option<&str>, needs_repartition: bool) -> Args {
        Args {
            bup_package_path: PathBuf::from("/tmp/bup.bin"),
            initialize,
            slot_suffix: slot_suffix.map(String::from),
            dry_run: false,
            needs_repartition,
        }
    }

    #[test]
    fn initialize_and_slot_suffix_are_mutually_exclusive() {
        let err = args(true, Some("_b"), false).into_config().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn slot_suffix_a_normalizes_to_empty() {
        let config = args(false, Some("_a"), false).into_config().unwrap();
        assert_eq!(
            config.mode,
            Mode::Update {
                target_suffix: String::new()
            }
        );
    }

    #[test]
    fn invalid_slot_suffix_is_rejected() {
        let err = args(false, Some("_c"), false).into_config().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn needs_repartition_implies_dry_run() {
        let config = args(false, None, true).into_config().unwrap();
        assert!(config.dry_run);
        assert!(config.needs_repartition);
    }
}
