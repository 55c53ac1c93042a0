//! Partition resolver (spec §4.2).

use crate::collaborators::{ExternalPartition, GptReader, PlatformProbe};
use crate::error::{Error, Result};

/// Which of the two boot devices a bound partition lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSelector {
    /// The primary boot device (`boot_fd`).
    Primary,
    /// The secondary "GPT device" (`gpt_fd`), used only when a partition's
    /// byte offset is at or past the end of the primary device.
    Secondary,
}

/// A partition resolved to a concrete location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedPartition {
    /// Lives inside one of the two boot devices.
    Bound {
        selector: DeviceSelector,
        byte_offset: u64,
        byte_length: u64,
    },
    /// A writable external block device reached through the by-label
    /// directory.
    External(ExternalPartition),
}

/// Resolves `name` to a location per the three-step rule in spec §4.2.
/// Returns `Ok(None)` when the partition is absent but declared optional
/// by [`PlatformProbe::partition_should_be_present`].
pub fn resolve(
    name: &str,
    gpt: &dyn GptReader,
    platform: &dyn PlatformProbe,
    primary_size: u64,
    has_secondary: bool,
) -> Result<Option<ResolvedPartition>> {
    if let Some(part) = gpt.find_by_name(name) {
        let mut byte_offset = part.byte_offset();
        let byte_length = part.byte_size();

        let selector = if byte_offset < primary_size {
            DeviceSelector::Primary
        } else if has_secondary {
            byte_offset -= primary_size;
            DeviceSelector::Secondary
        } else {
            return Err(Error::internal(format!(
                "partition {name} lies past the primary boot device but no GPT device is present"
            )));
        };

        return Ok(Some(ResolvedPartition::Bound {
            selector,
            byte_offset,
            byte_length,
        }));
    }

    if let Some(external) = platform.resolve_by_label(name) {
        return Ok(Some(ResolvedPartition::External(external)));
    }

    if platform.partition_should_be_present(name) {
        return Err(Error::partition_missing(format!(
            "required partition {name} not found in GPT or by-label directory"
        )));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fakes::{FakeGpt, FakePlatform};
    use crate::collaborators::PartitionDescriptor;
    use crate::soc::SocType;

    fn gpt_with(name: &str, first_sector: u64, last_sector: u64) -> FakeGpt {
        let mut gpt = FakeGpt::default();
        gpt.partitions.insert(
            name.to_string(),
            PartitionDescriptor {
                name: name.to_string(),
                first_sector,
                last_sector,
            },
        );
        gpt
    }

    #[test]
    fn resolves_to_primary_when_offset_within_primary_device() {
        let gpt = gpt_with("BCT", 0, 127);
        let platform = FakePlatform { soc: SocType::G2 };
        let resolved = resolve("BCT", &gpt, &platform, 1 << 30, true).unwrap().unwrap();
        assert_eq!(
            resolved,
            ResolvedPartition::Bound {
                selector: DeviceSelector::Primary,
                byte_offset: 0,
                byte_length: 128 * 512,
            }
        );
    }

    #[test]
    fn resolves_to_secondary_and_subtracts_primary_size() {
        let primary_size = 1024u64;
        // first_sector chosen so byte_offset (sector*512) exceeds primary_size.
        let gpt = gpt_with("mb2", 4, 4 + 9);
        let platform = FakePlatform { soc: SocType::G2 };
        let resolved = resolve("mb2", &gpt, &platform, primary_size, true)
            .unwrap()
            .unwrap();
        match resolved {
            ResolvedPartition::Bound {
                selector,
                byte_offset,
                ..
            } => {
                assert_eq!(selector, DeviceSelector::Secondary);
                assert_eq!(byte_offset, 4 * 512 - primary_size);
            }
            _ => panic!("expected bound partition"),
        }
    }

    #[test]
    fn fatal_when_past_primary_and_no_secondary_device() {
        let gpt = gpt_with("mb2", 4, 13);
        let platform = FakePlatform { soc: SocType::G2 };
        let err = resolve("mb2", &gpt, &platform, 1024, false).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
    }

    #[test]
    fn falls_back_to_by_label_then_optional_skip() {
        let gpt = FakeGpt::default();
        let platform = FakePlatform { soc: SocType::G1 };
        // Neither GPT nor by-label, and not required => None.
        assert!(resolve("EKS", &gpt, &platform, 1 << 20, false)
            .unwrap()
            .is_none());
    }
}
