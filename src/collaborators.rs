//! Traits for the external collaborators named in spec §6.2.
//!
//! BUP container parsing, GPT read/write, SMD/VER partition content, and
//! SoC-type detection are explicitly out of scope for this crate (§1) —
//! they are "used only through the interfaces named in §6". Rather than
//! threading raw bytes and out-parameters through the planner/executor,
//! each collaborator gets a narrow trait here, the same way the teacher
//! keeps `BlockDevice` a trait boundary instead of a concrete driver type
//! (`kernel/comps/block/src/lib.rs`). Production wiring implements these
//! against the real BUP/GPT/SMD/VER libraries; tests use the in-memory
//! fakes in the `fakes` submodule.

use crate::error::Result;
use crate::soc::SocType;

/// A partition table entry: `{name, first_sector, last_sector}` (spec §3).
/// Sector size is always 512 bytes (spec §6.3); non-mutated by the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDescriptor {
    pub name: String,
    pub first_sector: u64,
    pub last_sector: u64,
}

impl PartitionDescriptor {
    pub fn byte_offset(&self) -> u64 {
        self.first_sector * crate::soc::SECTOR_SIZE
    }

    pub fn byte_size(&self) -> u64 {
        (self.last_sector - self.first_sector + 1) * crate::soc::SECTOR_SIZE
    }
}

/// One entry inside the BUP payload: a named image plus its location
/// within the BUP container and (for VER) an optional parsed version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BupEntry {
    pub name: String,
    pub bup_offset: u64,
    pub byte_length: u64,
}

/// Reads entries and streams payload bytes out of a BUP container.
pub trait BupReader {
    /// Declared boot-device path prefix; used to derive the platform's
    /// boot medium (spec §3).
    fn boot_device(&self) -> &str;

    /// The secondary "GPT device" path, if the BUP declares one.
    fn gpt_device(&self) -> Option<&str>;

    /// Vendor identifier string the BUP declares to describe compatible
    /// hardware.
    fn tnspec(&self) -> &str;

    fn compat_spec(&self) -> Option<&str>;

    /// All entries the BUP contains, in container order.
    fn entries(&self) -> &[BupEntry];

    /// Given the set of partition names required for this TNSPEC, returns
    /// the subset that the BUP does not provide.
    fn find_missing_entries(&self, required: &[&str]) -> Vec<String> {
        let have: std::collections::HashSet<&str> =
            self.entries().iter().map(|e| e.name.as_str()).collect();
        required
            .iter()
            .filter(|name| !have.contains(*name))
            .map(|s| s.to_string())
            .collect()
    }

    /// Reads exactly `buf.len()` payload bytes starting at `offset` within
    /// the BUP container.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;
}

/// Outcome of comparing the on-device GPT against the configured layout
/// (spec §4.9 / §6.2 `layout_config_match`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutMatch {
    Error,
    Mismatch,
    Match,
}

/// Reads the on-device GPT.
pub trait GptReader {
    fn find_by_name(&self, name: &str) -> Option<PartitionDescriptor>;

    fn layout_config_match(&self) -> LayoutMatch;
}

/// Redundancy level recorded in slot metadata (spec §3, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedundancyLevel {
    Full,
    Partial,
}

/// Slot metadata (SMD): opaque on-device record of the active slot and
/// redundancy level. Never touched on G1 (spec invariant 7).
pub trait Smd {
    fn current_slot(&self) -> u32;

    fn redundancy_level(&self) -> RedundancyLevel;

    fn set_redundancy_level(&mut self, level: RedundancyLevel) -> Result<()>;

    fn mark_slot_active(&mut self, slot: u32) -> Result<()>;

    fn persist(&mut self) -> Result<()>;
}

/// `{bsp_version (packed major.minor.maint), crc}` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub major: u16,
    pub minor: u16,
    pub maint: u16,
    pub crc: u32,
}

impl VersionInfo {
    /// `bsp_version` is nonzero iff at least one of major/minor/maint is
    /// nonzero (spec §4.5 gate outcome 1).
    pub fn is_nonzero(&self) -> bool {
        self.major != 0 || self.minor != 0 || self.maint != 0
    }

    /// Compares `bsp_version` only, ignoring `crc`. The gate's equality
    /// checks (spec §4.5 outcomes 1 and 3) compare versions, not checksums;
    /// `crc` is only ever compared directly against another `crc` (the NVC
    /// check a few lines below those outcomes), never folded into a
    /// version-equality test.
    pub fn bsp_version_eq(&self, other: &Self) -> bool {
        (self.major, self.minor, self.maint) == (other.major, other.minor, other.maint)
    }
}

impl PartialOrd for VersionInfo {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionInfo {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.major, self.minor, self.maint).cmp(&(other.major, other.minor, other.maint))
    }
}

/// Parses a VER partition/entry's raw bytes into a [`VersionInfo`].
pub trait VerInfoSource {
    fn extract_info(&self, bytes: &[u8]) -> Result<VersionInfo>;
}

/// External BCT candidate validators (spec §4.4, §6.2).
pub trait BctValidator {
    /// `bct_update_valid_t18x`/`_t19x`: accepts or rejects a candidate BCT
    /// for the G2/G3 three-slot scheme.
    fn valid_t18x_or_t19x(&self, current: Option<&[u8]>, new: &[u8]) -> bool;

    /// `bct_update_valid_t21x`: accepts or rejects a candidate BCT for the
    /// G1 64-copy scheme, returning the validator-supplied `(block_size,
    /// page_size)` on success.
    fn valid_t21x(&self, current: Option<&[u8]>, new: &[u8]) -> Option<(u64, u64)>;
}

/// A partition resolved to a writable block device outside the two boot
/// devices (spec §4.2 step 2), e.g. an `/dev/disk/by-partlabel/<name>`
/// entry on a Linux host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalPartition {
    pub path: String,
    pub byte_length: u64,
}

/// SoC detection and OS-level device/partition policy hooks (spec §6.2
/// "Platform").
pub trait PlatformProbe {
    fn soc_type(&self) -> SocType;

    /// Toggles OS-level writeability of a boot device path, returning the
    /// prior state so callers can restore it.
    fn set_bootdev_writeable_status(&self, path: &str, writeable: bool) -> Result<bool>;

    /// Whether a partition's absence from the BUP/GPT is tolerable (spec
    /// §4.2 step 3).
    fn partition_should_be_present(&self, name: &str) -> bool;

    /// Resolves `name` via the OS-provided by-partition-label directory,
    /// if a writable entry for it exists (spec §4.2 step 2).
    fn resolve_by_label(&self, name: &str) -> Option<ExternalPartition>;
}

/// CRC-32 over a byte range, used to compare redundant NVC copies (spec
/// §4.5). Backed by the `crc` crate's standard IEEE polynomial, the same
/// checksum family the corpus's GPT/partition-table readers use for
/// header/entry-array validation.
pub struct Crc32;

impl Crc32 {
    pub fn checksum(data: &[u8]) -> u32 {
        const CRC: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);
        CRC.checksum(data)
    }
}

#[cfg(test)]
pub mod fakes {
    //! In-memory fakes for the collaborator traits, used by planner,
    //! executor, orchestrator, and scenario tests. Grounded in the
    //! teacher's own test-double style (e.g. `kernel/comps/mlsdisk`'s
    //! in-memory block backends under `#[cfg(test)]`).

    use super::*;
    use std::collections::HashMap;

    pub struct FakeBup {
        pub boot_device: String,
        pub gpt_device: Option<String>,
        pub tnspec: String,
        pub entries: Vec<BupEntry>,
        pub payload: Vec<u8>,
    }

    impl BupReader for FakeBup {
        fn boot_device(&self) -> &str {
            &self.boot_device
        }

        fn gpt_device(&self) -> Option<&str> {
            self.gpt_device.as_deref()
        }

        fn tnspec(&self) -> &str {
            &self.tnspec
        }

        fn compat_spec(&self) -> Option<&str> {
            None
        }

        fn entries(&self) -> &[BupEntry] {
            &self.entries
        }

        fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
            let start = offset as usize;
            let end = start + buf.len();
            if end > self.payload.len() {
                return Err(crate::error::Error::io("read past end of BUP payload"));
            }
            buf.copy_from_slice(&self.payload[start..end]);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeGpt {
        pub partitions: HashMap<String, PartitionDescriptor>,
        pub layout_match: Option<LayoutMatch>,
    }

    impl GptReader for FakeGpt {
        fn find_by_name(&self, name: &str) -> Option<PartitionDescriptor> {
            self.partitions.get(name).cloned()
        }

        fn layout_config_match(&self) -> LayoutMatch {
            self.layout_match.unwrap_or(LayoutMatch::Match)
        }
    }

    pub struct FakeSmd {
        pub slot: u32,
        pub level: RedundancyLevel,
        pub persisted: bool,
    }

    impl Smd for FakeSmd {
        fn current_slot(&self) -> u32 {
            self.slot
        }

        fn redundancy_level(&self) -> RedundancyLevel {
            self.level
        }

        fn set_redundancy_level(&mut self, level: RedundancyLevel) -> Result<()> {
            self.level = level;
            Ok(())
        }

        fn mark_slot_active(&mut self, slot: u32) -> Result<()> {
            self.slot = slot;
            Ok(())
        }

        fn persist(&mut self) -> Result<()> {
            self.persisted = true;
            Ok(())
        }
    }

    pub struct AcceptingBctValidator;

    impl BctValidator for AcceptingBctValidator {
        fn valid_t18x_or_t19x(&self, _current: Option<&[u8]>, _new: &[u8]) -> bool {
            true
        }

        fn valid_t21x(&self, _current: Option<&[u8]>, _new: &[u8]) -> Option<(u64, u64)> {
            Some((32_768, 2048))
        }
    }

    pub struct FakePlatform {
        pub soc: SocType,
    }

    impl PlatformProbe for FakePlatform {
        fn soc_type(&self) -> SocType {
            self.soc
        }

        fn set_bootdev_writeable_status(&self, _path: &str, writeable: bool) -> Result<bool> {
            Ok(!writeable)
        }

        fn partition_should_be_present(&self, _name: &str) -> bool {
            false
        }

        fn resolve_by_label(&self, _name: &str) -> Option<ExternalPartition> {
            None
        }
    }
}
