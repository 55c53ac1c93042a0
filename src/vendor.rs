//! Minimal production adapters for the collaborator traits in
//! [`crate::collaborators`] (spec §6.2).
//!
//! The real BUP container format, GPT on-disk layout parsing, SMD/VER
//! partition encodings, and SoC-detection mechanism are vendor-proprietary
//! and explicitly out of scope (spec §1). These adapters wire the core
//! against a real Linux host using only what is genuinely standardized —
//! GPT partition lookup and the `/dev/disk/by-partlabel` directory — plus
//! a small textual BUP index convention documented in DESIGN.md, so the
//! binary links and runs end-to-end. A deployment against the real vendor
//! BUP/GPT/SMD/VER libraries replaces this module, not the core crate.

use std::fs;
use std::io::{BufRead, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::collaborators::{
    BctValidator, BupEntry, BupReader, ExternalPartition, GptReader, LayoutMatch,
    PartitionDescriptor, PlatformProbe, VerInfoSource, VersionInfo,
};
use crate::error::{Error, Result};
use crate::soc::SocType;

/// Reads a BUP index file: a text header (`boot_device`, `gpt_device`,
/// `tnspec`, `compat_spec`) followed by one `name offset length` line per
/// entry, with the payload bytes stored in an adjacent `.bin` file.
pub struct IndexedBup {
    boot_device: String,
    gpt_device: Option<String>,
    tnspec: String,
    compat_spec: Option<String>,
    entries: Vec<BupEntry>,
    payload: fs::File,
}

impl IndexedBup {
    pub fn open(index_path: &Path) -> Result<Self> {
        let file = fs::File::open(index_path)?;
        let mut boot_device = None;
        let mut gpt_device = None;
        let mut tnspec = None;
        let mut compat_spec = None;
        let mut entries = Vec::new();

        for line in std::io::BufReader::new(file).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(rest) = line.strip_prefix("boot_device ") {
                boot_device = Some(rest.to_string());
            } else if let Some(rest) = line.strip_prefix("gpt_device ") {
                gpt_device = Some(rest.to_string());
            } else if let Some(rest) = line.strip_prefix("tnspec ") {
                tnspec = Some(rest.to_string());
            } else if let Some(rest) = line.strip_prefix("compat_spec ") {
                compat_spec = Some(rest.to_string());
            } else {
                let mut parts = line.split_whitespace();
                let (Some(name), Some(offset), Some(length)) =
                    (parts.next(), parts.next(), parts.next())
                else {
                    return Err(Error::bup_malformed(format!(
                        "malformed BUP index line: {line}"
                    )));
                };
                entries.push(BupEntry {
                    name: name.to_string(),
                    bup_offset: offset
                        .parse()
                        .map_err(|_| Error::bup_malformed("non-numeric bup_offset"))?,
                    byte_length: length
                        .parse()
                        .map_err(|_| Error::bup_malformed("non-numeric byte_length"))?,
                });
            }
        }

        let payload_path = index_path.with_extension("bin");
        let payload = fs::File::open(&payload_path).map_err(|e| {
            Error::bup_malformed(format!(
                "missing BUP payload file {}: {e}",
                payload_path.display()
            ))
        })?;

        Ok(IndexedBup {
            boot_device: boot_device
                .ok_or_else(|| Error::bup_malformed("BUP index missing boot_device"))?,
            gpt_device,
            tnspec: tnspec.ok_or_else(|| Error::bup_malformed("BUP index missing tnspec"))?,
            compat_spec,
            entries,
            payload,
        })
    }
}

impl BupReader for IndexedBup {
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
        self.compat_spec.as_deref()
    }

    fn entries(&self) -> &[BupEntry] {
        &self.entries
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.payload.seek(SeekFrom::Start(offset))?;
        self.payload.read_exact(buf)?;
        Ok(())
    }
}

/// Reads partitions from a pre-loaded GPT entry list. Populating this from
/// an on-disk GPT header/entry-array is the vendor GPT library's job
/// (spec §6.2); this adapter only holds the already-parsed result.
pub struct StaticGpt {
    pub partitions: Vec<PartitionDescriptor>,
    pub layout_match: LayoutMatch,
}

impl GptReader for StaticGpt {
    fn find_by_name(&self, name: &str) -> Option<PartitionDescriptor> {
        self.partitions.iter().find(|p| p.name == name).cloned()
    }

    fn layout_config_match(&self) -> LayoutMatch {
        self.layout_match
    }
}

/// Platform policy backed by an explicit SoC type plus the host's
/// by-partlabel directory for external-partition resolution.
pub struct LinuxPlatform {
    pub soc: SocType,
    pub by_label_dir: PathBuf,
    pub required_partitions: Vec<String>,
}

impl PlatformProbe for LinuxPlatform {
    fn soc_type(&self) -> SocType {
        self.soc
    }

    fn set_bootdev_writeable_status(&self, path: &str, writeable: bool) -> Result<bool> {
        let metadata = fs::metadata(path)?;
        let was_readonly = metadata.permissions().readonly();
        let mut perms = metadata.permissions();
        perms.set_readonly(!writeable);
        fs::set_permissions(path, perms)?;
        Ok(!was_readonly)
    }

    fn partition_should_be_present(&self, name: &str) -> bool {
        self.required_partitions.iter().any(|n| n == name)
    }

    fn resolve_by_label(&self, name: &str) -> Option<ExternalPartition> {
        let path = self.by_label_dir.join(name);
        let mut file = fs::File::open(&path).ok()?;
        let byte_length = file.seek(SeekFrom::End(0)).ok()?;
        Some(ExternalPartition {
            path: path.to_string_lossy().into_owned(),
            byte_length,
        })
    }
}

/// File-backed SMD: two bytes, `[redundancy_level, active_slot]`, in a
/// sidecar file. The real SMD partition encoding is vendor-private (spec
/// §6.2); this is a placeholder a production build replaces.
pub struct FileSmd {
    path: PathBuf,
    slot: u32,
    level: crate::collaborators::RedundancyLevel,
}

impl FileSmd {
    pub fn load(path: PathBuf) -> Result<Self> {
        use crate::collaborators::RedundancyLevel;

        let (level, slot) = match fs::read(&path) {
            Ok(bytes) if bytes.len() >= 2 => {
                let level = if bytes[0] == 1 {
                    RedundancyLevel::Full
                } else {
                    RedundancyLevel::Partial
                };
                (level, bytes[1] as u32)
            }
            _ => (RedundancyLevel::Partial, 0),
        };
        Ok(FileSmd { path, slot, level })
    }
}

impl crate::collaborators::Smd for FileSmd {
    fn current_slot(&self) -> u32 {
        self.slot
    }

    fn redundancy_level(&self) -> crate::collaborators::RedundancyLevel {
        self.level
    }

    fn set_redundancy_level(&mut self, level: crate::collaborators::RedundancyLevel) -> Result<()> {
        self.level = level;
        Ok(())
    }

    fn mark_slot_active(&mut self, slot: u32) -> Result<()> {
        self.slot = slot;
        Ok(())
    }

    fn persist(&mut self) -> Result<()> {
        let level_byte = match self.level {
            crate::collaborators::RedundancyLevel::Full => 1,
            crate::collaborators::RedundancyLevel::Partial => 0,
        };
        fs::write(&self.path, [level_byte, self.slot as u8])?;
        Ok(())
    }
}

/// A VER extractor for the `{u16 major, u16 minor, u16 maint, u32 crc}`
/// little-endian layout.
pub struct LittleEndianVer;

impl VerInfoSource for LittleEndianVer {
    fn extract_info(&self, bytes: &[u8]) -> Result<VersionInfo> {
        if bytes.len() < 10 {
            return Err(Error::bup_malformed("VER payload shorter than 10 bytes"));
        }
        let major = u16::from_le_bytes([bytes[0], bytes[1]]);
        let minor = u16::from_le_bytes([bytes[2], bytes[3]]);
        let maint = u16::from_le_bytes([bytes[4], bytes[5]]);
        let crc = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        Ok(VersionInfo {
            major,
            minor,
            maint,
            crc,
        })
    }
}

/// A BCT validator that only checks the candidate is non-empty and, for
/// the G1 variant, that it already carries the caller-supplied geometry.
/// The real `bct_update_valid_t18x/_t19x/_t21x` checks are vendor-private
/// (spec §6.2); this is a placeholder a production build replaces.
pub struct PermissiveBctValidator {
    pub g1_block_size: u64,
    pub g1_page_size: u64,
}

impl BctValidator for PermissiveBctValidator {
    fn valid_t18x_or_t19x(&self, _current: Option<&[u8]>, new: &[u8]) -> bool {
        !new.is_empty()
    }

    fn valid_t21x(&self, _current: Option<&[u8]>, new: &[u8]) -> Option<(u64, u64)> {
        if new.is_empty() {
            None
        } else {
            Some((self.g1_block_size, self.g1_page_size))
        }
    }
}
