//! Orchestration (spec §2.10, §5): wires the version gate, planner,
//! executor, and slot activator together, owns the device handles and the
//! OS-writeable toggle, and resolves the `mb1_other` guard (§9).

use std::io::Read;

use crate::blockio::{read_exact_at, BlockHandle};
use crate::cli::Config;
use crate::collaborators::{BctValidator, BupReader, GptReader, PlatformProbe, Smd, VerInfoSource, VersionInfo};
use crate::error::{Error, Result};
use crate::executor::{BootDevices, ExecOutcome, Executor};
use crate::partition::{self, DeviceSelector, ResolvedPartition};
use crate::planner::{self, is_mb1, Mode};
use crate::redundancy::redundant_name;
use crate::repartition::{self, RepartitionCheck};
use crate::slot::{self, SlotOutcome};
use crate::soc::Platform;
use crate::version_gate::{self, OnDeviceVersions};

/// Restores a boot device's prior OS-level writeable status on drop, no
/// matter how the update run exits (spec §5).
struct WriteableGuard<'a> {
    platform_probe: &'a dyn PlatformProbe,
    path: String,
    prior_writeable: bool,
}

impl<'a> WriteableGuard<'a> {
    fn acquire(platform_probe: &'a dyn PlatformProbe, path: &str) -> Result<Self> {
        let prior_writeable = platform_probe.set_bootdev_writeable_status(path, true)?;
        Ok(WriteableGuard {
            platform_probe,
            path: path.to_string(),
            prior_writeable,
        })
    }
}

impl Drop for WriteableGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self
            .platform_probe
            .set_bootdev_writeable_status(&self.path, self.prior_writeable)
        {
            log::error!("failed to restore writeable status of {}: {e}", self.path);
        }
    }
}

/// Result of a full update run.
pub struct UpdateOutcome {
    pub exec_outcomes: Vec<ExecOutcome>,
    pub slot_outcome: SlotOutcome,
    pub gate_warned: bool,
}

/// Owns the device handles and collaborator references for one program
/// invocation (spec §9 "carry these as explicit fields of an orchestration
/// object... exactly one instance for the program's lifetime").
pub struct Orchestrator<'a, H> {
    pub platform: Platform,
    pub devices: BootDevices<H>,
    pub gpt: &'a dyn GptReader,
    pub platform_probe: &'a dyn PlatformProbe,
    pub validator: &'a dyn BctValidator,
    pub ver_source: &'a dyn VerInfoSource,
    pub smd: &'a mut dyn Smd,
    pub primary_size: u64,
}

impl<'a, H: BlockHandle> Orchestrator<'a, H> {
    /// The `-N` flow (spec §4.9): never opens for writing, never plans.
    pub fn check_repartition(&self) -> RepartitionCheck {
        repartition::check(self.platform.soc, self.gpt)
    }

    /// The normal plan-and-apply flow (spec §4.5 through §4.8).
    pub fn run_update(&mut self, bup: &mut dyn BupReader, config: &Config) -> Result<UpdateOutcome> {
        let boot_device_path = bup.boot_device().to_string();
        let _guard = WriteableGuard::acquire(self.platform_probe, &boot_device_path)?;

        let has_secondary = bup.gpt_device().is_some();
        // G1 is always treated as initialize; `-i` on G2/G3 additionally
        // permits a forced pass through the version gate (spec §6.1).
        let force_initialize =
            self.platform.soc == crate::soc::SocType::G1 || matches!(config.mode, Mode::Initialize);

        let gate_outcome = self.run_version_gate(bup, has_secondary, force_initialize)?;
        if gate_outcome.warn {
            log::warn!("version gate passed only because initialization was forced");
        }

        let plan = planner::plan(
            self.platform,
            &config.mode,
            bup.entries(),
            self.gpt,
            self.platform_probe,
            self.primary_size,
            has_secondary,
        )?;

        let initializing = matches!(config.mode, Mode::Initialize);
        let mut exec = Executor::new(&mut self.devices, self.platform, self.validator, config.dry_run);
        let mut exec_outcomes = exec.run(
            &plan.worklist,
            |offset, buf| bup.read_at(offset, buf),
            initializing,
        )?;

        if exec.bct_updated && !initializing {
            if let Some(target) = plan.worklist.iter().find(|e| is_mb1(&e.partition_name)) {
                match &plan.mb1_other {
                    Some(other_location) => {
                        let other_entry = crate::planner::UpdateEntry {
                            partition_name: format!("{} (other copy)", target.partition_name),
                            location: other_location.clone(),
                            bup_offset: target.bup_offset,
                            byte_length: target.byte_length,
                            class: target.class,
                        };
                        let mut content = vec![0u8; other_entry.byte_length as usize];
                        bup.read_at(other_entry.bup_offset, &mut content)?;
                        exec_outcomes.push(exec.execute_other_mb1(&other_entry, &content, initializing)?);
                    }
                    None => {
                        return Err(Error::partition_missing(
                            "the other mb1 copy could not be resolved after a BCT update",
                        ));
                    }
                }
            }
        }

        let slot_outcome = slot::activate(self.platform, &config.mode, self.smd, config.dry_run)?;

        Ok(UpdateOutcome {
            exec_outcomes,
            slot_outcome,
            gate_warned: gate_outcome.warn,
        })
    }

    fn run_version_gate(
        &mut self,
        bup: &mut dyn BupReader,
        has_secondary: bool,
        force_initialize: bool,
    ) -> Result<version_gate::GateOutcome> {
        let payload_version = match bup.entries().iter().find(|e| e.name == "VER") {
            Some(entry) => {
                let mut buf = vec![0u8; entry.byte_length as usize];
                bup.read_at(entry.bup_offset, &mut buf)?;
                self.ver_source.extract_info(&buf).ok()
            }
            None => None,
        };

        let primary_ver = self.read_ver_partition("VER", has_secondary)?;
        let ver_b_name = redundant_name(self.platform, "VER");
        let redundant_ver = self.read_ver_partition(&ver_b_name, has_secondary)?;

        let nvc_primary = self
            .read_full_partition("NVC", has_secondary)?
            .unwrap_or_default();
        let nvc_b_name = redundant_name(self.platform, "NVC");
        let nvc_redundant = self
            .read_full_partition(&nvc_b_name, has_secondary)?
            .unwrap_or_default();

        let on_device = OnDeviceVersions {
            primary: primary_ver,
            redundant: redundant_ver,
        };

        version_gate::check(
            payload_version,
            &on_device,
            &nvc_primary,
            &nvc_redundant,
            force_initialize,
        )
    }

    fn read_ver_partition(&mut self, name: &str, has_secondary: bool) -> Result<Option<VersionInfo>> {
        let Some(resolved) = self.resolve(name, has_secondary)? else {
            return Ok(None);
        };
        match self.read_resolved(&resolved) {
            Ok(bytes) => Ok(self.ver_source.extract_info(&bytes).ok()),
            Err(_) => Ok(None),
        }
    }

    fn read_full_partition(&mut self, name: &str, has_secondary: bool) -> Result<Option<Vec<u8>>> {
        let Some(resolved) = self.resolve(name, has_secondary)? else {
            return Ok(None);
        };
        self.read_resolved(&resolved).map(Some)
    }

    fn resolve(&self, name: &str, has_secondary: bool) -> Result<Option<ResolvedPartition>> {
        partition::resolve(
            name,
            self.gpt,
            self.platform_probe,
            self.primary_size,
            has_secondary,
        )
    }

    fn read_resolved(&mut self, resolved: &ResolvedPartition) -> Result<Vec<u8>> {
        match resolved {
            ResolvedPartition::Bound {
                selector,
                byte_offset,
                byte_length,
            } => {
                let mut buf = vec![0u8; *byte_length as usize];
                let handle = match selector {
                    DeviceSelector::Primary => &mut self.devices.primary,
                    DeviceSelector::Secondary => self
                        .devices
                        .secondary
                        .as_mut()
                        .ok_or_else(|| Error::internal("secondary boot device required but absent"))?,
                };
                read_exact_at(handle, &mut buf, *byte_length as usize, *byte_offset)?;
                Ok(buf)
            }
            ResolvedPartition::External(ext) => {
                let mut file = std::fs::File::open(&ext.path)?;
                let mut buf = vec![0u8; ext.byte_length as usize];
                file.read_exact(&mut buf)?;
                Ok(buf)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fakes::{
        AcceptingBctValidator, FakeGpt, FakePlatform, FakeSmd,
    };
    use crate::collaborators::{BupEntry, PartitionDescriptor, RedundancyLevel};
    use crate::soc::{BootMedium, SocType};
    use std::io::Cursor;

    struct FakeVerSource;
    impl VerInfoSource for FakeVerSource {
        fn extract_info(&self, bytes: &[u8]) -> Result<VersionInfo> {
            if bytes.len() < 2 {
                return Err(Error::internal("short VER payload"));
            }
            Ok(VersionInfo {
                major: 35,
                minor: bytes[0] as u16,
                maint: bytes[1] as u16,
                crc: 0,
            })
        }
    }

    struct FakeBup {
        boot_device: String,
        entries: Vec<BupEntry>,
        payload: Vec<u8>,
    }
    impl BupReader for FakeBup {
        fn boot_device(&self) -> &str {
            &self.boot_device
        }
        fn gpt_device(&self) -> Option<&str> {
            None
        }
        fn tnspec(&self) -> &str {
            "test"
        }
        fn compat_spec(&self) -> Option<&str> {
            None
        }
        fn entries(&self) -> &[BupEntry] {
            &self.entries
        }
        fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
            let start = offset as usize;
            buf.copy_from_slice(&self.payload[start..start + buf.len()]);
            Ok(())
        }
    }

    fn desc(name: &str, first: u64, last: u64) -> PartitionDescriptor {
        PartitionDescriptor {
            name: name.to_string(),
            first_sector: first,
            last_sector: last,
        }
    }

    #[test]
    fn clean_update_flips_slot_and_reports_no_warning() {
        let mut gpt = FakeGpt::default();
        for (i, n) in ["mb2", "mb2_b", "BCT", "mb1", "mb1_b"].into_iter().enumerate() {
            gpt.partitions
                .insert(n.to_string(), desc(n, (i as u64) * 200, (i as u64) * 200 + 63));
        }
        let platform_probe = FakePlatform { soc: SocType::G2 };
        let validator = AcceptingBctValidator;
        let ver_source = FakeVerSource;
        let mut smd = FakeSmd {
            slot: 0,
            level: RedundancyLevel::Full,
            persisted: false,
        };

        {
            let mut orch = Orchestrator {
                platform: Platform::new(SocType::G2, BootMedium::EmmcOrSd),
                devices: BootDevices {
                    primary: Cursor::new(vec![0u8; 1 << 20]),
                    secondary: None,
                },
                gpt: &gpt,
                platform_probe: &platform_probe,
                validator: &validator,
                ver_source: &ver_source,
                smd: &mut smd,
                primary_size: 1 << 30,
            };

            let mut bup = FakeBup {
                boot_device: "/dev/boot0".to_string(),
                entries: vec![
                    BupEntry {
                        name: "mb2".to_string(),
                        bup_offset: 0,
                        byte_length: 8,
                    },
                    BupEntry {
                        name: "BCT".to_string(),
                        bup_offset: 8,
                        byte_length: 8,
                    },
                    BupEntry {
                        name: "mb1".to_string(),
                        bup_offset: 16,
                        byte_length: 8,
                    },
                ],
                payload: vec![0xABu8; 24],
            };

            let mode = Mode::Update {
                target_suffix: String::new(),
            };
            let config = Config {
                bup_package_path: "/tmp/bup.bin".into(),
                mode,
                dry_run: false,
                needs_repartition: false,
            };

            let outcome = orch.run_update(&mut bup, &config).unwrap();
            assert!(!outcome.gate_warned);
            assert_eq!(outcome.slot_outcome, SlotOutcome::Activated { new_slot: 1 });
        }
        assert_eq!(smd.slot, 1);
    }
}
