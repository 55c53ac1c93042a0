//! Executor (spec §4.7): streams each worklist entry's bytes from the BUP
//! into a content buffer, compares with current partition content, and
//! writes only on mismatch (except BCT, which uses its own compare path).

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom};

use crate::bct::{self, BctPassState};
use crate::blockio::{read_exact_at, write_exact_at, BlockHandle};
use crate::collaborators::BctValidator;
use crate::error::{Error, Result};
use crate::partition::{DeviceSelector, ResolvedPartition};
use crate::planner::UpdateEntry;
use crate::soc::Platform;

/// The two boot-device handles, opened once for the program's lifetime
/// (spec §5).
pub struct BootDevices<H> {
    pub primary: H,
    pub secondary: Option<H>,
}

impl<H: BlockHandle> BootDevices<H> {
    fn handle(&mut self, selector: DeviceSelector) -> Result<&mut H> {
        match selector {
            DeviceSelector::Primary => Ok(&mut self.primary),
            DeviceSelector::Secondary => self
                .secondary
                .as_mut()
                .ok_or_else(|| Error::internal("secondary boot device required but absent")),
        }
    }
}

/// Per-entry outcome, used for dry-run reporting and invariant tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Written,
    Skipped,
    DryRun,
}

/// Executes one ordered worklist (spec §4.7).
pub struct Executor<'a, H: BlockHandle> {
    pub devices: &'a mut BootDevices<H>,
    pub platform: Platform,
    pub validator: &'a dyn BctValidator,
    pub dry_run: bool,
    pub bct_state: BctPassState,
    pub bct_updated: bool,
}

impl<'a, H: BlockHandle> Executor<'a, H> {
    pub fn new(
        devices: &'a mut BootDevices<H>,
        platform: Platform,
        validator: &'a dyn BctValidator,
        dry_run: bool,
    ) -> Self {
        Executor {
            devices,
            platform,
            validator,
            dry_run,
            bct_state: BctPassState::default(),
            bct_updated: false,
        }
    }

    /// Runs the full ordered worklist, reading each entry's payload from
    /// `bup` via `read_entry`.
    pub fn run(
        &mut self,
        worklist: &[UpdateEntry],
        mut read_entry: impl FnMut(u64, &mut [u8]) -> Result<()>,
        initializing: bool,
    ) -> Result<Vec<ExecOutcome>> {
        let mut outcomes = Vec::with_capacity(worklist.len());
        for entry in worklist {
            let mut content = vec![0u8; entry.byte_length as usize];
            read_entry(entry.bup_offset, &mut content)?;
            outcomes.push(self.execute_one(entry, &content, initializing)?);
        }
        Ok(outcomes)
    }

    /// Executes one additional entry outside the planned worklist: the
    /// "other" mb1 copy, rewritten after a BCT update regardless of
    /// whether the BUP itself named it (spec §4.6 "mb1_other", §8
    /// invariant 8).
    pub fn execute_other_mb1(
        &mut self,
        entry: &UpdateEntry,
        content: &[u8],
        initializing: bool,
    ) -> Result<ExecOutcome> {
        self.execute_one(entry, content, initializing)
    }

    fn execute_one(
        &mut self,
        entry: &UpdateEntry,
        content: &[u8],
        initializing: bool,
    ) -> Result<ExecOutcome> {
        if self.dry_run {
            log::info!("[OK] (dry run) {}", entry.partition_name);
            return Ok(ExecOutcome::DryRun);
        }

        match &entry.location {
            ResolvedPartition::Bound {
                selector,
                byte_offset,
                byte_length,
            } => {
                if content.len() as u64 > *byte_length {
                    return Err(Error::size_overflow(format!(
                        "BUP contents too large for boot partition {}",
                        entry.partition_name
                    )));
                }

                let selector = *selector;
                let byte_offset = *byte_offset;
                let byte_length = *byte_length;

                if entry.partition_name == "BCT" {
                    return self.write_bct(selector, byte_offset, byte_length, content, initializing);
                }

                let mut current = vec![0u8; byte_length as usize];
                {
                    let handle = self.devices.handle(selector)?;
                    read_exact_at(handle, &mut current, byte_length as usize, byte_offset)?;
                }

                if current[..content.len()] == *content {
                    log::debug!("{} already up to date, skipping", entry.partition_name);
                    return Ok(ExecOutcome::Skipped);
                }

                let handle = self.devices.handle(selector)?;
                write_exact_at(
                    handle,
                    content,
                    content.len(),
                    byte_offset,
                    byte_length as usize,
                )?;
                handle.flush_device()?;
                log::info!("wrote {}", entry.partition_name);
                Ok(ExecOutcome::Written)
            }
            ResolvedPartition::External(ext) => {
                if content.len() as u64 > ext.byte_length {
                    return Err(Error::size_overflow(format!(
                        "BUP contents too large for external partition {}",
                        entry.partition_name
                    )));
                }
                let mut file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(&ext.path)?;
                let size = file.seek(SeekFrom::End(0))?;
                write_exact_at(&mut file, content, content.len(), 0, size as usize)?;
                file.flush_device()?;
                log::info!("wrote external partition {} at {}", entry.partition_name, ext.path);
                Ok(ExecOutcome::Written)
            }
        }
    }

    fn write_bct(
        &mut self,
        selector: DeviceSelector,
        byte_offset: u64,
        byte_length: u64,
        content: &[u8],
        initializing: bool,
    ) -> Result<ExecOutcome> {
        let medium = self.platform.medium;

        let current = if initializing {
            None
        } else {
            let mut buf = vec![0u8; byte_length as usize];
            let handle = self.devices.handle(selector)?;
            read_exact_at(handle, &mut buf, byte_length as usize, byte_offset)?;
            Some(buf)
        };

        let wrote = if self.platform.soc.is_ab() {
            let handle = self.devices.handle(selector)?;
            bct::write_g2g3(
                handle,
                byte_offset,
                current.as_deref(),
                content,
                medium,
                self.validator,
            )?
        } else {
            let handle = self.devices.handle(selector)?;
            bct::write_g1(
                handle,
                byte_offset,
                byte_length,
                current.as_deref(),
                content,
                medium,
                self.validator,
                &mut self.bct_state,
            )?
        };

        if wrote {
            self.bct_updated = true;
        }
        Ok(if wrote {
            ExecOutcome::Written
        } else {
            ExecOutcome::Skipped
        })
    }
}
