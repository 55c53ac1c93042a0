//! Entry planner (spec §4.6).
//!
//! Builds the ordered worklist the executor consumes: walks BUP entries,
//! classifies each as redundant or non-redundant, matches against the
//! partition table, and orders the result per SoC rules. Per §9 Design
//! Notes, this keeps a single list with a per-entry `class` flag instead
//! of the source's two parallel lists.

use std::collections::HashMap;

use crate::collaborators::{BupEntry, GptReader, PlatformProbe};
use crate::error::{Error, Result};
use crate::partition::{self, ResolvedPartition};
use crate::redundancy::redundant_name;
use crate::soc::{Platform, SocType};

/// Maximum entries per classification bucket before merging (spec §4.6).
const MAX_LIST: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedundancyClass {
    Redundant,
    NonRedundant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEntry {
    pub partition_name: String,
    pub location: ResolvedPartition,
    pub bup_offset: u64,
    pub byte_length: u64,
    pub class: RedundancyClass,
}

/// Update target, derived from CLI flags (spec §6.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Initialize,
    /// `target_suffix` is `""` or `"_b"` (G2/G3 only).
    Update { target_suffix: String },
}

pub struct PlanResult {
    pub worklist: Vec<UpdateEntry>,
    /// The non-target mb1 copy's resolved location, tracked so the
    /// executor can rewrite both mb1 copies when the BCT changes (spec
    /// §4.6, §9 "mb1_other" open question): its absence is fatal only if
    /// a BCT write actually occurred this run.
    pub mb1_other: Option<ResolvedPartition>,
}

struct Ctx<'a> {
    platform: Platform,
    mode: &'a Mode,
    gpt: &'a dyn GptReader,
    platform_probe: &'a dyn PlatformProbe,
    primary_size: u64,
    has_secondary: bool,
}

/// Builds and orders the worklist for `bup_entries`.
pub fn plan(
    platform: Platform,
    mode: &Mode,
    bup_entries: &[BupEntry],
    gpt: &dyn GptReader,
    platform_probe: &dyn PlatformProbe,
    primary_size: u64,
    has_secondary: bool,
) -> Result<PlanResult> {
    let ctx = Ctx {
        platform,
        mode,
        gpt,
        platform_probe,
        primary_size,
        has_secondary,
    };

    let mut redundant = Vec::new();
    let mut nonredundant = Vec::new();
    let mut mb1_other = None;

    for entry in bup_entries {
        classify(&ctx, entry, &mut redundant, &mut nonredundant, &mut mb1_other)?;
    }

    if redundant.len() > MAX_LIST || nonredundant.len() > MAX_LIST {
        return Err(Error::bup_malformed(
            "BUP declares more than 64 redundant or non-redundant entries",
        ));
    }

    let input_count = redundant.len() + nonredundant.len();

    let worklist = if platform.soc == SocType::G1 {
        redundant.extend(nonredundant);
        nonredundant = Vec::new();
        order_g1(platform, redundant)?
    } else {
        order_g2g3(redundant, nonredundant)
    };

    // §9 open question: the source warns, not fails, on a count mismatch.
    if worklist.len() != input_count {
        log::warn!(
            "planner produced {} entries from {} classified inputs",
            worklist.len(),
            input_count
        );
    }

    Ok(PlanResult {
        worklist,
        mb1_other,
    })
}

fn classify(
    ctx: &Ctx,
    entry: &BupEntry,
    redundant: &mut Vec<UpdateEntry>,
    nonredundant: &mut Vec<UpdateEntry>,
    mb1_other: &mut Option<ResolvedPartition>,
) -> Result<()> {
    let name = &entry.name;
    let name_b = redundant_name(ctx.platform, name);

    let part = partition::resolve(
        name,
        ctx.gpt,
        ctx.platform_probe,
        ctx.primary_size,
        ctx.has_secondary,
    )?;

    let Some(part) = part else {
        return classify_external(ctx, entry, &name_b, redundant, nonredundant);
    };

    let part_b = partition::resolve(
        &name_b,
        ctx.gpt,
        ctx.platform_probe,
        ctx.primary_size,
        ctx.has_secondary,
    )?;

    match ctx.mode {
        Mode::Initialize => {
            if part_b.is_some() || name == "BCT" {
                redundant.push(UpdateEntry {
                    partition_name: name.clone(),
                    location: part,
                    bup_offset: entry.bup_offset,
                    byte_length: entry.byte_length,
                    class: RedundancyClass::Redundant,
                });
                if let Some(part_b) = part_b {
                    redundant.push(UpdateEntry {
                        partition_name: name_b,
                        location: part_b,
                        bup_offset: entry.bup_offset,
                        byte_length: entry.byte_length,
                        class: RedundancyClass::Redundant,
                    });
                }
            } else {
                nonredundant.push(UpdateEntry {
                    partition_name: name.clone(),
                    location: part,
                    bup_offset: entry.bup_offset,
                    byte_length: entry.byte_length,
                    class: RedundancyClass::NonRedundant,
                });
            }
        }
        Mode::Update { target_suffix } if ctx.platform.soc != SocType::G1 => {
            if part_b.is_some() || name == "BCT" {
                // mb2 is the one partition BCT's descriptor references by a
                // fixed physical location (spec §4.6 ordering rationale:
                // "BCT describes mb2"), so unlike every other redundant
                // partition it is never subject to single-target selection:
                // both copies are written every time, regardless of which
                // slot is targeted.
                if name == "mb2" {
                    redundant.push(UpdateEntry {
                        partition_name: name.clone(),
                        location: part.clone(),
                        bup_offset: entry.bup_offset,
                        byte_length: entry.byte_length,
                        class: RedundancyClass::Redundant,
                    });
                    if let Some(part_b) = part_b.clone() {
                        redundant.push(UpdateEntry {
                            partition_name: name_b.clone(),
                            location: part_b,
                            bup_offset: entry.bup_offset,
                            byte_length: entry.byte_length,
                            class: RedundancyClass::Redundant,
                        });
                    }
                    return Ok(());
                }

                // VER records the system's current bsp_version; it is
                // system-wide state compared against, not a per-slot copy
                // (spec §4.5 reads the redundant VER only to gate the
                // update, never to pick a write target), so it always
                // targets its own name regardless of the slot suffix.
                if name == "VER" {
                    redundant.push(UpdateEntry {
                        partition_name: name.clone(),
                        location: part.clone(),
                        bup_offset: entry.bup_offset,
                        byte_length: entry.byte_length,
                        class: RedundancyClass::Redundant,
                    });
                    return Ok(());
                }

                let targets_alt = target_suffix.as_str() == "_b";
                let (target_name, target_part) = if !targets_alt {
                    (name.clone(), part.clone())
                } else if let Some(part_b) = part_b.clone() {
                    (name_b.clone(), part_b)
                } else {
                    (name.clone(), part.clone())
                };

                redundant.push(UpdateEntry {
                    partition_name: target_name,
                    location: target_part,
                    bup_offset: entry.bup_offset,
                    byte_length: entry.byte_length,
                    class: RedundancyClass::Redundant,
                });

                if is_mb1(name) {
                    *mb1_other = if !targets_alt { part_b } else { Some(part) };
                }
            }
        }
        Mode::Update { .. } => {
            // G1 never reaches here (mode is always Initialize on G1).
        }
    }

    Ok(())
}

pub(crate) fn is_mb1(name: &str) -> bool {
    name == "mb1" || name == "mb1_b"
}

fn classify_external(
    ctx: &Ctx,
    entry: &BupEntry,
    name_b: &str,
    redundant: &mut Vec<UpdateEntry>,
    nonredundant: &mut Vec<UpdateEntry>,
) -> Result<()> {
    let Some(external) = ctx.platform_probe.resolve_by_label(&entry.name) else {
        if ctx.platform_probe.partition_should_be_present(&entry.name) {
            return Err(Error::partition_missing(format!(
                "required external partition {} not found",
                entry.name
            )));
        }
        return Ok(());
    };

    let has_redundant_label = ctx.platform_probe.resolve_by_label(name_b).is_some();

    let update_entry = UpdateEntry {
        partition_name: entry.name.clone(),
        location: ResolvedPartition::External(external),
        bup_offset: entry.bup_offset,
        byte_length: entry.byte_length,
        class: if has_redundant_label {
            RedundancyClass::Redundant
        } else {
            RedundancyClass::NonRedundant
        },
    };

    match (has_redundant_label, ctx.mode) {
        (true, _) => redundant.push(update_entry),
        (false, Mode::Initialize) => nonredundant.push(update_entry),
        (false, Mode::Update { .. }) => {}
    }
    Ok(())
}

/// G2/G3 ordering: everything except `mb1[_b]`/`mb2[_b]`/`BCT` first, then
/// `mb2`, `mb2_b`, then up to three `BCT`s, then `mb1`, `mb1_b` (spec
/// §4.6).
fn order_g2g3(redundant: Vec<UpdateEntry>, nonredundant: Vec<UpdateEntry>) -> Vec<UpdateEntry> {
    let mut all: Vec<UpdateEntry> = redundant.into_iter().chain(nonredundant).collect();

    let mut head = Vec::new();
    let mut mb2 = Vec::new();
    let mut bct = Vec::new();
    let mut mb1 = Vec::new();

    all.drain(..).for_each(|e| match e.partition_name.as_str() {
        "mb2" | "mb2_b" => mb2.push(e),
        "BCT" => bct.push(e),
        "mb1" | "mb1_b" => mb1.push(e),
        _ => head.push(e),
    });

    mb2.sort_by_key(|e| if e.partition_name == "mb2" { 0 } else { 1 });
    mb1.sort_by_key(|e| if e.partition_name == "mb1" { 0 } else { 1 });

    head.into_iter()
        .chain(mb2)
        .chain(bct)
        .chain(mb1)
        .collect()
}

/// G1 eMMC/SD fixed partition order, repeating `BCT` three times to drive
/// the three-pass schedule (spec §4.6).
pub const G1_EMMC_ORDER: &[&str] = &[
    "BCT", "MB1", "NVC", "NVC-1", "MB2", "SOS", "EKS", "BCT", "BMP", "BMP-1", "BCT",
];

/// G1 SPI fixed partition order, using `NVC_R` in place of `NVC-1` (spec
/// §4.3/§4.6).
pub const G1_SPI_ORDER: &[&str] = &[
    "BCT", "MB1", "NVC", "NVC_R", "MB2", "SOS", "EKS", "BCT", "BMP", "BMP-1", "BCT",
];

fn order_g1(platform: Platform, entries: Vec<UpdateEntry>) -> Result<Vec<UpdateEntry>> {
    use crate::soc::BootMedium;

    let fixed = match platform.medium {
        BootMedium::EmmcOrSd => G1_EMMC_ORDER,
        BootMedium::SpiFlash => G1_SPI_ORDER,
    };

    let mut by_name: HashMap<String, Vec<UpdateEntry>> = HashMap::new();
    for e in entries {
        by_name.entry(e.partition_name.clone()).or_default().push(e);
    }

    let mut ordered = Vec::new();
    for name in fixed {
        // BCT appears three times in the fixed order to drive the G1
        // three-pass schedule, but there is only ever one BCT worklist
        // entry: reference it at each position instead of consuming it.
        if *name == "BCT" {
            match by_name.get(*name).and_then(|bucket| bucket.first()) {
                Some(entry) => ordered.push(entry.clone()),
                None => {
                    return Err(Error::partition_missing(
                        "fixed G1 update order requires BCT, which is missing from the worklist",
                    ))
                }
            }
            continue;
        }
        match by_name.get_mut(*name) {
            Some(bucket) if !bucket.is_empty() => ordered.push(bucket.remove(0)),
            _ if *name == "EKS" => continue,
            _ => {
                return Err(Error::partition_missing(format!(
                    "fixed G1 update order requires {name}, which is missing from the worklist"
                )))
            }
        }
    }

    for (name, mut bucket) in by_name {
        if name == "BCT" {
            continue;
        }
        ordered.append(&mut bucket);
    }

    Ok(ordered)
}
