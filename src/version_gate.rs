//! Version/rollback gate (spec §4.5).

use crate::collaborators::{Crc32, VersionInfo};
use crate::error::{Error, Result};

/// On-device VER state as read from the primary and redundant VER
/// partitions. Either may fail to parse.
pub struct OnDeviceVersions {
    pub primary: Option<VersionInfo>,
    pub redundant: Option<VersionInfo>,
}

/// Outcome of a passing gate: whether to proceed, and whether a warning
/// should be surfaced (forced initialization past a would-be rejection).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateOutcome {
    pub warn: bool,
}

/// Runs the gate. `payload_version` is `None` when the BUP carries no VER
/// entry, which always passes (the BUP does not touch the boot chain).
/// `nvc_primary`/`nvc_redundant` are the raw bytes of the NVC primary and
/// redundant copies, compared by CRC-32 only when both VER entries report
/// equal, nonzero, equal-CRC versions.
pub fn check(
    payload_version: Option<VersionInfo>,
    on_device: &OnDeviceVersions,
    nvc_primary: &[u8],
    nvc_redundant: &[u8],
    force_initialize: bool,
) -> Result<GateOutcome> {
    let Some(payload) = payload_version else {
        return Ok(GateOutcome { warn: false });
    };

    match (on_device.primary, on_device.redundant) {
        (Some(primary), Some(redundant))
            if primary.is_nonzero() && redundant.is_nonzero() && primary.bsp_version_eq(&redundant) =>
        {
            if primary > payload {
                return Err(Error::version_gate(format!(
                    "on-device version {:?} is newer than payload version {:?}: rollback rejected",
                    primary, payload
                )));
            }
            if primary.crc == redundant.crc {
                let primary_crc = Crc32::checksum(nvc_primary);
                let redundant_crc = Crc32::checksum(nvc_redundant);
                if primary_crc != redundant_crc {
                    return Err(Error::version_gate(
                        "NVC partition mismatch \u{2014} reflash required",
                    ));
                }
            }
            Ok(GateOutcome { warn: false })
        }
        (Some(primary), None) if primary.is_nonzero() && primary > payload => {
            if force_initialize {
                Ok(GateOutcome { warn: true })
            } else {
                Err(Error::version_gate(format!(
                    "redundant VER invalid and on-device version {:?} is newer than payload",
                    primary
                )))
            }
        }
        (_, Some(redundant)) if redundant.is_nonzero() && !redundant.bsp_version_eq(&payload) => {
            Err(Error::version_gate(format!(
                "previous update incomplete; please update with version {:?}",
                redundant
            )))
        }
        _ => {
            if force_initialize {
                Ok(GateOutcome { warn: true })
            } else {
                Err(Error::version_gate(
                    "both on-device VER entries are corrupted or absent",
                ))
            }
        }
    }
}
