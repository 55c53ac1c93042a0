//! Redundant-copy naming (spec §4.3).

use crate::soc::{BootMedium, Platform, SocType};

/// Maps a base partition name to its redundant-copy name for the given
/// platform.
pub fn redundant_name(platform: Platform, base: &str) -> String {
    match platform.soc {
        SocType::G2 | SocType::G3 => format!("{base}_b"),
        SocType::G1 => match platform.medium {
            BootMedium::EmmcOrSd => match base {
                "NVC" => "NVC-1".to_string(),
                "VER" => "VER_b".to_string(),
                other => format!("{other}-1"),
            },
            BootMedium::SpiFlash => match base {
                "NVC" => "NVC_R".to_string(),
                "VER" => "VER_b".to_string(),
                other => format!("{other}-1"),
            },
        },
    }
}
