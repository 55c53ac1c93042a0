use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom};
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use bup_update_tool::cli::Args;
use bup_update_tool::collaborators::LayoutMatch;
use bup_update_tool::error::{Error, Result};
use bup_update_tool::executor::{BootDevices, ExecOutcome};
use bup_update_tool::orchestrator::Orchestrator;
use bup_update_tool::soc::{BootMedium, Platform, SocType};
use bup_update_tool::vendor::{
    FileSmd, IndexedBup, LinuxPlatform, LittleEndianVer, PermissiveBctValidator, StaticGpt,
};

fn soc_from_env() -> Result<SocType> {
    match std::env::var("BUP_SOC_TYPE").as_deref() {
        Ok("G1") => Ok(SocType::G1),
        Ok("G2") => Ok(SocType::G2),
        Ok("G3") => Ok(SocType::G3),
        _ => Err(Error::configuration(
            "BUP_SOC_TYPE must be set to G1, G2, or G3",
        )),
    }
}

fn medium_from_boot_device(path: &str) -> BootMedium {
    if path.contains("mmcblk") || path.contains("mmc") {
        BootMedium::EmmcOrSd
    } else {
        BootMedium::SpiFlash
    }
}

fn run() -> Result<i32> {
    let args = Args::parse();
    let config = args.into_config()?;

    let mut bup = IndexedBup::open(&config.bup_package_path)?;
    let soc = soc_from_env()?;
    let medium = medium_from_boot_device(bup.boot_device());
    let platform = Platform::new(soc, medium);

    let platform_probe = LinuxPlatform {
        soc,
        by_label_dir: "/dev/disk/by-partlabel".into(),
        required_partitions: Vec::new(),
    };
    // The real GPT and BCT-validator libraries are vendor-private (spec
    // §6.2); see src/vendor.rs for what these placeholders stand in for.
    let gpt = StaticGpt {
        partitions: Vec::new(),
        layout_match: LayoutMatch::Match,
    };
    let validator = PermissiveBctValidator {
        g1_block_size: medium.bct_block_size(),
        g1_page_size: medium.page_size(),
    };
    let ver_source = LittleEndianVer;

    let mut primary = OpenOptions::new()
        .read(true)
        .write(true)
        .open(bup.boot_device())?;
    let primary_size = primary.seek(SeekFrom::End(0))?;
    primary.seek(SeekFrom::Start(0))?;

    let secondary = match bup.gpt_device() {
        Some(path) => Some(OpenOptions::new().read(true).write(true).open(path)?),
        None => None,
    };

    let smd_path = std::path::PathBuf::from(bup.boot_device()).with_extension("smd");
    let mut smd = FileSmd::load(smd_path)?;

    if config.needs_repartition {
        let orchestrator = Orchestrator {
            platform,
            devices: BootDevices { primary, secondary },
            gpt: &gpt,
            platform_probe: &platform_probe,
            validator: &validator,
            ver_source: &ver_source,
            smd: &mut smd,
            primary_size,
        };
        let outcome = orchestrator.check_repartition();
        return Ok(outcome.exit_code());
    }

    let mut orchestrator = Orchestrator {
        platform,
        devices: BootDevices { primary, secondary },
        gpt: &gpt,
        platform_probe: &platform_probe,
        validator: &validator,
        ver_source: &ver_source,
        smd: &mut smd,
        primary_size,
    };

    let outcome = orchestrator.run_update(&mut bup, &config)?;
    let written = outcome
        .exec_outcomes
        .iter()
        .filter(|o| matches!(o, ExecOutcome::Written))
        .count();
    info!(
        "applied {written} partition writes, slot outcome: {:?}",
        outcome.slot_outcome
    );

    Ok(0)
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.kind().exit_code() as u8)
        }
    }
}
