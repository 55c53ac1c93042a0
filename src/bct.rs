//! BCT writer (spec §4.4): the G2/G3 three-slot scheme and the G1
//! up-to-64-copy scheme, each validating the candidate against the
//! current on-device BCT before writing anything.

use crate::blockio::{write_exact_at, BlockHandle};
use crate::collaborators::BctValidator;
use crate::error::{Error, Result};
use crate::soc::BootMedium;

/// The G1 three-pass schedule state (spec §4.4 G1 variant, §9 "back-patched
/// BCT context"). `-1`/`PendingLast` is the initial value before the first
/// call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BctPassState {
    /// `which == -1`: next call writes the last copy.
    PendingLast,
    /// `which == +1`: next call writes the descending middle range.
    PendingMiddle,
    /// `which == 0`: next call writes the first copy (plus a second copy
    /// at `length` when `bct_copies == 2`).
    PendingFirst,
}

impl Default for BctPassState {
    fn default() -> Self {
        BctPassState::PendingLast
    }
}

/// Writes the G2/G3 three-slot BCT scheme.
///
/// `current` is the on-device BCT region spanning at least
/// `[0, block_size + slot_size)`, or `None` when initializing. Returns
/// whether the write plan completed (the `bct_updated` flag).
pub fn write_g2g3<H: BlockHandle + ?Sized>(
    handle: &mut H,
    partition_byte_offset: u64,
    current: Option<&[u8]>,
    new_bct: &[u8],
    medium: BootMedium,
    validator: &dyn BctValidator,
) -> Result<bool> {
    if !validator.valid_t18x_or_t19x(current, new_bct) {
        return Err(Error::bct_validation(
            "BCT validator rejected candidate bytes",
        ));
    }

    let page_size = medium.page_size();
    let block_size = medium.bct_block_size();
    let length = new_bct.len() as u64;
    let slot_size = length.div_ceil(page_size) * page_size;

    // Pass order matters: mb2 before BCT before mb1 is enforced by the
    // planner (§4.6); within the BCT partition itself, this order ensures
    // at least one valid copy survives a power cut between passes.
    let offsets = [slot_size, block_size, 0u64];

    for pass_offset in offsets {
        if let Some(cur) = current {
            let start = pass_offset as usize;
            let end = start + new_bct.len();
            if end <= cur.len() && &cur[start..end] == new_bct {
                continue;
            }
        }
        write_exact_at(
            handle,
            new_bct,
            new_bct.len(),
            partition_byte_offset + pass_offset,
            slot_size as usize,
        )?;
    }
    handle.flush_device()?;

    Ok(true)
}

/// Writes one pass of the G1 up-to-64-copy BCT scheme, advancing `state`.
/// `current` is the on-device BCT partition content, or `None` when
/// initializing. `part_byte_size` is the BCT partition's total size.
/// Returns whether any copy was written this pass.
pub fn write_g1<H: BlockHandle + ?Sized>(
    handle: &mut H,
    partition_byte_offset: u64,
    part_byte_size: u64,
    current: Option<&[u8]>,
    new_bct: &[u8],
    medium: BootMedium,
    validator: &dyn BctValidator,
    state: &mut BctPassState,
) -> Result<bool> {
    let Some((block_size, page_size)) = validator.valid_t21x(current, new_bct) else {
        return Err(Error::bct_validation(
            "BCT validator rejected candidate bytes",
        ));
    };

    let length = new_bct.len() as u64;
    if length % page_size != 0 {
        return Err(Error::internal(
            "BCT candidate length is not a multiple of the page size",
        ));
    }
    let bct_copies = medium.g1_bct_copies() as u64;
    if length * bct_copies > block_size {
        return Err(Error::internal(
            "BCT candidate length * copy count exceeds block size",
        ));
    }

    let bct_count = (part_byte_size / block_size).min(64);
    if bct_count == 0 {
        return Err(Error::internal("BCT partition too small for any copy"));
    }

    let copy_offsets: Vec<u64> = match *state {
        BctPassState::PendingLast => vec![(bct_count - 1) * block_size],
        BctPassState::PendingMiddle => {
            if bct_count < 3 {
                vec![]
            } else {
                ((1..=bct_count - 2).rev()).map(|k| k * block_size).collect()
            }
        }
        BctPassState::PendingFirst => {
            let mut offsets = vec![0u64];
            if bct_copies == 2 {
                offsets.push(length);
            }
            offsets
        }
    };

    let mut wrote_any = false;
    for offset in copy_offsets {
        let abs_offset = partition_byte_offset + offset;
        if let Some(cur) = current {
            let start = offset as usize;
            let end = start + new_bct.len();
            if end <= cur.len() && &cur[start..end] == new_bct {
                continue;
            }
        }
        write_exact_at(handle, new_bct, new_bct.len(), abs_offset, length as usize)?;
        wrote_any = true;
    }
    handle.flush_device()?;

    *state = match *state {
        BctPassState::PendingLast => BctPassState::PendingMiddle,
        BctPassState::PendingMiddle => BctPassState::PendingFirst,
        BctPassState::PendingFirst => BctPassState::PendingLast,
    };

    Ok(wrote_any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fakes::AcceptingBctValidator;
    use std::io::Cursor;

    fn device(size: usize) -> Cursor<Vec<u8>> {
        Cursor::new(vec![0u8; size])
    }

    #[test]
    fn g2g3_writes_three_passes_in_slot_block_zero_order() {
        let mut dev = device(1 << 17);
        let new_bct = vec![0x42u8; 100];
        let validator = AcceptingBctValidator;
        write_g2g3(
            &mut dev,
            0,
            None,
            &new_bct,
            BootMedium::EmmcOrSd,
            &validator,
        )
        .unwrap();

        let page_size = BootMedium::EmmcOrSd.page_size();
        let block_size = BootMedium::EmmcOrSd.bct_block_size();
        let slot_size = (100u64).div_ceil(page_size) * page_size;

        for offset in [0u64, slot_size, block_size] {
            let got = &dev.get_ref()[offset as usize..offset as usize + 100];
            assert_eq!(got, &new_bct[..]);
        }
    }

    #[test]
    fn g2g3_skips_pass_when_current_already_matches() {
        let mut dev = device(1 << 17);
        // Poison the buffer so a skip is observable: if the writer wrote
        // zeros anyway we'd see 0x00 instead of the poison value.
        for b in dev.get_mut().iter_mut() {
            *b = 0x99;
        }
        let new_bct = vec![0x42u8; 64];
        let medium = BootMedium::EmmcOrSd;
        let slot_size = (64u64).div_ceil(medium.page_size()) * medium.page_size();
        let block_size = medium.bct_block_size();

        let mut current = vec![0x99u8; (block_size + slot_size) as usize];
        // Make the slot_size-offset pass already match so it should be skipped.
        current[slot_size as usize..slot_size as usize + 64].copy_from_slice(&new_bct);

        let validator = AcceptingBctValidator;
        write_g2g3(&mut dev, 0, Some(&current), &new_bct, medium, &validator).unwrap();

        // The skipped region must remain untouched (still poison), while
        // the other two passes were written.
        assert_eq!(
            &dev.get_ref()[slot_size as usize..slot_size as usize + 64],
            &[0x99u8; 64][..]
        );
        assert_eq!(&dev.get_ref()[0..64], &new_bct[..]);
        assert_eq!(
            &dev.get_ref()[block_size as usize..block_size as usize + 64],
            &new_bct[..]
        );
    }

    #[test]
    fn g1_three_pass_schedule_writes_last_then_middle_then_first() {
        let block_size = 32_768u64;
        let part_size = block_size * 4; // bct_count = 4
        let mut dev = device(part_size as usize);
        let new_bct = vec![0x7u8; 2048];
        let validator = AcceptingBctValidator;
        let mut state = BctPassState::default();

        // Pass 1: last copy only (index 3).
        write_g1(
            &mut dev,
            0,
            part_size,
            None,
            &new_bct,
            BootMedium::SpiFlash,
            &validator,
            &mut state,
        )
        .unwrap();
        assert_eq!(state, BctPassState::PendingMiddle);
        assert_eq!(
            &dev.get_ref()[(3 * block_size) as usize..(3 * block_size) as usize + 2048],
            &new_bct[..]
        );
        assert_eq!(&dev.get_ref()[0..2048], &vec![0u8; 2048][..]);

        // Pass 2: middle range, descending [2, 1].
        write_g1(
            &mut dev,
            0,
            part_size,
            None,
            &new_bct,
            BootMedium::SpiFlash,
            &validator,
            &mut state,
        )
        .unwrap();
        assert_eq!(state, BctPassState::PendingFirst);
        for idx in [1u64, 2u64] {
            assert_eq!(
                &dev.get_ref()[(idx * block_size) as usize..(idx * block_size) as usize + 2048],
                &new_bct[..]
            );
        }

        // Pass 3: first copy, plus a second copy at offset `length` since
        // SPI has bct_copies == 2.
        write_g1(
            &mut dev,
            0,
            part_size,
            None,
            &new_bct,
            BootMedium::SpiFlash,
            &validator,
            &mut state,
        )
        .unwrap();
        assert_eq!(state, BctPassState::PendingLast);
        assert_eq!(&dev.get_ref()[0..2048], &new_bct[..]);
        assert_eq!(&dev.get_ref()[2048..4096], &new_bct[..]);
    }

    #[test]
    fn g1_emmc_first_pass_has_no_second_copy() {
        let block_size = 16_384u64;
        let part_size = block_size * 2;
        let mut dev = device(part_size as usize);
        let new_bct = vec![0x9u8; 512];
        let validator = AcceptingBctValidator;
        let mut state = BctPassState::PendingFirst;

        write_g1(
            &mut dev,
            0,
            part_size,
            None,
            &new_bct,
            BootMedium::EmmcOrSd,
            &validator,
            &mut state,
        )
        .unwrap();

        assert_eq!(&dev.get_ref()[0..512], &new_bct[..]);
        // No second copy: the bytes right after the first copy stay zero.
        assert_eq!(&dev.get_ref()[512..1024], &vec![0u8; 512][..]);
    }
}
