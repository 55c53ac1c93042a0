//! Block I/O primitive (spec §4.1).
//!
//! A minimal positioned read/write abstraction over a block device handle,
//! with an optional pre-write zero-fill ("erase") region. Grounded in the
//! teacher's `BlockDevice` trait boundary (`kernel/comps/block/src/lib.rs`)
//! which keeps I/O behind a narrow trait rather than scattering raw file
//! descriptors through the planner/executor.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{Error, Result};

/// A block device handle capable of positioned reads and writes.
///
/// Implemented for any type that is `Read + Write + Seek` (in particular
/// `std::fs::File`); tests use an in-memory `Vec<u8>`-backed fake.
pub trait BlockHandle: Read + Write + Seek {
    fn flush_device(&mut self) -> Result<()> {
        Write::flush(self).map_err(Error::from)
    }
}

impl<T: Read + Write + Seek> BlockHandle for T {}

/// Positioned read: seeks to `offset`, then reads exactly `len` bytes into
/// `buf[..len]`, looping on short reads. A zero-byte read before `len`
/// bytes are satisfied is a hard failure (short/truncated device).
pub fn read_exact_at<H: BlockHandle + ?Sized>(
    handle: &mut H,
    buf: &mut [u8],
    len: usize,
    offset: u64,
) -> Result<()> {
    handle
        .seek(SeekFrom::Start(offset))
        .map_err(|e| Error::io(format!("seek to {offset} failed: {e}")))?;

    let mut filled = 0;
    while filled < len {
        let n = handle
            .read(&mut buf[filled..len])
            .map_err(|e| Error::io(format!("read at {offset} failed: {e}")))?;
        if n == 0 {
            return Err(Error::io(format!(
                "short read at offset {offset}: got {filled} of {len} bytes"
            )));
        }
        filled += n;
    }
    Ok(())
}

/// Positioned write with an optional erase window.
///
/// If `erase_len > 0`, first writes `erase_len` zero bytes starting at
/// `offset` and flushes, then repositions to `offset` and writes `len`
/// bytes from `buf[..len]`. Flushing after the real write is the caller's
/// responsibility (spec §4.1). Short writes are looped.
pub fn write_exact_at<H: BlockHandle + ?Sized>(
    handle: &mut H,
    buf: &[u8],
    len: usize,
    offset: u64,
    erase_len: usize,
) -> Result<()> {
    if erase_len > 0 {
        let zeros = vec![0u8; erase_len];
        write_loop(handle, &zeros, offset)?;
        handle.flush_device()?;
    }

    write_loop(handle, &buf[..len], offset)
}

fn write_loop<H: BlockHandle + ?Sized>(handle: &mut H, data: &[u8], offset: u64) -> Result<()> {
    handle
        .seek(SeekFrom::Start(offset))
        .map_err(|e| Error::io(format!("seek to {offset} failed: {e}")))?;

    let mut written = 0;
    while written < data.len() {
        let n = handle
            .write(&data[written..])
            .map_err(|e| Error::io(format!("write at {offset} failed: {e}")))?;
        if n == 0 {
            return Err(Error::io(format!(
                "short write at offset {offset}: wrote {written} of {} bytes",
                data.len()
            )));
        }
        written += n;
    }
    Ok(())
}
