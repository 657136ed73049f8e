//! Shared fixtures: an in-memory block device and scratch host paths

#![allow(dead_code)]

use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use vdisk::fat32::{Fat32Volume, FatFile};

/// In-memory block device with 512-byte sectors
#[derive(Debug, Clone)]
pub struct MemoryBlockDevice {
    pub data: Vec<u8>,
    pub block_size: usize,
}

impl MemoryBlockDevice {
    pub fn new(sectors: usize) -> Self {
        Self {
            data: vec![0u8; sectors * 512],
            block_size: 512,
        }
    }

    /// Device of `mb` megabytes
    pub fn with_size_mb(mb: usize) -> Self {
        Self::new(mb * 2048)
    }

    pub fn sector(&self, lba: usize) -> &[u8] {
        &self.data[lba * self.block_size..(lba + 1) * self.block_size]
    }
}

impl BlockIo for MemoryBlockDevice {
    type Error = io::Error;

    fn block_size(&self) -> BlockSize {
        BlockSize::new(self.block_size as u32).expect("valid block size")
    }

    fn num_blocks(&mut self) -> Result<u64, Self::Error> {
        Ok((self.data.len() / self.block_size) as u64)
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> Result<(), Self::Error> {
        let offset = start_lba.0 as usize * self.block_size;
        if offset + dst.len() > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read beyond end of device",
            ));
        }
        dst.copy_from_slice(&self.data[offset..offset + dst.len()]);
        Ok(())
    }

    fn write_blocks(&mut self, start_lba: Lba, src: &[u8]) -> Result<(), Self::Error> {
        let offset = start_lba.0 as usize * self.block_size;
        if offset + src.len() > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "write beyond end of device",
            ));
        }
        self.data[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Freshly formatted and mounted 64 MB volume plus an open root handle
pub fn formatted_volume() -> (Fat32Volume<MemoryBlockDevice>, FatFile) {
    let mut vol = Fat32Volume::new(MemoryBlockDevice::with_size_mb(64));
    vol.format("TESTVOL").expect("format");
    vol.init().expect("init");
    let mut root = FatFile::new();
    root.open_root(&vol).expect("open root");
    (vol, root)
}

/// Host path under the temp dir that no other test uses
pub fn scratch_path(tag: &str) -> PathBuf {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "klive-vdisk-{}-{}-{}.bin",
        tag,
        std::process::id(),
        n
    ))
}

/// Removes the file when dropped
pub struct ScratchFile(pub PathBuf);

impl ScratchFile {
    pub fn new(tag: &str) -> Self {
        Self(scratch_path(tag))
    }

    pub fn path(&self) -> &std::path::Path {
        &self.0
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}
