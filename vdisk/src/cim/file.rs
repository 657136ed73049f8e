//! Sparse sector I/O over an open CIM container

use super::config::CimGeometry;
use super::error::{CimError, Result};
use super::header::{CimInfo, HEADER_REGION_SIZE, SECTOR_SIZE, UNALLOCATED};
use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};
use log::{debug, trace, warn};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// An open CIM container.
///
/// Owns one lazily-opened host handle. Two `CimFile`s must never address
/// the same path at the same time.
#[derive(Debug)]
pub struct CimFile {
    path: PathBuf,
    info: CimInfo,
    handle: Option<File>,
}

impl CimFile {
    pub(crate) fn from_parts(path: PathBuf, info: CimInfo) -> Self {
        Self {
            path,
            info,
            handle: None,
        }
    }

    /// Open an existing container
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, CimGeometry::default())
    }

    /// Open an existing container, warning about any geometry that differs
    /// from `expected`
    pub fn open_with<P: AsRef<Path>>(path: P, expected: CimGeometry) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let info = load_header(&path)?;

        for mismatch in expected.mismatches(&info) {
            warn!(
                "{}: geometry mismatch ({}); using stored header",
                path.display(),
                mismatch
            );
        }

        let mut cim = Self::from_parts(path, info);
        cim.validate_cluster_map()?;
        cim.handle()?;
        debug!(
            "opened {} ({} MB, {} of {} clusters allocated{})",
            cim.path.display(),
            cim.info.max_size,
            cim.info.max_clusters,
            cim.info.cluster_count,
            if cim.info.is_read_only() { ", read-only" } else { "" }
        );
        Ok(cim)
    }

    pub fn info(&self) -> &CimInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.info.is_read_only()
    }

    /// Addressable 512-byte sectors
    pub fn max_sectors(&self) -> u32 {
        self.info.max_sectors()
    }

    /// True if the logical cluster has a physical backing
    pub fn is_allocated(&self, cluster: u32) -> bool {
        self.info
            .cluster_map
            .get(cluster as usize)
            .is_some_and(|&e| e != UNALLOCATED)
    }

    /// Check the cluster map for corruption.
    ///
    /// Aliased or out-of-bounds physical pointers are fatal. A stale
    /// allocation counter is corrected and the header rewritten.
    pub fn validate_cluster_map(&mut self) -> Result<()> {
        let allocated = self.info.allocated_count();
        let mut owner: Vec<Option<u16>> = vec![None; UNALLOCATED as usize];

        for (logical, &physical) in self.info.cluster_map.iter().enumerate() {
            if physical == UNALLOCATED {
                continue;
            }
            let slot = &mut owner[physical as usize];
            if let Some(first) = *slot {
                return Err(CimError::ClusterAliasing {
                    physical,
                    first,
                    second: logical as u16,
                });
            }
            *slot = Some(logical as u16);
        }

        // Distinct pointers all below the allocated count means a dense layout
        for (logical, &physical) in self.info.cluster_map.iter().enumerate() {
            if physical != UNALLOCATED && physical as usize >= allocated {
                return Err(CimError::ClusterOutOfBounds {
                    logical: logical as u16,
                    physical,
                    allocated: allocated as u16,
                });
            }
        }

        if allocated != self.info.max_clusters as usize {
            warn!(
                "{}: maxClusters is {} but {} clusters are allocated; correcting",
                self.path.display(),
                self.info.max_clusters,
                allocated
            );
            self.info.max_clusters = allocated as u16;
            if self.info.is_read_only() {
                warn!(
                    "{}: container is read-only, correction kept in memory only",
                    self.path.display()
                );
            } else {
                self.persist_header_detached()?;
            }
        }
        Ok(())
    }

    /// Reload the header from disk
    pub fn read_header(&mut self) -> Result<()> {
        self.info = load_header(&self.path)?;
        Ok(())
    }

    /// Write the in-memory header and fsync
    pub fn write_header(&mut self) -> Result<()> {
        if self.info.is_read_only() {
            return Err(CimError::ReadOnly);
        }
        let bytes = self.info.pack();
        let file = self.handle()?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(())
    }

    /// Read one sector. Unallocated clusters read as zeros.
    pub fn read_sector(&mut self, index: u32) -> Result<[u8; SECTOR_SIZE]> {
        let mut buf = [0u8; SECTOR_SIZE];
        self.read_sector_into(index, &mut buf)?;
        Ok(buf)
    }

    pub fn read_sector_into(&mut self, index: u32, buf: &mut [u8]) -> Result<()> {
        if buf.len() != SECTOR_SIZE {
            return Err(CimError::InvalidBufferSize(buf.len()));
        }
        let (cluster, offset) = self.locate(index)?;
        let physical = self.info.cluster_map[cluster];
        if physical == UNALLOCATED {
            buf.fill(0);
            return Ok(());
        }
        let pos = self.physical_offset(physical, offset);
        read_at(self.handle()?, pos, buf)
    }

    /// Write one sector.
    ///
    /// The first write into a cluster allocates the next physical cluster.
    /// The header is written and flushed before the cluster payload.
    pub fn write_sector(&mut self, index: u32, data: &[u8]) -> Result<()> {
        if self.info.is_read_only() {
            return Err(CimError::ReadOnly);
        }
        if data.len() != SECTOR_SIZE {
            return Err(CimError::InvalidBufferSize(data.len()));
        }
        let (cluster, offset) = self.locate(index)?;
        let physical = self.info.cluster_map[cluster];

        if physical != UNALLOCATED {
            let pos = self.physical_offset(physical, offset);
            let file = self.handle()?;
            file.seek(SeekFrom::Start(pos))?;
            file.write_all(data)?;
            return Ok(());
        }

        let physical = self.info.max_clusters;
        self.info.cluster_map[cluster] = physical;
        self.info.max_clusters += 1;
        if let Err(e) = self.write_header() {
            self.info.cluster_map[cluster] = UNALLOCATED;
            self.info.max_clusters -= 1;
            return Err(e);
        }

        let mut payload = vec![0u8; self.info.cluster_bytes()];
        payload[offset..offset + SECTOR_SIZE].copy_from_slice(data);
        let pos = self.physical_offset(physical, 0);
        let file = self.handle()?;
        file.seek(SeekFrom::Start(pos))?;
        file.write_all(&payload)?;
        file.sync_all()?;

        trace!(
            "allocated physical cluster {} for logical cluster {}",
            physical,
            cluster
        );
        Ok(())
    }

    /// Read a whole logical cluster
    pub fn read_cluster(&mut self, index: u32) -> Result<Vec<u8>> {
        if index >= self.info.cluster_count as u32 {
            return Err(CimError::ClusterOutOfRange(index));
        }
        let mut buf = vec![0u8; self.info.cluster_bytes()];
        let physical = self.info.cluster_map[index as usize];
        if physical != UNALLOCATED {
            let pos = self.physical_offset(physical, 0);
            read_at(self.handle()?, pos, &mut buf)?;
        }
        Ok(buf)
    }

    /// Persist the read-only flag and reopen the host handle to match
    pub fn set_readonly(&mut self, read_only: bool) -> Result<()> {
        self.info.flags = if read_only { 1 } else { 0 };
        self.close();
        self.persist_header_detached()?;
        self.handle()?;
        Ok(())
    }

    /// Drop the host handle; the next access reopens it
    pub fn close(&mut self) {
        self.handle = None;
    }

    fn handle(&mut self) -> Result<&mut File> {
        let file = match self.handle.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .read(true)
                .write(!self.info.is_read_only())
                .open(&self.path)?,
        };
        Ok(self.handle.insert(file))
    }

    // Header writes that must succeed regardless of the read-only flag
    fn persist_header_detached(&mut self) -> Result<()> {
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.write_all(&self.info.pack())?;
        file.sync_all()?;
        Ok(())
    }

    fn locate(&self, index: u32) -> Result<(usize, usize)> {
        if index >= self.info.max_sectors() {
            return Err(CimError::SectorOutOfRange(index));
        }
        let spc = self.info.sectors_per_cluster();
        let cluster = (index / spc) as usize;
        if cluster >= self.info.cluster_count as usize {
            return Err(CimError::SectorOutOfRange(index));
        }
        let offset = (index % spc) as usize * SECTOR_SIZE;
        Ok((cluster, offset))
    }

    fn physical_offset(&self, physical: u16, offset: usize) -> u64 {
        HEADER_REGION_SIZE as u64
            + physical as u64 * self.info.cluster_bytes() as u64
            + offset as u64
    }
}

impl BlockIo for CimFile {
    type Error = CimError;

    fn block_size(&self) -> BlockSize {
        BlockSize::BS_512
    }

    fn num_blocks(&mut self) -> core::result::Result<u64, Self::Error> {
        Ok(self.info.max_sectors() as u64)
    }

    fn read_blocks(
        &mut self,
        start_lba: Lba,
        dst: &mut [u8],
    ) -> core::result::Result<(), Self::Error> {
        if dst.len() % SECTOR_SIZE != 0 {
            return Err(CimError::InvalidBufferSize(dst.len()));
        }
        for (i, chunk) in dst.chunks_exact_mut(SECTOR_SIZE).enumerate() {
            self.read_sector_into(lba_index(start_lba, i)?, chunk)?;
        }
        Ok(())
    }

    fn write_blocks(&mut self, start_lba: Lba, src: &[u8]) -> core::result::Result<(), Self::Error> {
        if src.len() % SECTOR_SIZE != 0 {
            return Err(CimError::InvalidBufferSize(src.len()));
        }
        for (i, chunk) in src.chunks_exact(SECTOR_SIZE).enumerate() {
            self.write_sector(lba_index(start_lba, i)?, chunk)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> core::result::Result<(), Self::Error> {
        if let Some(file) = self.handle.as_mut() {
            if !self.info.is_read_only() {
                file.sync_all()?;
            }
        }
        Ok(())
    }
}

fn lba_index(start: Lba, i: usize) -> Result<u32> {
    let index = start.0 + i as u64;
    u32::try_from(index).map_err(|_| CimError::SectorOutOfRange(u32::MAX))
}

fn load_header(path: &Path) -> Result<CimInfo> {
    let file = File::open(path)?;
    let mut buf = Vec::with_capacity(HEADER_REGION_SIZE);
    file.take(HEADER_REGION_SIZE as u64).read_to_end(&mut buf)?;
    CimInfo::unpack(&buf)
}

// Bytes past the end of the host file read as zeros: a crash can leave a
// cluster recorded in the header before its payload reached the disk.
fn read_at(file: &mut File, pos: u64, buf: &mut [u8]) -> Result<()> {
    file.seek(SeekFrom::Start(pos))?;
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf[filled..].fill(0);
    Ok(())
}
