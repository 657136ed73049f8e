//! Open file and directory handles
//!
//! A [`FatFile`] holds only a position and the location of its directory
//! entry. Every operation takes the volume explicitly, so several handles can
//! be open on one volume at the same time.

use super::datetime::FatTimestamp;
use super::dir_entry::DirEntry;
use super::error::{FatError, Result};
use super::types::{
    FatAttributes, FileFlags, HandleAttributes, BYTES_PER_SECTOR, DIR_ENTRY_SIZE, FAT32_EOC,
    MAX_DIR_SIZE,
};
use super::volume::Fat32Volume;
use gpt_disk_io::BlockIo;
use log::trace;

/// Handle on a file or directory of a [`Fat32Volume`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FatFile {
    pub(super) attributes: HandleAttributes,
    pub(super) flags: FileFlags,
    /// Long-name entries in front of the short entry
    pub(super) lfn_ord: u8,
    /// Index of the short entry within the parent directory
    pub(super) dir_index: u16,
    /// First cluster of the parent directory
    pub(super) dir_cluster: u32,
    /// Sector holding the short entry
    pub(super) dir_sector: u32,
    /// Cluster holding byte `cur_position - 1`
    pub(super) cur_cluster: u32,
    pub(super) cur_position: u32,
    pub(super) file_size: u32,
    pub(super) first_cluster: u32,
}

impl FatFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the root directory of `vol`
    pub fn open_root<B: BlockIo>(&mut self, vol: &Fat32Volume<B>) -> Result<()> {
        if self.is_open() {
            return Err(FatError::AlreadyOpen);
        }
        *self = Self {
            attributes: HandleAttributes::ROOT32,
            flags: FileFlags::READ,
            first_cluster: vol.root_directory_start_cluster(),
            ..Self::default()
        };
        Ok(())
    }

    /// Handle on a directory given its first cluster
    pub(super) fn open_dir_cluster<B: BlockIo>(vol: &Fat32Volume<B>, cluster: u32) -> Self {
        let attributes = if cluster == vol.root_directory_start_cluster() || cluster == 0 {
            HandleAttributes::ROOT32
        } else {
            HandleAttributes::SUBDIR
        };
        Self {
            attributes,
            flags: FileFlags::READ,
            first_cluster: if cluster == 0 {
                vol.root_directory_start_cluster()
            } else {
                cluster
            },
            ..Self::default()
        }
    }

    /// Forget the handle. Writes are already on disk, nothing is flushed here.
    pub fn close(&mut self) {
        *self = Self::default();
    }

    pub fn is_open(&self) -> bool {
        !self.attributes.is_empty()
    }

    pub fn is_file(&self) -> bool {
        self.attributes.contains(HandleAttributes::FILE)
    }

    pub fn is_dir(&self) -> bool {
        self.attributes.intersects(HandleAttributes::DIR)
    }

    pub fn is_subdir(&self) -> bool {
        self.attributes.contains(HandleAttributes::SUBDIR)
    }

    pub fn is_root(&self) -> bool {
        self.attributes.contains(HandleAttributes::ROOT32)
    }

    pub fn is_read_only(&self) -> bool {
        self.attributes.contains(HandleAttributes::READ_ONLY)
    }

    pub fn is_readable(&self) -> bool {
        self.flags.contains(FileFlags::READ)
    }

    pub fn is_writable(&self) -> bool {
        self.flags.contains(FileFlags::WRITE)
    }

    pub fn is_contiguous(&self) -> bool {
        self.flags.contains(FileFlags::CONTIGUOUS)
    }

    pub fn attributes(&self) -> HandleAttributes {
        self.attributes
    }

    pub fn size(&self) -> u32 {
        self.file_size
    }

    pub fn position(&self) -> u32 {
        self.cur_position
    }

    pub fn first_cluster(&self) -> u32 {
        self.first_cluster
    }

    pub fn dir_index(&self) -> u16 {
        self.dir_index
    }

    pub fn rewind(&mut self) {
        self.cur_position = 0;
        self.cur_cluster = 0;
    }

    /// Move to byte `pos`. On failure the position is unchanged.
    pub fn seek_set<B: BlockIo>(&mut self, vol: &mut Fat32Volume<B>, pos: u32) -> Result<()> {
        if !self.is_open() {
            return Err(FatError::NotOpen);
        }
        if pos == self.cur_position {
            return Ok(());
        }
        if pos == 0 {
            self.rewind();
            return Ok(());
        }
        if self.is_file() && pos > self.file_size {
            return Err(FatError::SeekPastEndOfFile);
        }

        let shift = vol.bytes_per_cluster_shift();
        let mut n_new = (pos - 1) >> shift;
        if self.is_file() && self.is_contiguous() {
            self.cur_cluster = self.first_cluster + n_new;
            self.cur_position = pos;
            return Ok(());
        }

        let saved = self.cur_cluster;
        if self.cur_position == 0 || n_new < (self.cur_position - 1) >> shift {
            self.cur_cluster = self.first_cluster;
        } else {
            n_new -= (self.cur_position - 1) >> shift;
        }
        for _ in 0..n_new {
            match vol.next_cluster(self.cur_cluster) {
                Ok(Some(next)) => self.cur_cluster = next,
                Ok(None) => {
                    self.cur_cluster = saved;
                    return Err(FatError::SeekPastEndOfChain);
                }
                Err(e) => {
                    self.cur_cluster = saved;
                    return Err(e);
                }
            }
        }
        self.cur_position = pos;
        Ok(())
    }

    pub fn seek_end<B: BlockIo>(&mut self, vol: &mut Fat32Volume<B>) -> Result<()> {
        self.seek_set(vol, self.file_size)
    }

    /// Sector holding `cur_position`, stepping to the next cluster when the
    /// position sits on a cluster boundary.
    ///
    /// `None` means a directory ran out of clusters.
    pub(super) fn resolve_sector<B: BlockIo>(
        &mut self,
        vol: &mut Fat32Volume<B>,
    ) -> Result<Option<u32>> {
        let offset = self.cur_position as usize & (BYTES_PER_SECTOR - 1);
        let sector_of_cluster = vol.sector_of_cluster(self.cur_position);
        if offset == 0 && sector_of_cluster == 0 {
            if self.cur_position == 0 {
                self.cur_cluster = self.first_cluster;
            } else if self.is_file() && self.is_contiguous() {
                self.cur_cluster += 1;
            } else {
                match vol.next_cluster(self.cur_cluster)? {
                    Some(next) => self.cur_cluster = next,
                    None if self.is_dir() => return Ok(None),
                    None => return Err(FatError::BrokenChain),
                }
            }
        }
        if !vol.is_chain_cluster(self.cur_cluster) {
            return Err(FatError::BrokenChain);
        }
        Ok(Some(vol.cluster_start_sector(self.cur_cluster) + sector_of_cluster))
    }

    /// Read up to `buf.len()` bytes, stopping at end of file.
    ///
    /// Whole sectors go straight into `buf`; only partial sectors pass
    /// through a bounce buffer.
    pub fn read_into<B: BlockIo>(
        &mut self,
        vol: &mut Fat32Volume<B>,
        buf: &mut [u8],
    ) -> Result<usize> {
        if !self.is_open() {
            return Err(FatError::NotOpen);
        }
        if !self.is_readable() {
            return Err(FatError::NoRead);
        }
        let mut to_read = buf.len().min(u32::MAX as usize) as u32;
        if self.is_file() {
            to_read = to_read.min(self.file_size.saturating_sub(self.cur_position));
        }

        let spc = vol.sectors_per_cluster();
        let mut bounce = [0u8; BYTES_PER_SECTOR];
        let mut done = 0usize;
        while to_read > 0 {
            let offset = self.cur_position as usize & (BYTES_PER_SECTOR - 1);
            let sector_of_cluster = vol.sector_of_cluster(self.cur_position);
            let Some(sector) = self.resolve_sector(vol)? else {
                break;
            };

            let n = if offset != 0 || to_read < BYTES_PER_SECTOR as u32 {
                let n = (BYTES_PER_SECTOR - offset).min(to_read as usize);
                vol.read_sector(sector, &mut bounce)?;
                buf[done..done + n].copy_from_slice(&bounce[offset..offset + n]);
                n
            } else if to_read >= 2 * BYTES_PER_SECTOR as u32 {
                let sectors = (to_read >> 9).min(spc - sector_of_cluster) as usize;
                let n = sectors * BYTES_PER_SECTOR;
                vol.read_sector(sector, &mut buf[done..done + n])?;
                n
            } else {
                vol.read_sector(sector, &mut buf[done..done + BYTES_PER_SECTOR])?;
                BYTES_PER_SECTOR
            };

            done += n;
            self.cur_position += n as u32;
            to_read -= n as u32;
        }
        Ok(done)
    }

    /// Read up to `len` bytes into a new buffer
    pub fn read<B: BlockIo>(&mut self, vol: &mut Fat32Volume<B>, len: usize) -> Result<Vec<u8>> {
        let len = if self.is_file() {
            len.min(self.file_size.saturating_sub(self.cur_position) as usize)
        } else {
            len
        };
        let mut out = vec![0u8; len];
        let n = self.read_into(vol, &mut out)?;
        out.truncate(n);
        Ok(out)
    }

    /// Read from the current position to end of file
    pub fn read_to_end<B: BlockIo>(&mut self, vol: &mut Fat32Volume<B>) -> Result<Vec<u8>> {
        let remaining = self.file_size.saturating_sub(self.cur_position) as usize;
        self.read(vol, remaining)
    }

    /// Write `data` at the current position, growing the chain as needed.
    ///
    /// The directory entry is rewritten before returning.
    pub fn write<B: BlockIo>(&mut self, vol: &mut Fat32Volume<B>, data: &[u8]) -> Result<usize> {
        if !self.is_open() {
            return Err(FatError::NotOpen);
        }
        if !self.is_writable() {
            return Err(FatError::NoWrite);
        }
        if !self.is_file() {
            return Err(FatError::NotAFile);
        }
        if data.is_empty() {
            return Ok(0);
        }
        if self.flags.contains(FileFlags::APPEND) && self.cur_position != self.file_size {
            self.seek_set(vol, self.file_size)?;
        }
        if self.cur_position as u64 + data.len() as u64 > u32::MAX as u64 {
            return Err(FatError::FileTooLarge);
        }

        let mut bounce = [0u8; BYTES_PER_SECTOR];
        let mut src = 0usize;
        while src < data.len() {
            let offset = self.cur_position as usize & (BYTES_PER_SECTOR - 1);
            let sector_of_cluster = vol.sector_of_cluster(self.cur_position);
            if offset == 0 && sector_of_cluster == 0 {
                if self.cur_cluster != 0 {
                    let next = if self.is_contiguous() && self.file_size > self.cur_position {
                        Some(self.cur_cluster + 1)
                    } else {
                        vol.next_cluster(self.cur_cluster)?
                    };
                    match next {
                        Some(cluster) => self.cur_cluster = cluster,
                        None => self.add_cluster(vol)?,
                    }
                } else if self.first_cluster == 0 {
                    self.add_cluster(vol)?;
                    self.first_cluster = self.cur_cluster;
                } else {
                    self.cur_cluster = self.first_cluster;
                }
            }

            let sector = vol.cluster_start_sector(self.cur_cluster) + sector_of_cluster;
            let n = (BYTES_PER_SECTOR - offset).min(data.len() - src);
            if n == BYTES_PER_SECTOR {
                vol.write_sector(sector, &data[src..src + n])?;
            } else {
                if offset == 0 && self.cur_position >= self.file_size {
                    bounce.fill(0);
                } else {
                    vol.read_sector(sector, &mut bounce)?;
                }
                bounce[offset..offset + n].copy_from_slice(&data[src..src + n]);
                vol.write_sector(sector, &bounce)?;
            }
            src += n;
            self.cur_position += n as u32;
        }

        if self.cur_position > self.file_size {
            self.file_size = self.cur_position;
        }
        self.flags |= FileFlags::DIR_DIRTY;
        self.sync_dir_entry(vol)?;
        Ok(data.len())
    }

    /// Allocate one contiguous run for `length` bytes up front.
    ///
    /// Only valid on an empty file; clusters past the final size stay
    /// allocated until [`truncate`](Self::truncate).
    pub fn pre_allocate<B: BlockIo>(
        &mut self,
        vol: &mut Fat32Volume<B>,
        length: u32,
    ) -> Result<()> {
        if !self.is_open() {
            return Err(FatError::NotOpen);
        }
        if !self.is_file() {
            return Err(FatError::NotAFile);
        }
        if !self.is_writable() {
            return Err(FatError::NoWrite);
        }
        if length == 0 {
            return Ok(());
        }
        if self.first_cluster != 0 {
            return Err(FatError::AlreadyAllocated);
        }
        let count = 1 + ((length - 1) >> vol.bytes_per_cluster_shift());
        let first = vol.alloc_contiguous(count)?.ok_or(FatError::DiskFull)?;
        self.first_cluster = first;
        self.flags |= FileFlags::CONTIGUOUS | FileFlags::DIR_DIRTY;
        self.sync_dir_entry(vol)
    }

    /// Cut the file to `length` bytes and free the clusters past it
    pub fn truncate<B: BlockIo>(&mut self, vol: &mut Fat32Volume<B>, length: u32) -> Result<()> {
        if !self.is_open() {
            return Err(FatError::NotOpen);
        }
        if !self.is_file() {
            return Err(FatError::NotAFile);
        }
        if !self.is_writable() {
            return Err(FatError::NoWrite);
        }
        if length > self.file_size {
            return Err(FatError::SeekPastEndOfFile);
        }
        if self.first_cluster == 0 {
            return Ok(());
        }

        let new_pos = self.cur_position.min(length);
        if length == 0 {
            vol.free_chain(self.first_cluster)?;
            self.first_cluster = 0;
            self.flags.remove(FileFlags::CONTIGUOUS);
        } else {
            self.seek_set(vol, length)?;
            if let Some(next) = vol.next_cluster(self.cur_cluster)? {
                vol.free_chain(next)?;
                vol.set_fat_entry(self.cur_cluster, FAT32_EOC)?;
            }
        }
        self.file_size = length;
        self.flags |= FileFlags::DIR_DIRTY;
        self.sync_dir_entry(vol)?;
        self.rewind();
        self.seek_set(vol, new_pos)
    }

    /// Write the directory entry if dirty, then flush the device
    pub fn sync<B: BlockIo>(&mut self, vol: &mut Fat32Volume<B>) -> Result<()> {
        if !self.is_open() {
            return Err(FatError::NotOpen);
        }
        self.sync_dir_entry(vol)?;
        vol.sync()
    }

    /// The short directory entry as stored on disk
    pub fn dir_entry<B: BlockIo>(&self, vol: &mut Fat32Volume<B>) -> Result<DirEntry> {
        if !self.is_open() {
            return Err(FatError::NotOpen);
        }
        if self.is_root() {
            return Err(FatError::NotAFile);
        }
        let mut buf = [0u8; BYTES_PER_SECTOR];
        vol.read_sector(self.dir_sector, &mut buf)?;
        Ok(DirEntry::unpack(&buf, self.entry_offset()))
    }

    pub(super) fn entry_offset(&self) -> usize {
        (self.dir_index as usize & 0x0F) * DIR_ENTRY_SIZE
    }

    // Size, first cluster, attributes and timestamps into the short entry
    pub(super) fn sync_dir_entry<B: BlockIo>(&mut self, vol: &mut Fat32Volume<B>) -> Result<()> {
        if !self.flags.contains(FileFlags::DIR_DIRTY) {
            return Ok(());
        }
        self.flags.remove(FileFlags::DIR_DIRTY);
        if self.is_root() {
            return Ok(());
        }

        let mut buf = [0u8; BYTES_PER_SECTOR];
        vol.read_sector(self.dir_sector, &mut buf)?;
        let offset = self.entry_offset();
        let mut entry = DirEntry::unpack(&buf, offset);
        if self.is_file() {
            entry.file_size = self.file_size;
        }
        entry.set_first_cluster(self.first_cluster);
        entry.attributes = self.attributes.bits() & FatAttributes::COPY.bits();
        let now = FatTimestamp::now();
        entry.write_date = now.date;
        entry.write_time = now.time;
        entry.access_date = now.date;
        entry.pack_into(&mut buf, offset);
        vol.write_sector(self.dir_sector, &buf)?;
        trace!(
            "synced entry {} ({} bytes, cluster {})",
            self.dir_index,
            self.file_size,
            self.first_cluster
        );
        Ok(())
    }

    // Extends the chain by one cluster; the handle stays contiguous only if
    // the new cluster follows the previous one
    pub(super) fn add_cluster<B: BlockIo>(&mut self, vol: &mut Fat32Volume<B>) -> Result<()> {
        let current = self.cur_cluster;
        let cluster = vol.allocate_cluster(current)?.ok_or(FatError::DiskFull)?;
        self.cur_cluster = cluster;
        if current == 0 {
            self.flags |= FileFlags::CONTIGUOUS;
        } else if cluster != current + 1 {
            self.flags.remove(FileFlags::CONTIGUOUS);
        }
        self.flags |= FileFlags::DIR_DIRTY;
        Ok(())
    }

    /// Grow a directory by one zeroed cluster, leaving the position at its end
    pub(super) fn add_dir_cluster<B: BlockIo>(&mut self, vol: &mut Fat32Volume<B>) -> Result<()> {
        if self.cur_position >= MAX_DIR_SIZE {
            return Err(FatError::DirectoryFull);
        }
        self.add_cluster(vol)?;
        vol.zero_cluster(self.cur_cluster)?;
        self.cur_position += vol.bytes_per_cluster();
        Ok(())
    }
}
