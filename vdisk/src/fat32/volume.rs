//! FAT32 volume: geometry, FAT entries and cluster allocation

use super::boot_sector::{BootSector, BOOT_SIGNATURE, EXT_BOOT_SIGNATURE, FS_TYPE_FAT32};
use super::config::{calculate_fat_size, sectors_per_cluster_for, FormatOptions};
use super::datetime::FatTimestamp;
use super::dir_entry::DirEntry;
use super::error::{FatError, Result};
use super::fs_info::{FsInfo, FSI_UNKNOWN};
use super::le::{read_u32, write_u32};
use super::types::{
    FatAttributes, BYTES_PER_SECTOR, FAT32_EOC, FAT32_MASK, FAT32_MIN_CLUSTERS,
};
use core::fmt::Display;
use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;
use log::{debug, error, info, trace};

const MEDIA_FIXED_DISK: u8 = 0xF8;
const FS_INFO_SECTOR: u16 = 1;
const BACKUP_BOOT_SECTOR: u16 = 6;
const ROOT_CLUSTER: u32 = 2;

/// Values derived from the boot sector by [`Fat32Volume::init`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VolumeGeometry {
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub reserved_sectors: u32,
    pub num_fats: u32,
    pub fat_size: u32,
    pub total_sectors: u32,
    pub data_start_sector: u32,
    pub data_sectors: u32,
    pub count_of_clusters: u32,
    pub count_of_fat_entries: u32,
    pub sectors_per_cluster_shift: u32,
    pub bytes_per_cluster_shift: u32,
    pub root_directory_start_cluster: u32,
    pub last_cluster: u32,
    pub fs_info_sector: u32,
    pub backup_fs_info_sector: u32,
    pub volume_label: [u8; 11],
}

/// A FAT32 file system on a block device.
///
/// Call [`format`](Self::format) on a blank device, then
/// [`init`](Self::init) before any other operation.
pub struct Fat32Volume<B: BlockIo> {
    device: B,
    geo: VolumeGeometry,
    alloc_search_start: u32,
}

fn device_error<E: Display>(e: E) -> FatError {
    error!("block device error: {}", e);
    FatError::IoError
}

impl<B: BlockIo> Fat32Volume<B> {
    pub fn new(device: B) -> Self {
        Self {
            device,
            geo: VolumeGeometry::default(),
            alloc_search_start: 1,
        }
    }

    /// Wrap a formatted device and load its geometry
    pub fn mount(device: B) -> Result<Self> {
        let mut vol = Self::new(device);
        vol.init()?;
        Ok(vol)
    }

    pub fn device(&self) -> &B {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut B {
        &mut self.device
    }

    pub fn into_inner(self) -> B {
        self.device
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geo
    }

    /// Format with the default options and the given label
    pub fn format(&mut self, label: &str) -> Result<()> {
        self.format_with(&FormatOptions::new().label(label))
    }

    /// Write boot sectors, FS-info sectors, the initial FATs and the root
    /// directory.
    ///
    /// The device must be blank; FAT sectors past the first are not cleared.
    pub fn format_with(&mut self, opts: &FormatOptions) -> Result<()> {
        if self.device.block_size().to_u32() != BYTES_PER_SECTOR as u32 {
            return Err(FatError::InvalidBlockSize);
        }
        let blocks = self.device.num_blocks().map_err(device_error)?;
        let total_sectors = u32::try_from(blocks).map_err(|_| FatError::VolumeTooLarge)?;

        let spc = sectors_per_cluster_for(blocks);
        let fat_size = calculate_fat_size(total_sectors, opts.reserved_sectors, spc, opts.num_fats);
        let data_start = opts.reserved_sectors as u32 + fat_size * opts.num_fats as u32;
        if data_start >= total_sectors {
            return Err(FatError::VolumeTooSmall(0));
        }
        let clusters = (total_sectors - data_start) / spc as u32;
        if clusters < FAT32_MIN_CLUSTERS {
            return Err(FatError::VolumeTooSmall(clusters));
        }

        let now = FatTimestamp::now();
        let label = opts.label_bytes();
        let bs = BootSector {
            jmp_boot: [0xEB, 0x58, 0x90],
            oem_name: opts.oem_name,
            bytes_per_sector: BYTES_PER_SECTOR as u16,
            sectors_per_cluster: spc,
            reserved_sectors: opts.reserved_sectors,
            num_fats: opts.num_fats,
            root_entry_count: 0,
            total_sectors_16: 0,
            media: MEDIA_FIXED_DISK,
            fat_size_16: 0,
            sectors_per_track: 63,
            num_heads: 255,
            hidden_sectors: 0,
            total_sectors_32: total_sectors,
            fat_size_32: fat_size,
            ext_flags: 0,
            fs_version: 0,
            root_cluster: ROOT_CLUSTER,
            fs_info_sector: FS_INFO_SECTOR,
            backup_boot_sector: BACKUP_BOOT_SECTOR,
            drive_number: 0x80,
            boot_signature: EXT_BOOT_SIGNATURE,
            volume_id: opts
                .volume_id
                .unwrap_or(((now.date as u32) << 16) | now.time as u32),
            volume_label: label,
            fs_type: FS_TYPE_FAT32,
            signature: BOOT_SIGNATURE,
        };
        let boot = bs.pack();
        self.write_sector(0, &boot)?;
        self.write_sector(BACKUP_BOOT_SECTOR as u32, &boot)?;

        // Root cluster is allocated up front
        let fs_info = FsInfo::new(clusters - 1).pack();
        self.write_sector(FS_INFO_SECTOR as u32, &fs_info)?;
        self.write_sector(BACKUP_BOOT_SECTOR as u32 + FS_INFO_SECTOR as u32, &fs_info)?;

        let mut fat = [0u8; BYTES_PER_SECTOR];
        write_u32(&mut fat, 0, 0x0FFF_FF00 | MEDIA_FIXED_DISK as u32);
        write_u32(&mut fat, 4, FAT32_EOC);
        write_u32(&mut fat, 8, FAT32_EOC);
        for i in 0..opts.num_fats as u32 {
            self.write_sector(opts.reserved_sectors as u32 + i * fat_size, &fat)?;
        }

        let mut root = vec![0u8; spc as usize * BYTES_PER_SECTOR];
        let label_entry = DirEntry {
            name: label,
            attributes: (FatAttributes::VOLUME_ID | FatAttributes::ARCHIVE).bits(),
            write_time: now.time,
            write_date: now.date,
            ..Default::default()
        };
        label_entry.pack_into(&mut root, 0);
        self.write_sector(data_start, &root)?;
        self.device.flush().map_err(device_error)?;

        info!(
            "formatted FAT32: {} sectors, {} sectors/cluster, FAT {} sectors, {} clusters",
            total_sectors, spc, fat_size, clusters
        );
        Ok(())
    }

    /// Load the boot sector and derive the volume geometry.
    ///
    /// Resets the allocation cursor.
    pub fn init(&mut self) -> Result<()> {
        let mut buf = [0u8; BYTES_PER_SECTOR];
        self.read_sector(0, &mut buf)?;
        let bs = BootSector::unpack(&buf);
        if !bs.is_valid_fat32() {
            return Err(FatError::InvalidBootSector);
        }

        let bytes_per_sector = bs.bytes_per_sector as u32;
        let sectors_per_cluster = bs.sectors_per_cluster as u32;
        let reserved_sectors = bs.reserved_sectors as u32;
        let num_fats = bs.num_fats as u32;
        let fat_size = bs.fat_size_32;
        let total_sectors = bs.total_sectors();
        let data_start_sector = reserved_sectors + fat_size * num_fats;
        let data_sectors = total_sectors
            .checked_sub(data_start_sector)
            .ok_or(FatError::InvalidBootSector)?;
        let sectors_per_cluster_shift = sectors_per_cluster.trailing_zeros();
        let count_of_clusters = data_sectors >> sectors_per_cluster_shift;

        if count_of_clusters < FAT32_MIN_CLUSTERS {
            return Err(FatError::VolumeTooSmall(count_of_clusters));
        }

        self.geo = VolumeGeometry {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            num_fats,
            fat_size,
            total_sectors,
            data_start_sector,
            data_sectors,
            count_of_clusters,
            count_of_fat_entries: fat_size * (bytes_per_sector / 4),
            sectors_per_cluster_shift,
            bytes_per_cluster_shift: sectors_per_cluster_shift + bytes_per_sector.trailing_zeros(),
            root_directory_start_cluster: bs.root_cluster,
            last_cluster: count_of_clusters + 1,
            fs_info_sector: bs.fs_info_sector as u32,
            backup_fs_info_sector: bs.backup_boot_sector as u32 + bs.fs_info_sector as u32,
            volume_label: bs.volume_label,
        };
        self.alloc_search_start = 1;

        debug!(
            "mounted FAT32: {} clusters of {} bytes, data at sector {}",
            count_of_clusters,
            self.bytes_per_cluster(),
            data_start_sector
        );
        Ok(())
    }

    pub fn read_sector(&mut self, sector: u32, buf: &mut [u8]) -> Result<()> {
        self.device
            .read_blocks(Lba(sector as u64), buf)
            .map_err(device_error)
    }

    pub fn write_sector(&mut self, sector: u32, buf: &[u8]) -> Result<()> {
        self.device
            .write_blocks(Lba(sector as u64), buf)
            .map_err(device_error)
    }

    /// Flush the underlying device
    pub fn sync(&mut self) -> Result<()> {
        self.device.flush().map_err(device_error)
    }

    pub fn boot_sector(&mut self) -> Result<BootSector> {
        let mut buf = [0u8; BYTES_PER_SECTOR];
        self.read_sector(0, &mut buf)?;
        Ok(BootSector::unpack(&buf))
    }

    pub fn fs_info(&mut self) -> Result<FsInfo> {
        let mut buf = [0u8; BYTES_PER_SECTOR];
        self.read_sector(self.geo.fs_info_sector, &mut buf)?;
        Ok(FsInfo::unpack(&buf))
    }

    /// Free cluster count recorded in FS-info
    pub fn free_cluster_count(&mut self) -> Result<u32> {
        Ok(self.fs_info()?.free_count)
    }

    // Adjusts the primary FS-info sector and its backup
    fn update_free_cluster_count(&mut self, delta: i64) -> Result<()> {
        let mut buf = [0u8; BYTES_PER_SECTOR];
        for sector in [self.geo.fs_info_sector, self.geo.backup_fs_info_sector] {
            self.read_sector(sector, &mut buf)?;
            let mut info = FsInfo::unpack(&buf);
            if info.free_count == FSI_UNKNOWN {
                continue;
            }
            info.free_count = (info.free_count as i64 + delta).max(0) as u32;
            info.pack_into(&mut buf);
            self.write_sector(sector, &buf)?;
        }
        Ok(())
    }

    fn fat_location(&self, index: u32) -> Result<(u32, usize)> {
        if index < 2 || index >= self.geo.count_of_fat_entries {
            return Err(FatError::FatEntryOutOfRange(index));
        }
        let offset = index * 4;
        let sector = self.geo.reserved_sectors + offset / self.geo.bytes_per_sector;
        Ok((sector, (offset % self.geo.bytes_per_sector) as usize))
    }

    /// Read a FAT entry (28 significant bits)
    pub fn get_fat_entry(&mut self, index: u32) -> Result<u32> {
        let (sector, offset) = self.fat_location(index)?;
        let mut buf = [0u8; BYTES_PER_SECTOR];
        self.read_sector(sector, &mut buf)?;
        let value = read_u32(&buf, offset) & FAT32_MASK;
        #[cfg(feature = "fat_trace")]
        trace!("FAT[{}] -> {:#010x}", index, value);
        Ok(value)
    }

    /// Write a FAT entry into every FAT copy
    pub fn set_fat_entry(&mut self, index: u32, value: u32) -> Result<()> {
        let (sector, offset) = self.fat_location(index)?;
        let mut buf = [0u8; BYTES_PER_SECTOR];
        for fat in 0..self.geo.num_fats {
            let lba = sector + fat * self.geo.fat_size;
            self.read_sector(lba, &mut buf)?;
            let old = read_u32(&buf, offset);
            write_u32(&mut buf, offset, (old & !FAT32_MASK) | (value & FAT32_MASK));
            self.write_sector(lba, &buf)?;
        }
        #[cfg(feature = "fat_trace")]
        trace!("FAT[{}] <- {:#010x}", index, value);
        Ok(())
    }

    /// True if `value` names a data cluster of this volume
    pub fn is_chain_cluster(&self, value: u32) -> bool {
        (2..=self.geo.last_cluster).contains(&value)
    }

    /// Follow one link of a chain; `None` at the end of the chain
    pub fn next_cluster(&mut self, cluster: u32) -> Result<Option<u32>> {
        let next = self.get_fat_entry(cluster)?;
        Ok(self.is_chain_cluster(next).then_some(next))
    }

    /// Allocate one cluster and link it after `current` (0 starts a chain).
    ///
    /// Scans from `current` when it is past the allocation cursor, otherwise
    /// from the cursor; only a scan started at the cursor moves it.
    ///
    /// # Returns
    /// * `Some(cluster)` - the new end of chain
    /// * `None` - no free cluster
    pub fn allocate_cluster(&mut self, current: u32) -> Result<Option<u32>> {
        let (mut found, mut set_start) = if self.alloc_search_start < current {
            (current, false)
        } else {
            (self.alloc_search_start, true)
        };

        loop {
            found += 1;
            if found > self.geo.last_cluster {
                if set_start {
                    return Ok(None);
                }
                found = self.alloc_search_start;
                set_start = true;
                continue;
            }
            if found == current {
                return Ok(None);
            }
            if self.get_fat_entry(found)? == 0 {
                break;
            }
        }

        if set_start {
            self.alloc_search_start = found;
        }
        self.set_fat_entry(found, FAT32_EOC)?;
        if current != 0 {
            self.set_fat_entry(current, found)?;
        }
        self.update_free_cluster_count(-1)?;
        trace!("allocated cluster {} after {}", found, current);
        Ok(Some(found))
    }

    /// Allocate `count` free clusters in one run and chain them.
    ///
    /// # Returns
    /// * `Some(first)` - first cluster of the run
    /// * `None` - no run of that length after the cursor
    pub fn alloc_contiguous(&mut self, count: u32) -> Result<Option<u32>> {
        if count == 0 {
            return Ok(None);
        }
        let mut set_start = true;
        let mut bgn = self.alloc_search_start + 1;
        let mut end = bgn;

        loop {
            if end > self.geo.last_cluster {
                return Ok(None);
            }
            if self.get_fat_entry(end)? != 0 {
                // Free clusters before this one; keep the cursor where it is
                if bgn != end {
                    set_start = false;
                }
                bgn = end + 1;
            } else if end - bgn + 1 == count {
                break;
            }
            end += 1;
        }

        if set_start {
            self.alloc_search_start = end;
        }
        self.set_fat_entry(end, FAT32_EOC)?;
        while end > bgn {
            self.set_fat_entry(end - 1, end)?;
            end -= 1;
        }
        self.update_free_cluster_count(-(count as i64))?;
        debug!("allocated {} contiguous clusters at {}", count, bgn);
        Ok(Some(bgn))
    }

    /// Free every cluster of the chain starting at `cluster`
    pub fn free_chain(&mut self, cluster: u32) -> Result<()> {
        let mut cluster = cluster;
        let mut freed = 0i64;
        loop {
            let next = self.get_fat_entry(cluster)?;
            self.set_fat_entry(cluster, 0)?;
            freed += 1;
            if cluster <= self.alloc_search_start {
                self.alloc_search_start = cluster - 1;
            }
            if !self.is_chain_cluster(next) {
                break;
            }
            cluster = next;
        }
        self.update_free_cluster_count(freed)?;
        trace!("freed {} clusters", freed);
        Ok(())
    }

    /// Zero every sector of a cluster
    pub fn zero_cluster(&mut self, cluster: u32) -> Result<()> {
        let zeros = vec![0u8; self.bytes_per_cluster() as usize];
        let sector = self.cluster_start_sector(cluster);
        self.write_sector(sector, &zeros)
    }

    /// First sector of a data cluster
    pub fn cluster_start_sector(&self, cluster: u32) -> u32 {
        self.geo.data_start_sector + ((cluster - 2) << self.geo.sectors_per_cluster_shift)
    }

    /// Sector within its cluster for a byte position
    pub fn sector_of_cluster(&self, position: u32) -> u32 {
        (position >> 9) & (self.geo.sectors_per_cluster - 1)
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        1 << self.geo.bytes_per_cluster_shift
    }

    pub fn bytes_per_cluster_shift(&self) -> u32 {
        self.geo.bytes_per_cluster_shift
    }

    pub fn sectors_per_cluster(&self) -> u32 {
        self.geo.sectors_per_cluster
    }

    pub fn count_of_clusters(&self) -> u32 {
        self.geo.count_of_clusters
    }

    pub fn last_cluster(&self) -> u32 {
        self.geo.last_cluster
    }

    pub fn root_directory_start_cluster(&self) -> u32 {
        self.geo.root_directory_start_cluster
    }

    pub fn alloc_search_start(&self) -> u32 {
        self.alloc_search_start
    }

    pub fn volume_label(&self) -> String {
        self.geo
            .volume_label
            .iter()
            .map(|&b| b as char)
            .collect::<String>()
            .trim_end()
            .to_string()
    }
}
