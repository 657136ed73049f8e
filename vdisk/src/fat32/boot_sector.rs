//! FAT32 boot sector (BPB)

use super::le::{read_u16, read_u32, write_u16, write_u32};
use super::types::BYTES_PER_SECTOR;

pub const BOOT_SIGNATURE: u16 = 0xAA55;
pub const EXT_BOOT_SIGNATURE: u8 = 0x29;
pub const FS_TYPE_FAT32: [u8; 8] = *b"FAT32   ";

/// Boot sector fields, jump code through signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootSector {
    pub jmp_boot: [u8; 3],
    pub oem_name: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entry_count: u16,
    pub total_sectors_16: u16,
    pub media: u8,
    pub fat_size_16: u16,
    pub sectors_per_track: u16,
    pub num_heads: u16,
    pub hidden_sectors: u32,
    pub total_sectors_32: u32,
    pub fat_size_32: u32,
    pub ext_flags: u16,
    pub fs_version: u16,
    pub root_cluster: u32,
    pub fs_info_sector: u16,
    pub backup_boot_sector: u16,
    pub drive_number: u8,
    pub boot_signature: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],
    pub signature: u16,
}

impl BootSector {
    pub fn unpack(buf: &[u8]) -> Self {
        let mut jmp_boot = [0u8; 3];
        jmp_boot.copy_from_slice(&buf[0x00..0x03]);
        let mut oem_name = [0u8; 8];
        oem_name.copy_from_slice(&buf[0x03..0x0B]);
        let mut volume_label = [0u8; 11];
        volume_label.copy_from_slice(&buf[0x47..0x52]);
        let mut fs_type = [0u8; 8];
        fs_type.copy_from_slice(&buf[0x52..0x5A]);

        Self {
            jmp_boot,
            oem_name,
            bytes_per_sector: read_u16(buf, 0x0B),
            sectors_per_cluster: buf[0x0D],
            reserved_sectors: read_u16(buf, 0x0E),
            num_fats: buf[0x10],
            root_entry_count: read_u16(buf, 0x11),
            total_sectors_16: read_u16(buf, 0x13),
            media: buf[0x15],
            fat_size_16: read_u16(buf, 0x16),
            sectors_per_track: read_u16(buf, 0x18),
            num_heads: read_u16(buf, 0x1A),
            hidden_sectors: read_u32(buf, 0x1C),
            total_sectors_32: read_u32(buf, 0x20),
            fat_size_32: read_u32(buf, 0x24),
            ext_flags: read_u16(buf, 0x28),
            fs_version: read_u16(buf, 0x2A),
            root_cluster: read_u32(buf, 0x2C),
            fs_info_sector: read_u16(buf, 0x30),
            backup_boot_sector: read_u16(buf, 0x32),
            drive_number: buf[0x40],
            boot_signature: buf[0x42],
            volume_id: read_u32(buf, 0x43),
            volume_label,
            fs_type,
            signature: read_u16(buf, 0x1FE),
        }
    }

    pub fn pack(&self) -> [u8; BYTES_PER_SECTOR] {
        let mut buf = [0u8; BYTES_PER_SECTOR];
        buf[0x00..0x03].copy_from_slice(&self.jmp_boot);
        buf[0x03..0x0B].copy_from_slice(&self.oem_name);
        write_u16(&mut buf, 0x0B, self.bytes_per_sector);
        buf[0x0D] = self.sectors_per_cluster;
        write_u16(&mut buf, 0x0E, self.reserved_sectors);
        buf[0x10] = self.num_fats;
        write_u16(&mut buf, 0x11, self.root_entry_count);
        write_u16(&mut buf, 0x13, self.total_sectors_16);
        buf[0x15] = self.media;
        write_u16(&mut buf, 0x16, self.fat_size_16);
        write_u16(&mut buf, 0x18, self.sectors_per_track);
        write_u16(&mut buf, 0x1A, self.num_heads);
        write_u32(&mut buf, 0x1C, self.hidden_sectors);
        write_u32(&mut buf, 0x20, self.total_sectors_32);
        write_u32(&mut buf, 0x24, self.fat_size_32);
        write_u16(&mut buf, 0x28, self.ext_flags);
        write_u16(&mut buf, 0x2A, self.fs_version);
        write_u32(&mut buf, 0x2C, self.root_cluster);
        write_u16(&mut buf, 0x30, self.fs_info_sector);
        write_u16(&mut buf, 0x32, self.backup_boot_sector);
        buf[0x40] = self.drive_number;
        buf[0x42] = self.boot_signature;
        write_u32(&mut buf, 0x43, self.volume_id);
        buf[0x47..0x52].copy_from_slice(&self.volume_label);
        buf[0x52..0x5A].copy_from_slice(&self.fs_type);
        write_u16(&mut buf, 0x1FE, self.signature);
        buf
    }

    /// Total sectors, whichever field holds it
    pub fn total_sectors(&self) -> u32 {
        if self.total_sectors_16 != 0 {
            self.total_sectors_16 as u32
        } else {
            self.total_sectors_32
        }
    }

    /// Sanity checks before trusting the geometry
    pub fn is_valid_fat32(&self) -> bool {
        self.signature == BOOT_SIGNATURE
            && self.bytes_per_sector as usize == BYTES_PER_SECTOR
            && self.sectors_per_cluster.is_power_of_two()
            && self.reserved_sectors != 0
            && self.num_fats != 0
            && self.fat_size_16 == 0
            && self.fat_size_32 != 0
            && self.root_entry_count == 0
    }
}
