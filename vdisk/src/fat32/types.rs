//! FAT32 constants and flag types

use bitflags::bitflags;

pub const BYTES_PER_SECTOR: usize = 512;
pub const DIR_ENTRY_SIZE: usize = 32;
/// Directory entries in one sector
pub const DIR_ENTRIES_PER_SECTOR: usize = BYTES_PER_SECTOR / DIR_ENTRY_SIZE;

/// Smallest cluster count that makes a volume FAT32
pub const FAT32_MIN_CLUSTERS: u32 = 65525;
/// Canonical end-of-chain value
pub const FAT32_EOC: u32 = 0x0FFF_FFFF;
/// FAT32 entries use the low 28 bits
pub const FAT32_MASK: u32 = 0x0FFF_FFFF;

/// Largest directory, in bytes
pub const MAX_DIR_SIZE: u32 = 512 * 4095;
/// UTF-16 units per long-name entry
pub const LFN_CHARS_PER_ENTRY: usize = 13;
/// Longest long name in UTF-16 units
pub const MAX_LFN_LEN: usize = 255;

/// First name byte of a deleted entry
pub const DIR_NAME_DELETED: u8 = 0xE5;
/// First name byte of the end-of-directory marker
pub const DIR_NAME_FREE: u8 = 0x00;
/// Terminal bit of a long-name order byte
pub const LFN_LAST_ENTRY: u8 = 0x40;
/// Sequence bits of a long-name order byte
pub const LFN_ORD_MASK: u8 = 0x1F;

bitflags! {
    /// Attribute byte of a directory entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FatAttributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
    }
}

impl FatAttributes {
    /// Attribute value marking a long-name entry
    pub const LONG_NAME: Self = Self::from_bits_retain(0x0F);
    /// Bits carried between the directory entry and an open handle
    pub const COPY: Self = Self::from_bits_retain(0x37);
}

bitflags! {
    /// Attributes of an open handle
    ///
    /// The low bits mirror the on-disk attribute byte; `FILE` and `ROOT32`
    /// only exist in memory.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HandleAttributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const FILE = 0x08;
        const SUBDIR = 0x10;
        const ARCHIVE = 0x20;
        const ROOT32 = 0x80;
    }
}

impl HandleAttributes {
    pub const DIR: Self = Self::SUBDIR.union(Self::ROOT32);
}

bitflags! {
    /// State flags of an open handle
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FileFlags: u8 {
        const READ = 0x01;
        const WRITE = 0x02;
        const APPEND = 0x08;
        const CONTIGUOUS = 0x40;
        const DIR_DIRTY = 0x80;
    }
}

bitflags! {
    /// Open flags
    ///
    /// The low two bits select the access mode: no bits set is read-only.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const WRITE_ONLY = 0x01;
        const READ_WRITE = 0x02;
        const APPEND = 0x08;
        const CREATE = 0x0200;
        const TRUNCATE = 0x0400;
        const EXCLUSIVE = 0x0800;
        const AT_END = 0x4000;
    }
}

/// Access mode selected by the low bits of [`OpenFlags`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

impl OpenFlags {
    pub const READ_ONLY: Self = Self::empty();
    const ACCESS_MASK: u32 = 0x03;

    /// `None` when both access bits are set
    pub fn access_mode(self) -> Option<AccessMode> {
        match self.bits() & Self::ACCESS_MASK {
            0 => Some(AccessMode::Read),
            1 => Some(AccessMode::Write),
            2 => Some(AccessMode::ReadWrite),
            _ => None,
        }
    }

    pub fn is_write_mode(self) -> bool {
        matches!(
            self.access_mode(),
            Some(AccessMode::Write | AccessMode::ReadWrite)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_mode() {
        assert_eq!(OpenFlags::READ_ONLY.access_mode(), Some(AccessMode::Read));
        assert_eq!(
            (OpenFlags::READ_WRITE | OpenFlags::CREATE).access_mode(),
            Some(AccessMode::ReadWrite)
        );
        assert_eq!(
            (OpenFlags::WRITE_ONLY | OpenFlags::READ_WRITE).access_mode(),
            None
        );
        assert!(!OpenFlags::TRUNCATE.is_write_mode());
        assert!(OpenFlags::WRITE_ONLY.is_write_mode());
    }

    #[test]
    fn test_long_name_attribute() {
        assert_eq!(FatAttributes::LONG_NAME.bits(), 0x0F);
        assert!(FatAttributes::LONG_NAME.contains(FatAttributes::VOLUME_ID));
    }
}
