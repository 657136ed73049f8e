//! Short and long directory entries

use super::le::{read_u16, read_u32, write_u16, write_u32};
use super::types::{
    FatAttributes, DIR_ENTRY_SIZE, DIR_NAME_DELETED, DIR_NAME_FREE, LFN_CHARS_PER_ENTRY,
};

/// NT reserved byte: base name is lower case
pub const NT_LC_BASE: u8 = 0x08;
/// NT reserved byte: extension is lower case
pub const NT_LC_EXT: u8 = 0x10;

/// 32-byte short (8.3) directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirEntry {
    pub name: [u8; 11],
    pub attributes: u8,
    /// Case flags for the short name
    pub nt_res: u8,
    pub create_time_tenth: u8,
    pub create_time: u16,
    pub create_date: u16,
    pub access_date: u16,
    pub first_cluster_high: u16,
    pub write_time: u16,
    pub write_date: u16,
    pub first_cluster_low: u16,
    pub file_size: u32,
}

impl DirEntry {
    pub fn unpack(buf: &[u8], offset: usize) -> Self {
        let b = &buf[offset..offset + DIR_ENTRY_SIZE];
        let mut name = [0u8; 11];
        name.copy_from_slice(&b[0..11]);
        Self {
            name,
            attributes: b[11],
            nt_res: b[12],
            create_time_tenth: b[13],
            create_time: read_u16(b, 14),
            create_date: read_u16(b, 16),
            access_date: read_u16(b, 18),
            first_cluster_high: read_u16(b, 20),
            write_time: read_u16(b, 22),
            write_date: read_u16(b, 24),
            first_cluster_low: read_u16(b, 26),
            file_size: read_u32(b, 28),
        }
    }

    pub fn pack_into(&self, buf: &mut [u8], offset: usize) {
        let b = &mut buf[offset..offset + DIR_ENTRY_SIZE];
        b[0..11].copy_from_slice(&self.name);
        b[11] = self.attributes;
        b[12] = self.nt_res;
        b[13] = self.create_time_tenth;
        write_u16(b, 14, self.create_time);
        write_u16(b, 16, self.create_date);
        write_u16(b, 18, self.access_date);
        write_u16(b, 20, self.first_cluster_high);
        write_u16(b, 22, self.write_time);
        write_u16(b, 24, self.write_date);
        write_u16(b, 26, self.first_cluster_low);
        write_u32(b, 28, self.file_size);
    }

    pub fn first_cluster(&self) -> u32 {
        ((self.first_cluster_high as u32) << 16) | self.first_cluster_low as u32
    }

    pub fn set_first_cluster(&mut self, cluster: u32) {
        self.first_cluster_high = (cluster >> 16) as u16;
        self.first_cluster_low = (cluster & 0xFFFF) as u16;
    }

    pub fn attrs(&self) -> FatAttributes {
        FatAttributes::from_bits_truncate(self.attributes)
    }

    /// End-of-directory marker
    pub fn is_free(&self) -> bool {
        self.name[0] == DIR_NAME_FREE
    }

    pub fn is_deleted(&self) -> bool {
        self.name[0] == DIR_NAME_DELETED
    }

    pub fn is_long_name(&self) -> bool {
        is_long_name(self.attributes)
    }

    /// Live short entry that names a file or directory (not a volume label)
    pub fn is_file_or_subdir(&self) -> bool {
        !self.is_free()
            && !self.is_deleted()
            && !self.attrs().contains(FatAttributes::VOLUME_ID)
    }

    pub fn is_subdir(&self) -> bool {
        self.is_file_or_subdir() && self.attrs().contains(FatAttributes::DIRECTORY)
    }

    pub fn is_file(&self) -> bool {
        self.is_file_or_subdir() && !self.attrs().contains(FatAttributes::DIRECTORY)
    }

    /// "." or ".."
    pub fn is_dot(&self) -> bool {
        self.name[0] == b'.'
    }

    /// Printable 8.3 name honouring the lower-case flags
    pub fn short_name(&self) -> String {
        let mut base: String = self.name[..8]
            .iter()
            .map(|&b| b as char)
            .collect::<String>()
            .trim_end()
            .to_string();
        let mut ext: String = self.name[8..]
            .iter()
            .map(|&b| b as char)
            .collect::<String>()
            .trim_end()
            .to_string();
        if self.nt_res & NT_LC_BASE != 0 {
            base = base.to_ascii_lowercase();
        }
        if self.nt_res & NT_LC_EXT != 0 {
            ext = ext.to_ascii_lowercase();
        }
        if ext.is_empty() {
            base
        } else {
            format!("{}.{}", base, ext)
        }
    }
}

/// Attribute byte marks a long-name entry
pub fn is_long_name(attributes: u8) -> bool {
    attributes & 0x3F == FatAttributes::LONG_NAME.bits()
}

/// 32-byte long-name entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongNameEntry {
    /// Sequence number; bit 6 marks the last (first stored) entry
    pub ord: u8,
    pub name1: [u16; 5],
    pub attributes: u8,
    pub entry_type: u8,
    pub checksum: u8,
    pub name2: [u16; 6],
    pub first_cluster_low: u16,
    pub name3: [u16; 2],
}

impl LongNameEntry {
    pub fn new(ord: u8, checksum: u8, chars: &[u16; LFN_CHARS_PER_ENTRY]) -> Self {
        let mut entry = Self {
            ord,
            name1: [0; 5],
            attributes: FatAttributes::LONG_NAME.bits(),
            entry_type: 0,
            checksum,
            name2: [0; 6],
            first_cluster_low: 0,
            name3: [0; 2],
        };
        entry.set_chars(chars);
        entry
    }

    pub fn unpack(buf: &[u8], offset: usize) -> Self {
        let b = &buf[offset..offset + DIR_ENTRY_SIZE];
        let mut name1 = [0u16; 5];
        let mut name2 = [0u16; 6];
        let mut name3 = [0u16; 2];
        for (i, c) in name1.iter_mut().enumerate() {
            *c = read_u16(b, 1 + i * 2);
        }
        for (i, c) in name2.iter_mut().enumerate() {
            *c = read_u16(b, 14 + i * 2);
        }
        for (i, c) in name3.iter_mut().enumerate() {
            *c = read_u16(b, 28 + i * 2);
        }
        Self {
            ord: b[0],
            name1,
            attributes: b[11],
            entry_type: b[12],
            checksum: b[13],
            name2,
            first_cluster_low: read_u16(b, 26),
            name3,
        }
    }

    pub fn pack_into(&self, buf: &mut [u8], offset: usize) {
        let b = &mut buf[offset..offset + DIR_ENTRY_SIZE];
        b[0] = self.ord;
        for (i, &c) in self.name1.iter().enumerate() {
            write_u16(b, 1 + i * 2, c);
        }
        b[11] = self.attributes;
        b[12] = self.entry_type;
        b[13] = self.checksum;
        for (i, &c) in self.name2.iter().enumerate() {
            write_u16(b, 14 + i * 2, c);
        }
        write_u16(b, 26, self.first_cluster_low);
        for (i, &c) in self.name3.iter().enumerate() {
            write_u16(b, 28 + i * 2, c);
        }
    }

    /// The 13 UTF-16 units in name order
    pub fn chars(&self) -> [u16; LFN_CHARS_PER_ENTRY] {
        let mut out = [0u16; LFN_CHARS_PER_ENTRY];
        out[..5].copy_from_slice(&self.name1);
        out[5..11].copy_from_slice(&self.name2);
        out[11..].copy_from_slice(&self.name3);
        out
    }

    pub fn set_chars(&mut self, chars: &[u16; LFN_CHARS_PER_ENTRY]) {
        self.name1.copy_from_slice(&chars[..5]);
        self.name2.copy_from_slice(&chars[5..11]);
        self.name3.copy_from_slice(&chars[11..]);
    }
}
