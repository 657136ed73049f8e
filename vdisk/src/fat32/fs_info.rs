//! FS-info sector

use super::le::{read_u32, write_u32};
use super::types::BYTES_PER_SECTOR;

pub const FSI_LEAD_SIG: u32 = 0x4161_5252;
pub const FSI_STRUC_SIG: u32 = 0x6141_7272;
pub const FSI_TRAIL_SIG: u32 = 0xAA55_0000;
/// Free count / next-free value meaning "unknown"
pub const FSI_UNKNOWN: u32 = 0xFFFF_FFFF;

const OFF_LEAD_SIG: usize = 0;
const OFF_STRUC_SIG: usize = 484;
const OFF_FREE_COUNT: usize = 488;
const OFF_NEXT_FREE: usize = 492;
const OFF_TRAIL_SIG: usize = 508;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsInfo {
    pub lead_sig: u32,
    pub struc_sig: u32,
    pub free_count: u32,
    pub next_free: u32,
    pub trail_sig: u32,
}

impl FsInfo {
    pub fn new(free_count: u32) -> Self {
        Self {
            lead_sig: FSI_LEAD_SIG,
            struc_sig: FSI_STRUC_SIG,
            free_count,
            next_free: FSI_UNKNOWN,
            trail_sig: FSI_TRAIL_SIG,
        }
    }

    pub fn unpack(buf: &[u8]) -> Self {
        Self {
            lead_sig: read_u32(buf, OFF_LEAD_SIG),
            struc_sig: read_u32(buf, OFF_STRUC_SIG),
            free_count: read_u32(buf, OFF_FREE_COUNT),
            next_free: read_u32(buf, OFF_NEXT_FREE),
            trail_sig: read_u32(buf, OFF_TRAIL_SIG),
        }
    }

    pub fn pack(&self) -> [u8; BYTES_PER_SECTOR] {
        let mut buf = [0u8; BYTES_PER_SECTOR];
        self.pack_into(&mut buf);
        buf
    }

    /// Write the fields into an existing sector, leaving reserved bytes alone
    pub fn pack_into(&self, buf: &mut [u8]) {
        write_u32(buf, OFF_LEAD_SIG, self.lead_sig);
        write_u32(buf, OFF_STRUC_SIG, self.struc_sig);
        write_u32(buf, OFF_FREE_COUNT, self.free_count);
        write_u32(buf, OFF_NEXT_FREE, self.next_free);
        write_u32(buf, OFF_TRAIL_SIG, self.trail_sig);
    }

    pub fn is_valid(&self) -> bool {
        self.lead_sig == FSI_LEAD_SIG
            && self.struc_sig == FSI_STRUC_SIG
            && self.trail_sig == FSI_TRAIL_SIG
    }
}
