//! CIM header layout
//!
//! All multi-byte fields are little-endian.
//!
//! | Offset          | Size  | Field                                   |
//! |-----------------|-------|-----------------------------------------|
//! | 0x00            | 4     | Magic "CIMF"                            |
//! | 0x04            | 1     | Version major                           |
//! | 0x05            | 1     | Version minor                           |
//! | 0x06            | 1     | Sector size in 512-byte units (1)       |
//! | 0x07            | 2     | Logical cluster count                   |
//! | 0x09            | 1     | Cluster size multiplier (x 64 KB)       |
//! | 0x0B            | 2     | Allocated physical clusters             |
//! | 0x0D            | 2     | Declared size in MB                     |
//! | 0x0F            | 2     | Flags (nonzero = read-only)             |
//! | 0x11            | 65520 | Cluster map, 0xFFFF = unallocated       |
//!
//! The map runs one byte past the 64 KB header region. Only the region is
//! persisted; the last entry is never allocatable and unpacks as unallocated.

use super::error::{CimError, Result};

/// Container magic
pub const CIM_MAGIC: [u8; 4] = *b"CIMF";
/// Format version (major)
pub const CIM_VERSION_MAJOR: u8 = 1;
/// Format version (minor)
pub const CIM_VERSION_MINOR: u8 = 0;
/// Sector size in 512-byte units
pub const CIM_SECTOR_SIZE_UNITS: u8 = 1;
/// Bytes per logical sector
pub const SECTOR_SIZE: usize = 512;
/// Number of cluster map entries
pub const MAX_CLUSTERS: usize = 32760;
/// Base cluster size (multiplier 1)
pub const CLUSTER_BASE_SIZE: usize = 0x1_0000;
/// Header region size; physical clusters start here
pub const HEADER_REGION_SIZE: usize = 0x1_0000;
/// Cluster map sentinel for "unallocated"
pub const UNALLOCATED: u16 = 0xFFFF;
/// Smallest container size in MB
pub const MIN_SIZE_MB: u32 = 64;
/// Largest container size in MB
pub const MAX_SIZE_MB: u32 = 16384;
/// Allowed cluster size multipliers
pub const CLUSTER_MULTIPLIERS: [u8; 5] = [1, 2, 4, 8, 16];

const OFF_MAGIC: usize = 0x00;
const OFF_VERSION_MAJOR: usize = 0x04;
const OFF_VERSION_MINOR: usize = 0x05;
const OFF_SECTOR_SIZE: usize = 0x06;
const OFF_CLUSTER_COUNT: usize = 0x07;
const OFF_CLUSTER_SIZE: usize = 0x09;
const OFF_MAX_CLUSTERS: usize = 0x0B;
const OFF_MAX_SIZE: usize = 0x0D;
const OFF_FLAGS: usize = 0x0F;
const OFF_CLUSTER_MAP: usize = 0x11;

/// In-memory copy of a CIM header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CimInfo {
    pub magic: [u8; 4],
    pub version_major: u8,
    pub version_minor: u8,
    /// Sector size in 512-byte units
    pub sector_size: u8,
    /// Logical clusters covering the declared size
    pub cluster_count: u16,
    /// Cluster size multiplier (1, 2, 4, 8 or 16)
    pub cluster_size: u8,
    /// Physical clusters allocated so far
    pub max_clusters: u16,
    /// Declared size in MB
    pub max_size: u16,
    /// Nonzero marks the container read-only
    pub flags: u16,
    /// Logical -> physical cluster map
    pub cluster_map: Vec<u16>,
}

impl CimInfo {
    /// Header for a fresh container of `size_mb` megabytes
    pub fn new(size_mb: u32, read_only: bool) -> Result<Self> {
        let (cluster_size, cluster_count) = cluster_geometry(size_mb)?;
        Ok(Self {
            magic: CIM_MAGIC,
            version_major: CIM_VERSION_MAJOR,
            version_minor: CIM_VERSION_MINOR,
            sector_size: CIM_SECTOR_SIZE_UNITS,
            cluster_count,
            cluster_size,
            max_clusters: 0,
            max_size: size_mb as u16,
            flags: if read_only { 1 } else { 0 },
            cluster_map: vec![UNALLOCATED; MAX_CLUSTERS],
        })
    }

    /// Parse a header region
    pub fn unpack(buf: &[u8]) -> Result<Self> {
        if buf.len() < OFF_CLUSTER_MAP {
            return Err(CimError::InvalidHeader);
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&buf[OFF_MAGIC..OFF_MAGIC + 4]);
        if magic != CIM_MAGIC {
            return Err(CimError::BadMagic);
        }

        let sector_size = buf[OFF_SECTOR_SIZE];
        if sector_size != CIM_SECTOR_SIZE_UNITS {
            return Err(CimError::UnsupportedSectorSize(sector_size));
        }

        let cluster_size = buf[OFF_CLUSTER_SIZE];
        if !CLUSTER_MULTIPLIERS.contains(&cluster_size) {
            return Err(CimError::InvalidHeader);
        }

        let cluster_count = read_u16(buf, OFF_CLUSTER_COUNT);
        if cluster_count as usize >= MAX_CLUSTERS {
            return Err(CimError::InvalidHeader);
        }

        // Declared size must agree with the map geometry
        let max_size = read_u16(buf, OFF_MAX_SIZE);
        match cluster_geometry(max_size as u32) {
            Ok(geometry) if geometry == (cluster_size, cluster_count) => {}
            _ => return Err(CimError::InvalidHeader),
        }

        // Missing tail bytes read as 0xFF so a truncated last entry stays unallocated
        let cluster_map = (0..MAX_CLUSTERS)
            .map(|i| {
                let off = OFF_CLUSTER_MAP + i * 2;
                let lo = buf.get(off).copied().unwrap_or(0xFF);
                let hi = buf.get(off + 1).copied().unwrap_or(0xFF);
                u16::from_le_bytes([lo, hi])
            })
            .collect();

        Ok(Self {
            magic,
            version_major: buf[OFF_VERSION_MAJOR],
            version_minor: buf[OFF_VERSION_MINOR],
            sector_size,
            cluster_count,
            cluster_size,
            max_clusters: read_u16(buf, OFF_MAX_CLUSTERS),
            max_size,
            flags: read_u16(buf, OFF_FLAGS),
            cluster_map,
        })
    }

    /// Serialize into a full header region
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_REGION_SIZE];
        buf[OFF_MAGIC..OFF_MAGIC + 4].copy_from_slice(&self.magic);
        buf[OFF_VERSION_MAJOR] = self.version_major;
        buf[OFF_VERSION_MINOR] = self.version_minor;
        buf[OFF_SECTOR_SIZE] = self.sector_size;
        write_u16(&mut buf, OFF_CLUSTER_COUNT, self.cluster_count);
        buf[OFF_CLUSTER_SIZE] = self.cluster_size;
        write_u16(&mut buf, OFF_MAX_CLUSTERS, self.max_clusters);
        write_u16(&mut buf, OFF_MAX_SIZE, self.max_size);
        write_u16(&mut buf, OFF_FLAGS, self.flags);

        for (i, entry) in self.cluster_map.iter().enumerate() {
            for (j, byte) in entry.to_le_bytes().into_iter().enumerate() {
                if let Some(slot) = buf.get_mut(OFF_CLUSTER_MAP + i * 2 + j) {
                    *slot = byte;
                }
            }
        }
        buf
    }

    pub fn is_read_only(&self) -> bool {
        self.flags != 0
    }

    /// Bytes per physical/logical cluster
    pub fn cluster_bytes(&self) -> usize {
        CLUSTER_BASE_SIZE * self.cluster_size as usize
    }

    /// 512-byte sectors per cluster
    pub fn sectors_per_cluster(&self) -> u32 {
        (self.cluster_bytes() / SECTOR_SIZE) as u32
    }

    /// Addressable 512-byte sectors
    pub fn max_sectors(&self) -> u32 {
        self.max_size as u32 * 2048
    }

    /// Number of map entries that point at a physical cluster
    pub fn allocated_count(&self) -> usize {
        self.cluster_map.iter().filter(|&&e| e != UNALLOCATED).count()
    }
}

/// Pick the smallest cluster multiplier whose cluster count fits the map.
///
/// # Returns
/// * `(multiplier, cluster_count)`
pub fn cluster_geometry(size_mb: u32) -> Result<(u8, u16)> {
    if !(MIN_SIZE_MB..=MAX_SIZE_MB).contains(&size_mb) {
        return Err(CimError::InvalidSize(size_mb));
    }
    for mult in CLUSTER_MULTIPLIERS {
        let count = size_mb as usize * 1024 / (mult as usize * 64);
        if count < MAX_CLUSTERS {
            return Ok((mult, count as u16));
        }
    }
    Err(CimError::InvalidSize(size_mb))
}

fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn write_u16(buf: &mut [u8], off: usize, value: u16) {
    buf[off..off + 2].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_geometry_tiers() {
        let cases = [
            (64, 1, 1024),
            (128, 1, 2048),
            (256, 1, 4096),
            (512, 1, 8192),
            (1024, 1, 16384),
            (2048, 2, 16384),
            (4096, 4, 16384),
            (8192, 8, 16384),
            (16384, 16, 16384),
        ];
        for (mb, mult, count) in cases {
            assert_eq!(cluster_geometry(mb).unwrap(), (mult, count), "{} MB", mb);
        }
    }

    #[test]
    fn test_cluster_count_stays_below_map_size() {
        // 4095 MB at multiplier 2 would need exactly 32760 entries
        let (mult, count) = cluster_geometry(4095).unwrap();
        assert_eq!(mult, 4);
        assert!((count as usize) < MAX_CLUSTERS);
    }

    #[test]
    fn test_cluster_geometry_rejects_out_of_range() {
        assert!(matches!(cluster_geometry(63), Err(CimError::InvalidSize(63))));
        assert!(matches!(
            cluster_geometry(16385),
            Err(CimError::InvalidSize(16385))
        ));
    }

    #[test]
    fn test_pack_layout() {
        let mut info = CimInfo::new(128, true).unwrap();
        info.cluster_map[0] = 0;
        info.cluster_map[3] = 1;
        info.max_clusters = 2;
        let buf = info.pack();

        assert_eq!(buf.len(), HEADER_REGION_SIZE);
        assert_eq!(&buf[0..4], b"CIMF");
        assert_eq!(buf[4], 1);
        assert_eq!(buf[5], 0);
        assert_eq!(buf[6], 1);
        assert_eq!(&buf[7..9], &2048u16.to_le_bytes());
        assert_eq!(buf[9], 1);
        assert_eq!(&buf[0x0B..0x0D], &2u16.to_le_bytes());
        assert_eq!(&buf[0x0D..0x0F], &128u16.to_le_bytes());
        assert_eq!(&buf[0x0F..0x11], &1u16.to_le_bytes());
        assert_eq!(&buf[0x11..0x13], &[0, 0]);
        assert_eq!(&buf[0x13..0x15], &[0xFF, 0xFF]);
        assert_eq!(&buf[0x17..0x19], &[1, 0]);
    }

    #[test]
    fn test_header_round_trip() {
        let mut info = CimInfo::new(2048, false).unwrap();
        for (phys, logical) in [5usize, 17, 9000].iter().enumerate() {
            info.cluster_map[*logical] = phys as u16;
        }
        info.max_clusters = 3;
        let parsed = CimInfo::unpack(&info.pack()).unwrap();
        assert_eq!(parsed, info);
    }

    #[test]
    fn test_unpack_rejects_sector_size() {
        let mut buf = CimInfo::new(64, false).unwrap().pack();
        buf[6] = 2;
        assert!(matches!(
            CimInfo::unpack(&buf),
            Err(CimError::UnsupportedSectorSize(2))
        ));
    }

    #[test]
    fn test_unpack_rejects_size_disagreeing_with_map() {
        let mut buf = CimInfo::new(64, false).unwrap().pack();
        buf[0x0D..0x0F].copy_from_slice(&16384u16.to_le_bytes());
        assert!(matches!(CimInfo::unpack(&buf), Err(CimError::InvalidHeader)));

        let mut buf = CimInfo::new(2048, false).unwrap().pack();
        buf[9] = 1;
        assert!(matches!(CimInfo::unpack(&buf), Err(CimError::InvalidHeader)));
    }

    #[test]
    fn test_unpack_rejects_magic() {
        let mut buf = CimInfo::new(64, false).unwrap().pack();
        buf[0] = b'X';
        assert!(matches!(CimInfo::unpack(&buf), Err(CimError::BadMagic)));
    }
}
