//! Error types for CIM container operations

use core::fmt;
use std::io;

/// Result type for CIM container operations
pub type Result<T> = core::result::Result<T, CimError>;

/// Errors raised by the CIM container
#[derive(Debug)]
pub enum CimError {
    /// Container name is empty or blank
    InvalidName,

    /// Requested size outside 64 MB ..= 16 GB
    InvalidSize(u32),

    /// Flat image length is not a whole number of megabytes
    InvalidImageSize(u64),

    /// Write attempted on a read-only container
    ReadOnly,

    /// Sector index beyond the declared size
    SectorOutOfRange(u32),

    /// Logical cluster index beyond the cluster map
    ClusterOutOfRange(u32),

    /// Buffer passed to a sector write is not 512 bytes
    InvalidBufferSize(usize),

    /// Header does not start with "CIMF"
    BadMagic,

    /// Stored sector size is not 512 bytes
    UnsupportedSectorSize(u8),

    /// Header region is truncated or a field is out of range
    InvalidHeader,

    /// Two logical clusters share one physical cluster
    ClusterAliasing {
        /// Shared physical cluster
        physical: u16,
        /// Logical cluster that claimed it first
        first: u16,
        /// Logical cluster that claimed it again
        second: u16,
    },

    /// Physical pointer beyond the allocated clusters
    ClusterOutOfBounds {
        /// Logical cluster holding the pointer
        logical: u16,
        /// Offending physical index
        physical: u16,
        /// Number of allocated clusters
        allocated: u16,
    },

    /// Host file I/O failed
    Io(io::Error),
}

impl fmt::Display for CimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName => write!(f, "Invalid name: container name cannot be empty"),
            Self::InvalidSize(mb) => write!(
                f,
                "Invalid size: {} MB (must be between 64 MB and 16 GB)",
                mb
            ),
            Self::InvalidImageSize(len) => write!(
                f,
                "Invalid image file size: {} bytes is not a whole number of MB",
                len
            ),
            Self::ReadOnly => write!(f, "Container is read-only"),
            Self::SectorOutOfRange(i) => write!(f, "Sector index {} out of range", i),
            Self::ClusterOutOfRange(i) => write!(f, "Cluster index {} out of range", i),
            Self::InvalidBufferSize(len) => {
                write!(f, "Sector buffer must be 512 bytes, got {}", len)
            }
            Self::BadMagic => write!(f, "Not a CIM container (bad magic)"),
            Self::UnsupportedSectorSize(units) => write!(
                f,
                "Unsupported sector size: {} x 512 bytes (only 512-byte sectors are supported)",
                units
            ),
            Self::InvalidHeader => write!(f, "Corrupted CIM header"),
            Self::ClusterAliasing {
                physical,
                first,
                second,
            } => write!(
                f,
                "Corrupted cluster map: physical cluster {} is shared by logical clusters {} and {}",
                physical, first, second
            ),
            Self::ClusterOutOfBounds {
                logical,
                physical,
                allocated,
            } => write!(
                f,
                "Corrupted cluster map: logical cluster {} points to physical cluster {} (only {} allocated)",
                logical, physical, allocated
            ),
            Self::Io(e) => write!(f, "Host I/O error: {}", e),
        }
    }
}

impl std::error::Error for CimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CimError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl CimError {
    /// True for cluster-map corruption detected on load
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::ClusterAliasing { .. } | Self::ClusterOutOfBounds { .. } | Self::InvalidHeader
        )
    }
}
