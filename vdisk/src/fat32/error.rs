//! FAT32 error types

use core::fmt;

/// Result type for FAT32 operations
pub type Result<T> = core::result::Result<T, FatError>;

/// Reasons a name or path cannot be stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameError {
    Blank,
    LeadingOrTrailingSpace,
    TrailingDot,
    TooLong,
    ReservedCharacter(char),
    EmptySegment,
    /// Conflict sequence would need a `~1000` suffix
    SequenceOutOfRange(u32),
    /// Nothing usable is left for the 8.3 base name
    NoShortName,
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blank => write!(f, "name is blank"),
            Self::LeadingOrTrailingSpace => write!(f, "name starts or ends with a space"),
            Self::TrailingDot => write!(f, "name ends with a dot"),
            Self::TooLong => write!(f, "name exceeds 255 characters"),
            Self::ReservedCharacter(c) => write!(f, "reserved character {:?} in name", c),
            Self::EmptySegment => write!(f, "empty path segment"),
            Self::SequenceOutOfRange(n) => write!(f, "short name sequence {} out of range", n),
            Self::NoShortName => write!(f, "no short name can be derived"),
        }
    }
}

/// FAT32 volume and file errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatError {
    /// Block device read or write failed
    IoError,
    /// Boot sector is not a FAT32 boot sector
    InvalidBootSector,
    /// Device block size is not 512 bytes
    InvalidBlockSize,
    /// Fewer than 65525 clusters
    VolumeTooSmall(u32),
    /// More sectors than a FAT32 boot sector can describe
    VolumeTooLarge,
    /// FAT index outside the table
    FatEntryOutOfRange(u32),
    AlreadyOpen,
    NotADirectory,
    NotOpen,
    NotAFile,
    SeekPastEndOfFile,
    /// Chain ended before the requested position
    SeekPastEndOfChain,
    /// Cluster chain ends before the end of the file
    BrokenChain,
    NoRead,
    NoWrite,
    /// No room for the long-name entries
    LfnCreateFailed,
    NotFound,
    AlreadyExists,
    InvalidFlags,
    /// Entry is read-only or a directory and cannot be opened for write
    ReadOnlyEntry,
    DirectoryFull,
    DirectoryNotEmpty,
    DiskFull,
    /// Write would grow the file past 4 GiB - 1
    FileTooLarge,
    /// Pre-allocation requested for a file that already has clusters
    AlreadyAllocated,
    /// Every `~N` short name variant is taken
    NoUniqueShortName,
    InvalidName(NameError),
}

impl fmt::Display for FatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError => write!(f, "I/O error on block device"),
            Self::InvalidBootSector => write!(f, "Invalid FAT32 boot sector"),
            Self::VolumeTooSmall(count) => write!(
                f,
                "Volume has {} clusters, FAT32 needs at least 65525",
                count
            ),
            Self::InvalidBlockSize => write!(f, "Block size must be 512 bytes"),
            Self::VolumeTooLarge => write!(f, "Volume too large for FAT32"),
            Self::FatEntryOutOfRange(i) => write!(f, "FAT entry {} out of range", i),
            Self::AlreadyOpen => write!(f, "File is already open"),
            Self::NotADirectory => write!(f, "Not a directory"),
            Self::NotOpen => write!(f, "File is not open"),
            Self::NotAFile => write!(f, "Not a file"),
            Self::SeekPastEndOfFile => write!(f, "Seek past end of file"),
            Self::SeekPastEndOfChain => write!(f, "Seek past end of cluster chain"),
            Self::BrokenChain => write!(f, "Cluster chain ends before end of file"),
            Self::NoRead => write!(f, "File is not open for reading"),
            Self::NoWrite => write!(f, "File is not open for writing"),
            Self::LfnCreateFailed => write!(f, "Long file name entries cannot be created"),
            Self::NotFound => write!(f, "File or directory not found"),
            Self::AlreadyExists => write!(f, "File or directory already exists"),
            Self::InvalidFlags => write!(f, "Invalid open flags"),
            Self::ReadOnlyEntry => write!(f, "Entry cannot be opened for writing"),
            Self::DirectoryFull => write!(f, "Directory is full"),
            Self::DirectoryNotEmpty => write!(f, "Directory is not empty"),
            Self::DiskFull => write!(f, "Disk full"),
            Self::FileTooLarge => write!(f, "File too large for FAT32"),
            Self::AlreadyAllocated => write!(f, "File already has clusters allocated"),
            Self::NoUniqueShortName => write!(f, "No unique short name available"),
            Self::InvalidName(e) => write!(f, "Invalid name: {}", e),
        }
    }
}

impl std::error::Error for FatError {}

impl From<NameError> for FatError {
    fn from(e: NameError) -> Self {
        Self::InvalidName(e)
    }
}
