//! FAT32 file system
//!
//! Formats, mounts and manipulates a FAT32 volume on any [`BlockIo`] device.
//! Every handle operation takes the [`Fat32Volume`] explicitly.
//!
//! [`BlockIo`]: gpt_disk_io::BlockIo

pub mod boot_sector;
pub mod config;
pub mod datetime;
pub mod dir_entry;
pub mod directory;
pub mod error;
pub mod file;
pub mod fs_info;
mod le;
pub mod name;
pub mod types;
pub mod volume;

pub use config::FormatOptions;
pub use directory::DirListing;
pub use error::{FatError, NameError, Result};
pub use file::FatFile;
pub use name::{calc_short_name_checksum, convert_long_to_short_name, FsName, NameFlags};
pub use types::{AccessMode, FatAttributes, FileFlags, HandleAttributes, OpenFlags};
pub use volume::{Fat32Volume, VolumeGeometry};
