//! Virtual Disk Storage Engine
//!
//! Backs a multi-gigabyte FAT32 virtual disk with a compact, sparse host file.
//!
//! # Overview
//!
//! Two layers make up the engine:
//! - **CIM container** - a sparse block device. Logical clusters are mapped to
//!   physical clusters on first write, so an empty 16 GB disk costs one 64 KB
//!   header on the host.
//! - **FAT32 layer** - boot sector, FS-info, mirrored FATs, cluster allocation,
//!   directory scanning and long file names on top of any `BlockIo` device.
//!
//! # Architecture
//!
//! Control flows top-down:
//! 1. **FatFile** - open handle, directory scan, LFN creation, read/write/seek
//! 2. **Fat32Volume** - geometry, FAT entries, cluster allocation and freeing
//! 3. **CimFile** - sector I/O over the cluster map (implements `BlockIo`)
//! 4. **Host file** - header region followed by sequential physical clusters
//!
//! # Usage
//!
//! ```ignore
//! use vdisk::cim::create_file;
//! use vdisk::fat32::{Fat32Volume, FatFile, OpenFlags};
//!
//! let cim = create_file("disk.cim", 64, false)?;
//! let mut vol = Fat32Volume::new(cim);
//! vol.format("KLIVE")?;
//! vol.init()?;
//!
//! let mut root = FatFile::new();
//! root.open_root(&mut vol)?;
//! let mut file = FatFile::new();
//! file.open(&mut vol, &mut root, "hello.txt", OpenFlags::READ_WRITE | OpenFlags::CREATE)?;
//! file.write(&mut vol, b"0123456789")?;
//! file.close();
//! ```

pub mod cim;
pub mod fat32;

pub use cim::{CimError, CimFile, CimGeometry, CimInfo};
pub use fat32::{Fat32Volume, FatError, FatFile, FormatOptions, OpenFlags};
