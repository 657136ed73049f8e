//! CIM sparse container
//!
//! A virtual block device of 64 MB to 16 GB stored in a compact host file.
//! A 64 KB header holds a logical -> physical cluster map; physical clusters
//! are appended after the header on first write, so unwritten space costs
//! nothing on the host.

pub mod config;
pub mod error;
pub mod file;
pub mod header;
pub mod manager;

pub use config::CimGeometry;
pub use error::{CimError, Result};
pub use file::CimFile;
pub use header::CimInfo;
pub use manager::{convert_image_file_to_cim, convert_to_image_file, create_file};
