//! Host-side container management: creation and flat image conversion

use super::error::{CimError, Result};
use super::file::CimFile;
use super::header::{CimInfo, HEADER_REGION_SIZE, SECTOR_SIZE};
use log::{debug, info};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

const MB: u64 = 1024 * 1024;

/// Create a new, empty container.
///
/// Any existing file at `path` is replaced.
///
/// # Arguments
/// * `path` - Host file path
/// * `size_mb` - Declared size, 64 ..= 16384 MB
/// * `read_only` - Stored read-only flag
pub fn create_file<P: AsRef<Path>>(path: P, size_mb: u32, read_only: bool) -> Result<CimFile> {
    let path = path.as_ref();
    if path.as_os_str().to_string_lossy().trim().is_empty() {
        return Err(CimError::InvalidName);
    }
    let info = CimInfo::new(size_mb, read_only)?;

    if path.exists() {
        fs::remove_file(path)?;
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(&vec![0u8; HEADER_REGION_SIZE])?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&info.pack())?;
    file.sync_all()?;

    debug!(
        "created {} ({} MB, {} clusters of {} KB)",
        path.display(),
        size_mb,
        info.cluster_count,
        info.cluster_bytes() / 1024
    );
    Ok(CimFile::from_parts(path.to_path_buf(), info))
}

/// Write the container out as a flat disk image of its full declared size.
///
/// Unallocated clusters are left as holes in the output file.
pub fn convert_to_image_file<P: AsRef<Path>>(cim: &mut CimFile, path: P) -> Result<()> {
    let path = path.as_ref();
    let cluster_bytes = cim.info().cluster_bytes() as u64;
    let cluster_count = cim.info().cluster_count as u32;
    let total = cim.info().max_size as u64 * MB;

    let file = File::create(path)?;
    file.set_len(total)?;
    let mut out = BufWriter::new(file);

    let mut copied = 0u32;
    for cluster in 0..cluster_count {
        if !cim.is_allocated(cluster) {
            continue;
        }
        let data = cim.read_cluster(cluster)?;
        out.seek(SeekFrom::Start(cluster as u64 * cluster_bytes))?;
        out.write_all(&data)?;
        copied += 1;
    }
    out.flush()?;
    out.get_ref().sync_all()?;

    info!(
        "exported {} to {} ({} of {} clusters populated)",
        cim.path().display(),
        path.display(),
        copied,
        cluster_count
    );
    Ok(())
}

/// Build a container from a flat disk image, skipping all-zero sectors.
///
/// The image length must be a whole number of megabytes within the
/// supported container sizes.
pub fn convert_image_file_to_cim<P: AsRef<Path>, Q: AsRef<Path>>(
    image: P,
    cim_path: Q,
) -> Result<CimFile> {
    let image = image.as_ref();
    let len = fs::metadata(image)?.len();
    if len % MB != 0 {
        return Err(CimError::InvalidImageSize(len));
    }
    let size_mb = u32::try_from(len / MB).map_err(|_| CimError::InvalidSize(u32::MAX))?;

    let mut cim = create_file(cim_path, size_mb, false)?;
    let mut reader = BufReader::with_capacity(HEADER_REGION_SIZE, File::open(image)?);
    let mut sector = [0u8; SECTOR_SIZE];
    let mut written = 0u32;

    for index in 0..cim.max_sectors() {
        reader.read_exact(&mut sector)?;
        if sector.iter().any(|&b| b != 0) {
            cim.write_sector(index, &sector)?;
            written += 1;
        }
    }

    info!(
        "imported {} into {} ({} non-empty sectors, {} clusters allocated)",
        image.display(),
        cim.path().display(),
        written,
        cim.info().max_clusters
    );
    Ok(cim)
}
