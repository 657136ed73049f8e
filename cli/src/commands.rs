//! Command implementations

use crate::config::CliConfig;
use log::{debug, info};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use vdisk::cim::{convert_image_file_to_cim, convert_to_image_file, create_file};
use vdisk::fat32::{FatFile, OpenFlags};
use vdisk::{CimError, CimFile, Fat32Volume, FatError};

type Volume = Fat32Volume<CimFile>;

#[derive(Debug)]
pub enum CliError {
    /// Bad command line; the message is followed by the usage text
    Usage(String),
    Cim(CimError),
    Fat(FatError),
    Io(io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage(msg) => write!(f, "{}", msg),
            Self::Cim(e) => write!(f, "{}", e),
            Self::Fat(e) => write!(f, "{}", e),
            Self::Io(e) => write!(f, "{}", e),
        }
    }
}

impl From<CimError> for CliError {
    fn from(e: CimError) -> Self {
        Self::Cim(e)
    }
}

impl From<FatError> for CliError {
    fn from(e: FatError) -> Self {
        Self::Fat(e)
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

pub type Result<T> = core::result::Result<T, CliError>;

pub const USAGE: &str = "\
Usage:
  klive-disk create <cim> <sizeMB> [--readonly] [--label LABEL]
  klive-disk info <cim>
  klive-disk readonly <cim> on|off
  klive-disk export <cim> <image>
  klive-disk import <image> <cim>
  klive-disk ls <cim> [dir]
  klive-disk cat <cim> <path>
  klive-disk mkdir <cim> <path>
  klive-disk rm <cim> <path>
  klive-disk copy <cim> <host-file> [dest]";

/// Dispatch `args` (program name already stripped)
pub fn run(config: &CliConfig, args: &[String]) -> Result<()> {
    let Some((command, rest)) = args.split_first() else {
        return Err(CliError::Usage(String::from("missing command")));
    };
    let rest: Vec<&str> = rest.iter().map(String::as_str).collect();
    match command.as_str() {
        "create" => create(config, &rest),
        "info" => info_cmd(&rest),
        "readonly" => readonly(&rest),
        "export" => export(&rest),
        "import" => import(&rest),
        "ls" => ls(&rest),
        "cat" => cat(&rest),
        "mkdir" => mkdir(&rest),
        "rm" => rm(&rest),
        "copy" => copy(&rest),
        other => Err(CliError::Usage(format!("unknown command {:?}", other))),
    }
}

fn positional<'a>(args: &[&'a str], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .copied()
        .ok_or_else(|| CliError::Usage(format!("missing <{}>", name)))
}

fn mount(path: &str) -> Result<(Volume, FatFile)> {
    let cim = CimFile::open(path)?;
    let vol = Fat32Volume::mount(cim)?;
    let mut root = FatFile::new();
    root.open_root(&vol)?;
    Ok((vol, root))
}

fn create(config: &CliConfig, args: &[&str]) -> Result<()> {
    let path = positional(args, 0, "cim")?;
    let size = positional(args, 1, "sizeMB")?;
    let size_mb: u32 = size
        .parse()
        .map_err(|_| CliError::Usage(format!("invalid size {:?}", size)))?;

    let mut read_only = config.read_only;
    let mut label = String::from("KLIVE");
    let mut i = 2;
    while i < args.len() {
        match args[i] {
            "--readonly" => read_only = true,
            "--label" => {
                i += 1;
                label = positional(args, i, "LABEL")?.to_string();
            }
            other => return Err(CliError::Usage(format!("unknown option {:?}", other))),
        }
        i += 1;
    }

    let cim = create_file(path, size_mb, false)?;
    let mut vol = Fat32Volume::new(cim);
    vol.format(&label)?;
    let mut cim = vol.into_inner();
    if read_only {
        cim.set_readonly(true)?;
    }
    info!(
        "created {} ({} MB, {} KB clusters{})",
        path,
        size_mb,
        cim.info().cluster_bytes() / 1024,
        if read_only { ", read-only" } else { "" }
    );
    Ok(())
}

fn info_cmd(args: &[&str]) -> Result<()> {
    let path = positional(args, 0, "cim")?;
    let cim = CimFile::open(path)?;
    let header = cim.info().clone();
    println!("Container:     {}", path);
    println!(
        "Version:       {}.{}",
        header.version_major, header.version_minor
    );
    println!("Size:          {} MB", header.max_size);
    println!(
        "Clusters:      {} allocated of {} ({} KB each)",
        header.max_clusters,
        header.cluster_count,
        header.cluster_bytes() / 1024
    );
    println!("Read-only:     {}", if header.is_read_only() { "yes" } else { "no" });

    match Fat32Volume::mount(cim) {
        Ok(mut vol) => {
            let geo = *vol.geometry();
            println!("Volume label:  {}", vol.volume_label());
            println!(
                "FAT32:         {} clusters of {} bytes, FAT {} sectors x {}",
                geo.count_of_clusters,
                vol.bytes_per_cluster(),
                geo.fat_size,
                geo.num_fats
            );
            println!("Free clusters: {}", vol.free_cluster_count()?);
        }
        Err(e) => println!("FAT32:         not mounted ({})", e),
    }
    Ok(())
}

fn readonly(args: &[&str]) -> Result<()> {
    let path = positional(args, 0, "cim")?;
    let flag = match positional(args, 1, "on|off")? {
        "on" => true,
        "off" => false,
        other => return Err(CliError::Usage(format!("expected on or off, got {:?}", other))),
    };
    let mut cim = CimFile::open(path)?;
    cim.set_readonly(flag)?;
    info!("{} is now {}", path, if flag { "read-only" } else { "writable" });
    Ok(())
}

fn export(args: &[&str]) -> Result<()> {
    let path = positional(args, 0, "cim")?;
    let image = positional(args, 1, "image")?;
    let mut cim = CimFile::open(path)?;
    convert_to_image_file(&mut cim, image)?;
    Ok(())
}

fn import(args: &[&str]) -> Result<()> {
    let image = positional(args, 0, "image")?;
    let path = positional(args, 1, "cim")?;
    convert_image_file_to_cim(image, path)?;
    Ok(())
}

fn ls(args: &[&str]) -> Result<()> {
    let path = positional(args, 0, "cim")?;
    let (mut vol, mut root) = mount(path)?;
    let mut dir = match args.get(1) {
        Some(sub) => {
            let mut dir = FatFile::new();
            dir.open(&mut vol, &mut root, sub, OpenFlags::READ_ONLY)?;
            if !dir.is_dir() {
                return Err(FatError::NotADirectory.into());
            }
            dir
        }
        None => root.clone(),
    };

    let mut entries = dir.list(&mut vol)?;
    entries.sort_by(|a, b| (!a.is_dir, &a.name).cmp(&(!b.is_dir, &b.name)));
    for entry in entries {
        if entry.is_dir {
            println!("{:>10}  {}/", "<DIR>", entry.name);
        } else {
            println!("{:>10}  {}", entry.size, entry.name);
        }
    }
    Ok(())
}

fn cat(args: &[&str]) -> Result<()> {
    let path = positional(args, 0, "cim")?;
    let file_path = positional(args, 1, "path")?;
    let (mut vol, mut root) = mount(path)?;
    let mut file = FatFile::new();
    file.open(&mut vol, &mut root, file_path, OpenFlags::READ_ONLY)?;
    if !file.is_file() {
        return Err(FatError::NotAFile.into());
    }

    let mut out = io::stdout().lock();
    let mut buf = vec![0u8; vol.bytes_per_cluster() as usize];
    loop {
        let n = file.read_into(&mut vol, &mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
    }
    out.flush()?;
    Ok(())
}

fn mkdir(args: &[&str]) -> Result<()> {
    let path = positional(args, 0, "cim")?;
    let dir_path = positional(args, 1, "path")?;
    let (mut vol, mut root) = mount(path)?;
    let mut dir = FatFile::new();
    dir.mkdir(&mut vol, &mut root, dir_path, true)?;
    vol.sync()?;
    info!("created directory {}", dir_path);
    Ok(())
}

fn rm(args: &[&str]) -> Result<()> {
    let path = positional(args, 0, "cim")?;
    let target = positional(args, 1, "path")?;
    let (mut vol, mut root) = mount(path)?;
    FatFile::remove_path(&mut vol, &mut root, target)?;
    vol.sync()?;
    info!("removed {}", target);
    Ok(())
}

/// Stream a host file into the volume in cluster-sized chunks
fn copy(args: &[&str]) -> Result<()> {
    let path = positional(args, 0, "cim")?;
    let host = positional(args, 1, "host-file")?;
    let dest = match args.get(2) {
        Some(dest) => dest.to_string(),
        None => Path::new(host)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| CliError::Usage(format!("cannot derive a name from {:?}", host)))?,
    };

    let mut source = File::open(host)?;
    let len = u32::try_from(source.metadata()?.len()).map_err(|_| FatError::FileTooLarge)?;

    let (mut vol, mut root) = mount(path)?;
    let mut file = FatFile::new();
    file.open(
        &mut vol,
        &mut root,
        &dest,
        OpenFlags::WRITE_ONLY | OpenFlags::CREATE | OpenFlags::TRUNCATE,
    )?;
    if len > 0 {
        file.pre_allocate(&mut vol, len)?;
    }

    let mut buf = vec![0u8; vol.bytes_per_cluster() as usize];
    let mut copied = 0u64;
    loop {
        let n = read_full(&mut source, &mut buf)?;
        if n == 0 {
            break;
        }
        file.write(&mut vol, &buf[..n])?;
        copied += n as u64;
        debug!("{} / {} bytes", copied, len);
    }
    file.sync(&mut vol)?;
    info!("copied {} ({} bytes) to {}", host, copied, dest);
    Ok(())
}

// Fills `buf` unless the reader hits end of file first
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
