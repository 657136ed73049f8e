//! Directory scanning, name lookup and entry creation

use super::datetime::FatTimestamp;
use super::dir_entry::{is_long_name, DirEntry, LongNameEntry, NT_LC_BASE, NT_LC_EXT};
use super::error::{FatError, NameError, Result};
use super::file::FatFile;
use super::name::{
    calc_short_name_checksum, convert_long_to_short_name, parse_path_component, split_path,
    FsName,
};
use super::types::{
    AccessMode, FatAttributes, FileFlags, HandleAttributes, OpenFlags, BYTES_PER_SECTOR,
    DIR_ENTRY_SIZE, DIR_NAME_DELETED, DIR_NAME_FREE, LFN_CHARS_PER_ENTRY, LFN_LAST_ENTRY,
    LFN_ORD_MASK,
};
use super::volume::Fat32Volume;
use gpt_disk_io::BlockIo;
use log::{debug, warn};

/// Highest `~N` suffix tried for a lossy short name
const MAX_SHORT_NAME_SEQ: u32 = 100;

/// One raw 32-byte slot and where it lives
#[derive(Debug, Clone, Copy)]
pub(super) struct DirSlot {
    pub sector: u32,
    pub offset: usize,
    pub raw: [u8; DIR_ENTRY_SIZE],
}

/// Entry returned by [`FatFile::list`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    /// Long name when present, otherwise the 8.3 name
    pub name: String,
    pub short_name: String,
    pub size: u32,
    pub attributes: FatAttributes,
    pub first_cluster: u32,
    pub is_dir: bool,
}

impl FatFile {
    /// Read the slot at the current position and step past it.
    ///
    /// `None` at the end of the directory's cluster chain.
    pub(super) fn read_dir_entry<B: BlockIo>(
        &mut self,
        vol: &mut Fat32Volume<B>,
    ) -> Result<Option<DirSlot>> {
        let offset = self.cur_position as usize & (BYTES_PER_SECTOR - 1);
        let Some(sector) = self.resolve_sector(vol)? else {
            return Ok(None);
        };
        let mut buf = [0u8; BYTES_PER_SECTOR];
        vol.read_sector(sector, &mut buf)?;
        let mut raw = [0u8; DIR_ENTRY_SIZE];
        raw.copy_from_slice(&buf[offset..offset + DIR_ENTRY_SIZE]);
        self.cur_position += DIR_ENTRY_SIZE as u32;
        Ok(Some(DirSlot { sector, offset, raw }))
    }

    fn entry_at<B: BlockIo>(
        &mut self,
        vol: &mut Fat32Volume<B>,
        index: u32,
    ) -> Result<Option<DirSlot>> {
        match self.seek_set(vol, index * DIR_ENTRY_SIZE as u32) {
            Ok(()) => self.read_dir_entry(vol),
            Err(FatError::SeekPastEndOfChain) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_slot<B: BlockIo>(
        vol: &mut Fat32Volume<B>,
        sector: u32,
        offset: usize,
        raw: &[u8; DIR_ENTRY_SIZE],
    ) -> Result<()> {
        let mut buf = [0u8; BYTES_PER_SECTOR];
        vol.read_sector(sector, &mut buf)?;
        buf[offset..offset + DIR_ENTRY_SIZE].copy_from_slice(raw);
        vol.write_sector(sector, &buf)
    }

    /// Open `path` relative to `dir`, or from the root when it starts with `/`.
    ///
    /// Intermediate components must be directories. The last component is
    /// looked up, or created when `flags` has [`OpenFlags::CREATE`] and a
    /// write mode.
    pub fn open<B: BlockIo>(
        &mut self,
        vol: &mut Fat32Volume<B>,
        dir: &mut FatFile,
        path: &str,
        flags: OpenFlags,
    ) -> Result<()> {
        if self.is_open() {
            return Err(FatError::AlreadyOpen);
        }
        let (absolute, parts) = split_path(path)?;
        let Some((last, init)) = parts.split_last() else {
            if absolute {
                return self.open_root(vol);
            }
            return Err(NameError::Blank.into());
        };

        let mut walk = if absolute { Some(Self::root(vol)?) } else { None };
        for component in init {
            let fname = parse_path_component(component)?;
            let parent = match walk.as_mut() {
                Some(d) => d,
                None => &mut *dir,
            };
            let mut sub = FatFile::new();
            sub.do_open(vol, parent, &fname, OpenFlags::READ_ONLY)?;
            if !sub.is_dir() {
                return Err(FatError::NotADirectory);
            }
            walk = Some(sub);
        }

        let fname = parse_path_component(last)?;
        let parent = match walk.as_mut() {
            Some(d) => d,
            None => dir,
        };
        self.do_open(vol, parent, &fname, flags)
    }

    fn root<B: BlockIo>(vol: &Fat32Volume<B>) -> Result<FatFile> {
        let mut root = FatFile::new();
        root.open_root(vol)?;
        Ok(root)
    }

    /// True if `path` names an existing entry
    pub fn exists<B: BlockIo>(
        vol: &mut Fat32Volume<B>,
        dir: &mut FatFile,
        path: &str,
    ) -> Result<bool> {
        let mut file = FatFile::new();
        match file.open(vol, dir, path, OpenFlags::READ_ONLY) {
            Ok(()) => Ok(true),
            Err(FatError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Remove the file or empty directory at `path`
    pub fn remove_path<B: BlockIo>(
        vol: &mut Fat32Volume<B>,
        dir: &mut FatFile,
        path: &str,
    ) -> Result<()> {
        let mut file = FatFile::new();
        file.open(vol, dir, path, OpenFlags::READ_ONLY)?;
        if file.is_subdir() {
            return file.rmdir(vol);
        }
        if file.is_root() {
            return Err(FatError::NotAFile);
        }
        file.close();
        file.open(vol, dir, path, OpenFlags::READ_WRITE)?;
        file.remove(vol)
    }

    /// Look `fname` up in `dir` and open it, creating it if allowed.
    ///
    /// A single scan finds the entry and a run of free slots big enough for
    /// the short entry plus its long-name entries.
    pub(super) fn do_open<B: BlockIo>(
        &mut self,
        vol: &mut Fat32Volume<B>,
        dir: &mut FatFile,
        fname: &FsName,
        oflag: OpenFlags,
    ) -> Result<()> {
        if !dir.is_dir() {
            return Err(FatError::NotADirectory);
        }
        if self.is_open() {
            return Err(FatError::AlreadyOpen);
        }

        let units = fname.utf16();
        let name_ord = units.len().div_ceil(LFN_CHARS_PER_ENTRY) as u8;
        let free_need: u32 = if fname.flags.needs_lfn() {
            1 + name_ord as u32
        } else {
            1
        };

        let mut lfn_ord = 0u8;
        let mut order = 0u8;
        let mut checksum = 0u8;
        let mut fname_found = false;
        let mut free_found = 0u32;
        let mut free_index = 0u32;
        let mut cur_index;

        dir.rewind();
        loop {
            cur_index = dir.cur_position / DIR_ENTRY_SIZE as u32;
            let Some(slot) = dir.read_dir_entry(vol)? else {
                break;
            };
            let first = slot.raw[0];

            if first == DIR_NAME_DELETED || first == DIR_NAME_FREE {
                if free_found == 0 {
                    free_index = cur_index;
                }
                if free_found < free_need {
                    free_found += 1;
                }
                if first == DIR_NAME_FREE {
                    break;
                }
            } else if free_found < free_need {
                free_found = 0;
            }

            let entry = DirEntry::unpack(&slot.raw, 0);
            if first == DIR_NAME_DELETED || first == b'.' {
                lfn_ord = 0;
            } else if entry.is_long_name() {
                let ldir = LongNameEntry::unpack(&slot.raw, 0);
                if lfn_ord == 0 {
                    order = ldir.ord & LFN_ORD_MASK;
                    if order != name_ord || ldir.ord & LFN_LAST_ENTRY == 0 {
                        continue;
                    }
                    lfn_ord = name_ord;
                    checksum = ldir.checksum;
                } else {
                    order = order.wrapping_sub(1);
                    if ldir.ord != order || ldir.checksum != checksum {
                        lfn_ord = 0;
                        continue;
                    }
                }
                if order == 1 && !dir.cmp_name(vol, cur_index + 1, &units, lfn_ord)? {
                    lfn_ord = 0;
                }
            } else if entry.is_file_or_subdir() {
                if lfn_ord != 0 {
                    if order == 1 && calc_short_name_checksum(&entry.name) == checksum {
                        return self.open_found(vol, dir, cur_index, oflag, lfn_ord, &slot);
                    }
                    warn!(
                        "long name entries do not match short entry {}",
                        entry.short_name()
                    );
                    lfn_ord = 0;
                }
                if entry.name == fname.sfn {
                    if !fname.is_lossy() {
                        return self.open_found(vol, dir, cur_index, oflag, 0, &slot);
                    }
                    fname_found = true;
                }
            } else {
                lfn_ord = 0;
            }
        }

        if !oflag.contains(OpenFlags::CREATE) || !oflag.is_write_mode() {
            return Err(FatError::NotFound);
        }

        // Free slots at the very end of the directory
        if free_found == 0 {
            free_index = cur_index;
        }
        while free_found < free_need {
            if dir.read_dir_entry(vol)?.is_none() {
                break;
            }
            free_found += 1;
        }
        while free_found < free_need {
            dir.add_dir_cluster(vol)?;
            free_found += vol.bytes_per_cluster() / DIR_ENTRY_SIZE as u32;
        }

        let unique;
        let fname = if fname_found {
            unique = dir.make_unique_sfn(vol, fname)?;
            &unique
        } else {
            fname
        };

        let lfn_ord = (free_need - 1) as u8;
        let index = free_index + lfn_ord as u32;
        if lfn_ord > 0 {
            dir.create_lfn(vol, index, fname, lfn_ord)?;
        }

        let slot = dir.entry_at(vol, index)?.ok_or(FatError::DirectoryFull)?;
        let now = FatTimestamp::now();
        let entry = DirEntry {
            name: fname.sfn,
            attributes: FatAttributes::ARCHIVE.bits(),
            nt_res: fname.flags.bits() & (NT_LC_BASE | NT_LC_EXT),
            create_time_tenth: now.tenth,
            create_time: now.time,
            create_date: now.date,
            access_date: now.date,
            write_time: now.time,
            write_date: now.date,
            ..DirEntry::default()
        };
        let mut raw = [0u8; DIR_ENTRY_SIZE];
        entry.pack_into(&mut raw, 0);
        Self::write_slot(vol, slot.sector, slot.offset, &raw)?;
        debug!(
            "created {} as {} at index {}",
            fname.long_name,
            fname.short_name(),
            index
        );

        let slot = DirSlot { raw, ..slot };
        self.open_cached_entry(vol, dir, index, oflag, lfn_ord, &slot)
    }

    fn open_found<B: BlockIo>(
        &mut self,
        vol: &mut Fat32Volume<B>,
        dir: &FatFile,
        index: u32,
        oflag: OpenFlags,
        lfn_ord: u8,
        slot: &DirSlot,
    ) -> Result<()> {
        if oflag.contains(OpenFlags::EXCLUSIVE) {
            return Err(FatError::AlreadyExists);
        }
        self.open_cached_entry(vol, dir, index, oflag, lfn_ord, slot)
    }

    /// Compare the long-name entries in front of `index` against `units`.
    ///
    /// ASCII compares case-insensitively, everything else exactly.
    fn cmp_name<B: BlockIo>(
        &self,
        vol: &mut Fat32Volume<B>,
        index: u32,
        units: &[u16],
        lfn_ord: u8,
    ) -> Result<bool> {
        let mut probe = self.clone();
        let mut k = 0usize;
        for order in 1..=lfn_ord as u32 {
            let Some(slot) = probe.entry_at(vol, index - order)? else {
                return Ok(false);
            };
            let ldir = LongNameEntry::unpack(&slot.raw, 0);
            for c in ldir.chars() {
                if k == units.len() {
                    return Ok(c == 0);
                }
                if upcase(c) != upcase(units[k]) {
                    return Ok(false);
                }
                k += 1;
            }
        }
        Ok(k == units.len())
    }

    /// Write the long-name entries for `fname` in front of the short entry
    /// at `index`. Order 1 sits directly before the short entry.
    fn create_lfn<B: BlockIo>(
        &mut self,
        vol: &mut Fat32Volume<B>,
        index: u32,
        fname: &FsName,
        lfn_ord: u8,
    ) -> Result<()> {
        let checksum = calc_short_name_checksum(&fname.sfn);
        let units = fname.utf16();
        for order in 1..=lfn_ord {
            let slot = self
                .entry_at(vol, index - order as u32)?
                .ok_or(FatError::LfnCreateFailed)?;
            let base = (order as usize - 1) * LFN_CHARS_PER_ENTRY;
            let mut chars = [0xFFFFu16; LFN_CHARS_PER_ENTRY];
            for (i, c) in chars.iter_mut().enumerate() {
                let k = base + i;
                if k < units.len() {
                    *c = units[k];
                } else if k == units.len() {
                    *c = 0;
                }
            }
            let ord = if order == lfn_ord {
                order | LFN_LAST_ENTRY
            } else {
                order
            };
            let mut raw = [0u8; DIR_ENTRY_SIZE];
            LongNameEntry::new(ord, checksum, &chars).pack_into(&mut raw, 0);
            Self::write_slot(vol, slot.sector, slot.offset, &raw)?;
        }
        Ok(())
    }

    fn make_unique_sfn<B: BlockIo>(
        &self,
        vol: &mut Fat32Volume<B>,
        fname: &FsName,
    ) -> Result<FsName> {
        for seq in 1..MAX_SHORT_NAME_SEQ {
            let candidate = convert_long_to_short_name(&fname.long_name, seq)?;
            if !self.contains_short_name(vol, &candidate.sfn)? {
                return Ok(candidate);
            }
        }
        Err(FatError::NoUniqueShortName)
    }

    fn contains_short_name<B: BlockIo>(
        &self,
        vol: &mut Fat32Volume<B>,
        sfn: &[u8; 11],
    ) -> Result<bool> {
        let mut probe = self.clone();
        probe.rewind();
        while let Some(slot) = probe.read_dir_entry(vol)? {
            let entry = DirEntry::unpack(&slot.raw, 0);
            if entry.is_free() {
                break;
            }
            if entry.is_file_or_subdir() && entry.name == *sfn {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Turn the short entry in `slot` into an open handle
    fn open_cached_entry<B: BlockIo>(
        &mut self,
        vol: &mut Fat32Volume<B>,
        dir: &FatFile,
        index: u32,
        oflag: OpenFlags,
        lfn_ord: u8,
        slot: &DirSlot,
    ) -> Result<()> {
        let entry = DirEntry::unpack(&slot.raw, 0);
        if !entry.is_file_or_subdir() {
            return Err(FatError::NotFound);
        }

        let mut attributes =
            HandleAttributes::from_bits_truncate(entry.attributes & FatAttributes::COPY.bits());
        if entry.is_file() {
            attributes |= HandleAttributes::FILE;
        }
        let mut flags = match oflag.access_mode() {
            Some(AccessMode::Read) => {
                if oflag.contains(OpenFlags::TRUNCATE) {
                    return Err(FatError::InvalidFlags);
                }
                FileFlags::READ
            }
            Some(AccessMode::Write) => FileFlags::WRITE,
            Some(AccessMode::ReadWrite) => FileFlags::READ | FileFlags::WRITE,
            None => return Err(FatError::InvalidFlags),
        };
        if flags.contains(FileFlags::WRITE) {
            if attributes.intersects(HandleAttributes::SUBDIR | HandleAttributes::READ_ONLY) {
                return Err(FatError::ReadOnlyEntry);
            }
            attributes |= HandleAttributes::ARCHIVE;
        }
        if oflag.contains(OpenFlags::APPEND) {
            flags |= FileFlags::APPEND;
        }

        *self = FatFile {
            attributes,
            flags,
            lfn_ord,
            dir_index: index as u16,
            dir_cluster: dir.first_cluster,
            dir_sector: slot.sector,
            cur_cluster: 0,
            cur_position: 0,
            file_size: entry.file_size,
            first_cluster: entry.first_cluster(),
        };

        if let Err(e) = self.finish_open(vol, oflag) {
            self.close();
            return Err(e);
        }
        Ok(())
    }

    fn finish_open<B: BlockIo>(&mut self, vol: &mut Fat32Volume<B>, oflag: OpenFlags) -> Result<()> {
        if oflag.contains(OpenFlags::TRUNCATE) && (self.file_size != 0 || self.first_cluster != 0)
        {
            if self.first_cluster != 0 {
                vol.free_chain(self.first_cluster)?;
            }
            self.first_cluster = 0;
            self.file_size = 0;
            self.flags |= FileFlags::DIR_DIRTY;
            self.sync_dir_entry(vol)?;
        }
        if oflag.contains(OpenFlags::AT_END) {
            self.seek_end(vol)?;
        }
        Ok(())
    }

    /// Create the directory `path` and leave this handle open on it.
    ///
    /// With `create_missing_parents` every missing intermediate directory is
    /// created too; otherwise a missing parent is [`FatError::NotFound`].
    pub fn mkdir<B: BlockIo>(
        &mut self,
        vol: &mut Fat32Volume<B>,
        parent: &mut FatFile,
        path: &str,
        create_missing_parents: bool,
    ) -> Result<()> {
        if self.is_open() {
            return Err(FatError::AlreadyOpen);
        }
        let (absolute, parts) = split_path(path)?;
        let (last, init) = parts.split_last().ok_or(NameError::Blank)?;

        let mut walk = if absolute { Some(Self::root(vol)?) } else { None };
        for component in init {
            let fname = parse_path_component(component)?;
            let dir = match walk.as_mut() {
                Some(d) => d,
                None => &mut *parent,
            };
            let mut sub = FatFile::new();
            match sub.do_open(vol, dir, &fname, OpenFlags::READ_ONLY) {
                Ok(()) if sub.is_dir() => {}
                Ok(()) => return Err(FatError::NotADirectory),
                Err(FatError::NotFound) if create_missing_parents => {
                    sub.do_mkdir(vol, dir, &fname)?;
                }
                Err(e) => return Err(e),
            }
            walk = Some(sub);
        }

        let fname = parse_path_component(last)?;
        let dir = match walk.as_mut() {
            Some(d) => d,
            None => parent,
        };
        self.do_mkdir(vol, dir, &fname)
    }

    // Creates an empty file, then turns it into a directory with one zeroed
    // cluster holding "." and ".."
    fn do_mkdir<B: BlockIo>(
        &mut self,
        vol: &mut Fat32Volume<B>,
        parent: &mut FatFile,
        fname: &FsName,
    ) -> Result<()> {
        if !parent.is_dir() {
            return Err(FatError::NotADirectory);
        }
        self.do_open(
            vol,
            parent,
            fname,
            OpenFlags::CREATE | OpenFlags::EXCLUSIVE | OpenFlags::READ_WRITE,
        )?;

        self.flags = FileFlags::READ;
        self.attributes = HandleAttributes::SUBDIR;
        self.add_dir_cluster(vol)?;
        self.first_cluster = self.cur_cluster;
        self.rewind();
        self.flags |= FileFlags::DIR_DIRTY;
        self.sync_dir_entry(vol)?;

        let mut dot = self.dir_entry(vol)?;
        dot.name = *b".          ";
        dot.attributes = FatAttributes::DIRECTORY.bits();
        dot.nt_res = 0;
        dot.file_size = 0;
        let mut sector = [0u8; BYTES_PER_SECTOR];
        dot.pack_into(&mut sector, 0);
        dot.name = *b"..         ";
        dot.set_first_cluster(if parent.is_root() {
            0
        } else {
            parent.first_cluster
        });
        dot.pack_into(&mut sector, DIR_ENTRY_SIZE);
        vol.write_sector(vol.cluster_start_sector(self.first_cluster), &sector)?;
        debug!("mkdir {} at cluster {}", fname.long_name, self.first_cluster);
        Ok(())
    }

    /// Delete this file: free its chain and mark its entries deleted.
    ///
    /// Needs a handle opened for writing. The handle is closed afterwards.
    pub fn remove<B: BlockIo>(&mut self, vol: &mut Fat32Volume<B>) -> Result<()> {
        if !self.is_open() {
            return Err(FatError::NotOpen);
        }
        if !self.is_writable() {
            return Err(FatError::NoWrite);
        }
        if self.is_root() {
            return Err(FatError::NotAFile);
        }
        if self.first_cluster != 0 {
            vol.free_chain(self.first_cluster)?;
        }

        let mut buf = [0u8; BYTES_PER_SECTOR];
        vol.read_sector(self.dir_sector, &mut buf)?;
        let offset = self.entry_offset();
        let entry = DirEntry::unpack(&buf, offset);
        let checksum = calc_short_name_checksum(&entry.name);
        buf[offset] = DIR_NAME_DELETED;
        vol.write_sector(self.dir_sector, &buf)?;
        debug!("removed {}", entry.short_name());

        let lfn_ord = self.lfn_ord;
        let index = self.dir_index as u32;
        let mut dir = FatFile::open_dir_cluster(vol, self.dir_cluster);
        self.close();

        for order in 1..=lfn_ord as u32 {
            let Some(mut slot) = dir.entry_at(vol, index - order)? else {
                break;
            };
            let ldir = LongNameEntry::unpack(&slot.raw, 0);
            if !is_long_name(ldir.attributes)
                || (ldir.ord & LFN_ORD_MASK) as u32 != order
                || ldir.checksum != checksum
            {
                warn!("long name entry {} of {} is inconsistent", order, index);
                break;
            }
            slot.raw[0] = DIR_NAME_DELETED;
            Self::write_slot(vol, slot.sector, slot.offset, &slot.raw)?;
            if ldir.ord & LFN_LAST_ENTRY != 0 {
                break;
            }
        }
        Ok(())
    }

    /// Remove this directory if it holds nothing but "." and ".."
    pub fn rmdir<B: BlockIo>(&mut self, vol: &mut Fat32Volume<B>) -> Result<()> {
        if !self.is_subdir() {
            return Err(FatError::NotADirectory);
        }
        self.rewind();
        while let Some(slot) = self.read_dir_entry(vol)? {
            let entry = DirEntry::unpack(&slot.raw, 0);
            if entry.is_free() {
                break;
            }
            if entry.is_deleted() || entry.is_dot() {
                continue;
            }
            if entry.is_file_or_subdir() {
                return Err(FatError::DirectoryNotEmpty);
            }
        }
        self.attributes = HandleAttributes::FILE;
        self.flags |= FileFlags::WRITE;
        self.remove(vol)
    }

    /// Every live entry of this directory except "." and ".."
    pub fn list<B: BlockIo>(&mut self, vol: &mut Fat32Volume<B>) -> Result<Vec<DirListing>> {
        if !self.is_dir() {
            return Err(FatError::NotADirectory);
        }
        let mut out = Vec::new();
        let mut parts: Vec<[u16; LFN_CHARS_PER_ENTRY]> = Vec::new();
        let mut checksum = 0u8;

        self.rewind();
        while let Some(slot) = self.read_dir_entry(vol)? {
            let entry = DirEntry::unpack(&slot.raw, 0);
            if entry.is_free() {
                break;
            }
            if entry.is_deleted() {
                parts.clear();
                continue;
            }
            if entry.is_long_name() {
                let ldir = LongNameEntry::unpack(&slot.raw, 0);
                let order = (ldir.ord & LFN_ORD_MASK) as usize;
                if ldir.ord & LFN_LAST_ENTRY != 0 {
                    parts = vec![[0xFFFF; LFN_CHARS_PER_ENTRY]; order];
                    checksum = ldir.checksum;
                }
                if order == 0 || order > parts.len() || ldir.checksum != checksum {
                    parts.clear();
                    continue;
                }
                parts[order - 1] = ldir.chars();
                continue;
            }
            if entry.is_file_or_subdir() && !entry.is_dot() {
                let long = (!parts.is_empty() && calc_short_name_checksum(&entry.name) == checksum)
                    .then(|| decode_long_name(&parts));
                out.push(DirListing {
                    name: long.unwrap_or_else(|| entry.short_name()),
                    short_name: entry.short_name(),
                    size: entry.file_size,
                    attributes: entry.attrs(),
                    first_cluster: entry.first_cluster(),
                    is_dir: entry.is_subdir(),
                });
            }
            parts.clear();
        }
        Ok(out)
    }
}

fn upcase(c: u16) -> u16 {
    if (b'a' as u16..=b'z' as u16).contains(&c) {
        c - 0x20
    } else {
        c
    }
}

fn decode_long_name(parts: &[[u16; LFN_CHARS_PER_ENTRY]]) -> String {
    let units: Vec<u16> = parts
        .iter()
        .flatten()
        .copied()
        .take_while(|&c| c != 0 && c != 0xFFFF)
        .collect();
    String::from_utf16_lossy(&units)
}
