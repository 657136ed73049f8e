//! FAT32 format, mount and cluster allocation tests

mod common;

use common::{formatted_volume, MemoryBlockDevice};
use vdisk::fat32::types::FAT32_EOC;
use vdisk::fat32::{Fat32Volume, FatError, FormatOptions};

const FAT0: usize = 32;
const FAT_SIZE_64MB: usize = 1016;

fn fat_raw(dev: &MemoryBlockDevice, fat: usize, index: usize) -> u32 {
    let sector = FAT0 + fat * FAT_SIZE_64MB + index * 4 / 512;
    let off = index * 4 % 512;
    let s = dev.sector(sector);
    u32::from_le_bytes([s[off], s[off + 1], s[off + 2], s[off + 3]])
}

#[test]
fn test_format_64mb_geometry() {
    let (mut vol, _root) = formatted_volume();
    let geo = *vol.geometry();
    assert_eq!(geo.sectors_per_cluster, 1);
    assert_eq!(geo.reserved_sectors, 32);
    assert_eq!(geo.num_fats, 2);
    assert_eq!(geo.fat_size, 1016);
    assert_eq!(geo.data_start_sector, 32 + 2 * 1016);
    assert_eq!(geo.count_of_clusters, 131072 - 2064);
    assert_eq!(geo.root_directory_start_cluster, 2);
    assert_eq!(vol.volume_label(), "TESTVOL");

    let bs = vol.boot_sector().unwrap();
    assert!(bs.is_valid_fat32());
    assert_eq!(bs.backup_boot_sector, 6);
    assert_eq!(bs.fs_info_sector, 1);

    let info = vol.fs_info().unwrap();
    assert!(info.is_valid());
    assert_eq!(info.free_count, geo.count_of_clusters - 1);
}

#[test]
fn test_format_writes_backup_and_reserved_fat_entries() {
    let (vol, _root) = formatted_volume();
    let dev = vol.device();
    assert_eq!(dev.sector(0), dev.sector(6));
    assert_eq!(dev.sector(1), dev.sector(7));
    for fat in 0..2 {
        assert_eq!(fat_raw(dev, fat, 0), 0x0FFF_FFF8);
        assert_eq!(fat_raw(dev, fat, 1), FAT32_EOC);
        assert_eq!(fat_raw(dev, fat, 2), FAT32_EOC);
    }
    // Volume label entry leads the root directory
    let root = dev.sector(2064);
    assert_eq!(&root[..7], b"TESTVOL");
    assert_eq!(root[11], 0x08 | 0x20);
}

#[test]
fn test_format_with_options() {
    let mut vol = Fat32Volume::new(MemoryBlockDevice::with_size_mb(64));
    let opts = FormatOptions::new().label("disk one").volume_id(0xCAFE_F00D);
    vol.format_with(&opts).unwrap();
    vol.init().unwrap();
    let bs = vol.boot_sector().unwrap();
    assert_eq!(bs.volume_id, 0xCAFE_F00D);
    assert_eq!(&bs.oem_name, b"KLIVEIDE");
    assert_eq!(vol.volume_label(), "DISK ONE");
}

#[test]
fn test_format_rejects_small_device() {
    let mut vol = Fat32Volume::new(MemoryBlockDevice::with_size_mb(32));
    assert!(matches!(
        vol.format("SMALL"),
        Err(FatError::VolumeTooSmall(_))
    ));
}

#[test]
fn test_init_rejects_blank_device() {
    let mut vol = Fat32Volume::new(MemoryBlockDevice::with_size_mb(64));
    assert!(matches!(vol.init(), Err(FatError::InvalidBootSector)));
}

#[test]
fn test_init_rejects_too_few_clusters() {
    let (mut vol, _root) = formatted_volume();
    // Shrink BPB_TotSec32 below the FAT32 cluster threshold
    vol.device_mut().data[0x20..0x24].copy_from_slice(&60_000u32.to_le_bytes());
    assert!(matches!(
        vol.init(),
        Err(FatError::VolumeTooSmall(57_936))
    ));
}

#[test]
fn test_mount_existing_volume() {
    let (vol, _root) = formatted_volume();
    let dev = vol.into_inner();
    let vol = Fat32Volume::mount(dev).unwrap();
    assert_eq!(vol.root_directory_start_cluster(), 2);
    assert_eq!(vol.alloc_search_start(), 1);
}

#[test]
fn test_allocate_fresh_chains_are_distinct() {
    let (mut vol, _root) = formatted_volume();
    let free_before = vol.free_cluster_count().unwrap();

    let mut seen = Vec::new();
    for _ in 0..8 {
        let c = vol.allocate_cluster(0).unwrap().expect("free cluster");
        assert!(!seen.contains(&c));
        assert_ne!(c, 2, "root cluster is in use");
        assert_eq!(vol.get_fat_entry(c).unwrap(), FAT32_EOC);
        assert_eq!(vol.next_cluster(c).unwrap(), None);
        seen.push(c);
    }
    assert_eq!(seen, (3..11).collect::<Vec<_>>());
    assert_eq!(vol.free_cluster_count().unwrap(), free_before - 8);
}

#[test]
fn test_allocate_links_chain() {
    let (mut vol, _root) = formatted_volume();
    let a = vol.allocate_cluster(0).unwrap().unwrap();
    let b = vol.allocate_cluster(a).unwrap().unwrap();
    let c = vol.allocate_cluster(b).unwrap().unwrap();
    assert_eq!(vol.next_cluster(a).unwrap(), Some(b));
    assert_eq!(vol.next_cluster(b).unwrap(), Some(c));
    assert_eq!(vol.next_cluster(c).unwrap(), None);
}

#[test]
fn test_allocate_after_current_leaves_cursor() {
    let (mut vol, _root) = formatted_volume();
    let x = vol.allocate_cluster(0).unwrap().unwrap();
    let y = vol.allocate_cluster(0).unwrap().unwrap();
    let z = vol.allocate_cluster(0).unwrap().unwrap();
    vol.free_chain(y).unwrap();
    vol.free_chain(x).unwrap();
    let cursor = vol.alloc_search_start();
    assert_eq!(cursor, x - 1);

    // Scan starts at z, past the cursor, so the cursor stays put
    let next = vol.allocate_cluster(z).unwrap().unwrap();
    assert_eq!(next, z + 1);
    assert_eq!(vol.next_cluster(z).unwrap(), Some(next));
    assert_eq!(vol.alloc_search_start(), cursor);

    // A fresh chain scans from the cursor and moves it
    assert_eq!(vol.allocate_cluster(0).unwrap(), Some(x));
    assert_eq!(vol.alloc_search_start(), x);
}

#[test]
fn test_free_chain_restores_count_and_cursor() {
    let (mut vol, _root) = formatted_volume();
    let free_before = vol.free_cluster_count().unwrap();
    let a = vol.allocate_cluster(0).unwrap().unwrap();
    let b = vol.allocate_cluster(a).unwrap().unwrap();
    let _other = vol.allocate_cluster(0).unwrap().unwrap();

    vol.free_chain(a).unwrap();
    assert_eq!(vol.get_fat_entry(a).unwrap(), 0);
    assert_eq!(vol.get_fat_entry(b).unwrap(), 0);
    assert_eq!(vol.free_cluster_count().unwrap(), free_before - 1);
    assert_eq!(vol.alloc_search_start(), a - 1);

    // Freed clusters are handed out again
    assert_eq!(vol.allocate_cluster(0).unwrap(), Some(a));
}

#[test]
fn test_alloc_contiguous_run() {
    let (mut vol, _root) = formatted_volume();
    let free_before = vol.free_cluster_count().unwrap();
    let first = vol.alloc_contiguous(4).unwrap().expect("run");
    for i in 0..3 {
        assert_eq!(vol.next_cluster(first + i).unwrap(), Some(first + i + 1));
    }
    assert_eq!(vol.next_cluster(first + 3).unwrap(), None);
    assert_eq!(vol.free_cluster_count().unwrap(), free_before - 4);
    assert_eq!(vol.alloc_contiguous(0).unwrap(), None);
}

#[test]
fn test_alloc_contiguous_skips_short_gaps() {
    let (mut vol, _root) = formatted_volume();
    let a = vol.allocate_cluster(0).unwrap().unwrap();
    let b = vol.allocate_cluster(0).unwrap().unwrap();
    let _c = vol.allocate_cluster(0).unwrap().unwrap();
    vol.free_chain(b).unwrap();
    vol.free_chain(a).unwrap();
    // Two-cluster gap at a..=b cannot hold three
    let run = vol.alloc_contiguous(3).unwrap().unwrap();
    assert!(run > b + 1);
}

#[test]
fn test_fat_writes_are_mirrored() {
    let (mut vol, _root) = formatted_volume();
    vol.set_fat_entry(200, 0x0123_4567).unwrap();
    let dev = vol.device();
    assert_eq!(fat_raw(dev, 0, 200), 0x0123_4567);
    assert_eq!(fat_raw(dev, 1, 200), 0x0123_4567);
}

#[test]
fn test_fat_entry_keeps_reserved_high_bits() {
    let (mut vol, _root) = formatted_volume();
    for fat in 0..2 {
        let off = (FAT0 + fat * FAT_SIZE_64MB) * 512 + 300 * 4;
        vol.device_mut().data[off + 3] = 0xF0;
    }
    vol.set_fat_entry(300, 5).unwrap();
    assert_eq!(fat_raw(vol.device(), 0, 300), 0xF000_0005);
    assert_eq!(vol.get_fat_entry(300).unwrap(), 5);
}

#[test]
fn test_fat_entry_out_of_range() {
    let (mut vol, _root) = formatted_volume();
    assert!(matches!(
        vol.get_fat_entry(1),
        Err(FatError::FatEntryOutOfRange(1))
    ));
    let past = 1016 * 128;
    assert!(matches!(
        vol.set_fat_entry(past, 0),
        Err(FatError::FatEntryOutOfRange(_))
    ));
}
