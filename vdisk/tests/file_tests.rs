//! File and directory handle tests

mod common;

use common::{formatted_volume, MemoryBlockDevice, ScratchFile};
use vdisk::cim::create_file;
use vdisk::fat32::{Fat32Volume, FatError, FatFile, OpenFlags};
use vdisk::CimFile;

type Vol = Fat32Volume<MemoryBlockDevice>;

fn rw_create() -> OpenFlags {
    OpenFlags::READ_WRITE | OpenFlags::CREATE
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 251) as u8).collect()
}

fn write_file(vol: &mut Vol, root: &mut FatFile, path: &str, data: &[u8]) {
    let mut file = FatFile::new();
    file.open(vol, root, path, rw_create()).unwrap();
    assert_eq!(file.write(vol, data).unwrap(), data.len());
    file.close();
}

fn read_file(vol: &mut Vol, root: &mut FatFile, path: &str) -> Vec<u8> {
    let mut file = FatFile::new();
    file.open(vol, root, path, OpenFlags::READ_ONLY).unwrap();
    file.read_to_end(vol).unwrap()
}

fn chain_len(vol: &mut Vol, first: u32) -> u32 {
    let mut n = 0;
    let mut cluster = Some(first);
    while let Some(c) = cluster {
        n += 1;
        cluster = vol.next_cluster(c).unwrap();
    }
    n
}

#[test]
fn test_hello_file_on_cim_container() {
    let scratch = ScratchFile::new("hello");
    {
        let cim = create_file(scratch.path(), 64, false).unwrap();
        let mut vol = Fat32Volume::new(cim);
        vol.format("KLIVE").unwrap();
        vol.init().unwrap();
        let mut root = FatFile::new();
        root.open_root(&vol).unwrap();

        let mut file = FatFile::new();
        file.open(&mut vol, &mut root, "hello.txt", rw_create()).unwrap();
        assert_eq!(file.write(&mut vol, b"0123456789").unwrap(), 10);
        file.close();
    }

    let cim = CimFile::open(scratch.path()).unwrap();
    let mut vol = Fat32Volume::mount(cim).unwrap();
    let mut root = FatFile::new();
    root.open_root(&vol).unwrap();

    let mut file = FatFile::new();
    file.open(&mut vol, &mut root, "hello.txt", OpenFlags::READ_ONLY).unwrap();
    assert!(file.is_file());
    assert_eq!(file.size(), 10);
    assert_eq!(file.read(&mut vol, 10).unwrap(), b"0123456789");
    assert!(matches!(file.write(&mut vol, b"x"), Err(FatError::NoWrite)));
    assert_eq!(
        FatError::NoWrite.to_string(),
        "File is not open for writing"
    );

    let entry = file.dir_entry(&mut vol).unwrap();
    assert_eq!(&entry.name, b"HELLO   TXT");
    assert_eq!(entry.short_name(), "hello.txt");
}

#[test]
fn test_files_around_cluster_boundaries() {
    let (mut vol, mut root) = formatted_volume();
    let cluster = vol.bytes_per_cluster() as usize;
    let sizes = [1, 511, 512, 513, cluster, cluster + 1, 3 * cluster + 100, 20_000];

    for (i, &len) in sizes.iter().enumerate() {
        let name = format!("f{}.bin", i);
        let data = pattern(len);
        write_file(&mut vol, &mut root, &name, &data);
        assert_eq!(read_file(&mut vol, &mut root, &name), data, "{} bytes", len);

        let mut file = FatFile::new();
        file.open(&mut vol, &mut root, &name, OpenFlags::READ_ONLY).unwrap();
        let expected = len.div_ceil(cluster) as u32;
        assert_eq!(chain_len(&mut vol, file.first_cluster()), expected);
    }
}

#[test]
fn test_empty_file_has_no_cluster() {
    let (mut vol, mut root) = formatted_volume();
    let mut file = FatFile::new();
    file.open(&mut vol, &mut root, "empty", rw_create()).unwrap();
    assert_eq!(file.first_cluster(), 0);
    assert_eq!(file.size(), 0);
    assert_eq!(file.read(&mut vol, 100).unwrap(), Vec::<u8>::new());
}

#[test]
fn test_small_reads_and_seeks() {
    let (mut vol, mut root) = formatted_volume();
    let data = pattern(5000);
    write_file(&mut vol, &mut root, "seek.bin", &data);

    let mut file = FatFile::new();
    file.open(&mut vol, &mut root, "seek.bin", OpenFlags::READ_ONLY).unwrap();
    let mut buf = [0u8; 7];
    let mut collected = Vec::new();
    loop {
        let n = file.read_into(&mut vol, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        collected.extend_from_slice(&buf[..n]);
    }
    assert_eq!(collected, data);

    file.seek_set(&mut vol, 1500).unwrap();
    assert_eq!(file.read(&mut vol, 10).unwrap(), &data[1500..1510]);
    file.seek_set(&mut vol, 100).unwrap();
    assert_eq!(file.read(&mut vol, 1000).unwrap(), &data[100..1100]);

    assert!(matches!(
        file.seek_set(&mut vol, 5001),
        Err(FatError::SeekPastEndOfFile)
    ));
    assert_eq!(file.position(), 1100);
    file.seek_end(&mut vol).unwrap();
    assert_eq!(file.read(&mut vol, 10).unwrap(), Vec::<u8>::new());
}

#[test]
fn test_overwrite_in_middle_keeps_size() {
    let (mut vol, mut root) = formatted_volume();
    let mut data = pattern(3000);
    write_file(&mut vol, &mut root, "mid.bin", &data);

    let mut file = FatFile::new();
    file.open(&mut vol, &mut root, "mid.bin", OpenFlags::READ_WRITE).unwrap();
    file.seek_set(&mut vol, 1000).unwrap();
    file.write(&mut vol, &[0xAB; 700]).unwrap();
    assert_eq!(file.size(), 3000);
    file.close();

    data[1000..1700].fill(0xAB);
    assert_eq!(read_file(&mut vol, &mut root, "mid.bin"), data);
}

#[test]
fn test_append_and_at_end() {
    let (mut vol, mut root) = formatted_volume();
    write_file(&mut vol, &mut root, "log.txt", b"one");

    let mut file = FatFile::new();
    file.open(
        &mut vol,
        &mut root,
        "log.txt",
        OpenFlags::WRITE_ONLY | OpenFlags::APPEND,
    )
    .unwrap();
    file.write(&mut vol, b"two").unwrap();
    file.close();

    file.open(
        &mut vol,
        &mut root,
        "log.txt",
        OpenFlags::READ_WRITE | OpenFlags::AT_END,
    )
    .unwrap();
    assert_eq!(file.position(), 6);
    file.write(&mut vol, b"three").unwrap();
    file.close();

    assert_eq!(read_file(&mut vol, &mut root, "log.txt"), b"onetwothree");
}

#[test]
fn test_open_flags_rules() {
    let (mut vol, mut root) = formatted_volume();
    let mut file = FatFile::new();

    assert!(matches!(
        file.open(&mut vol, &mut root, "missing.txt", OpenFlags::READ_ONLY),
        Err(FatError::NotFound)
    ));
    // CREATE without a write mode does not create
    assert!(matches!(
        file.open(&mut vol, &mut root, "missing.txt", OpenFlags::CREATE),
        Err(FatError::NotFound)
    ));

    write_file(&mut vol, &mut root, "data.txt", b"abc");
    assert!(matches!(
        file.open(
            &mut vol,
            &mut root,
            "data.txt",
            rw_create() | OpenFlags::EXCLUSIVE
        ),
        Err(FatError::AlreadyExists)
    ));
    assert!(matches!(
        file.open(
            &mut vol,
            &mut root,
            "data.txt",
            OpenFlags::READ_ONLY | OpenFlags::TRUNCATE
        ),
        Err(FatError::InvalidFlags)
    ));
    assert!(!file.is_open());

    file.open(&mut vol, &mut root, "data.txt", OpenFlags::READ_ONLY).unwrap();
    assert!(matches!(
        file.open(&mut vol, &mut root, "data.txt", OpenFlags::READ_ONLY),
        Err(FatError::AlreadyOpen)
    ));
    file.close();

    assert!(matches!(
        root.write(&mut vol, b"nope"),
        Err(FatError::NoWrite)
    ));
}

#[test]
fn test_truncate_on_open_frees_clusters() {
    let (mut vol, mut root) = formatted_volume();
    write_file(&mut vol, &mut root, "big.bin", &pattern(4096));
    let free_before = vol.free_cluster_count().unwrap();

    let mut file = FatFile::new();
    file.open(
        &mut vol,
        &mut root,
        "big.bin",
        OpenFlags::READ_WRITE | OpenFlags::TRUNCATE,
    )
    .unwrap();
    assert_eq!(file.size(), 0);
    assert_eq!(file.first_cluster(), 0);
    assert_eq!(vol.free_cluster_count().unwrap(), free_before + 8);
    assert_eq!(file.dir_entry(&mut vol).unwrap().file_size, 0);
}

#[test]
fn test_truncate_to_length() {
    let (mut vol, mut root) = formatted_volume();
    let data = pattern(2000);
    write_file(&mut vol, &mut root, "cut.bin", &data);
    let free_before = vol.free_cluster_count().unwrap();

    let mut file = FatFile::new();
    file.open(&mut vol, &mut root, "cut.bin", OpenFlags::READ_WRITE).unwrap();
    file.truncate(&mut vol, 600).unwrap();
    assert_eq!(file.size(), 600);
    assert_eq!(chain_len(&mut vol, file.first_cluster()), 2);
    assert_eq!(vol.free_cluster_count().unwrap(), free_before + 2);
    assert!(matches!(
        file.truncate(&mut vol, 601),
        Err(FatError::SeekPastEndOfFile)
    ));
    file.close();

    assert_eq!(read_file(&mut vol, &mut root, "cut.bin"), &data[..600]);
}

#[test]
fn test_pre_allocate_then_write() {
    let (mut vol, mut root) = formatted_volume();
    let data = pattern(4000);
    let mut file = FatFile::new();
    file.open(&mut vol, &mut root, "pre.bin", rw_create()).unwrap();
    file.pre_allocate(&mut vol, data.len() as u32).unwrap();
    assert!(file.is_contiguous());
    let first = file.first_cluster();
    assert_eq!(chain_len(&mut vol, first), 8);

    file.write(&mut vol, &data).unwrap();
    assert_eq!(file.first_cluster(), first);
    assert!(matches!(
        file.pre_allocate(&mut vol, 10),
        Err(FatError::AlreadyAllocated)
    ));
    file.close();

    assert_eq!(read_file(&mut vol, &mut root, "pre.bin"), data);
}

#[test]
fn test_long_names_are_created_and_matched_case_insensitively() {
    let (mut vol, mut root) = formatted_volume();
    write_file(&mut vol, &mut root, "My Long File Name.txt", b"lfn");

    assert_eq!(
        read_file(&mut vol, &mut root, "MY LONG FILE NAME.TXT"),
        b"lfn"
    );
    assert_eq!(read_file(&mut vol, &mut root, "MYLONG~1.TXT"), b"lfn");

    let listing = root.list(&mut vol).unwrap();
    let entry = listing
        .iter()
        .find(|e| e.short_name == "MYLONG~1.TXT")
        .expect("listed");
    assert_eq!(entry.name, "My Long File Name.txt");
    assert_eq!(entry.size, 3);
    assert!(!entry.is_dir);
}

#[test]
fn test_colliding_short_names_get_unique_tails() {
    let (mut vol, mut root) = formatted_volume();
    write_file(&mut vol, &mut root, "longfilename1.txt", b"first");
    write_file(&mut vol, &mut root, "longfilename2.txt", b"second");
    write_file(&mut vol, &mut root, "longfilename3.txt", b"third");

    let listing = root.list(&mut vol).unwrap();
    let mut shorts: Vec<_> = listing
        .iter()
        .filter(|e| e.name.starts_with("longfilename"))
        .map(|e| (e.name.clone(), e.short_name.clone()))
        .collect();
    shorts.sort();
    assert_eq!(
        shorts,
        vec![
            ("longfilename1.txt".to_string(), "LONGFI~1.TXT".to_string()),
            ("longfilename2.txt".to_string(), "LONGFI~2.TXT".to_string()),
            ("longfilename3.txt".to_string(), "LONGFI~3.TXT".to_string()),
        ]
    );
    assert_eq!(read_file(&mut vol, &mut root, "longfilename2.txt"), b"second");
    assert_eq!(read_file(&mut vol, &mut root, "LONGFI~3.TXT"), b"third");
}

#[test]
fn test_mixed_case_name_keeps_its_spelling() {
    let (mut vol, mut root) = formatted_volume();
    write_file(&mut vol, &mut root, "ReadMe.md", b"#");
    let listing = root.list(&mut vol).unwrap();
    let entry = listing.iter().find(|e| e.short_name == "README.MD").unwrap();
    assert_eq!(entry.name, "ReadMe.md");
    assert_eq!(read_file(&mut vol, &mut root, "readme.MD"), b"#");
}

#[test]
fn test_root_directory_grows_past_one_cluster() {
    let (mut vol, mut root) = formatted_volume();
    for i in 0..60 {
        write_file(&mut vol, &mut root, &format!("file{:02}.dat", i), &[i as u8]);
    }
    for i in 0..60 {
        assert_eq!(
            read_file(&mut vol, &mut root, &format!("FILE{:02}.DAT", i)),
            vec![i as u8]
        );
    }
    let root_cluster = vol.root_directory_start_cluster();
    assert!(chain_len(&mut vol, root_cluster) > 1);
    assert_eq!(root.list(&mut vol).unwrap().len(), 60);
}

#[test]
fn test_mkdir_creates_dot_entries() {
    let (mut vol, mut root) = formatted_volume();
    let mut dir = FatFile::new();
    dir.mkdir(&mut vol, &mut root, "games", false).unwrap();
    assert!(dir.is_subdir());
    let outer = dir.first_cluster();

    let mut inner = FatFile::new();
    inner.mkdir(&mut vol, &mut dir, "saves", false).unwrap();

    let mut sector = [0u8; 512];
    vol.read_sector(vol.cluster_start_sector(outer), &mut sector)
        .unwrap();
    assert_eq!(&sector[..11], b".          ");
    assert_eq!(&sector[32..43], b"..         ");
    // ".." of a root child points at cluster 0
    assert_eq!(&sector[32 + 20..32 + 22], &[0, 0]);
    assert_eq!(&sector[32 + 26..32 + 28], &[0, 0]);

    vol.read_sector(vol.cluster_start_sector(inner.first_cluster()), &mut sector)
        .unwrap();
    assert_eq!(sector[26] as u32 | (sector[27] as u32) << 8, inner.first_cluster() & 0xFFFF);
    assert_eq!(sector[32 + 26] as u32 | (sector[32 + 27] as u32) << 8, outer & 0xFFFF);

    let listing = root.list(&mut vol).unwrap();
    assert!(listing.iter().any(|e| e.name == "games" && e.is_dir));
    assert!(dir.list(&mut vol).unwrap().iter().all(|e| e.name != "." && e.name != ".."));
}

#[test]
fn test_mkdir_parents() {
    let (mut vol, mut root) = formatted_volume();
    let mut dir = FatFile::new();
    assert!(matches!(
        dir.mkdir(&mut vol, &mut root, "a/b/c", false),
        Err(FatError::NotFound)
    ));
    dir.mkdir(&mut vol, &mut root, "a/b/c", true).unwrap();
    dir.close();

    assert!(FatFile::exists(&mut vol, &mut root, "/a/b/c").unwrap());
    assert!(!FatFile::exists(&mut vol, &mut root, "/a/b/d").unwrap());
    assert!(matches!(
        dir.mkdir(&mut vol, &mut root, "a/b", false),
        Err(FatError::AlreadyExists)
    ));

    write_file(&mut vol, &mut root, "/a/b/c/deep.txt", b"deep");
    assert_eq!(read_file(&mut vol, &mut root, "a/b/c/deep.txt"), b"deep");

    write_file(&mut vol, &mut root, "plain.txt", b"x");
    let mut other = FatFile::new();
    assert!(matches!(
        other.open(&mut vol, &mut root, "plain.txt/inner", OpenFlags::READ_ONLY),
        Err(FatError::NotADirectory)
    ));
    assert!(matches!(
        other.mkdir(&mut vol, &mut root, "plain.txt/inner", true),
        Err(FatError::NotADirectory)
    ));
}

#[test]
fn test_directory_cannot_be_opened_for_write() {
    let (mut vol, mut root) = formatted_volume();
    let mut dir = FatFile::new();
    dir.mkdir(&mut vol, &mut root, "docs", false).unwrap();
    dir.close();
    assert!(matches!(
        dir.open(&mut vol, &mut root, "docs", OpenFlags::READ_WRITE),
        Err(FatError::ReadOnlyEntry)
    ));
}

#[test]
fn test_remove_file_with_long_name() {
    let (mut vol, mut root) = formatted_volume();
    let free_before = vol.free_cluster_count().unwrap();
    write_file(&mut vol, &mut root, "A rather long name.bin", &pattern(1500));

    let mut file = FatFile::new();
    file.open(&mut vol, &mut root, "a rather long name.bin", OpenFlags::READ_WRITE)
        .unwrap();
    let index = file.dir_index() as usize;
    file.remove(&mut vol).unwrap();
    assert!(!file.is_open());

    assert_eq!(vol.free_cluster_count().unwrap(), free_before);
    assert!(!FatFile::exists(&mut vol, &mut root, "A rather long name.bin").unwrap());

    // Short entry and both long-name entries are marked deleted
    let mut sector = [0u8; 512];
    vol.read_sector(vol.cluster_start_sector(2), &mut sector).unwrap();
    for i in index - 2..=index {
        assert_eq!(sector[i * 32], 0xE5, "slot {}", i);
    }
    assert!(root.list(&mut vol).unwrap().is_empty());

    // Slots are reused
    write_file(&mut vol, &mut root, "A rather long name.bin", b"again");
    let mut again = FatFile::new();
    again
        .open(&mut vol, &mut root, "A rather long name.bin", OpenFlags::READ_ONLY)
        .unwrap();
    assert_eq!(again.dir_index() as usize, index);
}

#[test]
fn test_rmdir() {
    let (mut vol, mut root) = formatted_volume();
    let mut dir = FatFile::new();
    dir.mkdir(&mut vol, &mut root, "tmp", false).unwrap();
    dir.close();
    write_file(&mut vol, &mut root, "tmp/x.txt", b"x");

    let mut dir = FatFile::new();
    dir.open(&mut vol, &mut root, "tmp", OpenFlags::READ_ONLY).unwrap();
    assert!(matches!(
        dir.rmdir(&mut vol),
        Err(FatError::DirectoryNotEmpty)
    ));

    FatFile::remove_path(&mut vol, &mut root, "tmp/x.txt").unwrap();
    FatFile::remove_path(&mut vol, &mut root, "tmp").unwrap();
    assert!(!FatFile::exists(&mut vol, &mut root, "tmp").unwrap());
    assert!(matches!(root.rmdir(&mut vol), Err(FatError::NotADirectory)));
}

#[test]
fn test_separate_volumes_do_not_interfere() {
    let (mut vol_a, mut root_a) = formatted_volume();
    let (mut vol_b, mut root_b) = formatted_volume();
    write_file(&mut vol_a, &mut root_a, "only-a.txt", b"a");
    assert!(FatFile::exists(&mut vol_a, &mut root_a, "only-a.txt").unwrap());
    assert!(!FatFile::exists(&mut vol_b, &mut root_b, "only-a.txt").unwrap());
}
