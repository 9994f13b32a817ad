use proptest::prelude::*;

use crate::{
    checksum::{crc32, crc32c, exfat_boot_checksum, fletcher64, sha256, xxh64},
    matcher::matches,
    probe,
    util::is_power_2,
    *,
};

fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

const EXT_COMPAT_HAS_JOURNAL: u32 = 0x0004;
const EXT_INCOMPAT_FILETYPE: u32 = 0x0002;
const EXT_INCOMPAT_RECOVER: u32 = 0x0004;
const EXT_INCOMPAT_JOURNAL_DEV: u32 = 0x0008;
const EXT_INCOMPAT_EXTENTS: u32 = 0x0040;
const EXT_RO_COMPAT_METADATA_CSUM: u32 = 0x0400;
const EXT_FLAGS_TEST_FILESYS: u32 = 0x0004;

fn ext_image(compat: u32, incompat: u32, ro_compat: u32, flags: u32, log_block_size: u32) -> Vec<u8> {
    let mut img = vec![0u8; 2048];

    put(&mut img, 0x418, &log_block_size.to_le_bytes());
    put(&mut img, 0x438, &[0x53, 0xEF]);
    put(&mut img, 0x45C, &compat.to_le_bytes());
    put(&mut img, 0x460, &incompat.to_le_bytes());
    put(&mut img, 0x464, &ro_compat.to_le_bytes());
    put(&mut img, 0x560, &flags.to_le_bytes());

    if ro_compat & EXT_RO_COMPAT_METADATA_CSUM != 0 {
        let csum = !crc32c(&[&img[0x400..0x7FC]]);
        put(&mut img, 0x7FC, &csum.to_le_bytes());
    }

    return img;
}

fn ext2_image(log_block_size: u32) -> Vec<u8> {
    return ext_image(0, EXT_INCOMPAT_FILETYPE, 0x3, 0, log_block_size);
}

fn ext4_image() -> Vec<u8> {
    return ext_image(
        EXT_COMPAT_HAS_JOURNAL,
        EXT_INCOMPAT_FILETYPE | EXT_INCOMPAT_EXTENTS,
        0x3 | EXT_RO_COMPAT_METADATA_CSUM,
        0,
        2,
    );
}

fn xfs_image() -> Vec<u8> {
    let mut img = vec![0u8; 4096];

    put(&mut img, 0, b"XFSB");
    put(&mut img, 4, &4096u32.to_be_bytes());
    put(&mut img, 8, &65536u64.to_be_bytes());
    put(&mut img, 80, &1u32.to_be_bytes());
    put(&mut img, 84, &16384u32.to_be_bytes());
    put(&mut img, 88, &4u32.to_be_bytes());
    put(&mut img, 100, &4u16.to_be_bytes());
    put(&mut img, 102, &512u16.to_be_bytes());
    put(&mut img, 104, &512u16.to_be_bytes());
    put(&mut img, 106, &8u16.to_be_bytes());
    // blocklog, sectlog, inodelog, inopblog, agblklog, rextslog, inprogress, imax_pct
    put(&mut img, 120, &[12, 9, 9, 3, 14, 0, 0, 25]);

    return img;
}

fn fat16_image() -> Vec<u8> {
    let mut img = vec![0u8; 512];

    put(&mut img, 0, &[0xEB, 0x3C, 0x90]);
    put(&mut img, 3, b"MSDOS5.0");
    put(&mut img, 11, &512u16.to_le_bytes());
    img[13] = 4;
    put(&mut img, 14, &4u16.to_le_bytes());
    img[16] = 2;
    put(&mut img, 17, &512u16.to_le_bytes());
    img[21] = 0xF8;
    put(&mut img, 22, &64u16.to_le_bytes());
    put(&mut img, 32, &65536u32.to_le_bytes());
    put(&mut img, 0x36, b"FAT16   ");
    put(&mut img, 0x1FE, &[0x55, 0xAA]);

    return img;
}

fn ntfs_image() -> Vec<u8> {
    let mut img = vec![0u8; 512];

    put(&mut img, 0, &[0xEB, 0x52, 0x90]);
    put(&mut img, 3, b"NTFS    ");
    put(&mut img, 11, &512u16.to_le_bytes());
    img[13] = 8;
    img[21] = 0xF8;
    put(&mut img, 0x28, &1_000_000u64.to_le_bytes());
    put(&mut img, 0x30, &4u64.to_le_bytes());
    put(&mut img, 0x38, &8u64.to_le_bytes());
    img[0x40] = 0xF6;
    put(&mut img, 0x1FE, &[0x55, 0xAA]);

    return img;
}

fn exfat_image() -> Vec<u8> {
    let mut img = vec![0u8; 512 * 12];

    put(&mut img, 0, &[0xEB, 0x76, 0x90]);
    put(&mut img, 3, b"EXFAT   ");
    put(&mut img, 72, &4096u64.to_le_bytes());
    put(&mut img, 80, &24u32.to_le_bytes());
    put(&mut img, 84, &8u32.to_le_bytes());
    put(&mut img, 88, &64u32.to_le_bytes());
    put(&mut img, 92, &100u32.to_le_bytes());
    put(&mut img, 96, &5u32.to_le_bytes());
    put(&mut img, 104, &[0x00, 0x01]);
    // bytes_per_sector_shift, sectors_per_cluster_shift, number_of_fats
    put(&mut img, 108, &[9, 3, 1]);
    put(&mut img, 510, &[0x55, 0xAA]);

    let csum = exfat_boot_checksum(&img, 512);
    for entry in img[512 * 11..].chunks_exact_mut(4) {
        entry.copy_from_slice(&csum.to_le_bytes());
    }

    return img;
}

fn swap_v1_image(lastpage: u32) -> Vec<u8> {
    let mut img = vec![0u8; 4096];

    put(&mut img, 1024, &1u32.to_le_bytes());
    put(&mut img, 1028, &lastpage.to_le_bytes());
    put(&mut img, 0xFF6, b"SWAPSPACE2");

    return img;
}

const BTRFS_SB: usize = 0x10000;

fn btrfs_image(csum_type: u16) -> Vec<u8> {
    let mut img = vec![0u8; BTRFS_SB + 4096];

    put(&mut img, BTRFS_SB + 0x40, b"_BHRfS_M");
    put(&mut img, BTRFS_SB + 0x90, &4096u32.to_le_bytes());
    put(&mut img, BTRFS_SB + 0x94, &16384u32.to_le_bytes());
    put(&mut img, BTRFS_SB + 0xC4, &csum_type.to_le_bytes());

    let data = img[BTRFS_SB + 32..].to_vec();
    match csum_type {
        0 => put(&mut img, BTRFS_SB, &crc32c(&[&data]).to_le_bytes()),
        1 => put(&mut img, BTRFS_SB, &xxh64(&data, 0).to_le_bytes()),
        2 => put(&mut img, BTRFS_SB, &sha256(&data)),
        _ => {}
    }

    return img;
}

fn erofs_image(with_csum: bool) -> Vec<u8> {
    let mut img = vec![0u8; 4096];

    put(&mut img, 1024, &[0xE2, 0xE1, 0xF5, 0xE0]);
    put(&mut img, 1036, &[12]);

    if with_csum {
        put(&mut img, 1032, &1u32.to_le_bytes());
        let csum = !crc32c(&[&img[1024..]]);
        put(&mut img, 1028, &csum.to_le_bytes());
    }

    return img;
}

fn apfs_image() -> Vec<u8> {
    let mut img = vec![0u8; 4096];

    put(&mut img, 8, &1026u64.to_le_bytes());
    put(&mut img, 24, &1u16.to_le_bytes());
    put(&mut img, 32, b"NXSB");
    put(&mut img, 36, &4096u32.to_le_bytes());
    put(&mut img, 40, &262144u64.to_le_bytes());
    put(&mut img, 72, &[0xA5; 16]);

    let csum = fletcher64(&img[8..]);
    put(&mut img, 0, &csum.to_le_bytes());

    return img;
}

fn zonefs_image() -> Vec<u8> {
    let mut img = vec![0u8; 4096];

    put(&mut img, 0, b"SFOZ");
    put(&mut img, 8, b"zones");

    let csum = !crc32(&[&img]);
    put(&mut img, 4, &csum.to_le_bytes());

    return img;
}

fn probe_all(buffer: &[u8]) -> ProbeResult {
    return probe_buffer(buffer, None).unwrap();
}

#[test]
fn ext2_block_size_exponents() {
    let r = probe_all(&ext2_image(0));
    assert_eq!(r.name(), Some("ext2"));
    assert_eq!(r.block_size(), Some(1024));

    let r = probe_all(&ext2_image(2));
    assert_eq!(r.block_type(), Some(BlockType::Ext2));
    assert_eq!(r.block_size(), Some(4096));

    // 1024 << 7 is beyond what ext allows
    let r = probe_all(&ext2_image(7));
    assert_eq!(r.name(), Some("ext2"));
    assert_eq!(r.block_size(), None);
}

#[test]
fn ext_family_is_disambiguated() {
    let ext3 = ext_image(
        EXT_COMPAT_HAS_JOURNAL,
        EXT_INCOMPAT_FILETYPE | EXT_INCOMPAT_RECOVER,
        0x3,
        0,
        2,
    );
    assert_eq!(probe_all(&ext3).name(), Some("ext3"));

    assert_eq!(probe_all(&ext4_image()).name(), Some("ext4"));

    let ext4dev = ext_image(
        EXT_COMPAT_HAS_JOURNAL,
        EXT_INCOMPAT_EXTENTS,
        0x3,
        EXT_FLAGS_TEST_FILESYS,
        2,
    );
    assert_eq!(probe_all(&ext4dev).name(), Some("ext4dev"));

    let jbd = ext_image(0, EXT_INCOMPAT_JOURNAL_DEV, 0, 0, 2);
    let r = probe_all(&jbd);
    assert_eq!(r.name(), Some("jbd"));
    assert_eq!(r.as_match().unwrap().usage, UsageType::Other("jbd"));
}

#[test]
fn ext4_checksum_mismatch_is_rejected() {
    let mut img = ext4_image();
    img[0x478] ^= 0xFF;

    assert_eq!(probe_all(&img), ProbeResult::NoMatch);
}

#[test]
fn xfs_probe_test() {
    let r = probe_all(&xfs_image());

    let m = r.as_match().unwrap();
    assert_eq!(m.btype, BlockType::Xfs);
    assert_eq!(m.usage, UsageType::Filesystem);
    assert_eq!(m.block_size, Some(4096));
    assert_eq!(m.sbmagic, b"XFSB");
    assert_eq!(m.sbmagic_offset, 0);
}

#[test]
fn xfs_bad_geometry_is_rejected() {
    let mut img = xfs_image();
    // agcount of zero
    put(&mut img, 88, &0u32.to_be_bytes());

    assert_eq!(probe_all(&img), ProbeResult::NoMatch);
}

#[test]
fn vfat_probe_test() {
    let r = probe_all(&fat16_image());

    let m = r.as_match().unwrap();
    assert_eq!(m.name, "vfat");
    assert_eq!(m.sbmagic, b"FAT16   ");
    assert_eq!(m.sbmagic_offset, 0x36);
    assert_eq!(m.block_size, Some(2048));
}

#[test]
fn ntfs_probe_test() {
    let r = probe_all(&ntfs_image());
    assert_eq!(r.name(), Some("ntfs"));
    assert_eq!(r.block_size(), Some(4096));
}

#[test]
fn exfat_probe_test() {
    let r = probe_all(&exfat_image());
    assert_eq!(r.name(), Some("exfat"));
    assert_eq!(r.block_size(), Some(4096));
}

#[test]
fn exfat_checksum_mismatch_is_rejected() {
    let mut img = exfat_image();
    img[200] = 0x42;

    assert_eq!(probe_all(&img), ProbeResult::NoMatch);
}

#[test]
fn swap_probe_test() {
    let r = probe_all(&swap_v1_image(255));

    let m = r.as_match().unwrap();
    assert_eq!(m.name, "swap");
    assert_eq!(m.usage, UsageType::Other("swap"));
    assert_eq!(m.block_size, Some(4096));

    assert_eq!(probe_all(&swap_v1_image(0)), ProbeResult::NoMatch);
}

#[test]
fn swap_page_size_follows_signature() {
    let mut img = vec![0u8; 0x4000];
    put(&mut img, 0x3FF6, b"SWAP-SPACE");

    let r = probe_all(&img);
    assert_eq!(r.name(), Some("swap"));
    assert_eq!(r.block_size(), Some(0x4000));
}

#[test]
fn swsuspend_probe_test() {
    let mut img = vec![0u8; 4096];
    put(&mut img, 0xFF6, b"S1SUSPEND");

    let r = probe_all(&img);
    assert_eq!(r.name(), Some("swsuspend"));
    assert_eq!(r.block_size(), Some(4096));
}

#[test]
fn iso9660_probe_test() {
    let mut img = vec![0u8; 0x8800];
    img[0x8000] = 1;
    put(&mut img, 0x8001, b"CD001");
    img[0x8006] = 1;
    put(&mut img, 0x8080, &2048u16.to_le_bytes());
    put(&mut img, 0x8082, &2048u16.to_be_bytes());

    let r = probe_all(&img);
    assert_eq!(r.name(), Some("iso9660"));
    assert_eq!(r.block_size(), Some(2048));

    put(&mut img, 0x8082, &512u16.to_be_bytes());
    assert_eq!(probe_all(&img), ProbeResult::NoMatch);
}

#[test]
fn btrfs_checksum_types() {
    for csum_type in [0u16, 1, 2] {
        let r = probe_all(&btrfs_image(csum_type));
        assert_eq!(r.name(), Some("btrfs"), "csum_type {csum_type}");
        assert_eq!(r.block_size(), Some(4096));

        let mut corrupt = btrfs_image(csum_type);
        corrupt[BTRFS_SB + 0x100] ^= 0x01;
        assert_eq!(probe_all(&corrupt), ProbeResult::NoMatch, "csum_type {csum_type}");
    }

    // unknown checksum algorithms are not verified
    let r = probe_all(&btrfs_image(7));
    assert_eq!(r.name(), Some("btrfs"));
}

#[test]
fn squashfs_versions() {
    let mut v4 = vec![0u8; 96];
    put(&mut v4, 0, b"hsqs");
    put(&mut v4, 12, &131072u32.to_le_bytes());
    put(&mut v4, 28, &4u16.to_le_bytes());

    let r = probe_all(&v4);
    assert_eq!(r.name(), Some("squashfs"));
    assert_eq!(r.block_size(), Some(131072));

    let mut v3 = vec![0u8; 96];
    put(&mut v3, 0, b"sqsh");
    put(&mut v3, 28, &3u16.to_be_bytes());

    let r = probe_all(&v3);
    assert_eq!(r.name(), Some("squashfs3"));
    assert_eq!(r.as_match().unwrap().sbmagic, b"sqsh");
    assert_eq!(r.block_size(), Some(1024));

    let mut v3_le = vec![0u8; 96];
    put(&mut v3_le, 0, b"hsqs");
    put(&mut v3_le, 28, &3u16.to_le_bytes());
    assert_eq!(probe_all(&v3_le).name(), Some("squashfs3"));
}

#[test]
fn cramfs_has_no_block_size() {
    let mut img = vec![0u8; 1024];
    put(&mut img, 0x200, &[0x28, 0xCD, 0x3D, 0x45]);

    let r = probe_all(&img);
    assert_eq!(r.name(), Some("cramfs"));
    assert_eq!(r.as_match().unwrap().sbmagic_offset, 0x200);
    assert_eq!(r.block_size(), None);
}

#[test]
fn f2fs_probe_test() {
    let mut img = vec![0u8; 2048];
    put(&mut img, 1024, &[0x10, 0x20, 0xF5, 0xF2]);
    put(&mut img, 1032, &9u32.to_le_bytes());
    put(&mut img, 1036, &3u32.to_le_bytes());
    put(&mut img, 1040, &12u32.to_le_bytes());

    let r = probe_all(&img);
    assert_eq!(r.name(), Some("f2fs"));
    assert_eq!(r.block_size(), Some(4096));

    put(&mut img, 1036, &4u32.to_le_bytes());
    assert_eq!(probe_all(&img), ProbeResult::NoMatch);
}

#[test]
fn erofs_probe_test() {
    let r = probe_all(&erofs_image(false));
    assert_eq!(r.name(), Some("erofs"));
    assert_eq!(r.block_size(), Some(4096));

    assert_eq!(probe_all(&erofs_image(true)).name(), Some("erofs"));

    let mut corrupt = erofs_image(true);
    corrupt[2000] = 0x77;
    assert_eq!(probe_all(&corrupt), ProbeResult::NoMatch);
}

#[test]
fn apfs_probe_test() {
    let r = probe_all(&apfs_image());
    assert_eq!(r.name(), Some("apfs"));
    assert_eq!(r.block_size(), Some(4096));

    let mut corrupt = apfs_image();
    corrupt[100] = 1;
    assert_eq!(probe_all(&corrupt), ProbeResult::NoMatch);
}

#[test]
fn zonefs_probe_test() {
    let r = probe_all(&zonefs_image());
    assert_eq!(r.name(), Some("zonefs"));
    assert_eq!(r.block_size(), Some(4096));

    let mut corrupt = zonefs_image();
    corrupt[9] = b'Z';
    assert_eq!(probe_all(&corrupt), ProbeResult::NoMatch);
}

#[test]
fn validated_outranks_magic_only() {
    let mut img = ext2_image(2);
    put(&mut img, 0, b"-rom1fs-");

    assert_eq!(probe_all(&img).name(), Some("ext2"));

    let mut romfs = vec![0u8; 512];
    put(&mut romfs, 0, b"-rom1fs-");
    let r = probe_all(&romfs);
    assert_eq!(r.name(), Some("romfs"));
    assert_eq!(r.block_size(), Some(1024));
}

#[test]
fn disjoint_validated_hits_resolve_by_registration() {
    let mut img = xfs_image();
    put(&mut img, 0x400, &ext2_image(2)[0x400..]);

    // both superblocks validate; xfs is registered first
    let r = probe_all(&img);
    assert_eq!(r.name(), Some("xfs"));
    assert_eq!(r.block_size(), Some(4096));
    assert_eq!(probe_all(&img), r);

    let r = probe_buffer(&img, Some(&["ext2"])).unwrap();
    assert_eq!(r.name(), Some("ext2"));
}

#[test]
fn filter_limits_candidates() {
    let img = ext2_image(2);

    assert_eq!(
        probe_buffer(&img, Some(&["xfs"])).unwrap(),
        ProbeResult::NoMatch
    );
    assert_eq!(
        probe_buffer(&img, Some(&["xfs", "ext2"])).unwrap().name(),
        Some("ext2")
    );
}

#[test]
fn filter_config_errors() {
    assert_eq!(
        probe_buffer(&[0u8; 64], Some(&["ext2", "reiserfs"])),
        Err(BlockidError::Config(ConfigError::UnknownFormat(
            "reiserfs".to_string()
        )))
    );
    assert_eq!(
        probe_buffer(&[0u8; 64], Some(&[])),
        Err(BlockidError::Config(ConfigError::EmptyFilter))
    );
}

#[test]
fn filter_builder_dedups() {
    let config = ProbeConfig::builder()
        .format("ext2")
        .formats(["xfs", "ext2"])
        .build()
        .unwrap();

    let names: Vec<&str> = config.formats().map(FormatDescriptor::name).collect();
    assert_eq!(names, vec!["xfs", "ext2"]);
    assert!(config.is_filtered());

    assert_eq!(ProbeConfig::builder().build().unwrap(), ProbeConfig::all());
}

#[test]
fn probing_is_idempotent() {
    let probe = Probe::new(ProbeConfig::all());
    let img = fat16_image();

    let first = probe.run(&img);
    assert_eq!(first, probe.run(&img));
    assert_eq!(first, probe::run(&img, probe.config()));
}

#[test]
fn probe_is_shareable_across_threads() {
    let probe = &Probe::default();
    let images = [ext2_image(2), xfs_image(), fat16_image(), swap_v1_image(16)];
    let expected = ["ext2", "xfs", "vfat", "swap"];

    std::thread::scope(|s| {
        let handles: Vec<_> = images
            .iter()
            .map(|img| s.spawn(move || probe.run(img)))
            .collect();

        for (handle, name) in handles.into_iter().zip(expected) {
            assert_eq!(handle.join().unwrap().name(), Some(name));
        }
    });
}

#[test]
fn supported_formats_are_unique() {
    let formats = supported_formats();

    for name in ["ext2", "ext3", "ext4", "xfs", "vfat", "swap", "btrfs"] {
        assert!(formats.contains(&name), "{name} missing");
    }

    let mut sorted = formats.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), formats.len());
    assert_eq!(formats.len(), REGISTRY.len());
}

#[test]
fn block_size_by_name() {
    assert_eq!(block_size("ext2", &ext2_image(0)), Ok(Some(1024)));
    assert_eq!(block_size("xfs", &xfs_image()), Ok(Some(4096)));
    assert_eq!(block_size("cramfs", &[0u8; 16]), Ok(None));
    assert_eq!(block_size("ext2", &[0u8; 16]), Ok(None));
    assert_eq!(
        block_size("hfsplus", &[0u8; 16]),
        Err(BlockidError::Registry(RegistryError::NotFound(
            "hfsplus".to_string()
        )))
    );
}

#[test]
fn shared_magic_needs_validators_on_both_sides() {
    use crate::filesystems::{
        cramfs::ROMFS_ID_INFO,
        ext::{EXT2_ID_INFO, EXT3_ID_INFO},
    };
    use crate::registry::registry_is_consistent;

    assert!(registry_is_consistent(&[EXT3_ID_INFO, EXT2_ID_INFO]));

    // romfs has no validator, so a second format on its magic is rejected
    let romfs_clone = FormatDescriptor {
        btype: BlockType::Cramfs,
        ..ROMFS_ID_INFO
    };
    assert!(!registry_is_consistent(&[ROMFS_ID_INFO, romfs_clone]));
    assert!(!registry_is_consistent(&[EXT2_ID_INFO, EXT2_ID_INFO]));
}

#[test]
fn names_round_trip_through_lookup() {
    for desc in REGISTRY {
        assert_eq!(desc.name().parse::<BlockType>(), Ok(desc.btype));
        assert_eq!(lookup(desc.name()).unwrap().btype, desc.btype);
    }
    assert!("EXT4".parse::<BlockType>().is_err());
}

#[test]
fn single_rule_matching() {
    let rule = &lookup("xfs").unwrap().rules[0];

    assert!(matches(rule, &xfs_image()));
    assert!(!matches(rule, &xfs_image()[..64]));
    assert!(!matches(rule, b"XFS"));
}

#[test]
fn tiny_and_empty_buffers() {
    assert_eq!(probe_all(&[]), ProbeResult::NoMatch);
    assert_eq!(probe_all(&[0u8; 1]), ProbeResult::NoMatch);
    assert_eq!(probe_all(b"XFSB"), ProbeResult::NoMatch);
    assert_eq!(probe_all(&[0u8; 0x20000]), ProbeResult::NoMatch);
}

proptest! {
    #[test]
    fn zeroed_buffers_never_match(len in 0usize..0x12000) {
        prop_assert_eq!(probe_all(&vec![0u8; len]), ProbeResult::NoMatch);
    }

    #[test]
    fn truncated_superblock_never_matches(cut in 0usize..2048) {
        let img = ext2_image(2);
        prop_assert_eq!(probe_all(&img[..cut]), ProbeResult::NoMatch);
    }

    #[test]
    fn random_buffers_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..8192)) {
        let _ = probe_all(&bytes);
    }

    #[test]
    fn planted_magic_reports_sane_block_size(
        mut bytes in prop::collection::vec(any::<u8>(), 0x10100..0x11000),
        index in 0..REGISTRY.len(),
    ) {
        for rule in REGISTRY[index].rules {
            let start = rule.b_offset as usize;
            put(&mut bytes, start, rule.magic);
        }

        if let ProbeResult::Matched(m) = probe_all(&bytes) {
            if let Some(size) = m.block_size {
                prop_assert!(is_power_2(size));
                prop_assert!(size <= MAX_BLOCK_SIZE);
            }
        }
    }
}
