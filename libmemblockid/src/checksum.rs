use crc_fast::{
    CrcAlgorithm::{Crc32IsoHdlc, Crc32Iscsi},
    Digest,
};
use sha2::{Digest as _, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsumAlgorium {
    Crc32(u32),
    Crc32c(u32),
    Xxh64(u64),
    Sha256([u8; 32]),
    Exfat(u32),
    Fletcher64(u64),
}

impl std::fmt::Display for CsumAlgorium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CsumAlgorium::Crc32(checksum) => write!(f, "crc32:{checksum:08x}"),
            CsumAlgorium::Crc32c(checksum) => write!(f, "crc32c:{checksum:08x}"),
            CsumAlgorium::Xxh64(checksum) => write!(f, "xxh64:{checksum:016x}"),
            CsumAlgorium::Sha256(checksum) => {
                write!(f, "sha256:")?;
                for byte in checksum {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            CsumAlgorium::Exfat(checksum) => write!(f, "exfat:{checksum:08x}"),
            CsumAlgorium::Fletcher64(checksum) => write!(f, "fletcher64:{checksum:016x}"),
        }
    }
}

/// CRC32C (Castagnoli) over the concatenation of `parts`.
///
/// Taking the input in pieces lets callers splice zeroes over an embedded
/// checksum field without copying the superblock.
pub fn crc32c(parts: &[&[u8]]) -> u32 {
    let mut digest = Digest::new(Crc32Iscsi);
    for part in parts {
        digest.update(part);
    }

    return digest.finalize() as u32;
}

/// CRC32 (ISO-HDLC, the zlib/ethernet polynomial) over the concatenation of `parts`.
pub fn crc32(parts: &[&[u8]]) -> u32 {
    let mut digest = Digest::new(Crc32IsoHdlc);
    for part in parts {
        digest.update(part);
    }

    return digest.finalize() as u32;
}

pub fn xxh64(data: &[u8], seed: u64) -> u64 {
    return xxhash_rust::xxh64::xxh64(data, seed);
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    return Sha256::digest(data).into();
}

pub fn fletcher64(buf: &[u8]) -> u64 {
    let mut lo32: u64 = 0;
    let mut hi32: u64 = 0;

    for word in buf.chunks_exact(4) {
        let word = u64::from(u32::from_le_bytes([word[0], word[1], word[2], word[3]]));
        lo32 = (lo32 + word) % 0xFFFFFFFF;
        hi32 = (hi32 + lo32) % 0xFFFFFFFF;
    }

    let csum_lo = 0xFFFFFFFF - ((lo32 + hi32) % 0xFFFFFFFF);
    let csum_hi = 0xFFFFFFFF - ((lo32 + csum_lo) % 0xFFFFFFFF);

    return (csum_hi << 32) | csum_lo;
}

/// exFAT boot region checksum over the first 11 sectors.
///
/// Bytes 106, 107 (volume flags) and 112 (percent in use) are excluded.
pub fn exfat_boot_checksum(sectors: &[u8], sector_size: usize) -> u32 {
    let n_bytes = sector_size.saturating_mul(11);

    let mut checksum: u32 = 0;

    for (i, byte) in sectors.iter().enumerate().take(n_bytes) {
        if i == 106 || i == 107 || i == 112 {
            continue;
        }

        checksum = checksum.rotate_right(1).wrapping_add(u32::from(*byte));
    }

    return checksum;
}
