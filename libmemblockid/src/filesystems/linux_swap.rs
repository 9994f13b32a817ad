use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::{
    extract::{BlockSizeRule, ExtractError},
    filesystems::FsError,
    reader::{Endianness, ProbeBuffer, ReadError},
    registry::{BlockType, FormatDescriptor, SignatureRule, UsageType},
};

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("Unable to read swap header: {0}")]
    ReadError(#[from] ReadError),
    #[error("Filesystem has TuxOnIce magic signature")]
    ProbablyTuxOnIce,
    #[error("Invalid swap header version: {0:#x}")]
    InvalidVersion(u32),
    #[error("Swap header has no pages")]
    EmptyPageCount,
}

const TOI_MAGIC_STRING: [u8; 8] = *b"\xed\xc3\x02\xe9\x98\x56\xe5\x0c";
const SWAP_V0_MAGIC: &[u8] = b"SWAP-SPACE";
const SWAP_V1_MAGIC: &[u8] = b"SWAPSPACE2";

/// Page-end signatures occupy the last 10 bytes of the first page.
const SWAP_SIGNATURE_LEN: u64 = 10;
const SWAP_HEADER_OFFSET: u64 = 1024;

pub const LINUX_SWAP_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::LinuxSwap,
    usage: UsageType::Other("swap"),
    rules: &[
        SignatureRule::new(SWAP_V1_MAGIC, 0xff6, Some(validate_swap)),
        SignatureRule::new(SWAP_V1_MAGIC, 0x1ff6, Some(validate_swap)),
        SignatureRule::new(SWAP_V1_MAGIC, 0x3ff6, Some(validate_swap)),
        SignatureRule::new(SWAP_V1_MAGIC, 0x7ff6, Some(validate_swap)),
        SignatureRule::new(SWAP_V1_MAGIC, 0xfff6, Some(validate_swap)),
        SignatureRule::new(SWAP_V0_MAGIC, 0xff6, Some(validate_swap)),
        SignatureRule::new(SWAP_V0_MAGIC, 0x1ff6, Some(validate_swap)),
        SignatureRule::new(SWAP_V0_MAGIC, 0x3ff6, Some(validate_swap)),
        SignatureRule::new(SWAP_V0_MAGIC, 0x7ff6, Some(validate_swap)),
        SignatureRule::new(SWAP_V0_MAGIC, 0xfff6, Some(validate_swap)),
    ],
    block_size: BlockSizeRule::Computed(swap_page_size),
};

#[rustfmt::skip]
pub const SWSUSPEND_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::SwapSuspend,
    usage: UsageType::Other("swsuspend"),
    rules: &[
        SignatureRule::new(&TOI_MAGIC_STRING, 0, None),
        SignatureRule::new(b"S1SUSPEND", 0xff6, None),
        SignatureRule::new(b"S2SUSPEND", 0xff6, None),
        SignatureRule::new(b"ULSUSPEND", 0xff6, None),
        SignatureRule::new(b"LINHIB0001", 0xff6, None),
        SignatureRule::new(b"S1SUSPEND", 0x1ff6, None),
        SignatureRule::new(b"S2SUSPEND", 0x1ff6, None),
        SignatureRule::new(b"ULSUSPEND", 0x1ff6, None),
        SignatureRule::new(b"LINHIB0001", 0x1ff6, None),
        SignatureRule::new(b"S1SUSPEND", 0x3ff6, None),
        SignatureRule::new(b"S2SUSPEND", 0x3ff6, None),
        SignatureRule::new(b"ULSUSPEND", 0x3ff6, None),
        SignatureRule::new(b"LINHIB0001", 0x3ff6, None),
        SignatureRule::new(b"S1SUSPEND", 0x7ff6, None),
        SignatureRule::new(b"S2SUSPEND", 0x7ff6, None),
        SignatureRule::new(b"ULSUSPEND", 0x7ff6, None),
        SignatureRule::new(b"LINHIB0001", 0x7ff6, None),
        SignatureRule::new(b"S1SUSPEND", 0xfff6, None),
        SignatureRule::new(b"S2SUSPEND", 0xfff6, None),
        SignatureRule::new(b"ULSUSPEND", 0xfff6, None),
        SignatureRule::new(b"LINHIB0001", 0xfff6, None),
    ],
    block_size: BlockSizeRule::Computed(swap_page_size),
};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct SwapHeaderV1 {
    pub version: [u8; 4],
    pub lastpage: [u8; 4],
    pub nr_badpages: [u8; 4],
    pub uuid: [u8; 16],
    pub volume: [u8; 16],
}

impl SwapHeaderV1 {
    /// Byte order the header was written in, inferred from its version field.
    pub fn endianness(&self) -> Option<Endianness> {
        if u32::from_le_bytes(self.version) == 1 {
            return Some(Endianness::Little);
        } else if u32::from_be_bytes(self.version) == 1 {
            return Some(Endianness::Big);
        } else {
            return None;
        }
    }

    pub fn lastpage(&self, endianness: Endianness) -> u32 {
        match endianness {
            Endianness::Little => return u32::from_le_bytes(self.lastpage),
            Endianness::Big => return u32::from_be_bytes(self.lastpage),
        }
    }
}

fn is_tuxonice(buf: &ProbeBuffer<'_>) -> bool {
    return buf
        .read_exact_at::<8>(0)
        .is_ok_and(|magic| magic == TOI_MAGIC_STRING);
}

pub fn probe_swap(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), SwapError> {
    if is_tuxonice(buf) {
        return Err(SwapError::ProbablyTuxOnIce);
    }

    if rule.magic == SWAP_V1_MAGIC {
        let header: SwapHeaderV1 = buf.map_at(SWAP_HEADER_OFFSET)?;

        let Some(endianness) = header.endianness() else {
            return Err(SwapError::InvalidVersion(u32::from_le_bytes(header.version)));
        };

        if header.lastpage(endianness) == 0 {
            return Err(SwapError::EmptyPageCount);
        }
    }

    return Ok(());
}

fn validate_swap(buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<(), FsError> {
    return Ok(probe_swap(buf, rule)?);
}

fn swap_page_size(_buf: &ProbeBuffer<'_>, rule: &SignatureRule) -> Result<u64, ExtractError> {
    // TuxOnIce images carry their signature at offset 0, which says nothing about page size
    if rule.b_offset < SWAP_HEADER_OFFSET {
        return Err(ExtractError::Unencoded);
    }

    return Ok(rule.b_offset + SWAP_SIGNATURE_LEN);
}
