use crate::{
    extract::BlockSizeRule,
    registry::{BlockType, FormatDescriptor, SignatureRule, UsageType},
};

const CRAMFS_MAGIC_LE: [u8; 4] = [0x45, 0x3d, 0xcd, 0x28];
const CRAMFS_MAGIC_BE: [u8; 4] = [0x28, 0xcd, 0x3d, 0x45];

// Images may be prefixed by a 512 byte padding block.
pub const CRAMFS_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::Cramfs,
    usage: UsageType::Filesystem,
    rules: &[
        SignatureRule::new(&CRAMFS_MAGIC_LE, 0, None),
        SignatureRule::new(&CRAMFS_MAGIC_BE, 0, None),
        SignatureRule::new(&CRAMFS_MAGIC_LE, 0x200, None),
        SignatureRule::new(&CRAMFS_MAGIC_BE, 0x200, None),
    ],
    block_size: BlockSizeRule::Unencoded,
};

pub const ROMFS_ID_INFO: FormatDescriptor = FormatDescriptor {
    btype: BlockType::Romfs,
    usage: UsageType::Filesystem,
    rules: &[SignatureRule::new(b"-rom1fs-", 0, None)],
    block_size: BlockSizeRule::Fixed(1024),
};
