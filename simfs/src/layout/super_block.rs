use crate::MAGIC;
use crate::layout::BlockIx;
use crate::{BLOCK_COUNT, BLOCK_SIZE};

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 记录根文件夹描述符的块号与卷的几何参数
#[derive(Debug, Clone)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    pub root_ix: BlockIx,
    pub block_count: u32,
    pub block_size: u32,
}

impl SuperBlock {
    /// 超级块编码后的有效字节数，其余补零至一整块
    pub const ENCODED_LEN: usize = 14;

    #[inline]
    pub fn init(root_ix: BlockIx) -> Self {
        Self {
            magic: MAGIC,
            root_ix,
            block_count: BLOCK_COUNT as u32,
            block_size: BLOCK_SIZE as u32,
        }
    }

    /// 仅当魔数与几何参数都匹配本引擎的编译期常量时，卷才可加载
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
            && self.block_count == BLOCK_COUNT as u32
            && self.block_size == BLOCK_SIZE as u32
    }

    pub fn encode(&self, out: &mut [u8]) {
        out[..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..6].copy_from_slice(&self.root_ix.raw().to_le_bytes());
        out[6..10].copy_from_slice(&self.block_count.to_le_bytes());
        out[10..14].copy_from_slice(&self.block_size.to_le_bytes());
    }

    pub fn decode(raw: &[u8]) -> Self {
        Self {
            magic: u32::from_le_bytes(raw[..4].try_into().unwrap()),
            root_ix: BlockIx::new(u16::from_le_bytes(raw[4..6].try_into().unwrap())),
            block_count: u32::from_le_bytes(raw[6..10].try_into().unwrap()),
            block_size: u32::from_le_bytes(raw[10..14].try_into().unwrap()),
        }
    }
}
