//! # 卷层
//!
//! 持久化的镜像：超级块 | 位图 | 块数组，
//! 挂载时整体载入内存，卸载时整体写回，一个连续字节流。

use enumflags2::BitFlags;

use crate::error::Error;
use crate::layout::{
    Bitmap, Block, BlockIx, Descriptor, DescriptorKind, IndexBlock, SuperBlock,
};
use crate::{BITMAP_BYTES, BLOCK_COUNT, BLOCK_SIZE};

/// 卷镜像的总字节数
pub const VOLUME_BYTES: usize = BLOCK_SIZE + BITMAP_BYTES + BLOCK_COUNT * BLOCK_SIZE;

/// 根文件夹描述符所在块
const ROOT_IX: BlockIx = BlockIx::new(0);
/// 根文件夹创建时预分配的索引块
const ROOT_HEAD_IX: BlockIx = BlockIx::new(1);

pub struct Volume {
    superblock: SuperBlock,
    /// 持久化位图；挂载后与引擎的工作位图成对更新
    bitmap: Bitmap,
    blocks: Box<[Block]>,
}

impl Volume {
    /// mkfs：写超级块，在固定块号建立空的根文件夹及其首个索引块
    pub fn format(now: u64) -> Self {
        let mut volume = Self {
            superblock: SuperBlock::init(ROOT_IX),
            bitmap: Bitmap::default(),
            blocks: vec![Block::Free; BLOCK_COUNT].into_boxed_slice(),
        };

        volume.blocks[ROOT_IX.raw() as usize] = Block::Descriptor(Descriptor {
            kind: DescriptorKind::Folder,
            name: "/".to_owned(),
            created: now,
            accessed: now,
            modified: now,
            rights: BitFlags::all(),
            owner: 0,
            size: 0,
            head: ROOT_HEAD_IX,
        });
        volume.blocks[ROOT_HEAD_IX.raw() as usize] = Block::Index(IndexBlock::empty());
        volume.bitmap.set(ROOT_IX);
        volume.bitmap.set(ROOT_HEAD_IX);

        volume
    }

    #[inline]
    pub fn root_ix(&self) -> BlockIx {
        self.superblock.root_ix
    }

    #[inline]
    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    pub fn block(&self, ix: BlockIx) -> Result<&Block, Error> {
        Ok(&self.blocks[ix.validate()?.raw() as usize])
    }

    pub fn block_mut(&mut self, ix: BlockIx) -> Result<&mut Block, Error> {
        Ok(&mut self.blocks[ix.validate()?.raw() as usize])
    }

    pub fn descriptor(&self, ix: BlockIx) -> Result<&Descriptor, Error> {
        match self.block(ix)? {
            Block::Descriptor(desc) => Ok(desc),
            _ => Err(Error::Read),
        }
    }

    pub fn descriptor_mut(&mut self, ix: BlockIx) -> Result<&mut Descriptor, Error> {
        match self.block_mut(ix)? {
            Block::Descriptor(desc) => Ok(desc),
            _ => Err(Error::Read),
        }
    }

    pub fn index_block(&self, ix: BlockIx) -> Result<&IndexBlock, Error> {
        match self.block(ix)? {
            Block::Index(index) => Ok(index),
            _ => Err(Error::Read),
        }
    }

    pub fn index_block_mut(&mut self, ix: BlockIx) -> Result<&mut IndexBlock, Error> {
        match self.block_mut(ix)? {
            Block::Index(index) => Ok(index),
            _ => Err(Error::Read),
        }
    }

    /// 在工作位图中扫描空闲块，同步置位两份位图。
    /// 两份位图在同一临界区内成对变化，保证不发散。
    pub fn alloc_block(&mut self, work: &mut Bitmap) -> Result<BlockIx, Error> {
        let ix = work.find_free().ok_or(Error::Alloc)?;
        work.set(ix);
        self.bitmap.set(ix);
        Ok(ix)
    }

    /// 释放块：同步清位两份位图，块内容复位为空闲
    pub fn free_block(&mut self, work: &mut Bitmap, ix: BlockIx) -> Result<(), Error> {
        let ix = ix.validate()?;
        // 位图与链上可达性不一致说明卷已损坏
        if !work.is_set(ix) {
            log::error!("freeing unallocated block {ix:?}");
            return Err(Error::Read);
        }

        work.clear(ix);
        self.bitmap.clear(ix);
        self.blocks[ix.raw() as usize] = Block::Free;
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; VOLUME_BYTES];

        self.superblock.encode(&mut out[..BLOCK_SIZE]);
        out[BLOCK_SIZE..BLOCK_SIZE + BITMAP_BYTES].copy_from_slice(self.bitmap.as_bytes());

        let blocks_off = BLOCK_SIZE + BITMAP_BYTES;
        for (block_ix, block) in self.blocks.iter().enumerate() {
            let off = blocks_off + block_ix * BLOCK_SIZE;
            block.encode(&mut out[off..off + BLOCK_SIZE]);
        }

        out
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, Error> {
        if raw.len() != VOLUME_BYTES {
            log::error!("volume image is {} bytes, expected {VOLUME_BYTES}", raw.len());
            return Err(Error::Read);
        }

        let superblock = SuperBlock::decode(&raw[..BLOCK_SIZE]);
        if !superblock.is_valid() {
            log::error!("superblock magic or geometry mismatch");
            return Err(Error::Read);
        }
        superblock.root_ix.validate()?;

        let bitmap = Bitmap::from_bytes(&raw[BLOCK_SIZE..BLOCK_SIZE + BITMAP_BYTES]);

        let blocks_off = BLOCK_SIZE + BITMAP_BYTES;
        let blocks = (0..BLOCK_COUNT)
            .map(|block_ix| {
                let off = blocks_off + block_ix * BLOCK_SIZE;
                Block::decode(&raw[off..off + BLOCK_SIZE])
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_boxed_slice();

        Ok(Self {
            superblock,
            bitmap,
            blocks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_marks_root_blocks() {
        let volume = Volume::format(0);
        assert!(volume.bitmap.is_set(ROOT_IX));
        assert!(volume.bitmap.is_set(ROOT_HEAD_IX));
        assert_eq!(volume.bitmap.count_free(), BLOCK_COUNT - 2);

        let root = volume.descriptor(ROOT_IX).unwrap();
        assert_eq!(root.name, "/");
        assert_eq!(root.kind, DescriptorKind::Folder);
        assert_eq!(root.size, 0);
        assert_eq!(root.head, ROOT_HEAD_IX);
    }

    #[test]
    fn image_round_trip() {
        let volume = Volume::format(7);
        let raw = volume.to_bytes();
        assert_eq!(raw.len(), VOLUME_BYTES);

        let back = Volume::from_bytes(&raw).unwrap();
        assert_eq!(back.root_ix(), ROOT_IX);
        assert_eq!(back.descriptor(ROOT_IX).unwrap().created, 7);
        assert!(back.bitmap.is_set(ROOT_HEAD_IX));
    }

    #[test]
    fn truncated_image_fails_to_load() {
        let raw = Volume::format(0).to_bytes();
        assert!(matches!(
            Volume::from_bytes(&raw[..raw.len() - 1]),
            Err(Error::Read)
        ));
    }

    #[test]
    fn alloc_updates_both_bitmaps() {
        let mut volume = Volume::format(0);
        let mut work = volume.bitmap().clone();

        let ix = volume.alloc_block(&mut work).unwrap();
        assert_eq!(ix, BlockIx::new(2));
        assert!(work.is_set(ix));
        assert!(volume.bitmap.is_set(ix));

        volume.free_block(&mut work, ix).unwrap();
        assert!(!work.is_set(ix));
        assert!(!volume.bitmap.is_set(ix));
    }

    #[test]
    fn freeing_unallocated_block_reports_corruption() {
        let mut volume = Volume::format(0);
        let mut work = volume.bitmap().clone();

        // 位图未置位却被要求释放，属于结构损坏而非程序缺陷
        assert!(matches!(
            volume.free_block(&mut work, BlockIx::new(3)),
            Err(Error::Read)
        ));
    }
}
