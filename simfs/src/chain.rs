//! # 索引链层
//!
//! 文件内容与文件夹子项统一表示为索引块链表：
//! 内容引用按 INDEX_FANOUT 个一组装入索引块，
//! 每块最后一个槽位链接下一个索引块，链尾为无效哨兵。
//!
//! 链表形式令分配与遍历都是 O(size)，随机访问同为 O(size)；
//! 本系统只做整读整写与整卷列举，不做 seek。

use crate::error::Error;
use crate::layout::{Bitmap, Block, BlockIx, INDEX_FANOUT, IndexBlock};
use crate::volume::Volume;

impl Volume {
    /// 向链尾追加一个内容引用。
    ///
    /// `size` 为追加前的引用数；当 `size` 恰为 INDEX_FANOUT 的倍数时
    /// 需要新的索引块：空链以其为链头（文件夹创建时预分配的空链头
    /// 直接复用），否则从当前链尾链接过去。
    ///
    /// 返回（可能更新过的）链头。
    pub fn chain_append(
        &mut self,
        work: &mut Bitmap,
        head: BlockIx,
        size: u32,
        new_ref: BlockIx,
    ) -> Result<BlockIx, Error> {
        let size = size as usize;
        let slot = size % INDEX_FANOUT;

        let (head, tail) = if slot == 0 {
            if size == 0 && head.is_valid() {
                // 预分配的空链头
                self.index_block(head)?;
                (head, head)
            } else {
                let new_tail = self.alloc_block(work)?;
                *self.block_mut(new_tail)? = Block::Index(IndexBlock::empty());

                if head.is_valid() {
                    let old_tail = self.chain_walk(head, size / INDEX_FANOUT - 1)?;
                    self.index_block_mut(old_tail)?.set_next(new_tail);
                    (head, new_tail)
                } else {
                    (new_tail, new_tail)
                }
            }
        } else {
            (head, self.chain_walk(head, size / INDEX_FANOUT)?)
        };

        self.index_block_mut(tail)?.slots[slot] = new_ref;
        Ok(head)
    }

    /// 按既定顺序收集链上前 `count` 个内容引用。
    /// 这是文件夹列举与文件内容拼接共用的规范顺序。
    ///
    /// 链比 `count` 所要求的短，或任何引用越界，都视为结构损坏。
    pub fn chain_refs(&self, head: BlockIx, count: u32) -> Result<Vec<BlockIx>, Error> {
        let count = count as usize;
        // 引用数超过卷内块数的描述符必然损坏，预留空间前先拒绝
        if count > crate::BLOCK_COUNT {
            log::error!(
                "descriptor claims {count} refs, volume only has {} blocks",
                crate::BLOCK_COUNT
            );
            return Err(Error::Read);
        }

        let mut refs = Vec::with_capacity(count);
        let mut remaining = count;
        let mut cursor = head;

        while remaining > 0 {
            if !cursor.is_valid() {
                log::error!("extent chain ends {remaining} refs early");
                return Err(Error::Read);
            }
            let index = self.index_block(cursor)?;

            let take = remaining.min(INDEX_FANOUT);
            for slot in 0..take {
                refs.push(index.slots[slot].validate()?);
            }

            remaining -= take;
            cursor = index.next();
        }

        Ok(refs)
    }

    /// 释放整条链：先完整收集链上的索引块与内容引用，
    /// 全部收集成功后才开始释放，避免半途而废留下双重引用。
    ///
    /// 链尾之后预分配的空索引块（空文件夹的链头）一并回收。
    pub fn chain_free(
        &mut self,
        work: &mut Bitmap,
        head: BlockIx,
        count: u32,
    ) -> Result<(), Error> {
        let refs = self.chain_refs(head, count)?;
        self.chain_free_index(work, head)?;
        for ix in refs {
            self.free_block(work, ix)?;
        }
        Ok(())
    }

    /// 仅释放链上的索引块，内容引用保留。
    /// 父目录摘除子项后重建链时使用
    pub(crate) fn chain_free_index(
        &mut self,
        work: &mut Bitmap,
        head: BlockIx,
    ) -> Result<(), Error> {
        let mut index_blocks = Vec::new();
        let mut cursor = head;
        while cursor.is_valid() {
            // 链上的环意味着卷已损坏
            if index_blocks.len() > crate::BLOCK_COUNT {
                log::error!("extent chain contains a cycle");
                return Err(Error::Read);
            }
            index_blocks.push(cursor);
            cursor = self.index_block(cursor)?.next();
        }

        for ix in index_blocks {
            self.free_block(work, ix)?;
        }
        Ok(())
    }

    /// 自链头起跳过 `hops` 个索引块
    fn chain_walk(&self, head: BlockIx, hops: usize) -> Result<BlockIx, Error> {
        let mut cursor = head.validate()?;
        for _ in 0..hops {
            cursor = self.index_block(cursor)?.next().validate()?;
        }
        self.index_block(cursor)?;
        Ok(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DataBlock;

    fn fresh() -> (Volume, Bitmap) {
        let volume = Volume::format(0);
        let work = volume.bitmap().clone();
        (volume, work)
    }

    #[test]
    fn append_and_read_back_across_index_boundary() {
        let (mut volume, mut work) = fresh();

        // INDEX_FANOUT + 4 个引用需要两个索引块
        let count = INDEX_FANOUT as u32 + 4;
        let mut head = BlockIx::INVALID;
        let mut refs = Vec::new();
        for appended in 0..count {
            let data_ix = volume.alloc_block(&mut work).unwrap();
            *volume.block_mut(data_ix).unwrap() = Block::Data(DataBlock::default());
            head = volume
                .chain_append(&mut work, head, appended, data_ix)
                .unwrap();
            refs.push(data_ix);
        }

        assert_eq!(volume.chain_refs(head, count).unwrap(), refs);
    }

    #[test]
    fn preallocated_head_is_reused_for_first_append() {
        let (mut volume, mut work) = fresh();

        let head = volume.alloc_block(&mut work).unwrap();
        *volume.block_mut(head).unwrap() = Block::Index(IndexBlock::empty());
        let free_before = work.count_free();

        let data_ix = volume.alloc_block(&mut work).unwrap();
        *volume.block_mut(data_ix).unwrap() = Block::Data(DataBlock::default());
        let new_head = volume.chain_append(&mut work, head, 0, data_ix).unwrap();

        // 链头不变，除数据块外没有额外分配
        assert_eq!(new_head, head);
        assert_eq!(work.count_free(), free_before - 1);
    }

    #[test]
    fn free_reclaims_every_block() {
        let (mut volume, mut work) = fresh();
        let free_before = work.count_free();

        let count = 2 * INDEX_FANOUT as u32 + 1;
        let mut head = BlockIx::INVALID;
        for appended in 0..count {
            let data_ix = volume.alloc_block(&mut work).unwrap();
            *volume.block_mut(data_ix).unwrap() = Block::Data(DataBlock::default());
            head = volume
                .chain_append(&mut work, head, appended, data_ix)
                .unwrap();
        }
        assert!(work.count_free() < free_before);

        volume.chain_free(&mut work, head, count).unwrap();
        assert_eq!(work.count_free(), free_before);
        assert_eq!(volume.bitmap().count_free(), free_before);
    }

    #[test]
    fn absurd_ref_count_is_rejected_before_reserving() {
        let (mut volume, mut work) = fresh();

        let head = volume.alloc_block(&mut work).unwrap();
        *volume.block_mut(head).unwrap() = Block::Index(IndexBlock::empty());

        // 损坏的描述符可以声称任意大小，读取端在分配内存前把关
        assert!(matches!(
            volume.chain_refs(head, u32::MAX),
            Err(Error::Read)
        ));
    }

    #[test]
    fn short_chain_is_detected() {
        let (mut volume, mut work) = fresh();

        let head = volume.alloc_block(&mut work).unwrap();
        *volume.block_mut(head).unwrap() = Block::Index(IndexBlock::empty());

        // 声称的引用数超过链的实际长度
        assert!(matches!(
            volume.chain_refs(head, INDEX_FANOUT as u32 + 1),
            Err(Error::Read)
        ));
    }
}
