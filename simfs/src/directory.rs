//! # 内存目录层
//!
//! 名字到描述符块号的哈希目录。卷是名字的唯一可信来源，
//! 目录只是挂载时全量重建的派生缓存，从不持久化。

use crate::DIRECTORY_SIZE;
use crate::error::Error;
use crate::layout::{BlockIx, DescriptorKind};
use crate::volume::Volume;

pub struct Directory {
    /// 冲突链按最近插入在前排列
    buckets: Box<[Vec<BlockIx>]>,
}

impl Directory {
    pub fn new() -> Self {
        Self {
            buckets: vec![Vec::new(); DIRECTORY_SIZE].into_boxed_slice(),
        }
    }

    /// djb2 变体（xor），截断到桶数
    fn bucket_of(name: &str) -> usize {
        let mut hash: u64 = 5381;
        for byte in name.bytes() {
            hash = (hash.wrapping_shl(5)).wrapping_add(hash) ^ u64::from(byte);
        }
        (hash % DIRECTORY_SIZE as u64) as usize
    }

    /// 头插；允许重名共存，真正的唯一性由调用者先以 [`lookup`] 预查
    ///
    /// [`lookup`]: Directory::lookup
    pub fn insert(&mut self, name: &str, ix: BlockIx) {
        self.buckets[Self::bucket_of(name)].insert(0, ix);
    }

    /// 沿冲突链逐项取出描述符比较名字，哈希冲突会让不同名字同桶。
    /// 首个名字完全相符者胜出。
    pub fn lookup(&self, volume: &Volume, name: &str) -> Option<BlockIx> {
        self.buckets[Self::bucket_of(name)]
            .iter()
            .copied()
            .find(|&ix| {
                volume
                    .descriptor(ix)
                    .is_ok_and(|desc| desc.name == name)
            })
    }

    /// 摘除该名字桶内指定块号的首个表项
    pub fn remove(&mut self, name: &str, ix: BlockIx) {
        let bucket = &mut self.buckets[Self::bucket_of(name)];
        if let Some(pos) = bucket.iter().position(|&entry| entry == ix) {
            bucket.remove(pos);
        }
    }

    pub fn clear(&mut self) {
        self.buckets.iter_mut().for_each(Vec::clear);
    }

    /// 清空后从根出发深度优先重建，逐个登记文件夹与文件描述符
    pub fn rebuild(&mut self, volume: &Volume) -> Result<(), Error> {
        self.clear();
        let mut visited = 0usize;
        self.walk(volume, volume.root_ix(), &mut visited)
    }

    fn walk(&mut self, volume: &Volume, ix: BlockIx, visited: &mut usize) -> Result<(), Error> {
        *visited += 1;
        if *visited > crate::BLOCK_COUNT {
            log::error!("folder tree contains a cycle");
            return Err(Error::Read);
        }

        let desc = volume.descriptor(ix)?;
        self.insert(&desc.name, ix);

        if desc.kind == DescriptorKind::File {
            return Ok(());
        }
        for child in volume.chain_refs(desc.head, desc.size)? {
            self.walk(volume, child, visited)?;
        }
        Ok(())
    }

    /// 所有冲突链的名字→块号映射快照，仅测试用
    #[cfg(test)]
    pub fn entries(&self, volume: &Volume) -> Vec<(String, BlockIx)> {
        let mut all: Vec<(String, BlockIx)> = self
            .buckets
            .iter()
            .flatten()
            .filter_map(|&ix| {
                volume
                    .descriptor(ix)
                    .ok()
                    .map(|desc| (desc.name.clone(), ix))
            })
            .collect();
        all.sort();
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_alone_after_rebuild_of_fresh_volume() {
        let volume = Volume::format(0);
        let mut dir = Directory::new();
        dir.rebuild(&volume).unwrap();

        assert_eq!(dir.lookup(&volume, "/"), Some(volume.root_ix()));
        assert_eq!(dir.lookup(&volume, "a.txt"), None);
    }

    #[test]
    fn remove_only_touches_the_named_entry() {
        let volume = Volume::format(0);
        let mut dir = Directory::new();
        dir.insert("/", volume.root_ix());
        dir.remove("/", BlockIx::new(99));
        assert_eq!(dir.lookup(&volume, "/"), Some(volume.root_ix()));

        dir.remove("/", volume.root_ix());
        assert_eq!(dir.lookup(&volume, "/"), None);
    }
}
