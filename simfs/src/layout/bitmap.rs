//! 位图区域，每块一位，1 表示已分配。
//!
//! 同一结构同时承担两份职责：卷内持久化的位图，
//! 以及挂载期间使用的内存工作位图；二者必须同步更新。

use crate::BITMAP_BYTES;
use crate::layout::BlockIx;

#[derive(Clone)]
pub struct Bitmap {
    bytes: [u8; BITMAP_BYTES],
}

impl Default for Bitmap {
    #[inline]
    fn default() -> Self {
        Self {
            bytes: [0; BITMAP_BYTES],
        }
    }
}

impl Bitmap {
    /// 按字节为主、高位在前的顺序扫描第一个 0 位。
    /// 扫描严格以位图长度为界，位图占满时返回空。
    pub fn find_free(&self) -> Option<BlockIx> {
        let (byte_ix, byte) = self
            .bytes
            .iter()
            .enumerate()
            .find(|&(_, &byte)| byte != 0xFF)?;

        // 字节内第一个 0 位，从最高位数起
        let bit_ix = byte.leading_ones() as usize;
        Some(BlockIx::new((byte_ix * 8 + bit_ix) as u16))
    }

    #[inline]
    pub fn is_set(&self, ix: BlockIx) -> bool {
        let (byte_ix, mask) = Self::locate(ix);
        self.bytes[byte_ix] & mask != 0
    }

    #[inline]
    pub fn set(&mut self, ix: BlockIx) {
        let (byte_ix, mask) = Self::locate(ix);
        self.bytes[byte_ix] |= mask;
    }

    #[inline]
    pub fn clear(&mut self, ix: BlockIx) {
        let (byte_ix, mask) = Self::locate(ix);
        self.bytes[byte_ix] &= !mask;
    }

    #[inline]
    pub fn flip(&mut self, ix: BlockIx) {
        let (byte_ix, mask) = Self::locate(ix);
        self.bytes[byte_ix] ^= mask;
    }

    /// 剩余空闲块数
    pub fn count_free(&self) -> usize {
        self.bytes
            .iter()
            .map(|byte| byte.count_zeros() as usize)
            .sum()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn from_bytes(raw: &[u8]) -> Self {
        let mut bytes = [0; BITMAP_BYTES];
        bytes.copy_from_slice(raw);
        Self { bytes }
    }

    #[inline]
    fn locate(ix: BlockIx) -> (usize, u8) {
        let ix = ix.raw() as usize;
        (ix / 8, 0x80 >> (ix % 8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BLOCK_COUNT;

    #[test]
    fn first_free_is_msb_major() {
        let mut bitmap = Bitmap::default();
        assert_eq!(bitmap.find_free(), Some(BlockIx::new(0)));

        bitmap.set(BlockIx::new(0));
        assert_eq!(bitmap.find_free(), Some(BlockIx::new(1)));

        // 填满第一个字节后，扫描越过它
        for ix in 1..8 {
            bitmap.set(BlockIx::new(ix));
        }
        assert_eq!(bitmap.find_free(), Some(BlockIx::new(8)));
    }

    #[test]
    fn set_clear_flip() {
        let mut bitmap = Bitmap::default();
        let ix = BlockIx::new(4000);

        bitmap.set(ix);
        assert!(bitmap.is_set(ix));
        bitmap.clear(ix);
        assert!(!bitmap.is_set(ix));
        bitmap.flip(ix);
        assert!(bitmap.is_set(ix));
    }

    #[test]
    fn exhausted_bitmap_finds_nothing() {
        let mut bitmap = Bitmap::default();
        for ix in 0..BLOCK_COUNT {
            bitmap.set(BlockIx::new(ix as u16));
        }
        assert_eq!(bitmap.count_free(), 0);
        assert_eq!(bitmap.find_free(), None);
    }

    #[test]
    fn count_free_tracks_allocation() {
        let mut bitmap = Bitmap::default();
        assert_eq!(bitmap.count_free(), BLOCK_COUNT);
        bitmap.set(BlockIx::new(17));
        bitmap.set(BlockIx::new(18));
        assert_eq!(bitmap.count_free(), BLOCK_COUNT - 2);
    }
}
