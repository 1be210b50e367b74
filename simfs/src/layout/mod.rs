//! # 磁盘数据结构层
//!
//! 卷的布局：
//! 超级块 | 位图 | 块数组

mod super_block;
pub use super_block::SuperBlock;

mod bitmap;
pub use bitmap::Bitmap;

mod block;
pub use block::{
    Block, BlockIx, DataBlock, Descriptor, DescriptorKind, INDEX_FANOUT, IndexBlock, Right,
};
