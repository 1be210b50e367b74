//! 块是分配的原子单位，按内容分四种解释：
//! 文件夹描述符、文件描述符、索引块、原始数据块。
//!
//! 索引块内除最后一个槽位外都引用内容块
//! （文件引用数据块，文件夹引用子项描述符块），
//! 最后一个槽位链接下一个索引块，链尾以无效哨兵结束。

use enumflags2::{BitFlags, bitflags};

use crate::error::Error;
use crate::{BLOCK_COUNT, BLOCK_SIZE, DATA_SIZE, INDEX_COUNT, NAME_SIZE};

/// 块号。卷内块以有界整数寻址，不经原生指针
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct BlockIx(u16);

impl BlockIx {
    /// 无效哨兵：空链头与空索引槽位
    pub const INVALID: Self = Self(u16::MAX);

    #[inline]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        (self.0 as usize) < BLOCK_COUNT
    }

    /// 校验块号落在卷内；越界引用即结构损坏
    #[inline]
    pub fn validate(self) -> Result<Self, Error> {
        if self.is_valid() { Ok(self) } else { Err(Error::Read) }
    }
}

/// 访问权限位，取 POSIX mode 的位置；本设计无独立的组检查
#[bitflags]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Right {
    UserRead = 0o400,
    UserWrite = 0o200,
    OtherRead = 0o004,
    OtherWrite = 0o002,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Folder,
    File,
}

/// 文件/文件夹描述符。
///
/// 文件：`size` 为字节数，`head` 指向首个索引块（空文件为无效哨兵）。
/// 文件夹：`size` 为子项数，`head` 创建时即指向一个空索引块。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub kind: DescriptorKind,
    pub name: String,
    pub created: u64,
    pub accessed: u64,
    pub modified: u64,
    pub rights: BitFlags<Right>,
    pub owner: u32,
    pub size: u32,
    pub head: BlockIx,
}

/// 索引块：槽位 0..INDEX_COUNT-1 引用内容块，
/// 槽位 INDEX_COUNT-1 链接下一个索引块
#[derive(Debug, Clone)]
pub struct IndexBlock {
    pub slots: [BlockIx; INDEX_COUNT],
}

/// 每个索引块可容纳的内容引用数
pub const INDEX_FANOUT: usize = INDEX_COUNT - 1;

impl IndexBlock {
    #[inline]
    pub fn empty() -> Self {
        Self {
            slots: [BlockIx::INVALID; INDEX_COUNT],
        }
    }

    #[inline]
    pub fn next(&self) -> BlockIx {
        self.slots[INDEX_COUNT - 1]
    }

    #[inline]
    pub fn set_next(&mut self, next: BlockIx) {
        self.slots[INDEX_COUNT - 1] = next;
    }
}

#[derive(Debug, Clone)]
pub struct DataBlock {
    pub bytes: [u8; DATA_SIZE],
}

impl Default for DataBlock {
    #[inline]
    fn default() -> Self {
        Self {
            bytes: [0; DATA_SIZE],
        }
    }
}

/// 卷内块的各种解释，首字节为类型标签
#[derive(Debug, Clone, Default)]
pub enum Block {
    #[default]
    Free,
    Descriptor(Descriptor),
    Index(IndexBlock),
    Data(DataBlock),
}

const TAG_FREE: u8 = 0;
const TAG_FOLDER: u8 = 1;
const TAG_FILE: u8 = 2;
const TAG_INDEX: u8 = 3;
const TAG_DATA: u8 = 4;

// 描述符各字段在块内的偏移
const NAME_OFF: usize = 1;
const CREATED_OFF: usize = NAME_OFF + NAME_SIZE;
const ACCESSED_OFF: usize = CREATED_OFF + 8;
const MODIFIED_OFF: usize = ACCESSED_OFF + 8;
const RIGHTS_OFF: usize = MODIFIED_OFF + 8;
const OWNER_OFF: usize = RIGHTS_OFF + 2;
const SIZE_OFF: usize = OWNER_OFF + 4;
const HEAD_OFF: usize = SIZE_OFF + 4;

const SLOTS_OFF: usize = 1;
const DATA_OFF: usize = 2;

impl Block {
    pub fn encode(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), BLOCK_SIZE);
        out.fill(0);

        match self {
            Self::Free => {}
            Self::Descriptor(desc) => {
                out[0] = match desc.kind {
                    DescriptorKind::Folder => TAG_FOLDER,
                    DescriptorKind::File => TAG_FILE,
                };
                out[NAME_OFF..NAME_OFF + desc.name.len()].copy_from_slice(desc.name.as_bytes());
                out[CREATED_OFF..CREATED_OFF + 8].copy_from_slice(&desc.created.to_le_bytes());
                out[ACCESSED_OFF..ACCESSED_OFF + 8].copy_from_slice(&desc.accessed.to_le_bytes());
                out[MODIFIED_OFF..MODIFIED_OFF + 8].copy_from_slice(&desc.modified.to_le_bytes());
                out[RIGHTS_OFF..RIGHTS_OFF + 2].copy_from_slice(&desc.rights.bits().to_le_bytes());
                out[OWNER_OFF..OWNER_OFF + 4].copy_from_slice(&desc.owner.to_le_bytes());
                out[SIZE_OFF..SIZE_OFF + 4].copy_from_slice(&desc.size.to_le_bytes());
                out[HEAD_OFF..HEAD_OFF + 2].copy_from_slice(&desc.head.raw().to_le_bytes());
            }
            Self::Index(index) => {
                out[0] = TAG_INDEX;
                for (slot_ix, slot) in index.slots.iter().enumerate() {
                    let off = SLOTS_OFF + slot_ix * 2;
                    out[off..off + 2].copy_from_slice(&slot.raw().to_le_bytes());
                }
            }
            Self::Data(data) => {
                out[0] = TAG_DATA;
                out[DATA_OFF..DATA_OFF + DATA_SIZE].copy_from_slice(&data.bytes);
            }
        }
    }

    pub fn decode(raw: &[u8]) -> Result<Self, Error> {
        debug_assert_eq!(raw.len(), BLOCK_SIZE);

        match raw[0] {
            TAG_FREE => Ok(Self::Free),
            tag @ (TAG_FOLDER | TAG_FILE) => {
                let name_field = &raw[NAME_OFF..NAME_OFF + NAME_SIZE];
                let name_len = name_field
                    .iter()
                    .position(|&byte| byte == 0)
                    .unwrap_or(NAME_SIZE);
                let name = core::str::from_utf8(&name_field[..name_len])
                    .map_err(|_| Error::Read)?
                    .to_owned();

                Ok(Self::Descriptor(Descriptor {
                    kind: if tag == TAG_FOLDER {
                        DescriptorKind::Folder
                    } else {
                        DescriptorKind::File
                    },
                    name,
                    created: read_u64(raw, CREATED_OFF),
                    accessed: read_u64(raw, ACCESSED_OFF),
                    modified: read_u64(raw, MODIFIED_OFF),
                    rights: BitFlags::from_bits_truncate(read_u16(raw, RIGHTS_OFF)),
                    owner: read_u32(raw, OWNER_OFF),
                    size: read_u32(raw, SIZE_OFF),
                    head: BlockIx::new(read_u16(raw, HEAD_OFF)),
                }))
            }
            TAG_INDEX => {
                let mut index = IndexBlock::empty();
                for (slot_ix, slot) in index.slots.iter_mut().enumerate() {
                    *slot = BlockIx::new(read_u16(raw, SLOTS_OFF + slot_ix * 2));
                }
                Ok(Self::Index(index))
            }
            TAG_DATA => {
                let mut data = DataBlock::default();
                data.bytes.copy_from_slice(&raw[DATA_OFF..DATA_OFF + DATA_SIZE]);
                Ok(Self::Data(data))
            }
            _ => Err(Error::Read),
        }
    }
}

#[inline]
fn read_u16(raw: &[u8], off: usize) -> u16 {
    u16::from_le_bytes(raw[off..off + 2].try_into().unwrap())
}

#[inline]
fn read_u32(raw: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(raw[off..off + 4].try_into().unwrap())
}

#[inline]
fn read_u64(raw: &[u8], off: usize) -> u64 {
    u64::from_le_bytes(raw[off..off + 8].try_into().unwrap())
}
