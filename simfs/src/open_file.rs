//! # 打开文件子系统
//!
//! 全局打开文件表：每个被打开的描述符至多一项，带引用计数，
//! 首次打开时快照描述符元数据。
//! 进程控制块（PCB）：进程的当前工作目录与有界句柄表，
//! 首次打开时惰性建立，打开数归零即销毁。

use enumflags2::BitFlags;

use crate::layout::{BlockIx, Descriptor, DescriptorKind, Right};
use crate::{MAX_OPEN_FILES, MAX_OPEN_FILES_PER_PROCESS};

/// 全局打开文件表项
#[derive(Debug, Clone)]
pub struct OpenEntry {
    pub ix: BlockIx,
    pub refs: u16,
    // 首次打开时自描述符快照的元数据
    pub kind: DescriptorKind,
    pub size: u32,
    pub rights: BitFlags<Right>,
    pub owner: u32,
    pub created: u64,
    pub accessed: u64,
    pub modified: u64,
}

impl OpenEntry {
    pub fn snapshot(ix: BlockIx, desc: &Descriptor) -> Self {
        Self {
            ix,
            refs: 1,
            kind: desc.kind,
            size: desc.size,
            rights: desc.rights,
            owner: desc.owner,
            created: desc.created,
            accessed: desc.accessed,
            modified: desc.modified,
        }
    }
}

/// 有界的全局打开文件表
pub struct OpenTable {
    entries: Vec<Option<OpenEntry>>,
}

impl OpenTable {
    pub fn new() -> Self {
        Self {
            entries: (0..MAX_OPEN_FILES).map(|_| None).collect(),
        }
    }

    /// 同一描述符至多一项
    pub fn find(&self, ix: BlockIx) -> Option<usize> {
        self.entries
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|entry| entry.ix == ix))
    }

    pub fn get(&self, slot: usize) -> Option<&OpenEntry> {
        self.entries.get(slot)?.as_ref()
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut OpenEntry> {
        self.entries.get_mut(slot)?.as_mut()
    }

    /// 放入新项，表满时失败
    pub fn put(&mut self, entry: OpenEntry) -> Option<usize> {
        let slot = self.entries.iter().position(Option::is_none)?;
        self.entries[slot] = Some(entry);
        Some(slot)
    }

    /// 引用计数减一，归零即移除表项
    pub fn release(&mut self, slot: usize) {
        if let Some(entry) = self.get_mut(slot) {
            entry.refs -= 1;
            if entry.refs == 0 {
                self.entries[slot] = None;
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|slot| *slot = None);
    }
}

/// 进程本地的打开文件项：进程内权限快照与指向全局表的引用
#[derive(Debug, Clone, Copy)]
pub struct LocalOpen {
    pub rights: BitFlags<Right>,
    /// 打开者的 uid，read/write 凭此做权限判定
    pub uid: u32,
    /// 全局打开文件表槽位
    pub global: usize,
}

/// 进程控制块。生命周期随在内存上下文，不持久化
pub struct Pcb {
    pub pid: u32,
    pub cwd: BlockIx,
    pub open_files: [Option<LocalOpen>; MAX_OPEN_FILES_PER_PROCESS],
}

impl Pcb {
    pub fn new(pid: u32, cwd: BlockIx) -> Self {
        Self {
            pid,
            cwd,
            open_files: [None; MAX_OPEN_FILES_PER_PROCESS],
        }
    }

    pub fn open_count(&self) -> usize {
        self.open_files.iter().flatten().count()
    }

    pub fn free_slot(&self) -> Option<usize> {
        self.open_files.iter().position(Option::is_none)
    }

    /// 该进程是否已持有指向此全局表项的句柄
    pub fn slot_of_global(&self, global: usize) -> Option<usize> {
        self.open_files
            .iter()
            .position(|slot| slot.is_some_and(|local| local.global == global))
    }
}

/// 打开文件句柄：进程号加句柄表槽位。
/// 携带 pid 使 close/read/write 无须再提供调用者上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle {
    pub pid: u32,
    pub slot: usize,
}
