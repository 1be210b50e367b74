//! # 文件系统操作层
//!
//! [`SimFileSystem`] 显式持有卷、工作位图、内存目录与打开文件状态，
//! 所有操作经其引用进行，不触全局。
//! 挂载返回 `Arc<Mutex<SimFileSystem>>`：整个引擎是一个临界区，
//! 互斥锁界定了所有变更操作的串行化边界。

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use spin::Mutex;

use crate::context::CallerContext;
use crate::directory::Directory;
use crate::error::Error;
use crate::layout::{
    Bitmap, Block, BlockIx, DataBlock, Descriptor, DescriptorKind, INDEX_FANOUT, IndexBlock, Right,
};
use crate::open_file::{FileHandle, LocalOpen, OpenEntry, OpenTable, Pcb};
use crate::volume::Volume;
use crate::{DATA_SIZE, MAX_PROCESSES, NAME_SIZE};

pub struct SimFileSystem {
    volume: Volume,
    /// 工作位图：卷内持久化位图的内存副本，二者成对更新
    bitmap: Bitmap,
    directory: Directory,
    opens: OpenTable,
    pcbs: Vec<Pcb>,
}

impl SimFileSystem {
    /// 在内存中建立一个空卷（mkfs）
    pub fn new() -> Self {
        let volume = Volume::format(now());
        let bitmap = volume.bitmap().clone();
        let mut directory = Directory::new();
        directory
            .rebuild(&volume)
            .expect("freshly formatted volume is consistent");

        Self {
            volume,
            bitmap,
            directory,
            opens: OpenTable::new(),
            pcbs: Vec::new(),
        }
    }

    /// 建立空卷并持久化到 `path`
    pub fn create(path: &Path) -> Result<(), Error> {
        Self::new().save(path)
    }

    /// 从 `path` 加载卷，复制位图为工作位图，重建内存目录
    pub fn mount(path: &Path) -> Result<Arc<Mutex<Self>>, Error> {
        let raw = std::fs::read(path).map_err(|err| {
            log::error!("reading volume {path:?}: {err}");
            Error::Alloc
        })?;
        let volume = Volume::from_bytes(&raw)?;

        let bitmap = volume.bitmap().clone();
        let mut directory = Directory::new();
        directory.rebuild(&volume)?;
        log::info!("mounted volume {path:?}");

        Ok(Arc::new(Mutex::new(Self {
            volume,
            bitmap,
            directory,
            opens: OpenTable::new(),
            pcbs: Vec::new(),
        })))
    }

    /// 卷整体写回 `path`，随后作废全部内存状态：
    /// 目录、全局打开文件表与所有 PCB。卸载后句柄一律失效
    pub fn unmount(&mut self, path: &Path) -> Result<(), Error> {
        self.save(path)?;
        self.directory.clear();
        self.opens.clear();
        self.pcbs.clear();
        log::info!("unmounted volume {path:?}");
        Ok(())
    }

    /// 在调用者的工作目录下创建文件或文件夹
    pub fn create_entry(
        &mut self,
        name: &str,
        kind: DescriptorKind,
        ctx: &CallerContext,
    ) -> Result<(), Error> {
        // 名字以 NUL 填充落盘，内嵌 NUL 会在重挂载时截断
        if name.is_empty() || name.len() >= NAME_SIZE || name.contains('\0') {
            return Err(Error::Write);
        }
        if self.directory.lookup(&self.volume, name).is_some() {
            return Err(Error::Duplicate);
        }

        let cwd = self.cwd_of(ctx.pid);
        let parent = self.volume.descriptor(cwd)?.clone();
        if parent.kind != DescriptorKind::Folder {
            return Err(Error::Write);
        }

        // 先严格验证空间再动手：描述符一块，文件夹再预分配一块索引块，
        // 父链在 INDEX_FANOUT 边界上还要扩一块
        let mut need = 1;
        if kind == DescriptorKind::Folder {
            need += 1;
        }
        if parent.size > 0 && parent.size as usize % INDEX_FANOUT == 0 {
            need += 1;
        }
        if self.bitmap.count_free() < need {
            return Err(Error::Alloc);
        }

        let now = now();
        let ix = self.volume.alloc_block(&mut self.bitmap)?;
        let head = if kind == DescriptorKind::Folder {
            let head = self.volume.alloc_block(&mut self.bitmap)?;
            *self.volume.block_mut(head)? = Block::Index(IndexBlock::empty());
            head
        } else {
            BlockIx::INVALID
        };

        *self.volume.block_mut(ix)? = Block::Descriptor(Descriptor {
            kind,
            name: name.to_owned(),
            created: now,
            accessed: now,
            modified: now,
            rights: ctx.umask,
            owner: ctx.uid,
            size: 0,
            head,
        });

        self.volume
            .chain_append(&mut self.bitmap, parent.head, parent.size, ix)?;
        self.volume.descriptor_mut(cwd)?.size = parent.size + 1;

        self.directory.insert(name, ix);
        log::debug!("created {kind:?} {name:?} at {ix:?}");
        Ok(())
    }

    /// 删除工作目录下的文件或空文件夹
    pub fn delete_entry(&mut self, name: &str, ctx: &CallerContext) -> Result<(), Error> {
        let ix = self
            .directory
            .lookup(&self.volume, name)
            .ok_or(Error::NotFound)?;
        let desc = self.volume.descriptor(ix)?.clone();

        if desc.kind == DescriptorKind::Folder && desc.size > 0 {
            return Err(Error::NotEmpty);
        }
        // 全局表仍引用该描述符时不可回收其块
        if self.opens.find(ix).is_some() {
            return Err(Error::Access);
        }

        // 删除权按父目录（工作目录）判定
        let cwd = self.cwd_of(ctx.pid);
        let parent = self.volume.descriptor(cwd)?.clone();
        if !allowed(
            parent.owner,
            parent.rights,
            ctx.uid,
            Right::UserWrite,
            Right::OtherWrite,
        ) {
            return Err(Error::Access);
        }

        // 一切可失败的读取先于任何变更
        let mut siblings = self.volume.chain_refs(parent.head, parent.size)?;
        let pos = siblings
            .iter()
            .position(|&sibling| sibling == ix)
            .ok_or(Error::NotFound)?;
        siblings.remove(pos);

        let content_blocks = match desc.kind {
            DescriptorKind::File => (desc.size as usize).div_ceil(DATA_SIZE) as u32,
            DescriptorKind::Folder => 0,
        };
        self.volume
            .chain_free(&mut self.bitmap, desc.head, content_blocks)?;
        self.volume.free_block(&mut self.bitmap, ix)?;

        // 重建父链：释放旧索引块（子项本身保留），换新链头重新追加
        self.volume.chain_free_index(&mut self.bitmap, parent.head)?;
        let mut new_head = self.volume.alloc_block(&mut self.bitmap)?;
        *self.volume.block_mut(new_head)? = Block::Index(IndexBlock::empty());
        for (appended, &sibling) in siblings.iter().enumerate() {
            new_head =
                self.volume
                    .chain_append(&mut self.bitmap, new_head, appended as u32, sibling)?;
        }

        let parent_desc = self.volume.descriptor_mut(cwd)?;
        parent_desc.head = new_head;
        parent_desc.size = parent.size - 1;

        self.directory.remove(name, ix);
        log::debug!("deleted {name:?} at {ix:?}");
        Ok(())
    }

    /// 经内存目录解析名字，返回描述符元数据的副本
    pub fn stat(&self, name: &str) -> Result<Descriptor, Error> {
        let ix = self
            .directory
            .lookup(&self.volume, name)
            .ok_or(Error::NotFound)?;
        Ok(self.volume.descriptor(ix)?.clone())
    }

    /// 打开文件或文件夹，返回进程本地句柄。
    /// 该进程已打开时返回 [`Error::AlreadyOpen`]，内携可用的原句柄
    pub fn open(&mut self, name: &str, ctx: &CallerContext) -> Result<FileHandle, Error> {
        let ix = self
            .directory
            .lookup(&self.volume, name)
            .ok_or(Error::NotFound)?;

        let pcb_pos = self.pcbs.iter().position(|pcb| pcb.pid == ctx.pid);
        let existing_global = self.opens.find(ix);

        if let (Some(global), Some(pos)) = (existing_global, pcb_pos) {
            if let Some(slot) = self.pcbs[pos].slot_of_global(global) {
                return Err(Error::AlreadyOpen(FileHandle { pid: ctx.pid, slot }));
            }
        }

        // 句柄表槽位与进程表余量先于一切状态变更确定，之后不再失败
        let slot = match pcb_pos {
            Some(pos) => self.pcbs[pos].free_slot().ok_or(Error::Alloc)?,
            None => {
                if self.pcbs.len() >= MAX_PROCESSES {
                    return Err(Error::Alloc);
                }
                0
            }
        };

        let global = match existing_global {
            Some(global) => {
                let entry = self.opens.get_mut(global).ok_or(Error::NotFound)?;
                entry.refs += 1;
                global
            }
            None => {
                let desc = self.volume.descriptor(ix)?;
                self.opens
                    .put(OpenEntry::snapshot(ix, desc))
                    .ok_or(Error::Alloc)?
            }
        };

        let pos = pcb_pos.unwrap_or_else(|| {
            // 进程首次打开文件时惰性建立 PCB，工作目录为卷根
            self.pcbs.push(Pcb::new(ctx.pid, self.volume.root_ix()));
            self.pcbs.len() - 1
        });
        let entry = self.opens.get(global).ok_or(Error::NotFound)?;
        self.pcbs[pos].open_files[slot] = Some(LocalOpen {
            rights: entry.rights,
            uid: ctx.uid,
            global,
        });

        Ok(FileHandle { pid: ctx.pid, slot })
    }

    /// 关闭句柄：全局引用计数减一，进程打开数归零即撤销其 PCB
    pub fn close(&mut self, handle: FileHandle) -> Result<(), Error> {
        let (pos, local) = self.local(handle)?;

        self.opens.release(local.global);
        self.pcbs[pos].open_files[handle.slot] = None;
        if self.pcbs[pos].open_count() == 0 {
            self.pcbs.remove(pos);
        }
        Ok(())
    }

    /// 读出文件全部内容。
    /// 按全局表项缓存的大小截断，末块超出部分是未定义的填充
    pub fn read(&self, handle: FileHandle) -> Result<Vec<u8>, Error> {
        let (_, local) = self.local(handle)?;
        let entry = self.opens.get(local.global).ok_or(Error::NotFound)?;

        if entry.kind != DescriptorKind::File {
            return Err(Error::Read);
        }
        if !allowed(
            entry.owner,
            local.rights,
            local.uid,
            Right::UserRead,
            Right::OtherRead,
        ) {
            return Err(Error::Access);
        }

        let size = entry.size as usize;
        let head = self.volume.descriptor(entry.ix)?.head;
        let refs = self
            .volume
            .chain_refs(head, size.div_ceil(DATA_SIZE) as u32)?;

        let mut out = Vec::with_capacity(size);
        for ix in refs {
            let Block::Data(data) = self.volume.block(ix)? else {
                return Err(Error::Read);
            };
            let take = DATA_SIZE.min(size - out.len());
            out.extend_from_slice(&data.bytes[..take]);
        }
        Ok(out)
    }

    /// 以 `bytes` 整体替换文件内容。
    /// 空间校验严格先于任何变更；校验通过后旧链先释放、新链再分配，
    /// 中途不会再失败，故不存在半途而废的写入
    pub fn write(&mut self, handle: FileHandle, bytes: &[u8]) -> Result<(), Error> {
        let (_, local) = self.local(handle)?;
        let entry = self.opens.get(local.global).ok_or(Error::NotFound)?;

        if entry.kind != DescriptorKind::File {
            return Err(Error::Write);
        }
        if !allowed(
            entry.owner,
            local.rights,
            local.uid,
            Right::UserWrite,
            Right::OtherWrite,
        ) {
            return Err(Error::Access);
        }
        let ix = entry.ix;
        let global = local.global;

        let data_blocks = bytes.len().div_ceil(DATA_SIZE);
        let index_blocks = data_blocks.div_ceil(INDEX_FANOUT);
        if self.bitmap.count_free() < data_blocks + index_blocks {
            return Err(Error::Alloc);
        }

        let old = self.volume.descriptor(ix)?.clone();
        let old_blocks = (old.size as usize).div_ceil(DATA_SIZE) as u32;
        self.volume
            .chain_free(&mut self.bitmap, old.head, old_blocks)?;

        let mut head = BlockIx::INVALID;
        for (appended, chunk) in bytes.chunks(DATA_SIZE).enumerate() {
            let data_ix = self.volume.alloc_block(&mut self.bitmap)?;
            let mut data = DataBlock::default();
            data.bytes[..chunk.len()].copy_from_slice(chunk);
            *self.volume.block_mut(data_ix)? = Block::Data(data);

            head = self
                .volume
                .chain_append(&mut self.bitmap, head, appended as u32, data_ix)?;
        }

        let now = now();
        let desc = self.volume.descriptor_mut(ix)?;
        desc.head = head;
        desc.size = bytes.len() as u32;
        desc.modified = now;
        desc.accessed = now;

        // 刷新全局表的元数据快照
        let entry = self.opens.get_mut(global).ok_or(Error::NotFound)?;
        entry.size = bytes.len() as u32;
        entry.modified = now;
        entry.accessed = now;
        Ok(())
    }
}

impl SimFileSystem {
    fn save(&self, path: &Path) -> Result<(), Error> {
        std::fs::write(path, self.volume.to_bytes()).map_err(|err| {
            log::error!("writing volume {path:?}: {err}");
            Error::Alloc
        })
    }

    /// 调用者的工作目录；没有 PCB 的进程以卷根为工作目录
    fn cwd_of(&self, pid: u32) -> BlockIx {
        self.pcbs
            .iter()
            .find(|pcb| pcb.pid == pid)
            .map_or(self.volume.root_ix(), |pcb| pcb.cwd)
    }

    /// 解析句柄到 (PCB 位置, 本地打开项)
    fn local(&self, handle: FileHandle) -> Result<(usize, LocalOpen), Error> {
        let pos = self
            .pcbs
            .iter()
            .position(|pcb| pcb.pid == handle.pid)
            .ok_or(Error::NotFound)?;
        let local = self.pcbs[pos]
            .open_files
            .get(handle.slot)
            .copied()
            .flatten()
            .ok_or(Error::NotFound)?;
        Ok((pos, local))
    }
}

impl Default for SimFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// 自 UNIX 纪元的秒数
fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

/// 访问策略：调用者即属主时看 user 位，否则看 other 位；无组检查
fn allowed(
    owner: u32,
    rights: enumflags2::BitFlags<Right>,
    uid: u32,
    user_bit: Right,
    other_bit: Right,
) -> bool {
    if uid == owner {
        rights.contains(user_bit)
    } else {
        rights.contains(other_bit)
    }
}
