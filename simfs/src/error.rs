use core::fmt;

use crate::FileHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 无空闲块、无空闲表槽位，或空间不足以容纳整次写入
    Alloc,
    /// 创建时名字已存在
    Duplicate,
    /// 该进程已打开此文件；携带可继续使用的句柄
    AlreadyOpen(FileHandle),
    /// 名字或句柄无法解析
    NotFound,
    /// 删除非空文件夹
    NotEmpty,
    /// 权限位拒绝此操作
    Access,
    /// 读取遍历中发现结构不一致
    Read,
    /// 写入遍历中发现结构不一致
    Write,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alloc => write!(f, "no free block or table slot"),
            Self::Duplicate => write!(f, "name already exists"),
            Self::AlreadyOpen(handle) => write!(f, "already open as {handle:?}"),
            Self::NotFound => write!(f, "name or handle not found"),
            Self::NotEmpty => write!(f, "folder is not empty"),
            Self::Access => write!(f, "access denied"),
            Self::Read => write!(f, "structural inconsistency while reading"),
            Self::Write => write!(f, "structural inconsistency while writing"),
        }
    }
}

impl std::error::Error for Error {}
