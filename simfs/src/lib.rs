/* simfs 的整体架构，自上而下 */

// 文件系统操作层：挂载/卸载、创建/删除/打开/读写等操作的编排
mod fs;
pub use fs::SimFileSystem;

// 打开文件子系统：全局打开文件表与进程控制块
mod open_file;
pub use open_file::FileHandle;

// 调用者上下文：每次调用由外部身份提供者注入
mod context;
pub use context::{CallerContext, ContextProvider};

// 内存目录层：名字到描述符块的哈希目录，挂载时重建
mod directory;

// 索引链层：以索引块链表表示文件内容与文件夹子项
mod chain;

// 卷层：超级块 + 位图 + 块数组，整体加载与落盘
mod volume;
pub use volume::Volume;

// 磁盘数据结构层：表示卷内数据的结构
mod layout;
pub use layout::{BlockIx, Descriptor, DescriptorKind, Right};

mod error;
pub use error::Error;

pub const MAGIC: u32 = 0x53494D46;

/// 块大小（字节）
pub const BLOCK_SIZE: usize = 256;
/// 卷内块数
pub const BLOCK_COUNT: usize = 4096;
/// 位图字节数，每块一位
pub const BITMAP_BYTES: usize = BLOCK_COUNT / 8;

/// 名字字段大小，NUL 填充，故名字最长 NAME_SIZE - 1
pub const NAME_SIZE: usize = 64;
/// 索引块内槽位数；最后一个槽位链接下一个索引块
pub const INDEX_COUNT: usize = 127;
/// 数据块有效载荷（字节）
pub const DATA_SIZE: usize = 254;

/// 内存目录桶数，取大于块数的素数以压低冲突链长度
pub const DIRECTORY_SIZE: usize = 4099;
/// 全局打开文件表容量
pub const MAX_OPEN_FILES: usize = 64;
/// 进程控制块表容量
pub const MAX_PROCESSES: usize = 64;
/// 每进程句柄表容量
pub const MAX_OPEN_FILES_PER_PROCESS: usize = 16;
