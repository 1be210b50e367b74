//! 调用者上下文：uid/gid/pid/umask 由外部身份提供者按调用注入。
//! 引擎自身从不捏造身份；测试用的随机上下文生成器住在驱动侧。

use enumflags2::BitFlags;

use crate::layout::Right;

#[derive(Debug, Clone, Copy)]
pub struct CallerContext {
    pub uid: u32,
    pub gid: u32,
    pub pid: u32,
    /// 新建项直接以此为权限位
    pub umask: BitFlags<Right>,
}

/// 身份提供者的注入点
pub trait ContextProvider {
    fn context(&self) -> CallerContext;
}
