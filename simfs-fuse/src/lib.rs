#[cfg(test)]
mod tests;

use enumflags2::BitFlags;
use rand::Rng;

use simfs::{CallerContext, ContextProvider};

/// 模拟协议适配层的调用者身份：uid/gid/pid 每次随机取 1..=10，
/// 权限掩码全开。真实部署中这些值来自 FUSE 上下文；
/// 随机生成器只住在驱动与测试侧，引擎本身从不捏造身份。
pub struct RandomContexts;

impl ContextProvider for RandomContexts {
    fn context(&self) -> CallerContext {
        let mut rng = rand::thread_rng();
        CallerContext {
            uid: rng.gen_range(1..=10),
            gid: rng.gen_range(1..=10),
            pid: rng.gen_range(1..=10),
            umask: BitFlags::all(),
        }
    }
}

/// 生成指定长度的可打印随机内容，打包演示与测试共用
pub fn generate_content(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(b' '..=b'~')).collect()
}
