//! SQL Flavor（方言）：控制 `#{}` 绑定标记改写出的占位符文本。

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};

/// 目标数据库方言。只影响占位符的书写方式，不影响模板求值语义。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Flavor {
    #[default]
    MySQL,
    PostgreSQL,
    SQLite,
    SQLServer,
    Oracle,
}

static DEFAULT_FLAVOR: AtomicU8 = AtomicU8::new(Flavor::MySQL as u8);
static DEFAULT_FLAVOR_LOCK: Mutex<()> = Mutex::new(());

impl Flavor {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::MySQL,
            1 => Self::PostgreSQL,
            2 => Self::SQLite,
            3 => Self::SQLServer,
            4 => Self::Oracle,
            _ => Self::MySQL,
        }
    }

    fn to_u8(self) -> u8 {
        self as u8
    }

    /// 第 `n` 个（从 1 数起）位置参数的占位符文本。
    ///
    /// MySQL/SQLite 用不带序号的 `?`，其余方言要求显式序号。
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Self::MySQL | Self::SQLite => "?".to_string(),
            Self::PostgreSQL => format!("${n}"),
            Self::SQLServer => format!("@p{n}"),
            Self::Oracle => format!(":{n}"),
        }
    }
}

/// 获取当前全局默认 Flavor。
pub fn default_flavor() -> Flavor {
    Flavor::from_u8(DEFAULT_FLAVOR.load(Ordering::Relaxed))
}

/// 设置全局默认 Flavor，返回旧值。
pub fn set_default_flavor(flavor: Flavor) -> Flavor {
    let old = DEFAULT_FLAVOR.swap(flavor.to_u8(), Ordering::Relaxed);
    Flavor::from_u8(old)
}

/// 修改全局默认 Flavor 的 RAII guard（会持有一个全局锁，避免并行测试互相干扰）。
pub struct DefaultFlavorGuard {
    _lock: MutexGuard<'static, ()>,
    old: Flavor,
}

impl Drop for DefaultFlavorGuard {
    fn drop(&mut self) {
        set_default_flavor(self.old);
    }
}

/// 在一个作用域内临时设置 DefaultFlavor，并保证退出作用域后自动恢复。
pub fn set_default_flavor_scoped(flavor: Flavor) -> DefaultFlavorGuard {
    let lock = DEFAULT_FLAVOR_LOCK
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    let old = set_default_flavor(flavor);
    DefaultFlavorGuard { _lock: lock, old }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MySQL => "MySQL",
            Self::PostgreSQL => "PostgreSQL",
            Self::SQLite => "SQLite",
            Self::SQLServer => "SQLServer",
            Self::Oracle => "Oracle",
        };
        f.write_str(s)
    }
}
