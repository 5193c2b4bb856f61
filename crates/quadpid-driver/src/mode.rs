//! 控制器状态定义
//!
//! 控制线程的状态机：
//!
//! ```text
//!            目标角哨兵 (999)
//! Running ───────────────────> Resetting
//!    ^                              │
//!    └──────── 重新定基完成 ─────────┘
//!    │
//!    │ 关停 / 故障
//!    v
//! Stopped（终态：电机已释放，线程退出）
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

/// 控制器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ControllerMode {
    /// 正常运行（默认）
    #[default]
    Running = 0,

    /// 复位中（瞬态）
    ///
    /// 停机、等待、清零编码器、以当前角度重新定基，然后回到 Running。
    Resetting = 1,

    /// 已停止（终态）
    Stopped = 2,
}

impl ControllerMode {
    /// 从 u8 转换
    ///
    /// 如果值无效，返回 Stopped（保守处理）。
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Resetting,
            _ => Self::Stopped,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_stopped(self) -> bool {
        self == Self::Stopped
    }
}

/// 控制器状态（原子版本，用于线程间共享）
///
/// 控制线程写入，其他线程只读观察。
#[derive(Debug)]
pub struct AtomicControllerMode {
    inner: AtomicU8,
}

impl AtomicControllerMode {
    pub fn new(mode: ControllerMode) -> Self {
        Self {
            inner: AtomicU8::new(mode.as_u8()),
        }
    }

    pub fn get(&self) -> ControllerMode {
        ControllerMode::from_u8(self.inner.load(Ordering::Acquire))
    }

    /// 切换状态
    ///
    /// Stopped 是终态：一旦进入，后续的切换会被忽略并返回 `false`。
    pub fn transition(&self, mode: ControllerMode) -> bool {
        let mut current = self.inner.load(Ordering::Acquire);
        loop {
            if ControllerMode::from_u8(current).is_stopped() {
                return false;
            }
            match self.inner.compare_exchange_weak(
                current,
                mode.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for AtomicControllerMode {
    fn default() -> Self {
        Self::new(ControllerMode::Running)
    }
}
