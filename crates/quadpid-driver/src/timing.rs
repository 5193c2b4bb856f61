//! 控制周期定时
//!
//! 普通 sleep 在目标平台上只有约 1ms 精度，不足以支撑亚毫秒级的控制周期，
//! 因此默认使用忙等（自旋）直到单调时钟到达截止时间，用 CPU 换取定时精度。
//!
//! `SpinSleep` 是可选的替代方案：先由 `spin_sleep` 睡眠到接近截止时间，再自旋补足。
//! 只有在平台的 sleep 精度足够时才应选用。

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// 等待策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategy {
    /// 纯自旋忙等（默认）
    #[default]
    BusyWait,
    /// `spin_sleep` 混合睡眠
    SpinSleep,
}

impl WaitStrategy {
    /// 等待直到 `deadline`
    ///
    /// 截止时间已过时立即返回。
    pub fn wait_until(self, deadline: Instant) {
        match self {
            WaitStrategy::BusyWait => spin_until(deadline),
            WaitStrategy::SpinSleep => {
                let now = Instant::now();
                if deadline > now {
                    spin_sleep::sleep(deadline - now);
                }
            },
        }
    }
}

/// 自旋直到单调时钟到达 `deadline`
#[inline]
pub fn spin_until(deadline: Instant) {
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}
