//! 线程生命周期与关停
//!
//! 读取线程和控制线程共享同一个 [`ShutdownToken`]，在每次循环迭代时协作式检查。
//! 任何一方发生致命故障都会触发这个令牌，另一方随之退出；
//! 资源释放（电机释放、输入线清理）由各线程的守卫在所有退出路径上保证执行。

use crate::hal::{EncoderInput, MotorDriver};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// 共享关停令牌
///
/// Clone 是轻量的（Arc 指针）。`stop()` 可以从任何线程调用任意次。
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    stopped: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 发出关停信号（幂等）
    ///
    /// 返回 `true` 表示本次调用是第一次触发。
    pub fn stop(&self) -> bool {
        // Release: 关停前的写入对看到 true 的线程可见
        !self.stopped.swap(true, Ordering::AcqRel)
    }

    /// 是否已收到关停信号
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// 返回一个在 Drop 时触发本令牌的守卫
    ///
    /// 线程 panic 时另一个线程也能随之退出。
    pub fn stop_on_drop(&self) -> StopOnDrop {
        StopOnDrop {
            token: self.clone(),
        }
    }
}

/// [`ShutdownToken::stop_on_drop`] 返回的守卫
pub struct StopOnDrop {
    token: ShutdownToken,
}

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.token.stop();
    }
}

/// 把当前线程提升到最高优先级（`realtime` feature）
///
/// 失败时只记录警告，线程继续以普通优先级运行。
#[cfg(feature = "realtime")]
pub(crate) fn raise_thread_priority(thread: &str) {
    use thread_priority::{ThreadPriority, set_current_thread_priority};
    use tracing::info;

    match set_current_thread_priority(ThreadPriority::Max) {
        Ok(_) => info!("{} thread priority set to MAX (realtime)", thread),
        Err(e) => warn!(
            "Failed to set {} thread priority: {:?}. \
            On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
            thread, e
        ),
    }
}

#[cfg(not(feature = "realtime"))]
#[inline]
pub(crate) fn raise_thread_priority(_thread: &str) {}

/// 电机守卫
///
/// 在所有退出路径上释放电机：正常退出时显式调用 [`release`](Self::release)，
/// panic 展开或提前返回时由 `Drop` 兜底。两次释放是安全的。
pub struct MotorGuard<D: MotorDriver> {
    driver: D,
    release_count: u32,
}

impl<D: MotorDriver> MotorGuard<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            release_count: 0,
        }
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// 释放驱动板上的所有电机
    pub fn release(&mut self) {
        self.release_count += 1;
        match self.driver.release_all() {
            Ok(()) => debug!("Motors released (call #{})", self.release_count),
            Err(e) => warn!("Failed to release motors: {}", e),
        }
    }
}

impl<D: MotorDriver> Drop for MotorGuard<D> {
    fn drop(&mut self) {
        self.release();
    }
}

/// 输入线守卫
///
/// 读取线程退出（包括故障与 panic）时清理输入线。
pub struct InputGuard<E: EncoderInput> {
    input: E,
}

impl<E: EncoderInput> InputGuard<E> {
    pub fn new(input: E) -> Self {
        Self { input }
    }

    pub fn input_mut(&mut self) -> &mut E {
        &mut self.input
    }
}

impl<E: EncoderInput> Drop for InputGuard<E> {
    fn drop(&mut self) {
        self.input.release();
        debug!("Encoder input lines released");
    }
}
