//! 控制循环性能指标
//!
//! 零开销的原子计数器，可以在任何线程读取，不引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 控制循环实时指标
///
/// # 使用示例
///
/// ```rust
/// use quadpid_driver::ControllerMetrics;
/// use std::sync::Arc;
/// use std::sync::atomic::Ordering;
///
/// let metrics = Arc::new(ControllerMetrics::default());
///
/// // 在控制线程中更新
/// metrics.iterations.fetch_add(1, Ordering::Relaxed);
///
/// // 在主线程中读取快照
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.iterations, 1);
/// ```
#[derive(Debug, Default)]
pub struct ControllerMetrics {
    /// 完成的控制周期数
    pub iterations: AtomicU64,

    /// 实际写入驱动板的命令数
    pub motor_writes: AtomicU64,

    /// 与上一条命令相同而跳过的写入数
    pub skipped_writes: AtomicU64,

    /// 驱动板写入失败次数
    pub write_failures: AtomicU64,

    /// 最小采样差门控导致的额外采样次数
    ///
    /// 如果这个值相对 `iterations` 很高，说明控制周期短于编码器轮询能提供的分辨率。
    pub extra_samples: AtomicU64,

    /// 周期超时次数
    ///
    /// 第二次采样晚于本周期截止时间一个完整周期以上时计一次（采样门控或调度延迟）。
    pub overruns: AtomicU64,

    /// 完成的复位序列次数
    pub resets: AtomicU64,

    /// 遥测队列满而丢弃的记录数
    pub telemetry_dropped: AtomicU64,
}

impl ControllerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指标快照
    ///
    /// 使用 `Ordering::Relaxed`，不同计数器之间可能有微小的时间差。
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            iterations: self.iterations.load(Ordering::Relaxed),
            motor_writes: self.motor_writes.load(Ordering::Relaxed),
            skipped_writes: self.skipped_writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            extra_samples: self.extra_samples.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            telemetry_dropped: self.telemetry_dropped.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.iterations.store(0, Ordering::Relaxed);
        self.motor_writes.store(0, Ordering::Relaxed);
        self.skipped_writes.store(0, Ordering::Relaxed);
        self.write_failures.store(0, Ordering::Relaxed);
        self.extra_samples.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.resets.store(0, Ordering::Relaxed);
        self.telemetry_dropped.store(0, Ordering::Relaxed);
    }
}

/// 指标快照（不可变）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub iterations: u64,
    pub motor_writes: u64,
    pub skipped_writes: u64,
    pub write_failures: u64,
    pub extra_samples: u64,
    pub overruns: u64,
    pub resets: u64,
    pub telemetry_dropped: u64,
}

impl MetricsSnapshot {
    /// 写入去重率（百分比）
    ///
    /// 返回 0.0 到 100.0 之间的值。没有任何命令时返回 0.0。
    pub fn skip_rate(&self) -> f64 {
        let total = self.motor_writes + self.skipped_writes;
        if total == 0 {
            return 0.0;
        }
        (self.skipped_writes as f64 / total as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_reset() {
        let metrics = ControllerMetrics::new();
        metrics.iterations.fetch_add(10, Ordering::Relaxed);
        metrics.motor_writes.fetch_add(3, Ordering::Relaxed);
        metrics.skipped_writes.fetch_add(7, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.iterations, 10);
        assert!((snapshot.skip_rate() - 70.0).abs() < 1e-9);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_skip_rate_empty() {
        assert_eq!(MetricsSnapshot::default().skip_rate(), 0.0);
    }
}
