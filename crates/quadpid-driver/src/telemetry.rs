//! 遥测钩子
//!
//! 控制线程每 `telemetry_every` 个周期产生一条 [`TelemetryRecord`]，交给 [`TelemetrySink`]。
//! 投递是尽力而为的：sink 不能阻塞控制线程，队列满时直接丢弃。
//!
//! # 使用示例
//!
//! ```rust
//! use quadpid_driver::telemetry::{ChannelTelemetry, TelemetrySink};
//! use std::sync::Arc;
//!
//! let (sink, rx) = ChannelTelemetry::new(1024);
//! let dropped = sink.dropped_records().clone();
//! let sink = Arc::new(sink) as Arc<dyn TelemetrySink>;
//!
//! std::thread::spawn(move || {
//!     while let Ok(record) = rx.recv() {
//!         // 转发到消息总线...
//!         let _ = record;
//!     }
//! });
//!
//! println!("dropped: {}", dropped.load(std::sync::atomic::Ordering::Relaxed));
//! ```

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use quadpid_protocol::TelemetryRecord;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 遥测接收者
///
/// # 性能要求
///
/// - 非阻塞：在控制线程里同步调用，禁止 I/O 和长时间持锁
/// - 推荐使用 `try_send` 把记录转交给其他线程
pub trait TelemetrySink: Send + Sync {
    /// 处理一条记录，返回 `false` 表示记录被丢弃
    fn on_sample(&self, record: &TelemetryRecord) -> bool;
}

/// 基于有界 channel 的遥测接收者
pub struct ChannelTelemetry {
    tx: Sender<TelemetryRecord>,
    dropped_records: Arc<AtomicU64>,
    sent_records: Arc<AtomicU64>,
}

impl ChannelTelemetry {
    /// 创建接收者和对应的接收端
    ///
    /// 1kHz 控制周期下，容量 1000 约缓冲 1 秒。
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<TelemetryRecord>) {
        let (tx, rx) = bounded(capacity.max(1));
        let sink = Self {
            tx,
            dropped_records: Arc::new(AtomicU64::new(0)),
            sent_records: Arc::new(AtomicU64::new(0)),
        };
        (sink, rx)
    }

    pub fn dropped_records(&self) -> &Arc<AtomicU64> {
        &self.dropped_records
    }

    pub fn sent_records(&self) -> &Arc<AtomicU64> {
        &self.sent_records
    }
}

impl TelemetrySink for ChannelTelemetry {
    fn on_sample(&self, record: &TelemetryRecord) -> bool {
        match self.tx.try_send(*record) {
            Ok(()) => {
                self.sent_records.fetch_add(1, Ordering::Relaxed);
                true
            },
            // 队列满或接收端已关闭：都按丢弃处理
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped_records.fetch_add(1, Ordering::Relaxed);
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(counter: u64) -> TelemetryRecord {
        TelemetryRecord {
            encoder: 1.0,
            motor: -2.0,
            goal: 0.0,
            timestamp_us: 0,
            encoder_counter: counter,
            motor_counter: counter,
        }
    }

    #[test]
    fn test_channel_delivers_in_order() {
        let (sink, rx) = ChannelTelemetry::new(8);
        for k in 0..3 {
            assert!(sink.on_sample(&record(k)));
        }
        let counters: Vec<u64> = rx.try_iter().map(|r| r.motor_counter).collect();
        assert_eq!(counters, vec![0, 1, 2]);
        assert_eq!(sink.sent_records().load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_full_queue_drops() {
        let (sink, _rx) = ChannelTelemetry::new(2);
        assert!(sink.on_sample(&record(0)));
        assert!(sink.on_sample(&record(1)));
        assert!(!sink.on_sample(&record(2)));
        assert_eq!(sink.dropped_records().load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_disconnected_receiver_drops() {
        let (sink, rx) = ChannelTelemetry::new(2);
        drop(rx);
        assert!(!sink.on_sample(&record(0)));
        assert_eq!(sink.dropped_records().load(Ordering::Relaxed), 1);
    }
}
