//! 位置跟踪器（读取线程）
//!
//! 读取线程以平台允许的最高速率紧循环轮询两根编码器输入线（不 sleep），
//! 通过 [`QuadratureDecoder`] 累计位置，并与轮询计数一起发布。
//!
//! # 并发模型
//!
//! - 读取线程是 [`EncoderState`] 的唯一写入者
//! - `position` 和 `tick_count` 在同一把锁内一起更新，读者永远看不到撕裂的一对值
//! - 电平读取在锁外完成，临界区只有两次加法
//! - `reset()` 走同一把锁，因此与读取线程的边沿判定是线性化的

use crate::error::{DriverError, HardwareError};
use crate::hal::EncoderInput;
use crate::lifecycle::{InputGuard, ShutdownToken, raise_thread_priority};
use crate::quadrature::{QuadratureDecoder, angle_degrees};
use parking_lot::Mutex;
use quadpid_protocol::EncoderStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{error, info, trace};

/// 编码器原始状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderState {
    /// 原始位置（tick），不做整数层面的回绕
    pub position: i64,
    /// 轮询次数（无论是否检测到边沿都递增）
    pub tick_count: u64,
}

/// 一次位置采样
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    /// 角度（度），范围 `[-180, 180)`
    pub angle_deg: f64,
    pub tick_count: u64,
}

/// 可采样、可复位的位置源
///
/// 控制循环只依赖这个 trait，测试可以用手动推进的实现替换真实的读取线程。
pub trait PositionSource: Send + Sync {
    fn snapshot(&self) -> PositionSample;

    /// 把位置和轮询计数清零
    fn reset(&self);
}

/// 读取线程与其他线程共享的位置状态
#[derive(Debug)]
pub struct PositionHandle {
    state: Mutex<EncoderState>,
    ticks_per_revolution: u32,
    epoch: Instant,
    status_sequence: AtomicU64,
}

impl PositionHandle {
    pub fn new(ticks_per_revolution: u32) -> Self {
        Self {
            state: Mutex::new(EncoderState::default()),
            ticks_per_revolution,
            epoch: Instant::now(),
            status_sequence: AtomicU64::new(0),
        }
    }

    /// 记录一次轮询的结果（只由读取线程调用）
    #[inline]
    pub(crate) fn record_poll(&self, delta: i64) {
        let mut state = self.state.lock();
        state.position += delta;
        state.tick_count += 1;
    }

    /// 原始状态（一致的一对值）
    pub fn raw(&self) -> EncoderState {
        *self.state.lock()
    }

    pub fn ticks_per_revolution(&self) -> u32 {
        self.ticks_per_revolution
    }

    /// 生成一条 `msg_type = 0` 的编码器状态消息
    ///
    /// 每次调用序号加一，时间戳相对于句柄创建时刻。
    pub fn status(&self) -> EncoderStatus {
        let sample = self.snapshot();
        EncoderStatus {
            value: sample.angle_deg,
            counter: sample.tick_count,
            sequence: self.status_sequence.fetch_add(1, Ordering::Relaxed),
            timestamp_us: self.epoch.elapsed().as_micros() as u64,
        }
    }
}

impl PositionSource for PositionHandle {
    fn snapshot(&self) -> PositionSample {
        let state = self.raw();
        PositionSample {
            angle_deg: angle_degrees(state.position, self.ticks_per_revolution),
            tick_count: state.tick_count,
        }
    }

    fn reset(&self) {
        *self.state.lock() = EncoderState::default();
        trace!("Encoder state reset");
    }
}

impl<T: PositionSource + ?Sized> PositionSource for Arc<T> {
    fn snapshot(&self) -> PositionSample {
        (**self).snapshot()
    }

    fn reset(&self) {
        (**self).reset()
    }
}

/// 位置跟踪器
///
/// 拥有读取线程。`stop()` 触发共享关停令牌并等待线程退出，可以重复调用；
/// `Drop` 时也会执行同样的流程。
pub struct PositionTracker {
    handle: Arc<PositionHandle>,
    token: ShutdownToken,
    thread: Option<JoinHandle<Result<(), DriverError>>>,
}

impl PositionTracker {
    pub fn new(ticks_per_revolution: u32, token: ShutdownToken) -> Self {
        Self {
            handle: Arc::new(PositionHandle::new(ticks_per_revolution)),
            token,
            thread: None,
        }
    }

    /// 启动读取线程
    ///
    /// # 错误
    ///
    /// - `DriverError::AlreadyStarted`：读取线程已经启动过
    /// - `DriverError::ThreadPanicked`：无法创建线程
    pub fn start<E>(&mut self, input: E) -> Result<(), DriverError>
    where
        E: EncoderInput + 'static,
    {
        if self.thread.is_some() {
            return Err(DriverError::AlreadyStarted);
        }
        let handle = self.handle.clone();
        let token = self.token.clone();
        let thread = std::thread::Builder::new()
            .name("quadpid-reader".into())
            .spawn(move || reader_loop(input, handle, token))
            .map_err(|e| DriverError::ThreadPanicked(format!("failed to spawn reader: {}", e)))?;
        self.thread = Some(thread);
        Ok(())
    }

    pub fn snapshot(&self) -> PositionSample {
        self.handle.snapshot()
    }

    pub fn reset(&self) {
        self.handle.reset();
    }

    pub fn status(&self) -> EncoderStatus {
        self.handle.status()
    }

    /// 共享位置句柄（交给控制线程）
    pub fn handle(&self) -> Arc<PositionHandle> {
        self.handle.clone()
    }

    pub fn token(&self) -> &ShutdownToken {
        &self.token
    }

    /// 读取线程是否已经退出（正常或故障）
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// 停止读取线程并返回它的退出结果
    ///
    /// 第二次调用直接返回 `Ok(())`。
    pub fn stop(&mut self) -> Result<(), DriverError> {
        self.token.stop();
        match self.thread.take() {
            Some(thread) => join_thread(thread, "reader"),
            None => Ok(()),
        }
    }
}

impl Drop for PositionTracker {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("Reader thread exited with error: {}", e);
        }
    }
}

/// 等待线程结束，把 panic 转换为 [`DriverError::ThreadPanicked`]
pub(crate) fn join_thread(
    thread: JoinHandle<Result<(), DriverError>>,
    name: &str,
) -> Result<(), DriverError> {
    match thread.join() {
        Ok(result) => result,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("{} thread panicked: {}", name, msg);
            Err(DriverError::ThreadPanicked(format!("{}: {}", name, msg)))
        },
    }
}

/// 读取线程主循环
///
/// 读取失败是致命的：记录错误、触发关停令牌（让控制线程退出并释放电机）、
/// 清理输入线后返回 [`DriverError::HardwareReadFault`]。
pub fn reader_loop<E: EncoderInput>(
    input: E,
    handle: Arc<PositionHandle>,
    token: ShutdownToken,
) -> Result<(), DriverError> {
    raise_thread_priority("Reader");
    let _stop = token.stop_on_drop();

    // 守卫保证所有退出路径上都清理输入线
    let mut guard = InputGuard::new(input);
    let initial = guard
        .input_mut()
        .read_levels()
        .map_err(|e| read_fault(e, &token))?;
    let mut decoder = QuadratureDecoder::new(initial);
    info!("Reader thread started");

    while !token.is_stopped() {
        let levels = guard
            .input_mut()
            .read_levels()
            .map_err(|e| read_fault(e, &token))?;
        handle.record_poll(decoder.step(levels));
    }

    info!("Reader thread stopped");
    Ok(())
}

fn read_fault(err: HardwareError, token: &ShutdownToken) -> DriverError {
    error!("Encoder read failed, stopping reader: {}", err);
    token.stop();
    DriverError::HardwareReadFault(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedEncoder;
    use std::time::Duration;

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_handle_snapshot_and_reset() {
        let handle = PositionHandle::new(360);
        for _ in 0..200 {
            handle.record_poll(1);
        }
        let sample = handle.snapshot();
        assert_eq!(sample.angle_deg, -160.0);
        assert_eq!(sample.tick_count, 200);

        handle.reset();
        assert_eq!(handle.raw(), EncoderState::default());
        assert_eq!(handle.snapshot().angle_deg, 0.0);
    }

    #[test]
    fn test_status_sequence_increments() {
        let handle = PositionHandle::new(500);
        handle.record_poll(125);
        let first = handle.status();
        let second = handle.status();
        assert_eq!(first.value, 90.0);
        assert_eq!(first.counter, 1);
        assert_eq!(second.sequence, first.sequence + 1);
    }

    #[test]
    fn test_tracker_counts_ticks() {
        let mut tracker = PositionTracker::new(360, ShutdownToken::new());
        tracker.start(ScriptedEncoder::from_phase_steps(100)).unwrap();

        wait_until(|| tracker.snapshot().tick_count >= 200);
        assert_eq!(tracker.snapshot().angle_deg, 50.0);

        tracker.stop().unwrap();
        assert!(tracker.is_finished());
        // 第二次 stop 是空操作
        tracker.stop().unwrap();
    }

    #[test]
    fn test_tracker_reset_while_running() {
        let encoder = ScriptedEncoder::from_phase_steps(40);
        let feeder = encoder.feeder();
        let mut tracker = PositionTracker::new(360, ShutdownToken::new());
        tracker.start(encoder).unwrap();

        wait_until(|| feeder.pending() == 0 && tracker.snapshot().angle_deg == 20.0);
        tracker.reset();
        let sample = tracker.snapshot();
        assert_eq!(sample.angle_deg, 0.0);
        assert!(sample.tick_count < 1_000_000);

        feeder.push_phase_steps(40, 10);
        wait_until(|| feeder.pending() == 0 && tracker.snapshot().angle_deg == 5.0);
    }

    #[test]
    fn test_tracker_double_start_rejected() {
        let mut tracker = PositionTracker::new(360, ShutdownToken::new());
        tracker.start(ScriptedEncoder::new(vec![])).unwrap();
        assert!(matches!(
            tracker.start(ScriptedEncoder::new(vec![])),
            Err(DriverError::AlreadyStarted)
        ));
    }

    #[test]
    fn test_read_fault_trips_token_and_releases_lines() {
        let token = ShutdownToken::new();
        let encoder = ScriptedEncoder::new(vec![]).fail_after(10);
        let releases = encoder.release_counter();
        let mut tracker = PositionTracker::new(360, token.clone());
        tracker.start(encoder).unwrap();

        wait_until(|| tracker.is_finished());
        assert!(token.is_stopped());
        assert!(matches!(tracker.stop(), Err(DriverError::HardwareReadFault(_))));
        assert_eq!(releases.load(Ordering::Relaxed), 1);
    }
}
