//! PID 状态
//!
//! 增益三元组和目标角度作为一个整体以写时复制方式发布（`ArcSwap`），
//! 控制线程每个周期只做一次无锁 `load`，不会读到半更新的组合。
//!
//! 线上的哨兵值 999 按字段解释：
//!
//! - 增益字段为 999：该字段保持不变
//! - 目标角为 999：复位请求，而不是一个数值目标
//!
//! 非有限值（NaN / ±inf）被静默忽略，与哨兵一样是定义好的空操作。
//!
//! 复位在控制线程里异步执行。为了保持消息顺序，每次数值目标更新都会推进
//! `goal_generation`；复位只在请求之后没有更新的目标时才用当前角度重新定基。

use arc_swap::ArcSwap;
use quadpid_protocol::constants::{GOAL_MAX_DEG, GOAL_MIN_DEG};
use quadpid_protocol::is_sentinel;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// PID 增益
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gains {
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

impl Default for Gains {
    fn default() -> Self {
        Self {
            p: 2.5,
            i: 0.0,
            d: 0.6,
        }
    }
}

/// 控制线程在一个周期内看到的一致视图
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidSnapshot {
    pub gains: Gains,
    /// 目标角度（度），范围 `[-180, 180]`
    pub goal: f64,
    /// 数值目标更新的代数（复位定基不推进）
    pub goal_generation: u64,
}

/// `update_goal` 的处理结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GoalOutcome {
    /// 已保存（钳位后的值）
    Set(f64),
    /// 收到哨兵，复位请求已登记
    ResetRequested,
    /// 非有限值，忽略
    Ignored,
}

/// PID 状态（消息处理线程写，控制线程读）
#[derive(Debug)]
pub struct PidState {
    current: ArcSwap<PidSnapshot>,
    /// 0 表示没有复位请求，否则为请求时的 `goal_generation + 1`
    reset_request: AtomicU64,
}

impl PidState {
    pub fn new(gains: Gains, goal: f64) -> Self {
        Self {
            current: ArcSwap::from_pointee(PidSnapshot {
                gains,
                goal: clamp_goal(goal),
                goal_generation: 0,
            }),
            reset_request: AtomicU64::new(0),
        }
    }

    /// 当前视图（无锁读取）
    #[inline]
    pub fn load(&self) -> PidSnapshot {
        **self.current.load()
    }

    /// 更新增益
    ///
    /// `None`、哨兵 999 和非有限值都保持对应字段不变。
    /// 三个字段作为一次发布生效。返回是否有字段发生变化。
    pub fn update_gains(&self, p: Option<f64>, i: Option<f64>, d: Option<f64>) -> bool {
        let (p, i, d) = (accepted(p), accepted(i), accepted(d));
        if p.is_none() && i.is_none() && d.is_none() {
            debug!("Gain update carries no values, ignored");
            return false;
        }

        let previous = self.current.rcu(|old| {
            let mut next = **old;
            if let Some(p) = p {
                next.gains.p = p;
            }
            if let Some(i) = i {
                next.gains.i = i;
            }
            if let Some(d) = d {
                next.gains.d = d;
            }
            Arc::new(next)
        });
        let gains = self.load().gains;
        info!("Gains updated: p={} i={} d={}", gains.p, gains.i, gains.d);
        previous.gains != gains
    }

    /// 更新目标角
    ///
    /// 哨兵值登记一个复位请求，由控制线程在下一个周期执行复位序列
    /// （控制线程独占电机，只有它能安全地停机和重新定基）。
    /// 其他值钳位到 `[-180, 180]` 后保存。
    pub fn update_goal(&self, value: f64) -> GoalOutcome {
        if is_sentinel(value) {
            return self.request_reset();
        }
        if !value.is_finite() {
            debug!("Non-finite goal {} ignored", value);
            return GoalOutcome::Ignored;
        }

        let goal = clamp_goal(value);
        self.store_goal(goal);
        info!("Goal updated: {}", goal);
        GoalOutcome::Set(goal)
    }

    /// 登记复位请求
    ///
    /// 记录当前的目标代数：之后到达的数值目标优先于复位定基。
    pub fn request_reset(&self) -> GoalOutcome {
        let generation = self.load().goal_generation;
        self.reset_request.store(generation + 1, Ordering::Release);
        info!("Goal reset requested");
        GoalOutcome::ResetRequested
    }

    /// 取走复位请求（控制线程调用），返回请求时的目标代数
    pub fn take_reset_request(&self) -> Option<u64> {
        match self.reset_request.swap(0, Ordering::AcqRel) {
            0 => None,
            tagged => Some(tagged - 1),
        }
    }

    pub fn reset_pending(&self) -> bool {
        self.reset_request.load(Ordering::Acquire) != 0
    }

    /// 以当前角度重新定基目标（复位序列的最后一步）
    ///
    /// 只有目标代数仍为 `generation` 时才生效；复位请求之后到达的数值目标
    /// 保持不变。返回是否发生了定基。
    pub fn rebase_goal(&self, angle_deg: f64, generation: u64) -> bool {
        let goal = clamp_goal(angle_deg);
        let previous = self.current.rcu(|old| {
            let mut next = **old;
            if next.goal_generation == generation {
                next.goal = goal;
            }
            Arc::new(next)
        });
        let rebased = previous.goal_generation == generation;
        if !rebased {
            debug!("Rebase skipped, goal {} arrived after the reset request", previous.goal);
        }
        rebased
    }

    fn store_goal(&self, goal: f64) {
        self.current.rcu(|old| {
            let mut next = **old;
            next.goal = goal;
            next.goal_generation += 1;
            Arc::new(next)
        });
    }
}

impl Default for PidState {
    fn default() -> Self {
        Self::new(Gains::default(), 0.0)
    }
}

fn accepted(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !is_sentinel(*v) && v.is_finite())
}

fn clamp_goal(goal: f64) -> f64 {
    goal.clamp(GOAL_MIN_DEG, GOAL_MAX_DEG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_sentinel_changes_only_i() {
        let state = PidState::new(Gains { p: 1.0, i: 0.5, d: 0.2 }, 0.0);
        assert!(state.update_gains(Some(999.0), Some(2.0), Some(999.0)));
        assert_eq!(state.load().gains, Gains { p: 1.0, i: 2.0, d: 0.2 });
    }

    #[test]
    fn test_all_sentinels_change_nothing() {
        let state = PidState::default();
        let before = state.load();
        assert!(!state.update_gains(Some(999.0), Some(999.0), Some(999.0)));
        assert!(!state.update_gains(None, None, None));
        assert_eq!(state.load(), before);
    }

    #[test]
    fn test_non_finite_gain_ignored() {
        let state = PidState::default();
        assert!(state.update_gains(Some(f64::NAN), None, Some(0.1)));
        assert_eq!(state.load().gains.p, 2.5);
        assert_eq!(state.load().gains.d, 0.1);
    }

    #[test]
    fn test_goal_clamp() {
        let state = PidState::default();
        assert_eq!(state.update_goal(250.0), GoalOutcome::Set(180.0));
        assert_eq!(state.load().goal, 180.0);
        assert_eq!(state.update_goal(-250.0), GoalOutcome::Set(-180.0));
        assert_eq!(state.load().goal, -180.0);
        assert_eq!(state.update_goal(45.5), GoalOutcome::Set(45.5));
    }

    #[test]
    fn test_goal_sentinel_requests_reset() {
        let state = PidState::new(Gains::default(), 30.0);
        assert_eq!(state.update_goal(999.0), GoalOutcome::ResetRequested);
        // 哨兵不是数值目标
        assert_eq!(state.load().goal, 30.0);
        assert!(state.reset_pending());
        let generation = state.take_reset_request().unwrap();
        assert!(state.take_reset_request().is_none());

        assert!(state.rebase_goal(0.0, generation));
        assert_eq!(state.load().goal, 0.0);
        // 定基不推进代数，第二遍定基同样生效
        assert!(state.rebase_goal(0.0, generation));
    }

    #[test]
    fn test_goal_after_reset_request_survives_rebase() {
        let state = PidState::new(Gains::default(), 10.0);
        state.update_goal(999.0);
        state.update_goal(30.0);

        let generation = state.take_reset_request().unwrap();
        assert!(!state.rebase_goal(0.0, generation));
        assert_eq!(state.load().goal, 30.0);
    }

    #[test]
    fn test_latest_reset_request_wins() {
        let state = PidState::new(Gains::default(), 10.0);
        state.update_goal(999.0);
        state.update_goal(30.0);
        state.update_goal(999.0);

        let generation = state.take_reset_request().unwrap();
        assert!(state.rebase_goal(-5.0, generation));
        assert_eq!(state.load().goal, -5.0);
    }

    #[test]
    fn test_goal_non_finite_ignored() {
        let state = PidState::new(Gains::default(), 10.0);
        assert_eq!(state.update_goal(f64::INFINITY), GoalOutcome::Ignored);
        assert_eq!(state.load().goal, 10.0);
    }

    #[test]
    fn test_concurrent_updates_never_tear() {
        let state = Arc::new(PidState::new(Gains { p: 0.0, i: 0.0, d: 0.0 }, 0.0));
        let writer = {
            let state = state.clone();
            std::thread::spawn(move || {
                for k in 1..=2000 {
                    let v = k as f64;
                    state.update_gains(Some(v), Some(v), Some(v));
                }
            })
        };
        for _ in 0..2000 {
            let g = state.load().gains;
            assert!(g.p == g.i && g.i == g.d, "torn gains: {:?}", g);
        }
        writer.join().unwrap();
    }
}
