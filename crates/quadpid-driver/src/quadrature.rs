//! 正交编码器解码
//!
//! 经典的双线边沿检测：只在 clk 电平变化时判定方向，
//! 依靠 dt 与 clk 的相位关系区分正反转。
//!
//! - clk 变化且 `dt != clk`（新电平）：位置 +1
//! - clk 变化且 `dt == clk`：位置 -1
//! - clk 未变化：位置不变（无论 dt 如何）
//!
//! 没有软件去抖：两根线的抖动快于轮询速率时方向可能误判，这是轮询方式的已知限制。

use crate::hal::LineLevels;

/// 由上一次 clk 电平和本次采样计算位置增量（+1 / -1 / 0）
#[inline]
pub fn decode_step(prev_clk: bool, levels: LineLevels) -> i64 {
    if levels.clk == prev_clk {
        0
    } else if levels.dt != levels.clk {
        1
    } else {
        -1
    }
}

/// 有状态的正交解码器
///
/// 只记住上一次的 clk 电平，位置累计由调用方负责。
#[derive(Debug, Clone, Copy)]
pub struct QuadratureDecoder {
    last_clk: bool,
}

impl QuadratureDecoder {
    /// 以首次采样的 clk 电平作为基准
    pub fn new(initial: LineLevels) -> Self {
        Self {
            last_clk: initial.clk,
        }
    }

    /// 处理一次采样，返回位置增量
    #[inline]
    pub fn step(&mut self, levels: LineLevels) -> i64 {
        let delta = decode_step(self.last_clk, levels);
        self.last_clk = levels.clk;
        delta
    }

    pub fn last_clk(&self) -> bool {
        self.last_clk
    }
}

/// 格雷码相位 → 电平
///
/// 正转顺序：(L,L) → (H,L) → (H,H) → (L,H) → (L,L)。每 4 个相位产生两个 clk 边沿。
pub fn gray_levels(phase: i64) -> LineLevels {
    match phase.rem_euclid(4) {
        0 => LineLevels::new(false, false),
        1 => LineLevels::new(true, false),
        2 => LineLevels::new(true, true),
        _ => LineLevels::new(false, true),
    }
}

/// 由原始位置计算角度（度），映射到 `[-180, 180)`
///
/// 以 `ticks_per_revolution` 为周期；`position` 可以是任意符号的整数。
///
/// # 示例
///
/// ```
/// use quadpid_driver::quadrature::angle_degrees;
///
/// assert_eq!(angle_degrees(200, 360), -160.0);
/// assert_eq!(angle_degrees(-10, 360), -10.0);
/// ```
pub fn angle_degrees(position: i64, ticks_per_revolution: u32) -> f64 {
    let modulus = i64::from(ticks_per_revolution.max(1));
    let wrapped = position.rem_euclid(modulus);
    let degrees = wrapped as f64 / modulus as f64 * 360.0;
    if degrees >= 180.0 {
        degrees - 360.0
    } else {
        degrees
    }
}
