//! 配置命令
//!
//! 配置来源按优先级从低到高：内置默认值、`--config` 指定的 TOML 文件、命令行参数。

use anyhow::{Context, Result};
use clap::Args;
use quadpid_driver::ServoConfig;
use std::path::PathBuf;

/// 伺服配置参数（`run` 与 `config` 共用）
#[derive(Args, Debug, Clone, Default)]
pub struct ServoArgs {
    /// TOML 配置文件
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 编码器 clk 引脚
    #[arg(long)]
    pub clk: Option<u8>,

    /// 编码器 dt 引脚
    #[arg(long)]
    pub dt: Option<u8>,

    /// 电机通道（1-4）
    #[arg(long)]
    pub motor: Option<u8>,

    /// 控制周期（微秒）
    #[arg(long)]
    pub motor_period_us: Option<u64>,

    /// 编码器每圈 tick 数
    #[arg(long)]
    pub ticks_per_revolution: Option<u32>,

    /// 比例增益
    #[arg(short = 'p', long = "kp")]
    pub p: Option<f64>,

    /// 积分增益
    #[arg(short = 'i', long = "ki")]
    pub i: Option<f64>,

    /// 微分增益
    #[arg(short = 'd', long = "kd")]
    pub d: Option<f64>,

    /// 两次采样之间的最小轮询次数
    #[arg(long)]
    pub min_sample_difference: Option<u64>,

    /// 不反转电机方向
    #[arg(long)]
    pub no_invert: bool,
}

impl ServoArgs {
    /// 合并配置文件与命令行参数，并校验
    pub fn resolve(&self) -> Result<ServoConfig> {
        let mut config = match &self.config {
            Some(path) => ServoConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ServoConfig::default(),
        };

        if let Some(clk) = self.clk {
            config.encoder.clk_pin = clk;
        }
        if let Some(dt) = self.dt {
            config.encoder.dt_pin = dt;
        }
        if let Some(ticks) = self.ticks_per_revolution {
            config.encoder.ticks_per_revolution = ticks;
        }
        if let Some(channel) = self.motor {
            config.motor.channel = channel;
        }
        if let Some(period) = self.motor_period_us {
            config.controller.period_us = period;
        }
        if let Some(min) = self.min_sample_difference {
            config.controller.min_sample_difference = min;
        }
        if self.no_invert {
            config.controller.invert_motor = false;
        }
        if let Some(p) = self.p {
            config.gains.p = p;
        }
        if let Some(i) = self.i {
            config.gains.i = i;
        }
        if let Some(d) = self.d {
            config.gains.d = d;
        }

        Ok(config.validate()?)
    }
}

/// 打印生效的配置
#[derive(Args, Debug)]
pub struct ConfigCommand {
    #[command(flatten)]
    pub servo: ServoArgs,
}

impl ConfigCommand {
    pub fn execute(&self) -> Result<()> {
        let config = self.servo.resolve()?;
        print!("{}", config.to_toml_string()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_resolve() {
        let config = ServoArgs::default().resolve().unwrap();
        assert_eq!(config, ServoConfig::default());
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gains]\np = 4.0\nd = 1.0\n\n[motor]\nchannel = 2").unwrap();

        let args = ServoArgs {
            config: Some(file.path().to_path_buf()),
            p: Some(3.0),
            no_invert: true,
            ..Default::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.gains.p, 3.0);
        assert_eq!(config.gains.d, 1.0);
        assert_eq!(config.motor.channel, 2);
        assert!(!config.controller.invert_motor);
    }

    #[test]
    fn test_invalid_motor_channel() {
        let args = ServoArgs {
            motor: Some(7),
            ..Default::default()
        };
        assert!(args.resolve().is_err());
    }

    #[test]
    fn test_same_encoder_pins_rejected() {
        let args = ServoArgs {
            clk: Some(18),
            ..Default::default()
        };
        assert!(args.resolve().is_err());
    }

    #[test]
    fn test_missing_file() {
        let args = ServoArgs {
            config: Some(PathBuf::from("/nonexistent/quadpid.toml")),
            ..Default::default()
        };
        let err = args.resolve().unwrap_err();
        assert!(err.to_string().contains("failed to load config"));
    }
}
