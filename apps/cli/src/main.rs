//! # quadpid
//!
//! 正交编码器 + PID 位置伺服的命令行工具。没有硬件时在仿真电机上运行。
//!
//! ```bash
//! # 运行伺服，stdin 接收控制消息，stdout 输出遥测
//! quadpid run --motor-period-us 1000 -p 2.5 -d 0.6
//!
//! # 生成控制消息
//! (quadpid goal 45; sleep 5) | quadpid run
//! quadpid goal 45 | quadpid run --duration 5   # stdin 关闭后继续运行到时长结束
//! quadpid gains --p 3.0
//!
//! # 只观察编码器
//! quadpid encoder --drive 100 --period 50
//!
//! # 打印生效的配置
//! quadpid config --config servo.toml
//! ```
//!
//! 日志输出到 stderr，级别由 `RUST_LOG` 控制（默认 `quadpid=info`）。

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{ConfigCommand, EncoderCommand, GainsCommand, GoalCommand, RunCommand};

/// quadpid - 直流电机位置伺服
#[derive(Parser, Debug)]
#[command(name = "quadpid")]
#[command(about = "Quadrature encoder PID servo", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 运行伺服（仿真电机）
    Run {
        #[command(flatten)]
        args: RunCommand,
    },

    /// 只运行编码器读取，输出状态消息
    Encoder {
        #[command(flatten)]
        args: EncoderCommand,
    },

    /// 打印目标角消息
    Goal {
        #[command(flatten)]
        args: GoalCommand,
    },

    /// 打印增益消息
    Gains {
        #[command(flatten)]
        args: GainsCommand,
    },

    /// 打印生效的配置
    Config {
        #[command(flatten)]
        args: ConfigCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志（stdout 留给消息）
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quadpid=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { args } => args.execute(),
        Commands::Encoder { args } => args.execute(),
        Commands::Goal { args } => args.execute(),
        Commands::Gains { args } => args.execute(),
        Commands::Config { args } => args.execute(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "quadpid",
            "run",
            "-p",
            "1.5",
            "--no-invert",
            "--motor",
            "2",
            "--duration",
            "0.5",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { args } => {
                assert_eq!(args.servo.p, Some(1.5));
                assert!(args.servo.no_invert);
                assert_eq!(args.servo.motor, Some(2));
                assert_eq!(args.duration, Some(0.5));
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_negative_goal() {
        let cli = Cli::try_parse_from(["quadpid", "goal", "-45"]).unwrap();
        match cli.command {
            Commands::Goal { args } => assert_eq!(args.value, Some(-45.0)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
