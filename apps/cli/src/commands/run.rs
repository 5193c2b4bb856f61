//! run 命令
//!
//! 在仿真电机上运行伺服：
//! - stdin：每行一条 JSON 消息（msg_type 2 目标角 / 4 增益），由消息线程解码后转交主线程
//! - stdout：每 `--period` 毫秒输出最新的一条遥测（msg_type 3）
//!
//! Ctrl+C 或 `--duration` 到期时有序停止。没有 `--duration` 时 stdin 关闭也会停止；
//! 给定 `--duration` 时 stdin 关闭后继续运行到时长结束。

use crate::commands::config::ServoArgs;
use anyhow::{Context, Result};
use clap::Args;
use crossbeam_channel::{Receiver, Sender, bounded, never, select, tick};
use quadpid_driver::sim::SimPlant;
use quadpid_driver::{Applied, ChannelTelemetry, Servo, ServoBuilder, ShutdownToken};
use quadpid_protocol::{Message, decode, encode};
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 1kHz 控制周期下约 1 秒的遥测缓冲
const TELEMETRY_CAPACITY: usize = 1024;
const MESSAGE_CAPACITY: usize = 64;

#[derive(Args, Debug)]
pub struct RunCommand {
    #[command(flatten)]
    pub servo: ServoArgs,

    /// 遥测输出间隔（毫秒）
    #[arg(long, default_value_t = 100)]
    pub period: u64,

    /// 运行时长（秒），缺省时一直运行
    #[arg(long)]
    pub duration: Option<f64>,

    /// 初始目标角（度），缺省时以启动时的角度为目标
    #[arg(long, allow_hyphen_values = true)]
    pub goal: Option<f64>,
}

impl RunCommand {
    pub fn execute(&self) -> Result<()> {
        let config = self.servo.resolve()?;
        let plant = SimPlant::default();
        let (telemetry, records) = ChannelTelemetry::new(TELEMETRY_CAPACITY);

        let mut builder = ServoBuilder::new()
            .config(config)
            .encoder(plant.encoder())
            .motor(plant.motor())
            .telemetry(Arc::new(telemetry));
        if let Some(goal) = self.goal {
            builder = builder.initial_goal(goal);
        }
        let mut servo = builder.build().context("failed to start servo")?;

        let token = servo.shutdown_token();
        install_interrupt_handler(token.clone())?;
        let messages = spawn_message_reader()?;

        let period = Duration::from_millis(self.period.max(1));
        let deadline = self.duration.map(|s| Instant::now() + Duration::from_secs_f64(s.max(0.0)));
        let pumped = pump(&servo, &token, &messages, &records, period, deadline);

        let stopped = servo.stop();
        let metrics = servo.metrics();
        info!(
            "Servo finished: iterations={} writes={} skipped={} write_failures={} overruns={} resets={}",
            metrics.iterations,
            metrics.motor_writes,
            metrics.skipped_writes,
            metrics.write_failures,
            metrics.overruns,
            metrics.resets
        );

        pumped?;
        stopped?;
        Ok(())
    }
}

/// 主线程消息泵：转交控制消息，并按节拍输出遥测
fn pump(
    servo: &Servo,
    token: &ShutdownToken,
    messages: &Receiver<Message>,
    records: &Receiver<quadpid_protocol::TelemetryRecord>,
    period: Duration,
    deadline: Option<Instant>,
) -> Result<()> {
    let ticker = tick(period);
    let stdout = std::io::stdout();
    let idle = never();
    let mut input_closed = false;

    loop {
        if servo.is_finished() {
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("Run duration elapsed");
            break;
        }

        let input = if input_closed { &idle } else { messages };
        select! {
            recv(input) -> msg => match msg {
                Ok(message) => match servo.apply(&message) {
                    Applied::Ignored => {},
                    applied => debug!("Applied {:?}", applied),
                },
                Err(_) if deadline.is_some() => {
                    info!("stdin closed, running until the duration elapses");
                    input_closed = true;
                },
                Err(_) => {
                    info!("stdin closed, stopping");
                    break;
                },
            },
            recv(ticker) -> _ => {
                if let Some(record) = records.try_iter().last() {
                    let line = encode(&Message::Telemetry(record))?;
                    let mut out = stdout.lock();
                    writeln!(out, "{}", line)?;
                    out.flush()?;
                }
            },
        }
    }

    token.stop();
    Ok(())
}

/// Ctrl+C 触发关停令牌
pub fn install_interrupt_handler(token: ShutdownToken) -> Result<()> {
    ctrlc::set_handler(move || {
        if token.stop() {
            eprintln!("\nReceived interrupt signal. Shutting down...");
        }
    })
    .context("failed to set signal handler")
}

/// 消息线程：逐行读取 stdin 并解码
///
/// stdin 关闭时发送端被丢弃，主线程据此判断输入结束。
fn spawn_message_reader() -> Result<Receiver<Message>> {
    let (tx, rx) = bounded(MESSAGE_CAPACITY);
    std::thread::Builder::new()
        .name("quadpid-messages".into())
        .spawn(move || read_messages(std::io::stdin().lock(), &tx))
        .context("failed to spawn message thread")?;
    Ok(rx)
}

fn read_messages(input: impl BufRead, tx: &Sender<Message>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("stdin read failed: {}", e);
                break;
            },
        };
        if line.trim().is_empty() {
            continue;
        }
        match decode(&line) {
            Ok(message) => {
                if tx.send(message).is_err() {
                    break;
                }
            },
            Err(e) => warn!("Dropping malformed message: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadpid_protocol::{GoalCommand, GoalUpdate};

    #[test]
    fn test_read_messages_skips_malformed_lines() {
        let input = "\n{\"msg_type\": 2, \"value\": 999}\nnot json\n{\"msg_type\": 7}\n{\"msg_type\": 4, \"p\": 1.5}\n";
        let (tx, rx) = bounded(8);
        read_messages(input.as_bytes(), &tx);
        drop(tx);

        let messages: Vec<Message> = rx.iter().collect();
        assert_eq!(messages.len(), 2);
        match messages[0] {
            Message::Goal(goal) => assert_eq!(goal.command(), GoalCommand::Reset),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(messages[1].msg_type(), 4);
    }

    #[test]
    fn test_pump_stops_on_closed_input() {
        let plant = SimPlant::default();
        let mut servo = ServoBuilder::new()
            .encoder(plant.encoder())
            .motor(plant.motor())
            .build()
            .unwrap();
        let token = servo.shutdown_token();

        let (tx, messages) = bounded(4);
        tx.send(Message::Goal(GoalUpdate::new(45.0))).unwrap();
        drop(tx);
        let (_telemetry, records) = ChannelTelemetry::new(4);

        pump(&servo, &token, &messages, &records, Duration::from_millis(5), None).unwrap();
        assert!(token.is_stopped());
        assert_eq!(servo.pid().goal, 45.0);
        servo.stop().unwrap();
    }

    #[test]
    fn test_pump_runs_until_duration_after_closed_input() {
        let plant = SimPlant::default();
        let mut servo = ServoBuilder::new()
            .encoder(plant.encoder())
            .motor(plant.motor())
            .build()
            .unwrap();
        let token = servo.shutdown_token();

        let (tx, messages) = bounded(4);
        tx.send(Message::Goal(GoalUpdate::new(-30.0))).unwrap();
        drop(tx);
        let (_telemetry, records) = ChannelTelemetry::new(4);

        let start = Instant::now();
        let deadline = Some(start + Duration::from_millis(60));
        pump(&servo, &token, &messages, &records, Duration::from_millis(5), deadline).unwrap();

        assert!(start.elapsed() >= Duration::from_millis(60));
        assert!(token.is_stopped());
        assert_eq!(servo.pid().goal, -30.0);
        servo.stop().unwrap();
    }
}
