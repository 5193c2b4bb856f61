//! goal / gains 命令
//!
//! 向 stdout 打印一条线上消息，可以直接通过管道接到 `quadpid run`：
//!
//! ```bash
//! quadpid goal 45 | quadpid run --duration 5
//! ```

use anyhow::Result;
use clap::Args;
use quadpid_protocol::{GainUpdate, GoalUpdate, Message, SENTINEL, encode};

/// 目标角消息（msg_type 2）
#[derive(Args, Debug)]
pub struct GoalCommand {
    /// 目标角（度）；缺省或 999 表示复位
    #[arg(allow_hyphen_values = true)]
    pub value: Option<f64>,
}

impl GoalCommand {
    pub fn message(&self) -> Message {
        Message::Goal(GoalUpdate::new(self.value.unwrap_or(SENTINEL)))
    }

    pub fn execute(&self) -> Result<()> {
        println!("{}", encode(&self.message())?);
        Ok(())
    }
}

/// 增益消息（msg_type 4），未提供的字段填入哨兵值
#[derive(Args, Debug)]
pub struct GainsCommand {
    #[arg(long, allow_hyphen_values = true)]
    pub p: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    pub i: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    pub d: Option<f64>,
}

impl GainsCommand {
    pub fn message(&self) -> Message {
        Message::Gains(GainUpdate::with_sentinels(self.p, self.i, self.d))
    }

    pub fn execute(&self) -> Result<()> {
        println!("{}", encode(&self.message())?);
        Ok(())
    }
}
