//! 驱动层错误类型定义

use thiserror::Error;

/// 硬件抽象层错误
///
/// 由 [`EncoderInput`](crate::hal::EncoderInput) 与 [`MotorDriver`](crate::hal::MotorDriver)
/// 的实现返回。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HardwareError {
    /// 输入线读取失败
    #[error("Line read failed: {0}")]
    Read(String),

    /// 驱动板写入失败
    #[error("Driver write failed: {0}")]
    Write(String),

    /// 设备已断开
    #[error("Device disconnected")]
    Disconnected,
}

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 编码器读取故障（致命，读取线程退出）
    #[error("Hardware read fault: {0}")]
    HardwareReadFault(#[source] HardwareError),

    /// 电机写入故障（非致命，控制循环继续）
    #[error("Driver write fault: {0}")]
    DriverWriteFault(#[source] HardwareError),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 后台线程 panic
    #[error("Thread panicked: {0}")]
    ThreadPanicked(String),

    /// 读取线程已经启动
    #[error("Position tracker already started")]
    AlreadyStarted,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 测试 DriverError 的 Display 实现
    #[test]
    fn test_driver_error_display() {
        let err = DriverError::HardwareReadFault(HardwareError::Read("gpio17".to_string()));
        let msg = format!("{}", err);
        assert!(msg.contains("Hardware read fault") && msg.contains("gpio17"));

        let err = DriverError::DriverWriteFault(HardwareError::Disconnected);
        assert_eq!(format!("{}", err), "Driver write fault: Device disconnected");

        let err = DriverError::Config("period_us must be > 0".to_string());
        assert!(format!("{}", err).contains("period_us"));

        let err = DriverError::AlreadyStarted;
        assert_eq!(format!("{}", err), "Position tracker already started");
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error as _;

        let err = DriverError::HardwareReadFault(HardwareError::Disconnected);
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Device disconnected"));
    }
}
