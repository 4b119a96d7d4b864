//! 协议相关类型定义

use crate::error::ProtocolError;
use async_trait::async_trait;

/// Modbus 功能码（仅支持寄存器读取）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModbusFunctionCode {
    /// 读保持寄存器 (0x03)
    ReadHoldingRegisters = 3,
    /// 读输入寄存器 (0x04)
    ReadInputRegisters = 4,
}

impl TryFrom<u8> for ModbusFunctionCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(Self::ReadHoldingRegisters),
            4 => Ok(Self::ReadInputRegisters),
            other => Err(ProtocolError::ConfigParse(format!(
                "unsupported function code: {}",
                other
            ))),
        }
    }
}

/// 已建立的寄存器读取会话
#[async_trait]
pub trait RegisterSource: Send {
    /// 从 `address` 开始读取 `count` 个寄存器
    async fn read_registers(&mut self, address: u16, count: u16)
        -> Result<Vec<u16>, ProtocolError>;
}

/// 寄存器源连接器
#[async_trait]
pub trait RegisterConnector: Send + Sync {
    /// 建立新会话；连接失败返回 `ProtocolError::Connection`
    async fn connect(&self) -> Result<Box<dyn RegisterSource>, ProtocolError>;

    /// 用于日志的端点描述
    fn endpoint(&self) -> String;
}
