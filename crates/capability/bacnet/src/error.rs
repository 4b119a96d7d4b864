//! 协议栈错误类型定义

/// 报文解码错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// 报文长度不足
    #[error("truncated frame")]
    Truncated,

    /// 不是 BACnet/IP 报文
    #[error("not a BACnet/IP frame (type {0:#04x})")]
    NotBip(u8),

    /// BVLC 长度字段与报文长度不符
    #[error("bvlc length mismatch: header {header}, datagram {actual}")]
    LengthMismatch { header: usize, actual: usize },

    /// 不支持的 NPDU 版本
    #[error("unsupported npdu version {0}")]
    NpduVersion(u8),

    /// 标签与预期不符
    #[error("unexpected tag: expected {0}")]
    UnexpectedTag(&'static str),

    /// 长度非法
    #[error("invalid length {0}")]
    InvalidLength(usize),

    /// 不支持的应用标签
    #[error("unsupported application tag {0}")]
    UnsupportedTag(u8),

    /// 字符串编码非法
    #[error("invalid character string")]
    InvalidString,

    /// PDU 类型与预期不符
    #[error("unexpected pdu type {0}")]
    UnexpectedPdu(u8),
}
