#![allow(non_snake_case)]

use std::fmt;
use std::io;

use crate::mtp::codes::MtpResponseCode;

/// MTP会话错误类型
#[derive(Debug)]
pub enum Error {
    /// 容器头长度不一致（len < 12 或超出缓冲区）
    MalformedContainer(String),

    /// 编解码读取越过了容器数据区末尾
    TruncatedPayload,

    /// 传输层发送/排队失败
    Transport(String),

    /// 设备返回非 Ok 的响应码，可能是标准响应码或厂商定义的代码
    MtpResponse(u16),

    /// 事件环已满，事件被丢弃
    QueueFull,

    /// 节点或缓冲区分配失败
    AllocFailed,

    /// 本地文件读取失败，上传在发出任何命令前中止
    UploadReadFailed(io::Error),

    /// 属性值与此前记录的值冲突（记录后覆盖继续）
    ProtocolInvariant(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::MalformedContainer(ref e) => write!(f, "容器格式错误: {}", e),
            Error::TruncatedPayload => write!(f, "载荷被截断"),
            Error::Transport(ref e) => write!(f, "传输错误: {}", e),
            Error::MtpResponse(r) => {
                write!(f, "{} (0x{:04x})", MtpResponseCode::name(r).unwrap_or("未知响应"), r)
            }
            Error::QueueFull => write!(f, "事件队列已满"),
            Error::AllocFailed => write!(f, "内存分配失败"),
            Error::UploadReadFailed(ref e) => write!(f, "文件读取错误: {}", e),
            Error::ProtocolInvariant(ref e) => write!(f, "协议不变量冲突: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::UploadReadFailed(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::TruncatedPayload,
            _ => Error::Transport(format!("IO错误: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_eof_maps_to_truncated() {
        let e: Error = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(e, Error::TruncatedPayload));
    }

    #[test]
    fn test_response_display_names_code() {
        let msg = format!("{}", Error::MtpResponse(MtpResponseCode::DeviceBusy));
        assert!(msg.contains("0x2019"));
    }
}
