#![allow(non_snake_case)]

// MTP容器封帧 - 12字节头（长度/类型/代码/事务ID）加参数或载荷
use std::fmt::Write as _;
use std::io::Cursor;

use crate::mtp::codec::{MtpRead, MtpWrite};
use crate::mtp::codes::{ContainerKind, MtpEventCode, MtpOperation, MtpResponseCode};
use crate::mtp::error::Error;

/// 容器头大小(字节)
pub const CONTAINER_HEADER_SIZE: usize = 12;

/// 命令/响应/事件容器的最大参数个数
pub const MAX_PARAMS: usize = 5;

/// MTP容器
///
/// 命令、响应与事件容器的载荷是0到5个小端u32参数；
/// 数据容器的载荷是任意二进制数据。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    /// 容器类型
    pub kind: ContainerKind,
    /// 操作码、响应码或事件码，取决于容器类型
    pub code: u16,
    /// 此容器所属的事务ID
    pub tid: u32,
    /// 头部之后的载荷
    pub payload: Vec<u8>,
}

impl Container {
    /// 构造带参数的容器（命令/响应/事件）
    pub fn with_params(kind: ContainerKind, code: u16, tid: u32, params: &[u32]) -> Container {
        debug_assert!(params.len() <= MAX_PARAMS);
        let mut payload = Vec::with_capacity(params.len() * 4);
        for p in params {
            payload.write_mtp_u32(*p);
        }
        Container { kind, code, tid, payload }
    }

    /// 构造命令容器
    pub fn command(op: u16, tid: u32, params: &[u32]) -> Container {
        Container::with_params(ContainerKind::Command, op, tid, params)
    }

    /// 构造数据容器
    pub fn data(op: u16, tid: u32, payload: Vec<u8>) -> Container {
        Container { kind: ContainerKind::Data, code: op, tid, payload }
    }

    /// 容器总长度（头加载荷）
    pub fn len(&self) -> usize {
        CONTAINER_HEADER_SIZE + self.payload.len()
    }

    /// 从字节缓冲区解析容器
    ///
    /// `length` 小于头长或超出缓冲区时返回 [`Error::MalformedContainer`]。
    pub fn parse(buf: &[u8]) -> Result<Container, Error> {
        let mut cur = Cursor::new(buf);
        let len = cur.read_mtp_u32()? as usize;
        if len < CONTAINER_HEADER_SIZE {
            return Err(Error::MalformedContainer(format!("容器长度{}小于头长{}", len, CONTAINER_HEADER_SIZE)));
        }
        if len > buf.len() {
            return Err(Error::MalformedContainer(format!("容器长度{}超出缓冲区{}", len, buf.len())));
        }
        let kind_u16 = cur.read_mtp_u16()?;
        let kind = ContainerKind::from_u16(kind_u16)
            .ok_or_else(|| Error::MalformedContainer(format!("无效的容器类型 {:#x}", kind_u16)))?;
        let code = cur.read_mtp_u16()?;
        let tid = cur.read_mtp_u32()?;
        Ok(Container {
            kind,
            code,
            tid,
            payload: buf[CONTAINER_HEADER_SIZE..len].to_vec(),
        })
    }

    /// 编码为线上字节
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.write_mtp_u32(self.len() as u32);
        out.write_mtp_u16(self.kind as u16);
        out.write_mtp_u16(self.code);
        out.write_mtp_u32(self.tid);
        out.extend_from_slice(&self.payload);
        out
    }

    /// 将载荷按最多5个小端u32参数解读
    pub fn params(&self) -> Vec<u32> {
        let mut cur = Cursor::new(&self.payload);
        let n = (self.payload.len() / 4).min(MAX_PARAMS);
        (0..n).filter_map(|_| cur.read_mtp_u32().ok()).collect()
    }

    /// 指定下标的参数，缺失时返回0
    pub fn param(&self, index: usize) -> u32 {
        self.params().get(index).copied().unwrap_or(0)
    }

    /// 人类可读的容器描述，用于调试日志
    pub fn describe(&self) -> String {
        let mut out = String::new();
        match self.kind {
            ContainerKind::Undefined => out.push_str("UNDEF:"),
            ContainerKind::Command => out.push_str("CMD:"),
            ContainerKind::Data => out.push_str("DATA:"),
            ContainerKind::Response => out.push_str("RESP:"),
            ContainerKind::Event => out.push_str("EVENT:"),
        }
        let name = match self.kind {
            ContainerKind::Response => MtpResponseCode::name(self.code),
            ContainerKind::Event => MtpEventCode::name(self.code),
            _ => MtpOperation::name(self.code),
        };
        write!(out, "{:#06x}({})", self.code, name.unwrap_or("?")).ok();
        write!(out, " l:{} T:{:#x}", self.len(), self.tid).ok();
        if self.kind != ContainerKind::Data {
            for p in self.params() {
                write!(out, " {:#x}", p).ok();
            }
        }
        out
    }
}
