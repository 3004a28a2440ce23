#![allow(non_snake_case)]

// 上传流水线 - 单对象缓冲发送的任务状态与本地文件读取抽象
use std::fs;
use std::io::{self, Read, Seek};

use crate::mtp::error::Error;

/// 本地文件读取抽象（外部协作者）
///
/// 上传前必须得知文件总大小：SendObjectInfo数据集中的
/// compressed_size要先于数据阶段发出。
pub trait FileReader {
    /// 文件大小（字节）
    fn size(&mut self) -> io::Result<u64>;

    /// 把整个文件读入buf（buf长度等于size）
    fn read_all(&mut self, buf: &mut [u8]) -> io::Result<()>;
}

impl FileReader for fs::File {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn read_all(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.rewind()?;
        self.read_exact(buf)
    }
}

/// 进行中的单对象上传任务
#[derive(Debug)]
pub struct UploadJob {
    /// 整个文件内容；最后一个数据块排队后即释放
    pub buffer: Vec<u8>,
    /// 已排队发送的字节数
    pub cursor: usize,
    /// SendObjectInfo响应分配的新对象句柄
    pub new_object_id: u32,
    /// 数据阶段是否已经开始（门控bulk-out完成回调的续传）
    pub streaming: bool,
}

impl UploadJob {
    /// 把整个文件读入内存，建立上传任务
    ///
    /// 分配失败返回 [`Error::AllocFailed`]，读取失败返回
    /// [`Error::UploadReadFailed`]，两者都发生在发出任何命令之前。
    pub fn from_reader(file: &mut dyn FileReader) -> Result<UploadJob, Error> {
        let size = file.size().map_err(Error::UploadReadFailed)? as usize;
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(size).map_err(|_| Error::AllocFailed)?;
        buffer.resize(size, 0);
        file.read_all(&mut buffer).map_err(Error::UploadReadFailed)?;
        Ok(UploadJob {
            buffer,
            cursor: 0,
            new_object_id: 0,
            streaming: false,
        })
    }

    /// 文件总大小
    pub fn total(&self) -> usize {
        self.buffer.len()
    }

    /// 尚未排队的字节数
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// 取出下一个至多max字节的数据块并推进游标
    pub fn next_chunk(&mut self, max: usize) -> Vec<u8> {
        let end = (self.cursor + max).min(self.buffer.len());
        let chunk = self.buffer[self.cursor..end].to_vec();
        self.cursor = end;
        chunk
    }

    /// 释放文件缓冲区（最后一个数据块排队后调用）
    pub fn release_buffer(&mut self) {
        self.buffer = Vec::new();
        self.cursor = 0;
    }
}

/// 测试与环回场景使用的内存文件
#[derive(Debug, Clone)]
pub struct MemoryFile {
    data: Vec<u8>,
}

impl MemoryFile {
    pub fn new(data: Vec<u8>) -> MemoryFile {
        MemoryFile { data }
    }
}

impl FileReader for MemoryFile {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn read_all(&mut self, buf: &mut [u8]) -> io::Result<()> {
        buf.copy_from_slice(&self.data);
        Ok(())
    }
}
