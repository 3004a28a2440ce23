#![allow(non_snake_case)]

// MTP数据编解码 - 小端标量与16位字符长度前缀字符串
use std::io::Cursor;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::mtp::error::Error;

/// MTP数据读取特性
///
/// 所有多字节标量按小端逐字节读取，u64不得假定自然对齐。
/// 读取越界统一映射为 [`Error::TruncatedPayload`]。
pub trait MtpRead: ReadBytesExt {
    fn read_mtp_u8(&mut self) -> Result<u8, Error> {
        Ok(self.read_u8()?)
    }

    fn read_mtp_u16(&mut self) -> Result<u16, Error> {
        Ok(self.read_u16::<LittleEndian>()?)
    }

    fn read_mtp_u32(&mut self) -> Result<u32, Error> {
        Ok(self.read_u32::<LittleEndian>()?)
    }

    fn read_mtp_u64(&mut self) -> Result<u64, Error> {
        Ok(self.read_u64::<LittleEndian>()?)
    }

    /// 读取u32计数前缀的向量
    #[inline(always)]
    fn read_mtp_vec<T: Sized, U: Fn(&mut Self) -> Result<T, Error>>(
        &mut self,
        func: U,
    ) -> Result<Vec<T>, Error> {
        let len = self.read_u32::<LittleEndian>()? as usize;
        (0..len).map(|_| func(self)).collect()
    }

    fn read_mtp_u16_vec(&mut self) -> Result<Vec<u16>, Error> {
        self.read_mtp_vec(|cur| cur.read_mtp_u16())
    }

    fn read_mtp_u32_vec(&mut self) -> Result<Vec<u32>, Error> {
        self.read_mtp_vec(|cur| cur.read_mtp_u32())
    }

    /// 读取MTP字符串
    ///
    /// 首字节为16位字符单元数，非零时计数包含结尾NUL；
    /// 取每个单元的低字节（Latin-1），返回时去掉结尾NUL。
    /// 计数为0表示字符串缺失，返回None。
    fn read_mtp_str(&mut self) -> Result<Option<String>, Error> {
        let count = self.read_u8()?;
        if count == 0 {
            return Ok(None);
        }
        let mut out = String::with_capacity(count as usize - 1);
        for _ in 0..(count - 1) {
            let unit = self.read_u16::<LittleEndian>()?;
            out.push((unit & 0x00FF) as u8 as char);
        }
        self.read_u16::<LittleEndian>()?; // 结尾NUL
        Ok(Some(out))
    }

    /// 检查是否已读取到数据流末尾
    fn expect_end(&mut self) -> Result<(), Error>;
}

impl<T: AsRef<[u8]>> MtpRead for Cursor<T> {
    fn expect_end(&mut self) -> Result<(), Error> {
        let len = self.get_ref().as_ref().len();
        if len as u64 != self.position() {
            Err(Error::MalformedContainer(format!(
                "载荷长度为{}字节，仅消费{}字节",
                len,
                self.position()
            )))
        } else {
            Ok(())
        }
    }
}

/// MTP数据写入特性
pub trait MtpWrite: WriteBytesExt {
    fn write_mtp_u8(&mut self, val: u8) {
        self.write_u8(val).ok();
    }

    fn write_mtp_u16(&mut self, val: u16) {
        self.write_u16::<LittleEndian>(val).ok();
    }

    fn write_mtp_u32(&mut self, val: u32) {
        self.write_u32::<LittleEndian>(val).ok();
    }

    fn write_mtp_u64(&mut self, val: u64) {
        self.write_u64::<LittleEndian>(val).ok();
    }

    /// 写入MTP字符串
    ///
    /// 非空时写 count = 字节数 + 1，每个字节提升为16位单元，再写16位NUL；
    /// 空串只写单个0字节，不跟载荷。
    fn write_mtp_str(&mut self, val: &str) {
        let bytes = val.as_bytes();
        if bytes.is_empty() {
            self.write_u8(0).ok();
            return;
        }
        self.write_u8(bytes.len() as u8 + 1).ok();
        for &b in bytes {
            self.write_u16::<LittleEndian>(b as u16).ok();
        }
        self.write_u16::<LittleEndian>(0).ok();
    }
}

impl<W: WriteBytesExt + ?Sized> MtpWrite for W {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_round_trip() {
        let mut buf = Vec::new();
        buf.write_mtp_u8(0xAB);
        buf.write_mtp_u16(0x1234);
        buf.write_mtp_u32(0xDEAD_BEEF);
        buf.write_mtp_u64(0x0102_0304_0506_0708);

        let mut cur = Cursor::new(&buf);
        assert_eq!(cur.read_mtp_u8().unwrap(), 0xAB);
        assert_eq!(cur.read_mtp_u16().unwrap(), 0x1234);
        assert_eq!(cur.read_mtp_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(cur.read_mtp_u64().unwrap(), 0x0102_0304_0506_0708);
        cur.expect_end().unwrap();
    }

    #[test]
    fn test_u64_unaligned_read() {
        // u64位于奇数偏移，必须逐字节读取
        let mut buf = vec![0u8; 1];
        buf.write_mtp_u64(0xFEDC_BA98_7654_3210);
        let mut cur = Cursor::new(&buf);
        cur.read_mtp_u8().unwrap();
        assert_eq!(cur.read_mtp_u64().unwrap(), 0xFEDC_BA98_7654_3210);
    }

    #[test]
    fn test_string_round_trip() {
        for s in ["T.TXT", "microsoft.com: 1.0;", "a"] {
            let mut buf = Vec::new();
            buf.write_mtp_str(s);
            // count = 字节数 + 1（含结尾NUL）
            assert_eq!(buf[0] as usize, s.len() + 1);
            assert_eq!(buf.len(), 1 + (s.len() + 1) * 2);
            let mut cur = Cursor::new(&buf);
            assert_eq!(cur.read_mtp_str().unwrap().as_deref(), Some(s));
            cur.expect_end().unwrap();
        }
    }

    #[test]
    fn test_empty_string_is_single_zero_byte() {
        let mut buf = Vec::new();
        buf.write_mtp_str("");
        assert_eq!(buf, vec![0u8]);
        let mut cur = Cursor::new(&buf);
        assert_eq!(cur.read_mtp_str().unwrap(), None);
    }

    #[test]
    fn test_u16_vec_round_trip() {
        let vals: Vec<u16> = vec![0x3000, 0x3001, 0xDC01];
        let mut buf = Vec::new();
        buf.write_mtp_u32(vals.len() as u32);
        for v in &vals {
            buf.write_mtp_u16(*v);
        }
        let mut cur = Cursor::new(&buf);
        assert_eq!(cur.read_mtp_u16_vec().unwrap(), vals);
    }

    #[test]
    fn test_truncated_read_fails() {
        let buf = [0x01u8, 0x02];
        let mut cur = Cursor::new(&buf);
        assert!(matches!(cur.read_mtp_u32(), Err(Error::TruncatedPayload)));
    }

    #[test]
    fn test_truncated_string_fails() {
        // 声称3个字符单元但只有1个
        let buf = [0x03u8, b'A', 0x00];
        let mut cur = Cursor::new(&buf);
        assert!(matches!(cur.read_mtp_str(), Err(Error::TruncatedPayload)));
    }
}
