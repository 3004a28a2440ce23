#![allow(non_snake_case)]

// MTP数据集 - GetDeviceInfo/GetStorageInfo的解码与SendObjectInfo数据集的编码
use std::io::Cursor;

use crate::mtp::codec::{MtpRead, MtpWrite};
use crate::mtp::codes::FORMAT_UNDEFINED;
use crate::mtp::error::Error;

/// 设备信息数据集（GetDeviceInfo的数据阶段）
#[derive(Debug, Clone)]
pub struct MtpDeviceInfo {
    /// PTP标准版本号
    pub standard_version: u16,
    /// 厂商扩展ID
    pub vendor_extension_id: u32,
    /// MTP版本号
    pub mtp_version: u16,
    /// 厂商扩展描述
    pub extensions: String,
    /// 功能模式
    pub functional_mode: u16,
    /// 支持的操作列表
    pub operations: Vec<u16>,
    /// 支持的事件列表
    pub events: Vec<u16>,
    /// 支持的设备属性列表
    pub device_properties: Vec<u16>,
    /// 捕获格式列表
    pub capture_formats: Vec<u16>,
    /// 回放格式列表（级联据此迭代GetObjectPropsSupported）
    pub playback_formats: Vec<u16>,
    /// 制造商
    pub manufacturer: String,
    /// 型号
    pub model: String,
    /// 序列号
    pub serial: String,
}

impl MtpDeviceInfo {
    /// 从数据阶段载荷解码设备信息
    pub fn decode(buf: &[u8]) -> Result<MtpDeviceInfo, Error> {
        let mut cur = Cursor::new(buf);
        Ok(MtpDeviceInfo {
            standard_version: cur.read_mtp_u16()?,
            vendor_extension_id: cur.read_mtp_u32()?,
            mtp_version: cur.read_mtp_u16()?,
            extensions: cur.read_mtp_str()?.unwrap_or_default(),
            functional_mode: cur.read_mtp_u16()?,
            operations: cur.read_mtp_u16_vec()?,
            events: cur.read_mtp_u16_vec()?,
            device_properties: cur.read_mtp_u16_vec()?,
            capture_formats: cur.read_mtp_u16_vec()?,
            playback_formats: cur.read_mtp_u16_vec()?,
            manufacturer: cur.read_mtp_str()?.unwrap_or_default(),
            model: cur.read_mtp_str()?.unwrap_or_default(),
            serial: cur.read_mtp_str()?.unwrap_or_default(),
        })
    }
}

/// 存储信息数据集（GetStorageInfo的数据阶段）
///
/// 数据集中不含存储ID；它描述的是哪个存储由命令发出时的游标记录。
#[derive(Debug, Clone)]
pub struct MtpStorageInfo {
    pub storage_type: u16,
    pub filesystem_type: u16,
    pub access: u16,
    pub max_capacity: u64,
    pub free_space: u64,
    pub free_space_objects: u32,
    /// 存储描述（作为根节点名称）
    pub description: Option<String>,
    /// 卷标识
    pub volume_id: Option<String>,
}

impl MtpStorageInfo {
    /// 从数据阶段载荷解码存储信息
    pub fn decode(buf: &[u8]) -> Result<MtpStorageInfo, Error> {
        let mut cur = Cursor::new(buf);
        Ok(MtpStorageInfo {
            storage_type: cur.read_mtp_u16()?,
            filesystem_type: cur.read_mtp_u16()?,
            access: cur.read_mtp_u16()?,
            max_capacity: cur.read_mtp_u64()?,
            free_space: cur.read_mtp_u64()?,
            free_space_objects: cur.read_mtp_u32()?,
            description: cur.read_mtp_str()?,
            volume_id: cur.read_mtp_str()?,
        })
    }
}

/// 对象属性描述（GetObjectPropDesc的数据阶段开头），仅作诊断缓存
#[derive(Debug, Clone, Copy)]
pub struct MtpObjectPropDesc {
    pub prop_code: u16,
    pub data_type: u16,
    pub get_set: u8,
}

impl MtpObjectPropDesc {
    /// 解码属性描述的定长头部，表单部分忽略
    pub fn decode(buf: &[u8]) -> Result<MtpObjectPropDesc, Error> {
        let mut cur = Cursor::new(buf);
        Ok(MtpObjectPropDesc {
            prop_code: cur.read_mtp_u16()?,
            data_type: cur.read_mtp_u16()?,
            get_set: cur.read_mtp_u8()?,
        })
    }
}

/// SendObjectInfo的对象信息数据集
///
/// 缩略图与像素字段对普通文件上传固定为0。
#[derive(Debug, Clone)]
pub struct MtpObjectInfo {
    pub storage_id: u32,
    pub format: u16,
    pub compressed_size: u32,
    pub parent: u32,
    pub filename: String,
}

impl MtpObjectInfo {
    /// 以未定义格式(0x3000)描述一个待上传文件
    pub fn for_upload(storage_id: u32, parent: u32, size: u32, filename: &str) -> MtpObjectInfo {
        MtpObjectInfo {
            storage_id,
            format: FORMAT_UNDEFINED,
            compressed_size: size,
            parent,
            filename: filename.to_owned(),
        }
    }

    /// 编码为数据阶段载荷
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_mtp_u32(self.storage_id); // 存储
        out.write_mtp_u16(self.format); // 格式
        out.write_mtp_u16(0); // 保护状态
        out.write_mtp_u32(self.compressed_size); // 压缩后大小
        out.write_mtp_u16(0); // 缩略图格式
        out.write_mtp_u32(0); // 缩略图大小
        out.write_mtp_u32(0); // 缩略图宽度
        out.write_mtp_u32(0); // 缩略图高度
        out.write_mtp_u32(0); // 图像宽度
        out.write_mtp_u32(0); // 图像高度
        out.write_mtp_u32(0); // 位深度
        out.write_mtp_u32(self.parent); // 父对象
        out.write_mtp_u16(0); // 关联类型
        out.write_mtp_u32(0); // 关联描述
        out.write_mtp_u32(0); // 序列号
        out.write_mtp_str(&self.filename); // 文件名
        out.write_mtp_str(""); // 创建日期
        out.write_mtp_str(""); // 修改日期
        out.write_mtp_str(""); // 关键词
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mtp::test_util::{hex, DEVICE_INFO_PAYLOAD, STORAGE_INFO_PAYLOAD};

    #[test]
    fn test_decode_captured_device_info() {
        let info = MtpDeviceInfo::decode(&hex(DEVICE_INFO_PAYLOAD)).unwrap();
        assert_eq!(info.standard_version, 0x0064);
        assert_eq!(info.vendor_extension_id, 6);
        assert_eq!(info.mtp_version, 0x0064);
        assert_eq!(info.extensions, "microsoft.com: 1.0;");
        assert_eq!(info.functional_mode, 0);
        assert_eq!(info.operations.len(), 20);
        assert_eq!(info.operations[0], 0x1001);
        assert!(info.events.is_empty());
        assert_eq!(info.device_properties, vec![0xD402]);
        assert!(info.capture_formats.is_empty());
        assert_eq!(info.playback_formats, vec![0x3000, 0x3001]);
        assert_eq!(info.manufacturer, "PJRC");
        assert_eq!(info.model, "Teensy");
        assert_eq!(info.serial, "1.54 / MTP 1.0");
    }

    #[test]
    fn test_decode_storage_info() {
        // ST:4 FT:2 AC:0 Cap:256 Free:229 FreeO:0xFFFFFFFF NM:"QSPI" VOL:无
        let info = MtpStorageInfo::decode(&hex(STORAGE_INFO_PAYLOAD)).unwrap();
        assert_eq!(info.storage_type, 4);
        assert_eq!(info.filesystem_type, 2);
        assert_eq!(info.access, 0);
        assert_eq!(info.max_capacity, 256);
        assert_eq!(info.free_space, 229);
        assert_eq!(info.free_space_objects, 0xFFFF_FFFF);
        assert_eq!(info.description.as_deref(), Some("QSPI"));
        assert_eq!(info.volume_id, None);
    }

    #[test]
    fn test_decode_prop_desc() {
        let desc = MtpObjectPropDesc::decode(&hex("01 DC 06 00 00 00 00")).unwrap();
        assert_eq!(desc.prop_code, 0xDC01);
        assert_eq!(desc.data_type, 0x0006);
        assert_eq!(desc.get_set, 0);
    }

    #[test]
    fn test_object_info_encoding() {
        let info = MtpObjectInfo::for_upload(1, 0xFFFF_FFFF, 5, "T.TXT");
        let bytes = info.encode();
        let mut cur = std::io::Cursor::new(&bytes);
        assert_eq!(cur.read_mtp_u32().unwrap(), 1); // storage
        assert_eq!(cur.read_mtp_u16().unwrap(), 0x3000); // format
        assert_eq!(cur.read_mtp_u16().unwrap(), 0); // protection
        assert_eq!(cur.read_mtp_u32().unwrap(), 5); // size
        assert_eq!(cur.read_mtp_u16().unwrap(), 0); // thumb format
        // 缩略图大小/宽高、图像宽高、位深度，固定为0
        for _ in 0..6 {
            assert_eq!(cur.read_mtp_u32().unwrap(), 0);
        }
        assert_eq!(cur.read_mtp_u32().unwrap(), 0xFFFF_FFFF); // parent
        assert_eq!(cur.read_mtp_u16().unwrap(), 0); // association type
        assert_eq!(cur.read_mtp_u32().unwrap(), 0); // association desc
        assert_eq!(cur.read_mtp_u32().unwrap(), 0); // sequence number
        // 文件名"T.TXT"编码计数为6
        assert_eq!(cur.read_mtp_u8().unwrap(), 6);
    }
}
