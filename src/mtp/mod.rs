// MTP协议核心模块 - 主机端发起方的编解码、状态机与对象树
pub mod codec;
pub mod codes;
pub mod container;
pub mod device_info;
pub mod error;
pub mod events;
pub mod object_tree;
pub mod session;
pub mod upload;

/// 存储表容量
pub const MAX_STORAGES: usize = 8;
/// 从GetDeviceInfo回放格式字段学习的对象格式表容量
pub const MAX_OBJECT_FORMATS: usize = 16;
/// 跨格式累计的对象属性清单容量
pub const MAX_OBJECT_PROPERTY_IDS: usize = 32;
/// 待处理事件环容量
pub const MAX_PENDING_EVENTS: usize = 8;

// 重导出常用类型
pub use codec::{MtpRead, MtpWrite};
pub use codes::ContainerKind;
pub use container::Container;
pub use device_info::{MtpDeviceInfo, MtpObjectInfo, MtpObjectPropDesc, MtpStorageInfo};
pub use error::Error;
pub use events::EventView;
pub use object_tree::{NodeRef, ObjectNode, StorageRoot};
pub use session::{MtpSession, SessionState, RESPONSE_PENDING, SESSION_ID};
pub use upload::{FileReader, MemoryFile, UploadJob};

#[cfg(test)]
pub(crate) mod test_util {
    /// 把空白分隔的十六进制串转成字节，测试里书写抓包数据用
    pub fn hex(s: &str) -> Vec<u8> {
        s.split_whitespace()
            .map(|b| u8::from_str_radix(b, 16).expect("非法的十六进制字节"))
            .collect()
    }

    /// 真机抓包：GetDeviceInfo数据阶段载荷
    pub const DEVICE_INFO_PAYLOAD: &str = "\
        64 00 06 00 00 00 64 00 \
        14 6D 00 69 00 63 00 72 00 6F 00 73 00 6F 00 66 00 74 00 2E 00 63 00 6F 00 6D 00 3A 00 20 00 31 00 2E 00 30 00 3B 00 00 00 \
        00 00 \
        14 00 00 00 01 10 02 10 03 10 04 10 05 10 07 10 08 10 09 10 0B 10 0C 10 0D 10 14 10 15 10 19 10 1A 10 1B 10 01 98 02 98 03 98 04 98 \
        00 00 00 00 \
        01 00 00 00 02 D4 \
        00 00 00 00 \
        02 00 00 00 00 30 01 30 \
        05 50 00 4A 00 52 00 43 00 00 00 \
        07 54 00 65 00 65 00 6E 00 73 00 79 00 00 00 \
        0F 31 00 2E 00 35 00 34 00 20 00 2F 00 20 00 4D 00 54 00 50 00 20 00 31 00 2E 00 30 00 00 00 \
        08 38 00 35 00 39 00 37 00 34 00 34 00 30 00 00 00";

    /// 真机抓包：GetStorageInfo数据阶段载荷（QSPI存储）
    pub const STORAGE_INFO_PAYLOAD: &str = "\
        04 00 02 00 00 00 00 01 00 00 00 00 00 00 E5 00 00 00 00 00 00 00 FF FF FF FF \
        05 51 00 53 00 50 00 49 00 00 00 00";

    #[test]
    fn test_hex_helper() {
        assert_eq!(hex("0A ff 00"), vec![0x0A, 0xFF, 0x00]);
    }
}
