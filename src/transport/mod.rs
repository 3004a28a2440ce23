// 传输层抽象 - 核心消费的端点接口，以及USB静态图像类接口的端点角色解码
use log::{debug, info, warn};

use crate::mtp::error::Error;

/// 逻辑端点角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// 批量输入（设备到主机，命令回复与数据阶段）
    BulkIn,
    /// 批量输出（主机到设备，命令与数据阶段）
    BulkOut,
    /// 中断输入（设备到主机，事件通知）
    InterruptIn,
}

/// 传输层上送给核心的事件
///
/// 每个缓冲区是传输层按容器重组后的一次完整到达。
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// 批量输入端点到达的字节
    BulkIn(Vec<u8>),
    /// 一次批量输出完成（参数为已发送字节数）
    BulkOutDone(usize),
    /// 中断输入端点到达的字节
    InterruptIn(Vec<u8>),
}

/// 核心消费的传输接口
///
/// 实现负责端点发现、DMA缓冲区提交与接收双缓冲；核心只负责
/// 排队发送和消费完整的到达缓冲区。所有方法都在核心所在的
/// 逻辑线程上调用。
pub trait UsbTransport {
    /// 在指定端点上排队发送len字节（仅BulkOut有效）
    fn queue_send(&mut self, endpoint: Endpoint, data: &[u8]) -> Result<usize, Error>;

    /// 端点的最大包大小
    fn max_packet_size(&self, endpoint: Endpoint) -> usize;

    /// 取出下一个传输事件，无事件时返回None
    fn poll_event(&mut self) -> Option<TransportEvent>;
}

/// 已知按MTP处理的设备允许表
///
/// 这些设备的静态图像类描述符没有声明MTP但应按MTP对待；
/// product_id为0表示该厂商的任意产品。
pub const KNOWN_MTP_DEVICES: &[(u16, u16)] = &[(0x1949, 0x000C)];

/// 判断(vid, pid)是否在允许表中
pub fn is_known_mtp_device(vid: u16, pid: u16) -> bool {
    KNOWN_MTP_DEVICES
        .iter()
        .any(|&(v, p)| v == vid && (p == 0 || p == pid))
}

/// 从静态图像类接口描述符中解码出的端点角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StillImageEndpoints {
    /// 批量输入端点号
    pub bulk_in: u8,
    /// 批量输出端点地址
    pub bulk_out: u8,
    /// 中断输入端点号（事件通知，可缺失）
    pub interrupt_in: Option<u8>,
    /// 批量输入最大包大小
    pub bulk_in_size: u16,
    /// 批量输出最大包大小
    pub bulk_out_size: u16,
    /// 中断端点最大包大小
    pub event_size: u16,
    /// 中断端点轮询间隔
    pub event_interval: u8,
}

// USB描述符类型与静态图像类标识
const DESC_TYPE_ENDPOINT: u8 = 5;
const STILL_IMAGE_CLASS: u8 = 6;
const STILL_IMAGE_SUBCLASS: u8 = 1;
const STILL_IMAGE_PROTOCOL: u8 = 1;

/// 解析一个接口的描述符序列，决定是否按MTP认领并解码端点角色
///
/// descriptors从9字节接口描述符开始，后随端点描述符。接口不是
/// 静态图像类(6/1/1)时查询允许表；两个批量端点缺一则不认领。
pub fn parse_still_image_interface(vid: u16, pid: u16, descriptors: &[u8]) -> Option<StillImageEndpoints> {
    // 至少要有接口描述符与三个端点描述符
    if descriptors.len() < 9 + 7 + 7 + 7 {
        return None;
    }
    let num_endpoints = descriptors[4];
    if num_endpoints < 3 {
        return None;
    }

    // 很多设备不守规矩，所以接口类不匹配时还要查允许表
    if (descriptors[5] != STILL_IMAGE_CLASS
        || descriptors[6] != STILL_IMAGE_SUBCLASS
        || descriptors[7] != STILL_IMAGE_PROTOCOL)
        && !is_known_mtp_device(vid, pid)
    {
        return None;
    }

    let mut bulk_in = 0u8;
    let mut bulk_out = 0u8;
    let mut interrupt_in = None;
    let mut bulk_in_size = 0u16;
    let mut bulk_out_size = 0u16;
    let mut event_size = 0u16;
    let mut event_interval = 0u8;

    let mut p = 9usize;
    while p < descriptors.len() {
        let len = descriptors[p] as usize;
        if len < 4 || p + len > descriptors.len() {
            warn!("描述符越界，放弃认领: 偏移{} 长度{}", p, len);
            return None;
        }
        if descriptors[p + 1] == DESC_TYPE_ENDPOINT {
            if len < 7 {
                return None;
            }
            let addr = descriptors[p + 2];
            let attributes = descriptors[p + 3] & 0x03;
            let max_packet = u16::from(descriptors[p + 4]) | (u16::from(descriptors[p + 5]) << 8);
            let dir_in = (addr & 0x80) != 0;
            match attributes {
                2 => {
                    // 批量端点按方向分配角色
                    if dir_in {
                        debug!("发现批量输入端点: {:#04x} 包大小{}", addr, max_packet);
                        bulk_in = addr & 0x0F;
                        bulk_in_size = max_packet;
                    } else {
                        debug!("发现批量输出端点: {:#04x} 包大小{}", addr, max_packet);
                        bulk_out = addr;
                        bulk_out_size = max_packet;
                    }
                }
                3 if dir_in => {
                    debug!("发现中断端点: {:#04x} 包大小{}", addr, max_packet);
                    interrupt_in = Some(addr & 0x0F);
                    event_size = max_packet;
                    event_interval = descriptors[p + 6];
                }
                _ => {}
            }
        }
        p += len;
    }

    if bulk_in == 0 || bulk_out == 0 {
        return None;
    }
    if interrupt_in.is_none() {
        warn!("未找到中断端点，事件通知功能将不可用");
    }

    info!(
        "静态图像接口认领完成: IN={:#04x} OUT={:#04x} INTR={:?}",
        bulk_in, bulk_out, interrupt_in
    );
    Some(StillImageEndpoints {
        bulk_in,
        bulk_out,
        interrupt_in,
        bulk_in_size,
        bulk_out_size,
        event_size,
        event_interval,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // 接口描述符(class/sub/proto) + 批量IN/OUT + 中断IN
    fn sample_descriptors(class: u8, subclass: u8, protocol: u8) -> Vec<u8> {
        let mut d = vec![9, 4, 0, 0, 3, class, subclass, protocol, 0];
        d.extend_from_slice(&[7, 5, 0x81, 2, 0x00, 0x02, 0]); // bulk in, 512
        d.extend_from_slice(&[7, 5, 0x02, 2, 0x00, 0x02, 0]); // bulk out, 512
        d.extend_from_slice(&[7, 5, 0x83, 3, 0x40, 0x00, 8]); // interrupt in, 64
        d
    }

    #[test]
    fn test_claims_still_image_interface() {
        let eps = parse_still_image_interface(0x04A9, 0x326F, &sample_descriptors(6, 1, 1)).unwrap();
        assert_eq!(eps.bulk_in, 1);
        assert_eq!(eps.bulk_out, 0x02);
        assert_eq!(eps.interrupt_in, Some(3));
        assert_eq!(eps.bulk_in_size, 512);
        assert_eq!(eps.bulk_out_size, 512);
        assert_eq!(eps.event_size, 64);
        assert_eq!(eps.event_interval, 8);
    }

    #[test]
    fn test_rejects_other_class_unless_quirked() {
        let vendor_specific = sample_descriptors(0xFF, 0, 0);
        assert!(parse_still_image_interface(0x04A9, 0x326F, &vendor_specific).is_none());
        // 允许表中的设备即使类不匹配也认领
        assert!(parse_still_image_interface(0x1949, 0x000C, &vendor_specific).is_some());
        assert!(parse_still_image_interface(0x1949, 0x0BAD, &vendor_specific).is_none());
    }

    #[test]
    fn test_quirk_product_zero_means_any() {
        assert!(is_known_mtp_device(0x1949, 0x000C));
        assert!(!is_known_mtp_device(0x1949, 0x0001));
        assert!(!is_known_mtp_device(0x0001, 0x000C));
    }

    #[test]
    fn test_rejects_missing_bulk_endpoint() {
        // 只有批量IN与中断，没有批量OUT
        let mut d = vec![9, 4, 0, 0, 3, 6, 1, 1, 0];
        d.extend_from_slice(&[7, 5, 0x81, 2, 0x00, 0x02, 0]);
        d.extend_from_slice(&[7, 5, 0x83, 3, 0x40, 0x00, 8]);
        d.extend_from_slice(&[7, 5, 0x84, 3, 0x40, 0x00, 8]);
        assert!(parse_still_image_interface(0, 0, &d).is_none());
    }

    #[test]
    fn test_rejects_truncated_descriptors() {
        let mut d = sample_descriptors(6, 1, 1);
        d.truncate(20);
        assert!(parse_still_image_interface(0, 0, &d).is_none());
        // 内部长度越过缓冲区末尾
        let mut d2 = sample_descriptors(6, 1, 1);
        let n = d2.len();
        d2[n - 7] = 60;
        assert!(parse_still_image_interface(0, 0, &d2).is_none());
    }
}
