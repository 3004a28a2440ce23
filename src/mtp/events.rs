#![allow(non_snake_case)]

// 事件队列 - 设备到主机异步事件的有界环，单生产者（中断端点）单消费者（主循环）
use log::warn;

use crate::mtp::error::Error;
use crate::mtp::object_tree::NodeRef;

/// 待处理事件槽
#[derive(Debug, Clone, Default)]
pub struct EventSlot {
    /// 事件码
    pub event_code: u16,
    /// 对象或存储句柄（params[0]）
    pub id: u32,
    /// ObjectPropChanged携带的属性码（params[1]），其余事件为0
    pub prop_code: u32,
    /// 处理器填入的关联节点
    pub item_node: Option<NodeRef>,
    /// 处理器已将节点摘除，完成时由完成路径释放子树
    pub delete_node: bool,
}

/// 交给用户事件回调的只读视图
#[derive(Debug, Clone)]
pub struct EventView {
    pub event_code: u16,
    pub handle: u32,
    pub prop_code: u32,
    /// 事件关联的节点快照（若有）
    pub node: Option<NodeRef>,
}

impl EventView {
    pub(crate) fn from_slot(slot: &EventSlot) -> EventView {
        EventView {
            event_code: slot.event_code,
            handle: slot.id,
            prop_code: slot.prop_code,
            node: slot.item_node.clone(),
        }
    }
}

/// 有界事件环
///
/// 满时丢弃新事件并告警；丢弃不是致命的，下一次用户发起的枚举会重新追上。
#[derive(Debug)]
pub struct EventRing {
    slots: Vec<EventSlot>,
    head: usize,
    tail: usize,
}

impl EventRing {
    /// 建立容量为capacity的事件环（可用槽位为capacity - 1）
    pub fn new(capacity: usize) -> EventRing {
        let mut slots = Vec::new();
        slots.resize_with(capacity, EventSlot::default);
        EventRing { slots, head: 0, tail: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn len(&self) -> usize {
        (self.head + self.slots.len() - self.tail) % self.slots.len()
    }

    /// 入队一个事件；环满时返回 [`Error::QueueFull`]
    pub fn push(&mut self, event_code: u16, id: u32, prop_code: u32) -> Result<(), Error> {
        let next_head = (self.head + 1) % self.slots.len();
        if next_head == self.tail {
            warn!("事件队列已满，丢弃事件 {:#06x} id:{:#x}", event_code, id);
            return Err(Error::QueueFull);
        }
        self.slots[self.head] = EventSlot {
            event_code,
            id,
            prop_code,
            item_node: None,
            delete_node: false,
        };
        self.head = next_head;
        Ok(())
    }

    /// 队首事件（下一个待处理）
    pub fn front(&self) -> Option<&EventSlot> {
        if self.is_empty() {
            None
        } else {
            Some(&self.slots[self.tail])
        }
    }

    pub fn front_mut(&mut self) -> Option<&mut EventSlot> {
        if self.is_empty() {
            None
        } else {
            Some(&mut self.slots[self.tail])
        }
    }

    /// 弹出队首事件并回收其槽位
    pub fn pop_front(&mut self) -> Option<EventSlot> {
        if self.is_empty() {
            return None;
        }
        let slot = std::mem::take(&mut self.slots[self.tail]);
        self.tail = (self.tail + 1) % self.slots.len();
        Some(slot)
    }

    /// 清空全部待处理事件
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = EventSlot::default();
        }
        self.head = 0;
        self.tail = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_order() {
        let mut ring = EventRing::new(8);
        assert!(ring.is_empty());
        ring.push(0x4002, 1, 0).unwrap();
        ring.push(0x4003, 2, 0).unwrap();
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.front().unwrap().id, 1);
        assert_eq!(ring.pop_front().unwrap().event_code, 0x4002);
        assert_eq!(ring.pop_front().unwrap().event_code, 0x4003);
        assert!(ring.pop_front().is_none());
    }

    #[test]
    fn test_full_ring_drops_event() {
        let mut ring = EventRing::new(4);
        for i in 0..3 {
            ring.push(0x4002, i, 0).unwrap();
        }
        assert!(matches!(ring.push(0x4002, 99, 0), Err(Error::QueueFull)));
        // 腾出一个槽位后可以继续入队
        ring.pop_front();
        ring.push(0x4002, 100, 0).unwrap();
    }

    #[test]
    fn test_wrap_around() {
        let mut ring = EventRing::new(4);
        for round in 0u32..10 {
            ring.push(0x4002, round, 0).unwrap();
            assert_eq!(ring.pop_front().unwrap().id, round);
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn test_clear_resets_slots() {
        let mut ring = EventRing::new(4);
        ring.push(0x4003, 5, 0).unwrap();
        ring.clear();
        assert!(ring.is_empty());
        assert!(ring.front().is_none());
    }
}
