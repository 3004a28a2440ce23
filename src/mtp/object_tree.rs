#![allow(non_snake_case)]

// 对象树 - 以存储根为起点的内存对象森林，节点按设备分配的32位句柄索引
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use log::debug;

use crate::mtp::codes::FORMAT_ASSOCIATION;

/// 对象节点的共享引用；父节点经children持有强引用，反向链接为弱引用
pub type NodeRef = Rc<RefCell<ObjectNode>>;

/// 对象树节点
///
/// 存储根也是一个ObjectNode：其 `id == storage_id` 且没有父节点。
/// children 按设备枚举到达顺序排列，遍历是确定性的。
#[derive(Debug)]
pub struct ObjectNode {
    /// 设备分配的对象句柄，分配后不变
    pub id: u32,
    /// 所属存储ID
    pub storage_id: u32,
    /// 指向父节点的弱引用；存储根为空
    pub parent: Weak<RefCell<ObjectNode>>,
    /// 子节点序列，插入顺序与设备枚举顺序一致
    pub children: Vec<NodeRef>,
    /// MTP对象格式码（0x3001为关联/目录，0x3000为普通文件）
    pub format: u16,
    /// 对象名称
    pub name: Option<String>,
    /// 对象大小（字节）
    pub size: u64,
    /// MTP日期时间字符串，按设备原样保存
    pub modify_date: Option<String>,
}

impl ObjectNode {
    /// 分配一个空白节点
    pub fn new(id: u32, storage_id: u32, parent: Weak<RefCell<ObjectNode>>) -> NodeRef {
        Rc::new(RefCell::new(ObjectNode {
            id,
            storage_id,
            parent,
            children: Vec::new(),
            format: 0,
            name: None,
            size: 0,
            modify_date: None,
        }))
    }

    /// 此节点是否为存储根
    pub fn is_storage_root(&self) -> bool {
        self.id == self.storage_id && self.parent.upgrade().is_none()
    }
}

/// 在node自身及其子树中按句柄查找节点
pub fn find_node(node: &NodeRef, id: u32) -> Option<NodeRef> {
    if node.borrow().id == id {
        return Some(node.clone());
    }
    let children = node.borrow().children.clone();
    for child in &children {
        if let Some(found) = find_node(child, id) {
            return Some(found);
        }
    }
    None
}

/// 在一组节点的子树中按句柄查找
pub fn find_in_children(node: &NodeRef, id: u32) -> Option<NodeRef> {
    let children = node.borrow().children.clone();
    for child in &children {
        if let Some(found) = find_node(child, id) {
            return Some(found);
        }
    }
    None
}

/// 把child追加到parent的子序列末尾并建立反向链接
pub fn append_child(parent: &NodeRef, child: NodeRef) {
    {
        let mut c = child.borrow_mut();
        c.parent = Rc::downgrade(parent);
        c.storage_id = parent.borrow().storage_id;
    }
    parent.borrow_mut().children.push(child);
}

/// 把node从其父节点的子序列中摘除；返回是否找到了父链接
pub fn unlink_from_parent(node: &NodeRef) -> bool {
    let parent = node.borrow().parent.upgrade();
    match parent {
        Some(p) => {
            p.borrow_mut().children.retain(|c| !Rc::ptr_eq(c, node));
            node.borrow_mut().parent = Weak::new();
            true
        }
        None => false,
    }
}

/// 递归打印node及其子树到调试日志
pub fn dump_tree(node: &NodeRef, level: usize) {
    let n = node.borrow();
    debug!(
        "{}ID:{:08x} S:{:08x} F:{:04x} SZ:{} MD:{} {}",
        "  ".repeat(level),
        n.id,
        n.storage_id,
        n.format,
        n.size,
        n.modify_date.as_deref().unwrap_or("-"),
        n.name.as_deref().unwrap_or("-"),
    );
    for child in &n.children {
        dump_tree(child, level + 1);
    }
}

/// 存储根及其StorageInfo扩展字段
///
/// 仅顶层存储表中的根节点携带这些字段。
#[derive(Debug)]
pub struct StorageRoot {
    /// 根节点，`id == storage_id`，格式固定为关联
    pub node: NodeRef,
    pub storage_type: u16,
    pub filesystem_type: u16,
    pub access: u16,
    pub max_capacity: u64,
    pub free_space: u64,
    pub free_space_objects: u32,
    /// 卷标识字符串
    pub volume_id: Option<String>,
}

impl StorageRoot {
    /// 以存储ID建立一个空的存储根
    pub fn new(storage_id: u32) -> StorageRoot {
        let node = ObjectNode::new(storage_id, storage_id, Weak::new());
        node.borrow_mut().format = FORMAT_ASSOCIATION;
        StorageRoot {
            node,
            storage_type: 0,
            filesystem_type: 0,
            access: 0,
            max_capacity: 0,
            free_space: 0,
            free_space_objects: 0,
            volume_id: None,
        }
    }
}

/// 在全部存储根的森林中暴力查找句柄
pub fn find_in_forest(storages: &[StorageRoot], id: u32) -> Option<NodeRef> {
    for root in storages {
        if let Some(found) = find_node(&root.node, id) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_forest() -> Vec<StorageRoot> {
        // 存储1: 根 -> {0x11, 0x10 -> {0x0F}}
        let root = StorageRoot::new(1);
        let a = ObjectNode::new(0x11, 1, Weak::new());
        let b = ObjectNode::new(0x10, 1, Weak::new());
        let c = ObjectNode::new(0x0F, 1, Weak::new());
        append_child(&root.node, a);
        append_child(&root.node, b.clone());
        append_child(&b, c);
        vec![root, StorageRoot::new(2)]
    }

    #[test]
    fn test_storage_root_shape() {
        let root = StorageRoot::new(7);
        let n = root.node.borrow();
        assert_eq!(n.id, 7);
        assert_eq!(n.storage_id, 7);
        assert_eq!(n.format, FORMAT_ASSOCIATION);
        assert!(n.is_storage_root());
        assert!(n.children.is_empty());
    }

    #[test]
    fn test_find_in_forest() {
        let storages = sample_forest();
        assert!(find_in_forest(&storages, 0x0F).is_some());
        assert!(find_in_forest(&storages, 0x11).is_some());
        assert_eq!(find_in_forest(&storages, 1).unwrap().borrow().id, 1);
        assert!(find_in_forest(&storages, 0xAA).is_none());
    }

    #[test]
    fn test_children_keep_insertion_order() {
        let storages = sample_forest();
        let ids: Vec<u32> = storages[0].node.borrow().children.iter().map(|c| c.borrow().id).collect();
        assert_eq!(ids, vec![0x11, 0x10]);
    }

    #[test]
    fn test_append_child_links_both_directions() {
        let storages = sample_forest();
        let node = find_in_forest(&storages, 0x0F).unwrap();
        let parent = node.borrow().parent.upgrade().unwrap();
        assert_eq!(parent.borrow().id, 0x10);
        assert_eq!(node.borrow().storage_id, 1);
        // 父节点的children中恰好出现一次
        let count = parent
            .borrow()
            .children
            .iter()
            .filter(|c| Rc::ptr_eq(c, &node))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_unlink_from_parent_frees_subtree() {
        let storages = sample_forest();
        let node = find_in_forest(&storages, 0x10).unwrap();
        assert!(unlink_from_parent(&node));
        // 整个森林里不再能找到0x10与它的子节点0x0F
        assert!(find_in_forest(&storages, 0x10).is_none());
        assert!(find_in_forest(&storages, 0x0F).is_none());
        // node是最后一个强引用，释放后子树随之释放
        let weak_child = Rc::downgrade(&find_node(&node, 0x0F).unwrap());
        drop(node);
        assert!(weak_child.upgrade().is_none());
    }

    #[test]
    fn test_unlink_root_is_noop() {
        let storages = sample_forest();
        let root = storages[0].node.clone();
        assert!(!unlink_from_parent(&root));
        assert_eq!(root.borrow().children.len(), 2);
    }
}
