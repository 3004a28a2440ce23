#![allow(non_snake_case)]

// MTP会话状态机 - 事务引擎、引导级联、按需枚举、事件驱动与上传驱动
//
// 整个核心运行在单一逻辑线程上：进展只发生在poll()与三个传输回调
// (rx_data/tx_data/event_data)里，核心从不阻塞，而是把状态留在
// last_op / prop_job / pending_events_active 中等待下一次回调。
use std::collections::VecDeque;
use std::io::Cursor;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::mtp::codec::{MtpRead, MtpWrite};
use crate::mtp::codes::{
    ContainerKind, MtpDeviceProperty, MtpEventCode, MtpObjectProperty, MtpOperation,
    MtpResponseCode, HANDLE_ROOT,
};
use crate::mtp::container::{Container, CONTAINER_HEADER_SIZE};
use crate::mtp::device_info::{MtpDeviceInfo, MtpObjectInfo, MtpObjectPropDesc, MtpStorageInfo};
use crate::mtp::error::Error;
use crate::mtp::events::{EventRing, EventView};
use crate::mtp::object_tree::{
    dump_tree, find_in_children, find_in_forest, unlink_from_parent, NodeRef, ObjectNode,
    StorageRoot,
};
use crate::mtp::upload::{FileReader, UploadJob};
use crate::mtp::{MAX_OBJECT_FORMATS, MAX_OBJECT_PROPERTY_IDS, MAX_PENDING_EVENTS, MAX_STORAGES};
use crate::transport::{Endpoint, TransportEvent, UsbTransport};

/// 打开会话使用的固定会话ID
pub const SESSION_ID: u32 = 42;

/// last_response的在途哨兵，同时也是同步删除的超时返回值
pub const RESPONSE_PENDING: u32 = 0xFFFF_FFFF;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// 未连接
    Detached,
    /// 接口已认领，引导未开始
    Claimed,
    /// 引导级联进行中
    BootstrapInProgress,
    /// 引导完成，可接受枚举/删除/上传
    Ready,
}

/// 属性抓取任务的发起方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchOrigin {
    /// 按需枚举流水线
    Enumeration,
    /// ObjectAdded事件驱动
    Event,
}

/// 单槽属性抓取任务
///
/// 枚举流水线与ObjectAdded事件共用同一条GetObjectPropValue路径；
/// 任何时刻至多一个任务在跑，谁先启动谁先跑完。
#[derive(Debug)]
struct PropFetchJob {
    /// 等待抓取属性的节点，按到达顺序
    nodes: VecDeque<NodeRef>,
    /// 当前节点在object_property_ids中的进度
    index: usize,
    origin: FetchOrigin,
}

/// 事件完成回调
pub type EventCallback = Box<dyn FnMut(&EventView)>;

/// MTP主机端会话
///
/// 全部状态封装在会话值中，多台设备可各自独立驱动。
pub struct MtpSession<T: UsbTransport> {
    transport: T,
    state: SessionState,

    // 事务引擎
    session_id: u32,
    transaction_id: u32,
    last_op: u16,
    last_response: u32,

    // 设备描述
    device_info: Option<MtpDeviceInfo>,
    friendly_name: Option<String>,

    // 会话级表
    storages: Vec<StorageRoot>,
    object_formats: Vec<u16>,
    object_property_ids: Vec<u16>,
    prop_descs: Vec<MtpObjectPropDesc>,

    // 引导级联游标（也复用于格式与属性描述的迭代）
    setup_complete: bool,
    store_info_index: usize,

    // 枚举与共享属性抓取
    enum_node: Option<NodeRef>,
    prop_job: Option<PropFetchJob>,

    // 事件队列
    events: EventRing,
    pending_events_active: bool,
    event_callback: Option<EventCallback>,

    // 上传
    upload: Option<UploadJob>,
}

impl<T: UsbTransport> MtpSession<T> {
    /// 在已认领的传输之上建立会话
    pub fn new(transport: T) -> MtpSession<T> {
        MtpSession {
            transport,
            state: SessionState::Claimed,
            session_id: 0,
            transaction_id: 0,
            last_op: 0,
            last_response: 0,
            device_info: None,
            friendly_name: None,
            storages: Vec::new(),
            object_formats: Vec::new(),
            object_property_ids: Vec::new(),
            prop_descs: Vec::new(),
            setup_complete: false,
            store_info_index: 0,
            enum_node: None,
            prop_job: None,
            events: EventRing::new(MAX_PENDING_EVENTS),
            pending_events_active: false,
            event_callback: None,
            upload: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn setup_complete(&self) -> bool {
        self.setup_complete
    }

    pub fn transaction_id(&self) -> u32 {
        self.transaction_id
    }

    /// 最近一次响应码；在途时为 [`RESPONSE_PENDING`]
    pub fn last_response(&self) -> u32 {
        self.last_response
    }

    pub fn device_info(&self) -> Option<&MtpDeviceInfo> {
        self.device_info.as_ref()
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.friendly_name.as_deref()
    }

    /// 各格式累计的对象属性抓取清单
    pub fn object_property_ids(&self) -> &[u16] {
        &self.object_property_ids
    }

    /// 对象属性描述的诊断缓存
    pub fn object_prop_descs(&self) -> &[MtpObjectPropDesc] {
        &self.prop_descs
    }

    /// 存储列表的只读快照
    pub fn list_storages(&self) -> &[StorageRoot] {
        &self.storages
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// 设置事件完成回调
    pub fn set_event_callback<F: FnMut(&EventView) + 'static>(&mut self, cb: F) {
        self.event_callback = Some(Box::new(cb));
    }

    /// 连接设备并启动引导级联
    ///
    /// GetDeviceInfo以初始事务ID 0发出，OpenSession复用该ID，
    /// 之后每条命令发送前自增。
    pub fn attach(&mut self) -> Result<(), Error> {
        self.reset_session_state();
        self.state = SessionState::BootstrapInProgress;
        info!("开始MTP会话引导");
        self.send_command(MtpOperation::GetDeviceInfo, &[])
    }

    /// 断开连接：释放全部对象树、重置计数器、清空待处理事件
    ///
    /// detach是唯一的取消原语；此后到达的响应因attached检查被丢弃。
    pub fn detach(&mut self) {
        info!("断开MTP会话");
        self.state = SessionState::Detached;
        self.reset_session_state();
    }

    fn reset_session_state(&mut self) {
        self.session_id = 0;
        self.transaction_id = 0;
        self.last_op = 0;
        self.last_response = 0;
        self.device_info = None;
        self.friendly_name = None;
        self.storages.clear(); // 各棵树随所有权深释放
        self.object_formats.clear();
        self.object_property_ids.clear();
        self.prop_descs.clear();
        self.setup_complete = false;
        self.store_info_index = 0;
        self.enum_node = None;
        self.prop_job = None;
        self.events.clear();
        self.pending_events_active = false;
        self.upload = None;
    }

    /// 驱动传输回调；可安全地从主事件循环反复调用
    pub fn poll(&mut self) {
        while let Some(ev) = self.transport.poll_event() {
            if self.state == SessionState::Detached {
                continue; // detach后到达的回调一律丢弃
            }
            match ev {
                TransportEvent::BulkIn(buf) => self.rx_data(&buf),
                TransportEvent::BulkOutDone(len) => self.tx_data(len),
                TransportEvent::InterruptIn(buf) => self.event_data(&buf),
            }
        }
    }

    /// 枚举指定下标存储的顶层列表
    pub fn enumerate_storage(&mut self, index: usize) -> Result<(), Error> {
        let node = match self.storages.get(index) {
            Some(root) => root.node.clone(),
            None => return Err(Error::MtpResponse(MtpResponseCode::InvalidStorageId)),
        };
        self.enumerate_node(&node)
    }

    /// 枚举一个目录节点的子对象
    ///
    /// 存储根用通配句柄0xFFFFFFFF请求顶层列表，其余节点用自身句柄。
    pub fn enumerate_node(&mut self, node: &NodeRef) -> Result<(), Error> {
        self.ensure_idle()?;
        let (storage_id, id) = {
            let n = node.borrow();
            (n.storage_id, n.id)
        };
        let parent = if id == storage_id { HANDLE_ROOT } else { id };
        self.enum_node = Some(node.clone());
        self.transaction_id += 1;
        self.send_command(MtpOperation::GetObjectHandles, &[storage_id, 0, parent])
    }

    /// 同步删除对象
    ///
    /// 自旋调用poll()直到响应到达或超出单调时钟期限；
    /// 返回最终响应码，超时返回哨兵0xFFFFFFFF。
    pub fn delete_object(&mut self, id: u32, format: u32, timeout_ms: u64) -> u32 {
        if self.ensure_idle().is_err() {
            return u32::from(MtpResponseCode::DeviceBusy);
        }
        self.transaction_id += 1;
        if self.send_command(MtpOperation::DeleteObject, &[id, format]).is_err() {
            return RESPONSE_PENDING;
        }
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        while self.last_response == RESPONSE_PENDING && Instant::now() < deadline {
            self.poll();
        }
        if self.last_response == RESPONSE_PENDING {
            warn!("删除对象 {:#x} 超时", id);
            return RESPONSE_PENDING;
        }
        self.last_response
    }

    /// 上传单个文件
    ///
    /// 整个文件先读入内存（数据集中的compressed_size必须先于数据阶段
    /// 确定），随后发出SendObjectInfo命令与数据集。后续推进由响应与
    /// bulk-out完成回调驱动；新对象句柄经合成的ObjectAdded事件送达。
    pub fn send_file(
        &mut self,
        storage: u32,
        parent: u32,
        name: &str,
        file: &mut dyn FileReader,
    ) -> Result<(), Error> {
        self.ensure_idle()?;
        if self.upload.is_some() {
            warn!("已有上传进行中，拒绝新上传");
            return Err(Error::MtpResponse(MtpResponseCode::DeviceBusy));
        }
        let job = UploadJob::from_reader(file)?; // 读失败时尚未发出任何命令
        let size = job.total() as u32;
        info!("上传 {} ({}字节) 到存储{:#x} 父对象{:#x}", name, size, storage, parent);
        self.upload = Some(job);
        self.transaction_id += 1;
        let dataset = MtpObjectInfo::for_upload(storage, parent, size, name).encode();
        let sent = self
            .send_command(MtpOperation::SendObjectInfo, &[storage, parent])
            .and_then(|_| self.send_data(MtpOperation::SendObjectInfo, dataset));
        if let Err(e) = sent {
            self.upload = None;
            return Err(e);
        }
        Ok(())
    }

    /// 发送CloseSession
    pub fn close_session(&mut self) -> Result<(), Error> {
        self.ensure_idle()?;
        self.transaction_id += 1;
        self.send_command(MtpOperation::CloseSession, &[])
    }

    /// 把全部存储树打印到调试日志
    pub fn log_tree(&self) {
        for root in &self.storages {
            dump_tree(&root.node, 0);
        }
    }

    // ===== 事务引擎 =====

    fn awaiting_response(&self) -> bool {
        self.last_response == RESPONSE_PENDING
    }

    // bulk-out由last_op门控串行化：上一命令未收响应时不排队新命令
    fn ensure_idle(&self) -> Result<(), Error> {
        if self.awaiting_response() {
            warn!("命令 {:#06x} 尚未完成，拒绝新请求", self.last_op);
            return Err(Error::MtpResponse(MtpResponseCode::DeviceBusy));
        }
        Ok(())
    }

    fn send_command(&mut self, op: u16, params: &[u32]) -> Result<(), Error> {
        let c = Container::command(op, self.transaction_id, params);
        debug!("C-> {}", c.describe());
        self.transport
            .queue_send(Endpoint::BulkOut, &c.encode())
            .map_err(|e| {
                error!("命令发送失败: {}", e);
                e
            })?;
        self.last_op = op;
        self.last_response = RESPONSE_PENDING;
        Ok(())
    }

    fn send_data(&mut self, op: u16, payload: Vec<u8>) -> Result<(), Error> {
        let c = Container::data(op, self.transaction_id, payload);
        debug!("d-> {}", c.describe());
        self.transport.queue_send(Endpoint::BulkOut, &c.encode())?;
        Ok(())
    }

    // ===== 接收分发 =====

    fn rx_data(&mut self, buf: &[u8]) {
        let c = match Container::parse(buf) {
            Ok(c) => c,
            Err(e) => {
                // 端点保持存活，仅丢弃本容器
                warn!("丢弃批量输入容器: {}", e);
                return;
            }
        };
        debug!("C<- {}", c.describe());
        match c.kind {
            ContainerKind::Data => self.process_data(&c),
            ContainerKind::Response => self.process_response(&c),
            _ => warn!("批量输入收到意外容器: {}", c.describe()),
        }
    }

    fn process_data(&mut self, c: &Container) {
        // 数据阶段总是配对last_op的数据
        if c.code != self.last_op {
            warn!("孤立数据容器(当前操作 {:#06x}): {}", self.last_op, c.describe());
            return;
        }
        if c.tid != self.transaction_id {
            debug!("数据容器事务ID不匹配: 收到{:#x}，当前{:#x}", c.tid, self.transaction_id);
        }
        let result = match c.code {
            MtpOperation::GetDeviceInfo => self.process_device_info(&c.payload),
            MtpOperation::GetDevicePropDesc => self.process_device_prop_desc(&c.payload),
            MtpOperation::GetStorageIds => self.process_storage_ids(&c.payload),
            MtpOperation::GetStorageInfo => self.process_storage_info(&c.payload),
            MtpOperation::GetObjectPropsSupported => self.process_props_supported(&c.payload),
            MtpOperation::GetObjectPropDesc => self.process_prop_desc(&c.payload),
            MtpOperation::GetObjectHandles => self.process_object_handles(&c.payload),
            MtpOperation::GetObjectPropValue => self.process_prop_value(&c.payload),
            _ => Ok(()),
        };
        if let Err(e) = result {
            // 解码越界：当前命令中止，树保持原样
            error!("数据阶段解析失败({:#06x}): {}", c.code, e);
        }
    }

    /// 响应关闭当前事务并触发级联的下一步
    fn process_response(&mut self, c: &Container) {
        if !self.awaiting_response() {
            warn!("孤立响应，丢弃: {}", c.describe());
            return;
        }
        if c.tid != self.transaction_id {
            debug!("响应事务ID不匹配: 收到{:#x}，当前{:#x}", c.tid, self.transaction_id);
        }
        self.last_response = u32::from(c.code);

        if c.code != MtpResponseCode::Ok {
            // 级联步骤中止；不回滚，允许留下部分状态
            warn!("操作 {:#06x} 返回 {}", self.last_op, Error::MtpResponse(c.code));
            self.abort_current_step();
            self.start_process_next_event();
            return;
        }

        let step = match self.last_op {
            MtpOperation::GetDeviceInfo => {
                // 打开会话；答案是42
                self.session_id = SESSION_ID;
                self.send_command(MtpOperation::OpenSession, &[SESSION_ID])
            }
            MtpOperation::OpenSession => {
                self.transaction_id += 1;
                self.send_command(
                    MtpOperation::GetDevicePropDesc,
                    &[u32::from(MtpDeviceProperty::DeviceFriendlyName)],
                )
            }
            MtpOperation::GetDevicePropDesc => {
                self.transaction_id += 1;
                self.send_command(MtpOperation::GetStorageIds, &[])
            }
            MtpOperation::GetStorageIds => {
                if self.storages.is_empty() {
                    self.after_storage_infos()
                } else {
                    self.store_info_index = 0;
                    self.transaction_id += 1;
                    let id = self.storages[0].node.borrow().id;
                    self.send_command(MtpOperation::GetStorageInfo, &[id])
                }
            }
            MtpOperation::GetStorageInfo => {
                self.store_info_index += 1;
                if self.store_info_index < self.storages.len() {
                    self.transaction_id += 1;
                    let id = self.storages[self.store_info_index].node.borrow().id;
                    self.send_command(MtpOperation::GetStorageInfo, &[id])
                } else {
                    self.after_storage_infos()
                }
            }
            MtpOperation::GetObjectPropsSupported => {
                self.store_info_index += 1;
                if self.store_info_index < self.object_formats.len() {
                    self.transaction_id += 1;
                    let fmt = self.object_formats[self.store_info_index];
                    self.send_command(MtpOperation::GetObjectPropsSupported, &[u32::from(fmt)])
                } else {
                    self.after_props_supported()
                }
            }
            MtpOperation::GetObjectPropDesc => {
                self.store_info_index += 1;
                if self.store_info_index < self.object_property_ids.len() {
                    self.transaction_id += 1;
                    let prop = self.object_property_ids[self.store_info_index];
                    self.send_command(MtpOperation::GetObjectPropDesc, &[u32::from(prop)])
                } else {
                    self.finish_bootstrap();
                    Ok(())
                }
            }
            MtpOperation::GetObjectHandles => self.start_enum_prop_fetch(),
            MtpOperation::GetObjectPropValue => self.advance_prop_fetch(),
            MtpOperation::SendObjectInfo => self.begin_send_object(c.param(2)),
            MtpOperation::SendObject => {
                if let Some(job) = self.upload.take() {
                    info!("上传完成，新对象 {:#x}", job.new_object_id);
                    // 合成ObjectAdded事件，让对象树收敛
                    self.add_event(MtpEventCode::ObjectAdded, job.new_object_id, 0);
                }
                Ok(())
            }
            MtpOperation::CloseSession => {
                info!("会话已关闭");
                self.session_id = 0;
                Ok(())
            }
            op => {
                debug!("操作 {:#06x} 完成", op);
                Ok(())
            }
        };
        if let Err(e) = step {
            error!("级联下一步发送失败: {}", e);
        }
        self.start_process_next_event();
    }

    /// 非OK响应后收拾当前步骤的游标
    fn abort_current_step(&mut self) {
        match self.last_op {
            MtpOperation::GetObjectHandles | MtpOperation::GetObjectPropValue => {
                let origin = self.prop_job.as_ref().map(|j| j.origin);
                self.prop_job = None;
                self.enum_node = None;
                if origin == Some(FetchOrigin::Event) && self.pending_events_active {
                    // 事件带着已获知的信息完成，环得以推进
                    self.complete_processing_event(false);
                }
            }
            MtpOperation::SendObjectInfo | MtpOperation::SendObject => {
                warn!("上传中止");
                self.upload = None;
            }
            _ => {} // 引导级联停在当前步骤，局部状态保留
        }
    }

    // ===== 引导级联的衔接点 =====

    fn after_storage_infos(&mut self) -> Result<(), Error> {
        if self.object_formats.is_empty() {
            return self.after_props_supported();
        }
        self.store_info_index = 0; // 游标复用于格式迭代
        self.transaction_id += 1;
        let fmt = self.object_formats[0];
        self.send_command(MtpOperation::GetObjectPropsSupported, &[u32::from(fmt)])
    }

    fn after_props_supported(&mut self) -> Result<(), Error> {
        if self.object_property_ids.is_empty() {
            self.finish_bootstrap();
            return Ok(());
        }
        self.store_info_index = 0; // 游标复用于属性描述迭代
        self.transaction_id += 1;
        let prop = self.object_property_ids[0];
        self.send_command(MtpOperation::GetObjectPropDesc, &[u32::from(prop)])
    }

    fn finish_bootstrap(&mut self) {
        self.setup_complete = true;
        self.state = SessionState::Ready;
        info!(
            "MTP会话引导完成: {}个存储, {}个格式, {}个对象属性",
            self.storages.len(),
            self.object_formats.len(),
            self.object_property_ids.len()
        );
    }

    // ===== 数据阶段解析 =====

    fn process_device_info(&mut self, payload: &[u8]) -> Result<(), Error> {
        let info = MtpDeviceInfo::decode(payload)?;
        info!("设备: {} {} ({})", info.manufacturer, info.model, info.serial);
        debug!("扩展: {} 模式: {}", info.extensions, info.functional_mode);
        self.object_formats.clear();
        for &fmt in info.playback_formats.iter().take(MAX_OBJECT_FORMATS) {
            self.object_formats.push(fmt);
        }
        if info.playback_formats.len() > MAX_OBJECT_FORMATS {
            warn!("回放格式数量{}超过上限{}，截断", info.playback_formats.len(), MAX_OBJECT_FORMATS);
        }
        self.device_info = Some(info);
        Ok(())
    }

    fn process_device_prop_desc(&mut self, payload: &[u8]) -> Result<(), Error> {
        let mut cur = Cursor::new(payload);
        let code = cur.read_mtp_u16()?;
        let data_type = cur.read_mtp_u16()?;
        let get_set = cur.read_mtp_u8()?;
        match code {
            MtpDeviceProperty::DeviceFriendlyName => {
                // 出厂默认值即友好名称
                self.friendly_name = cur.read_mtp_str()?;
                info!("设备友好名称: {}", self.friendly_name.as_deref().unwrap_or("-"));
            }
            _ => debug!(
                "意外的设备属性描述 code:{:#06x} type:{:#x} rw:{:#x}",
                code, data_type, get_set
            ),
        }
        Ok(())
    }

    fn process_storage_ids(&mut self, payload: &[u8]) -> Result<(), Error> {
        let mut cur = Cursor::new(payload);
        let ids = cur.read_mtp_u32_vec()?;
        if ids.len() > MAX_STORAGES {
            warn!("存储数量{}超过上限{}，截断", ids.len(), MAX_STORAGES);
        }
        self.storages.clear();
        for &id in ids.iter().take(MAX_STORAGES) {
            // 根节点格式固定为关联，当作目录对待
            self.storages.push(StorageRoot::new(id));
        }
        info!("存储ID: {:x?}", ids);
        Ok(())
    }

    fn process_storage_info(&mut self, payload: &[u8]) -> Result<(), Error> {
        let info = MtpStorageInfo::decode(payload)?;
        let index = self.store_info_index;
        let root = match self.storages.get_mut(index) {
            Some(root) => root,
            None => {
                warn!("存储信息游标越界: {}", index);
                return Ok(());
            }
        };
        debug!(
            "存储信息[{}] id:{:#x} ST:{:#x} FT:{:#x} AC:{:#x} Cap:{} Free:{} FreeO:{} NM:{} VOL:{}",
            index,
            root.node.borrow().id,
            info.storage_type,
            info.filesystem_type,
            info.access,
            info.max_capacity,
            info.free_space,
            info.free_space_objects,
            info.description.as_deref().unwrap_or("-"),
            info.volume_id.as_deref().unwrap_or("-"),
        );
        root.storage_type = info.storage_type;
        root.filesystem_type = info.filesystem_type;
        root.access = info.access;
        root.max_capacity = info.max_capacity;
        root.free_space = info.free_space;
        root.free_space_objects = info.free_space_objects;
        root.volume_id = info.volume_id;
        root.node.borrow_mut().name = info.description;
        Ok(())
    }

    fn process_props_supported(&mut self, payload: &[u8]) -> Result<(), Error> {
        let mut cur = Cursor::new(payload);
        let props = cur.read_mtp_u16_vec()?;
        // 跨格式集合并，保持插入顺序并去重
        for prop in props {
            if self.object_property_ids.contains(&prop) {
                continue;
            }
            if self.object_property_ids.len() >= MAX_OBJECT_PROPERTY_IDS {
                warn!("对象属性数量达到上限{}，忽略 {:#06x}", MAX_OBJECT_PROPERTY_IDS, prop);
                break;
            }
            self.object_property_ids.push(prop);
        }
        debug!("对象属性清单: {:04x?}", self.object_property_ids);
        Ok(())
    }

    fn process_prop_desc(&mut self, payload: &[u8]) -> Result<(), Error> {
        let desc = MtpObjectPropDesc::decode(payload)?;
        debug!(
            "对象属性描述({}) {:#06x} type:{:#x} getset:{:#x}",
            MtpObjectProperty::name(desc.prop_code).unwrap_or("?"),
            desc.prop_code,
            desc.data_type,
            desc.get_set
        );
        self.prop_descs.push(desc);
        Ok(())
    }

    /// 重建enum_node的子列表，尽量复用旧节点（保留其子树）
    fn process_object_handles(&mut self, payload: &[u8]) -> Result<(), Error> {
        let mut cur = Cursor::new(payload);
        let handles = cur.read_mtp_u32_vec()?;
        let node = match self.enum_node.clone() {
            Some(node) => node,
            None => {
                warn!("收到对象句柄但没有枚举目标");
                return Ok(());
            }
        };
        let storage_id = node.borrow().storage_id;
        let mut old_children = std::mem::take(&mut node.borrow_mut().children);
        for handle in handles {
            let child = match old_children.iter().position(|c| c.borrow().id == handle) {
                Some(pos) => {
                    debug!("  {:#x} - 节点复用", handle);
                    old_children.remove(pos)
                }
                None => {
                    debug!("  {:#x} - 节点新建", handle);
                    ObjectNode::new(handle, storage_id, Rc::downgrade(&node))
                }
            };
            node.borrow_mut().children.push(child);
        }
        // 旧列表剩下的句柄已不在设备上，随所有权一起深释放
        drop(old_children);
        Ok(())
    }

    /// 共享的属性值分派（枚举与ObjectAdded事件共用）
    fn process_prop_value(&mut self, payload: &[u8]) -> Result<(), Error> {
        let (node, prop) = {
            let job = match self.prop_job.as_ref() {
                Some(job) => job,
                None => return Ok(()),
            };
            let node = match job.nodes.front() {
                Some(node) => node.clone(),
                None => return Ok(()),
            };
            let prop = self.object_property_ids.get(job.index).copied().unwrap_or(0);
            (node, prop)
        };
        debug!(
            "属性值({}) 节点:{:#x}",
            MtpObjectProperty::name(prop).unwrap_or("?"),
            node.borrow().id
        );
        let mut cur = Cursor::new(payload);
        match prop {
            MtpObjectProperty::StorageId => {
                let storage_id = cur.read_mtp_u32()?;
                let mut n = node.borrow_mut();
                if n.storage_id != 0 && n.storage_id != storage_id {
                    warn!(
                        "{}",
                        Error::ProtocolInvariant(format!(
                            "节点{:#x}的存储ID从{:#x}变为{:#x}",
                            n.id, n.storage_id, storage_id
                        ))
                    );
                }
                n.storage_id = storage_id;
            }
            MtpObjectProperty::ObjectFormat => {
                node.borrow_mut().format = cur.read_mtp_u16()?;
            }
            MtpObjectProperty::ObjectSize => {
                node.borrow_mut().size = cur.read_mtp_u64()?;
            }
            MtpObjectProperty::ObjectFileName | MtpObjectProperty::Name => {
                // 两者同等对待，后写者赢
                node.borrow_mut().name = cur.read_mtp_str()?;
            }
            MtpObjectProperty::DateModified => {
                // 设备日期字符串原样保存
                node.borrow_mut().modify_date = cur.read_mtp_str()?;
            }
            MtpObjectProperty::ParentObject => {
                let parent_id = cur.read_mtp_u32()?;
                self.link_parent(&node, parent_id);
            }
            MtpObjectProperty::ProtectionStatus
            | MtpObjectProperty::DateCreated
            | MtpObjectProperty::PersistentUid => {} // 接受但忽略
            _ => {}
        }
        Ok(())
    }

    /// 为尚无父链接的节点定位父节点并挂入其子列表末尾
    fn link_parent(&mut self, node: &NodeRef, parent_id: u32) {
        if let Some(existing) = node.borrow().parent.upgrade() {
            let existing_id = existing.borrow().id;
            if existing_id != parent_id {
                warn!(
                    "{}",
                    Error::ProtocolInvariant(format!(
                        "节点{:#x}的父对象从{:#x}变为{:#x}",
                        node.borrow().id,
                        existing_id,
                        parent_id
                    ))
                );
            }
            return;
        }
        // 存储已知时只在该存储内找，否则全林暴力查找
        let storage_id = node.borrow().storage_id;
        let parent = if storage_id != 0 {
            self.storages
                .iter()
                .find(|s| s.node.borrow().id == storage_id)
                .and_then(|s| find_in_children(&s.node, parent_id))
        } else {
            find_in_forest(&self.storages, parent_id)
        };
        match parent {
            Some(p) => {
                debug!("  父对象就位: {:#x}", parent_id);
                // 挂在末尾，避免重新迭代兄弟节点的属性
                let mut n = node.borrow_mut();
                n.parent = Rc::downgrade(&p);
                n.storage_id = p.borrow().storage_id;
                drop(n);
                p.borrow_mut().children.push(node.clone());
            }
            None => debug!("  未找到父对象 {:#x}", parent_id),
        }
    }

    // ===== 枚举流水线 =====

    /// GetObjectHandles成功后，对重建的子列表从左到右启动属性抓取
    fn start_enum_prop_fetch(&mut self) -> Result<(), Error> {
        let node = match self.enum_node.clone() {
            Some(node) => node,
            None => return Ok(()),
        };
        let nodes: VecDeque<NodeRef> = node.borrow().children.iter().cloned().collect();
        if nodes.is_empty() || self.object_property_ids.is_empty() {
            self.enum_node = None;
            return Ok(());
        }
        let first = nodes.front().unwrap().borrow().id;
        self.prop_job = Some(PropFetchJob {
            nodes,
            index: 0,
            origin: FetchOrigin::Enumeration,
        });
        self.transaction_id += 1;
        let prop = self.object_property_ids[0];
        self.send_command(MtpOperation::GetObjectPropValue, &[first, u32::from(prop)])
    }

    /// GetObjectPropValue成功后推进(prop_node, prop_index)游标
    fn advance_prop_fetch(&mut self) -> Result<(), Error> {
        let props_len = self.object_property_ids.len();
        let mut next: Option<(NodeRef, usize)> = None;
        let mut finished: Option<FetchOrigin> = None;
        match self.prop_job.as_mut() {
            None => return Ok(()),
            Some(job) => {
                job.index += 1;
                if job.index >= props_len {
                    job.nodes.pop_front();
                    job.index = 0;
                }
                match job.nodes.front() {
                    Some(n) => next = Some((n.clone(), job.index)),
                    None => finished = Some(job.origin),
                }
            }
        }
        if let Some((node, idx)) = next {
            let prop = self.object_property_ids[idx];
            let id = node.borrow().id;
            self.transaction_id += 1;
            return self.send_command(MtpOperation::GetObjectPropValue, &[id, u32::from(prop)]);
        }
        // 本次属性抓取任务完成
        self.prop_job = None;
        self.enum_node = None;
        if finished == Some(FetchOrigin::Event) && self.pending_events_active {
            self.complete_processing_event(true);
        }
        Ok(())
    }

    // ===== 事件队列驱动 =====

    fn event_data(&mut self, buf: &[u8]) {
        let c = match Container::parse(buf) {
            Ok(c) => c,
            Err(e) => {
                warn!("丢弃中断容器: {}", e);
                return;
            }
        };
        debug!("EVENT C<- {}", c.describe());
        if c.kind != ContainerKind::Event {
            warn!("中断端点收到非事件容器: {}", c.describe());
            return;
        }
        let prop_code = if c.code == MtpEventCode::ObjectPropChanged {
            c.param(1)
        } else {
            0
        };
        self.add_event(c.code, c.param(0), prop_code);
        self.start_process_next_event();
    }

    fn add_event(&mut self, code: u16, id: u32, prop_code: u32) {
        // 环满时事件被丢弃并告警（push内部），下一次用户枚举会追上
        let _ = self.events.push(code, id, prop_code);
    }

    /// 依次启动待处理事件
    ///
    /// 交错规则：任何时刻至多一个事件处于活动状态；命令在途或属性
    /// 抓取任务未完时事件留在环里，流水线的完成步骤会再次来到这里。
    fn start_process_next_event(&mut self) {
        loop {
            if self.pending_events_active || self.awaiting_response() || self.prop_job.is_some() {
                return;
            }
            let event_code = match self.events.front() {
                Some(slot) => slot.event_code,
                None => return,
            };
            let completed = match event_code {
                MtpEventCode::ObjectAdded => self.process_object_added_event(),
                MtpEventCode::ObjectRemoved => self.process_object_removed_event(),
                // 其余事件原样交给回调，不做树变更
                _ => true,
            };
            if completed {
                self.pending_events_active = true;
                self.complete_processing_event(false);
            } else {
                return; // 异步属性抓取进行中
            }
        }
    }

    /// ObjectAdded：分配空白节点并启动属性抓取；父链接由PARENT_OBJECT
    /// 属性到达时建立。返回事件是否已同步完成。
    fn process_object_added_event(&mut self) -> bool {
        let id = self.events.front().map(|s| s.id).unwrap_or(0);
        let node = ObjectNode::new(id, 0, Weak::new());
        if let Some(slot) = self.events.front_mut() {
            slot.item_node = Some(node.clone());
        }
        debug!("  {:#x} - 为新增事件分配节点", id);
        if self.object_property_ids.is_empty() {
            return true; // 没有可抓取的属性，事件直接完成
        }
        self.pending_events_active = true;
        let mut nodes = VecDeque::new();
        nodes.push_back(node);
        self.prop_job = Some(PropFetchJob {
            nodes,
            index: 0,
            origin: FetchOrigin::Event,
        });
        self.transaction_id += 1;
        let prop = self.object_property_ids[0];
        if let Err(e) = self.send_command(MtpOperation::GetObjectPropValue, &[id, u32::from(prop)]) {
            error!("事件属性抓取启动失败: {}", e);
            self.prop_job = None;
            return true;
        }
        false
    }

    /// ObjectRemoved：全林定位节点并从父列表摘除，同步完成
    fn process_object_removed_event(&mut self) -> bool {
        let id = self.events.front().map(|s| s.id).unwrap_or(0);
        let node = find_in_forest(&self.storages, id);
        debug!("对象移除事件: {:#x} 命中:{}", id, node.is_some());
        if let Some(ref n) = node {
            unlink_from_parent(n);
        }
        if let Some(slot) = self.events.front_mut() {
            slot.item_node = node;
            slot.delete_node = true;
        }
        true
    }

    /// 完成当前事件：回调、按需释放摘除的子树、推进环尾
    fn complete_processing_event(&mut self, start_next: bool) {
        if !self.pending_events_active {
            return;
        }
        self.pending_events_active = false;
        if let Some(slot) = self.events.pop_front() {
            let view = EventView::from_slot(&slot);
            if let Some(cb) = self.event_callback.as_mut() {
                cb(&view);
            }
            if slot.delete_node {
                if let Some(ref node) = slot.item_node {
                    debug!("释放已移除对象 {:#x} 的子树", node.borrow().id);
                }
            }
            // slot与view在此丢弃；已摘除节点的最后强引用随之释放
        }
        if start_next {
            self.start_process_next_event();
        }
    }

    // ===== 上传流水线 =====

    /// SendObjectInfo成功后记录新句柄并发出SendObject命令与首个数据块
    fn begin_send_object(&mut self, new_id: u32) -> Result<(), Error> {
        let max_packet = self.transport.max_packet_size(Endpoint::BulkOut);
        let total;
        let first_chunk;
        match self.upload.as_mut() {
            None => {
                warn!("收到SendObjectInfo响应但没有上传任务");
                return Ok(());
            }
            Some(job) => {
                job.new_object_id = new_id;
                total = job.total();
                // 首块带容器头，载荷至多 max_packet - 12 字节
                first_chunk = job.next_chunk(max_packet.saturating_sub(CONTAINER_HEADER_SIZE));
                job.streaming = true;
                if job.remaining() == 0 {
                    job.release_buffer();
                }
            }
        }
        info!("设备分配新对象句柄: {:#x}", new_id);
        self.transaction_id += 1;
        self.send_command(MtpOperation::SendObject, &[])?;
        // 数据容器头的length覆盖完整载荷，即使首次传输只携带第一块
        let mut data = Vec::with_capacity(CONTAINER_HEADER_SIZE + first_chunk.len());
        data.write_mtp_u32((CONTAINER_HEADER_SIZE + total) as u32);
        data.write_mtp_u16(ContainerKind::Data as u16);
        data.write_mtp_u16(MtpOperation::SendObject);
        data.write_mtp_u32(self.transaction_id);
        data.extend_from_slice(&first_chunk);
        self.transport.queue_send(Endpoint::BulkOut, &data)?;
        Ok(())
    }

    /// bulk-out完成回调：数据阶段未排空时续传下一块
    fn tx_data(&mut self, _len: usize) {
        let job = match self.upload.as_mut() {
            Some(job) => job,
            None => return,
        };
        if !job.streaming || job.remaining() == 0 {
            return;
        }
        let max_packet = self.transport.max_packet_size(Endpoint::BulkOut);
        let chunk = job.next_chunk(max_packet);
        if job.remaining() == 0 {
            // 最后一块已取出，释放文件缓冲区
            job.release_buffer();
        }
        if let Err(e) = self.transport.queue_send(Endpoint::BulkOut, &chunk) {
            error!("上传数据块发送失败: {}", e);
            self.upload = None;
        }
    }
}
