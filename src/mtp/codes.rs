#![allow(non_snake_case)]

// MTP协议代码表 - 容器类型、操作码、响应码、事件码与属性码

/// MTP容器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ContainerKind {
    Undefined = 0, // 未定义容器
    Command = 1,   // 命令容器
    Data = 2,      // 数据容器
    Response = 3,  // 响应容器
    Event = 4,     // 事件容器
}

impl ContainerKind {
    /// 从u16值转换为ContainerKind枚举
    pub fn from_u16(v: u16) -> Option<ContainerKind> {
        use self::ContainerKind::*;
        match v {
            0 => Some(Undefined),
            1 => Some(Command),
            2 => Some(Data),
            3 => Some(Response),
            4 => Some(Event),
            _ => None,
        }
    }
}

/// 操作码类型
pub type OperationCode = u16;

/// 标准MTP操作码定义
#[allow(non_upper_case_globals)]
pub mod MtpOperation {
    use super::OperationCode;

    pub const Undefined: OperationCode = 0x1000;
    pub const GetDeviceInfo: OperationCode = 0x1001;
    pub const OpenSession: OperationCode = 0x1002;
    pub const CloseSession: OperationCode = 0x1003;
    pub const GetStorageIds: OperationCode = 0x1004;
    pub const GetStorageInfo: OperationCode = 0x1005;
    pub const GetNumObjects: OperationCode = 0x1006;
    pub const GetObjectHandles: OperationCode = 0x1007;
    pub const GetObjectInfo: OperationCode = 0x1008;
    pub const GetObject: OperationCode = 0x1009;
    pub const GetThumb: OperationCode = 0x100A;
    pub const DeleteObject: OperationCode = 0x100B;
    pub const SendObjectInfo: OperationCode = 0x100C;
    pub const SendObject: OperationCode = 0x100D;
    pub const InitiateCapture: OperationCode = 0x100E;
    pub const FormatStore: OperationCode = 0x100F;
    pub const ResetDevice: OperationCode = 0x1010;
    pub const SelfTest: OperationCode = 0x1011;
    pub const SetObjectProtection: OperationCode = 0x1012;
    pub const PowerDown: OperationCode = 0x1013;
    pub const GetDevicePropDesc: OperationCode = 0x1014;
    pub const GetDevicePropValue: OperationCode = 0x1015;
    pub const SetDevicePropValue: OperationCode = 0x1016;
    pub const ResetDevicePropValue: OperationCode = 0x1017;
    pub const TerminateOpenCapture: OperationCode = 0x1018;
    pub const MoveObject: OperationCode = 0x1019;
    pub const CopyObject: OperationCode = 0x101A;
    pub const GetPartialObject: OperationCode = 0x101B;
    pub const InitiateOpenCapture: OperationCode = 0x101C;
    pub const GetObjectPropsSupported: OperationCode = 0x9801;
    pub const GetObjectPropDesc: OperationCode = 0x9802;
    pub const GetObjectPropValue: OperationCode = 0x9803;
    pub const SetObjectPropValue: OperationCode = 0x9804;
    pub const GetObjectPropList: OperationCode = 0x9805;
    pub const SetObjectPropList: OperationCode = 0x9806;
    pub const GetInterdependentPropDesc: OperationCode = 0x9807;
    pub const SendObjectPropList: OperationCode = 0x9808;
    pub const GetObjectReferences: OperationCode = 0x9810;
    pub const SetObjectReferences: OperationCode = 0x9811;
    pub const Skip: OperationCode = 0x9820;

    /// 根据操作码返回对应的名称
    pub fn name(v: OperationCode) -> Option<&'static str> {
        match v {
            Undefined => Some("未定义"),
            GetDeviceInfo => Some("获取设备信息"),
            OpenSession => Some("打开会话"),
            CloseSession => Some("关闭会话"),
            GetStorageIds => Some("获取存储ID"),
            GetStorageInfo => Some("获取存储信息"),
            GetNumObjects => Some("获取对象数量"),
            GetObjectHandles => Some("获取对象句柄"),
            GetObjectInfo => Some("获取对象信息"),
            GetObject => Some("获取对象"),
            GetThumb => Some("获取缩略图"),
            DeleteObject => Some("删除对象"),
            SendObjectInfo => Some("发送对象信息"),
            SendObject => Some("发送对象"),
            InitiateCapture => Some("启动捕获"),
            FormatStore => Some("格式化存储"),
            ResetDevice => Some("重置设备"),
            SelfTest => Some("自检"),
            SetObjectProtection => Some("设置对象保护"),
            PowerDown => Some("关机"),
            GetDevicePropDesc => Some("获取设备属性描述"),
            GetDevicePropValue => Some("获取设备属性值"),
            SetDevicePropValue => Some("设置设备属性值"),
            ResetDevicePropValue => Some("重置设备属性值"),
            TerminateOpenCapture => Some("终止开放捕获"),
            MoveObject => Some("移动对象"),
            CopyObject => Some("复制对象"),
            GetPartialObject => Some("获取部分对象"),
            InitiateOpenCapture => Some("启动开放捕获"),
            GetObjectPropsSupported => Some("获取支持的对象属性"),
            GetObjectPropDesc => Some("获取对象属性描述"),
            GetObjectPropValue => Some("获取对象属性值"),
            SetObjectPropValue => Some("设置对象属性值"),
            GetObjectPropList => Some("获取对象属性列表"),
            SetObjectPropList => Some("设置对象属性列表"),
            GetInterdependentPropDesc => Some("获取关联属性描述"),
            SendObjectPropList => Some("发送对象属性列表"),
            GetObjectReferences => Some("获取对象引用"),
            SetObjectReferences => Some("设置对象引用"),
            Skip => Some("跳过"),
            _ => None,
        }
    }
}

/// 响应码类型
pub type ResponseCode = u16;

/// 标准MTP响应码定义
#[allow(non_upper_case_globals)]
pub mod MtpResponseCode {
    use super::ResponseCode;

    pub const Undefined: ResponseCode = 0x2000;
    pub const Ok: ResponseCode = 0x2001;
    pub const GeneralError: ResponseCode = 0x2002;
    pub const SessionNotOpen: ResponseCode = 0x2003;
    pub const InvalidTransactionId: ResponseCode = 0x2004;
    pub const OperationNotSupported: ResponseCode = 0x2005;
    pub const ParameterNotSupported: ResponseCode = 0x2006;
    pub const IncompleteTransfer: ResponseCode = 0x2007;
    pub const InvalidStorageId: ResponseCode = 0x2008;
    pub const InvalidObjectHandle: ResponseCode = 0x2009;
    pub const DevicePropNotSupported: ResponseCode = 0x200A;
    pub const InvalidObjectFormatCode: ResponseCode = 0x200B;
    pub const StorageFull: ResponseCode = 0x200C;
    pub const ObjectWriteProtected: ResponseCode = 0x200D;
    pub const StoreReadOnly: ResponseCode = 0x200E;
    pub const AccessDenied: ResponseCode = 0x200F;
    pub const NoThumbnailPresent: ResponseCode = 0x2010;
    pub const SelfTestFailed: ResponseCode = 0x2011;
    pub const PartialDeletion: ResponseCode = 0x2012;
    pub const StoreNotAvailable: ResponseCode = 0x2013;
    pub const SpecificationByFormatUnsupported: ResponseCode = 0x2014;
    pub const NoValidObjectInfo: ResponseCode = 0x2015;
    pub const InvalidCodeFormat: ResponseCode = 0x2016;
    pub const UnknownVendorCode: ResponseCode = 0x2017;
    pub const CaptureAlreadyTerminated: ResponseCode = 0x2018;
    pub const DeviceBusy: ResponseCode = 0x2019;
    pub const InvalidParentObject: ResponseCode = 0x201A;
    pub const InvalidDevicePropFormat: ResponseCode = 0x201B;
    pub const InvalidDevicePropValue: ResponseCode = 0x201C;
    pub const InvalidParameter: ResponseCode = 0x201D;
    pub const SessionAlreadyOpen: ResponseCode = 0x201E;
    pub const TransactionCancelled: ResponseCode = 0x201F;
    pub const SpecificationOfDestinationUnsupported: ResponseCode = 0x2020;
    pub const InvalidObjectPropCode: ResponseCode = 0xA801;
    pub const InvalidObjectPropFormat: ResponseCode = 0xA802;
    pub const InvalidObjectPropValue: ResponseCode = 0xA803;
    pub const InvalidObjectReference: ResponseCode = 0xA804;
    pub const GroupNotSupported: ResponseCode = 0xA805;
    pub const InvalidDataset: ResponseCode = 0xA806;
    pub const SpecificationByGroupUnsupported: ResponseCode = 0xA807;
    pub const SpecificationByDepthUnsupported: ResponseCode = 0xA808;
    pub const ObjectTooLarge: ResponseCode = 0xA809;
    pub const ObjectPropNotSupported: ResponseCode = 0xA80A;

    /// 根据响应码返回对应的名称
    pub fn name(v: ResponseCode) -> Option<&'static str> {
        match v {
            Undefined => Some("未定义"),
            Ok => Some("成功"),
            GeneralError => Some("一般错误"),
            SessionNotOpen => Some("会话未打开"),
            InvalidTransactionId => Some("无效的事务ID"),
            OperationNotSupported => Some("不支持的操作"),
            ParameterNotSupported => Some("不支持的参数"),
            IncompleteTransfer => Some("传输不完整"),
            InvalidStorageId => Some("无效的存储ID"),
            InvalidObjectHandle => Some("无效的对象句柄"),
            DevicePropNotSupported => Some("不支持的设备属性"),
            InvalidObjectFormatCode => Some("无效的对象格式代码"),
            StorageFull => Some("存储已满"),
            ObjectWriteProtected => Some("对象写保护"),
            StoreReadOnly => Some("存储只读"),
            AccessDenied => Some("访问被拒绝"),
            NoThumbnailPresent => Some("没有缩略图"),
            SelfTestFailed => Some("自检失败"),
            PartialDeletion => Some("部分删除"),
            StoreNotAvailable => Some("存储不可用"),
            SpecificationByFormatUnsupported => Some("不支持按格式指定"),
            NoValidObjectInfo => Some("无有效对象信息"),
            InvalidCodeFormat => Some("无效的代码格式"),
            UnknownVendorCode => Some("未知的厂商代码"),
            CaptureAlreadyTerminated => Some("捕获已终止"),
            DeviceBusy => Some("设备忙"),
            InvalidParentObject => Some("无效的父对象"),
            InvalidDevicePropFormat => Some("无效的设备属性格式"),
            InvalidDevicePropValue => Some("无效的设备属性值"),
            InvalidParameter => Some("无效的参数"),
            SessionAlreadyOpen => Some("会话已打开"),
            TransactionCancelled => Some("事务已取消"),
            SpecificationOfDestinationUnsupported => Some("不支持指定目标"),
            InvalidObjectPropCode => Some("无效的对象属性代码"),
            InvalidObjectPropFormat => Some("无效的对象属性格式"),
            InvalidObjectPropValue => Some("无效的对象属性值"),
            InvalidObjectReference => Some("无效的对象引用"),
            GroupNotSupported => Some("不支持分组"),
            InvalidDataset => Some("无效的数据集"),
            SpecificationByGroupUnsupported => Some("不支持按分组指定"),
            SpecificationByDepthUnsupported => Some("不支持按深度指定"),
            ObjectTooLarge => Some("对象过大"),
            ObjectPropNotSupported => Some("不支持的对象属性"),
            _ => None,
        }
    }
}

/// 事件码类型
pub type EventCode = u16;

/// 标准MTP事件码定义
#[allow(non_upper_case_globals)]
pub mod MtpEventCode {
    use super::EventCode;

    pub const Undefined: EventCode = 0x4000;
    pub const CancelTransaction: EventCode = 0x4001;
    pub const ObjectAdded: EventCode = 0x4002;
    pub const ObjectRemoved: EventCode = 0x4003;
    pub const StoreAdded: EventCode = 0x4004;
    pub const StoreRemoved: EventCode = 0x4005;
    pub const DevicePropChanged: EventCode = 0x4006;
    pub const ObjectInfoChanged: EventCode = 0x4007;
    pub const DeviceInfoChanged: EventCode = 0x4008;
    pub const RequestObjectTransfer: EventCode = 0x4009;
    pub const StoreFull: EventCode = 0x400A;
    pub const DeviceReset: EventCode = 0x400B;
    pub const StorageInfoChanged: EventCode = 0x400C;
    pub const CaptureComplete: EventCode = 0x400D;
    pub const UnreportedStatus: EventCode = 0x400E;
    pub const ObjectPropChanged: EventCode = 0xC801;
    pub const ObjectPropDescChanged: EventCode = 0xC802;
    pub const ObjectReferencesChanged: EventCode = 0xC803;

    /// 根据事件码返回对应的名称
    pub fn name(v: EventCode) -> Option<&'static str> {
        match v {
            Undefined => Some("未定义"),
            CancelTransaction => Some("取消事务"),
            ObjectAdded => Some("对象已添加"),
            ObjectRemoved => Some("对象已移除"),
            StoreAdded => Some("存储已添加"),
            StoreRemoved => Some("存储已移除"),
            DevicePropChanged => Some("设备属性已改变"),
            ObjectInfoChanged => Some("对象信息已改变"),
            DeviceInfoChanged => Some("设备信息已改变"),
            RequestObjectTransfer => Some("请求对象传输"),
            StoreFull => Some("存储已满"),
            DeviceReset => Some("设备已重置"),
            StorageInfoChanged => Some("存储信息已改变"),
            CaptureComplete => Some("捕获完成"),
            UnreportedStatus => Some("未上报的状态"),
            ObjectPropChanged => Some("对象属性已改变"),
            ObjectPropDescChanged => Some("对象属性描述已改变"),
            ObjectReferencesChanged => Some("对象引用已改变"),
            _ => None,
        }
    }
}

/// 对象属性码类型
pub type ObjectPropCode = u16;

/// MTP对象属性码定义
#[allow(non_upper_case_globals)]
pub mod MtpObjectProperty {
    use super::ObjectPropCode;

    pub const StorageId: ObjectPropCode = 0xDC01;
    pub const ObjectFormat: ObjectPropCode = 0xDC02;
    pub const ProtectionStatus: ObjectPropCode = 0xDC03;
    pub const ObjectSize: ObjectPropCode = 0xDC04;
    pub const ObjectFileName: ObjectPropCode = 0xDC07;
    pub const DateCreated: ObjectPropCode = 0xDC08;
    pub const DateModified: ObjectPropCode = 0xDC09;
    pub const ParentObject: ObjectPropCode = 0xDC0B;
    pub const PersistentUid: ObjectPropCode = 0xDC41;
    pub const Name: ObjectPropCode = 0xDC44;

    /// 根据对象属性码返回对应的名称
    pub fn name(v: ObjectPropCode) -> Option<&'static str> {
        match v {
            StorageId => Some("存储ID"),
            ObjectFormat => Some("对象格式"),
            ProtectionStatus => Some("保护状态"),
            ObjectSize => Some("对象大小"),
            ObjectFileName => Some("对象文件名"),
            DateCreated => Some("创建日期"),
            DateModified => Some("修改日期"),
            ParentObject => Some("父对象"),
            PersistentUid => Some("持久UID"),
            Name => Some("名称"),
            _ => None,
        }
    }
}

/// 设备属性码类型
pub type DevicePropCode = u16;

/// MTP设备属性码定义（本实现使用的子集）
#[allow(non_upper_case_globals)]
pub mod MtpDeviceProperty {
    use super::DevicePropCode;

    pub const Undefined: DevicePropCode = 0x5000;
    pub const BatteryLevel: DevicePropCode = 0x5001;
    pub const FunctionalMode: DevicePropCode = 0x5002;
    pub const DateTime: DevicePropCode = 0x5011;
    pub const SynchronizationPartner: DevicePropCode = 0xD401;
    pub const DeviceFriendlyName: DevicePropCode = 0xD402;
    pub const Volume: DevicePropCode = 0xD403;
    pub const SupportedFormatsOrdered: DevicePropCode = 0xD404;
    pub const DeviceIcon: DevicePropCode = 0xD405;
    pub const SessionInitiatorVersionInfo: DevicePropCode = 0xD406;
    pub const PerceivedDeviceType: DevicePropCode = 0xD407;

    /// 根据设备属性码返回对应的名称
    pub fn name(v: DevicePropCode) -> Option<&'static str> {
        match v {
            Undefined => Some("未定义"),
            BatteryLevel => Some("电池电量"),
            FunctionalMode => Some("功能模式"),
            DateTime => Some("日期时间"),
            SynchronizationPartner => Some("同步伙伴"),
            DeviceFriendlyName => Some("设备友好名称"),
            Volume => Some("音量"),
            SupportedFormatsOrdered => Some("有序支持格式"),
            DeviceIcon => Some("设备图标"),
            SessionInitiatorVersionInfo => Some("发起方版本信息"),
            PerceivedDeviceType => Some("设备感知类型"),
            _ => None,
        }
    }
}

/// 对象格式码：关联（目录）
pub const FORMAT_ASSOCIATION: u16 = 0x3001;
/// 对象格式码：未定义（普通文件）
pub const FORMAT_UNDEFINED: u16 = 0x3000;

/// 保留句柄：无对象
pub const HANDLE_NONE: u32 = 0x0000_0000;
/// 通配句柄：存储根下的全部对象
pub const HANDLE_ROOT: u32 = 0xFFFF_FFFF;

#[cfg(test)]
mod tests {
    use super::*;

    // 级联使用的操作码、处理的事件码与分派表中的对象属性码必须全部可打印
    #[test]
    fn test_cascade_operation_names_complete() {
        let ops = [
            MtpOperation::GetDeviceInfo,
            MtpOperation::OpenSession,
            MtpOperation::CloseSession,
            MtpOperation::GetDevicePropDesc,
            MtpOperation::GetStorageIds,
            MtpOperation::GetStorageInfo,
            MtpOperation::GetObjectPropsSupported,
            MtpOperation::GetObjectPropDesc,
            MtpOperation::GetObjectHandles,
            MtpOperation::GetObjectPropValue,
            MtpOperation::DeleteObject,
            MtpOperation::SendObjectInfo,
            MtpOperation::SendObject,
        ];
        for op in ops {
            assert!(MtpOperation::name(op).is_some(), "操作码 {:#06x} 缺少名称", op);
        }
    }

    #[test]
    fn test_handled_event_names_complete() {
        let events = [
            MtpEventCode::ObjectAdded,
            MtpEventCode::ObjectRemoved,
            MtpEventCode::StoreFull,
            MtpEventCode::StorageInfoChanged,
            MtpEventCode::ObjectPropChanged,
        ];
        for ev in events {
            assert!(MtpEventCode::name(ev).is_some(), "事件码 {:#06x} 缺少名称", ev);
        }
    }

    #[test]
    fn test_dispatch_table_property_names_complete() {
        let props = [
            MtpObjectProperty::StorageId,
            MtpObjectProperty::ObjectFormat,
            MtpObjectProperty::ProtectionStatus,
            MtpObjectProperty::ObjectSize,
            MtpObjectProperty::ObjectFileName,
            MtpObjectProperty::DateCreated,
            MtpObjectProperty::DateModified,
            MtpObjectProperty::ParentObject,
            MtpObjectProperty::PersistentUid,
            MtpObjectProperty::Name,
        ];
        for p in props {
            assert!(MtpObjectProperty::name(p).is_some(), "属性码 {:#06x} 缺少名称", p);
        }
    }

    #[test]
    fn test_container_kind_round_trip() {
        for v in 0u16..=4 {
            let kind = ContainerKind::from_u16(v).unwrap();
            assert_eq!(kind as u16, v);
        }
        assert!(ContainerKind::from_u16(5).is_none());
    }

    #[test]
    fn test_unknown_codes_have_no_name() {
        assert!(MtpOperation::name(0x0042).is_none());
        assert!(MtpResponseCode::name(0x0042).is_none());
        assert!(MtpEventCode::name(0x0042).is_none());
    }
}
