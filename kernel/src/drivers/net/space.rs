//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络设备操作接口
//!
//! 遵循 Linux 内核的 net_device_ops 设计
//! 参考: include/linux/netdevice.h, include/uapi/linux/if.h

use bitflags::bitflags;

use crate::errno::Result;
use crate::net::buffer::SkBuff;

/// 设备名最大长度
///
/// 对应 Linux 的 IFNAMSIZ
pub const IFNAMSIZ: usize = 16;

/// ARP 硬件类型
///
/// 对应 Linux 的 ARPHRD_* (include/uapi/linux/if_arp.h)
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum ArpHrdType {
    /// 以太网
    ARPHRD_ETHER = 1,
    /// 回环设备
    ARPHRD_LOOPBACK = 772,
}

impl ArpHrdType {
    /// 转换为线上的硬件类型字段
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

bitflags! {
    /// 接口状态标志
    ///
    /// 对应 Linux 的 IFF_* (include/uapi/linux/if.h)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InterfaceFlags: u32 {
        const IFF_UP        = 0x1;    /* 接口已启动 */
        const IFF_BROADCAST = 0x2;    /* 支持广播 */
        const IFF_LOOPBACK  = 0x8;    /* 回环设备 */
        const IFF_RUNNING   = 0x40;   /* 链路可用 */
        const IFF_MULTICAST = 0x1000; /* 支持多播 */
    }
}

/// 网络设备统计信息
///
/// 对应 Linux 的 rtnl_link_stats64
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStats {
    /// 接收包数
    pub rx_packets: u64,
    /// 发送包数
    pub tx_packets: u64,
    /// 接收字节数
    pub rx_bytes: u64,
    /// 发送字节数
    pub tx_bytes: u64,
    /// 接收错误数
    pub rx_errors: u64,
    /// 发送错误数
    pub tx_errors: u64,
}

/// 网络设备操作接口
///
/// 对应 Linux 的 net_device_ops
///
/// # 说明
/// - 驱动实现此 trait 并在注册接口时提供
/// - `xmit` 可能在中断上下文中被调用（例如处理接收时发送 ARP 应答），不得阻塞
pub trait NetDeviceOps: Send + Sync {
    /// 发送一个完整的以太网帧
    ///
    /// 对应 Linux 的 ndo_start_xmit()
    ///
    /// # 参数
    /// - `skb`: 已添加以太网头部的数据包，所有权移交驱动
    fn xmit(&self, skb: SkBuff) -> Result<()>;

    /// 驱动自身维护的统计信息（可选）
    ///
    /// 对应 Linux 的 ndo_get_stats64()
    fn get_stats(&self) -> Option<DeviceStats> {
        None
    }

    /// 硬件类型
    fn hw_type(&self) -> ArpHrdType {
        ArpHrdType::ARPHRD_ETHER
    }
}
