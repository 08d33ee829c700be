//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络缓冲区 (SkBuff)
//!
//! 对应 Linux 的 sk_buff
//! 参考: include/linux/skbuff.h, net/core/skbuff.c
//!
//! 与 Linux 的指针版本不同，这里用 `Vec<u8>` 加偏移量表示 head/data/tail，
//! 所有访问都经过边界检查。
//!
//! # 所有权
//!
//! SkBuff 不可克隆。一个数据包在任意时刻只属于以下之一：
//! 构造它的协议代码、某个 ARP 表项的等待队列、链路层发送路径。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::net::Ipv4Addr;

use crate::config::SKB_HEADROOM;
use crate::errno::{Errno, Result};
use crate::net::ethernet::MacAddr;
use crate::net::interface::NetInterface;

/// 以太网协议类型
///
/// 对应 Linux 的 ETH_P_* (include/uapi/linux/if_ether.h)
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum EthProtocol {
    /// IPv4
    ETH_P_IP = 0x0800,
    /// ARP
    ETH_P_ARP = 0x0806,
    /// IPv6
    ETH_P_IPV6 = 0x86DD,
}

impl EthProtocol {
    /// 从 u16 转换
    pub fn from_u16(val: u16) -> Option<Self> {
        match val {
            0x0800 => Some(EthProtocol::ETH_P_IP),
            0x0806 => Some(EthProtocol::ETH_P_ARP),
            0x86DD => Some(EthProtocol::ETH_P_IPV6),
            _ => None,
        }
    }

    /// 转换为 u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// IP 协议类型
///
/// 对应 Linux 的 IPPROTO_* (include/uapi/linux/in.h)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum IpProtocol {
    /// 任意协议 (raw/通配)
    IPPROTO_IP = 0,
    /// ICMP
    IPPROTO_ICMP = 1,
    /// TCP
    IPPROTO_TCP = 6,
    /// UDP
    IPPROTO_UDP = 17,
}

impl IpProtocol {
    /// 从 u8 转换
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(IpProtocol::IPPROTO_IP),
            1 => Some(IpProtocol::IPPROTO_ICMP),
            6 => Some(IpProtocol::IPPROTO_TCP),
            17 => Some(IpProtocol::IPPROTO_UDP),
            _ => None,
        }
    }

    /// 转换为 u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// 数据包解析状态
///
/// 只有 `Resolved` 的数据包才能交给链路层发送
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketState {
    /// 新构造，目标硬件地址未知
    New,
    /// 目标硬件地址已填入
    Resolved,
}

/// 数据包路由信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketRoute {
    /// 源硬件地址（接收时来自以太网头部）
    pub hard_src: MacAddr,
    /// 目标硬件地址（发送时由 ARP 填入）
    pub hard_dst: MacAddr,
    /// 源 IP 地址
    pub src_ip: Ipv4Addr,
    /// 目标 IP 地址
    pub dst_ip: Ipv4Addr,
}

impl PacketRoute {
    const fn empty() -> Self {
        Self {
            hard_src: MacAddr::NONE,
            hard_dst: MacAddr::NONE,
            src_ip: Ipv4Addr::UNSPECIFIED,
            dst_ip: Ipv4Addr::UNSPECIFIED,
        }
    }
}

/// 网络缓冲区 (SkBuff)
///
/// # 内存布局
/// ```text
/// |<- headroom ->|<- 实际数据 ->|
/// 0             data           tail == buf.len()
/// ```
///
/// 尾部空间按需增长，头部空间在分配时预留。
pub struct SkBuff {
    /// 所属网络接口
    dev: Arc<NetInterface>,
    /// 缓冲区
    buf: Vec<u8>,
    /// 当前协议层数据起始偏移
    data: usize,
    /// 以太网协议类型
    pub protocol: EthProtocol,
    /// 解析状态
    pub state: PacketState,
    /// 路由信息
    pub route: PacketRoute,
    /// MAC 头偏移
    mac_header: Option<usize>,
    /// 网络层头偏移
    network_header: Option<usize>,
    /// 传输层头偏移
    transport_header: Option<usize>,
}

impl SkBuff {
    /// 分配新的 SkBuff
    ///
    /// # 参数
    /// - `dev`: 发送接口
    /// - `size`: 预计数据大小（只影响初始容量）
    ///
    /// # 说明
    /// - 预留 `SKB_HEADROOM` 字节头部空间，用于以太网/IP/UDP 头部
    /// - 分配失败由内核分配器处理，这里不恢复
    pub fn alloc(dev: &Arc<NetInterface>, size: usize) -> Self {
        let mut buf = Vec::with_capacity(SKB_HEADROOM + size);
        buf.resize(SKB_HEADROOM, 0);
        Self {
            dev: dev.clone(),
            buf,
            data: SKB_HEADROOM,
            protocol: EthProtocol::ETH_P_IP,
            state: PacketState::New,
            route: PacketRoute::empty(),
            mac_header: None,
            network_header: None,
            transport_header: None,
        }
    }

    /// 用接收到的原始帧创建 SkBuff
    ///
    /// 没有头部空间，data 指向帧的第一个字节
    pub fn from_frame(dev: &Arc<NetInterface>, frame: &[u8]) -> Self {
        Self {
            dev: dev.clone(),
            buf: frame.to_vec(),
            data: 0,
            protocol: EthProtocol::ETH_P_IP,
            state: PacketState::New,
            route: PacketRoute::empty(),
            mac_header: None,
            network_header: None,
            transport_header: None,
        }
    }

    /// 所属网络接口
    pub fn dev(&self) -> &Arc<NetInterface> {
        &self.dev
    }

    /// 在数据尾部添加空间
    ///
    /// 对应 Linux 的 skb_put()
    ///
    /// # 返回
    /// 新增区域（已清零）
    pub fn skb_put(&mut self, len: usize) -> &mut [u8] {
        let tail = self.buf.len();
        self.buf.resize(tail + len, 0);
        &mut self.buf[tail..]
    }

    /// 写入数据到尾部
    ///
    /// 对应 Linux 的 skb_put_data()
    pub fn skb_put_data(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// 在数据头部添加空间
    ///
    /// 对应 Linux 的 skb_push()
    ///
    /// # 返回
    /// 新增区域，头部空间不足时返回 ENOBUFS
    pub fn skb_push(&mut self, len: usize) -> Result<&mut [u8]> {
        if len > self.data {
            return Err(Errno::NoBufferSpace);
        }
        self.data -= len;
        let start = self.data;
        let area = &mut self.buf[start..start + len];
        area.fill(0);
        Ok(area)
    }

    /// 从数据头部移除数据
    ///
    /// 对应 Linux 的 skb_pull()
    ///
    /// # 返回
    /// 被移除的头部，长度不足时返回 EBADMSG
    pub fn skb_pull(&mut self, len: usize) -> Result<&[u8]> {
        if len > self.len() {
            return Err(Errno::BadMessage);
        }
        let start = self.data;
        self.data += len;
        Ok(&self.buf[start..start + len])
    }

    /// 截断数据到指定长度
    ///
    /// 对应 Linux 的 skb_trim()，用于去掉以太网填充
    pub fn skb_trim(&mut self, len: usize) {
        if len < self.len() {
            self.buf.truncate(self.data + len);
        }
    }

    /// 头部剩余空间
    pub fn headroom(&self) -> usize {
        self.data
    }

    /// 记录 MAC 头位置（当前 data）
    pub fn set_mac_header(&mut self) {
        self.mac_header = Some(self.data);
    }

    /// 记录网络层头位置（当前 data）
    pub fn set_network_header(&mut self) {
        self.network_header = Some(self.data);
    }

    /// 记录传输层头位置（当前 data）
    pub fn set_transport_header(&mut self) {
        self.transport_header = Some(self.data);
    }

    /// 从 MAC 头开始到尾部的数据
    pub fn mac_header(&self) -> Option<&[u8]> {
        self.mac_header.map(|off| &self.buf[off..])
    }

    /// 从网络层头开始到尾部的数据
    pub fn network_header(&self) -> Option<&[u8]> {
        self.network_header.map(|off| &self.buf[off..])
    }

    /// 从传输层头开始到尾部的数据
    pub fn transport_header(&self) -> Option<&[u8]> {
        self.transport_header.map(|off| &self.buf[off..])
    }

    /// 当前协议层数据
    pub fn data(&self) -> &[u8] {
        &self.buf[self.data..]
    }

    /// 当前协议层数据（可写）
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.data..]
    }

    /// 数据长度
    pub fn len(&self) -> usize {
        self.buf.len() - self.data
    }

    /// 检查是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 标记为已解析并填入目标硬件地址
    pub fn mark_resolved(&mut self, hard_dst: MacAddr) {
        self.route.hard_dst = hard_dst;
        self.state = PacketState::Resolved;
    }
}

impl core::fmt::Debug for SkBuff {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SkBuff")
            .field("dev", &self.dev.name())
            .field("len", &self.len())
            .field("headroom", &self.headroom())
            .field("protocol", &self.protocol)
            .field("state", &self.state)
            .field("route", &self.route)
            .finish()
    }
}
