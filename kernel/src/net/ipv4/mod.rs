//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! IPv4 协议
//!
//! 遵循 Linux 内核的 IPv4 实现
//! 参考: net/ipv4/ip_input.c, net/ipv4/ip_output.c, include/uapi/linux/ip.h
//!
//! 只处理本地收发：不转发、不分片、不重组。

pub mod checksum;
pub mod route;

use core::net::Ipv4Addr;

use log::debug;

use crate::config::{ETH_MTU, IP_DEFAULT_TTL};
use crate::errno::{Errno, Result};
use crate::net::buffer::{EthProtocol, IpProtocol, SkBuff};
use crate::net::{icmp, udp, NetStack, IP_BROADCAST, IP_NONE};

pub use route::{ip_route_output, RouteType};

/// IPv4 头部长度（无选项）
pub const IPHDR_LEN: usize = 20;

/// IPv4 分片标志常量
pub mod ip_frag_flags {
    /// 不分片 (Don't Fragment)
    pub const DF: u16 = 0x4000;
    /// 更多分片 (More Fragments)
    pub const MF: u16 = 0x2000;
    /// 分片偏移掩码
    pub const OFFSET_MASK: u16 = 0x1FFF;
}

/// IPv4 头部
///
/// 对应 Linux 的 iphdr (include/uapi/linux/ip.h)，所有多字节字段线上为大端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpHdr {
    /// 版本 (4 bits) + 头部长度 (4 bits)
    pub version_ihl: u8,
    /// 服务类型
    pub tos: u8,
    /// 总长度
    pub tot_len: u16,
    /// 标识
    pub id: u16,
    /// 分片标志 + 分片偏移
    pub frag_off: u16,
    /// TTL
    pub ttl: u8,
    /// 协议
    pub protocol: u8,
    /// 头部校验和
    pub check: u16,
    /// 源 IP 地址
    pub saddr: Ipv4Addr,
    /// 目标 IP 地址
    pub daddr: Ipv4Addr,
}

impl IpHdr {
    /// 构造无选项的头部，校验和在 write 时计算
    pub fn new(saddr: Ipv4Addr, daddr: Ipv4Addr, protocol: u8, payload_len: usize, ttl: u8) -> Self {
        Self {
            version_ihl: 0x45,
            tos: 0,
            tot_len: (IPHDR_LEN + payload_len) as u16,
            id: 0,
            frag_off: ip_frag_flags::DF,
            ttl,
            protocol,
            check: 0,
            saddr,
            daddr,
        }
    }

    /// 从字节切片解析固定部分
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < IPHDR_LEN {
            return None;
        }
        let be16 = |off: usize| u16::from_be_bytes([data[off], data[off + 1]]);
        Some(Self {
            version_ihl: data[0],
            tos: data[1],
            tot_len: be16(2),
            id: be16(4),
            frag_off: be16(6),
            ttl: data[8],
            protocol: data[9],
            check: be16(10),
            saddr: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            daddr: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
        })
    }

    /// 写入字节切片并填入校验和
    pub fn write(&self, out: &mut [u8]) {
        out[0] = self.version_ihl;
        out[1] = self.tos;
        out[2..4].copy_from_slice(&self.tot_len.to_be_bytes());
        out[4..6].copy_from_slice(&self.id.to_be_bytes());
        out[6..8].copy_from_slice(&self.frag_off.to_be_bytes());
        out[8] = self.ttl;
        out[9] = self.protocol;
        out[10..12].fill(0);
        out[12..16].copy_from_slice(&self.saddr.octets());
        out[16..20].copy_from_slice(&self.daddr.octets());

        let check = checksum::ip_checksum(&out[..IPHDR_LEN]);
        out[10..12].copy_from_slice(&check.to_be_bytes());
    }

    /// 版本号
    pub fn version(&self) -> u8 {
        self.version_ihl >> 4
    }

    /// 头部长度（字节）
    pub fn header_len(&self) -> usize {
        ((self.version_ihl & 0x0F) as usize) * 4
    }

    /// 是否为分片
    pub fn is_fragment(&self) -> bool {
        self.frag_off & (ip_frag_flags::MF | ip_frag_flags::OFFSET_MASK) != 0
    }
}

/// 在 SkBuff 前面添加 IPv4 头部
///
/// # 参数
/// - `skb`: 已包含传输层数据的 SkBuff
/// - `saddr`, `daddr`: 源/目标地址
/// - `protocol`: 上层协议
///
/// # 返回
/// 超过 MTU 返回 EMSGSIZE，头部空间不足返回 ENOBUFS
pub fn ip_push_header(skb: &mut SkBuff, saddr: Ipv4Addr, daddr: Ipv4Addr, protocol: IpProtocol) -> Result<()> {
    let payload_len = skb.len();
    if payload_len + IPHDR_LEN > ETH_MTU {
        return Err(Errno::MessageTooLong);
    }

    let hdr = IpHdr::new(saddr, daddr, protocol.to_u8(), payload_len, IP_DEFAULT_TTL);
    hdr.write(skb.skb_push(IPHDR_LEN)?);
    skb.set_network_header();
    skb.protocol = EthProtocol::ETH_P_IP;
    skb.route.src_ip = saddr;
    skb.route.dst_ip = daddr;
    Ok(())
}

/// 发送 IPv4 数据包
///
/// 对应 Linux 的 ip_queue_xmit()
///
/// # 参数
/// - `stack`: 协议栈
/// - `skb`: 包含上层协议数据的 SkBuff
/// - `daddr`: 目标地址
/// - `protocol`: 上层协议
///
/// # 说明
/// 源地址取接口当前地址（未配置时为 0.0.0.0），然后交给输出路由
pub fn ipv4_send(stack: &NetStack, mut skb: SkBuff, daddr: Ipv4Addr, protocol: IpProtocol) -> Result<()> {
    let saddr = skb.dev().ip();
    ip_push_header(&mut skb, saddr, daddr, protocol)?;
    ip_route_output(stack, skb)
}

/// 接收并处理 IPv4 数据包
///
/// 对应 Linux 的 ip_rcv() / ip_local_deliver()
///
/// # 说明
/// - 校验版本、头部长度、总长度与头部校验和
/// - 接受目标为本机地址或广播的数据包；接口尚未配置地址时全部接受
/// - 分片直接丢弃
/// - 按协议分发给 ICMP 或 UDP
pub fn ip_rcv(stack: &NetStack, mut skb: SkBuff) -> Result<()> {
    let hdr = IpHdr::parse(skb.data()).ok_or(Errno::BadMessage)?;
    let hlen = hdr.header_len();
    let tot_len = hdr.tot_len as usize;

    if hdr.version() != 4 || hlen < IPHDR_LEN || tot_len < hlen || tot_len > skb.len() {
        return Err(Errno::BadMessage);
    }
    if !checksum::verify_checksum(&skb.data()[..hlen]) {
        debug!("ipv4: bad header checksum from {}", hdr.saddr);
        return Err(Errno::BadMessage);
    }
    if hdr.is_fragment() {
        debug!("ipv4: dropping fragment from {}", hdr.saddr);
        return Err(Errno::ProtocolNotSupported);
    }

    let our_ip = skb.dev().ip();
    if our_ip != IP_NONE && hdr.daddr != our_ip && hdr.daddr != IP_BROADCAST {
        return Err(Errno::AddressNotAvailable);
    }

    skb.skb_trim(tot_len);
    skb.set_network_header();
    skb.skb_pull(hlen)?;
    skb.set_transport_header();
    skb.route.src_ip = hdr.saddr;
    skb.route.dst_ip = hdr.daddr;

    match IpProtocol::from_u8(hdr.protocol) {
        Some(IpProtocol::IPPROTO_ICMP) => icmp::icmp_rcv(stack, skb),
        Some(IpProtocol::IPPROTO_UDP) => udp::udp_rcv(stack, skb),
        _ => {
            debug!("ipv4: no handler for protocol {} from {}", hdr.protocol, hdr.saddr);
            Err(Errno::ProtocolNotSupported)
        }
    }
}
