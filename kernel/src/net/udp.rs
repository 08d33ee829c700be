//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! UDP 协议
//!
//! 遵循 Linux 内核的 UDP 实现
//! 参考: net/ipv4/udp.c, include/uapi/linux/udp.h
//!
//! 没有套接字表：接收按目标端口分发给内核内的 DHCP 客户端与名称服务。

use alloc::sync::Arc;
use core::net::Ipv4Addr;

use log::debug;

use crate::errno::{Errno, Result};
use crate::net::buffer::{IpProtocol, SkBuff};
use crate::net::interface::NetInterface;
use crate::net::ipv4::{checksum, ipv4_send, IPHDR_LEN};
use crate::net::NetStack;

/// UDP 头部长度
pub const UDP_HLEN: usize = 8;

/// UDP/IPv4 头部总长度
pub const UDP_IP_HLEN: usize = IPHDR_LEN + UDP_HLEN;

/// UDP 端口号
pub type UdpPort = u16;

/// UDP 头部
///
/// 对应 Linux 的 udphdr (include/uapi/linux/udp.h)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHdr {
    /// 源端口
    pub source: UdpPort,
    /// 目标端口
    pub dest: UdpPort,
    /// 长度（头部 + 数据）
    pub len: u16,
    /// 校验和，0 表示未计算
    pub check: u16,
}

impl UdpHdr {
    /// 从字节切片解析
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < UDP_HLEN {
            return None;
        }
        Some(Self {
            source: u16::from_be_bytes([data[0], data[1]]),
            dest: u16::from_be_bytes([data[2], data[3]]),
            len: u16::from_be_bytes([data[4], data[5]]),
            check: u16::from_be_bytes([data[6], data[7]]),
        })
    }

    /// 写入字节切片（校验和字段原样写入）
    pub fn write(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&self.source.to_be_bytes());
        out[2..4].copy_from_slice(&self.dest.to_be_bytes());
        out[4..6].copy_from_slice(&self.len.to_be_bytes());
        out[6..8].copy_from_slice(&self.check.to_be_bytes());
    }
}

/// 在 SkBuff 前面添加 UDP 头部并计算校验和
///
/// # 说明
/// 校验和包含伪头部；计算结果为 0 时写入 0xFFFF (RFC 768)
pub fn udp_push_header(
    skb: &mut SkBuff,
    saddr: Ipv4Addr,
    daddr: Ipv4Addr,
    sport: UdpPort,
    dport: UdpPort,
) -> Result<()> {
    let len = UDP_HLEN + skb.len();
    let hdr = UdpHdr {
        source: sport,
        dest: dport,
        len: len as u16,
        check: 0,
    };
    hdr.write(skb.skb_push(UDP_HLEN)?);
    skb.set_transport_header();

    let segment = skb.data_mut();
    let check = match checksum::transport_checksum(saddr, daddr, IpProtocol::IPPROTO_UDP.to_u8(), segment) {
        0 => 0xFFFF,
        c => c,
    };
    segment[6..8].copy_from_slice(&check.to_be_bytes());
    Ok(())
}

/// 发送 UDP 数据报
///
/// # 参数
/// - `stack`: 协议栈
/// - `dev`: 发送接口
/// - `daddr`: 目标地址（可以是广播）
/// - `sport`, `dport`: 源/目标端口
/// - `payload`: 数据
pub fn udp_send(
    stack: &NetStack,
    dev: &Arc<NetInterface>,
    daddr: Ipv4Addr,
    sport: UdpPort,
    dport: UdpPort,
    payload: &[u8],
) -> Result<()> {
    let mut skb = SkBuff::alloc(dev, payload.len());
    skb.skb_put_data(payload);
    udp_push_header(&mut skb, dev.ip(), daddr, sport, dport)?;
    ipv4_send(stack, skb, daddr, IpProtocol::IPPROTO_UDP)
}

/// 处理接收到的 UDP 数据报
///
/// 对应 Linux 的 udp_rcv()
///
/// # 说明
/// - 长度字段必须在 [8, 剩余长度] 之间，超出部分截掉
/// - 校验和非 0 时验证
/// - DHCP 客户端端口交给 DHCP 客户端，名称服务端口交给名称服务，其余丢弃
pub fn udp_rcv(stack: &NetStack, mut skb: SkBuff) -> Result<()> {
    let hdr = UdpHdr::parse(skb.data()).ok_or(Errno::BadMessage)?;
    let len = hdr.len as usize;
    if len < UDP_HLEN || len > skb.len() {
        return Err(Errno::BadMessage);
    }
    skb.skb_trim(len);

    if hdr.check != 0 {
        let sum = checksum::pseudo_header_sum(
            skb.route.src_ip,
            skb.route.dst_ip,
            IpProtocol::IPPROTO_UDP.to_u8(),
            hdr.len,
        );
        if checksum::csum_fold(checksum::csum_partial(skb.data(), sum)) != 0 {
            debug!("udp: bad checksum from {}:{}", skb.route.src_ip, hdr.source);
            return Err(Errno::BadMessage);
        }
    }

    skb.skb_pull(UDP_HLEN)?;

    let config = stack.config();
    if hdr.dest == config.dhcp_client_port {
        stack.dhcp_rcv(skb)
    } else if hdr.dest == config.nbns_port {
        let dev = skb.dev().clone();
        stack.name_service().handle(&dev, skb);
        Ok(())
    } else {
        debug!(
            "udp: no listener on port {} ({} bytes from {}:{})",
            hdr.dest,
            skb.len(),
            skb.route.src_ip,
            hdr.source
        );
        Err(Errno::HostUnreachable)
    }
}
