//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! ICMP 协议（仅回显）
//!
//! 参考: net/ipv4/icmp.c, include/uapi/linux/icmp.h

use log::debug;

use crate::errno::{Errno, Result};
use crate::net::buffer::{IpProtocol, SkBuff};
use crate::net::ipv4::{checksum, ip_push_header, ip_route_output};
use crate::net::NetStack;

/// ICMP 头部长度
pub const ICMP_HLEN: usize = 8;

/// 回显应答
pub const ICMP_ECHOREPLY: u8 = 0;

/// 回显请求
pub const ICMP_ECHO: u8 = 8;

/// ICMP 头部
///
/// 对应 Linux 的 icmphdr。`other` 是标识符加序号，请求与应答之间原样保留。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpHdr {
    /// 类型
    pub icmp_type: u8,
    /// 代码
    pub code: u8,
    /// 校验和
    pub checksum: u16,
    /// 标识符 (高 16 位) + 序号 (低 16 位)
    pub other: u32,
}

impl IcmpHdr {
    /// 从字节切片解析
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ICMP_HLEN {
            return None;
        }
        Some(Self {
            icmp_type: data[0],
            code: data[1],
            checksum: u16::from_be_bytes([data[2], data[3]]),
            other: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        })
    }
}

/// 在 SkBuff 尾部构造 ICMP 报文
///
/// # 参数
/// - `skb`: 空的 SkBuff
/// - `icmp_type`: 类型
/// - `other`: 标识符 + 序号
/// - `payload`: 数据
///
/// # 说明
/// 校验和覆盖类型、代码、other 与数据
pub fn icmp_build(skb: &mut SkBuff, icmp_type: u8, other: u32, payload: &[u8]) {
    let msg = skb.skb_put(ICMP_HLEN + payload.len());
    msg[0] = icmp_type;
    msg[1] = 0;
    msg[4..8].copy_from_slice(&other.to_be_bytes());
    msg[ICMP_HLEN..].copy_from_slice(payload);

    let check = checksum::ip_checksum(msg);
    msg[2..4].copy_from_slice(&check.to_be_bytes());
}

/// 处理接收到的 ICMP 报文
///
/// 对应 Linux 的 icmp_rcv()
///
/// # 说明
/// 只响应回显请求。应答直接发往请求者的以太网源地址，不查询 ARP 缓存。
pub fn icmp_rcv(stack: &NetStack, skb: SkBuff) -> Result<()> {
    let data = skb.data();
    let hdr = IcmpHdr::parse(data).ok_or(Errno::BadMessage)?;
    if !checksum::verify_checksum(data) {
        debug!("icmp: bad checksum from {}", skb.route.src_ip);
        return Err(Errno::BadMessage);
    }

    if hdr.icmp_type != ICMP_ECHO || hdr.code != 0 {
        debug!("icmp: ignoring type {} code {} from {}", hdr.icmp_type, hdr.code, skb.route.src_ip);
        return Ok(());
    }

    let dev = skb.dev().clone();
    let requester = skb.route.src_ip;
    let requester_mac = skb.route.hard_src;

    let mut reply = SkBuff::alloc(&dev, data.len());
    icmp_build(&mut reply, ICMP_ECHOREPLY, hdr.other, &data[ICMP_HLEN..]);
    ip_push_header(&mut reply, dev.ip(), requester, IpProtocol::IPPROTO_ICMP)?;
    reply.mark_resolved(requester_mac);

    debug!("icmp: echo reply to {} ({} bytes)", requester, data.len() - ICMP_HLEN);
    ip_route_output(stack, reply)
}
