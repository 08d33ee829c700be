//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 测试支撑
//!
//! 提供捕获发送帧的测试网卡、协议栈构造与报文拼装工具。
//! 场景测试在 `network` 与 `dhcp` 子模块中，各模块的单元测试也复用这里的工具。

pub mod network;

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::net::Ipv4Addr;

use crate::drivers::net::NetDeviceOps;
use crate::errno::Result;
use crate::net::buffer::{EthProtocol, IpProtocol, SkBuff};
use crate::net::ethernet::{EthHdr, MacAddr, ETH_HLEN};
use crate::net::interface::NetInterface;
use crate::net::ipv4::{checksum, IpHdr, IPHDR_LEN};
use crate::net::udp::{UdpHdr, UDP_HLEN};
use crate::net::{NetConfig, NetStack};
use crate::sync::IrqSpinLock;

/// 记录所有发送帧的测试网卡
#[derive(Default)]
pub struct CaptureDevice {
    frames: IrqSpinLock<Vec<Vec<u8>>>,
}

impl CaptureDevice {
    /// 已发送帧的副本
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().clone()
    }

    /// 取走已发送帧
    pub fn take(&self) -> Vec<Vec<u8>> {
        core::mem::take(&mut *self.frames.lock())
    }

    /// 丢弃已发送帧
    pub fn clear(&self) {
        self.frames.lock().clear();
    }
}

impl NetDeviceOps for CaptureDevice {
    fn xmit(&self, skb: SkBuff) -> Result<()> {
        self.frames.lock().push(skb.data().to_vec());
        Ok(())
    }
}

/// 创建挂着测试网卡的接口（未注册）
pub fn test_interface(name: &str, mac: [u8; 6]) -> (Arc<NetInterface>, Arc<CaptureDevice>) {
    let capture = Arc::new(CaptureDevice::default());
    let dev = NetInterface::new(name, MacAddr(mac), capture.clone());
    (dev, capture)
}

/// 不自动启动 DHCP 的协议栈
pub fn quiet_stack() -> NetStack {
    NetStack::new(NetConfig {
        dhcp_enabled: false,
        ..NetConfig::default()
    })
}

/// 拼装以太网帧
pub fn eth_frame(dst: MacAddr, src: MacAddr, proto: EthProtocol, payload: &[u8]) -> Vec<u8> {
    let mut frame = alloc::vec![0u8; ETH_HLEN];
    EthHdr {
        h_dest: dst,
        h_source: src,
        h_proto: proto.to_u16(),
    }
    .write(&mut frame);
    frame.extend_from_slice(payload);
    frame
}

/// 拼装 IPv4 数据包（头部校验和已填）
pub fn ipv4_packet(src: Ipv4Addr, dst: Ipv4Addr, proto: IpProtocol, payload: &[u8]) -> Vec<u8> {
    let mut packet = alloc::vec![0u8; IPHDR_LEN];
    IpHdr::new(src, dst, proto.to_u8(), payload.len(), 64).write(&mut packet);
    packet.extend_from_slice(payload);
    packet
}

/// 拼装 UDP/IPv4 数据包（UDP 校验和已填）
pub fn udp_packet(src: Ipv4Addr, dst: Ipv4Addr, sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
    let mut segment = alloc::vec![0u8; UDP_HLEN];
    UdpHdr {
        source: sport,
        dest: dport,
        len: (UDP_HLEN + payload.len()) as u16,
        check: 0,
    }
    .write(&mut segment);
    segment.extend_from_slice(payload);
    let check = checksum::transport_checksum(src, dst, IpProtocol::IPPROTO_UDP.to_u8(), &segment);
    segment[6..8].copy_from_slice(&check.to_be_bytes());

    ipv4_packet(src, dst, IpProtocol::IPPROTO_UDP, &segment)
}

/// 从发送帧中拆出 UDP 载荷
///
/// 返回以太网头、IP 头、UDP 头与载荷；不是 UDP/IPv4 帧时返回 None
pub fn split_udp_frame(frame: &[u8]) -> Option<(EthHdr, IpHdr, UdpHdr, &[u8])> {
    let eth = EthHdr::parse(frame)?;
    if eth.protocol() != Some(EthProtocol::ETH_P_IP) {
        return None;
    }
    let ip = IpHdr::parse(&frame[ETH_HLEN..])?;
    if ip.protocol != IpProtocol::IPPROTO_UDP.to_u8() {
        return None;
    }
    let l4 = &frame[ETH_HLEN + ip.header_len()..ETH_HLEN + ip.tot_len as usize];
    let udp = UdpHdr::parse(l4)?;
    Some((eth, ip, udp, &l4[UDP_HLEN..udp.len as usize]))
}
