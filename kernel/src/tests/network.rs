//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络子系统场景测试
//!
//! 通过 `netif_rx` 注入帧，检查测试网卡上实际发出的帧。

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::net::Ipv4Addr;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::{eth_frame, ipv4_packet, quiet_stack, split_udp_frame, test_interface, udp_packet, CaptureDevice};
use crate::errno::Errno;
use crate::net::af_inet::{inet_create, SockType};
use crate::net::arp::{ArpOp, ArpPacket, ArpState, ARP_HLEN};
use crate::net::buffer::{EthProtocol, IpProtocol, SkBuff};
use crate::net::ethernet::{EthHdr, MacAddr, ETH_HLEN};
use crate::net::icmp::{IcmpHdr, ICMP_ECHO, ICMP_ECHOREPLY, ICMP_HLEN};
use crate::net::interface::{NetInterface, NetState};
use crate::net::ipv4::{checksum, IpHdr, IPHDR_LEN};
use crate::net::nbns::NameService;
use crate::net::udp::udp_send;
use crate::net::{NetConfig, NetStack, IP_BROADCAST};
use crate::sync::IrqSpinLock;

const OUR_MAC: [u8; 6] = [0x52, 0x54, 0x00, 0x12, 0x34, 0x56];
const OUR_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);
const PEER_MAC: MacAddr = MacAddr([0x52, 0x54, 0x00, 0xAA, 0xBB, 0xCC]);
const PEER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

/// 注册一个已配置地址的接口
fn configured(stack: &NetStack) -> (Arc<NetInterface>, Arc<CaptureDevice>) {
    let (dev, capture) = test_interface("eth0", OUR_MAC);
    stack.register(&dev, NetState::Up).unwrap();
    dev.set_ip(OUR_IP);
    (dev, capture)
}

fn arp_frame(op: ArpOp, sha: MacAddr, sip: Ipv4Addr, tha: MacAddr, tip: Ipv4Addr, eth_dst: MacAddr) -> Vec<u8> {
    let mut arp = alloc::vec![0u8; ARP_HLEN];
    ArpPacket::new(op, sha, sip, tha, tip).write(&mut arp);
    eth_frame(eth_dst, sha, EthProtocol::ETH_P_ARP, &arp)
}

#[test]
fn test_arp_request_is_answered() {
    let stack = quiet_stack();
    let (dev, capture) = configured(&stack);

    // 对端广播询问本机地址
    let frame = arp_frame(ArpOp::ARPOP_REQUEST, PEER_MAC, PEER_IP, MacAddr::NONE, OUR_IP, MacAddr::BROADCAST);
    stack.netif_rx(&dev, &frame);

    assert_eq!(dev.rx_total(), frame.len() as u64, "rx counter should include the whole frame");

    let frames = capture.frames();
    assert_eq!(frames.len(), 1, "exactly one ARP reply expected");
    let eth = EthHdr::parse(&frames[0]).unwrap();
    assert_eq!(eth.h_dest, PEER_MAC);
    assert_eq!(eth.protocol(), Some(EthProtocol::ETH_P_ARP));

    let reply = ArpPacket::parse(&frames[0][ETH_HLEN..]).unwrap();
    assert!(reply.is_reply());
    assert_eq!(reply.ar_sha, dev.mac());
    assert_eq!(reply.ar_sip, OUR_IP);
    assert_eq!(reply.ar_tha, PEER_MAC);
    assert_eq!(reply.ar_tip, PEER_IP);

    // 请求方被顺带学习
    assert_eq!(stack.arp().lookup(PEER_IP), Some(PEER_MAC));
}

#[test]
fn test_arp_request_for_other_host_only_learns() {
    let stack = quiet_stack();
    let (dev, capture) = configured(&stack);

    let frame = arp_frame(
        ArpOp::ARPOP_REQUEST,
        PEER_MAC,
        PEER_IP,
        MacAddr::NONE,
        Ipv4Addr::new(10, 0, 0, 77),
        MacAddr::BROADCAST,
    );
    stack.netif_rx(&dev, &frame);

    assert!(capture.frames().is_empty());
    assert_eq!(stack.arp().state(PEER_IP), Some(ArpState::Resolved));
}

#[test]
fn test_udp_send_waits_for_arp_reply() {
    let stack = quiet_stack();
    let (dev, capture) = configured(&stack);

    // 1. 第一个数据包触发一次 ARP 请求
    udp_send(&stack, &dev, PEER_IP, 4000, 5000, b"first").unwrap();
    udp_send(&stack, &dev, PEER_IP, 4000, 5000, b"second").unwrap();

    let requests = capture.take();
    assert_eq!(requests.len(), 1, "one ARP request for two queued packets");
    let request = ArpPacket::parse(&requests[0][ETH_HLEN..]).unwrap();
    assert!(request.is_request());
    assert_eq!(request.ar_tip, PEER_IP);
    assert_eq!(stack.arp().pending(PEER_IP), 2);

    // 2. 应答到达后两个数据包都发出，后入队的先发
    let reply = arp_frame(ArpOp::ARPOP_REPLY, PEER_MAC, PEER_IP, dev.mac(), OUR_IP, dev.mac());
    stack.netif_rx(&dev, &reply);

    let frames = capture.take();
    assert_eq!(frames.len(), 2);
    let payloads: Vec<&[u8]> = frames
        .iter()
        .map(|f| {
            let (eth, ip, udp, payload) = split_udp_frame(f).unwrap();
            assert_eq!(eth.h_dest, PEER_MAC);
            assert_eq!(ip.saddr, OUR_IP);
            assert_eq!(ip.daddr, PEER_IP);
            assert_eq!(udp.dest, 5000);
            payload
        })
        .collect();
    assert_eq!(payloads, [&b"second"[..], &b"first"[..]]);

    // 3. 已解析后直接发送
    udp_send(&stack, &dev, PEER_IP, 4000, 5000, b"third").unwrap();
    assert_eq!(capture.frames().len(), 1);
}

#[test]
fn test_broadcast_skips_arp() {
    let stack = quiet_stack();
    let (dev, capture) = configured(&stack);

    udp_send(&stack, &dev, IP_BROADCAST, 4000, 5000, b"hello").unwrap();

    let frames = capture.frames();
    assert_eq!(frames.len(), 1);
    let (eth, ip, _, payload) = split_udp_frame(&frames[0]).unwrap();
    assert!(eth.h_dest.is_broadcast());
    assert_eq!(ip.daddr, IP_BROADCAST);
    assert_eq!(payload, b"hello");
    assert!(stack.arp().is_empty());
}

#[test]
fn test_send_on_down_interface() {
    let stack = quiet_stack();
    let (dev, capture) = test_interface("eth0", OUR_MAC);
    stack.register(&dev, NetState::Down).unwrap();

    assert_eq!(
        udp_send(&stack, &dev, IP_BROADCAST, 4000, 5000, b"x"),
        Err(Errno::NetworkDown)
    );
    assert!(capture.frames().is_empty());
}

#[test]
fn test_icmp_echo_reply() {
    let stack = quiet_stack();
    let (dev, capture) = configured(&stack);

    let mut icmp = alloc::vec![ICMP_ECHO, 0, 0, 0, 0x12, 0x34, 0x00, 0x07];
    icmp.extend_from_slice(b"abcdefg");
    let check = checksum::ip_checksum(&icmp);
    icmp[2..4].copy_from_slice(&check.to_be_bytes());

    let packet = ipv4_packet(PEER_IP, OUR_IP, IpProtocol::IPPROTO_ICMP, &icmp);
    stack.netif_rx(&dev, &eth_frame(dev.mac(), PEER_MAC, EthProtocol::ETH_P_IP, &packet));

    let frames = capture.frames();
    assert_eq!(frames.len(), 1, "reply goes straight out without an ARP request");
    let eth = EthHdr::parse(&frames[0]).unwrap();
    assert_eq!(eth.h_dest, PEER_MAC);

    let ip = IpHdr::parse(&frames[0][ETH_HLEN..]).unwrap();
    assert_eq!(ip.saddr, OUR_IP);
    assert_eq!(ip.daddr, PEER_IP);
    assert!(checksum::verify_checksum(&frames[0][ETH_HLEN..ETH_HLEN + IPHDR_LEN]));

    let msg = &frames[0][ETH_HLEN + IPHDR_LEN..];
    let hdr = IcmpHdr::parse(msg).unwrap();
    assert_eq!(hdr.icmp_type, ICMP_ECHOREPLY);
    assert_eq!(hdr.code, 0);
    assert_eq!(hdr.other, 0x1234_0007);
    assert_eq!(&msg[ICMP_HLEN..], b"abcdefg");
    assert!(checksum::verify_checksum(msg));
}

#[test]
fn test_rx_filters() {
    let stack = quiet_stack();
    let (dev, capture) = configured(&stack);

    // 发给别人的帧
    let other = MacAddr([0x02, 0, 0, 0, 0, 0x99]);
    let frame = arp_frame(ArpOp::ARPOP_REQUEST, PEER_MAC, PEER_IP, MacAddr::NONE, OUR_IP, other);
    stack.netif_rx(&dev, &frame);
    assert!(capture.frames().is_empty());
    assert!(stack.arp().is_empty());

    // 截断的帧
    stack.netif_rx(&dev, &frame[..10]);

    // 头部校验和错误的 IP 包
    let mut packet = udp_packet(PEER_IP, OUR_IP, 1, 2, b"x");
    packet[10] ^= 0xFF;
    stack.netif_rx(&dev, &eth_frame(dev.mac(), PEER_MAC, EthProtocol::ETH_P_IP, &packet));

    assert!(capture.frames().is_empty());
    assert_eq!(dev.stats().rx_packets, 3);
}

/// 记录登记与查询的名称服务
#[derive(Default)]
struct RecordingNames {
    registered: IrqSpinLock<Vec<(String, Ipv4Addr)>>,
    queries: AtomicUsize,
}

impl NameService for RecordingNames {
    fn register_name(&self, dev: &Arc<NetInterface>, name: &str) {
        self.registered.lock().push((String::from(name), dev.ip()));
    }

    fn handle(&self, _dev: &Arc<NetInterface>, skb: SkBuff) {
        assert_eq!(skb.data(), b"query");
        self.queries.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_ready_registers_hostname() {
    let names = Arc::new(RecordingNames::default());
    let config = NetConfig {
        dhcp_enabled: false,
        ..NetConfig::default()
    };
    let hostname = config.hostname.clone();
    let stack = NetStack::with_name_service(config, names.clone());
    let (dev, _) = configured(&stack);

    assert!(stack.set_state(&dev, NetState::Ready));
    assert!(!stack.set_state(&dev, NetState::Ready));

    let registered = names.registered.lock().clone();
    assert_eq!(registered, [(hostname, OUR_IP)]);
    assert_eq!(stack.registry().hostname().handles(), 0, "hostname handle released");
}

#[test]
fn test_udp_port_demux() {
    let names = Arc::new(RecordingNames::default());
    let stack = NetStack::with_name_service(
        NetConfig {
            dhcp_enabled: false,
            ..NetConfig::default()
        },
        names.clone(),
    );
    let (dev, capture) = configured(&stack);
    let nbns_port = stack.config().nbns_port;

    let packet = udp_packet(PEER_IP, OUR_IP, nbns_port, nbns_port, b"query");
    stack.netif_rx(&dev, &eth_frame(dev.mac(), PEER_MAC, EthProtocol::ETH_P_IP, &packet));
    assert_eq!(names.queries.load(Ordering::SeqCst), 1);

    // 没有监听者的端口静默丢弃
    let packet = udp_packet(PEER_IP, OUR_IP, 9, 9999, b"query");
    stack.netif_rx(&dev, &eth_frame(dev.mac(), PEER_MAC, EthProtocol::ETH_P_IP, &packet));
    assert_eq!(names.queries.load(Ordering::SeqCst), 1);
    assert!(capture.frames().is_empty());
}

#[test]
fn test_stack_protocols_and_shutdown() {
    let mut stack = quiet_stack();
    let (dev, _) = configured(&stack);

    let (ops, protocol) = inet_create(stack.protocols(), SockType::SOCK_DGRAM as u16, 0).unwrap();
    assert_eq!(ops.name(), "udp");
    assert_eq!(protocol, IpProtocol::IPPROTO_UDP.to_u8());

    udp_send(&stack, &dev, PEER_IP, 1, 2, b"stuck").unwrap();
    assert_eq!(stack.arp().pending(PEER_IP), 1);

    stack.shutdown();
    assert!(stack.registry().is_empty());
    assert!(stack.arp().is_empty());
    assert_eq!(stack.registry().listener_count(), 0);
}
