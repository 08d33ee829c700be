//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! ARP 协议
//!
//! 遵循 Linux 内核的 ARP 实现
//! 参考: net/ipv4/arp.c, net/core/neighbour.c, include/uapi/linux/if_arp.h
//!
//! # 缓存表项状态
//!
//! ```text
//!              首次发送未命中 / 发出一次请求
//!  (不存在) ───────────────────────────────> UNRESOLVED ──收到应答──> RESOLVED
//!      │                                                                ^
//!      └──────────────────── 收到主动应答 ──────────────────────────────┘
//! ```
//!
//! - 每个 IP 至多一个表项，表项不会老化或淘汰
//! - UNRESOLVED 表项持有等待队列，新数据包插入队头，解析完成后从队头依次发送
//!   （后入队的先发送）
//! - 未解析的表项没有超时，等待中的数据包会一直保留

use alloc::collections::btree_map::{BTreeMap, Entry};
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::net::Ipv4Addr;

use log::debug;

use crate::drivers::net::ArpHrdType;
use crate::errno::{Errno, Result};
use crate::net::buffer::{EthProtocol, SkBuff};
use crate::net::ethernet::{dev_queue_xmit, MacAddr, ETH_ALEN};
use crate::net::interface::NetInterface;
use crate::net::{NetStack, IP_BROADCAST, IP_NONE};
use crate::sync::IrqSpinLock;

/// ARP 报文长度 (以太网 + IPv4)
pub const ARP_HLEN: usize = 28;

/// IPv4 地址长度
const IPV4_ALEN: u8 = 4;

/// ARP 操作类型
///
/// 对应 Linux 的 ARPOP_* (include/uapi/linux/if_arp.h)
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum ArpOp {
    /// ARP 请求
    ARPOP_REQUEST = 1,
    /// ARP 响应
    ARPOP_REPLY = 2,
}

/// ARP 报文 (以太网 + IPv4)
///
/// 对应 Linux 的 arphdr 及其后的地址字段
///
/// | 偏移 | 长度 | 字段 | 字节序 |
/// |------|------|------|--------|
/// | 0    | 2    | 硬件类型 | 大端 |
/// | 2    | 2    | 协议类型 | 大端 |
/// | 4    | 1    | 硬件地址长度 | - |
/// | 5    | 1    | 协议地址长度 | - |
/// | 6    | 2    | 操作码 | 大端 |
/// | 8    | 6    | 发送方 MAC | - |
/// | 14   | 4    | 发送方 IP | 网络序 |
/// | 18   | 6    | 目标 MAC | - |
/// | 24   | 4    | 目标 IP | 网络序 |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    /// 硬件类型 (ARPHRD_ETHER = 1)
    pub ar_hrd: u16,
    /// 协议类型 (ETH_P_IP = 0x0800)
    pub ar_pro: u16,
    /// 硬件地址长度
    pub ar_hln: u8,
    /// 协议地址长度
    pub ar_pln: u8,
    /// 操作码
    pub ar_op: u16,
    /// 发送方硬件地址
    pub ar_sha: MacAddr,
    /// 发送方 IP
    pub ar_sip: Ipv4Addr,
    /// 目标硬件地址
    pub ar_tha: MacAddr,
    /// 目标 IP
    pub ar_tip: Ipv4Addr,
}

impl ArpPacket {
    /// 构造以太网/IPv4 ARP 报文
    pub fn new(op: ArpOp, sha: MacAddr, sip: Ipv4Addr, tha: MacAddr, tip: Ipv4Addr) -> Self {
        Self {
            ar_hrd: ArpHrdType::ARPHRD_ETHER.to_u16(),
            ar_pro: EthProtocol::ETH_P_IP.to_u16(),
            ar_hln: ETH_ALEN as u8,
            ar_pln: IPV4_ALEN,
            ar_op: op as u16,
            ar_sha: sha,
            ar_sip: sip,
            ar_tha: tha,
            ar_tip: tip,
        }
    }

    /// 从字节切片解析，长度不足返回 None
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ARP_HLEN {
            return None;
        }
        let ip = |off: usize| Ipv4Addr::new(data[off], data[off + 1], data[off + 2], data[off + 3]);
        Some(Self {
            ar_hrd: u16::from_be_bytes([data[0], data[1]]),
            ar_pro: u16::from_be_bytes([data[2], data[3]]),
            ar_hln: data[4],
            ar_pln: data[5],
            ar_op: u16::from_be_bytes([data[6], data[7]]),
            ar_sha: MacAddr::from_slice(&data[8..14])?,
            ar_sip: ip(14),
            ar_tha: MacAddr::from_slice(&data[18..24])?,
            ar_tip: ip(24),
        })
    }

    /// 写入字节切片（至少 ARP_HLEN 字节）
    pub fn write(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&self.ar_hrd.to_be_bytes());
        out[2..4].copy_from_slice(&self.ar_pro.to_be_bytes());
        out[4] = self.ar_hln;
        out[5] = self.ar_pln;
        out[6..8].copy_from_slice(&self.ar_op.to_be_bytes());
        out[8..14].copy_from_slice(&self.ar_sha.0);
        out[14..18].copy_from_slice(&self.ar_sip.octets());
        out[18..24].copy_from_slice(&self.ar_tha.0);
        out[24..28].copy_from_slice(&self.ar_tip.octets());
    }

    /// 是否为以太网/IPv4 ARP
    pub fn is_ether_ipv4(&self) -> bool {
        self.ar_hrd == ArpHrdType::ARPHRD_ETHER.to_u16()
            && self.ar_pro == EthProtocol::ETH_P_IP.to_u16()
            && self.ar_hln == ETH_ALEN as u8
            && self.ar_pln == IPV4_ALEN
    }

    /// 检查是否为 ARP 请求
    pub fn is_request(&self) -> bool {
        self.ar_op == ArpOp::ARPOP_REQUEST as u16
    }

    /// 检查是否为 ARP 响应
    pub fn is_reply(&self) -> bool {
        self.ar_op == ArpOp::ARPOP_REPLY as u16
    }
}

/// 表项解析状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpState {
    /// 已发出请求，等待应答
    Unresolved,
    /// 硬件地址已知
    Resolved,
}

/// ARP 缓存表项
///
/// 对应 Linux 的 neighbour
struct ArpEntry {
    inner: IrqSpinLock<ArpEntryInner>,
}

struct ArpEntryInner {
    state: ArpState,
    mac: MacAddr,
    /// 等待解析的数据包，队头为最新
    pending: VecDeque<SkBuff>,
}

impl ArpEntry {
    fn unresolved(first: SkBuff) -> Self {
        let mut pending = VecDeque::new();
        pending.push_front(first);
        Self {
            inner: IrqSpinLock::new(ArpEntryInner {
                state: ArpState::Unresolved,
                mac: MacAddr::NONE,
                pending,
            }),
        }
    }

    fn resolved(mac: MacAddr) -> Self {
        Self {
            inner: IrqSpinLock::new(ArpEntryInner {
                state: ArpState::Resolved,
                mac,
                pending: VecDeque::new(),
            }),
        }
    }
}

/// resolve() 在锁内做出的决定，锁外执行
enum ResolveAction {
    /// 已解析，立即发送
    Transmit(SkBuff),
    /// 新表项，发出一次请求
    Request,
    /// 已有请求在途，数据包已入队
    Queued,
}

/// ARP 缓存
///
/// 表锁保护 IP 到表项的映射；每个表项自带锁保护状态与等待队列。
/// 加锁顺序总是先表锁后表项锁，所有发送都在释放锁之后进行。
pub struct ArpCache {
    table: IrqSpinLock<BTreeMap<Ipv4Addr, Arc<ArpEntry>>>,
}

impl ArpCache {
    /// 创建空缓存
    pub const fn new() -> Self {
        Self {
            table: IrqSpinLock::new(BTreeMap::new()),
        }
    }

    /// 解析数据包的目标硬件地址并发送
    ///
    /// 对应 Linux 的 neigh_resolve_output()
    ///
    /// # 参数
    /// - `skb`: 已设置 `route.dst_ip` 的数据包
    ///
    /// # 说明
    /// - 目标为广播地址：填入广播 MAC 直接发送，不访问缓存
    /// - 未命中：创建 UNRESOLVED 表项，数据包入队，发出唯一一次请求
    /// - 命中 UNRESOLVED：入队，不再发请求
    /// - 命中 RESOLVED：填入缓存的 MAC 立即发送
    pub fn resolve(&self, mut skb: SkBuff) -> Result<()> {
        let dst = skb.route.dst_ip;
        if dst == IP_BROADCAST {
            skb.mark_resolved(MacAddr::BROADCAST);
            return dev_queue_xmit(skb);
        }

        let dev = skb.dev().clone();
        let action = {
            let mut table = self.table.lock();
            match table.entry(dst) {
                Entry::Occupied(slot) => {
                    let mut entry = slot.get().inner.lock();
                    match entry.state {
                        ArpState::Resolved => {
                            skb.mark_resolved(entry.mac);
                            ResolveAction::Transmit(skb)
                        }
                        ArpState::Unresolved => {
                            entry.pending.push_front(skb);
                            ResolveAction::Queued
                        }
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(ArpEntry::unresolved(skb)));
                    ResolveAction::Request
                }
            }
        };

        match action {
            ResolveAction::Transmit(skb) => dev_queue_xmit(skb),
            ResolveAction::Request => {
                debug!("arp: {} who-has {} tell {}", dev.name(), dst, dev.ip());
                arp_send(&dev, ArpOp::ARPOP_REQUEST, MacAddr::NONE, dst, MacAddr::BROADCAST)
            }
            ResolveAction::Queued => {
                debug!("arp: {} queued packet for {} behind pending request", dev.name(), dst);
                Ok(())
            }
        }
    }

    /// 学习 IP 到 MAC 的映射
    ///
    /// # 说明
    /// - 表项 UNRESOLVED：切换为 RESOLVED，记录 MAC，发送全部等待中的数据包
    /// - 表项 RESOLVED：不更新
    /// - 不存在：创建 RESOLVED 表项（主动应答预填缓存）
    ///
    /// # 返回
    /// 发送的等待数据包数量
    pub fn learn(&self, ip: Ipv4Addr, mac: MacAddr) -> usize {
        let drained = {
            let mut table = self.table.lock();
            match table.entry(ip) {
                Entry::Occupied(slot) => {
                    let mut entry = slot.get().inner.lock();
                    match entry.state {
                        ArpState::Resolved => return 0,
                        ArpState::Unresolved => {
                            entry.state = ArpState::Resolved;
                            entry.mac = mac;
                            core::mem::take(&mut entry.pending)
                        }
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(ArpEntry::resolved(mac)));
                    debug!("arp: learned {} at {} (unsolicited)", ip, mac);
                    return 0;
                }
            }
        };

        debug!("arp: {} is at {}, sending {} queued packets", ip, mac, drained.len());
        let count = drained.len();
        for mut skb in drained {
            skb.mark_resolved(mac);
            // 驱动失败已在 dev_queue_xmit 中记录，继续发送其余数据包
            let _ = dev_queue_xmit(skb);
        }
        count
    }

    /// 查询已解析的 MAC 地址
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        let table = self.table.lock();
        let entry = table.get(&ip)?.inner.lock();
        match entry.state {
            ArpState::Resolved => Some(entry.mac),
            ArpState::Unresolved => None,
        }
    }

    /// 查询表项状态
    pub fn state(&self, ip: Ipv4Addr) -> Option<ArpState> {
        let table = self.table.lock();
        let state = table.get(&ip)?.inner.lock().state;
        Some(state)
    }

    /// 等待解析的数据包数量
    pub fn pending(&self, ip: Ipv4Addr) -> usize {
        let table = self.table.lock();
        table.get(&ip).map_or(0, |e| e.inner.lock().pending.len())
    }

    /// 表项数量
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 清空缓存，等待中的数据包随表项一起释放
    pub fn clear(&self) -> usize {
        let entries: Vec<Arc<ArpEntry>> = {
            let mut table = self.table.lock();
            core::mem::take(&mut *table).into_values().collect()
        };
        entries
            .iter()
            .map(|e| core::mem::take(&mut e.inner.lock().pending).len())
            .sum()
    }
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new()
    }
}

/// 构造并发送一个 ARP 报文
///
/// 对应 Linux 的 arp_send()
///
/// # 参数
/// - `dev`: 发送接口，发送方地址取自接口
/// - `op`: 操作码
/// - `tha`: 目标 MAC（请求时为 NONE）
/// - `tip`: 目标 IP
/// - `hard_dst`: 以太网目标地址
pub fn arp_send(dev: &Arc<NetInterface>, op: ArpOp, tha: MacAddr, tip: Ipv4Addr, hard_dst: MacAddr) -> Result<()> {
    let pkt = ArpPacket::new(op, dev.mac(), dev.ip(), tha, tip);

    let mut skb = SkBuff::alloc(dev, ARP_HLEN);
    pkt.write(skb.skb_put(ARP_HLEN));
    skb.set_network_header();
    skb.protocol = EthProtocol::ETH_P_ARP;
    skb.route.src_ip = dev.ip();
    skb.route.dst_ip = tip;
    skb.mark_resolved(hard_dst);

    dev_queue_xmit(skb)
}

/// 处理接收到的 ARP 报文
///
/// 对应 Linux 的 arp_rcv() / arp_process()
///
/// # 说明
/// - 目标 IP 是本接口地址且目标 MAC 未填写时，单播回复本接口的 MAC
/// - 无论请求还是应答，都用发送方地址更新缓存（见 [`ArpCache::learn`]）
/// - 格式错误的报文静默丢弃
pub fn arp_rcv(stack: &NetStack, skb: SkBuff) -> Result<()> {
    let dev = skb.dev().clone();

    let pkt = ArpPacket::parse(skb.data()).ok_or_else(|| {
        debug!("arp: {} truncated packet ({} bytes)", dev.name(), skb.len());
        Errno::BadMessage
    })?;

    if !pkt.is_ether_ipv4() {
        debug!("arp: {} ignoring hrd {:#x} pro {:#x}", dev.name(), pkt.ar_hrd, pkt.ar_pro);
        return Err(Errno::ProtocolNotSupported);
    }

    let our_ip = dev.ip();
    if our_ip != IP_NONE && pkt.ar_tip == our_ip && pkt.ar_tha.is_none() {
        debug!("arp: {} replying to {} ({})", dev.name(), pkt.ar_sip, pkt.ar_sha);
        arp_send(&dev, ArpOp::ARPOP_REPLY, pkt.ar_sha, pkt.ar_sip, pkt.ar_sha)?;
    }

    if pkt.ar_sip != IP_NONE {
        stack.arp().learn(pkt.ar_sip, pkt.ar_sha);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ethernet::{EthHdr, ETH_HLEN};
    use crate::tests::test_interface;

    const PEER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const PEER_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x99]);

    fn ip_packet(dev: &Arc<NetInterface>, dst: Ipv4Addr, tag: u8) -> SkBuff {
        let mut skb = SkBuff::alloc(dev, 1);
        skb.skb_put_data(&[tag]);
        skb.protocol = EthProtocol::ETH_P_IP;
        skb.route.dst_ip = dst;
        skb
    }

    #[test]
    fn test_arp_packet_layout() {
        let pkt = ArpPacket::new(
            ArpOp::ARPOP_REQUEST,
            MacAddr([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]),
            Ipv4Addr::new(192, 168, 1, 2),
            MacAddr::NONE,
            Ipv4Addr::new(192, 168, 1, 1),
        );
        let mut buf = [0u8; ARP_HLEN];
        pkt.write(&mut buf);

        assert_eq!(&buf[0..8], &[0x00, 0x01, 0x08, 0x00, 6, 4, 0x00, 0x01]);
        assert_eq!(&buf[14..18], &[192, 168, 1, 2]);
        assert_eq!(&buf[24..28], &[192, 168, 1, 1]);
        assert_eq!(ArpPacket::parse(&buf), Some(pkt));
        assert!(ArpPacket::parse(&buf[..27]).is_none());
    }

    #[test]
    fn test_single_request_invariant() {
        let (dev, capture) = test_interface("eth0", [0x02, 0, 0, 0, 0, 1]);
        let cache = ArpCache::new();

        cache.resolve(ip_packet(&dev, PEER_IP, 1)).unwrap();
        cache.resolve(ip_packet(&dev, PEER_IP, 2)).unwrap();
        cache.resolve(ip_packet(&dev, PEER_IP, 3)).unwrap();

        let frames = capture.frames();
        assert_eq!(frames.len(), 1);
        let eth = EthHdr::parse(&frames[0]).unwrap();
        assert!(eth.h_dest.is_broadcast());
        assert_eq!(eth.protocol(), Some(EthProtocol::ETH_P_ARP));
        let req = ArpPacket::parse(&frames[0][ETH_HLEN..]).unwrap();
        assert!(req.is_request());
        assert_eq!(req.ar_tip, PEER_IP);
        assert!(req.ar_tha.is_none());

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.state(PEER_IP), Some(ArpState::Unresolved));
        assert_eq!(cache.pending(PEER_IP), 3);
    }

    #[test]
    fn test_broadcast_bypasses_cache() {
        let (dev, capture) = test_interface("eth0", [0x02, 0, 0, 0, 0, 1]);
        let cache = ArpCache::new();

        cache.resolve(ip_packet(&dev, IP_BROADCAST, 7)).unwrap();

        assert!(cache.is_empty());
        let frames = capture.frames();
        assert_eq!(frames.len(), 1);
        assert!(EthHdr::parse(&frames[0]).unwrap().h_dest.is_broadcast());
        assert_eq!(frames[0][ETH_HLEN], 7);
    }

    #[test]
    fn test_resolution_drains_queue_newest_first() {
        let (dev, capture) = test_interface("eth0", [0x02, 0, 0, 0, 0, 1]);
        let cache = ArpCache::new();

        for tag in 1..=3 {
            cache.resolve(ip_packet(&dev, PEER_IP, tag)).unwrap();
        }
        capture.clear();

        assert_eq!(cache.learn(PEER_IP, PEER_MAC), 3);
        assert_eq!(cache.state(PEER_IP), Some(ArpState::Resolved));
        assert_eq!(cache.lookup(PEER_IP), Some(PEER_MAC));
        assert_eq!(cache.pending(PEER_IP), 0);

        let frames = capture.frames();
        let tags: Vec<u8> = frames.iter().map(|f| f[ETH_HLEN]).collect();
        assert_eq!(tags, [3, 2, 1]);
        for frame in &frames {
            assert_eq!(EthHdr::parse(frame).unwrap().h_dest, PEER_MAC);
        }

        // 第二次应答不会重复发送
        assert_eq!(cache.learn(PEER_IP, PEER_MAC), 0);
        assert_eq!(capture.frames().len(), 3);
    }

    #[test]
    fn test_resolved_entry_transmits_immediately() {
        let (dev, capture) = test_interface("eth0", [0x02, 0, 0, 0, 0, 1]);
        let cache = ArpCache::new();
        cache.learn(PEER_IP, PEER_MAC);

        cache.resolve(ip_packet(&dev, PEER_IP, 9)).unwrap();

        let frames = capture.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(EthHdr::parse(&frames[0]).unwrap().h_dest, PEER_MAC);
        assert_eq!(cache.pending(PEER_IP), 0);
    }

    #[test]
    fn test_resolved_entry_is_not_refreshed() {
        let cache = ArpCache::new();
        cache.learn(PEER_IP, PEER_MAC);
        cache.learn(PEER_IP, MacAddr([0x02, 0, 0, 0, 0, 0x42]));
        assert_eq!(cache.lookup(PEER_IP), Some(PEER_MAC));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear_releases_pending() {
        let (dev, _) = test_interface("eth0", [0x02, 0, 0, 0, 0, 1]);
        let cache = ArpCache::new();
        cache.resolve(ip_packet(&dev, PEER_IP, 1)).unwrap();
        cache.resolve(ip_packet(&dev, Ipv4Addr::new(10, 0, 0, 2), 2)).unwrap();

        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_arp_send_reply_is_resolved() {
        let (dev, capture) = test_interface("eth0", [0x02, 0, 0, 0, 0, 1]);
        dev.set_ip(Ipv4Addr::new(10, 0, 0, 5));

        arp_send(&dev, ArpOp::ARPOP_REPLY, PEER_MAC, PEER_IP, PEER_MAC).unwrap();

        let frames = capture.frames();
        let reply = ArpPacket::parse(&frames[0][ETH_HLEN..]).unwrap();
        assert!(reply.is_reply());
        assert_eq!(reply.ar_sha, dev.mac());
        assert_eq!(reply.ar_sip, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(reply.ar_tha, PEER_MAC);
        assert_eq!(EthHdr::parse(&frames[0]).unwrap().h_dest, PEER_MAC);
    }
}
