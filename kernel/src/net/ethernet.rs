//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 以太网层
//!
//! 对应 Linux 的 net/ethernet/eth.c 与 dev_queue_xmit() (net/core/dev.c)

use core::fmt;

use log::{trace, warn};

use crate::errno::{Errno, Result};
use crate::net::buffer::{EthProtocol, PacketState, SkBuff};

/// 以太网头部长度
pub const ETH_HLEN: usize = 14;

/// 以太网最小帧长度 (不含 FCS)
pub const ETH_ZLEN: usize = 60;

/// 以太网地址长度 (MAC 地址)
pub const ETH_ALEN: usize = 6;

/// 以太网 MTU (使用配置值)
pub use crate::config::ETH_MTU;

/// MAC 地址
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MacAddr(pub [u8; ETH_ALEN]);

impl MacAddr {
    /// 未设置的地址 (全 0)
    pub const NONE: MacAddr = MacAddr([0; ETH_ALEN]);

    /// 广播地址 (全 1)
    pub const BROADCAST: MacAddr = MacAddr([0xFF; ETH_ALEN]);

    /// 从切片读取，长度不足返回 None
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; ETH_ALEN] = bytes.get(..ETH_ALEN)?.try_into().ok()?;
        Some(MacAddr(raw))
    }

    /// 原始字节
    pub const fn octets(&self) -> [u8; ETH_ALEN] {
        self.0
    }

    /// 是否为全 0
    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// 是否为广播地址
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// 是否为多播地址（首字节最低位为 1，广播也属于多播）
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// 以太网帧头部
///
/// 对应 Linux 的 ethhdr (include/uapi/linux/if_ether.h)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthHdr {
    /// 目标 MAC 地址
    pub h_dest: MacAddr,
    /// 源 MAC 地址
    pub h_source: MacAddr,
    /// 协议类型（主机序数值，线上为大端）
    pub h_proto: u16,
}

impl EthHdr {
    /// 从字节切片解析
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ETH_HLEN {
            return None;
        }
        Some(Self {
            h_dest: MacAddr::from_slice(&data[0..6])?,
            h_source: MacAddr::from_slice(&data[6..12])?,
            h_proto: u16::from_be_bytes([data[12], data[13]]),
        })
    }

    /// 写入字节切片（至少 ETH_HLEN 字节）
    pub fn write(&self, out: &mut [u8]) {
        out[0..6].copy_from_slice(&self.h_dest.0);
        out[6..12].copy_from_slice(&self.h_source.0);
        out[12..14].copy_from_slice(&self.h_proto.to_be_bytes());
    }

    /// 获取协议类型
    pub fn protocol(&self) -> Option<EthProtocol> {
        EthProtocol::from_u16(self.h_proto)
    }

    /// 检查是否为本机帧 (目标 MAC 为本机或广播/多播)
    pub fn is_for_us(&self, our_mac: &MacAddr) -> bool {
        self.h_dest == *our_mac || self.h_dest.is_multicast()
    }
}

/// 在 SkBuff 前面添加以太网头部
///
/// # 参数
/// - `skb`: SkBuff
/// - `dest`: 目标 MAC 地址
/// - `src`: 源 MAC 地址
/// - `proto`: 协议类型
pub fn eth_push_header(skb: &mut SkBuff, dest: MacAddr, src: MacAddr, proto: EthProtocol) -> Result<()> {
    let hdr = EthHdr {
        h_dest: dest,
        h_source: src,
        h_proto: proto.to_u16(),
    };
    hdr.write(skb.skb_push(ETH_HLEN)?);
    skb.set_mac_header();
    Ok(())
}

/// 解析并移除以太网头部
///
/// # 返回
/// 以太网头部，帧长度不足返回 EBADMSG
pub fn eth_pull_header(skb: &mut SkBuff) -> Result<EthHdr> {
    let hdr = EthHdr::parse(skb.data()).ok_or(Errno::BadMessage)?;
    skb.set_mac_header();
    skb.skb_pull(ETH_HLEN)?;
    Ok(hdr)
}

/// 将已解析的数据包交给网络设备发送
///
/// 对应 Linux 的 dev_queue_xmit()
///
/// # 说明
/// - 数据包必须处于 `Resolved` 状态，目标 MAC 取自路由信息
/// - 添加以太网头部，累加接口发送字节数，所有权移交驱动
/// - 驱动发送失败只记录日志，不重试
pub fn dev_queue_xmit(mut skb: SkBuff) -> Result<()> {
    if skb.state != PacketState::Resolved {
        warn!("eth: refusing to transmit unresolved packet to {}", skb.route.dst_ip);
        return Err(Errno::InvalidArgument);
    }

    let dev = skb.dev().clone();
    let dest = skb.route.hard_dst;
    let proto = skb.protocol;
    eth_push_header(&mut skb, dest, dev.mac(), proto)?;

    let len = skb.len();
    dev.add_tx_bytes(len as u64);
    trace!("eth: {} xmit {} bytes to {} ({:?})", dev.name(), len, dest, proto);

    #[cfg(feature = "debug_log")]
    log::debug!("eth: {} tx {:02x?}", dev.name(), skb.data());

    dev.ops().xmit(skb).map_err(|err| {
        warn!("eth: {} driver xmit failed: {}", dev.name(), err);
        err
    })
}
