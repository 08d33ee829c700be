//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! DHCP 报文编解码
//!
//! 参考: RFC 2131 (报文格式), RFC 2132 (选项)
//!
//! 报文布局：
//! ```text
//! | 固定头部 236 字节 | 魔数 4 字节 | TLV 选项 ... | END |
//! ```
//! 所有多字节字段为网络字节序。

use alloc::string::String;
use alloc::vec::Vec;
use core::net::Ipv4Addr;

use log::debug;

use crate::errno::{Errno, Result};
use crate::net::ethernet::{MacAddr, ETH_ALEN};

/// 固定头部长度（不含魔数）
pub const DHCP_HLEN: usize = 236;

/// 魔数
pub const DHCP_MAGIC_COOKIE: u32 = 0x6382_5363;

/// 固定头部加魔数的长度，选项从这里开始
pub const DHCP_OPTIONS_OFFSET: usize = DHCP_HLEN + 4;

/// 客户端发出
pub const BOOTREQUEST: u8 = 1;

/// 服务器发出
pub const BOOTREPLY: u8 = 2;

/// 以太网硬件类型
pub const HTYPE_ETHER: u8 = 1;

/// DHCP 选项标签 (RFC 2132)
pub mod dhcp_opt {
    pub const PAD: u8 = 0;
    pub const SUBNET_MASK: u8 = 1;
    pub const ROUTER: u8 = 3;
    pub const DNS: u8 = 6;
    pub const HOST_NAME: u8 = 12;
    pub const REQUESTED_IP: u8 = 50;
    pub const LEASE_TIME: u8 = 51;
    pub const MESSAGE_TYPE: u8 = 53;
    pub const SERVER_ID: u8 = 54;
    pub const PARAMETER_REQUEST: u8 = 55;
    pub const RENEWAL_TIME: u8 = 58;
    pub const REBINDING_TIME: u8 = 59;
    pub const END: u8 = 255;
}

/// DHCP 消息类型（选项 53）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpMessageType {
    Discover,
    Offer,
    Request,
    Decline,
    Ack,
    Nak,
    Release,
    Inform,
    /// 未定义的类型值
    Unknown(u8),
}

impl DhcpMessageType {
    /// 从 u8 转换
    pub fn from_u8(val: u8) -> Self {
        match val {
            1 => DhcpMessageType::Discover,
            2 => DhcpMessageType::Offer,
            3 => DhcpMessageType::Request,
            4 => DhcpMessageType::Decline,
            5 => DhcpMessageType::Ack,
            6 => DhcpMessageType::Nak,
            7 => DhcpMessageType::Release,
            8 => DhcpMessageType::Inform,
            other => DhcpMessageType::Unknown(other),
        }
    }

    /// 转换为 u8
    pub fn as_u8(self) -> u8 {
        match self {
            DhcpMessageType::Discover => 1,
            DhcpMessageType::Offer => 2,
            DhcpMessageType::Request => 3,
            DhcpMessageType::Decline => 4,
            DhcpMessageType::Ack => 5,
            DhcpMessageType::Nak => 6,
            DhcpMessageType::Release => 7,
            DhcpMessageType::Inform => 8,
            DhcpMessageType::Unknown(val) => val,
        }
    }
}

/// DHCP 固定头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DhcpHeader {
    /// 操作码 (BOOTREQUEST / BOOTREPLY)
    pub op: u8,
    /// 硬件类型
    pub htype: u8,
    /// 硬件地址长度
    pub hlen: u8,
    /// 中继跳数
    pub hops: u8,
    /// 事务 ID
    pub xid: u32,
    /// 已用秒数
    pub secs: u16,
    /// 标志
    pub flags: u16,
    /// 客户端地址
    pub ciaddr: Ipv4Addr,
    /// 分配给客户端的地址
    pub yiaddr: Ipv4Addr,
    /// 下一跳服务器地址
    pub siaddr: Ipv4Addr,
    /// 中继代理地址
    pub giaddr: Ipv4Addr,
    /// 客户端硬件地址（chaddr 的前 6 字节）
    pub chaddr: MacAddr,
}

impl DhcpHeader {
    /// 构造客户端请求头部
    pub fn request(chaddr: MacAddr, xid: u32) -> Self {
        Self {
            op: BOOTREQUEST,
            htype: HTYPE_ETHER,
            hlen: ETH_ALEN as u8,
            hops: 0,
            xid,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr,
        }
    }

    /// 解析头部并检查魔数
    ///
    /// # 返回
    /// 长度不足返回 EBADMSG，魔数不符返回 EPROTO
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < DHCP_OPTIONS_OFFSET {
            return Err(Errno::BadMessage);
        }
        let be16 = |off: usize| u16::from_be_bytes([data[off], data[off + 1]]);
        let be32 = |off: usize| u32::from_be_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]]);
        let ip = |off: usize| Ipv4Addr::new(data[off], data[off + 1], data[off + 2], data[off + 3]);

        if be32(DHCP_HLEN) != DHCP_MAGIC_COOKIE {
            return Err(Errno::ProtocolError);
        }

        Ok(Self {
            op: data[0],
            htype: data[1],
            hlen: data[2],
            hops: data[3],
            xid: be32(4),
            secs: be16(8),
            flags: be16(10),
            ciaddr: ip(12),
            yiaddr: ip(16),
            siaddr: ip(20),
            giaddr: ip(24),
            chaddr: MacAddr::from_slice(&data[28..28 + ETH_ALEN]).ok_or(Errno::BadMessage)?,
        })
    }

    /// 追加头部与魔数，sname/file 全部置零
    pub fn write(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.resize(start + DHCP_OPTIONS_OFFSET, 0);
        let hdr = &mut out[start..];

        hdr[0] = self.op;
        hdr[1] = self.htype;
        hdr[2] = self.hlen;
        hdr[3] = self.hops;
        hdr[4..8].copy_from_slice(&self.xid.to_be_bytes());
        hdr[8..10].copy_from_slice(&self.secs.to_be_bytes());
        hdr[10..12].copy_from_slice(&self.flags.to_be_bytes());
        hdr[12..16].copy_from_slice(&self.ciaddr.octets());
        hdr[16..20].copy_from_slice(&self.yiaddr.octets());
        hdr[20..24].copy_from_slice(&self.siaddr.octets());
        hdr[24..28].copy_from_slice(&self.giaddr.octets());
        hdr[28..28 + ETH_ALEN].copy_from_slice(&self.chaddr.octets());
        hdr[DHCP_HLEN..DHCP_OPTIONS_OFFSET].copy_from_slice(&DHCP_MAGIC_COOKIE.to_be_bytes());
    }
}

/// 解析后的 DHCP 选项集合
///
/// 只保存客户端关心的选项；未知选项在解码时跳过
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DhcpOptions {
    pub message_type: Option<DhcpMessageType>,
    pub subnet_mask: Option<Ipv4Addr>,
    pub routers: Vec<Ipv4Addr>,
    pub dns: Vec<Ipv4Addr>,
    pub host_name: Option<String>,
    pub requested_ip: Option<Ipv4Addr>,
    pub lease_time: Option<u32>,
    pub server_id: Option<Ipv4Addr>,
    pub param_list: Vec<u8>,
    pub renewal_time: Option<u32>,
    pub rebinding_time: Option<u32>,
}

/// 单个选项的长度字段只有一个字节，放不下时返回 EMSGSIZE
fn put_option(out: &mut Vec<u8>, tag: u8, body: &[u8]) -> Result<()> {
    let len = u8::try_from(body.len()).map_err(|_| Errno::MessageTooLong)?;
    out.push(tag);
    out.push(len);
    out.extend_from_slice(body);
    Ok(())
}

fn put_addrs(out: &mut Vec<u8>, tag: u8, addrs: &[Ipv4Addr]) -> Result<()> {
    if addrs.is_empty() {
        return Ok(());
    }
    let body: Vec<u8> = addrs.iter().flat_map(|a| a.octets()).collect();
    put_option(out, tag, &body)
}

fn read_addr(body: &[u8]) -> Result<Ipv4Addr> {
    if body.len() < 4 {
        return Err(Errno::BadMessage)?;
    }
    Ok(Ipv4Addr::new(body[0], body[1], body[2], body[3]))
}

fn read_u32(body: &[u8]) -> Result<u32> {
    if body.len() < 4 {
        return Err(Errno::BadMessage);
    }
    Ok(u32::from_be_bytes([body[0], body[1], body[2], body[3]]))
}

fn read_addr_list(body: &[u8]) -> Result<Vec<Ipv4Addr>> {
    if body.len() < 4 || body.len() % 4 != 0 {
        return Err(Errno::BadMessage);
    }
    Ok(body
        .chunks_exact(4)
        .map(|c| Ipv4Addr::new(c[0], c[1], c[2], c[3]))
        .collect())
}

impl DhcpOptions {
    /// 编码为 TLV 选项块，以 END 结束
    ///
    /// 消息类型总是排在最前面。任一选项超过 255 字节时返回 EMSGSIZE，
    /// `out` 中可能留下已写入的部分
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        if let Some(mt) = self.message_type {
            put_option(out, dhcp_opt::MESSAGE_TYPE, &[mt.as_u8()])?;
        }
        if let Some(name) = &self.host_name {
            put_option(out, dhcp_opt::HOST_NAME, name.as_bytes())?;
        }
        if let Some(server) = self.server_id {
            put_option(out, dhcp_opt::SERVER_ID, &server.octets())?;
        }
        if let Some(ip) = self.requested_ip {
            put_option(out, dhcp_opt::REQUESTED_IP, &ip.octets())?;
        }
        if let Some(mask) = self.subnet_mask {
            put_option(out, dhcp_opt::SUBNET_MASK, &mask.octets())?;
        }
        put_addrs(out, dhcp_opt::ROUTER, &self.routers)?;
        put_addrs(out, dhcp_opt::DNS, &self.dns)?;
        if let Some(lease) = self.lease_time {
            put_option(out, dhcp_opt::LEASE_TIME, &lease.to_be_bytes())?;
        }
        if let Some(t1) = self.renewal_time {
            put_option(out, dhcp_opt::RENEWAL_TIME, &t1.to_be_bytes())?;
        }
        if let Some(t2) = self.rebinding_time {
            put_option(out, dhcp_opt::REBINDING_TIME, &t2.to_be_bytes())?;
        }
        if !self.param_list.is_empty() {
            put_option(out, dhcp_opt::PARAMETER_REQUEST, &self.param_list)?;
        }
        out.push(dhcp_opt::END);
        Ok(())
    }

    /// 解码 TLV 选项块
    ///
    /// # 说明
    /// - PAD 跳过，END 结束；缓冲区结束而没有 END 也视为结束
    /// - 未知标签按声明长度跳过
    /// - 选项越界、长度与类型不符或地址列表不是 4 的整数倍时整体失败 (EBADMSG)，不返回部分结果
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut opts = DhcpOptions::default();
        let mut pos = 0;

        while pos < data.len() {
            let tag = data[pos];
            pos += 1;
            match tag {
                dhcp_opt::PAD => continue,
                dhcp_opt::END => break,
                _ => {}
            }

            let len = *data.get(pos).ok_or(Errno::BadMessage)? as usize;
            pos += 1;
            let body = data.get(pos..pos + len).ok_or(Errno::BadMessage)?;
            pos += len;

            match tag {
                dhcp_opt::MESSAGE_TYPE => {
                    let mt = body.first().ok_or(Errno::BadMessage)?;
                    opts.message_type = Some(DhcpMessageType::from_u8(*mt));
                }
                dhcp_opt::SUBNET_MASK => opts.subnet_mask = Some(read_addr(body)?),
                dhcp_opt::ROUTER => opts.routers = read_addr_list(body)?,
                dhcp_opt::DNS => opts.dns = read_addr_list(body)?,
                dhcp_opt::HOST_NAME => opts.host_name = Some(String::from_utf8_lossy(body).into_owned()),
                dhcp_opt::REQUESTED_IP => opts.requested_ip = Some(read_addr(body)?),
                dhcp_opt::LEASE_TIME => opts.lease_time = Some(read_u32(body)?),
                dhcp_opt::SERVER_ID => opts.server_id = Some(read_addr(body)?),
                dhcp_opt::PARAMETER_REQUEST => opts.param_list = body.to_vec(),
                dhcp_opt::RENEWAL_TIME => opts.renewal_time = Some(read_u32(body)?),
                dhcp_opt::REBINDING_TIME => opts.rebinding_time = Some(read_u32(body)?),
                _ => debug!("dhcp: unknown option {} ({} bytes)", tag, len),
            }
        }

        Ok(opts)
    }
}

/// 组装完整的 DHCP 报文
///
/// 不足 `min_len` 时在选项后补零
pub fn build_message(hdr: &DhcpHeader, opts: &DhcpOptions, min_len: usize) -> Result<Vec<u8>> {
    let mut msg = Vec::with_capacity(min_len.max(DHCP_OPTIONS_OFFSET + 64));
    hdr.write(&mut msg);
    opts.encode(&mut msg)?;
    if msg.len() < min_len {
        msg.resize(min_len, 0);
    }
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn full_options() -> DhcpOptions {
        DhcpOptions {
            message_type: Some(DhcpMessageType::Ack),
            subnet_mask: Some(Ipv4Addr::new(255, 255, 255, 0)),
            routers: vec![Ipv4Addr::new(10, 0, 0, 1)],
            dns: vec![Ipv4Addr::new(10, 0, 0, 53)],
            lease_time: Some(86400),
            server_id: Some(Ipv4Addr::new(10, 0, 0, 1)),
            ..Default::default()
        }
    }

    #[test]
    fn test_options_encode_decode() {
        let opts = full_options();
        let mut buf = Vec::new();
        opts.encode(&mut buf).unwrap();

        assert_eq!(&buf[..3], &[dhcp_opt::MESSAGE_TYPE, 1, 5]);
        assert_eq!(*buf.last().unwrap(), dhcp_opt::END);
        assert_eq!(DhcpOptions::decode(&buf).unwrap(), opts);
    }

    #[test]
    fn test_options_truncated() {
        let mut buf = Vec::new();
        full_options().encode(&mut buf).unwrap();

        // 截断在租约时间选项中间
        let lease_at = buf.iter().position(|&b| b == dhcp_opt::LEASE_TIME).unwrap();
        assert_eq!(DhcpOptions::decode(&buf[..lease_at + 4]), Err(Errno::BadMessage));

        // 只剩标签没有长度
        assert_eq!(DhcpOptions::decode(&[dhcp_opt::SERVER_ID]), Err(Errno::BadMessage));
    }

    #[test]
    fn test_options_short_address() {
        let buf = [dhcp_opt::SUBNET_MASK, 2, 255, 255, dhcp_opt::END];
        assert_eq!(DhcpOptions::decode(&buf), Err(Errno::BadMessage));
    }

    #[test]
    fn test_options_partial_address_list() {
        // 第二个路由器地址只有 2 字节
        let buf = [dhcp_opt::ROUTER, 6, 10, 0, 0, 1, 10, 0, dhcp_opt::END];
        assert_eq!(DhcpOptions::decode(&buf), Err(Errno::BadMessage));

        let buf = [dhcp_opt::DNS, 8, 10, 0, 0, 53, 10, 0, 0, 54, dhcp_opt::END];
        assert_eq!(DhcpOptions::decode(&buf).unwrap().dns.len(), 2);
    }

    #[test]
    fn test_options_too_long() {
        // 64 个地址需要 256 字节，超出单个选项的长度字段
        let opts = DhcpOptions {
            dns: (0..64).map(|i| Ipv4Addr::new(10, 0, 1, i)).collect(),
            ..Default::default()
        };
        let mut buf = Vec::new();
        assert_eq!(opts.encode(&mut buf), Err(Errno::MessageTooLong));

        let hdr = DhcpHeader::request(MacAddr::NONE, 1);
        assert_eq!(build_message(&hdr, &opts, 300), Err(Errno::MessageTooLong));

        // 63 个地址恰好放得下
        let opts = DhcpOptions {
            dns: (0..63).map(|i| Ipv4Addr::new(10, 0, 1, i)).collect(),
            ..Default::default()
        };
        let mut buf = Vec::new();
        opts.encode(&mut buf).unwrap();
        assert_eq!(DhcpOptions::decode(&buf).unwrap(), opts);
    }

    #[test]
    fn test_options_pad_and_unknown() {
        let buf = [
            dhcp_opt::PAD,
            dhcp_opt::PAD,
            dhcp_opt::MESSAGE_TYPE, 1, 2,
            43, 3, 0xAA, 0xBB, 0xCC,
            dhcp_opt::RENEWAL_TIME, 4, 0, 0, 0x0E, 0x10,
            dhcp_opt::END,
            // END 之后的内容不解析
            dhcp_opt::SUBNET_MASK, 9,
        ];
        let opts = DhcpOptions::decode(&buf).unwrap();
        assert_eq!(opts.message_type, Some(DhcpMessageType::Offer));
        assert_eq!(opts.renewal_time, Some(3600));
        assert!(opts.subnet_mask.is_none());
    }

    #[test]
    fn test_options_missing_end() {
        let buf = [dhcp_opt::MESSAGE_TYPE, 1, 5];
        let opts = DhcpOptions::decode(&buf).unwrap();
        assert_eq!(opts.message_type, Some(DhcpMessageType::Ack));
    }

    #[test]
    fn test_header_layout() {
        let mac = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        let hdr = DhcpHeader::request(mac, 0xDEAD_BEEF);
        let msg = build_message(&hdr, &DhcpOptions::default(), 300).unwrap();

        assert_eq!(msg.len(), 300);
        assert_eq!(&msg[..4], &[BOOTREQUEST, HTYPE_ETHER, 6, 0]);
        assert_eq!(&msg[4..8], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(&msg[28..34], &mac.octets());
        assert_eq!(&msg[236..240], &[0x63, 0x82, 0x53, 0x63]);
        assert_eq!(msg[240], dhcp_opt::END);

        assert_eq!(DhcpHeader::parse(&msg).unwrap(), hdr);
    }

    #[test]
    fn test_header_bad_cookie() {
        let hdr = DhcpHeader::request(MacAddr::NONE, 1);
        let mut msg = build_message(&hdr, &DhcpOptions::default(), 0).unwrap();
        msg[239] = 0;
        assert_eq!(DhcpHeader::parse(&msg), Err(Errno::ProtocolError));
        assert_eq!(DhcpHeader::parse(&msg[..100]), Err(Errno::BadMessage));
    }

    #[test]
    fn test_message_type_values() {
        for val in 1..=8u8 {
            assert_eq!(DhcpMessageType::from_u8(val).as_u8(), val);
        }
        assert_eq!(DhcpMessageType::from_u8(42), DhcpMessageType::Unknown(42));
    }
}
