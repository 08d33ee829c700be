//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! AF_INET 协议族
//!
//! 参考: net/ipv4/af_inet.c (inetsw, inet_create)
//!
//! 按套接字类型组织的协议表。每个类型下按注册顺序保存 (协议号, 实现)，
//! 协议号 0 (IPPROTO_IP) 表示通配。

use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{debug, info};

use crate::errno::{Errno, Result};
use crate::net::buffer::IpProtocol;
use crate::sync::IrqSpinLock;

/// IPv4 地址族
pub const AF_INET: u16 = 2;

/// 套接字地址长度：端口 2 字节 + IPv4 地址 4 字节
pub const INET_ADDR_LEN: usize = 6;

/// 套接字类型数量（含未使用的 0）
pub const SOCK_MAX: usize = 4;

/// 套接字类型
///
/// 对应 Linux 的 SOCK_* (include/linux/net.h)
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum SockType {
    /// 字节流
    SOCK_STREAM = 1,
    /// 数据报
    SOCK_DGRAM = 2,
    /// 原始套接字
    SOCK_RAW = 3,
}

impl SockType {
    /// 从 u16 转换
    pub fn from_u16(val: u16) -> Option<Self> {
        match val {
            1 => Some(SockType::SOCK_STREAM),
            2 => Some(SockType::SOCK_DGRAM),
            3 => Some(SockType::SOCK_RAW),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// 协议实现
///
/// 套接字层通过它创建具体的套接字；这里只关心标识。
pub trait SockProtocol: Send + Sync {
    /// 协议名
    fn name(&self) -> &'static str;
}

/// 内置协议描述
#[derive(Debug)]
pub struct BuiltinProtocol {
    name: &'static str,
}

impl SockProtocol for BuiltinProtocol {
    fn name(&self) -> &'static str {
        self.name
    }
}

/// 协议表项
///
/// 对应 Linux 的 inet_protosw
#[derive(Clone)]
pub struct InetProtosw {
    /// 套接字类型
    pub sock_type: SockType,
    /// 协议号，0 为通配
    pub protocol: u8,
    /// 实现
    pub ops: Arc<dyn SockProtocol>,
}

/// 协议族描述
///
/// 对应 Linux 的 net_proto_family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SockFamily {
    /// 地址族
    pub family: u16,
    /// 套接字地址长度
    pub addr_len: usize,
}

/// AF_INET 协议族
pub const INET_FAMILY: SockFamily = SockFamily {
    family: AF_INET,
    addr_len: INET_ADDR_LEN,
};

/// AF_INET 协议表
pub struct InetProtocolTable {
    types: IrqSpinLock<[Vec<InetProtosw>; SOCK_MAX]>,
}

impl InetProtocolTable {
    /// 创建空表
    pub fn new() -> Self {
        Self {
            types: IrqSpinLock::new([Vec::new(), Vec::new(), Vec::new(), Vec::new()]),
        }
    }

    /// 创建并注册内置协议：TCP、UDP、ICMP 与原始套接字
    pub fn with_builtins() -> Self {
        const BUILTINS: [(SockType, IpProtocol, &str); 4] = [
            (SockType::SOCK_STREAM, IpProtocol::IPPROTO_TCP, "tcp"),
            (SockType::SOCK_DGRAM, IpProtocol::IPPROTO_UDP, "udp"),
            (SockType::SOCK_DGRAM, IpProtocol::IPPROTO_ICMP, "icmp"),
            (SockType::SOCK_RAW, IpProtocol::IPPROTO_IP, "raw"),
        ];

        let table = Self::new();
        {
            let mut types = table.types.lock();
            for (sock_type, protocol, name) in BUILTINS {
                types[sock_type.index()].push(InetProtosw {
                    sock_type,
                    protocol: protocol.to_u8(),
                    ops: Arc::new(BuiltinProtocol { name }),
                });
            }
        }
        table
    }

    /// 注册协议
    ///
    /// 对应 Linux 的 inet_register_protosw()
    ///
    /// # 返回
    /// 同一类型下协议号已存在时返回 EEXIST
    pub fn register(&self, entry: InetProtosw) -> Result<()> {
        let mut types = self.types.lock();
        let list = &mut types[entry.sock_type.index()];
        if list.iter().any(|e| e.protocol == entry.protocol) {
            return Err(Errno::FileExists);
        }
        info!(
            "af_inet: registered {} (type {:?}, protocol {})",
            entry.ops.name(),
            entry.sock_type,
            entry.protocol
        );
        list.push(entry);
        Ok(())
    }

    /// 注销协议
    ///
    /// 对应 Linux 的 inet_unregister_protosw()
    pub fn unregister(&self, sock_type: SockType, protocol: u8) -> bool {
        let mut types = self.types.lock();
        let list = &mut types[sock_type.index()];
        let before = list.len();
        list.retain(|e| e.protocol != protocol);
        list.len() != before
    }

    /// 查找协议实现
    ///
    /// # 参数
    /// - `sock_type`: 套接字类型
    /// - `protocol`: 请求的协议号；请求为 0 且命中时被改写为具体协议号
    ///
    /// # 说明
    /// 1. 请求为 0 时返回该类型下第一个注册的表项
    /// 2. 否则协议号完全匹配的表项优先
    /// 3. 最后退回到注册为 0 的通配表项
    pub fn find(&self, sock_type: SockType, protocol: &mut u8) -> Option<Arc<dyn SockProtocol>> {
        let types = self.types.lock();
        let list = &types[sock_type.index()];

        if *protocol == IpProtocol::IPPROTO_IP.to_u8() {
            let first = list.first()?;
            *protocol = first.protocol;
            return Some(first.ops.clone());
        }
        if let Some(entry) = list.iter().find(|e| e.protocol == *protocol) {
            return Some(entry.ops.clone());
        }
        list.iter()
            .find(|e| e.protocol == IpProtocol::IPPROTO_IP.to_u8())
            .map(|e| e.ops.clone())
    }

    /// 某个类型下的表项数
    pub fn len(&self, sock_type: SockType) -> usize {
        self.types.lock()[sock_type.index()].len()
    }
}

impl Default for InetProtocolTable {
    fn default() -> Self {
        Self::new()
    }
}

/// 为 AF_INET 套接字选择协议
///
/// 对应 Linux 的 inet_create()
///
/// # 返回
/// 实现与最终协议号；类型未知返回 ESOCKTNOSUPPORT，协议未知返回 EPROTONOSUPPORT
pub fn inet_create(table: &InetProtocolTable, sock_type: u16, protocol: u8) -> Result<(Arc<dyn SockProtocol>, u8)> {
    let sock_type = SockType::from_u16(sock_type).ok_or(Errno::SocketTypeNotSupported)?;
    let mut protocol = protocol;
    match table.find(sock_type, &mut protocol) {
        Some(ops) => Ok((ops, protocol)),
        None => {
            debug!("af_inet: no protocol {} for {:?}", protocol, sock_type);
            Err(Errno::ProtocolNotSupported)
        }
    }
}
