//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 名称服务
//!
//! 接口进入 READY 时以主机名登记。默认实现只维护本地名称表，
//! 不发送 NetBIOS 名称注册报文；收到的名称查询记录日志后丢弃。

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::net::Ipv4Addr;

use log::{debug, info};

use crate::net::buffer::SkBuff;
use crate::net::interface::NetInterface;
use crate::sync::IrqSpinLock;

/// 名称服务接口
pub trait NameService: Send + Sync {
    /// 为接口登记名称，接口地址已配置
    fn register_name(&self, dev: &Arc<NetInterface>, name: &str);

    /// 处理发往名称服务端口的 UDP 载荷
    fn handle(&self, dev: &Arc<NetInterface>, skb: SkBuff);
}

/// 名称登记记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRecord {
    /// 登记的名称
    pub name: String,
    /// 接口索引
    pub ifindex: u32,
    /// 登记时的接口地址
    pub addr: Ipv4Addr,
}

/// 本地名称表
#[derive(Default)]
pub struct NbnsNameTable {
    records: IrqSpinLock<Vec<NameRecord>>,
}

impl NbnsNameTable {
    /// 创建空名称表
    pub fn new() -> Self {
        Self::default()
    }

    /// 已登记记录的快照
    pub fn records(&self) -> Vec<NameRecord> {
        self.records.lock().clone()
    }

    /// 按名称查找地址
    pub fn lookup(&self, name: &str) -> Option<Ipv4Addr> {
        self.records
            .lock()
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .map(|r| r.addr)
    }
}

impl NameService for NbnsNameTable {
    fn register_name(&self, dev: &Arc<NetInterface>, name: &str) {
        let record = NameRecord {
            name: String::from(name),
            ifindex: dev.ifindex(),
            addr: dev.ip(),
        };
        info!("nbns: registering {} on {} ({})", name, dev.name(), record.addr);

        let mut records = self.records.lock();
        // 同一接口重复登记时替换旧记录
        records.retain(|r| r.ifindex != record.ifindex);
        records.push(record);
    }

    fn handle(&self, dev: &Arc<NetInterface>, skb: SkBuff) {
        debug!(
            "nbns: ignoring {} byte query on {} from {}",
            skb.len(),
            dev.name(),
            skb.route.src_ip
        );
    }
}
