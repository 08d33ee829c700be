//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! DHCP 客户端
//!
//! 参考: RFC 2131
//!
//! 每个接口一次协商，由接口进入 UP 触发：
//! ```text
//! INIT ──UP──> SELECTING (已发 DISCOVER)
//!                  │ OFFER
//!                  v
//!              REQUESTING (已发 REQUEST) ──ACK──> 接口 READY，上下文销毁
//! ```
//! 没有重传与超时：丢失一个报文协商就停在原地，直到接口重新 UP。

pub mod packet;

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;

use log::{debug, info, warn};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

use crate::errno::{Errno, Result};
use crate::net::ethernet::ETH_ALEN;
use crate::net::interface::{InetConfig, NetEventListener, NetInterface, NetState};
use crate::net::udp::udp_send;
use crate::net::{NetStack, IP_BROADCAST};
use crate::sync::IrqSpinLock;

pub use packet::{DhcpHeader, DhcpMessageType, DhcpOptions, BOOTREPLY, HTYPE_ETHER};

use packet::{build_message, dhcp_opt, DHCP_OPTIONS_OFFSET};

/// 协商阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpStage {
    /// 已发送 DISCOVER，等待 OFFER
    Selecting,
    /// 已发送 REQUEST，等待 ACK
    Requesting,
}

/// 单个接口的协商上下文
#[derive(Debug)]
struct DhcpContext {
    xid: u32,
    stage: DhcpStage,
    /// 最近一次 OFFER 的选项，ACK 缺少的字段从这里补
    offer: Option<DhcpOptions>,
}

/// DHCP 客户端
///
/// 作为接口事件监听者挂在注册表上。上下文按接口索引保存，ACK 后删除。
pub struct DhcpClient {
    contexts: IrqSpinLock<BTreeMap<u32, DhcpContext>>,
    rng: IrqSpinLock<SmallRng>,
}

impl DhcpClient {
    /// 创建客户端，事务 ID 由 `seed` 初始化的伪随机数生成器产生
    pub fn new(seed: u64) -> Self {
        Self {
            contexts: IrqSpinLock::new(BTreeMap::new()),
            rng: IrqSpinLock::new(SmallRng::seed_from_u64(seed)),
        }
    }

    fn next_xid(&self) -> u32 {
        self.rng.lock().next_u32()
    }

    /// 开始协商：发送 DISCOVER
    ///
    /// 对应 RFC 2131 的 INIT -> SELECTING
    ///
    /// # 说明
    /// 旧的上下文（如果有）被覆盖
    pub fn start(&self, stack: &NetStack, dev: &Arc<NetInterface>) -> Result<()> {
        let xid = self.next_xid();
        self.contexts.lock().insert(
            dev.ifindex(),
            DhcpContext {
                xid,
                stage: DhcpStage::Selecting,
                offer: None,
            },
        );

        let hostname = stack.registry().get_hostname();
        let opts = DhcpOptions {
            message_type: Some(DhcpMessageType::Discover),
            host_name: Some(String::from(&*hostname)),
            param_list: vec![dhcp_opt::SUBNET_MASK, dhcp_opt::ROUTER, dhcp_opt::DNS],
            ..Default::default()
        };
        drop(hostname);

        debug!("dhcp: {} DISCOVER xid {:#010x}", dev.name(), xid);
        self.send(stack, dev, xid, &opts)
    }

    /// 放弃接口上的协商
    pub fn stop(&self, dev: &NetInterface) {
        if self.contexts.lock().remove(&dev.ifindex()).is_some() {
            debug!("dhcp: {} negotiation abandoned", dev.name());
        }
    }

    /// 接口当前的协商阶段
    pub fn stage(&self, dev: &NetInterface) -> Option<DhcpStage> {
        self.contexts.lock().get(&dev.ifindex()).map(|ctx| ctx.stage)
    }

    /// 接口当前的事务 ID
    pub fn xid(&self, dev: &NetInterface) -> Option<u32> {
        self.contexts.lock().get(&dev.ifindex()).map(|ctx| ctx.xid)
    }

    /// 处理服务器发来的报文（UDP 载荷）
    ///
    /// # 说明
    /// - 操作码、硬件类型/长度、魔数、chaddr 任一不符即丢弃
    /// - 选项块损坏时整个报文丢弃，不产生任何副作用
    /// - OFFER 回复 REQUEST；ACK 提交地址并把接口切到 READY
    /// - 只在 Selecting 阶段接受 OFFER，只在 Requesting 阶段接受 ACK；
    ///   协商被 DOWN/ERROR 放弃后迟到的应答一律忽略
    /// - 事务 ID 不一致只记录日志
    pub fn recv(&self, stack: &NetStack, dev: &Arc<NetInterface>, payload: &[u8]) -> Result<()> {
        let hdr = DhcpHeader::parse(payload)?;
        if hdr.op != BOOTREPLY || hdr.htype != HTYPE_ETHER || hdr.hlen as usize != ETH_ALEN {
            return Err(Errno::ProtocolError);
        }
        if hdr.chaddr != dev.mac() {
            return Err(Errno::AddressNotAvailable);
        }
        let opts = DhcpOptions::decode(&payload[DHCP_OPTIONS_OFFSET..])?;

        if let Some(xid) = self.xid(dev) {
            if xid != hdr.xid {
                debug!("dhcp: {} reply xid {:#010x} does not match {:#010x}", dev.name(), hdr.xid, xid);
            }
        }

        let stage = self.stage(dev);
        match opts.message_type {
            Some(DhcpMessageType::Offer) if stage == Some(DhcpStage::Selecting) => {
                self.handle_offer(stack, dev, &hdr, opts)
            }
            Some(DhcpMessageType::Ack) if stage == Some(DhcpStage::Requesting) => {
                self.handle_ack(stack, dev, &hdr, opts);
                Ok(())
            }
            Some(kind @ (DhcpMessageType::Offer | DhcpMessageType::Ack)) => {
                debug!("dhcp: {} {:?} ignored in stage {:?}", dev.name(), kind, stage);
                Ok(())
            }
            Some(DhcpMessageType::Nak) => {
                info!("dhcp: {} NAK from {:?}", dev.name(), opts.server_id);
                Ok(())
            }
            other => {
                warn!("dhcp: {} unknown message type {:?}", dev.name(), other);
                Ok(())
            }
        }
    }

    /// OFFER：请求提供的地址
    fn handle_offer(&self, stack: &NetStack, dev: &Arc<NetInterface>, hdr: &DhcpHeader, offer: DhcpOptions) -> Result<()> {
        let server = match offer.server_id {
            Some(server) => server,
            None => {
                debug!("dhcp: {} OFFER without server identifier", dev.name());
                return Err(Errno::ProtocolError);
            }
        };

        let xid = {
            let mut contexts = self.contexts.lock();
            let xid = contexts.get(&dev.ifindex()).map(|ctx| ctx.xid);
            let xid = xid.unwrap_or_else(|| self.next_xid());
            contexts.insert(
                dev.ifindex(),
                DhcpContext {
                    xid,
                    stage: DhcpStage::Requesting,
                    offer: Some(offer),
                },
            );
            xid
        };

        let hostname = stack.registry().get_hostname();
        let opts = DhcpOptions {
            message_type: Some(DhcpMessageType::Request),
            host_name: Some(String::from(&*hostname)),
            server_id: Some(server),
            requested_ip: Some(hdr.yiaddr),
            param_list: vec![dhcp_opt::SUBNET_MASK, dhcp_opt::ROUTER, dhcp_opt::DNS],
            ..Default::default()
        };
        drop(hostname);

        debug!("dhcp: {} REQUEST {} from {}", dev.name(), hdr.yiaddr, server);
        self.send(stack, dev, xid, &opts)
    }

    /// ACK：提交租约并切换到 READY
    fn handle_ack(&self, stack: &NetStack, dev: &Arc<NetInterface>, hdr: &DhcpHeader, ack: DhcpOptions) {
        let offer = self
            .contexts
            .lock()
            .remove(&dev.ifindex())
            .and_then(|ctx| ctx.offer)
            .unwrap_or_default();

        let dns = if ack.dns.is_empty() { offer.dns } else { ack.dns };
        let lease = InetConfig {
            addr: hdr.yiaddr,
            netmask: ack.subnet_mask.or(offer.subnet_mask),
            gateway: ack.routers.first().or(offer.routers.first()).copied(),
            dns,
            server: ack.server_id.or(offer.server_id),
            lease_time: ack.lease_time.or(offer.lease_time),
            renewal_time: ack.renewal_time.or(offer.renewal_time),
            rebinding_time: ack.rebinding_time.or(offer.rebinding_time),
        };

        info!("dhcp: {} ACK, address {} lease {:?}s", dev.name(), lease.addr, lease.lease_time);
        dev.set_inet(lease);
        stack.set_state(dev, NetState::Ready);
    }

    fn send(&self, stack: &NetStack, dev: &Arc<NetInterface>, xid: u32, opts: &DhcpOptions) -> Result<()> {
        let config = stack.config();
        let msg = build_message(&DhcpHeader::request(dev.mac(), xid), opts, config.dhcp_min_message_len)?;
        udp_send(stack, dev, IP_BROADCAST, config.dhcp_client_port, config.dhcp_server_port, &msg)
    }
}

impl NetEventListener for DhcpClient {
    fn on_state_change(&self, stack: &NetStack, dev: &Arc<NetInterface>, state: NetState) {
        match state {
            NetState::Up => {
                if let Err(e) = self.start(stack, dev) {
                    warn!("dhcp: {} failed to send DISCOVER: {}", dev.name(), e);
                }
            }
            NetState::Down | NetState::Error => self.stop(dev),
            NetState::Ready => {}
        }
    }
}
