//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络子系统
//!
//! 遵循 Linux 内核的网络子系统设计
//! 参考: net/
//!
//! 所有注册表都挂在显式构造的 [`NetStack`] 上，没有全局静态状态：
//! 接口注册表与事件总线、ARP 缓存、DHCP 客户端、名称服务、AF_INET 协议表。

pub mod af_inet;
pub mod arp;
pub mod buffer;
pub mod dhcp;
pub mod ethernet;
pub mod icmp;
pub mod interface;
pub mod ipv4;
pub mod nbns;
pub mod udp;

use alloc::string::String;
use alloc::sync::Arc;
use core::net::Ipv4Addr;

use log::{debug, info, trace};

use crate::config;
use crate::errno::Result;
use crate::notifier::NotifierId;

pub use buffer::{EthProtocol, IpProtocol, SkBuff};
pub use ethernet::MacAddr;
pub use interface::{InterfaceRegistry, NetEventListener, NetInterface, NetState};

use af_inet::InetProtocolTable;
use arp::ArpCache;
use dhcp::DhcpClient;
use nbns::{NameService, NbnsNameTable};

/// 未设置的 IPv4 地址 (0.0.0.0)
pub const IP_NONE: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

/// 有限广播地址 (255.255.255.255)
pub const IP_BROADCAST: Ipv4Addr = Ipv4Addr::BROADCAST;

/// 协议栈运行时配置
///
/// 默认值来自构建时生成的 `config.rs`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetConfig {
    /// 进程级主机名
    pub hostname: String,
    /// DHCP 客户端端口
    pub dhcp_client_port: u16,
    /// DHCP 服务器端口
    pub dhcp_server_port: u16,
    /// DHCP 报文最小长度
    pub dhcp_min_message_len: usize,
    /// 名称服务端口
    pub nbns_port: u16,
    /// DHCP 事务 ID 随机数种子
    pub rand_seed: u64,
    /// 是否在接口 UP 时自动启动 DHCP
    pub dhcp_enabled: bool,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            hostname: String::from(config::HOSTNAME),
            dhcp_client_port: config::DHCP_CLIENT_PORT,
            dhcp_server_port: config::DHCP_SERVER_PORT,
            dhcp_min_message_len: config::DHCP_MIN_MESSAGE_LEN,
            nbns_port: config::NBNS_PORT,
            rand_seed: config::RAND_SEED,
            dhcp_enabled: true,
        }
    }
}

/// 网络协议栈
pub struct NetStack {
    config: NetConfig,
    registry: InterfaceRegistry,
    arp: ArpCache,
    dhcp: Arc<DhcpClient>,
    dhcp_listener: Option<NotifierId>,
    name_service: Arc<dyn NameService>,
    protocols: InetProtocolTable,
}

impl NetStack {
    /// 创建协议栈，使用默认名称表
    pub fn new(config: NetConfig) -> Self {
        Self::with_name_service(config, Arc::new(NbnsNameTable::new()))
    }

    /// 创建协议栈并指定名称服务
    ///
    /// # 说明
    /// `dhcp_enabled` 时 DHCP 客户端作为第一个监听者订阅接口事件
    pub fn with_name_service(config: NetConfig, name_service: Arc<dyn NameService>) -> Self {
        let registry = InterfaceRegistry::new(&config.hostname);
        let dhcp = Arc::new(DhcpClient::new(config.rand_seed));
        let dhcp_listener = if config.dhcp_enabled {
            Some(registry.subscribe(dhcp.clone()))
        } else {
            None
        };

        info!(
            "net: stack up, hostname {}, dhcp {}",
            config.hostname,
            if config.dhcp_enabled { "on" } else { "off" }
        );

        Self {
            config,
            registry,
            arp: ArpCache::new(),
            dhcp,
            dhcp_listener,
            name_service,
            protocols: InetProtocolTable::with_builtins(),
        }
    }

    /// 运行时配置
    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// 接口注册表
    pub fn registry(&self) -> &InterfaceRegistry {
        &self.registry
    }

    /// ARP 缓存
    pub fn arp(&self) -> &ArpCache {
        &self.arp
    }

    /// DHCP 客户端
    pub fn dhcp(&self) -> &DhcpClient {
        &self.dhcp
    }

    /// 名称服务
    pub fn name_service(&self) -> &Arc<dyn NameService> {
        &self.name_service
    }

    /// AF_INET 协议表
    pub fn protocols(&self) -> &InetProtocolTable {
        &self.protocols
    }

    /// 注册接口并进入初始状态
    pub fn register(&self, dev: &Arc<NetInterface>, initial_state: NetState) -> Result<()> {
        self.registry.register(self, dev, initial_state)
    }

    /// 注销接口
    pub fn unregister(&self, dev: &Arc<NetInterface>) -> Result<()> {
        self.registry.unregister(dev)
    }

    /// 设置接口状态，状态实际变化时返回 true
    pub fn set_state(&self, dev: &Arc<NetInterface>, state: NetState) -> bool {
        self.registry.set_state(self, dev, state)
    }

    /// 驱动接收入口
    ///
    /// 对应 Linux 的 netif_rx() / __netif_receive_skb()
    ///
    /// # 参数
    /// - `dev`: 接收接口
    /// - `frame`: 完整的以太网帧
    ///
    /// # 说明
    /// 可能在中断上下文调用。格式错误或不属于本机的帧记录日志后丢弃，不向驱动报告。
    pub fn netif_rx(&self, dev: &Arc<NetInterface>, frame: &[u8]) {
        dev.add_rx_bytes(frame.len() as u64);

        #[cfg(feature = "debug_log")]
        debug!("eth: {} rx {:02x?}", dev.name(), frame);

        if let Err(err) = self.receive(dev, frame) {
            debug!("net: {} dropped {} byte frame: {}", dev.name(), frame.len(), err);
        }
    }

    fn receive(&self, dev: &Arc<NetInterface>, frame: &[u8]) -> Result<()> {
        let mut skb = SkBuff::from_frame(dev, frame);
        let eth = ethernet::eth_pull_header(&mut skb)?;

        if !eth.is_for_us(&dev.mac()) {
            trace!("eth: {} frame for {} is not ours", dev.name(), eth.h_dest);
            return Ok(());
        }
        skb.route.hard_src = eth.h_source;
        skb.route.hard_dst = eth.h_dest;

        match eth.protocol() {
            Some(EthProtocol::ETH_P_ARP) => {
                skb.protocol = EthProtocol::ETH_P_ARP;
                skb.set_network_header();
                arp::arp_rcv(self, skb)
            }
            Some(EthProtocol::ETH_P_IP) => {
                skb.protocol = EthProtocol::ETH_P_IP;
                ipv4::ip_rcv(self, skb)
            }
            _ => {
                trace!("eth: {} ignoring ethertype {:#06x}", dev.name(), eth.h_proto);
                Ok(())
            }
        }
    }

    /// UDP 把 DHCP 客户端端口的载荷交到这里
    pub(crate) fn dhcp_rcv(&self, skb: SkBuff) -> Result<()> {
        let dev = skb.dev().clone();
        self.dhcp.recv(self, &dev, skb.data())
    }

    /// 关闭协议栈
    ///
    /// 注销 DHCP 监听者，清空接口表与 ARP 缓存（等待队列中的数据包随之释放）
    pub fn shutdown(&mut self) {
        if let Some(id) = self.dhcp_listener.take() {
            self.registry.unsubscribe(id);
        }
        let dropped = self.arp.clear();
        self.registry.clear();
        info!("net: stack down, {} pending packets dropped", dropped);
    }
}

impl Default for NetStack {
    fn default() -> Self {
        Self::new(NetConfig::default())
    }
}
