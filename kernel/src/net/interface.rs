//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络接口注册表与事件总线
//!
//! 参考: net/core/dev.c (register_netdevice), include/linux/netdevice.h,
//! net/core/dev.c (call_netdevice_notifiers)
//!
//! 接口生命周期：
//! ```text
//! DOWN ──> UP ──> READY
//!  ^        │       │
//!  └────────┴───────┘      任意状态 ──> ERROR
//! ```
//! 状态切换是幂等的：重复设置同一状态不会再次通知。

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::net::Ipv4Addr;
use core::ops::Deref;
use core::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use log::{debug, info, warn};

use crate::drivers::net::{ArpHrdType, DeviceStats, InterfaceFlags, NetDeviceOps, IFNAMSIZ};
use crate::errno::{Errno, Result};
use crate::net::ethernet::MacAddr;
use crate::net::NetStack;
use crate::notifier::{NotifierChain, NotifierId};
use crate::sync::IrqSpinLock;

/// 接口生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetState {
    /// 链路断开（初始状态）
    Down,
    /// 链路已建立，尚未配置地址
    Up,
    /// 地址已配置，可以正常收发
    Ready,
    /// 链路或地址协商失败
    Error,
}

impl NetState {
    /// 状态名称
    pub fn as_str(&self) -> &'static str {
        match self {
            NetState::Down => "DOWN",
            NetState::Up => "UP",
            NetState::Ready => "READY",
            NetState::Error => "ERROR",
        }
    }
}

/// 接口的 IPv4 配置
///
/// 对应 Linux 的 in_device / in_ifaddr，租约字段由 DHCP 客户端填写
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InetConfig {
    /// 接口地址，未配置时为 `IP_NONE`
    pub addr: Ipv4Addr,
    /// 子网掩码
    pub netmask: Option<Ipv4Addr>,
    /// 默认网关
    pub gateway: Option<Ipv4Addr>,
    /// DNS 服务器
    pub dns: Vec<Ipv4Addr>,
    /// 分配地址的 DHCP 服务器
    pub server: Option<Ipv4Addr>,
    /// 租约时间（秒）
    pub lease_time: Option<u32>,
    /// 续租时间 T1（秒）
    pub renewal_time: Option<u32>,
    /// 重绑定时间 T2（秒）
    pub rebinding_time: Option<u32>,
}

impl InetConfig {
    /// 未配置状态
    pub const fn unconfigured() -> Self {
        Self {
            addr: Ipv4Addr::UNSPECIFIED,
            netmask: None,
            gateway: None,
            dns: Vec::new(),
            server: None,
            lease_time: None,
            renewal_time: None,
            rebinding_time: None,
        }
    }
}

impl Default for InetConfig {
    fn default() -> Self {
        Self::unconfigured()
    }
}

/// 网络接口
///
/// 对应 Linux 的 net_device
///
/// # 说明
/// - 由驱动创建并通过 [`InterfaceRegistry::register`] 注册
/// - 注销后仍可能被在途数据包引用，调用者不应在注销后继续持有
pub struct NetInterface {
    /// 接口名 (例如 "eth0")
    name: String,
    /// 接口索引，注册时分配，0 表示未注册
    ifindex: AtomicU32,
    /// 硬件地址
    mac: MacAddr,
    /// IPv4 配置
    inet: IrqSpinLock<InetConfig>,
    /// 生命周期状态
    state: IrqSpinLock<NetState>,
    /// 接收字节数
    rx_total: AtomicU64,
    /// 发送字节数
    tx_total: AtomicU64,
    /// 接收包数
    rx_packets: AtomicU64,
    /// 发送包数
    tx_packets: AtomicU64,
    /// 驱动操作接口
    ops: Arc<dyn NetDeviceOps>,
}

impl NetInterface {
    /// 创建网络接口
    ///
    /// # 参数
    /// - `name`: 接口名
    /// - `mac`: 硬件地址
    /// - `ops`: 驱动操作接口
    pub fn new(name: &str, mac: MacAddr, ops: Arc<dyn NetDeviceOps>) -> Arc<Self> {
        Arc::new(Self {
            name: String::from(name),
            ifindex: AtomicU32::new(0),
            mac,
            inet: IrqSpinLock::new(InetConfig::unconfigured()),
            state: IrqSpinLock::new(NetState::Down),
            rx_total: AtomicU64::new(0),
            tx_total: AtomicU64::new(0),
            rx_packets: AtomicU64::new(0),
            tx_packets: AtomicU64::new(0),
            ops,
        })
    }

    /// 接口名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 接口索引
    pub fn ifindex(&self) -> u32 {
        self.ifindex.load(Ordering::Acquire)
    }

    /// 硬件地址
    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    /// 当前 IP 地址
    pub fn ip(&self) -> Ipv4Addr {
        self.inet.lock().addr
    }

    /// 设置 IP 地址
    pub fn set_ip(&self, addr: Ipv4Addr) {
        self.inet.lock().addr = addr;
    }

    /// IPv4 配置副本
    pub fn inet(&self) -> InetConfig {
        self.inet.lock().clone()
    }

    /// 替换 IPv4 配置
    pub fn set_inet(&self, config: InetConfig) {
        *self.inet.lock() = config;
    }

    /// 当前状态
    pub fn state(&self) -> NetState {
        *self.state.lock()
    }

    /// 由状态与硬件类型推导的 IFF_* 标志
    pub fn flags(&self) -> InterfaceFlags {
        let mut flags = match self.ops.hw_type() {
            ArpHrdType::ARPHRD_LOOPBACK => InterfaceFlags::IFF_LOOPBACK,
            ArpHrdType::ARPHRD_ETHER => InterfaceFlags::IFF_BROADCAST | InterfaceFlags::IFF_MULTICAST,
        };
        match self.state() {
            NetState::Down => {}
            NetState::Up | NetState::Ready => flags |= InterfaceFlags::IFF_UP | InterfaceFlags::IFF_RUNNING,
            NetState::Error => flags |= InterfaceFlags::IFF_UP,
        }
        flags
    }

    /// 累计接收字节数
    pub fn rx_total(&self) -> u64 {
        self.rx_total.load(Ordering::Relaxed)
    }

    /// 累计发送字节数
    pub fn tx_total(&self) -> u64 {
        self.tx_total.load(Ordering::Relaxed)
    }

    pub(crate) fn add_rx_bytes(&self, len: u64) {
        self.rx_total.fetch_add(len, Ordering::Relaxed);
        self.rx_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_tx_bytes(&self, len: u64) {
        self.tx_total.fetch_add(len, Ordering::Relaxed);
        self.tx_packets.fetch_add(1, Ordering::Relaxed);
    }

    /// 统计信息，驱动提供时优先使用驱动的数据
    pub fn stats(&self) -> DeviceStats {
        self.ops.get_stats().unwrap_or(DeviceStats {
            rx_packets: self.rx_packets.load(Ordering::Relaxed),
            tx_packets: self.tx_packets.load(Ordering::Relaxed),
            rx_bytes: self.rx_total(),
            tx_bytes: self.tx_total(),
            rx_errors: 0,
            tx_errors: 0,
        })
    }

    /// 驱动操作接口
    pub fn ops(&self) -> &Arc<dyn NetDeviceOps> {
        &self.ops
    }

    /// 注册时重置地址与计数器
    fn reset(&self, ifindex: u32) {
        self.ifindex.store(ifindex, Ordering::Release);
        *self.inet.lock() = InetConfig::unconfigured();
        self.rx_total.store(0, Ordering::Relaxed);
        self.tx_total.store(0, Ordering::Relaxed);
        self.rx_packets.store(0, Ordering::Relaxed);
        self.tx_packets.store(0, Ordering::Relaxed);
    }
}

impl core::fmt::Debug for NetInterface {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NetInterface")
            .field("name", &self.name)
            .field("ifindex", &self.ifindex())
            .field("mac", &self.mac)
            .field("ip", &self.ip())
            .field("state", &self.state())
            .finish()
    }
}

/// 接口状态变化监听者
///
/// 对应 Linux 的 netdevice notifier
///
/// 回调在状态切换的调用栈上同步执行，可能处于中断上下文，不得阻塞。
/// 回调中可以再次调用 `set_state()` 或订阅/注销监听者。
///
/// # 顺序
/// 状态在接口锁内切换，通知在锁外发出，因此：
/// - 回调中嵌套的 `set_state()` 会先把新状态通知完所有监听者，排在后面的监听者
///   随后才收到外层的旧事件（例如先看到 READY 再看到 UP）
/// - 两个执行单元并发切换同一接口时，事件送达顺序不保证与切换顺序一致
///
/// 需要当前状态的监听者应读取 `dev.state()`，不要依赖事件序列。
pub trait NetEventListener: Send + Sync {
    /// 接口进入新状态
    fn on_state_change(&self, stack: &NetStack, dev: &Arc<NetInterface>, state: NetState);
}

impl<F> NetEventListener for F
where
    F: Fn(&NetStack, &Arc<NetInterface>, NetState) + Send + Sync,
{
    fn on_state_change(&self, stack: &NetStack, dev: &Arc<NetInterface>, state: NetState) {
        self(stack, dev, state)
    }
}

/// 进程级主机名
///
/// 读者通过 [`Hostname::get`] 取得引用计数句柄；存在未释放句柄时拒绝修改。
pub struct Hostname {
    name: IrqSpinLock<Arc<str>>,
    handles: AtomicUsize,
}

/// 主机名读取句柄，Drop 时释放
pub struct HostnameHandle<'a> {
    name: Arc<str>,
    owner: &'a Hostname,
}

impl Hostname {
    /// 创建主机名
    pub fn new(name: &str) -> Self {
        Self {
            name: IrqSpinLock::new(Arc::from(name)),
            handles: AtomicUsize::new(0),
        }
    }

    /// 获取主机名，句柄释放前主机名不会被修改
    pub fn get(&self) -> HostnameHandle<'_> {
        let name = self.name.lock();
        self.handles.fetch_add(1, Ordering::AcqRel);
        HostnameHandle {
            name: name.clone(),
            owner: self,
        }
    }

    /// 修改主机名
    ///
    /// # 返回
    /// 仍有读者持有句柄时返回 EBUSY；名称为空或过长返回 EINVAL
    pub fn set(&self, name: &str) -> Result<()> {
        if name.is_empty() || name.len() > 63 {
            return Err(Errno::InvalidArgument);
        }
        let mut current = self.name.lock();
        if self.handles.load(Ordering::Acquire) != 0 {
            return Err(Errno::DeviceOrResourceBusy);
        }
        *current = Arc::from(name);
        Ok(())
    }

    /// 未释放的句柄数
    pub fn handles(&self) -> usize {
        self.handles.load(Ordering::Acquire)
    }
}

impl Deref for HostnameHandle<'_> {
    type Target = str;

    fn deref(&self) -> &str {
        &self.name
    }
}

impl Drop for HostnameHandle<'_> {
    fn drop(&mut self) {
        self.owner.handles.fetch_sub(1, Ordering::AcqRel);
    }
}

/// 接口注册表与事件总线
pub struct InterfaceRegistry {
    /// 已注册接口
    interfaces: IrqSpinLock<Vec<Arc<NetInterface>>>,
    /// 状态变化监听者
    listeners: NotifierChain<dyn NetEventListener>,
    /// 下一个接口索引
    next_ifindex: AtomicU32,
    /// 主机名
    hostname: Hostname,
}

impl InterfaceRegistry {
    /// 创建空注册表
    pub fn new(hostname: &str) -> Self {
        Self {
            interfaces: IrqSpinLock::new(Vec::new()),
            listeners: NotifierChain::new(),
            next_ifindex: AtomicU32::new(1),
            hostname: Hostname::new(hostname),
        }
    }

    /// 注册接口
    ///
    /// 对应 Linux 的 register_netdevice()
    ///
    /// # 参数
    /// - `stack`: 所属协议栈
    /// - `dev`: 接口
    /// - `initial_state`: 初始状态，经由 `set_state()` 生效
    ///
    /// # 说明
    /// - 分配接口索引，IP 重置为 `IP_NONE`，计数器清零
    /// - 接口名为空或过长返回 EINVAL，重复注册返回 EEXIST
    pub fn register(&self, stack: &NetStack, dev: &Arc<NetInterface>, initial_state: NetState) -> Result<()> {
        if dev.name().is_empty() || dev.name().len() >= IFNAMSIZ {
            return Err(Errno::InvalidArgument);
        }

        {
            let mut interfaces = self.interfaces.lock();
            if interfaces
                .iter()
                .any(|d| Arc::ptr_eq(d, dev) || d.name() == dev.name())
            {
                return Err(Errno::FileExists);
            }
            let ifindex = self.next_ifindex.fetch_add(1, Ordering::Relaxed);
            dev.reset(ifindex);
            interfaces.push(dev.clone());
        }

        info!("net: registered {} ({}) ifindex {}", dev.name(), dev.mac(), dev.ifindex());
        self.set_state(stack, dev, initial_state);
        Ok(())
    }

    /// 注销接口
    ///
    /// 对应 Linux 的 unregister_netdevice()
    ///
    /// 不会为注销发出最终的 DOWN 通知
    pub fn unregister(&self, dev: &Arc<NetInterface>) -> Result<()> {
        let mut interfaces = self.interfaces.lock();
        let pos = interfaces
            .iter()
            .position(|d| Arc::ptr_eq(d, dev))
            .ok_or(Errno::NoSuchDevice)?;
        interfaces.remove(pos);
        drop(interfaces);

        info!("net: unregistered {}", dev.name());
        Ok(())
    }

    /// 设置接口状态
    ///
    /// # 说明
    /// 状态未变化时直接返回 false。否则先执行内置处理：
    /// - UP/DOWN/ERROR：记录日志（DHCP 客户端作为监听者处理 UP）
    /// - READY：以进程级主机名在名称服务中注册该接口
    ///
    /// 然后按订阅顺序同步通知所有监听者。
    pub fn set_state(&self, stack: &NetStack, dev: &Arc<NetInterface>, state: NetState) -> bool {
        let old = {
            let mut current = dev.state.lock();
            if *current == state {
                return false;
            }
            core::mem::replace(&mut *current, state)
        };

        match state {
            NetState::Down => info!("net: {} is down", dev.name()),
            NetState::Up => info!("net: {} is up", dev.name()),
            NetState::Ready => {
                info!("net: {} is ready, ip {}", dev.name(), dev.ip());
                let hostname = self.hostname.get();
                stack.name_service().register_name(dev, &hostname);
            }
            NetState::Error => warn!("net: {} entered error state (was {})", dev.name(), old.as_str()),
        }

        self.listeners.fire(|listener| listener.on_state_change(stack, dev, state));
        true
    }

    /// 订阅状态变化
    pub fn subscribe(&self, listener: Arc<dyn NetEventListener>) -> NotifierId {
        self.listeners.subscribe(listener)
    }

    /// 注销订阅
    pub fn unsubscribe(&self, id: NotifierId) -> bool {
        let removed = self.listeners.unsubscribe(id);
        if !removed {
            debug!("net: unsubscribe of unknown listener {:?}", id);
        }
        removed
    }

    /// 监听者数量
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// 按名称查找接口
    ///
    /// 对应 Linux 的 dev_get_by_name()
    pub fn get_by_name(&self, name: &str) -> Option<Arc<NetInterface>> {
        self.interfaces.lock().iter().find(|d| d.name() == name).cloned()
    }

    /// 按索引查找接口
    ///
    /// 对应 Linux 的 dev_get_by_index()
    pub fn get_by_index(&self, ifindex: u32) -> Option<Arc<NetInterface>> {
        self.interfaces.lock().iter().find(|d| d.ifindex() == ifindex).cloned()
    }

    /// 所有已注册接口的快照
    pub fn interfaces(&self) -> Vec<Arc<NetInterface>> {
        self.interfaces.lock().clone()
    }

    /// 已注册接口数量
    pub fn len(&self) -> usize {
        self.interfaces.lock().len()
    }

    /// 是否没有接口
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 获取主机名
    pub fn get_hostname(&self) -> HostnameHandle<'_> {
        self.hostname.get()
    }

    /// 释放主机名句柄
    pub fn release_hostname(&self, handle: HostnameHandle<'_>) {
        drop(handle);
    }

    /// 修改主机名，存在未释放句柄时返回 EBUSY
    pub fn set_hostname(&self, name: &str) -> Result<()> {
        self.hostname.set(name)?;
        info!("net: hostname set to {}", name);
        Ok(())
    }

    /// 主机名
    pub fn hostname(&self) -> &Hostname {
        &self.hostname
    }

    /// 清空注册表与监听者
    pub(crate) fn clear(&self) {
        self.interfaces.lock().clear();
        self.listeners.clear();
    }
}
