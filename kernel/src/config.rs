//! K-OS 网络配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "K-OS";

/// 内核版本
pub const KERNEL_VERSION: &str = "0.1.0";

// ============================================================
// 网络配置
// ============================================================

/// 默认主机名
pub const HOSTNAME: &str = "K-OS";

/// 以太网 MTU
pub const ETH_MTU: usize = 1500;

/// SkBuff 预留头部空间（字节）
pub const SKB_HEADROOM: usize = 64;

/// IPv4 默认 TTL
pub const IP_DEFAULT_TTL: u8 = 64;

// ============================================================
// 协议端口
// ============================================================

/// DHCP 客户端端口
pub const DHCP_CLIENT_PORT: u16 = 68;

/// DHCP 服务器端口
pub const DHCP_SERVER_PORT: u16 = 67;

/// DHCP 报文最小长度（字节）
pub const DHCP_MIN_MESSAGE_LEN: usize = 300;

/// NBNS 端口
pub const NBNS_PORT: u16 = 137;

// ============================================================
// 随机数
// ============================================================

/// DHCP xid 随机数种子
pub const RAND_SEED: u64 = 0x4b2d4f53;
