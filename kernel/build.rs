//! K-OS 网络子系统构建脚本
//!
//! 这个脚本在编译前运行，负责：
//! 1. 解析 Kernel.toml 配置文件
//! 2. 生成 src/config.rs 配置常量

use std::env;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

/// Kernel.toml 顶层结构
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KernelConfig {
    general: GeneralSection,
    network: NetworkSection,
}

/// [general] 段
#[derive(Debug, Deserialize)]
#[serde(default)]
struct GeneralSection {
    name: String,
    version: String,
}

impl Default for GeneralSection {
    fn default() -> Self {
        Self {
            name: "K-OS".to_string(),
            version: "0.1.0".to_string(),
        }
    }
}

/// [network] 段
#[derive(Debug, Deserialize)]
#[serde(default)]
struct NetworkSection {
    hostname: String,
    eth_mtu: usize,
    skb_headroom: usize,
    ip_default_ttl: u8,
    dhcp_client_port: u16,
    dhcp_server_port: u16,
    dhcp_min_message_len: usize,
    nbns_port: u16,
    rand_seed: u64,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            hostname: "K-OS".to_string(),
            eth_mtu: 1500,
            skb_headroom: 64,
            ip_default_ttl: 64,
            dhcp_client_port: 68,
            dhcp_server_port: 67,
            dhcp_min_message_len: 300,
            nbns_port: 137,
            rand_seed: 0x4b2d_4f53,
        }
    }
}

fn main() {
    println!("cargo:rerun-if-changed=../Kernel.toml");
    println!("cargo:rerun-if-changed=build.rs");

    // 配置文件缺失时使用默认值
    let config: KernelConfig = match fs::read_to_string("../Kernel.toml") {
        Ok(content) => toml::from_str(&content).expect("Kernel.toml 解析失败"),
        Err(_) => {
            println!("cargo:warning=Kernel.toml not found, using defaults");
            KernelConfig::default()
        }
    };

    println!("cargo:rustc-env=KOS_KERNEL_NAME={}", config.general.name);
    println!("cargo:rustc-env=KOS_KERNEL_VERSION={}", config.general.version);

    generate_config_code(&config);
}

fn generate_config_code(config: &KernelConfig) {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let net = &config.network;

    let config_header = format!(
        r#"//! K-OS 网络配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "{}";

/// 内核版本
pub const KERNEL_VERSION: &str = "{}";

// ============================================================
// 网络配置
// ============================================================

/// 默认主机名
pub const HOSTNAME: &str = "{}";

/// 以太网 MTU
pub const ETH_MTU: usize = {};

/// SkBuff 预留头部空间（字节）
pub const SKB_HEADROOM: usize = {};

/// IPv4 默认 TTL
pub const IP_DEFAULT_TTL: u8 = {};

// ============================================================
// 协议端口
// ============================================================

/// DHCP 客户端端口
pub const DHCP_CLIENT_PORT: u16 = {};

/// DHCP 服务器端口
pub const DHCP_SERVER_PORT: u16 = {};

/// DHCP 报文最小长度（字节）
pub const DHCP_MIN_MESSAGE_LEN: usize = {};

/// NBNS 端口
pub const NBNS_PORT: u16 = {};

// ============================================================
// 随机数
// ============================================================

/// DHCP xid 随机数种子
pub const RAND_SEED: u64 = {:#x};
"#,
        config.general.name,
        config.general.version,
        net.hostname,
        net.eth_mtu,
        net.skb_headroom,
        net.ip_default_ttl,
        net.dhcp_client_port,
        net.dhcp_server_port,
        net.dhcp_min_message_len,
        net.nbns_port,
        net.rand_seed,
    );

    let config_file = manifest_dir.join("src").join("config.rs");

    // 只有内容变化时才写入，避免每次编译都更新文件时间戳
    let existing_content = fs::read_to_string(&config_file).unwrap_or_default();
    if existing_content != config_header {
        fs::write(&config_file, &config_header).expect("写入配置文件失败");
    }
}
