//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! K-OS 网络控制面
//!
//! 接口生命周期、ARP 缓存、DHCP 客户端以及它们依赖的报文构造与校验和。
//! 链路层驱动通过 [`drivers::net::NetDeviceOps`] 接入，接收入口为
//! [`net::NetStack::netif_rx`]。

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod config;
pub mod drivers;
pub mod errno;
pub mod net;
pub mod notifier;
pub mod sync;

#[cfg(test)]
mod tests;
