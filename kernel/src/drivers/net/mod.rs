//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络设备驱动接口
//!
//! 遵循 Linux 内核的网络设备驱动设计
//! 参考: drivers/net/, include/linux/netdevice.h

pub mod space;

pub use space::{
    NetDeviceOps, DeviceStats, ArpHrdType, InterfaceFlags,
    IFNAMSIZ,
};
