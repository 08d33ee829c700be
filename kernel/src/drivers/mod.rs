//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 设备驱动模块
//!
//! 网络子系统只通过 `net::NetDeviceOps` 与具体驱动交互

pub mod net;
