//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络子系统错误代码
//!
//! 编号与 include/uapi/asm-generic/errno.h 一致

/// 网络子系统错误代码
///
/// 使用方法：
/// ```rust,ignore
/// use crate::errno::{Errno, Result};
///
/// fn lookup() -> Result<()> {
///     Err(Errno::NoSuchDevice)
/// }
/// ```
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Errno {
    /// Device or resource busy (EBUSY, 16)
    DeviceOrResourceBusy = 16,

    /// File exists (EEXIST, 17)
    FileExists = 17,

    /// No such device (ENODEV, 19)
    NoSuchDevice = 19,

    /// Invalid argument (EINVAL, 22)
    InvalidArgument = 22,

    /// Protocol error (EPROTO, 71)
    ProtocolError = 71,

    /// Not a data message (EBADMSG, 74)
    BadMessage = 74,

    /// Message too long (EMSGSIZE, 90)
    MessageTooLong = 90,

    /// Protocol not supported (EPROTONOSUPPORT, 93)
    ProtocolNotSupported = 93,

    /// Socket type not supported (ESOCKTNOSUPPORT, 94)
    SocketTypeNotSupported = 94,

    /// Cannot assign requested address (EADDRNOTAVAIL, 99)
    AddressNotAvailable = 99,

    /// Network is down (ENETDOWN, 100)
    NetworkDown = 100,

    /// No buffer space available (ENOBUFS, 105)
    NoBufferSpace = 105,

    /// No route to host (EHOSTUNREACH, 113)
    HostUnreachable = 113,
}

impl Errno {
    /// 获取错误代码的正数值（用于比较）
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// 获取错误代码的负数值（用于系统调用返回）
    #[inline]
    pub const fn as_neg_i32(self) -> i32 {
        -(self as i32)
    }

    /// 错误名称，日志输出使用
    pub const fn name(self) -> &'static str {
        match self {
            Errno::DeviceOrResourceBusy => "EBUSY",
            Errno::FileExists => "EEXIST",
            Errno::NoSuchDevice => "ENODEV",
            Errno::InvalidArgument => "EINVAL",
            Errno::ProtocolError => "EPROTO",
            Errno::BadMessage => "EBADMSG",
            Errno::MessageTooLong => "EMSGSIZE",
            Errno::ProtocolNotSupported => "EPROTONOSUPPORT",
            Errno::SocketTypeNotSupported => "ESOCKTNOSUPPORT",
            Errno::AddressNotAvailable => "EADDRNOTAVAIL",
            Errno::NetworkDown => "ENETDOWN",
            Errno::NoBufferSpace => "ENOBUFS",
            Errno::HostUnreachable => "EHOSTUNREACH",
        }
    }
}

impl core::fmt::Display for Errno {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_i32())
    }
}

/// 网络子系统结果类型
pub type Result<T> = core::result::Result<T, Errno>;

/// 常用的错误代码常量
pub mod constants {
    pub const EBUSY: i32 = 16;
    pub const EEXIST: i32 = 17;
    pub const ENODEV: i32 = 19;
    pub const EINVAL: i32 = 22;
    pub const EPROTO: i32 = 71;
    pub const EBADMSG: i32 = 74;
    pub const EMSGSIZE: i32 = 90;
    pub const EPROTONOSUPPORT: i32 = 93;
    pub const ESOCKTNOSUPPORT: i32 = 94;
    pub const EADDRNOTAVAIL: i32 = 99;
    pub const ENETDOWN: i32 = 100;
    pub const ENOBUFS: i32 = 105;
    pub const EHOSTUNREACH: i32 = 113;
}
