//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! IPv4 输出路由
//!
//! 参考: net/ipv4/route.c, net/ipv4/ip_output.c (ip_finish_output2)
//!
//! 没有路由表：所有目标都视为直连，只区分广播、已解析与需要 ARP 三种情况。

use log::trace;

use crate::errno::{Errno, Result};
use crate::net::buffer::{PacketState, SkBuff};
use crate::net::ethernet::dev_queue_xmit;
use crate::net::interface::NetState;
use crate::net::{NetStack, IP_BROADCAST};

/// 输出路由类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteType {
    /// 有限广播
    Broadcast,
    /// 调用者已填入目标 MAC
    Resolved,
    /// 需要经 ARP 解析
    Neighbour,
}

impl RouteType {
    /// 判断数据包的输出路由类型
    pub fn classify(skb: &SkBuff) -> Self {
        if skb.state == PacketState::Resolved {
            RouteType::Resolved
        } else if skb.route.dst_ip == IP_BROADCAST {
            RouteType::Broadcast
        } else {
            RouteType::Neighbour
        }
    }
}

/// 输出路由决策
///
/// # 说明
/// - 接口 DOWN 时返回 ENETDOWN，数据包被丢弃
/// - 已解析的数据包直接交给链路层
/// - 其余交给 ARP 缓存（广播目标由 ARP 直接填入广播 MAC）
pub fn ip_route_output(stack: &NetStack, skb: SkBuff) -> Result<()> {
    let dev = skb.dev();
    if dev.state() == NetState::Down {
        return Err(Errno::NetworkDown);
    }

    let route = RouteType::classify(&skb);
    trace!("route: {} -> {} via {} ({:?})", skb.route.src_ip, skb.route.dst_ip, dev.name(), route);

    match route {
        RouteType::Resolved => dev_queue_xmit(skb),
        RouteType::Broadcast | RouteType::Neighbour => stack.arp().resolve(skb),
    }
}
