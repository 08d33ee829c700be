//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! Internet 校验和计算
//!
//! 完全遵循 RFC 1071 - Computing the Internet Checksum
//! 参考: include/net/checksum.h, lib/checksum.c

use core::net::Ipv4Addr;

/// 累加部分校验和
///
/// # 参数
/// - `data`: 数据
/// - `sum`: 之前累加的部分和
///
/// # 返回
/// 折叠到 16 位以内的部分和（未取反）
///
/// # 说明
/// - 按大端 16 位字累加，进位回卷
/// - 奇数长度时最后一个字节作为高字节，低字节补零
/// - 多段数据分次累加时，只有最后一段允许奇数长度
pub fn csum_partial(data: &[u8], sum: u32) -> u32 {
    let mut acc = sum as u64;

    let mut chunks = data.chunks_exact(2);
    for word in &mut chunks {
        acc += u16::from_be_bytes([word[0], word[1]]) as u64;
    }
    if let [last] = chunks.remainder() {
        acc += (*last as u64) << 8;
    }

    while acc >> 16 != 0 {
        acc = (acc & 0xFFFF) + (acc >> 16);
    }
    acc as u32
}

/// 折叠并取反，得到最终校验和
///
/// 对应 Linux 的 csum_fold()
pub fn csum_fold(sum: u32) -> u16 {
    let mut sum = sum;
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// 计算 Internet 校验和
///
/// # 参数
/// - `data`: 数据（校验和字段必须已清零）
///
/// # 返回
/// 校验和（主机序数值，写入时用 `to_be_bytes`）
pub fn ip_checksum(data: &[u8]) -> u16 {
    csum_fold(csum_partial(data, 0))
}

/// 验证 Internet 校验和
///
/// 包含校验和字段在内重新累加，结果取反后为 0 即有效
pub fn verify_checksum(data: &[u8]) -> bool {
    ip_checksum(data) == 0
}

/// 计算伪头部部分和 (用于 TCP/UDP)
///
/// # 参数
/// - `src_addr`: 源 IP 地址
/// - `dst_addr`: 目标 IP 地址
/// - `protocol`: 协议号
/// - `len`: TCP/UDP 头部加数据的长度
///
/// # 返回
/// 未取反的部分和，继续传给 `csum_partial`
pub fn pseudo_header_sum(src_addr: Ipv4Addr, dst_addr: Ipv4Addr, protocol: u8, len: u16) -> u32 {
    let mut pseudo_header = [0u8; 12];

    pseudo_header[0..4].copy_from_slice(&src_addr.octets());
    pseudo_header[4..8].copy_from_slice(&dst_addr.octets());
    // 保留 (1 字节) + 协议 (1 字节)
    pseudo_header[8] = 0;
    pseudo_header[9] = protocol;
    pseudo_header[10..12].copy_from_slice(&len.to_be_bytes());

    csum_partial(&pseudo_header, 0)
}

/// 计算带伪头部的传输层校验和
///
/// # 参数
/// - `src_addr`, `dst_addr`: 伪头部中的地址
/// - `protocol`: 协议号
/// - `segment`: 传输层头部加数据（校验和字段已清零）
pub fn transport_checksum(src_addr: Ipv4Addr, dst_addr: Ipv4Addr, protocol: u8, segment: &[u8]) -> u16 {
    let sum = pseudo_header_sum(src_addr, dst_addr, protocol, segment.len() as u16);
    csum_fold(csum_partial(segment, sum))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 校验和字段清零的 IPv4 头部
    const IP_HEADER: [u8; 20] = [
        0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11,
        0x00, 0x00, 0xc0, 0xa8, 0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
    ];

    #[test]
    fn test_ip_checksum() {
        assert_eq!(ip_checksum(&IP_HEADER), 0xb861);
    }

    #[test]
    fn test_checksum_verifies_to_zero() {
        let mut header = IP_HEADER;
        let csum = ip_checksum(&header);
        header[10..12].copy_from_slice(&csum.to_be_bytes());
        assert!(verify_checksum(&header));
        assert_eq!(csum_fold(csum_partial(&header, 0)), 0);
    }

    #[test]
    fn test_odd_length_pads_high_byte() {
        // 0x01 视为 0x0100
        assert_eq!(ip_checksum(&[0x01]), !0x0100);
        assert_eq!(ip_checksum(&[0x12, 0x34, 0x56]), !(0x1234u16 + 0x5600));

        let mut data = [0xde, 0xad, 0x00, 0x00, 0xbe];
        let csum = ip_checksum(&data);
        data[2..4].copy_from_slice(&csum.to_be_bytes());
        assert!(verify_checksum(&data));
    }

    #[test]
    fn test_end_around_carry() {
        // 0xffff + 0x0001 = 0x10000 -> 0x0001
        assert_eq!(csum_partial(&[0xff, 0xff, 0x00, 0x01], 0), 0x0001);
    }

    #[test]
    fn test_transport_checksum_verifies() {
        let src = Ipv4Addr::new(192, 168, 1, 1);
        let dst = Ipv4Addr::new(192, 168, 1, 2);
        let mut segment = [0x00, 0x44, 0x00, 0x43, 0x00, 0x09, 0x00, 0x00, 0x7f];

        let csum = transport_checksum(src, dst, 17, &segment);
        segment[6..8].copy_from_slice(&csum.to_be_bytes());

        let sum = pseudo_header_sum(src, dst, 17, segment.len() as u16);
        assert_eq!(csum_fold(csum_partial(&segment, sum)), 0);
    }
}
