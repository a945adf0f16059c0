//! UDP-RTP-TS 传输层包分析器.
//!
//! 分析单个 UDP 数据报载荷: 先解析 RTP 固定头部 (RFC 3550),
//! 之后的字节视为若干个 188 字节 MPEG-TS 包的拼接 (ISO/IEC 13818-1).
//!
//! # RTP 固定头部 (12 字节起)
//! ```text
//! V(2) P(1) X(1) CC(4) | M(1) PT(7) | sequence number (16)
//! timestamp (32)
//! SSRC (32)
//! [CSRC × CC, 各 4 字节]
//! [扩展头部: profile(16) + length(16) + length×4 字节]
//! ```
//!
//! # TS 包头 (每 188 字节槽位的前 4 字节)
//! ```text
//! 同步字节 (0x47)
//! TEI(1) + PUSI(1) + Priority(1) + PID(13)
//! TSC(2) + AFC(2) + CC(4)
//! ```
//!
//! 同步字节损坏或末尾对齐不足按诊断记录报告, 其余槽位尽力解析 --
//! 网络丢包打坏单个包时剩余载荷往往仍然可用.

use log::warn;
use std::collections::HashMap;
use xi_core::{BitReader, ByteCursor, XiError, XiResult};

use crate::diagnostic::Diagnostic;

/// TS 包大小
pub const TS_PACKET_SIZE: usize = 188;
/// TS 同步字节
pub const TS_SYNC_BYTE: u8 = 0x47;
/// 空包 PID (连续计数器无意义)
const PID_NULL: u16 = 0x1FFF;

/// RTP 固定头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// 版本, 合法值恒为 2
    pub version: u8,
    /// 填充标志
    pub padding: bool,
    /// 扩展头部标志
    pub extension: bool,
    /// CSRC 数量
    pub csrc_count: u8,
    /// 标记位
    pub marker: bool,
    /// 载荷类型
    pub payload_type: u8,
    /// 序列号
    pub sequence_number: u16,
    /// 时间戳
    pub timestamp: u32,
    /// 同步源标识
    pub ssrc: u32,
    /// 载荷起始偏移 (CSRC 与扩展头部之后)
    pub payload_offset: usize,
}

/// 一个 TS 包记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsPacket {
    /// 槽位序号 (从 0 开始)
    pub index: usize,
    /// 传输错误指示
    pub transport_error_indicator: bool,
    /// 载荷单元起始指示
    pub payload_unit_start_indicator: bool,
    /// 流 PID (13 位)
    pub pid: u16,
    /// 连续计数器 (4 位)
    pub continuity_counter: u8,
}

/// 单个数据报的分析结果
///
/// 诊断记录与部分产出并列返回, 非致命异常不会丢弃.
#[derive(Debug, Clone)]
pub struct DatagramReport {
    /// RTP 头部
    pub rtp: RtpHeader,
    /// 有效的 TS 包记录
    pub ts_packets: Vec<TsPacket>,
    /// 非致命异常记录
    pub diagnostics: Vec<Diagnostic>,
}

/// 解析 RTP 固定头部, 跳过 CSRC 列表与扩展头部
fn parse_rtp_header(cursor: &mut ByteCursor<'_>) -> XiResult<RtpHeader> {
    // 固定部分 12 字节整体读取或失败
    cursor.peek_bytes(12)?;

    let mut br = cursor.bits();
    let version = br.read_bits(2)? as u8;
    if version != 2 {
        return Err(XiError::MalformedHeader(format!(
            "RTP: 版本非法 (实际={}, 期望 2)",
            version
        )));
    }
    let padding = br.read_flag()?;
    let extension = br.read_flag()?;
    let csrc_count = br.read_bits(4)? as u8;
    let marker = br.read_flag()?;
    let payload_type = br.read_bits(7)? as u8;
    let sequence_number = br.read_bits(16)? as u16;
    let timestamp = br.read_bits(32)?;
    let ssrc = br.read_bits(32)?;
    cursor.skip(12)?;

    // CSRC 列表
    cursor.skip(usize::from(csrc_count) * 4)?;

    // 扩展头部: profile (16) + 长度 (16, 单位 4 字节)
    if extension {
        let _profile = cursor.read_u16_be()?;
        let words = cursor.read_u16_be()?;
        cursor.skip(usize::from(words) * 4)?;
    }

    Ok(RtpHeader {
        version,
        padding,
        extension,
        csrc_count,
        marker,
        payload_type,
        sequence_number,
        timestamp,
        ssrc,
        payload_offset: cursor.position(),
    })
}

/// UDP-RTP-TS 分析器
///
/// 跨数据报维护每个 PID 的连续计数器, 对同一路流连续喂入
/// 数据报即可检测跨报文的连续性跳变. 新流使用新分析器.
pub struct TsRtpAnalyzer {
    /// PID → 最近一次的连续计数器
    last_cc: HashMap<u16, u8>,
}

impl TsRtpAnalyzer {
    /// 创建分析器
    pub fn new() -> Self {
        Self {
            last_cc: HashMap::new(),
        }
    }

    /// 清空连续计数器状态
    pub fn reset(&mut self) {
        self.last_cc.clear();
    }

    /// 分析一个 UDP 数据报载荷
    pub fn analyze(&mut self, datagram: &[u8]) -> XiResult<DatagramReport> {
        let mut cursor = ByteCursor::new(datagram);
        let rtp = parse_rtp_header(&mut cursor)?;

        let mut diagnostics = Vec::new();

        // RTP 头部之后必须是整数个 188 字节槽位
        let trailing = cursor.remaining() % TS_PACKET_SIZE;
        if trailing != 0 {
            warn!(
                "RTP: TS 区域末尾多出 {} 字节, 不满足 188 字节对齐",
                trailing
            );
            diagnostics.push(Diagnostic::TsAlignment { trailing });
        }

        let slots = cursor.remaining() / TS_PACKET_SIZE;
        let mut ts_packets = Vec::with_capacity(slots);

        for index in 0..slots {
            let slot = cursor.read_bytes(TS_PACKET_SIZE)?;
            match self.parse_ts_packet(slot, index, &mut diagnostics) {
                Some(pkt) => ts_packets.push(pkt),
                None => continue, // 同步字节损坏, 槽位跳过, 继续尽力解析
            }
        }

        Ok(DatagramReport {
            rtp,
            ts_packets,
            diagnostics,
        })
    }

    /// 解析一个 188 字节槽位的包头
    fn parse_ts_packet(
        &mut self,
        slot: &[u8],
        index: usize,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<TsPacket> {
        let mut br = BitReader::new(slot);
        // 188 字节槽位内的 4 字节头部读取不会失败
        let sync = br.read_bits(8).ok()? as u8;
        if sync != TS_SYNC_BYTE {
            warn!("TS: 槽位 {} 同步字节非法 (实际=0x{:02X})", index, sync);
            diagnostics.push(Diagnostic::SyncByteMismatch {
                index,
                actual: sync,
            });
            return None;
        }

        let transport_error_indicator = br.read_flag().ok()?;
        let payload_unit_start_indicator = br.read_flag().ok()?;
        let _priority = br.read_bit().ok()?;
        let pid = br.read_bits(13).ok()? as u16;
        let _scrambling = br.read_bits(2).ok()?;
        let _afc = br.read_bits(2).ok()?;
        let continuity_counter = br.read_bits(4).ok()? as u8;

        // 连续计数器校验 (空包除外)
        if pid != PID_NULL {
            if let Some(prev) = self.last_cc.insert(pid, continuity_counter) {
                let expected = (prev + 1) & 0x0F;
                if continuity_counter != expected {
                    warn!(
                        "TS: PID 0x{:04X} 槽位 {} 连续计数器跳变 (期望={}, 实际={})",
                        pid, index, expected, continuity_counter
                    );
                    diagnostics.push(Diagnostic::ContinuityGap {
                        pid,
                        expected,
                        actual: continuity_counter,
                        index,
                    });
                }
            }
        }

        Some(TsPacket {
            index,
            transport_error_indicator,
            payload_unit_start_indicator,
            pid,
            continuity_counter,
        })
    }
}

impl Default for TsRtpAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 构造 RTP 固定头部 (12 字节)
    fn build_rtp_header(sequence: u16, timestamp: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.push(0x80); // V=2, P=0, X=0, CC=0
        data.push(33); // M=0, PT=33 (MP2T)
        data.extend_from_slice(&sequence.to_be_bytes());
        data.extend_from_slice(&timestamp.to_be_bytes());
        data.extend_from_slice(&0x1234_5678u32.to_be_bytes()); // SSRC
        data
    }

    /// 构造一个 TS 包 (188 字节)
    fn build_ts_packet(pid: u16, cc: u8, pusi: bool) -> [u8; TS_PACKET_SIZE] {
        let mut pkt = [0xFFu8; TS_PACKET_SIZE];
        pkt[0] = TS_SYNC_BYTE;
        pkt[1] = if pusi { 0x40 } else { 0x00 } | ((pid >> 8) as u8 & 0x1F);
        pkt[2] = pid as u8;
        pkt[3] = 0x10 | (cc & 0x0F); // AFC=01 (payload only)
        pkt
    }

    /// 构造 RTP + N 个 TS 包的数据报
    fn build_datagram(pids_cc: &[(u16, u8)]) -> Vec<u8> {
        let mut data = build_rtp_header(1, 90000);
        for &(pid, cc) in pids_cc {
            data.extend_from_slice(&build_ts_packet(pid, cc, false));
        }
        data
    }

    #[test]
    fn test_rtp_header_fields() {
        let data = build_datagram(&[]);
        let mut analyzer = TsRtpAnalyzer::new();
        let report = analyzer.analyze(&data).unwrap();

        assert_eq!(report.rtp.version, 2);
        assert!(!report.rtp.padding);
        assert!(!report.rtp.extension);
        assert_eq!(report.rtp.csrc_count, 0);
        assert_eq!(report.rtp.payload_type, 33);
        assert_eq!(report.rtp.sequence_number, 1);
        assert_eq!(report.rtp.timestamp, 90000);
        assert_eq!(report.rtp.ssrc, 0x1234_5678);
        assert_eq!(report.rtp.payload_offset, 12);
    }

    #[test]
    fn test_three_ts_packets_no_diagnostics() {
        // 12 + 3×188 字节, 全部同步字节有效
        let data = build_datagram(&[(0x100, 0), (0x100, 1), (0x100, 2)]);
        assert_eq!(data.len(), 12 + 3 * TS_PACKET_SIZE);

        let mut analyzer = TsRtpAnalyzer::new();
        let report = analyzer.analyze(&data).unwrap();

        assert_eq!(report.ts_packets.len(), 3);
        assert!(report.diagnostics.is_empty());
        for (i, pkt) in report.ts_packets.iter().enumerate() {
            assert_eq!(pkt.index, i);
            assert_eq!(pkt.pid, 0x100);
            assert_eq!(pkt.continuity_counter, i as u8);
        }
    }

    #[test]
    fn test_flipped_sync_byte_reported_scan_continues() {
        let mut data = build_datagram(&[(0x100, 0), (0x100, 1), (0x100, 2)]);
        data[12 + TS_PACKET_SIZE] = 0x00; // 破坏第二个包的同步字节

        let mut analyzer = TsRtpAnalyzer::new();
        let report = analyzer.analyze(&data).unwrap();

        assert_eq!(report.ts_packets.len(), 2);
        assert!(report.diagnostics.contains(&Diagnostic::SyncByteMismatch {
            index: 1,
            actual: 0x00
        }));
        // 第三个包照常解析
        assert_eq!(report.ts_packets[1].index, 2);
    }

    #[test]
    fn test_alignment_violation_reported() {
        let mut data = build_datagram(&[(0x100, 0)]);
        data.extend_from_slice(&[0xAB; 100]); // 末尾多出 100 字节

        let mut analyzer = TsRtpAnalyzer::new();
        let report = analyzer.analyze(&data).unwrap();

        assert_eq!(report.ts_packets.len(), 1);
        assert!(report
            .diagnostics
            .contains(&Diagnostic::TsAlignment { trailing: 100 }));
    }

    #[test]
    fn test_continuity_gap_within_datagram() {
        // CC 从 3 跳到 7
        let data = build_datagram(&[(0x100, 3), (0x100, 7)]);
        let mut analyzer = TsRtpAnalyzer::new();
        let report = analyzer.analyze(&data).unwrap();

        assert_eq!(report.ts_packets.len(), 2);
        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::ContinuityGap {
                pid: 0x100,
                expected: 4,
                actual: 7,
                index: 1
            }]
        );
    }

    #[test]
    fn test_continuity_tracked_across_datagrams() {
        let mut analyzer = TsRtpAnalyzer::new();

        let first = build_datagram(&[(0x100, 14), (0x100, 15)]);
        let report = analyzer.analyze(&first).unwrap();
        assert!(report.diagnostics.is_empty());

        // 计数器回绕 15 → 0 是连续的
        let second = build_datagram(&[(0x100, 0)]);
        let report = analyzer.analyze(&second).unwrap();
        assert!(report.diagnostics.is_empty());

        // 跨数据报跳变 0 → 5
        let third = build_datagram(&[(0x100, 5)]);
        let report = analyzer.analyze(&third).unwrap();
        assert_eq!(report.diagnostics.len(), 1);
    }

    #[test]
    fn test_per_pid_continuity_independent() {
        let data = build_datagram(&[(0x100, 0), (0x101, 9), (0x100, 1), (0x101, 10)]);
        let mut analyzer = TsRtpAnalyzer::new();
        let report = analyzer.analyze(&data).unwrap();
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_null_packet_exempt_from_continuity() {
        let data = build_datagram(&[(PID_NULL, 0), (PID_NULL, 0), (PID_NULL, 9)]);
        let mut analyzer = TsRtpAnalyzer::new();
        let report = analyzer.analyze(&data).unwrap();
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_csrc_and_extension_skipped() {
        let mut data = Vec::new();
        data.push(0x90 | 2); // V=2, P=0, X=1, CC=2
        data.push(33);
        data.extend_from_slice(&7u16.to_be_bytes());
        data.extend_from_slice(&1000u32.to_be_bytes());
        data.extend_from_slice(&0xAABB_CCDDu32.to_be_bytes());
        // 2 个 CSRC
        data.extend_from_slice(&[0x11; 4]);
        data.extend_from_slice(&[0x22; 4]);
        // 扩展头部: profile + 2 个 4 字节字
        data.extend_from_slice(&0xBEDEu16.to_be_bytes());
        data.extend_from_slice(&2u16.to_be_bytes());
        data.extend_from_slice(&[0x33; 8]);
        let payload_start = data.len();
        data.extend_from_slice(&build_ts_packet(0x42, 0, true));

        let mut analyzer = TsRtpAnalyzer::new();
        let report = analyzer.analyze(&data).unwrap();

        assert_eq!(report.rtp.csrc_count, 2);
        assert!(report.rtp.extension);
        assert_eq!(report.rtp.payload_offset, payload_start);
        assert_eq!(report.ts_packets.len(), 1);
        assert_eq!(report.ts_packets[0].pid, 0x42);
        assert!(report.ts_packets[0].payload_unit_start_indicator);
    }

    #[test]
    fn test_bad_version_rejected() {
        let mut data = build_datagram(&[]);
        data[0] = 0x40; // V=1
        let mut analyzer = TsRtpAnalyzer::new();
        assert!(matches!(
            analyzer.analyze(&data),
            Err(XiError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_truncated_header_rejected() {
        let data = [0x80, 33, 0x00];
        let mut analyzer = TsRtpAnalyzer::new();
        assert!(matches!(
            analyzer.analyze(&data),
            Err(XiError::Truncated { .. })
        ));
    }

    #[test]
    fn test_reanalysis_is_identical() {
        let data = build_datagram(&[(0x100, 0), (0x101, 5), (0x100, 1)]);

        let mut a = TsRtpAnalyzer::new();
        let mut b = TsRtpAnalyzer::new();
        let ra = a.analyze(&data).unwrap();
        let rb = b.analyze(&data).unwrap();

        assert_eq!(ra.rtp, rb.rtp);
        assert_eq!(ra.ts_packets, rb.ts_packets);
        assert_eq!(ra.diagnostics, rb.diagnostics);
    }
}
