//! UDP-RTP-TS 分析器集成测试

use xi::scan::{Diagnostic, TsRtpAnalyzer};

const TS_PACKET_SIZE: usize = 188;
const TS_SYNC_BYTE: u8 = 0x47;

// ============================================================
// 辅助函数: 构建 RTP 数据报
// ============================================================

/// 构造 RTP 固定头部 (12 字节, PT=33 即 MP2T)
fn build_rtp_header(sequence: u16, timestamp: u32) -> Vec<u8> {
    let mut data = Vec::new();
    data.push(0x80); // V=2
    data.push(33);
    data.extend_from_slice(&sequence.to_be_bytes());
    data.extend_from_slice(&timestamp.to_be_bytes());
    data.extend_from_slice(&0xDEAD_BEEFu32.to_be_bytes());
    data
}

/// 构造一个 TS 包
fn build_ts_packet(pid: u16, cc: u8) -> [u8; TS_PACKET_SIZE] {
    let mut pkt = [0xFFu8; TS_PACKET_SIZE];
    pkt[0] = TS_SYNC_BYTE;
    pkt[1] = (pid >> 8) as u8 & 0x1F;
    pkt[2] = pid as u8;
    pkt[3] = 0x10 | (cc & 0x0F);
    pkt
}

/// 构造 RTP + N 个 TS 包的数据报
fn build_datagram(sequence: u16, pids_cc: &[(u16, u8)]) -> Vec<u8> {
    let mut data = build_rtp_header(sequence, 90000 + u32::from(sequence) * 3600);
    for &(pid, cc) in pids_cc {
        data.extend_from_slice(&build_ts_packet(pid, cc));
    }
    data
}

#[test]
fn test_three_packets_clean_report() {
    // 12 + 3×188 字节, 同步字节全部有效
    let data = build_datagram(0, &[(0x100, 0), (0x100, 1), (0x100, 2)]);
    assert_eq!(data.len(), 12 + 3 * TS_PACKET_SIZE);

    let mut analyzer = TsRtpAnalyzer::new();
    let report = analyzer.analyze(&data).unwrap();

    assert_eq!(report.ts_packets.len(), 3, "应报告 3 个 TS 包");
    assert!(report.diagnostics.is_empty(), "不应有对齐/同步告警");
    assert_eq!(report.rtp.payload_type, 33);
}

#[test]
fn test_flipped_sync_two_valid_one_violation() {
    // 第二个包的同步字节翻转为 0x00
    let mut data = build_datagram(0, &[(0x100, 0), (0x100, 1), (0x100, 2)]);
    data[12 + TS_PACKET_SIZE] = 0x00;

    let mut analyzer = TsRtpAnalyzer::new();
    let report = analyzer.analyze(&data).unwrap();

    assert_eq!(report.ts_packets.len(), 2, "应剩 2 个有效 TS 包");
    let sync_violations = report
        .diagnostics
        .iter()
        .filter(|d| matches!(d, Diagnostic::SyncByteMismatch { .. }))
        .count();
    assert_eq!(sync_violations, 1, "应报告 1 次同步字节告警");
    // 扫描完成到最后一个槽位
    assert_eq!(report.ts_packets.last().unwrap().index, 2);
}

#[test]
fn test_continuity_across_datagram_sequence() {
    let mut analyzer = TsRtpAnalyzer::new();

    // 三个数据报模拟连续推流, 中间丢失一个 CC
    let d0 = build_datagram(0, &[(0x44, 0), (0x44, 1)]);
    let d1 = build_datagram(1, &[(0x44, 2), (0x44, 3)]);
    let d2 = build_datagram(2, &[(0x44, 5)]); // CC=4 丢失

    assert!(analyzer.analyze(&d0).unwrap().diagnostics.is_empty());
    assert!(analyzer.analyze(&d1).unwrap().diagnostics.is_empty());

    let report = analyzer.analyze(&d2).unwrap();
    assert_eq!(
        report.diagnostics,
        vec![Diagnostic::ContinuityGap {
            pid: 0x44,
            expected: 4,
            actual: 5,
            index: 0
        }]
    );
}

#[test]
fn test_alignment_and_sync_reported_together() {
    let mut data = build_datagram(7, &[(0x100, 0), (0x100, 1)]);
    data[12] = 0x12; // 第一个槽位同步损坏
    data.extend_from_slice(&[0xEE; 17]); // 末尾不对齐

    let mut analyzer = TsRtpAnalyzer::new();
    let report = analyzer.analyze(&data).unwrap();

    assert_eq!(report.ts_packets.len(), 1);
    assert!(report
        .diagnostics
        .contains(&Diagnostic::TsAlignment { trailing: 17 }));
    assert!(report.diagnostics.contains(&Diagnostic::SyncByteMismatch {
        index: 0,
        actual: 0x12
    }));
}

#[test]
fn test_reanalysis_identical_with_fresh_analyzer() {
    let data = build_datagram(3, &[(0x100, 0), (0x200, 8), (0x100, 1)]);

    let ra = TsRtpAnalyzer::new().analyze(&data).unwrap();
    let rb = TsRtpAnalyzer::new().analyze(&data).unwrap();

    assert_eq!(ra.rtp, rb.rtp);
    assert_eq!(ra.ts_packets, rb.ts_packets);
    assert_eq!(ra.diagnostics, rb.diagnostics);
}
