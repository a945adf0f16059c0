//! 扫描诊断记录.
//!
//! 非致命异常不会终止扫描, 但也绝不静默丢弃: 每个异常生成一条
//! 诊断记录, 随扫描产出一起交给调用方, 同时通过 `log` 告警.

use std::fmt;

/// 非致命扫描异常
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Diagnostic {
    /// NAL 头部 forbidden_zero_bit 为 1
    ForbiddenZeroBit {
        /// NAL 头部字节偏移
        offset: usize,
    },
    /// FLV tag 的 StreamID 非 0
    StreamIdNonZero {
        /// tag 头部起始偏移
        offset: usize,
        /// 实际读取到的 StreamID
        stream_id: u32,
    },
    /// TS 包槽位的同步字节不是 0x47
    SyncByteMismatch {
        /// 槽位序号 (从 0 开始)
        index: usize,
        /// 实际读取到的首字节
        actual: u8,
    },
    /// RTP 头部之后的区域不满足 188 字节对齐
    TsAlignment {
        /// 末尾多出的字节数 (< 188)
        trailing: usize,
    },
    /// 同一 PID 的连续计数器不连续
    ContinuityGap {
        /// 流 PID
        pid: u16,
        /// 期望的计数器值
        expected: u8,
        /// 实际读取到的值
        actual: u8,
        /// 所在槽位序号
        index: usize,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForbiddenZeroBit { offset } => {
                write!(f, "偏移 {offset}: forbidden_zero_bit 为 1")
            }
            Self::StreamIdNonZero { offset, stream_id } => {
                write!(f, "偏移 {offset}: StreamID 非 0 (实际={stream_id})")
            }
            Self::SyncByteMismatch { index, actual } => {
                write!(f, "TS 槽位 {index}: 同步字节非法 (实际=0x{actual:02X})")
            }
            Self::TsAlignment { trailing } => {
                write!(f, "TS 区域末尾多出 {trailing} 字节, 不满足 188 字节对齐")
            }
            Self::ContinuityGap {
                pid,
                expected,
                actual,
                index,
            } => {
                write!(
                    f,
                    "PID 0x{pid:04X} 槽位 {index}: 连续计数器跳变 (期望={expected}, 实际={actual})"
                )
            }
        }
    }
}
