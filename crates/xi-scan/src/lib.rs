//! # xi-scan
//!
//! Xi 码流分析框架扫描器库: 对内存中的只读字节缓冲区做结构分析,
//! 产出带类型的帧/记录描述, 不做音视频解码.
//!
//! 四个扫描器共享同一套架构 (定位同步标记 → 提取定长/位压缩头部
//! → 产出描述记录), 彼此独立, 可对不同缓冲区并发执行:
//!
//! | 模块 | 码流 | 同步协议 |
//! |------|------|----------|
//! | [`nalu`] | H.264 Annex B | 起始码 `00 00 01` / `00 00 00 01` |
//! | [`adts`] | AAC ADTS | 12 位同步字 0xFFF |
//! | [`flv`] | FLV 容器 | tag 头部 + PreviousTagSize 链 |
//! | [`rtp`] | UDP-RTP-TS | RTP 固定头部 + 188 字节 TS 包 |

pub mod adts;
pub mod diagnostic;
pub mod flv;
pub mod nalu;
pub mod probe;
pub mod rtp;

// 重导出常用类型
pub use adts::{AdtsFrame, AdtsScanner};
pub use diagnostic::Diagnostic;
pub use flv::{AudioTagHeader, FlvDemuxer, FlvTag, FlvTagType};
pub use nalu::{NalHeader, NalUnit, NalUnitType, NaluScanner};
pub use probe::{ProbeResult, StreamKind};
pub use rtp::{DatagramReport, RtpHeader, TsPacket, TsRtpAnalyzer};
