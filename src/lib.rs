//! # Xi (析)
//!
//! 纯 Rust 实现的音视频码流结构分析框架.
//!
//! Xi 对内存中的字节缓冲区做结构分析, 产出帧/记录级别的类型化描述,
//! 不做音视频解码:
//! - **H.264 Annex B**: 定位起始码, 分割并分类 NAL 单元
//! - **AAC ADTS**: 定位同步字, 分割 ADTS 帧并解析头部字段
//! - **FLV**: 顺序遍历 tag 并校验 PreviousTagSize 链, 可分离音频基本流
//! - **UDP-RTP-TS**: 解析 RTP 头部与其后的 188 字节 MPEG-TS 包
//!
//! # 快速开始
//!
//! ```rust
//! use xi::scan::NaluScanner;
//!
//! let data = [0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1E];
//! for unit in NaluScanner::new(&data) {
//!     let unit = unit.unwrap();
//!     if let Some(header) = unit.header {
//!         println!("偏移 {}: {} ({} 字节)", unit.offset, header.nal_type, unit.len());
//!     }
//! }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `xi-core` | 错误类型与字节/位读取原语 |
//! | `xi-scan` | 四个码流扫描器 + 类型探测 |

/// 核心类型与读取原语
pub use xi_core as core;

/// 码流扫描器
pub use xi_scan as scan;

/// 获取 Xi 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
