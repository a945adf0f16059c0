//! # xi-core
//!
//! Xi 码流分析框架核心库, 提供错误类型与字节/位读取原语.
//!
//! 所有扫描器只依赖本 crate: [`cursor::ByteCursor`] 负责字节对齐的
//! 定位与读取, [`bitreader::BitReader`] 负责头部内的位字段提取.

pub mod bitreader;
pub mod cursor;
pub mod error;

// 重导出常用类型
pub use bitreader::BitReader;
pub use cursor::ByteCursor;
pub use error::{XiError, XiResult};
