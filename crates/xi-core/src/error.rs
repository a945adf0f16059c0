//! 统一错误类型定义.
//!
//! 所有 Xi crate 共用的错误类型, 支持跨模块传播.
//!
//! 错误分为两类: 致命错误 (终止当前扫描) 通过本类型传播;
//! 非致命异常 (扫描继续) 以诊断记录的形式随扫描结果一起输出.

use thiserror::Error;

/// Xi 框架统一错误类型
#[derive(Debug, Error)]
pub enum XiError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 数据不足, 无法读取所需字段
    #[error("数据不足: 需要 {needed} 字节, 剩余 {remaining} 字节")]
    Truncated {
        /// 本次读取需要的字节数
        needed: usize,
        /// 缓冲区剩余字节数
        remaining: usize,
    },

    /// 头部固定值/保留字段校验失败
    #[error("头部字段非法: {0}")]
    MalformedHeader(String),

    /// FLV tag 链式结构损坏, 后续偏移不可信
    #[error("FLV tag 链损坏: 偏移 {offset}, 期望 PreviousTagSize={expected}, 实际={actual}")]
    CorruptTagChain {
        /// PreviousTagSize 字段所在偏移
        offset: usize,
        /// 依据上一个 tag 计算的期望值
        expected: u32,
        /// 实际读取到的值
        actual: u32,
    },

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// Xi 框架统一 Result 类型
pub type XiResult<T> = Result<T, XiError>;
