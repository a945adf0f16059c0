//! H.264 Annex B 码流分割器.
//!
//! # Annex B 格式
//!
//! Annex B 使用起始码 (start code) 分隔 NAL 单元:
//! - 3 字节起始码: `00 00 01`
//! - 4 字节起始码: `00 00 00 01`
//!
//! 当 3 字节起始码的前一个字节也是 0x00 时, 按 4 字节起始码处理.
//! 一个单元的结束位置是下一个起始码之前 (含其前导 0x00), 或缓冲区末尾.
//!
//! # NAL 头部 (1 字节)
//! ```text
//! ┌──────────────────────────────────────┐
//! │ forbidden(1) | ref_idc(2) | type(5)  │
//! └──────────────────────────────────────┘
//! ```
//!
//! 单元数据保留防竞争字节 (`00 00 03`), 即原始 Annex B 切片;
//! 需要按位解析载荷时用 [`strip_emulation`] 还原 RBSP.

use log::warn;
use xi_core::{BitReader, XiError, XiResult};

use crate::diagnostic::Diagnostic;

/// NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum NalUnitType {
    /// 非 IDR 图像切片 (P/B slice)
    Slice,
    /// 数据分区 A
    SliceDpa,
    /// 数据分区 B
    SliceDpb,
    /// 数据分区 C
    SliceDpc,
    /// IDR 图像切片 (关键帧)
    SliceIdr,
    /// 增补增强信息 (SEI)
    Sei,
    /// 序列参数集 (SPS)
    Sps,
    /// 图像参数集 (PPS)
    Pps,
    /// 访问单元分隔符 (AUD)
    Aud,
    /// 序列结束
    EndOfSequence,
    /// 流结束
    EndOfStream,
    /// 填充数据
    FillerData,
    /// SPS 扩展
    SpsExtension,
    /// 其余类型 (保留/未指定)
    Unknown(u8),
}

impl NalUnitType {
    /// 从 5 位类型编号创建
    pub fn from_type_id(type_id: u8) -> Self {
        match type_id {
            1 => Self::Slice,
            2 => Self::SliceDpa,
            3 => Self::SliceDpb,
            4 => Self::SliceDpc,
            5 => Self::SliceIdr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::FillerData,
            13 => Self::SpsExtension,
            _ => Self::Unknown(type_id),
        }
    }

    /// 获取类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::Slice => 1,
            Self::SliceDpa => 2,
            Self::SliceDpb => 3,
            Self::SliceDpc => 4,
            Self::SliceIdr => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::Aud => 9,
            Self::EndOfSequence => 10,
            Self::EndOfStream => 11,
            Self::FillerData => 12,
            Self::SpsExtension => 13,
            Self::Unknown(id) => *id,
        }
    }

    /// 是否为 VCL (Video Coding Layer) 单元
    pub fn is_vcl(&self) -> bool {
        matches!(
            self,
            Self::Slice | Self::SliceDpa | Self::SliceDpb | Self::SliceDpc | Self::SliceIdr
        )
    }

    /// 是否为 IDR 关键帧切片
    pub fn is_idr(&self) -> bool {
        matches!(self, Self::SliceIdr)
    }
}

impl std::fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slice => write!(f, "Slice"),
            Self::SliceDpa => write!(f, "SliceDPA"),
            Self::SliceDpb => write!(f, "SliceDPB"),
            Self::SliceDpc => write!(f, "SliceDPC"),
            Self::SliceIdr => write!(f, "IDR"),
            Self::Sei => write!(f, "SEI"),
            Self::Sps => write!(f, "SPS"),
            Self::Pps => write!(f, "PPS"),
            Self::Aud => write!(f, "AUD"),
            Self::EndOfSequence => write!(f, "EndOfSeq"),
            Self::EndOfStream => write!(f, "EndOfStream"),
            Self::FillerData => write!(f, "Filler"),
            Self::SpsExtension => write!(f, "SPSExt"),
            Self::Unknown(id) => write!(f, "Unknown({id})"),
        }
    }
}

/// 解码后的 NAL 头部字节
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    /// forbidden_zero_bit, 合法码流中必须为 0
    pub forbidden_zero_bit: bool,
    /// nal_ref_idc (参考重要性, 0-3)
    pub ref_idc: u8,
    /// NAL 单元类型
    pub nal_type: NalUnitType,
}

impl NalHeader {
    /// 从头部字节解码
    fn parse(byte: u8) -> Self {
        let mut br = BitReader::new(std::slice::from_ref(&byte));
        // 1 字节内的定宽读取不会失败
        let forbidden = br.read_flag().unwrap_or(false);
        let ref_idc = br.read_bits(2).unwrap_or(0) as u8;
        let type_id = br.read_bits(5).unwrap_or(0) as u8;
        Self {
            forbidden_zero_bit: forbidden,
            ref_idc,
            nal_type: NalUnitType::from_type_id(type_id),
        }
    }
}

/// 一个 NAL 单元记录
///
/// `data` 是源缓冲区上的零拷贝切片: 含头部字节, 不含起始码,
/// 保留防竞争字节. 记录不持有缓冲区, 生命周期受其约束.
#[derive(Debug, Clone, Copy)]
pub struct NalUnit<'a> {
    /// 头部字节偏移 (起始码之后)
    pub offset: usize,
    /// 前导起始码长度 (3 或 4)
    pub start_code_len: usize,
    /// 单元原始数据
    pub data: &'a [u8],
    /// 头部字段 (零长度单元为 None)
    pub header: Option<NalHeader>,
}

impl<'a> NalUnit<'a> {
    /// 单元长度 (含头部字节, 不含起始码)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 是否为零长度单元 (两个相邻起始码)
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 获取 RBSP (Raw Byte Sequence Payload) 数据
    ///
    /// 移除头部字节和防竞争字节, 得到可按位解析的纯净载荷.
    pub fn rbsp(&self) -> Vec<u8> {
        if self.data.is_empty() {
            return Vec::new();
        }
        strip_emulation(&self.data[1..])
    }
}

/// 移除防竞争字节 (`00 00 03` → `00 00`)
///
/// H.264 规范要求 RBSP 中连续两个 0x00 之后插入 0x03,
/// 防止载荷与起始码混淆. 解析载荷前需要移除这些字节.
pub fn strip_emulation(data: &[u8]) -> Vec<u8> {
    let mut rbsp = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let hit = i + 2 < data.len() && data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x03;
        if hit {
            rbsp.push(0x00);
            rbsp.push(0x00);
            i += 3;
        } else {
            rbsp.push(data[i]);
            i += 1;
        }
    }

    rbsp
}

/// 从 `from` 开始查找下一个起始码
///
/// 返回 (起始码偏移, 起始码长度). 当 `00 00 01` 的前一个字节
/// (且不早于 `from`) 也是 0x00 时, 识别为 4 字节起始码.
fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    if data.len() < 3 {
        return None;
    }
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x01 {
            if i > from && data[i - 1] == 0x00 {
                return Some((i - 1, 4));
            }
            return Some((i, 3));
        }
        i += 1;
    }
    None
}

/// H.264 Annex B 码流扫描器
///
/// 惰性产出 [`NalUnit`] 记录, 按偏移升序. 扫描对同一缓冲区
/// 可重复执行, 产出逐字节一致; 重新扫描用 [`NaluScanner::new`]
/// 创建新实例即可.
pub struct NaluScanner<'a> {
    /// 源数据
    data: &'a [u8],
    /// 下一个单元的起始码 (None 表示还未定位或已结束)
    next_sc: Option<(usize, usize)>,
    /// 是否已执行过首次起始码搜索
    started: bool,
    /// 扫描是否已结束
    done: bool,
    /// 非致命异常记录
    diagnostics: Vec<Diagnostic>,
}

impl<'a> NaluScanner<'a> {
    /// 创建扫描器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            next_sc: None,
            started: false,
            done: false,
            diagnostics: Vec::new(),
        }
    }

    /// 扫描期间累积的诊断记录
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

impl<'a> Iterator for NaluScanner<'a> {
    type Item = XiResult<NalUnit<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if !self.started {
            self.started = true;
            self.next_sc = find_start_code(self.data, 0);
            if self.next_sc.is_none() {
                // 整个缓冲区没有任何起始码
                warn!("H.264: 缓冲区中未找到起始码 ({} 字节)", self.data.len());
                self.done = true;
                return Some(Err(XiError::MalformedHeader(
                    "H.264: 缓冲区中未找到起始码".into(),
                )));
            }
        }

        let (sc_start, sc_len) = self.next_sc?;
        let unit_start = sc_start + sc_len;

        // 单元结束于下一个起始码之前, 或缓冲区末尾
        self.next_sc = find_start_code(self.data, unit_start);
        let unit_end = self.next_sc.map_or(self.data.len(), |(s, _)| s);
        if self.next_sc.is_none() {
            self.done = true;
        }

        let data = &self.data[unit_start..unit_end];
        let header = if data.is_empty() {
            // 两个相邻起始码: 零长度单元, 照常报告
            None
        } else {
            let header = NalHeader::parse(data[0]);
            if header.forbidden_zero_bit {
                warn!(
                    "H.264: 偏移 {} 处 forbidden_zero_bit 为 1, 单元照常报告",
                    unit_start
                );
                self.diagnostics
                    .push(Diagnostic::ForbiddenZeroBit { offset: unit_start });
            }
            Some(header)
        };

        Some(Ok(NalUnit {
            offset: unit_start,
            start_code_len: sc_len,
            data,
            header,
        }))
    }
}
