//! FLV (Flash Video) 容器结构分析器.
//!
//! # FLV 文件结构
//! ```text
//! FLV Header (9 bytes):
//!   "FLV" (3 bytes)
//!   Version (1 byte, 通常 = 1)
//!   Flags (1 byte): bit0=video, bit2=audio
//!   DataOffset (4 bytes, BE): 头部大小 (通常 9)
//!
//! PreviousTagSize0 (4 bytes, BE): 0
//!
//! FLV Tag #1:
//!   TagType (1 byte): 8=Audio, 9=Video, 18=Script
//!   DataSize (3 bytes, BE)
//!   Timestamp (3 bytes, BE) + TimestampExtended (1 byte, 高 8 位)
//!   StreamID (3 bytes, BE): always 0
//!   TagData (DataSize bytes)
//! PreviousTagSize1 (4 bytes, BE) = 11 + DataSize
//!
//! FLV Tag #2: ...
//! ```
//!
//! 每个 tag 之后的 PreviousTagSize 是链式一致性校验点: 一旦失配,
//! 后续所有偏移都不可信, 扫描终止 (不重建索引就无法恢复).
//!
//! # 音频 Tag 数据
//! ```text
//! SoundFormat (4 bits): 10=AAC, 2=MP3, 14=MP3-8kHz, ...
//! SoundRate (2 bits): 0=5.5kHz, 1=11kHz, 2=22kHz, 3=44kHz
//! SoundSize (1 bit): 0=8bit, 1=16bit
//! SoundType (1 bit): 0=mono, 1=stereo
//! ```
//! 这 1 字节 AudioTagHeader 由调用方解释, 分析器本身不读载荷.

use bytes::{Bytes, BytesMut};
use log::{debug, warn};
use xi_core::{BitReader, ByteCursor, XiError, XiResult};

use crate::diagnostic::Diagnostic;

/// FLV tag 头部大小
const TAG_HEADER_SIZE: u32 = 11;

/// FLV tag 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlvTagType {
    /// 音频 tag (8)
    Audio,
    /// 视频 tag (9)
    Video,
    /// 脚本数据 tag (18)
    Script,
    /// 其余类型
    Unknown(u8),
}

impl FlvTagType {
    /// 从原始类型字节创建
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            8 => Self::Audio,
            9 => Self::Video,
            18 => Self::Script,
            other => Self::Unknown(other),
        }
    }

    /// 获取原始类型字节
    pub fn raw(&self) -> u8 {
        match self {
            Self::Audio => 8,
            Self::Video => 9,
            Self::Script => 18,
            Self::Unknown(raw) => *raw,
        }
    }
}

impl std::fmt::Display for FlvTagType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
            Self::Script => write!(f, "script"),
            Self::Unknown(raw) => write!(f, "unknown({raw})"),
        }
    }
}

/// FLV 文件头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlvHeader {
    /// 版本 (通常 1)
    pub version: u8,
    /// 是否含音频流
    pub has_audio: bool,
    /// 是否含视频流
    pub has_video: bool,
    /// 头部大小 (数据区起始偏移, 通常 9)
    pub header_size: u32,
}

/// 一个 FLV tag 记录
///
/// `payload` 是源缓冲区上的零拷贝切片, `payload.len() == data_size`.
#[derive(Debug, Clone, Copy)]
pub struct FlvTag<'a> {
    /// tag 头部起始偏移
    pub offset: usize,
    /// tag 类型
    pub tag_type: FlvTagType,
    /// 载荷大小 (24 位大端)
    pub data_size: u32,
    /// 时间戳 (24 位 + 扩展字节组合)
    pub timestamp: u32,
    /// StreamID, 合法值恒为 0
    pub stream_id: u32,
    /// 载荷起始偏移
    pub payload_offset: usize,
    /// 载荷数据
    pub payload: &'a [u8],
}

/// 音频 tag 载荷的首字节 (AudioTagHeader)
///
/// 由调用方按需解释, [`FlvDemuxer`] 不读取载荷内容.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTagHeader {
    /// 音频编码格式 (10=AAC, 2=MP3, ...)
    pub sound_format: u8,
    /// 采样率索引 (0=5.5kHz, 1=11kHz, 2=22kHz, 3=44kHz)
    pub sound_rate: u8,
    /// 位深 (0=8bit, 1=16bit)
    pub sound_size: u8,
    /// 声道 (0=mono, 1=stereo)
    pub sound_type: u8,
}

impl AudioTagHeader {
    /// 从 AudioTagHeader 字节解码
    pub fn parse(byte: u8) -> Self {
        let mut br = BitReader::new(std::slice::from_ref(&byte));
        Self {
            sound_format: br.read_bits(4).unwrap_or(0) as u8,
            sound_rate: br.read_bits(2).unwrap_or(0) as u8,
            sound_size: br.read_bits(1).unwrap_or(0) as u8,
            sound_type: br.read_bits(1).unwrap_or(0) as u8,
        }
    }

    /// 编码格式名称
    pub fn format_name(&self) -> &'static str {
        match self.sound_format {
            0 => "Linear PCM",
            2 => "MP3",
            3 => "Linear PCM LE",
            10 => "AAC",
            11 => "Speex",
            14 => "MP3 8kHz",
            _ => "未知",
        }
    }

    /// 采样率 (Hz)
    pub fn sample_rate(&self) -> u32 {
        match self.sound_rate {
            0 => 5512,
            1 => 11025,
            2 => 22050,
            _ => 44100,
        }
    }
}

/// FLV 容器分析器
///
/// 顺序遍历 tag 记录, 逐 tag 校验 PreviousTagSize 链.
/// 可选按 tag 类型过滤产出 (链校验仍覆盖所有 tag).
pub struct FlvDemuxer<'a> {
    /// 游标, 指向下一个 tag 头部
    cursor: ByteCursor<'a>,
    /// 文件头部信息
    header: FlvHeader,
    /// 产出过滤 (None 表示全部)
    filter: Option<FlvTagType>,
    /// 最后一个通过链校验的位置
    last_good: usize,
    /// 扫描是否已结束
    done: bool,
    /// 非致命异常记录
    diagnostics: Vec<Diagnostic>,
}

impl<'a> FlvDemuxer<'a> {
    /// 打开缓冲区并校验文件头部
    pub fn new(data: &'a [u8]) -> XiResult<Self> {
        let mut cursor = ByteCursor::new(data);

        let sig = cursor.read_bytes(3)?;
        if sig != b"FLV" {
            return Err(XiError::MalformedHeader(format!(
                "FLV: 签名非法 ({:02X} {:02X} {:02X})",
                sig[0], sig[1], sig[2]
            )));
        }

        let version = cursor.read_u8()?;
        let flags = cursor.read_u8()?;
        let header_size = cursor.read_u32_be()?;
        if header_size < 9 {
            return Err(XiError::MalformedHeader(format!(
                "FLV: DataOffset={} 小于头部大小 9",
                header_size
            )));
        }

        let header = FlvHeader {
            version,
            has_audio: (flags & 0x04) != 0,
            has_video: (flags & 0x01) != 0,
            header_size,
        };
        debug!(
            "FLV: version={} has_audio={} has_video={} data_offset={}",
            header.version, header.has_audio, header.has_video, header.header_size
        );

        // 跳到数据区, PreviousTagSize0 必须为 0 (链的第一环)
        cursor.seek_to(header_size as usize)?;
        let prev0_offset = cursor.position();
        let prev0 = cursor.read_u32_be()?;
        if prev0 != 0 {
            return Err(XiError::CorruptTagChain {
                offset: prev0_offset,
                expected: 0,
                actual: prev0,
            });
        }

        let last_good = cursor.position();
        Ok(Self {
            cursor,
            header,
            filter: None,
            last_good,
            done: false,
            diagnostics: Vec::new(),
        })
    }

    /// 只产出指定类型的 tag
    pub fn filter(mut self, tag_type: FlvTagType) -> Self {
        self.filter = Some(tag_type);
        self
    }

    /// 文件头部信息
    pub fn header(&self) -> &FlvHeader {
        &self.header
    }

    /// 最后一个通过链校验的偏移
    ///
    /// 扫描因 `CorruptTagChain` 终止后, 调用方据此得知可信区域边界.
    pub fn last_good_offset(&self) -> usize {
        self.last_good
    }

    /// 扫描期间累积的诊断记录
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// 读取一个 tag 并校验其尾部的 PreviousTagSize
    fn read_tag(&mut self) -> XiResult<FlvTag<'a>> {
        let offset = self.cursor.position();

        let raw_type = self.cursor.read_u8()?;
        let data_size = self.cursor.read_u24_be()?;
        let timestamp_low = self.cursor.read_u24_be()?;
        let timestamp_ext = self.cursor.read_u8()?;
        let timestamp = (u32::from(timestamp_ext) << 24) | timestamp_low;
        let stream_id = self.cursor.read_u24_be()?;

        if stream_id != 0 {
            warn!("FLV: 偏移 {} 处 StreamID 非 0 (实际={})", offset, stream_id);
            self.diagnostics
                .push(Diagnostic::StreamIdNonZero { offset, stream_id });
        }

        let payload_offset = self.cursor.position();
        let payload = self.cursor.read_bytes(data_size as usize)?;

        // 链校验: 尾部 PreviousTagSize 必须等于 11 + data_size
        let prev_offset = self.cursor.position();
        let prev = self.cursor.read_u32_be()?;
        let expected = TAG_HEADER_SIZE + data_size;
        if prev != expected {
            return Err(XiError::CorruptTagChain {
                offset: prev_offset,
                expected,
                actual: prev,
            });
        }

        self.last_good = self.cursor.position();
        Ok(FlvTag {
            offset,
            tag_type: FlvTagType::from_raw(raw_type),
            data_size,
            timestamp,
            stream_id,
            payload_offset,
            payload,
        })
    }
}

impl<'a> Iterator for FlvDemuxer<'a> {
    type Item = XiResult<FlvTag<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if self.cursor.is_eof() {
                self.done = true;
                return None;
            }

            match self.read_tag() {
                Ok(tag) => {
                    if let Some(want) = self.filter {
                        if tag.tag_type != want {
                            continue;
                        }
                    }
                    return Some(Ok(tag));
                }
                Err(e) => {
                    // 截断与链损坏都意味着后续偏移不可信
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// 提取音频基本流
///
/// 遍历全部音频 tag, 剥去每个载荷的 1 字节 AudioTagHeader,
/// 顺序拼接为独立的音频基本流 (如 MP3 帧序列).
pub fn extract_audio(data: &[u8]) -> XiResult<Bytes> {
    let demuxer = FlvDemuxer::new(data)?.filter(FlvTagType::Audio);
    let mut out = BytesMut::new();

    for tag in demuxer {
        let tag = tag?;
        if tag.payload.len() > 1 {
            out.extend_from_slice(&tag.payload[1..]);
        }
    }

    Ok(out.freeze())
}
