//! AAC ADTS 裸流分割器.
//!
//! ADTS (Audio Data Transport Stream) 是 AAC 音频最常见的裸流封装格式.
//! 每个 ADTS 帧由固定/可变头部 + AAC 帧数据组成.
//!
//! # ADTS 帧结构 (7 或 9 字节头部)
//! ```text
//! 固定头部 (28 bits):
//!   sync word (12 bits = 0xFFF)
//!   ID (1 bit): 0=MPEG-4, 1=MPEG-2
//!   layer (2 bits): always 0
//!   protection_absent (1 bit): 1=no CRC, 0=CRC present
//!   profile (2 bits): 0=Main, 1=LC, 2=SSR, 3=LTP
//!   sampling_frequency_index (4 bits)
//!   private_bit (1 bit)
//!   channel_configuration (3 bits)
//! 可变头部 (28 bits):
//!   original/copy (1) + home (1) + copyright_id (1) + copyright_start (1)
//!   frame_length (13 bits): 含头部的完整帧大小
//!   adts_buffer_fullness (11 bits)
//!   number_of_raw_data_blocks (2 bits)
//! [CRC (16 bits)] 仅当 protection_absent=0
//! ```
//!
//! 首个有效头部之前按字节搜索同步字; 锁定之后只在
//! `offset + frame_length` 处读取下一帧, 载荷中酷似同步字的
//! 字节序列不会被误判.

use xi_core::{ByteCursor, XiError, XiResult};

/// AAC 采样率索引表 (ISO 14496-3)
const AAC_SAMPLE_RATES: [u32; 16] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350, 0, 0,
    0,
];

/// 一个 ADTS 帧记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsFrame {
    /// 帧起始偏移 (同步字所在位置)
    pub offset: usize,
    /// MPEG 版本 (ID 位: 0=MPEG-4, 1=MPEG-2)
    pub mpeg_version: u8,
    /// layer, 合法值恒为 0
    pub layer: u8,
    /// 是否无 CRC 校验
    pub protection_absent: bool,
    /// AAC Profile (0=Main, 1=LC, 2=SSR, 3=LTP)
    pub profile: u8,
    /// 采样率索引
    pub sampling_freq_index: u8,
    /// 声道配置
    pub channel_config: u8,
    /// 帧总大小 (含头部, 13 位)
    pub frame_length: u16,
    /// 头部大小 (7, 带 CRC 时为 9)
    pub header_len: u8,
}

impl AdtsFrame {
    /// 采样率 (Hz), 保留索引返回 None
    pub fn sample_rate(&self) -> Option<u32> {
        let rate = AAC_SAMPLE_RATES[self.sampling_freq_index as usize];
        (rate != 0).then_some(rate)
    }

    /// Profile 名称
    pub fn profile_name(&self) -> &'static str {
        match self.profile {
            0 => "Main",
            1 => "LC",
            2 => "SSR",
            _ => "LTP",
        }
    }

    /// 载荷大小 (不含头部)
    pub fn payload_len(&self) -> usize {
        usize::from(self.frame_length) - usize::from(self.header_len)
    }
}

/// 在 `offset` 处解析 ADTS 帧头部
///
/// 不满足固定值约束时返回 `MalformedHeader`, 字节不足返回 `Truncated`.
fn parse_adts_header(data: &[u8], offset: usize) -> XiResult<AdtsFrame> {
    let mut cursor = ByteCursor::new(data);
    cursor.seek_to(offset)?;
    // 头部 7 字节整体读取或失败
    cursor.peek_bytes(7)?;

    let mut br = cursor.bits();
    let sync = br.read_bits(12)?;
    if sync != 0xFFF {
        return Err(XiError::MalformedHeader(format!(
            "ADTS: 偏移 {} 处同步字非法 (0x{:03X})",
            offset, sync
        )));
    }

    let mpeg_version = br.read_bits(1)? as u8;
    let layer = br.read_bits(2)? as u8;
    if layer != 0 {
        return Err(XiError::MalformedHeader(format!(
            "ADTS: 偏移 {} 处 layer 非 0 (实际={})",
            offset, layer
        )));
    }
    let protection_absent = br.read_flag()?;
    let profile = br.read_bits(2)? as u8;
    let sampling_freq_index = br.read_bits(4)? as u8;
    if sampling_freq_index >= 13 {
        return Err(XiError::MalformedHeader(format!(
            "ADTS: 偏移 {} 处采样率索引非法 (实际={})",
            offset, sampling_freq_index
        )));
    }
    let _private_bit = br.read_bit()?;
    let channel_config = br.read_bits(3)? as u8;
    br.skip_bits(4)?; // original/copy + home + copyright_id + copyright_start
    let frame_length = br.read_bits(13)? as u16;
    let _buffer_fullness = br.read_bits(11)?;
    let _raw_data_blocks = br.read_bits(2)?;

    let header_len: u8 = if protection_absent { 7 } else { 9 };
    if frame_length < u16::from(header_len) {
        return Err(XiError::MalformedHeader(format!(
            "ADTS: 偏移 {} 处 frame_length={} 小于头部大小 {}",
            offset, frame_length, header_len
        )));
    }

    Ok(AdtsFrame {
        offset,
        mpeg_version,
        layer,
        protection_absent,
        profile,
        sampling_freq_index,
        channel_config,
        frame_length,
        header_len,
    })
}

/// AAC ADTS 码流扫描器
///
/// 惰性产出 [`AdtsFrame`] 记录. 帧偏移是 `frame_length` 的累积和;
/// 声明长度超出缓冲区剩余时以 `Truncated` 结束序列.
pub struct AdtsScanner<'a> {
    /// 源数据
    data: &'a [u8],
    /// 下一帧偏移
    pos: usize,
    /// 是否已锁定首个有效头部
    locked: bool,
    /// 扫描是否已结束
    done: bool,
}

impl<'a> AdtsScanner<'a> {
    /// 创建扫描器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            locked: false,
            done: false,
        }
    }

    /// 帧载荷的零拷贝视图 (不含头部)
    pub fn payload(&self, frame: &AdtsFrame) -> &'a [u8] {
        let start = frame.offset + usize::from(frame.header_len);
        let end = frame.offset + usize::from(frame.frame_length);
        &self.data[start..end]
    }

    /// 锁定前的字节级同步字搜索
    fn search_first_frame(&self) -> Option<AdtsFrame> {
        let mut pos = self.pos;
        while pos + 2 <= self.data.len() {
            // 先比对 12 位同步字, 再尝试解析完整头部
            if self.data[pos] == 0xFF && (self.data[pos + 1] & 0xF0) == 0xF0 {
                if let Ok(frame) = parse_adts_header(self.data, pos) {
                    return Some(frame);
                }
            }
            pos += 1;
        }
        None
    }
}

impl<'a> Iterator for AdtsScanner<'a> {
    type Item = XiResult<AdtsFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let frame = if self.locked {
            if self.pos == self.data.len() {
                // 上一帧恰好结束于缓冲区末尾
                self.done = true;
                return None;
            }
            match parse_adts_header(self.data, self.pos) {
                Ok(frame) => frame,
                Err(e) => {
                    // 锁定后头部必须出现在计算出的偏移处
                    self.done = true;
                    return Some(Err(e));
                }
            }
        } else {
            match self.search_first_frame() {
                Some(frame) => {
                    self.locked = true;
                    frame
                }
                None => {
                    log::warn!("ADTS: 缓冲区中未找到有效的同步字 ({} 字节)", self.data.len());
                    self.done = true;
                    return Some(Err(XiError::MalformedHeader(
                        "ADTS: 缓冲区中未找到有效的同步字".into(),
                    )));
                }
            }
        };

        // 帧边界必须完整落在缓冲区内, 否则无法安全跳到下一帧
        let end = frame.offset + usize::from(frame.frame_length);
        if end > self.data.len() {
            self.done = true;
            return Some(Err(XiError::Truncated {
                needed: usize::from(frame.frame_length),
                remaining: self.data.len() - frame.offset,
            }));
        }

        self.pos = end;
        Some(Ok(frame))
    }
}
