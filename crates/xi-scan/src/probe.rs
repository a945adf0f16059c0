//! 码流类型探测.
//!
//! 通过分析缓冲区头部数据和文件扩展名, 自动识别码流类型,
//! 供上层按类型分发到对应的扫描器.

use crate::adts::AdtsScanner;

/// 探测置信度
///
/// 数值越高, 表示对类型判断越有信心.
pub type ProbeScore = u32;

/// 最低探测分数 (仅根据扩展名)
pub const SCORE_EXTENSION: ProbeScore = 50;

/// 最高探测分数 (魔数/同步字完全匹配)
pub const SCORE_MAX: ProbeScore = 100;

/// 可识别的码流类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// H.264 Annex B 裸流
    H264AnnexB,
    /// AAC ADTS 裸流
    AacAdts,
    /// FLV 容器
    Flv,
}

impl StreamKind {
    /// 获取类型的人类可读名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::H264AnnexB => "h264",
            Self::AacAdts => "aac",
            Self::Flv => "flv",
        }
    }

    /// 获取类型常用的文件扩展名
    pub const fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::H264AnnexB => &["h264", "264", "avc"],
            Self::AacAdts => &["aac", "adts"],
            Self::Flv => &["flv"],
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 探测结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    /// 识别出的类型
    pub kind: StreamKind,
    /// 置信度分数
    pub score: ProbeScore,
}

/// 根据内容 (优先) 和文件名探测码流类型
///
/// 遍历所有类型的探测逻辑, 返回置信度最高的结果.
pub fn detect(data: &[u8], filename: Option<&str>) -> Option<ProbeResult> {
    let mut best: Option<ProbeResult> = None;
    for (kind, content_score) in [
        (StreamKind::Flv, probe_flv(data)),
        (StreamKind::AacAdts, probe_adts(data)),
        (StreamKind::H264AnnexB, probe_annex_b(data)),
    ] {
        let Some(score) = content_score.or_else(|| probe_extension(kind, filename)) else {
            continue;
        };
        let is_better = best.is_none_or(|b| score > b.score);
        if is_better {
            best = Some(ProbeResult { kind, score });
        }
    }
    best
}

/// 扩展名匹配
fn probe_extension(kind: StreamKind, filename: Option<&str>) -> Option<ProbeScore> {
    let name = filename?;
    let ext = name.rsplit('.').next()?;
    let ext_lower = ext.to_lowercase();
    kind.extensions()
        .contains(&ext_lower.as_str())
        .then_some(SCORE_EXTENSION)
}

/// FLV: 检查 "FLV" 签名 + version
fn probe_flv(data: &[u8]) -> Option<ProbeScore> {
    if data.len() >= 9 && &data[..3] == b"FLV" && data[3] == 1 {
        return Some(SCORE_MAX);
    }
    None
}

/// ADTS: 头部能完整解析, 且下一帧位置出现同步字时满分
fn probe_adts(data: &[u8]) -> Option<ProbeScore> {
    let mut scanner = AdtsScanner::new(data);
    let frame = scanner.next()?.ok()?;
    if frame.offset != 0 {
        // 裸 ADTS 流应从同步字开始
        return None;
    }

    let next = frame.offset + frame.frame_length as usize;
    if next + 2 <= data.len() && data[next] == 0xFF && (data[next + 1] & 0xF0) == 0xF0 {
        return Some(SCORE_MAX);
    }
    // 单帧也给高分
    Some(SCORE_MAX - 10)
}

/// Annex B: 检查开头的起始码
fn probe_annex_b(data: &[u8]) -> Option<ProbeScore> {
    if data.len() >= 4 && data[..4] == [0x00, 0x00, 0x00, 0x01] {
        return Some(SCORE_MAX);
    }
    if data.len() >= 3 && data[..3] == [0x00, 0x00, 0x01] {
        return Some(SCORE_MAX);
    }
    None
}
