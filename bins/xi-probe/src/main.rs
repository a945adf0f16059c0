//! xi-probe - 码流结构探测工具
//!
//! 分析 H.264/AAC 裸流, FLV 容器与 UDP-RTP-TS 数据包的帧结构,
//! 打印帧/记录级别的描述表格, 不做音视频解码.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::net::UdpSocket;
use std::process;

use xi_core::XiError;
use xi_scan::flv::{self, AudioTagHeader, FlvDemuxer, FlvTagType};
use xi_scan::probe::{self, StreamKind};
use xi_scan::{AdtsScanner, NaluScanner, TsRtpAnalyzer};

/// Xi 码流结构探测工具
#[derive(Parser, Debug)]
#[command(name = "xi-probe", version, about = "纯 Rust 码流结构探测工具")]
struct Cli {
    /// 输入文件路径 (自动探测类型)
    input: Option<String>,

    /// 显式指定分析类型
    #[command(subcommand)]
    command: Option<Command>,

    /// 输出 JSON 格式
    #[arg(long, global = true)]
    json: bool,

    /// 静默模式 (只输出分析结果)
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// 分析命令
#[derive(Subcommand, Debug)]
enum Command {
    /// 分析 H.264 Annex B 裸流, 列出 NAL 单元
    H264 {
        /// 输入文件路径
        input: String,
    },
    /// 分析 AAC ADTS 裸流, 列出 ADTS 帧
    Aac {
        /// 输入文件路径
        input: String,
    },
    /// 分析 FLV 容器, 列出 tag 记录
    Flv {
        /// 输入文件路径
        input: String,
        /// 提取音频基本流到文件
        #[arg(long)]
        extract_audio: Option<String>,
    },
    /// 分析 UDP-RTP-TS 数据包
    Rtp {
        /// 监听 UDP 端口
        #[arg(long)]
        listen: Option<u16>,
        /// 把文件内容当作单个数据报分析
        #[arg(long)]
        file: Option<String>,
        /// 监听模式下处理的数据报数量上限
        #[arg(long)]
        count: Option<u64>,
    },
}

// ============================================================
// JSON 输出结构体
// ============================================================

/// NAL 单元信息
#[derive(Serialize)]
struct NaluInfo {
    index: usize,
    offset: usize,
    start_code_len: usize,
    length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    ref_idc: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nal_type: Option<String>,
    forbidden_zero_bit: bool,
}

/// ADTS 帧信息
#[derive(Serialize)]
struct AdtsInfo {
    index: usize,
    offset: usize,
    profile: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate: Option<u32>,
    channels: u8,
    frame_length: u16,
    has_crc: bool,
}

/// FLV tag 信息
#[derive(Serialize)]
struct FlvTagInfo {
    index: usize,
    offset: usize,
    tag_type: String,
    data_size: u32,
    timestamp: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_format: Option<String>,
}

/// 数据报分析信息
#[derive(Serialize)]
struct DatagramInfo {
    sequence_number: u16,
    timestamp: u32,
    payload_type: u8,
    ssrc: u32,
    ts_packets: Vec<TsPacketInfo>,
    diagnostics: Vec<String>,
}

/// TS 包信息
#[derive(Serialize)]
struct TsPacketInfo {
    index: usize,
    pid: u16,
    continuity_counter: u8,
    payload_unit_start: bool,
}

// ============================================================
// 主逻辑
// ============================================================

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match &cli.command {
        Some(Command::H264 { input }) => run_h264(input, &cli),
        Some(Command::Aac { input }) => run_aac(input, &cli),
        Some(Command::Flv {
            input,
            extract_audio,
        }) => run_flv(input, extract_audio.as_deref(), &cli),
        Some(Command::Rtp {
            listen,
            file,
            count,
        }) => run_rtp(*listen, file.as_deref(), *count, &cli),
        None => match &cli.input {
            Some(input) => run_auto(input, &cli),
            None => {
                print_banner();
                return;
            }
        },
    };

    if let Err(e) = result {
        eprintln!("错误: {e}");
        process::exit(1);
    }
}

/// 读取输入文件
fn read_input(path: &str) -> Result<Vec<u8>, XiError> {
    Ok(std::fs::read(path)?)
}

/// 自动探测类型并分发
fn run_auto(input: &str, cli: &Cli) -> Result<(), XiError> {
    let data = read_input(input)?;
    let result = probe::detect(&data, Some(input)).ok_or_else(|| {
        XiError::InvalidArgument(format!("无法识别 '{input}' 的码流类型"))
    })?;

    if !cli.quiet {
        eprintln!("探测结果: {} (置信度: {})", result.kind, result.score);
    }

    match result.kind {
        StreamKind::H264AnnexB => run_h264(input, cli),
        StreamKind::AacAdts => run_aac(input, cli),
        StreamKind::Flv => run_flv(input, None, cli),
    }
}

/// H.264 分析
fn run_h264(input: &str, cli: &Cli) -> Result<(), XiError> {
    let data = read_input(input)?;
    if !cli.quiet {
        eprintln!("输入文件: {input} ({} 字节)", data.len());
    }

    let mut scanner = NaluScanner::new(&data);
    let mut rows = Vec::new();
    for unit in scanner.by_ref() {
        let unit = unit?;
        rows.push(NaluInfo {
            index: rows.len(),
            offset: unit.offset,
            start_code_len: unit.start_code_len,
            length: unit.len(),
            ref_idc: unit.header.map(|h| h.ref_idc),
            nal_type: unit.header.map(|h| format!("{}", h.nal_type)),
            forbidden_zero_bit: unit.header.is_some_and(|h| h.forbidden_zero_bit),
        });
    }
    let diagnostics: Vec<String> = scanner.diagnostics().iter().map(|d| d.to_string()).collect();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&rows).unwrap());
    } else {
        println!("------+------------+-----+-------------+----------");
        println!(" 序号 |    偏移    | IDC |    类型     |   长度   ");
        println!("------+------------+-----+-------------+----------");
        for row in &rows {
            println!(
                " {:>4} | {:>10} | {:>3} | {:<11} | {:>8} ",
                row.index,
                row.offset,
                row.ref_idc.map_or("-".to_string(), |v| v.to_string()),
                row.nal_type.as_deref().unwrap_or("(空单元)"),
                row.length
            );
        }
        println!("------+------------+-----+-------------+----------");
        println!("共 {} 个 NAL 单元", rows.len());
    }
    print_diagnostics(&diagnostics, cli);
    Ok(())
}

/// AAC 分析
fn run_aac(input: &str, cli: &Cli) -> Result<(), XiError> {
    let data = read_input(input)?;
    if !cli.quiet {
        eprintln!("输入文件: {input} ({} 字节)", data.len());
    }

    let mut rows = Vec::new();
    for frame in AdtsScanner::new(&data) {
        let frame = frame?;
        rows.push(AdtsInfo {
            index: rows.len(),
            offset: frame.offset,
            profile: frame.profile_name().to_string(),
            sample_rate: frame.sample_rate(),
            channels: frame.channel_config,
            frame_length: frame.frame_length,
            has_crc: !frame.protection_absent,
        });
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&rows).unwrap());
    } else {
        println!("------+------------+---------+----------+------+--------");
        println!(" 序号 |    偏移    | Profile |  采样率  | 声道 |  帧长  ");
        println!("------+------------+---------+----------+------+--------");
        for row in &rows {
            println!(
                " {:>4} | {:>10} | {:<7} | {:>8} | {:>4} | {:>6} ",
                row.index,
                row.offset,
                row.profile,
                row.sample_rate
                    .map_or("-".to_string(), |v| v.to_string()),
                row.channels,
                row.frame_length
            );
        }
        println!("------+------------+---------+----------+------+--------");
        println!("共 {} 个 ADTS 帧", rows.len());
    }
    Ok(())
}

/// FLV 分析
fn run_flv(input: &str, extract_audio: Option<&str>, cli: &Cli) -> Result<(), XiError> {
    let data = read_input(input)?;
    if !cli.quiet {
        eprintln!("输入文件: {input} ({} 字节)", data.len());
    }

    let mut demuxer = FlvDemuxer::new(&data)?;
    let header = *demuxer.header();
    if !cli.quiet {
        eprintln!(
            "FLV: version={} 音频={} 视频={}",
            header.version, header.has_audio, header.has_video
        );
    }

    let mut rows = Vec::new();
    let mut scan_error = None;
    for tag in demuxer.by_ref() {
        match tag {
            Ok(tag) => {
                // AudioTagHeader 是载荷首字节, 由调用方解释
                let audio_format = (tag.tag_type == FlvTagType::Audio && !tag.payload.is_empty())
                    .then(|| AudioTagHeader::parse(tag.payload[0]).format_name().to_string());
                rows.push(FlvTagInfo {
                    index: rows.len(),
                    offset: tag.offset,
                    tag_type: tag.tag_type.to_string(),
                    data_size: tag.data_size,
                    timestamp: tag.timestamp,
                    audio_format,
                });
            }
            Err(e) => {
                scan_error = Some(e);
                break;
            }
        }
    }
    let diagnostics: Vec<String> = demuxer.diagnostics().iter().map(|d| d.to_string()).collect();
    let last_good = demuxer.last_good_offset();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&rows).unwrap());
    } else {
        println!("------+------------+--------+----------+----------+--------");
        println!(" 序号 |    偏移    |  类型  |   大小   |  时间戳  |  音频  ");
        println!("------+------------+--------+----------+----------+--------");
        for row in &rows {
            println!(
                " {:>4} | {:>10} | {:<6} | {:>8} | {:>8} | {:<6} ",
                row.index,
                row.offset,
                row.tag_type,
                row.data_size,
                row.timestamp,
                row.audio_format.as_deref().unwrap_or("-")
            );
        }
        println!("------+------------+--------+----------+----------+--------");
        println!("共 {} 个 tag", rows.len());
    }
    print_diagnostics(&diagnostics, cli);

    if let Some(e) = scan_error {
        eprintln!("扫描中止: {e}");
        eprintln!("最后可信偏移: {last_good}");
        process::exit(1);
    }

    if let Some(out_path) = extract_audio {
        let stream = flv::extract_audio(&data)?;
        std::fs::write(out_path, &stream)?;
        if !cli.quiet {
            eprintln!("已提取音频基本流: {out_path} ({} 字节)", stream.len());
        }
    }
    Ok(())
}

/// RTP/TS 分析
fn run_rtp(
    listen: Option<u16>,
    file: Option<&str>,
    count: Option<u64>,
    cli: &Cli,
) -> Result<(), XiError> {
    let mut analyzer = TsRtpAnalyzer::new();

    match (listen, file) {
        (Some(port), None) => {
            let socket = UdpSocket::bind(("0.0.0.0", port))?;
            if !cli.quiet {
                eprintln!("正在监听 UDP 端口 {port} ...");
            }
            let mut buf = vec![0u8; 65536];
            let mut handled = 0u64;
            loop {
                if let Some(max) = count {
                    if handled >= max {
                        break;
                    }
                }
                let (n, peer) = socket.recv_from(&mut buf)?;
                if !cli.quiet {
                    eprintln!("数据报 #{handled}: {n} 字节, 来自 {peer}");
                }
                match analyzer.analyze(&buf[..n]) {
                    Ok(report) => print_datagram(&report, cli),
                    Err(e) => eprintln!("数据报 #{handled} 解析失败: {e}"),
                }
                handled += 1;
            }
        }
        (None, Some(path)) => {
            let data = read_input(path)?;
            if !cli.quiet {
                eprintln!("输入文件: {path} ({} 字节, 视为单个数据报)", data.len());
            }
            let report = analyzer.analyze(&data)?;
            print_datagram(&report, cli);
        }
        _ => {
            return Err(XiError::InvalidArgument(
                "rtp: --listen 与 --file 二选一".into(),
            ));
        }
    }
    Ok(())
}

/// 输出单个数据报的分析结果
fn print_datagram(report: &xi_scan::DatagramReport, cli: &Cli) {
    let info = DatagramInfo {
        sequence_number: report.rtp.sequence_number,
        timestamp: report.rtp.timestamp,
        payload_type: report.rtp.payload_type,
        ssrc: report.rtp.ssrc,
        ts_packets: report
            .ts_packets
            .iter()
            .map(|p| TsPacketInfo {
                index: p.index,
                pid: p.pid,
                continuity_counter: p.continuity_counter,
                payload_unit_start: p.payload_unit_start_indicator,
            })
            .collect(),
        diagnostics: report.diagnostics.iter().map(|d| d.to_string()).collect(),
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&info).unwrap());
    } else {
        println!(
            "RTP: seq={} ts={} pt={} ssrc=0x{:08X}",
            info.sequence_number, info.timestamp, info.payload_type, info.ssrc
        );
        for pkt in &info.ts_packets {
            println!(
                "  TS 槽位 {:>2}: PID=0x{:04X} CC={:>2} PUSI={}",
                pkt.index, pkt.pid, pkt.continuity_counter, pkt.payload_unit_start
            );
        }
        println!("  共 {} 个 TS 包", info.ts_packets.len());
    }
    print_diagnostics(&info.diagnostics, cli);
}

/// 输出诊断记录
fn print_diagnostics(diagnostics: &[String], cli: &Cli) {
    if cli.json {
        return; // JSON 模式下诊断随结构体输出或省略
    }
    for d in diagnostics {
        eprintln!("警告: {d}");
    }
}

/// 打印版本横幅
fn print_banner() {
    println!(
        "xi-probe 版本 {} -- 纯 Rust 码流结构探测工具",
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("用法: xi-probe [选项] <输入文件>");
    println!("      xi-probe <h264|aac|flv|rtp> [参数]");
    println!();
    println!("命令:");
    println!("  h264 <文件>            分析 H.264 Annex B 裸流");
    println!("  aac <文件>             分析 AAC ADTS 裸流");
    println!("  flv <文件>             分析 FLV 容器");
    println!("       --extract-audio <输出>  提取音频基本流");
    println!("  rtp --listen <端口>    监听并分析 UDP-RTP-TS 数据包");
    println!("  rtp --file <文件>      把文件当作单个数据报分析");
    println!();
    println!("选项:");
    println!("  --json            以 JSON 格式输出");
    println!("  -q, --quiet       静默模式");
    println!();
    println!("使用 --help 查看完整用法.");
}
