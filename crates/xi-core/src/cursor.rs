//! 字节游标.
//!
//! 对已在内存中的只读字节缓冲区提供带边界检查的顺序读取.
//! 所有扫描器共用此原语定位字节对齐的头部字段.
//!
//! 读取遵循 "原子读取或失败": 先做边界检查, 检查不通过时
//! 返回 [`XiError::Truncated`] 且位置不变.

use crate::bitreader::BitReader;
use crate::{XiError, XiResult};

/// 字节游标
///
/// 借用调用方的缓冲区, 维护一个单调递增的字节偏移.
/// 游标本身不持有任何可变共享状态, 多个游标可以并发扫描不同缓冲区.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前字节偏移
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    /// 创建新游标, 位置为 0
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// 当前字节偏移
    pub fn position(&self) -> usize {
        self.pos
    }

    /// 剩余可读字节数
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// 是否已到达缓冲区末尾
    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// 获取底层缓冲区
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// 边界检查, 失败时位置不变
    fn check(&self, needed: usize) -> XiResult<()> {
        if needed > self.remaining() {
            return Err(XiError::Truncated {
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    /// 窥视 N 个字节 (不移动位置)
    pub fn peek_bytes(&self, n: usize) -> XiResult<&'a [u8]> {
        self.check(n)?;
        Ok(&self.data[self.pos..self.pos + n])
    }

    /// 读取 N 个字节并前进
    pub fn read_bytes(&mut self, n: usize) -> XiResult<&'a [u8]> {
        self.check(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// 读取 1 个字节
    pub fn read_u8(&mut self) -> XiResult<u8> {
        self.check(1)?;
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    /// 读取 u16 大端
    pub fn read_u16_be(&mut self) -> XiResult<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from(bytes[0]) << 8 | u16::from(bytes[1]))
    }

    /// 读取 u24 大端 (3 字节无符号整数)
    pub fn read_u24_be(&mut self) -> XiResult<u32> {
        let bytes = self.read_bytes(3)?;
        Ok((u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2]))
    }

    /// 读取 u32 大端
    pub fn read_u32_be(&mut self) -> XiResult<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// 跳过 N 个字节
    pub fn skip(&mut self, n: usize) -> XiResult<()> {
        self.check(n)?;
        self.pos += n;
        Ok(())
    }

    /// 定位到绝对偏移
    ///
    /// 只允许定位到 `0 ..= len` 范围内, 越界返回错误且位置不变.
    pub fn seek_to(&mut self, pos: usize) -> XiResult<()> {
        if pos > self.data.len() {
            return Err(XiError::InvalidArgument(format!(
                "seek_to: 偏移 {} 超出缓冲区长度 {}",
                pos,
                self.data.len()
            )));
        }
        self.pos = pos;
        Ok(())
    }

    /// 在当前位置创建位级子游标
    ///
    /// 子游标覆盖剩余全部字节, 独立维护自己的位偏移,
    /// 不会反过来移动本游标. 仅用于已定位的头部内部的位字段提取.
    pub fn bits(&self) -> BitReader<'a> {
        BitReader::new(&self.data[self.pos..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_fixed_width() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A];
        let mut cur = ByteCursor::new(&data);

        assert_eq!(cur.read_u8().unwrap(), 0x01);
        assert_eq!(cur.read_u16_be().unwrap(), 0x0203);
        assert_eq!(cur.read_u24_be().unwrap(), 0x040506);
        assert_eq!(cur.read_u32_be().unwrap(), 0x0708090A);
        assert!(cur.is_eof());
    }

    #[test]
    fn test_peek_does_not_advance() {
        let data = [0xAA, 0xBB, 0xCC];
        let cur = ByteCursor::new(&data);

        assert_eq!(cur.peek_bytes(2).unwrap(), &[0xAA, 0xBB]);
        assert_eq!(cur.peek_bytes(2).unwrap(), &[0xAA, 0xBB]);
        assert_eq!(cur.position(), 0);
    }

    #[test]
    fn test_truncated_read_keeps_position() {
        let data = [0x01, 0x02];
        let mut cur = ByteCursor::new(&data);
        cur.read_u8().unwrap();

        let err = cur.read_u32_be().expect_err("越界读取应失败");
        match err {
            XiError::Truncated { needed, remaining } => {
                assert_eq!(needed, 4);
                assert_eq!(remaining, 1);
            }
            other => panic!("应为 Truncated, 实际={other}"),
        }
        // 失败的读取不移动位置
        assert_eq!(cur.position(), 1);
        assert_eq!(cur.read_u8().unwrap(), 0x02);
    }

    #[test]
    fn test_skip_and_seek() {
        let data = [0u8; 16];
        let mut cur = ByteCursor::new(&data);

        cur.skip(10).unwrap();
        assert_eq!(cur.position(), 10);
        assert_eq!(cur.remaining(), 6);

        cur.seek_to(4).unwrap();
        assert_eq!(cur.position(), 4);

        // 允许定位到末尾
        cur.seek_to(16).unwrap();
        assert!(cur.is_eof());
        assert!(cur.seek_to(17).is_err());
    }

    #[test]
    fn test_bits_sub_cursor() {
        let data = [0xFF, 0b1010_0000];
        let mut cur = ByteCursor::new(&data);
        cur.skip(1).unwrap();

        let mut br = cur.bits();
        assert_eq!(br.read_bits(4).unwrap(), 0b1010);
        // 子游标不影响字节游标
        assert_eq!(cur.position(), 1);
    }
}
