//! BACnet 标签编解码原语
//!
//! 标签头：`tag number(4) | class(1) | length/value/type(3)`，
//! 编号 ≥ 15 时扩展一个字节，长度 > 4 时扩展 1/3/5 个字节。

use crate::error::DecodeError;
use crate::object::{ObjectId, PropertyValue};

/// 应用标签编号
pub mod app_tag {
    pub const NULL: u8 = 0;
    pub const BOOLEAN: u8 = 1;
    pub const UNSIGNED: u8 = 2;
    pub const SIGNED: u8 = 3;
    pub const REAL: u8 = 4;
    pub const CHARACTER_STRING: u8 = 7;
    pub const BIT_STRING: u8 = 8;
    pub const ENUMERATED: u8 = 9;
    pub const OBJECT_ID: u8 = 12;
}

/// UTF-8 字符集
const CHARSET_UTF8: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    Application,
    Context,
}

/// 标签的 LVT 字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lvt {
    Length(u32),
    Opening,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub number: u8,
    pub class: TagClass,
    pub lvt: Lvt,
}

impl Tag {
    pub fn is_context(&self, number: u8) -> bool {
        self.class == TagClass::Context && self.number == number && matches!(self.lvt, Lvt::Length(_))
    }

    pub fn is_opening(&self, number: u8) -> bool {
        self.class == TagClass::Context && self.number == number && self.lvt == Lvt::Opening
    }

    pub fn is_closing(&self, number: u8) -> bool {
        self.class == TagClass::Context && self.number == number && self.lvt == Lvt::Closing
    }

    fn length(&self) -> Result<usize, DecodeError> {
        match self.lvt {
            Lvt::Length(len) => Ok(len as usize),
            _ => Err(DecodeError::UnexpectedTag("primitive tag")),
        }
    }
}

pub fn encode_tag(buf: &mut Vec<u8>, number: u8, class: TagClass, len: usize) {
    let class_bit = match class {
        TagClass::Application => 0x00,
        TagClass::Context => 0x08,
    };
    let lvt = if len <= 4 { len as u8 } else { 5 };

    if number < 15 {
        buf.push((number << 4) | class_bit | lvt);
    } else {
        buf.push(0xF0 | class_bit | lvt);
        buf.push(number);
    }

    if len > 4 {
        if len < 254 {
            buf.push(len as u8);
        } else if len <= u16::MAX as usize {
            buf.push(254);
            buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            buf.push(255);
            buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }
}

pub fn encode_opening_tag(buf: &mut Vec<u8>, number: u8) {
    buf.push((number << 4) | 0x0E);
}

pub fn encode_closing_tag(buf: &mut Vec<u8>, number: u8) {
    buf.push((number << 4) | 0x0F);
}

/// 无符号数的最短编码长度
fn unsigned_len(value: u32) -> usize {
    match value {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

fn push_unsigned(buf: &mut Vec<u8>, value: u32) {
    let len = unsigned_len(value);
    buf.extend_from_slice(&value.to_be_bytes()[4 - len..]);
}

pub fn encode_application_null(buf: &mut Vec<u8>) {
    encode_tag(buf, app_tag::NULL, TagClass::Application, 0);
}

/// 布尔值直接放在 LVT 中，没有内容字节
pub fn encode_application_boolean(buf: &mut Vec<u8>, value: bool) {
    encode_tag(buf, app_tag::BOOLEAN, TagClass::Application, usize::from(value));
}

pub fn encode_application_unsigned(buf: &mut Vec<u8>, value: u32) {
    encode_tag(buf, app_tag::UNSIGNED, TagClass::Application, unsigned_len(value));
    push_unsigned(buf, value);
}

pub fn encode_application_enumerated(buf: &mut Vec<u8>, value: u32) {
    encode_tag(buf, app_tag::ENUMERATED, TagClass::Application, unsigned_len(value));
    push_unsigned(buf, value);
}

pub fn encode_application_real(buf: &mut Vec<u8>, value: f32) {
    encode_tag(buf, app_tag::REAL, TagClass::Application, 4);
    buf.extend_from_slice(&value.to_be_bytes());
}

pub fn encode_application_character_string(buf: &mut Vec<u8>, value: &str) {
    encode_tag(
        buf,
        app_tag::CHARACTER_STRING,
        TagClass::Application,
        value.len() + 1,
    );
    buf.push(CHARSET_UTF8);
    buf.extend_from_slice(value.as_bytes());
}

/// 位串：首字节为末字节未使用的位数，位按 MSB 优先排列
pub fn encode_application_bit_string(buf: &mut Vec<u8>, bits: &[bool]) {
    let bytes = bits.len().div_ceil(8);
    let unused = (bytes * 8 - bits.len()) as u8;
    encode_tag(buf, app_tag::BIT_STRING, TagClass::Application, bytes + 1);
    buf.push(unused);
    for chunk in bits.chunks(8) {
        let mut byte = 0u8;
        for (i, bit) in chunk.iter().enumerate() {
            if *bit {
                byte |= 0x80 >> i;
            }
        }
        buf.push(byte);
    }
}

pub fn encode_application_object_id(buf: &mut Vec<u8>, id: ObjectId) {
    encode_tag(buf, app_tag::OBJECT_ID, TagClass::Application, 4);
    buf.extend_from_slice(&id.to_raw().to_be_bytes());
}

pub fn encode_context_unsigned(buf: &mut Vec<u8>, number: u8, value: u32) {
    encode_tag(buf, number, TagClass::Context, unsigned_len(value));
    push_unsigned(buf, value);
}

pub fn encode_context_enumerated(buf: &mut Vec<u8>, number: u8, value: u32) {
    encode_context_unsigned(buf, number, value);
}

pub fn encode_context_object_id(buf: &mut Vec<u8>, number: u8, id: ObjectId) {
    encode_tag(buf, number, TagClass::Context, 4);
    buf.extend_from_slice(&id.to_raw().to_be_bytes());
}

/// 顺序读取标签与内容
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        let byte = *self.data.get(self.pos).ok_or(DecodeError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(len).ok_or(DecodeError::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(DecodeError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    pub fn read_tag(&mut self) -> Result<Tag, DecodeError> {
        let first = self.byte()?;
        let mut number = first >> 4;
        if number == 15 {
            number = self.byte()?;
        }
        let class = if first & 0x08 != 0 {
            TagClass::Context
        } else {
            TagClass::Application
        };
        let lvt_bits = first & 0x07;

        let lvt = match (class, lvt_bits) {
            (TagClass::Context, 6) => Lvt::Opening,
            (TagClass::Context, 7) => Lvt::Closing,
            (_, 5) => {
                let ext = self.byte()?;
                let len = match ext {
                    254 => {
                        let b = self.take(2)?;
                        u32::from(u16::from_be_bytes([b[0], b[1]]))
                    }
                    255 => {
                        let b = self.take(4)?;
                        u32::from_be_bytes([b[0], b[1], b[2], b[3]])
                    }
                    len => u32::from(len),
                };
                Lvt::Length(len)
            }
            (_, len) => Lvt::Length(u32::from(len)),
        };

        Ok(Tag { number, class, lvt })
    }

    pub fn peek_tag(&self) -> Result<Tag, DecodeError> {
        self.clone().read_tag()
    }

    fn read_unsigned_value(&mut self, len: usize) -> Result<u32, DecodeError> {
        if !(1..=4).contains(&len) {
            return Err(DecodeError::InvalidLength(len));
        }
        Ok(self
            .take(len)?
            .iter()
            .fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
    }

    fn read_object_id_value(&mut self, len: usize) -> Result<ObjectId, DecodeError> {
        if len != 4 {
            return Err(DecodeError::InvalidLength(len));
        }
        let b = self.take(4)?;
        Ok(ObjectId::from_raw(u32::from_be_bytes([b[0], b[1], b[2], b[3]])))
    }

    pub fn read_context_unsigned(&mut self, number: u8) -> Result<u32, DecodeError> {
        let tag = self.read_tag()?;
        if !tag.is_context(number) {
            return Err(DecodeError::UnexpectedTag("context unsigned"));
        }
        self.read_unsigned_value(tag.length()?)
    }

    /// 下一个标签是指定编号的上下文标签时才读取
    pub fn read_optional_context_unsigned(
        &mut self,
        number: u8,
    ) -> Result<Option<u32>, DecodeError> {
        if self.is_empty() || !self.peek_tag()?.is_context(number) {
            return Ok(None);
        }
        self.read_context_unsigned(number).map(Some)
    }

    pub fn read_context_object_id(&mut self, number: u8) -> Result<ObjectId, DecodeError> {
        let tag = self.read_tag()?;
        if !tag.is_context(number) {
            return Err(DecodeError::UnexpectedTag("context object identifier"));
        }
        self.read_object_id_value(tag.length()?)
    }

    pub fn expect_opening(&mut self, number: u8) -> Result<(), DecodeError> {
        if self.read_tag()?.is_opening(number) {
            Ok(())
        } else {
            Err(DecodeError::UnexpectedTag("opening tag"))
        }
    }

    pub fn at_closing(&self, number: u8) -> Result<bool, DecodeError> {
        Ok(self.peek_tag()?.is_closing(number))
    }

    pub fn expect_closing(&mut self, number: u8) -> Result<(), DecodeError> {
        if self.read_tag()?.is_closing(number) {
            Ok(())
        } else {
            Err(DecodeError::UnexpectedTag("closing tag"))
        }
    }

    pub fn read_application_unsigned(&mut self) -> Result<u32, DecodeError> {
        match self.read_application_value()? {
            PropertyValue::Unsigned(value) => Ok(value),
            _ => Err(DecodeError::UnexpectedTag("application unsigned")),
        }
    }

    pub fn read_application_enumerated(&mut self) -> Result<u32, DecodeError> {
        match self.read_application_value()? {
            PropertyValue::Enumerated(value) => Ok(value),
            _ => Err(DecodeError::UnexpectedTag("application enumerated")),
        }
    }

    pub fn read_application_object_id(&mut self) -> Result<ObjectId, DecodeError> {
        match self.read_application_value()? {
            PropertyValue::ObjectId(id) => Ok(id),
            _ => Err(DecodeError::UnexpectedTag("application object identifier")),
        }
    }

    pub fn read_application_value(&mut self) -> Result<PropertyValue, DecodeError> {
        let tag = self.read_tag()?;
        if tag.class != TagClass::Application {
            return Err(DecodeError::UnexpectedTag("application tag"));
        }
        let len = tag.length()?;

        match tag.number {
            app_tag::NULL => Ok(PropertyValue::Null),
            app_tag::BOOLEAN => Ok(PropertyValue::Boolean(len != 0)),
            app_tag::UNSIGNED => self.read_unsigned_value(len).map(PropertyValue::Unsigned),
            app_tag::ENUMERATED => self.read_unsigned_value(len).map(PropertyValue::Enumerated),
            app_tag::REAL => {
                if len != 4 {
                    return Err(DecodeError::InvalidLength(len));
                }
                let b = self.take(4)?;
                Ok(PropertyValue::Real(f32::from_be_bytes([b[0], b[1], b[2], b[3]])))
            }
            app_tag::CHARACTER_STRING => {
                let content = self.take(len)?;
                match content.split_first() {
                    Some((&CHARSET_UTF8, text)) => std::str::from_utf8(text)
                        .map(|s| PropertyValue::CharacterString(s.to_string()))
                        .map_err(|_| DecodeError::InvalidString),
                    _ => Err(DecodeError::InvalidString),
                }
            }
            app_tag::BIT_STRING => {
                let content = self.take(len)?;
                let Some((&unused, bytes)) = content.split_first() else {
                    return Err(DecodeError::InvalidLength(len));
                };
                let total = (bytes.len() * 8).saturating_sub(usize::from(unused));
                let bits = (0..total)
                    .map(|i| bytes[i / 8] & (0x80 >> (i % 8)) != 0)
                    .collect();
                Ok(PropertyValue::BitString(bits))
            }
            app_tag::OBJECT_ID => self.read_object_id_value(len).map(PropertyValue::ObjectId),
            other => Err(DecodeError::UnsupportedTag(other)),
        }
    }
}
