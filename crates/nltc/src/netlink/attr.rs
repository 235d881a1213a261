//! Netlink attribute (rtattr/nlattr) handling.
//!
//! Attributes are type-length-value records: a 4-byte header (`u16`
//! length including the header but excluding padding, then `u16` type,
//! both host endian) followed by the payload padded to 4 bytes. A payload
//! may itself be a sequence of attributes; whether it is depends on the
//! tag, which this module never interprets.

use winnow::Parser;
use winnow::error::{ContextError, ErrMode};
use winnow::token::take;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::error::{Error, Result};

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Align a length to NLA_ALIGNTO boundary.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = 4; // nla_align(size_of::<NlAttr>())

/// Netlink attribute header (mirrors struct nlattr / struct rtattr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttr {
    /// Length including header.
    pub nla_len: u16,
    /// Attribute type.
    pub nla_type: u16,
}

/// Attribute type flags.
pub const NLA_F_NESTED: u16 = 1 << 15;
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

impl NlAttr {
    /// Create a new attribute header.
    ///
    /// Fails when the payload does not fit the 16-bit length field.
    pub fn new(attr_type: u16, data_len: usize) -> Result<Self> {
        let nla_len = u16::try_from(NLA_HDRLEN + data_len).map_err(|_| {
            Error::InvalidConfig(format!(
                "attribute {} payload of {} bytes exceeds the netlink limit of {}",
                attr_type & NLA_TYPE_MASK,
                data_len,
                u16::MAX as usize - NLA_HDRLEN
            ))
        })?;
        Ok(Self {
            nla_len,
            nla_type: attr_type,
        })
    }

    /// Get the attribute type without flags.
    pub fn kind(&self) -> u16 {
        self.nla_type & NLA_TYPE_MASK
    }

    /// Get the payload length (total length minus header).
    pub fn payload_len(&self) -> usize {
        (self.nla_len as usize).saturating_sub(NLA_HDRLEN)
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::truncated("attribute header", NLA_HDRLEN, data.len()))
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// One node of an attribute tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// Attribute type tag.
    pub kind: u16,
    /// Leaf payload or nested children.
    pub value: AttrValue,
}

/// Payload of an [`Attr`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// Raw payload bytes.
    Leaf(Vec<u8>),
    /// Child attributes, encoded back to back as the payload.
    Nested(Vec<Attr>),
}

impl Attr {
    /// Raw leaf attribute.
    pub fn leaf(kind: u16, data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            value: AttrValue::Leaf(data.into()),
        }
    }

    /// Nested attribute holding `children`.
    pub fn nested(kind: u16, children: Vec<Attr>) -> Self {
        Self {
            kind,
            value: AttrValue::Nested(children),
        }
    }

    /// u32 leaf (native endian).
    pub fn u32(kind: u16, value: u32) -> Self {
        Self::leaf(kind, value.to_ne_bytes())
    }

    /// u64 leaf (native endian).
    pub fn u64(kind: u16, value: u64) -> Self {
        Self::leaf(kind, value.to_ne_bytes())
    }

    /// NUL-terminated string leaf.
    pub fn string(kind: u16, value: &str) -> Self {
        let mut data = Vec::with_capacity(value.len() + 1);
        data.extend_from_slice(value.as_bytes());
        data.push(0);
        Self::leaf(kind, data)
    }

    /// Size of this attribute on the wire, padding included.
    pub fn encoded_len(&self) -> usize {
        nla_align(NLA_HDRLEN + self.payload_len())
    }

    fn payload_len(&self) -> usize {
        match &self.value {
            AttrValue::Leaf(data) => data.len(),
            AttrValue::Nested(children) => children.iter().map(Attr::encoded_len).sum(),
        }
    }

    /// Append this attribute (and its children) to `buf`.
    ///
    /// Nested attributes are written without `NLA_F_NESTED`, the way
    /// iproute2's `addattr_nest` does for TC options.
    pub fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        let header = NlAttr::new(self.kind, self.payload_len())?;
        buf.extend_from_slice(header.as_bytes());
        match &self.value {
            AttrValue::Leaf(data) => buf.extend_from_slice(data),
            AttrValue::Nested(children) => {
                for child in children {
                    child.write_to(buf)?;
                }
            }
        }
        buf.resize(nla_align(buf.len()), 0);
        Ok(())
    }
}

/// Encode a sequence of attributes into a byte buffer.
///
/// Fails with [`Error::InvalidConfig`] when any attribute is too large
/// for its length field.
pub fn encode_attrs(attrs: &[Attr]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(attrs.iter().map(Attr::encoded_len).sum());
    for attr in attrs {
        attr.write_to(&mut buf)?;
    }
    Ok(buf)
}

// ============================================================================
// Decoding
// ============================================================================

type PResult<T> = core::result::Result<T, ErrMode<ContextError>>;

fn take_bytes<'a>(input: &mut &'a [u8], n: usize) -> PResult<&'a [u8]> {
    take(n).parse_next(input)
}

/// Parse one attribute, returning (type without flags, payload).
///
/// Consumes the declared length plus whatever padding is actually present.
fn parse_attr<'a>(input: &mut &'a [u8]) -> PResult<(u16, &'a [u8])> {
    let header = take_bytes(input, NLA_HDRLEN)?;
    let len = u16::from_ne_bytes([header[0], header[1]]) as usize;
    let attr_type = u16::from_ne_bytes([header[2], header[3]]);

    if len < NLA_HDRLEN {
        return Err(ErrMode::Cut(ContextError::new()));
    }

    let payload = take_bytes(input, len - NLA_HDRLEN).map_err(|_| ErrMode::Cut(ContextError::new()))?;

    let padding = (nla_align(len) - len).min(input.len());
    take_bytes(input, padding)?;

    Ok((attr_type & NLA_TYPE_MASK, payload))
}

/// Strictly decode a buffer into its top-level attributes.
///
/// Fails on a header shorter than 4 bytes, a declared length below the
/// header size or a declared length past the end of the buffer. The
/// returned payloads borrow from `data` and can be fed back into this
/// function when the tag is known to carry a nested tree.
pub fn parse_attrs(data: &[u8]) -> Result<Vec<(u16, &[u8])>> {
    let mut input = data;
    let mut attrs = Vec::new();

    while !input.is_empty() {
        let offset = data.len() - input.len();
        if input.len() < NLA_HDRLEN {
            return Err(Error::InvalidWireFormat(format!(
                "attribute header at offset {} truncated: {} bytes left",
                offset,
                input.len()
            )));
        }
        let attr = parse_attr(&mut input).map_err(|_| {
            Error::InvalidWireFormat(format!("malformed attribute at offset {}", offset))
        })?;
        attrs.push(attr);
    }

    Ok(attrs)
}

/// Find the first attribute with the given type.
pub fn find<'a>(attrs: &[(u16, &'a [u8])], kind: u16) -> Option<&'a [u8]> {
    attrs.iter().find(|(k, _)| *k == kind).map(|(_, data)| *data)
}

/// Lenient iterator over netlink attributes in a buffer.
///
/// Stops silently at the first malformed header; use [`parse_attrs`]
/// when malformed input must be reported.
pub struct AttrIter<'a> {
    data: &'a [u8],
}

impl<'a> AttrIter<'a> {
    /// Create a new attribute iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Check if there are no more attributes.
    pub fn is_empty(&self) -> bool {
        self.data.len() < NLA_HDRLEN
    }
}

impl<'a> Iterator for AttrIter<'a> {
    /// Returns (attribute type, payload data).
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        parse_attr(&mut self.data).ok().or_else(|| {
            self.data = &[];
            None
        })
    }
}

/// Helper functions for extracting typed values from attribute payloads.
pub mod get {
    use super::*;

    /// Extract a u8 value.
    pub fn u8(data: &[u8]) -> Result<u8> {
        data.first()
            .copied()
            .ok_or_else(|| Error::truncated("u8 attribute", 1, 0))
    }

    /// Extract a u32 value (native endian).
    pub fn u32_ne(data: &[u8]) -> Result<u32> {
        let bytes = data
            .get(..4)
            .ok_or_else(|| Error::truncated("u32 attribute", 4, data.len()))?;
        Ok(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Extract a u64 value (native endian).
    pub fn u64_ne(data: &[u8]) -> Result<u64> {
        let bytes = data
            .get(..8)
            .ok_or_else(|| Error::truncated("u64 attribute", 8, data.len()))?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_ne_bytes(buf))
    }

    /// Extract a null-terminated string.
    pub fn string(data: &[u8]) -> Result<&str> {
        let len = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        std::str::from_utf8(&data[..len])
            .map_err(|e| Error::InvalidWireFormat(format!("invalid UTF-8: {}", e)))
    }
}
