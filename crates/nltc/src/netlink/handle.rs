//! TC handle algebra.
//!
//! TC handles are 32-bit values split into major:minor parts (16 bits each).
//! They identify qdiscs and classes in the traffic control hierarchy. A
//! qdisc owns major `M` with minor 0; its classes are `M:N`.

use std::fmt;
use std::str::FromStr;

use super::error::Error;

/// A TC handle (`major << 16 | minor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Handle(u32);

impl Handle {
    /// Parent of a root qdisc.
    pub const ROOT: Handle = Handle(0xFFFF_FFFF);
    /// Unspecified handle (let the kernel pick, or "no parent").
    pub const NONE: Handle = Handle(0);
    /// Parent of the ingress qdisc.
    pub const INGRESS: Handle = Handle(0xFFFF_FFF1);
    /// Parent of the clsact qdisc.
    pub const CLSACT: Handle = Handle(0xFFFF_FFF2);

    /// Create a handle from major:minor components.
    pub const fn new(major: u16, minor: u16) -> Self {
        Self(((major as u32) << 16) | minor as u32)
    }

    /// Create a handle from a raw 32-bit value.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw 32-bit value as carried in `tcmsg`.
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Major number (upper 16 bits).
    pub const fn major(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Minor number (lower 16 bits).
    pub const fn minor(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Handle of the qdisc owning this handle (minor cleared).
    pub const fn qdisc(self) -> Self {
        Self::new(self.major(), 0)
    }

    /// Check if this is the root handle.
    pub const fn is_root(self) -> bool {
        self.0 == Self::ROOT.0
    }

    /// Check if this is the ingress handle.
    pub const fn is_ingress(self) -> bool {
        self.0 == Self::INGRESS.0
    }

    /// Check if this is the clsact handle.
    pub const fn is_clsact(self) -> bool {
        self.0 == Self::CLSACT.0
    }

    /// Check if this handle is unspecified.
    pub const fn is_none(self) -> bool {
        self.0 == Self::NONE.0
    }
}

impl From<u32> for Handle {
    fn from(raw: u32) -> Self {
        Self::from_raw(raw)
    }
}

impl From<Handle> for u32 {
    fn from(handle: Handle) -> Self {
        handle.as_raw()
    }
}

/// Formats like tc(8): `root`, `ingress`, `clsact`, `none`, `1:` or `1:a`.
impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ROOT => f.write_str("root"),
            Self::INGRESS => f.write_str("ingress"),
            Self::CLSACT => f.write_str("clsact"),
            Self::NONE => f.write_str("none"),
            h if h.minor() == 0 => write!(f, "{:x}:", h.major()),
            h => write!(f, "{:x}:{:x}", h.major(), h.minor()),
        }
    }
}

impl FromStr for Handle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "root" => return Ok(Self::ROOT),
            "ingress" => return Ok(Self::INGRESS),
            "clsact" => return Ok(Self::CLSACT),
            "none" => return Ok(Self::NONE),
            _ => {}
        }

        let invalid = || Error::InvalidHandle(s.to_string());
        let (major, minor) = s.split_once(':').ok_or_else(invalid)?;
        if major.is_empty() {
            return Err(invalid());
        }
        let major = u16::from_str_radix(major, 16).map_err(|_| invalid())?;
        let minor = if minor.is_empty() {
            0
        } else {
            u16::from_str_radix(minor, 16).map_err(|_| invalid())?
        };
        Ok(Self::new(major, minor))
    }
}
