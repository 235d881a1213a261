//! Typed traffic control objects.
//!
//! A [`Qdisc`] or [`Class`] is a closed enum over the kinds this crate
//! understands, each variant holding the shared position attributes
//! ([`QdiscAttrs`] / [`ClassAttrs`]) and its kind-specific parameters.
//! Kinds the crate does not know decode into the `Generic` variants,
//! which keep the raw kind string and option bytes.
//!
//! # Example
//!
//! ```ignore
//! use nltc::netlink::{Connection, Handle, TrafficControl};
//! use nltc::netlink::tc::{ClassAttrs, HtbClass, HtbClassParams, HtbQdisc, QdiscAttrs};
//!
//! let tc = TrafficControl::new(Connection::new()?);
//! let link = 3;
//!
//! let root = HtbQdisc::new(QdiscAttrs::new(link, Handle::new(0xffff, 0), Handle::ROOT));
//! tc.qdisc_add(&root.into()).await?;
//!
//! let params = HtbClassParams::new(1_234_000).cbuffer(1690);
//! let class = HtbClass::new(
//!     ClassAttrs::new(link, Handle::new(0xffff, 0), Handle::new(0xffff, 2)),
//!     &params,
//!     tc.clock(),
//! );
//! tc.class_add(&class.into()).await?;
//! ```

pub mod hfsc;
pub mod htb;
pub mod ingress;
mod list;
pub mod netem;
mod ops;
pub mod pfifo_fast;
pub mod registry;

pub use hfsc::{CurveSelector, HfscClass, HfscQdisc, ServiceCurve};
pub use htb::{HtbClass, HtbClassParams, HtbQdisc};
pub use ingress::Ingress;
pub use netem::{Netem, NetemConfig, Probability};
pub use ops::{Operation, TrafficControl};
pub use pfifo_fast::PfifoFast;

use super::handle::Handle;
use super::stats::{ClassStatistics, QdiscStatistics};

/// Position of a qdisc in a link's qdisc tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QdiscAttrs {
    /// Interface index.
    pub link_index: u32,
    /// Qdisc handle (minor is always 0).
    pub handle: Handle,
    /// Parent class, or `ROOT`/`INGRESS`.
    pub parent: Handle,
    /// Kernel reference count; only set on objects read back.
    pub refcnt: Option<u32>,
    /// Counters; only set on objects read back, never sent.
    pub statistics: QdiscStatistics,
}

impl QdiscAttrs {
    /// Attributes for a qdisc on `link_index`.
    pub fn new(link_index: u32, handle: Handle, parent: Handle) -> Self {
        Self {
            link_index,
            handle,
            parent,
            refcnt: None,
            statistics: QdiscStatistics::new(),
        }
    }
}

/// Position of a class under its qdisc.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassAttrs {
    /// Interface index.
    pub link_index: u32,
    /// Parent qdisc or class.
    pub parent: Handle,
    /// Class handle (major of the owning qdisc).
    pub handle: Handle,
    /// Counters; only set on objects read back, never sent.
    pub statistics: ClassStatistics,
}

impl ClassAttrs {
    /// Attributes for a class on `link_index`.
    pub fn new(link_index: u32, parent: Handle, handle: Handle) -> Self {
        Self {
            link_index,
            parent,
            handle,
            statistics: ClassStatistics::new(),
        }
    }
}

/// Qdisc of a kind this crate does not model.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GenericQdisc {
    pub attrs: QdiscAttrs,
    /// Value of `TCA_KIND`.
    pub kind: String,
    /// Raw `TCA_OPTIONS` payload, sent back verbatim on write.
    pub options: Option<Vec<u8>>,
}

impl GenericQdisc {
    /// Qdisc of `kind` with no options (e.g. `"pfifo"`).
    pub fn new(attrs: QdiscAttrs, kind: impl Into<String>) -> Self {
        Self {
            attrs,
            kind: kind.into(),
            options: None,
        }
    }
}

/// Class of a kind this crate does not model.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GenericClass {
    pub attrs: ClassAttrs,
    /// Value of `TCA_KIND`.
    pub kind: String,
    /// Raw `TCA_OPTIONS` payload, sent back verbatim on write.
    pub options: Option<Vec<u8>>,
}

impl GenericClass {
    /// Class of `kind` with no options.
    pub fn new(attrs: ClassAttrs, kind: impl Into<String>) -> Self {
        Self {
            attrs,
            kind: kind.into(),
            options: None,
        }
    }
}

/// A queueing discipline.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Qdisc {
    Htb(HtbQdisc),
    Netem(Netem),
    Hfsc(HfscQdisc),
    PfifoFast(PfifoFast),
    Ingress(Ingress),
    Generic(GenericQdisc),
}

impl Qdisc {
    /// Shared attributes.
    pub fn attrs(&self) -> &QdiscAttrs {
        match self {
            Self::Htb(q) => &q.attrs,
            Self::Netem(q) => &q.attrs,
            Self::Hfsc(q) => &q.attrs,
            Self::PfifoFast(q) => &q.attrs,
            Self::Ingress(q) => &q.attrs,
            Self::Generic(q) => &q.attrs,
        }
    }

    /// Mutable shared attributes.
    pub fn attrs_mut(&mut self) -> &mut QdiscAttrs {
        match self {
            Self::Htb(q) => &mut q.attrs,
            Self::Netem(q) => &mut q.attrs,
            Self::Hfsc(q) => &mut q.attrs,
            Self::PfifoFast(q) => &mut q.attrs,
            Self::Ingress(q) => &mut q.attrs,
            Self::Generic(q) => &mut q.attrs,
        }
    }

    /// Kernel kind string (`TCA_KIND`).
    pub fn kind(&self) -> &str {
        match self {
            Self::Htb(_) => htb::QDISC_KIND,
            Self::Netem(_) => netem::KIND,
            Self::Hfsc(_) => hfsc::KIND,
            Self::PfifoFast(_) => pfifo_fast::KIND,
            Self::Ingress(_) => ingress::KIND,
            Self::Generic(q) => &q.kind,
        }
    }

    /// Interface index.
    pub fn link_index(&self) -> u32 {
        self.attrs().link_index
    }

    /// Qdisc handle.
    pub fn handle(&self) -> Handle {
        self.attrs().handle
    }

    /// Parent handle.
    pub fn parent(&self) -> Handle {
        self.attrs().parent
    }

    /// Counters reported by the kernel.
    pub fn statistics(&self) -> &QdiscStatistics {
        &self.attrs().statistics
    }
}

/// A class of a classful qdisc.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Class {
    Htb(HtbClass),
    Hfsc(HfscClass),
    Generic(GenericClass),
}

impl Class {
    /// Shared attributes.
    pub fn attrs(&self) -> &ClassAttrs {
        match self {
            Self::Htb(c) => &c.attrs,
            Self::Hfsc(c) => &c.attrs,
            Self::Generic(c) => &c.attrs,
        }
    }

    /// Mutable shared attributes.
    pub fn attrs_mut(&mut self) -> &mut ClassAttrs {
        match self {
            Self::Htb(c) => &mut c.attrs,
            Self::Hfsc(c) => &mut c.attrs,
            Self::Generic(c) => &mut c.attrs,
        }
    }

    /// Kernel kind string (`TCA_KIND`).
    pub fn kind(&self) -> &str {
        match self {
            Self::Htb(_) => htb::CLASS_KIND,
            Self::Hfsc(_) => hfsc::KIND,
            Self::Generic(c) => &c.kind,
        }
    }

    /// Interface index.
    pub fn link_index(&self) -> u32 {
        self.attrs().link_index
    }

    /// Class handle.
    pub fn handle(&self) -> Handle {
        self.attrs().handle
    }

    /// Parent handle.
    pub fn parent(&self) -> Handle {
        self.attrs().parent
    }

    /// Counters reported by the kernel.
    pub fn statistics(&self) -> &ClassStatistics {
        &self.attrs().statistics
    }
}

macro_rules! impl_from_variant {
    ($enum:ident :: $variant:ident ($ty:ty)) => {
        impl From<$ty> for $enum {
            fn from(value: $ty) -> Self {
                $enum::$variant(value)
            }
        }
    };
}

impl_from_variant!(Qdisc::Htb(HtbQdisc));
impl_from_variant!(Qdisc::Netem(Netem));
impl_from_variant!(Qdisc::Hfsc(HfscQdisc));
impl_from_variant!(Qdisc::PfifoFast(PfifoFast));
impl_from_variant!(Qdisc::Ingress(Ingress));
impl_from_variant!(Qdisc::Generic(GenericQdisc));
impl_from_variant!(Class::Htb(HtbClass));
impl_from_variant!(Class::Hfsc(HfscClass));
impl_from_variant!(Class::Generic(GenericClass));
