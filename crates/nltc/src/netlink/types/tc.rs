//! Traffic control kernel ABI: `tcmsg`, attribute ids and the
//! per-kind option structs.

use crate::netlink::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Traffic control message (struct tcmsg).
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct TcMsg {
    /// Address family.
    pub tcm_family: u8,
    /// Padding.
    pub tcm_pad1: u8,
    /// Padding.
    pub tcm_pad2: u16,
    /// Interface index.
    pub tcm_ifindex: i32,
    /// Qdisc/class handle.
    pub tcm_handle: u32,
    /// Parent qdisc/class.
    pub tcm_parent: u32,
    /// Info (refcount for qdiscs).
    pub tcm_info: u32,
}

impl TcMsg {
    /// Size of this structure.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Create a new TC message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interface index.
    pub fn with_ifindex(mut self, ifindex: u32) -> Self {
        self.tcm_ifindex = ifindex as i32;
        self
    }

    /// Set the handle.
    pub fn with_handle(mut self, handle: u32) -> Self {
        self.tcm_handle = handle;
        self
    }

    /// Set the parent.
    pub fn with_parent(mut self, parent: u32) -> Self {
        self.tcm_parent = parent;
        self
    }

    /// Interface index as unsigned.
    pub fn ifindex(&self) -> u32 {
        self.tcm_ifindex as u32
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::truncated("tcmsg", Self::SIZE, data.len()))
    }
}

/// Read a fixed-size option struct from the front of `data`.
///
/// Payloads longer than the struct are accepted (newer kernels append
/// fields); shorter ones are rejected.
pub fn read_struct<T: FromBytes>(what: &str, data: &[u8]) -> Result<T> {
    T::read_from_prefix(data)
        .map(|(v, _)| v)
        .map_err(|_| Error::truncated(what, std::mem::size_of::<T>(), data.len()))
}

/// Top-level TC attributes (TCA_*).
pub mod tca {
    pub const TCA_UNSPEC: u16 = 0;
    pub const TCA_KIND: u16 = 1;
    pub const TCA_OPTIONS: u16 = 2;
    pub const TCA_STATS: u16 = 3;
    pub const TCA_XSTATS: u16 = 4;
    pub const TCA_RATE: u16 = 5;
    pub const TCA_FCNT: u16 = 6;
    pub const TCA_STATS2: u16 = 7;
    pub const TCA_STAB: u16 = 8;
    pub const TCA_PAD: u16 = 9;
}

/// TCA_STATS2 nested attributes.
pub mod tca_stats {
    pub const TCA_STATS_UNSPEC: u16 = 0;
    pub const TCA_STATS_BASIC: u16 = 1;
    pub const TCA_STATS_RATE_EST: u16 = 2;
    pub const TCA_STATS_QUEUE: u16 = 3;
    pub const TCA_STATS_APP: u16 = 4;
    pub const TCA_STATS_RATE_EST64: u16 = 5;
    pub const TCA_STATS_PAD: u16 = 6;
    pub const TCA_STATS_BASIC_HW: u16 = 7;
    pub const TCA_STATS_PKT64: u16 = 8;
}

// ============================================================================
// Rate spec (shared by HTB)
// ============================================================================

/// Link layer encoded in `tc_ratespec.linklayer`.
pub const TC_LINKLAYER_ETHERNET: u8 = 1;

/// struct tc_ratespec.
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct TcRateSpec {
    pub cell_log: u8,
    pub linklayer: u8,
    pub overhead: u16,
    pub cell_align: i16,
    pub mpu: u16,
    /// Bytes per second (saturated at u32::MAX; see the 64-bit attributes).
    pub rate: u32,
}

// ============================================================================
// HTB
// ============================================================================

/// HTB attributes.
pub mod htb {
    pub const TCA_HTB_UNSPEC: u16 = 0;
    pub const TCA_HTB_PARMS: u16 = 1;
    pub const TCA_HTB_INIT: u16 = 2;
    pub const TCA_HTB_CTAB: u16 = 3;
    pub const TCA_HTB_RTAB: u16 = 4;
    pub const TCA_HTB_DIRECT_QLEN: u16 = 5;
    pub const TCA_HTB_RATE64: u16 = 6;
    pub const TCA_HTB_CEIL64: u16 = 7;

    /// Protocol version expected by the kernel.
    pub const TC_HTB_PROTOVER: u32 = 3;
    /// Default rate to quantum divisor.
    pub const TC_HTB_RATE2QUANTUM: u32 = 10;
}

/// struct tc_htb_opt (class parameters).
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct TcHtbOpt {
    pub rate: TcRateSpec,
    pub ceil: TcRateSpec,
    /// Ticks.
    pub buffer: u32,
    /// Ticks.
    pub cbuffer: u32,
    pub quantum: u32,
    pub level: u32,
    pub prio: u32,
}

/// struct tc_htb_glob (qdisc parameters).
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct TcHtbGlob {
    pub version: u32,
    pub rate2quantum: u32,
    pub defcls: u32,
    pub debug: u32,
    pub direct_pkts: u32,
}

// ============================================================================
// NETEM
// ============================================================================

/// NETEM attributes, carried after `tc_netem_qopt` inside TCA_OPTIONS.
pub mod netem {
    pub const TCA_NETEM_UNSPEC: u16 = 0;
    pub const TCA_NETEM_CORR: u16 = 1;
    pub const TCA_NETEM_DELAY_DIST: u16 = 2;
    pub const TCA_NETEM_REORDER: u16 = 3;
    pub const TCA_NETEM_CORRUPT: u16 = 4;
    pub const TCA_NETEM_LOSS: u16 = 5;
    pub const TCA_NETEM_RATE: u16 = 6;
    pub const TCA_NETEM_ECN: u16 = 7;
    pub const TCA_NETEM_RATE64: u16 = 8;
    pub const TCA_NETEM_PAD: u16 = 9;
    pub const TCA_NETEM_LATENCY64: u16 = 10;
    pub const TCA_NETEM_JITTER64: u16 = 11;
    pub const TCA_NETEM_SLOT: u16 = 12;
}

/// struct tc_netem_qopt.
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct TcNetemQopt {
    /// Added delay (ticks).
    pub latency: u32,
    /// FIFO limit (packets).
    pub limit: u32,
    /// Random packet loss (0 = none, u32::MAX = 100%).
    pub loss: u32,
    /// Re-ordering gap (0 for none).
    pub gap: u32,
    /// Random packet duplication.
    pub duplicate: u32,
    /// Random jitter in latency (ticks).
    pub jitter: u32,
}

impl TcNetemQopt {
    /// Size of this structure.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// struct tc_netem_corr.
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct TcNetemCorr {
    pub delay_corr: u32,
    pub loss_corr: u32,
    pub dup_corr: u32,
}

/// struct tc_netem_reorder.
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct TcNetemReorder {
    pub probability: u32,
    pub correlation: u32,
}

/// struct tc_netem_corrupt.
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct TcNetemCorrupt {
    pub probability: u32,
    pub correlation: u32,
}

/// struct tc_netem_rate.
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct TcNetemRate {
    /// Bytes per second (saturated, see TCA_NETEM_RATE64).
    pub rate: u32,
    pub packet_overhead: i32,
    pub cell_size: u32,
    pub cell_overhead: i32,
}

// ============================================================================
// HFSC
// ============================================================================

/// HFSC class attributes.
pub mod hfsc {
    pub const TCA_HFSC_UNSPEC: u16 = 0;
    pub const TCA_HFSC_RSC: u16 = 1;
    pub const TCA_HFSC_FSC: u16 = 2;
    pub const TCA_HFSC_USC: u16 = 3;
}

/// struct tc_service_curve.
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct TcServiceCurve {
    /// Slope of the first segment (bytes/s).
    pub m1: u32,
    /// x-projection of the first segment (µs).
    pub d: u32,
    /// Slope of the second segment (bytes/s).
    pub m2: u32,
}

/// struct tc_hfsc_qopt.
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct TcHfscQopt {
    pub defcls: u16,
}

// ============================================================================
// PRIO / pfifo_fast
// ============================================================================

/// Number of priority map entries (TC_PRIO_MAX + 1).
pub const TC_PRIO_MAP_LEN: usize = 16;

/// struct tc_prio_qopt.
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct TcPrioQopt {
    pub bands: i32,
    pub priomap: [u8; TC_PRIO_MAP_LEN],
}
