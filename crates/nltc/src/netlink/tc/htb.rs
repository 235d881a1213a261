//! Hierarchical Token Bucket qdisc and class.

use super::registry::{ClassKind, QdiscKind};
use super::{ClassAttrs, QdiscAttrs};
use crate::netlink::attr::{Attr, encode_attrs, find, get, parse_attrs};
use crate::netlink::error::{Error, Result};
use crate::netlink::psched::PschedClock;
use crate::netlink::types::tc::htb::*;
use crate::netlink::types::tc::{
    TC_LINKLAYER_ETHERNET, TcHtbGlob, TcHtbOpt, TcRateSpec, read_struct,
};
use zerocopy::IntoBytes;

/// `TCA_KIND` of the HTB qdisc.
pub const QDISC_KIND: &str = "htb";
/// `TCA_KIND` of HTB classes.
pub const CLASS_KIND: &str = "htb";

/// MTU assumed for default bursts and rate tables, like tc(8).
pub const DEFAULT_MTU: u32 = 1600;

/// Number of slots in a kernel rate table.
pub const RTAB_SIZE: usize = 256;

// ============================================================================
// Qdisc
// ============================================================================

/// HTB root qdisc.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HtbQdisc {
    pub attrs: QdiscAttrs,
    pub version: u32,
    pub rate2quantum: u32,
    /// Minor of the class unclassified traffic goes to (0 = direct).
    pub defcls: u32,
    pub debug: u32,
    /// Packets sent directly (read back only).
    pub direct_pkts: u32,
    /// Length of the direct queue; kernel default when `None`.
    pub direct_qlen: Option<u32>,
}

impl HtbQdisc {
    /// HTB qdisc with kernel defaults (version 3, r2q 10).
    pub fn new(attrs: QdiscAttrs) -> Self {
        Self {
            attrs,
            version: TC_HTB_PROTOVER,
            rate2quantum: TC_HTB_RATE2QUANTUM,
            defcls: 0,
            debug: 0,
            direct_pkts: 0,
            direct_qlen: None,
        }
    }

    /// Set the default class minor.
    pub fn default_class(mut self, minor: u32) -> Self {
        self.defcls = minor;
        self
    }

    /// Set the rate to quantum divisor.
    pub fn r2q(mut self, r2q: u32) -> Self {
        self.rate2quantum = r2q;
        self
    }

    /// Set the direct queue length.
    pub fn direct_qlen(mut self, qlen: u32) -> Self {
        self.direct_qlen = Some(qlen);
        self
    }
}

impl QdiscKind for HtbQdisc {
    const KIND: &'static str = QDISC_KIND;

    fn encode_options(&self, _clock: &PschedClock) -> Result<Option<Vec<u8>>> {
        let glob = TcHtbGlob {
            version: self.version,
            rate2quantum: self.rate2quantum,
            defcls: self.defcls,
            debug: self.debug,
            direct_pkts: self.direct_pkts,
        };
        let mut attrs = vec![Attr::leaf(TCA_HTB_INIT, glob.as_bytes())];
        if let Some(qlen) = self.direct_qlen {
            attrs.push(Attr::u32(TCA_HTB_DIRECT_QLEN, qlen));
        }
        Ok(Some(encode_attrs(&attrs)?))
    }

    fn decode(attrs: QdiscAttrs, options: Option<&[u8]>, _clock: &PschedClock) -> Result<Self> {
        let mut qdisc = Self::new(attrs);
        let Some(options) = options else {
            return Ok(qdisc);
        };

        for (kind, payload) in parse_attrs(options)? {
            match kind {
                TCA_HTB_INIT => {
                    let glob: TcHtbGlob = read_struct("tc_htb_glob", payload)?;
                    qdisc.version = glob.version;
                    qdisc.rate2quantum = glob.rate2quantum;
                    qdisc.defcls = glob.defcls;
                    qdisc.debug = glob.debug;
                    qdisc.direct_pkts = glob.direct_pkts;
                }
                TCA_HTB_DIRECT_QLEN => qdisc.direct_qlen = Some(get::u32_ne(payload)?),
                _ => {}
            }
        }
        Ok(qdisc)
    }
}

// ============================================================================
// Class
// ============================================================================

/// User-facing HTB class parameters, in tc(8) units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtbClassParams {
    /// Guaranteed rate in bits/s.
    pub rate: u64,
    /// Ceiling in bits/s; defaults to `rate`.
    pub ceil: Option<u64>,
    /// Burst in bytes; 0 derives it from rate and MTU.
    pub buffer: u32,
    /// Ceil burst in bytes; 0 derives it from ceil and MTU.
    pub cbuffer: u32,
    pub quantum: u32,
    pub prio: u32,
}

impl HtbClassParams {
    /// Parameters for a class guaranteed `rate_bits` bits/s.
    pub fn new(rate_bits: u64) -> Self {
        Self {
            rate: rate_bits,
            ceil: None,
            buffer: 0,
            cbuffer: 0,
            quantum: 0,
            prio: 0,
        }
    }

    /// Set the ceiling in bits/s.
    pub fn ceil(mut self, ceil_bits: u64) -> Self {
        self.ceil = Some(ceil_bits);
        self
    }

    /// Set the burst in bytes.
    pub fn buffer(mut self, bytes: u32) -> Self {
        self.buffer = bytes;
        self
    }

    /// Set the ceil burst in bytes.
    pub fn cbuffer(mut self, bytes: u32) -> Self {
        self.cbuffer = bytes;
        self
    }

    /// Set the quantum in bytes.
    pub fn quantum(mut self, bytes: u32) -> Self {
        self.quantum = bytes;
        self
    }

    /// Set the priority (0 is highest).
    pub fn prio(mut self, prio: u32) -> Self {
        self.prio = prio;
        self
    }
}

/// HTB class in kernel units.
///
/// `rate`/`ceil` are bytes/s, `buffer`/`cbuffer` scheduler ticks. These
/// are exactly what the kernel stores and reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HtbClass {
    pub attrs: ClassAttrs,
    pub rate: u64,
    pub ceil: u64,
    pub buffer: u32,
    pub cbuffer: u32,
    pub quantum: u32,
    pub level: u32,
    pub prio: u32,
}

impl HtbClass {
    /// Convert tc(8)-style parameters into kernel units.
    pub fn new(attrs: ClassAttrs, params: &HtbClassParams, clock: &PschedClock) -> Self {
        let rate = params.rate / 8;
        let ceil = params.ceil.map(|c| c / 8).filter(|&c| c != 0).unwrap_or(rate);

        let default_burst = |r: u64| (r as f64 / clock.hz() + DEFAULT_MTU as f64) as u32;
        let buffer = match params.buffer {
            0 => default_burst(rate),
            b => b,
        };
        let cbuffer = match params.cbuffer {
            0 => default_burst(ceil),
            b => b,
        };

        Self {
            attrs,
            rate,
            ceil,
            buffer: clock.xmit_time(rate, buffer),
            cbuffer: clock.xmit_time(ceil, cbuffer),
            quantum: params.quantum,
            level: 0,
            prio: params.prio,
        }
    }

    /// Burst in bytes implied by `buffer` at `rate`.
    pub fn buffer_bytes(&self, clock: &PschedClock) -> u32 {
        clock.xmit_size(self.rate, self.buffer)
    }

    /// Ceil burst in bytes implied by `cbuffer` at `ceil`.
    pub fn cbuffer_bytes(&self, clock: &PschedClock) -> u32 {
        clock.xmit_size(self.ceil, self.cbuffer)
    }
}

/// Compute a kernel rate table for `rate` bytes/s.
///
/// Fills in `cell_log`, `cell_align` and `linklayer` of `spec`, like
/// tc's `tc_calc_rtable` with an Ethernet link layer.
pub fn calc_rtable(spec: &mut TcRateSpec, rate: u64, mtu: u32, clock: &PschedClock) -> Vec<u8> {
    let mtu = if mtu == 0 { 2047 } else { mtu };
    let mut cell_log = 0u8;
    while (mtu >> cell_log) > 255 {
        cell_log += 1;
    }

    let mut table = Vec::with_capacity(RTAB_SIZE * 4);
    for i in 0..RTAB_SIZE as u32 {
        let size = ((i + 1) << cell_log).max(spec.mpu as u32);
        table.extend_from_slice(&clock.xmit_time(rate, size).to_ne_bytes());
    }

    spec.cell_align = -1;
    spec.cell_log = cell_log;
    spec.linklayer = TC_LINKLAYER_ETHERNET;
    table
}

fn rate32(rate: u64) -> u32 {
    rate.min(u32::MAX as u64) as u32
}

impl ClassKind for HtbClass {
    const KIND: &'static str = CLASS_KIND;

    fn encode_options(&self, clock: &PschedClock) -> Result<Option<Vec<u8>>> {
        let mut opt = TcHtbOpt {
            rate: TcRateSpec {
                rate: rate32(self.rate),
                ..Default::default()
            },
            ceil: TcRateSpec {
                rate: rate32(self.ceil),
                ..Default::default()
            },
            buffer: self.buffer,
            cbuffer: self.cbuffer,
            quantum: self.quantum,
            level: self.level,
            prio: self.prio,
        };
        let rtab = calc_rtable(&mut opt.rate, self.rate, DEFAULT_MTU, clock);
        let ctab = calc_rtable(&mut opt.ceil, self.ceil, DEFAULT_MTU, clock);

        let mut attrs = vec![
            Attr::leaf(TCA_HTB_PARMS, opt.as_bytes()),
            Attr::leaf(TCA_HTB_RTAB, rtab),
            Attr::leaf(TCA_HTB_CTAB, ctab),
        ];
        if self.rate > u32::MAX as u64 {
            attrs.push(Attr::u64(TCA_HTB_RATE64, self.rate));
        }
        if self.ceil > u32::MAX as u64 {
            attrs.push(Attr::u64(TCA_HTB_CEIL64, self.ceil));
        }
        Ok(Some(encode_attrs(&attrs)?))
    }

    fn decode(attrs: ClassAttrs, options: Option<&[u8]>, _clock: &PschedClock) -> Result<Self> {
        let mut class = Self {
            attrs,
            rate: 0,
            ceil: 0,
            buffer: 0,
            cbuffer: 0,
            quantum: 0,
            level: 0,
            prio: 0,
        };
        let Some(options) = options else {
            return Ok(class);
        };

        let nested = parse_attrs(options)?;
        let payload = find(&nested, TCA_HTB_PARMS).ok_or_else(|| {
            Error::InvalidWireFormat("htb class options without TCA_HTB_PARMS".into())
        })?;
        let opt: TcHtbOpt = read_struct("tc_htb_opt", payload)?;
        class.rate = opt.rate.rate as u64;
        class.ceil = opt.ceil.rate as u64;
        class.buffer = opt.buffer;
        class.cbuffer = opt.cbuffer;
        class.quantum = opt.quantum;
        class.level = opt.level;
        class.prio = opt.prio;

        if let Some(payload) = find(&nested, TCA_HTB_RATE64) {
            class.rate = get::u64_ne(payload)?;
        }
        if let Some(payload) = find(&nested, TCA_HTB_CEIL64) {
            class.ceil = get::u64_ne(payload)?;
        }
        Ok(class)
    }
}
