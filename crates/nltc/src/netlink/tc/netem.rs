//! Network emulator qdisc.
//!
//! Unlike most kinds, netem's `TCA_OPTIONS` payload starts with a fixed
//! `struct tc_netem_qopt` and only then carries nested attributes.

use std::fmt;

use super::QdiscAttrs;
use super::registry::QdiscKind;
use crate::netlink::attr::{Attr, encode_attrs, find, get, nla_align, parse_attrs};
use crate::netlink::error::{Error, Result};
use crate::netlink::psched::PschedClock;
use crate::netlink::types::tc::netem::*;
use crate::netlink::types::tc::{
    TcNetemCorr, TcNetemCorrupt, TcNetemQopt, TcNetemRate, TcNetemReorder, read_struct,
};
use zerocopy::IntoBytes;

/// `TCA_KIND` of netem.
pub const KIND: &str = "netem";

/// Default queue limit in packets.
pub const DEFAULT_LIMIT: u32 = 1000;

/// A probability in the kernel's fixed-point scale (`u32::MAX` is 100%).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Probability(u32);

impl Probability {
    /// 0%.
    pub const ZERO: Probability = Probability(0);
    /// 100%.
    pub const FULL: Probability = Probability(u32::MAX);

    /// Convert a percentage; values are clamped to 0..=100.
    pub fn from_percent(percent: f64) -> Self {
        let percent = percent.clamp(0.0, 100.0);
        if percent >= 100.0 {
            return Self::FULL;
        }
        Self((u32::MAX as f64 * (percent / 100.0)) as u32)
    }

    /// Wrap a raw kernel value.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw kernel value.
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Value as a percentage.
    pub fn percent(self) -> f64 {
        self.0 as f64 / u32::MAX as f64 * 100.0
    }

    /// Check for 0%.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}%", self.percent())
    }
}

/// User-facing netem parameters.
///
/// Times are microseconds, probabilities percentages.
///
/// # Example
///
/// ```ignore
/// use nltc::netlink::tc::{Netem, NetemConfig, QdiscAttrs};
///
/// let config = NetemConfig::new()
///     .latency(20_000)
///     .jitter(1_000)
///     .delay_correlation(12.3)
///     .loss(23.4)
///     .loss_correlation(8.34);
/// let netem = Netem::new(attrs, &config)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NetemConfig {
    pub latency: u32,
    pub jitter: u32,
    pub limit: u32,
    pub gap: u32,
    pub loss: f64,
    pub loss_correlation: f64,
    pub duplicate: f64,
    pub duplicate_correlation: f64,
    pub delay_correlation: f64,
    pub reorder: f64,
    pub reorder_correlation: f64,
    pub corrupt: f64,
    pub corrupt_correlation: f64,
    /// Rate limit in bytes/s.
    pub rate: Option<u64>,
}

impl Default for NetemConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl NetemConfig {
    /// Empty configuration with the default limit.
    pub fn new() -> Self {
        Self {
            latency: 0,
            jitter: 0,
            limit: DEFAULT_LIMIT,
            gap: 0,
            loss: 0.0,
            loss_correlation: 0.0,
            duplicate: 0.0,
            duplicate_correlation: 0.0,
            delay_correlation: 0.0,
            reorder: 0.0,
            reorder_correlation: 0.0,
            corrupt: 0.0,
            corrupt_correlation: 0.0,
            rate: None,
        }
    }

    /// Set the added delay (µs).
    pub fn latency(mut self, usec: u32) -> Self {
        self.latency = usec;
        self
    }

    /// Set the delay jitter (µs).
    pub fn jitter(mut self, usec: u32) -> Self {
        self.jitter = usec;
        self
    }

    /// Set the queue limit in packets (0 keeps the default).
    pub fn limit(mut self, packets: u32) -> Self {
        self.limit = packets;
        self
    }

    /// Set the reorder gap.
    pub fn gap(mut self, gap: u32) -> Self {
        self.gap = gap;
        self
    }

    /// Set the packet loss percentage.
    pub fn loss(mut self, percent: f64) -> Self {
        self.loss = percent;
        self
    }

    /// Set the loss correlation percentage.
    pub fn loss_correlation(mut self, percent: f64) -> Self {
        self.loss_correlation = percent;
        self
    }

    /// Set the duplication percentage.
    pub fn duplicate(mut self, percent: f64) -> Self {
        self.duplicate = percent;
        self
    }

    /// Set the duplication correlation percentage.
    pub fn duplicate_correlation(mut self, percent: f64) -> Self {
        self.duplicate_correlation = percent;
        self
    }

    /// Set the delay correlation percentage.
    pub fn delay_correlation(mut self, percent: f64) -> Self {
        self.delay_correlation = percent;
        self
    }

    /// Set the reordering percentage. Requires a latency.
    pub fn reorder(mut self, percent: f64) -> Self {
        self.reorder = percent;
        self
    }

    /// Set the reordering correlation percentage.
    pub fn reorder_correlation(mut self, percent: f64) -> Self {
        self.reorder_correlation = percent;
        self
    }

    /// Set the corruption percentage.
    pub fn corrupt(mut self, percent: f64) -> Self {
        self.corrupt = percent;
        self
    }

    /// Set the corruption correlation percentage.
    pub fn corrupt_correlation(mut self, percent: f64) -> Self {
        self.corrupt_correlation = percent;
        self
    }

    /// Set the rate limit in bytes/s.
    pub fn rate(mut self, bytes_per_sec: u64) -> Self {
        self.rate = Some(bytes_per_sec);
        self
    }
}

/// Netem qdisc in kernel units.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Netem {
    pub attrs: QdiscAttrs,
    /// Added delay (µs).
    pub latency: u32,
    /// Delay jitter (µs).
    pub jitter: u32,
    pub limit: u32,
    pub gap: u32,
    pub loss: Probability,
    pub loss_corr: Probability,
    pub duplicate: Probability,
    pub duplicate_corr: Probability,
    pub delay_corr: Probability,
    pub reorder_prob: Probability,
    pub reorder_corr: Probability,
    pub corrupt_prob: Probability,
    pub corrupt_corr: Probability,
    /// Rate limit in bytes/s.
    pub rate: Option<u64>,
}

impl Netem {
    /// Build a netem qdisc, applying the kernel's parameter rules.
    ///
    /// Correlations are dropped when the value they correlate is unset,
    /// reordering forces a gap of at least 1 and an unset limit becomes
    /// [`DEFAULT_LIMIT`]. Reordering without a latency is rejected.
    pub fn new(attrs: QdiscAttrs, config: &NetemConfig) -> Result<Self> {
        let loss = Probability::from_percent(config.loss);
        let duplicate = Probability::from_percent(config.duplicate);
        let reorder_prob = Probability::from_percent(config.reorder);

        if !reorder_prob.is_zero() && config.latency == 0 {
            return Err(Error::InvalidConfig(
                "netem: reordering requires a latency".into(),
            ));
        }

        let delay_corr = if config.latency > 0 && config.jitter > 0 {
            Probability::from_percent(config.delay_correlation)
        } else {
            Probability::ZERO
        };
        let loss_corr = if loss.is_zero() {
            Probability::ZERO
        } else {
            Probability::from_percent(config.loss_correlation)
        };
        let duplicate_corr = if duplicate.is_zero() {
            Probability::ZERO
        } else {
            Probability::from_percent(config.duplicate_correlation)
        };
        let gap = if !reorder_prob.is_zero() && config.gap == 0 {
            1
        } else {
            config.gap
        };

        Ok(Self {
            attrs,
            latency: config.latency,
            jitter: config.jitter,
            limit: if config.limit == 0 {
                DEFAULT_LIMIT
            } else {
                config.limit
            },
            gap,
            loss,
            loss_corr,
            duplicate,
            duplicate_corr,
            delay_corr,
            reorder_prob,
            reorder_corr: Probability::from_percent(config.reorder_correlation),
            corrupt_prob: Probability::from_percent(config.corrupt),
            corrupt_corr: Probability::from_percent(config.corrupt_correlation),
            rate: config.rate,
        })
    }

    fn empty(attrs: QdiscAttrs) -> Self {
        Self {
            attrs,
            latency: 0,
            jitter: 0,
            limit: 0,
            gap: 0,
            loss: Probability::ZERO,
            loss_corr: Probability::ZERO,
            duplicate: Probability::ZERO,
            duplicate_corr: Probability::ZERO,
            delay_corr: Probability::ZERO,
            reorder_prob: Probability::ZERO,
            reorder_corr: Probability::ZERO,
            corrupt_prob: Probability::ZERO,
            corrupt_corr: Probability::ZERO,
            rate: None,
        }
    }
}

impl QdiscKind for Netem {
    const KIND: &'static str = KIND;

    fn encode_options(&self, clock: &PschedClock) -> Result<Option<Vec<u8>>> {
        if !self.reorder_prob.is_zero() && self.latency == 0 {
            return Err(Error::InvalidConfig(
                "netem: reordering requires a latency".into(),
            ));
        }

        let qopt = TcNetemQopt {
            latency: clock.time_to_tick(self.latency),
            limit: self.limit,
            loss: self.loss.as_raw(),
            gap: self.gap,
            duplicate: self.duplicate.as_raw(),
            jitter: clock.time_to_tick(self.jitter),
        };

        let mut attrs = Vec::new();
        if !self.delay_corr.is_zero() || !self.loss_corr.is_zero() || !self.duplicate_corr.is_zero()
        {
            let corr = TcNetemCorr {
                delay_corr: self.delay_corr.as_raw(),
                loss_corr: self.loss_corr.as_raw(),
                dup_corr: self.duplicate_corr.as_raw(),
            };
            attrs.push(Attr::leaf(TCA_NETEM_CORR, corr.as_bytes()));
        }
        if !self.reorder_prob.is_zero() {
            let reorder = TcNetemReorder {
                probability: self.reorder_prob.as_raw(),
                correlation: self.reorder_corr.as_raw(),
            };
            attrs.push(Attr::leaf(TCA_NETEM_REORDER, reorder.as_bytes()));
        }
        if !self.corrupt_prob.is_zero() {
            let corrupt = TcNetemCorrupt {
                probability: self.corrupt_prob.as_raw(),
                correlation: self.corrupt_corr.as_raw(),
            };
            attrs.push(Attr::leaf(TCA_NETEM_CORRUPT, corrupt.as_bytes()));
        }
        if let Some(rate) = self.rate {
            let spec = TcNetemRate {
                rate: rate.min(u32::MAX as u64) as u32,
                ..Default::default()
            };
            attrs.push(Attr::leaf(TCA_NETEM_RATE, spec.as_bytes()));
            if rate > u32::MAX as u64 {
                attrs.push(Attr::u64(TCA_NETEM_RATE64, rate));
            }
        }

        let mut payload = qopt.as_bytes().to_vec();
        payload.extend_from_slice(&encode_attrs(&attrs)?);
        Ok(Some(payload))
    }

    fn decode(attrs: QdiscAttrs, options: Option<&[u8]>, clock: &PschedClock) -> Result<Self> {
        let mut netem = Self::empty(attrs);
        let Some(options) = options else {
            return Ok(netem);
        };

        let qopt: TcNetemQopt = read_struct("tc_netem_qopt", options)?;
        netem.latency = clock.tick_to_time(qopt.latency);
        netem.jitter = clock.tick_to_time(qopt.jitter);
        netem.limit = qopt.limit;
        netem.gap = qopt.gap;
        netem.loss = Probability::from_raw(qopt.loss);
        netem.duplicate = Probability::from_raw(qopt.duplicate);

        let rest = options.get(nla_align(TcNetemQopt::SIZE)..).unwrap_or(&[]);
        let nested = parse_attrs(rest)?;

        if let Some(payload) = find(&nested, TCA_NETEM_CORR) {
            let corr: TcNetemCorr = read_struct("tc_netem_corr", payload)?;
            netem.delay_corr = Probability::from_raw(corr.delay_corr);
            netem.loss_corr = Probability::from_raw(corr.loss_corr);
            netem.duplicate_corr = Probability::from_raw(corr.dup_corr);
        }
        if let Some(payload) = find(&nested, TCA_NETEM_REORDER) {
            let reorder: TcNetemReorder = read_struct("tc_netem_reorder", payload)?;
            netem.reorder_prob = Probability::from_raw(reorder.probability);
            netem.reorder_corr = Probability::from_raw(reorder.correlation);
        }
        if let Some(payload) = find(&nested, TCA_NETEM_CORRUPT) {
            let corrupt: TcNetemCorrupt = read_struct("tc_netem_corrupt", payload)?;
            netem.corrupt_prob = Probability::from_raw(corrupt.probability);
            netem.corrupt_corr = Probability::from_raw(corrupt.correlation);
        }
        if let Some(payload) = find(&nested, TCA_NETEM_RATE) {
            let spec: TcNetemRate = read_struct("tc_netem_rate", payload)?;
            if spec.rate != 0 {
                netem.rate = Some(spec.rate as u64);
            }
        }
        if let Some(payload) = find(&nested, TCA_NETEM_RATE64) {
            netem.rate = Some(get::u64_ne(payload)?);
        }
        Ok(netem)
    }
}
