//! Qdisc and class statistics.
//!
//! The kernel reports counters in the nested `TCA_STATS2` attribute and,
//! for old consumers, in the flat `struct tc_stats` under `TCA_STATS`.
//! Both decode into [`ClassStatistics`], which is always fully
//! materialized: blocks the kernel did not send stay at zero.

use super::attr::{find, get, parse_attrs};
use super::error::{Error, Result};
use super::types::tc::{tca, tca_stats};

/// Basic counters (struct gnet_stats_basic).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatsBasic {
    /// Bytes transmitted.
    pub bytes: u64,
    /// Packets transmitted.
    pub packets: u64,
}

impl StatsBasic {
    /// Difference from a previous sample, saturating on counter resets.
    pub fn delta(&self, previous: &Self) -> Self {
        Self {
            bytes: self.bytes.saturating_sub(previous.bytes),
            packets: self.packets.saturating_sub(previous.packets),
        }
    }
}

/// Queue counters (struct gnet_stats_queue).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatsQueue {
    /// Current queue length in packets.
    pub qlen: u32,
    /// Backlog in bytes.
    pub backlog: u32,
    /// Total drops.
    pub drops: u32,
    /// Requeue count.
    pub requeues: u32,
    /// Overlimit count.
    pub overlimits: u32,
}

impl StatsQueue {
    /// Difference from a previous sample.
    ///
    /// `qlen` and `backlog` are instantaneous values and are taken from
    /// the current sample.
    pub fn delta(&self, previous: &Self) -> Self {
        Self {
            qlen: self.qlen,
            backlog: self.backlog,
            drops: self.drops.saturating_sub(previous.drops),
            requeues: self.requeues.saturating_sub(previous.requeues),
            overlimits: self.overlimits.saturating_sub(previous.overlimits),
        }
    }
}

/// Rate estimator (struct gnet_stats_rate_est).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatsRateEst {
    /// Bytes per second.
    pub bps: u64,
    /// Packets per second.
    pub pps: u64,
}

/// Statistics of a class or qdisc.
///
/// [`ClassStatistics::new`] is the zero baseline a class reports before
/// it has seen any traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassStatistics {
    pub basic: StatsBasic,
    pub queue: StatsQueue,
    pub rate_est: StatsRateEst,
    /// Hardware-offloaded share of `basic`.
    pub basic_hw: StatsBasic,
}

/// Qdiscs report the same record.
pub type QdiscStatistics = ClassStatistics;

impl ClassStatistics {
    /// All-zero statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes transmitted.
    pub fn bytes(&self) -> u64 {
        self.basic.bytes
    }

    /// Packets transmitted.
    pub fn packets(&self) -> u64 {
        self.basic.packets
    }

    /// Total drops.
    pub fn drops(&self) -> u32 {
        self.queue.drops
    }

    /// Overlimit count.
    pub fn overlimits(&self) -> u32 {
        self.queue.overlimits
    }

    /// Difference from a previous sample of the same object.
    pub fn delta(&self, previous: &Self) -> Self {
        Self {
            basic: self.basic.delta(&previous.basic),
            queue: self.queue.delta(&previous.queue),
            rate_est: self.rate_est,
            basic_hw: self.basic_hw.delta(&previous.basic_hw),
        }
    }

    /// Decode from the top-level attributes of a qdisc/class message.
    ///
    /// `TCA_STATS2` wins when present; the legacy `TCA_STATS` block is
    /// used otherwise. With neither, the zero baseline is returned.
    pub fn from_attrs(attrs: &[(u16, &[u8])]) -> Result<Self> {
        if let Some(data) = find(attrs, tca::TCA_STATS2) {
            return Self::from_stats2(data);
        }
        if let Some(data) = find(attrs, tca::TCA_STATS) {
            return Self::from_legacy(data);
        }
        Ok(Self::new())
    }

    /// Decode a `TCA_STATS2` payload.
    pub fn from_stats2(data: &[u8]) -> Result<Self> {
        let mut stats = Self::new();
        let mut pkt64 = None;

        for (kind, payload) in parse_attrs(data)? {
            match kind {
                tca_stats::TCA_STATS_BASIC => stats.basic = parse_basic(payload)?,
                tca_stats::TCA_STATS_BASIC_HW => stats.basic_hw = parse_basic(payload)?,
                tca_stats::TCA_STATS_PKT64 => pkt64 = Some(get::u64_ne(payload)?),
                tca_stats::TCA_STATS_QUEUE => stats.queue = parse_queue(payload)?,
                tca_stats::TCA_STATS_RATE_EST => {
                    require_len("gnet_stats_rate_est", payload, 8)?;
                    stats.rate_est = StatsRateEst {
                        bps: get::u32_ne(payload)? as u64,
                        pps: get::u32_ne(&payload[4..])? as u64,
                    };
                }
                tca_stats::TCA_STATS_RATE_EST64 => {
                    require_len("gnet_stats_rate_est64", payload, 16)?;
                    stats.rate_est = StatsRateEst {
                        bps: get::u64_ne(payload)?,
                        pps: get::u64_ne(&payload[8..])?,
                    };
                }
                _ => {}
            }
        }

        if let Some(packets) = pkt64 {
            stats.basic.packets = packets;
        }
        Ok(stats)
    }

    /// Decode a legacy `struct tc_stats` payload.
    pub fn from_legacy(data: &[u8]) -> Result<Self> {
        require_len("tc_stats", data, 36)?;
        let word = |i: usize| get::u32_ne(&data[8 + i * 4..]);
        Ok(Self {
            basic: StatsBasic {
                bytes: get::u64_ne(data)?,
                packets: word(0)? as u64,
            },
            queue: StatsQueue {
                drops: word(1)?,
                overlimits: word(2)?,
                qlen: word(5)?,
                backlog: word(6)?,
                requeues: 0,
            },
            rate_est: StatsRateEst {
                bps: word(3)? as u64,
                pps: word(4)? as u64,
            },
            basic_hw: StatsBasic::default(),
        })
    }
}

fn require_len(what: &str, data: &[u8], len: usize) -> Result<()> {
    if data.len() < len {
        return Err(Error::truncated(what, len, data.len()));
    }
    Ok(())
}

fn parse_basic(data: &[u8]) -> Result<StatsBasic> {
    require_len("gnet_stats_basic", data, 12)?;
    Ok(StatsBasic {
        bytes: get::u64_ne(data)?,
        packets: get::u32_ne(&data[8..])? as u64,
    })
}

fn parse_queue(data: &[u8]) -> Result<StatsQueue> {
    require_len("gnet_stats_queue", data, 20)?;
    Ok(StatsQueue {
        qlen: get::u32_ne(data)?,
        backlog: get::u32_ne(&data[4..])?,
        drops: get::u32_ne(&data[8..])?,
        requeues: get::u32_ne(&data[12..])?,
        overlimits: get::u32_ne(&data[16..])?,
    })
}
