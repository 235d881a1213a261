//! Packet scheduler clock.
//!
//! The kernel expresses TC time values (HTB buffers, netem latency) in
//! scheduler ticks. `/proc/net/psched` publishes the conversion as four
//! hex words: `t2us us2t clock_res hz`.

use std::str::FromStr;

use super::error::{Error, Result};

/// Microseconds per second, the user-facing time unit.
pub const TIME_UNITS_PER_SEC: f64 = 1_000_000.0;

/// Location of the scheduler clock parameters.
pub const PSCHED_PATH: &str = "/proc/net/psched";

/// Tick/time conversion parameters of the running kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PschedClock {
    tick_in_usec: f64,
    clock_factor: f64,
    hz: f64,
}

impl PschedClock {
    /// Read the clock from `/proc/net/psched`.
    ///
    /// Falls back to [`PschedClock::default`] with a warning when the
    /// file is missing or unparsable.
    pub fn load() -> Self {
        match std::fs::read_to_string(PSCHED_PATH)
            .map_err(Error::from)
            .and_then(|data| data.parse::<Self>())
        {
            Ok(clock) => clock,
            Err(e) => {
                tracing::warn!(path = PSCHED_PATH, error = %e, "using default psched clock");
                Self::default()
            }
        }
    }

    /// Build the clock from the four raw values.
    pub fn from_raw(t2us: u32, us2t: u32, clock_res: u32, hz: u32) -> Self {
        // Kernels reporting a nanosecond clock resolution publish a stale t2us.
        let t2us = if clock_res == 1_000_000_000 { us2t } else { t2us };
        let clock_factor = clock_res as f64 / TIME_UNITS_PER_SEC;
        let tick_in_usec = if us2t == 0 {
            1.0
        } else {
            t2us as f64 / us2t as f64 * clock_factor
        };
        let hz = if clock_res == 1_000_000 { hz as f64 } else { 100.0 };
        Self {
            tick_in_usec,
            clock_factor,
            hz,
        }
    }

    /// Ticks per microsecond.
    pub fn tick_in_usec(&self) -> f64 {
        self.tick_in_usec
    }

    /// Ratio of the kernel clock resolution to microseconds.
    pub fn clock_factor(&self) -> f64 {
        self.clock_factor
    }

    /// Timer frequency used for default HTB buffer sizing.
    pub fn hz(&self) -> f64 {
        self.hz
    }

    /// Microseconds to ticks.
    pub fn time_to_tick(&self, usec: u32) -> u32 {
        (usec as f64 * self.tick_in_usec) as u32
    }

    /// Ticks to microseconds.
    pub fn tick_to_time(&self, tick: u32) -> u32 {
        (tick as f64 / self.tick_in_usec) as u32
    }

    /// Time in ticks to send `size` bytes at `rate` bytes/s.
    pub fn xmit_time(&self, rate: u64, size: u32) -> u32 {
        if rate == 0 {
            return 0;
        }
        self.time_to_tick((TIME_UNITS_PER_SEC * (size as f64 / rate as f64)) as u32)
    }

    /// Bytes sent at `rate` bytes/s in `ticks`.
    pub fn xmit_size(&self, rate: u64, ticks: u32) -> u32 {
        let usec = ticks as f64 / self.tick_in_usec;
        (rate as f64 * usec / TIME_UNITS_PER_SEC) as u32
    }
}

/// The values current kernels publish (high resolution timers).
impl Default for PschedClock {
    fn default() -> Self {
        Self::from_raw(0x3e8, 0x40, 0x000f_4240, 0x3b9a_ca00)
    }
}

/// Parses the contents of `/proc/net/psched`.
impl FromStr for PschedClock {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let vals = s
            .split_whitespace()
            .take(4)
            .map(|word| u32::from_str_radix(word, 16))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::InvalidConfig(format!("invalid psched value: {}", e)))?;

        match vals[..] {
            [t2us, us2t, clock_res, hz] => Ok(Self::from_raw(t2us, us2t, clock_res, hz)),
            _ => Err(Error::InvalidConfig(format!(
                "psched: expected 4 values, got {}",
                vals.len()
            ))),
        }
    }
}
