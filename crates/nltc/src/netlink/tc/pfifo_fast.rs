//! pfifo_fast, the kernel's default three-band qdisc.

use super::QdiscAttrs;
use super::registry::QdiscKind;
use crate::netlink::error::Result;
use crate::netlink::psched::PschedClock;
use crate::netlink::types::tc::{TC_PRIO_MAP_LEN, TcPrioQopt, read_struct};
use zerocopy::IntoBytes;

/// `TCA_KIND` of pfifo_fast.
pub const KIND: &str = "pfifo_fast";

/// Number of bands.
pub const DEFAULT_BANDS: i32 = 3;

/// Default mapping of packet priority to band.
pub const DEFAULT_PRIOMAP: [u8; TC_PRIO_MAP_LEN] = [1, 2, 2, 2, 1, 2, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1];

/// pfifo_fast qdisc.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PfifoFast {
    pub attrs: QdiscAttrs,
    pub bands: i32,
    pub priomap: [u8; TC_PRIO_MAP_LEN],
}

impl PfifoFast {
    /// pfifo_fast with the kernel's fixed bands and priority map.
    pub fn new(attrs: QdiscAttrs) -> Self {
        Self {
            attrs,
            bands: DEFAULT_BANDS,
            priomap: DEFAULT_PRIOMAP,
        }
    }
}

impl QdiscKind for PfifoFast {
    const KIND: &'static str = KIND;

    fn encode_options(&self, _clock: &PschedClock) -> Result<Option<Vec<u8>>> {
        let qopt = TcPrioQopt {
            bands: self.bands,
            priomap: self.priomap,
        };
        Ok(Some(qopt.as_bytes().to_vec()))
    }

    fn decode(attrs: QdiscAttrs, options: Option<&[u8]>, _clock: &PschedClock) -> Result<Self> {
        let Some(options) = options else {
            return Ok(Self::new(attrs));
        };
        let qopt: TcPrioQopt = read_struct("tc_prio_qopt", options)?;
        Ok(Self {
            attrs,
            bands: qopt.bands,
            priomap: qopt.priomap,
        })
    }
}
