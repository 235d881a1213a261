//! Ingress qdisc.

use super::QdiscAttrs;
use super::registry::QdiscKind;
use crate::netlink::error::Result;
use crate::netlink::handle::Handle;
use crate::netlink::psched::PschedClock;

/// `TCA_KIND` of the ingress qdisc.
pub const KIND: &str = "ingress";

/// Fixed handle of the ingress qdisc (`ffff:`).
pub const HANDLE: Handle = Handle::new(0xffff, 0);

/// Ingress qdisc. Takes no options.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ingress {
    pub attrs: QdiscAttrs,
}

impl Ingress {
    /// Ingress qdisc on `link_index` with its fixed handle and parent.
    pub fn new(link_index: u32) -> Self {
        Self {
            attrs: QdiscAttrs::new(link_index, HANDLE, Handle::INGRESS),
        }
    }
}

impl QdiscKind for Ingress {
    const KIND: &'static str = KIND;

    fn encode_options(&self, _clock: &PschedClock) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn decode(attrs: QdiscAttrs, _options: Option<&[u8]>, _clock: &PschedClock) -> Result<Self> {
        Ok(Self { attrs })
    }
}
