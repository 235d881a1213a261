//! Hierarchical Fair Service Curve qdisc and class.

use super::registry::{ClassKind, QdiscKind};
use super::{ClassAttrs, QdiscAttrs};
use crate::netlink::attr::{Attr, encode_attrs, parse_attrs};
use crate::netlink::error::Result;
use crate::netlink::psched::PschedClock;
use crate::netlink::types::tc::hfsc::*;
use crate::netlink::types::tc::{TcHfscQopt, TcServiceCurve, read_struct};
use zerocopy::IntoBytes;

/// `TCA_KIND` of the HFSC qdisc and its classes.
pub const KIND: &str = "hfsc";

/// HFSC root qdisc.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HfscQdisc {
    pub attrs: QdiscAttrs,
    /// Minor of the default class.
    pub defcls: u16,
}

impl HfscQdisc {
    /// HFSC qdisc with no default class.
    pub fn new(attrs: QdiscAttrs) -> Self {
        Self { attrs, defcls: 0 }
    }

    /// Set the default class minor.
    pub fn default_class(mut self, minor: u16) -> Self {
        self.defcls = minor;
        self
    }
}

impl QdiscKind for HfscQdisc {
    const KIND: &'static str = KIND;

    fn encode_options(&self, _clock: &PschedClock) -> Result<Option<Vec<u8>>> {
        let qopt = TcHfscQopt {
            defcls: self.defcls,
        };
        Ok(Some(qopt.as_bytes().to_vec()))
    }

    fn decode(attrs: QdiscAttrs, options: Option<&[u8]>, _clock: &PschedClock) -> Result<Self> {
        let defcls = match options {
            Some(data) => read_struct::<TcHfscQopt>("tc_hfsc_qopt", data)?.defcls,
            None => 0,
        };
        Ok(Self { attrs, defcls })
    }
}

/// Two-segment service curve.
///
/// Slope `m1` applies for the first `d` microseconds, `m2` afterwards.
/// Slopes are bytes/s, the unit the kernel stores. The `HfscClass`
/// setters take bits/s as tc(8) does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServiceCurve {
    pub m1: u32,
    pub d: u32,
    pub m2: u32,
}

impl ServiceCurve {
    /// Curve from its three parameters.
    pub const fn new(m1: u32, d: u32, m2: u32) -> Self {
        Self { m1, d, m2 }
    }

    /// `(m1, d, m2)`.
    pub const fn attrs(&self) -> (u32, u32, u32) {
        (self.m1, self.d, self.m2)
    }

    /// A curve with both slopes zero is not installed by the kernel.
    pub const fn is_zero(&self) -> bool {
        self.m1 == 0 && self.m2 == 0
    }

    /// Curve from bits/s slopes.
    pub const fn from_bits(m1: u32, d: u32, m2: u32) -> Self {
        Self::new(m1 / 8, d, m2 / 8)
    }

    fn to_wire(self) -> TcServiceCurve {
        TcServiceCurve {
            m1: self.m1,
            d: self.d,
            m2: self.m2,
        }
    }

    fn from_wire(sc: TcServiceCurve) -> Self {
        Self::new(sc.m1, sc.d, sc.m2)
    }
}

/// Which curve of an HFSC class to set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveSelector {
    /// Real-time curve.
    Rsc,
    /// Link-sharing curve.
    Fsc,
    /// Upper-limit curve.
    Usc,
}

/// HFSC class.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HfscClass {
    pub attrs: ClassAttrs,
    pub rsc: ServiceCurve,
    pub fsc: ServiceCurve,
    pub usc: ServiceCurve,
}

impl HfscClass {
    /// Class with all curves unset.
    pub fn new(attrs: ClassAttrs) -> Self {
        Self {
            attrs,
            rsc: ServiceCurve::default(),
            fsc: ServiceCurve::default(),
            usc: ServiceCurve::default(),
        }
    }

    /// Set one curve from bits/s slopes.
    pub fn set_sc(&mut self, which: CurveSelector, m1: u32, d: u32, m2: u32) {
        self.set_curve(which, ServiceCurve::from_bits(m1, d, m2));
    }

    /// Set one curve as stored (bytes/s).
    pub fn set_curve(&mut self, which: CurveSelector, curve: ServiceCurve) {
        match which {
            CurveSelector::Rsc => self.rsc = curve,
            CurveSelector::Fsc => self.fsc = curve,
            CurveSelector::Usc => self.usc = curve,
        }
    }

    /// Set the real-time curve.
    pub fn set_rsc(&mut self, m1: u32, d: u32, m2: u32) {
        self.set_sc(CurveSelector::Rsc, m1, d, m2);
    }

    /// Set the link-sharing curve.
    pub fn set_fsc(&mut self, m1: u32, d: u32, m2: u32) {
        self.set_sc(CurveSelector::Fsc, m1, d, m2);
    }

    /// Set the upper-limit curve.
    pub fn set_usc(&mut self, m1: u32, d: u32, m2: u32) {
        self.set_sc(CurveSelector::Usc, m1, d, m2);
    }

    /// Set real-time and link-sharing curves together (`tc ... hfsc sc`).
    pub fn set_sc_both(&mut self, m1: u32, d: u32, m2: u32) {
        self.set_rsc(m1, d, m2);
        self.set_fsc(m1, d, m2);
    }

    /// Get one curve.
    pub fn curve(&self, which: CurveSelector) -> ServiceCurve {
        match which {
            CurveSelector::Rsc => self.rsc,
            CurveSelector::Fsc => self.fsc,
            CurveSelector::Usc => self.usc,
        }
    }
}

impl ClassKind for HfscClass {
    const KIND: &'static str = KIND;

    fn encode_options(&self, _clock: &PschedClock) -> Result<Option<Vec<u8>>> {
        let curves = [
            (TCA_HFSC_RSC, self.rsc),
            (TCA_HFSC_FSC, self.fsc),
            (TCA_HFSC_USC, self.usc),
        ];
        let attrs: Vec<Attr> = curves
            .into_iter()
            .map(|(kind, sc)| Attr::leaf(kind, sc.to_wire().as_bytes()))
            .collect();
        Ok(Some(encode_attrs(&attrs)?))
    }

    fn decode(attrs: ClassAttrs, options: Option<&[u8]>, _clock: &PschedClock) -> Result<Self> {
        let mut class = Self::new(attrs);
        let Some(options) = options else {
            return Ok(class);
        };

        for (kind, payload) in parse_attrs(options)? {
            let which = match kind {
                TCA_HFSC_RSC => CurveSelector::Rsc,
                TCA_HFSC_FSC => CurveSelector::Fsc,
                TCA_HFSC_USC => CurveSelector::Usc,
                _ => continue,
            };
            let sc = ServiceCurve::from_wire(read_struct("tc_service_curve", payload)?);
            class.set_curve(which, sc);
        }
        Ok(class)
    }
}
