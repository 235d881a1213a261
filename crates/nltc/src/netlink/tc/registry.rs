//! Kind registry: maps `TCA_KIND` strings to per-kind codecs.
//!
//! Each modelled kind implements [`QdiscKind`] or [`ClassKind`]. Encoding
//! dispatches on the enum variant; decoding looks the kind string up in
//! a static table and falls back to the generic variant for kinds that
//! are not registered. Option payloads are the raw `TCA_OPTIONS` bytes.

use super::{
    Class, ClassAttrs, GenericClass, GenericQdisc, HfscClass, HfscQdisc, HtbClass, HtbQdisc,
    Ingress, Netem, PfifoFast, Qdisc, QdiscAttrs,
};
use crate::netlink::error::Result;
use crate::netlink::psched::PschedClock;

/// A qdisc kind with its own option codec.
pub trait QdiscKind: Sized + Into<Qdisc> {
    /// Value of `TCA_KIND`.
    const KIND: &'static str;

    /// Encode the `TCA_OPTIONS` payload, or `None` to omit the attribute.
    fn encode_options(&self, clock: &PschedClock) -> Result<Option<Vec<u8>>>;

    /// Decode from the `TCA_OPTIONS` payload (if the kernel sent one).
    fn decode(attrs: QdiscAttrs, options: Option<&[u8]>, clock: &PschedClock) -> Result<Self>;
}

/// A class kind with its own option codec.
pub trait ClassKind: Sized + Into<Class> {
    /// Value of `TCA_KIND`.
    const KIND: &'static str;

    /// Encode the `TCA_OPTIONS` payload, or `None` to omit the attribute.
    fn encode_options(&self, clock: &PschedClock) -> Result<Option<Vec<u8>>>;

    /// Decode from the `TCA_OPTIONS` payload (if the kernel sent one).
    fn decode(attrs: ClassAttrs, options: Option<&[u8]>, clock: &PschedClock) -> Result<Self>;
}

type DecodeQdiscFn = fn(QdiscAttrs, Option<&[u8]>, &PschedClock) -> Result<Qdisc>;
type DecodeClassFn = fn(ClassAttrs, Option<&[u8]>, &PschedClock) -> Result<Class>;

/// Registry entry for a qdisc kind.
#[derive(Clone, Copy)]
pub struct QdiscEntry {
    pub kind: &'static str,
    pub decode: DecodeQdiscFn,
}

/// Registry entry for a class kind.
#[derive(Clone, Copy)]
pub struct ClassEntry {
    pub kind: &'static str,
    pub decode: DecodeClassFn,
}

fn decode_qdisc_as<T: QdiscKind>(
    attrs: QdiscAttrs,
    options: Option<&[u8]>,
    clock: &PschedClock,
) -> Result<Qdisc> {
    T::decode(attrs, options, clock).map(Into::into)
}

fn decode_class_as<T: ClassKind>(
    attrs: ClassAttrs,
    options: Option<&[u8]>,
    clock: &PschedClock,
) -> Result<Class> {
    T::decode(attrs, options, clock).map(Into::into)
}

const fn qdisc_entry<T: QdiscKind>() -> QdiscEntry {
    QdiscEntry {
        kind: T::KIND,
        decode: decode_qdisc_as::<T>,
    }
}

const fn class_entry<T: ClassKind>() -> ClassEntry {
    ClassEntry {
        kind: T::KIND,
        decode: decode_class_as::<T>,
    }
}

static QDISC_KINDS: &[QdiscEntry] = &[
    qdisc_entry::<HtbQdisc>(),
    qdisc_entry::<Netem>(),
    qdisc_entry::<HfscQdisc>(),
    qdisc_entry::<PfifoFast>(),
    qdisc_entry::<Ingress>(),
];

static CLASS_KINDS: &[ClassEntry] = &[class_entry::<HtbClass>(), class_entry::<HfscClass>()];

/// Look up a registered qdisc kind.
pub fn qdisc_kind(kind: &str) -> Option<&'static QdiscEntry> {
    QDISC_KINDS.iter().find(|e| e.kind == kind)
}

/// Look up a registered class kind.
pub fn class_kind(kind: &str) -> Option<&'static ClassEntry> {
    CLASS_KINDS.iter().find(|e| e.kind == kind)
}

/// Encode the `TCA_OPTIONS` payload of a qdisc.
pub fn encode_qdisc_options(qdisc: &Qdisc, clock: &PschedClock) -> Result<Option<Vec<u8>>> {
    match qdisc {
        Qdisc::Htb(q) => q.encode_options(clock),
        Qdisc::Netem(q) => q.encode_options(clock),
        Qdisc::Hfsc(q) => q.encode_options(clock),
        Qdisc::PfifoFast(q) => q.encode_options(clock),
        Qdisc::Ingress(q) => q.encode_options(clock),
        Qdisc::Generic(q) => Ok(q.options.clone()),
    }
}

/// Encode the `TCA_OPTIONS` payload of a class.
pub fn encode_class_options(class: &Class, clock: &PschedClock) -> Result<Option<Vec<u8>>> {
    match class {
        Class::Htb(c) => c.encode_options(clock),
        Class::Hfsc(c) => c.encode_options(clock),
        Class::Generic(c) => Ok(c.options.clone()),
    }
}

/// Decode a qdisc of `kind`.
///
/// Unregistered kinds become [`Qdisc::Generic`] and never fail; a
/// malformed payload under a registered kind is `InvalidWireFormat`.
pub fn decode_qdisc(
    kind: &str,
    attrs: QdiscAttrs,
    options: Option<&[u8]>,
    clock: &PschedClock,
) -> Result<Qdisc> {
    match qdisc_kind(kind) {
        Some(entry) => (entry.decode)(attrs, options, clock),
        None => Ok(Qdisc::Generic(GenericQdisc {
            attrs,
            kind: kind.to_string(),
            options: options.map(<[u8]>::to_vec),
        })),
    }
}

/// Decode a class of `kind`; see [`decode_qdisc`].
pub fn decode_class(
    kind: &str,
    attrs: ClassAttrs,
    options: Option<&[u8]>,
    clock: &PschedClock,
) -> Result<Class> {
    match class_kind(kind) {
        Some(entry) => (entry.decode)(attrs, options, clock),
        None => Ok(Class::Generic(GenericClass {
            attrs,
            kind: kind.to_string(),
            options: options.map(<[u8]>::to_vec),
        })),
    }
}
