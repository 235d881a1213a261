//! Qdisc and class mutation.

use std::fmt;

use super::registry::{encode_class_options, encode_qdisc_options};
use super::{Class, Qdisc};
use crate::netlink::builder::MessageBuilder;
use crate::netlink::error::Result;
use crate::netlink::interface_ref::{InterfaceRef, link_request, parse_link_reply};
use crate::netlink::message::{
    NLM_F_ACK, NLM_F_CREATE, NLM_F_EXCL, NLM_F_REPLACE, NLM_F_REQUEST, NlMsgType,
};
use crate::netlink::psched::PschedClock;
use crate::netlink::transport::{Reply, Transport};
use crate::netlink::types::tc::{TcMsg, tca};

/// Kind of mutation to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create; fails with `AlreadyExists` if the object exists.
    Add,
    /// Modify in place; handle and parent must match the existing object.
    Change,
    /// Create or replace. A handle the kernel does not know creates a new
    /// object rather than failing.
    Replace,
    /// Remove the object (and, for qdiscs, everything beneath it).
    Del,
}

impl Operation {
    /// Netlink flags of the request, including `NLM_F_REQUEST | NLM_F_ACK`.
    pub const fn flags(self) -> u16 {
        let modifiers = match self {
            Self::Add => NLM_F_CREATE | NLM_F_EXCL,
            Self::Replace => NLM_F_CREATE | NLM_F_REPLACE,
            Self::Change | Self::Del => 0,
        };
        NLM_F_REQUEST | NLM_F_ACK | modifiers
    }

    /// Message type for a qdisc request.
    pub const fn qdisc_msg_type(self) -> u16 {
        match self {
            Self::Del => NlMsgType::RTM_DELQDISC,
            _ => NlMsgType::RTM_NEWQDISC,
        }
    }

    /// Message type for a class request.
    pub const fn class_msg_type(self) -> u16 {
        match self {
            Self::Del => NlMsgType::RTM_DELTCLASS,
            _ => NlMsgType::RTM_NEWTCLASS,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Self::Add => "adding",
            Self::Change => "changing",
            Self::Replace => "replacing",
            Self::Del => "deleting",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Change => "change",
            Self::Replace => "replace",
            Self::Del => "del",
        })
    }
}

/// Traffic control client.
///
/// Wraps a [`Transport`] and the packet scheduler clock used to convert
/// between user units and kernel ticks. Every method performs exactly
/// one request/reply exchange.
///
/// ```ignore
/// use nltc::netlink::{Connection, Handle, TrafficControl};
/// use nltc::netlink::tc::{Netem, NetemConfig, QdiscAttrs};
///
/// let tc = TrafficControl::new(Connection::new()?);
/// let link = tc.link_index("eth0").await?;
///
/// let config = NetemConfig::new().latency(20_000).loss(1.5);
/// let netem = Netem::new(QdiscAttrs::new(link, Handle::new(1, 0), Handle::ROOT), &config)?;
/// tc.qdisc_replace(&netem.into()).await?;
/// ```
pub struct TrafficControl<T> {
    transport: T,
    clock: PschedClock,
}

impl<T: Transport> TrafficControl<T> {
    /// Create a client, reading the scheduler clock of the running kernel.
    pub fn new(transport: T) -> Self {
        Self::with_clock(transport, PschedClock::load())
    }

    /// Create a client with an explicit scheduler clock.
    pub fn with_clock(transport: T, clock: PschedClock) -> Self {
        Self { transport, clock }
    }

    /// Scheduler clock used for tick conversions.
    pub fn clock(&self) -> &PschedClock {
        &self.clock
    }

    /// Get the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Consume the client and return the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Resolve an interface to its index in the transport's namespace.
    pub async fn link_index(&self, iface: impl Into<InterfaceRef>) -> Result<u32> {
        match iface.into() {
            InterfaceRef::Index(index) => Ok(index),
            InterfaceRef::Name(name) => {
                let request = link_request(&name)?;
                tracing::debug!(name = %name, "resolving interface");
                let replies = self.transport.execute(request).await?;
                parse_link_reply(&name, &replies)
            }
        }
    }

    /// Add a qdisc.
    pub async fn qdisc_add(&self, qdisc: &Qdisc) -> Result<()> {
        self.qdisc_modify(Operation::Add, qdisc).await
    }

    /// Change an existing qdisc in place.
    pub async fn qdisc_change(&self, qdisc: &Qdisc) -> Result<()> {
        self.qdisc_modify(Operation::Change, qdisc).await
    }

    /// Replace a qdisc, creating it if needed.
    pub async fn qdisc_replace(&self, qdisc: &Qdisc) -> Result<()> {
        self.qdisc_modify(Operation::Replace, qdisc).await
    }

    /// Delete a qdisc.
    pub async fn qdisc_del(&self, qdisc: &Qdisc) -> Result<()> {
        self.qdisc_modify(Operation::Del, qdisc).await
    }

    /// Apply `op` to `qdisc`.
    pub async fn qdisc_modify(&self, op: Operation, qdisc: &Qdisc) -> Result<()> {
        let request = qdisc_request(op, qdisc, &self.clock)?;
        tracing::debug!(
            op = %op,
            kind = qdisc.kind(),
            link = qdisc.link_index(),
            handle = %qdisc.handle(),
            parent = %qdisc.parent(),
            flags = format_args!("{:#x}", request.flags()),
            "qdisc request"
        );

        let replies = self.transport.execute(request).await?;
        check_ack(&replies)
            .map_err(|e| e.with_context(format!("{} qdisc {}", op.verb(), qdisc.handle())))
    }

    /// Add a class.
    pub async fn class_add(&self, class: &Class) -> Result<()> {
        self.class_modify(Operation::Add, class).await
    }

    /// Change an existing class in place.
    pub async fn class_change(&self, class: &Class) -> Result<()> {
        self.class_modify(Operation::Change, class).await
    }

    /// Replace a class, creating it if needed.
    pub async fn class_replace(&self, class: &Class) -> Result<()> {
        self.class_modify(Operation::Replace, class).await
    }

    /// Delete a class.
    pub async fn class_del(&self, class: &Class) -> Result<()> {
        self.class_modify(Operation::Del, class).await
    }

    /// Apply `op` to `class`.
    pub async fn class_modify(&self, op: Operation, class: &Class) -> Result<()> {
        let request = class_request(op, class, &self.clock)?;
        tracing::debug!(
            op = %op,
            kind = class.kind(),
            link = class.link_index(),
            handle = %class.handle(),
            parent = %class.parent(),
            flags = format_args!("{:#x}", request.flags()),
            "class request"
        );

        let replies = self.transport.execute(request).await?;
        check_ack(&replies)
            .map_err(|e| e.with_context(format!("{} class {}", op.verb(), class.handle())))
    }
}

/// Build the request for a qdisc mutation.
pub fn qdisc_request(op: Operation, qdisc: &Qdisc, clock: &PschedClock) -> Result<MessageBuilder> {
    let tcmsg = TcMsg::new()
        .with_ifindex(qdisc.link_index())
        .with_handle(qdisc.handle().as_raw())
        .with_parent(qdisc.parent().as_raw());

    let mut builder = MessageBuilder::new(op.qdisc_msg_type(), op.flags());
    builder.append(&tcmsg);
    if op != Operation::Del {
        let options = encode_qdisc_options(qdisc, clock)?;
        append_kind_and_options(&mut builder, qdisc.kind(), options.as_deref())?;
    }
    Ok(builder)
}

/// Build the request for a class mutation.
pub fn class_request(op: Operation, class: &Class, clock: &PschedClock) -> Result<MessageBuilder> {
    let tcmsg = TcMsg::new()
        .with_ifindex(class.link_index())
        .with_handle(class.handle().as_raw())
        .with_parent(class.parent().as_raw());

    let mut builder = MessageBuilder::new(op.class_msg_type(), op.flags());
    builder.append(&tcmsg);
    if op != Operation::Del {
        let options = encode_class_options(class, clock)?;
        append_kind_and_options(&mut builder, class.kind(), options.as_deref())?;
    }
    Ok(builder)
}

fn append_kind_and_options(
    builder: &mut MessageBuilder,
    kind: &str,
    options: Option<&[u8]>,
) -> Result<()> {
    builder.append_attr_str(tca::TCA_KIND, kind)?;
    if let Some(options) = options {
        builder.append_attr(tca::TCA_OPTIONS, options)?;
    }
    Ok(())
}

/// Interpret the replies to a mutation: the first non-zero error frame
/// fails the call, anything else is success.
fn check_ack(replies: &[Reply]) -> Result<()> {
    for reply in replies {
        if let Some(err) = reply.to_error()? {
            return Err(err);
        }
    }
    Ok(())
}
