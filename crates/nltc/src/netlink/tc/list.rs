//! Qdisc and class dumps.

use super::registry::{decode_class, decode_qdisc};
use super::{Class, ClassAttrs, Qdisc, QdiscAttrs, TrafficControl};
use crate::netlink::attr::{find, get, parse_attrs};
use crate::netlink::builder::MessageBuilder;
use crate::netlink::error::{Error, Result};
use crate::netlink::handle::Handle;
use crate::netlink::message::{NLM_F_DUMP, NLM_F_REQUEST, NlMsgType};
use crate::netlink::psched::PschedClock;
use crate::netlink::stats::ClassStatistics;
use crate::netlink::transport::{Reply, Transport};
use crate::netlink::types::tc::{TcMsg, tca};

/// One decoded `tcmsg` reply before kind dispatch.
struct TcReply<'a> {
    tcmsg: &'a TcMsg,
    kind: &'a str,
    options: Option<&'a [u8]>,
    statistics: ClassStatistics,
}

impl<'a> TcReply<'a> {
    fn parse(payload: &'a [u8]) -> Result<Self> {
        let tcmsg = TcMsg::from_bytes(payload)?;
        let attrs = parse_attrs(&payload[TcMsg::SIZE..])?;

        let kind = find(&attrs, tca::TCA_KIND)
            .ok_or_else(|| Error::InvalidWireFormat("tc reply without TCA_KIND".into()))?;
        let kind = get::string(kind)?;
        let options = find(&attrs, tca::TCA_OPTIONS);
        let statistics = ClassStatistics::from_attrs(&attrs)?;

        Ok(Self {
            tcmsg,
            kind,
            options,
            statistics,
        })
    }
}

/// Decode one `RTM_NEWQDISC` payload.
pub fn parse_qdisc(payload: &[u8], clock: &PschedClock) -> Result<Qdisc> {
    let reply = TcReply::parse(payload)?;
    let attrs = QdiscAttrs {
        link_index: reply.tcmsg.ifindex(),
        handle: Handle::from_raw(reply.tcmsg.tcm_handle),
        parent: Handle::from_raw(reply.tcmsg.tcm_parent),
        refcnt: Some(reply.tcmsg.tcm_info),
        statistics: reply.statistics,
    };
    decode_qdisc(reply.kind, attrs, reply.options, clock)
}

/// Decode one `RTM_NEWTCLASS` payload.
pub fn parse_class(payload: &[u8], clock: &PschedClock) -> Result<Class> {
    let reply = TcReply::parse(payload)?;
    let attrs = ClassAttrs {
        link_index: reply.tcmsg.ifindex(),
        parent: Handle::from_raw(reply.tcmsg.tcm_parent),
        handle: Handle::from_raw(reply.tcmsg.tcm_handle),
        statistics: reply.statistics,
    };
    decode_class(reply.kind, attrs, reply.options, clock)
}

/// Collect the payloads of `msg_type` frames, failing on an error frame.
fn dump_payloads(replies: &[Reply], msg_type: u16) -> Result<impl Iterator<Item = &[u8]>> {
    for reply in replies {
        if let Some(err) = reply.to_error()? {
            return Err(err);
        }
    }
    Ok(replies
        .iter()
        .take_while(|r| !r.is_done())
        .filter(move |r| r.msg_type() == msg_type)
        .map(|r| r.payload.as_slice()))
}

impl<T: Transport> TrafficControl<T> {
    /// List qdiscs, optionally restricted to one link.
    ///
    /// The kernel dumps qdiscs of every device regardless of the index in
    /// the request, so the result is filtered here.
    pub async fn qdisc_list(&self, link: Option<u32>) -> Result<Vec<Qdisc>> {
        let tcmsg = TcMsg::new().with_ifindex(link.unwrap_or(0));
        let mut request = MessageBuilder::new(NlMsgType::RTM_GETQDISC, NLM_F_REQUEST | NLM_F_DUMP);
        request.append(&tcmsg);
        tracing::debug!(link = ?link, "dumping qdiscs");

        let replies = self.transport().execute(request).await?;
        let mut qdiscs = Vec::new();
        for payload in dump_payloads(&replies, NlMsgType::RTM_NEWQDISC)? {
            let qdisc = parse_qdisc(payload, self.clock())?;
            if link.is_some_and(|index| index != qdisc.link_index()) {
                continue;
            }
            tracing::trace!(
                kind = qdisc.kind(),
                link = qdisc.link_index(),
                handle = %qdisc.handle(),
                parent = %qdisc.parent(),
                "decoded qdisc"
            );
            qdiscs.push(qdisc);
        }
        Ok(qdiscs)
    }

    /// List the classes of `link` below `parent`.
    ///
    /// `Handle::NONE` as the parent lists every class of the link.
    pub async fn class_list(&self, link: u32, parent: Handle) -> Result<Vec<Class>> {
        let tcmsg = TcMsg::new()
            .with_ifindex(link)
            .with_parent(parent.as_raw());
        let mut request =
            MessageBuilder::new(NlMsgType::RTM_GETTCLASS, NLM_F_REQUEST | NLM_F_DUMP);
        request.append(&tcmsg);
        tracing::debug!(link, parent = %parent, "dumping classes");

        let replies = self.transport().execute(request).await?;
        let mut classes = Vec::new();
        for payload in dump_payloads(&replies, NlMsgType::RTM_NEWTCLASS)? {
            let class = parse_class(payload, self.clock())?;
            tracing::trace!(
                kind = class.kind(),
                handle = %class.handle(),
                parent = %class.parent(),
                "decoded class"
            );
            classes.push(class);
        }
        Ok(classes)
    }

    /// Find the qdisc with `handle` on `link`.
    pub async fn qdisc_get(&self, link: u32, handle: Handle) -> Result<Option<Qdisc>> {
        let qdiscs = self.qdisc_list(Some(link)).await?;
        Ok(qdiscs.into_iter().find(|q| q.handle() == handle))
    }

    /// The root qdisc of `link`, if one is attached.
    pub async fn root_qdisc(&self, link: u32) -> Result<Option<Qdisc>> {
        let qdiscs = self.qdisc_list(Some(link)).await?;
        Ok(qdiscs.into_iter().find(|q| q.parent().is_root()))
    }
}
