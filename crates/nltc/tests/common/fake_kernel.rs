//! In-process emulation of the rtnetlink TC handlers.
//!
//! `FakeKernel` implements [`Transport`] and keeps per-link qdisc and
//! class tables. Mutations follow the kernel's flag rules closely enough
//! to exercise add/change/replace/delete semantics without root: change
//! never creates, replace creates on an unknown handle, deleting a qdisc
//! drops everything beneath it and deleting a root restores the default
//! `pfifo_fast`. Option payloads are stored and echoed back verbatim.

use std::sync::Mutex;

use nltc::netlink::attr::{Attr, encode_attrs, find, get, parse_attrs};
use nltc::netlink::builder::MessageBuilder;
use nltc::netlink::message::{
    NLM_F_ACK, NLM_F_ACK_TLVS, NLM_F_CAPPED, NLM_F_CREATE, NLM_F_DUMP, NLM_F_EXCL, NLM_F_MULTI,
    NLM_F_REPLACE, NLMSG_HDRLEN, NLMSGERR_ATTR_MSG, NlMsgError, NlMsgHdr, NlMsgType,
};
use nltc::netlink::tc::pfifo_fast::{DEFAULT_BANDS, DEFAULT_PRIOMAP};
use nltc::netlink::types::link::{IFLA_IFNAME, IfInfoMsg};
use nltc::netlink::types::tc::{TcMsg, TcPrioQopt, tca, tca_stats};
use nltc::netlink::{Handle, Reply, Result, Transport};
use zerocopy::IntoBytes;

const ROOT: u32 = Handle::ROOT.as_raw();
const INGRESS: u32 = Handle::INGRESS.as_raw();
const CLSACT: u32 = Handle::CLSACT.as_raw();
const MAJOR_MASK: u32 = 0xffff_0000;

/// Qdisc kinds the fake kernel accepts.
const KNOWN_QDISCS: &[&str] = &[
    "htb",
    "hfsc",
    "netem",
    "pfifo_fast",
    "pfifo",
    "ingress",
    "clsact",
    "drr",
    "fq_codel",
    "sfq",
    "tbf",
];

/// Qdisc kinds that own classes.
const CLASSFUL: &[&str] = &["htb", "hfsc", "drr"];

/// Kernel-style rejection: errno plus extended-ack text.
type Reject = (i32, &'static str);
type Outcome = std::result::Result<Vec<(u16, Vec<u8>)>, Reject>;

#[derive(Debug, Clone)]
struct QdiscEntry {
    link: u32,
    handle: u32,
    parent: u32,
    kind: String,
    options: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
struct ClassEntry {
    link: u32,
    handle: u32,
    parent: u32,
    kind: String,
    options: Option<Vec<u8>>,
}

struct TcRequest {
    tcmsg: TcMsg,
    kind: Option<String>,
    options: Option<Vec<u8>>,
}

impl TcRequest {
    fn parse(payload: &[u8]) -> std::result::Result<Self, Reject> {
        let tcmsg = *TcMsg::from_bytes(payload).map_err(|_| (libc::EINVAL, "short tcmsg"))?;
        let attrs = parse_attrs(&payload[TcMsg::SIZE..])
            .map_err(|_| (libc::EINVAL, "malformed attributes"))?;
        if find(&attrs, tca::TCA_STATS2).is_some() || find(&attrs, tca::TCA_STATS).is_some() {
            return Err((libc::EINVAL, "statistics are read-only"));
        }
        let kind = match find(&attrs, tca::TCA_KIND) {
            Some(data) => Some(
                get::string(data)
                    .map_err(|_| (libc::EINVAL, "invalid TCA_KIND"))?
                    .to_string(),
            ),
            None => None,
        };
        Ok(Self {
            tcmsg,
            kind,
            options: find(&attrs, tca::TCA_OPTIONS).map(<[u8]>::to_vec),
        })
    }
}

struct State {
    links: Vec<(u32, String)>,
    qdiscs: Vec<QdiscEntry>,
    classes: Vec<ClassEntry>,
    next_auto_major: u32,
    seq: u32,
}

/// Fake rtnetlink TC endpoint.
pub struct FakeKernel {
    state: Mutex<State>,
    requests: Mutex<Vec<(u16, u16)>>,
}

impl FakeKernel {
    /// A kernel with no links.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                links: Vec::new(),
                qdiscs: Vec::new(),
                classes: Vec::new(),
                next_auto_major: 0x8001,
                seq: 0,
            }),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Add a link carrying the default root qdisc.
    pub fn with_link(self, index: u32, name: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.links.push((index, name.to_string()));
            state.qdiscs.push(default_root(index));
        }
        self
    }

    /// `(message type, flags)` of every request received so far.
    pub fn requests(&self) -> Vec<(u16, u16)> {
        self.requests.lock().unwrap().clone()
    }

    fn exchange(&self, request: &MessageBuilder) -> Vec<Reply> {
        let msg_type = request.msg_type();
        let flags = request.flags();
        self.requests.lock().unwrap().push((msg_type, flags));

        let mut state = self.state.lock().unwrap();
        state.seq += 1;
        let seq = state.seq;
        let outcome = state.dispatch(msg_type, flags, request.payload());
        drop(state);

        let original = NlMsgHdr {
            nlmsg_len: request.len() as u32,
            nlmsg_type: msg_type,
            nlmsg_flags: flags,
            nlmsg_seq: seq,
            nlmsg_pid: 0,
        };
        frame_replies(&original, outcome)
    }
}

impl Default for FakeKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for FakeKernel {
    async fn execute(&self, request: MessageBuilder) -> Result<Vec<Reply>> {
        Ok(self.exchange(&request))
    }
}

fn default_root(link: u32) -> QdiscEntry {
    let qopt = TcPrioQopt {
        bands: DEFAULT_BANDS,
        priomap: DEFAULT_PRIOMAP,
    };
    QdiscEntry {
        link,
        handle: 0,
        parent: ROOT,
        kind: "pfifo_fast".into(),
        options: Some(qopt.as_bytes().to_vec()),
    }
}

fn is_class_parent(parent: u32) -> bool {
    parent != ROOT && parent != INGRESS && parent != CLSACT && parent != 0
}

fn reply(original: &NlMsgHdr, msg_type: u16, flags: u16, payload: Vec<u8>) -> Reply {
    let header = NlMsgHdr {
        nlmsg_len: (NLMSG_HDRLEN + payload.len()) as u32,
        nlmsg_type: msg_type,
        nlmsg_flags: flags,
        nlmsg_seq: original.nlmsg_seq,
        nlmsg_pid: 0,
    };
    Reply::new(header, payload)
}

fn frame_replies(original: &NlMsgHdr, outcome: Outcome) -> Vec<Reply> {
    let is_dump = original.nlmsg_flags & NLM_F_DUMP == NLM_F_DUMP;

    let data = match outcome {
        Ok(data) => data,
        Err((errno, message)) => {
            let err = NlMsgError {
                error: -errno,
                msg: *original,
            };
            let mut payload = MessageBuilder::new(NlMsgType::ERROR, 0);
            payload.append(&err);
            payload
                .append_attr_str(NLMSGERR_ATTR_MSG, message)
                .unwrap();
            return vec![reply(
                original,
                NlMsgType::ERROR,
                NLM_F_CAPPED | NLM_F_ACK_TLVS,
                payload.payload().to_vec(),
            )];
        }
    };

    let data_flags = if is_dump { NLM_F_MULTI } else { 0 };
    let mut replies: Vec<Reply> = data
        .into_iter()
        .map(|(msg_type, payload)| reply(original, msg_type, data_flags, payload))
        .collect();

    if is_dump {
        replies.push(reply(
            original,
            NlMsgType::DONE,
            NLM_F_MULTI,
            0i32.to_ne_bytes().to_vec(),
        ));
    } else if original.nlmsg_flags & NLM_F_ACK != 0 {
        let ack = NlMsgError {
            error: 0,
            msg: *original,
        };
        replies.push(reply(
            original,
            NlMsgType::ERROR,
            NLM_F_CAPPED,
            ack.as_bytes().to_vec(),
        ));
    }
    replies
}

fn tc_payload(
    ifindex: u32,
    handle: u32,
    parent: u32,
    info: u32,
    kind: &str,
    options: Option<&[u8]>,
) -> Vec<u8> {
    let mut tcmsg = TcMsg::new()
        .with_ifindex(ifindex)
        .with_handle(handle)
        .with_parent(parent);
    tcmsg.tcm_info = info;

    let mut attrs = vec![Attr::string(tca::TCA_KIND, kind)];
    if let Some(options) = options {
        attrs.push(Attr::leaf(tca::TCA_OPTIONS, options));
    }
    attrs.push(Attr::leaf(tca::TCA_STATS, [0u8; 40]));
    attrs.push(Attr::nested(
        tca::TCA_STATS2,
        vec![
            Attr::leaf(tca_stats::TCA_STATS_BASIC, [0u8; 16]),
            Attr::leaf(tca_stats::TCA_STATS_QUEUE, [0u8; 20]),
        ],
    ));

    let mut payload = tcmsg.as_bytes().to_vec();
    payload.extend(encode_attrs(&attrs).unwrap());
    payload
}

impl State {
    fn dispatch(&mut self, msg_type: u16, flags: u16, payload: &[u8]) -> Outcome {
        let is_dump = flags & NLM_F_DUMP == NLM_F_DUMP;
        match msg_type {
            NlMsgType::RTM_GETLINK => self.get_link(payload),
            NlMsgType::RTM_NEWQDISC => {
                let req = TcRequest::parse(payload)?;
                self.new_qdisc(flags, req).map(|()| Vec::new())
            }
            NlMsgType::RTM_DELQDISC => {
                let req = TcRequest::parse(payload)?;
                self.del_qdisc(req).map(|()| Vec::new())
            }
            NlMsgType::RTM_GETQDISC if is_dump => Ok(self.dump_qdiscs()),
            NlMsgType::RTM_NEWTCLASS => {
                let req = TcRequest::parse(payload)?;
                self.new_class(flags, req).map(|()| Vec::new())
            }
            NlMsgType::RTM_DELTCLASS => {
                let req = TcRequest::parse(payload)?;
                self.del_class(req).map(|()| Vec::new())
            }
            NlMsgType::RTM_GETTCLASS if is_dump => {
                let req = TcRequest::parse(payload)?;
                Ok(self.dump_classes(&req))
            }
            _ => Err((libc::EOPNOTSUPP, "operation not supported")),
        }
    }

    fn has_link(&self, link: u32) -> bool {
        self.links.iter().any(|(index, _)| *index == link)
    }

    fn require_link(&self, link: u32) -> std::result::Result<(), Reject> {
        if self.has_link(link) {
            Ok(())
        } else {
            Err((libc::ENODEV, "Cannot find device"))
        }
    }

    fn get_link(&self, payload: &[u8]) -> Outcome {
        let info = IfInfoMsg::from_bytes(payload).map_err(|_| (libc::EINVAL, "short ifinfomsg"))?;
        let attrs = parse_attrs(&payload[IfInfoMsg::SIZE..])
            .map_err(|_| (libc::EINVAL, "malformed attributes"))?;
        let name = find(&attrs, IFLA_IFNAME).and_then(|data| get::string(data).ok());

        let link = self
            .links
            .iter()
            .find(|(index, link_name)| match name {
                Some(name) => link_name == name,
                None => *index == info.ifindex(),
            })
            .ok_or((libc::ENODEV, "Cannot find device"))?;

        let mut reply_info = IfInfoMsg::new();
        reply_info.ifi_index = link.0 as i32;
        let mut builder = MessageBuilder::new(NlMsgType::RTM_NEWLINK, 0);
        builder.append(&reply_info);
        builder.append_attr_str(IFLA_IFNAME, &link.1).unwrap();
        Ok(vec![(NlMsgType::RTM_NEWLINK, builder.payload().to_vec())])
    }

    fn find_qdisc(&self, link: u32, handle: u32) -> Option<usize> {
        self.qdiscs
            .iter()
            .position(|q| q.link == link && q.handle == handle)
    }

    fn find_class(&self, link: u32, handle: u32) -> Option<usize> {
        self.classes
            .iter()
            .position(|c| c.link == link && c.handle == handle)
    }

    /// Qdisc currently attached at `parent`, including the default root.
    fn qdisc_at(&self, link: u32, parent: u32) -> std::result::Result<Option<usize>, Reject> {
        if is_class_parent(parent) {
            let major = parent & MAJOR_MASK;
            if major == 0 || self.find_qdisc(link, major).is_none() {
                return Err((libc::ENOENT, "Failed to find specified qdisc"));
            }
            if self.find_class(link, parent).is_none() {
                return Err((libc::ENOENT, "Specified class not found"));
            }
        }
        Ok(self
            .qdiscs
            .iter()
            .position(|q| q.link == link && q.parent == parent))
    }

    fn new_qdisc(&mut self, flags: u16, req: TcRequest) -> std::result::Result<(), Reject> {
        let link = req.tcmsg.ifindex();
        self.require_link(link)?;
        let parent = req.tcmsg.tcm_parent;
        let handle = req.tcmsg.tcm_handle;
        let kind = req.kind.clone().ok_or((libc::EINVAL, "qdisc kind required"))?;

        let attached = self.qdisc_at(link, parent)?;
        // The default qdisc is invisible to modification.
        let slot = attached.filter(|&i| self.qdiscs[i].handle != 0);

        let change_target = match slot {
            Some(i) if handle == 0 || self.qdiscs[i].handle == handle => {
                let q = &self.qdiscs[i];
                let recreate = handle == 0
                    && flags & NLM_F_CREATE != 0
                    && flags & NLM_F_REPLACE != 0
                    && (flags & NLM_F_EXCL != 0 || q.kind != kind);
                if recreate { None } else { Some(i) }
            }
            _ => {
                if handle != 0 {
                    if slot.is_some() && flags & NLM_F_REPLACE == 0 {
                        return Err((libc::EEXIST, "NLM_F_REPLACE needed to override"));
                    }
                    if handle & !MAJOR_MASK != 0 {
                        return Err((libc::EINVAL, "Invalid minor handle"));
                    }
                    if self.find_qdisc(link, handle).is_some() {
                        if flags & NLM_F_EXCL != 0 {
                            return Err((libc::EEXIST, "Exclusivity flag on, cannot override"));
                        }
                        return Err((libc::EINVAL, "Qdisc is attached elsewhere"));
                    }
                }
                None
            }
        };

        if let Some(i) = change_target {
            if flags & NLM_F_EXCL != 0 {
                return Err((libc::EEXIST, "Exclusivity flag on, cannot modify"));
            }
            if self.qdiscs[i].kind != kind {
                return Err((libc::EINVAL, "Invalid qdisc name"));
            }
            if req.options.is_some() {
                self.qdiscs[i].options = req.options;
            }
            return Ok(());
        }

        // Create and graft.
        if flags & NLM_F_CREATE == 0 {
            return Err((
                libc::ENOENT,
                "Qdisc not found. To create specify NLM_F_CREATE flag",
            ));
        }
        if !KNOWN_QDISCS.contains(&kind.as_str()) {
            return Err((libc::ENOENT, "Specified qdisc kind is unknown"));
        }
        let handle = if handle == 0 {
            let major = self.next_auto_major;
            self.next_auto_major += 1;
            major << 16
        } else {
            handle
        };

        if let Some(i) = attached {
            let old = self.qdiscs[i].handle;
            self.remove_qdisc(link, old);
        }
        self.qdiscs.push(QdiscEntry {
            link,
            handle,
            parent,
            kind,
            options: req.options,
        });
        Ok(())
    }

    fn del_qdisc(&mut self, req: TcRequest) -> std::result::Result<(), Reject> {
        let link = req.tcmsg.ifindex();
        self.require_link(link)?;
        let parent = req.tcmsg.tcm_parent;
        let handle = req.tcmsg.tcm_handle;
        if parent == 0 {
            return Err((libc::EINVAL, "Parent required for deletion"));
        }

        let i = self.qdisc_at(link, parent)?.ok_or((
            libc::ENOENT,
            "Cannot find specified qdisc on specified device",
        ))?;
        let q = &self.qdiscs[i];
        if handle != 0 && q.handle != handle {
            return Err((libc::EINVAL, "Invalid handle"));
        }
        if q.handle == 0 {
            return Err((libc::ENOENT, "Cannot delete qdisc with handle of zero"));
        }

        let old = q.handle;
        self.remove_qdisc(link, old);
        if parent == ROOT {
            self.qdiscs.push(default_root(link));
        }
        Ok(())
    }

    /// Drop a qdisc together with its classes and the qdiscs below them.
    fn remove_qdisc(&mut self, link: u32, handle: u32) {
        self.qdiscs.retain(|q| !(q.link == link && q.handle == handle));
        let major = handle & MAJOR_MASK;
        if major == 0 {
            return;
        }
        self.classes
            .retain(|c| !(c.link == link && c.handle & MAJOR_MASK == major));
        let children: Vec<u32> = self
            .qdiscs
            .iter()
            .filter(|q| {
                q.link == link && is_class_parent(q.parent) && q.parent & MAJOR_MASK == major
            })
            .map(|q| q.handle)
            .collect();
        for child in children {
            self.remove_qdisc(link, child);
        }
    }

    /// Resolve the owning qdisc and full class id of a class request.
    fn class_target(&self, req: &TcRequest) -> std::result::Result<(usize, u32), Reject> {
        let link = req.tcmsg.ifindex();
        self.require_link(link)?;
        let portid = req.tcmsg.tcm_parent;
        let clid = req.tcmsg.tcm_handle;

        let root_handle = || {
            self.qdiscs
                .iter()
                .find(|q| q.link == link && q.parent == ROOT)
                .map_or(0, |q| q.handle)
        };
        let mut qid = clid & MAJOR_MASK;
        if portid != ROOT {
            let qid1 = portid & MAJOR_MASK;
            if qid != 0 && qid1 != 0 {
                if qid != qid1 {
                    return Err((libc::EINVAL, "Class and parent belong to different qdiscs"));
                }
            } else if qid1 != 0 {
                qid = qid1;
            } else if qid == 0 {
                qid = root_handle();
            }
        } else if qid == 0 {
            qid = root_handle();
        }

        let q = self
            .find_qdisc(link, qid)
            .ok_or((libc::ENOENT, "Specified qdisc not found"))?;
        if !CLASSFUL.contains(&self.qdiscs[q].kind.as_str()) {
            return Err((libc::EINVAL, "Qdisc is classless"));
        }
        if clid & !MAJOR_MASK == 0 {
            return Err((libc::EINVAL, "Invalid class handle"));
        }
        Ok((q, qid | (clid & !MAJOR_MASK)))
    }

    fn new_class(&mut self, flags: u16, req: TcRequest) -> std::result::Result<(), Reject> {
        let (q, clid) = self.class_target(&req)?;
        let link = req.tcmsg.ifindex();
        let portid = req.tcmsg.tcm_parent;

        match self.find_class(link, clid) {
            Some(i) => {
                if flags & NLM_F_EXCL != 0 {
                    return Err((libc::EEXIST, "Class already exists"));
                }
                if req.options.is_some() {
                    self.classes[i].options = req.options;
                }
                Ok(())
            }
            None => {
                if flags & NLM_F_CREATE == 0 {
                    return Err((libc::ENOENT, "Specified class not found"));
                }
                let qdisc_handle = self.qdiscs[q].handle;
                let parent = if portid == ROOT { qdisc_handle } else { portid };
                if parent != qdisc_handle && self.find_class(link, parent).is_none() {
                    return Err((libc::ENOENT, "Parent class not found"));
                }
                let kind = self.qdiscs[q].kind.clone();
                self.classes.push(ClassEntry {
                    link,
                    handle: clid,
                    parent,
                    kind,
                    options: req.options,
                });
                Ok(())
            }
        }
    }

    fn del_class(&mut self, req: TcRequest) -> std::result::Result<(), Reject> {
        let (_, clid) = self.class_target(&req)?;
        let link = req.tcmsg.ifindex();

        let i = self
            .find_class(link, clid)
            .ok_or((libc::ENOENT, "Specified class not found"))?;
        if self.classes.iter().any(|c| c.link == link && c.parent == clid) {
            return Err((libc::EBUSY, "Class has children"));
        }

        self.classes.remove(i);
        let leaves: Vec<u32> = self
            .qdiscs
            .iter()
            .filter(|q| q.link == link && q.parent == clid)
            .map(|q| q.handle)
            .collect();
        for leaf in leaves {
            self.remove_qdisc(link, leaf);
        }
        Ok(())
    }

    /// Every qdisc of every link: roots first, then the hierarchy, then
    /// ingress/clsact.
    fn dump_qdiscs(&self) -> Vec<(u16, Vec<u8>)> {
        let rank = |q: &QdiscEntry| match q.parent {
            ROOT => 0,
            INGRESS | CLSACT => 2,
            _ => 1,
        };
        let mut ordered: Vec<&QdiscEntry> = self.qdiscs.iter().collect();
        ordered.sort_by_key(|q| (q.link, rank(q)));

        ordered
            .into_iter()
            .map(|q| {
                let refcnt = if q.parent == ROOT { 2 } else { 1 };
                let payload = tc_payload(
                    q.link,
                    q.handle,
                    q.parent,
                    refcnt,
                    &q.kind,
                    q.options.as_deref(),
                );
                (NlMsgType::RTM_NEWQDISC, payload)
            })
            .collect()
    }

    /// Classes of one link, restricted to the qdisc named by the parent's
    /// major number. Top-level classes report `ROOT` as their parent.
    fn dump_classes(&self, req: &TcRequest) -> Vec<(u16, Vec<u8>)> {
        let link = req.tcmsg.ifindex();
        let parent_major = req.tcmsg.tcm_parent & MAJOR_MASK;

        self.classes
            .iter()
            .filter(|c| c.link == link)
            .filter(|c| req.tcmsg.tcm_parent == 0 || c.handle & MAJOR_MASK == parent_major)
            .map(|c| {
                let reported_parent = if c.parent & !MAJOR_MASK == 0 {
                    ROOT
                } else {
                    c.parent
                };
                let leaf = self
                    .qdiscs
                    .iter()
                    .find(|q| q.link == link && q.parent == c.handle)
                    .map_or(0, |q| q.handle);
                let payload = tc_payload(
                    c.link,
                    c.handle,
                    reported_parent,
                    leaf,
                    &c.kind,
                    c.options.as_deref(),
                );
                (NlMsgType::RTM_NEWTCLASS, payload)
            })
            .collect()
    }
}
