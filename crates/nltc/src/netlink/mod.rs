//! Async rtnetlink traffic control.
//!
//! The layers, bottom up:
//!
//! - [`attr`], [`message`], [`builder`]: netlink framing and the TLV
//!   attribute codec.
//! - [`handle`], [`psched`], [`types`]: kernel ABI values (handles, scheduler
//!   ticks, `#[repr(C)]` structs).
//! - [`tc`]: the typed qdisc/class model, per-kind option codecs, and the
//!   [`TrafficControl`] client that adds, changes, replaces, deletes and
//!   lists objects.
//! - [`transport`]: the seam between the client and the kernel;
//!   [`Connection`] is the socket-backed implementation.
//!
//! # Quick Start
//!
//! ```ignore
//! use nltc::netlink::{Connection, Handle, TrafficControl};
//!
//! let tc = TrafficControl::new(Connection::new()?);
//! let link = tc.link_index("eth0").await?;
//!
//! for qdisc in tc.qdisc_list(Some(link)).await? {
//!     println!("{} {} parent {}", qdisc.kind(), qdisc.handle(), qdisc.parent());
//! }
//!
//! for class in tc.class_list(link, Handle::new(1, 0)).await? {
//!     println!("{} {}: {} bytes", class.kind(), class.handle(), class.statistics().bytes());
//! }
//! ```

pub mod attr;
pub mod builder;
pub mod connection;
pub mod error;
pub mod handle;
pub mod interface_ref;
pub mod message;
pub mod psched;
pub mod socket;
pub mod stats;
pub mod tc;
pub mod transport;
pub mod types;

pub use builder::MessageBuilder;
pub use connection::Connection;
pub use error::{Error, Result};
pub use handle::Handle;
pub use interface_ref::InterfaceRef;
pub use message::{MessageIter, NLMSG_HDRLEN, NlMsgHdr, NlMsgType};
pub use psched::PschedClock;
pub use socket::NetlinkSocket;
pub use stats::{ClassStatistics, QdiscStatistics};
pub use tc::{Class, Operation, Qdisc, TrafficControl};
pub use transport::{Reply, Transport};
