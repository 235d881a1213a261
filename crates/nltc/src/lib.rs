//! Async Linux traffic control over rtnetlink.
//!
//! `nltc` configures queueing disciplines and classes (HTB, NETEM, HFSC,
//! pfifo_fast, ingress, and any other kind as raw options) by speaking
//! the rtnetlink protocol directly. Objects are typed Rust values; the
//! crate encodes them into netlink requests, interprets the kernel's
//! acks and errors, and decodes dumps back into the same types together
//! with their statistics.
//!
//! # Features
//!
//! - `serde` - `Serialize`/`Deserialize` for the typed qdisc/class model
//! - `integration` - tests against the running kernel (root required)
//!
//! # Example
//!
//! ```ignore
//! use nltc::netlink::tc::{ClassAttrs, HtbClass, HtbClassParams, HtbQdisc, QdiscAttrs};
//! use nltc::{Connection, Handle, TrafficControl};
//!
//! #[tokio::main]
//! async fn main() -> nltc::Result<()> {
//!     let tc = TrafficControl::new(Connection::new()?);
//!     let link = tc.link_index("eth0").await?;
//!
//!     let root = HtbQdisc::new(QdiscAttrs::new(link, Handle::new(1, 0), Handle::ROOT));
//!     tc.qdisc_add(&root.into()).await?;
//!
//!     let params = HtbClassParams::new(10_000_000).ceil(20_000_000);
//!     let class = HtbClass::new(
//!         ClassAttrs::new(link, Handle::new(1, 0), Handle::new(1, 10)),
//!         &params,
//!         tc.clock(),
//!     );
//!     tc.class_add(&class.into()).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod netlink;

// Re-export common types at crate root for convenience
pub use netlink::{Connection, Error, Handle, Result, TrafficControl};
