//! Interface references and name-to-index lookup.
//!
//! TC requests address devices by index. [`InterfaceRef`] lets callers
//! pass either a name or an index; names are resolved with an
//! `RTM_GETLINK` request over the same transport, so the lookup happens
//! in the namespace the transport is bound to.

use std::fmt;

use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::{NLM_F_ACK, NLM_F_REQUEST, NlMsgType};
use super::transport::Reply;
use super::types::link::{IFLA_IFNAME, IFNAMSIZ, IfInfoMsg};

/// A reference to a network interface, either by name or by index.
///
/// ```ignore
/// use nltc::netlink::InterfaceRef;
///
/// let by_name: InterfaceRef = "eth0".into();
/// let by_index: InterfaceRef = 2u32.into();
/// let link = tc.link_index(by_name).await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InterfaceRef {
    /// Interface specified by name (resolved through the transport).
    Name(String),
    /// Interface specified by index (already resolved).
    Index(u32),
}

impl InterfaceRef {
    /// Create an interface reference from a name.
    #[inline]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Create an interface reference from an index.
    #[inline]
    pub fn index(index: u32) -> Self {
        Self::Index(index)
    }

    /// Get the name if this is a name reference.
    #[inline]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Index(_) => None,
        }
    }

    /// Get the index if this is an index reference.
    #[inline]
    pub fn as_index(&self) -> Option<u32> {
        match self {
            Self::Name(_) => None,
            Self::Index(idx) => Some(*idx),
        }
    }
}

impl fmt::Display for InterfaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{}", name),
            Self::Index(idx) => write!(f, "ifindex:{}", idx),
        }
    }
}

impl From<&str> for InterfaceRef {
    #[inline]
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for InterfaceRef {
    #[inline]
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<u32> for InterfaceRef {
    #[inline]
    fn from(index: u32) -> Self {
        Self::Index(index)
    }
}

/// Build the `RTM_GETLINK` request that looks up `name`.
pub(crate) fn link_request(name: &str) -> Result<MessageBuilder> {
    if name.is_empty()
        || name.len() >= IFNAMSIZ
        || name.contains(['/', '\0'])
        || name.chars().any(char::is_whitespace)
    {
        return Err(Error::InterfaceNotFound {
            name: name.to_string(),
        });
    }

    let mut builder = MessageBuilder::new(NlMsgType::RTM_GETLINK, NLM_F_REQUEST | NLM_F_ACK);
    builder.append(&IfInfoMsg::new());
    builder.append_attr_str(IFLA_IFNAME, name)?;
    Ok(builder)
}

/// Extract the interface index from the replies to [`link_request`].
pub(crate) fn parse_link_reply(name: &str, replies: &[Reply]) -> Result<u32> {
    for reply in replies {
        if let Some(err) = reply.to_error()? {
            return Err(if err.is_not_found() {
                Error::InterfaceNotFound {
                    name: name.to_string(),
                }
            } else {
                err.with_context(format!("resolving interface {}", name))
            });
        }
        if reply.msg_type() == NlMsgType::RTM_NEWLINK {
            return Ok(IfInfoMsg::from_bytes(&reply.payload)?.ifindex());
        }
    }

    Err(Error::InterfaceNotFound {
        name: name.to_string(),
    })
}
