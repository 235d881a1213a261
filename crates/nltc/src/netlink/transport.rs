//! Transport contract between the TC layer and the kernel.
//!
//! A transport takes a fully built request, assigns its sequence number
//! and port id, and returns every reply frame of the exchange, including
//! the terminating `NLMSG_ERROR` (ack) or `NLMSG_DONE` frame. It never
//! interprets error codes; that is left to the caller.

use std::future::Future;

use super::builder::MessageBuilder;
use super::error::Result;
use super::message::{MessageIter, NlMsgError, NlMsgHdr};

/// One reply frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Netlink header of the frame.
    pub header: NlMsgHdr,
    /// Payload after the header.
    pub payload: Vec<u8>,
}

impl Reply {
    /// Build a reply from its parts.
    pub fn new(header: NlMsgHdr, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    /// Split a received datagram into frames.
    pub fn parse_all(data: &[u8]) -> Result<Vec<Self>> {
        MessageIter::new(data)
            .map(|res| res.map(|(header, payload)| Self::new(*header, payload.to_vec())))
            .collect()
    }

    /// Message type.
    pub fn msg_type(&self) -> u16 {
        self.header.nlmsg_type
    }

    /// Check if this frame terminates a dump.
    pub fn is_done(&self) -> bool {
        self.header.is_done()
    }

    /// Check if this is an `NLMSG_ERROR` frame (ack or error).
    pub fn is_error(&self) -> bool {
        self.header.is_error()
    }

    /// Typed error carried by this frame, if it is a non-zero `NLMSG_ERROR`.
    pub fn to_error(&self) -> Result<Option<super::error::Error>> {
        if !self.is_error() {
            return Ok(None);
        }
        let err = NlMsgError::from_bytes(&self.payload)?;
        Ok(err.to_error(&self.payload, self.header.nlmsg_flags))
    }
}

/// Executes netlink requests.
///
/// Implemented by [`Connection`](super::Connection) for the real kernel;
/// tests substitute an in-process implementation.
pub trait Transport {
    /// Send `request` and collect all reply frames of the exchange.
    fn execute(&self, request: MessageBuilder) -> impl Future<Output = Result<Vec<Reply>>> + Send;
}

impl<T: Transport + Sync> Transport for &T {
    fn execute(&self, request: MessageBuilder) -> impl Future<Output = Result<Vec<Reply>>> + Send {
        (**self).execute(request)
    }
}
