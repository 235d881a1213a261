//! Netlink connection: the kernel-backed [`Transport`].

use std::os::unix::io::RawFd;
use std::path::Path;

use super::builder::MessageBuilder;
use super::error::Result;
use super::message::{NLM_F_ACK, NLM_F_DUMP, NlMsgHdr};
use super::socket::NetlinkSocket;
use super::transport::{Reply, Transport};

/// Rtnetlink connection.
///
/// Requests are serialized through one socket; every call waits for the
/// complete reply sequence of its own request before returning.
pub struct Connection {
    socket: NetlinkSocket,
}

impl Connection {
    /// Open a connection in the current network namespace.
    pub fn new() -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::new()?,
        })
    }

    /// Open a connection that operates in a specific network namespace.
    ///
    /// The namespace is specified by an open file descriptor to a namespace file
    /// (e.g., `/proc/<pid>/ns/net` or `/var/run/netns/<name>`).
    ///
    /// # Example
    ///
    /// ```ignore
    /// use std::fs::File;
    /// use std::os::unix::io::AsRawFd;
    /// use nltc::netlink::Connection;
    ///
    /// let ns_file = File::open("/var/run/netns/myns")?;
    /// let conn = Connection::new_in_namespace(ns_file.as_raw_fd())?;
    /// ```
    pub fn new_in_namespace(ns_fd: RawFd) -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::new_in_namespace(ns_fd)?,
        })
    }

    /// Open a connection in the network namespace at `ns_path`.
    ///
    /// ```ignore
    /// let conn = Connection::new_in_namespace_path("/var/run/netns/myns")?;
    /// let tc = TrafficControl::new(conn);
    /// ```
    pub fn new_in_namespace_path<P: AsRef<Path>>(ns_path: P) -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::new_in_namespace_path(ns_path)?,
        })
    }

    /// Get the underlying socket.
    pub fn socket(&self) -> &NetlinkSocket {
        &self.socket
    }

    async fn exchange(&self, mut builder: MessageBuilder) -> Result<Vec<Reply>> {
        let flags = builder.flags();
        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());

        let msg = builder.finish();
        tracing::trace!(seq, len = msg.len(), "sending netlink request");
        self.socket.send(&msg).await?;

        let mut replies = Vec::new();
        loop {
            let data = self.socket.recv_msg().await?;

            for reply in Reply::parse_all(&data)? {
                // Stale replies to earlier requests on this socket.
                if reply.header.nlmsg_seq != seq {
                    tracing::trace!(
                        expected = seq,
                        actual = reply.header.nlmsg_seq,
                        "skipping reply with foreign sequence number"
                    );
                    continue;
                }

                let last = is_terminal(&reply.header, flags);
                replies.push(reply);
                if last {
                    return Ok(replies);
                }
            }
        }
    }
}

/// Check whether `header` ends the exchange for a request sent with `flags`.
fn is_terminal(header: &NlMsgHdr, request_flags: u16) -> bool {
    if header.is_error() || header.is_done() {
        return true;
    }
    // Without an ack or dump the single data reply is all there is.
    request_flags & (NLM_F_ACK | NLM_F_DUMP) == 0 && !header.is_multi()
}

impl Transport for Connection {
    fn execute(
        &self,
        request: MessageBuilder,
    ) -> impl std::future::Future<Output = Result<Vec<Reply>>> + Send {
        self.exchange(request)
    }
}
