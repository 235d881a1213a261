//! Common test utilities.
//!
//! Provides [`FakeKernel`](fake_kernel::FakeKernel) for end-to-end tests
//! without privileges, `TestNamespace` for isolated real-kernel testing
//! and helper macros for conditional test execution.

#![allow(dead_code)]

pub mod fake_kernel;

use nltc::netlink::Connection;
use nltc::{Error, Result};
use std::io;
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};

/// Global counter for unique namespace names.
static NAMESPACE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Generate a unique namespace name for this test.
fn unique_ns_name(prefix: &str) -> String {
    let id = NAMESPACE_COUNTER.fetch_add(1, Ordering::SeqCst);
    let pid = std::process::id();
    format!("nltc-test-{}-{}-{}", prefix, pid, id)
}

/// Route `tracing` output through the test harness.
///
/// Honors `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A test network namespace with automatic cleanup.
///
/// The namespace is deleted when the struct is dropped.
///
/// # Example
///
/// ```ignore
/// let ns = TestNamespace::new("htb")?;
/// ns.add_dummy("dummy0")?;
/// let tc = TrafficControl::new(ns.connection()?);
/// ```
pub struct TestNamespace {
    name: String,
}

impl TestNamespace {
    /// Create a new test namespace with a unique name.
    pub fn new(prefix: &str) -> Result<Self> {
        let name = unique_ns_name(prefix);

        let status = Command::new("ip").args(["netns", "add", &name]).status()?;
        if !status.success() {
            return Err(Error::Transport(io::Error::other(format!(
                "failed to create namespace: {}",
                name
            ))));
        }

        Ok(Self { name })
    }

    /// Get the namespace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open a connection inside this namespace.
    pub fn connection(&self) -> Result<Connection> {
        Connection::new_in_namespace_path(format!("/var/run/netns/{}", self.name))
    }

    /// Run a command in the namespace and return its output.
    pub fn exec(&self, cmd: &str, args: &[&str]) -> Result<String> {
        let output = Command::new("ip")
            .args(["netns", "exec", &self.name, cmd])
            .args(args)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Transport(io::Error::other(format!(
                "command failed: {} {:?}: {}",
                cmd, args, stderr
            ))));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a command in the namespace, ignoring errors.
    pub fn exec_ignore(&self, cmd: &str, args: &[&str]) {
        let _ = Command::new("ip")
            .args(["netns", "exec", &self.name, cmd])
            .args(args)
            .output();
    }

    /// Add a dummy interface in this namespace using ip command.
    pub fn add_dummy(&self, name: &str) -> Result<()> {
        self.exec("ip", &["link", "add", name, "type", "dummy"])?;
        Ok(())
    }

    /// Bring an interface up using ip command.
    pub fn link_up(&self, name: &str) -> Result<()> {
        self.exec("ip", &["link", "set", name, "up"])?;
        Ok(())
    }
}

impl Drop for TestNamespace {
    fn drop(&mut self) {
        let _ = Command::new("ip")
            .args(["netns", "del", &self.name])
            .status();
    }
}

/// Check if running as root.
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Skip the test if not running as root.
///
/// Use this at the beginning of integration tests that require root privileges.
#[macro_export]
macro_rules! require_root {
    () => {
        if !crate::common::is_root() {
            eprintln!("Skipping test: requires root");
            return Ok(());
        }
    };
}

/// Skip the test if not running as root (for non-Result functions).
#[macro_export]
macro_rules! require_root_void {
    () => {
        if !crate::common::is_root() {
            eprintln!("Skipping test: requires root");
            return;
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_ns_name() {
        let name1 = unique_ns_name("test");
        let name2 = unique_ns_name("test");
        assert_ne!(name1, name2);
        assert!(name1.starts_with("nltc-test-test-"));
    }
}
