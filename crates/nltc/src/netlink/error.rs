//! Error types for traffic control netlink operations.

use std::io;

/// Result type for netlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during netlink operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket-level failure (send/recv/bind), not a protocol rejection.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Malformed or truncated message/attribute bytes.
    #[error("invalid wire format: {0}")]
    InvalidWireFormat(String),

    /// Target handle or parent does not exist (ENOENT, ENODEV).
    #[error("not found: {message} (errno {errno})")]
    NotFound {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Object already exists (EEXIST).
    #[error("already exists: {message} (errno {errno})")]
    AlreadyExists {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Kernel rejected the parameter combination (EINVAL, ERANGE).
    #[error("invalid argument: {message} (errno {errno})")]
    InvalidArgument {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Caller lacks CAP_NET_ADMIN (EPERM, EACCES).
    #[error("permission denied: {message} (errno {errno})")]
    PermissionDenied {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// The running kernel lacks the requested feature (EOPNOTSUPP).
    #[error("no kernel support: {message} (errno {errno})")]
    NoKernelSupport {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Kernel returned an errno with no dedicated variant.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Kernel error with operation context.
    #[error("{operation}: {source}")]
    Context {
        /// The operation that failed.
        operation: String,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },

    /// Local validation failed before anything was sent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A handle string could not be parsed.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// Interface not found.
    #[error("interface not found: {name}")]
    InterfaceNotFound {
        /// The interface name that was not found.
        name: String,
    },
}

impl Error {
    /// Create a typed error from a (negative) netlink errno value.
    pub fn from_errno(errno: i32) -> Self {
        let errno = errno.abs();
        let message = io::Error::from_raw_os_error(errno).to_string();
        Self::from_errno_with_message(errno, message)
    }

    /// Create a typed error from a positive errno and a message.
    ///
    /// Used when the kernel supplied an extended-ack string.
    pub fn from_errno_with_message(errno: i32, message: impl Into<String>) -> Self {
        let errno = errno.abs();
        let message = message.into();
        match errno {
            libc::ENOENT | libc::ENODEV => Self::NotFound { errno, message },
            libc::EEXIST => Self::AlreadyExists { errno, message },
            libc::EINVAL | libc::ERANGE => Self::InvalidArgument { errno, message },
            libc::EPERM | libc::EACCES => Self::PermissionDenied { errno, message },
            libc::EOPNOTSUPP | libc::EPROTONOSUPPORT => Self::NoKernelSupport { errno, message },
            _ => Self::Kernel { errno, message },
        }
    }

    /// Create a truncation error.
    pub fn truncated(what: &str, expected: usize, actual: usize) -> Self {
        Self::InvalidWireFormat(format!(
            "{} truncated: expected {} bytes, got {}",
            what, expected, actual
        ))
    }

    /// Add operation context to this error.
    ///
    /// Only kernel rejections are wrapped; local errors are returned unchanged.
    pub fn with_context(self, operation: impl Into<String>) -> Self {
        if self.errno().is_some() {
            Self::Context {
                operation: operation.into(),
                source: Box::new(self),
            }
        } else {
            self
        }
    }

    /// Strip any [`Error::Context`] wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Get the errno value if this is a kernel rejection.
    pub fn errno(&self) -> Option<i32> {
        match self.root() {
            Self::NotFound { errno, .. }
            | Self::AlreadyExists { errno, .. }
            | Self::InvalidArgument { errno, .. }
            | Self::PermissionDenied { errno, .. }
            | Self::NoKernelSupport { errno, .. }
            | Self::Kernel { errno, .. } => Some(*errno),
            _ => None,
        }
    }

    /// Check if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root(),
            Self::NotFound { .. } | Self::InterfaceNotFound { .. }
        )
    }

    /// Check if this is an "already exists" error.
    pub fn is_already_exists(&self) -> bool {
        matches!(self.root(), Self::AlreadyExists { .. })
    }

    /// Check if the kernel rejected the arguments.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self.root(), Self::InvalidArgument { .. })
    }

    /// Check if this is a permission error.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self.root(), Self::PermissionDenied { .. })
    }

    /// Check if the kernel lacks support for the request.
    pub fn is_no_kernel_support(&self) -> bool {
        matches!(self.root(), Self::NoKernelSupport { .. })
    }

    /// Check if this is a local decode failure.
    pub fn is_invalid_wire_format(&self) -> bool {
        matches!(self.root(), Self::InvalidWireFormat(_))
    }
}
