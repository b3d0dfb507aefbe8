//! Driver error type

use core::fmt;

use crate::sync::Interrupted;

/// Everything that can go wrong talking to an HDA controller or codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HdaError {
    /// A blocking wait was cut short by a signal
    Interrupted,
    /// Device already opened exclusively
    Busy,
    /// Unsupported request or out-of-range argument
    InvalidArgument,
    /// Page frame or heap allocation failed
    NoMemory,
    /// The PCM source could not be read
    Fault,
    /// No such device / device not brought up
    NoDevice,
    /// Hardware lacks a capability the driver needs
    Unsupported(&'static str),
    /// Malformed hardware response or broken driver invariant
    Malformed(&'static str),
    /// A bounded register handshake did not complete
    Timeout(&'static str),
}

impl HdaError {
    /// Negative errno for the syscall layer
    pub fn to_errno(self) -> i64 {
        match self {
            Self::Interrupted => -4,                      // EINTR
            Self::Busy => -16,                            // EBUSY
            Self::InvalidArgument => -22,                 // EINVAL
            Self::NoMemory => -12,                        // ENOMEM
            Self::Fault => -14,                           // EFAULT
            Self::NoDevice | Self::Unsupported(_) => -19, // ENODEV
            Self::Malformed(_) | Self::Timeout(_) => -5,  // EIO
        }
    }
}

impl fmt::Display for HdaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Interrupted => write!(f, "interrupted"),
            Self::Busy => write!(f, "device busy"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::NoMemory => write!(f, "out of memory"),
            Self::Fault => write!(f, "bad source buffer"),
            Self::NoDevice => write!(f, "no such device"),
            Self::Unsupported(what) => write!(f, "unsupported: {}", what),
            Self::Malformed(what) => write!(f, "malformed: {}", what),
            Self::Timeout(what) => write!(f, "timeout: {}", what),
        }
    }
}

impl From<Interrupted> for HdaError {
    fn from(_: Interrupted) -> Self {
        HdaError::Interrupted
    }
}

pub type Result<T> = core::result::Result<T, HdaError>;
