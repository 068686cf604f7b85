//! Error types of the activation path
use core::fmt;

use thiserror_no_std::Error;

use crate::tcb::Pid;

/// A kernel error number as reported by the collaborating subsystems (scheduler, address environments).
///
/// Values follow the conventional POSIX numbering so that they can be handed to userspace unchanged.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct Errno(pub i32);

impl Errno {
    pub const ESRCH: Self = Self(3);
    pub const EAGAIN: Self = Self(11);
    pub const ENOMEM: Self = Self(12);
    pub const EFAULT: Self = Self(14);
    pub const EINVAL: Self = Self(22);

    /// The negated value which is returned from syscall-like interfaces on failure
    pub const fn negated(self) -> isize {
        -(self.0 as isize)
    }

    /// Recover an error number from a negated syscall-like return value.
    ///
    /// Returns `None` if `ret` does not denote a failure.
    pub const fn from_negated(ret: isize) -> Option<Self> {
        if ret < 0 && ret > i32::MIN as isize {
            Some(Self(-ret as i32))
        } else {
            None
        }
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::ESRCH => "ESRCH",
            Self::EAGAIN => "EAGAIN",
            Self::ENOMEM => "ENOMEM",
            Self::EFAULT => "EFAULT",
            Self::EINVAL => "EINVAL",
            _ => return None,
        })
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "errno {}", self.0),
        }
    }
}

/// The reason why a binary descriptor was rejected before anything was allocated
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum InvalidDescriptor {
    MissingEntryPoint,
    ZeroStackSize,
}

impl fmt::Display for InvalidDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingEntryPoint => "no entry point",
            Self::ZeroStackSize => "stack size is zero",
        })
    }
}

/// A resource that is allocated while a task is created
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Resource {
    Tcb,
    Stack,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tcb => "task control block",
            Self::Stack => "task stack",
        })
    }
}

/// An operation on address environments
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AddrEnvOp {
    Select,
    Clone,
}

impl fmt::Display for AddrEnvOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Select => "select",
            Self::Clone => "clone",
        })
    }
}

/// Coarse classification of an [`ExecError`]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorKind {
    InvalidArgument,
    OutOfMemory,
    AddressEnvironment,
    TaskInit,
    Activation,
}

/// The error returned by [`exec_module`](crate::exec_module).
///
/// Apart from [`EnvironmentLost`](ExecError::EnvironmentLost), every error guarantees that all resources which were
/// acquired for the new task have been returned before the error was reported.
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum ExecError {
    #[error("invalid binary descriptor: {0}")]
    InvalidArgument(InvalidDescriptor),
    #[error("out of memory while allocating the {0}")]
    OutOfMemory(Resource),
    #[error("could not {op} the address environment: {errno}")]
    AddressEnvironment { op: AddrEnvOp, errno: Errno },
    #[error("task initialization failed: {0}")]
    TaskInit(Errno),
    #[error("task activation failed: {0}")]
    Activation(Errno),
    /// The task was activated and is running, but the callers address environment could not be reinstated
    /// afterwards.
    ///
    /// The task cannot be taken back from the scheduler so nothing is rolled back.
    /// The calling context is left in an inconsistent state and should be treated as fatal.
    #[error("task {pid} is running but the address environment of the caller could not be restored: {errno}")]
    EnvironmentLost { pid: Pid, errno: Errno },
}

impl ExecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::OutOfMemory(_) => ErrorKind::OutOfMemory,
            Self::AddressEnvironment { .. } | Self::EnvironmentLost { .. } => {
                ErrorKind::AddressEnvironment
            }
            Self::TaskInit(_) => ErrorKind::TaskInit,
            Self::Activation(_) => ErrorKind::Activation,
        }
    }

    /// The error number that is reported to syscall-like callers
    pub fn errno(&self) -> Errno {
        match self {
            Self::InvalidArgument(_) => Errno::EINVAL,
            Self::OutOfMemory(_) => Errno::ENOMEM,
            Self::AddressEnvironment { errno, .. }
            | Self::EnvironmentLost { errno, .. }
            | Self::TaskInit(errno)
            | Self::Activation(errno) => *errno,
        }
    }
}

impl From<ExecError> for Errno {
    fn from(value: ExecError) -> Self {
        value.errno()
    }
}
