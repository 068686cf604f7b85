//! Interfaces of the kernel subsystems that are used while a binary is turned into a task
use alloc::string::String;
use allocators::Allocator;
use core::fmt;
use core::ptr::NonNull;
use ksync::SpinLock;

use crate::binary::{AddrEnv, EntryPoint};
use crate::errors::Errno;
use crate::tcb::{StartHook, TaskControlBlock, TaskGroup, TaskType, TcbHandle};

/// Access to the kernel heap and to the heap of the currently installed address environment
pub trait Heaps {
    type KernelHeap: Allocator;
    type UserHeap: Allocator;

    fn kernel_heap(&self) -> &Self::KernelHeap;

    /// The user heap of whichever address environment is currently installed
    fn user_heap(&self) -> &Self::UserHeap;

    /// (Re)initialize the user heap of the installed address environment to span `size` bytes from `base`.
    ///
    /// # Safety
    /// The region must be mapped in the installed address environment and must not be in use.
    unsafe fn initialize_user_heap(&self, base: usize, size: usize);
}

/// Token describing the address environment that was installed before [`AddressEnvironments::select`]
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub struct SavedAddrEnv {
    token: usize,
}

impl SavedAddrEnv {
    pub const fn new(token: usize) -> Self {
        Self { token }
    }

    pub const fn token(&self) -> usize {
        self.token
    }
}

pub trait AddressEnvironments {
    /// Lock which must be held for as long as an address environment other than the callers own is installed
    fn switch_lock(&self) -> &SpinLock<()>;

    /// Install `addrenv` and return what has to be reinstated afterwards
    fn select(&self, addrenv: &AddrEnv) -> Result<SavedAddrEnv, Errno>;

    fn restore(&self, saved: SavedAddrEnv) -> Result<(), Errno>;

    /// Give `group` its own reference to `addrenv`
    fn clone_into(&self, addrenv: &AddrEnv, group: &mut TaskGroup) -> Result<(), Errno>;

    /// Size of the heap region that `addrenv` provides
    fn heap_size(&self, addrenv: &AddrEnv) -> usize;
}

/// What the scheduler needs to know to initialize a task
pub struct TaskParams<'a> {
    pub name: &'a str,
    pub priority: u8,
    pub stack: NonNull<u8>,
    pub stack_size: usize,
    pub entry: EntryPoint,
    pub argv: &'a [String],
}

/// The scheduler refused to activate a task and handed it back
pub struct ActivateError {
    pub tcb: TcbHandle,
    pub errno: Errno,
}

impl fmt::Debug for ActivateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivateError")
            .field("pid", &self.tcb.pid)
            .field("errno", &self.errno)
            .finish()
    }
}

pub trait TaskScheduler {
    /// Fill in `tcb` for a new task, assign it a pid and bind the given stack to it.
    ///
    /// On failure the stack may or may not have been bound.
    fn init_task(&self, tcb: &mut TaskControlBlock, params: TaskParams<'_>) -> Result<(), Errno>;

    /// Release an initialized task that never became runnable, including every resource still attached to it
    fn release_tcb(&self, tcb: TcbHandle, task_type: TaskType);

    /// Make the task runnable.
    ///
    /// Ownership of the task passes to the scheduler unless it is handed back in the error.
    fn activate_task(&self, tcb: TcbHandle) -> Result<(), ActivateError>;

    /// Arrange for `hook` to run on the new task before its entry point
    fn register_start_hook(&self, tcb: &mut TaskControlBlock, hook: StartHook) {
        tcb.starthook = Some(hook);
    }
}

pub trait ArchState {
    /// Set up the register state with which the task starts, taking its data-space base into account
    fn initial_state(&self, tcb: &mut TaskControlBlock);
}

/// All kernel services needed by [`exec_module`](crate::exec_module)
pub trait Kernel: Heaps + AddressEnvironments + TaskScheduler + ArchState {}

impl<K> Kernel for K where K: Heaps + AddressEnvironments + TaskScheduler + ArchState {}
