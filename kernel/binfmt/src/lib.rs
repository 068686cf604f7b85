//! Activation of loaded binaries as kernel tasks.
//!
//! After a binary loader has produced a [`BinaryDescriptor`], [`exec_module`] turns it into a running task:
//!
//! 1. a task control block is allocated from the kernel heap
//! 2. the address environment of the binary is installed and its user heap is initialized
//! 3. a stack is allocated from the (now current) user heap
//! 4. the scheduler initializes the task
//! 5. the data-space base of position independent code is bound into the initial register state
//! 6. the address environment is cloned into the new task group
//! 7. a start hook is registered that runs the static constructors of the binary via [`exec_ctors`]
//! 8. the task is activated and the address environment of the caller is restored
//!
//! If any step fails, everything done by the previous steps is undone in reverse order.
//!
//! The kernel subsystems which the activation relies on are abstracted by the traits in [`Kernel`].
#![no_std]

extern crate alloc;

mod binary;
mod config;
mod ctors;
mod errors;
mod exec_module;
mod guards;
mod iface;
mod tcb;

pub use binary::{AddrEnv, BinaryDescriptor, Ctor, EntryPoint, BINFMT_NALLOC, SCHED_PRIORITY_DEFAULT};
pub use config::{ExecConfig, ARCH_HEAP_VBASE};
pub use ctors::exec_ctors;
pub use errors::{AddrEnvOp, Errno, ErrorKind, ExecError, InvalidDescriptor, Resource};
pub use exec_module::exec_module;
pub use iface::{
    ActivateError, AddressEnvironments, ArchState, Heaps, Kernel, SavedAddrEnv, TaskParams,
    TaskScheduler,
};
pub use tcb::{
    stack_layout, GroupFlags, InitialState, Pid, StackBlock, StartHook, TaskControlBlock, TaskGroup,
    TaskType, TcbHandle, STACK_ALIGN,
};

static_assertions::const_assert!(BINFMT_NALLOC >= 1);
static_assertions::assert_impl_all!(TcbHandle: Send);
static_assertions::assert_impl_all!(BinaryDescriptor: Send, Sync);
static_assertions::assert_impl_all!(StartHook: Send);
