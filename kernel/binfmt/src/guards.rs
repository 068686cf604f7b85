//! Owners of the resources that are acquired while a task is created.
//!
//! Each guard gives its resource back when it is dropped, so an early return from the activation path unwinds
//! everything that was acquired so far in reverse order.
//! Once a resource is handed to its final owner, the guard is defused and forgets about it.
use core::mem::ManuallyDrop;
use core::ptr;
use ksync::Guard;

use crate::binary::AddrEnv;
use crate::errors::{AddrEnvOp, Errno, ExecError, Resource};
use crate::iface::{ActivateError, Kernel, SavedAddrEnv};
use crate::tcb::{StackBlock, TaskControlBlock, TaskType, TcbHandle};
use core::ops::{Deref, DerefMut};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum TcbState {
    /// only memory has been allocated; the scheduler does not know about it
    Allocated,
    /// the scheduler may have set the task up and must take it apart again
    Initialized,
}

/// A task control block that has not been handed to the scheduler yet
pub(crate) struct TcbGuard<'k, K: Kernel> {
    kernel: &'k K,
    tcb: TcbHandle,
    state: TcbState,
}

impl<'k, K: Kernel> TcbGuard<'k, K> {
    pub fn allocate(kernel: &'k K) -> Result<Self, ExecError> {
        let tcb = TcbHandle::allocate(kernel.kernel_heap()).map_err(|e| {
            log::error!("failed to allocate task control block: {}", e);
            ExecError::OutOfMemory(Resource::Tcb)
        })?;
        Ok(Self {
            kernel,
            tcb,
            state: TcbState::Allocated,
        })
    }

    /// From now on, undoing means releasing the task through the scheduler instead of only freeing its memory.
    ///
    /// The stack must be detached before the release because it is returned separately.
    pub fn begin_init(mut self) -> Self {
        self.state = TcbState::Initialized;
        self
    }

    /// Pass the task to the scheduler.
    ///
    /// If the scheduler hands it back, the task is released before returning.
    pub fn activate(self) -> Result<(), ExecError> {
        let kernel = self.kernel;
        let tcb = self.defuse();
        kernel
            .activate_task(tcb)
            .map_err(|ActivateError { tcb, errno }| {
                log::error!("failed to activate task: {}", errno);
                drop(TcbGuard {
                    kernel,
                    tcb,
                    state: TcbState::Initialized,
                });
                ExecError::Activation(errno)
            })
    }

    fn defuse(self) -> TcbHandle {
        let this = ManuallyDrop::new(self);
        // this is never dropped so the handle is moved out exactly once
        unsafe { ptr::read(&this.tcb) }
    }
}

impl<K: Kernel> Deref for TcbGuard<'_, K> {
    type Target = TaskControlBlock;

    fn deref(&self) -> &Self::Target {
        &self.tcb
    }
}

impl<K: Kernel> DerefMut for TcbGuard<'_, K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.tcb
    }
}

impl<K: Kernel> Drop for TcbGuard<'_, K> {
    fn drop(&mut self) {
        let tcb = unsafe { ptr::read(&self.tcb) };
        match self.state {
            TcbState::Allocated => {
                log::trace!("freeing unused task control block");
                unsafe { tcb.free(self.kernel.kernel_heap()) }
            }
            TcbState::Initialized => {
                let mut tcb = tcb;
                tcb.detach_stack();
                log::trace!("releasing task {}", tcb.pid);
                self.kernel.release_tcb(tcb, TaskType::Task);
            }
        }
    }
}

/// An address environment that is installed in place of the callers one.
///
/// While it exists, the address environment switch lock is held.
pub(crate) struct AddrEnvGuard<'k, 'b, K: Kernel> {
    kernel: &'k K,
    addrenv: &'b AddrEnv,
    saved: SavedAddrEnv,
    _window: Guard<'k, ()>,
}

impl<'k, 'b, K: Kernel> AddrEnvGuard<'k, 'b, K> {
    /// Install `addrenv` and set up the user heap inside of it
    pub fn select(kernel: &'k K, addrenv: &'b AddrEnv, heap_vbase: usize) -> Result<Self, ExecError> {
        let window = kernel.switch_lock().spin_lock();
        let saved = kernel.select(addrenv).map_err(|errno| {
            log::error!("failed to select address environment: {}", errno);
            ExecError::AddressEnvironment {
                op: AddrEnvOp::Select,
                errno,
            }
        })?;
        let guard = Self {
            kernel,
            addrenv,
            saved,
            _window: window,
        };

        let heap_size = kernel.heap_size(addrenv);
        log::trace!("initializing user heap at {:#x} ({} bytes)", heap_vbase, heap_size);
        unsafe { kernel.initialize_user_heap(heap_vbase, heap_size) };

        Ok(guard)
    }

    pub fn addrenv(&self) -> &'b AddrEnv {
        self.addrenv
    }

    /// Reinstate the callers address environment and release the switch lock
    pub fn restore(self) -> Result<(), Errno> {
        let this = ManuallyDrop::new(self);
        let (saved, window) = unsafe { (ptr::read(&this.saved), ptr::read(&this._window)) };
        let result = this.kernel.restore(saved);
        drop(window);
        result
    }
}

impl<K: Kernel> Drop for AddrEnvGuard<'_, '_, K> {
    fn drop(&mut self) {
        let saved = SavedAddrEnv::new(self.saved.token());
        if let Err(errno) = self.kernel.restore(saved) {
            log::warn!(
                "could not restore address environment while unwinding: {}",
                errno
            );
        }
    }
}

/// A task stack that was allocated from the user heap of the installed address environment
pub(crate) struct StackGuard<'k, K: Kernel> {
    kernel: &'k K,
    stack: StackBlock,
}

impl<'k, K: Kernel> StackGuard<'k, K> {
    pub fn allocate(kernel: &'k K, size: usize) -> Result<Self, ExecError> {
        let stack = StackBlock::allocate(kernel.user_heap(), size).map_err(|e| {
            log::error!("failed to allocate {} byte stack: {}", size, e);
            ExecError::OutOfMemory(Resource::Stack)
        })?;
        Ok(Self { kernel, stack })
    }

    pub fn stack(&self) -> &StackBlock {
        &self.stack
    }

    /// The stack now belongs to a running task
    pub fn defuse(self) -> StackBlock {
        let this = ManuallyDrop::new(self);
        unsafe { ptr::read(&this.stack) }
    }
}

impl<K: Kernel> Drop for StackGuard<'_, K> {
    fn drop(&mut self) {
        let stack = unsafe { ptr::read(&self.stack) };
        log::trace!("freeing stack at {:p}", stack.as_ptr());
        unsafe { stack.free(self.kernel.user_heap()) }
    }
}
