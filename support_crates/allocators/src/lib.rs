//! Allocator interface and implementations used for kernel and user heaps.
//!
//! Heaps are accessed through the [`Allocator`] trait so that code which needs memory (e.g. task creation) does not
//! care whether it is backed by the kernel heap or by the heap of a freshly installed address environment.
#![no_std]

pub mod bump_allocator;

pub use bump_allocator::{BumpAllocator, ForwardBumpingAllocator};

use core::alloc::{Layout, LayoutError};
use core::ptr::NonNull;
use thiserror_no_std::Error;

/// The error returned when an allocation fails
#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum AllocError {
    #[error("the allocator has insufficient free memory to allocate the requested amount")]
    InsufficientMemory,
    #[error("zero-sized allocations are not supported")]
    ZeroSized,
    #[error("the requested layout could not be fulfilled")]
    LayoutError(#[from] LayoutError),
}

/// A desired initial state for allocated memory
#[derive(Default, Debug, Eq, PartialEq, Clone, Copy)]
pub enum AllocInit {
    /// The memory is returned as-is from the allocator.
    /// It may potentially contain old data and treating it as valid is undefined behavior.
    Uninitialized,

    /// Memory is filled with zeros before being returned to the caller.
    #[default]
    Zeroed,

    /// Memory is filled with a repetition of the given byte before being returned to the caller.
    Data(u8),
}

/// An implementation of `Allocator` can allocate and deallocate arbitrary blocks of data.
///
/// Implementations must be safe to use from multiple threads at once when they are shared.
pub trait Allocator {
    /// Attempt to allocate a block of memory.
    ///
    /// On success, return a pointer to memory meeting the size and alignment requirements of `layout`.
    ///
    /// The returned block may or may not have its content initialized based on the value of `init`.
    fn allocate(&self, layout: Layout, init: AllocInit) -> Result<NonNull<[u8]>, AllocError>;

    /// Deallocate the given data.
    ///
    /// # Panics
    /// This function may panic if the given `data_ptr` does not lie within the bounds of the allocators backing memory.
    ///
    /// # Safety
    /// The given data must be *currently allocated* from this allocator.
    ///
    /// This means that:
    /// - it was previously returned by [`allocate`](Allocator::allocate) with the same `layout`
    /// - it has not yet been deallocated
    unsafe fn deallocate(&self, data_ptr: NonNull<u8>, layout: Layout);
}

impl<A: Allocator + ?Sized> Allocator for &A {
    fn allocate(&self, layout: Layout, init: AllocInit) -> Result<NonNull<[u8]>, AllocError> {
        (**self).allocate(layout, init)
    }

    unsafe fn deallocate(&self, data_ptr: NonNull<u8>, layout: Layout) {
        (**self).deallocate(data_ptr, layout)
    }
}

/// Fill freshly allocated memory according to `init`
pub(crate) fn initialize(block: &mut [u8], init: AllocInit) {
    match init {
        AllocInit::Zeroed => block.fill(0),
        AllocInit::Data(data) => block.fill(data),
        AllocInit::Uninitialized => {}
    }
}
