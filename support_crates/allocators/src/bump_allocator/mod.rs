//! Bump-Allocator
//!
//! See the [`BumpAllocator`] trait for a detailed description of bump allocators.

mod bump_alloc_trait;
mod forward_alloc;

pub use bump_alloc_trait::BumpAllocator;
pub use forward_alloc::ForwardBumpingAllocator;
