//! A [`log`] implementation that writes formatted records to a kernel console.
//!
//! The console itself is platform specific and is therefore handed to the logger as a plain sink function.
#![no_std]

mod kernel_logger;

pub use kernel_logger::{ConsoleSink, KernelLogger};
