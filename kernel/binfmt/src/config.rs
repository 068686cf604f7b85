//! Build time configuration of the activation path
//!
//! The defaults are taken from the crate features `addrenv`, `pic` and `constructors`.

/// Virtual address at which the heap of a freshly installed address environment starts
pub const ARCH_HEAP_VBASE: usize = 0x8000_0000;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ExecConfig {
    /// Install the address environment of a binary while its task is created and clone it into the new task group
    pub addrenv: bool,
    /// Require a data-space base and bind it into the initial register state of the new task
    pub pic: bool,
    /// Register a start hook that runs the constructors of the binary on the new task
    pub constructors: bool,
    /// Where the user heap of an installed address environment begins
    pub heap_vbase: usize,
}

impl ExecConfig {
    pub const DEFAULT: Self = Self {
        addrenv: cfg!(feature = "addrenv"),
        pic: cfg!(feature = "pic"),
        constructors: cfg!(feature = "constructors"),
        heap_vbase: ARCH_HEAP_VBASE,
    };

    /// A configuration with every optional step disabled
    pub const fn minimal() -> Self {
        Self {
            addrenv: false,
            pic: false,
            constructors: false,
            heap_vbase: ARCH_HEAP_VBASE,
        }
    }

    pub const fn with_addrenv(mut self, enabled: bool) -> Self {
        self.addrenv = enabled;
        self
    }

    pub const fn with_pic(mut self, enabled: bool) -> Self {
        self.pic = enabled;
        self
    }

    pub const fn with_constructors(mut self, enabled: bool) -> Self {
        self.constructors = enabled;
        self
    }

    pub const fn with_heap_vbase(mut self, heap_vbase: usize) -> Self {
        self.heap_vbase = heap_vbase;
        self
    }
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
