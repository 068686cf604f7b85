use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::errors::InvalidDescriptor;

/// Number of allocation slots a loaded binary keeps track of
pub const BINFMT_NALLOC: usize = 3;

/// Default scheduling priority of newly executed binaries
pub const SCHED_PRIORITY_DEFAULT: u8 = 100;

/// The function at which a task starts executing.
///
/// It receives the arguments of the task and returns its exit status.
pub type EntryPoint = fn(&[String]) -> i32;

/// A static constructor of a loaded binary
pub type Ctor = fn();

/// An address environment which was prepared by the loader and describes the memory mappings of one binary.
///
/// The contents are only interpreted by the [`AddressEnvironments`](crate::AddressEnvironments) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddrEnv {
    pub id: u32,
    pub heap_pages: usize,
}

/// The result of loading an executable image, consumed by [`exec_module`](crate::exec_module)
pub struct BinaryDescriptor {
    pub filename: String,
    pub entrypt: Option<EntryPoint>,
    pub stacksize: usize,
    pub priority: u8,
    pub argv: Vec<String>,
    pub addrenv: Option<AddrEnv>,
    /// static constructors in the order in which they must run
    pub ctors: Vec<Ctor>,
    /// allocations made while loading; the first one is the data space of position independent code
    pub alloc: [Option<usize>; BINFMT_NALLOC],
}

impl BinaryDescriptor {
    pub fn new(filename: impl Into<String>, entrypt: EntryPoint, stacksize: usize) -> Self {
        Self {
            filename: filename.into(),
            entrypt: Some(entrypt),
            stacksize,
            priority: SCHED_PRIORITY_DEFAULT,
            argv: Vec::new(),
            addrenv: None,
            ctors: Vec::new(),
            alloc: [None; BINFMT_NALLOC],
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_addrenv(mut self, addrenv: AddrEnv) -> Self {
        self.addrenv = Some(addrenv);
        self
    }

    pub fn with_ctors(mut self, ctors: impl Into<Vec<Ctor>>) -> Self {
        self.ctors = ctors.into();
        self
    }

    pub fn with_pic_base(mut self, base: usize) -> Self {
        self.alloc[0] = Some(base);
        self
    }

    pub fn nctors(&self) -> usize {
        self.ctors.len()
    }

    pub fn pic_base(&self) -> Option<usize> {
        self.alloc[0]
    }

    /// Check that the descriptor carries everything needed to start a task from it.
    ///
    /// A missing data-space base is not an error; position independent code then starts without one.
    pub fn validate(&self) -> Result<EntryPoint, InvalidDescriptor> {
        let entry = self.entrypt.ok_or(InvalidDescriptor::MissingEntryPoint)?;
        if self.stacksize == 0 {
            return Err(InvalidDescriptor::ZeroStackSize);
        }
        Ok(entry)
    }
}

impl fmt::Debug for BinaryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryDescriptor")
            .field("filename", &self.filename)
            .field("entrypt", &self.entrypt.map(|e| e as usize as *const ()))
            .field("stacksize", &self.stacksize)
            .field("priority", &self.priority)
            .field("argv", &self.argv)
            .field("addrenv", &self.addrenv)
            .field("nctors", &self.ctors.len())
            .field("alloc", &self.alloc)
            .finish()
    }
}
