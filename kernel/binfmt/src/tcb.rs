//! The task control block and the handles through which it travels between the activator and the scheduler
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use allocators::{AllocError, AllocInit, Allocator};
use bitflags::bitflags;
use core::alloc::{Layout, LayoutError};
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};

use crate::binary::{AddrEnv, BinaryDescriptor, EntryPoint};

/// Alignment of every task stack
pub const STACK_ALIGN: usize = 16;

/// The layout of a task stack of the given size
pub fn stack_layout(size: usize) -> Result<Layout, LayoutError> {
    Layout::from_size_align(size, STACK_ALIGN)
}

/// Identifier of a task.
///
/// It is assigned by the scheduler during task initialization.
/// The value `0` means that no pid has been assigned yet.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Pid(u32);

impl Pid {
    pub const UNASSIGNED: Self = Self(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of task that is handed to [`TaskScheduler::release_tcb`](crate::TaskScheduler::release_tcb).
///
/// Loaded binaries always become normal user tasks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TaskType {
    Task,
}

bitflags! {
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
    pub struct GroupFlags: u8 {
        /// The group owns a cloned address environment
        const ADDRENV = 1 << 0;
    }
}

/// State that is shared by all tasks of a group
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TaskGroup {
    pub addrenv: Option<AddrEnv>,
    pub flags: GroupFlags,
}

/// The register state with which a task is started
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct InitialState {
    pub pc: usize,
    pub sp: usize,
    /// base of the data space which position independent code addresses its globals from
    pub pic_base: Option<usize>,
}

/// A function that the scheduler runs on a new task before its entry point
pub struct StartHook {
    func: fn(&BinaryDescriptor),
    arg: Arc<BinaryDescriptor>,
}

impl StartHook {
    pub fn new(func: fn(&BinaryDescriptor), arg: Arc<BinaryDescriptor>) -> Self {
        Self { func, arg }
    }

    pub fn run(self) {
        (self.func)(&self.arg)
    }
}

impl fmt::Debug for StartHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartHook")
            .field("func", &(self.func as usize as *const ()))
            .field("arg", &self.arg.filename)
            .finish()
    }
}

/// Everything the kernel knows about a task
pub struct TaskControlBlock {
    pub pid: Pid,
    pub name: String,
    pub task_type: TaskType,
    pub priority: u8,
    pub entry: Option<EntryPoint>,
    pub argv: Vec<String>,
    /// the stack memory this task owns, if any
    pub stack_alloc_ptr: Option<NonNull<u8>>,
    pub adj_stack_size: usize,
    pub dspace: Option<usize>,
    pub xcp: InitialState,
    pub group: TaskGroup,
    pub starthook: Option<StartHook>,
}

// stack_alloc_ptr is exclusively owned by the task
unsafe impl Send for TaskControlBlock {}

impl TaskControlBlock {
    /// A control block in which nothing is set up yet
    pub const fn empty() -> Self {
        Self {
            pid: Pid::UNASSIGNED,
            name: String::new(),
            task_type: TaskType::Task,
            priority: 0,
            entry: None,
            argv: Vec::new(),
            stack_alloc_ptr: None,
            adj_stack_size: 0,
            dspace: None,
            xcp: InitialState {
                pc: 0,
                sp: 0,
                pic_base: None,
            },
            group: TaskGroup {
                addrenv: None,
                flags: GroupFlags::empty(),
            },
            starthook: None,
        }
    }

    /// Remove the stack from this task so that releasing the task does not free it
    pub fn detach_stack(&mut self) -> Option<NonNull<u8>> {
        self.stack_alloc_ptr.take()
    }
}

impl fmt::Debug for TaskControlBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskControlBlock")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("task_type", &self.task_type)
            .field("priority", &self.priority)
            .field("entry", &self.entry.map(|e| e as usize as *const ()))
            .field("argv", &self.argv)
            .field("stack_alloc_ptr", &self.stack_alloc_ptr)
            .field("adj_stack_size", &self.adj_stack_size)
            .field("dspace", &self.dspace)
            .field("xcp", &self.xcp)
            .field("group", &self.group)
            .field("starthook", &self.starthook)
            .finish()
    }
}

/// Owning handle to a [`TaskControlBlock`] that lives on the kernel heap.
///
/// The handle is not freed when dropped.
/// Whoever holds it is responsible for either handing it to the scheduler or returning it with
/// [`free`](TcbHandle::free).
#[must_use]
pub struct TcbHandle {
    ptr: NonNull<TaskControlBlock>,
}

unsafe impl Send for TcbHandle {}

impl TcbHandle {
    pub const LAYOUT: Layout = Layout::new::<TaskControlBlock>();

    /// Allocate zeroed memory for a control block from `heap` and initialize it to [`TaskControlBlock::empty`]
    pub fn allocate<A: Allocator>(heap: &A) -> Result<Self, AllocError> {
        let ptr = heap
            .allocate(Self::LAYOUT, AllocInit::Zeroed)?
            .cast::<TaskControlBlock>();
        unsafe { ptr.as_ptr().write(TaskControlBlock::empty()) };
        Ok(Self { ptr })
    }

    /// Drop the control block and return its memory to `heap`
    ///
    /// # Safety
    /// The handle must have been allocated from `heap`.
    pub unsafe fn free<A: Allocator>(self, heap: &A) {
        ptr::drop_in_place(self.ptr.as_ptr());
        heap.deallocate(self.ptr.cast(), Self::LAYOUT);
    }
}

impl Deref for TcbHandle {
    type Target = TaskControlBlock;

    fn deref(&self) -> &Self::Target {
        unsafe { self.ptr.as_ref() }
    }
}

impl DerefMut for TcbHandle {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { self.ptr.as_mut() }
    }
}

impl fmt::Debug for TcbHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TcbHandle").field(&self.ptr).finish()
    }
}

/// A block of stack memory that was allocated for a new task
#[derive(Debug)]
pub struct StackBlock {
    ptr: NonNull<u8>,
    size: usize,
}

unsafe impl Send for StackBlock {}

impl StackBlock {
    pub fn allocate<A: Allocator>(heap: &A, size: usize) -> Result<Self, AllocError> {
        let ptr = heap
            .allocate(stack_layout(size)?, AllocInit::Uninitialized)?
            .cast::<u8>();
        Ok(Self { ptr, size })
    }

    /// # Safety
    /// The block must have been allocated from `heap` and must not be referenced by any task anymore.
    pub unsafe fn free<A: Allocator>(self, heap: &A) {
        // the layout was valid when the block was allocated
        let layout = Layout::from_size_align_unchecked(self.size, STACK_ALIGN);
        heap.deallocate(self.ptr, layout);
    }

    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub fn size(&self) -> usize {
        self.size
    }
}
