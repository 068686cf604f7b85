//! A kernel simulation which implements the subsystems needed by `exec_module` on top of bump allocators
#![allow(dead_code)]

use allocators::{AllocError, AllocInit, Allocator, BumpAllocator, ForwardBumpingAllocator};
use binfmt::{
    stack_layout, ActivateError, AddrEnv, AddressEnvironments, ArchState, Errno, Heaps,
    InitialState, Pid, SavedAddrEnv, TaskControlBlock, TaskGroup, TaskParams, TaskScheduler,
    TaskType, TcbHandle,
};
use klog::KernelLogger;
use ksync::SpinLock;
use std::alloc::Layout;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::thread::{self, JoinHandle, ThreadId};

pub const PAGE_SIZE: usize = 4096;
pub const HEAP_VBASE: usize = binfmt::ARCH_HEAP_VBASE;
pub const TASK_NAME_SIZE: usize = 31;

const KERNEL_HEAP_SIZE: usize = 256 * 1024;
const FLAT_HEAP_SIZE: usize = 1024 * 1024;

fn console(args: fmt::Arguments) {
    print!("{}", args);
}

static LOGGER: KernelLogger = KernelLogger::new(log::Level::Trace, console);
static LOGGER_INIT: Once = Once::new();

pub fn init_logging() {
    LOGGER_INIT.call_once(|| {
        let _ = LOGGER.install();
    });
}

fn leak_region(size: usize) -> &'static mut [u8] {
    Box::leak(vec![0u8; size].into_boxed_slice())
}

/// An allocator which counts how often it was asked for memory and which can be told to fail the next request
pub struct CountingHeap<A> {
    inner: A,
    calls: AtomicUsize,
    fail_next: AtomicBool,
}

impl<A: Allocator> CountingHeap<A> {
    fn new(inner: A) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A: Allocator> Allocator for CountingHeap<A> {
    fn allocate(&self, layout: Layout, init: AllocInit) -> Result<NonNull<[u8]>, AllocError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AllocError::InsufficientMemory);
        }
        self.inner.allocate(layout, init)
    }

    unsafe fn deallocate(&self, data_ptr: NonNull<u8>, layout: Layout) {
        self.inner.deallocate(data_ptr, layout)
    }
}

/// The heap of one address environment together with the memory backing it
struct EnvHeap {
    heap: ForwardBumpingAllocator<'static>,
    start: usize,
    len: usize,
    inits: AtomicUsize,
}

impl EnvHeap {
    fn new(len: usize) -> Self {
        let region = leak_region(len);
        let start = region.as_mut_ptr() as usize;
        Self {
            heap: ForwardBumpingAllocator::new(region),
            start,
            len,
            inits: AtomicUsize::new(0),
        }
    }
}

/// The user heaps of all address environments of which only the one of the installed environment is visible.
///
/// Every thread is its own calling context with environment `0` (the flat environment) installed initially.
pub struct UserHeaps {
    installed: Mutex<HashMap<ThreadId, usize>>,
    envs: Vec<EnvHeap>,
}

impl UserHeaps {
    fn current_id(&self) -> usize {
        let installed = self.installed.lock().unwrap();
        installed.get(&thread::current().id()).copied().unwrap_or(0)
    }

    fn install(&self, id: usize) -> usize {
        let mut installed = self.installed.lock().unwrap();
        installed.insert(thread::current().id(), id).unwrap_or(0)
    }

    fn current(&self) -> &EnvHeap {
        &self.envs[self.current_id()]
    }
}

impl Allocator for UserHeaps {
    fn allocate(&self, layout: Layout, init: AllocInit) -> Result<NonNull<[u8]>, AllocError> {
        self.current().heap.allocate(layout, init)
    }

    unsafe fn deallocate(&self, data_ptr: NonNull<u8>, layout: Layout) {
        self.current().heap.deallocate(data_ptr, layout)
    }
}

/// Steps of the simulated kernel which can be made to fail once
#[derive(Default)]
pub struct FailPoints {
    pub select: AtomicBool,
    pub restore: AtomicBool,
    pub clone: AtomicBool,
    pub init_task: AtomicBool,
    pub activate: AtomicBool,
}

fn trip(point: &AtomicBool) -> bool {
    point.swap(false, Ordering::SeqCst)
}

/// A task that the scheduler accepted
pub struct RunnableTask {
    pub tcb: TcbHandle,
}

pub struct SimKernel {
    pub kernel_heap: CountingHeap<ForwardBumpingAllocator<'static>>,
    pub user_heap: CountingHeap<UserHeaps>,
    pub fail: FailPoints,
    switch_lock: SpinLock<()>,
    next_pid: AtomicU32,
    pub selects: AtomicUsize,
    pub restores: AtomicUsize,
    pub clones: AtomicUsize,
    pub releases: AtomicUsize,
    pub start_hooks: AtomicUsize,
    runnable: Mutex<BTreeMap<Pid, RunnableTask>>,
}

impl SimKernel {
    /// A kernel with `n_envs` address environments of `env_pages` heap pages each, numbered from `1`
    pub fn new(n_envs: usize, env_pages: usize) -> Self {
        init_logging();
        let mut envs = vec![EnvHeap::new(FLAT_HEAP_SIZE)];
        envs.extend((0..n_envs).map(|_| EnvHeap::new(env_pages * PAGE_SIZE)));
        Self {
            kernel_heap: CountingHeap::new(ForwardBumpingAllocator::new(leak_region(
                KERNEL_HEAP_SIZE,
            ))),
            user_heap: CountingHeap::new(UserHeaps {
                installed: Mutex::new(HashMap::new()),
                envs,
            }),
            fail: FailPoints::default(),
            switch_lock: SpinLock::new(()),
            next_pid: AtomicU32::new(1),
            selects: AtomicUsize::new(0),
            restores: AtomicUsize::new(0),
            clones: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            start_hooks: AtomicUsize::new(0),
            runnable: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn addrenv(id: u32, pages: usize) -> AddrEnv {
        AddrEnv {
            id,
            heap_pages: pages,
        }
    }

    /// Id of the address environment installed in the calling thread
    pub fn current_env(&self) -> usize {
        self.user_heap.inner().current_id()
    }

    pub fn env_allocations(&self, id: usize) -> usize {
        self.user_heap.inner().envs[id].heap.num_allocations()
    }

    pub fn env_inits(&self, id: usize) -> usize {
        self.user_heap.inner().envs[id].inits.load(Ordering::SeqCst)
    }

    pub fn kernel_allocations(&self) -> usize {
        self.kernel_heap.inner().num_allocations()
    }

    pub fn is_switch_locked(&self) -> bool {
        self.switch_lock.is_locked()
    }

    /// Assert that nothing acquired by a failed exec is left over and the caller is in its own environment again
    pub fn assert_clean(&self) {
        assert_eq!(self.kernel_allocations(), 0, "task control block leaked");
        for id in 0..self.user_heap.inner().envs.len() {
            assert_eq!(self.env_allocations(id), 0, "stack leaked in environment {}", id);
        }
        assert_eq!(self.current_env(), 0, "callers address environment not restored");
        assert!(!self.is_switch_locked(), "address environment switch lock still held");
        assert!(self.runnable.lock().unwrap().is_empty());
    }

    pub fn runnable_count(&self) -> usize {
        self.runnable.lock().unwrap().len()
    }

    pub fn is_runnable(&self, pid: Pid) -> bool {
        self.runnable.lock().unwrap().contains_key(&pid)
    }

    pub fn with_task<R>(&self, pid: Pid, f: impl FnOnce(&TaskControlBlock) -> R) -> R {
        let runnable = self.runnable.lock().unwrap();
        f(&runnable[&pid].tcb)
    }

    /// Run a runnable task on its own thread: first its start hook, then its entry point
    pub fn dispatch(&self, pid: Pid) -> JoinHandle<i32> {
        let (hook, entry, argv) = {
            let mut runnable = self.runnable.lock().unwrap();
            let tcb = &mut runnable.get_mut(&pid).expect("task is not runnable").tcb;
            (
                tcb.starthook.take(),
                tcb.entry.expect("task has no entry point"),
                tcb.argv.clone(),
            )
        };
        thread::spawn(move || {
            if let Some(hook) = hook {
                hook.run();
            }
            entry(&argv)
        })
    }
}

impl Heaps for SimKernel {
    type KernelHeap = CountingHeap<ForwardBumpingAllocator<'static>>;
    type UserHeap = CountingHeap<UserHeaps>;

    fn kernel_heap(&self) -> &Self::KernelHeap {
        &self.kernel_heap
    }

    fn user_heap(&self) -> &Self::UserHeap {
        &self.user_heap
    }

    unsafe fn initialize_user_heap(&self, base: usize, size: usize) {
        assert_eq!(base, HEAP_VBASE);
        let env = self.user_heap.inner().current();
        assert!(size <= env.len);
        env.inits.fetch_add(1, Ordering::SeqCst);
        env.heap
            .reinit_raw(env.start as *mut u8, (env.start + size) as *mut u8);
    }
}

impl AddressEnvironments for SimKernel {
    fn switch_lock(&self) -> &SpinLock<()> {
        &self.switch_lock
    }

    fn select(&self, addrenv: &AddrEnv) -> Result<SavedAddrEnv, Errno> {
        assert!(self.switch_lock.is_locked());
        self.selects.fetch_add(1, Ordering::SeqCst);
        if trip(&self.fail.select) {
            return Err(Errno::EFAULT);
        }
        let id = addrenv.id as usize;
        if id == 0 || id >= self.user_heap.inner().envs.len() {
            return Err(Errno::EINVAL);
        }
        let previous = self.user_heap.inner().install(id);
        Ok(SavedAddrEnv::new(previous))
    }

    fn restore(&self, saved: SavedAddrEnv) -> Result<(), Errno> {
        self.restores.fetch_add(1, Ordering::SeqCst);
        if trip(&self.fail.restore) {
            return Err(Errno::EFAULT);
        }
        self.user_heap.inner().install(saved.token());
        Ok(())
    }

    fn clone_into(&self, addrenv: &AddrEnv, group: &mut TaskGroup) -> Result<(), Errno> {
        self.clones.fetch_add(1, Ordering::SeqCst);
        if trip(&self.fail.clone) {
            return Err(Errno::ENOMEM);
        }
        group.addrenv = Some(addrenv.clone());
        Ok(())
    }

    fn heap_size(&self, addrenv: &AddrEnv) -> usize {
        addrenv.heap_pages * PAGE_SIZE
    }
}

impl TaskScheduler for SimKernel {
    fn init_task(&self, tcb: &mut TaskControlBlock, params: TaskParams<'_>) -> Result<(), Errno> {
        // the stack is bound before anything can fail
        tcb.stack_alloc_ptr = Some(params.stack);
        tcb.adj_stack_size = params.stack_size;
        if trip(&self.fail.init_task) {
            return Err(Errno::EAGAIN);
        }

        tcb.pid = Pid::new(self.next_pid.fetch_add(1, Ordering::SeqCst));
        tcb.name = params.name.chars().take(TASK_NAME_SIZE).collect();
        tcb.task_type = TaskType::Task;
        tcb.priority = params.priority;
        tcb.entry = Some(params.entry);
        tcb.argv = params.argv.to_vec();
        self.initial_state(tcb);
        Ok(())
    }

    fn release_tcb(&self, mut tcb: TcbHandle, task_type: TaskType) {
        assert_eq!(task_type, TaskType::Task);
        self.releases.fetch_add(1, Ordering::SeqCst);
        if let Some(stack) = tcb.stack_alloc_ptr.take() {
            let layout = stack_layout(tcb.adj_stack_size).unwrap();
            unsafe { self.user_heap.deallocate(stack, layout) };
        }
        unsafe { tcb.free(&self.kernel_heap) };
    }

    fn activate_task(&self, tcb: TcbHandle) -> Result<(), ActivateError> {
        if trip(&self.fail.activate) {
            return Err(ActivateError {
                tcb,
                errno: Errno::ESRCH,
            });
        }
        let pid = tcb.pid;
        self.runnable
            .lock()
            .unwrap()
            .insert(pid, RunnableTask { tcb });
        Ok(())
    }

    fn register_start_hook(&self, tcb: &mut TaskControlBlock, hook: binfmt::StartHook) {
        self.start_hooks.fetch_add(1, Ordering::SeqCst);
        tcb.starthook = Some(hook);
    }
}

impl ArchState for SimKernel {
    fn initial_state(&self, tcb: &mut TaskControlBlock) {
        tcb.xcp = InitialState {
            pc: tcb.entry.map_or(0, |entry| entry as usize),
            sp: tcb
                .stack_alloc_ptr
                .map_or(0, |stack| stack.as_ptr() as usize + tcb.adj_stack_size),
            pic_base: tcb.dspace,
        };
    }
}
