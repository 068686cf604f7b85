use alloc::sync::Arc;

use crate::binary::BinaryDescriptor;
use crate::config::ExecConfig;
use crate::ctors::exec_ctors;
use crate::errors::{AddrEnvOp, ExecError};
use crate::guards::{AddrEnvGuard, StackGuard, TcbGuard};
use crate::iface::{Kernel, TaskParams};
use crate::tcb::{GroupFlags, Pid, StartHook};

/// Start a new task from a loaded binary and return its pid.
///
/// The task is created inside the address environment of the binary (if it has one), gets a stack from the user heap
/// of that environment, and is handed to the scheduler.
/// When the binary has static constructors, they are run on the new task before its entry point.
///
/// On failure every resource acquired so far is given back in reverse order of acquisition and the address
/// environment of the caller is active again.
/// The only exception is [`ExecError::EnvironmentLost`] which is reported when the task is already running.
pub fn exec_module<K: Kernel>(
    kernel: &K,
    config: &ExecConfig,
    binp: &Arc<BinaryDescriptor>,
) -> Result<Pid, ExecError> {
    let entry = binp.validate().map_err(|e| {
        log::error!("refusing to execute {}: {}", binp.filename, e);
        ExecError::InvalidArgument(e)
    })?;

    log::debug!("executing {}", binp.filename);

    let tcb = TcbGuard::allocate(kernel)?;

    let env = match binp.addrenv.as_ref() {
        Some(addrenv) if config.addrenv => {
            Some(AddrEnvGuard::select(kernel, addrenv, config.heap_vbase)?)
        }
        _ => None,
    };

    let stack = StackGuard::allocate(kernel, binp.stacksize)?;

    let mut task = tcb.begin_init();
    kernel
        .init_task(
            &mut task,
            TaskParams {
                name: &binp.filename,
                priority: binp.priority,
                stack: stack.stack().as_ptr(),
                stack_size: stack.stack().size(),
                entry,
                argv: &binp.argv,
            },
        )
        .map_err(|errno| {
            log::error!("failed to initialize task for {}: {}", binp.filename, errno);
            ExecError::TaskInit(errno)
        })?;
    log::trace!("initialized task {} with a {} byte stack", task.pid, binp.stacksize);

    if config.pic {
        task.dspace = binp.pic_base();
        kernel.initial_state(&mut task);
    }

    if let Some(env) = &env {
        kernel
            .clone_into(env.addrenv(), &mut task.group)
            .map_err(|errno| {
                log::error!("failed to clone address environment: {}", errno);
                ExecError::AddressEnvironment {
                    op: AddrEnvOp::Clone,
                    errno,
                }
            })?;
        task.group.flags |= GroupFlags::ADDRENV;
    }

    if config.constructors {
        kernel.register_start_hook(&mut task, StartHook::new(exec_ctors, Arc::clone(binp)));
    }

    let pid = task.pid;
    log::trace!("activating task {}", pid);
    task.activate()?;
    stack.defuse();

    if let Some(env) = env {
        env.restore().map_err(|errno| {
            log::error!(
                "task {} is running but the previous address environment could not be restored: {}",
                pid,
                errno
            );
            ExecError::EnvironmentLost { pid, errno }
        })?;
    }

    log::debug!("started {} as task {}", binp.filename, pid);
    Ok(pid)
}
