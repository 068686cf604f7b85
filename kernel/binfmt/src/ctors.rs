use crate::binary::BinaryDescriptor;

/// Run the static constructors of a binary in order.
///
/// This is registered as the start hook of a new task and therefore runs on that task, before its entry point.
pub fn exec_ctors(binp: &BinaryDescriptor) {
    for (i, ctor) in binp.ctors.iter().enumerate() {
        log::debug!("calling ctor {} at {:p}", i, *ctor as usize as *const ());
        ctor();
    }
}
