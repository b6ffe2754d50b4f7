//! Process-level system sampling.

use sysinfo::System;

/// Resident memory of this process in bytes.
///
/// Returns 0 when the process cannot be inspected; the status page then
/// simply shows an empty measurement instead of failing.
pub fn process_resident_bytes() -> u64 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0;
    };
    let mut system = System::new();
    system.refresh_processes();
    system.process(pid).map(|p| p.memory()).unwrap_or(0)
}
