//! Process-name lookup via the `sysinfo` crate.
//!
//! Used to annotate application elements with the executable name their
//! accessibility API does not expose.  The `sysinfo::System` is shared
//! behind `parking_lot::Mutex` + `OnceLock` and refreshed per pid, so a
//! lookup costs one process-table read rather than a full scan.

use std::sync::OnceLock;

use parking_lot::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};

static SYSTEM: OnceLock<Mutex<System>> = OnceLock::new();

fn get_system() -> &'static Mutex<System> {
    SYSTEM.get_or_init(|| {
        Mutex::new(System::new_with_specifics(
            RefreshKind::nothing().with_processes(ProcessRefreshKind::nothing()),
        ))
    })
}

/// Executable name for `pid`, or `None` if no such process is running.
pub fn process_name(pid: u32) -> Option<String> {
    if pid == 0 {
        return None;
    }
    let pid = Pid::from_u32(pid);
    let mut sys = get_system().lock();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid)
        .map(|p| p.name().to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_has_name() {
        let name = process_name(std::process::id());
        assert!(name.is_some_and(|n| !n.is_empty()));
    }

    #[test]
    fn test_pid_zero_is_none() {
        assert!(process_name(0).is_none());
    }
}
