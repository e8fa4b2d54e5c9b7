// Thread affinity: pin the harness to one core.
// Child processes inherit the affinity mask of the thread that spawns them,
// so every compiler and benchmark invocation lands on the same core.

use log::{info, warn};

/// Pin the current thread to `core`. Returns false when the core does not
/// exist or the platform refused.
pub fn pin_to_core(core: usize) -> bool {
    let Some(core_ids) = core_affinity::get_core_ids() else {
        warn!("Could not query CPU cores, running unpinned");
        return false;
    };

    match core_ids.into_iter().find(|c| c.id == core) {
        Some(core_id) => {
            let pinned = core_affinity::set_for_current(core_id);
            if pinned {
                info!("Pinned to core {core}");
            } else {
                warn!("Failed to pin to core {core}, running unpinned");
            }
            pinned
        }
        None => {
            warn!("Core {core} does not exist, running unpinned");
            false
        }
    }
}
