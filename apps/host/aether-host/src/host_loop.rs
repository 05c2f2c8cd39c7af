//! The host's own scheduler: the one thread that may touch host state.

use bridge_core::executor::HostExecutor;
use bridge_core::service::BridgeService;

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::sleep;

use log::info;

/// Pumps `service` until `stop` is raised or the dispatcher stops itself.
///
/// Returns the number of ticks run.
pub fn run_until_stopped<E: HostExecutor>(
    service: &mut BridgeService<E>,
    stop: &AtomicBool,
) -> u64 {
    let mut ticks = 0u64;

    while !stop.load(Ordering::SeqCst) {
        let Some(next) = service.tick() else {
            info!("Dispatcher stopped, leaving host loop");
            break;
        };
        ticks += 1;
        sleep(next);
    }

    info!("Host loop finished after {ticks} ticks");
    ticks
}
