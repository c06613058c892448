use crosswind_core::prelude::ShutdownHandle;
use tokio::signal;

/// Stop the run through `handle` when the process receives Ctrl-C.
pub(crate) fn start_shutdown_listener(runtime: &tokio::runtime::Runtime, handle: ShutdownHandle) {
    runtime.spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C, the run can only end on its own: {:?}", e);
            return;
        }
        println!("Received shutdown signal, shutting down...");
        handle.shutdown();
    });
}
