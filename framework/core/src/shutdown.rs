use std::sync::Arc;

use tokio::sync::watch;

/// Signals a set of listeners that they should stop.
///
/// The signal is level triggered. A listener created after [ShutdownHandle::shutdown] has been
/// called observes the shutdown immediately, which matters for work that is spawned while a run is
/// already stopping.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn shutdown(&self) {
        let was_shutdown = self.sender.send_replace(true);
        if !was_shutdown {
            log::debug!("Shutdown signalled");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn new_listener(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.sender.subscribe(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ShutdownListener {
    receiver: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Point in time check if the shutdown signal has been sent.
    pub fn should_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until the shutdown signal is sent. Returns immediately if it already has been.
    ///
    /// It is safe to race this with another future so that the shutdown signal can be used to
    /// cancel other work in progress.
    pub async fn wait_for_shutdown(&mut self) {
        // An error means every handle was dropped, nobody can signal any more so treat it as a
        // shutdown.
        let _ = self.receiver.wait_for(|stopped| *stopped).await;
    }
}
