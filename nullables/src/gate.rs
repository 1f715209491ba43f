//! A gate that holds async calls until released.

use tokio::sync::watch;

/// Open by default. While held, [`Gate::wait`] blocks.
pub struct Gate {
    open: watch::Sender<bool>,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            open: watch::channel(true).0,
        }
    }

    /// Block every following call until [`Gate::release`].
    pub fn hold(&self) {
        self.open.send_replace(false);
    }

    pub fn release(&self) {
        self.open.send_replace(true);
    }

    pub fn is_held(&self) -> bool {
        !*self.open.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}
