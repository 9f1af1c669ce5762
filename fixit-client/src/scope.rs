//! Mounted-view scope
//!
//! A view starts fetches while mounted and may be unmounted before they
//! finish. Running fetches through a [`ViewScope`] guarantees their results
//! are dropped, never applied, once the view is gone.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone)]
pub struct ViewScope {
    mounted: Arc<watch::Sender<bool>>,
}

impl ViewScope {
    /// A freshly mounted view
    pub fn mount() -> Self {
        let (mounted, _) = watch::channel(true);
        Self {
            mounted: Arc::new(mounted),
        }
    }

    pub fn unmount(&self) {
        self.mounted.send_replace(false);
    }

    pub fn is_mounted(&self) -> bool {
        *self.mounted.borrow()
    }

    /// Run `fut`; yields its output only if the view is still mounted
    ///
    /// Unmounting while `fut` is pending drops it immediately.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        let mut watcher = self.mounted.subscribe();
        if !*watcher.borrow_and_update() {
            return None;
        }

        let unmounted = async move {
            loop {
                if watcher.changed().await.is_err() {
                    // Sender dropped with the last scope handle
                    std::future::pending::<()>().await;
                }
                if !*watcher.borrow_and_update() {
                    return;
                }
            }
        };

        tokio::select! {
            output = fut => self.is_mounted().then_some(output),
            _ = unmounted => {
                tracing::debug!("View unmounted; dropping in-flight work");
                None
            }
        }
    }

    /// Run `fut` and hand its output to `apply` while still mounted
    ///
    /// Returns whether `apply` ran.
    pub async fn update<F, A>(&self, fut: F, apply: A) -> bool
    where
        F: Future,
        A: FnOnce(F::Output),
    {
        match self.run(fut).await {
            Some(output) if self.is_mounted() => {
                apply(output);
                true
            }
            _ => false,
        }
    }
}
