use tokio::sync::broadcast;
use tracing::debug;

/// Receives the destination when the client gives up on a session.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

impl<F> Navigator for F
where
    F: Fn(&str) + Send + Sync,
{
    fn navigate(&self, path: &str) {
        self(path)
    }
}

/// Fallback navigator: publishes the destination to every subscriber.
///
/// The host application owns the actual "leave this view" behavior and
/// listens through [`BroadcastNavigator::subscribe`].
#[derive(Debug, Clone)]
pub struct BroadcastNavigator {
    sender: broadcast::Sender<String>,
}

impl BroadcastNavigator {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNavigator {
    fn default() -> Self {
        Self::new(16)
    }
}

impl Navigator for BroadcastNavigator {
    fn navigate(&self, path: &str) {
        if self.sender.send(path.to_string()).is_err() {
            debug!(destination = path, "no redirect subscribers");
        }
    }
}
