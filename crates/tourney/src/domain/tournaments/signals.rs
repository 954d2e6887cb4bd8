use log::debug;
use tokio::sync::broadcast;
use tourney_core::LifecycleSignal;

/// Fan-out of lifecycle signals. Nothing is stored: a signal sent while no
/// one listens is gone, and slow listeners skip what they missed.
#[derive(Debug, Clone)]
pub struct SignalHub {
    sender: broadcast::Sender<LifecycleSignal>,
}

impl SignalHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn emit(&self, signal: LifecycleSignal) {
        debug!(
            "signal {} for tournament {}",
            signal.event_name(),
            signal.tournament_id
        );
        // no receivers is not an error
        let _ = self.sender.send(signal);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleSignal> {
        self.sender.subscribe()
    }
}
