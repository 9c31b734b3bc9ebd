use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::terminal;
use super::{BridgeEvent, LocalSignal};

/// Background tasks that turn local window-size changes and signals into
/// [`BridgeEvent`]s for the lifetime of one interactive session.
pub struct Watchers {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Watchers {
    /// Installs the signal handlers and spawns one task per watcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(events: UnboundedSender<BridgeEvent>) -> io::Result<Self> {
        let winch = signal(SignalKind::window_change())?;
        let interrupt = signal(SignalKind::interrupt())?;
        let terminate = signal(SignalKind::terminate())?;
        let quit = signal(SignalKind::quit())?;

        let (shutdown, stop) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(watch_resize(winch, events.clone(), stop.clone())),
            tokio::spawn(watch_signals(interrupt, terminate, quit, events, stop)),
        ];

        Ok(Self { shutdown, tasks })
    }

    /// Cancels the watchers and waits for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "watcher task failed");
            }
        }
        debug!("watchers stopped");
    }
}

async fn watch_resize(
    mut winch: Signal,
    events: UnboundedSender<BridgeEvent>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            received = winch.recv() => {
                if received.is_none() {
                    break;
                }
                let (cols, rows) = terminal::current_size();
                if events.send(BridgeEvent::Resize { cols, rows }).is_err() {
                    break;
                }
            }
        }
    }
}

async fn watch_signals(
    mut interrupt: Signal,
    mut terminate: Signal,
    mut quit: Signal,
    events: UnboundedSender<BridgeEvent>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let signal = tokio::select! {
            _ = stop.changed() => break,
            Some(()) = interrupt.recv() => LocalSignal::Interrupt,
            Some(()) = terminate.recv() => LocalSignal::Terminate,
            Some(()) = quit.recv() => LocalSignal::Quit,
            else => break,
        };
        debug!(signal = signal.name(), "local signal received");
        if events.send(BridgeEvent::Signal(signal)).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test]
    async fn shutdown_stops_both_tasks() {
        let (tx, mut rx) = unbounded_channel();
        let watchers = Watchers::spawn(tx).unwrap();
        tokio::time::timeout(Duration::from_secs(5), watchers.shutdown())
            .await
            .unwrap();
        // All senders are gone once the tasks have returned.
        assert!(rx.recv().await.is_none());
    }
}
