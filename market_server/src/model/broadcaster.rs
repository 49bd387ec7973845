//! Fan-out of market events to subscribed clients.
//!
//! The `Broadcaster` runs a background thread that owns the list of subscriber
//! channels. Subscriptions and published events travel through the same command
//! channel, so a subscriber registered before a publish is guaranteed to see it.
//!
//! Delivery model:
//! - Best effort, at most once per publish, no replay for late subscribers.
//! - A newly subscribed client first receives the snapshot handed to `subscribe`.
//! - Each subscriber has a buffer of `SUBSCRIBER_BUFFER` events. While it is full,
//!   new events for that subscriber are skipped.
//! - If sending to a subscriber fails (its receiver is gone), it is dropped.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};
use log::{debug, info, warn};
use market_common::MarketEvent;
use market_common::records::StockView;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Events buffered per subscriber before further events are skipped for it.
pub const SUBSCRIBER_BUFFER: usize = 64;

enum BroadcastCommand {
    Subscribe(Sender<MarketEvent>),
    Publish(MarketEvent),
    Shutdown,
}

/// Handle to the broadcast thread. Cheap to clone.
#[derive(Clone)]
pub struct Broadcaster {
    command_tx: Sender<BroadcastCommand>,
    subscribers: Arc<AtomicUsize>,
}

impl Broadcaster {
    /// Start the broadcast thread.
    pub fn start() -> Self {
        let (command_tx, command_rx) = unbounded::<BroadcastCommand>();
        let subscribers = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&subscribers);

        thread::spawn(move || {
            let mut clients: Vec<Sender<MarketEvent>> = Vec::new();
            info!(
                "Broadcaster started (Thread ID: {:?})",
                thread::current().id()
            );

            while let Ok(command) = command_rx.recv() {
                match command {
                    BroadcastCommand::Subscribe(client_tx) => {
                        clients.push(client_tx);
                        info!("Broadcaster: new subscriber. Total: {}", clients.len());
                    }
                    BroadcastCommand::Publish(event) => {
                        let before = clients.len();
                        let mut skipped = 0;
                        clients.retain(|client_tx| match client_tx.try_send(event.clone()) {
                            Ok(()) => true,
                            Err(TrySendError::Full(_)) => {
                                skipped += 1;
                                true
                            }
                            Err(TrySendError::Disconnected(_)) => false,
                        });
                        if skipped > 0 {
                            debug!("Broadcaster: {skipped} subscriber(s) behind; event skipped");
                        }
                        if clients.len() < before {
                            debug!(
                                "Broadcaster: dropped {} closed subscriber(s)",
                                before - clients.len()
                            );
                        }
                    }
                    BroadcastCommand::Shutdown => break,
                }
                count.store(clients.len(), Ordering::Relaxed);
            }
            count.store(0, Ordering::Relaxed);
            info!("Broadcaster stopped");
        });

        Self {
            command_tx,
            subscribers,
        }
    }

    /// Register a new subscriber whose first event is `initial` as `update_stock`.
    pub fn subscribe(&self, initial: Vec<StockView>) -> Receiver<MarketEvent> {
        let (client_tx, client_rx) = bounded(SUBSCRIBER_BUFFER);
        let _ = client_tx.try_send(MarketEvent::UpdateStock(initial));
        self.send(BroadcastCommand::Subscribe(client_tx));
        client_rx
    }

    /// Push a full snapshot as `update_stock` to every subscriber.
    pub fn publish(&self, snapshot: Vec<StockView>) {
        self.send(BroadcastCommand::Publish(MarketEvent::UpdateStock(snapshot)));
    }

    /// Push a `new_stock_event` marker to every subscriber.
    pub fn announce(&self, marker: impl Into<String>) {
        self.send(BroadcastCommand::Publish(MarketEvent::NewStockEvent(
            marker.into(),
        )));
    }

    /// Subscribers known after the last processed command.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::Relaxed)
    }

    /// Stop the thread. Subscriber channels close, which ends their client streams.
    pub fn shutdown(&self) {
        self.send(BroadcastCommand::Shutdown);
    }

    fn send(&self, command: BroadcastCommand) {
        if self.command_tx.send(command).is_err() {
            warn!("Broadcaster is not running; event discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    const WAIT: Duration = Duration::from_secs(2);

    fn view(name: &str, price: i64) -> StockView {
        StockView {
            name: name.into(),
            price,
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn subscriber_gets_snapshot_before_updates() {
        let broadcaster = Broadcaster::start();
        let rx = broadcaster.subscribe(vec![view("BBCA", 100)]);
        broadcaster.publish(vec![view("BBCA", 102)]);
        broadcaster.announce("Dividend announced");

        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            MarketEvent::UpdateStock(vec![view("BBCA", 100)])
        );
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            MarketEvent::UpdateStock(vec![view("BBCA", 102)])
        );
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            MarketEvent::NewStockEvent("Dividend announced".into())
        );
        broadcaster.shutdown();
    }

    #[test]
    fn late_subscriber_gets_no_replay() {
        let broadcaster = Broadcaster::start();
        broadcaster.publish(vec![view("TLKM", 1)]);
        let rx = broadcaster.subscribe(vec![view("TLKM", 2)]);
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            MarketEvent::UpdateStock(vec![view("TLKM", 2)])
        );
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        broadcaster.shutdown();
    }

    #[test]
    fn closed_subscriber_is_dropped() {
        let broadcaster = Broadcaster::start();
        let keep = broadcaster.subscribe(Vec::new());
        let gone = broadcaster.subscribe(Vec::new());
        assert!(wait_for(|| broadcaster.subscriber_count() == 2));

        drop(gone);
        broadcaster.publish(Vec::new());
        assert!(wait_for(|| broadcaster.subscriber_count() == 1));
        drop(keep);
        broadcaster.shutdown();
    }

    #[test]
    fn shutdown_closes_subscriber_channels() {
        let broadcaster = Broadcaster::start();
        let rx = broadcaster.subscribe(Vec::new());
        assert!(rx.recv_timeout(WAIT).is_ok());
        broadcaster.shutdown();
        assert!(wait_for(|| matches!(
            rx.recv_timeout(Duration::from_millis(10)),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected)
        )));
        // publishing after shutdown is a logged no-op
        broadcaster.publish(Vec::new());
    }

    #[test]
    fn stalled_subscriber_is_capped_not_dropped() {
        let broadcaster = Broadcaster::start();
        let stalled = broadcaster.subscribe(Vec::new());
        for price in 0..(SUBSCRIBER_BUFFER as i64 * 3) {
            broadcaster.publish(vec![view("BBNI", price)]);
        }
        // processed in order, so every publish above has been handled once this counts
        let _late = broadcaster.subscribe(Vec::new());
        assert!(wait_for(|| broadcaster.subscriber_count() == 2));
        assert_eq!(stalled.len(), SUBSCRIBER_BUFFER);

        while stalled.try_recv().is_ok() {}
        broadcaster.publish(vec![view("BBNI", -1)]);
        assert_eq!(
            stalled.recv_timeout(WAIT).unwrap(),
            MarketEvent::UpdateStock(vec![view("BBNI", -1)])
        );
        broadcaster.shutdown();
    }
}
