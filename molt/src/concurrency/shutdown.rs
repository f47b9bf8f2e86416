//! Shutdown signaling between the coordinator and its workers.
//!
//! Abstracts a tokio watch channel into a broadcast style shutdown signal:
//! every receiver observes the same notification and blocked workers can
//! select on it to leave their suspension points.

use tokio::sync::watch;

/// Transmitter side of the shutdown channel.
pub type ShutdownTx = watch::Sender<()>;

/// Receiver side of the shutdown channel.
pub type ShutdownRx = watch::Receiver<()>;

/// Creates a new shutdown channel.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    watch::channel(())
}
