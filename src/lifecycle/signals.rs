//! OS signal handling.
//!
//! SIGINT and SIGTERM both trigger shutdown. A second signal while draining
//! forces the remaining connections closed.

use std::io;
use std::sync::Arc;

use tokio::signal;

use crate::lifecycle::shutdown::{ShutdownCoordinator, ShutdownState};

/// Forward every termination signal to the coordinator until it stops.
pub async fn forward_signals(coordinator: Arc<ShutdownCoordinator>) -> io::Result<()> {
    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    while coordinator.state() != ShutdownState::Stopped {
        #[cfg(unix)]
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                tracing::info!("received Ctrl+C signal");
            }
            _ = terminate.recv() => {
                tracing::info!("received SIGTERM signal");
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await?;
            tracing::info!("received Ctrl+C signal");
        }

        coordinator.trigger();
    }
    Ok(())
}
