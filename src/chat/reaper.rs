//! Background eviction of idle conversations

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::chat::store::ConversationStore;

/// Periodic task that sweeps the conversation store and drops
/// sessions that have been idle longer than the timeout.
///
/// The loop only stops between sweeps: shutdown signals the task and
/// waits for any in-flight sweep (a handful of in-memory map
/// operations) to finish.
pub struct SessionReaper {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SessionReaper {
    pub fn spawn(
        store: Arc<ConversationStore>,
        sweep_interval: Duration,
        conversation_timeout: Duration,
    ) -> Self {
        let (stop, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so the first
            // sweep happens one full interval after startup.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = store.evict_idle(Instant::now(), conversation_timeout);
                        for user_id in evicted {
                            info!(user = %user_id, "cleaned up inactive conversation");
                        }
                    }
                    _ = stopped.changed() => break,
                }
            }
            debug!("session reaper stopped");
        });

        Self { stop, handle }
    }

    /// Signal the task and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.handle.await;
    }
}
