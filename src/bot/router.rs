//! Per-user update lanes
//!
//! Every user gets a queue drained by its own task, so one slow evaluation
//! holds up only that user's later events. Lanes with nothing queued are
//! dropped between polls and respawned on the next event.

use super::QuizBot;
use crate::transport::Incoming;
use crate::types::UserId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

struct Lane {
    tx: mpsc::UnboundedSender<Incoming>,
    /// Routed events not yet fully handled
    pending: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl Lane {
    fn spawn(bot: &Arc<QuizBot>, user_id: UserId) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Incoming>();
        let pending = Arc::new(AtomicUsize::new(0));

        let handle = {
            let bot = Arc::clone(bot);
            let pending = Arc::clone(&pending);
            tokio::spawn(async move {
                while let Some(incoming) = rx.recv().await {
                    bot.dispatch(incoming).await;
                    pending.fetch_sub(1, Ordering::SeqCst);
                }
                debug!("Lane for user {} closed", user_id);
            })
        };

        Self { tx, pending, handle }
    }

    fn is_idle(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
    }
}

/// Routes events to one sequential lane per user
pub struct UpdateRouter {
    bot: Arc<QuizBot>,
    lanes: HashMap<UserId, Lane>,
}

impl UpdateRouter {
    pub fn new(bot: Arc<QuizBot>) -> Self {
        Self {
            bot,
            lanes: HashMap::new(),
        }
    }

    /// Queue `incoming` behind the user's earlier events
    pub fn route(&mut self, incoming: Incoming) {
        let user_id = incoming.user_id();
        let bot = &self.bot;
        let lane = self
            .lanes
            .entry(user_id)
            .or_insert_with(|| Lane::spawn(bot, user_id));

        lane.pending.fetch_add(1, Ordering::SeqCst);
        let Err(mpsc::error::SendError(incoming)) = lane.tx.send(incoming) else {
            return;
        };

        // The lane task is gone (a handler panicked); start over
        warn!("Lane for user {} stopped, restarting it", user_id);
        let lane = Lane::spawn(&self.bot, user_id);
        lane.pending.fetch_add(1, Ordering::SeqCst);
        if lane.tx.send(incoming).is_err() {
            error!("Dropped update from user {}", user_id);
        }
        self.lanes.insert(user_id, lane);
    }

    /// Close lanes that have nothing left to handle
    pub fn prune(&mut self) {
        self.lanes
            .retain(|_, lane| !lane.is_idle() && !lane.handle.is_finished());
    }

    /// Number of open lanes
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Stop accepting events and wait until every queued one is handled
    pub async fn shutdown(self) {
        for (user_id, lane) in self.lanes {
            let Lane { tx, handle, .. } = lane;
            drop(tx);
            if let Err(e) = handle.await {
                error!("Lane for user {} failed: {}", user_id, e);
            }
        }
    }
}
