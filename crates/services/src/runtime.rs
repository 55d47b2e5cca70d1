//! Periodic tasks of a live session.
//!
//! Three tickers share the session behind one async mutex: the solve timer
//! (which also drains due coach writes), the coach and the dashboard push.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::coach::TimeboxPrompt;
use crate::session::SessionContext;

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    Timebox(TimeboxPrompt),
}

pub struct SessionRuntime {
    session: Arc<Mutex<SessionContext>>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl SessionRuntime {
    /// Start the tickers. Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(session: SessionContext) -> (Self, mpsc::UnboundedReceiver<RuntimeEvent>) {
        let config = session.config().clone();
        let session = Arc::new(Mutex::new(session));
        let cancel = CancellationToken::new();
        let tasks = TaskTracker::new();
        let (events, events_rx) = mpsc::unbounded_channel();

        let timer_session = session.clone();
        every(&tasks, &cancel, config.timer_tick_ms, move || {
            let session = timer_session.clone();
            async move {
                session.lock().await.timer_tick().await;
            }
        });

        let coach_session = session.clone();
        every(&tasks, &cancel, config.coach_tick_ms, move || {
            let session = coach_session.clone();
            let events = events.clone();
            async move {
                let prompt = session.lock().await.coach_tick().await;
                if let Some(prompt) = prompt {
                    let _ = events.send(RuntimeEvent::Timebox(prompt));
                }
            }
        });

        let dashboard_session = session.clone();
        every(&tasks, &cancel, config.dashboard_push_ms, move || {
            let session = dashboard_session.clone();
            async move {
                session.lock().await.dashboard_tick();
            }
        });

        tasks.close();
        (
            Self {
                session,
                cancel,
                tasks,
            },
            events_rx,
        )
    }

    /// Shared handle for input events.
    #[must_use]
    pub fn session(&self) -> Arc<Mutex<SessionContext>> {
        self.session.clone()
    }

    /// Stop the tickers, then pause, flush and disconnect the session.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.tasks.wait().await;
        self.session.lock().await.close().await;
        debug!("session runtime stopped");
    }
}

fn every<F, Fut>(tasks: &TaskTracker, cancel: &CancellationToken, period_ms: u64, mut tick: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let cancel = cancel.clone();
    tasks.spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(period_ms.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => tick().await,
            }
        }
    });
}
