use crate::errors::AppResult;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Duration;

type SaveFuture = Pin<Box<dyn Future<Output = AppResult<()>> + Send>>;
pub type Saver<T> = Arc<dyn Fn(T) -> SaveFuture + Send + Sync>;

enum Command<T> {
    Schedule(T),
    Cancel,
}

enum Quiet<T> {
    Elapsed(T),
    Cancelled,
    Closed,
}

/// Collapses bursts of values into one save carrying the latest value.
///
/// A single background task owns the pending value. Dropping the debouncer
/// discards whatever is still waiting for its quiet period; a save that has
/// already started runs to completion.
pub struct Debouncer<T> {
    commands: mpsc::UnboundedSender<Command<T>>,
    last_saved: Arc<Mutex<Option<T>>>,
}

impl<T> Debouncer<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    pub fn new(quiet_period: Duration, saver: Saver<T>) -> Self {
        Self::spawn(quiet_period, saver, None)
    }

    /// `saved` is the value already persisted; scheduling an equal value never saves.
    pub fn with_saved(quiet_period: Duration, saver: Saver<T>, saved: T) -> Self {
        Self::spawn(quiet_period, saver, Some(saved))
    }

    fn spawn(quiet_period: Duration, saver: Saver<T>, saved: Option<T>) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let last_saved = Arc::new(Mutex::new(saved));
        tokio::spawn(run_loop(quiet_period, saver, receiver, Arc::clone(&last_saved)));
        Self { commands, last_saved }
    }

    pub fn schedule(&self, value: T) {
        if self.commands.send(Command::Schedule(value)).is_err() {
            tracing::warn!("debounce worker stopped; dropping scheduled value");
        }
    }

    pub fn cancel(&self) {
        let _ = self.commands.send(Command::Cancel);
    }

    pub fn last_saved(&self) -> Option<T> {
        match self.last_saved.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

async fn run_loop<T>(
    quiet_period: Duration,
    saver: Saver<T>,
    mut receiver: mpsc::UnboundedReceiver<Command<T>>,
    last_saved: Arc<Mutex<Option<T>>>,
) where
    T: Clone + PartialEq + Send + 'static,
{
    loop {
        let first = match receiver.recv().await {
            Some(Command::Schedule(value)) => value,
            Some(Command::Cancel) => continue,
            None => return,
        };

        let value = match wait_for_quiet(quiet_period, first, &mut receiver).await {
            Quiet::Elapsed(value) => value,
            Quiet::Cancelled => continue,
            Quiet::Closed => {
                tracing::debug!("debouncer dropped with a pending value; save suppressed");
                return;
            }
        };

        let unchanged = match last_saved.lock() {
            Ok(guard) => guard.as_ref() == Some(&value),
            Err(poisoned) => poisoned.into_inner().as_ref() == Some(&value),
        };
        if unchanged {
            tracing::debug!("debounced value matches last save; skipping");
            continue;
        }

        match saver(value.clone()).await {
            Ok(()) => match last_saved.lock() {
                Ok(mut guard) => *guard = Some(value),
                Err(poisoned) => *poisoned.into_inner() = Some(value),
            },
            Err(error) => {
                tracing::warn!(error = %error, "debounced save failed");
            }
        }
    }
}

async fn wait_for_quiet<T>(
    quiet_period: Duration,
    mut value: T,
    receiver: &mut mpsc::UnboundedReceiver<Command<T>>,
) -> Quiet<T> {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(quiet_period) => return Quiet::Elapsed(value),
            command = receiver.recv() => match command {
                Some(Command::Schedule(next)) => value = next,
                Some(Command::Cancel) => return Quiet::Cancelled,
                None => return Quiet::Closed,
            },
        }
    }
}
