//! One-shot, two-outcome hand-off between a producer task and any number of
//! waiters.
//!
//! A [`GateSetter`] resolves the gate exactly once, either with a value or
//! with an error. Every [`Gate`] clone blocks in [`Gate::wait`] until that
//! happens and then observes the same outcome on every call.

use std::io;
use std::sync::Arc;
use tokio::sync::watch;

/// Failure recorded in the gate. Kept as kind + message so every waiter can
/// get its own `io::Error` of the same class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateError {
    pub kind: io::ErrorKind,
    pub message: String,
}

impl From<&io::Error> for GateError {
    fn from(e: &io::Error) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// `None` while pending; set once to the accept outcome.
type Slot<T> = Option<Arc<Result<T, GateError>>>;

/// Write end. Consumed by `succeed` / `fail`, so it can fire at most once.
#[derive(Debug)]
pub struct GateSetter<T> {
    tx: watch::Sender<Slot<T>>,
}

/// Observer end.
#[derive(Debug)]
pub struct Gate<T> {
    rx: watch::Receiver<Slot<T>>,
}

impl<T> Clone for Gate<T> {
    fn clone(&self) -> Self {
        Self { rx: self.rx.clone() }
    }
}

pub fn gate<T>() -> (GateSetter<T>, Gate<T>) {
    let (tx, rx) = watch::channel(None);
    (GateSetter { tx }, Gate { rx })
}

impl<T> GateSetter<T> {
    pub fn succeed(self, value: T) {
        self.resolve(Ok(value));
    }

    pub fn fail(self, error: GateError) {
        self.resolve(Err(error));
    }

    fn resolve(self, outcome: Result<T, GateError>) {
        // send_replace stores the value even when no receiver is alive yet
        self.tx.send_replace(Some(Arc::new(outcome)));
    }
}

impl<T: Clone> Gate<T> {
    /// Block until the gate resolves, then return its outcome.
    ///
    /// A setter dropped without resolving counts as a failure.
    pub async fn wait(&self) -> Result<T, GateError> {
        let mut rx = self.rx.clone();
        let slot = match rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };

        match slot.as_deref() {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(e)) => Err(e.clone()),
            None => Err(GateError {
                kind: io::ErrorKind::BrokenPipe,
                message: "gate abandoned before it resolved".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn err(msg: &str) -> GateError {
        GateError {
            kind: io::ErrorKind::ConnectionAborted,
            message: msg.to_string(),
        }
    }

    #[tokio::test]
    async fn test_wait_blocks_until_resolved() {
        let (setter, gate) = gate::<u32>();

        let pending = tokio::time::timeout(Duration::from_millis(50), gate.wait()).await;
        assert!(pending.is_err(), "wait should block while pending");

        setter.succeed(7);
        assert_eq!(gate.wait().await, Ok(7));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_waiters_see_same_outcome() {
        let (setter, gate) = gate::<u32>();

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let g = gate.clone();
                tokio::spawn(async move { g.wait().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        setter.fail(err("boom"));

        for w in waiters {
            assert_eq!(w.await.unwrap(), Err(err("boom")));
        }
    }

    #[tokio::test]
    async fn test_repeated_wait_after_resolution() {
        let (setter, gate) = gate::<&'static str>();
        setter.succeed("conn");
        for _ in 0..3 {
            assert_eq!(gate.wait().await, Ok("conn"));
        }
    }

    #[tokio::test]
    async fn test_resolved_before_observer_subscribes() {
        let (setter, gate) = gate::<u8>();
        setter.fail(err("early"));
        let late = gate.clone();
        assert_eq!(late.wait().await, Err(err("early")));
    }

    #[tokio::test]
    async fn test_dropped_setter_is_failure() {
        let (setter, gate) = gate::<u8>();
        drop(setter);
        let e = gate.wait().await.unwrap_err();
        assert_eq!(e.kind, io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_outcome_survives_setter_and_late_clones() {
        let (setter, gate) = gate::<u16>();
        let early = gate.clone();
        setter.succeed(42);

        // setter is consumed; every observer, old or new, sees the value
        let late = early.clone();
        drop(gate);
        assert_eq!(early.wait().await, Ok(42));
        assert_eq!(late.wait().await, Ok(42));
        assert_eq!(late.wait().await, Ok(42));
    }
}
