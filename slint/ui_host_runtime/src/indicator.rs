//! Connection indicator driven by connection-change events.
//!
//! Shown as soon as the session is disconnected (including before the first
//! connect). If no reconnect happens within the grace period it escalates to
//! "unstable". Hidden again on reconnect.

use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

pub const DEFAULT_UNSTABLE_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    Hidden,
    Disconnected,
    Unstable,
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectionIndicator {
    grace: Duration,
}

impl Default for ConnectionIndicator {
    fn default() -> Self {
        Self::new(DEFAULT_UNSTABLE_GRACE)
    }
}

impl ConnectionIndicator {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// Publishes every state transition until `changes` closes. Repeated
    /// events that do not change the state are not republished.
    pub async fn run(
        self,
        mut changes: UnboundedReceiver<bool>,
        mut publish: impl FnMut(IndicatorState),
    ) {
        let mut state = IndicatorState::Disconnected;
        let mut deadline = Instant::now() + self.grace;
        publish(state);

        loop {
            let change = if state == IndicatorState::Disconnected {
                tokio::select! {
                    change = changes.recv() => change,
                    _ = tokio::time::sleep_until(deadline) => {
                        state = IndicatorState::Unstable;
                        tracing::warn!(grace_ms = self.grace.as_millis() as u64, "connection unstable");
                        publish(state);
                        continue;
                    }
                }
            } else {
                changes.recv().await
            };

            let Some(connected) = change else {
                return;
            };

            let next = match (connected, state) {
                (true, _) => IndicatorState::Hidden,
                (false, IndicatorState::Hidden) => IndicatorState::Disconnected,
                (false, current) => current,
            };

            if next != state {
                if next == IndicatorState::Disconnected {
                    deadline = Instant::now() + self.grace;
                }
                state = next;
                publish(state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tokio::sync::mpsc;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn escalates_after_grace_and_hides_on_reconnect() {
        let (tx, rx) = mpsc::unbounded_channel();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let started = Instant::now();

        let indicator = {
            let seen = seen.clone();
            ConnectionIndicator::new(Duration::from_secs(3)).run(rx, move |state| {
                seen.borrow_mut().push((state, started.elapsed()));
            })
        };

        let driver = async move {
            sleep(Duration::from_millis(3500)).await;
            tx.send(true).expect("send");
            tx.send(true).expect("send");
            sleep(Duration::from_millis(500)).await;
            tx.send(false).expect("send");
            sleep(Duration::from_millis(1000)).await;
            tx.send(true).expect("send");
            sleep(Duration::from_millis(1000)).await;
            tx.send(false).expect("send");
            sleep(Duration::from_millis(1000)).await;
            tx.send(false).expect("send");
            sleep(Duration::from_millis(3000)).await;
        };

        tokio::join!(indicator, driver);

        let states: Vec<IndicatorState> = seen.borrow().iter().map(|(state, _)| *state).collect();
        assert_eq!(
            states,
            vec![
                IndicatorState::Disconnected,
                IndicatorState::Unstable,
                IndicatorState::Hidden,
                IndicatorState::Disconnected,
                IndicatorState::Hidden,
                IndicatorState::Disconnected,
                IndicatorState::Unstable,
            ]
        );

        let seen = seen.borrow();
        assert_eq!(seen[1].1, Duration::from_secs(3));
        assert_eq!(seen[6].1 - seen[5].1, Duration::from_secs(3));
    }
}
