//! Drains a queue one delivery at a time
//!
//! The loop stops when a receive window expires with nothing delivered, which
//! is how an empty queue shows up on an AMQP 1.0 link with outstanding credit.

use std::{future::Future, time::Duration};

use tokio::time;
use tracing::{debug, trace, warn};

/// Link credit granted to the broker while draining
pub const PREFETCH_CREDIT: u32 = 100;

/// Default per-receive waiting window
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of deliveries the purge loop drains.
///
/// Implemented over an AMQP receiving link by
/// [`QueueReceiver`](crate::receiver::QueueReceiver).
#[trait_variant::make(DeliverySource: Send)]
pub trait LocalDeliverySource {
    /// A received, not yet settled, delivery
    type Delivery: Send;

    /// Error reported by the underlying link
    type Error: std::error::Error + Send + 'static;

    /// Waits for the next delivery
    async fn recv(&mut self) -> Result<Self::Delivery, Self::Error>;

    /// Accepts a delivery so that the broker removes it from the queue
    async fn accept(&mut self, delivery: Self::Delivery) -> Result<(), Self::Error>;
}

/// Options that control a purge run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeOptions {
    /// Waiting window for each receive
    pub timeout: Duration,

    /// Number of consecutive receive errors tolerated before giving up
    pub max_retries: u32,
}

/// Why the purge loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A receive window expired without any delivery
    Drained,

    /// The shutdown signal fired
    Interrupted,
}

/// Outcome of a purge run that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    /// Number of messages received and accepted
    pub count: u64,

    /// Why the loop stopped
    pub stop: StopReason,
}

/// Fatal errors of the purge loop.
///
/// Both variants carry the number of messages accepted before the failure.
#[derive(Debug, thiserror::Error)]
pub enum PurgeError<E: std::error::Error + 'static> {
    /// Receiving failed more times in a row than the retry budget allows
    #[error("Reading message from AMQP: {source}")]
    Receive {
        count: u64,
        attempts: u32,
        #[source]
        source: E,
    },

    /// Accepting a received message failed
    #[error("Accepting message: {source}")]
    Accept {
        count: u64,
        #[source]
        source: E,
    },
}

impl<E: std::error::Error + 'static> PurgeError<E> {
    /// Number of messages accepted before the failure
    pub fn count(&self) -> u64 {
        match self {
            PurgeError::Receive { count, .. } | PurgeError::Accept { count, .. } => *count,
        }
    }
}

/// The purge loop
#[derive(Debug, Clone)]
pub struct Purger {
    options: PurgeOptions,
}

impl Purger {
    /// Creates a new purge loop
    pub fn new(options: PurgeOptions) -> Self {
        Self { options }
    }

    /// Receives and accepts deliveries until a receive window expires empty,
    /// `shutdown` completes, or the link fails.
    ///
    /// A delivery is always accepted before the next receive. The accept
    /// itself is not bounded by the receive window, but `shutdown` still
    /// interrupts it, in which case the delivery is not counted.
    pub async fn run<S, F>(
        &self,
        source: &mut S,
        shutdown: F,
    ) -> Result<PurgeReport, PurgeError<S::Error>>
    where
        S: DeliverySource,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut count: u64 = 0;
        let mut failures: u32 = 0;

        loop {
            let received = tokio::select! {
                biased;

                _ = &mut shutdown => {
                    debug!(count, "interrupted");
                    return Ok(PurgeReport {
                        count,
                        stop: StopReason::Interrupted,
                    });
                }
                received = time::timeout(self.options.timeout, source.recv()) => received,
            };

            let delivery = match received {
                Err(_elapsed) => {
                    debug!(
                        count,
                        timeout_secs = self.options.timeout.as_secs(),
                        "no message within the receive window, queue drained"
                    );
                    return Ok(PurgeReport {
                        count,
                        stop: StopReason::Drained,
                    });
                }
                Ok(Err(err)) => {
                    failures = failures.saturating_add(1);
                    if failures > self.options.max_retries {
                        return Err(PurgeError::Receive {
                            count,
                            attempts: failures,
                            source: err,
                        });
                    }
                    warn!(
                        attempt = failures,
                        max_retries = self.options.max_retries,
                        "Reading message from AMQP: {}",
                        err
                    );
                    continue;
                }
                Ok(Ok(delivery)) => delivery,
            };
            failures = 0;

            let accepted = tokio::select! {
                biased;

                accepted = source.accept(delivery) => accepted,
                _ = &mut shutdown => {
                    debug!(count, "interrupted while accepting");
                    return Ok(PurgeReport {
                        count,
                        stop: StopReason::Interrupted,
                    });
                }
            };
            accepted.map_err(|err| PurgeError::Accept { count, source: err })?;
            count += 1;
            trace!(count, "message accepted");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, future};

    use tokio::time::Instant;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("mock link failure: {0}")]
    struct MockError(&'static str);

    /// Hands out queued results, then behaves like an empty queue
    #[derive(Debug, Default)]
    struct MockQueue {
        pending: VecDeque<Result<u32, MockError>>,
        accepted: Vec<u32>,
        fail_accept_of: Option<u32>,
        stall_accept_of: Option<u32>,
        recv_calls: usize,
    }

    impl MockQueue {
        fn with_messages(n: u32) -> Self {
            Self {
                pending: (0..n).map(Ok).collect(),
                ..Default::default()
            }
        }

        fn with_results(results: Vec<Result<u32, MockError>>) -> Self {
            Self {
                pending: results.into(),
                ..Default::default()
            }
        }
    }

    impl DeliverySource for MockQueue {
        type Delivery = u32;
        type Error = MockError;

        async fn recv(&mut self) -> Result<u32, MockError> {
            self.recv_calls += 1;
            match self.pending.pop_front() {
                Some(result) => result,
                None => future::pending().await,
            }
        }

        async fn accept(&mut self, delivery: u32) -> Result<(), MockError> {
            if self.fail_accept_of == Some(delivery) {
                return Err(MockError("accept rejected"));
            }
            if self.stall_accept_of == Some(delivery) {
                future::pending::<()>().await;
            }
            self.accepted.push(delivery);
            Ok(())
        }
    }

    fn purger(timeout_secs: u64, max_retries: u32) -> Purger {
        Purger::new(PurgeOptions {
            timeout: Duration::from_secs(timeout_secs),
            max_retries,
        })
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn drains_every_message_then_stops() {
        let mut queue = MockQueue::with_messages(3);

        let report = assert_ok!(purger(2, 0).run(&mut queue, future::pending()).await);

        assert_eq!(report.count, 3);
        assert_eq!(report.stop, StopReason::Drained);
        assert_eq!(queue.accepted, vec![0, 1, 2]);
        assert_eq!(queue.recv_calls, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_queue_stops_after_one_window() {
        let mut queue = MockQueue::default();
        let start = Instant::now();

        let report = assert_ok!(purger(1, 0).run(&mut queue, future::pending()).await);

        assert_eq!(report.count, 0);
        assert_eq!(report.stop, StopReason::Drained);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn receive_error_is_fatal_without_retries() {
        let mut queue = MockQueue::with_results(vec![Ok(0), Err(MockError("link detached"))]);

        let err = assert_err!(purger(5, 0).run(&mut queue, future::pending()).await);

        match err {
            PurgeError::Receive {
                count, attempts, ..
            } => {
                assert_eq!(count, 1);
                assert_eq!(attempts, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(queue.accepted, vec![0]);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn receive_errors_within_budget_are_skipped() {
        let mut queue = MockQueue::with_results(vec![
            Ok(0),
            Err(MockError("transient")),
            Err(MockError("transient")),
            Ok(1),
            Err(MockError("transient")),
            Ok(2),
        ]);

        let report = assert_ok!(purger(5, 2).run(&mut queue, future::pending()).await);

        assert_eq!(report.count, 3);
        assert_eq!(queue.accepted, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_budget_counts_consecutive_failures() {
        let mut queue = MockQueue::with_results(vec![
            Err(MockError("transient")),
            Err(MockError("transient")),
            Err(MockError("down")),
        ]);

        let err = assert_err!(purger(5, 2).run(&mut queue, future::pending()).await);

        assert!(matches!(
            err,
            PurgeError::Receive {
                count: 0,
                attempts: 3,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_accept_is_not_counted() {
        let mut queue = MockQueue::with_messages(3);
        queue.fail_accept_of = Some(1);

        let err = assert_err!(purger(5, 0).run(&mut queue, future::pending()).await);

        assert!(matches!(err, PurgeError::Accept { count: 1, .. }));
        assert_eq!(err.count(), 1);
        assert_eq!(queue.accepted, vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_reports_partial_count() {
        let mut queue = MockQueue::with_messages(2);
        let shutdown = time::sleep(Duration::from_secs(1));

        let report = assert_ok!(purger(5, 0).run(&mut queue, shutdown).await);

        assert_eq!(report.count, 2);
        assert_eq!(report.stop, StopReason::Interrupted);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_a_stalled_accept() {
        let mut queue = MockQueue::with_messages(3);
        queue.stall_accept_of = Some(1);
        let shutdown = time::sleep(Duration::from_secs(1));

        let report = assert_ok!(purger(5, 0).run(&mut queue, shutdown).await);

        assert_eq!(report.count, 1);
        assert_eq!(report.stop, StopReason::Interrupted);
        assert_eq!(queue.accepted, vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_is_checked_before_receiving() {
        let mut queue = MockQueue::with_messages(2);

        let report = assert_ok!(purger(5, 0).run(&mut queue, future::ready(())).await);

        assert_eq!(report.count, 0);
        assert_eq!(report.stop, StopReason::Interrupted);
        assert_eq!(queue.recv_calls, 0);
    }

    #[test]
    fn error_display_names_the_failing_operation() {
        let err = PurgeError::Receive {
            count: 4,
            attempts: 1,
            source: MockError("link detached"),
        };
        assert_eq!(
            err.to_string(),
            "Reading message from AMQP: mock link failure: link detached"
        );
        assert_eq!(err.count(), 4);
    }
}
