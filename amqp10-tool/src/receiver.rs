//! Receiving link bound to the queue being purged

use std::{future::Future, pin::Pin};

use fe2o3_amqp::{
    link::{delivery::DeliveryInfo, receiver::CreditMode},
    types::{messaging::Body, primitives::Value},
    Delivery, Receiver,
};
use tracing::debug;

use crate::{
    config::ConnectionConfig,
    connection::{teardown, BrokerSession},
    error::LinkError,
    purge::{DeliverySource, PurgeOptions, PurgeReport, Purger, StopReason, PREFETCH_CREDIT},
    Error,
};

/// A receiver that drains one queue
#[derive(Debug)]
pub struct QueueReceiver {
    receiver: Receiver,
}

impl QueueReceiver {
    /// Attaches a receiving link with [`PREFETCH_CREDIT`] outstanding credit
    pub async fn attach(broker: &mut BrokerSession, queue: &str) -> Result<Self, Error> {
        let receiver = Receiver::builder()
            .name(format!("amqp10-tool-purge-{queue}"))
            .source(queue)
            .credit_mode(CreditMode::Auto(PREFETCH_CREDIT))
            .attach(broker.session_mut())
            .await
            .map_err(|source| Error::Attach {
                queue: queue.to_string(),
                source,
            })?;
        Ok(Self { receiver })
    }

    /// Detaches the link with `closed` set, giving up after
    /// [`TEARDOWN_TIMEOUT`](crate::connection::TEARDOWN_TIMEOUT)
    pub async fn close(self) {
        teardown("close the receiver", self.receiver.close()).await;
    }
}

impl DeliverySource for QueueReceiver {
    type Delivery = Delivery<Body<Value>>;
    type Error = LinkError;

    async fn recv(&mut self) -> Result<Self::Delivery, Self::Error> {
        let delivery = self.receiver.recv::<Body<Value>>().await?;
        Ok(delivery)
    }

    async fn accept(&mut self, delivery: Self::Delivery) -> Result<(), Self::Error> {
        let info = DeliveryInfo::from(delivery);
        self.receiver.accept(info).await?;
        Ok(())
    }
}

/// Connects, drains `queue` and tears everything down again.
///
/// The receiver, the session and the connection are released on every path,
/// including a failed attach, a link error and `shutdown` firing.
///
/// `shutdown` is watched from the start. If it fires while connecting or
/// attaching, whatever was opened so far is closed and an interrupted report
/// with a count of zero is returned.
pub async fn purge_queue<F>(
    config: &ConnectionConfig,
    options: &PurgeOptions,
    queue: &str,
    shutdown: F,
) -> Result<PurgeReport, Error>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut broker = tokio::select! {
        biased;

        _ = &mut shutdown => {
            debug!("interrupted while connecting");
            return Ok(interrupted());
        }
        opened = BrokerSession::open(config) => opened?,
    };
    let result = drain(&mut broker, options, queue, shutdown).await;
    broker.close().await;
    result
}

async fn drain<F>(
    broker: &mut BrokerSession,
    options: &PurgeOptions,
    queue: &str,
    mut shutdown: Pin<&mut F>,
) -> Result<PurgeReport, Error>
where
    F: Future<Output = ()>,
{
    let mut receiver = tokio::select! {
        biased;

        _ = &mut shutdown => {
            debug!("interrupted while attaching");
            return Ok(interrupted());
        }
        attached = QueueReceiver::attach(broker, queue) => attached?,
    };
    debug!("Reading messages from {}", queue);

    let result = Purger::new(options.clone())
        .run(&mut receiver, shutdown)
        .await;
    receiver.close().await;
    result.map_err(Error::from)
}

fn interrupted() -> PurgeReport {
    PurgeReport {
        count: 0,
        stop: StopReason::Interrupted,
    }
}
