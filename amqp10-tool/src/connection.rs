//! Broker connection and the session links are attached to

use std::{fmt, future::Future, time::Duration};

use fe2o3_amqp::{connection::ConnectionHandle, session::SessionHandle, Connection, Session};
use tokio::time;
use tracing::{debug, warn};

use crate::{config::ConnectionConfig, tls, Error};

/// Upper bound for each step of closing the receiver, session and connection
pub const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Awaits one teardown step for at most [`TEARDOWN_TIMEOUT`].
///
/// Returns `true` if the step completed without error. Failures and timeouts
/// are logged at warn level.
pub(crate) async fn teardown<Fut, E>(what: &str, step: Fut) -> bool
where
    Fut: Future<Output = Result<(), E>>,
    E: fmt::Display,
{
    match time::timeout(TEARDOWN_TIMEOUT, step).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            warn!("Failed to {}: {}", what, err);
            false
        }
        Err(_elapsed) => {
            warn!(
                timeout_secs = TEARDOWN_TIMEOUT.as_secs(),
                "Timed out trying to {}", what
            );
            false
        }
    }
}

/// An open connection together with its session.
///
/// Dropping a `BrokerSession` does not end the session gracefully, call
/// [`BrokerSession::close`] on every path once it is no longer needed.
pub struct BrokerSession {
    connection: ConnectionHandle<()>,
    session: SessionHandle<()>,
}

impl BrokerSession {
    /// Dials the broker and begins a session
    pub async fn open(config: &ConnectionConfig) -> Result<Self, Error> {
        config.warn_ignored_flags();
        if config.insecure {
            debug!("insecure flag on, will skip certificate validation");
        }
        let connector = tls::connector(config.certificate_validation())?;

        let mut builder = Connection::builder()
            .container_id(config.container_id.clone())
            .rustls_connector(connector);
        if let Some(profile) = config.sasl_profile() {
            debug!("anonymous flag on, will send a SASL Anonymous");
            builder = builder.sasl_profile(profile);
        }

        debug!(broker = %config.redacted_broker(), "Connecting");
        let url = config.dial_url();
        let mut connection = builder.open(url.as_str()).await?;

        let session = match Session::begin(&mut connection).await {
            Ok(session) => session,
            Err(err) => {
                teardown("close the connection", connection.close()).await;
                return Err(err.into());
            }
        };
        debug!(container_id = %config.container_id, "session begun");

        Ok(Self {
            connection,
            session,
        })
    }

    /// Get a mutable reference to the session
    pub fn session_mut(&mut self) -> &mut SessionHandle<()> {
        &mut self.session
    }

    /// Ends the session then closes the connection.
    ///
    /// Each step is bounded by [`TEARDOWN_TIMEOUT`]. Failures are logged and
    /// otherwise ignored, the broker reclaims both once the transport is gone.
    pub async fn close(mut self) {
        teardown("end the session", self.session.end()).await;
        if teardown("close the connection", self.connection.close()).await {
            debug!("connection closed");
        }
    }
}
