//! Errors raised while purging a queue

use fe2o3_amqp::{
    connection::OpenError,
    link::{DispositionError, ReceiverAttachError, RecvError},
    session::BeginError,
};

use crate::purge::PurgeError;

/// Errors that terminate the tool with a non-zero exit status
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The purge command was invoked without a queue name
    #[error("Missing parameter: queue name is mandatory")]
    MissingQueue,

    /// The TLS client configuration could not be built
    #[error("Failed to configure TLS: {0}")]
    Tls(#[from] librustls::Error),

    /// Dialing the broker failed
    #[error("Failed to connect to amqp: {0}")]
    Connect(#[from] OpenError),

    /// The broker refused to begin a session
    #[error("Failed to open a session: {0}")]
    Session(#[from] BeginError),

    /// The receiving link could not be attached to the queue
    #[error("Failed to attach a receiver to {queue}: {source}")]
    Attach {
        queue: String,
        #[source]
        source: ReceiverAttachError,
    },

    /// The purge loop stopped on a fatal link error
    #[error(transparent)]
    Purge(#[from] PurgeError<LinkError>),
}

impl Error {
    /// Number of messages accepted before the error occurred, if the
    /// receiving link was attached at all
    pub fn partial_count(&self) -> Option<u64> {
        match self {
            Error::Purge(err) => Some(err.count()),
            _ => None,
        }
    }
}

/// Errors reported by the AMQP receiving link
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Receiving a delivery failed
    #[error(transparent)]
    Recv(#[from] RecvError),

    /// Settling a delivery failed
    #[error(transparent)]
    Disposition(#[from] DispositionError),
}
