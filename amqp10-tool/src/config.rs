//! Plain configuration handed from the command line to the core

use std::time::Duration;

use fe2o3_amqp::sasl_profile::SaslProfile;
use url::Url;

use crate::{
    cli::{GlobalArgs, PurgeArgs},
    purge::PurgeOptions,
    tls::CertificateValidation,
    Error,
};

/// Default broker address
pub const DEFAULT_BROKER: &str = "amqp://localhost:5672";

/// Settings used to dial the broker
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub broker: Url,
    pub insecure: bool,
    pub anonymous: bool,
    pub container_id: String,
}

impl ConnectionConfig {
    pub fn new(broker: Url) -> Self {
        Self {
            broker,
            insecure: false,
            anonymous: false,
            container_id: format!("amqp10-tool-{}", std::process::id()),
        }
    }

    pub fn certificate_validation(&self) -> CertificateValidation {
        CertificateValidation::from_insecure(self.insecure)
    }

    /// SASL profile forced by the command line.
    ///
    /// `None` leaves the choice to the URL: credentials select PLAIN and a
    /// URL without them skips SASL.
    pub fn sasl_profile(&self) -> Option<SaslProfile> {
        self.anonymous.then_some(SaslProfile::Anonymous)
    }

    /// URL handed to the connection builder.
    ///
    /// With the anonymous flag the credentials are stripped, otherwise the
    /// builder would pick PLAIN from them over the forced profile.
    pub fn dial_url(&self) -> Url {
        let mut url = self.broker.clone();
        if self.anonymous && self.has_credentials() {
            let _ = url.set_password(None);
            let _ = url.set_username("");
        }
        url
    }

    /// Whether the scheme asks for TLS
    pub fn is_tls(&self) -> bool {
        self.broker.scheme() == "amqps"
    }

    /// Broker URL with the password masked, for logging
    pub fn redacted_broker(&self) -> String {
        let mut url = self.broker.clone();
        if url.password().is_some() {
            let _ = url.set_password(Some("***"));
        }
        url.to_string()
    }

    fn has_credentials(&self) -> bool {
        !self.broker.username().is_empty()
    }

    /// Logs combinations of flags that do not do what they suggest
    pub(crate) fn warn_ignored_flags(&self) {
        if self.insecure && !self.is_tls() {
            tracing::warn!(
                scheme = self.broker.scheme(),
                "insecure flag has no effect without amqps"
            );
        }
        if self.anonymous && self.has_credentials() {
            tracing::warn!("anonymous flag on, credentials in the broker URL are ignored");
        }
    }
}

impl From<&GlobalArgs> for ConnectionConfig {
    fn from(args: &GlobalArgs) -> Self {
        Self {
            insecure: args.insecure,
            anonymous: args.anonymous,
            ..Self::new(args.broker.clone())
        }
    }
}

impl PurgeArgs {
    /// Checks the arguments before any network activity
    pub fn validate(&self) -> Result<&str, Error> {
        let queue = self.queue.trim();
        if queue.is_empty() {
            return Err(Error::MissingQueue);
        }
        Ok(queue)
    }

    pub fn options(&self) -> PurgeOptions {
        PurgeOptions {
            timeout: Duration::from_secs(self.timeout),
            max_retries: self.retries,
        }
    }
}
