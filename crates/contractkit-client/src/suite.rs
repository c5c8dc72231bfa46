//! Client suite: one client per registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use contractkit_protocol::{Converters, Endpoint, Registry};
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::options::{ClientOptions, OptionsOverride};
use crate::outcome::{CallOutcome, interpret};
use crate::prepare::{CallInput, PreparedRequest, prepare_request};
use crate::transport::{FetchTransport, Transport};

/// Calls the endpoints of a [`Registry`] by name.
///
/// Options are resolved per endpoint: the base [`ClientOptions`], then the
/// [`OptionsOverride`]s registered for that endpoint, in order.
#[derive(Clone)]
pub struct ClientSuite {
    registry: Registry,
    options: ClientOptions,
    overrides: HashMap<String, OptionsOverride>,
    converters: HashMap<String, Converters>,
    transport: Arc<dyn Transport>,
}

impl ClientSuite {
    /// Creates a suite sending over HTTP with [`FetchTransport`].
    pub fn new(registry: Registry, options: ClientOptions) -> Self {
        Self {
            registry,
            options,
            overrides: HashMap::new(),
            converters: HashMap::new(),
            transport: Arc::new(FetchTransport::new()),
        }
    }

    /// Builder: replace the default transport.
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Builder: override options for the named endpoints only.
    ///
    /// Overrides for the same endpoint stack; the last one to set a key
    /// wins.
    pub fn with_override<I, S>(mut self, names: I, over: OptionsOverride) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.registry.contains(&name) {
                warn!(endpoint = %name, "Override for unknown endpoint");
            }
            let merged = match self.overrides.get(&name) {
                Some(existing) => existing.merge(&over),
                None => over.clone(),
            };
            self.overrides.insert(name, merged);
        }
        self
    }

    /// Builder: converters for one endpoint.
    pub fn with_converters(mut self, name: impl Into<String>, converters: Converters) -> Self {
        self.converters.insert(name.into(), converters);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Effective options for endpoint `name`.
    pub fn options_for(&self, name: &str) -> ClientOptions {
        match self.overrides.get(name) {
            Some(over) => self.options.apply(over),
            None => self.options.clone(),
        }
    }

    fn endpoint(&self, name: &str) -> ClientResult<&Endpoint> {
        self.registry
            .get(name)
            .ok_or_else(|| ClientError::UnknownEndpoint(name.to_string()))
    }

    /// Builds the request for `name` without sending it.
    ///
    /// # Errors
    ///
    /// See [`prepare_request`].
    pub fn prepare(&self, name: &str, input: &CallInput) -> ClientResult<PreparedRequest> {
        let endpoint = self.endpoint(name)?;
        let converters = self.converters.get(name).cloned().unwrap_or_default();
        prepare_request(name, endpoint, &self.options_for(name), &converters, input)
    }

    /// Calls endpoint `name` with the suite's transport.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] only for problems with the caller input;
    /// everything the server answers is a [`CallOutcome`].
    pub async fn call(&self, name: &str, input: CallInput) -> ClientResult<CallOutcome> {
        self.call_with(self.transport.as_ref(), name, input).await
    }

    /// Calls endpoint `name` with another transport.
    #[tracing::instrument(name = "call", skip_all, fields(endpoint = %name))]
    pub async fn call_with(
        &self,
        transport: &dyn Transport,
        name: &str,
        input: CallInput,
    ) -> ClientResult<CallOutcome> {
        let endpoint = self.endpoint(name)?;
        let request = self.prepare(name, &input)?;
        let method = request.method;
        let url = request.url.to_string();

        let start = Instant::now();
        let sent = transport.send(request).await;
        let outcome = interpret(sent, endpoint.response());
        debug!(
            method = %method,
            url = %url,
            status = ?outcome.status(),
            success = outcome.is_success(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Call finished"
        );
        Ok(outcome)
    }
}

impl fmt::Debug for ClientSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSuite")
            .field("endpoints", &self.registry.len())
            .field("options", &self.options)
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}
