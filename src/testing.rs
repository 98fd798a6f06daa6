//! Scripted collaborators for unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Method;

use crate::dataplane::client::{DataplaneRequest, DataplaneResponse, Transport};
use crate::dataplane::types::{DataplaneError, DataplaneResult};
use crate::exposition::ExpositionSource;

type Handler = Box<dyn FnMut(&DataplaneRequest) -> DataplaneResult<DataplaneResponse> + Send>;

/// A [`Transport`] answering from a closure and recording every request.
pub(crate) struct ScriptedTransport {
    handler: Mutex<Handler>,
    calls: Mutex<Vec<DataplaneRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new<F>(handler: F) -> Arc<Self>
    where
        F: FnMut(&DataplaneRequest) -> DataplaneResult<DataplaneResponse> + Send + 'static,
    {
        Arc::new(Self {
            handler: Mutex::new(Box::new(handler)),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> Vec<DataplaneRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls with `method` whose path starts with `prefix`.
    pub(crate) fn count(&self, method: &Method, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| &c.method == method && c.path.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn call(&self, request: DataplaneRequest) -> DataplaneResult<DataplaneResponse> {
        self.calls.lock().unwrap().push(request.clone());
        let mut handler = self.handler.lock().unwrap();
        (handler)(&request)
    }
}

/// An [`ExpositionSource`] serving whatever text was last queued.
pub(crate) struct ScriptedFeed {
    payload: Mutex<DataplaneResult<String>>,
}

impl ScriptedFeed {
    pub(crate) fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            payload: Mutex::new(Ok(text.to_string())),
        })
    }

    pub(crate) fn set(&self, text: &str) {
        *self.payload.lock().unwrap() = Ok(text.to_string());
    }

    pub(crate) fn fail(&self, err: DataplaneError) {
        *self.payload.lock().unwrap() = Err(err);
    }
}

#[async_trait]
impl ExpositionSource for ScriptedFeed {
    async fn fetch_text(&self) -> DataplaneResult<String> {
        self.payload.lock().unwrap().clone()
    }
}
