//! Request and response hooks

use tracing::{debug, trace};

use crate::engine::Engine;
use crate::fingerprint::{derive_key, now_millis, Method};

use super::{Call, CallResult, Response, Transport};

impl Engine {
    /// Outbound hook: return a recorded response to short-circuit the call
    ///
    /// `None` means the call must go to the network. Never fails; anything
    /// unexpected is treated as "not admitted".
    pub fn on_request(&self, call: &Call) -> Option<Response> {
        let site = self.site();
        let url = call.resolved_url();
        let mut state = self.write_state();

        if !state.rules.serve {
            return None;
        }
        if url.is_empty() || !state.matcher.admits_call(&site, &url) {
            trace!("Passthrough, not admitted: {} {}", call.method, url);
            return None;
        }
        let Ok(method) = call.method.parse::<Method>() else {
            trace!("Passthrough, unsupported method: {}", call.method);
            return None;
        };

        let ignore_params = state.rules.ignore_params;
        let key = derive_key(&site, method, &url, call.data.as_ref(), ignore_params);

        let served = {
            let Some(variant) = state.store.lookup(&key, ignore_params) else {
                trace!("Passthrough, nothing recorded: {} {}", method, url);
                return None;
            };
            Response::from_recorded(&variant.response, variant.status)
        };
        state.store.touch(&site, method, &url, now_millis());

        debug!("Serving recorded {} {} -> {}", method, url, served.status);
        Some(served)
    }

    /// Inbound hook: record the outcome of a call that reached the network
    ///
    /// Failures are recorded only when they carry a server response.
    pub fn on_response(&self, call: &Call, outcome: &CallResult) {
        let response = match outcome {
            Ok(response) => response,
            Err(err) => match &err.response {
                Some(response) => response,
                None => {
                    trace!("Not capturing {} {}: {}", call.method, call.url, err);
                    return;
                }
            },
        };

        let site = self.site();
        let url = call.resolved_url();
        let mut state = self.write_state();

        if !state.rules.is_recording() {
            return;
        }
        if url.is_empty() || !state.matcher.admits_call(&site, &url) {
            return;
        }
        let Ok(method) = call.method.parse::<Method>() else {
            return;
        };
        let Ok(recorded) = response.to_recorded() else {
            debug!("Response for {} {} is not representable as JSON", method, url);
            return;
        };

        let key = derive_key(&site, method, &url, call.data.as_ref(), state.rules.ignore_params);
        state
            .store
            .capture(&key, recorded, response.status, now_millis());
    }

    /// Run a call through both hooks around `transport`
    ///
    /// A served call never reaches the transport. Otherwise the transport's
    /// outcome is returned unchanged after being offered for capture.
    pub async fn dispatch<T>(&self, call: Call, transport: &T) -> CallResult
    where
        T: Transport,
    {
        if let Some(served) = self.on_request(&call) {
            return Ok(served);
        }

        let url = call.resolved_url();
        let outcome = transport.send(&call, &url).await;
        self.on_response(&call, &outcome);
        outcome
    }
}
