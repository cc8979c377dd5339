//! Small helpers shared by the HTTP-backed implementations.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Send a request, turning transport failures and non-success statuses into
/// the player's error categories. `what` names the resource in errors.
pub(crate) async fn send(request: RequestBuilder, what: &str, timeout: Duration) -> Result<Response> {
    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            let kind = classify(&err, what, timeout);
            return Err(err).or_raise(|| kind);
        }
    };
    let status = response.status();
    if !status.is_success() {
        exn::bail!(ErrorKind::from_status(status.as_u16(), what));
    }
    Ok(response)
}

/// Read the whole body.
pub(crate) async fn read_bytes(response: Response, what: &str, timeout: Duration) -> Result<Vec<u8>> {
    match response.bytes().await {
        Ok(bytes) => Ok(bytes.to_vec()),
        Err(err) => {
            let kind = classify(&err, what, timeout);
            Err(err).or_raise(|| kind)
        }
    }
}

/// Read the whole body as JSON.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response, what: &str, timeout: Duration) -> Result<T> {
    let bytes = read_bytes(response, what, timeout).await?;
    serde_json::from_slice(&bytes).or_raise(|| ErrorKind::Protocol(what.to_string()))
}

fn classify(err: &reqwest::Error, what: &str, timeout: Duration) -> ErrorKind {
    if err.is_timeout() {
        ErrorKind::Timeout(timeout)
    } else if err.is_builder() {
        ErrorKind::Configuration(what.to_string())
    } else if err.is_decode() {
        ErrorKind::Protocol(what.to_string())
    } else {
        ErrorKind::TransientNetwork(what.to_string())
    }
}
