use poem::http::StatusCode;
use poem::{Endpoint, IntoResponse, Middleware, Request, Response};
use std::time::Instant;

/// Logs one line per HTTP request: method, path, status, duration and client IP.
/// Failures are logged at `warn`, handler errors at `error`.
pub struct RequestLogging;

impl<E: Endpoint> Middleware<E> for RequestLogging {
    type Output = RequestLoggingEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        RequestLoggingEndpoint { inner: ep }
    }
}

pub struct RequestLoggingEndpoint<E> {
    inner: E,
}

struct RequestSummary {
    method: String,
    path: String,
    client_ip: String,
    started: Instant,
}

impl RequestSummary {
    fn from_request(req: &Request) -> Self {
        Self {
            method: req.method().to_string(),
            path: req.uri().path().to_string(),
            client_ip: req
                .remote_addr()
                .as_socket_addr()
                .map(|addr| addr.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            started: Instant::now(),
        }
    }

    fn completed(&self, status: StatusCode) {
        let duration_ms = self.started.elapsed().as_millis();
        if status.is_client_error() || status.is_server_error() {
            tracing::warn!(
                method = %self.method,
                path = %self.path,
                status = %status.as_u16(),
                duration_ms = %duration_ms,
                client_ip = %self.client_ip,
                "request failed"
            );
        } else {
            tracing::info!(
                method = %self.method,
                path = %self.path,
                status = %status.as_u16(),
                duration_ms = %duration_ms,
                client_ip = %self.client_ip,
                "request completed"
            );
        }
    }

    fn errored(&self, err: &poem::Error) {
        tracing::error!(
            method = %self.method,
            path = %self.path,
            status = %err.status().as_u16(),
            duration_ms = %self.started.elapsed().as_millis(),
            client_ip = %self.client_ip,
            error = %err,
            "request error"
        );
    }
}

impl<E: Endpoint> Endpoint for RequestLoggingEndpoint<E> {
    type Output = Response;

    async fn call(&self, req: Request) -> poem::Result<Self::Output> {
        let summary = RequestSummary::from_request(&req);
        match self.inner.call(req).await {
            Ok(resp) => {
                let resp = resp.into_response();
                summary.completed(resp.status());
                Ok(resp)
            }
            Err(err) => {
                summary.errored(&err);
                Err(err)
            }
        }
    }
}
