use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{Instrument, info, info_span};

use mediaconv_core::TraceContext;

pub const TRACE_ID_HEADER: HeaderName = HeaderName::from_static("x-trace-id");

/// Attach a `TraceContext` to every request.
///
/// The trace id comes from `x-trace-id` when the caller sends one, else a new
/// one is minted. It is echoed on the response and carried by the request span.
pub async fn trace_middleware(mut req: Request<Body>, next: Next) -> Response {
    let ctx = trace_context(&req);
    let span = info_span!(
        "http_request",
        trace_id = %ctx.trace_id(),
        method = %req.method(),
        path = %req.uri().path(),
    );

    let header = HeaderValue::from_str(ctx.trace_id()).ok();
    req.extensions_mut().insert(ctx);

    async move {
        let mut response = next.run(req).await;
        info!(status = response.status().as_u16(), "request handled");

        if let Some(header) = header {
            response.headers_mut().insert(TRACE_ID_HEADER, header);
        }
        response
    }
    .instrument(span)
    .await
}

fn trace_context(req: &Request<Body>) -> TraceContext {
    req.headers()
        .get(&TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(TraceContext::new)
        .unwrap_or_else(TraceContext::generate)
}
