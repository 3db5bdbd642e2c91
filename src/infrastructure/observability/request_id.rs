use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request extension carrying the correlation id, so handlers and the
/// submission service can tie their logs to one dashboard call.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Propagate the caller's `x-request-id` or mint a fresh one, attach it to
/// the request span, and echo it on the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        uri = %request.uri().path()
    );
    // Instrument the future rather than entering the span: an entered guard
    // held across an await leaks the span onto whatever task the executor
    // schedules next on this thread.
    let mut response = next.run(request).instrument(span).await;
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER, header_value);
    }
    response
}
