use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use super::AppState;

/// Pages load one stylesheet and the settings script from `public/`, and the
/// script only talks back to this origin. Nothing is inline.
pub const CONTENT_SECURITY_POLICY: &str = "default-src 'none'; script-src 'self'; \
     style-src 'self'; img-src 'self'; connect-src 'self'; form-action 'self'; \
     frame-ancestors 'none'; base-uri 'none'";

/// Route label for requests answered by the static file fallback.
const STATIC_ROUTE: &str = "static";

/// GET /metrics
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.prometheus_handle.as_ref().map_or_else(
        || "Metrics are disabled".to_string(),
        metrics_exporter_prometheus::PrometheusHandle::render,
    )
}

/// Opens the request span and records `sorbet_http_*` metrics.
///
/// The `user` field stays empty until the auth middleware fills it in.
pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4();

    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or(STATIC_ROUTE, MatchedPath::as_str)
        .to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
        route = %route,
        user = tracing::field::Empty,
    );

    async move {
        let response = next.run(req).await;

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let status = response.status();
        let outcome = request_outcome(&response);

        let labels = [
            ("method", method),
            ("route", route),
            ("outcome", outcome.to_string()),
        ];
        metrics::counter!("sorbet_http_requests_total", &labels).increment(1);
        metrics::histogram!("sorbet_http_request_duration_seconds", &labels)
            .record(start.elapsed().as_secs_f64());

        info!(
            duration_ms,
            status_code = status.as_u16(),
            outcome,
            "Request finished"
        );

        response
    }
    .instrument(span)
    .await
}

/// Buckets a response for logs and metrics. Bounces to the login form are
/// told apart from ordinary redirects.
fn request_outcome(response: &Response) -> &'static str {
    let status = response.status();

    if status.is_server_error() {
        "error"
    } else if status == StatusCode::NOT_FOUND {
        "not_found"
    } else if status.is_client_error() {
        "rejected"
    } else if status.is_redirection() {
        let to_login = response
            .headers()
            .get(header::LOCATION)
            .is_some_and(|location| location == "/login" || location == "/login/2fa");
        if to_login { "login_required" } else { "redirect" }
    } else {
        "ok"
    }
}

pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(CONTENT_SECURITY_POLICY),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::Redirect;

    #[test]
    fn login_bounces_are_their_own_outcome() {
        assert_eq!(request_outcome(&Redirect::to("/login").into_response()), "login_required");
        assert_eq!(
            request_outcome(&Redirect::to("/login/2fa").into_response()),
            "login_required"
        );
        assert_eq!(request_outcome(&Redirect::to("/settings").into_response()), "redirect");
    }

    #[test]
    fn statuses_map_to_outcomes() {
        assert_eq!(request_outcome(&StatusCode::OK.into_response()), "ok");
        assert_eq!(request_outcome(&StatusCode::NOT_FOUND.into_response()), "not_found");
        assert_eq!(
            request_outcome(&StatusCode::EXPECTATION_FAILED.into_response()),
            "rejected"
        );
        assert_eq!(
            request_outcome(&StatusCode::INTERNAL_SERVER_ERROR.into_response()),
            "error"
        );
    }
}
