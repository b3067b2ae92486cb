use actix_web::{web, HttpRequest, HttpResponse};

use crate::decision::{decide, redirect_response, GatewayDecision};
use crate::error::truncate_for_log;
use crate::forward::{forward_request, read_request_body};
use crate::metrics::{DECISIONS_TOTAL, FORWARD_ERRORS};
use crate::state::AppState;

/// ANY /* - classify, verify if needed, then forward or redirect.
/// Mounted as the app's default service so it sees every unrouted request.
///
/// Always answers with the origin's response or one of the gateway
/// redirects; errors never surface as a raw 5xx from here. The body is
/// only read after the decision, so redirects never wait on an upload.
pub async fn handle(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
) -> HttpResponse {
    let path = req.path();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or(path);

    let decision = decide(
        &state.rules,
        &state.verifier,
        path,
        path_and_query,
        req.headers(),
    )
    .await;

    let trust = match decision {
        GatewayDecision::Forward(trust) => trust,
        redirect => {
            DECISIONS_TOTAL.with_label_values(&[redirect.label()]).inc();
            let location = redirect
                .location(&state.config)
                .unwrap_or_else(|| state.config.error_path.clone());
            tracing::debug!(path = %path, decision = redirect.label(), "redirecting");
            return redirect_response(&location, state.config.security_headers);
        }
    };

    let limits = state.forward_limits();
    let content_length = req
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    let forwarded = async {
        let body = read_request_body(payload, content_length, limits.max_request_bytes).await?;
        forward_request(
            &state.http_client,
            &state.config.origin_url,
            &req,
            body,
            trust.as_ref(),
            limits,
        )
        .await
    }
    .await;

    match forwarded {
        Ok(response) => {
            DECISIONS_TOTAL
                .with_label_values(&[GatewayDecision::Forward(None).label()])
                .inc();
            response
        }
        Err(e) => {
            FORWARD_ERRORS.inc();
            DECISIONS_TOTAL
                .with_label_values(&[GatewayDecision::RedirectError.label()])
                .inc();
            tracing::error!(
                path = %path,
                reason = e.reason(),
                error = %truncate_for_log(&e.to_string()),
                "request could not be forwarded to origin"
            );
            redirect_response(&state.config.error_path, state.config.security_headers)
        }
    }
}
