//! 请求上下文与会话
//!
//! - request_context：请求上下文中间件，沿用或生成 x-request-id / x-trace-id，
//!   写回请求头并在响应中回显，同时建立请求级 span
//! - require_session：从请求头构造 SessionContext（`x-actor`，缺省 `anonymous`）
//!
//! 每个 handler 显式构造会话并向下传递，不存在全局“当前选中”状态。

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use devsim_telemetry::new_request_ids;
use domain::SessionContext;
use tracing::{Instrument, info_span};

use crate::utils::response::bad_request_error;

pub const ACTOR_HEADER: &str = "x-actor";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const TRACE_ID_HEADER: &str = "x-trace-id";
const ANONYMOUS: &str = "anonymous";
const ACTOR_MAX_LEN: usize = 100;

/// 请求上下文中间件：注入 request_id/trace_id
pub async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    let generated = new_request_ids();
    let request_id = header_text(req.headers(), REQUEST_ID_HEADER).unwrap_or(generated.request_id);
    let trace_id = header_text(req.headers(), TRACE_ID_HEADER).unwrap_or(generated.trace_id);
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    set_header(req.headers_mut(), REQUEST_ID_HEADER, &request_id);
    set_header(req.headers_mut(), TRACE_ID_HEADER, &trace_id);

    let span = info_span!(
        "request",
        request_id = %request_id,
        trace_id = %trace_id,
        method = %method,
        path = %path
    );

    let mut response = next.run(req).instrument(span).await;
    set_header(response.headers_mut(), REQUEST_ID_HEADER, &request_id);
    set_header(response.headers_mut(), TRACE_ID_HEADER, &trace_id);
    response
}

/// 构造会话上下文
pub fn require_session(headers: &HeaderMap) -> Result<SessionContext, Response> {
    let actor = match headers.get(ACTOR_HEADER) {
        None => ANONYMOUS.to_string(),
        Some(value) => {
            let actor = value
                .to_str()
                .map_err(|_| bad_request_error("x-actor must be visible ASCII"))?
                .trim();
            if actor.is_empty() || actor.len() > ACTOR_MAX_LEN {
                return Err(bad_request_error(format!(
                    "x-actor must be between 1 and {ACTOR_MAX_LEN} characters"
                )));
            }
            actor.to_string()
        }
    };
    let request_id = header_text(headers, REQUEST_ID_HEADER).unwrap_or_default();
    let trace_id = header_text(headers, TRACE_ID_HEADER).unwrap_or_default();
    Ok(SessionContext::new(actor, request_id, trace_id))
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn missing_actor_is_anonymous() {
        let ctx = require_session(&HeaderMap::new()).expect("session");
        assert_eq!(ctx.actor, "anonymous");
        assert!(ctx.request_id.is_empty());
    }

    #[test]
    fn actor_and_ids_are_read_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_HEADER, HeaderValue::from_static(" alice "));
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-1"));
        let ctx = require_session(&headers).expect("session");
        assert_eq!(ctx.actor, "alice");
        assert_eq!(ctx.request_id, "req-1");
    }

    #[test]
    fn blank_actor_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_HEADER, HeaderValue::from_static("  "));
        let response = require_session(&headers).expect_err("blank actor");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
