use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::errors::AppError;
use crate::AppState;

/// What the bearer presented. Built from raw query pairs so that no query
/// string, however malformed, is rejected before the attempt is logged.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AccessParams {
    pub access: bool,
    pub token: String,
}

impl AccessParams {
    /// A repeated `token` is kept joined with `,`, which can never match an
    /// issued token, so it is denied and logged as not found.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut access = false;
        let mut tokens = Vec::new();
        for (key, value) in pairs {
            match key.as_str() {
                "access" => access = true,
                "token" => tokens.push(value),
                _ => {}
            }
        }
        Self {
            access,
            token: tokens.join(",").trim().to_string(),
        }
    }
}

/// GET /?access=true&token=<id>
///
/// Answers 302 to the destination on success and 302 to the denial target
/// otherwise. Without `access`, `/` is a plain landing page so the default
/// denial target does not loop.
pub async fn access_handler(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let params = AccessParams::from_pairs(pairs);
    if !params.access {
        return Ok((StatusCode::OK, "privlink").into_response());
    }

    let client_ip = connect_info.map(|ConnectInfo(addr)| addr.ip().to_string());
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());

    let decision = state
        .gateway
        .handle(&params.token, client_ip.as_deref(), user_agent)
        .await?;

    Ok(found(decision.location()))
}

/// 302 Found with a Location header.
fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => {
            tracing::error!("redirect target is not a valid header value");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
