use axum::http::Request;

/// Optional API key shared by submitters and workers. When unset, the API
/// is open (development mode).
#[derive(Clone)]
pub struct ApiAuth {
    pub token: Option<String>,
}

/// Accepts either `Authorization: Bearer <token>` or `X-API-Key: <token>`.
pub fn check_api_auth(auth: &ApiAuth, req: &Request<axum::body::Body>) -> bool {
    let Some(expected) = &auth.token else {
        return true;
    };

    let bearer = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|t| t == expected)
        .unwrap_or(false);

    if bearer {
        return true;
    }

    req.headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(|t| t == expected)
        .unwrap_or(false)
}
