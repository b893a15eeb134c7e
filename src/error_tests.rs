use super::*;

#[test]
fn http_status_mapping() {
    assert_eq!(AppError::unauthenticated("no_session", "missing").http_status(), 401);
    assert_eq!(AppError::forbidden("forbidden", "admin only").http_status(), 403);
    assert_eq!(AppError::unavailable("provider_down", "timeout").http_status(), 503);
    assert_eq!(AppError::validation("duplicate_email", "taken").http_status(), 400);
    assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
    assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
}

#[test]
fn display_carries_code_and_message() {
    let e = AppError::validation("invalid_email", "email is not valid");
    assert_eq!(e.to_string(), "invalid_email: email is not valid");
    assert_eq!(e.code_str(), "invalid_email");
    assert_eq!(e.message(), "email is not valid");
}

#[tokio::test]
async fn into_response_renders_error_body() {
    use http_body_util::BodyExt;

    let resp = AppError::forbidden("forbidden", "admin role required").into_response();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(v, serde_json::json!({"error": "admin role required"}));
}

#[test]
fn anyhow_maps_to_internal() {
    let e: AppError = anyhow::anyhow!("boom").into();
    assert_eq!(e.http_status(), 500);
    assert_eq!(e.message(), "boom");
}
