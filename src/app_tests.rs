use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::{app::build_app, mail::Outbox, state::AppState, users::Role};

async fn send(app: &Router, req: Request<Body>) -> Response {
    app.clone().oneshot(req).await.unwrap()
}

fn json_req(method: &str, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    req.body(Body::from(body.to_string())).unwrap()
}

fn get_req(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut req = Request::builder().uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    req.body(Body::empty()).unwrap()
}

async fn body_json(res: Response) -> Value {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn signup_body(email: &str) -> Value {
    json!({
        "email": email,
        "password": "secret12",
        "confirmPassword": "secret12",
        "name": "A"
    })
}

async fn signup(app: &Router, email: &str) -> String {
    let res = send(app, json_req("POST", "/api/v1/auth/signup", signup_body(email), None)).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    body_json(res).await["token"].as_str().unwrap().to_string()
}

fn set_cookies(res: &Response) -> Vec<String> {
    res.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn signup_returns_token_and_user_without_password() {
    let app = build_app(AppState::fake());
    let res = send(
        &app,
        json_req("POST", "/api/v1/auth/signup", signup_body("a@x.com"), None),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert!(set_cookies(&res)
        .iter()
        .any(|c| c.starts_with("jwt=") && c.contains("HttpOnly")));

    let body = body_json(res).await;
    assert_eq!(body["status"], "success");
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["data"]["user"]["email"], "a@x.com");
    assert!(body["data"]["user"].get("password").is_none());
    assert!(!body.to_string().contains("secret12"));
}

#[tokio::test]
async fn duplicate_signup_is_rejected() {
    let app = build_app(AppState::fake());
    signup(&app, "a@x.com").await;
    let res = send(
        &app,
        json_req("POST", "/api/v1/auth/signup", signup_body("a@x.com"), None),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(res).await;
    assert_eq!(body["status"], "fail");
    assert!(body["message"].as_str().unwrap().contains("a@x.com"));
}

#[tokio::test]
async fn invalid_signup_lists_field_errors_in_development() {
    let app = build_app(AppState::fake());
    let res = send(
        &app,
        json_req(
            "POST",
            "/api/v1/auth/signup",
            json!({ "email": "nope", "password": "short", "confirmPassword": "other", "name": "A" }),
            None,
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(res).await;
    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("invalid input data: "));
    assert!(message.contains("Please enter a valid email"));
    assert!(body.get("stackTrace").is_some());
    assert!(body["error"].is_array());
}

#[tokio::test]
async fn login_outcomes() {
    let app = build_app(AppState::fake());
    signup(&app, "a@x.com").await;

    let ok = send(
        &app,
        json_req(
            "POST",
            "/api/v1/auth/login",
            json!({ "email": "a@x.com", "password": "secret12" }),
            None,
        ),
    )
    .await;
    assert_eq!(ok.status(), StatusCode::OK);
    assert!(body_json(ok).await["token"].is_string());

    let wrong = send(
        &app,
        json_req(
            "POST",
            "/api/v1/auth/login",
            json!({ "email": "a@x.com", "password": "wrong-pass" }),
            None,
        ),
    )
    .await;
    let unknown = send(
        &app,
        json_req(
            "POST",
            "/api/v1/auth/login",
            json!({ "email": "b@x.com", "password": "secret12" }),
            None,
        ),
    )
    .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    let wrong = body_json(wrong).await;
    let unknown = body_json(unknown).await;
    assert_eq!(wrong["message"], "Incorrect email or password");
    assert_eq!(wrong["message"], unknown["message"]);

    let missing = send(
        &app,
        json_req("POST", "/api/v1/auth/login", json!({ "email": "a@x.com" }), None),
    )
    .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn profile_requires_authentication() {
    let app = build_app(AppState::fake());
    let token = signup(&app, "a@x.com").await;

    let anon = send(&app, get_req("/profile", None)).await;
    assert_eq!(anon.status(), StatusCode::UNAUTHORIZED);

    let authed = send(&app, get_req("/profile", Some(&token))).await;
    assert_eq!(authed.status(), StatusCode::OK);
    assert_eq!(body_json(authed).await["data"]["user"]["email"], "a@x.com");

    let garbage = send(&app, get_req("/profile", Some("not.a.jwt"))).await;
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(garbage).await["message"],
        "Invalid token, please try again!"
    );
}

#[tokio::test]
async fn password_reset_flow_revokes_older_tokens() {
    let outbox = Outbox::new();
    let app = build_app(AppState::fake_with_mailer(outbox.clone()));
    let old_token = signup(&app, "a@x.com").await;

    let res = send(
        &app,
        json_req(
            "POST",
            "/api/v1/auth/forgot-password",
            json!({ "email": "a@x.com" }),
            None,
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = outbox.sent()[0].body.clone();
    let start = body.find("/reset-password/").unwrap() + "/reset-password/".len();
    let raw: String = body[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect();
    assert_eq!(raw.len(), 64);

    let res = send(
        &app,
        json_req(
            "PATCH",
            &format!("/api/v1/auth/reset-password/{raw}"),
            json!({ "password": "brandnew1", "confirmPassword": "brandnew1" }),
            None,
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let new_token = body_json(res).await["token"].as_str().unwrap().to_string();

    let stale = send(&app, get_req("/profile", Some(&old_token))).await;
    assert_eq!(stale.status(), StatusCode::UNAUTHORIZED);
    let fresh = send(&app, get_req("/profile", Some(&new_token))).await;
    assert_eq!(fresh.status(), StatusCode::OK);

    let reused = send(
        &app,
        json_req(
            "PATCH",
            &format!("/api/v1/auth/reset-password/{raw}"),
            json!({ "password": "another12", "confirmPassword": "another12" }),
            None,
        ),
    )
    .await;
    assert_eq!(reused.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_password_revokes_the_token_used_for_it() {
    let app = build_app(AppState::fake());
    let old_token = signup(&app, "a@x.com").await;

    let res = send(
        &app,
        json_req(
            "PATCH",
            "/api/v1/auth/update-password",
            json!({
                "currentPassword": "secret12",
                "password": "brandnew1",
                "confirmPassword": "brandnew1"
            }),
            Some(&old_token),
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let new_token = body_json(res).await["token"].as_str().unwrap().to_string();

    let stale = send(&app, get_req("/profile", Some(&old_token))).await;
    assert_eq!(stale.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(stale).await["message"],
        "The password has been changed recently, please log in again"
    );
    let fresh = send(&app, get_req("/profile", Some(&new_token))).await;
    assert_eq!(fresh.status(), StatusCode::OK);
}

#[tokio::test]
async fn malformed_bodies_get_the_json_error_shape() {
    let app = build_app(AppState::fake());

    let broken = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/api/v1/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;
    let no_content_type = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/api/v1/auth/signup")
            .body(Body::from(signup_body("a@x.com").to_string()))
            .unwrap(),
    )
    .await;
    let mistyped = send(
        &app,
        json_req(
            "POST",
            "/api/v1/auth/forgot-password",
            json!({ "email": 42 }),
            None,
        ),
    )
    .await;

    for res in [broken, no_content_type, mistyped] {
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            res.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        let body = body_json(res).await;
        assert_eq!(body["status"], "fail");
        assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
        assert!(body.get("stackTrace").is_some());
    }
}

#[tokio::test]
async fn forgot_password_for_unknown_email_is_not_found() {
    let app = build_app(AppState::fake());
    let res = send(
        &app,
        json_req(
            "POST",
            "/api/v1/auth/forgot-password",
            json!({ "email": "ghost@x.com" }),
            None,
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_routes_are_restricted() {
    let state = AppState::fake();
    let app = build_app(state.clone());
    let token = signup(&app, "a@x.com").await;
    let target = state
        .users
        .by_email("a@x.com", crate::users::Selection::Public)
        .await
        .unwrap();

    let res = send(&app, get_req(&format!("/api/v1/users/{}", target.id), Some(&token))).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let mut admin = target.clone();
    admin.role = Role::Admin;
    state.users.save(&admin).await.unwrap();

    let res = send(&app, get_req(&format!("/api/v1/users/{}", target.id), Some(&token))).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = send(&app, get_req("/api/v1/users/not-a-uuid", Some(&token))).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(res).await["message"],
        "invalid value id: not-a-uuid"
    );
}

#[tokio::test]
async fn deactivated_account_loses_access() {
    let app = build_app(AppState::fake());
    let token = signup(&app, "a@x.com").await;

    let res = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri("/api/v1/users/me")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = send(&app, get_req("/api/v1/users/me", Some(&token))).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_clears_cookie_and_redirects() {
    let app = build_app(AppState::fake());
    let res = send(&app, get_req("/api/v1/auth/logout", None)).await;
    assert!(res.status().is_redirection());
    assert_eq!(res.headers()[header::LOCATION], "/");
    assert!(set_cookies(&res)
        .iter()
        .any(|c| c.starts_with("jwt=loggedout") && c.contains("Max-Age=0")));
}

#[tokio::test]
async fn google_flow_signs_in_through_cookie() {
    let app = build_app(AppState::fake());

    let res = send(&app, get_req("/api/v1/auth/google", None)).await;
    assert!(res.status().is_redirection());
    let location = res.headers()[header::LOCATION].to_str().unwrap().to_string();
    let state_cookie = set_cookies(&res)
        .into_iter()
        .find(|c| c.starts_with("oauth_state="))
        .unwrap();
    let csrf = state_cookie["oauth_state=".len()..]
        .split(';')
        .next()
        .unwrap()
        .to_string();
    assert!(location.ends_with(&format!("state={csrf}")));

    let forged = send(
        &app,
        Request::builder()
            .uri("/api/v1/auth/google/callback?code=abc&state=forged")
            .header(header::COOKIE, format!("oauth_state={csrf}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);

    let res = send(
        &app,
        Request::builder()
            .uri(format!("/api/v1/auth/google/callback?code=abc&state={csrf}"))
            .header(header::COOKIE, format!("oauth_state={csrf}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert!(res.status().is_redirection());
    assert_eq!(res.headers()[header::LOCATION], "/profile");
    let session = set_cookies(&res)
        .into_iter()
        .find(|c| c.starts_with("jwt="))
        .unwrap();
    let session = session.split(';').next().unwrap().to_string();

    let profile = send(
        &app,
        Request::builder()
            .uri("/profile")
            .header(header::COOKIE, session)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(profile.status(), StatusCode::OK);
    let body = body_json(profile).await;
    assert_eq!(body["data"]["user"]["name"], "Fake Person");
    assert_eq!(body["data"]["user"]["role"], "user");
}

#[tokio::test]
async fn unknown_route_is_not_an_error_report() {
    let app = build_app(AppState::fake());
    let res = send(&app, get_req("/api/v1/health", None)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = send(&app, get_req("/nowhere", None)).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
