// End-to-end login flow: authorization redirect, callback, token delivery, protected access
use actix_web::{
    dev::ServiceResponse,
    http::{header, StatusCode},
    middleware::from_fn,
    test, App,
};
use streamgate::{
    authenticate_request, build_cors,
    models::AuthProvider,
    oauth::OAuthState,
    testing::{constants::TEST_EMAIL, constants::TEST_REDIRECT_URI, RequestBuilder, TestFixtures},
    utils::cookie_utils::OAUTH_STATE_COOKIE,
    AppComponents, UserDirectory,
};
use url::Url;

macro_rules! gateway {
    ($components:expr) => {{
        let components: &AppComponents = &$components;
        test::init_service(
            App::new()
                .wrap(from_fn(authenticate_request))
                .wrap(build_cors(&components.settings.cors))
                .configure(|cfg| components.configure(cfg)),
        )
        .await
    }};
}

fn location<B>(resp: &ServiceResponse<B>) -> String {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn query_param(url: &str, name: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Run the authorization redirect and return the sealed state and the CSRF cookie value
macro_rules! authorize {
    ($app:expr, $provider:expr, $redirect:expr) => {{
        let uri = format!(
            "/oauth2/authorization/{}?redirect_uri={}",
            $provider,
            urlencoding::encode($redirect)
        );
        let resp = test::call_service(&$app, RequestBuilder::get(&uri).finish().to_request()).await;
        assert_eq!(resp.status(), StatusCode::FOUND);

        let state = query_param(&location(&resp), "state").expect("state parameter");
        let csrf = resp
            .response()
            .cookies()
            .find(|c| c.name() == OAUTH_STATE_COOKIE)
            .map(|c| c.value().to_string())
            .expect("state cookie");
        (state, csrf)
    }};
}

macro_rules! callback {
    ($app:expr, $provider:expr, $code:expr, $state:expr, $csrf:expr) => {{
        let uri = format!(
            "/login/oauth2/code/{}?code={}&state={}",
            $provider,
            $code,
            urlencoding::encode(&$state)
        );
        let resp = test::call_service(
            &$app,
            RequestBuilder::get(&uri)
                .with_state_cookie(&$csrf)
                .finish()
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        location(&resp)
    }};
}

#[actix_web::test]
async fn test_full_login_flow() {
    let components = TestFixtures::components();
    let app = gateway!(components);

    let (state, csrf) = authorize!(app, "google", TEST_REDIRECT_URI);
    let target = callback!(app, "google", TestFixtures::GOOGLE_CODE, state, csrf);

    assert!(target.starts_with(&format!("{TEST_REDIRECT_URI}?token=")));
    let token = query_param(&target, "token").unwrap();

    let req = RequestBuilder::get("/user/me").bearer(&token).finish().to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["email"], TEST_EMAIL);
    assert_eq!(body["name"], "Test User");
    assert_eq!(body["pictureUrl"], "https://lh3.googleusercontent.com/a/test");

    let stored = components
        .directory
        .find_by_email(TEST_EMAIL)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(body["id"], stored.id.to_string());
    assert_eq!(components.codec.verify(&token).unwrap(), stored.id.to_string());
}

#[actix_web::test]
async fn test_protected_route_requires_token() {
    let components = TestFixtures::components();
    let app = gateway!(components);

    let resp = test::call_service(&app, RequestBuilder::get("/user/me").finish().to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body, serde_json::json!({ "error": "Not authenticated" }));

    let resp = test::call_service(
        &app,
        RequestBuilder::get("/user/me").bearer("forged.token.value").finish().to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_repeat_login_keeps_identity() {
    let components = TestFixtures::components();
    let app = gateway!(components);

    let (state, csrf) = authorize!(app, "google", TEST_REDIRECT_URI);
    let first = callback!(app, "google", TestFixtures::GOOGLE_CODE, state, csrf);
    let (state, csrf) = authorize!(app, "google", TEST_REDIRECT_URI);
    let second = callback!(app, "google", TestFixtures::GOOGLE_CODE, state, csrf);

    let first_subject = components.codec.verify(&query_param(&first, "token").unwrap()).unwrap();
    let second_subject = components.codec.verify(&query_param(&second, "token").unwrap()).unwrap();
    assert_eq!(first_subject, second_subject);
}

#[actix_web::test]
async fn test_other_provider_with_same_email_is_refused() {
    let components = TestFixtures::components();
    let app = gateway!(components);

    let (state, csrf) = authorize!(app, "google", TEST_REDIRECT_URI);
    callback!(app, "google", TestFixtures::GOOGLE_CODE, state, csrf);

    let (state, csrf) = authorize!(app, "github", TEST_REDIRECT_URI);
    let target = callback!(app, "github", TestFixtures::GITHUB_CODE, state, csrf);
    assert_eq!(target, "/login?error=authentication_failed");
}

#[actix_web::test]
async fn test_link_by_email_policy_reuses_account() {
    let mut settings = TestFixtures::settings();
    settings.oauth2.require_provider_match = false;
    let components = TestFixtures::components_with(settings);
    let app = gateway!(components);

    let (state, csrf) = authorize!(app, "google", TEST_REDIRECT_URI);
    let google = callback!(app, "google", TestFixtures::GOOGLE_CODE, state, csrf);
    let (state, csrf) = authorize!(app, "github", TEST_REDIRECT_URI);
    let github = callback!(app, "github", TestFixtures::GITHUB_CODE, state, csrf);

    assert_eq!(
        components.codec.verify(&query_param(&google, "token").unwrap()).unwrap(),
        components.codec.verify(&query_param(&github, "token").unwrap()).unwrap()
    );
    let stored = components.directory.find_by_email(TEST_EMAIL).await.unwrap().unwrap();
    assert_eq!(stored.provider, AuthProvider::Google);
    assert_eq!(stored.name.as_deref(), Some("octocat"));
}

#[actix_web::test]
async fn test_state_is_bound_to_browser_and_provider() {
    let components = TestFixtures::components();
    let app = gateway!(components);

    let (state, _) = authorize!(app, "google", TEST_REDIRECT_URI);
    let target = callback!(app, "google", TestFixtures::GOOGLE_CODE, state, "someone-elses-csrf");
    assert_eq!(target, "/login?error=invalid_state");

    let (state, csrf) = authorize!(app, "google", TEST_REDIRECT_URI);
    let target = callback!(app, "github", TestFixtures::GITHUB_CODE, state, csrf);
    assert_eq!(target, "/login?error=invalid_state");

    let target = callback!(app, "google", TestFixtures::GOOGLE_CODE, "tampered-state".to_string(), "csrf");
    assert_eq!(target, "/login?error=invalid_state");
}

#[actix_web::test]
async fn test_unlisted_redirect_never_receives_token() {
    let components = TestFixtures::components();

    // A state carrying an unlisted target, as if the authorization check were bypassed
    let state = OAuthState::new(
        AuthProvider::Google,
        "csrf-evil".to_string(),
        Some("https://evil.example.com/collect".to_string()),
    );
    let sealed = components.sealer.seal(&state).unwrap();
    let app = gateway!(components);

    let target = callback!(app, "google", TestFixtures::GOOGLE_CODE, sealed, "csrf-evil");
    assert_eq!(target, "/login?error=unauthorized_redirect");
    assert!(!target.contains("token="));
    assert!(components
        .directory
        .find_by_email(TEST_EMAIL)
        .await
        .unwrap()
        .is_none());

    let resp = test::call_service(
        &app,
        RequestBuilder::get("/oauth2/authorization/google?redirect_uri=https%3A%2F%2Fevil.example.com%2Fcollect")
            .finish()
            .to_request(),
    )
    .await;
    assert_eq!(location(&resp), "/login?error=unauthorized_redirect");
}
