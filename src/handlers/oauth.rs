// OAuth handlers: authorization redirect and provider callback
use actix_web::{web, HttpRequest, HttpResponse};
use log::{debug, error, info, warn};
use serde::Deserialize;

use crate::login::{commit_session, LoginFailure, LoginRedirect, LoginSuccessHandler};
use crate::models::AuthProvider;
use crate::oauth::{
    resolve_provider_profile, OAuthCallback, OAuthError, OAuthState, ProfileResolver,
    ProviderRegistry, StateSealer,
};
use crate::reconcile::IdentityReconciler;
use crate::settings::Settings;
use crate::utils::cookie_utils::{
    create_expired_cookie, create_state_cookie, extract_cookie_value, OAUTH_STATE_COOKIE,
};
use crate::utils::crypto::generate_csrf_token;
use crate::utils::logging::LoggingHelper;
use crate::utils::responses::ResponseBuilder;

#[derive(Deserialize, Debug)]
pub struct AuthorizeQuery {
    pub redirect_uri: Option<String>,
}

/// Start a login: redirect the browser to the provider's consent screen
///
/// The requested `redirect_uri` is checked against the allow-list here as
/// well as after the callback, so a bad target fails before the round trip.
pub async fn oauth_authorize(
    path: web::Path<String>,
    query: web::Query<AuthorizeQuery>,
    registry: web::Data<ProviderRegistry>,
    sealer: web::Data<StateSealer>,
    login: web::Data<LoginSuccessHandler>,
    settings: web::Data<Settings>,
) -> HttpResponse {
    let Some(provider) = AuthProvider::from_registration_id(&path) else {
        debug!("Authorization requested for unknown provider {path}");
        return ResponseBuilder::login_error_redirect("unsupported_provider", Vec::new());
    };

    let redirect_uri = query.into_inner().redirect_uri.filter(|uri| !uri.is_empty());
    if let Some(target) = redirect_uri.as_deref() {
        if login.check_redirect(target).is_err() {
            return ResponseBuilder::login_error_redirect("unauthorized_redirect", Vec::new());
        }
    }

    let csrf = generate_csrf_token();
    let state = OAuthState::new(provider, csrf.clone(), redirect_uri);

    let authorization_url = sealer.seal(&state).and_then(|sealed| {
        let request = registry.authorization_request(provider, &sealed)?;
        request
            .to_url()
            .map_err(|e| OAuthError::Configuration(format!("invalid authorization URI: {e}")))
    });

    match authorization_url {
        Ok(url) => {
            info!("Redirecting to {} for authorization", provider.display_name());
            ResponseBuilder::redirect_with_cookies(
                url.as_str(),
                vec![create_state_cookie(&csrf, settings.cookies.secure)],
            )
        }
        Err(e) => {
            error!("Failed to start {provider} authorization: {e}");
            ResponseBuilder::login_error_redirect(e.error_code(), Vec::new())
        }
    }
}

/// Provider callback: resolve the profile, reconcile the user, deliver the token
#[allow(clippy::too_many_arguments)]
pub async fn oauth_callback(
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<OAuthCallback>,
    registry: web::Data<ProviderRegistry>,
    sealer: web::Data<StateSealer>,
    resolver: web::Data<dyn ProfileResolver>,
    reconciler: web::Data<IdentityReconciler>,
    login: web::Data<LoginSuccessHandler>,
    settings: web::Data<Settings>,
) -> HttpResponse {
    let clear_state_cookie = create_expired_cookie(OAUTH_STATE_COOKIE, settings.cookies.secure);

    let Some(provider) = AuthProvider::from_registration_id(&path) else {
        debug!("Callback received for unknown provider {path}");
        return ResponseBuilder::login_error_redirect(
            "unsupported_provider",
            vec![clear_state_cookie],
        );
    };

    let csrf_cookie = extract_cookie_value(&req, OAUTH_STATE_COOKIE);
    let outcome = complete_login(
        provider,
        &query,
        csrf_cookie.as_deref(),
        &registry,
        &sealer,
        resolver.get_ref(),
        &reconciler,
        &login,
    )
    .await;

    match outcome {
        Ok(redirect) => {
            ResponseBuilder::redirect_with_cookies(&redirect.location, vec![clear_state_cookie])
        }
        Err(failure) => {
            match &failure {
                LoginFailure::OAuth(OAuthError::State(reason)) => {
                    LoggingHelper::log_state_rejected(reason);
                }
                LoginFailure::Login(e) => warn!("Login through {provider} refused: {e}"),
                other => error!("Login through {provider} failed: {other}"),
            }
            ResponseBuilder::login_error_redirect(failure.error_code(), vec![clear_state_cookie])
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn complete_login(
    provider: AuthProvider,
    callback: &OAuthCallback,
    csrf_cookie: Option<&str>,
    registry: &ProviderRegistry,
    sealer: &StateSealer,
    resolver: &dyn ProfileResolver,
    reconciler: &IdentityReconciler,
    login: &LoginSuccessHandler,
) -> Result<LoginRedirect, LoginFailure> {
    let (profile, state) =
        resolve_provider_profile(provider, callback, csrf_cookie, registry, sealer, resolver)
            .await?;
    commit_session(reconciler, login, &profile, &state).await
}
