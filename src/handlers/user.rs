use actix_web::{web, HttpResponse};
use log::{debug, error};
use uuid::Uuid;

use crate::directory::UserDirectory;
use crate::filter::AuthenticatedUser;
use crate::models::CurrentUserResponse;
use crate::utils::responses::ApiError;

/// Profile of the authenticated user
///
/// # Errors
///
/// Returns `ApiError::NotAuthenticated` if the token subject no longer names
/// a user, and `ApiError::Internal` if the directory fails
pub async fn current_user(
    user: AuthenticatedUser,
    directory: web::Data<dyn UserDirectory>,
) -> Result<HttpResponse, ApiError> {
    let Ok(id) = Uuid::parse_str(&user.subject) else {
        debug!("Token subject {} is not a user id", user.subject);
        return Err(ApiError::NotAuthenticated);
    };

    let stored = directory.find_by_id(id).await.map_err(|e| {
        error!("Failed to load user {id}: {e}");
        ApiError::Internal(e.to_string())
    })?;

    stored.map_or_else(
        || {
            debug!("User {id} from a valid token no longer exists");
            Err(ApiError::NotAuthenticated)
        },
        |user| Ok(HttpResponse::Ok().json(CurrentUserResponse::from(&user))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryUserDirectory;
    use crate::filter::authenticate_request;
    use crate::models::{AuthProvider, ProviderProfile, User};
    use crate::token::TokenCodec;
    use actix_web::{
        http::{header::AUTHORIZATION, StatusCode},
        middleware::from_fn,
        test, App,
    };
    use chrono::Duration;
    use std::sync::Arc;

    fn codec() -> TokenCodec {
        TokenCodec::new(b"user-handler-secret-at-least-32-bytes", Duration::hours(1)).unwrap()
    }

    async fn seeded() -> (Arc<dyn UserDirectory>, User) {
        let directory = MemoryUserDirectory::new();
        let profile = ProviderProfile {
            provider: AuthProvider::Github,
            subject: "583231".to_string(),
            email: Some("octo@example.com".to_string()),
            name: None,
            picture: None,
        };
        let user = directory
            .save(User::from_profile("octo@example.com", &profile))
            .await
            .unwrap();
        (Arc::new(directory), user)
    }

    macro_rules! user_app {
        ($directory:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(codec()))
                    .app_data(web::Data::from($directory))
                    .wrap(from_fn(authenticate_request))
                    .route("/user/me", web::get().to(current_user)),
            )
            .await
        };
    }

    fn bearer(subject: &str) -> (actix_web::http::header::HeaderName, String) {
        (AUTHORIZATION, format!("Bearer {}", codec().issue(subject).unwrap()))
    }

    #[actix_web::test]
    async fn test_current_user_fallbacks() {
        let (directory, user) = seeded().await;
        let app = user_app!(directory);

        let req = test::TestRequest::get()
            .uri("/user/me")
            .insert_header(bearer(&user.id.to_string()))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["id"], user.id.to_string());
        assert_eq!(body["email"], "octo@example.com");
        assert_eq!(body["name"], "octo@example.com");
        assert_eq!(body["pictureUrl"], "");
    }

    #[actix_web::test]
    async fn test_unknown_or_missing_principal_is_401() {
        let (directory, _) = seeded().await;
        let app = user_app!(directory);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/user/me").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        for subject in [Uuid::new_v4().to_string(), "not-a-uuid".to_string()] {
            let req = test::TestRequest::get()
                .uri("/user/me")
                .insert_header(bearer(&subject))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[actix_web::test]
    async fn test_extractor_without_filter_is_401() {
        let (directory, _) = seeded().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(directory))
                .route("/user/me", web::get().to(current_user)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/user/me").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
