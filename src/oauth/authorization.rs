//! Outbound authorization requests and their customizers

use std::collections::BTreeMap;

use url::Url;

/// Parameters of the redirect that sends the browser to a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub authorization_uri: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub state: String,
    /// Extra query parameters, such as `prompt` or `access_type`
    pub additional_parameters: BTreeMap<String, String>,
}

impl AuthorizationRequest {
    /// Render the request as the provider URL the browser is sent to
    ///
    /// Query parameters already present on the authorization URI are kept.
    /// Additional parameters never override the core OAuth2 parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the authorization URI is not a valid URL
    pub fn to_url(&self) -> Result<Url, url::ParseError> {
        const CORE_PARAMETERS: [&str; 5] =
            ["response_type", "client_id", "redirect_uri", "scope", "state"];

        let mut url = Url::parse(&self.authorization_uri)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("scope", &self.scopes.join(" "))
                .append_pair("state", &self.state);

            for (key, value) in &self.additional_parameters {
                if !CORE_PARAMETERS.contains(&key.as_str()) {
                    query.append_pair(key, value);
                }
            }
        }
        Ok(url)
    }
}

/// Rewrites an authorization request before the browser is redirected
pub trait AuthorizationRequestCustomizer: Send + Sync {
    fn customize(&self, request: AuthorizationRequest) -> AuthorizationRequest;
}

/// Forces the provider's account chooser so users can switch accounts
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectAccountPrompt;

impl AuthorizationRequestCustomizer for SelectAccountPrompt {
    fn customize(&self, mut request: AuthorizationRequest) -> AuthorizationRequest {
        request
            .additional_parameters
            .insert("prompt".to_string(), "select_account".to_string());
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AuthorizationRequest {
        AuthorizationRequest {
            authorization_uri: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            client_id: "client-123".to_string(),
            redirect_uri: "http://localhost:8080/login/oauth2/code/google".to_string(),
            scopes: vec!["openid".to_string(), "email".to_string()],
            state: "opaque-state".to_string(),
            additional_parameters: BTreeMap::new(),
        }
    }

    fn query(url: &Url) -> Vec<(String, String)> {
        url.query_pairs().into_owned().collect()
    }

    #[test]
    fn test_select_account_is_added() {
        let customized = SelectAccountPrompt.customize(request());
        let pairs = query(&customized.to_url().unwrap());

        assert!(pairs.contains(&("prompt".to_string(), "select_account".to_string())));
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
        assert!(pairs.contains(&("scope".to_string(), "openid email".to_string())));
        assert!(pairs.contains(&("state".to_string(), "opaque-state".to_string())));
    }

    #[test]
    fn test_existing_prompt_is_overwritten_once() {
        let mut original = request();
        original
            .additional_parameters
            .insert("prompt".to_string(), "consent".to_string());

        let once = SelectAccountPrompt.customize(original);
        let twice = SelectAccountPrompt.customize(once.clone());
        assert_eq!(once, twice);

        let prompts: Vec<String> = query(&twice.to_url().unwrap())
            .into_iter()
            .filter(|(k, _)| k == "prompt")
            .map(|(_, v)| v)
            .collect();
        assert_eq!(prompts, vec!["select_account"]);
    }

    #[test]
    fn test_customizer_leaves_other_fields_alone() {
        let customized = SelectAccountPrompt.customize(request());
        let original = request();
        assert_eq!(customized.client_id, original.client_id);
        assert_eq!(customized.redirect_uri, original.redirect_uri);
        assert_eq!(customized.scopes, original.scopes);
        assert_eq!(customized.state, original.state);
    }

    #[test]
    fn test_core_parameters_cannot_be_overridden() {
        let mut sneaky = request();
        sneaky
            .additional_parameters
            .insert("redirect_uri".to_string(), "https://evil.example.com".to_string());

        let redirects: Vec<String> = query(&sneaky.to_url().unwrap())
            .into_iter()
            .filter(|(k, _)| k == "redirect_uri")
            .map(|(_, v)| v)
            .collect();
        assert_eq!(
            redirects,
            vec!["http://localhost:8080/login/oauth2/code/google"]
        );
    }

    #[test]
    fn test_invalid_authorization_uri() {
        let mut broken = request();
        broken.authorization_uri = "not a url".to_string();
        assert!(broken.to_url().is_err());
    }
}
