//! Usage: Client configuration for the authorization-code grant and authorize URL building.

use url::form_urlencoded;

/// Redirect value telling the provider to show the code to the user instead of redirecting.
pub const OOB_REDIRECT_URL: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Full read/write access to the user's Drive files.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    /// Initial redirect from the credential document. Each acquisition picks its own redirect
    /// (loopback or out-of-band) and hands it to the exchange step.
    pub redirect_url: String,
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    /// Build the consent URL for `redirect_url`, asking for offline access so the provider
    /// issues a refresh token.
    pub fn authorize_url(&self, redirect_url: &str, state: &str) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("access_type", "offline");
        query.append_pair("client_id", &self.client_id);
        if !redirect_url.is_empty() {
            query.append_pair("redirect_uri", redirect_url);
        }
        query.append_pair("response_type", "code");
        if !self.scopes.is_empty() {
            query.append_pair("scope", &self.scopes.join(" "));
        }
        if !state.is_empty() {
            query.append_pair("state", state);
        }

        let separator = if self.auth_url.contains('?') { '&' } else { '?' };
        format!("{}{separator}{}", self.auth_url, query.finish())
    }
}
