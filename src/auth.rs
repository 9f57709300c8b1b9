//! Account session helpers.
//!
//! Login and registration exchange credentials for a token, which is kept
//! under the `authToken` key. The coordinator itself only ever checks
//! whether a token is present; the UI decides when to re-authenticate.
//! Every helper reports failure as `false` and logs the cause.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::HttpBackend;

const LOGIN_PATH: &str = "/auth/login";
const REGISTER_PATH: &str = "/auth/register";

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    email: &'a str,
    password: &'a str,
    name: &'a str,
}

#[derive(Deserialize)]
struct TokenReply {
    #[serde(default)]
    token: Option<String>,
}

impl HttpBackend {
    pub async fn login(&self, email: &str, password: &str) -> bool {
        self.exchange_for_token(LOGIN_PATH, &LoginBody { email, password })
            .await
    }

    pub async fn register(&self, email: &str, password: &str, name: &str) -> bool {
        self.exchange_for_token(
            REGISTER_PATH,
            &RegisterBody {
                email,
                password,
                name,
            },
        )
        .await
    }

    pub async fn logout(&self) {
        if let Err(e) = self.store().clear_auth_token().await {
            warn!(error = %e, "logout failed to clear token");
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        match self.store().auth_token().await {
            Ok(token) => token.is_some(),
            Err(e) => {
                warn!(error = %e, "auth check failed");
                false
            }
        }
    }

    async fn exchange_for_token<B: Serialize>(&self, path: &str, body: &B) -> bool {
        let reply = match self.post_json(path, body).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(path, error = %e, "authentication request failed");
                return false;
            }
        };

        let token = serde_json::from_value::<TokenReply>(reply)
            .ok()
            .and_then(|r| r.token)
            .filter(|t| !t.is_empty());
        let Some(token) = token else {
            warn!(path, "authentication reply carried no token");
            return false;
        };

        match self.store().set_auth_token(&token).await {
            Ok(()) => {
                info!(path, "session token stored");
                true
            }
            Err(e) => {
                warn!(path, error = %e, "failed to store session token");
                false
            }
        }
    }
}
