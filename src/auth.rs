use serde_json::{json, Value};
use tracing::{debug, info};

use crate::client::TrackerClient;
use crate::error::ApiError;
use crate::fetcher::RequestOptions;
use crate::models::TokenGrant;

pub trait PasskeyAuthenticator {
    fn create(&self, options: &Value) -> Result<Value, ApiError>;
    fn get(&self, options: &Value) -> Result<Value, ApiError>;
}

impl TrackerClient {
    pub fn login(&self, name_or_email: &str, password: &str) -> Result<(), ApiError> {
        let name_or_email = name_or_email.trim();
        if name_or_email.is_empty() {
            return Err(ApiError::validation("name", "name or email is required"));
        }
        if password.len() < 6 {
            return Err(ApiError::validation(
                "password",
                "password must be at least 6 characters",
            ));
        }
        let grant: TokenGrant = self.fetcher().fetch(
            "user/login",
            RequestOptions::post(json!({ "name": name_or_email, "password": password })),
        )?;
        self.start_session(grant)
    }

    pub fn refresh_token(&self) -> Result<(), ApiError> {
        if !self.is_logged_in() {
            return Err(ApiError::validation("token", "not logged in"));
        }
        let grant: TokenGrant = self
            .fetcher()
            .fetch("user/token/refresh", RequestOptions::post(Value::Null))?;
        self.session().set_token(grant.token)?;
        debug!("session token rotated");
        Ok(())
    }

    pub fn logout(&self) -> Result<(), ApiError> {
        self.end_session()
    }

    pub fn delete_account(&self) -> Result<(), ApiError> {
        self.send_write("user/profile", RequestOptions::delete())?;
        self.end_session()
    }

    pub fn register_passkey(
        &self,
        authenticator: &dyn PasskeyAuthenticator,
        name: &str,
    ) -> Result<(), ApiError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::validation("name", "passkey name is required"));
        }
        let options: Value = self
            .fetcher()
            .fetch("user/passkey/register/options", RequestOptions::post(Value::Null))?;
        let credential = authenticator.create(&options)?;
        self.send_write(
            "user/passkey/register/verify",
            RequestOptions::post(json!({ "name": name, "credential": credential })),
        )
    }

    pub fn login_with_passkey(&self, authenticator: &dyn PasskeyAuthenticator) -> Result<(), ApiError> {
        let options: Value = self
            .fetcher()
            .fetch("user/passkey/login/options", RequestOptions::post(Value::Null))?;
        let assertion = authenticator.get(&options)?;
        let grant: TokenGrant = self.fetcher().fetch(
            "user/passkey/login/verify",
            RequestOptions::post(json!({ "credential": assertion })),
        )?;
        self.start_session(grant)
    }

    fn start_session(&self, grant: TokenGrant) -> Result<(), ApiError> {
        if grant.token.trim().is_empty() {
            return Err(ApiError::Decode("empty token in login response".to_string()));
        }
        self.cache().clear();
        self.session().set_token(grant.token)?;
        info!("logged in");
        Ok(())
    }

    fn end_session(&self) -> Result<(), ApiError> {
        self.session().clear()?;
        self.cache().clear();
        info!("logged out");
        Ok(())
    }
}
