use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ClientError, ClientResult};
use crate::http::ApiClient;
use crate::jwt::UserProfile;

pub const MIN_PASSWORD_LEN: usize = 6;
const DEFAULT_ROLE: &str = "ROLE_USER";

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    access_token: String,
}

#[derive(Serialize)]
struct SignupRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
    role: [&'a str; 1],
}

#[derive(Serialize)]
struct ForgotPasswordRequest<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct ResetPasswordRequest<'a> {
    email: &'a str,
    otp: &'a str,
    new_password: &'a str,
}

#[derive(Serialize)]
struct ChangePasswordRequest<'a> {
    old_password: &'a str,
    new_password: &'a str,
}

/// Checks applied before a new password is sent anywhere.
pub fn validate_new_password(new_password: &str, confirmation: &str) -> ClientResult<()> {
    if new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ClientError::Validation {
            message: format!(
                "New password must be at least {} characters long.",
                MIN_PASSWORD_LEN
            ),
        });
    }
    if new_password != confirmation {
        return Err(ClientError::Validation {
            message: "Passwords do not match.".to_string(),
        });
    }
    Ok(())
}

impl ApiClient {
    /// Exchange credentials for a bearer token and store it in the session.
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<Option<UserProfile>> {
        let path = self.config().endpoints.login.clone();
        let response: LoginResponse = self
            .post_json(&path, &LoginRequest { email, password })
            .await?;
        self.session().set_token(&response.access_token)?;
        Ok(self.session().current_user())
    }

    pub fn logout(&self) -> ClientResult<()> {
        info!("Signing out");
        self.session().logout()
    }

    pub async fn signup(&self, name: &str, email: &str, password: &str) -> ClientResult<()> {
        let path = self.config().endpoints.signup.clone();
        self.post(
            &path,
            &SignupRequest {
                name,
                email,
                password,
                role: [DEFAULT_ROLE],
            },
        )
        .await?;
        debug!(email = %email, "Account created");
        Ok(())
    }

    /// Ask the backend to mail a one-time code for a password reset.
    pub async fn forgot_password(&self, email: &str) -> ClientResult<()> {
        let path = self.config().endpoints.forgot_password.clone();
        self.post(&path, &ForgotPasswordRequest { email }).await
    }

    pub async fn reset_password(
        &self,
        email: &str,
        otp: &str,
        new_password: &str,
        confirmation: &str,
    ) -> ClientResult<()> {
        validate_new_password(new_password, confirmation)?;
        let path = self.config().endpoints.reset_password.clone();
        self.post(
            &path,
            &ResetPasswordRequest {
                email,
                otp,
                new_password,
            },
        )
        .await
    }

    pub async fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
        confirmation: &str,
    ) -> ClientResult<()> {
        validate_new_password(new_password, confirmation)?;
        let path = self.config().endpoints.change_password.clone();
        self.put(
            &path,
            &ChangePasswordRequest {
                old_password,
                new_password,
            },
        )
        .await
    }
}
