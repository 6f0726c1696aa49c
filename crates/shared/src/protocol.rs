use serde::{Deserialize, Serialize};

use crate::domain::UserProfile;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginData {
    #[serde(alias = "accessToken")]
    pub token: String,
    pub user: UserProfile,
}

/// Reply to `POST /auth/login`, either bare or wrapped in the service envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LoginReply {
    Envelope {
        success: bool,
        #[serde(default)]
        data: Option<LoginData>,
        #[serde(default)]
        message: Option<String>,
    },
    Bare(LoginData),
}

impl LoginReply {
    /// Returns the established session data, or the server's message when the
    /// envelope reports failure or carries no token.
    pub fn into_result(self) -> Result<LoginData, String> {
        match self {
            LoginReply::Bare(data) => Ok(data),
            LoginReply::Envelope {
                success: true,
                data: Some(data),
                ..
            } if !data.token.is_empty() => Ok(data),
            LoginReply::Envelope { message, .. } => {
                Err(message.unwrap_or_else(|| "Login failed".to_string()))
            }
        }
    }
}

/// Reply to `GET /auth/profile`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProfileReply {
    Wrapped { user: UserProfile },
    Envelope { data: ProfileData },
    Bare(UserProfile),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileData {
    pub user: UserProfile,
}

impl ProfileReply {
    pub fn into_user(self) -> UserProfile {
        match self {
            ProfileReply::Wrapped { user } => user,
            ProfileReply::Envelope { data } => data.user,
            ProfileReply::Bare(user) => user,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshData {
    #[serde(alias = "accessToken")]
    pub token: String,
}

/// Reply to `POST /auth/refresh`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RefreshReply {
    Envelope { data: RefreshData },
    Bare(RefreshData),
}

impl RefreshReply {
    pub fn into_token(self) -> String {
        match self {
            RefreshReply::Envelope { data } => data.token,
            RefreshReply::Bare(data) => data.token,
        }
    }
}

/// List query understood by the service; `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageQuery {
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub total: u64,
}

/// A page of rows plus the total row count across all pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    /// Builds a page, falling back to the row count when the server omits a total.
    pub fn new(rows: Vec<T>, pagination: Option<Pagination>) -> Self {
        let total = pagination
            .map(|p| p.total)
            .filter(|total| *total > 0)
            .unwrap_or(rows.len() as u64);
        Self { rows, total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;

    #[test]
    fn login_reply_accepts_envelope() {
        let reply: LoginReply = serde_json::from_str(
            r#"{"success":true,"message":"ok","data":{"token":"t","user":{"id":"1","email":"a@b.co"}}}"#,
        )
        .expect("reply");
        let data = reply.into_result().expect("success");
        assert_eq!(data.token, "t");
        assert_eq!(data.user.role, Role::Admin);
    }

    #[test]
    fn login_reply_accepts_bare_shape() {
        let reply: LoginReply =
            serde_json::from_str(r#"{"token":"t","user":{"id":"1"}}"#).expect("reply");
        assert_eq!(reply.into_result().expect("success").token, "t");
    }

    #[test]
    fn unsuccessful_envelope_surfaces_message() {
        let reply: LoginReply =
            serde_json::from_str(r#"{"success":false,"message":"Account locked"}"#)
                .expect("reply");
        assert_eq!(reply.into_result().expect_err("failure"), "Account locked");

        let reply: LoginReply = serde_json::from_str(r#"{"success":false}"#).expect("reply");
        assert_eq!(reply.into_result().expect_err("failure"), "Login failed");
    }

    #[test]
    fn profile_reply_unwraps_every_shape() {
        for body in [
            r#"{"user":{"id":"7"}}"#,
            r#"{"success":true,"data":{"user":{"id":"7"}}}"#,
            r#"{"id":"7"}"#,
        ] {
            let reply: ProfileReply = serde_json::from_str(body).expect("reply");
            assert_eq!(reply.into_user().id.0, "7");
        }
    }

    #[test]
    fn page_total_falls_back_to_row_count() {
        let page = Page::new(vec![1, 2, 3], None);
        assert_eq!(page.total, 3);
        let page = Page::new(vec![1], Some(Pagination { total: 40 }));
        assert_eq!(page.total, 40);
    }
}
