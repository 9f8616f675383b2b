use std::fmt;
use std::sync::Arc;

use crate::release::AuthHeader;

/// Produces the credential headers for a provider request.
///
/// The first header returned is also replayed on the asset download.
pub trait AuthStrategy: fmt::Debug + Send + Sync {
    fn headers(&self) -> Vec<AuthHeader>;

    fn download_header(&self) -> Option<AuthHeader> {
        self.headers().into_iter().next()
    }
}

pub type SharedAuth = Arc<dyn AuthStrategy>;

#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl AuthStrategy for NoAuth {
    fn headers(&self) -> Vec<AuthHeader> {
        Vec::new()
    }
}

/// `Authorization: token <secret>` as used by GitHub and Gitea API tokens.
#[derive(Clone)]
pub struct TokenAuth {
    token: String,
}

/// `Authorization: Bearer <secret>` for OAuth2 access tokens.
#[derive(Clone)]
pub struct OAuth2Auth {
    token: String,
}

/// `Private-Token: <secret>` for GitLab personal and project access tokens.
#[derive(Clone)]
pub struct PrivateTokenAuth {
    token: String,
}

macro_rules! secret_strategy {
    ($name:ident, $header:literal, $format:literal) => {
        impl $name {
            pub fn new(token: impl Into<String>) -> Self {
                Self {
                    token: token.into(),
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("token", &"<redacted>")
                    .finish()
            }
        }

        impl AuthStrategy for $name {
            fn headers(&self) -> Vec<AuthHeader> {
                vec![AuthHeader::new($header, format!($format, self.token))]
            }
        }
    };
}

secret_strategy!(TokenAuth, "Authorization", "token {}");
secret_strategy!(OAuth2Auth, "Authorization", "Bearer {}");
secret_strategy!(PrivateTokenAuth, "Private-Token", "{}");

#[must_use]
pub fn no_auth() -> SharedAuth {
    Arc::new(NoAuth)
}
