// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Authentication providers.
//!
//! Authentication is a request decorator: a provider only produces the value
//! of the `Authorization` header attached to coordinator requests. Spooled
//! segment downloads never carry it.

use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::fmt;
use std::sync::Arc;

/// Produces the `Authorization` header value for coordinator requests.
pub trait AuthProvider: Send + Sync + fmt::Debug {
    /// `None` sends no header.
    fn get_auth_header(&self) -> Result<Option<String>>;
}

/// No authentication.
#[derive(Debug, Default)]
pub struct NoAuth;

impl AuthProvider for NoAuth {
    fn get_auth_header(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// HTTP basic authentication.
pub struct BasicAuth {
    user: String,
    password: String,
}

impl BasicAuth {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl AuthProvider for BasicAuth {
    fn get_auth_header(&self) -> Result<Option<String>> {
        let credentials = STANDARD.encode(format!("{}:{}", self.user, self.password));
        Ok(Some(format!("Basic {}", credentials)))
    }
}

/// Bearer token authentication (JWT or other access token).
pub struct AccessToken {
    token: String,
}

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl AuthProvider for AccessToken {
    fn get_auth_header(&self) -> Result<Option<String>> {
        Ok(Some(format!("Bearer {}", self.token)))
    }
}

/// Credentials selected in [`crate::Config`].
#[derive(Clone, Default, PartialEq)]
pub enum Auth {
    #[default]
    None,
    Basic { user: String, password: String },
    AccessToken(String),
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::None => f.write_str("None"),
            Auth::Basic { user, .. } => f
                .debug_struct("Basic")
                .field("user", user)
                .field("password", &"[REDACTED]")
                .finish(),
            Auth::AccessToken(_) => f.write_str("AccessToken([REDACTED])"),
        }
    }
}

impl Auth {
    pub fn validate(&self) -> Result<()> {
        match self {
            Auth::None => Ok(()),
            Auth::Basic { user, .. } if user.is_empty() => {
                Err(Error::config("basic authentication requires a user"))
            }
            Auth::Basic { .. } => Ok(()),
            Auth::AccessToken(token) if token.is_empty() => {
                Err(Error::config("access token must not be empty"))
            }
            Auth::AccessToken(_) => Ok(()),
        }
    }

    /// Build the provider for these credentials.
    pub fn provider(&self) -> Result<Arc<dyn AuthProvider>> {
        self.validate()?;
        Ok(match self {
            Auth::None => Arc::new(NoAuth),
            Auth::Basic { user, password } => Arc::new(BasicAuth::new(user, password)),
            Auth::AccessToken(token) => Arc::new(AccessToken::new(token)),
        })
    }
}
