use crate::config::ParameterSet;
use crate::error::{Result, TransferError};

use base64::Engine;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use std::str::FromStr;

pub enum Auth {
    /// Use an API key authentication via headers
    Apikey(String),
    /// Use username and password authentication via Basic Auth headers
    Basic(String, String),
    /// Don't use any authentication
    None,
}

impl Auth {
    pub fn new(
        r#type: &AuthType,
        username: Option<String>,
        password: Option<String>,
        apikey: Option<String>,
    ) -> Self {
        match (r#type, username, password, apikey) {
            (AuthType::Apikey, _, _, Some(apikey)) => Self::Apikey(apikey),
            (AuthType::Basic, Some(username), Some(password), _) => Self::Basic(username, password),
            (AuthType::None, _, _, _) | _ => Self::None,
        }
    }

    /// Read `auth`, `username`, `password` and `apikey` plugin parameters
    ///
    /// Without an explicit `auth` the type follows from which credentials are
    /// present. Credentials the chosen type needs must all be given.
    pub fn from_parameters(adapter: &str, config: &ParameterSet) -> Result<Self> {
        let param = |key: &str| {
            config
                .get(key)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let (username, password, apikey) = (param("username"), param("password"), param("apikey"));

        let r#type = match config.get("auth") {
            Some(raw) => AuthType::from_str(raw).map_err(|()| {
                TransferError::init(
                    adapter,
                    format!("auth must be basic, apikey or none, got '{}'", raw),
                )
            })?,
            None if apikey.is_some() => AuthType::Apikey,
            None if username.is_some() || password.is_some() => AuthType::Basic,
            None => AuthType::None,
        };

        match r#type {
            AuthType::Apikey if apikey.is_none() => {
                Err(TransferError::init(adapter, "missing 'apikey' parameter"))
            }
            AuthType::Basic if username.is_none() || password.is_none() => Err(
                TransferError::init(adapter, "basic auth needs both 'username' and 'password'"),
            ),
            _ => Ok(Self::new(&r#type, username, password, apikey)),
        }
    }

    /// Default request headers carrying the credentials
    pub fn headers(&self) -> std::result::Result<HeaderMap, reqwest::header::InvalidHeaderValue> {
        let mut headers = HeaderMap::new();
        match self {
            Self::Basic(username, password) => {
                let credentials = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                let mut value = HeaderValue::from_str(&format!("Basic {}", credentials))?;
                value.set_sensitive(true);
                headers.append(AUTHORIZATION, value);
            }
            Self::Apikey(apikey) => {
                let mut value = HeaderValue::from_str(&format!("ApiKey {}", apikey))?;
                value.set_sensitive(true);
                headers.append(AUTHORIZATION, value);
            }
            Self::None => {}
        }
        Ok(headers)
    }
}

impl std::fmt::Display for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Apikey(_) => write!(f, "Apikey"),
            Self::Basic(_, _) => write!(f, "Basic"),
            Self::None => write!(f, "None"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AuthType {
    Apikey,
    Basic,
    None,
}

impl FromStr for AuthType {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "apikey" => Ok(Self::Apikey),
            "basic" => Ok(Self::Basic),
            "none" => Ok(Self::None),
            _ => Err(()),
        }
    }
}
