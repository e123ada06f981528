//! HTTP endpoint adapter and authentication.
//!
//! This module provides the [`HttpOutput`] adapter, which sends each record
//! as a JSON request, along with authentication types ([`Auth`], [`AuthType`]).

mod auth;
mod http;

pub use auth::{Auth, AuthType};
pub use http::{HTTP_OUTPUT_PLUGIN, HttpOutput};
