//! Environment-backed gate configuration.
//!
//! Every variable is prefixed with `OAUTH2_GATE_`. Required: `CLIENT_ID`,
//! `AUTH_URL`, `TOKEN_URL`. Optional: `CLIENT_SECRET` (public PKCE clients run
//! without one), `USERINFO_URL`, and `UPSTREAM_TIMEOUT_SECS` (defaults to 10).

// std
use std::env;
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	provider::{ClientAuthMethod, ProviderDescriptor},
	token::Secret,
};

/// Environment variable holding the OAuth client identifier.
pub const ENV_CLIENT_ID: &str = "OAUTH2_GATE_CLIENT_ID";
/// Environment variable holding the OAuth client secret, absent for public clients.
pub const ENV_CLIENT_SECRET: &str = "OAUTH2_GATE_CLIENT_SECRET";
/// Environment variable holding the authorization endpoint URL.
pub const ENV_AUTH_URL: &str = "OAUTH2_GATE_AUTH_URL";
/// Environment variable holding the token endpoint URL.
pub const ENV_TOKEN_URL: &str = "OAUTH2_GATE_TOKEN_URL";
/// Environment variable holding the optional userinfo endpoint URL.
pub const ENV_USERINFO_URL: &str = "OAUTH2_GATE_USERINFO_URL";
/// Environment variable overriding the upstream call deadline in whole seconds.
pub const ENV_UPSTREAM_TIMEOUT_SECS: &str = "OAUTH2_GATE_UPSTREAM_TIMEOUT_SECS";

/// Default deadline applied to every upstream token endpoint call.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::seconds(10);

/// Resolved gate configuration: provider descriptor, credentials, and deadline.
#[derive(Clone, Debug)]
pub struct GateConfig {
	/// Validated provider descriptor.
	pub descriptor: ProviderDescriptor,
	/// OAuth client identifier presented to the provider.
	pub client_id: String,
	/// Client secret, absent for public PKCE clients.
	pub client_secret: Option<Secret>,
	/// Hard deadline for each upstream token endpoint call.
	pub upstream_timeout: Duration,
}
impl GateConfig {
	/// Loads configuration from `OAUTH2_GATE_*` environment variables.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|key| env::var(key).ok())
	}

	fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let client_id = require_var(&lookup, ENV_CLIENT_ID)?;
		let client_secret = optional_var(&lookup, ENV_CLIENT_SECRET).map(Secret::new);
		let auth_url = parse_var_url(ENV_AUTH_URL, require_var(&lookup, ENV_AUTH_URL)?)?;
		let token_url = parse_var_url(ENV_TOKEN_URL, require_var(&lookup, ENV_TOKEN_URL)?)?;
		let userinfo_url = optional_var(&lookup, ENV_USERINFO_URL)
			.map(|value| parse_var_url(ENV_USERINFO_URL, value))
			.transpose()?;
		let upstream_timeout = match optional_var(&lookup, ENV_UPSTREAM_TIMEOUT_SECS) {
			Some(raw) => {
				let secs = raw.parse::<i64>().map_err(|e| ConfigError::InvalidEnv {
					key: ENV_UPSTREAM_TIMEOUT_SECS,
					detail: e.to_string(),
				})?;

				if secs <= 0 {
					return Err(ConfigError::InvalidEnv {
						key: ENV_UPSTREAM_TIMEOUT_SECS,
						detail: "timeout must be a positive number of seconds".into(),
					});
				}

				Duration::seconds(secs)
			},
			None => DEFAULT_UPSTREAM_TIMEOUT,
		};
		// Public clients without a secret must prove possession via PKCE alone.
		let client_auth_method = if client_secret.is_some() {
			ClientAuthMethod::ClientSecretBasic
		} else {
			ClientAuthMethod::NoneWithPkce
		};
		let mut builder = ProviderDescriptor::builder()
			.authorization_endpoint(auth_url)
			.token_endpoint(token_url)
			.client_auth_method(client_auth_method);

		if let Some(userinfo_url) = userinfo_url {
			builder = builder.userinfo_endpoint(userinfo_url);
		}

		let descriptor = builder
			.build()
			.map_err(|e| ConfigError::InvalidEnv { key: ENV_AUTH_URL, detail: e.to_string() })?;

		Ok(Self { descriptor, client_id, client_secret, upstream_timeout })
	}
}

fn require_var<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
	F: Fn(&str) -> Option<String>,
{
	optional_var(lookup, key).ok_or(ConfigError::MissingEnv { key })
}

fn optional_var<F>(lookup: &F, key: &'static str) -> Option<String>
where
	F: Fn(&str) -> Option<String>,
{
	lookup(key).map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
}

fn parse_var_url(key: &'static str, value: String) -> Result<Url, ConfigError> {
	Url::parse(&value)
		.map_err(|e| ConfigError::InvalidEnv { key, detail: format!("{e}: `{value}`") })
}
