//! Identity-provider descriptor consumed by the gate's flows.
//!
//! The descriptor carries validated endpoint metadata only; credentials and
//! the upstream timeout live in [`crate::config::GateConfig`] because they
//! come from the environment, not from provider documentation.

// self
use crate::_prelude::*;

/// Client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret` (confidential clients).
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
	/// Public clients that prove possession via PKCE alone.
	NoneWithPkce,
}

/// Endpoint set declared by a provider descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Authorization endpoint users are redirected to.
	pub authorization: Url,
	/// Token endpoint used for exchanges and refreshes.
	pub token: Url,
	/// Optional userinfo endpoint, recorded for downstream callers.
	pub userinfo: Option<Url>,
}

/// Immutable provider descriptor consumed by flows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Endpoint definitions exposed by the provider.
	pub endpoints: ProviderEndpoints,
	/// Client authentication mechanism the provider expects.
	pub client_auth_method: ClientAuthMethod,
	/// Scopes requested on every authorization URL (space-joined).
	pub scopes: Vec<String>,
}
impl ProviderDescriptor {
	/// Creates a new builder.
	pub fn builder() -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::default()
	}

	/// Space-joined scope parameter, or `None` when no scopes are configured.
	pub fn scope_param(&self) -> Option<String> {
		if self.scopes.is_empty() { None } else { Some(self.scopes.join(" ")) }
	}

	fn validate(&self) -> Result<(), ProviderDescriptorError> {
		validate_endpoint("authorization", &self.endpoints.authorization)?;
		validate_endpoint("token", &self.endpoints.token)?;

		if let Some(userinfo) = self.endpoints.userinfo.as_ref() {
			validate_endpoint("userinfo", userinfo)?;
		}

		Ok(())
	}
}

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ProviderDescriptorError {
	/// Authorization endpoint is required.
	#[error("Missing authorization endpoint.")]
	MissingAuthorizationEndpoint,
	/// Token endpoint is required.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
}

/// Builder for [`ProviderDescriptor`] values.
#[derive(Debug, Default)]
pub struct ProviderDescriptorBuilder {
	/// Authorization endpoint users are redirected to.
	pub authorization_endpoint: Option<Url>,
	/// Token endpoint used for exchanges and refreshes.
	pub token_endpoint: Option<Url>,
	/// Optional userinfo endpoint.
	pub userinfo_endpoint: Option<Url>,
	/// Client authentication mechanism.
	pub client_auth_method: ClientAuthMethod,
	/// Scopes requested on every authorization URL.
	pub scopes: Vec<String>,
}
impl ProviderDescriptorBuilder {
	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the optional userinfo endpoint.
	pub fn userinfo_endpoint(mut self, url: Url) -> Self {
		self.userinfo_endpoint = Some(url);

		self
	}

	/// Overrides the client authentication method.
	pub fn client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth_method = method;

		self
	}

	/// Adds one requested scope.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scopes.push(scope.into());

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ProviderDescriptor, ProviderDescriptorError> {
		let authorization = self
			.authorization_endpoint
			.ok_or(ProviderDescriptorError::MissingAuthorizationEndpoint)?;
		let token = self.token_endpoint.ok_or(ProviderDescriptorError::MissingTokenEndpoint)?;
		let descriptor = ProviderDescriptor {
			endpoints: ProviderEndpoints {
				authorization,
				token,
				userinfo: self.userinfo_endpoint,
			},
			client_auth_method: self.client_auth_method,
			scopes: self.scopes,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

// Loopback hosts are exempt so local development and mock servers work.
fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ProviderDescriptorError> {
	if url.scheme() == "https" || is_loopback_host(url) {
		Ok(())
	} else {
		Err(ProviderDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	}
}

fn is_loopback_host(url: &Url) -> bool {
	match url.host() {
		Some(url::Host::Domain(domain)) => domain == "localhost",
		Some(url::Host::Ipv4(address)) => address.is_loopback(),
		Some(url::Host::Ipv6(address)) => address.is_loopback(),
		None => false,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Failed to parse descriptor URL fixture.")
	}

	#[test]
	fn descriptor_rejects_insecure_endpoints() {
		let err = ProviderDescriptor::builder()
			.authorization_endpoint(url("http://example.com/auth"))
			.token_endpoint(url("https://example.com/token"))
			.build()
			.expect_err("Descriptor builder should reject insecure authorization endpoints.");

		assert!(matches!(
			err,
			ProviderDescriptorError::InsecureEndpoint { endpoint: "authorization", .. }
		));
	}

	#[test]
	fn descriptor_requires_both_core_endpoints() {
		let err = ProviderDescriptor::builder()
			.token_endpoint(url("https://example.com/token"))
			.build()
			.expect_err("Missing authorization endpoint should fail.");

		assert!(matches!(err, ProviderDescriptorError::MissingAuthorizationEndpoint));

		let err = ProviderDescriptor::builder()
			.authorization_endpoint(url("https://example.com/auth"))
			.build()
			.expect_err("Missing token endpoint should fail.");

		assert!(matches!(err, ProviderDescriptorError::MissingTokenEndpoint));
	}

	#[test]
	fn scope_param_joins_with_spaces() {
		let descriptor = ProviderDescriptor::builder()
			.authorization_endpoint(url("https://example.com/auth"))
			.token_endpoint(url("https://example.com/token"))
			.scope("openid")
			.scope("profile")
			.build()
			.expect("Descriptor fixture should build.");

		assert_eq!(descriptor.scope_param(), Some("openid profile".into()));

		let bare = ProviderDescriptor::builder()
			.authorization_endpoint(url("https://example.com/auth"))
			.token_endpoint(url("https://example.com/token"))
			.build()
			.expect("Descriptor fixture should build.");

		assert_eq!(bare.scope_param(), None);
	}

	#[test]
	fn userinfo_endpoint_is_validated_when_present() {
		let err = ProviderDescriptor::builder()
			.authorization_endpoint(url("https://example.com/auth"))
			.token_endpoint(url("https://example.com/token"))
			.userinfo_endpoint(url("http://example.com/userinfo"))
			.build()
			.expect_err("Insecure userinfo endpoint should fail.");

		assert!(matches!(
			err,
			ProviderDescriptorError::InsecureEndpoint { endpoint: "userinfo", .. }
		));
	}

	#[test]
	fn loopback_endpoints_may_use_plain_http() {
		ProviderDescriptor::builder()
			.authorization_endpoint(url("http://127.0.0.1:8080/auth"))
			.token_endpoint(url("http://localhost:8080/token"))
			.build()
			.expect("Loopback HTTP endpoints should be accepted.");
	}
}
