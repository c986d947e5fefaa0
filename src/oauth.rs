//! Internal OAuth client facade abstractions.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
	EndpointSet, HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError,
	Scope, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError},
};
// self
use crate::{
	_prelude::*,
	challenge::ChallengeGrant,
	error::{ConfigError, UpstreamError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	provider::{ClientAuthMethod, ProviderDescriptor},
	token::{Secret, TokenGrant},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeTokenResponse = oauth2::basic::BasicTokenResponse;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Maps HTTP transport failures into gate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a gate error.
	///
	/// `timeout_secs` is the transport's configured deadline, used to label
	/// timeout classifications.
	fn map_transport_error(
		&self,
		timeout_secs: i64,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		timeout_secs: i64,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(timeout_secs, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => UpstreamError::Io(inner).into(),
			HttpClientError::Other(message) => UpstreamError::Rejected {
				message: format!("HTTP client error occurred: {message}"),
				status: meta_status(meta),
				retry_after: meta_retry_after(meta),
			}
			.into(),
			_ => UpstreamError::Rejected {
				message: "HTTP client error occurred".into(),
				status: meta_status(meta),
				retry_after: meta_retry_after(meta),
			}
			.into(),
		}
	}
}

/// Thin wrapper over the `oauth2` crate configured from a provider descriptor.
pub(crate) struct TokenFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredBasicClient,
	scopes: Vec<String>,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> TokenFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_descriptor(
		descriptor: &ProviderDescriptor,
		client_id: &str,
		client_secret: Option<&Secret>,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let auth_url = AuthUrl::new(descriptor.endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let token_url = TokenUrl::new(descriptor.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let secret = if matches!(descriptor.client_auth_method, ClientAuthMethod::NoneWithPkce) {
			None
		} else {
			client_secret.map(|value| ClientSecret::new(value.expose().to_owned()))
		};
		let mut oauth_client = BasicClient::new(ClientId::new(client_id.to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url);

		if let Some(secret) = secret {
			oauth_client = oauth_client.set_client_secret(secret);
		}
		if matches!(descriptor.client_auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self {
			oauth_client,
			scopes: descriptor.scopes.clone(),
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		})
	}

	/// Assembles the provider authorization URL for a freshly stored challenge.
	///
	/// The challenge parameters ride along as extra query parameters because the
	/// verifier never leaves the store once the challenge document is written.
	pub(crate) fn authorization_url(
		&self,
		grant: &ChallengeGrant,
		redirect_uri: &Url,
	) -> Result<Url> {
		let state = grant.state.to_string();
		let redirect_url = RedirectUrl::new(redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidRedirect { source })?;
		let mut request = self
			.oauth_client
			.authorize_url(move || CsrfToken::new(state))
			.set_redirect_uri(Cow::Owned(redirect_url))
			.add_extra_param("code_challenge", grant.code_challenge.clone())
			.add_extra_param("code_challenge_method", grant.method.as_str());

		for scope in &self.scopes {
			request = request.add_scope(Scope::new(scope.clone()));
		}

		let (url, _csrf) = request.url();

		Ok(url)
	}

	pub(crate) fn exchange_authorization_code<'a, 'code, 'pkce, 'redirect>(
		&'a self,
		code: &'code str,
		pkce_verifier: &'pkce Secret,
		redirect_uri: &'redirect Url,
	) -> FacadeFuture<'a, TokenGrant>
	where
		'code: 'a,
		'pkce: 'a,
		'redirect: 'a,
	{
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let redirect_url = RedirectUrl::new(redirect_uri.to_string())
				.map_err(|source| ConfigError::InvalidRedirect { source })?;
			let request = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.expose().to_owned()))
				.set_redirect_uri(Cow::Owned(redirect_url));
			let response = request.request_async(&instrumented).await.map_err(|err| {
				map_request_error(
					self.http_client.timeout_secs(),
					meta.take(),
					err,
					self.error_mapper.as_ref(),
				)
			})?;

			map_token_response(response)
		})
	}

	pub(crate) fn refresh_token<'a, 'refresh>(
		&'a self,
		refresh_token: &'refresh Secret,
	) -> FacadeFuture<'a, TokenGrant>
	where
		'refresh: 'a,
	{
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.expose().to_owned());
			let request = self.oauth_client.exchange_refresh_token(&refresh_secret);
			let response = request.request_async(&instrumented).await.map_err(|err| {
				map_request_error(
					self.http_client.timeout_secs(),
					meta.take(),
					err,
					self.error_mapper.as_ref(),
				)
			})?;

			map_token_response(response)
		})
	}
}

/// Converts a raw `oauth2` token response into a [`TokenGrant`], validating
/// the provider-declared lifetime.
fn map_token_response(response: FacadeTokenResponse) -> Result<TokenGrant> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}

	let scope = response.scopes().map(|scopes| {
		scopes.iter().map(|scope| scope.as_ref()).collect::<Vec<_>>().join(" ")
	});

	Ok(TokenGrant {
		access_token: Secret::new(response.access_token().secret().to_owned()),
		refresh_token: response
			.refresh_token()
			.map(|token| Secret::new(token.secret().to_owned())),
		obtained_at: OffsetDateTime::now_utc(),
		expires_in: Duration::seconds(expires_in),
		scope,
	})
}

fn map_request_error<E, M>(
	timeout_secs: i64,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(response, meta_ref),
		RequestTokenError::Request(error) =>
			mapper.map_transport_error(timeout_secs, meta_ref, error),
		RequestTokenError::Parse(error, _body) =>
			UpstreamError::MalformedResponse { source: error, status: meta_status(meta_ref) }.into(),
		RequestTokenError::Other(message) => UpstreamError::Rejected {
			message: format!("Token endpoint returned an unexpected response: {message}"),
			status: meta_status(meta_ref),
			retry_after: meta_retry_after(meta_ref),
		}
		.into(),
	}
}

fn map_server_response_error(
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let message = if let Some(description) = response.error_description() {
		format!("{}: {description}", response.error().as_ref())
	} else {
		response.error().as_ref().to_owned()
	};

	UpstreamError::Rejected {
		message,
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(
	timeout_secs: i64,
	meta: Option<&ResponseMetadata>,
	err: ReqwestError,
) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return UpstreamError::Timeout { limit: timeout_secs }.into();
	}

	UpstreamError::from(err).into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;
	use crate::challenge::{ChallengeGrant, PkceCodeChallengeMethod};

	fn descriptor(method: ClientAuthMethod) -> ProviderDescriptor {
		ProviderDescriptor::builder()
			.authorization_endpoint(
				Url::parse("https://example.com/oauth2/authorize")
					.expect("Failed to parse authorization endpoint URL."),
			)
			.token_endpoint(
				Url::parse("https://example.com/oauth2/token")
					.expect("Failed to parse token endpoint URL."),
			)
			.client_auth_method(method)
			.scope("openid")
			.build()
			.expect("Failed to build provider descriptor.")
	}

	fn facade(
		method: ClientAuthMethod,
	) -> TokenFacade<ReqwestHttpClient, ReqwestTransportErrorMapper> {
		TokenFacade::from_descriptor(
			&descriptor(method),
			"client-id",
			Some(&Secret::new("secret")),
			Arc::new(
				ReqwestHttpClient::with_timeout(Duration::seconds(5))
					.expect("Failed to build HTTP client."),
			),
			Arc::new(ReqwestTransportErrorMapper),
		)
		.expect("Failed to build token facade.")
	}

	#[test]
	fn authorization_url_carries_challenge_parameters() {
		let facade = facade(ClientAuthMethod::ClientSecretBasic);
		let grant = ChallengeGrant {
			state: crate::ident::StateToken::from_generated("abc123state".into()),
			code_challenge: "challenge-value".into(),
			method: PkceCodeChallengeMethod::S256,
		};
		let redirect =
			Url::parse("https://app.example/callback").expect("Failed to parse redirect URI.");
		let url = facade
			.authorization_url(&grant, &redirect)
			.expect("Authorization URL should assemble.");
		let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();

		assert!(query.contains(&("response_type".into(), "code".into())));
		assert!(query.contains(&("client_id".into(), "client-id".into())));
		assert!(query.contains(&("state".into(), "abc123state".into())));
		assert!(query.contains(&("code_challenge".into(), "challenge-value".into())));
		assert!(query.contains(&("code_challenge_method".into(), "S256".into())));
		assert!(query.contains(&("scope".into(), "openid".into())));
		assert!(
			query.contains(&("redirect_uri".into(), "https://app.example/callback".into()))
		);
	}

	#[test]
	fn builds_facade_for_every_auth_method() {
		facade(ClientAuthMethod::ClientSecretBasic);
		facade(ClientAuthMethod::ClientSecretPost);
		facade(ClientAuthMethod::NoneWithPkce);
	}
}
