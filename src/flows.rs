//! High-level flow orchestrators powered by the token facade.

pub mod authorize;
pub mod exchange;
pub mod refresh;

pub use authorize::*;
pub use exchange::*;
pub use refresh::*;

// self
use crate::{
	_prelude::*,
	challenge::ChallengeStore,
	http::TokenHttpClient,
	oauth::{TokenFacade, TransportErrorMapper},
	provider::ProviderDescriptor,
	rate_limit::{Operation, RateLimiter, RatePolicy},
	store::GateStore,
	token::Secret,
};
#[cfg(feature = "reqwest")]
use crate::{config::GateConfig, http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport stack.
pub type ReqwestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Coordinates guarded OAuth 2.0 flows against a single provider descriptor.
///
/// The broker owns the HTTP transport, document store, challenge store, and
/// rate limiter so individual flow implementations can focus on their own
/// logic (challenge issuance, code exchange, refresh). Every flow that reaches
/// the provider's token endpoint passes the rate limiter first and inherits
/// the transport's hard deadline.
pub struct Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every outbound provider request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Challenge store handling creation and single-use consumption.
	pub challenges: ChallengeStore,
	/// Fixed-window rate limiter guarding upstream operations.
	pub limiter: RateLimiter,
	/// Provider descriptor that defines OAuth endpoints and client auth.
	pub descriptor: ProviderDescriptor,
	/// OAuth 2.0 client identifier used in every grant.
	pub client_id: String,
	/// Optional client secret for confidential authentication methods.
	pub client_secret: Option<Secret>,
}
impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a broker that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		store: Arc<dyn GateStore>,
		descriptor: ProviderDescriptor,
		client_id: impl Into<String>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			challenges: ChallengeStore::new(store.clone()),
			limiter: RateLimiter::new(store),
			descriptor,
			client_id: client_id.into(),
			client_secret: None,
		}
	}

	/// Sets or replaces the client secret used for confidential client auth modes.
	pub fn with_client_secret(mut self, secret: Secret) -> Self {
		self.client_secret = Some(secret);

		self
	}

	/// Overrides the challenge TTL.
	pub fn with_challenge_ttl(mut self, ttl: Duration) -> Self {
		self.challenges = self.challenges.with_ttl(ttl);

		self
	}

	/// Overrides the rate policy for one operation.
	pub fn with_policy(mut self, operation: Operation, policy: RatePolicy) -> Self {
		self.limiter = self.limiter.with_policy(operation, policy);

		self
	}

	pub(crate) fn facade(&self) -> Result<TokenFacade<C, M>> {
		TokenFacade::from_descriptor(
			&self.descriptor,
			&self.client_id,
			self.client_secret.as_ref(),
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)
	}
}
#[cfg(feature = "reqwest")]
impl ReqwestBroker {
	/// Creates a new broker provisioning its own reqwest transport with the
	/// provided hard deadline baked in.
	///
	/// Use [`Broker::with_client_secret`] to attach a confidential client secret
	/// when the descriptor prefers `client_secret_basic` or `client_secret_post`.
	pub fn new(
		store: Arc<dyn GateStore>,
		descriptor: ProviderDescriptor,
		client_id: impl Into<String>,
		upstream_timeout: Duration,
	) -> Result<Self> {
		Ok(Self::with_http_client(
			store,
			descriptor,
			client_id,
			ReqwestHttpClient::with_timeout(upstream_timeout)?,
			Arc::new(ReqwestTransportErrorMapper),
		))
	}

	/// Creates a broker from an environment-derived [`GateConfig`].
	pub fn from_config(config: GateConfig, store: Arc<dyn GateStore>) -> Result<Self> {
		let mut broker = Self::new(
			store,
			config.descriptor,
			config.client_id,
			config.upstream_timeout,
		)?;

		broker.client_secret = config.client_secret;

		Ok(broker)
	}
}
impl<C, M> Clone for Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			transport_mapper: self.transport_mapper.clone(),
			challenges: self.challenges.clone(),
			limiter: self.limiter.clone(),
			descriptor: self.descriptor.clone(),
			client_id: self.client_id.clone(),
			client_secret: self.client_secret.clone(),
		}
	}
}
impl<C, M> Debug for Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.finish()
	}
}
