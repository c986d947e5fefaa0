//! Refresh token flow, rate limited on its own quota.
//!
//! Refreshes carry no challenge: possession of the refresh token is the
//! credential. Rotated refresh tokens pass straight through to the caller;
//! this layer never persists token material.

// self
use crate::{
	_prelude::*,
	flows::Broker,
	http::TokenHttpClient,
	ident::ClientKey,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	rate_limit::Operation,
	token::{Secret, TokenGrant},
};

/// Inputs for a refresh token call.
#[derive(Clone, Debug)]
pub struct RefreshRequest {
	/// Refresh token previously issued by the provider.
	pub refresh_token: Secret,
	/// Caller identity the refresh quota is charged against.
	pub caller: ClientKey,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Exchanges a refresh token for a fresh grant.
	///
	/// When the provider rotates the refresh token, the new one is returned in
	/// the grant's `refresh_token`; otherwise that field is `None` and the
	/// caller keeps using the token it presented.
	pub async fn refresh_token(&self, request: RefreshRequest) -> Result<TokenGrant> {
		const KIND: FlowKind = FlowKind::RefreshToken;

		let span = FlowSpan::new(KIND, "refresh_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				self.limiter.require(Operation::OauthRefresh, &request.caller).await?;

				self.facade()?.refresh_token(&request.refresh_token).await
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}
}
