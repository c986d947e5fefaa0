//! Code-for-token exchange guarded by the rate limiter and challenge store.
//!
//! The guard order is fixed: the rate limiter runs first so denied callers
//! never burn their single-use challenge, then the challenge is consumed, then
//! the recorded redirect URI is compared against the presented one. A redirect
//! mismatch discovered after consumption leaves the challenge consumed; the
//! caller must start a fresh authorization attempt.

// self
use crate::{
	_prelude::*,
	error::RejectReason,
	flows::Broker,
	http::TokenHttpClient,
	ident::{ClientKey, StateToken},
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	rate_limit::Operation,
	token::TokenGrant,
};

/// Inputs for a code-for-token exchange.
#[derive(Clone, Debug)]
pub struct ExchangeRequest {
	/// State token round-tripped through the provider redirect.
	pub state: StateToken,
	/// Authorization code returned by the provider.
	pub code: String,
	/// Redirect URI presented by the caller; must match the recorded one.
	pub redirect_uri: Url,
	/// Caller identity the exchange quota is charged against.
	pub caller: ClientKey,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Exchanges an authorization code for tokens.
	///
	/// Rejections for unknown, expired, and replayed states, and for redirect
	/// mismatches, all render as the same generic [`Error::InvalidRequest`].
	pub async fn exchange_code(&self, request: ExchangeRequest) -> Result<TokenGrant> {
		const KIND: FlowKind = FlowKind::ExchangeCode;

		let span = FlowSpan::new(KIND, "exchange_code");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				self.limiter.require(Operation::OauthExchange, &request.caller).await?;

				let record = self.challenges.consume(&request.state).await?;

				if record.redirect_uri != request.redirect_uri {
					let reason = RejectReason::RedirectMismatch;

					obs::record_reject("exchange_redirect", &reason);

					return Err(Error::invalid_request(reason));
				}

				self.facade()?
					.exchange_authorization_code(
						&request.code,
						&record.code_verifier,
						&record.redirect_uri,
					)
					.await
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}
}
