//! Authorization start: challenge issuance + authorize URL assembly.
//!
//! [`Broker::start_authorization`] writes a fresh challenge document and hands
//! the caller everything needed to redirect the user to the provider. The PKCE
//! verifier never appears in the result; it stays inside the store until the
//! matching exchange consumes the challenge.

// self
use crate::{
	_prelude::*,
	flows::Broker,
	http::TokenHttpClient,
	ident::{OwnerHint, StateToken},
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Inputs for starting an authorization attempt.
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
	/// Redirect URI the provider must send the user back to. Recorded in the
	/// challenge document and enforced again at exchange time.
	pub redirect_uri: Url,
	/// Optional requesting-session identifier, kept for audit.
	pub owner_hint: Option<OwnerHint>,
}

/// Result of a successful authorization start.
#[derive(Clone, Debug)]
pub struct AuthorizationStart {
	/// State token the client must round-trip through the provider redirect.
	pub state: StateToken,
	/// Fully assembled provider authorization URL.
	pub authorize_url: Url,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a challenge document and assembles the authorization URL.
	pub async fn start_authorization(
		&self,
		request: AuthorizationRequest,
	) -> Result<AuthorizationStart> {
		const KIND: FlowKind = FlowKind::StartAuthorization;

		let span = FlowSpan::new(KIND, "start_authorization");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let grant = self
					.challenges
					.create(request.redirect_uri.clone(), request.owner_hint)
					.await?;
				let authorize_url =
					self.facade()?.authorization_url(&grant, &request.redirect_uri)?;

				Ok(AuthorizationStart { state: grant.state, authorize_url })
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}
}
