// self
use crate::{
	_prelude::*,
	error::RejectReason,
	obs::FlowKind,
	rate_limit::{Operation, RetryDirective},
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by gate flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("oauth2_gate.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> FlowSpanGuard {
		#[cfg(feature = "tracing")]
		{
			FlowSpanGuard { guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			FlowSpanGuard {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// RAII guard returned by [`FlowSpan::entered`].
pub struct FlowSpanGuard {
	#[cfg(feature = "tracing")]
	#[allow(dead_code)]
	guard: tracing::span::EnteredSpan,
}
impl Debug for FlowSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("FlowSpanGuard(..)")
	}
}

/// Logs a rejected request with its internal reason.
///
/// The reason label never reaches external clients; this is the only place the
/// distinction between unknown, expired, and replayed states is recorded.
pub(crate) fn record_reject(stage: &'static str, reason: &RejectReason) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(stage, reason = reason.as_str(), "request rejected");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (stage, reason);
	}
}

/// Logs a rate-limit denial with its retry directive.
pub(crate) fn record_rate_limited(operation: Operation, directive: &RetryDirective) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			operation = operation.as_str(),
			retry_after_secs = directive.retry_after.whole_seconds(),
			"rate limit exceeded"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (operation, directive);
	}
}
