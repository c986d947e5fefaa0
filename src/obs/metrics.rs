// self
use crate::obs::{FlowKind, FlowOutcome};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_gate_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records how many stale documents a sweep pass deleted, labeled by document kind.
pub fn record_sweep_deleted(kind: &'static str, count: u64) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("oauth2_gate_sweep_deleted_total", "kind" => kind).increment(count);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, count);
	}
}
