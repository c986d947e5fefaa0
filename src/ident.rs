//! Strongly typed identifiers validated before anything touches storage.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 128;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty or whitespace.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (state, client, owner).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (state, client, owner).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (state, client, owner).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

def_id! { StateToken, "Opaque state token identifying one in-flight authorization attempt.", "State" }
def_id! { ClientKey, "Rate-limit identifier for a caller (client IP, subject, or composite).", "Client" }
def_id! { OwnerHint, "Optional identifier of the requesting session, kept for audit.", "Owner" }

impl StateToken {
	/// Wraps a gate-generated alphanumeric token; generation guarantees validity.
	pub(crate) fn from_generated(value: String) -> Self {
		Self(value)
	}
}

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn identifiers_reject_whitespace_and_empty() {
		assert!(StateToken::new(" abc123").is_err(), "Leading whitespace must be rejected.");
		assert!(StateToken::new("abc123 ").is_err(), "Trailing whitespace must be rejected.");
		assert!(ClientKey::new("").is_err());
		assert!(OwnerHint::new("with space").is_err());

		let key = ClientKey::new("203.0.113.7").expect("Client key fixture should be valid.");

		assert_eq!(key.as_ref(), "203.0.113.7");
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let payload = "\"state-42\"";
		let state: StateToken =
			serde_json::from_str(payload).expect("State token should deserialize successfully.");

		assert_eq!(state.as_ref(), "state-42");
		assert!(serde_json::from_str::<StateToken>("\"with space\"").is_err());
		assert!(serde_json::from_str::<StateToken>("\" state-42\"").is_err());
	}

	#[test]
	fn unicode_whitespace_and_length_limits() {
		let nbsp = format!("client{}key", '\u{00A0}');

		assert!(ClientKey::new(&nbsp).is_err());

		let exact = "a".repeat(IDENTIFIER_MAX_LEN);

		ClientKey::new(&exact).expect("Exact length should succeed.");

		let too_long = "a".repeat(IDENTIFIER_MAX_LEN + 1);

		assert!(ClientKey::new(&too_long).is_err());
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<StateToken, u8> = HashMap::from_iter([(
			StateToken::new("state-123").expect("State token used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("state-123"), Some(&7));
	}
}
