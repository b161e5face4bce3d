use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Authorization scope asserted by a validated token.
///
/// `Unknown` preserves whatever string the token issuer sent rather than
/// failing to deserialize an entire claims set over one unrecognized scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
	DocWrite,
	SummaryWrite,
	DocRead,
	Unknown(String),
}

impl Scope {
	pub fn as_str(&self) -> &str {
		match self {
			Scope::DocWrite => "doc:write",
			Scope::SummaryWrite => "summary:write",
			Scope::DocRead => "doc:read",
			Scope::Unknown(s) => s.as_str(),
		}
	}
}

impl FromStr for Scope {
	type Err = std::convert::Infallible;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(match s {
			"doc:write" => Scope::DocWrite,
			"summary:write" => Scope::SummaryWrite,
			"doc:read" => Scope::DocRead,
			other => Scope::Unknown(other.to_string()),
		})
	}
}

impl fmt::Display for Scope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

impl Serialize for Scope {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for Scope {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;
		Ok(Scope::from_str(&raw).expect("Scope::from_str is infallible"))
	}
}

/// Returns true if any scope in the set grants write access to document ops.
#[must_use]
pub fn can_write(scopes: &HashSet<Scope>) -> bool {
	scopes.contains(&Scope::DocWrite) || scopes.contains(&Scope::SummaryWrite)
}

/// Returns true if the scope set grants summary-write access specifically.
#[must_use]
pub fn can_summarize(scopes: &HashSet<Scope>) -> bool {
	scopes.contains(&Scope::SummaryWrite)
}

/// Claims decoded and verified from a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
	pub tenant_id: String,
	pub document_id: String,
	pub user: serde_json::Value,
	pub scopes: HashSet<Scope>,
	pub expiration_epoch_sec: i64,
}

impl Claims {
	#[must_use]
	pub fn can_write(&self) -> bool {
		can_write(&self.scopes)
	}

	#[must_use]
	pub fn can_summarize(&self) -> bool {
		can_summarize(&self.scopes)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn scope_roundtrips_through_json() {
		let scope: Scope = serde_json::from_str("\"doc:write\"").unwrap();
		assert_eq!(scope, Scope::DocWrite);
		assert_eq!(serde_json::to_string(&scope).unwrap(), "\"doc:write\"");
	}

	#[test]
	fn unrecognized_scope_is_preserved_not_rejected() {
		let scope: Scope = serde_json::from_str("\"future:scope\"").unwrap();
		assert_eq!(scope, Scope::Unknown("future:scope".to_string()));
	}

	#[test]
	fn can_write_covers_summary_write_too() {
		let mut scopes = HashSet::new();
		scopes.insert(Scope::SummaryWrite);
		assert!(can_write(&scopes));
		assert!(!can_write(&HashSet::new()));
	}
}
