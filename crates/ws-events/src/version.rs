use semver::{Version, VersionReq};

/// Server-supported protocol ranges, most preferred first.
pub const SERVER_PROTOCOL_PREFERENCE: [&str; 4] = ["^0.4.0", "^0.3.0", "^0.2.0", "^0.1.0"];

fn parse_caret_range(range: &str) -> Option<(Version, VersionReq)> {
	let req = VersionReq::parse(range).ok()?;
	let base = range.trim_start_matches(['^', '~', '=', '>', '<', '=', ' ']);
	let version = Version::parse(base).ok()?;
	Some((version, req))
}

/// Two semver ranges intersect if either range's base version satisfies the other range.
/// This holds for the caret ranges this negotiator deals in exclusively.
fn ranges_intersect(a: &str, b: &str) -> bool {
	let Some((version_a, req_a)) = parse_caret_range(a) else {
		return false;
	};
	let Some((version_b, req_b)) = parse_caret_range(b) else {
		return false;
	};
	req_a.matches(&version_b) || req_b.matches(&version_a)
}

/// Picks the first server-preferred range that intersects any client-offered range.
/// An empty client offer is treated as `["^0.1.0"]`.
#[must_use]
pub fn negotiate<S: AsRef<str>>(client_offered: &[S]) -> Option<&'static str> {
	if client_offered.is_empty() {
		let fallback = "^0.1.0";
		return SERVER_PROTOCOL_PREFERENCE.iter().copied().find(|server_range| ranges_intersect(server_range, fallback));
	}
	SERVER_PROTOCOL_PREFERENCE
		.iter()
		.copied()
		.find(|server_range| client_offered.iter().any(|c| ranges_intersect(server_range, c.as_ref())))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn picks_most_preferred_intersecting_range() {
		let offered = vec!["^0.4.0".to_string(), "^0.2.0".to_string()];
		assert_eq!(negotiate(&offered), Some("^0.4.0"));
	}

	#[test]
	fn empty_offer_falls_back_to_lowest_range() {
		let offered: Vec<String> = vec![];
		assert_eq!(negotiate(&offered), Some("^0.1.0"));
	}

	#[test]
	fn no_intersection_yields_none() {
		let offered = vec!["^9.0.0".to_string()];
		assert_eq!(negotiate(&offered), None);
	}
}
