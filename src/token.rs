//! Credential model and the single-slot token cache.
//!
//! A [`Client`](crate::client::Client) owns exactly one [`TokenCache`], which holds at
//! most one [`Credential`]. Credentials are immutable once issued: `expires_at` is
//! computed at issuance time and never recomputed, and refreshes replace the whole
//! record with a single `Arc` swap instead of mutating fields in place.

// crates.io
use serde_json::{Map, Value};
// self
use crate::_prelude::*;

/// Redacted secret wrapper keeping API secrets and bearer tokens out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret(String);
impl Secret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner secret value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` when the wrapped string is empty.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl AsRef<str> for Secret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Secret").field(&"<redacted>").finish()
	}
}
impl Display for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Wire shape answered by the backend's `POST /auth/oauth2/token` endpoint.
///
/// Fields beyond the three the cache interprets are preserved verbatim in
/// [`Credential::raw`] so callers can reach provider-specific extras.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenGrant {
	/// Bearer token value.
	pub access_token: String,
	/// Token type label; backends conventionally answer `Bearer`.
	#[serde(default = "default_token_type")]
	pub token_type: String,
	/// Relative lifetime in seconds.
	pub expires_in: i64,
	/// Remaining response fields, kept opaque.
	#[serde(flatten)]
	pub raw: Map<String, Value>,
}

fn default_token_type() -> String {
	"Bearer".into()
}

/// Issued credential cached by the client.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
	/// Access token secret; callers must avoid logging it.
	pub access_token: Secret,
	/// Token type label reported by the backend.
	pub token_type: String,
	/// Expiry instant, fixed at issuance as `issued_at + expires_in`.
	pub expires_at: OffsetDateTime,
	/// Opaque extra fields from the issuance response.
	pub raw: Map<String, Value>,
}
impl Credential {
	/// Builds a credential from an issuance response, stamping the expiry against
	/// the provided issuance instant.
	pub fn from_grant(grant: TokenGrant, issued_at: OffsetDateTime) -> Self {
		Self {
			access_token: Secret::new(grant.access_token),
			token_type: grant.token_type,
			expires_at: issued_at + Duration::seconds(grant.expires_in),
			raw: grant.raw,
		}
	}

	/// Returns `true` while the credential's expiry lies strictly in the future.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at > instant
	}

	/// Convenience helper that checks validity against the current UTC instant.
	pub fn is_valid(&self) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc())
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("access_token", &"<redacted>")
			.field("token_type", &self.token_type)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Single-slot credential cache with atomic-replace semantics.
///
/// Readers take a cheap `Arc` clone; writers swap the whole slot. The issuance guard
/// serializes cache misses so concurrent stale callers piggy-back on one in-flight
/// token request instead of stampeding the token endpoint.
#[derive(Debug, Default)]
pub struct TokenCache {
	slot: RwLock<Option<Arc<Credential>>>,
	issuance_guard: AsyncMutex<()>,
}
impl TokenCache {
	/// Returns the cached credential when it is still valid at `instant`.
	pub fn current_at(&self, instant: OffsetDateTime) -> Option<Arc<Credential>> {
		self.slot.read().as_ref().filter(|credential| credential.is_valid_at(instant)).cloned()
	}

	/// Returns the cached credential when it is still valid right now.
	pub fn current(&self) -> Option<Arc<Credential>> {
		self.current_at(OffsetDateTime::now_utc())
	}

	/// Replaces the slot wholesale with a freshly issued credential.
	pub fn store(&self, credential: Credential) -> Arc<Credential> {
		let credential = Arc::new(credential);

		*self.slot.write() = Some(credential.clone());

		credential
	}

	/// Guard serializing issuance across concurrent cache misses.
	pub(crate) fn issuance_guard(&self) -> &AsyncMutex<()> {
		&self.issuance_guard
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn grant(expires_in: i64) -> TokenGrant {
		serde_json::from_value(serde_json::json!({
			"access_token": "token-value",
			"token_type": "Bearer",
			"expires_in": expires_in,
		}))
		.expect("Token grant fixture should deserialize.")
	}

	#[test]
	fn secret_formatters_redact() {
		let secret = Secret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "Secret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
	}

	#[test]
	fn expiry_is_stamped_once_at_issuance() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let credential = Credential::from_grant(grant(1800), issued);

		assert_eq!(credential.expires_at, macros::datetime!(2025-01-01 00:30 UTC));
		assert!(credential.is_valid_at(macros::datetime!(2025-01-01 00:29 UTC)));
		// Expiry is exclusive: a credential is stale the instant it reaches expires_at.
		assert!(!credential.is_valid_at(macros::datetime!(2025-01-01 00:30 UTC)));
	}

	#[test]
	fn grant_preserves_unknown_fields() {
		let grant: TokenGrant = serde_json::from_value(serde_json::json!({
			"access_token": "t",
			"expires_in": 60,
			"refresh_token": "r",
		}))
		.expect("Grant with extra fields should deserialize.");
		let credential = Credential::from_grant(grant, OffsetDateTime::now_utc());

		assert_eq!(credential.token_type, "Bearer");
		assert_eq!(credential.raw.get("refresh_token"), Some(&Value::String("r".into())));
	}

	#[test]
	fn cache_never_returns_expired_credentials() {
		let cache = TokenCache::default();
		let now = OffsetDateTime::now_utc();

		assert!(cache.current_at(now).is_none());

		cache.store(Credential::from_grant(grant(60), now));

		assert!(cache.current_at(now).is_some());
		assert!(cache.current_at(now + Duration::minutes(2)).is_none());
	}

	#[test]
	fn store_replaces_the_slot_wholesale() {
		let cache = TokenCache::default();
		let now = OffsetDateTime::now_utc();

		cache.store(Credential::from_grant(grant(60), now));
		cache.store(Credential::from_grant(
			serde_json::from_value(serde_json::json!({
				"access_token": "replacement",
				"expires_in": 60,
			}))
			.expect("Replacement grant fixture should deserialize."),
			now,
		));

		let current = cache.current_at(now).expect("Replacement credential should be valid.");

		assert_eq!(current.access_token.expose(), "replacement");
	}
}
