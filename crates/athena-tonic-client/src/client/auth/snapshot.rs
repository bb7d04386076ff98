use core::time::Duration;
use std::time::SystemTime;

/// Margin subtracted from `expires_at` when deciding whether a token can still
/// be sent.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Fraction of the token lifetime below which a background refresh starts.
pub const DEFAULT_REFRESH_THRESHOLD: f64 = 0.25;

/// An immutable bearer credential returned by the OAuth endpoint.
///
/// Snapshots are never mutated. A refresh builds a new snapshot and swaps the
/// shared pointer, so a reader holds either the old or the new value in full.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSnapshot {
    access_token: String,
    scheme: String,
    issued_at: SystemTime,
    expires_at: SystemTime,
}

impl TokenSnapshot {
    /// Builds a snapshot valid for `lifetime` starting at `issued_at`.
    pub fn new(
        access_token: impl Into<String>,
        scheme: impl Into<String>,
        issued_at: SystemTime,
        lifetime: Duration,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            scheme: scheme.into(),
            issued_at,
            expires_at: issued_at + lifetime,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Authorization scheme exactly as issued, e.g. `Bearer` or `DPoP`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub const fn issued_at(&self) -> SystemTime {
        self.issued_at
    }

    pub const fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    /// Value of the `authorization` header: `"<scheme> <token>"`.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.scheme, self.access_token)
    }

    fn lifetime(&self) -> Duration {
        self.expires_at
            .duration_since(self.issued_at)
            .unwrap_or_default()
    }

    fn remaining_at(&self, now: SystemTime) -> Duration {
        self.expires_at.duration_since(now).unwrap_or_default()
    }

    /// `true` while `now` is earlier than `expires_at - margin`.
    pub fn is_valid_at(&self, now: SystemTime, margin: Duration) -> bool {
        self.remaining_at(now) > margin
    }

    /// `true` once less than `threshold` of the lifetime remains.
    pub fn is_old_at(&self, now: SystemTime, threshold: f64) -> bool {
        self.remaining_at(now) < self.lifetime().mul_f64(threshold)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(SystemTime::now(), DEFAULT_EXPIRY_MARGIN)
    }

    pub fn is_old(&self) -> bool {
        self.is_old_at(SystemTime::now(), DEFAULT_REFRESH_THRESHOLD)
    }
}

// Keeps the credential out of logs.
impl core::fmt::Debug for TokenSnapshot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenSnapshot")
            .field("scheme", &self.scheme)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn snapshot(issued_at: SystemTime) -> TokenSnapshot {
        TokenSnapshot::new("abcd123", "Bearer", issued_at, HOUR)
    }

    #[test]
    fn valid_until_thirty_seconds_before_expiry() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let token = snapshot(t);

        assert!(token.is_valid_at(t, DEFAULT_EXPIRY_MARGIN));
        assert!(token.is_valid_at(t + Duration::from_secs(3569), DEFAULT_EXPIRY_MARGIN));
        assert!(!token.is_valid_at(t + Duration::from_secs(3570), DEFAULT_EXPIRY_MARGIN));
        assert!(!token.is_valid_at(t + Duration::from_secs(3571), DEFAULT_EXPIRY_MARGIN));
        assert!(!token.is_valid_at(t + HOUR * 2, DEFAULT_EXPIRY_MARGIN));
    }

    #[test]
    fn old_once_a_quarter_of_lifetime_remains() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let token = snapshot(t);

        assert!(!token.is_old_at(t, DEFAULT_REFRESH_THRESHOLD));
        assert!(!token.is_old_at(t + Duration::from_secs(2700), DEFAULT_REFRESH_THRESHOLD));
        assert!(token.is_old_at(t + Duration::from_secs(2701), DEFAULT_REFRESH_THRESHOLD));
        assert!(token.is_old_at(t + HOUR, DEFAULT_REFRESH_THRESHOLD));
    }

    #[test]
    fn authorization_uses_issued_scheme() {
        let token = TokenSnapshot::new("xyz789", "DPoP", SystemTime::now(), HOUR);
        assert_eq!(token.authorization(), "DPoP xyz789");
    }

    #[test]
    fn debug_hides_access_token() {
        let token = snapshot(SystemTime::now());
        assert!(!format!("{token:?}").contains("abcd123"));
    }
}
