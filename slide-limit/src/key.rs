use std::fmt;

const PREFIX: &str = "ratelimit:";
const FALLBACK_IDENTIFIER: &str = "unknown";

/// The scope being throttled: `ratelimit:<identifier>`.
///
/// All callers whose identity cannot be resolved share the
/// [`LimitKey::fallback`] bucket.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LimitKey(String);

impl LimitKey {
    pub fn for_client(identifier: impl AsRef<str>) -> Self {
        Self(format!("{PREFIX}{}", identifier.as_ref()))
    }

    pub fn fallback() -> Self {
        Self::for_client(FALLBACK_IDENTIFIER)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Store sub-key holding the counter of the fixed window starting at
    /// `window_start_ms`.
    pub(crate) fn window(&self, window_start_ms: u64) -> String {
        format!("{}:{window_start_ms}", self.0)
    }
}

impl fmt::Display for LimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LimitKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
