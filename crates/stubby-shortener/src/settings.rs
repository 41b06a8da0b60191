use std::time::Duration;
use typed_builder::TypedBuilder;

/// Attempts the registration protocol makes before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, TypedBuilder)]
pub struct ShortenerSettings {
    /// Total candidate codes tried per create request.
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,
    /// Deadline applied to every individual store call.
    #[builder(default)]
    pub operation_timeout: Option<Duration>,
    /// Run concurrent creates for the same destination one at a time.
    #[builder(default = false)]
    pub serialize_creates: bool,
}

impl Default for ShortenerSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}
