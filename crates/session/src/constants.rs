//! Wire-level constants for the exam console backend.

/// Refresh endpoint, relative to the API base URL
pub const REFRESH_PATH: &str = "/api/v1/auth/refresh";

/// Header carrying the refresh token on refresh requests
pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

/// Refresh attempts made before giving up
pub const DEFAULT_MAX_REFRESH_ATTEMPTS: u32 = common::config::DEFAULT_MAX_REFRESH_ATTEMPTS;

/// Default navigation path of the login entry point
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Zone reported when the host zone cannot be determined
pub const FALLBACK_TIME_ZONE: &str = "UTC";

// =============================================================================
// Persisted credential keys
// =============================================================================

pub const ACCESS_TOKEN_KEY: &str = "accessToken";

pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

pub const DEVICE_ID_KEY: &str = "deviceId";
