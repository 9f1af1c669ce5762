//! REST endpoint paths used by the session layer

pub const LOGIN: &str = "/token/";
pub const REFRESH: &str = "/token/refresh/";
pub const LOGOUT: &str = "/logout/";
pub const PROFILE: &str = "/profile/";

pub const REGISTER: &str = "/auth/register/";
pub const VERIFY_OTP: &str = "/auth/verify-otp/";
pub const RESEND_OTP: &str = "/auth/resend-otp/";
pub const FORGOT_PASSWORD_OTP: &str = "/auth/forgot-password-otp/";
pub const RESET_PASSWORD_OTP: &str = "/auth/reset-password-otp/";

/// Endpoints that never carry an Authorization header
pub const PUBLIC: [&str; 7] = [
    REGISTER,
    VERIFY_OTP,
    RESEND_OTP,
    LOGIN,
    REFRESH,
    FORGOT_PASSWORD_OTP,
    RESET_PASSWORD_OTP,
];

/// Normalize a path for comparison: no query string, leading and trailing slash
fn normalize(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or("");
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

pub fn is_public(path: &str) -> bool {
    let path = normalize(path);
    PUBLIC.iter().any(|p| *p == path)
}

pub fn is_refresh(path: &str) -> bool {
    normalize(path) == REFRESH
}
