//! Project-specific utilities live here.

pub mod openapi;

use libris_http::AppError;

/// Fetch a query parameter that must be present. The value is returned as
/// sent, so an empty or padded string still matches exactly.
pub fn required_param<'a>(name: &str, value: Option<&'a str>) -> Result<&'a str, AppError> {
    value.ok_or_else(|| AppError::bad_request(format!("missing query parameter `{name}`")))
}

/// Parse a required numeric query parameter. Non-numeric and non-finite
/// input is rejected instead of being compared as NaN.
pub fn numeric_param(name: &str, value: Option<&str>) -> Result<f64, AppError> {
    let raw = required_param(name, value)?.trim();
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(AppError::bad_request(format!(
            "query parameter `{name}` must be a number, got `{raw}`"
        ))),
    }
}
