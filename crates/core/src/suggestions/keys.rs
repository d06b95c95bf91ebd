//! Pattern key construction.
//!
//! Keys are composed from normalized user input so that case and whitespace
//! variants of the same real-world value collapse onto one pattern. The same
//! normalization runs at write and read time.

use crate::errors::DomainError;

use super::UNKNOWN_PROFILE;

/// Trim and upper-case a key component.
pub fn normalize(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Measurements keep their original case; only surrounding whitespace goes.
/// `10mm` and `10MM` are distinct measurement strings on purpose.
pub fn normalize_measurement(value: &str) -> String {
    value.trim().to_string()
}

/// Map an absent or blank profile to the `UNKNOWN` placeholder.
pub fn normalize_profile(profile: Option<&str>) -> String {
    match profile {
        Some(value) if !value.trim().is_empty() => normalize(value),
        _ => UNKNOWN_PROFILE.to_string(),
    }
}

fn require(field: &'static str, normalized: &str) -> Result<(), DomainError> {
    if normalized.is_empty() {
        return Err(DomainError::EmptyKeyComponent { field });
    }
    Ok(())
}

/// `PRODUCT|SIZE` — shared by every pattern learned for the same
/// product/size combination.
pub fn context_key(product: &str, size: &str) -> Result<String, DomainError> {
    let product = normalize(product);
    require("product_name", &product)?;
    let size = normalize(size);
    require("size", &size)?;
    Ok(format!("{product}|{size}"))
}

/// Prefix matching every context key for a product, regardless of size.
pub fn context_prefix(product: &str) -> Result<String, DomainError> {
    let product = normalize(product);
    require("product_name", &product)?;
    Ok(format!("{product}|"))
}

/// `PRODUCT|SIZE|PROFILE|measurement` — the unique pattern identity and the
/// only allowed merge key.
pub fn pattern_key(
    product: &str,
    size: &str,
    profile: Option<&str>,
    measurement: &str,
) -> Result<String, DomainError> {
    let context = context_key(product, size)?;
    let profile = normalize_profile(profile);
    let measurement = normalize_measurement(measurement);
    require("measurement", &measurement)?;
    Ok(format!("{context}|{profile}|{measurement}"))
}
