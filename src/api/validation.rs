//! Input validation for API requests.
//!
//! Single-field checks return `Result<(), String>` with a user-facing
//! message; the request-level functions collect them through
//! [`ValidationErrorBuilder`] into one `ApiError`.

use lazy_static::lazy_static;
use regex::Regex;

use super::error::{ApiError, ValidationErrorBuilder};
use crate::db::{NewApplication, SignupRequest};
use crate::storage::ImageFormat;

lazy_static! {
    /// Letters and spaces only
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z ]+$").unwrap();

    /// Loose email shape: something@domain.tld
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$"
    ).unwrap();

    static ref MOBILE_REGEX: Regex = Regex::new(r"^[0-9]{10}$").unwrap();

    /// Signed decimal, as submitted for coordinates
    static ref DECIMAL_REGEX: Regex = Regex::new(r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)$").unwrap();
}

pub fn validate_username(username: &str) -> Result<(), String> {
    let username = username.trim();
    if username.is_empty() {
        return Err("Username is required".to_string());
    }
    if !USERNAME_REGEX.is_match(username) {
        return Err("Username can only contain letters and spaces".to_string());
    }
    if username.chars().filter(|c| c.is_ascii_alphabetic()).count() < 5 {
        return Err("Username must contain at least 5 letters".to_string());
    }
    if username.len() > 64 {
        return Err("Username is too long (max 64 characters)".to_string());
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 || !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain an uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain a number".to_string());
    }
    if !password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
    {
        return Err("Password must contain a special character".to_string());
    }
    Ok(())
}

pub fn validate_business_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Business name is required".to_string());
    }
    if name.chars().count() < 3 {
        return Err("Business name must be at least 3 characters".to_string());
    }
    if name.chars().count() > 120 {
        return Err("Business name is too long (max 120 characters)".to_string());
    }
    Ok(())
}

pub fn validate_mobile(mobile: &str) -> Result<(), String> {
    let mobile = mobile.trim();
    if mobile.is_empty() {
        return Err("Mobile number is required".to_string());
    }
    if !MOBILE_REGEX.is_match(mobile) {
        return Err("Mobile number must be 10 digits".to_string());
    }
    Ok(())
}

/// Parse the JSON-encoded category list into trimmed, de-duplicated tags.
/// Duplicates are compared case-insensitively; the first spelling wins.
pub fn parse_category_list(raw: &str) -> Result<Vec<String>, String> {
    if raw.trim().is_empty() {
        return Err("Select at least one category".to_string());
    }
    let parsed: Vec<String> = serde_json::from_str(raw)
        .map_err(|_| "Categories must be a JSON array of strings".to_string())?;

    let mut seen = std::collections::HashSet::new();
    let mut categories = Vec::new();
    for tag in parsed {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err("Categories cannot be blank".to_string());
        }
        if seen.insert(tag.to_lowercase()) {
            categories.push(tag.to_string());
        }
    }

    if categories.is_empty() {
        return Err("Select at least one category".to_string());
    }
    Ok(categories)
}

/// Validate a coordinate string against `[-bound, bound]`
pub fn validate_coordinate(value: &str, label: &str, bound: f64) -> Result<(), String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("{} is required", label));
    }
    if !DECIMAL_REGEX.is_match(value) {
        return Err(format!("{} must be a decimal number", label));
    }
    match value.parse::<f64>() {
        Ok(v) if (-bound..=bound).contains(&v) => Ok(()),
        _ => Err(format!("{} must be between -{} and {}", label, bound, bound)),
    }
}

/// The format is read from the leading bytes; the client's content type is not trusted
pub fn validate_banner(bytes: &[u8], max_bytes: usize) -> Result<ImageFormat, String> {
    if bytes.is_empty() {
        return Err("Banner image is empty".to_string());
    }
    if bytes.len() > max_bytes {
        return Err(format!(
            "Banner is too large (max {} KiB)",
            max_bytes / 1024
        ));
    }
    ImageFormat::sniff(bytes)
        .ok_or_else(|| "Banner must be a PNG, JPEG, GIF or WebP image".to_string())
}

/// Validate a signup request
pub fn validate_signup(req: &SignupRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_username(&req.username) {
        errors.add("username", e);
    }
    if let Err(e) = validate_email(&req.email) {
        errors.add("email", e);
    }
    if let Err(e) = validate_password(&req.password) {
        errors.add("password", e);
    }
    errors.finish()
}

/// Text fields of a vendor application as submitted
#[derive(Debug, Clone, Default)]
pub struct ApplicationForm {
    pub name: Option<String>,
    pub mobile: Option<String>,
    pub categories: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

/// Validate a submitted application and normalize it for storage
pub fn validate_application(form: &ApplicationForm) -> Result<NewApplication, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    let field = |v: &Option<String>| v.as_deref().unwrap_or("").trim().to_string();

    let name = field(&form.name);
    if let Err(e) = validate_business_name(&name) {
        errors.add("name", e);
    }

    let mobile = field(&form.mobile);
    if let Err(e) = validate_mobile(&mobile) {
        errors.add("mobile", e);
    }

    let categories = match parse_category_list(&field(&form.categories)) {
        Ok(c) => c,
        Err(e) => {
            errors.add("categories", e);
            Vec::new()
        }
    };

    let address = field(&form.address);
    if address.is_empty() {
        errors.add("address", "Address is required");
    }

    let latitude = field(&form.latitude);
    if let Err(e) = validate_coordinate(&latitude, "Latitude", 90.0) {
        errors.add("latitude", e);
    }

    let longitude = field(&form.longitude);
    if let Err(e) = validate_coordinate(&longitude, "Longitude", 180.0) {
        errors.add("longitude", e);
    }

    errors.finish()?;

    Ok(NewApplication {
        name,
        mobile,
        categories,
        address,
        latitude,
        longitude,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raju_form() -> ApplicationForm {
        ApplicationForm {
            name: Some(" Raju's Stall ".to_string()),
            mobile: Some("9876543210".to_string()),
            categories: Some(r#"["Street Food", " street food ", "Chaat"]"#.to_string()),
            address: Some("MG Road".to_string()),
            latitude: Some("19.07".to_string()),
            longitude: Some("72.87".to_string()),
        }
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("Asha Rao").is_ok());
        assert!(validate_username("Meera").is_ok());
        assert!(validate_username("Ab Cd").is_err());
        assert!(validate_username("asha_rao").is_err());
        assert!(validate_username("Asha 2").is_err());
        assert!(validate_username("   ").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("asha@example.com").is_ok());
        assert!(validate_email(" asha.rao+food@mail.example.in ").is_ok());
        assert!(validate_email("asha@example").is_err());
        assert!(validate_email("asha.example.com").is_err());
        assert!(validate_email("").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("Masala@123").is_ok());
        assert!(validate_password("Ma@1").is_err());
        assert!(validate_password("masala@123").is_err());
        assert!(validate_password("Masala@abc").is_err());
        assert!(validate_password("Masala1234").is_err());
    }

    #[test]
    fn test_validate_mobile() {
        assert!(validate_mobile("9876543210").is_ok());
        assert!(validate_mobile("98765").is_err());
        assert!(validate_mobile("98765432IO").is_err());
        assert!(validate_mobile("").is_err());
    }

    #[test]
    fn test_parse_category_list() {
        assert_eq!(
            parse_category_list(r#"["Biryani", "biryani ", "Kebabs"]"#).unwrap(),
            vec!["Biryani", "Kebabs"]
        );
        assert!(parse_category_list("[]").is_err());
        assert!(parse_category_list(r#"["  "]"#).is_err());
        assert!(parse_category_list("Biryani").is_err());
        assert!(parse_category_list("").is_err());
    }

    #[test]
    fn test_validate_coordinate() {
        assert!(validate_coordinate("19.07", "Latitude", 90.0).is_ok());
        assert!(validate_coordinate("-90", "Latitude", 90.0).is_ok());
        assert!(validate_coordinate("90.5", "Latitude", 90.0).is_err());
        assert!(validate_coordinate("-180.0", "Longitude", 180.0).is_ok());
        assert!(validate_coordinate("NaN", "Longitude", 180.0).is_err());
        assert!(validate_coordinate("1e2", "Longitude", 180.0).is_err());
        assert!(validate_coordinate("", "Longitude", 180.0).is_err());
    }

    #[test]
    fn test_validate_banner() {
        let png = b"\x89PNG\r\n\x1a\n0000";
        assert_eq!(validate_banner(png, 4096), Ok(ImageFormat::Png));
        assert!(validate_banner(b"%PDF-1.7", 4096).is_err());
        assert!(validate_banner(b"<html><script>alert(1)</script>", 4096).is_err());
        assert!(validate_banner(&[0x89; 8192], 4096).is_err());
        assert!(validate_banner(b"", 4096).is_err());
    }

    #[test]
    fn test_validate_application_normalizes() {
        let app = validate_application(&raju_form()).unwrap();
        assert_eq!(app.name, "Raju's Stall");
        assert_eq!(app.categories, vec!["Street Food", "Chaat"]);
        assert_eq!(app.latitude, "19.07");
    }

    #[test]
    fn test_validate_application_collects_all_fields() {
        let err = validate_application(&ApplicationForm::default()).unwrap_err();
        assert!(err.message().contains("6 fields"));
    }

    #[test]
    fn test_validate_signup() {
        let ok = SignupRequest {
            username: "Asha Rao".to_string(),
            email: "asha@example.com".to_string(),
            password: "Masala@123".to_string(),
        };
        assert!(validate_signup(&ok).is_ok());

        let bad = SignupRequest {
            password: "short".to_string(),
            ..ok
        };
        assert_eq!(
            validate_signup(&bad).unwrap_err().message(),
            "Password must be at least 8 characters"
        );
    }
}
