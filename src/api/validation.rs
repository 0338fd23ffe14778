//! Input validation for API requests.
//!
//! `validate_*` functions check a single value and return the message to show
//! for that field. `parse_*` functions also convert it. Use the
//! `ValidationErrorBuilder` from the `error` module to collect several.

use lazy_static::lazy_static;
use regex::Regex;

use crate::db::{parse_date, Role, MAX_PRICE, PREMIUM_DURATIONS, SUPPORTED_CITIES};

lazy_static! {
    /// Pragmatic email shape check (local@domain.tld)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$"
    ).unwrap();

    /// Hex colors: #RGB or #RRGGBB
    static ref COLOR_REGEX: Regex = Regex::new(
        r"^#([0-9a-fA-F]{3}|[0-9a-fA-F]{6})$"
    ).unwrap();
}

/// Image types accepted for listing photos
const IMAGE_EXTENSIONS: [&str; 3] = ["jpeg", "jpg", "png"];

/// Validate a required text field with a maximum length in characters
pub fn validate_text(value: &str, field: &str, max: usize) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("The {} field is required.", field));
    }
    if value.chars().count() > max {
        return Err(format!(
            "The {} may not be greater than {} characters.",
            field, max
        ));
    }
    Ok(())
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("The email field is required.".to_string());
    }
    if email.len() > 255 {
        return Err("The email may not be greater than 255 characters.".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("The email must be a valid email address.".to_string());
    }
    Ok(())
}

/// Validate a password against the minimum length
pub fn validate_password(password: &str, min: usize) -> Result<(), String> {
    if password.is_empty() {
        return Err("The password field is required.".to_string());
    }
    if password.chars().count() < min {
        return Err(format!("The password must be at least {} characters.", min));
    }
    Ok(())
}

/// Validate that the confirmation repeats the password
pub fn validate_password_confirmation(password: &str, confirmation: &str) -> Result<(), String> {
    if password != confirmation {
        return Err("The password confirmation does not match.".to_string());
    }
    Ok(())
}

/// Parse the account role
pub fn parse_role(role: &str) -> Result<Role, String> {
    if role.trim().is_empty() {
        return Err("The role field is required.".to_string());
    }
    role.parse()
        .map_err(|_| "The selected role is invalid.".to_string())
}

/// Validate a listing city
pub fn validate_city(city: &str) -> Result<(), String> {
    if city.is_empty() {
        return Err("The city field is required.".to_string());
    }
    if !SUPPORTED_CITIES.contains(&city) {
        return Err(format!(
            "The selected city is invalid. Supported cities: {}.",
            SUPPORTED_CITIES.join(", ")
        ));
    }
    Ok(())
}

/// Validate a hex color
pub fn validate_color(color: &str) -> Result<(), String> {
    if color.is_empty() {
        return Err("The color field is required.".to_string());
    }
    if !COLOR_REGEX.is_match(color) {
        return Err("The color must be a hex color such as #FF0000.".to_string());
    }
    Ok(())
}

/// Parse a listing price
pub fn parse_price(price: &str) -> Result<f64, String> {
    let price = price.trim();
    if price.is_empty() {
        return Err("The price field is required.".to_string());
    }
    match price.parse::<f64>() {
        Ok(p) if p.is_finite() && (0.0..=MAX_PRICE).contains(&p) => Ok(p),
        Ok(_) => Err(format!("The price must be between 0 and {}.", MAX_PRICE)),
        Err(_) => Err("The price must be a number.".to_string()),
    }
}

/// Parse a form boolean (true/false, 1/0, on/off, yes/no). Empty means false.
pub fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "" | "0" | "false" | "off" | "no" => Ok(false),
        "1" | "true" | "on" | "yes" => Ok(true),
        _ => Err("The field must be true or false.".to_string()),
    }
}

/// Parse the premium duration. Required when premium, dropped otherwise.
pub fn parse_premium_duration(premium: bool, value: Option<&str>) -> Result<Option<i64>, String> {
    if !premium {
        return Ok(None);
    }
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err("The premium duration is required for premium listings.".to_string());
    }
    match value.parse::<i64>() {
        Ok(days) if PREMIUM_DURATIONS.contains(&days) => Ok(Some(days)),
        _ => Err(format!(
            "The premium duration must be one of: {}.",
            PREMIUM_DURATIONS
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }
}

/// Parse a booking date (YYYY-MM-DD)
pub fn parse_booking_date(date: &str) -> Result<chrono::NaiveDate, String> {
    if date.trim().is_empty() {
        return Err("The date field is required.".to_string());
    }
    parse_date(date).ok_or_else(|| "The date must be a valid date (YYYY-MM-DD).".to_string())
}

/// Work out the stored extension of an uploaded image from its file name,
/// falling back to the declared content type
pub fn image_extension(file_name: Option<&str>, content_type: Option<&str>) -> Result<String, String> {
    let from_name = file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));
    if let Some(ext) = from_name {
        return Ok(ext);
    }

    let from_mime = content_type
        .and_then(|ct| mime_guess::get_mime_extensions_str(ct))
        .and_then(|exts| {
            exts.iter()
                .find(|ext| IMAGE_EXTENSIONS.contains(*ext))
                .map(|ext| ext.to_string())
        });
    from_mime.ok_or_else(|| "Each image must be a file of type: jpeg, jpg, png.".to_string())
}

/// Validate the size of an uploaded image
pub fn validate_image_size(size: usize, max_bytes: usize) -> Result<(), String> {
    if size == 0 {
        return Err("Uploaded images may not be empty.".to_string());
    }
    if size > max_bytes {
        return Err(format!(
            "Each image may not be greater than {} kilobytes.",
            max_bytes / 1024
        ));
    }
    Ok(())
}
