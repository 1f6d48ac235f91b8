//! Field rules shared by services and adapters.

use std::net::IpAddr;

use crate::errors::{DomainError, Result};

pub const TITLE_MAX: usize = 255;
pub const POST_DESCRIPTION_MAX: usize = 500;
pub const CATEGORY_DESCRIPTION_MAX: usize = 300;
pub const COMMENT_MAX: usize = 3000;
pub const BIO_MAX: usize = 500;
pub const NAME_MAX: usize = 100;
pub const USERNAME_MAX: usize = 150;
pub const EMAIL_MAX: usize = 254;
pub const TAG_MAX: usize = 100;
pub const PASSWORD_MIN: usize = 8;

/// Accepted upload extensions for images.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "gif"];

/// Lengths are counted in characters, not bytes.
pub fn max_chars(field: &'static str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len > max {
        return Err(DomainError::validation(
            field,
            format!("at most {max} characters allowed, got {len}"),
        ));
    }
    Ok(())
}

pub fn required(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(field, "this field is required"));
    }
    Ok(())
}

/// Letters, digits and `@.+-_`, 1 to 150 characters.
pub fn username(value: &str) -> Result<()> {
    required("username", value)?;
    max_chars("username", value, USERNAME_MAX)?;
    let valid = value
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));
    if !valid {
        return Err(DomainError::validation(
            "username",
            "only letters, digits and @/./+/-/_ are allowed",
        ));
    }
    Ok(())
}

/// A pragmatic shape check: one `@`, non-empty local part, a dotted domain
/// and no whitespace.
pub fn email(value: &str) -> Result<()> {
    required("email", value)?;
    max_chars("email", value, EMAIL_MAX)?;
    let invalid = || DomainError::validation("email", "enter a valid email address");
    let (local, domain) = value.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || value.chars().any(char::is_whitespace)
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(invalid());
    }
    Ok(())
}

/// Emails are unique case-insensitively; this is the stored comparison form.
pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn password(value: &str, confirmation: &str) -> Result<()> {
    if value != confirmation {
        return Err(DomainError::validation(
            "password_confirmation",
            "the two password fields didn't match",
        ));
    }
    if value.chars().count() < PASSWORD_MIN {
        return Err(DomainError::validation(
            "password",
            format!("must contain at least {PASSWORD_MIN} characters"),
        ));
    }
    if value.chars().all(|c| c.is_ascii_digit()) {
        return Err(DomainError::validation("password", "can't be entirely numeric"));
    }
    Ok(())
}

pub fn ip_address(value: &str) -> Result<IpAddr> {
    value
        .trim()
        .parse()
        .map_err(|_| DomainError::validation("ip_address", format!("`{value}` is not an IP address")))
}

/// Lowercased extension of `file_name` if it is an accepted image type.
pub fn image_extension(file_name: &str) -> Result<String> {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(DomainError::validation(
            "file",
            format!(
                "extension `{ext}` is not allowed; allowed: {}",
                IMAGE_EXTENSIONS.join(", ")
            ),
        ))
    }
}

/// Trims labels, drops empty ones and removes exact duplicates while
/// keeping first-seen order.
pub fn normalize_tags(tags: &[String]) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        max_chars("tags", tag, TAG_MAX)?;
        if !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rules() {
        assert!(username("alice_01").is_ok());
        assert!(username("a.b+c-d@e").is_ok());
        assert!(username("").is_err());
        assert!(username("has space").is_err());
        assert!(username(&"x".repeat(151)).is_err());
    }

    #[test]
    fn test_email_shape() {
        assert!(email("a@x.com").is_ok());
        assert!(email("a@x").is_err());
        assert!(email("@x.com").is_err());
        assert!(email("a b@x.com").is_err());
        assert!(email("a@@x.com").is_err());
        assert_eq!(normalize_email(" A@X.com "), "a@x.com");
    }

    #[test]
    fn test_password_rules() {
        assert!(password("correct horse", "correct horse").is_ok());
        assert!(matches!(
            password("correct horse", "correct house"),
            Err(DomainError::Validation { field: "password_confirmation", .. })
        ));
        assert!(password("short", "short").is_err());
        assert!(password("12345678", "12345678").is_err());
    }

    #[test]
    fn test_lengths_count_characters() {
        assert!(max_chars("bio", &"я".repeat(500), BIO_MAX).is_ok());
        assert!(max_chars("bio", &"я".repeat(501), BIO_MAX).is_err());
    }

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension("Photo.JPG").unwrap(), "jpg");
        assert!(image_extension("script.exe").is_err());
        assert!(image_extension("noext").is_err());
    }

    #[test]
    fn test_ip_address_parsing() {
        assert_eq!(ip_address("1.2.3.4").unwrap().to_string(), "1.2.3.4");
        assert_eq!(ip_address("::1").unwrap().to_string(), "::1");
        assert!(ip_address("1.2.3").is_err());
    }

    #[test]
    fn test_normalize_tags() {
        let tags = vec![" rust ".into(), "".into(), "rust".into(), "Rust".into()];
        assert_eq!(normalize_tags(&tags).unwrap(), vec!["rust", "Rust"]);
    }
}
