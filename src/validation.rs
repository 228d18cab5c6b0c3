//! Input validation for every entity the API accepts.
//!
//! Each `validate_*` function checks one request shape in full and returns
//! either the normalized value (trimmed, lowercased where relevant) or every
//! field issue found, so clients can show all problems at once.

use email_address::EmailAddress;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::models::{
    ChangePasswordRequest, CreatePostRequest, Location, RegisterRequest, UpdatePostRequest,
    UpdateProfileRequest,
};

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 30;
pub const PASSWORD_MIN: usize = 6;
pub const FULL_NAME_MIN: usize = 2;
pub const FULL_NAME_MAX: usize = 100;
pub const BIO_MAX: usize = 500;
pub const PROFILE_LOCATION_MAX: usize = 100;
pub const WEBSITE_MAX: usize = 200;
pub const CAPTION_MAX: usize = 2000;
pub const TAG_MAX: usize = 50;
pub const LOCATION_NAME_MAX: usize = 200;
pub const COMMENT_MAX: usize = 1000;
pub const REPLY_MAX: usize = 500;
pub const SEARCH_MIN: usize = 2;

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

/// Detailed validation failure for a single field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// All issues found while validating one request.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{}", first_message(.issues))]
pub struct ValidationErrors {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationErrors {
    pub fn single(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            issues: vec![ValidationIssue::new(field, code, message)],
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.issues.iter().any(|i| i.field == field)
    }
}

fn first_message(issues: &[ValidationIssue]) -> String {
    issues
        .first()
        .map(|i| i.message.clone())
        .unwrap_or_else(|| "Validation error".to_string())
}

pub type ValidationResult<T> = Result<T, ValidationErrors>;

/// Accumulates issues, then converts to a result.
#[derive(Default)]
struct Collector {
    issues: Vec<ValidationIssue>,
}

impl Collector {
    fn push(&mut self, field: &str, code: &str, message: &str) {
        self.issues.push(ValidationIssue::new(field, code, message));
    }

    fn check(&mut self, ok: bool, field: &str, code: &str, message: &str) {
        if !ok {
            self.push(field, code, message);
        }
    }

    fn finish<T>(self, value: T) -> ValidationResult<T> {
        if self.issues.is_empty() {
            Ok(value)
        } else {
            Err(ValidationErrors { issues: self.issues })
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn length_between(s: &str, min: usize, max: usize) -> bool {
    let n = char_len(s);
    n >= min && n <= max
}

pub fn is_valid_username(value: &str) -> bool {
    length_between(value, USERNAME_MIN, USERNAME_MAX) && USERNAME_RE.is_match(value)
}

pub fn is_valid_email(value: &str) -> bool {
    EmailAddress::is_valid(value)
}

pub fn is_valid_website(value: &str) -> bool {
    match Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host().is_some(),
        Err(_) => false,
    }
}

// ==================== Accounts ====================

#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
}

pub fn validate_registration(req: &RegisterRequest) -> ValidationResult<NewAccount> {
    let mut c = Collector::default();
    let username = req.username.trim();
    let email = req.email.trim().to_lowercase();
    let full_name = req.full_name.trim();

    c.check(
        is_valid_username(username),
        "username",
        "invalid_username",
        "Username must be 3-30 characters and contain only letters, numbers, and underscores",
    );
    c.check(is_valid_email(&email), "email", "invalid_email", "Please provide a valid email");
    c.check(
        char_len(&req.password) >= PASSWORD_MIN,
        "password",
        "too_short",
        "Password must be at least 6 characters long",
    );
    c.check(
        length_between(full_name, FULL_NAME_MIN, FULL_NAME_MAX),
        "fullName",
        "length",
        "Full name must be 2-100 characters long",
    );

    c.finish(NewAccount {
        username: username.to_string(),
        email,
        password: req.password.clone(),
        full_name: full_name.to_string(),
    })
}

/// Login only checks presence; credentials are verified by the account service.
pub fn validate_login(email: &str, password: &str) -> ValidationResult<String> {
    let mut c = Collector::default();
    let email = email.trim().to_lowercase();
    c.check(is_valid_email(&email), "email", "invalid_email", "Please provide a valid email");
    c.check(!password.trim().is_empty(), "password", "required", "Password is required");
    c.finish(email)
}

pub fn validate_profile_update(req: &UpdateProfileRequest) -> ValidationResult<()> {
    let mut c = Collector::default();
    if let Some(name) = &req.full_name {
        c.check(
            length_between(name.trim(), FULL_NAME_MIN, FULL_NAME_MAX),
            "fullName",
            "length",
            "Full name must be 2-100 characters long",
        );
    }
    if let Some(bio) = &req.bio {
        c.check(
            char_len(bio.trim()) <= BIO_MAX,
            "bio",
            "too_long",
            "Bio must not exceed 500 characters",
        );
    }
    if let Some(location) = &req.location {
        c.check(
            char_len(location.trim()) <= PROFILE_LOCATION_MAX,
            "location",
            "too_long",
            "Location must not exceed 100 characters",
        );
    }
    if let Some(website) = &req.website {
        let website = website.trim();
        if !website.is_empty() {
            c.check(
                char_len(website) <= WEBSITE_MAX && is_valid_website(website),
                "website",
                "invalid_url",
                "Please provide a valid website URL",
            );
        }
    }
    c.finish(())
}

pub fn validate_password_change(req: &ChangePasswordRequest) -> ValidationResult<()> {
    let mut c = Collector::default();
    c.check(
        !req.current_password.trim().is_empty(),
        "currentPassword",
        "required",
        "Current password is required",
    );
    c.check(
        char_len(&req.new_password) >= PASSWORD_MIN,
        "newPassword",
        "too_short",
        "New password must be at least 6 characters long",
    );
    c.finish(())
}

// ==================== Posts ====================

#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub image: String,
    pub caption: String,
    pub location: Option<Location>,
    pub tags: Vec<String>,
}

/// Field changes accepted for an existing post. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostChanges {
    pub caption: Option<String>,
    pub location: Option<Option<Location>>,
    pub tags: Option<Vec<String>>,
    pub is_archived: Option<bool>,
    pub is_private: Option<bool>,
}

fn check_caption(c: &mut Collector, caption: &str) {
    c.check(
        length_between(caption, 1, CAPTION_MAX),
        "caption",
        "length",
        "Caption must be 1-2000 characters long",
    );
}

/// Parses the location JSON string. An empty string means "no location".
fn parse_location(c: &mut Collector, raw: &str) -> Option<Location> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "null" {
        return None;
    }
    let location: Location = match serde_json::from_str(raw) {
        Ok(l) => l,
        Err(_) => {
            c.push("location", "invalid_json", "Location must be valid JSON");
            return None;
        }
    };
    if let Some(name) = &location.name {
        c.check(
            char_len(name) <= LOCATION_NAME_MAX,
            "location",
            "too_long",
            "Location name must not exceed 200 characters",
        );
    }
    if let Some(point) = &location.coordinates {
        let [lng, lat] = point.coordinates;
        c.check(
            point.kind == "Point" && (-180.0..=180.0).contains(&lng) && (-90.0..=90.0).contains(&lat),
            "location",
            "invalid_coordinates",
            "Location coordinates must be [longitude, latitude]",
        );
    }
    Some(location)
}

/// Splits a comma-separated tag list, trimming entries and dropping empty ones.
fn parse_tags(c: &mut Collector, raw: &str) -> Vec<String> {
    let tags: Vec<String> = raw
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if tags.iter().any(|t| char_len(t) > TAG_MAX) {
        c.push("tags", "too_long", "Each tag must not exceed 50 characters");
    }
    tags
}

pub fn validate_new_post(req: &CreatePostRequest) -> ValidationResult<NewPost> {
    let mut c = Collector::default();
    let image = req.image.trim();
    let caption = req.caption.trim();

    c.check(!image.is_empty(), "image", "required", "Image is required");
    check_caption(&mut c, caption);
    let location = req.location.as_deref().and_then(|raw| parse_location(&mut c, raw));
    let tags = req.tags.as_deref().map(|raw| parse_tags(&mut c, raw)).unwrap_or_default();

    c.finish(NewPost {
        image: image.to_string(),
        caption: caption.to_string(),
        location,
        tags,
    })
}

pub fn validate_post_update(req: &UpdatePostRequest) -> ValidationResult<PostChanges> {
    let mut c = Collector::default();
    let caption = req.caption.as_deref().map(|raw| {
        let caption = raw.trim();
        check_caption(&mut c, caption);
        caption.to_string()
    });
    let location = req.location.as_deref().map(|raw| parse_location(&mut c, raw));
    let tags = req.tags.as_deref().map(|raw| parse_tags(&mut c, raw));

    c.finish(PostChanges {
        caption,
        location,
        tags,
        is_archived: req.is_archived,
        is_private: req.is_private,
    })
}

// ==================== Comments ====================

pub fn validate_comment(content: &str) -> ValidationResult<String> {
    let mut c = Collector::default();
    let content = content.trim();
    c.check(
        length_between(content, 1, COMMENT_MAX),
        "content",
        "length",
        "Comment must be 1-1000 characters long",
    );
    c.finish(content.to_string())
}

pub fn validate_reply(content: &str) -> ValidationResult<String> {
    let mut c = Collector::default();
    let content = content.trim();
    c.check(
        length_between(content, 1, REPLY_MAX),
        "content",
        "length",
        "Reply must be 1-500 characters long",
    );
    c.finish(content.to_string())
}

// ==================== Search ====================

pub fn validate_search_query(q: Option<&str>) -> ValidationResult<String> {
    let q = q.unwrap_or("").trim();
    if char_len(q) < SEARCH_MIN {
        return Err(ValidationErrors::single(
            "q",
            "too_short",
            "Search query must be at least 2 characters",
        ));
    }
    Ok(q.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(username: &str, email: &str, password: &str, full_name: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            full_name: full_name.to_string(),
        }
    }

    #[test]
    fn test_registration_normalizes_email() {
        let account = validate_registration(&registration("jane_doe", "  Jane@Example.COM ", "secret1", " Jane Doe "))
            .unwrap();
        assert_eq!(account.email, "jane@example.com");
        assert_eq!(account.full_name, "Jane Doe");
    }

    #[test]
    fn test_registration_reports_every_field() {
        let err = validate_registration(&registration("ab", "nope", "123", "J")).unwrap_err();
        assert_eq!(err.issues.len(), 4);
        assert!(err.has_field("username"));
        assert!(err.has_field("email"));
        assert!(err.has_field("password"));
        assert!(err.has_field("fullName"));
    }

    #[test]
    fn test_username_rules() {
        assert!(is_valid_username("abc"));
        assert!(is_valid_username("user_123"));
        assert!(!is_valid_username("has space"));
        assert!(!is_valid_username("dash-name"));
        assert!(!is_valid_username(&"a".repeat(31)));
    }

    #[test]
    fn test_new_post_parses_tags_and_location() {
        let req = CreatePostRequest {
            image: "https://cdn.example.com/a.jpg".to_string(),
            caption: "  Sunset  ".to_string(),
            location: Some(r#"{"name":"Beach","coordinates":{"type":"Point","coordinates":[-122.4,37.8]}}"#.to_string()),
            tags: Some("sunset, beach,, ocean ".to_string()),
        };
        let post = validate_new_post(&req).unwrap();
        assert_eq!(post.caption, "Sunset");
        assert_eq!(post.tags, vec!["sunset", "beach", "ocean"]);
        let location = post.location.unwrap();
        assert_eq!(location.name.as_deref(), Some("Beach"));
        assert_eq!(location.coordinates.unwrap().coordinates, [-122.4, 37.8]);
    }

    #[test]
    fn test_new_post_rejects_bad_input() {
        let req = CreatePostRequest {
            image: String::new(),
            caption: "   ".to_string(),
            location: Some("{not json".to_string()),
            tags: Some("x".repeat(51)),
        };
        let err = validate_new_post(&req).unwrap_err();
        assert!(err.has_field("image"));
        assert!(err.has_field("caption"));
        assert!(err.has_field("location"));
        assert!(err.has_field("tags"));
    }

    #[test]
    fn test_caption_length_limit() {
        let req = CreatePostRequest {
            image: "img".to_string(),
            caption: "x".repeat(2001),
            ..Default::default()
        };
        assert!(validate_new_post(&req).is_err());
    }

    #[test]
    fn test_comment_bounds() {
        assert_eq!(validate_comment("  hi  ").unwrap(), "hi");
        assert!(validate_comment("   ").is_err());
        assert!(validate_comment(&"c".repeat(1001)).is_err());
        assert!(validate_reply(&"r".repeat(501)).is_err());
    }

    #[test]
    fn test_search_query_minimum() {
        assert!(validate_search_query(None).is_err());
        assert!(validate_search_query(Some(" a ")).is_err());
        assert_eq!(validate_search_query(Some(" ab ")).unwrap(), "ab");
    }

    #[test]
    fn test_profile_update_website() {
        let ok = UpdateProfileRequest {
            website: Some("https://jane.dev".to_string()),
            ..Default::default()
        };
        assert!(validate_profile_update(&ok).is_ok());

        let bad = UpdateProfileRequest {
            website: Some("ftp://jane.dev".to_string()),
            bio: Some("b".repeat(501)),
            ..Default::default()
        };
        let err = validate_profile_update(&bad).unwrap_err();
        assert!(err.has_field("website"));
        assert!(err.has_field("bio"));
    }
}
