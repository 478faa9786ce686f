//! Form parsing and validation.
//!
//! Every form is checked here before the API sees it. Failures come back as
//! [`FieldErrors`] keyed by input name so templates can show each message
//! next to its field; API validation errors are merged into the same map.

use std::collections::BTreeMap;

use axum::extract::Multipart;
use bookswap_core::{Book, BookCondition, CategoryId, Email, Price, ShippingAddress};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::api::{ApiError, ImageUpload, ListingInput, ReviewInput};
use crate::error::AppError;

/// Per-field error messages. The `form` key holds errors not tied to a field.
pub type FieldErrors = BTreeMap<&'static str, String>;

/// Key for errors that belong to the whole form.
pub const FORM: &str = "form";

/// Most images a listing may carry.
pub const MAX_IMAGES: usize = 5;
/// Largest accepted image file.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
/// Request body limit for listing uploads.
pub const MAX_LISTING_BODY: usize = MAX_IMAGES * MAX_IMAGE_BYTES + 1024 * 1024;

const MAX_PRICE: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Copy API field errors into `errors`, keeping only `fields` this form
/// renders; the rest are folded into the form-level message.
pub fn merge_api_errors(errors: &mut FieldErrors, api: &ApiError, fields: &[&'static str]) {
    let mut unplaced = Vec::new();
    for (field, message) in api.first_field_errors() {
        match fields.iter().find(|known| **known == field) {
            Some(known) => {
                errors.entry(*known).or_insert(message);
            }
            None => unplaced.push(message),
        }
    }
    if !unplaced.is_empty() || errors.is_empty() {
        let message = if unplaced.is_empty() {
            api.user_message()
        } else {
            unplaced.join(" ")
        };
        errors.entry(FORM).or_insert(message);
    }
}

fn char_len(value: &str) -> usize {
    value.chars().count()
}

fn check_length(
    errors: &mut FieldErrors,
    field: &'static str,
    label: &str,
    value: &str,
    min: usize,
    max: usize,
) {
    let len = char_len(value.trim());
    if len < min {
        let message = if min <= 1 {
            format!("{label} is required")
        } else {
            format!("{label} must be at least {min} characters")
        };
        errors.insert(field, message);
    } else if len > max {
        errors.insert(field, format!("{label} must be at most {max} characters"));
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Auth
// =============================================================================

/// Login form data.
#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    /// Page to return to after login.
    #[serde(default)]
    pub next: Option<String>,
}

impl LoginForm {
    /// Validated, normalized email.
    ///
    /// # Errors
    ///
    /// Returns the field errors if the form is invalid.
    pub fn validate(&self) -> Result<Email, FieldErrors> {
        let mut errors = FieldErrors::new();
        let email = Email::parse(&self.email);
        if let Err(e) = &email {
            errors.insert("email", e.to_string());
        }
        if self.password.is_empty() {
            errors.insert("password", "Password is required".to_string());
        }
        match email {
            Ok(email) if errors.is_empty() => Ok(email),
            _ => Err(errors),
        }
    }
}

/// Registration form data.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirmation: String,
}

impl RegisterForm {
    pub const FIELDS: &'static [&'static str] =
        &["name", "email", "password", "password_confirmation"];

    /// Validated, normalized email.
    ///
    /// # Errors
    ///
    /// Returns the field errors if the form is invalid.
    pub fn validate(&self) -> Result<Email, FieldErrors> {
        let mut errors = FieldErrors::new();
        check_length(&mut errors, "name", "Name", &self.name, 2, 80);

        let email = Email::parse(&self.email);
        if let Err(e) = &email {
            errors.insert("email", e.to_string());
        }

        if char_len(&self.password) < 8 {
            errors.insert("password", "Password must be at least 8 characters".to_string());
        } else if !self.password.chars().any(char::is_alphabetic)
            || !self.password.chars().any(|c| c.is_ascii_digit())
        {
            errors.insert(
                "password",
                "Password must contain a letter and a number".to_string(),
            );
        }
        if self.password != self.password_confirmation {
            errors.insert("password_confirmation", "Passwords do not match".to_string());
        }

        match email {
            Ok(email) if errors.is_empty() => Ok(email),
            _ => Err(errors),
        }
    }
}

// =============================================================================
// Listings
// =============================================================================

/// Listing form as submitted (`multipart/form-data`).
#[derive(Debug, Clone, Default)]
pub struct ListingForm {
    pub title: String,
    pub author: String,
    pub description: String,
    pub isbn: String,
    pub price: String,
    pub condition: String,
    pub category_id: String,
    pub images: Vec<ImageUpload>,
    /// Set when the upload itself was unacceptable (too many or too large files).
    upload_error: Option<(&'static str, String)>,
}

impl ListingForm {
    pub const FIELDS: &'static [&'static str] = &[
        "title",
        "author",
        "description",
        "isbn",
        "price",
        "condition",
        "category_id",
        "images",
    ];

    /// Pre-filled form for editing an existing listing.
    #[must_use]
    pub fn from_book(book: &Book) -> Self {
        Self {
            title: book.title.clone(),
            author: book.author.clone(),
            description: book.description.clone(),
            isbn: book.isbn.clone().unwrap_or_default(),
            price: format!("{:.2}", book.price.amount),
            condition: book.condition.as_str().to_string(),
            category_id: book
                .category
                .as_ref()
                .map(|c| c.id.to_string())
                .unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Read the form from a multipart body.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` if the body is not valid multipart.
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid form data: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "images" {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Invalid upload: {e}")))?;
                // An empty file input still submits a nameless, empty part
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                form.push_image(ImageUpload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(format!("Invalid form data: {e}")))?;
            match name.as_str() {
                "title" => form.title = value,
                "author" => form.author = value,
                "description" => form.description = value,
                "isbn" => form.isbn = value,
                "price" => form.price = value,
                "condition" => form.condition = value,
                "category_id" => form.category_id = value,
                _ => {}
            }
        }
        Ok(form)
    }

    fn push_image(&mut self, image: ImageUpload) {
        if self.upload_error.is_some() {
            return;
        }
        if self.images.len() >= MAX_IMAGES {
            self.upload_error = Some(("images", format!("At most {MAX_IMAGES} images")));
        } else if !image.content_type.starts_with("image/") {
            self.upload_error = Some(("images", format!("{} is not an image", image.file_name)));
        } else if image.bytes.len() > MAX_IMAGE_BYTES {
            self.upload_error = Some((
                "images",
                format!("{} is larger than 5 MB", image.file_name),
            ));
        } else {
            self.images.push(image);
        }
    }

    /// Check every field and build the API payload.
    ///
    /// # Errors
    ///
    /// Returns the field errors if the form is invalid.
    pub fn validate(&self) -> Result<ListingInput, FieldErrors> {
        let mut errors = FieldErrors::new();
        check_length(&mut errors, "title", "Title", &self.title, 1, 200);
        check_length(&mut errors, "author", "Author", &self.author, 1, 120);
        check_length(&mut errors, "description", "Description", &self.description, 0, 5000);

        let price = match validate_price(&self.price) {
            Ok(price) => Some(price),
            Err(message) => {
                errors.insert("price", message);
                None
            }
        };

        let condition = self.condition.parse::<BookCondition>().ok();
        if condition.is_none_or(|c| c == BookCondition::Unknown) {
            errors.insert("condition", "Choose the book's condition".to_string());
        }

        let category = match non_empty(Some(&self.category_id)) {
            None => None,
            Some(raw) => match raw.parse::<i64>() {
                Ok(id) if id > 0 => Some(CategoryId::new(id)),
                _ => {
                    errors.insert("category_id", "Choose a valid category".to_string());
                    None
                }
            },
        };

        let isbn = match non_empty(Some(&self.isbn)) {
            None => None,
            Some(raw) => match normalize_isbn(&raw) {
                Some(isbn) => Some(isbn),
                None => {
                    errors.insert("isbn", "ISBN must have 10 or 13 digits".to_string());
                    None
                }
            },
        };

        if let Some((field, message)) = &self.upload_error {
            errors.insert(*field, message.clone());
        }

        match (price, condition) {
            (Some(price), Some(condition)) if errors.is_empty() => Ok(ListingInput {
                title: self.title.trim().to_string(),
                author: self.author.trim().to_string(),
                description: self.description.trim().to_string(),
                isbn,
                price,
                condition,
                category,
                images: self.images.clone(),
            }),
            _ => Err(errors),
        }
    }
}

/// Positive amount up to 10 000 with at most two decimals.
fn validate_price(raw: &str) -> Result<Price, String> {
    if raw.trim().is_empty() {
        return Err("Price is required".to_string());
    }
    let price = Price::parse_usd(raw).map_err(|_| "Enter a price like 12.50".to_string())?;
    if price.amount <= Decimal::ZERO {
        return Err("Price must be greater than zero".to_string());
    }
    if price.amount > MAX_PRICE {
        return Err("Price must be at most $10,000".to_string());
    }
    if price.amount.normalize().scale() > 2 {
        return Err("Price can have at most two decimals".to_string());
    }
    Ok(price)
}

/// Digits of an ISBN-10/13 with hyphens and spaces removed. ISBN-10 may end
/// in `X`.
fn normalize_isbn(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let valid = match cleaned.len() {
        13 => cleaned.chars().all(|c| c.is_ascii_digit()),
        10 => cleaned
            .char_indices()
            .all(|(i, c)| c.is_ascii_digit() || (i == 9 && c == 'X')),
        _ => false,
    };
    valid.then_some(cleaned)
}

// =============================================================================
// Reviews
// =============================================================================

/// Review form data.
#[derive(Debug, Default, Deserialize)]
pub struct ReviewForm {
    #[serde(default)]
    pub rating: String,
    #[serde(default)]
    pub comment: String,
}

impl ReviewForm {
    pub const FIELDS: &'static [&'static str] = &["rating", "comment"];

    /// # Errors
    ///
    /// Returns the field errors if the form is invalid.
    pub fn validate(&self) -> Result<ReviewInput, FieldErrors> {
        let mut errors = FieldErrors::new();
        let rating = self.rating.trim().parse::<u8>().ok().filter(|r| (1..=5).contains(r));
        if rating.is_none() {
            errors.insert("rating", "Choose a rating from 1 to 5".to_string());
        }
        check_length(&mut errors, "comment", "Comment", &self.comment, 1, 2000);

        match rating {
            Some(rating) if errors.is_empty() => Ok(ReviewInput {
                rating,
                comment: self.comment.trim().to_string(),
            }),
            _ => Err(errors),
        }
    }
}

// =============================================================================
// Shipping
// =============================================================================

/// Shipping address as posted by the checkout page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShippingForm {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl ShippingForm {
    pub const FIELDS: &'static [&'static str] = &[
        "full_name",
        "line1",
        "line2",
        "city",
        "state",
        "postal_code",
        "country",
        "phone",
    ];

    /// # Errors
    ///
    /// Returns the field errors if the form is invalid.
    pub fn validate(&self) -> Result<ShippingAddress, FieldErrors> {
        let mut errors = FieldErrors::new();
        check_length(&mut errors, "full_name", "Full name", &self.full_name, 1, 120);
        check_length(&mut errors, "line1", "Address", &self.line1, 1, 200);
        check_length(&mut errors, "city", "City", &self.city, 1, 100);
        check_length(&mut errors, "state", "State", &self.state, 1, 100);
        check_length(&mut errors, "postal_code", "Postal code", &self.postal_code, 3, 10);
        check_length(&mut errors, "country", "Country", &self.country, 1, 100);

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(ShippingAddress {
            full_name: self.full_name.trim().to_string(),
            line1: self.line1.trim().to_string(),
            line2: non_empty(self.line2.as_deref()),
            city: self.city.trim().to_string(),
            state: self.state.trim().to_string(),
            postal_code: self.postal_code.trim().to_string(),
            country: self.country.trim().to_string(),
            phone: non_empty(self.phone.as_deref()),
        })
    }
}
