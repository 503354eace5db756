use std::{borrow::Cow, collections::BTreeMap};

use axum::{
    body::Bytes,
    extract::multipart::{Field, Multipart},
    http::StatusCode,
};
use serde::{Deserialize, Deserializer, Serialize, de::IntoDeserializer};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{ValidationError, ValidationErrors};

use crate::{
    error::{AppError, AppResult},
    models::{ApprovalStatus, Category, Product, ProductWithCategory},
    storage::ImageKind,
};

/// `max:2048` in kilobytes.
pub const MAX_IMAGE_BYTES: usize = 2048 * 1024;
pub const MIN_NAME_CHARS: usize = 3;

/// Which presentation the client should render for a product listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CatalogView {
    /// Shopper-facing product cards.
    Card,
    /// Management table.
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct ApprovalCounts {
    pub pending: u64,
    pub approved: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductCatalog {
    pub view: CatalogView,
    pub items: Vec<ProductWithCategory>,
    pub approve: Option<ApprovalStatus>,
    pub counts: Option<ApprovalCounts>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductDetail {
    pub product: ProductWithCategory,
    pub related: Vec<Product>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateProductForm {
    pub categories: Vec<Category>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EditProductForm {
    pub product: ProductWithCategory,
    pub categories: Vec<Category>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProductListQuery {
    /// Blank means no filter.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub approve: Option<ApprovalStatus>,
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<ApprovalStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => ApprovalStatus::deserialize(value.into_deserializer()).map(Some),
    }
}

/// Multipart body accepted by store and update. Documentation only; the
/// handlers read the raw multipart stream into [`ProductForm`].
#[derive(Debug, ToSchema)]
pub struct ProductUpload {
    pub category: String,
    pub name: String,
    pub price: i64,
    pub sale_price: i64,
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: String,
    /// At most `MAX_IMAGE_BYTES + 1` bytes; anything past that is dropped.
    pub bytes: Bytes,
    /// The part was larger than `MAX_IMAGE_BYTES` or was cut off by the body limit.
    pub oversized: bool,
}

/// Whether the form must carry an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRule {
    Required,
    Optional,
}

/// Raw product form as submitted, before any rule has been applied.
#[derive(Debug, Clone, Default)]
pub struct ProductForm {
    pub category: Option<String>,
    pub name: Option<String>,
    pub price: Option<String>,
    pub sale_price: Option<String>,
    pub image: Option<UploadedImage>,
}

#[derive(Debug, Clone)]
pub struct ValidImage {
    pub kind: ImageKind,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub struct ValidProductForm {
    pub category_id: Uuid,
    pub name: String,
    pub price: i64,
    pub sale_price: i64,
    pub image: Option<ValidImage>,
}

impl ProductForm {
    pub async fn from_multipart(multipart: &mut Multipart) -> AppResult<Self> {
        let mut form = ProductForm::default();
        while let Some(mut field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "image" {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let part = read_image_part(&mut field).await?;
                // Browsers send an empty part when the file input is left blank.
                if !file_name.is_empty() || !part.bytes.is_empty() || part.oversized {
                    form.image = Some(UploadedImage {
                        file_name,
                        bytes: part.bytes,
                        oversized: part.oversized,
                    });
                }
                if part.cut_off {
                    // The rest of the body is unreadable past the limit.
                    break;
                }
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(format!("invalid field {name}: {e}")))?;
            match name.as_str() {
                "category" => form.category = Some(value),
                "name" => form.name = Some(value),
                "price" => form.price = Some(value),
                "sale_price" => form.sale_price = Some(value),
                _ => {}
            }
        }
        Ok(form)
    }

    /// Text fields as submitted, echoed back when the form is rejected.
    pub fn input(&self) -> BTreeMap<String, String> {
        [
            ("category", &self.category),
            ("name", &self.name),
            ("price", &self.price),
            ("sale_price", &self.sale_price),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_string(), v.clone())))
        .collect()
    }

    pub fn validate(&self, image_rule: ImageRule) -> Result<ValidProductForm, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let category_id = match present(&self.category) {
            None => {
                errors.add("category", required("category"));
                None
            }
            Some(raw) => match Uuid::parse_str(raw) {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.add("category", invalid_category());
                    None
                }
            },
        };

        let name = match present(&self.name) {
            None => {
                errors.add("name", required("name"));
                None
            }
            Some(raw) if raw.chars().count() < MIN_NAME_CHARS => {
                errors.add(
                    "name",
                    field_error(
                        "min",
                        format!("The name must be at least {MIN_NAME_CHARS} characters."),
                    ),
                );
                None
            }
            Some(raw) => Some(raw.to_string()),
        };

        let price = integer_field(&mut errors, "price", &self.price);
        let sale_price = integer_field(&mut errors, "sale_price", &self.sale_price);

        let image = match (&self.image, image_rule) {
            (None, ImageRule::Required) => {
                errors.add("image", required("image"));
                None
            }
            (None, ImageRule::Optional) => None,
            (Some(upload), _) => check_image(&mut errors, upload),
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        match (category_id, name, price, sale_price) {
            (Some(category_id), Some(name), Some(price), Some(sale_price)) => {
                Ok(ValidProductForm {
                    category_id,
                    name,
                    price,
                    sale_price,
                    image,
                })
            }
            // Every missing value above recorded an error.
            _ => Err(errors),
        }
    }
}

struct ImagePart {
    bytes: Bytes,
    oversized: bool,
    cut_off: bool,
}

/// Reads an image part without buffering more than `MAX_IMAGE_BYTES + 1`
/// bytes. Hitting the request body limit inside the part counts as oversized.
async fn read_image_part(field: &mut Field<'_>) -> AppResult<ImagePart> {
    let mut buf = Vec::new();
    let mut oversized = false;
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                if oversized {
                    continue;
                }
                let room = MAX_IMAGE_BYTES + 1 - buf.len();
                if chunk.len() >= room {
                    buf.extend_from_slice(&chunk[..room]);
                    oversized = true;
                } else {
                    buf.extend_from_slice(&chunk);
                }
            }
            Ok(None) => {
                return Ok(ImagePart {
                    bytes: Bytes::from(buf),
                    oversized,
                    cut_off: false,
                });
            }
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                return Ok(ImagePart {
                    bytes: Bytes::from(buf),
                    oversized: true,
                    cut_off: true,
                });
            }
            Err(e) => return Err(AppError::BadRequest(format!("invalid image upload: {e}"))),
        }
    }
}

pub fn invalid_category() -> ValidationError {
    field_error("exists", "The selected category is invalid.")
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn integer_field(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: &Option<String>,
) -> Option<i64> {
    let Some(raw) = present(value) else {
        errors.add(field, required(field));
        return None;
    };
    match raw.parse::<i64>() {
        Ok(n) => Some(n),
        Err(_) => {
            errors.add(
                field,
                field_error("integer", format!("The {} must be an integer.", label(field))),
            );
            None
        }
    }
}

fn check_image(errors: &mut ValidationErrors, upload: &UploadedImage) -> Option<ValidImage> {
    let mut ok = true;

    if upload.bytes.is_empty() && !upload.oversized {
        errors.add("image", field_error("uploaded", "The image failed to upload."));
        return None;
    }

    let kind = ImageKind::detect(&upload.bytes);
    if kind.is_none() {
        if image::guess_format(&upload.bytes).is_err() {
            errors.add("image", field_error("image", "The image must be an image."));
        }
        errors.add(
            "image",
            field_error("mimes", "The image must be a file of type: jpeg, png, jpg."),
        );
        ok = false;
    }

    if upload.oversized || upload.bytes.len() > MAX_IMAGE_BYTES {
        errors.add(
            "image",
            field_error(
                "max",
                format!(
                    "The image must not be greater than {} kilobytes.",
                    MAX_IMAGE_BYTES / 1024
                ),
            ),
        );
        ok = false;
    }

    match kind {
        Some(kind) if ok => Some(ValidImage {
            kind,
            bytes: upload.bytes.clone(),
        }),
        _ => None,
    }
}

fn required(field: &str) -> ValidationError {
    field_error("required", format!("The {} field is required.", label(field)))
}

fn label(field: &str) -> String {
    field.replace('_', " ")
}

fn field_error(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}
