use axum::body::Bytes;
use catalog_api::{
    dto::products::{ImageRule, MAX_IMAGE_BYTES, ProductForm, UploadedImage},
    storage::ImageKind,
};
use uuid::Uuid;

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0];
const GIF_MAGIC: &[u8] = b"GIF89a";

fn image(magic: &[u8], len: usize, file_name: &str) -> UploadedImage {
    let mut bytes = magic.to_vec();
    bytes.resize(len.max(magic.len()), 0);
    UploadedImage {
        file_name: file_name.to_string(),
        bytes: Bytes::from(bytes),
        oversized: false,
    }
}

fn valid_form() -> ProductForm {
    ProductForm {
        category: Some(Uuid::new_v4().to_string()),
        name: Some("Widget".into()),
        price: Some("100".into()),
        sale_price: Some("80".into()),
        image: Some(image(JPEG_MAGIC, 512, "widget.jpg")),
    }
}

fn codes(errors: &validator::ValidationErrors, field: &str) -> Vec<String> {
    errors
        .field_errors()
        .get(field)
        .map(|errs| errs.iter().map(|e| e.code.to_string()).collect())
        .unwrap_or_default()
}

#[test]
fn accepts_a_complete_form() {
    let form = valid_form();
    let valid = form.validate(ImageRule::Required).expect("valid form");
    assert_eq!(valid.name, "Widget");
    assert_eq!(valid.price, 100);
    assert_eq!(valid.sale_price, 80);
    assert_eq!(valid.image.expect("image").kind, ImageKind::Jpeg);
}

#[test]
fn png_content_is_stored_as_png() {
    let mut form = valid_form();
    form.image = Some(image(PNG_MAGIC, 64, "picture.jpeg"));
    let valid = form.validate(ImageRule::Required).expect("valid form");
    assert_eq!(valid.image.expect("image").kind.extension(), "png");
}

#[test]
fn missing_fields_are_required() {
    let form = ProductForm::default();
    let errors = form.validate(ImageRule::Required).unwrap_err();
    for field in ["category", "name", "price", "sale_price", "image"] {
        assert_eq!(codes(&errors, field), vec!["required"], "field {field}");
    }
}

#[test]
fn blank_text_counts_as_missing() {
    let mut form = valid_form();
    form.name = Some("   ".into());
    let errors = form.validate(ImageRule::Required).unwrap_err();
    assert_eq!(codes(&errors, "name"), vec!["required"]);
}

#[test]
fn short_name_is_rejected() {
    let mut form = valid_form();
    form.name = Some("ab".into());
    let errors = form.validate(ImageRule::Required).unwrap_err();
    assert_eq!(codes(&errors, "name"), vec!["min"]);
}

#[test]
fn prices_must_be_integers() {
    let mut form = valid_form();
    form.price = Some("12.50".into());
    form.sale_price = Some("cheap".into());
    let errors = form.validate(ImageRule::Required).unwrap_err();
    assert_eq!(codes(&errors, "price"), vec!["integer"]);
    assert_eq!(codes(&errors, "sale_price"), vec!["integer"]);
    assert!(codes(&errors, "name").is_empty());
}

#[test]
fn category_must_be_an_id() {
    let mut form = valid_form();
    form.category = Some("1".into());
    let errors = form.validate(ImageRule::Required).unwrap_err();
    assert_eq!(codes(&errors, "category"), vec!["exists"]);
}

#[test]
fn non_image_upload_is_rejected() {
    let mut form = valid_form();
    form.image = Some(UploadedImage {
        file_name: "notes.jpg".into(),
        bytes: Bytes::from_static(b"plain text, not a picture"),
        oversized: false,
    });
    let errors = form.validate(ImageRule::Required).unwrap_err();
    assert_eq!(codes(&errors, "image"), vec!["image", "mimes"]);
}

#[test]
fn other_image_types_fail_the_mime_rule() {
    let mut form = valid_form();
    form.image = Some(image(GIF_MAGIC, 64, "anim.gif"));
    let errors = form.validate(ImageRule::Required).unwrap_err();
    assert_eq!(codes(&errors, "image"), vec!["mimes"]);
}

#[test]
fn oversized_image_is_rejected() {
    let mut form = valid_form();
    form.image = Some(image(JPEG_MAGIC, MAX_IMAGE_BYTES + 1, "huge.jpg"));
    let errors = form.validate(ImageRule::Required).unwrap_err();
    assert_eq!(codes(&errors, "image"), vec!["max"]);

    form.image = Some(image(JPEG_MAGIC, MAX_IMAGE_BYTES, "limit.jpg"));
    assert!(form.validate(ImageRule::Required).is_ok());
}

#[test]
fn image_is_optional_on_update() {
    let mut form = valid_form();
    form.image = None;
    let valid = form.validate(ImageRule::Optional).expect("valid form");
    assert!(valid.image.is_none());
    assert!(form.validate(ImageRule::Required).is_err());
}

#[test]
fn input_echoes_text_fields_only() {
    let mut form = valid_form();
    form.price = Some("abc".into());
    form.sale_price = None;
    let input = form.input();
    assert_eq!(input.get("price").map(String::as_str), Some("abc"));
    assert_eq!(input.get("name").map(String::as_str), Some("Widget"));
    assert!(!input.contains_key("sale_price"));
    assert!(!input.contains_key("image"));
}
