use axum::body::Bytes;
use catalog_api::{
    db::{create_orm_conn, raw_pool, run_migrations},
    dto::products::{CatalogView, ProductForm, ProductListQuery, UploadedImage},
    entity::{Products, categories::ActiveModel as CategoryActive, users::ActiveModel as UserActive},
    error::AppError,
    middleware::auth::{AuthUser, CatalogAccess, SHOPPER_ROLE},
    models::ApprovalStatus,
    services::product_service,
    state::AppState,
    storage::ImageStorage,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, PaginatorTrait, Set, Statement};
use uuid::Uuid;

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR";

// Integration flow: manager stores, edits, approves and deletes products; shopper browses.
#[tokio::test]
async fn catalog_crud_and_approval_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run catalog flow tests."
            );
            return Ok(());
        }
    };

    let images = tempfile::tempdir()?;
    let state = setup_state(&database_url, ImageStorage::new(images.path())).await?;

    let manager = create_user(&state, "Admin", "admin@example.com").await?;
    let shopper = create_user(&state, SHOPPER_ROLE, "user@example.com").await?;
    let manage = CatalogAccess::for_user(&manager);
    let browse = CatalogAccess::for_user(&shopper);
    assert_eq!(manage, CatalogAccess::Manage);
    assert_eq!(browse, CatalogAccess::Browse);

    let gadgets = create_category(&state, "Gadgets").await?;
    let books = create_category(&state, "Books").await?;

    // Store
    let created = product_service::store_product(
        &state,
        &manager,
        manage,
        form(gadgets, "Widget", "100", "80", Some(JPEG)),
    )
    .await?;
    assert_eq!(created.message, "Product created successfully.");
    let widget = created.data.expect("created product");
    assert_eq!(widget.category_id, gadgets);
    assert_eq!(widget.approve, ApprovalStatus::Pending);
    assert!(widget.image.ends_with(".jpg"));
    assert!(state.storage.exists(&widget.image).await?);

    // Rejected store leaves the table untouched
    let before = Products::find().count(&state.orm).await?;
    let err = product_service::store_product(
        &state,
        &manager,
        manage,
        form(gadgets, "Gizmo", "1.5", "x", Some(&b"not an image"[..])),
    )
    .await
    .expect_err("invalid form");
    match err {
        AppError::Validation(failed) => {
            let fields = failed.fields.field_errors();
            assert!(fields.contains_key("price"));
            assert!(fields.contains_key("sale_price"));
            assert!(fields.contains_key("image"));
            assert_eq!(failed.input.get("name").map(String::as_str), Some("Gizmo"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    let err = product_service::store_product(
        &state,
        &manager,
        manage,
        form(Uuid::new_v4(), "Orphan", "10", "5", Some(JPEG)),
    )
    .await
    .expect_err("unknown category");
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(Products::find().count(&state.orm).await?, before);

    // Shoppers cannot store
    let err = product_service::store_product(
        &state,
        &shopper,
        browse,
        form(gadgets, "Sneaky", "1", "1", Some(JPEG)),
    )
    .await
    .expect_err("shopper store");
    assert!(matches!(err, AppError::Forbidden));

    // More products for the related list
    let mut gadget_ids = vec![widget.id];
    for name in ["Sprocket", "Flange", "Gear", "Cog", "Lever"] {
        let product = product_service::store_product(
            &state,
            &manager,
            manage,
            form(gadgets, name, "10", "9", Some(PNG)),
        )
        .await?
        .data
        .expect("product");
        gadget_ids.push(product.id);
    }
    product_service::store_product(&state, &manager, manage, form(books, "Manual", "5", "4", Some(PNG)))
        .await?;

    // Show
    let detail = product_service::get_product(&state, widget.id).await?.data.expect("detail");
    assert_eq!(detail.product.product.id, widget.id);
    assert_eq!(detail.product.category.as_ref().map(|c| c.id), Some(gadgets));
    assert!(detail.related.len() <= 4);
    assert!(!detail.related.is_empty());
    for related in &detail.related {
        assert_eq!(related.category_id, gadgets);
        assert_ne!(related.id, widget.id);
        assert!(gadget_ids.contains(&related.id));
    }
    let err = product_service::get_product(&state, Uuid::new_v4())
        .await
        .expect_err("unknown product");
    assert!(matches!(err, AppError::NotFound));

    // Listing views
    let cards = product_service::list_products(&state, browse, ProductListQuery::default())
        .await?
        .data
        .expect("catalog");
    assert_eq!(cards.view, CatalogView::Card);
    assert!(cards.counts.is_none());
    assert_eq!(cards.items.len(), 7);
    let index = product_service::list_catalog(&state, manage).await?.data.expect("catalog");
    assert_eq!(index.view, CatalogView::Index);

    // Update without image keeps the file name
    let updated = product_service::update_product(
        &state,
        &manager,
        manage,
        widget.id,
        form(books, "Widget Pro", "120", "90", None),
    )
    .await?
    .data
    .expect("updated");
    assert_eq!(updated.image, widget.image);
    assert_eq!(updated.name, "Widget Pro");
    assert_eq!(updated.category_id, books);
    assert!(state.storage.exists(&widget.image).await?);

    // Update with image swaps the file
    let replaced = product_service::update_product(
        &state,
        &manager,
        manage,
        widget.id,
        form(books, "Widget Pro", "120", "90", Some(PNG)),
    )
    .await?
    .data
    .expect("updated");
    assert_ne!(replaced.image, widget.image);
    assert!(replaced.image.ends_with(".png"));
    assert!(state.storage.exists(&replaced.image).await?);
    assert!(!state.storage.exists(&widget.image).await?);

    let err = product_service::update_product(
        &state,
        &manager,
        manage,
        Uuid::new_v4(),
        form(books, "Ghost", "1", "1", None),
    )
    .await
    .expect_err("unknown product");
    assert!(matches!(err, AppError::NotFound));

    // Approval workflow
    let pending_before = product_service::count_pending(&state).await?;
    let approved_before = product_service::count_approved(&state).await?;
    let approved = product_service::approve_product(&state, &manager, manage, widget.id).await?;
    assert_eq!(approved.message, "Product approved successfully.");
    assert_eq!(approved.data.expect("product").approve, ApprovalStatus::Approved);
    assert_eq!(product_service::count_approved(&state).await?, approved_before + 1);
    assert_eq!(product_service::count_pending(&state).await?, pending_before - 1);

    let filtered = product_service::list_products(
        &state,
        manage,
        ProductListQuery {
            approve: Some(ApprovalStatus::Approved),
        },
    )
    .await?
    .data
    .expect("catalog");
    assert_eq!(filtered.items.len(), 1);
    assert_eq!(filtered.items[0].product.id, widget.id);
    let counts = filtered.counts.expect("counts");
    assert_eq!(counts.approved, approved_before + 1);

    product_service::reject_product(&state, &manager, manage, widget.id).await?;
    assert_eq!(product_service::count_approved(&state).await?, approved_before);
    assert_eq!(product_service::count_pending(&state).await?, pending_before);

    let err = product_service::approve_product(&state, &shopper, browse, widget.id)
        .await
        .expect_err("shopper approve");
    assert!(matches!(err, AppError::Forbidden));

    // Destroy
    let total = Products::find().count(&state.orm).await?;
    let deleted = product_service::delete_product(&state, &manager, manage, widget.id).await?;
    assert_eq!(deleted.message, "Product deleted successfully.");
    assert_eq!(Products::find().count(&state.orm).await?, total - 1);
    assert!(!state.storage.exists(&replaced.image).await?);
    let err = product_service::delete_product(&state, &manager, manage, widget.id)
        .await
        .expect_err("already deleted");
    assert!(matches!(err, AppError::NotFound));

    Ok(())
}

fn form(category: Uuid, name: &str, price: &str, sale_price: &str, image: Option<&[u8]>) -> ProductForm {
    ProductForm {
        category: Some(category.to_string()),
        name: Some(name.to_string()),
        price: Some(price.to_string()),
        sale_price: Some(sale_price.to_string()),
        image: image.map(|bytes| UploadedImage {
            file_name: "upload".into(),
            bytes: Bytes::copy_from_slice(bytes),
            oversized: false,
        }),
    }
}

async fn setup_state(database_url: &str, storage: ImageStorage) -> anyhow::Result<AppState> {
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE audit_logs, products, categories, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(AppState {
        pool: raw_pool(&orm),
        orm,
        storage,
    })
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<AuthUser> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        role: Set(role.into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: user.id,
        role: user.role,
    })
}

async fn create_category(state: &AppState, name: &str) -> anyhow::Result<Uuid> {
    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(category.id)
}
