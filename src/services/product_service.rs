use chrono::Utc;
use sea_orm::sea_query::{Expr, LockType, Order};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;
use validator::ValidationErrors;

use crate::{
    audit::audit_product,
    dto::products::{
        ApprovalCounts, CatalogView, CreateProductForm, EditProductForm, ImageRule,
        ProductCatalog, ProductDetail, ProductForm, ProductListQuery, ValidProductForm,
        invalid_category,
    },
    entity::{
        categories::{Entity as Categories, Model as CategoryModel},
        products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult, ValidationFailed},
    middleware::auth::{AuthUser, CatalogAccess, ensure_manage},
    models::{ApprovalStatus, Product, ProductWithCategory},
    response::{ApiResponse, Meta},
    services::category_service::{category_exists, category_from_entity, list_categories},
    state::AppState,
};

/// Upper bound on "related products" shown next to a product.
pub const RELATED_LIMIT: u64 = 4;

/// All products with their category, presented according to the caller's access.
pub async fn list_catalog(
    state: &AppState,
    access: CatalogAccess,
) -> AppResult<ApiResponse<ProductCatalog>> {
    let items = Products::find()
        .find_also_related(Categories)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(with_category)
        .collect::<Vec<_>>();

    let view = match access {
        CatalogAccess::Browse => CatalogView::Card,
        CatalogAccess::Manage => CatalogView::Index,
    };
    let meta = Meta::total(items.len());
    let data = ProductCatalog {
        view,
        items,
        approve: None,
        counts: None,
    };
    Ok(ApiResponse::success("Products", data, Some(meta)))
}

/// Management listing: optional approval filter plus the pending/approved counts.
/// Shoppers get the plain card catalog.
pub async fn list_products(
    state: &AppState,
    access: CatalogAccess,
    query: ProductListQuery,
) -> AppResult<ApiResponse<ProductCatalog>> {
    if access == CatalogAccess::Browse {
        return list_catalog(state, access).await;
    }

    let mut finder = Products::find();
    if let Some(status) = query.approve {
        finder = finder.filter(Column::Approve.eq(status));
    }
    let items = finder
        .find_also_related(Categories)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(with_category)
        .collect::<Vec<_>>();

    let counts = approval_counts(state).await?;
    let meta = Meta::total(items.len());
    let data = ProductCatalog {
        view: CatalogView::Index,
        items,
        approve: query.approve,
        counts: Some(counts),
    };
    Ok(ApiResponse::success("Products", data, Some(meta)))
}

pub async fn count_pending(state: &AppState) -> AppResult<u64> {
    count_with_status(state, ApprovalStatus::Pending).await
}

pub async fn count_approved(state: &AppState) -> AppResult<u64> {
    count_with_status(state, ApprovalStatus::Approved).await
}

pub async fn approval_counts(state: &AppState) -> AppResult<ApprovalCounts> {
    Ok(ApprovalCounts {
        pending: count_pending(state).await?,
        approved: count_approved(state).await?,
    })
}

async fn count_with_status(state: &AppState, status: ApprovalStatus) -> AppResult<u64> {
    let total = Products::find()
        .filter(Column::Approve.eq(status))
        .count(&state.orm)
        .await?;
    Ok(total)
}

/// One product plus up to [`RELATED_LIMIT`] random others from its category.
pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<ProductDetail>> {
    let (product, category) = Products::find_by_id(id)
        .find_also_related(Categories)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let related = Products::find()
        .filter(Column::CategoryId.eq(product.category_id))
        .filter(Column::Id.ne(product.id))
        .order_by(Expr::cust("RANDOM()"), Order::Asc)
        .limit(RELATED_LIMIT)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_from_entity)
        .collect();

    let data = ProductDetail {
        product: with_category((product, category)),
        related,
    };
    Ok(ApiResponse::success("Product", data, None))
}

pub async fn create_form(
    state: &AppState,
    access: CatalogAccess,
) -> AppResult<ApiResponse<CreateProductForm>> {
    ensure_manage(access)?;
    let categories = list_categories(state).await?;
    Ok(ApiResponse::success(
        "Create product",
        CreateProductForm { categories },
        None,
    ))
}

pub async fn edit_form(
    state: &AppState,
    access: CatalogAccess,
    id: Uuid,
) -> AppResult<ApiResponse<EditProductForm>> {
    ensure_manage(access)?;
    let product = Products::find_by_id(id)
        .find_also_related(Categories)
        .one(&state.orm)
        .await?
        .map(with_category)
        .ok_or(AppError::NotFound)?;
    let categories = list_categories(state).await?;
    Ok(ApiResponse::success(
        "Edit product",
        EditProductForm {
            product,
            categories,
        },
        None,
    ))
}

pub async fn store_product(
    state: &AppState,
    user: &AuthUser,
    access: CatalogAccess,
    form: ProductForm,
) -> AppResult<ApiResponse<Product>> {
    ensure_manage(access)?;
    let valid = validate_form(state, &form, ImageRule::Required).await?;
    let image = valid
        .image
        .as_ref()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("validated product form has no image")))?;

    let file_name = state.storage.put(&image.bytes, image.kind).await?;

    let active = ActiveModel {
        id: Set(Uuid::new_v4()),
        category_id: Set(valid.category_id),
        name: Set(valid.name.clone()),
        price: Set(valid.price),
        sale_price: Set(valid.sale_price),
        image: Set(file_name.clone()),
        approve: NotSet,
        created_at: NotSet,
        updated_at: NotSet,
    };
    let product = match active.insert(&state.orm).await {
        Ok(product) => product,
        Err(err) => {
            discard_image(state, &file_name).await;
            return Err(err.into());
        }
    };

    tracing::info!(product_id = %product.id, image = %product.image, "product created");
    audit_product(&state.pool, user.user_id, "product_create", product.id).await;

    Ok(ApiResponse::success(
        "Product created successfully.",
        product_from_entity(product),
        Some(Meta::empty()),
    ))
}

/// Update every field; replace the image only when a new one was uploaded.
///
/// With a new image the file is written first, the row is updated in a
/// transaction, and the previous file is removed only after the commit. A
/// failed row update removes the new file and leaves the old one in place.
pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    access: CatalogAccess,
    id: Uuid,
    form: ProductForm,
) -> AppResult<ApiResponse<Product>> {
    ensure_manage(access)?;
    if Products::find_by_id(id).count(&state.orm).await? == 0 {
        return Err(AppError::NotFound);
    }
    let valid = validate_form(state, &form, ImageRule::Optional).await?;

    let staged = match &valid.image {
        Some(image) => Some(state.storage.put(&image.bytes, image.kind).await?),
        None => None,
    };

    let (product, old_image) = match apply_update(state, id, &valid, staged.as_deref()).await {
        Ok(updated) => updated,
        Err(err) => {
            if let Some(name) = &staged {
                discard_image(state, name).await;
            }
            return Err(err);
        }
    };

    if staged.is_some() && old_image != product.image {
        discard_image(state, &old_image).await;
    }

    tracing::info!(product_id = %product.id, image = %product.image, "product updated");
    audit_product(&state.pool, user.user_id, "product_update", product.id).await;

    Ok(ApiResponse::success(
        "Product updated successfully.",
        product_from_entity(product),
        Some(Meta::empty()),
    ))
}

async fn apply_update(
    state: &AppState,
    id: Uuid,
    valid: &ValidProductForm,
    new_image: Option<&str>,
) -> AppResult<(ProductModel, String)> {
    let txn = state.orm.begin().await?;
    let existing = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    let old_image = existing.image.clone();

    let mut active: ActiveModel = existing.into();
    active.category_id = Set(valid.category_id);
    active.name = Set(valid.name.clone());
    active.price = Set(valid.price);
    active.sale_price = Set(valid.sale_price);
    if let Some(name) = new_image {
        active.image = Set(name.to_string());
    }
    active.updated_at = Set(Utc::now().into());
    let product = active.update(&txn).await?;

    txn.commit().await?;
    Ok((product, old_image))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    access: CatalogAccess,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_manage(access)?;
    let product = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let result = Products::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }
    discard_image(state, &product.image).await;

    tracing::info!(product_id = %id, "product deleted");
    audit_product(&state.pool, user.user_id, "product_delete", id).await;

    Ok(ApiResponse::success(
        "Product deleted successfully.",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn approve_product(
    state: &AppState,
    user: &AuthUser,
    access: CatalogAccess,
    id: Uuid,
) -> AppResult<ApiResponse<Product>> {
    set_approval(state, user, access, id, ApprovalStatus::Approved).await
}

pub async fn reject_product(
    state: &AppState,
    user: &AuthUser,
    access: CatalogAccess,
    id: Uuid,
) -> AppResult<ApiResponse<Product>> {
    set_approval(state, user, access, id, ApprovalStatus::Pending).await
}

async fn set_approval(
    state: &AppState,
    user: &AuthUser,
    access: CatalogAccess,
    id: Uuid,
    status: ApprovalStatus,
) -> AppResult<ApiResponse<Product>> {
    ensure_manage(access)?;
    let existing = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: ActiveModel = existing.into();
    active.approve = Set(status);
    active.updated_at = Set(Utc::now().into());
    let product = active.update(&state.orm).await?;

    let (action, message) = match status {
        ApprovalStatus::Approved => ("product_approve", "Product approved successfully."),
        ApprovalStatus::Pending => ("product_reject", "Product rejected successfully."),
    };
    tracing::info!(product_id = %product.id, ?status, "product approval changed");
    audit_product(&state.pool, user.user_id, action, product.id).await;

    Ok(ApiResponse::success(
        message,
        product_from_entity(product),
        Some(Meta::empty()),
    ))
}

async fn validate_form(
    state: &AppState,
    form: &ProductForm,
    image_rule: ImageRule,
) -> AppResult<ValidProductForm> {
    let valid = form
        .validate(image_rule)
        .map_err(|fields| rejected(fields, form))?;

    if !category_exists(state, valid.category_id).await? {
        let mut fields = ValidationErrors::new();
        fields.add("category", invalid_category());
        return Err(rejected(fields, form));
    }
    Ok(valid)
}

fn rejected(fields: ValidationErrors, form: &ProductForm) -> AppError {
    AppError::Validation(ValidationFailed {
        fields,
        input: form.input(),
    })
}

async fn discard_image(state: &AppState, name: &str) {
    if let Err(err) = state.storage.delete(name).await {
        tracing::warn!(error = %err, image = %name, "failed to remove product image");
    }
}

fn with_category((product, category): (ProductModel, Option<CategoryModel>)) -> ProductWithCategory {
    ProductWithCategory {
        product: product_from_entity(product),
        category: category.map(category_from_entity),
    }
}

pub fn product_from_entity(model: ProductModel) -> Product {
    Product {
        id: model.id,
        category_id: model.category_id,
        name: model.name,
        price: model.price,
        sale_price: model.sale_price,
        image: model.image,
        approve: model.approve,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}
