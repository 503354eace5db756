use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
};
use uuid::Uuid;

use crate::{
    dto::products::{
        ApprovalCounts, CreateProductForm, EditProductForm, ProductCatalog, ProductDetail,
        ProductForm, ProductListQuery, ProductUpload,
    },
    error::AppResult,
    middleware::auth::{AuthUser, CatalogAccess, ensure_manage},
    models::Product,
    response::ApiResponse,
    services::product_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(store_product))
        .route("/card", get(product_cards))
        .route("/counts", get(approval_counts))
        .route("/create", get(create_product_form))
        .route(
            "/{id}",
            get(show_product).put(update_product).delete(delete_product),
        )
        .route("/{id}/edit", get(edit_product_form))
        .route("/{id}/approve", patch(approve_product))
        .route("/{id}/reject", patch(reject_product))
}

#[utoipa::path(
    get,
    path = "/api/products",
    params(
        ("approve" = Option<String>, Query, description = "Filter by approval: pending/approved or 0/1 (managers only)")
    ),
    responses(
        (status = 200, description = "Product listing; shoppers get the card view", body = ApiResponse<ProductCatalog>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ProductListQuery>,
) -> AppResult<Json<ApiResponse<ProductCatalog>>> {
    let access = CatalogAccess::for_user(&user);
    let resp = product_service::list_products(&state, access, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/card",
    responses(
        (status = 200, description = "All products with category", body = ApiResponse<ProductCatalog>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn product_cards(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<ProductCatalog>>> {
    let access = CatalogAccess::for_user(&user);
    let resp = product_service::list_catalog(&state, access).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/counts",
    responses(
        (status = 200, description = "Pending and approved product counts", body = ApiResponse<ApprovalCounts>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn approval_counts(
    State(state): State<AppState>,
    _user: AuthUser,
) -> AppResult<Json<ApiResponse<ApprovalCounts>>> {
    let counts = product_service::approval_counts(&state).await?;
    Ok(Json(ApiResponse::success("Approval counts", counts, None)))
}

#[utoipa::path(
    get,
    path = "/api/products/create",
    responses(
        (status = 200, description = "Categories for the creation form", body = ApiResponse<CreateProductForm>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn create_product_form(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<CreateProductForm>>> {
    let access = CatalogAccess::for_user(&user);
    let resp = product_service::create_form(&state, access).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/products",
    request_body(content = ProductUpload, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Product created", body = ApiResponse<Product>),
        (status = 403, description = "Forbidden"),
        (status = 422, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn store_product(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<ApiResponse<Product>>)> {
    let access = CatalogAccess::for_user(&user);
    // Refuse before reading the upload.
    ensure_manage(access)?;
    let form = ProductForm::from_multipart(&mut multipart).await?;
    let resp = product_service::store_product(&state, &user, access, form).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product with related products", body = ApiResponse<ProductDetail>),
        (status = 404, description = "Product not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn show_product(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ProductDetail>>> {
    let resp = product_service::get_product(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}/edit",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product and categories for the edit form", body = ApiResponse<EditProductForm>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Product not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn edit_product_form(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<EditProductForm>>> {
    let access = CatalogAccess::for_user(&user);
    let resp = product_service::edit_form(&state, access, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    request_body(content = ProductUpload, content_type = "multipart/form-data", description = "image is optional"),
    responses(
        (status = 200, description = "Product updated", body = ApiResponse<Product>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Product not found"),
        (status = 422, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<ApiResponse<Product>>> {
    let access = CatalogAccess::for_user(&user);
    // Refuse before reading the upload.
    ensure_manage(access)?;
    let form = ProductForm::from_multipart(&mut multipart).await?;
    let resp = product_service::update_product(&state, &user, access, id, form).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product deleted", body = ApiResponse<serde_json::Value>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Product not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let access = CatalogAccess::for_user(&user);
    let resp = product_service::delete_product(&state, &user, access, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/products/{id}/approve",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product approved", body = ApiResponse<Product>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Product not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn approve_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let access = CatalogAccess::for_user(&user);
    let resp = product_service::approve_product(&state, &user, access, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/products/{id}/reject",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product rejected", body = ApiResponse<Product>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Product not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn reject_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let access = CatalogAccess::for_user(&user);
    let resp = product_service::reject_product(&state, &user, access, id).await?;
    Ok(Json(resp))
}
