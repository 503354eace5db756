use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        products::{
            ApprovalCounts, CatalogView, CreateProductForm, EditProductForm, ProductCatalog,
            ProductDetail, ProductUpload,
        },
    },
    models::{ApprovalStatus, Category, Product, ProductWithCategory, User},
    response::{ApiResponse, Meta},
    routes::{auth, health, products},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::readiness,
        auth::login,
        auth::register,
        products::list_products,
        products::product_cards,
        products::approval_counts,
        products::create_product_form,
        products::store_product,
        products::show_product,
        products::edit_product_form,
        products::update_product,
        products::delete_product,
        products::approve_product,
        products::reject_product
    ),
    components(
        schemas(
            User,
            Category,
            Product,
            ProductWithCategory,
            ApprovalStatus,
            ApprovalCounts,
            CatalogView,
            ProductCatalog,
            ProductDetail,
            CreateProductForm,
            EditProductForm,
            ProductUpload,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductCatalog>,
            ApiResponse<ProductDetail>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Products", description = "Product catalog and approval workflow"),
        (name = "Auth", description = "Authentication endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
