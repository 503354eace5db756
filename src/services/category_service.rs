use chrono::Utc;
use sea_orm::{EntityTrait, PaginatorTrait, QueryOrder};
use uuid::Uuid;

use crate::{
    entity::categories::{Column, Entity as Categories, Model as CategoryModel},
    error::AppResult,
    models::Category,
    state::AppState,
};

pub async fn list_categories(state: &AppState) -> AppResult<Vec<Category>> {
    let categories = Categories::find()
        .order_by_asc(Column::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(category_from_entity)
        .collect();
    Ok(categories)
}

pub async fn category_exists(state: &AppState, id: Uuid) -> AppResult<bool> {
    let found = Categories::find_by_id(id).count(&state.orm).await?;
    Ok(found > 0)
}

pub fn category_from_entity(model: CategoryModel) -> Category {
    Category {
        id: model.id,
        name: model.name,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
