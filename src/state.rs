use crate::{
    db::{DbPool, OrmConn},
    storage::ImageStorage,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub storage: ImageStorage,
}
