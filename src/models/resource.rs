use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    #[sea_orm(string_value = "script")]
    Script,
    #[sea_orm(string_value = "mapping")]
    Mapping,
    #[sea_orm(string_value = "tool")]
    Tool,
    #[sea_orm(string_value = "loading_screen")]
    LoadingScreen,
    #[sea_orm(string_value = "outfit")]
    Outfit,
    #[sea_orm(string_value = "base")]
    Base,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "resources")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title: String,
    #[sea_orm(unique)]
    pub slug: String,
    pub description: String,
    pub long_description: String,
    pub category: ResourceCategory,
    pub version: String,
    pub author_id: i32,
    pub file_path: String,
    pub file_size: i64,
    pub thumbnail: Option<String>,
    /// JSON-encoded list of image URLs.
    pub images: String,
    /// JSON-encoded list of tags.
    pub tags: String,
    pub status: ResourceStatus,
    pub is_featured: bool,
    pub download_count: i32,
    pub view_count: i32,
    #[sea_orm(column_type = "Double")]
    pub average_rating: f64,
    pub rating_count: i32,
    pub expires_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::AuthorId",
        to = "super::user::Column::Id"
    )]
    Author,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Author.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
