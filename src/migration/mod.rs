use sea_orm_migration::prelude::*;

mod m20250101_000001_create_users_table;
mod m20250101_000002_create_sessions_table;
mod m20250101_000003_create_resources_table;
mod m20250101_000004_create_downloads_table;
mod m20250101_000005_create_ratings_table;
mod m20250101_000006_create_comments_table;
mod m20250101_000007_create_favorites_table;
mod m20250101_000008_create_tickets_tables;
mod m20250101_000009_create_pages_table;
mod m20250101_000010_create_site_config_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_users_table::Migration),
            Box::new(m20250101_000002_create_sessions_table::Migration),
            Box::new(m20250101_000003_create_resources_table::Migration),
            Box::new(m20250101_000004_create_downloads_table::Migration),
            Box::new(m20250101_000005_create_ratings_table::Migration),
            Box::new(m20250101_000006_create_comments_table::Migration),
            Box::new(m20250101_000007_create_favorites_table::Migration),
            Box::new(m20250101_000008_create_tickets_tables::Migration),
            Box::new(m20250101_000009_create_pages_table::Migration),
            Box::new(m20250101_000010_create_site_config_table::Migration),
        ]
    }
}
