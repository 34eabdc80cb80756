use crate::{adapters::persistence::PostgresPersistence, infra::db::init_db};

pub mod app;
pub mod config;
pub mod db;
pub mod dummy_billing_gateway;
pub mod error;
pub mod http_client;
pub mod reconciliation_worker;
pub mod setup;
pub mod stripe_billing_gateway;
pub mod stripe_client;

pub async fn postgres_persistence(
    database_url: &str,
) -> Result<PostgresPersistence, error::InfraError> {
    let pool = init_db(database_url).await?;
    Ok(PostgresPersistence::new(pool))
}
