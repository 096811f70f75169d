pub mod astra_datasource;
pub mod health;

pub use astra_datasource::AstraDatasource;
pub use health::{HealthState, HealthStatus};
