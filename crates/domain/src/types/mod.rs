//! Typed records and status values exchanged with the backend.

pub mod health;
pub mod reference;
pub mod relation;

pub use health::{HealthStatus, HealthTransition};
pub use reference::{
    CountryState, LostReason, PipelineStage, RemoteRecord, SalesTeam, Salesperson,
};
pub use relation::Many2One;
