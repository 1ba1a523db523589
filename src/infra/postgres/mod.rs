//! PostgreSQL store implementations

mod admission;
mod audit;
mod circuits;
mod dead_letter;

pub use admission::PgAdmissionStore;
pub use audit::PgAuditStore;
pub use circuits::PgCircuitStore;
pub use dead_letter::PgDeadLetterStore;
