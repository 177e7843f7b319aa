//! Geocatalog Index - Catalog indexes backed by a spatial service
//!
//! Provides the spatial index, the location (container) query index, and the
//! connection managers that tie service writes to host transactions.

pub mod connection;
pub mod error;
pub mod location;
pub mod registry;
pub mod spatial;
pub mod traits;
pub mod transaction;

pub use connection::{http_factory, ConnectionFactory, ConnectionManager, ParticipantState};
pub use error::{IndexError, IndexResult};
pub use location::LocationQueryIndex;
pub use registry::StorageConnection;
pub use spatial::SpatialIndex;
pub use traits::{AppliedIndex, Catalog, IndexContext, PluggableIndex, ResultSet};
pub use transaction::{
    DataManager, NoRollbackSavepoint, RollbackHandle, Savepoint, Transaction, TransactionId,
    TransactionStatus,
};
