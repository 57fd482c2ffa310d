pub mod incidents;
pub mod index;

pub use incidents::IncidentRepository;
pub use index::{ActiveIndex, ACTIVE_INCIDENTS_KEY};
