pub mod ids;
pub mod time;

pub use ids::{CharacterId, PlanetId, RegionId, SolarSystemId, TypeId};
pub use time::Timestamp;
