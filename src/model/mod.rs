pub mod analysis;
pub mod bounds;
pub mod config;
pub mod osm;
pub mod track;

pub use analysis::*;
pub use bounds::*;
pub use config::*;
pub use osm::*;
pub use track::*;
