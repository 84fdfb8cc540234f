//! A persistent catalog of imported GPX tracks.
//!
//! [`store::TrackCatalog`] keeps one record per track file, indexed by path
//! and by file name, and persists the whole set to a JSON file. Statistics
//! come from an [`analysis::AnalysisProvider`]; [`io::watcher`] feeds file
//! system moves back into the catalog. [`model::osm`] holds the OSM edit
//! point types.

pub mod analysis;
pub mod cli;
pub mod io;
pub mod model;
pub mod store;
