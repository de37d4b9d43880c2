/// Daily price/volume series consumed by the chip distribution engine.
///
/// Bars and volume records arrive from the data-serving collaborator as two
/// date-aligned sequences; `loader` reads them from the CSV exports that
/// collaborator keeps per instrument.
pub mod errors;
pub mod loader;
pub mod structs;

pub use errors::SeriesError;
pub use loader::load_series_csv;
pub use structs::{Bar, PriceRange, VolumeLookup, VolumeRecord};
