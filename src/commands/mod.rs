pub mod growth;
pub mod measure;
pub mod profile;
pub mod sky;

pub use growth::show_growth;
pub use measure::measure_stars;
pub use profile::show_profile;
pub use sky::show_sky;
