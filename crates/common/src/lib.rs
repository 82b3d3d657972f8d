pub mod domain;
pub mod error;
pub mod face_geometry;
pub mod repository;
pub mod validation;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
