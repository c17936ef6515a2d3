//! Repository traits for metadata operations.

pub mod catalog;
pub mod tags;
pub mod uploads;

pub use catalog::CatalogRepo;
pub use tags::TagRepo;
pub use uploads::UploadRepo;
