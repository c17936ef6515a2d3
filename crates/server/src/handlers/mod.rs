//! HTTP request handlers.

pub mod capabilities;
pub mod common;
pub mod files;
pub mod tags;
pub mod uploads;

pub use capabilities::*;
pub use common::*;
pub use files::*;
pub use tags::*;
pub use uploads::*;
