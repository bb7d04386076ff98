//! Image value object and the helpers that turn it into a wire item.

pub mod correlation;
pub mod data;
pub mod format;

pub use correlation::{CorrelationProvider, HashCorrelationProvider, UuidCorrelationProvider};
pub use data::ImageData;
pub use format::detect_image_format;
