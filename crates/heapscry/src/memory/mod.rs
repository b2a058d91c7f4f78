//! Access to heap image files on disk.

pub mod source;

pub use source::ImageFile;
