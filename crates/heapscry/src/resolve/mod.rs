//! Dependency resolution: decode the dependency message, then map every
//! harvested chunk to the key that decrypts it.

pub mod keys;
pub mod message;

pub use keys::{resolve, KeyResolution};
pub use message::{
    encode_dependency_message, DependencyDecoder, DependencyEdge, DependencyMessage,
    MessageDecoder, WireDecoder,
};
