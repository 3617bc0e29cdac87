//! IO abstractions: random-access byte sources and the sliding byte window.

mod byte_source;
mod window;

pub use byte_source::{ByteSource, FileSource, MemorySource};
pub use window::ByteWindow;
