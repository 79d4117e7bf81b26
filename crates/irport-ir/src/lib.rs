//! IR graph documents: construction, validation, XML serialization and the
//! model emitter that writes the `.xml`/`.bin` pair.

pub mod emit;
pub mod error;
pub mod graph;
pub mod reader;
pub mod shape;
pub mod writer;

pub use emit::*;
pub use error::*;
pub use graph::*;
pub use reader::*;
pub use shape::*;
pub use writer::*;
