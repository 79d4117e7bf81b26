pub mod artifact;
pub mod backend;
pub mod config;
pub mod spec;
pub mod tensor;

pub use artifact::*;
pub use backend::*;
pub use config::*;
pub use spec::*;
pub use tensor::*;
