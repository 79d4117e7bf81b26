pub mod check;
pub mod inputs;
pub mod stress;
pub mod verify;

pub use check::*;
pub use inputs::*;
pub use stress::*;
pub use verify::*;

use std::sync::{Arc, Mutex};

use irport_core::BackendModel;

/// A loaded model shared between the verification pass and the stress task.
pub type SharedModel = Arc<Mutex<Box<dyn BackendModel>>>;

pub fn share(model: impl BackendModel) -> SharedModel {
    let model: Box<dyn BackendModel> = Box::new(model);
    Arc::new(Mutex::new(model))
}
