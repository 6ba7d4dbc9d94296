pub mod id;
pub mod model;
pub mod validate;

pub use model::Document;
