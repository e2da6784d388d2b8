pub mod get;

pub use get::{GetFileError, GetFileQuery};
