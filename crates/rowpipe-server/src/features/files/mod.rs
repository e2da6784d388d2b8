pub mod commands;
pub mod queries;
pub mod routes;

pub use commands::{UploadFileCommand, UploadFileError, UploadFileResponse};
pub use queries::{GetFileQuery, GetFileError};
pub use routes::files_routes;
