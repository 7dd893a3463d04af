//! Request parsing helpers and the response builder handed to middlewares and
//! handlers.

pub mod request;
pub mod response;

pub use self::request::{FileUpload, MultipartEntry, Payload, RequestCtx};
pub use self::response::ResponseCtx;
