//! HTTP request handlers. Thin: extract, delegate to the repository, shape
//! the response.

pub mod file_handlers;
pub mod health_handlers;
