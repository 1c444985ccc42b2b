pub mod admin_handlers;
pub mod blog_handlers;
pub mod document_handlers;
pub mod health_handlers;
pub mod remote_handlers;
