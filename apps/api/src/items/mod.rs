pub mod dates;
pub mod filters;
pub mod handlers;
pub mod store;
pub mod sync;
pub mod validate;
