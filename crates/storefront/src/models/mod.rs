//! Domain models for the storefront.
//!
//! These are the validated shapes handed to route handlers and serialized to
//! clients. Database row types live next to their repositories in `db`.

pub mod blog;
pub mod category;
pub mod product;
pub mod session;
pub mod user;

pub use blog::Blog;
pub use category::Category;
pub use product::Product;
pub use user::User;
