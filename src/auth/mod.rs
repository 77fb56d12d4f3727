pub mod middleware;

pub use middleware::TokenAuth;
