pub mod jwt;

pub use jwt::principal_from_token;
