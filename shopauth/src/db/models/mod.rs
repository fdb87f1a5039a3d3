pub mod products;
pub mod sessions;
pub mod users;
