pub mod auth;
pub mod categories;
pub mod shops;
pub mod tiles;
