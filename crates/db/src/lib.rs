pub mod indexes;
pub mod models;
