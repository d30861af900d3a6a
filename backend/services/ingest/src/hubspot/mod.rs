pub mod client;
pub mod companies;
pub mod contacts;
pub mod meetings;
pub mod models;
pub mod query;
pub mod session;
