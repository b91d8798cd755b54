pub mod job;
pub mod persona;
pub mod product;
pub mod requests;
pub mod user;
