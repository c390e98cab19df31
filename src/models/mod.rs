pub mod absence;
pub mod auth;
pub mod commitment;
pub mod notice;
pub mod student;
pub mod transport;
pub mod user;
