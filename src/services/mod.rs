pub mod absences;
pub mod auth;
pub mod board;
pub mod metrics;
pub mod notices;
pub mod notifications;
pub mod roster;
pub mod students;
