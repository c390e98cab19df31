pub mod absences;
pub mod auth;
pub mod commitments;
pub mod health;
pub mod metrics;
pub mod notices;
pub mod students;
pub mod transport;
