pub mod approval;
pub mod core;
pub mod grades;
pub mod guard;
pub mod setup;
