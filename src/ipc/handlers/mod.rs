pub mod assignments;
pub mod backup;
pub mod candidates;
pub mod core;
pub mod jobs;
pub mod setup;
