// ATS analysis of a CV against a job description, and optimized downloads.

pub mod download;
pub mod handlers;
pub mod models;
pub mod prompts;
