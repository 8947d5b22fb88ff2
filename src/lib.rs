//! Snoo Watch library.
//!
//! Scans a subreddit's top submissions, walks their comment trees, and keeps
//! a per-user tally of comments in SQLite. Submissions are recorded once
//! their comments have been counted, so repeat runs only do new work.

pub mod config;
pub mod db;
pub mod extract;
pub mod reddit;
