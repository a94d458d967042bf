pub mod config;
pub mod filter;
pub mod partition;
pub mod merge;
pub mod sorter;

// Re-export commonly used items
pub use filter::{filter, filter_and_sort};
