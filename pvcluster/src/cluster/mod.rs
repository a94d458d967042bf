pub mod matrix;
pub mod roots;
pub mod source;
pub mod poisoned;
pub mod report;
pub mod runner;

// Re-export commonly used types
pub use matrix::{EdgeHeap, SparseEdge, SparseMatrix};
pub use roots::{PoisonFlags, RootTable};
pub use source::{EdgeSource, FileEdgeSource, VecEdgeSource};
pub use report::{read_report, OutcomeFile, SharedResultWriter};
pub use runner::{ClusteringJob, ClusteringRunner, JobSummary};
