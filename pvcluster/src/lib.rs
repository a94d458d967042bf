// json config loading
pub mod config;
// out-of-core filter and sort
pub mod sort;
// poisoned single-linkage clustering
pub mod cluster;

pub use cluster::poisoned::{ClusterOutcome, ClusteringConfig, SparsePoisonedClustering};
pub use sort::config::{PartitionScheme, SortConfig};
pub use sort::sorter::{PvalueSorter, SortSummary};
pub use cluster::report::SharedResultWriter;
pub use cluster::runner::{ClusteringJob, ClusteringRunner, JobSummary};
