//! Batch planning
//!
//! Partitions a project's files into token-bounded batches:
//! - **analyzer**: token estimate, language and importance per file
//! - **classifier**: small / medium / large tiers
//! - **strategy**: combined, single and multi-part batching
//! - **boundary**: function boundaries used to split large files
//! - **ids**: `task_<n>` / `task_<n>_<k>` assignment
//! - **planner**: the end-to-end pipeline producing a [`BatchPlan`]

pub mod analyzer;
pub mod boundary;
pub mod classifier;
pub mod file_walker;
pub mod ids;
pub mod planner;
pub mod strategy;

pub use analyzer::FileAnalyzer;
pub use boundary::{Boundary, FunctionBoundaryScanner};
pub use classifier::{Classification, FileClassifier, SizeTier};
pub use file_walker::FileWalker;
pub use ids::TaskIdAssigner;
pub use planner::{BatchPlan, BatchPlanner, PlanWarning};
pub use strategy::{
    CombinedBatchStrategy, LargeFileMultiBatchStrategy, PlannedBatch, PlannedUnit,
    SingleFileBatchStrategy,
};
