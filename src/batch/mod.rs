//! Batch task compiler.
//!
//! Turns one or more cracking task specifications into a staging plan (which
//! artifacts must be present on the node, each listed once) and an ordered
//! shell script that runs the attacks and folds their results back into the
//! artifact store.
//!
//! The pipeline has three steps:
//!
//! 1. [`Batch::single`] or [`Batch::from_lines`] builds the batch. Every line
//!    goes through [`parse_task_line`], the same grammar as `hashfleet crack`.
//! 2. [`resolve_staging`] uploads local inputs and returns a [`StagedBatch`]
//!    whose tasks reference paths on the node.
//! 3. [`generate_script`] renders the statements.

mod error;
mod script;
mod spec;
mod staging;

pub use error::BatchError;
pub use script::{GeneratedScript, ScriptOptions, generate_script};
pub(crate) use script::{aws_prefix, object_uri};
pub use spec::{
    BUILTIN_RULES_PREFIX, Batch, MASK_MARKER, Rules, Source, TaskSpec, parse_task_line,
};
pub use staging::{
    ExtraFile, StagedBatch, StagedTask, StagingOptions, StagingPlan, remote_path, resolve_staging,
};

#[cfg(test)]
mod tests;
