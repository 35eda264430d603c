// Library root: the post-processing pipeline and the input loaders that
// feed it.

pub mod input;
pub mod pipeline;

pub use pipeline::{run, PipelineOutput, Stage, StageReport};
