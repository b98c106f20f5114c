mod emit;
mod engine;
mod prefilter;
mod stages;

pub use emit::EmitSink;
pub use emit::PipelineEvent;
pub use emit::TracingEmitSink;
pub use engine::PipelineEngine;
pub use engine::PollResult;
pub use stages::ClassifyOutcome;
pub use stages::DemoOutcome;
pub use stages::ExtractionOutcome;
pub use stages::GatedCandidates;
pub use stages::PersistOutcome;
pub use stages::PipelineOutcome;
pub use stages::PrefilterOutcome;
