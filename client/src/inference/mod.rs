mod input;
mod orchestrator;

pub use input::{ParseError, parse_feature_vector};
pub use orchestrator::{BATCH_INPUT_EXTENSIONS, InferenceOrchestrator, Phase, SubmitError};
