pub mod structure;
pub mod summary;

pub use structure::StructureExtractionStage;
pub use summary::SummarizationStage;

use crate::{
    context::{Context, keys},
    error::{FlowError, Result},
};

fn raw_text(context: &Context) -> Result<String> {
    context
        .get(keys::RAW_TEXT)
        .ok_or_else(|| FlowError::ContextError("raw text not found in context".to_string()))
}
