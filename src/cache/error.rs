use thiserror::Error;

use crate::record::RecordId;

#[derive(Error, Debug)]
pub enum CacheError {
    /// The model has neither a configured barcode field nor any cached record.
    #[error("model {model} is not known to the barcode cache")]
    UnknownModel { model: String },

    /// A strict id lookup asked for a record that was never delivered.
    #[error("record {id} of model {model} is not in the barcode cache")]
    NotFound { model: String, id: RecordId },

    /// The remote fetcher failed. The original error is kept as-is.
    #[error(transparent)]
    Fetch(#[from] anyhow::Error),

    #[error("barcode cache lock poisoned during {0}")]
    LockPoisoned(&'static str),
}

impl CacheError {
    pub fn unknown_model(model: impl Into<String>) -> Self {
        Self::UnknownModel {
            model: model.into(),
        }
    }

    pub fn not_found(model: impl Into<String>, id: RecordId) -> Self {
        Self::NotFound {
            model: model.into(),
            id,
        }
    }
}
