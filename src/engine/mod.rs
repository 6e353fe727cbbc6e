pub mod catalog;
pub mod traits;

pub use catalog::CatalogEngine;
pub use traits::{
    Completeness, ContentKind, EngineError, RawBatch, RawBatchStream, RetrievalEngine, WindowQuery,
};
