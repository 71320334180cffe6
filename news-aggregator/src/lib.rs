pub mod types;
pub mod traits;
pub mod utils;
pub mod parser;
pub mod dedup;
pub mod classifier;
pub mod fetcher;
pub mod personalization;
pub mod feed_manager;
pub mod state;
pub mod aggregator;

pub use types::*;
pub use traits::{HttpResponse, HttpTransport, PlaceExtractor};
pub use parser::FeedParser;
pub use dedup::deduplicate;
pub use classifier::{Classification, Classifier, KnownPlaceExtractor};
pub use fetcher::{Fetcher, ReqwestTransport};
pub use personalization::{reorder, PersonalizationRanker};
pub use feed_manager::{default_sources, SourceManager};
pub use state::{ExportDocument, StateManager, StateSections};
pub use aggregator::NewsAggregator;
