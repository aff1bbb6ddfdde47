// OmniDetect Core Services

pub mod config_store;
pub mod detection;
pub mod history;
pub mod providers;

pub use config_store::*;
pub use history::*;
pub use providers::*;

pub use detection::{
    round4,
    score_text_heuristic,
    verdict,
    ChainFailure,
    DetectionError,
    DetectionService,
    FallbackChain,
};
