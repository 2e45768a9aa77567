mod classify_stage;
mod download;
mod extract_stage;
mod index_stage;

pub use classify_stage::ClassifyStage;
pub use download::DownloadStage;
pub use extract_stage::ExtractStage;
pub use index_stage::IndexStage;
