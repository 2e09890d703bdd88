pub mod jsonl;
pub mod overlay;

pub use jsonl::JsonLinesPublisher;
pub use overlay::OverlayRenderer;
