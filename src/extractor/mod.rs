pub mod demux;
pub mod output_manager;
pub mod range;
pub mod record;

pub use demux::{DemuxConfig, DemuxRegistry, TypeDemuxer};
pub use output_manager::{AtomicCsvWriter, DemuxReport, DestinationSummary, RangeReport};
pub use range::{RangeConfig, RangeExtractor};
pub use record::{LineProgress, LogLine, MalformedRecord};
