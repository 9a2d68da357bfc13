//! Framesift Extract crate - frame extraction transform and the extraction
//! worker that runs one leased job at a time.

pub mod extractor;
pub mod worker;

pub use extractor::{FfmpegExtractor, FrameExtractor};
pub use worker::{ExtractionWorker, JobTicket, SubmittedJob, WorkerPhase, WorkerSettings};
