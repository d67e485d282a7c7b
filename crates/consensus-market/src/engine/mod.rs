//! Analysis runs
//!
//! Coordinates the gate, the data sources and the opinion providers for one
//! metered run and produces the persisted [`RunReport`].

pub mod pipeline;
pub mod report;

pub use pipeline::AnalysisPipeline;
pub use report::RunReport;
