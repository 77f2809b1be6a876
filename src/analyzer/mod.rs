mod frame_analyzer;


pub use frame_analyzer::{AnalyzerMetrics, FrameAnalyzer};
