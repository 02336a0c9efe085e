//! GST computation: rate resolution, line math, and document totals

pub mod gst;
pub mod line;
pub mod totals;

pub use gst::*;
pub use line::*;
pub use totals::*;
