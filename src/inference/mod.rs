//! Native QA inference: dataset loading, tokenization, span extraction, decoding.

mod dataset;
mod decode;
mod pipeline;
mod span;
mod tokenize;

pub use dataset::*;
pub use decode::*;
pub use pipeline::*;
pub use span::*;
pub use tokenize::*;
