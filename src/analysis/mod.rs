//! Page analysis: structural extraction from HTML, then keyword classification of the
//! extracted text and forms.

pub mod classify;
pub mod extract;

pub use classify::{classify, classify_result, ContentClassification, ContentReport};
pub use extract::{analyze, in_scope, PageAnalysis};
