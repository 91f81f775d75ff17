//! Storage for plain-text worksheet files.

mod text;

pub use text::TextDocument;
