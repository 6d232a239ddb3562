pub mod document;

pub use document::StoredDocument;
