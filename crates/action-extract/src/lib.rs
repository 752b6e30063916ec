//! Response extraction
//!
//! Reads the finished response straight from the rendered output when it can,
//! and otherwise falls back to a clipboard round-trip guarded by a single-use
//! token: the token is the only unambiguous witness that a copy completed.

pub mod clipboard;
pub mod errors;
pub mod extractor;
pub mod sanitize;
pub mod token;

pub use clipboard::{ClipboardExtractor, ClipboardSettings, CopiedText};
pub use errors::ExtractError;
pub use extractor::{Extraction, ExtractionMethod, ExtractionPlan, ResponseExtractor};
pub use sanitize::sanitize_response;
pub use token::{ExtractionToken, TokenWitness, TOKEN_PREFIX};
