//! Filesystem-context providers: implementations of `TaskManager` that live
//! entirely inside the current project directory rather than talking to a
//! remote service, registered at a low detection priority so they win over
//! the embedded cache when present.

mod markdown;

pub use markdown::{MarkdownProvider, DEFAULT_FILE_NAME, MARKDOWN_DETECTION_PRIORITY};
