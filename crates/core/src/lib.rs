pub mod console;
pub mod document;
pub mod event_loop;
pub mod session;

pub use console::{ConsoleLog, ConsoleTarget};
pub use document::{Document, DocumentError};
pub use event_loop::{LoopCallback, LoopProxy, LoopQueue};
pub use session::{DocumentStore, SessionError, TabLabel, WINDOW_TITLE_PREFIX};
