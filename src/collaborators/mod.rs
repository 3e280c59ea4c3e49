//! # Collaborators
//!
//! Subsystems the pipeline calls into without owning their behavior:
//!
//! - [`views`] - view rendering ([`ViewsManager`], built-in [`TemplateViews`])
//! - [`file`] - file responses read during preparation
//! - [`directory`] - directory handlers ([`DirectoryHandler`], built-in [`StaticDirectory`])
//! - [`proxy`] - proxy handlers ([`ProxyHandler`]); no built-in
//! - [`trace`] - best-effort event reporting ([`Tracer`])

pub mod directory;
pub mod file;
pub mod proxy;
pub mod trace;
pub mod views;

pub use directory::{DirectoryHandler, DirectoryOptions, StaticDirectory};
pub use file::{DispositionMode, FileConfig, FileOptions};
pub use proxy::{ProxyHandler, ProxyOptions};
pub use trace::{LogTracer, NoopTracer, Tracer};
pub use views::{Rendered, TemplateViews, ViewConfig, ViewOptions, ViewsManager};
