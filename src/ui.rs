//! User-interaction sink for build progress.

use std::io::{self, Write};

/// Receives progress and failure messages from the pipeline.
pub trait Ui: Send + Sync {
    /// Reports an informational progress message.
    fn say(&self, message: &str);

    /// Reports a failure message.
    fn error(&self, message: &str);
}

/// Writes progress to stdout and failures to stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleUi;

impl Ui for ConsoleUi {
    fn say(&self, message: &str) {
        tracing::info!(target: "hcloud_imager::ui", "{message}");
        writeln!(io::stdout(), "==> hcloud: {message}").ok();
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "hcloud_imager::ui", "{message}");
        writeln!(io::stderr(), "==> hcloud: {message}").ok();
    }
}
