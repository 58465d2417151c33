//! kbqa Common Library
//!
//! Browser automation primitives shared by the scenario runner and the
//! report exporter. The [`browser`] traits are the seam between the flows and
//! the engine; [`chromium`] is the DevTools-protocol implementation.

pub mod browser;
pub mod chromium;
pub mod error;
pub mod poll;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use browser::{
    is_valid_marker, BrowserLauncher, BrowserPage, BrowserSession, LaunchOptions, PdfOptions,
    ScrollPosition, Viewport,
};
pub use chromium::ChromiumLauncher;
pub use error::{BrowserError, Result};
pub use poll::{
    wait_for_attribute, wait_for_text, wait_for_text_gone, wait_for_visible, PollResult,
};

/// kbqa version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
