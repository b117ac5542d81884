//! Code block handler trait and utilities.
//!
//! This module provides the [`CodeBlockHandler`] trait for implementing
//! custom code block rendering (syntax highlighting, diagram rendering, etc.)

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::Result;

/// A handler for rendering code blocks.
///
/// Handlers run after sanitization, so whatever they return is inserted
/// verbatim as the contents of the block's `<code>` element. A handler that
/// fails leaves the block as escaped plain text.
///
/// # Example
///
/// ```rust,ignore
/// use mdshare_render::{CodeBlockHandler, Result};
///
/// struct ShoutHandler;
///
/// impl CodeBlockHandler for ShoutHandler {
///     fn render<'a>(
///         &'a self,
///         _language: &'a str,
///         code: &'a str,
///     ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
///         Box::pin(async move { Ok(code.to_uppercase()) })
///     }
/// }
/// ```
pub trait CodeBlockHandler: Send + Sync {
    /// Render a code block's contents to HTML.
    ///
    /// # Arguments
    /// * `language` - The language as declared on the fence (e.g., "rs", "python"),
    ///   or the detected one when the fence names none
    /// * `code` - The raw code content
    ///
    /// # Returns
    /// The inner HTML for the `<code>` element, or an error if rendering fails.
    fn render<'a>(
        &'a self,
        language: &'a str,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

/// Type alias for a boxed code block handler.
pub type BoxedHandler = Arc<dyn CodeBlockHandler>;

/// A handler that escapes code without processing.
///
/// This is used as a fallback when no handler is registered for a language
/// and highlighting is compiled out.
pub struct RawCodeHandler;

impl CodeBlockHandler for RawCodeHandler {
    fn render<'a>(
        &'a self,
        _language: &'a str,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move { Ok(html_escape::encode_text(code).into_owned()) })
    }
}
