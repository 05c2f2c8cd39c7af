use crate::protocol::JsonMap;

use std::future::Future;

/// Produces and repairs code for the pipeline.
///
/// Implementations typically wrap a text-generation service. Errors are
/// plain messages; the pipeline records them and never inspects their type.
pub trait CodeGenerator {
    /// Code for a natural-language `request`. `context` carries caller data
    /// plus a `"history"` summary of earlier runs.
    fn generate(
        &self,
        request: &str,
        context: &JsonMap,
    ) -> impl Future<Output = Result<String, String>> + Send;

    /// Replacement for `code`, which failed with `error`.
    fn fix(
        &self,
        code: &str,
        error: &str,
        original_request: &str,
    ) -> impl Future<Output = Result<String, String>> + Send;
}
