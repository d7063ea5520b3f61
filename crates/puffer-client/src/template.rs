//! Server template facade.

use puffer_core::{TemplateDetails, TemplateSummary};

use crate::{client::Context, error::Result};

/// A server template known to the panel.
#[derive(Debug, Clone)]
pub struct Template {
    summary: TemplateSummary,
    ctx: Context,
}

impl Template {
    pub(crate) const fn new(summary: TemplateSummary, ctx: Context) -> Self {
        Self { summary, ctx }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.summary.name
    }

    #[must_use]
    pub fn display(&self) -> &str {
        &self.summary.display
    }

    /// Full template: variables, install steps, run command.
    ///
    /// # Errors
    /// Returns the REST error if the panel rejects the request.
    pub async fn details(&self) -> Result<TemplateDetails> {
        self.ctx
            .get_json(&format!("/api/templates/{}", self.summary.name))
            .await
    }
}
