//! Stack compatibility check
//!
//! The build stack ID comes from `CNB_STACK_ID` or the build image section
//! of `stack.toml`; the run stack ID is the `io.buildpacks.stack.id` label
//! of the run image. The build may only proceed when both are set and equal.

use crate::error::{KilnError, KilnResult};
use crate::log::Logger;
use crate::platform::{registry_of, StackMetadata, STACK_ID_LABEL};
use crate::stack::image::{ImageSource, RunImage};
use std::sync::Arc;

/// Resolves build and run stack IDs and checks that they match
pub struct StackValidator {
    stack_id: Option<String>,
    run_image: Option<String>,
    previous_image: Option<String>,
    logger: Arc<dyn Logger>,
}

impl StackValidator {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self {
            stack_id: None,
            run_image: None,
            previous_image: None,
            logger,
        }
    }

    /// Build stack ID taking precedence over `stack.toml`
    pub fn with_stack_id(mut self, stack_id: Option<String>) -> Self {
        self.stack_id = non_empty(stack_id);
        self
    }

    /// Run image reference taking precedence over `stack.toml`
    pub fn with_run_image(mut self, run_image: Option<String>) -> Self {
        self.run_image = non_empty(run_image);
        self
    }

    /// Image being rebuilt; its registry selects the run image mirror
    pub fn with_previous_image(mut self, previous_image: Option<String>) -> Self {
        self.previous_image = non_empty(previous_image);
        self
    }

    pub fn build_stack_id(&self, stack_md: &StackMetadata) -> KilnResult<String> {
        self.stack_id
            .clone()
            .or_else(|| non_empty(Some(stack_md.build_image.stack_id.clone())))
            .ok_or(KilnError::StackIdRequired)
    }

    /// Run image reference to inspect.
    ///
    /// When `stack.toml` names a run image and a previous image was given,
    /// the mirror on the previous image's registry is used, even over an
    /// explicit run image.
    pub fn run_image_ref(&self, stack_md: &StackMetadata) -> KilnResult<String> {
        let primary = &stack_md.run_image.image;
        let run_image_ref = self
            .run_image
            .clone()
            .or_else(|| non_empty(Some(primary.clone())))
            .ok_or(KilnError::RunImageRequired)?;

        match &self.previous_image {
            Some(previous) if !primary.is_empty() => {
                let registry = registry_of(previous)?;
                let mirror = stack_md.best_run_image_mirror(&registry)?;
                self.logger.debug(&format!(
                    "Using run image {:?} for registry {:?}",
                    mirror, registry
                ));
                Ok(mirror)
            }
            _ => Ok(run_image_ref),
        }
    }

    /// Resolve the run image through `images` and check it
    pub async fn validate(
        &self,
        stack_md: &StackMetadata,
        images: &dyn ImageSource,
    ) -> KilnResult<()> {
        let build_stack_id = self.build_stack_id(stack_md)?;
        let run_image_ref = self.run_image_ref(stack_md)?;
        let run_image = images.open(&run_image_ref).await?;
        self.check(&build_stack_id, run_image.as_ref()).await
    }

    /// Check an already resolved run image
    pub async fn validate_image(
        &self,
        stack_md: &StackMetadata,
        run_image: &dyn RunImage,
    ) -> KilnResult<()> {
        let build_stack_id = self.build_stack_id(stack_md)?;
        self.check(&build_stack_id, run_image).await
    }

    async fn check(&self, build_stack_id: &str, run_image: &dyn RunImage) -> KilnResult<()> {
        let run_stack_id = run_image
            .label(STACK_ID_LABEL)
            .await?
            .filter(|id| !id.is_empty())
            .ok_or_else(|| KilnError::RunImageLabelMissing {
                label: STACK_ID_LABEL.to_string(),
            })?;

        if run_stack_id != build_stack_id {
            return Err(KilnError::IncompatibleStack {
                run_stack_id,
                build_stack_id: build_stack_id.to_string(),
            });
        }

        self.logger.debug(&format!(
            "Run image {:?} matches stack {:?}",
            run_image.name(),
            build_stack_id
        ));
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
