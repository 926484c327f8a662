//! Validate-stack command - check run image against the build stack

use crate::cli::ValidateStackArgs;
use crate::config::Config;
use crate::error::KilnResult;
use crate::log::TracingLogger;
use crate::platform::read_stack_metadata;
use crate::stack::{image_source_for, StackValidator};
use console::style;
use tracing::info;

/// Execute the validate-stack command
pub async fn execute(args: ValidateStackArgs, config: &Config) -> KilnResult<()> {
    let config = config.clone().with_overrides(args.overrides());
    let platform = config.platform_api()?;
    if !platform.supports_stack_validation() {
        info!("Platform API {} does not validate stacks, skipping", platform);
        return Ok(());
    }

    let stack_md = read_stack_metadata(&config.paths.stack_path).await?;
    let images = image_source_for(&config.stack);

    let validator = StackValidator::new(TracingLogger::shared())
        .with_stack_id(args.stack_id)
        .with_run_image(args.run_image)
        .with_previous_image(args.previous_image);
    validator.validate(&stack_md, images.as_ref()).await?;

    println!(
        "{} Run image is compatible with stack {}",
        style("✓").green(),
        style(validator.build_stack_id(&stack_md)?).bold()
    );
    Ok(())
}
