use anyhow::{Context, Result};
use recipe_bot_repo::{Checkout, CheckoutTarget, acquire, recipe::bump_build_number};

use crate::services::Services;

/// Increment the build number of every recipe changed by a pull request and
/// push the result to its branch.
pub async fn bump(services: &Services<'_>, number: u64) -> Result<()> {
    tracing::info!("Processing bump command: #{}", number);
    let target = CheckoutTarget::PullRequest(number);
    let Checkout::Ready(workspace) = acquire(&services.checkout_context(), &target).await else {
        tracing::error!("Failed to check out #{}", number);
        return Ok(());
    };
    let recipes = workspace.changed_recipes().await.context("Failed to list changed recipes")?;
    if recipes.is_empty() {
        tracing::warn!("#{} does not change any recipes, nothing to bump", number);
        return Ok(());
    }
    let mut lines = Vec::with_capacity(recipes.len());
    for meta in &recipes {
        let bump = bump_build_number(workspace.root(), meta)?;
        tracing::info!("Bumped {} from {} to {}", bump.recipe, bump.from, bump.to);
        lines.push(format!("Bump {} buildno to {}", bump.recipe, bump.to));
    }
    let message = lines.join("\n");
    if !workspace.commit_and_push(&recipes, &message, true).await? {
        tracing::error!("Failed to push build number bump to #{}", number);
    }
    workspace.close();
    Ok(())
}
