use anyhow::{Context, Result};
use argp::FromArgs;
use recipe_bot_ci::{CiApi, CircleCi};
use recipe_bot_core::{artifacts::ArtifactSet, config::CiConfig};
use typed_path::Utf8NativePathBuf;

use crate::util::native_path;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// List the packages and images CI built for a commit as a markdown comment.
#[argp(subcommand, name = "artifacts")]
pub struct Args {
    #[argp(option)]
    /// owner of the home repository
    owner: String,
    #[argp(option)]
    /// name of the home repository
    repo: String,
    #[argp(option)]
    /// branch name, or `pull/<n>` for a pull request
    branch: String,
    #[argp(option)]
    /// commit SHA the builds ran on
    sha: String,
    #[argp(option)]
    /// CI API token
    token: Option<String>,
    #[argp(option, short = 'o', from_str_fn(native_path))]
    /// write markdown to output file
    output: Option<Utf8NativePathBuf>,
}

pub async fn run(args: Args) -> Result<()> {
    let config = CiConfig { token: args.token, ..Default::default() };
    let ci = CircleCi::new(reqwest::Client::new(), &config, &args.owner, &args.repo)?;
    let artifacts = ci.artifacts(&args.branch, &args.sha).await?;
    tracing::info!("Found {} artifacts for {} at {}", artifacts.len(), args.branch, args.sha);
    let set = ArtifactSet::from_urls(artifacts.iter().map(|a| a.url.as_str()));
    if set.is_empty() {
        tracing::warn!("No packages or images found");
    }
    let comment = recipe_bot_jobs::templates::render_artifacts(&set)?;
    if let Some(out_path) = &args.output {
        std::fs::write(out_path.with_platform_encoding(), comment)
            .with_context(|| format!("Failed to write output file '{}'", out_path))?;
    } else {
        println!("{}", comment);
    }
    Ok(())
}
