use anyhow::{Context, Result};
use argp::FromArgs;
use recipe_bot_core::config::LintConfig;
use recipe_bot_repo::{CommandLinter, Linter, lint::markdown_report};
use typed_path::Utf8NativePathBuf;

use crate::util::native_path;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Lint recipes in a local checkout and print the markdown report.
#[argp(subcommand, name = "lint")]
pub struct Args {
    #[argp(option, default = "Utf8NativePathBuf::from(\".\")", from_str_fn(native_path))]
    /// root of the recipes checkout
    root: Utf8NativePathBuf,
    #[argp(option)]
    /// linter executable (default: bioconda-utils)
    command: Option<String>,
    #[argp(positional)]
    /// recipe directories, e.g. recipes/samtools
    recipes: Vec<String>,
    #[argp(option, short = 'o', from_str_fn(native_path))]
    /// write markdown report to output file
    output: Option<Utf8NativePathBuf>,
}

pub async fn run(args: Args) -> Result<()> {
    let mut config = LintConfig::default();
    if let Some(command) = args.command {
        config.command = command;
    }
    let linter = CommandLinter::new(&config);
    let report = linter.lint(args.root.with_platform_encoding().as_ref(), &args.recipes).await?;
    let markdown = markdown_report(report.as_ref());
    if let Some(out_path) = &args.output {
        std::fs::write(out_path.with_platform_encoding(), markdown)
            .with_context(|| format!("Failed to write output file '{}'", out_path))?;
    } else {
        print!("{}", markdown);
    }
    Ok(())
}
