use anyhow::Result;
use argp::FromArgs;
use recipe_bot_repo::recipe::bump_build_number;
use typed_path::Utf8NativePathBuf;

use crate::util::native_path;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Increment the build number of recipes in a local checkout.
#[argp(subcommand, name = "bump")]
pub struct Args {
    #[argp(option, default = "Utf8NativePathBuf::from(\".\")", from_str_fn(native_path))]
    /// root of the recipes checkout
    root: Utf8NativePathBuf,
    #[argp(positional, from_str_fn(native_path))]
    /// recipe files relative to the root, e.g. recipes/samtools/meta.yaml
    recipes: Vec<Utf8NativePathBuf>,
}

pub fn run(args: Args) -> Result<()> {
    let root = args.root.with_platform_encoding();
    for recipe in &args.recipes {
        let bump = bump_build_number(root.as_ref(), recipe.with_platform_encoding().as_ref())?;
        println!("Bump {} buildno to {}", bump.recipe, bump.to);
    }
    Ok(())
}
