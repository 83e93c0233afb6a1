//! `extbuild deps` command

use anyhow::Result;

use crate::cli::DepsArgs;
use crate::commands::resolve_toolchain;
use extbuild::SystemRunner;

pub fn execute(args: DepsArgs) -> Result<()> {
    let runner = SystemRunner;
    let toolchain = resolve_toolchain(&args.toolchain, &runner)?;

    for dep in toolchain.get_dependencies(&args.files, &runner)? {
        println!("{}", dep);
    }

    Ok(())
}
