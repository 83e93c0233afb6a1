//! `extbuild build` command

use anyhow::Result;

use crate::cli::BuildArgs;
use crate::commands::resolve_toolchain;
use extbuild::builder::OptimizationOptions;
use extbuild::{BuildExecutor, SystemRunner};

pub fn execute(args: BuildArgs) -> Result<()> {
    let runner = SystemRunner;
    let mut toolchain = resolve_toolchain(&args.toolchain, &runner)?;

    if let Some(level) = args.opt {
        toolchain =
            toolchain.with_optimization_level(level, &OptimizationOptions::default(), &runner)?;
    }

    let executor = BuildExecutor::new(&toolchain, &runner).debug(args.debug);

    let output = if args.mode.object {
        executor.build_object(&args.output, &args.files)?
    } else if args.mode.extension {
        executor.build_extension(&args.output, &args.files)?
    } else {
        executor.link_extension(&args.output, &args.files)?
    };

    println!("{}", output.display());
    Ok(())
}
