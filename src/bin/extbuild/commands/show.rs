//! `extbuild show` command

use anyhow::{Context, Result};

use crate::cli::ShowArgs;
use extbuild::util::process::find_executable;
use extbuild::{discover_cuda_toolchain, discover_default_toolchain, SystemRunner, Toolchain};

pub fn execute(args: ShowArgs) -> Result<()> {
    let runner = SystemRunner;

    let toolchain = if args.cuda {
        discover_cuda_toolchain(&runner).context("failed to discover CUDA toolchain")?
    } else {
        discover_default_toolchain(&runner).context("failed to discover host toolchain")?
    };

    let fingerprint = toolchain.abi_fingerprint(&runner)?;
    let version = toolchain.version_info(&runner)?;

    if args.json {
        let out = serde_json::json!({
            "toolchain": toolchain,
            "version": version.to_string(),
            "fingerprint": fingerprint,
            "digest": fingerprint.digest(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    print_toolchain(&toolchain);
    println!();
    println!("  Version:     {}", version);
    println!("  Fingerprint: {}", fingerprint.digest());

    Ok(())
}

fn print_toolchain(toolchain: &Toolchain) {
    println!("Toolchain ({}):", toolchain.backend());
    println!();

    let compiler = toolchain.compiler();
    match find_executable(compiler) {
        Some(path) if path != compiler => {
            println!("  Compiler:    {} ({})", compiler.display(), path.display())
        }
        _ => println!("  Compiler:    {}", compiler.display()),
    }
    if let Some(linker) = toolchain.linker() {
        println!("  Linker:      {}", linker.display());
    }

    print_list("Flags", toolchain.compile_flags());
    print_list("Link flags", toolchain.link_flags());
    print_list("Defines", toolchain.defines());
    print_list("Undefines", toolchain.undefines());
    print_list("Libraries", toolchain.libraries());

    for dir in toolchain.include_dirs() {
        println!("  Include:     {}", dir.display());
    }
    for dir in toolchain.library_dirs() {
        println!("  Lib dir:     {}", dir.display());
    }

    println!("  Extension:   {}", toolchain.shared_object_suffix());
    if !toolchain.host_version().is_empty() {
        println!("  Host:        {}", toolchain.host_version());
    }
}

fn print_list(label: &str, items: &[String]) {
    if !items.is_empty() {
        println!("  {:<12} {}", format!("{}:", label), items.join(" "));
    }
}
