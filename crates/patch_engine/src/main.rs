use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context};

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args_os().skip(1);
    let (Some(target), Some(patch_path)) = (args.next(), args.next()) else {
        bail!("usage: apply_patch <file> <patch-file>");
    };

    let target = PathBuf::from(target);
    let patch_path = PathBuf::from(patch_path);
    let patch = fs::read_to_string(&patch_path)
        .with_context(|| format!("failed to read patch file {}", patch_path.display()))?;

    let mut stdout = io::stdout().lock();
    patch_engine::apply_patch_to_file(&target, &patch, &mut stdout)
        .with_context(|| format!("failed to patch {}", target.display()))?;

    Ok(())
}
