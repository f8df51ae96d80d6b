//! Build script rendering the `fsorch` manual pages.
//!
//! Writes `fsorch.1` plus one `fsorch-<subcommand>.1` page per subcommand
//! into the build output directory.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Command, CommandFactory};
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn render_page(command: Command, title: &str, target: &Path) -> io::Result<()> {
    let mut page = Vec::new();
    Man::new(command).title(title).render(&mut page)?;
    fs::write(target, page)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir = env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "OUT_DIR was not set"))?;

    let command = Cli::command();
    for subcommand in command.get_subcommands() {
        let name = format!("fsorch-{}", subcommand.get_name());
        render_page(
            subcommand.clone(),
            &name,
            &out_dir.join(format!("{name}.1")),
        )?;
    }
    render_page(command, "fsorch", &out_dir.join("fsorch.1"))?;

    Ok(())
}
