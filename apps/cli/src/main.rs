use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use rustsketchpad_core::{
    check_sketch_file, recognized_base, NameValidator, Sketch, StderrLog, StrictNameValidator,
};

#[derive(Parser)]
#[command(
    name = "rustsketchpad-cli",
    about = "Utility commands for RustSketchPad sketches",
    author,
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 依編輯器順序列出草稿分頁與行數。 / List sketch tabs in editor order with line counts.
    Tabs {
        /// 主檔路徑,或草稿資料夾內的任一檔案。 / Primary file, or any file inside the sketch folder.
        primary: PathBuf,
    },
    /// 刪除分頁並清掉對應的建置產物。 / Delete a tab along with its build artifacts.
    Remove {
        primary: PathBuf,
        /// 要刪除的分頁檔名。 / File name of the tab to delete.
        file_name: String,
        /// 建置輸出資料夾,可重複指定。 / Build output folder, repeatable.
        #[arg(long = "build-dir", value_name = "PATH")]
        build_dirs: Vec<PathBuf>,
    },
    /// 重新命名輔助分頁的後盾檔案。 / Rename an auxiliary tab's backing file.
    Rename {
        primary: PathBuf,
        file_name: String,
        new_name: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Tabs { primary } => tabs(primary),
        Commands::Remove {
            primary,
            file_name,
            build_dirs,
        } => remove(primary, &file_name, &build_dirs),
        Commands::Rename {
            primary,
            file_name,
            new_name,
        } => rename(primary, &file_name, &new_name),
    }
}

fn open_sketch(primary: PathBuf) -> Result<Sketch> {
    let primary = check_sketch_file(&primary).unwrap_or(primary);
    let folder = primary
        .parent()
        .map(|parent| parent.display().to_string())
        .unwrap_or_default();
    let mut sketch = Sketch::new(primary, Box::new(StderrLog));
    sketch
        .load(&StrictNameValidator)
        .with_context(|| format!("failed to load sketch in {folder}"))?;
    Ok(sketch)
}

fn position_of(sketch: &Sketch, file_name: &str) -> Result<usize> {
    sketch
        .files()
        .iter()
        .position(|file| file.file_name() == file_name)
        .ok_or_else(|| anyhow!("no tab named {} in sketch {}", file_name, sketch.name()))
}

fn tabs(primary: PathBuf) -> Result<()> {
    let sketch = open_sketch(primary)?;
    println!("{} ({} tabs)", sketch.name(), sketch.file_count());
    for file in sketch.files() {
        println!("  {:<24} {:>5} lines", file.display_name(), file.line_count());
    }
    Ok(())
}

fn remove(primary: PathBuf, file_name: &str, build_dirs: &[PathBuf]) -> Result<()> {
    let mut sketch = open_sketch(primary)?;
    let position = position_of(&sketch, file_name)?;
    if position == 0 {
        bail!("refusing to remove the primary tab {file_name}");
    }

    let id = sketch.file(position).id();
    sketch
        .file(position)
        .delete(build_dirs)
        .with_context(|| format!("failed to delete {file_name}"))?;
    sketch.remove_by_identity(id);

    println!("removed {file_name}");
    Ok(())
}

fn rename(primary: PathBuf, file_name: &str, new_name: &str) -> Result<()> {
    let base = recognized_base(new_name)
        .ok_or_else(|| anyhow!("{new_name} does not end in a recognized sketch extension"))?;
    if !StrictNameValidator.is_sanitary(base) {
        bail!("{new_name} is not a valid tab name");
    }

    let mut sketch = open_sketch(primary)?;
    let position = position_of(&sketch, file_name)?;
    if position == 0 {
        bail!("renaming the primary tab is not supported");
    }

    let new_path = sketch.folder().join(new_name);
    if new_path.exists() {
        bail!("{new_name} already exists in this sketch");
    }
    sketch
        .file_mut(position)
        .rename_to(&new_path)
        .with_context(|| format!("failed to rename {file_name}"))?;
    sketch.sort_files();

    println!("renamed {file_name} -> {new_name}");
    Ok(())
}
