use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::policy::{NameValidator, StatusLog};
use crate::sketch_file::{FileId, SketchFile, SketchFileError};

/// 主要草稿副檔名。 / Primary sketch extensions.
pub const SKETCH_EXTENSIONS: [&str; 2] = ["ino", "pde"];
/// 其他允許的原始碼副檔名。 / Other allowed source extensions.
pub const OTHER_ALLOWED_EXTENSIONS: [&str; 6] = ["c", "cpp", "h", "hh", "hpp", "s"];

fn recognized_extensions() -> impl Iterator<Item = &'static str> {
    SKETCH_EXTENSIONS
        .iter()
        .chain(OTHER_ALLOWED_EXTENSIONS.iter())
        .copied()
}

/// 若檔名以允許的副檔名結尾（不分大小寫），回傳去掉副檔名的基底。 / Returns the base name when the file name ends in an allowed extension, case-insensitively.
pub fn recognized_base(file_name: &str) -> Option<&str> {
    for extension in recognized_extensions() {
        let suffix_len = extension.len() + 1;
        if file_name.len() <= suffix_len {
            continue;
        }
        let split = file_name.len() - suffix_len;
        if !file_name.is_char_boundary(split) {
            continue;
        }
        let (base, suffix) = file_name.split_at(split);
        if suffix.starts_with('.') && suffix[1..].eq_ignore_ascii_case(extension) {
            return Some(base);
        }
    }
    None
}

/// 草稿集合操作的錯誤。 / Errors raised by sketch set operations.
#[derive(Debug, Error)]
pub enum SketchError {
    #[error("unable to list files from {folder}: {source}")]
    List {
        folder: PathBuf,
        #[source]
        source: io::Error,
    },
    /// 與一般 I/O 錯誤區分,讓呼叫端能提供修復選項。 / Distinct from plain I/O errors so callers can offer recovery.
    #[error("no valid code files found")]
    NoValidFiles,
    #[error(transparent)]
    File(#[from] SketchFileError),
}

/// 一份草稿：主檔加上同資料夾內的輔助原始碼分頁。 / A sketch: the primary file plus auxiliary source tabs in the same folder.
///
/// The set is not internally synchronised; callers sharing a sketch
/// across threads must serialise access externally.
pub struct Sketch<M = ()> {
    primary_file: PathBuf,
    folder: PathBuf,
    name: String,
    files: Vec<SketchFile<M>>,
    log: Box<dyn StatusLog>,
}

impl<M: fmt::Debug> fmt::Debug for Sketch<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sketch")
            .field("primary_file", &self.primary_file)
            .field("folder", &self.folder)
            .field("name", &self.name)
            .field("files", &self.files)
            .finish_non_exhaustive()
    }
}

impl<M> Sketch<M> {
    /// 由主檔路徑建立草稿；不做任何 I/O。 / Creates a sketch from its primary file path without touching the disk.
    pub fn new(primary_path: impl Into<PathBuf>, log: Box<dyn StatusLog>) -> Self {
        let primary_file = primary_path.into();
        let file_name = primary_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = strip_primary_extension(&file_name);
        let folder = primary_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            primary_file,
            folder,
            name,
            files: Vec::new(),
            log,
        }
    }

    /// 草稿名稱（主檔名去掉副檔名）。 / Sketch name (primary file name minus its extension).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_file(&self) -> &Path {
        &self.primary_file
    }

    /// 草稿所在資料夾。 / Folder containing the sketch.
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// `data` 子資料夾位置（可能尚未存在）。 / Location of the `data` subfolder (may not exist yet).
    pub fn data_folder(&self) -> PathBuf {
        self.folder.join("data")
    }

    /// `code` 子資料夾位置（可能尚未存在）。 / Location of the `code` subfolder (may not exist yet).
    pub fn code_folder(&self) -> PathBuf {
        self.folder.join("code")
    }

    pub fn default_extension(&self) -> &'static str {
        "ino"
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// 依目前順序回傳所有分頁。 / Returns the tabs in their current order.
    pub fn files(&self) -> &[SketchFile<M>] {
        &self.files
    }

    /// 取得指定位置的分頁。 / Returns the tab at `index`.
    ///
    /// # Panics
    ///
    /// Panics when `index` is out of range; passing a valid index is a
    /// caller precondition, like slice indexing.
    pub fn file(&self, index: usize) -> &SketchFile<M> {
        &self.files[index]
    }

    /// 取得指定位置的可變分頁。 / Returns the tab at `index` mutably.
    ///
    /// # Panics
    ///
    /// Panics when `index` is out of range.
    pub fn file_mut(&mut self, index: usize) -> &mut SketchFile<M> {
        &mut self.files[index]
    }

    /// 掃描資料夾並重建分頁集合。 / Scans the folder and rebuilds the tab set from scratch.
    ///
    /// Hidden entries and directories are skipped; files whose base name
    /// fails the validator are logged and skipped. Fails with
    /// [`SketchError::List`] when the folder cannot be listed and with
    /// [`SketchError::NoValidFiles`] when nothing eligible was found.
    /// Afterwards the primary tab (when discovered) sits at index 0 and
    /// the rest is sorted by file name.
    pub fn load(&mut self, validator: &dyn NameValidator) -> Result<(), SketchError>
    where
        M: Default,
    {
        self.files.clear();

        let entries = fs::read_dir(&self.folder).map_err(|source| SketchError::List {
            folder: self.folder.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| SketchError::List {
                folder: self.folder.clone(),
                source,
            })?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            // 點字首的項目涵蓋隱藏檔與 macOS 的 ._ 資源分支。 / Dot-prefixed entries cover hidden files and macOS ._ resource forks.
            if file_name.starts_with('.') {
                continue;
            }
            if entry.path().is_dir() {
                continue;
            }
            let Some(base) = recognized_base(&file_name) else {
                continue;
            };
            if validator.is_sanitary(base) {
                self.files
                    .push(SketchFile::new(entry.path(), M::default(), self.log.as_ref()));
            } else {
                self.log
                    .log(&format!("File name {file_name} is invalid: ignored"));
            }
        }

        if self.files.is_empty() {
            return Err(SketchError::NoValidFiles);
        }

        if let Some(position) = self
            .files
            .iter()
            .position(|file| file.path() == self.primary_file)
        {
            let primary = self.files.remove(position);
            self.files.insert(0, primary);
        }
        self.sort_files();
        Ok(())
    }

    /// 依序儲存每個已修改的分頁；第一個失敗即中止。 / Saves every dirty tab in order; the first failure aborts.
    ///
    /// Tabs saved before the failing one remain saved (no rollback).
    pub fn save(&mut self) -> Result<(), SketchError> {
        for file in &mut self.files {
            if file.is_dirty() {
                file.save()?;
            }
        }
        Ok(())
    }

    /// 附加分頁到尾端。呼叫端需自行保證檔名唯一。 / Appends a tab. Callers must pre-validate file-name uniqueness.
    pub fn add_file(&mut self, file: SketchFile<M>) {
        self.files.push(file);
    }

    /// 將分頁移到索引 0；不在集合中時靜默略過。 / Moves the tab to index 0; silently a no-op when absent.
    pub fn move_to_front(&mut self, id: FileId) {
        if let Some(position) = self.index_of(id) {
            let file = self.files.remove(position);
            self.files.insert(0, file);
        }
    }

    /// 以檔名比對,原位置換掉第一個同名分頁；無同名者時不變動。 / Replaces the first tab with the same file name in place; no match means no change.
    pub fn replace_by_name(&mut self, new_file: SketchFile<M>) {
        let name = new_file.file_name();
        if let Some(position) = self.files.iter().position(|file| file.file_name() == name) {
            self.files[position] = new_file;
        }
    }

    /// 依識別碼移除分頁；找不到時記錄內部錯誤。 / Removes the tab by identity; logs an internal error when missing.
    pub fn remove_by_identity(&mut self, id: FileId) {
        match self.index_of(id) {
            Some(position) => {
                self.files.remove(position);
            }
            None => self
                .log
                .log("remove_by_identity: internal error, could not find tab"),
        }
    }

    /// 回傳分頁的目前索引。 / Returns the tab's current index, if present.
    pub fn index_of(&self, id: FileId) -> Option<usize> {
        self.files.iter().position(|file| file.id() == id)
    }

    /// 將索引 0 之後的分頁依檔名排序；主檔不在集合時整體排序。 / Sorts tabs after index 0 by file name; sorts everything when the primary is absent.
    pub fn sort_files(&mut self) {
        if self.files.len() < 2 {
            return;
        }
        let start = usize::from(self.files[0].path() == self.primary_file);
        self.files[start..].sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    }
}

/// 於資料夾內尋找以資料夾命名的主檔。 / Resolves a path inside a sketch folder to the folder-named primary file.
///
/// When `file` itself is already `<folder>.ino` / `<folder>.pde` it is
/// returned as-is; otherwise the sibling candidates are probed on disk.
pub fn check_sketch_file(file: &Path) -> Option<PathBuf> {
    let parent = file.parent()?;
    let parent_name = parent.file_name()?.to_string_lossy();
    let file_name = file.file_name()?.to_string_lossy();

    for extension in SKETCH_EXTENSIONS {
        if file_name == format!("{parent_name}.{extension}") {
            return Some(file.to_path_buf());
        }
    }
    // 兩者都存在時偏好較舊的 .pde 主檔。 / The older .pde primary wins when both candidates exist.
    for extension in SKETCH_EXTENSIONS.iter().rev() {
        let candidate = parent.join(format!("{parent_name}.{extension}"));
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

fn strip_primary_extension(file_name: &str) -> String {
    for extension in SKETCH_EXTENSIONS {
        let suffix_len = extension.len() + 1;
        if file_name.len() <= suffix_len {
            continue;
        }
        let split = file_name.len() - suffix_len;
        if !file_name.is_char_boundary(split) {
            continue;
        }
        let (base, suffix) = file_name.split_at(split);
        if suffix.starts_with('.') && suffix[1..].eq_ignore_ascii_case(extension) {
            return base.to_string();
        }
    }
    match file_name.rfind('.') {
        Some(dot) => file_name[..dot].to_string(),
        None => file_name.to_string(),
    }
}
