use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::policy::StatusLog;
use crate::text;

static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(1);

/// 分頁在本程序內的唯一識別碼。 / Process-unique identity for a tab.
///
/// Carries the reference-identity notion used by set operations such as
/// [`crate::Sketch::remove_by_identity`], as opposed to the file-name
/// equality used by [`crate::Sketch::replace_by_name`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FileId(u64);

impl FileId {
    fn next() -> Self {
        Self(NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// 分頁檔案操作可能發生的錯誤。 / Errors raised by tab file operations.
#[derive(Debug, Error)]
pub enum SketchFileError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not delete build artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// 草稿中的單一分頁：記憶體內容加上磁碟身分。 / A single tab of a sketch: in-memory contents plus on-disk identity.
///
/// `M` is an opaque caller-supplied annotation; the core only stores and
/// returns it.
#[derive(Debug)]
pub struct SketchFile<M = ()> {
    id: FileId,
    path: PathBuf,
    content: String,
    dirty: bool,
    metadata: M,
}

impl<M> SketchFile<M> {
    /// 讀取指定路徑建立分頁；讀取失敗時僅記錄警告並保留空內容。 / Creates a tab by loading the file at `path`; load failures are logged and leave empty contents.
    pub fn new(path: impl Into<PathBuf>, metadata: M, log: &dyn StatusLog) -> Self {
        let path = path.into();
        let content = match text::load_file(&path) {
            Ok(loaded) => {
                if loaded.had_replacements {
                    log.log(&format!(
                        "\"{}\" contains unrecognized characters; the file may not be UTF-8 encoded",
                        file_name_of(&path)
                    ));
                }
                loaded.text
            }
            Err(err) => {
                log.log(&format!(
                    "Error while loading code {}: {}",
                    file_name_of(&path),
                    err
                ));
                String::new()
            }
        };
        Self {
            id: FileId::next(),
            path,
            content,
            dirty: false,
            metadata,
        }
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 檔名（含副檔名）。 / File name including its extension.
    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }

    /// 去掉副檔名的檔名。 / File name with the extension chopped off.
    pub fn pretty_name(&self) -> String {
        let name = self.file_name();
        match name.rfind('.') {
            Some(dot) => name[..dot].to_string(),
            None => name,
        }
    }

    /// 分頁標籤顯示名稱：`.ino` 檔不顯示副檔名。 / Tab label: `.ino` files hide their extension, everything else keeps it.
    pub fn display_name(&self) -> String {
        if self.file_name().to_lowercase().ends_with(".ino") {
            self.pretty_name()
        } else {
            self.file_name()
        }
    }

    /// 副檔名是否在給定清單內（不分大小寫）。 / Whether the extension matches one of the given ones, case-insensitively.
    pub fn has_extension(&self, extensions: &[&str]) -> bool {
        match self.path.extension() {
            Some(ext) => {
                let ext = ext.to_string_lossy();
                extensions.iter().any(|other| ext.eq_ignore_ascii_case(other))
            }
            None => false,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// 取代內容並一律標記為已修改（不做差異比對）。 / Replaces the contents, always marking the tab dirty (no diffing).
    pub fn set_content(&mut self, text: impl Into<String>) {
        self.content = text.into();
        self.dirty = true;
    }

    /// 內容中的換行數。 / Number of line breaks in the contents.
    pub fn line_count(&self) -> usize {
        text::count_lines(&self.content)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 標記為已修改。只有成功的載入或儲存能清除此旗標。 / Marks the tab dirty. Only a successful load or save clears the flag.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut M {
        &mut self.metadata
    }

    pub fn set_metadata(&mut self, metadata: M) {
        self.metadata = metadata;
    }

    /// 後盾檔案目前是否存在於磁碟。 / Whether the backing file currently exists on disk.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// 後盾檔案是否為唯讀。無法 stat 的檔案也視為不可寫。 / Whether the backing file is read-only for this process. A file we cannot stat counts as unwritable.
    pub fn is_read_only(&self) -> bool {
        fs::metadata(&self.path)
            .map(|meta| meta.permissions().readonly())
            .unwrap_or(true)
    }

    /// 重新命名後盾檔案；失敗時記憶體路徑維持不變。 / Renames the backing file; the in-memory path is untouched on failure.
    pub fn rename_to(&mut self, new_path: impl Into<PathBuf>) -> Result<(), SketchFileError> {
        let new_path = new_path.into();
        fs::rename(&self.path, &new_path).map_err(|source| SketchFileError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.path = new_path;
        Ok(())
    }

    /// 刪除後盾檔案，連同建置資料夾中以此檔名為前綴的產物。 / Deletes the backing file plus build artifacts prefixed by this tab's file name.
    ///
    /// Build folders that do not exist are skipped silently. When the
    /// primary delete fails the folders are left untouched; an artifact
    /// delete failure is reported even though the source file is already
    /// gone.
    pub fn delete(&self, build_dirs: &[PathBuf]) -> Result<(), SketchFileError> {
        fs::remove_file(&self.path).map_err(|source| SketchFileError::Io {
            path: self.path.clone(),
            source,
        })?;

        let prefix = self.file_name();
        for dir in build_dirs.iter().filter(|dir| dir.exists()) {
            delete_artifacts_from(dir, &prefix)?;
        }
        Ok(())
    }

    /// 無條件將內容寫回原路徑並清除 dirty。 / Unconditionally writes the contents back to `path`, clearing the dirty flag.
    pub fn save(&mut self) -> Result<(), SketchFileError> {
        text::save_file(&self.content, &self.path).map_err(|source| SketchFileError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.dirty = false;
        Ok(())
    }

    /// 另存到新路徑；本實例的 `path` 與 dirty 均不變動。 / Writes the contents to `new_path`; this instance keeps its own `path` and dirty state.
    ///
    /// The caller is expected to construct a fresh tab at the new path.
    pub fn save_as(&self, new_path: impl AsRef<Path>) -> Result<(), SketchFileError> {
        let new_path = new_path.as_ref();
        text::save_file(&self.content, new_path).map_err(|source| SketchFileError::Io {
            path: new_path.to_path_buf(),
            source,
        })
    }
}

fn delete_artifacts_from(dir: &Path, prefix: &str) -> Result<(), SketchFileError> {
    let entries = fs::read_dir(dir).map_err(|source| SketchFileError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| SketchFileError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        if !entry.file_name().to_string_lossy().starts_with(prefix) {
            continue;
        }
        let path = entry.path();
        fs::remove_file(&path).map_err(|source| SketchFileError::Artifact { path, source })?;
    }
    Ok(())
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CaptureLog(Arc<Mutex<Vec<String>>>);

    impl StatusLog for CaptureLog {
        fn log(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    impl CaptureLog {
        fn messages(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    #[test]
    fn loading_missing_file_logs_and_keeps_empty_content() {
        let dir = tempfile::tempdir().unwrap();
        let log = CaptureLog::default();

        let file: SketchFile = SketchFile::new(dir.path().join("gone.ino"), (), &log);
        assert_eq!(file.content(), "");
        assert!(!file.is_dirty());
        assert!(!file.exists());
        assert_eq!(log.messages().len(), 1);
        assert!(log.messages()[0].contains("gone.ino"));
    }

    #[test]
    fn read_only_is_true_when_the_backing_file_cannot_be_stated() {
        let dir = tempfile::tempdir().unwrap();
        let log = CaptureLog::default();

        let missing: SketchFile = SketchFile::new(dir.path().join("gone.ino"), (), &log);
        assert!(missing.is_read_only());

        let path = dir.path().join("Here.ino");
        fs::write(&path, "int x;\n").unwrap();
        let present: SketchFile = SketchFile::new(&path, (), &log);
        assert!(!present.is_read_only());
    }

    #[test]
    fn set_content_always_marks_dirty_even_for_identical_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Blink.ino");
        fs::write(&path, "void loop() {}\n").unwrap();

        let log = CaptureLog::default();
        let mut file: SketchFile = SketchFile::new(&path, (), &log);
        assert!(!file.is_dirty());

        let same = file.content().to_string();
        file.set_content(same);
        assert!(file.is_dirty());
    }

    #[test]
    fn save_clears_dirty_and_persists_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Blink.ino");
        fs::write(&path, "old").unwrap();

        let log = CaptureLog::default();
        let mut file: SketchFile = SketchFile::new(&path, (), &log);
        file.set_content("new body\n");
        file.save().unwrap();

        assert!(!file.is_dirty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "new body\n");

        // 未修改時儲存仍會寫入並保持 dirty 為 false。 / Saving a clean tab still writes and leaves dirty cleared.
        file.save().unwrap();
        assert!(!file.is_dirty());
    }

    #[test]
    fn save_as_leaves_path_and_dirty_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Blink.ino");
        fs::write(&path, "body").unwrap();

        let log = CaptureLog::default();
        let mut file: SketchFile = SketchFile::new(&path, (), &log);
        file.set_content("changed");

        let copy = dir.path().join("Copy.ino");
        file.save_as(&copy).unwrap();

        assert!(file.is_dirty());
        assert_eq!(file.path(), path);
        assert_eq!(fs::read_to_string(&copy).unwrap(), "changed");
    }

    #[test]
    fn rename_updates_path_only_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helpers.cpp");
        fs::write(&path, "int x;\n").unwrap();

        let log = CaptureLog::default();
        let mut file: SketchFile = SketchFile::new(&path, (), &log);

        let renamed = dir.path().join("util.cpp");
        file.rename_to(&renamed).unwrap();
        assert_eq!(file.path(), renamed);
        assert!(renamed.exists());
        assert!(!path.exists());

        // 來源已不存在,再次改名必定失敗且路徑不變。 / Renaming again from a missing source fails and leaves the path alone.
        fs::remove_file(&renamed).unwrap();
        let err = file.rename_to(dir.path().join("other.cpp"));
        assert!(err.is_err());
        assert_eq!(file.path(), renamed);
    }

    #[test]
    fn delete_removes_prefixed_build_artifacts_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Sketch.ino");
        fs::write(&path, "void setup() {}\n").unwrap();

        let build_dir = dir.path().join("build");
        fs::create_dir(&build_dir).unwrap();
        fs::write(build_dir.join("Sketch.ino.cpp"), "derived").unwrap();
        fs::write(build_dir.join("Sketch.ino.elf"), "derived").unwrap();
        fs::write(build_dir.join("Other.ino.cpp"), "derived").unwrap();

        let log = CaptureLog::default();
        let file: SketchFile = SketchFile::new(&path, (), &log);

        let missing_dir = dir.path().join("no-such-build");
        file.delete(&[build_dir.clone(), missing_dir]).unwrap();

        assert!(!path.exists());
        assert!(!build_dir.join("Sketch.ino.cpp").exists());
        assert!(!build_dir.join("Sketch.ino.elf").exists());
        assert!(build_dir.join("Other.ino.cpp").exists());
    }

    #[test]
    fn delete_reports_artifact_failure_even_though_source_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Sketch.ino");
        fs::write(&path, "void setup() {}\n").unwrap();

        let build_dir = dir.path().join("build");
        fs::create_dir(&build_dir).unwrap();
        // remove_file 對資料夾必定失敗,模擬無法刪除的產物。 / A directory defeats remove_file, standing in for an undeletable artifact.
        let stubborn = build_dir.join("Sketch.ino.d");
        fs::create_dir(&stubborn).unwrap();
        fs::write(stubborn.join("dep.txt"), "obj: src").unwrap();

        let log = CaptureLog::default();
        let file: SketchFile = SketchFile::new(&path, (), &log);

        let err = file.delete(&[build_dir]).unwrap_err();
        assert!(matches!(err, SketchFileError::Artifact { .. }));
        // 原始檔已刪除,呼叫端仍會收到失敗。 / The source file is gone, yet the caller sees a failure.
        assert!(!path.exists());
        assert!(stubborn.exists());
    }

    #[test]
    fn delete_fails_when_backing_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let log = CaptureLog::default();
        let file: SketchFile = SketchFile::new(dir.path().join("ghost.ino"), (), &log);

        assert!(file.delete(&[]).is_err());
    }

    #[test]
    fn line_count_reflects_current_content() {
        let dir = tempfile::tempdir().unwrap();
        let log = CaptureLog::default();
        let mut file: SketchFile = SketchFile::new(dir.path().join("new.ino"), (), &log);

        assert_eq!(file.line_count(), 0);
        file.set_content("a\nb\nc\n");
        assert_eq!(file.line_count(), 3);
    }

    #[test]
    fn names_follow_tab_label_conventions() {
        let dir = tempfile::tempdir().unwrap();
        let log = CaptureLog::default();

        let ino: SketchFile = SketchFile::new(dir.path().join("Blink.ino"), (), &log);
        assert_eq!(ino.pretty_name(), "Blink");
        assert_eq!(ino.display_name(), "Blink");
        assert!(ino.has_extension(&["ino", "pde"]));

        let header: SketchFile = SketchFile::new(dir.path().join("pins.h"), (), &log);
        assert_eq!(header.display_name(), "pins.h");
        assert!(!header.has_extension(&["ino", "pde"]));
    }

    #[test]
    fn metadata_is_stored_and_returned_opaquely() {
        let dir = tempfile::tempdir().unwrap();
        let log = CaptureLog::default();

        let mut file = SketchFile::new(dir.path().join("x.ino"), String::from("caret:12"), &log);
        assert_eq!(file.metadata(), "caret:12");
        file.set_metadata(String::from("caret:40"));
        assert_eq!(file.metadata(), "caret:40");
    }

    #[test]
    fn file_ids_are_unique_per_instance() {
        let dir = tempfile::tempdir().unwrap();
        let log = CaptureLog::default();
        let a: SketchFile = SketchFile::new(dir.path().join("a.ino"), (), &log);
        let b: SketchFile = SketchFile::new(dir.path().join("a.ino"), (), &log);
        assert_ne!(a.id(), b.id());
    }
}
