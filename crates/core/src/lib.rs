//! Sketch/tab management primitives for RustSketchPad.
//! 管理 RustSketchPad 草稿分頁集合的核心模組。

pub mod policy;
pub mod sketch;
pub mod sketch_file;
pub mod text;

pub use policy::{NameValidator, StatusLog, StderrLog, StrictNameValidator};
pub use sketch::{
    check_sketch_file, recognized_base, Sketch, SketchError, OTHER_ALLOWED_EXTENSIONS,
    SKETCH_EXTENSIONS,
};
pub use sketch_file::{FileId, SketchFile, SketchFileError};
