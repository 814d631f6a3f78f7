//! Document conversion port and the per-job scratch directory.
//!
//! The converter itself lives in an adapter crate; this module owns the parts
//! every implementation shares: filename hygiene, the scoped job directory and
//! output validation.

use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tempfile::TempDir;
use tracing::debug;
use zip::ZipArchive;

use crate::errors::ConversionError;

pub const SOURCE_EXTENSION: &str = "xls";
pub const TARGET_EXTENSION: &str = "xlsx";

const LEGACY_SPREADSHEET_MIMES: &[&str] = &["application/vnd.ms-excel", "application/msexcel"];
const MAX_STEM_CHARS: usize = 100;

/// Converts a legacy spreadsheet into an xlsx workbook.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert(
        &self,
        bytes: Vec<u8>,
        declared_filename: &str,
    ) -> Result<Vec<u8>, ConversionError>;
}

/// `.xls` by extension, or by the legacy Excel MIME type when the name has none.
pub fn is_legacy_spreadsheet(file_name: Option<&str>, mime: Option<&str>) -> bool {
    // A declared extension wins over the (client supplied) MIME type.
    if let Some(ext) = file_name.and_then(|n| extension_of(&basename(n))) {
        return ext == SOURCE_EXTENSION;
    }
    mime.map(|m| m.trim().to_lowercase())
        .is_some_and(|m| LEGACY_SPREADSHEET_MIMES.contains(&m.as_str()))
}

/// Last path component, accepting both separators.
pub fn basename(name: &str) -> String {
    name.rsplit(['/', '\\']).next().unwrap_or_default().to_string()
}

/// Lower-cased extension, if any.
pub fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Reduce a user-supplied name to a safe basename for use on disk.
///
/// Only `[A-Za-z0-9._-]` survive; leading dots and dashes are dropped so the
/// result is never hidden, never `..` and never parsed as a CLI flag.
pub fn sanitize_filename(name: &str) -> String {
    let base = basename(name);
    let mut out = String::with_capacity(base.len());
    for ch in base.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    let out = out.trim_start_matches(['.', '-']).to_string();

    let (stem, ext) = match out.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), Some(ext.to_string())),
        None => (out.clone(), None),
    };
    let out = if stem.chars().count() > MAX_STEM_CHARS {
        let stem = stem.chars().take(MAX_STEM_CHARS).collect::<String>();
        match ext {
            Some(ext) => format!("{stem}.{ext}"),
            None => stem,
        }
    } else {
        out
    };

    if out.is_empty() || out.chars().all(|c| c == '_' || c == '.') {
        "document".to_string()
    } else {
        out
    }
}

/// Same stem, new extension: `report.xls` -> `report.xlsx`.
pub fn derive_output_name(name: &str, extension: &str) -> String {
    let base = basename(name);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base.as_str(),
    };
    let stem = if stem.trim().is_empty() { "document" } else { stem };
    format!("{stem}.{extension}")
}

/// Scratch space for one conversion.
///
/// Owns a private temp directory holding the input and the expected output.
/// The directory is removed when the job is dropped, whichever way the
/// conversion ended.
#[derive(Debug)]
pub struct ConversionJob {
    dir: TempDir,
    input: PathBuf,
    output: PathBuf,
}

impl ConversionJob {
    /// Create the job directory under `temp_root` and write the input there.
    pub async fn prepare(
        temp_root: &Path,
        bytes: &[u8],
        declared_filename: &str,
    ) -> Result<Self, ConversionError> {
        tokio::fs::create_dir_all(temp_root).await?;
        let dir = tempfile::Builder::new()
            .prefix("cxb-job-")
            .tempdir_in(temp_root)?;

        let mut input_name = sanitize_filename(declared_filename);
        if extension_of(&input_name).is_none() {
            // The converter picks its import filter by extension.
            input_name = format!("{input_name}.{SOURCE_EXTENSION}");
        }
        let output_name = derive_output_name(&input_name, TARGET_EXTENSION);

        let input = dir.path().join(&input_name);
        let output = dir.path().join(output_name);
        tokio::fs::write(&input, bytes).await?;
        debug!(dir = %dir.path().display(), input = %input_name, "conversion job prepared");

        Ok(Self { dir, input, output })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn input_path(&self) -> &Path {
        &self.input
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Read and validate the converter's output.
    pub async fn read_output(&self) -> Result<Vec<u8>, ConversionError> {
        let bytes = match tokio::fs::read(&self.output).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConversionError::OutputMissing)
            }
            Err(e) => return Err(e.into()),
        };
        verify_xlsx(&bytes)?;
        Ok(bytes)
    }

    /// Remove the job directory now and report failures.
    pub fn close(self) -> Result<(), ConversionError> {
        self.dir.close()?;
        Ok(())
    }
}

/// An xlsx is a zip package with a `[Content_Types].xml` part.
pub fn verify_xlsx(bytes: &[u8]) -> Result<(), ConversionError> {
    if bytes.is_empty() {
        return Err(ConversionError::OutputMissing);
    }
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ConversionError::CorruptOutput(format!("zip error: {e}")))?;
    if archive.by_name("[Content_Types].xml").is_err() {
        return Err(ConversionError::CorruptOutput(
            "missing [Content_Types].xml".to_string(),
        ));
    }
    Ok(())
}
