//! LibreOffice in headless mode.
//!
//! Each attempt gets its own user profile under the scratch directory, so
//! concurrent conversions never fight over `~/.config/libreoffice` locks and
//! a crashed run leaves nothing behind. LibreOffice always names its output
//! `<input stem>.<target ext>` inside `--outdir`; the adapter picks it up from
//! there and moves it to the requested path.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use engine_locate::{LocateOptions, Located};
use serde_json::{json, Value};
use tracing::info;

use super::{process, EngineAdapter, EngineJob, EngineStatus};
use crate::config::QualityTier;
use crate::error::ConvertError;
use crate::format::{DocumentFormat, EngineId};

const ENGINE: EngineId = EngineId::LibreOffice;

pub struct LibreOfficeAdapter {
    locate: LocateOptions,
}

impl LibreOfficeAdapter {
    pub fn new(locate: LocateOptions) -> Self {
        Self { locate }
    }

    fn resolve(&self) -> Result<Located, ConvertError> {
        engine_locate::locate(&engine_locate::libreoffice(), &self.locate)
            .map_err(|e| super::not_found(ENGINE, e))
    }
}

#[async_trait]
impl EngineAdapter for LibreOfficeAdapter {
    fn id(&self) -> EngineId {
        ENGINE
    }

    async fn convert(&self, job: &EngineJob) -> Result<(), ConvertError> {
        let soffice = self.resolve()?;
        let out_dir = job.scratch_dir.join("out");
        let profile = job.scratch_dir.join("profile");
        for dir in [&out_dir, &profile] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ConvertError::io(dir, e))?;
        }

        let args = build_args(job, &out_dir, &profile);
        process::run(ENGINE, &soffice.path, &args, Some(&job.scratch_dir), job.deadline).await?;

        let produced = out_dir.join(format!(
            "{}.{}",
            super::stem(&job.input),
            job.pair.target().extension()
        ));
        let bytes = super::verify_output(ENGINE, &produced).await?;
        super::move_into_place(&produced, &job.output).await?;
        info!(pair = %job.pair, bytes, source = %soffice.source, "libreoffice conversion complete");
        Ok(())
    }

    fn status(&self) -> EngineStatus {
        EngineStatus::located(ENGINE, self.resolve())
    }
}

/// Full `soffice` argument list for `job`.
pub(crate) fn build_args(job: &EngineJob, out_dir: &Path, profile: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "--headless",
        "--invisible",
        "--norestore",
        "--nolockcheck",
        "--nodefault",
        "--nofirststartwizard",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(format!("-env:UserInstallation={}", file_url(profile)).into());

    let source = job.pair.source();
    if source == DocumentFormat::Pdf {
        args.push("--infilter=writer_pdf_import".into());
    }
    args.push("--convert-to".into());
    args.push(convert_to(source, job.pair.target(), job.quality).into());
    args.push("--outdir".into());
    args.push(out_dir.as_os_str().to_owned());
    args.push(job.input.as_os_str().to_owned());
    args
}

/// `--convert-to` value: `<ext>[:<filter>[:<options>]]`.
pub(crate) fn convert_to(source: DocumentFormat, target: DocumentFormat, quality: QualityTier) -> String {
    use DocumentFormat as F;
    match target {
        F::Pdf => format!("pdf:{}:{}", pdf_export_filter(source), pdf_filter_options(quality)),
        F::Docx => "docx:MS Word 2007 XML".into(),
        F::Odt => "odt:writer8".into(),
        F::Html => "html:XHTML Writer File:UTF8".into(),
        F::Xlsx => "xlsx:Calc MS Excel 2007 XML".into(),
        F::Pptx => "pptx:Impress MS PowerPoint 2007 XML".into(),
        // comma separator, double-quote delimiter, UTF-8
        F::Csv => "csv:Text - txt - csv (StarCalc):44,34,76,1".into(),
        other => other.extension().into(),
    }
}

fn pdf_export_filter(source: DocumentFormat) -> &'static str {
    use DocumentFormat as F;
    match source {
        F::Xlsx | F::Xls | F::Ods | F::Csv => "calc_pdf_Export",
        F::Pptx | F::Ppt | F::Odp => "impress_pdf_Export",
        F::Html => "writer_web_pdf_Export",
        _ => "writer_pdf_Export",
    }
}

/// PDF export options as LibreOffice's JSON filter-data syntax.
pub(crate) fn pdf_filter_options(quality: QualityTier) -> Value {
    let long = |v: u32| json!({ "type": "long", "value": v.to_string() });
    let boolean = |v: bool| json!({ "type": "boolean", "value": v.to_string() });

    let mut opts = json!({
        "ExportBookmarks": boolean(true),
        "EmbedStandardFonts": boolean(true),
        "ExportNotes": boolean(false),
        "UseTaggedPDF": boolean(true),
    });
    let tier = match quality {
        QualityTier::Draft => json!({
            "ReduceImageResolution": boolean(true),
            "MaxImageResolution": long(150),
            "Quality": long(75),
        }),
        QualityTier::Standard => json!({
            "ReduceImageResolution": boolean(true),
            "MaxImageResolution": long(300),
            "Quality": long(90),
        }),
        QualityTier::High => json!({
            "ReduceImageResolution": boolean(false),
            "UseLosslessCompression": boolean(true),
            // PDF/A-2b
            "SelectPdfVersion": long(2),
        }),
    };
    if let (Some(base), Value::Object(extra)) = (opts.as_object_mut(), tier) {
        base.extend(extra);
    }
    opts
}

/// `file://` URL for a local directory, as `-env:UserInstallation` wants.
pub(crate) fn file_url(path: &Path) -> String {
    let abs: PathBuf = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let s = abs.to_string_lossy().replace('\\', "/").replace(' ', "%20");
    if s.starts_with('/') {
        format!("file://{s}")
    } else {
        format!("file:///{s}")
    }
}
