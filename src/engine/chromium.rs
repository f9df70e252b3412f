//! Headless Chromium printing styled HTML to PDF.
//!
//! The source is lowered to HTML by [`super::markup`] on the blocking pool,
//! written into the scratch directory, and printed with `--print-to-pdf`.
//! Page size and margins come from the `@page` rule; the window size only
//! affects layout of viewport-relative CSS.

use std::ffi::OsString;
use std::path::Path;

use async_trait::async_trait;
use engine_locate::{LocateOptions, Located};
use tracing::info;

use super::{markup, process, EngineAdapter, EngineJob, EngineStatus};
use crate::config::{PageLayout, QualityTier};
use crate::error::ConvertError;
use crate::format::{DocumentFormat, EngineId};

const ENGINE: EngineId = EngineId::Chromium;

/// Milliseconds of virtual time granted for fonts and images to settle.
const VIRTUAL_TIME_BUDGET_MS: u32 = 5_000;

pub struct ChromiumAdapter {
    locate: LocateOptions,
    layout: PageLayout,
}

impl ChromiumAdapter {
    pub fn new(locate: LocateOptions, layout: PageLayout) -> Self {
        Self { locate, layout }
    }

    fn resolve(&self) -> Result<Located, ConvertError> {
        engine_locate::locate(&engine_locate::chromium(), &self.locate)
            .map_err(|e| super::not_found(ENGINE, e))
    }
}

#[async_trait]
impl EngineAdapter for ChromiumAdapter {
    fn id(&self) -> EngineId {
        ENGINE
    }

    async fn convert(&self, job: &EngineJob) -> Result<(), ConvertError> {
        if job.pair.target() != DocumentFormat::Pdf {
            return Err(ConvertError::EngineExecution {
                engine: ENGINE.to_string(),
                detail: format!("cannot produce {}", job.pair.target()),
            });
        }
        let chromium = self.resolve()?;

        let input = job.input.clone();
        let source = job.pair.source();
        let layout = self.layout;
        let quality = job.quality;
        let html = job
            .deadline
            .run(ENGINE, async move {
                tokio::task::spawn_blocking(move || build_html(&input, source, &layout, quality))
                    .await
                    .map_err(|e| ConvertError::Internal(format!("markup task failed: {e}")))?
            })
            .await?;

        let page = job.scratch_dir.join("render.html");
        let produced = job.scratch_dir.join("render.pdf");
        let profile = job.scratch_dir.join("profile");
        tokio::fs::write(&page, html)
            .await
            .map_err(|e| ConvertError::io(&page, e))?;
        tokio::fs::create_dir_all(&profile)
            .await
            .map_err(|e| ConvertError::io(&profile, e))?;

        let args = build_args(&page, &produced, &profile, &self.layout, job.quality);
        process::run(ENGINE, &chromium.path, &args, Some(&job.scratch_dir), job.deadline).await?;

        let bytes = super::verify_output(ENGINE, &produced).await?;
        super::move_into_place(&produced, &job.output).await?;
        info!(pair = %job.pair, bytes, source = %chromium.source, "chromium render complete");
        Ok(())
    }

    fn status(&self) -> EngineStatus {
        EngineStatus::located(ENGINE, self.resolve())
    }
}

/// Lower `input` to a complete HTML document. Blocking.
pub(crate) fn build_html(
    input: &Path,
    source: DocumentFormat,
    layout: &PageLayout,
    quality: QualityTier,
) -> Result<String, ConvertError> {
    let title = super::stem(input);
    let read = || std::fs::read_to_string(input).map_err(|e| ConvertError::io(input, e));
    let blocks = match source {
        DocumentFormat::Html => return Ok(markup::inject_page_style(&read()?, layout)),
        DocumentFormat::Markdown => markup::from_markdown(&read()?),
        DocumentFormat::Txt => markup::from_text(&read()?),
        DocumentFormat::Docx => markup::from_docx(input).map_err(|e| ConvertError::EngineExecution {
            engine: ENGINE.to_string(),
            detail: format!("cannot read package: {e}"),
        })?,
        other => {
            return Err(ConvertError::EngineExecution {
                engine: ENGINE.to_string(),
                detail: format!("cannot render {other} sources"),
            })
        }
    };
    Ok(markup::render_document(&blocks, &title, layout, quality))
}

pub(crate) fn build_args(
    page: &Path,
    produced: &Path,
    profile: &Path,
    layout: &PageLayout,
    quality: QualityTier,
) -> Vec<OsString> {
    let (width, height) = layout.viewport_px();
    let mut args: Vec<OsString> = vec![
        "--headless".into(),
        "--disable-gpu".into(),
        "--disable-extensions".into(),
        "--disable-background-networking".into(),
        "--no-first-run".into(),
        "--no-default-browser-check".into(),
        "--no-pdf-header-footer".into(),
        format!("--user-data-dir={}", profile.display()).into(),
        format!("--window-size={width},{height}").into(),
        format!("--virtual-time-budget={VIRTUAL_TIME_BUDGET_MS}").into(),
    ];
    if quality == QualityTier::High {
        args.push("--force-device-scale-factor=2".into());
    }
    args.push(format!("--print-to-pdf={}", produced.display()).into());
    args.push(super::libreoffice::file_url(page).into());
    args
}
