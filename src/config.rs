//! Configuration types for document conversion.
//!
//! Everything a [`crate::Converter`] needs is held in one
//! [`ConverterConfig`], built via [`ConverterConfigBuilder`]. Environment
//! overrides are applied by [`ConverterConfig::from_env`] or
//! [`ConverterConfigBuilder::env_overrides`]; explicit builder calls made
//! afterwards win over the environment.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConvertError;
use crate::format::EngineId;
use crate::telemetry::ObserverHandle;

/// Upper bound for every timeout knob (one week).
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Configuration for a [`crate::Converter`].
///
/// # Example
/// ```rust
/// use edgequake_docconv::{ConverterConfig, QualityTier};
///
/// let config = ConverterConfig::builder()
///     .max_conversions(2)
///     .libreoffice_timeout_secs(90)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_conversions, 2);
/// ```
#[derive(Clone)]
pub struct ConverterConfig {
    /// Root under which every per-request scratch directory is created.
    /// Default: `<system temp>/edgequake-docconv`.
    pub temp_root: PathBuf,

    /// Simultaneous conversions admitted by the gate. Default: 4.
    ///
    /// Each LibreOffice conversion is a full office process with a few hundred
    /// MB of resident memory; raise this only on hosts with the RAM for it.
    pub max_conversions: usize,

    /// Simultaneous file-access operations (package reads/writes). Default: 16.
    pub max_file_access: usize,

    /// How long a request may wait for a gate slot. Default: 300 s.
    pub gate_timeout_secs: u64,

    /// Hard wall-clock limit for one LibreOffice run. Default: 120 s.
    pub libreoffice_timeout_secs: u64,

    /// Hard wall-clock limit for one Chromium print. Default: 60 s.
    pub chromium_timeout_secs: u64,

    /// Limit for PDF text extraction + reconstruction. Default: 60 s.
    pub reconstruct_timeout_secs: u64,

    /// Run OOXML preprocessing on DOCX inputs unless a request opts out. Default: true.
    pub preprocess: bool,

    /// How the styles part is flattened. Default: [`StyleFlattening::ResolveInherited`].
    pub style_flattening: StyleFlattening,

    /// Explicit `soffice` path. Still subject to path validation.
    pub soffice_path: Option<PathBuf>,

    /// Explicit Chromium path. Still subject to path validation.
    pub chromium_path: Option<PathBuf>,

    /// Explicit pdfium shared library used for PDF text extraction.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Only ever use the engines bundled next to the application.
    pub force_bundled: bool,

    /// Application directory (bundled engines + allow-list anchor).
    /// Default: directory of the running executable.
    pub app_dir: Option<PathBuf>,

    /// Extra base directories engine executables may live under.
    pub extra_allowed_roots: Vec<PathBuf>,

    /// Page geometry for render-based conversions.
    pub page_layout: PageLayout,

    /// Receives a [`crate::telemetry::TelemetryEvent`] after every conversion.
    pub observer: Option<ObserverHandle>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            temp_root: std::env::temp_dir().join("edgequake-docconv"),
            max_conversions: 4,
            max_file_access: 16,
            gate_timeout_secs: 300,
            libreoffice_timeout_secs: 120,
            chromium_timeout_secs: 60,
            reconstruct_timeout_secs: 60,
            preprocess: true,
            style_flattening: StyleFlattening::default(),
            soffice_path: None,
            chromium_path: None,
            pdfium_lib_path: None,
            force_bundled: false,
            app_dir: engine_locate::current_app_dir(),
            extra_allowed_roots: Vec::new(),
            page_layout: PageLayout::default(),
            observer: None,
        }
    }
}

impl fmt::Debug for ConverterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterConfig")
            .field("temp_root", &self.temp_root)
            .field("max_conversions", &self.max_conversions)
            .field("max_file_access", &self.max_file_access)
            .field("gate_timeout_secs", &self.gate_timeout_secs)
            .field("libreoffice_timeout_secs", &self.libreoffice_timeout_secs)
            .field("chromium_timeout_secs", &self.chromium_timeout_secs)
            .field("reconstruct_timeout_secs", &self.reconstruct_timeout_secs)
            .field("preprocess", &self.preprocess)
            .field("style_flattening", &self.style_flattening)
            .field("soffice_path", &self.soffice_path)
            .field("chromium_path", &self.chromium_path)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("force_bundled", &self.force_bundled)
            .field("app_dir", &self.app_dir)
            .field("page_layout", &self.page_layout)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn ConversionObserver>"))
            .finish()
    }
}

impl ConverterConfig {
    pub fn builder() -> ConverterConfigBuilder {
        ConverterConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults overlaid with the `DOCCONV_*` / `PDFIUM_LIB_PATH` environment.
    pub fn from_env() -> Result<Self, ConvertError> {
        Self::builder().env_overrides()?.build()
    }

    /// Hard time limit for a single run of `engine`.
    pub fn engine_timeout(&self, engine: EngineId) -> Duration {
        let secs = match engine {
            EngineId::LibreOffice => self.libreoffice_timeout_secs,
            EngineId::Chromium => self.chromium_timeout_secs,
            EngineId::Reconstruct => self.reconstruct_timeout_secs,
        };
        Duration::from_secs(secs)
    }

    pub fn gate_timeout(&self) -> Duration {
        Duration::from_secs(self.gate_timeout_secs)
    }
}

/// Builder for [`ConverterConfig`].
#[derive(Debug)]
pub struct ConverterConfigBuilder {
    config: ConverterConfig,
}

impl ConverterConfigBuilder {
    pub fn temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_root = dir.into();
        self
    }

    pub fn max_conversions(mut self, n: usize) -> Self {
        self.config.max_conversions = n.max(1);
        self
    }

    pub fn max_file_access(mut self, n: usize) -> Self {
        self.config.max_file_access = n.max(1);
        self
    }

    pub fn gate_timeout_secs(mut self, secs: u64) -> Self {
        self.config.gate_timeout_secs = secs;
        self
    }

    pub fn libreoffice_timeout_secs(mut self, secs: u64) -> Self {
        self.config.libreoffice_timeout_secs = secs;
        self
    }

    pub fn chromium_timeout_secs(mut self, secs: u64) -> Self {
        self.config.chromium_timeout_secs = secs;
        self
    }

    pub fn reconstruct_timeout_secs(mut self, secs: u64) -> Self {
        self.config.reconstruct_timeout_secs = secs;
        self
    }

    pub fn preprocess(mut self, v: bool) -> Self {
        self.config.preprocess = v;
        self
    }

    pub fn style_flattening(mut self, mode: StyleFlattening) -> Self {
        self.config.style_flattening = mode;
        self
    }

    pub fn soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.soffice_path = Some(path.into());
        self
    }

    pub fn chromium_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chromium_path = Some(path.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn force_bundled(mut self, v: bool) -> Self {
        self.config.force_bundled = v;
        self
    }

    pub fn app_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.app_dir = Some(dir.into());
        self
    }

    pub fn allow_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.extra_allowed_roots.push(dir.into());
        self
    }

    pub fn page_layout(mut self, layout: PageLayout) -> Self {
        self.config.page_layout = layout;
        self
    }

    pub fn observer(mut self, observer: ObserverHandle) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Apply environment overrides from the process environment.
    pub fn env_overrides(self) -> Result<Self, ConvertError> {
        self.env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides read through `lookup`.
    pub fn env_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConvertError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DOCCONV_TEMP_ROOT") {
            self.config.temp_root = PathBuf::from(v);
        }
        if let Some(v) = get("DOCCONV_SOFFICE_PATH") {
            self.config.soffice_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("DOCCONV_CHROMIUM_PATH") {
            self.config.chromium_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("PDFIUM_LIB_PATH") {
            self.config.pdfium_lib_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("DOCCONV_FORCE_BUNDLED") {
            self.config.force_bundled = parse_flag(&v);
        }
        if let Some(v) = get("DOCCONV_MAX_CONVERSIONS") {
            let n: usize = v.trim().parse().map_err(|_| {
                ConvertError::Validation(format!(
                    "DOCCONV_MAX_CONVERSIONS must be a positive integer, got '{v}'"
                ))
            })?;
            self.config.max_conversions = n;
        }
        Ok(self)
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConverterConfig, ConvertError> {
        let c = &self.config;
        if c.max_conversions == 0 || c.max_file_access == 0 {
            return Err(ConvertError::Validation(
                "Concurrency limits must be ≥ 1".into(),
            ));
        }
        if c.libreoffice_timeout_secs == 0
            || c.chromium_timeout_secs == 0
            || c.reconstruct_timeout_secs == 0
        {
            return Err(ConvertError::Validation(
                "Engine timeouts must be ≥ 1s".into(),
            ));
        }
        let longest = c
            .gate_timeout_secs
            .max(c.libreoffice_timeout_secs)
            .max(c.chromium_timeout_secs)
            .max(c.reconstruct_timeout_secs);
        if longest > MAX_TIMEOUT_SECS {
            return Err(ConvertError::Validation(format!(
                "Timeouts must be ≤ {MAX_TIMEOUT_SECS}s, got {longest}s"
            )));
        }
        if c.temp_root.as_os_str().is_empty() {
            return Err(ConvertError::Validation("Temp root must not be empty".into()));
        }
        c.page_layout.validate()?;
        Ok(self.config)
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Output quality tier.
///
/// | Tier | LibreOffice PDF export | Chromium |
/// |------|------------------------|----------|
/// | Draft | 150 DPI images, JPEG 75 | scale 1.0, no backgrounds |
/// | Standard | 300 DPI images, JPEG 90 (default) | scale 1.0 |
/// | High | lossless images, no downsampling, PDF/A-2b | scale 1.0, backgrounds |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Draft,
    #[default]
    Standard,
    High,
}

impl std::str::FromStr for QualityTier {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(QualityTier::Draft),
            "standard" => Ok(QualityTier::Standard),
            "high" => Ok(QualityTier::High),
            other => Err(ConvertError::Validation(format!(
                "unknown quality tier '{other}' (expected draft, standard or high)"
            ))),
        }
    }
}

/// How the style-flattening phase treats `w:basedOn` chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StyleFlattening {
    /// Copy inherited paragraph/run/table properties into each style before
    /// removing `basedOn` / `next`. Keeps rendering unchanged. (default)
    #[default]
    ResolveInherited,
    /// Only remove `basedOn` / `next`; styles lose inherited properties.
    StripOnly,
}

/// Page geometry for render-based conversions. Millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    pub width_mm: f32,
    pub height_mm: f32,
    pub margin_mm: f32,
}

impl Default for PageLayout {
    /// A4 with 20 mm margins.
    fn default() -> Self {
        Self {
            width_mm: 210.0,
            height_mm: 297.0,
            margin_mm: 20.0,
        }
    }
}

impl PageLayout {
    pub fn letter() -> Self {
        Self {
            width_mm: 215.9,
            height_mm: 279.4,
            margin_mm: 25.4,
        }
    }

    /// CSS `@page` rule for print rendering.
    pub fn css_page_rule(&self) -> String {
        format!(
            "@page {{ size: {}mm {}mm; margin: {}mm; }}",
            self.width_mm, self.height_mm, self.margin_mm
        )
    }

    /// Viewport size in CSS pixels (96 DPI).
    pub fn viewport_px(&self) -> (u32, u32) {
        let px = |mm: f32| (mm / 25.4 * 96.0).round() as u32;
        (px(self.width_mm), px(self.height_mm))
    }

    fn validate(&self) -> Result<(), ConvertError> {
        if self.width_mm <= 0.0 || self.height_mm <= 0.0 || self.margin_mm < 0.0 {
            return Err(ConvertError::Validation(
                "Page dimensions must be positive".into(),
            ));
        }
        if self.margin_mm * 2.0 >= self.width_mm.min(self.height_mm) {
            return Err(ConvertError::Validation(format!(
                "Margin {}mm leaves no printable area on a {}×{}mm page",
                self.margin_mm, self.width_mm, self.height_mm
            )));
        }
        Ok(())
    }
}
