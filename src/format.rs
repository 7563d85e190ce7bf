//! Static output-format table.
//!
//! Every format the generator produces is described here, at compile time.
//! Native pixel dimensions are never derived from an uploaded template
//! image; changing this table changes generation output for every consumer.

/// A named output format accepted by the orchestrator.
///
/// Wire names match the persisted layout records (`bannerGCO`, `LP`, ...).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum OutputFormat {
    #[serde(rename = "youtube")]
    Youtube,
    #[serde(rename = "feed")]
    Feed,
    #[serde(rename = "stories")]
    Stories,
    #[serde(rename = "bannerGCO")]
    BannerGco,
    #[serde(rename = "ledStudio")]
    LedStudio,
    #[serde(rename = "LP")]
    Lp,
}

/// Horizontal alignment of text inside an auto-sized box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TextAlign {
    Left,
    Center,
}

/// Boundary-validation regime for a format.
///
/// `Minimal` corrects only negative positions and positions entirely past
/// the canvas edge; the standard margin formula is too aggressive for
/// extreme aspect ratios and destroys intentional near-edge placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationMode {
    Standard,
    Minimal,
}

/// Per-format rendering constants.
#[derive(Clone, Copy, Debug)]
pub struct FormatSpec {
    pub format: OutputFormat,
    /// Native canvas width in pixels.
    pub width: u32,
    /// Native canvas height in pixels.
    pub height: u32,
    /// Human-readable name used in export manifests.
    pub display_name: &'static str,
    /// Text alignment inside lesson-theme boxes.
    pub text_align: TextAlign,
    /// Fixed lesson-theme box height when the text does not wrap.
    pub box_height: f64,
    /// Horizontal padding inside lesson-theme boxes.
    pub box_pad_x: f64,
    /// Vertical padding inside lesson-theme boxes.
    pub box_pad_y: f64,
    /// Maximum line width for lesson-theme text breaking.
    pub theme_max_width: f64,
    /// Decimal places kept when serializing positions/sizes.
    pub round_decimals: u32,
    pub validation: ValidationMode,
}

const SPECS: [FormatSpec; 6] = [
    FormatSpec {
        format: OutputFormat::Youtube,
        width: 1920,
        height: 1080,
        display_name: "YouTube Thumbnail",
        text_align: TextAlign::Left,
        box_height: 100.0,
        box_pad_x: 32.0,
        box_pad_y: 18.0,
        theme_max_width: 1700.0,
        round_decimals: 2,
        validation: ValidationMode::Standard,
    },
    FormatSpec {
        format: OutputFormat::Feed,
        width: 1080,
        height: 1080,
        display_name: "Instagram Feed",
        text_align: TextAlign::Left,
        box_height: 90.0,
        box_pad_x: 28.0,
        box_pad_y: 16.0,
        theme_max_width: 980.0,
        round_decimals: 2,
        validation: ValidationMode::Standard,
    },
    FormatSpec {
        format: OutputFormat::Stories,
        width: 1080,
        height: 1920,
        display_name: "Instagram Stories",
        text_align: TextAlign::Left,
        box_height: 90.0,
        box_pad_x: 28.0,
        box_pad_y: 16.0,
        theme_max_width: 980.0,
        round_decimals: 2,
        validation: ValidationMode::Standard,
    },
    FormatSpec {
        format: OutputFormat::BannerGco,
        width: 255,
        height: 192,
        display_name: "GCO Banner",
        text_align: TextAlign::Center,
        box_height: 40.0,
        box_pad_x: 8.0,
        box_pad_y: 5.0,
        theme_max_width: 220.0,
        round_decimals: 3,
        validation: ValidationMode::Minimal,
    },
    FormatSpec {
        format: OutputFormat::LedStudio,
        width: 1024,
        height: 256,
        display_name: "LED Studio Display",
        text_align: TextAlign::Left,
        box_height: 70.0,
        box_pad_x: 20.0,
        box_pad_y: 12.0,
        theme_max_width: 700.0,
        round_decimals: 2,
        validation: ValidationMode::Standard,
    },
    FormatSpec {
        format: OutputFormat::Lp,
        width: 800,
        height: 776,
        display_name: "Landing Page",
        text_align: TextAlign::Center,
        box_height: 80.0,
        box_pad_x: 24.0,
        box_pad_y: 14.0,
        theme_max_width: 640.0,
        round_decimals: 2,
        validation: ValidationMode::Standard,
    },
];

impl OutputFormat {
    /// All formats, in generation order.
    pub const ALL: [OutputFormat; 6] = [
        OutputFormat::Youtube,
        OutputFormat::Feed,
        OutputFormat::Stories,
        OutputFormat::BannerGco,
        OutputFormat::LedStudio,
        OutputFormat::Lp,
    ];

    pub fn spec(self) -> &'static FormatSpec {
        match self {
            OutputFormat::Youtube => &SPECS[0],
            OutputFormat::Feed => &SPECS[1],
            OutputFormat::Stories => &SPECS[2],
            OutputFormat::BannerGco => &SPECS[3],
            OutputFormat::LedStudio => &SPECS[4],
            OutputFormat::Lp => &SPECS[5],
        }
    }

    /// Persisted name (`youtube`, `bannerGCO`, `LP`, ...).
    pub fn wire_name(self) -> &'static str {
        match self {
            OutputFormat::Youtube => "youtube",
            OutputFormat::Feed => "feed",
            OutputFormat::Stories => "stories",
            OutputFormat::BannerGco => "bannerGCO",
            OutputFormat::LedStudio => "ledStudio",
            OutputFormat::Lp => "LP",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.wire_name() == name)
    }
}

impl FormatSpec {
    pub fn area(&self) -> f64 {
        f64::from(self.width) * f64::from(self.height)
    }

    /// Area-driven correction margin.
    ///
    /// Smaller canvases get tighter margins: a fixed margin consumes a larger
    /// fraction of a small canvas.
    pub fn margin(&self) -> f64 {
        let area = self.area();
        if area < 60_000.0 {
            4.0
        } else if area < 500_000.0 {
            8.0
        } else {
            15.0
        }
    }

    pub fn canvas_rect(&self) -> kurbo::Rect {
        kurbo::Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}
