//! Cartaz is a template-driven marketing-asset compositor.
//!
//! Operators position layout elements on a visual canvas per template and
//! output format; generation takes live event data (theme, date, teacher
//! photos) and deterministically re-renders every format headlessly.
//! The public API has three entry points:
//!
//! - [`editor::LayoutEditor`] — interactive element placement over a
//!   scaled preview scene
//! - [`renderer::Renderer`] — headless layout-plus-event-data rendering
//!   of one format
//! - [`generate::generate_all`] — parallel fan-out over every format
#![forbid(unsafe_code)]

pub mod bounds;
pub mod editor;
pub mod error;
pub mod factory;
pub mod fonts;
pub mod format;
pub mod generate;
pub mod history;
pub mod model;
pub mod photos;
pub mod renderer;
pub mod scene;
pub mod serializer;
pub mod store;
pub mod text;

pub use crate::error::{CartazError, CartazResult};
pub use crate::format::{FormatSpec, OutputFormat};
pub use crate::generate::{GenerateOptions, GenerationReport, generate_all};
pub use crate::model::{ElementDescriptor, EventData, Layout, LessonThemeBoxStyle};
pub use crate::renderer::{RenderRequest, RenderedAsset, Renderer};
pub use crate::store::{ByteFetcher, CachedLayouts, LayoutStore};
