//! Multi-format generation fan-out.
//!
//! One render per configured format, in parallel, each independently
//! guarded: a failing format is reported, not fatal. Layouts are fetched
//! with force-refresh so generation always sees the latest saved state.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::{
    error::{CartazError, CartazResult},
    format::OutputFormat,
    model::EventData,
    renderer::{RenderRequest, RenderedAsset, Renderer},
    store::{ByteFetcher, CachedLayouts, LayoutStore},
};

/// A format that did not produce an image.
#[derive(Clone, Debug)]
pub struct FormatFailure {
    pub format: OutputFormat,
    pub error: String,
}

/// Outcome of one generation run.
#[derive(Debug)]
pub struct GenerationReport {
    /// Successful renders, in the requested format order.
    pub images: Vec<RenderedAsset>,
    pub failed_formats: Vec<FormatFailure>,
}

impl GenerationReport {
    pub fn requested(&self) -> usize {
        self.images.len() + self.failed_formats.len()
    }
}

/// Progress callback: `(completed, total)`, called as each format settles.
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize) + Sync);

pub struct GenerateOptions {
    pub formats: Vec<OutputFormat>,
    /// Worker threads for the fan-out pool; `None` sizes to the format
    /// count.
    pub threads: Option<usize>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            formats: OutputFormat::ALL.to_vec(),
            threads: None,
        }
    }
}

/// Render every configured format for a template.
///
/// Event data is validated once, up front: empty teacher photos fail the
/// whole run instead of rendering photo-less assets. `make_renderer`
/// builds one renderer per worker thread.
pub fn generate_all<S, F>(
    store: &CachedLayouts<S>,
    fetcher: &dyn ByteFetcher,
    template_id: &str,
    event: &EventData,
    options: &GenerateOptions,
    make_renderer: F,
    progress: Option<ProgressFn<'_>>,
) -> CartazResult<GenerationReport>
where
    S: LayoutStore,
    F: Fn() -> Renderer + Sync,
{
    event.validate()?;
    if options.formats.is_empty() {
        return Err(CartazError::validation("no formats requested"));
    }

    let template = store
        .get_template(template_id)?
        .ok_or_else(|| CartazError::storage(format!("template '{template_id}' not found")))?;

    let total = options.formats.len();
    let completed = AtomicUsize::new(0);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.threads.unwrap_or(total))
        .build()
        .map_err(|e| CartazError::render(format!("worker pool: {e}")))?;

    let results: Vec<(OutputFormat, CartazResult<RenderedAsset>)> = pool.install(|| {
        options
            .formats
            .par_iter()
            .map_init(&make_renderer, |renderer, &format| {
                let outcome = render_format(
                    store,
                    fetcher,
                    renderer,
                    &template,
                    template_id,
                    format,
                    event,
                );
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(cb) = progress {
                    cb(done, total);
                }
                (format, outcome)
            })
            .collect()
    });

    let mut images = Vec::new();
    let mut failed_formats = Vec::new();
    for (format, outcome) in results {
        match outcome {
            Ok(asset) => images.push(asset),
            Err(err) => {
                tracing::error!(%format, %err, "format generation failed");
                failed_formats.push(FormatFailure {
                    format,
                    error: err.to_string(),
                });
            }
        }
    }

    tracing::info!(
        succeeded = images.len(),
        failed = failed_formats.len(),
        "generation finished"
    );
    Ok(GenerationReport {
        images,
        failed_formats,
    })
}

fn render_format<S: LayoutStore>(
    store: &CachedLayouts<S>,
    fetcher: &dyn ByteFetcher,
    renderer: &mut Renderer,
    template: &crate::store::TemplateRecord,
    template_id: &str,
    format: OutputFormat,
    event: &EventData,
) -> CartazResult<RenderedAsset> {
    let background_url = template.image_url_for(format).ok_or_else(|| {
        CartazError::storage(format!("template has no background for {format}"))
    })?;
    // Always bypass the layout cache: a save made seconds ago must be
    // visible to this run.
    let layout = store.get_layout(template_id, format, true)?;
    let request = RenderRequest::for_format(template_id, background_url, format, layout);
    renderer.render(fetcher, &request, event)
}
