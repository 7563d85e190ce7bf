//! Interactive layout editor.
//!
//! Load sequencing is a small state machine: the background settles
//! before elements so stacking matches the headless renderer. Loads are
//! ticketed with a generation counter; a reload invalidates every ticket
//! issued before it, so a slow response from a previous load can never
//! clobber the current scene.

use crate::{
    error::{CartazError, CartazResult},
    factory::{self, ElementFactory},
    fonts::FontLibrary,
    format::OutputFormat,
    history::HistoryBuffer,
    model::{EventData, Layout, Position, Size},
    scene::{Background, DecodedImage, NodeId, Scene, SceneEvent, SceneMode},
    serializer,
    store::{ByteFetcher, CachedLayouts, LayoutStore},
    text::metrics::{TextMeasurer, TextMetrics},
};

const MAX_LOAD_RETRIES: u32 = 3;
const NUDGE_SMALL: f64 = 1.0;
const NUDGE_LARGE: f64 = 10.0;
const BACKGROUND_FETCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
const EDITOR_BACKGROUND_FALLBACK: crate::model::Rgba8 =
    crate::model::Rgba8::opaque(0x2b, 0x2b, 0x2b);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditorState {
    Idle,
    Initializing,
    LoadingBackground,
    LoadingElements,
    Ready,
    /// Load retries exhausted; only a manual reload leaves this state.
    Error,
}

/// Editor over one `(template, format)` layout at a preview scale.
pub struct LayoutEditor<'a, S: LayoutStore> {
    store: &'a CachedLayouts<S>,
    fetcher: &'a dyn ByteFetcher,
    template_id: String,
    format: OutputFormat,
    scale: f64,
    preview: EventData,

    state: EditorState,
    generation: u64,
    retries: u32,

    scene: Scene,
    fonts: FontLibrary,
    metrics: TextMetrics,
    alt_measurer: Option<Box<dyn TextMeasurer + Send>>,

    /// Layout the scene was last built from; id/style reference for the
    /// serializer.
    source_layout: Option<Layout>,
    /// Current serialized draft; persisted only by [`Self::save`].
    draft: Option<Layout>,
    history: HistoryBuffer,
}

impl<'a, S: LayoutStore> LayoutEditor<'a, S> {
    pub fn new(
        store: &'a CachedLayouts<S>,
        fetcher: &'a dyn ByteFetcher,
        template_id: impl Into<String>,
        format: OutputFormat,
        scale: f64,
        preview: EventData,
    ) -> CartazResult<Self> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(CartazError::validation("editor scale must be finite and > 0"));
        }
        let spec = format.spec();
        let scene = Scene::new(
            SceneMode::Interactive,
            (f64::from(spec.width) * scale).round() as u32,
            (f64::from(spec.height) * scale).round() as u32,
        );
        Ok(Self {
            store,
            fetcher,
            template_id: template_id.into(),
            format,
            scale,
            preview,
            state: EditorState::Idle,
            generation: 0,
            retries: 0,
            scene,
            fonts: FontLibrary::new(),
            metrics: TextMetrics::new(),
            alt_measurer: None,
            source_layout: None,
            draft: None,
            history: HistoryBuffer::new(),
        })
    }

    pub fn with_measurer(mut self, measurer: Box<dyn TextMeasurer + Send>) -> Self {
        self.alt_measurer = Some(measurer);
        self
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn draft(&self) -> Option<&Layout> {
        self.draft.as_ref()
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn fonts_mut(&mut self) -> &mut FontLibrary {
        &mut self.fonts
    }

    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        self.scene.drain_events()
    }

    /// Begin a load and return its ticket. A ticket older than the
    /// current generation is stale and its completion is dropped.
    pub fn start_load(&mut self) -> u64 {
        self.state = EditorState::Initializing;
        self.generation
    }

    /// Run the load for a ticket; stale tickets are ignored.
    pub fn complete_load(&mut self, ticket: u64) {
        if ticket != self.generation {
            tracing::debug!(ticket, current = self.generation, "stale load dropped");
            return;
        }

        // Template record first: without it there is no background URL.
        let template = match self.store.get_template(&self.template_id) {
            Ok(t) => t,
            Err(err) => {
                self.retries += 1;
                tracing::warn!(%err, attempt = self.retries, "template fetch failed");
                if self.retries >= MAX_LOAD_RETRIES {
                    // Retries exhausted: the editor still comes up on the
                    // default layout over a flat background; only a manual
                    // reload leaves the error state.
                    self.scene
                        .set_background(Background::Color(EDITOR_BACKGROUND_FALLBACK));
                    let layout = factory::default_layout(&self.template_id, self.format);
                    self.build_elements(&layout);
                    self.source_layout = Some(layout);
                    self.state = EditorState::Error;
                    self.reserialize();
                } else {
                    self.complete_load(ticket);
                }
                return;
            }
        };

        self.state = EditorState::LoadingBackground;
        let background_url = template
            .as_ref()
            .and_then(|t| t.image_url_for(self.format))
            .map(str::to_string);
        self.load_background(background_url.as_deref());
        if ticket != self.generation {
            return;
        }

        self.state = EditorState::LoadingElements;
        let layout = match self.store.get_layout(&self.template_id, self.format, false) {
            Ok(Some(layout)) => layout,
            Ok(None) => factory::default_layout(&self.template_id, self.format),
            Err(err) => {
                // Stored layout unavailable; the editor stays usable with
                // the default elements.
                tracing::warn!(%err, "layout fetch failed; using defaults");
                factory::default_layout(&self.template_id, self.format)
            }
        };
        if ticket != self.generation {
            return;
        }

        self.build_elements(&layout);
        self.source_layout = Some(layout);
        self.state = EditorState::Ready;
        self.reserialize();
    }

    pub fn load(&mut self) {
        let ticket = self.start_load();
        self.complete_load(ticket);
    }

    /// Manual reload: resets the retry budget and invalidates in-flight
    /// loads.
    pub fn reload(&mut self) {
        self.generation += 1;
        self.retries = 0;
        self.history.clear();
        self.load();
    }

    fn load_background(&mut self, url: Option<&str>) {
        let decoded = url.ok_or_else(|| CartazError::resource("template has no background"))
            .and_then(|u| self.fetcher.fetch(u, BACKGROUND_FETCH_TIMEOUT))
            .and_then(|bytes| DecodedImage::decode(&bytes));
        match decoded {
            Ok(image) => self.scene.set_background(Background::Image(image)),
            Err(err) => {
                tracing::warn!(%err, "editor background unavailable; using flat color");
                self.scene
                    .set_background(Background::Color(EDITOR_BACKGROUND_FALLBACK));
            }
        }
    }

    fn build_elements(&mut self, layout: &Layout) {
        let background = self.scene.background().cloned();
        self.scene.clear();
        if let Some(bg) = background {
            self.scene.set_background(bg);
        }

        let elements = layout.deduped_elements();
        let mut factory = ElementFactory::new(
            self.format,
            self.scale,
            &mut self.fonts,
            &mut self.metrics,
            self.fetcher,
        );
        if let Some(m) = self.alt_measurer.as_deref_mut() {
            factory = factory.with_measurer(m);
        }
        for el in &elements {
            if let Err(err) = factory.create_node(&mut self.scene, el, &self.preview, 0.0) {
                tracing::error!(id = %el.id, %err, "element failed in editor; skipped");
            }
        }
    }

    fn require_ready(&self) -> CartazResult<()> {
        if self.state == EditorState::Ready {
            Ok(())
        } else {
            Err(CartazError::validation(format!(
                "editor is not ready (state {:?})",
                self.state
            )))
        }
    }

    fn reserialize(&mut self) {
        match serializer::serialize_scene(
            &self.scene,
            &self.template_id,
            self.format,
            self.scale,
            self.source_layout.as_ref(),
        ) {
            Ok(layout) => {
                self.history.push(layout.clone());
                self.draft = Some(layout);
            }
            Err(err) => tracing::error!(%err, "draft serialization failed"),
        }
    }

    pub fn select_at(&mut self, x: f64, y: f64) -> Option<NodeId> {
        let hit = self.scene.hit_test(x, y);
        self.scene.select(hit);
        hit
    }

    pub fn selection(&self) -> Option<NodeId> {
        self.scene.selection()
    }

    /// Arrow-key nudge: 1 native px, 10 with the modifier held.
    pub fn nudge_selection(&mut self, dx: i32, dy: i32, large: bool) -> CartazResult<()> {
        self.require_ready()?;
        let Some(id) = self.scene.selection() else {
            return Ok(());
        };
        let step = if large { NUDGE_LARGE } else { NUDGE_SMALL };
        self.scene.translate_node(
            id,
            f64::from(dx) * step * self.scale,
            f64::from(dy) * step * self.scale,
        );
        self.reserialize();
        Ok(())
    }

    /// Commit a drag to a new position (scene coordinates).
    pub fn move_selection_to(&mut self, position: Position) -> CartazResult<()> {
        self.require_ready()?;
        if let Some(id) = self.scene.selection() {
            self.scene.set_node_position(id, position);
            self.reserialize();
        }
        Ok(())
    }

    pub fn resize_selection(&mut self, size: Size) -> CartazResult<()> {
        self.require_ready()?;
        if let Some(id) = self.scene.selection() {
            self.scene.resize_node(id, size);
            self.reserialize();
        }
        Ok(())
    }

    /// Delete/Backspace: remove the selected element.
    pub fn delete_selection(&mut self) -> CartazResult<()> {
        self.require_ready()?;
        if let Some(id) = self.scene.selection() {
            self.scene.remove_node(id);
            self.reserialize();
        }
        Ok(())
    }

    /// Restore the previous draft and rebuild the scene from it.
    pub fn undo(&mut self) -> CartazResult<bool> {
        self.require_ready()?;
        let Some(previous) = self.history.undo() else {
            return Ok(false);
        };
        self.build_elements(&previous);
        self.draft = Some(previous);
        Ok(true)
    }

    /// Persist the current draft. Storage failure is surfaced, not
    /// swallowed.
    pub fn save(&mut self) -> CartazResult<()> {
        self.require_ready()?;
        let Some(draft) = self.draft.clone() else {
            return Err(CartazError::validation("nothing to save"));
        };
        self.store.save_layout(&draft)?;
        self.source_layout = Some(draft);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{Field, LessonThemeBoxStyle},
        store::{MemoryFetcher, MemoryStore, TemplateFormat, TemplateRecord},
        text::metrics::FixedAdvanceMeasurer,
    };

    fn preview() -> EventData {
        EventData {
            title: "Aulão".to_string(),
            class_theme: "Tema da aula".to_string(),
            date: "10/03".to_string(),
            time: "19h".to_string(),
            teacher_names: vec!["Ana".to_string()],
            teacher_images: vec!["teachers/ana.png".to_string()],
            location: None,
            caption: None,
            text_color: "#ffffff".to_string(),
            box_color: None,
            box_font_color: None,
            lesson_theme_box_style: LessonThemeBoxStyle::Green,
        }
    }

    fn store_with_template() -> CachedLayouts<MemoryStore> {
        let store = MemoryStore::new();
        store.insert_template(TemplateRecord {
            template_id: "t1".to_string(),
            formats: vec![TemplateFormat {
                format_name: OutputFormat::Feed,
                image_url: "backgrounds/feed.png".to_string(),
            }],
        });
        CachedLayouts::new(store)
    }

    fn editor<'a>(
        store: &'a CachedLayouts<MemoryStore>,
        fetcher: &'a MemoryFetcher,
    ) -> LayoutEditor<'a, MemoryStore> {
        LayoutEditor::new(store, fetcher, "t1", OutputFormat::Feed, 1.0, preview())
            .unwrap()
            .with_measurer(Box::new(FixedAdvanceMeasurer::default()))
    }

    #[test]
    fn load_lands_ready_with_default_elements() {
        let store = store_with_template();
        let fetcher = MemoryFetcher::new();
        let mut ed = editor(&store, &fetcher);

        assert_eq!(ed.state(), EditorState::Idle);
        ed.load();
        assert_eq!(ed.state(), EditorState::Ready);
        // No stored layout: defaults include the theme box.
        assert!(ed.scene().node_for_field(Field::ClassTheme).is_some());
        assert!(ed.draft().is_some());
    }

    #[test]
    fn stale_ticket_is_dropped_after_reload() {
        let store = store_with_template();
        let fetcher = MemoryFetcher::new();
        let mut ed = editor(&store, &fetcher);

        let stale = ed.start_load();
        ed.reload(); // bumps generation and completes its own load
        assert_eq!(ed.state(), EditorState::Ready);
        let draft_before = ed.draft().cloned();

        ed.complete_load(stale);
        assert_eq!(ed.draft().map(|d| d.elements.len()),
                   draft_before.map(|d| d.elements.len()));
        assert_eq!(ed.state(), EditorState::Ready);
    }

    struct OfflineStore;

    impl LayoutStore for OfflineStore {
        fn get_layout(&self, _: &str, _: OutputFormat) -> CartazResult<Option<Layout>> {
            Err(CartazError::storage("layout backend offline"))
        }
        fn save_layout(&self, _: &Layout) -> CartazResult<()> {
            Err(CartazError::storage("layout backend offline"))
        }
        fn get_template(
            &self,
            _: &str,
        ) -> CartazResult<Option<crate::store::TemplateRecord>> {
            Err(CartazError::storage("layout backend offline"))
        }
    }

    #[test]
    fn exhausted_retries_still_show_the_default_layout() {
        let store = CachedLayouts::new(OfflineStore);
        let fetcher = MemoryFetcher::new();
        let mut ed =
            LayoutEditor::new(&store, &fetcher, "t1", OutputFormat::Feed, 1.0, preview())
                .unwrap()
                .with_measurer(Box::new(FixedAdvanceMeasurer::default()));

        ed.load();
        assert_eq!(ed.state(), EditorState::Error);
        // Default elements over the flat fallback background.
        assert!(ed.scene().node_count() > 0);
        assert!(ed.scene().node_for_field(Field::ClassTheme).is_some());
        assert!(matches!(
            ed.scene().background(),
            Some(Background::Color(_))
        ));
        assert!(ed.draft().is_some());
    }

    #[test]
    fn nudge_moves_selection_and_updates_the_draft() {
        let store = store_with_template();
        let fetcher = MemoryFetcher::new();
        let mut ed = editor(&store, &fetcher);
        ed.load();

        let id = ed.scene().node_for_field(Field::Date).unwrap();
        let before = ed.scene().node(id).unwrap().position;
        ed.scene.select(Some(id));

        ed.nudge_selection(1, 0, false).unwrap();
        ed.nudge_selection(0, 1, true).unwrap();

        let after = ed.scene().node(id).unwrap().position;
        assert_eq!(after.x, before.x + 1.0);
        assert_eq!(after.y, before.y + 10.0);

        let draft = ed.draft().unwrap();
        let date = draft.elements.iter().find(|e| e.field == Field::Date).unwrap();
        assert_eq!(date.position.x, after.x);
    }

    #[test]
    fn delete_removes_the_element_from_the_draft() {
        let store = store_with_template();
        let fetcher = MemoryFetcher::new();
        let mut ed = editor(&store, &fetcher);
        ed.load();

        let id = ed.scene().node_for_field(Field::Time).unwrap();
        ed.scene.select(Some(id));
        ed.delete_selection().unwrap();

        assert!(ed.scene().node_for_field(Field::Time).is_none());
        let draft = ed.draft().unwrap();
        assert!(!draft.elements.iter().any(|e| e.field == Field::Time));
    }

    #[test]
    fn undo_restores_the_previous_draft() {
        let store = store_with_template();
        let fetcher = MemoryFetcher::new();
        let mut ed = editor(&store, &fetcher);
        ed.load();

        let id = ed.scene().node_for_field(Field::Date).unwrap();
        let original_x = ed.scene().node(id).unwrap().position.x;
        ed.scene.select(Some(id));
        ed.nudge_selection(5, 0, true).unwrap();

        assert!(ed.undo().unwrap());
        let draft = ed.draft().unwrap();
        let date = draft.elements.iter().find(|e| e.field == Field::Date).unwrap();
        assert_eq!(date.position.x, original_x);
    }

    #[test]
    fn save_persists_the_draft_through_the_store() {
        let store = store_with_template();
        let fetcher = MemoryFetcher::new();
        let mut ed = editor(&store, &fetcher);
        ed.load();

        let id = ed.scene().node_for_field(Field::Date).unwrap();
        ed.scene.select(Some(id));
        ed.nudge_selection(3, 0, false).unwrap();
        ed.save().unwrap();

        let stored = store
            .get_layout("t1", OutputFormat::Feed, true)
            .unwrap()
            .unwrap();
        assert!(stored.elements.iter().any(|e| e.field == Field::Date));
    }

    #[test]
    fn mutations_require_ready_state() {
        let store = store_with_template();
        let fetcher = MemoryFetcher::new();
        let mut ed = editor(&store, &fetcher);
        assert!(ed.nudge_selection(1, 0, false).is_err());
        assert!(ed.delete_selection().is_err());
        assert!(ed.save().is_err());
    }

    #[test]
    fn rejects_degenerate_scale() {
        let store = store_with_template();
        let fetcher = MemoryFetcher::new();
        assert!(
            LayoutEditor::new(&store, &fetcher, "t1", OutputFormat::Feed, 0.0, preview())
                .is_err()
        );
    }
}
