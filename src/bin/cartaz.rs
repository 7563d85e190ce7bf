use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use cartaz::{
    CachedLayouts, EventData, Layout, LayoutStore as _, OutputFormat, RenderRequest, Renderer,
    bounds::{self, Bounds},
    generate::{GenerateOptions, generate_all},
    store::{FsFetcher, MemoryStore, TemplateRecord},
};

#[derive(Parser, Debug)]
#[command(name = "cartaz", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one format as a PNG.
    Render(RenderArgs),
    /// Render every format of a template into a directory.
    Generate(GenerateArgs),
    /// Check a stored layout against its format's canvas.
    ValidateLayout(ValidateArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Template record JSON.
    #[arg(long)]
    template: PathBuf,

    /// Event data JSON.
    #[arg(long)]
    event: PathBuf,

    /// Output format name (`youtube`, `feed`, `stories`, `bannerGCO`,
    /// `ledStudio`, `LP`).
    #[arg(long)]
    format: String,

    /// Stored layout JSON; defaults when omitted.
    #[arg(long)]
    layout: Option<PathBuf>,

    /// Root directory for backgrounds, fonts and photos.
    #[arg(long, default_value = ".")]
    assets: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    /// Template record JSON.
    #[arg(long)]
    template: PathBuf,

    /// Event data JSON.
    #[arg(long)]
    event: PathBuf,

    /// Directory of stored layouts, one `<format>.json` per format.
    #[arg(long)]
    layouts: Option<PathBuf>,

    /// Root directory for backgrounds, fonts and photos.
    #[arg(long, default_value = ".")]
    assets: PathBuf,

    /// Output directory; one `<format>.png` per successful format.
    #[arg(long)]
    out_dir: PathBuf,
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Layout JSON to check.
    #[arg(long)]
    layout: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Generate(args) => cmd_generate(args),
        Command::ValidateLayout(args) => cmd_validate(args),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    let f = File::open(path).with_context(|| format!("open {what} '{}'", path.display()))?;
    serde_json::from_reader(BufReader::new(f)).with_context(|| format!("parse {what} JSON"))
}

fn parse_format(name: &str) -> anyhow::Result<OutputFormat> {
    OutputFormat::parse(name).with_context(|| format!("unknown format '{name}'"))
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let format = parse_format(&args.format)?;
    let template: TemplateRecord = read_json(&args.template, "template")?;
    let event: EventData = read_json(&args.event, "event data")?;
    let layout: Option<Layout> = match &args.layout {
        Some(path) => Some(read_json(path, "layout")?),
        None => None,
    };

    let background_url = template
        .image_url_for(format)
        .with_context(|| format!("template has no background for {format}"))?;
    let fetcher = FsFetcher::new(&args.assets);
    let mut renderer = Renderer::new();

    let request =
        RenderRequest::for_format(&template.template_id, background_url, format, layout);
    let asset = renderer.render(&fetcher, &request, &event)?;

    std::fs::write(&args.out, &asset.png_bytes)
        .with_context(|| format!("write '{}'", args.out.display()))?;
    println!(
        "{} ({}x{}) -> {}",
        asset.display_name,
        asset.width,
        asset.height,
        args.out.display()
    );
    Ok(())
}

fn cmd_generate(args: GenerateArgs) -> anyhow::Result<()> {
    let template: TemplateRecord = read_json(&args.template, "template")?;
    let event: EventData = read_json(&args.event, "event data")?;
    let template_id = template.template_id.clone();

    let store = MemoryStore::new();
    if let Some(dir) = &args.layouts {
        for format in OutputFormat::ALL {
            let path = dir.join(format!("{format}.json"));
            if path.exists() {
                let layout: Layout = read_json(&path, "layout")?;
                store
                    .save_layout(&layout)
                    .with_context(|| format!("stage layout for {format}"))?;
            }
        }
    }
    store.insert_template(template);
    let store = CachedLayouts::new(store);
    let fetcher = FsFetcher::new(&args.assets);

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("create '{}'", args.out_dir.display()))?;

    let progress = |done: usize, total: usize| {
        tracing::info!(done, total, "format finished");
    };
    let report = generate_all(
        &store,
        &fetcher,
        &template_id,
        &event,
        &GenerateOptions::default(),
        Renderer::new,
        Some(&progress),
    )?;

    for asset in &report.images {
        let out = args.out_dir.join(format!("{}.png", asset.format));
        std::fs::write(&out, &asset.png_bytes)
            .with_context(|| format!("write '{}'", out.display()))?;
        println!("{} -> {}", asset.display_name, out.display());
    }
    for failure in &report.failed_formats {
        eprintln!("{}: {}", failure.format, failure.error);
    }
    if report.images.is_empty() {
        anyhow::bail!("all formats failed");
    }
    Ok(())
}

fn cmd_validate(args: ValidateArgs) -> anyhow::Result<()> {
    let layout: Layout = read_json(&args.layout, "layout")?;
    let format = layout.format_name;
    let mut violations = 0usize;

    for el in layout.deduped_elements() {
        let checked = Bounds::new(
            el.position.x,
            el.position.y,
            el.size.width,
            el.size.height,
        );
        let report = bounds::validate_position(&checked, format);
        if !report.is_valid {
            violations += report.violations.len();
            let corrected = bounds::constrain_to_canvas(&checked, format, None);
            for v in &report.violations {
                println!(
                    "{} ({}): {v}; corrected position ({}, {})",
                    el.id, el.field, corrected.x, corrected.y
                );
            }
        }
    }

    let duplicates = layout.elements.len() - layout.deduped_elements().len();
    if duplicates > 0 {
        println!("{duplicates} duplicate field(s) removed on load");
    }
    if violations == 0 {
        println!("layout ok");
        Ok(())
    } else {
        anyhow::bail!("{violations} boundary violation(s)")
    }
}
