use std::path::Path;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use futures_util::future::join_all;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use imgrelay::ImagePipeline;
use imgrelay::domain::{Bitmap, LoadedFrom};
use imgrelay::infrastructure::{AppConfig, CliArgs, ConfigStore, LoadOptions};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry().with(filter).init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let store = ConfigStore::new()?;
    let mut config = store.load(args.config.as_deref())?;
    config.merge_with_args(args);
    Ok(config)
}

fn save_png(dir: &Path, index: usize, source: &str, bitmap: &Bitmap) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let stem: String = source
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("image")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let path = dir.join(format!("{index:03}-{stem}.png"));
    bitmap
        .save_with_format(&path, image::ImageFormat::Png)
        .wrap_err_with(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "Saved image");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!(version = imgrelay::VERSION, "Starting {}", imgrelay::NAME);

    let pipeline = ImagePipeline::builder()
        .config(config.pipeline.clone())
        .build()?;

    let mut options = LoadOptions::new();
    if let Some(tag) = &args.tag {
        options = options.tag(tag.as_str());
    }

    let loads = args.sources.iter().map(|source| {
        let pipeline = pipeline.clone();
        let request = args.build_request(source);
        let options = options.clone();
        async move {
            let loaded = pipeline.fetch_with(request?, options).await?;
            Ok::<(Bitmap, LoadedFrom), color_eyre::Report>(loaded)
        }
    });
    let results = join_all(loads).await;

    for (index, (source, result)) in args.sources.iter().zip(results).enumerate() {
        match result {
            Ok((bitmap, loaded_from)) => {
                println!(
                    "{source} -> {}x{} ({loaded_from})",
                    bitmap.width(),
                    bitmap.height()
                );
                if let Some(dir) = &args.output
                    && let Err(error) = save_png(dir, index, source, &bitmap)
                {
                    warn!(%error, "Could not save image");
                    eprintln!("{source}: {error:#}");
                }
            }
            Err(error) => println!("{source} -> error: {error}"),
        }
    }

    pipeline.shutdown();
    println!("{}", pipeline.stats());
    if let Some(cache) = pipeline.cache_stats() {
        println!(
            "cache: {} entries, {}/{} bytes, {:.1}% hit rate, {} evictions",
            cache.entries, cache.size, cache.max_size, cache.hit_rate, cache.evictions
        );
    }

    Ok(())
}
