//! widgetlab CLI
//!
//! ## Commands
//!
//! - `serve`: run the playground dev server
//! - `compile` / `render`: compile a widget and print its viewer state or HTML
//! - `watch`: recompile on every change to the widget or data file
//! - `snapshot` / `reset`: manage the local working copy
//! - `examples` / `catalog`: browse bundled examples and stub library exports
//! - `bench`: score submissions against benchmark cases

use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use widgetlab_bench::{run_benchmark, BenchConfig, BenchFilter, PlaygroundBrowser, StaticRenderer};
use widgetlab_core::compile::{compile_widget, CompileOptions, EsbuildTransform, WidgetSource};
use widgetlab_core::render::{RenderSupervisor, ViewerView};
use widgetlab_core::{library_catalog, PlaygroundSession, WidgetStore};
use widgetlab_server::ServerConfig;

const WATCH_POLL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(name = "widgetlab")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "React widget playground and widget benchmark harness", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// esbuild binary used to transform widget.tsx
    #[arg(long, global = true, env = "WIDGETLAB_ESBUILD", default_value = "esbuild")]
    esbuild: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the playground dev server
    Serve {
        /// Project root (example widget, .local/, examples/)
        #[arg(long, env = "WIDGETLAB_ROOT", default_value = ".")]
        root: PathBuf,

        /// Listen address
        #[arg(long, env = "WIDGETLAB_ADDR", default_value = widgetlab_server::DEFAULT_ADDR)]
        addr: SocketAddr,
    },

    /// Compile a widget and print the resulting viewer state
    Compile {
        #[arg(long, default_value = "widget.tsx")]
        widget: PathBuf,

        #[arg(long, default_value = "data.json")]
        data: PathBuf,
    },

    /// Compile a widget and print the viewer HTML
    Render {
        #[arg(long, default_value = "widget.tsx")]
        widget: PathBuf,

        #[arg(long, default_value = "data.json")]
        data: PathBuf,

        /// Write the HTML here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Recompile whenever the widget or data file changes
    Watch {
        #[arg(long, default_value = "widget.tsx")]
        widget: PathBuf,

        #[arg(long, default_value = "data.json")]
        data: PathBuf,

        /// Quiet period after an edit before compiling (milliseconds)
        #[arg(long, default_value = "400")]
        debounce_ms: u64,
    },

    /// Save a widget as the working copy and as a named snapshot
    Snapshot {
        #[arg(long, env = "WIDGETLAB_ROOT", default_value = ".")]
        root: PathBuf,

        /// Snapshot name (sanitised for the folder name)
        #[arg(short, long)]
        name: String,

        #[arg(long, default_value = "widget.tsx")]
        widget: PathBuf,

        #[arg(long, default_value = "data.json")]
        data: PathBuf,
    },

    /// Delete the local working copy so the example is shown again
    Reset {
        #[arg(long, env = "WIDGETLAB_ROOT", default_value = ".")]
        root: PathBuf,
    },

    /// List examples, or print one
    Examples {
        #[arg(long, env = "WIDGETLAB_ROOT", default_value = ".")]
        root: PathBuf,

        /// Example id to print
        id: Option<String>,

        /// Widget file within the example
        #[arg(long)]
        file: Option<String>,
    },

    /// Print the export names of the stub libraries
    Catalog,

    /// Run benchmark cases and write reports
    Bench {
        #[arg(long, env = "WIDGETLAB_CASES_DIR", default_value = "benchmark/cases")]
        cases_dir: PathBuf,

        #[arg(long, env = "WIDGETLAB_RESULTS_DIR", default_value = "benchmark/results")]
        results_dir: PathBuf,

        /// Only run this case
        #[arg(long)]
        case: Option<String>,

        /// Only score this model
        #[arg(long)]
        model: Option<String>,

        #[arg(long, value_enum, default_value_t = RendererKind::Browser)]
        renderer: RendererKind,

        /// Use an already running dev server instead of starting one
        #[arg(long, env = "WIDGETLAB_BASE_URL")]
        base_url: Option<String>,

        /// Readiness wait per widget (milliseconds)
        #[arg(long, default_value = "15000")]
        content_timeout_ms: u64,

        /// Render timeout per widget (milliseconds)
        #[arg(long, default_value = "120000")]
        case_timeout_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RendererKind {
    /// Headless Chromium against the dev server (screenshots, computed styles)
    Browser,
    /// In-process static HTML (no screenshots, inline styles only)
    Static,
}

fn compile_options(esbuild: &Path) -> CompileOptions {
    CompileOptions::with_transform(EsbuildTransform::new(esbuild))
}

async fn read_widget(widget: &Path, data: &Path) -> Result<WidgetSource> {
    let code = tokio::fs::read_to_string(widget)
        .await
        .with_context(|| format!("read {}", widget.display()))?;
    let data_json = tokio::fs::read_to_string(data)
        .await
        .with_context(|| format!("read {}", data.display()))?;
    Ok(WidgetSource::new(code, data_json))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    widgetlab_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Serve { root, addr } => cmd_serve(root, addr, &cli.esbuild).await,
        Commands::Compile { widget, data } => {
            let view = compile_view(&widget, &data, compile_options(&cli.esbuild)).await?;
            print_view(&view, cli.json)
        }
        Commands::Render {
            widget,
            data,
            output,
        } => cmd_render(&widget, &data, output.as_deref(), &cli.esbuild).await,
        Commands::Watch {
            widget,
            data,
            debounce_ms,
        } => cmd_watch(&widget, &data, Duration::from_millis(debounce_ms), &cli.esbuild).await,
        Commands::Snapshot {
            root,
            name,
            widget,
            data,
        } => cmd_snapshot(&root, &name, &widget, &data).await,
        Commands::Reset { root } => cmd_reset(&root).await,
        Commands::Examples { root, id, file } => {
            cmd_examples(&root, id.as_deref(), file.as_deref()).await
        }
        Commands::Catalog => cmd_catalog().await,
        Commands::Bench {
            cases_dir,
            results_dir,
            case,
            model,
            renderer,
            base_url,
            content_timeout_ms,
            case_timeout_ms,
        } => {
            let config = BenchConfig {
                cases_dir,
                results_dir,
                content_timeout_ms,
                case_timeout_ms,
                ..BenchConfig::default()
            };
            let filter = BenchFilter { case, model };
            cmd_bench(config, filter, renderer, base_url, &cli.esbuild).await
        }
    }
}

async fn cmd_serve(root: PathBuf, addr: SocketAddr, esbuild: &Path) -> Result<()> {
    let config = ServerConfig { root, addr };
    widgetlab_server::serve(&config, compile_options(esbuild)).await
}

/// Compile and render once. Compile and runtime errors are views, not failures.
async fn compile_view(widget: &Path, data: &Path, options: CompileOptions) -> Result<ViewerView> {
    let source = read_widget(widget, data).await?;
    let mut supervisor = RenderSupervisor::new();
    let view = match compile_widget(&source, &options).await {
        Ok(mut compiled) => supervisor.view(Ok(&mut compiled)),
        Err(err) => supervisor.view(Err(&err)),
    };
    Ok(view)
}

fn print_view(view: &ViewerView, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(view)?);
        return Ok(());
    }
    match view {
        ViewerView::Rendered { html } => {
            println!("✓ rendered ({} bytes of markup)", html.len());
            Ok(())
        }
        ViewerView::Empty => {
            println!("✓ rendered nothing");
            Ok(())
        }
        ViewerView::CompileError { message } => bail!("compile error: {message}"),
        ViewerView::RuntimeError { message } => bail!("runtime error: {message}"),
    }
}

async fn cmd_render(
    widget: &Path,
    data: &Path,
    output: Option<&Path>,
    esbuild: &Path,
) -> Result<()> {
    let view = compile_view(widget, data, compile_options(esbuild)).await?;
    let html = widgetlab_server::viewer::page_html(&view, "widgetlab render");
    match output {
        Some(path) => {
            tokio::fs::write(path, html)
                .await
                .with_context(|| format!("write {}", path.display()))?;
            println!("✓ {} written ({})", path.display(), view.label());
        }
        None => println!("{html}"),
    }
    Ok(())
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.and_then(|m| m.modified()).ok()
}

async fn cmd_watch(widget: &Path, data: &Path, debounce: Duration, esbuild: &Path) -> Result<()> {
    let session = PlaygroundSession::with_debounce(compile_options(esbuild), debounce);
    let mut views = session.subscribe();
    let mut last_seen = None;

    println!("Watching {} and {} (Ctrl-C to stop)", widget.display(), data.display());
    loop {
        let stamp = (modified(widget).await, modified(data).await);
        if last_seen != Some(stamp) {
            last_seen = Some(stamp);
            match read_widget(widget, data).await {
                Ok(source) => {
                    session.submit(source);
                }
                Err(err) => eprintln!("✗ {err:#}"),
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            changed = views.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let snapshot = views.borrow_and_update().clone();
                if let Some(snapshot) = snapshot {
                    match &snapshot.view {
                        ViewerView::CompileError { message }
                        | ViewerView::RuntimeError { message } => {
                            println!(
                                "✗ [{}] {}: {message}",
                                snapshot.digest.short(),
                                snapshot.view.label()
                            );
                        }
                        view => println!("✓ [{}] {}", snapshot.digest.short(), view.label()),
                    }
                }
            }
            _ = tokio::time::sleep(WATCH_POLL) => {}
        }
    }
}

async fn cmd_snapshot(root: &Path, name: &str, widget: &Path, data: &Path) -> Result<()> {
    let source = read_widget(widget, data).await?;
    if serde_json::from_str::<serde_json::Value>(&source.data_json).is_err() {
        bail!("{} must contain valid JSON", data.display());
    }
    let store = WidgetStore::new(root);
    let now = chrono::Local::now().naive_local();
    let snapshot = store
        .save_named_snapshot(&source.code, &source.data_json, name, now)
        .await?;
    println!("✓ Snapshot saved: {}", snapshot.dir_path.display());
    Ok(())
}

async fn cmd_reset(root: &Path) -> Result<()> {
    WidgetStore::new(root).delete_local_widget_source().await?;
    println!("✓ Local widget removed; the example is active again");
    Ok(())
}

async fn cmd_examples(root: &Path, id: Option<&str>, file: Option<&str>) -> Result<()> {
    let store = WidgetStore::new(root);
    match id {
        Some(id) => {
            let example = store.read_example(id, file).await?;
            println!("{}", serde_json::to_string_pretty(&example)?);
        }
        None => {
            let examples = store.list_examples().await?;
            if examples.is_empty() {
                println!("No examples found.");
            }
            for example in examples {
                println!("  {:<32} {}", example.id, example.name);
            }
        }
    }
    Ok(())
}

async fn cmd_catalog() -> Result<()> {
    let catalog = library_catalog().await?;
    println!("{}", serde_json::to_string_pretty(catalog)?);
    Ok(())
}

async fn cmd_bench(
    mut config: BenchConfig,
    filter: BenchFilter,
    kind: RendererKind,
    base_url: Option<String>,
    esbuild: &Path,
) -> Result<()> {
    let mut stdout = std::io::stdout();
    let summary = match kind {
        RendererKind::Static => {
            let mut renderer = StaticRenderer::new(compile_options(esbuild));
            run_benchmark(&mut renderer, &config, &filter, &mut stdout).await?
        }
        RendererKind::Browser => {
            // Without a base URL, serve from a scratch root; the working copy stays untouched.
            let mut scratch = None;
            match base_url {
                Some(url) => config.base_url = url,
                None => {
                    let root = tempfile::tempdir().context("create server root")?;
                    let server = ServerConfig {
                        root: root.path().to_path_buf(),
                        addr: SocketAddr::from(([127, 0, 0, 1], 0)),
                    };
                    let (addr, handle) =
                        widgetlab_server::spawn(&server, compile_options(esbuild)).await?;
                    config.base_url = format!("http://{addr}");
                    scratch = Some((root, handle));
                }
            }
            info!(base_url = %config.base_url, "benchmark renderer: browser");

            let mut browser = PlaygroundBrowser::launch(config.clone()).await?;
            let result = run_benchmark(&mut browser, &config, &filter, &mut stdout).await;
            if let Err(err) = browser.close().await {
                tracing::warn!(error = %err, "failed to close browser");
            }
            if let Some((_root, handle)) = scratch {
                handle.abort();
            }
            result?
        }
    };
    stdout.flush()?;
    println!(
        "\n✓ {} report(s) written; summary at {}",
        summary.reports.len(),
        config.results_dir.join("summary.json").display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_options() -> CompileOptions {
        CompileOptions::with_transform(widgetlab_core::compile::PassthroughTransform)
    }

    #[test]
    fn test_bench_args_parse() {
        let cli = Cli::try_parse_from([
            "widgetlab",
            "bench",
            "--case",
            "weather",
            "--renderer",
            "static",
        ])
        .unwrap();
        match cli.command {
            Commands::Bench {
                case, renderer, model, ..
            } => {
                assert_eq!(case.as_deref(), Some("weather"));
                assert_eq!(model, None);
                assert_eq!(renderer, RendererKind::Static);
            }
            _ => panic!("expected bench"),
        }
    }

    #[test]
    fn test_serve_default_addr() {
        let cli = Cli::try_parse_from(["widgetlab", "serve"]).unwrap();
        match cli.command {
            Commands::Serve { addr, .. } => assert_eq!(addr.port(), 43073),
            _ => panic!("expected serve"),
        }
    }

    #[tokio::test]
    async fn test_compile_view_reports_bad_data() {
        let dir = tempfile::tempdir().unwrap();
        let widget = dir.path().join("widget.tsx");
        let data = dir.path().join("data.json");
        std::fs::write(&widget, "module.exports.default = () => null;").unwrap();
        std::fs::write(&data, "{").unwrap();

        let view = compile_view(&widget, &data, static_options()).await.unwrap();
        assert_eq!(
            view,
            ViewerView::CompileError {
                message: "data.json must contain valid JSON.".into()
            }
        );
        assert!(print_view(&view, false).is_err());
    }

    #[tokio::test]
    async fn test_snapshot_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let widget = dir.path().join("w.tsx");
        let data = dir.path().join("d.json");
        std::fs::write(&widget, "source").unwrap();
        std::fs::write(&data, "{}").unwrap();

        cmd_snapshot(dir.path(), "First Try", &widget, &data).await.unwrap();
        assert!(dir.path().join(".local/widget.tsx").exists());
        let snapshots: Vec<_> = std::fs::read_dir(dir.path().join(".local/snapshots"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].ends_with("-First-Try"));

        cmd_reset(dir.path()).await.unwrap();
        assert!(!dir.path().join(".local/widget.tsx").exists());
    }
}
