use anyhow::Context;
use clap::Parser;
use dialoguer::Confirm;
use disnote_rust::{cli, config, display, job, opener, project, scanner};
use cli::{Cli, Commands};
use config::Config;
use display::{JsonLines, ProgressView, Renderer};
use job::{JobEvent, JobManager, JobOutcome, JobSettings};
use project::{DropOutcome, ProjectStore, NOT_RECOGNIZED};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// 中断時の終了コード（SIGINT 相当）
const EXIT_CANCELLED: u8 = 130;

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_store(config: &Config) -> anyhow::Result<ProjectStore> {
    let path = config.projects_path()?;
    ProjectStore::load(&path).with_context(|| format!("プロジェクトリスト: {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = Config::load().context("設定の読み込みに失敗")?;

    match cli.command {
        Commands::Add { paths, dir, recursive } => {
            let inputs: Vec<PathBuf> = match dir {
                Some(dir) => scanner::scan_folder(&dir, recursive)?,
                None => paths,
            };
            let files = scanner::resolve_inputs(&inputs, recursive)?;
            println!("✔ {}件のファイルを検出", files.len());

            let mut store = load_store(&config)?;
            let outcome = store.find_or_create(&files)?;
            match outcome {
                DropOutcome::Created(id) => println!("✔ プロジェクト {} を作成しました", id),
                DropOutcome::Reenabled(id) => println!("✔ プロジェクト {} を再表示しました", id),
                DropOutcome::Refreshed(id) => println!("登録済みのプロジェクト {} です", id),
            }
            if let Some(message) = store.take_persist_error() {
                eprintln!("⚠ 保存に失敗: {}", message);
            }
        }

        Commands::List { sort, order, json } => {
            let store = load_store(&config)?;
            let projects = store.list_sorted(sort, order);

            if json {
                println!("{}", serde_json::to_string_pretty(&projects)?);
            } else if projects.is_empty() {
                println!("プロジェクトがありません");
            } else {
                for p in projects {
                    println!(
                        "{:>4}  {:<16}  {:>3}件  認識: {:<16}  {}",
                        p.id,
                        p.title,
                        p.files.len(),
                        p.recognized.as_deref().unwrap_or(NOT_RECOGNIZED),
                        p.dir.display()
                    );
                }
            }
        }

        Commands::Show { id } => {
            let store = load_store(&config)?;
            println!("{}", serde_json::to_string_pretty(store.get(id)?)?);
        }

        Commands::Recognize { id, witai, whisper, json } => {
            return recognize(&config, id, config.engine_options(witai, whisper), json).await;
        }

        Commands::Disable { id, yes } => {
            let mut store = load_store(&config)?;
            let title = store.get(id)?.title.clone();

            let confirmed = yes
                || Confirm::new()
                    .with_prompt(format!("プロジェクト {} ({}) を一覧から外しますか？", id, title))
                    .default(false)
                    .interact()?;
            if !confirmed {
                println!("キャンセルしました");
                return Ok(ExitCode::SUCCESS);
            }

            store.disable(id)?;
            println!("✔ プロジェクト {} を一覧から外しました", id);
        }

        Commands::Open { id } => {
            let mut store = load_store(&config)?;
            let dir = store.get(id)?.dir.clone();
            opener::open_folder(&dir)?;
            store.touch_access(id)?;
            println!("✔ {}", dir.display());
        }

        Commands::Config { show, set_engine, set_encoding, set_witai_token, set_whisper_model } => {
            let mut config = config;
            let mut changed = false;

            if let Some(engine) = set_engine {
                config.engine = engine;
                changed = true;
            }
            if let Some(encoding) = set_encoding {
                config.encoding = encoding;
                changed = true;
            }
            if let Some(token) = set_witai_token {
                config.witai_token = Some(token).filter(|t| !t.trim().is_empty());
                changed = true;
            }
            if let Some(model) = set_whisper_model {
                config.whisper_model = Some(model).filter(|m| !m.trim().is_empty());
                changed = true;
            }

            if changed {
                config.validate()?;
                config.save()?;
                println!("✔ 設定を保存しました");
            }

            if show || !changed {
                println!("設定:");
                println!("  エンジン: {}", config.engine.join(" "));
                println!("  文字コード: {}", config.encoding);
                println!("  プロジェクトリスト: {}", config.projects_path()?.display());
                println!(
                    "  wit.ai: {}",
                    if config.witai_token().is_some() { "設定済み" } else { "未設定" }
                );
                println!("  Whisper: {}", config.whisper_model.as_deref().unwrap_or("未設定"));
                println!("  強制終了までの猶予: {}秒", config.kill_grace_seconds);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn recognize(
    config: &Config,
    id: usize,
    options: disnote_rust::engine::EngineOptions,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let settings = JobSettings::from_config(config)?;
    let store = Arc::new(Mutex::new(load_store(config)?));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let manager = JobManager::new(store, settings, tx);

    let mut renderer: Box<dyn Renderer> = if json {
        Box::new(JsonLines::new(std::io::stdout()))
    } else {
        Box::new(ProgressView::new())
    };

    if let Err(e) = manager.start(id, options) {
        // 起動失敗でも Closed は届いている
        while let Ok(event) = rx.try_recv() {
            renderer.render(&event);
        }
        renderer.finish();
        return Err(e.into());
    }

    let mut cancel_sent = false;
    let (outcome, code) = loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    break (JobOutcome::Failed, None);
                };
                renderer.render(&event);
                if let JobEvent::Closed { outcome, code, .. } = event {
                    break (outcome, code);
                }
            }
            signal = tokio::signal::ctrl_c(), if !cancel_sent => {
                if let Err(e) = signal {
                    tracing::warn!("Ctrl-C を待てません: {}", e);
                }
                cancel_sent = true;
                manager.cancel();
            }
        }
    };
    renderer.finish();

    Ok(match outcome {
        JobOutcome::Completed => ExitCode::SUCCESS,
        JobOutcome::Cancelled => ExitCode::from(EXIT_CANCELLED),
        JobOutcome::Failed | JobOutcome::LaunchFailed => code
            .and_then(|c| u8::try_from(c).ok())
            .filter(|&c| c != 0)
            .map(ExitCode::from)
            .unwrap_or(ExitCode::FAILURE),
    })
}
