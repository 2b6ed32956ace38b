mod domain;
mod application;
mod adapters;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::{
    config::yaml_loader::{create_directories, load_config},
    crawler::{bing::BingImageSearch, build_client, google::GoogleImageSearch},
    http::{router, state::AppContext},
    onnx::{model_catalog::OnnxModelCatalog, yolo_engine::coco_class_names},
    ultralytics::cli::UltralyticsCli,
};
use crate::application::{
    evaluation_service::EvaluationService,
    label_service::AutoLabelService,
    ports::ModelCatalogPort,
    preprocess_service::PreprocessService,
    scrape_service::ScrapeService,
    training_service::TrainingService,
};
use crate::domain::{
    config::AppConfig,
    dataset::{ClassList, Split},
    metrics::StageOutcome,
    model::{ModelId, YoloParams},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Step {
    Scrape,
    Preprocess,
    #[value(name = "auto_label")]
    AutoLabel,
    Train,
    Evaluate,
    Serve,
    All,
}

impl Step {
    /// `all` cubre todas las etapas batch; `serve` sólo se lanza explícitamente.
    fn includes(self, stage: Step) -> bool {
        self == stage || (self == Step::All && stage != Step::Serve)
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Plastic Waste Detection - Complete ML Pipeline")]
struct Cli {
    /// Pipeline step to execute
    #[arg(long, value_enum, default_value = "all")]
    step: Step,

    /// Path to configuration YAML file
    #[arg(long, default_value = "config/config.yaml")]
    config: PathBuf,

    /// Path to YOLO dataset.yaml file
    #[arg(long = "data_yaml", default_value = "data.yaml")]
    data_yaml: PathBuf,

    /// Path to trained model for evaluation/serving
    #[arg(long = "model_path")]
    model_path: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

const BANNER_WIDTH: usize = 70;

fn banner(title: &str) {
    info!("{}", "=".repeat(BANNER_WIDTH));
    info!("{}", title);
    info!("{}", "=".repeat(BANNER_WIDTH));
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli.config)?;
    create_directories(&config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.api.workers.max(1))
        .enable_all()
        .build()
        .context("no se pudo crear el runtime de tokio")?;

    banner("PLASTIC WASTE DETECTION - ML PIPELINE ORCHESTRATOR");
    match runtime.block_on(run(&cli, config)) {
        Ok(()) => {
            banner("Pipeline execution completed successfully!");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Pipeline execution failed: {:#}", e);
            Err(e)
        }
    }
}

async fn run(cli: &Cli, config: AppConfig) -> anyhow::Result<()> {
    if cli.step.includes(Step::Scrape) {
        run_scrape(&config).await?;
    }
    if cli.step.includes(Step::Preprocess) {
        run_preprocess(&config, &cli.data_yaml)?;
    }
    if cli.step.includes(Step::AutoLabel) {
        run_auto_label(&config)?;
    }
    if cli.step.includes(Step::Train) {
        run_train(&config, &cli.data_yaml)?;
    }
    if cli.step.includes(Step::Evaluate) {
        run_evaluate(&config, &cli.data_yaml, cli.model_path.as_deref())?;
    }
    if cli.step == Step::Serve {
        run_serve(config, cli.model_path.clone()).await?;
    }
    Ok(())
}

async fn run_scrape(config: &AppConfig) -> anyhow::Result<()> {
    banner("STAGE 1: DATA SCRAPING");

    let client = build_client(config.scraper.timeout)?;
    let scraper = ScrapeService::new(
        config.project.raw_dir.clone(),
        config.scraper.clone(),
        Arc::new(BingImageSearch::new(client.clone())),
        Arc::new(GoogleImageSearch::new(client)),
    );

    info!("Starting image acquisition from web...");
    let results = scraper.scrape_images().await?;

    info!("Scraping Summary:");
    for (class_name, count) in &results {
        info!("  {}: {} images", class_name, count);
    }
    let stats = scraper.statistics();
    info!("Raw dataset: {} images in {} class directories", stats.values().sum::<usize>(), stats.len());
    Ok(())
}

fn run_preprocess(config: &AppConfig, data_yaml: &Path) -> anyhow::Result<()> {
    banner("STAGE 2: DATA PREPROCESSING");

    let preprocessor = PreprocessService::new(
        config.project.raw_dir.clone(),
        config.project.processed_dir.clone(),
        ClassList::new(config.classes.clone()),
        config.preprocessing.clone(),
    );

    info!("Starting preprocessing and augmentation...");
    let stats = preprocessor.preprocess_and_split()?;

    info!("Preprocessing Summary:");
    for split in Split::ALL {
        info!("  {}: {} images", split, stats.count(split));
    }
    if stats.failed > 0 {
        warn!("  {} images could not be processed", stats.failed);
    }

    preprocessor.save_dataset_yaml(data_yaml)?;
    Ok(())
}

fn run_auto_label(config: &AppConfig) -> anyhow::Result<()> {
    banner("STAGE 3: AUTO-LABELING");

    let model_path = config.auto_label_model_path();
    let model = ModelId { name: config.auto_label.model_name.clone(), onnx_path: model_path };
    let detector = OnnxModelCatalog::new()
        .load(&model, coco_class_names())
        .with_context(|| format!("no se pudo cargar el detector de auto-etiquetado {}", model.onnx_path.display()))?;

    let labeler = AutoLabelService::new(
        config.project.raw_dir.clone(),
        ClassList::new(config.classes.clone()),
        detector,
        YoloParams::from(&config.auto_label),
    );

    info!("Starting auto-labeling with {}...", config.auto_label.model_name);
    let results = labeler.auto_label_all();

    info!("Auto-Labeling Summary:");
    let (mut total, mut labeled) = (0, 0);
    for (class_name, counts) in &results {
        info!("  {}: {}/{} labeled", class_name, counts.labeled, counts.total);
        total += counts.total;
        labeled += counts.labeled;
    }
    info!("Total: {}/{} images labeled", labeled, total);
    info!("Note: review and correct the generated labels manually before training.");
    Ok(())
}

fn run_train(config: &AppConfig, data_yaml: &Path) -> anyhow::Result<()> {
    banner("STAGE 4: MODEL TRAINING");

    let trainer = TrainingService::new(
        config.project.models_dir.clone(),
        config.training.clone(),
        Arc::new(UltralyticsCli::new(config.training.executable.clone())),
    );

    match trainer.train(data_yaml)? {
        StageOutcome::Success(model) => {
            if let Some(weights) = &model.weights {
                info!("Weights: {}", weights.display());
            }
            if let Some(onnx) = &model.onnx {
                info!("ONNX export: {}", onnx.display());
            }
            Ok(())
        }
        StageOutcome::Failed { error } => bail!("Training failed: {error}"),
    }
}

fn run_evaluate(config: &AppConfig, data_yaml: &Path, model_path: Option<&Path>) -> anyhow::Result<()> {
    banner("STAGE 5: MODEL EVALUATION");

    let evaluator = EvaluationService::new(
        config.project.models_dir.clone(),
        config.project.metrics_dir.clone(),
        config.evaluation.clone(),
        Arc::new(OnnxModelCatalog::new()),
    );

    let outcome = evaluator.evaluate(model_path, data_yaml)?;
    info!("Generating evaluation report...");
    let report = evaluator.generate_report(&outcome)?;
    println!("{report}");
    Ok(())
}

async fn run_serve(config: AppConfig, model_path: Option<PathBuf>) -> anyhow::Result<()> {
    banner("STAGE 6: API SERVING");

    let mut api = config.api.clone();
    if let Some(path) = model_path {
        api.model_path = path;
    }
    let addr = format!("{}:{}", api.host, api.port);

    let ctx = AppContext::new(api, ClassList::new(config.classes.clone()), config.training.model_name.clone());
    let app = router(ctx.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("no se pudo abrir {addr}"))?;
    info!("🚀 API iniciada en http://{}", addr);

    // El modelo se carga después de abrir el puerto: /health/ responde mientras tanto.
    ctx.load_model_in_background(Arc::new(OnnxModelCatalog::new()));

    axum::serve(listener, app).await?;
    Ok(())
}
