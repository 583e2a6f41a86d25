//! message-translator 命令行入口

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use message_translator::env::{self, EnvVar};
use message_translator::translation::{
    language, ConfigManager, DetectionMethod, DisabledRemoteTranslator, ModelRegistry,
    OfflineModelManager, OfflineTranslationService, RemoteTranslator, TranslationCache,
    TranslationConfig, TranslationManager, TranslationMode, TranslationOrigin, TranslationOutcome,
    TranslationPolicy, TranslationRequest, TranslationResult, UnavailableModelFetcher,
    UnavailableOnDeviceTranslator,
};

#[derive(Parser, Debug)]
#[command(name = "message-translator", version, about = "Translate messages with cached, offline or remote translation")]
struct Cli {
    /// Path to a TOML or JSON config file
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate a piece of text
    Translate {
        text: String,

        /// Target language code
        #[arg(short = 't', long = "to")]
        target: Option<String>,

        /// Source language code (detected when omitted)
        #[arg(short = 'f', long = "from")]
        source: Option<String>,

        /// Translate even if the text is already in the target language
        #[arg(long)]
        force: bool,

        /// Override the translation mode: auto, online_only, offline_preferred
        #[arg(short = 'm', long)]
        mode: Option<TranslationMode>,
    },

    /// Detect the language of a piece of text
    Detect { text: String },

    /// List offline language models and their status
    Models {
        /// Only show downloaded models
        #[arg(long)]
        downloaded: bool,
    },

    /// Inspect or clear the translation cache snapshot
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print documentation for all environment variables
    EnvDocs,
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Show cache statistics
    Stats,
    /// Remove all cached translations
    Clear,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print an example config, or write it to a file
    Example {
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
    /// Print the effective configuration
    Show,
    /// Print environment variable overrides
    Env,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(env::core::LogLevel::get_or_default("info".to_string()))
        })
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!env::core::NoColor::get_or_default(false))
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> TranslationResult<TranslationConfig> {
    match path {
        Some(path) => Ok(ConfigManager::from_file(path)?.into_config()),
        None => Ok(ConfigManager::new()?.into_config()),
    }
}

#[cfg(feature = "google")]
fn remote_translator(config: &TranslationConfig) -> TranslationResult<Arc<dyn RemoteTranslator>> {
    if !config.has_api_key() {
        return Ok(Arc::new(DisabledRemoteTranslator));
    }
    Ok(Arc::new(
        message_translator::translation::GoogleTranslationClient::from_config(config)?,
    ))
}

#[cfg(not(feature = "google"))]
fn remote_translator(_config: &TranslationConfig) -> TranslationResult<Arc<dyn RemoteTranslator>> {
    Ok(Arc::new(DisabledRemoteTranslator))
}

fn model_manager(config: &TranslationConfig) -> Arc<OfflineModelManager> {
    let manager = OfflineModelManager::new(Arc::new(UnavailableModelFetcher));
    match &config.model_registry_path {
        Some(path) => Arc::new(manager.with_registry(ModelRegistry::new(path))),
        None => Arc::new(manager),
    }
}

fn load_cache(config: &TranslationConfig) -> Arc<TranslationCache> {
    let cache = TranslationCache::with_config(config.into());
    if let Some(path) = &config.cache_path {
        match cache.load_from(path) {
            Ok(count) => tracing::debug!("从 {} 载入 {} 条缓存", path, count),
            Err(e) => tracing::warn!("载入缓存快照失败: {}", e),
        }
    }
    Arc::new(cache)
}

fn save_cache(config: &TranslationConfig, cache: &TranslationCache) {
    if let Some(path) = &config.cache_path {
        if let Err(e) = cache.save_to(path) {
            tracing::warn!("保存缓存快照失败: {}", e);
        }
    }
}

fn build_manager(config: &TranslationConfig, cache: Arc<TranslationCache>) -> TranslationResult<TranslationManager> {
    let offline = OfflineTranslationService::new(
        Arc::new(UnavailableOnDeviceTranslator),
        model_manager(config),
    );
    Ok(TranslationManager::builder()
        .with_config(config)
        .remote(remote_translator(config)?)
        .offline_service(offline)
        .cache(cache)
        .build())
}

async fn run(cli: Cli) -> TranslationResult<i32> {
    match &cli.command {
        Command::EnvDocs => {
            print!("{}", env::generate_env_docs());
            return Ok(0);
        }
        Command::Config {
            action: ConfigAction::Example { output },
        } => {
            match output {
                Some(path) => {
                    ConfigManager::generate_example_config(path)?;
                    println!("Example config written to {}", path.display());
                }
                None => print!("{}", ConfigManager::example_config()?),
            }
            return Ok(0);
        }
        Command::Config {
            action: ConfigAction::Env,
        } => {
            match env::EnvConfig::from_env() {
                Ok(env_config) => env_config.print_summary(),
                Err(e) => {
                    eprintln!("Invalid environment: {}", e);
                    return Ok(1);
                }
            }
            return Ok(0);
        }
        _ => {}
    }

    let config = load_config(cli.config.as_ref())?;
    let cache = load_cache(&config);

    match cli.command {
        Command::Translate {
            text,
            target,
            source,
            force,
            mode,
        } => {
            let manager = build_manager(&config, Arc::clone(&cache))?;
            let mut request = TranslationRequest::new(text, target.unwrap_or_else(|| config.preferred_language.clone()))
                .with_force(force);
            if let Some(source) = source {
                request = request.with_source(source);
            }
            if let Some(mode) = mode {
                request = request.with_policy(TranslationPolicy::new(mode, config.offline_enabled));
            }

            let code = match manager.translate(request).await {
                TranslationOutcome::Translated { text, origin, .. } => {
                    if origin == TranslationOrigin::Cache {
                        tracing::info!("使用缓存结果");
                    }
                    println!("{}", text);
                    0
                }
                TranslationOutcome::AlreadyInTargetLanguage { message, .. } => {
                    println!("{}", message);
                    0
                }
                TranslationOutcome::Failed(e) => {
                    eprintln!("Error: {}", e);
                    1
                }
            };
            save_cache(&config, &cache);
            Ok(code)
        }
        Command::Detect { text } => {
            let manager = build_manager(&config, cache)?;
            let result = manager.detection_service().detect(text.as_str()).await;
            match (result.method, result.language_code) {
                (DetectionMethod::Failed, _) | (_, None) => {
                    eprintln!("Error: Could not detect language");
                    Ok(1)
                }
                (method, Some(code)) => {
                    println!(
                        "{} ({}) via {:?}, confidence {:.2}",
                        language::display_name(&code),
                        code,
                        method,
                        result.confidence
                    );
                    Ok(0)
                }
            }
        }
        Command::Models { downloaded } => {
            let models = model_manager(&config);
            for model in models.available_models() {
                if downloaded && !model.is_downloaded() {
                    continue;
                }
                println!(
                    "{:<4} {:<12} {:>8}  {}",
                    model.code,
                    model.display_name,
                    model.formatted_size(),
                    model.status_text()
                );
            }
            Ok(0)
        }
        Command::Cache { action } => {
            match action {
                CacheAction::Stats => println!("{}", cache.statistics()),
                CacheAction::Clear => {
                    cache.clear();
                    save_cache(&config, &cache);
                    println!("Cache cleared");
                }
            }
            Ok(0)
        }
        Command::Config {
            action: ConfigAction::Show,
        } => {
            let mut shown = config.clone();
            if shown.api_key.is_some() {
                shown.api_key = Some("[configured]".to_string());
            }
            print!("{}", toml::to_string_pretty(&shown)?);
            Ok(0)
        }
        Command::EnvDocs | Command::Config { .. } => Ok(0),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
