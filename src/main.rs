//! Safety Sensor Agent CLI
//!
//! On-device usage tracking and harmful-content alerts.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use safety_sensor_agent::{
    classifier::{join_categories, ContentClassifier},
    config::{Config, ProviderKind},
    gateway::{BackendConfig, BlockingBackendClient},
    platform::{check_permission, Platform},
    scheduler::{Agent, AgentSettings},
    transparency::create_shared_log_with_persistence,
    usage::UsageTracker,
    DISCLOSURE, VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "safety-sensor")]
#[command(version = VERSION)]
#[command(about = "On-device usage tracking and harmful-content alerts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring
    Start {
        /// Run in foreground with per-tick debug logging
        #[arg(long)]
        foreground: bool,
    },

    /// Pause monitoring
    Pause,

    /// Resume monitoring
    Resume,

    /// Show configuration and activity statistics
    Status,

    /// Display what the agent records and sends
    Disclosure,

    /// Run the configured classifier once on an image file
    Classify {
        /// Path to a PNG or JPEG image
        image: PathBuf,
    },

    /// Show configuration
    Config,
}

fn main() {
    let cli = Cli::parse();

    let default_filter = match cli.command {
        Commands::Start {
            foreground: true, ..
        } => "debug",
        _ => "info",
    };
    init_tracing(default_filter);

    match cli.command {
        Commands::Start { .. } => {
            cmd_start();
        }
        Commands::Pause => {
            cmd_pause();
        }
        Commands::Resume => {
            cmd_resume();
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Disclosure => {
            cmd_disclosure();
        }
        Commands::Classify { image } => {
            if let Err(e) = cmd_classify(&image) {
                eprintln!("Error: {e:#}");
                std::process::exit(1);
            }
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config() -> Config {
    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config {:?}: {e}", Config::config_path());
            std::process::exit(1);
        }
    };
    config.apply_env_overrides();
    config
}

fn cmd_start() {
    println!("Safety Sensor Agent v{VERSION}");
    println!();

    let config = load_config();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    if !check_permission() {
        eprintln!("Warning: Could not read the frontmost application.");
        eprintln!();
        eprintln!("To grant permission:");
        eprintln!("1. Open System Settings > Privacy & Security > Accessibility");
        eprintln!("2. Add the terminal or this application to the allowed list");
        eprintln!("3. Restart the agent");
        eprintln!();
        eprintln!("Continuing; usage will be recorded as unknown until then.");
        eprintln!();
    }

    let backend = match BlockingBackendClient::new(BackendConfig::from_settings(&config.backend))
    {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: Could not create backend client: {e}");
            std::process::exit(1);
        }
    };

    let settings = AgentSettings::from_config(&config);
    let classifier = ContentClassifier::from_settings(&config.classifier);

    println!("Starting monitoring...");
    println!("  Device ID: {}", settings.device_id);
    println!("  Backend: {}", config.backend.url);
    match backend.test_connection() {
        Ok(true) => println!("  Backend connection: OK"),
        Ok(false) => eprintln!("Warning: Backend health check failed"),
        Err(e) => eprintln!("Warning: Could not connect to backend: {e}"),
    }
    println!("  Upload interval: {}s", settings.upload_interval.as_secs());
    if settings.capture_enabled {
        println!(
            "  Screen capture: every {}s (classify every {})",
            settings.capture_interval.as_secs(),
            settings.classify_every_n
        );
    } else {
        println!("  Screen capture: disabled");
    }
    println!(
        "  Classifier: {}",
        classifier.as_ref().map(|c| c.mode()).unwrap_or("disabled")
    );
    if let Some(ref dir) = settings.screenshot_dir {
        println!("  Saving screenshots to: {}", dir.display());
    }

    if config.paused {
        println!();
        println!("Monitoring is currently paused.");
        println!("Run `safety-sensor resume` to start monitoring.");
    }

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let transparency_log =
        create_shared_log_with_persistence(config.data_path.join("transparency.json"));

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let mut agent = Agent::new(
        settings,
        UsageTracker::new(config.usage.clone()),
        classifier,
        Box::new(Platform::new()),
        Box::new(Platform::new()),
        Box::new(backend),
        transparency_log.clone(),
    );

    // `safety-sensor pause/resume` controls a running agent through the config file.
    let mut paused = config.paused;
    agent.run(&running, || {
        if let Ok(cfg) = Config::load() {
            paused = cfg.paused;
        }
        paused
    });

    println!();
    println!("Stopping monitoring...");

    if let Err(e) = transparency_log.save() {
        eprintln!("Warning: Could not save transparency log: {e}");
    }

    println!();
    println!("{}", transparency_log.summary());
}

fn cmd_pause() {
    if let Err(e) = Config::set_paused_at(&Config::config_path(), true) {
        eprintln!("Error updating config: {e}");
        eprintln!("Fix {:?} and try again.", Config::config_path());
        std::process::exit(1);
    }
    println!("Monitoring paused. Use 'safety-sensor resume' to continue.");
}

fn cmd_resume() {
    if let Err(e) = Config::set_paused_at(&Config::config_path(), false) {
        eprintln!("Error updating config: {e}");
        eprintln!("Fix {:?} and try again.", Config::config_path());
        std::process::exit(1);
    }
    println!("Monitoring resumed.");
}

fn cmd_status() {
    let config = load_config();

    println!("Safety Sensor Agent Status");
    println!("==========================");
    println!();

    let has_permission = check_permission();
    println!(
        "Accessibility Permission: {}",
        if has_permission {
            "Granted ✓"
        } else {
            "Not Granted ✗"
        }
    );
    println!();

    let classifier_mode = if !config.classifier.enabled {
        "disabled".to_string()
    } else if let ProviderKind::Unknown(ref name) = config.classifier.provider {
        format!("disabled (unknown provider {name:?})")
    } else if config.classifier.provider == ProviderKind::OpenAi
        && !config.classifier.has_credentials()
    {
        "disabled (no OpenAI API key)".to_string()
    } else {
        config.classifier.provider.to_string()
    };

    println!("Configuration:");
    println!("  Device ID: {}", config.resolved_device_id());
    println!("  Backend: {}", config.backend.url);
    println!(
        "  Upload interval: {}s",
        config.backend.upload_interval.as_secs()
    );
    println!(
        "  Screen capture: {}",
        if config.capture.enabled {
            format!("every {}s", config.capture.interval.as_secs())
        } else {
            "disabled".to_string()
        }
    );
    println!("  Classifier: {classifier_mode}");
    println!(
        "  Alert cooldown: {}s",
        config.classifier.alert_cooldown.as_secs()
    );
    println!("  Paused: {}", config.paused);
    println!();

    let stats_path = config.data_path.join("transparency.json");
    if stats_path.exists() {
        if let Ok(content) = std::fs::read_to_string(&stats_path) {
            if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
                println!("Cumulative Statistics:");
                for (key, label) in [
                    ("polls", "Usage polls"),
                    ("uploads_sent", "Usage summaries sent"),
                    ("uploads_failed", "Usage summaries failed"),
                    ("captures", "Screen captures"),
                    ("classifications", "Captures classified"),
                    ("alerts_sent", "Alerts sent"),
                    ("alerts_failed", "Alerts failed"),
                    ("alerts_suppressed", "Alerts suppressed"),
                ] {
                    if let Some(value) = stats.get(key) {
                        println!("  {label}: {value}");
                    }
                }
            }
        }
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_disclosure() {
    println!("{DISCLOSURE}");
}

fn cmd_classify(path: &Path) -> anyhow::Result<()> {
    let config = load_config();

    let image =
        image::open(path).with_context(|| format!("Could not open image {}", path.display()))?;

    let Some(classifier) = ContentClassifier::from_settings(&config.classifier) else {
        bail!("content classification is disabled in the current configuration");
    };

    let result = classifier.check(&image);

    println!("Classifier: {}", classifier.mode());
    println!("Flagged: {}", result.flagged);
    if result.flagged {
        println!("Categories: {}", join_categories(&result.categories));
        println!("Confidence: {:.2}", result.confidence);
        println!(
            "Above threshold ({:.2}): {}",
            classifier.threshold(),
            result.exceeds_threshold(classifier.threshold())
        );
    }
    if let Some(ref details) = result.details {
        println!("Details: {details}");
    }

    Ok(())
}

fn cmd_config() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            std::process::exit(1);
        }
    };

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config.redacted()).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}
