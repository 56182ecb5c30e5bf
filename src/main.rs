//! Lexi - CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use lexi::{
    auth::{open_user_store, UserManager},
    cache::{connect_or_fallback, CacheService},
    cli::{Args, CacheCommand, Commands, Config, Verbosity},
    doctor::Doctor,
    repl::{input::{self, InputHandler}, ChatSession},
    server::{self, AppState},
    sync::BlobMirror,
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose, args.quiet)?;

    let mut config = Config::load(args.config.clone())?;
    let verbosity = args.verbosity();

    match args.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let state = AppState::bootstrap(&config).await?;
            server::serve(state, &config.listen_addr()).await
        }
        Commands::Ask { query, attach, thread } => ask(&config, verbosity, &thread, &query, attach).await,
        Commands::Chat { user } => chat(&config, user).await,
        Commands::Register { username, email, password } => {
            let password = read_password(password)?;
            let users = user_manager(&config).await?;
            let outcome = users.register(&username, &email, &password).await;
            report(outcome.success, &outcome.message)
        }
        Commands::Login { username, password } => {
            let password = read_password(password)?;
            let users = user_manager(&config).await?;
            let outcome = users.authenticate(&username, &password).await;
            report(outcome.success, &outcome.message)
        }
        Commands::Sync { force, overwrite } => sync(&config, force, overwrite).await,
        Commands::Doctor => {
            let checks = Doctor::new(config).run_diagnostics().await;
            Doctor::display_results(&checks);
            std::process::exit(if Doctor::overall_status(&checks) { 0 } else { 1 });
        }
        Commands::Config { save } => {
            match save {
                Some(path) => {
                    config.save(&path)?;
                    println!("Configuration written to {}", path.display());
                }
                None => println!("{}", toml::to_string_pretty(&config.redacted())?),
            }
            Ok(())
        }
        Commands::Cache { action } => cache(&config, action).await,
    }
}

async fn ask(config: &Config, verbosity: Verbosity, thread: &str, query: &str, attach: Option<PathBuf>) -> Result<()> {
    let state = AppState::connect(config).await?;
    let attach = attach.map(|path| Config::expand_path(&path.to_string_lossy()));

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    pb.set_message("Thinking...");
    if verbosity.show_progress() {
        pb.enable_steady_tick(Duration::from_millis(100));
    } else {
        pb.finish_and_clear();
    }

    let on_token = |token: &str| {
        if !pb.is_finished() {
            pb.finish_and_clear();
        }
        print!("{}", token);
        let _ = std::io::stdout().flush();
    };

    let resolution = state
        .resolver
        .resolve(thread, query, attach.as_deref(), &on_token)
        .await;
    pb.finish_and_clear();
    println!();

    let resolution = resolution?;
    tracing::debug!(route = %resolution.route, "answered");
    if let Some(form) = resolution.form_path {
        println!("{} {}", "Form saved:".green().bold(), form.display());
    }
    Ok(())
}

async fn chat(config: &Config, user: Option<String>) -> Result<()> {
    let state = AppState::connect(config).await?;

    let thread = match user {
        Some(username) => {
            let password = read_password(None)?;
            let outcome = state.users.authenticate(&username, &password).await;
            if !outcome.success {
                report(false, &outcome.message)?;
            }
            username
        }
        None => "cli".to_string(),
    };

    let input = InputHandler::with_history(config.state_dir().join("chat_history"))?;
    let mut session = ChatSession::new(&state.resolver, thread, input);
    session.show_welcome();
    session.run().await
}

async fn sync(config: &Config, force: bool, overwrite: bool) -> Result<()> {
    let mirror = BlobMirror::from_config(config)
        .with_force(force || config.sync.force)
        .with_overwrite(overwrite || config.sync.overwrite);

    let (laws, procedures) = mirror
        .resolve_index_dirs(config)
        .await
        .context("index sync failed")?;

    for (name, location) in [("laws", laws), ("procedures", procedures)] {
        println!(
            "{:<12} {} ({:?})",
            name,
            location.path.display(),
            location.source
        );
    }
    Ok(())
}

async fn cache(config: &Config, action: CacheCommand) -> Result<()> {
    let cache = CacheService::new(connect_or_fallback(config).await, config);
    match action {
        CacheCommand::Stats => {
            let stats = cache.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        CacheCommand::Evict => {
            let evicted = cache.evict_stale().await?;
            println!("Evicted {} entries", evicted);
        }
    }
    Ok(())
}

async fn user_manager(config: &Config) -> Result<UserManager> {
    let store = open_user_store(config)?;
    let users = UserManager::new(store, config.auth.min_password_len);
    users.init().await.context("failed to prepare users table")?;
    Ok(users)
}

/// Flag, then `LEXI_PASSWORD`, then a masked prompt
fn read_password(flag: Option<String>) -> Result<String> {
    if let Some(password) = flag.or_else(|| std::env::var("LEXI_PASSWORD").ok()) {
        return Ok(password);
    }
    input::read_password("Password: ")
}

fn report(success: bool, message: &str) -> Result<()> {
    if success {
        println!("{} {}", "✓".green(), message);
        Ok(())
    } else {
        eprintln!("{} {}", "✗".red(), message);
        std::process::exit(1);
    }
}
