//! enn - camera discovery, settings and conditional automation.
//!
//! Provides both human-friendly and agent-friendly (robot mode) interfaces.
#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::io::{self, IsTerminal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use console::style;
use serde::Serialize;
use tracing::{info, warn};

use enn::app::{App, TickReport};
use enn::cli::{
    self, Cli, Commands, ConditionalCommand, EnvCommand, ReferenceCommand, SessionCommand,
};
use enn::conditional::{Conditional, Step};
use enn::config::{ConfigFile, Settings};
use enn::device::{BoxedAdapter, DeviceRecord, Gphoto2Adapter, ReconcileReport};
use enn::error::{EnnError, Result, ResultExt};
use enn::store::RedisStore;
use enn::{logging, reference, session};

/// Build information embedded at compile time.
mod build_info {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    pub fn git_sha() -> &'static str {
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
    }

    pub fn git_dirty() -> &'static str {
        option_env!("VERGEN_GIT_DIRTY").unwrap_or("false")
    }

    pub fn build_timestamp() -> &'static str {
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown")
    }

    pub fn rustc_semver() -> &'static str {
        option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown")
    }

    pub fn target() -> &'static str {
        option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown")
    }
}

fn main() {
    let cli = Cli::parse();

    // Handle no-color flag or non-TTY
    if cli.no_color || !io::stdout().is_terminal() {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    logging::init_logging(cli.use_json(), cli.verbose, cli.quiet);

    if let Err(e) = run(&cli) {
        output_error(&cli, &e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        None => print_quick_start(cli),
        Some(Commands::Discover) => cmd_discover(cli),
        Some(Commands::Devices(args)) => cmd_devices(cli, args),
        Some(Commands::Watch(args)) => cmd_watch(cli, args),
        Some(Commands::Set(args)) => cmd_set(cli, args),
        Some(Commands::Slurp(args)) => cmd_slurp(cli, args),
        Some(Commands::Conditional(command)) => cmd_conditional(cli, command),
        Some(Commands::Session(command)) => cmd_session(cli, command),
        Some(Commands::Env(command)) => cmd_env(cli, command),
        Some(Commands::Reference(command)) => cmd_reference(cli, command),
        Some(Commands::Status) => cmd_status(cli),
        Some(Commands::Version) => cmd_version(cli),
        Some(Commands::Completions(args)) => cmd_completions(cli, args),
    }
}

// === Quick Start (Robot Mode Optimized) ===

fn print_quick_start(cli: &Cli) -> Result<()> {
    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "tool": "enn",
                "version": build_info::VERSION,
                "description": "Camera discovery, settings and conditional rules backed by a shared settings store",
                "devices": {
                    "discover": "enn discover --robot",
                    "list": "enn devices --long --robot",
                    "apply_setting": "enn set <UID> <NAME> <VALUE>",
                    "capture": "enn slurp <UID> --meta page=1",
                    "watch": "enn watch --robot",
                },
                "rules": {
                    "write": "enn conditional write <UID> <NAME> --set iso=400 --post notify.sh",
                    "list": "enn conditional list <UID> --robot",
                    "apply": "enn conditional apply <UID> <NAME>",
                },
                "store": "--db-host <HOST> --db-port <PORT> (both or neither)",
                "output_modes": {
                    "human": "--format=text (default)",
                    "robot": "--robot or --format=json",
                    "compact": "--format=json-compact",
                },
            }),
        )
    } else {
        println!(
            "{} {} - camera settings and conditional rules\n",
            style("enn").bold().cyan(),
            build_info::VERSION
        );
        println!("{}", style("QUICK START").bold().underlined());
        println!();
        println!("  {}  Discover cameras", style("enn discover").green());
        println!("  {}  Known devices", style("enn devices --long").green());
        println!("  {}  Apply a setting", style("enn set <UID> iso 400").green());
        println!("  {}  Capture into the store", style("enn slurp <UID>").green());
        println!("  {}  Follow hotplug and store changes", style("enn watch").green());
        println!();
        println!("{}", style("RULES").bold().underlined());
        println!();
        println!(
            "  {}",
            style("enn conditional write <UID> night --set iso=1600 --post notify.sh").green()
        );
        println!("  {}", style("enn conditional apply <UID> night").green());
        println!();
        println!("Run {} for full help", style("enn --help").yellow());
        Ok(())
    }
}

// === Context ===

fn load_settings(cli: &Cli) -> Result<Settings> {
    let (file, path) = ConfigFile::load(cli.config.as_deref())?;
    Settings::resolve(&file, path, cli.db_host.as_deref(), cli.db_port)
}

fn adapters(settings: &Settings) -> Vec<BoxedAdapter> {
    vec![Box::new(Gphoto2Adapter::new(settings.gphoto2.clone()))]
}

/// App with store and adapters, seeded from the session file.
fn open_app(settings: &Settings) -> Result<App> {
    let store = RedisStore::connect(&settings.connection)?;
    Ok(App::new(settings.connection.clone(), Box::new(store), adapters(settings))
        .with_session(settings.session_path()))
}

/// App for store-only commands: no adapters, no session.
fn open_store_app(settings: &Settings) -> Result<App> {
    let store = RedisStore::connect(&settings.connection)?;
    Ok(App::new(settings.connection.clone(), Box::new(store), Vec::new()))
}

fn parse_field_value(text: &str) -> Result<(String, String)> {
    let (field, value) = text
        .split_once('=')
        .ok_or_else(|| EnnError::Other(format!("expected FIELD=VALUE, got '{text}'")))?;
    Ok((field.trim().to_string(), value.trim().to_string()))
}

// === Command Implementations ===

#[derive(Serialize)]
struct DeviceView<'a> {
    #[serde(flatten)]
    record: &'a DeviceRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    adjustable: Option<BTreeMap<String, String>>,
}

fn print_devices(cli: &Cli, devices: &[DeviceView<'_>]) -> Result<()> {
    if cli.use_json() {
        return output_json(cli, &devices);
    }
    if devices.is_empty() {
        println!("No known devices");
        return Ok(());
    }
    for view in devices {
        let record = view.record;
        let marker = if record.connected {
            style("●").green()
        } else {
            style("○").dim()
        };
        println!(
            "{marker} {}  {}  {}",
            style(record.uid()).bold(),
            record.name().unwrap_or("-"),
            style(record.discovery().unwrap_or("-")).dim()
        );
        for (name, value) in &record.settings {
            println!("    {name} = {value}");
        }
        if let Some(adjustable) = &view.adjustable {
            let names: Vec<&str> = adjustable.keys().map(String::as_str).collect();
            println!("    {} {}", style("adjustable:").cyan(), names.join(", "));
        }
    }
    Ok(())
}

fn print_reconcile(report: &ReconcileReport) {
    for uid in &report.added {
        println!("{} {uid}", style("+ added").green());
    }
    for uid in &report.attached {
        println!("{} {uid}", style("↑ attached").green());
    }
    for uid in &report.detached {
        println!("{} {uid}", style("↓ detached").yellow());
    }
    if report.skipped > 0 {
        println!("{} descriptor(s) without uid ignored", report.skipped);
    }
}

fn cmd_discover(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli)?;
    let mut app = open_app(&settings)?;
    let report = app.update_devices();
    app.save_session()?;

    if cli.use_json() {
        return output_json(
            cli,
            &serde_json::json!({
                "report": report,
                "devices": app.registry().records(),
            }),
        );
    }
    print_reconcile(&report);
    if app.registry().connected().next().is_none() {
        println!("No devices discovered");
    } else if !cli.quiet {
        println!("{} device(s) connected", app.registry().connected().count());
    }
    Ok(())
}

fn cmd_devices(cli: &Cli, args: &cli::DevicesArgs) -> Result<()> {
    let settings = load_settings(cli)?;

    if !args.discover && !args.long {
        let registry = session::load(&settings.session_path())?;
        let views: Vec<DeviceView<'_>> = registry
            .records()
            .iter()
            .map(|record| DeviceView {
                record,
                adjustable: None,
            })
            .collect();
        return print_devices(cli, &views);
    }

    let mut app = open_app(&settings)?;
    if args.discover {
        app.update_devices();
        app.save_session()?;
    }

    let mut adjustable = Vec::new();
    let uids: Vec<String> = app
        .registry()
        .records()
        .iter()
        .map(|r| r.uid().to_string())
        .collect();
    for uid in &uids {
        adjustable.push(if args.long {
            app.adjustable_settings(uid)?
        } else {
            None
        });
    }

    let views: Vec<DeviceView<'_>> = app
        .registry()
        .records()
        .iter()
        .zip(adjustable)
        .map(|(record, adjustable)| DeviceView { record, adjustable })
        .collect();
    print_devices(cli, &views)
}

fn print_tick(cli: &Cli, report: &TickReport) -> Result<()> {
    if cli.use_json() {
        let json = serde_json::to_string(report).with_context(|| "serializing tick report")?;
        println!("{json}");
        return Ok(());
    }
    if let Some(reconcile) = &report.reconcile {
        print_reconcile(reconcile);
    }
    if report.env_reloaded {
        println!("{}", style("environment reloaded").cyan());
    }
    Ok(())
}

fn cmd_watch(cli: &Cli, args: &cli::WatchArgs) -> Result<()> {
    let settings = load_settings(cli)?;
    let mut store = RedisStore::connect(&settings.connection)?;
    if !args.no_keyspace {
        if let Err(e) = store.enable_keyspace_events() {
            warn!(error = %e, "Could not enable keyspace notifications");
        }
    }

    let mut app = App::new(settings.connection.clone(), Box::new(store), adapters(&settings))
        .with_session(settings.session_path());
    let report = app.update_devices();
    app.reload_env()?;
    app.start_usb_poller(settings.usb_root.clone(), settings.poll_interval)?;
    if !args.no_keyspace {
        if let Err(e) = app.start_keyspace_listener() {
            warn!(error = %e, "Store notifications disabled");
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&stop))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&stop))?;

    if !cli.quiet && !cli.use_json() {
        print_reconcile(&report);
        println!(
            "Watching {} (Ctrl+C to stop)...",
            style(&settings.connection).bold()
        );
    }

    let start = Instant::now();
    let timeout = (args.timeout > 0).then(|| Duration::from_secs(args.timeout));
    while !stop.load(Ordering::SeqCst) {
        if timeout.is_some_and(|t| start.elapsed() >= t) {
            break;
        }

        let report = app.tick();
        if !report.is_idle() {
            print_tick(cli, &report)?;
            if report.reconcile.is_some() {
                app.save_session()?;
            }
            if args.once {
                break;
            }
        }
        thread::sleep(settings.debounce);
    }

    info!("Stopping watch");
    app.shutdown();
    Ok(())
}

fn cmd_set(cli: &Cli, args: &cli::SetArgs) -> Result<()> {
    let settings = load_settings(cli)?;
    let mut app = open_app(&settings)?;
    app.update_devices();
    let applied = app.apply_setting(&args.uid, &args.name, &args.value)?;
    app.save_session()?;

    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "uid": args.uid,
                "name": args.name,
                "value": args.value,
                "applied": applied,
            }),
        )
    } else {
        if applied {
            println!("{} = {} on {}", args.name, args.value, style(&args.uid).bold());
        } else {
            println!(
                "{} {} = {} recorded for {} but not applied",
                style("!").yellow(),
                args.name,
                args.value,
                style(&args.uid).bold()
            );
        }
        Ok(())
    }
}

fn cmd_slurp(cli: &Cli, args: &cli::SlurpArgs) -> Result<()> {
    let metadata = args
        .meta
        .iter()
        .map(String::as_str)
        .map(parse_field_value)
        .collect::<Result<BTreeMap<_, _>>>()?;

    let settings = load_settings(cli)?;
    let mut app = open_app(&settings)?;
    app.update_devices();
    let keys = app.slurp(&args.uid, &metadata)?;

    if cli.use_json() {
        output_json(cli, &serde_json::json!({ "uid": args.uid, "records": keys }))
    } else {
        for key in &keys {
            println!("{} {key}", style("stored").green());
        }
        Ok(())
    }
}

fn print_conditional(rule: &Conditional) {
    println!(
        "{} {}",
        style(&rule.name).bold(),
        style(format!("({})", rule.device)).dim()
    );
    for step in Step::ALL {
        if rule.step_is_empty(step) {
            continue;
        }
        println!("  [{}]", style(step).cyan());
        for line in rule.step_text(step).lines() {
            println!("    {line}");
        }
    }
}

fn cmd_conditional(cli: &Cli, command: &ConditionalCommand) -> Result<()> {
    let settings = load_settings(cli)?;

    match command {
        ConditionalCommand::Write(args) => {
            let mut app = open_store_app(&settings)?;
            let mut rule = if args.merge {
                app.conditional(&args.name, &args.device)?
                    .unwrap_or_else(|| Conditional::new(&args.name, &args.device))
            } else {
                Conditional::new(&args.name, &args.device)
            };

            let given = [(Step::Pre, &args.pre), (Step::Set, &args.set), (Step::Post, &args.post)];
            for (step, lines) in given {
                if args.merge && lines.is_empty() {
                    continue;
                }
                rule.set_step_text(step, &lines.join("\n"))?;
            }

            app.write_conditional(&rule)?;
            if cli.use_json() {
                output_json(cli, &rule)
            } else {
                if rule.is_empty() {
                    println!("Rule {} has no steps and is not stored", args.name);
                } else {
                    print_conditional(&rule);
                }
                Ok(())
            }
        }
        ConditionalCommand::Show(target) => {
            let mut app = open_store_app(&settings)?;
            let rule = app.conditional(&target.name, &target.device)?.ok_or_else(|| {
                EnnError::ConditionalNotFound {
                    name: target.name.clone(),
                    device: target.device.clone(),
                }
            })?;
            if cli.use_json() {
                output_json(cli, &rule)
            } else {
                print_conditional(&rule);
                Ok(())
            }
        }
        ConditionalCommand::List(args) => {
            let mut app = open_store_app(&settings)?;
            let rules = app.conditionals(&args.device)?;
            if cli.use_json() {
                return output_json(cli, &rules);
            }
            if rules.is_empty() {
                println!("No rules for {}", args.device);
            }
            for rule in &rules {
                println!(
                    "{}  pre:{} set:{} post:{}",
                    style(&rule.name).bold(),
                    rule.pre_contents.len(),
                    rule.set_contents.len(),
                    rule.post_contents.len()
                );
            }
            Ok(())
        }
        ConditionalCommand::Remove(target) => {
            let mut app = open_store_app(&settings)?;
            if !app.remove_conditional(&target.name, &target.device)? {
                return Err(EnnError::ConditionalNotFound {
                    name: target.name.clone(),
                    device: target.device.clone(),
                });
            }
            if cli.use_json() {
                output_json(
                    cli,
                    &serde_json::json!({ "removed": target.name, "device": target.device }),
                )
            } else {
                println!("Removed {} from {}", target.name, target.device);
                Ok(())
            }
        }
        ConditionalCommand::Apply(target) => {
            let mut app = open_app(&settings)?;
            app.update_devices();
            let applied = app.apply_conditional(&target.device, &target.name)?;
            app.save_session()?;
            if cli.use_json() {
                output_json(
                    cli,
                    &serde_json::json!({
                        "rule": target.name,
                        "device": target.device,
                        "applied": applied,
                    }),
                )
            } else {
                println!("Applied {applied} setting(s) from {}", target.name);
                Ok(())
            }
        }
    }
}

fn cmd_session(cli: &Cli, command: &SessionCommand) -> Result<()> {
    let settings = load_settings(cli)?;
    let path = settings.session_path();

    match command {
        SessionCommand::Save => {
            let mut app = open_app(&settings)?;
            app.update_devices();
            app.save_session()?;
            if cli.use_json() {
                output_json(
                    cli,
                    &serde_json::json!({
                        "path": path,
                        "devices": app.registry().len(),
                    }),
                )
            } else {
                println!("Saved {} device(s) to {}", app.registry().len(), path.display());
                Ok(())
            }
        }
        SessionCommand::Show => {
            let registry = session::load(&path)?;
            if cli.use_json() {
                output_json(cli, &registry.records())
            } else {
                print!("{}", session::to_xml(&registry)?);
                Ok(())
            }
        }
        SessionCommand::Path => {
            if cli.use_json() {
                output_json(cli, &serde_json::json!({ "path": path }))
            } else {
                println!("{}", path.display());
                Ok(())
            }
        }
    }
}

fn cmd_env(cli: &Cli, command: &EnvCommand) -> Result<()> {
    let settings = load_settings(cli)?;
    let mut app = open_store_app(&settings)?;

    match command {
        EnvCommand::Show => app.reload_env()?,
        EnvCommand::Set { field, value } => app.set_env(field, value)?,
        EnvCommand::Remove { field } => app.remove_env(field)?,
    }

    if cli.use_json() {
        return output_json(cli, app.env());
    }
    if app.env().is_empty() {
        println!("No environment values for {}", settings.connection);
    }
    for (field, value) in app.env() {
        println!("{} = {value}", style(field).bold());
    }
    Ok(())
}

fn cmd_reference(cli: &Cli, command: &ReferenceCommand) -> Result<()> {
    let settings = load_settings(cli)?;
    let mut store = RedisStore::connect(&settings.connection)?;

    match command {
        ReferenceCommand::Load { files } => {
            let summary = reference::load_files(&mut store, files.as_slice())?;
            if cli.use_json() {
                output_json(cli, &summary)
            } else {
                println!(
                    "Loaded {} script(s), {} call(s), {} device(s)",
                    summary.scripts, summary.calls, summary.devices
                );
                Ok(())
            }
        }
        ReferenceCommand::Lookup { name } => {
            let calls = reference::settings_for(&mut store, name)?;
            if cli.use_json() {
                return output_json(cli, &serde_json::json!({ "device": name, "settings": calls }));
            }
            match calls {
                Some(calls) => {
                    for (call, template) in &calls {
                        println!("{}  {}", style(call).bold(), style(template).dim());
                    }
                }
                None => println!("No adjustable settings for {name}"),
            }
            Ok(())
        }
    }
}

fn cmd_status(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli)?;
    let session_path = settings.session_path();
    let store_error = RedisStore::connect(&settings.connection)
        .and_then(|mut store| store.ping())
        .err()
        .map(|e| e.to_string());
    let session_devices = session::load(&session_path).map(|r| r.len()).ok();

    if cli.use_json() {
        return output_json(
            cli,
            &serde_json::json!({
                "version": build_info::VERSION,
                "store": settings.connection.to_string(),
                "store_reachable": store_error.is_none(),
                "store_error": store_error,
                "db_key": cli.db_key,
                "db_key_field": cli.db_key_field,
                "config_path": settings.config_path,
                "session_path": session_path,
                "session_devices": session_devices,
                "usb_root": settings.usb_root,
            }),
        );
    }

    let reachable = match &store_error {
        None => style("reachable".to_string()).green(),
        Some(e) => style(format!("unreachable ({e})")).red(),
    };
    println!("store:        {} {reachable}", settings.connection);
    println!("db key:       {}", cli.db_key.as_deref().unwrap_or("-"));
    println!("db key field: {}", cli.db_key_field.as_deref().unwrap_or("-"));
    println!(
        "config:       {}",
        settings
            .config_path
            .as_ref()
            .map_or_else(|| "(defaults)".to_string(), |p| p.display().to_string())
    );
    println!("session:      {}", session_path.display());
    if let Some(count) = session_devices {
        println!("devices:      {count} known");
    }
    Ok(())
}

fn cmd_version(cli: &Cli) -> Result<()> {
    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "version": build_info::VERSION,
                "git_sha": build_info::git_sha(),
                "git_dirty": build_info::git_dirty() == "true",
                "build_timestamp": build_info::build_timestamp(),
                "rustc_version": build_info::rustc_semver(),
                "target": build_info::target(),
            }),
        )
    } else {
        println!("enn {}", build_info::VERSION);
        println!(
            "git: {}{}",
            build_info::git_sha(),
            if build_info::git_dirty() == "true" {
                " (dirty)"
            } else {
                ""
            }
        );
        println!("built: {}", build_info::build_timestamp());
        println!("rustc: {}", build_info::rustc_semver());
        println!("target: {}", build_info::target());
        Ok(())
    }
}

#[allow(clippy::unnecessary_wraps)] // Consistent return type with other commands
fn cmd_completions(_cli: &Cli, args: &cli::CompletionsArgs) -> Result<()> {
    use clap::CommandFactory;
    clap_complete::generate(args.shell, &mut Cli::command(), "enn", &mut io::stdout());
    Ok(())
}

// === Utility Functions ===

fn output_json<T: Serialize + ?Sized>(cli: &Cli, data: &T) -> Result<()> {
    let json = if cli.use_compact_json() {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    }
    .with_context(|| "serializing output")?;
    println!("{json}");
    Ok(())
}

fn output_error(cli: &Cli, error: &EnnError) {
    if cli.use_json() {
        let json = serde_json::json!({
            "error": true,
            "message": error.to_string(),
            "suggestion": error.suggestion(),
            "recoverable": error.is_user_recoverable(),
        });
        eprintln!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
    } else {
        eprintln!("{}: {}", style("Error").red().bold(), error);
        if let Some(suggestion) = error.suggestion() {
            eprintln!("{}: {}", style("Hint").yellow(), suggestion);
        }
    }
}
