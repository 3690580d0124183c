mod app;
mod ui;

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing_subscriber::EnvFilter;

use shipcheck::cluster;
use shipcheck::config::{self, Config};
use shipcheck::exec::{self, ProcessExecutor, Runner};
use shipcheck::pipeline::{self, DeployReport, Orchestrator};
use shipcheck::scaffold;

use app::{App, Panel};

/// Build two images, deploy them to a throwaway k3s cluster and smoke-test
/// the result.
#[derive(Parser)]
#[command(name = "shipcheck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and publish the configured images
    Build {
        /// Source root containing the build contexts
        #[arg(default_value = ".")]
        src: PathBuf,
    },

    /// Provision a cluster, deploy the manifests and wait for the workloads
    Up {
        #[arg(default_value = ".")]
        src: PathBuf,

        /// Command to run in the cluster once it is ready (repeatable)
        #[arg(long = "exec", value_name = "CMD")]
        commands: Vec<String>,
    },

    /// Run the whole pipeline and print the report
    Deploy {
        #[arg(default_value = ".")]
        src: PathBuf,

        /// Print the report as JSON
        #[arg(long, conflicts_with = "tui")]
        json: bool,

        /// Follow the run in a terminal dashboard
        #[arg(long)]
        tui: bool,
    },

    /// Remove the containers and network of a run
    Down {
        /// Run id printed by `up` or `deploy`
        run: String,

        /// Directory holding the configuration
        #[arg(long, default_value = ".")]
        src: PathBuf,
    },

    /// Write the demo source tree into a directory
    Init {
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Build { src } => {
            let cfg = prepare(&src, cli.verbose, false)?;
            let mut orchestrator = Orchestrator::new(cfg, ProcessExecutor);
            let images = orchestrator.build_and_publish_images(&src)?;
            for image in images {
                println!("{image}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Up { src, commands } => {
            let cfg = prepare(&src, cli.verbose, false)?;
            let argvs = commands
                .iter()
                .map(|c| {
                    shell_words::split(c).with_context(|| format!("cannot parse --exec {c:?}"))
                })
                .collect::<Result<Vec<_>>>()?;

            let mut orchestrator = Orchestrator::new(cfg, ProcessExecutor);
            let run_id = orchestrator.run_id().to_string();
            let outcome = up(&mut orchestrator, &src, &argvs);
            println!("run: {run_id}");
            outcome?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Deploy { src, json, tui } => {
            let cfg = prepare(&src, cli.verbose, tui)?;
            let report = if tui {
                deploy_tui(cfg, src)?
            } else {
                let mut orchestrator = Orchestrator::new(cfg, ProcessExecutor);
                let run_id = orchestrator.run_id().to_string();
                match orchestrator.deploy_full_stack(&src) {
                    Ok(report) => Some(report),
                    Err(e) => {
                        eprintln!("run {run_id} failed; `shipcheck down {run_id}` removes it");
                        return Err(e.into());
                    }
                }
            };

            let Some(report) = report else {
                return Ok(ExitCode::FAILURE);
            };
            if json {
                println!("{}", report.to_json()?);
            } else if !tui {
                println!("{}", report.render());
                println!("\nrun: {}", report.run_id);
            }
            Ok(exit_code(&report))
        }
        Commands::Down { run, src } => {
            let cfg = prepare(&src, cli.verbose, false)?;
            let executor = ProcessExecutor;
            let summary = cluster::teardown(
                &Runner::new(&executor),
                &cfg.engine,
                &run,
                cfg.timeouts.command(),
            )?;
            println!(
                "removed {} container(s) and {} network(s)",
                summary.containers, summary.networks
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Init { dir } => {
            setup_logging(cli.verbose, None)?;
            let written = scaffold::init(&dir)?;
            for path in written {
                println!("{}", dir.join(path).display());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Load configuration, start logging and check the engine answers.
fn prepare(src: &Path, verbose: u8, tui: bool) -> Result<Config> {
    if !src.is_dir() {
        bail!("{} is not a directory", src.display());
    }
    let cfg = config::load(src)?;
    let log_file = if tui {
        let dir = PathBuf::from(&cfg.state_dir);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        Some(dir.join("shipcheck.log"))
    } else {
        None
    };
    setup_logging(verbose, log_file.as_deref())?;
    exec::ensure_available(&cfg.engine)?;
    Ok(cfg)
}

fn up(orchestrator: &mut Orchestrator, src: &Path, commands: &[Vec<String>]) -> Result<()> {
    let server = orchestrator.provision_and_deploy(src)?;
    println!("cluster api: {}", server.endpoint);
    if let Some(session) = orchestrator.session().active() {
        println!("network: {}", session.network());
        for binding in session.bindings() {
            println!("bound: {} -> {}", binding.address(), binding.service.container);
        }
    }
    for status in orchestrator.wait_ready()? {
        println!("{status}");
    }
    for argv in commands {
        print!("{}", orchestrator.run_command(argv)?);
    }
    Ok(())
}

fn exit_code(report: &DeployReport) -> ExitCode {
    if report.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `-v`; with a log
/// file, output goes there instead of stderr.
fn setup_logging(verbose: u8, log_file: Option<&Path>) -> Result<()> {
    let level = match verbose {
        0 => "shipcheck=info",
        1 => "shipcheck=debug",
        _ => "shipcheck=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(io::stderr).try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))
}

// ── Dashboard ───────────────────────────────────────────────────────────

fn deploy_tui(cfg: Config, src: PathBuf) -> Result<Option<DeployReport>> {
    // Ensure terminal is restored on panic.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = restore_terminal();
        original_hook(info);
    }));

    let rx = pipeline::run_full_stack(cfg, src, ProcessExecutor);
    let mut app = App::new(rx);

    let mut terminal = setup_terminal()?;
    let result = event_loop(&mut terminal, &mut app);
    restore_terminal()?;
    result?;

    if let Some(reason) = &app.aborted {
        eprintln!("aborted: {reason}");
    }
    Ok(app.report)
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal() -> Result<()> {
    terminal::disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen)?;
    Ok(())
}

fn event_loop(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    while app.running {
        terminal.draw(|frame| ui::draw(frame, app))?;

        // Short poll while the pipeline runs so events are drained promptly.
        let poll_timeout = if app.deploying {
            Duration::from_millis(50)
        } else {
            Duration::from_millis(200)
        };
        if event::poll(poll_timeout)?
            && let Event::Key(key) = event::read()?
        {
            handle_key(app, key);
            app.clamp_indices();
        }

        app.drain_events();
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    if app.show_help {
        app.show_help = false;
        return;
    }

    // Global keys.
    match (key.code, key.modifiers) {
        (KeyCode::Char('c'), KeyModifiers::CONTROL) | (KeyCode::Char('q'), _) => {
            app.running = false;
            return;
        }
        (KeyCode::Char('?'), _) => {
            app.show_help = true;
            return;
        }
        (KeyCode::Char('+'), _) => {
            app.screen_mode = app.screen_mode.cycle_next();
            return;
        }
        (KeyCode::Char('_'), _) => {
            app.screen_mode = app.screen_mode.cycle_prev();
            return;
        }
        (KeyCode::Char('f'), _) => {
            app.follow = !app.follow;
            return;
        }
        _ => {}
    }

    // Panel switching.
    match key.code {
        KeyCode::Tab | KeyCode::Right | KeyCode::Char('l') => {
            app.focused_panel = app.focused_panel.next();
            return;
        }
        KeyCode::BackTab | KeyCode::Left | KeyCode::Char('h') => {
            app.focused_panel = app.focused_panel.prev();
            return;
        }
        KeyCode::Char(c @ '1'..='4') => {
            if let Some(panel) = Panel::from_index((c as usize) - ('1' as usize)) {
                app.focused_panel = panel;
            }
            return;
        }
        _ => {}
    }

    // Panel-specific keys.
    match app.focused_panel {
        Panel::Stages => match key.code {
            KeyCode::Down | KeyCode::Char('j') => {
                app.follow = false;
                app.stage_index = app.stage_index.saturating_add(1);
                app.log_scroll = 0;
            }
            KeyCode::Up | KeyCode::Char('k') => {
                app.follow = false;
                app.stage_index = app.stage_index.saturating_sub(1);
                app.log_scroll = 0;
            }
            _ => {}
        },
        Panel::Probes => match key.code {
            KeyCode::Down | KeyCode::Char('j') => {
                app.probe_index = app.probe_index.saturating_add(1);
            }
            KeyCode::Up | KeyCode::Char('k') => {
                app.probe_index = app.probe_index.saturating_sub(1);
            }
            _ => {}
        },
        Panel::Log => match key.code {
            KeyCode::Down | KeyCode::Char('j') => {
                app.follow = false;
                app.log_scroll = app.log_scroll.saturating_add(1);
            }
            KeyCode::Up | KeyCode::Char('k') => {
                app.follow = false;
                app.log_scroll = app.log_scroll.saturating_sub(1);
            }
            KeyCode::Home | KeyCode::Char('g') => app.log_scroll = 0,
            _ => {}
        },
        Panel::Report => match key.code {
            KeyCode::Down | KeyCode::Char('j') => {
                app.report_scroll = app.report_scroll.saturating_add(1)
            }
            KeyCode::Up | KeyCode::Char('k') => {
                app.report_scroll = app.report_scroll.saturating_sub(1)
            }
            KeyCode::Home | KeyCode::Char('g') => app.report_scroll = 0,
            _ => {}
        },
    }
}
