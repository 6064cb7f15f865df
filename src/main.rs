use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use lightsout::{
    app::{App, Control},
    app_dirs::AppDirs,
    config::{ConfigStore, FileConfigStore},
    format::format_time,
    history::{newest_first, HistoryStore, Solve, SqliteBackend},
    identity::{AnonymousIdentity, IdentityProvider, TokenIdentity},
    runtime::{CrosstermEventSource, EventSource, FixedTicker, Runner, Ticker},
    ui,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs::{self, OpenOptions},
    io::{self, stdin},
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};
use tracing_subscriber::EnvFilter;

const TICK_RATE_MS: u64 = 10;
const LOG_ENV: &str = "LIGHTSOUT_LOG";

/// speedcubing timer with a five-light race start and solve history
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A speedcubing practice timer. Press space to run a five-light start sequence; the timer starts when the lights go out and stops on the next press. Solves are saved per user and the recent ones are listed and charted."
)]
pub struct Cli {
    /// identity token issued elsewhere (default: an anonymous id kept on this machine)
    #[clap(short = 't', long)]
    token: Option<String>,

    /// history database file
    #[clap(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// log file (filter with LIGHTSOUT_LOG, e.g. LIGHTSOUT_LOG=debug)
    #[clap(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// write the solve history as csv to PATH and exit
    #[clap(long, value_name = "PATH")]
    export: Option<PathBuf>,

    /// save the effective configuration to the config file
    #[clap(long)]
    save_config: bool,
}

impl Cli {
    fn identity_provider(&self) -> Box<dyn IdentityProvider> {
        match &self.token {
            Some(token) => Box::new(TokenIdentity::new(token.clone())),
            None => Box::new(AnonymousIdentity::with_path(
                AppDirs::identity_path().unwrap_or_else(|| PathBuf::from("lightsout_identity")),
            )),
        }
    }

    fn db_path(&self) -> PathBuf {
        self.db
            .clone()
            .or_else(AppDirs::db_path)
            .unwrap_or_else(|| PathBuf::from("lightsout_history.db"))
    }

    fn log_path(&self) -> Option<PathBuf> {
        self.log_file.clone().or_else(AppDirs::log_path)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_path().as_deref());

    let config_store = FileConfigStore::new();
    let config = config_store.load();
    if cli.save_config {
        config_store.save(&config)?;
        tracing::info!(path = %config_store.path().display(), "saved config");
    }

    let db_path = cli.db_path();
    let store = HistoryStore::spawn(SqliteBackend::open(&db_path)?);
    tracing::info!(db = %db_path.display(), "history store ready");

    if let Some(path) = &cli.export {
        let count = export_history(&store, cli.identity_provider().as_ref(), path)?;
        println!("exported {count} solves to {}", path.display());
        return Ok(());
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    let mut app = App::live(config, store, runner.sender());
    app.start_sign_in(cli.identity_provider());

    let result = start_tui(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn start_tui<B: Backend, E: EventSource, T: Ticker>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<E, T>,
) -> Result<(), Box<dyn Error>> {
    loop {
        terminal.draw(|f| ui::draw(&*app, f))?;

        let event = runner.step_within(app.next_wake());
        if app.handle_event(event) == Control::Quit {
            break;
        }
    }
    tracing::info!("quit");
    Ok(())
}

/// Log to a file since the terminal belongs to the UI. Failure only loses logs.
fn init_logging(path: Option<&Path>) {
    let Some(path) = path else {
        return;
    };
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let file = match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("warning: cannot open log file {}: {e}", path.display());
            return;
        }
    };

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
}

fn export_history(
    store: &HistoryStore,
    provider: &dyn IdentityProvider,
    path: &Path,
) -> Result<usize, Box<dyn Error>> {
    let user = provider.sign_in()?;
    store.set_identity(Some(user));
    let solves = newest_first(&store.snapshot_blocking()?);

    let file = fs::File::create(path)?;
    write_csv(&solves, file)?;
    tracing::info!(count = solves.len(), path = %path.display(), "exported history");
    Ok(solves.len())
}

fn write_csv<W: io::Write>(solves: &[Solve], out: W) -> Result<(), Box<dyn Error>> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["id", "elapsed_ms", "recorded_at", "time"])?;
    for solve in solves {
        writer.write_record([
            solve.id.map(|id| id.0.to_string()).unwrap_or_default(),
            solve.elapsed_ms.to_string(),
            solve
                .recorded_at
                .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
                .unwrap_or_default(),
            format_time(solve.elapsed_ms),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use lightsout::history::{MemoryBackend, SolveId};

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::parse_from(["lightsout"]);

        assert_eq!(cli.token, None);
        assert_eq!(cli.db, None);
        assert_eq!(cli.export, None);
        assert!(!cli.save_config);
    }

    #[test]
    fn test_cli_token() {
        let cli = Cli::parse_from(["lightsout", "-t", "abc"]);
        assert_eq!(cli.token, Some("abc".to_string()));

        let cli = Cli::parse_from(["lightsout", "--token", "xyz"]);
        assert_eq!(cli.token, Some("xyz".to_string()));
    }

    #[test]
    fn test_cli_paths() {
        let cli = Cli::parse_from([
            "lightsout",
            "--db",
            "/tmp/h.db",
            "--export",
            "out.csv",
            "--log-file",
            "/tmp/l.log",
        ]);
        assert_eq!(cli.db_path(), PathBuf::from("/tmp/h.db"));
        assert_eq!(cli.export, Some(PathBuf::from("out.csv")));
        assert_eq!(cli.log_path(), Some(PathBuf::from("/tmp/l.log")));
    }

    #[test]
    fn test_cli_token_becomes_identity() {
        let cli = Cli::parse_from(["lightsout", "--token", " racer "]);
        let user = cli.identity_provider().sign_in().unwrap();
        assert_eq!(user.as_str(), "racer");
    }

    #[test]
    fn test_write_csv_rows() {
        let solves = vec![
            Solve {
                id: Some(SolveId(7)),
                elapsed_ms: 61_230,
                recorded_at: Some(Utc.timestamp_millis_opt(1_500).unwrap()),
            },
            Solve::pending(1237),
        ];
        let mut out = Vec::new();
        write_csv(&solves, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,elapsed_ms,recorded_at,time");
        assert_eq!(lines[1], "7,61230,1970-01-01T00:00:01.500Z,1:01.23");
        assert_eq!(lines[2], ",1237,,1.23");
    }

    #[test]
    fn test_export_history_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let store = HistoryStore::spawn(MemoryBackend::new());
        store.set_identity(Some(lightsout::history::UserId::new("racer")));
        for ms in [3000, 2000] {
            let (tx, rx) = std::sync::mpsc::channel();
            store.append(ms, move |r| {
                let _ = tx.send(r.is_ok());
            });
            assert!(rx.recv().unwrap());
            std::thread::sleep(Duration::from_millis(5));
        }

        let count = export_history(&store, &TokenIdentity::new("racer"), &path).unwrap();
        assert_eq!(count, 2);

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[1].contains(",2000,"));
        assert!(lines[2].contains(",3000,"));
    }
}
