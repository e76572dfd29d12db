//! Command line entry point: configuration, line sourcing and the event loop.

use std::{
    collections::BTreeMap,
    env, fs,
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use serde::Deserialize;
use tracing::{info, warn};

use crate::model::LogModel;
use crate::tree::{build_tree, TreeLimits};
use crate::tui::{Action, Tui, TuiConfig};

const CONFIG_FILE_NAME: &str = "logtree.json";
const DEFAULT_TAB_WIDTH: usize = 4;
const TUI_TICK_MS: u64 = 50;

pub type DynError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(name = "logtree", version, about = "Browse a log file as a navigable keyword tree")]
struct Cli {
    /// Log file to read; '-' reads stdin (with --dump or --flat only).
    input: Option<PathBuf>,
    /// Start at the subtree selected by this dotted/space-separated path.
    #[arg(long)]
    path: Option<String>,
    /// Print the tree as an indented dump and exit.
    #[arg(long, action = clap::ArgAction::SetTrue, conflicts_with = "flat")]
    dump: bool,
    /// Print the selected node's raw lines and exit.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    flat: bool,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    pager: Option<String>,
    #[arg(long)]
    tab_width: Option<usize>,
    #[arg(long)]
    max_depth: Option<usize>,
    #[arg(long)]
    max_children: Option<usize>,
    #[arg(long)]
    max_value_len: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Config {
    pager: Option<String>,
    tab_width: usize,
    limits: TreeLimits,
}

#[derive(Debug, Default, Clone)]
struct PartialConfig {
    pager: Option<String>,
    tab_width: Option<usize>,
    max_depth: Option<usize>,
    max_children: Option<usize>,
    max_value_len: Option<usize>,
    min_child_lines: Option<usize>,
}

impl PartialConfig {
    fn merge(&mut self, other: PartialConfig) {
        if other.pager.is_some() {
            self.pager = other.pager;
        }
        if other.tab_width.is_some() {
            self.tab_width = other.tab_width;
        }
        if other.max_depth.is_some() {
            self.max_depth = other.max_depth;
        }
        if other.max_children.is_some() {
            self.max_children = other.max_children;
        }
        if other.max_value_len.is_some() {
            self.max_value_len = other.max_value_len;
        }
        if other.min_child_lines.is_some() {
            self.min_child_lines = other.min_child_lines;
        }
    }
}

impl Config {
    fn from_partial(partial: PartialConfig) -> Self {
        let defaults = TreeLimits::default();
        Self {
            pager: partial.pager,
            tab_width: partial.tab_width.unwrap_or(DEFAULT_TAB_WIDTH).max(1),
            limits: TreeLimits {
                max_depth: partial.max_depth.unwrap_or(defaults.max_depth),
                max_children: partial.max_children.unwrap_or(defaults.max_children),
                max_value_len: partial.max_value_len.unwrap_or(defaults.max_value_len),
                min_child_lines: partial.min_child_lines.unwrap_or(defaults.min_child_lines),
            },
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FileConfig {
    pager: Option<String>,
    #[serde(alias = "tabWidth", alias = "tab-width")]
    tab_width: Option<usize>,
    #[serde(alias = "maxDepth", alias = "max-depth")]
    max_depth: Option<usize>,
    #[serde(alias = "maxChildren", alias = "max-children")]
    max_children: Option<usize>,
    #[serde(alias = "maxValueLen", alias = "max-value-len")]
    max_value_len: Option<usize>,
    #[serde(alias = "minChildLines", alias = "min-child-lines")]
    min_child_lines: Option<usize>,
}

impl FileConfig {
    fn into_partial(self) -> PartialConfig {
        PartialConfig {
            pager: self.pager,
            tab_width: self.tab_width,
            max_depth: self.max_depth,
            max_children: self.max_children,
            max_value_len: self.max_value_len,
            min_child_lines: self.min_child_lines,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    ParseFile { path: PathBuf, source: serde_json::Error },
    #[error("config file not found: {path}")]
    MissingConfig { path: PathBuf },
    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },
}

fn load_file_config(path: &Path) -> Result<PartialConfig, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    let parsed: FileConfig = serde_json::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })?;
    Ok(parsed.into_partial())
}

fn env_usize(env: &BTreeMap<String, String>, name: &str) -> Result<Option<usize>, ConfigError> {
    match env.get(name) {
        Some(value) => value
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name: name.to_string(), value: value.clone() }),
        None => Ok(None),
    }
}

fn env_overrides(env: &BTreeMap<String, String>) -> Result<PartialConfig, ConfigError> {
    Ok(PartialConfig {
        pager: env.get("LOGTREE_PAGER").cloned(),
        tab_width: env_usize(env, "LOGTREE_TAB_WIDTH")?,
        max_depth: env_usize(env, "LOGTREE_MAX_DEPTH")?,
        max_children: env_usize(env, "LOGTREE_MAX_CHILDREN")?,
        max_value_len: env_usize(env, "LOGTREE_MAX_VALUE_LEN")?,
        min_child_lines: env_usize(env, "LOGTREE_MIN_CHILD_LINES")?,
    })
}

fn cli_overrides(cli: &Cli) -> PartialConfig {
    PartialConfig {
        pager: cli.pager.clone(),
        tab_width: cli.tab_width,
        max_depth: cli.max_depth,
        max_children: cli.max_children,
        max_value_len: cli.max_value_len,
        min_child_lines: None,
    }
}

/// Resolve the effective config: file, then environment, then CLI flags.
fn resolve_config(
    cli: &Cli,
    cwd: &Path,
    env: &BTreeMap<String, String>,
) -> Result<(Config, Option<PathBuf>), ConfigError> {
    let mut partial = PartialConfig::default();
    let mut config_path = None;

    if let Some(path) = &cli.config {
        if !path.exists() {
            return Err(ConfigError::MissingConfig { path: path.clone() });
        }
        partial.merge(load_file_config(path)?);
        config_path = Some(path.clone());
    } else {
        let default_path = cwd.join(CONFIG_FILE_NAME);
        if default_path.exists() {
            partial.merge(load_file_config(&default_path)?);
            config_path = Some(default_path);
        }
    }

    partial.merge(env_overrides(env)?);
    partial.merge(cli_overrides(cli));
    Ok((Config::from_partial(partial), config_path))
}

/// Expand tabs to spaces at fixed stops. The core never sees tab characters;
/// the expansion policy belongs to this layer.
fn expand_tabs(line: &str, tab_width: usize) -> String {
    if !line.contains('\t') {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len());
    let mut col = 0usize;
    for ch in line.chars() {
        if ch == '\t' {
            let pad = tab_width - (col % tab_width);
            for _ in 0..pad {
                out.push(' ');
            }
            col += pad;
        } else {
            out.push(ch);
            col += 1;
        }
    }
    out
}

fn collect_lines<R: BufRead>(reader: R, tab_width: usize) -> Result<Vec<String>, DynError> {
    let mut lines = Vec::new();
    for line in reader.lines() {
        lines.push(expand_tabs(&line?, tab_width));
    }
    Ok(lines)
}

fn read_file_lines(path: &Path, tab_width: usize) -> Result<Vec<String>, DynError> {
    let file = fs::File::open(path)
        .map_err(|source| format!("failed to open {}: {source}", path.display()))?;
    collect_lines(BufReader::new(file), tab_width)
}

fn read_stdin_lines(tab_width: usize) -> Result<Vec<String>, DynError> {
    let stdin = io::stdin();
    collect_lines(stdin.lock(), tab_width)
}

pub fn run() -> Result<(), DynError> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cwd = env::current_dir()?;
    let env_map: BTreeMap<String, String> = env::vars().collect();
    let (config, config_path) = resolve_config(&cli, &cwd, &env_map)?;

    if let Some(path) = &config_path {
        info!(path = %path.display(), "loaded config file");
    } else {
        info!("no logtree.json found, using defaults and env/cli overrides");
    }
    info!(
        tab_width = config.tab_width,
        max_depth = config.limits.max_depth,
        max_children = config.limits.max_children,
        max_value_len = config.limits.max_value_len,
        pager = ?config.pager,
        "resolved config"
    );

    let interactive = !cli.dump && !cli.flat;
    let from_stdin = cli.input.as_deref().is_none_or(|path| path.to_str() == Some("-"));
    if interactive && from_stdin {
        return Err(
            "interactive mode needs a log file argument; use --dump or --flat to read stdin"
                .into(),
        );
    }
    let lines = if from_stdin {
        read_stdin_lines(config.tab_width)?
    } else {
        let path = cli.input.as_deref().expect("checked above");
        read_file_lines(path, config.tab_width)?
    };

    info!(lines = lines.len(), "building tree");
    let tree = build_tree(lines, &config.limits);
    info!(nodes = tree.node_count(), "tree built");

    let start = match cli.path.as_deref() {
        Some(path) => tree.get_subtree(path)?,
        None => tree.root(),
    };

    if cli.dump {
        print!("{}", tree.dump_from(start));
        return Ok(());
    }
    if cli.flat {
        let stdout = io::stdout();
        let mut stdout = stdout.lock();
        for line in tree.node_lines(start) {
            writeln!(stdout, "{line}")?;
        }
        return Ok(());
    }

    let tui_config = TuiConfig {
        pager_command: config.pager.clone().or_else(|| env_map.get("PAGER").cloned()),
    };
    run_tui_loop(tui_config, LogModel::with_root(tree, start))
}

fn run_tui_loop(config: TuiConfig, model: LogModel) -> Result<(), DynError> {
    let _guard = TerminalGuard::enter()?;
    let stdout = io::stdout();
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    terminal.hide_cursor()?;

    let mut tui = Tui::new(config, model);

    loop {
        terminal.draw(|frame| {
            tui.render(frame);
        })?;

        if event::poll(Duration::from_millis(TUI_TICK_MS))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    match tui.handle_key(key) {
                        Action::Quit => break,
                        Action::None => {}
                        Action::OpenPager => match TerminalSuspendGuard::new(&mut terminal) {
                            Ok(_suspend) => {
                                if let Err(error) = tui.perform_action(Action::OpenPager) {
                                    warn!(error = %error, "pager launch failed");
                                    tui.set_notice(format!("pager failed: {error}"));
                                }
                            }
                            Err(error) => {
                                warn!(error = %error, "terminal suspend failed");
                                tui.set_notice("failed to suspend terminal for the pager");
                            }
                        },
                    }
                }
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }

    terminal.show_cursor()?;
    Ok(())
}

struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self, DynError> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

struct TerminalSuspendGuard<'a> {
    terminal: &'a mut Terminal<CrosstermBackend<io::Stdout>>,
}

impl<'a> TerminalSuspendGuard<'a> {
    fn new(terminal: &'a mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<Self, DynError> {
        terminal.show_cursor()?;
        disable_raw_mode()?;
        if let Err(error) = execute!(terminal.backend_mut(), LeaveAlternateScreen) {
            let _ = enable_raw_mode();
            let _ = execute!(terminal.backend_mut(), EnterAlternateScreen);
            let _ = terminal.hide_cursor();
            let _ = terminal.backend_mut().flush();
            return Err(error.into());
        }
        terminal.backend_mut().flush()?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalSuspendGuard<'_> {
    fn drop(&mut self) {
        let _ = enable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), EnterAlternateScreen);
        let _ = self.terminal.clear();
        let _ = self.terminal.hide_cursor();
        let _ = self.terminal.backend_mut().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn empty_cli() -> Cli {
        Cli::parse_from(["logtree"])
    }

    fn no_env() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[test]
    fn defaults_apply_without_config_sources() {
        let dir = tempdir().expect("tempdir");
        let (config, path) = resolve_config(&empty_cli(), dir.path(), &no_env()).expect("resolve");
        assert_eq!(path, None);
        assert_eq!(config.pager, None);
        assert_eq!(config.tab_width, DEFAULT_TAB_WIDTH);
        assert_eq!(config.limits, TreeLimits::default());
    }

    #[test]
    fn config_file_is_discovered_in_cwd() {
        let dir = tempdir().expect("tempdir");
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{ "pager": "less -R", "maxDepth": 6, "tab_width": 8 }"#,
        )
        .expect("write config");

        let (config, path) = resolve_config(&empty_cli(), dir.path(), &no_env()).expect("resolve");
        assert_eq!(path, Some(dir.path().join(CONFIG_FILE_NAME)));
        assert_eq!(config.pager.as_deref(), Some("less -R"));
        assert_eq!(config.limits.max_depth, 6);
        assert_eq!(config.tab_width, 8);
    }

    #[test]
    fn env_overrides_file_and_cli_overrides_env() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join(CONFIG_FILE_NAME), r#"{ "maxDepth": 6, "pager": "from-file" }"#)
            .expect("write config");

        let mut env = no_env();
        env.insert("LOGTREE_MAX_DEPTH".to_string(), "7".to_string());
        env.insert("LOGTREE_PAGER".to_string(), "from-env".to_string());

        let cli = Cli::parse_from(["logtree", "--max-depth", "8"]);
        let (config, _) = resolve_config(&cli, dir.path(), &env).expect("resolve");
        assert_eq!(config.limits.max_depth, 8);
        assert_eq!(config.pager.as_deref(), Some("from-env"));
    }

    #[test]
    fn invalid_env_value_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let mut env = no_env();
        env.insert("LOGTREE_MAX_DEPTH".to_string(), "very deep".to_string());
        let error = resolve_config(&empty_cli(), dir.path(), &env).expect_err("invalid env");
        assert!(matches!(error, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn explicit_config_path_must_exist() {
        let dir = tempdir().expect("tempdir");
        let cli = Cli::parse_from([
            "logtree",
            "--config",
            dir.path().join("absent.json").to_str().expect("utf-8 path"),
        ]);
        let error = resolve_config(&cli, dir.path(), &no_env()).expect_err("missing config");
        assert!(matches!(error, ConfigError::MissingConfig { .. }));
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join(CONFIG_FILE_NAME), "not json").expect("write config");
        let error = resolve_config(&empty_cli(), dir.path(), &no_env()).expect_err("parse failure");
        assert!(matches!(error, ConfigError::ParseFile { .. }));
    }

    #[test]
    fn tabs_expand_to_fixed_stops() {
        assert_eq!(expand_tabs("a\tb", 4), "a   b");
        assert_eq!(expand_tabs("\t", 4), "    ");
        assert_eq!(expand_tabs("abcd\te", 4), "abcd    e");
        assert_eq!(expand_tabs("no tabs", 4), "no tabs");
        assert_eq!(expand_tabs("a\tb\tc", 2), "a b c");
    }

    #[test]
    fn file_lines_are_read_in_order_with_tabs_expanded() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("app.log");
        fs::write(&path, "first\tline\nsecond line\n").expect("write log");
        let lines = read_file_lines(&path, 4).expect("read");
        assert_eq!(lines, vec!["first   line".to_string(), "second line".to_string()]);
    }
}
