//! Ratatui interface for logtree.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::Frame;
use tempfile::{NamedTempFile, TempPath};
use thiserror::Error;
use tracing::warn;

use crate::model::{LogModel, PaneId};
use crate::view::{RowSource, TextView};

/// Abstract input keys the controller understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKey {
    Up,
    Down,
    PageUp,
    PageDown,
    Left,
    Right,
    Home,
    End,
    Enter,
    Tab,
    Yank,
    Pager,
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Tree,
    Detail,
}

/// Possible actions requiring external side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    OpenPager,
    Quit,
}

/// Outcome after executing an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    OpenedPager(PathBuf),
    Quit,
}

/// Errors raised by the TUI.
#[derive(Debug, Error)]
pub enum TuiError {
    #[error("clipboard error: {0}")]
    Clipboard(#[from] arboard::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid command line: {0}")]
    InvalidCommandLine(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
    #[error("no action to perform")]
    NoAction,
}

/// Clipboard abstraction for yank support.
pub trait Clipboard: Send {
    fn set(&mut self, contents: &str) -> Result<(), TuiError>;
}

/// System clipboard using arboard, initialized on first use.
#[derive(Default)]
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self { inner: None }
    }
}

impl Clipboard for SystemClipboard {
    fn set(&mut self, contents: &str) -> Result<(), TuiError> {
        if self.inner.is_none() {
            self.inner = Some(arboard::Clipboard::new().map_err(TuiError::Clipboard)?);
        }
        let clipboard = self.inner.as_mut().expect("clipboard just initialized");
        clipboard.set_text(contents.to_string()).map_err(TuiError::Clipboard)
    }
}

/// Configuration for external integrations.
#[derive(Debug, Clone)]
pub struct TuiConfig {
    pub pager_command: Option<String>,
}

impl Default for TuiConfig {
    fn default() -> Self {
        Self { pager_command: std::env::var("PAGER").ok() }
    }
}

struct PaneSource<'a> {
    model: &'a LogModel,
    pane: PaneId,
}

impl RowSource for PaneSource<'_> {
    fn row_count(&self) -> usize {
        self.model.row_count(self.pane)
    }

    fn visible_rows(&self, origin: usize, count: usize) -> Vec<String> {
        self.model.visible_rows(self.pane, origin, count)
    }

    fn content_width(&self) -> usize {
        self.model.content_width(self.pane)
    }
}

fn source(model: &LogModel, pane: PaneId) -> PaneSource<'_> {
    PaneSource { model, pane }
}

/// Single-line, stateless text display.
pub struct StatusBar;

impl StatusBar {
    pub fn render(frame: &mut Frame<'_>, area: Rect, text: &str) {
        let paragraph = Paragraph::new(Line::from(text.to_string()))
            .style(Style::default().add_modifier(Modifier::REVERSED));
        frame.render_widget(paragraph, area);
    }
}

/// Main TUI container: the model, one view per pane, focus and overlays.
pub struct Tui {
    pub config: TuiConfig,
    model: LogModel,
    tree_view: TextView,
    detail_view: TextView,
    focus: FocusPane,
    show_help: bool,
    help_scroll: u16,
    help_viewport_height: u16,
    notice: Option<String>,
    clipboard: Box<dyn Clipboard>,
    open_temp: Option<TempPath>,
}

impl Tui {
    pub fn new(config: TuiConfig, model: LogModel) -> Self {
        Self::with_clipboard(config, model, Box::new(SystemClipboard::new()))
    }

    pub fn with_clipboard(
        config: TuiConfig,
        model: LogModel,
        clipboard: Box<dyn Clipboard>,
    ) -> Self {
        let mut tui = Self {
            config,
            model,
            tree_view: TextView::new(),
            detail_view: TextView::new(),
            focus: FocusPane::Tree,
            show_help: false,
            help_scroll: 0,
            help_viewport_height: 0,
            notice: None,
            clipboard,
            open_temp: None,
        };
        tui.tree_view.data_changed(&source(&tui.model, PaneId::Tree));
        tui.detail_view.data_changed(&source(&tui.model, PaneId::Detail));
        tui
    }

    pub fn model(&self) -> &LogModel {
        &self.model
    }

    pub fn focus(&self) -> FocusPane {
        self.focus
    }

    pub fn set_notice(&mut self, notice: impl Into<String>) {
        self.notice = Some(notice.into());
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Action {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') | KeyCode::Char('C') => Action::Quit,
                _ => Action::None,
            };
        }

        if self.show_help {
            return self.handle_help_key(key);
        }

        let Some(input) = map_key(key) else {
            return Action::None;
        };
        self.notice = None;

        match input {
            InputKey::Up => self.move_focused(-1),
            InputKey::Down => self.move_focused(1),
            InputKey::PageUp => self.page_focused(-1),
            InputKey::PageDown => self.page_focused(1),
            InputKey::Home => self.jump_focused(JumpTo::First),
            InputKey::End => self.jump_focused(JumpTo::Last),
            InputKey::Left => self.focused_view().scroll_horizontal(-1),
            InputKey::Right => self.focused_view().scroll_horizontal(1),
            InputKey::Tab => {
                self.focus = match self.focus {
                    FocusPane::Tree => FocusPane::Detail,
                    FocusPane::Detail => FocusPane::Tree,
                };
            }
            InputKey::Enter => match self.focus {
                FocusPane::Tree => self.activate_cursor_row(),
                FocusPane::Detail => return Action::OpenPager,
            },
            InputKey::Pager => return Action::OpenPager,
            InputKey::Yank => self.yank_selected(),
            InputKey::Help => {
                self.show_help = true;
                self.help_scroll = 0;
            }
            InputKey::Quit => return Action::Quit,
        }

        Action::None
    }

    fn handle_help_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Esc | KeyCode::Char('?') => self.show_help = false,
            KeyCode::Char('q') | KeyCode::Char('Q') => return Action::Quit,
            KeyCode::Char('j') | KeyCode::Down => {
                self.help_scroll = self.help_scroll.saturating_add(1);
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.help_scroll = self.help_scroll.saturating_sub(1);
            }
            KeyCode::PageDown => {
                let page = self.help_viewport_height.max(1).saturating_sub(1);
                self.help_scroll = self.help_scroll.saturating_add(page.max(1));
            }
            KeyCode::PageUp => {
                let page = self.help_viewport_height.max(1).saturating_sub(1);
                self.help_scroll = self.help_scroll.saturating_sub(page.max(1));
            }
            KeyCode::Home => self.help_scroll = 0,
            _ => {}
        }
        Action::None
    }

    fn focused_view(&mut self) -> &mut TextView {
        match self.focus {
            FocusPane::Tree => &mut self.tree_view,
            FocusPane::Detail => &mut self.detail_view,
        }
    }

    fn move_focused(&mut self, delta: isize) {
        match self.focus {
            FocusPane::Tree => {
                let moved = self.tree_view.move_by(delta, &source(&self.model, PaneId::Tree));
                if let Some(row) = moved {
                    self.select_row(row);
                }
            }
            FocusPane::Detail => {
                self.detail_view.move_by(delta, &source(&self.model, PaneId::Detail));
            }
        }
    }

    fn page_focused(&mut self, direction: isize) {
        match self.focus {
            FocusPane::Tree => {
                let moved = self.tree_view.page(direction, &source(&self.model, PaneId::Tree));
                if let Some(row) = moved {
                    self.select_row(row);
                }
            }
            FocusPane::Detail => {
                self.detail_view.page(direction, &source(&self.model, PaneId::Detail));
            }
        }
    }

    fn jump_focused(&mut self, target: JumpTo) {
        match self.focus {
            FocusPane::Tree => {
                let row = target.row(self.model.row_count(PaneId::Tree));
                let moved = self.tree_view.move_to(row, &source(&self.model, PaneId::Tree));
                if let Some(row) = moved {
                    self.select_row(row);
                }
            }
            FocusPane::Detail => {
                let row = target.row(self.model.row_count(PaneId::Detail));
                self.detail_view.move_to(row, &source(&self.model, PaneId::Detail));
            }
        }
    }

    fn select_row(&mut self, row: usize) {
        if self.model.select(row) {
            self.detail_view.data_changed(&source(&self.model, PaneId::Detail));
        }
    }

    /// Expand or collapse the node under the tree cursor, then re-point the
    /// selection at whatever row the cursor landed on.
    fn activate_cursor_row(&mut self) {
        let row = self.tree_view.cursor_row();
        if !self.model.toggle(row) {
            return;
        }
        self.tree_view.data_changed(&source(&self.model, PaneId::Tree));
        let row = self.tree_view.cursor_row();
        if self.model.select(row) {
            self.detail_view.data_changed(&source(&self.model, PaneId::Detail));
        }
    }

    fn yank_selected(&mut self) {
        let lines = self.model.selected_lines();
        let count = lines.len();
        let contents = lines.join("\n");
        match self.clipboard.set(&contents) {
            Ok(()) => self.notice = Some(format!("yanked {count} lines")),
            Err(error) => {
                warn!(error = %error, "clipboard yank failed");
                self.notice = Some(format!("yank failed: {error}"));
            }
        }
    }

    pub fn perform_action(&mut self, action: Action) -> Result<ActionOutcome, TuiError> {
        match action {
            Action::None => Err(TuiError::NoAction),
            Action::Quit => Ok(ActionOutcome::Quit),
            Action::OpenPager => {
                let path = self.open_in_pager()?;
                Ok(ActionOutcome::OpenedPager(path))
            }
        }
    }

    /// Write the selected node's raw lines to a temp file and hand it to the
    /// external pager. The temp path stays alive until the next export.
    fn open_in_pager(&mut self) -> Result<PathBuf, TuiError> {
        let mut file = NamedTempFile::new()?;
        for line in self.model.selected_lines() {
            writeln!(file, "{line}")?;
        }
        file.flush()?;
        let temp_path = file.into_temp_path();

        let command =
            self.config.pager_command.clone().unwrap_or_else(|| "less".to_string());
        launch_command(&command, &temp_path)?;

        let path = temp_path.to_path_buf();
        self.open_temp = Some(temp_path);
        Ok(path)
    }

    pub fn render(&mut self, frame: &mut Frame<'_>) {
        let area = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(area);

        self.render_main(frame, chunks[0]);
        self.render_status(frame, chunks[1]);

        if self.show_help {
            self.render_help(frame);
        }
    }

    fn stack_panes_vertically(&self, area: Rect) -> bool {
        area.width < 90
    }

    fn render_main(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let direction = if self.stack_panes_vertically(area) {
            Direction::Vertical
        } else {
            Direction::Horizontal
        };
        let chunks = Layout::default()
            .direction(direction)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(area);

        self.render_tree(frame, chunks[0]);
        self.render_detail(frame, chunks[1]);
    }

    fn panel_border_style(&self, focused: bool) -> Style {
        if self.show_help {
            Style::default().fg(Color::DarkGray)
        } else if focused {
            Style::default().fg(Color::Green)
        } else {
            Style::default()
        }
    }

    fn panel_title_style(&self, focused: bool) -> Style {
        if focused {
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
        } else {
            Style::default().add_modifier(Modifier::BOLD)
        }
    }

    fn selection_style(&self) -> Style {
        // Reverse-video adapts to the user's terminal theme.
        Style::default().add_modifier(Modifier::REVERSED | Modifier::BOLD)
    }

    fn render_tree(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let focused = self.focus == FocusPane::Tree && !self.show_help;
        let total = self.model.row_count(PaneId::Tree);
        let pos = if total == 0 { 0 } else { self.tree_view.cursor_row().saturating_add(1) };
        let block = Block::default()
            .borders(Borders::ALL)
            .title("─ Tree ")
            .title_bottom(Line::from(format!("─ {pos} of {total} ─")).right_aligned())
            .border_style(self.panel_border_style(focused))
            .title_style(self.panel_title_style(focused));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        self.tree_view.set_viewport(
            inner.width as usize,
            inner.height as usize,
            &source(&self.model, PaneId::Tree),
        );
        let cursor = self.tree_view.cursor_in_window();
        let selection = self.selection_style();
        let lines: Vec<Line> = self
            .tree_view
            .window()
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                if idx == cursor && total > 0 {
                    Line::styled(row.clone(), selection)
                } else {
                    Line::raw(row.clone())
                }
            })
            .collect();
        let paragraph =
            Paragraph::new(Text::from(lines)).scroll((0, self.tree_view.h_offset() as u16));
        frame.render_widget(paragraph, inner);
    }

    fn render_detail(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let focused = self.focus == FocusPane::Detail && !self.show_help;
        let total = self.model.row_count(PaneId::Detail);
        let pos = if total == 0 { 0 } else { self.detail_view.cursor_row().saturating_add(1) };
        let title = format!("─ Log · {} ", truncate_title(&self.model.selected_path(), 40));
        let block = Block::default()
            .borders(Borders::ALL)
            .title(title)
            .title_bottom(Line::from(format!("─ {pos} of {total} ─")).right_aligned())
            .border_style(self.panel_border_style(focused))
            .title_style(self.panel_title_style(focused));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        self.detail_view.set_viewport(
            inner.width as usize,
            inner.height as usize,
            &source(&self.model, PaneId::Detail),
        );
        let cursor = self.detail_view.cursor_in_window();
        let selection = self.selection_style();
        let lines: Vec<Line> = self
            .detail_view
            .window()
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                if focused && idx == cursor && total > 0 {
                    Line::styled(row.clone(), selection)
                } else {
                    Line::raw(row.clone())
                }
            })
            .collect();
        let paragraph =
            Paragraph::new(Text::from(lines)).scroll((0, self.detail_view.h_offset() as u16));
        frame.render_widget(paragraph, inner);
    }

    fn render_status(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let text = if let Some(notice) = &self.notice {
            format!(" {notice}")
        } else {
            let path = self.model.selected_path();
            let shown = if path.is_empty() { "(root)".to_string() } else { path };
            format!(
                " {} · {} lines · tab:pane enter:toggle o:pager y:yank ?:help q:quit",
                shown,
                self.model.row_count(PaneId::Detail)
            )
        };
        StatusBar::render(frame, area, &text);
    }

    fn render_help(&mut self, frame: &mut Frame<'_>) {
        let area = centered_rect(60, 70, frame.area());
        frame.render_widget(Clear, area);

        let key_style = Style::default().fg(Color::LightBlue).add_modifier(Modifier::BOLD);
        let header_style = Style::default().fg(Color::Green).add_modifier(Modifier::BOLD);
        let entry = |keys: &str, what: &str| {
            Line::from(vec![
                Span::raw("  "),
                Span::styled(format!("{keys:<12}"), key_style),
                Span::raw(what.to_string()),
            ])
        };

        let lines = vec![
            Line::styled("Navigation", header_style),
            entry("j / ↓", "move down"),
            entry("k / ↑", "move up"),
            entry("PgUp / PgDn", "move by a page"),
            entry("g / Home", "jump to the first row"),
            entry("G / End", "jump to the last row"),
            entry("h / ←", "scroll left"),
            entry("l / →", "scroll right"),
            entry("Tab", "switch between tree and log pane"),
            Line::raw(""),
            Line::styled("Tree", header_style),
            entry("Enter", "expand or collapse the branch"),
            Line::raw(""),
            Line::styled("Export", header_style),
            entry("o", "open the selected lines in the pager"),
            entry("Enter", "same, when the log pane is focused"),
            entry("y", "yank the selected lines to the clipboard"),
            Line::raw(""),
            Line::styled("Other", header_style),
            entry("?", "toggle this help"),
            entry("q / Esc", "quit"),
        ];

        let block = Block::default()
            .borders(Borders::ALL)
            .title("─ Help ")
            .title_style(Style::default().add_modifier(Modifier::BOLD));
        let inner = block.inner(area);
        self.help_viewport_height = inner.height;
        let max_scroll = (lines.len() as u16).saturating_sub(inner.height);
        self.help_scroll = self.help_scroll.min(max_scroll);

        let paragraph =
            Paragraph::new(Text::from(lines)).block(block).scroll((self.help_scroll, 0));
        frame.render_widget(paragraph, area);
    }
}

#[derive(Debug, Clone, Copy)]
enum JumpTo {
    First,
    Last,
}

impl JumpTo {
    fn row(self, count: usize) -> usize {
        match self {
            Self::First => 0,
            Self::Last => count.saturating_sub(1),
        }
    }
}

/// Map a terminal key event onto the abstract input set.
pub fn map_key(key: KeyEvent) -> Option<InputKey> {
    match key.code {
        KeyCode::Up | KeyCode::Char('k') => Some(InputKey::Up),
        KeyCode::Down | KeyCode::Char('j') => Some(InputKey::Down),
        KeyCode::PageUp => Some(InputKey::PageUp),
        KeyCode::PageDown => Some(InputKey::PageDown),
        KeyCode::Left | KeyCode::Char('h') => Some(InputKey::Left),
        KeyCode::Right | KeyCode::Char('l') => Some(InputKey::Right),
        KeyCode::Home | KeyCode::Char('g') => Some(InputKey::Home),
        KeyCode::End | KeyCode::Char('G') => Some(InputKey::End),
        KeyCode::Enter => Some(InputKey::Enter),
        KeyCode::Tab => Some(InputKey::Tab),
        KeyCode::Char('y') => Some(InputKey::Yank),
        KeyCode::Char('o') => Some(InputKey::Pager),
        KeyCode::Char('?') => Some(InputKey::Help),
        KeyCode::Char('q') | KeyCode::Esc => Some(InputKey::Quit),
        _ => None,
    }
}

fn truncate_title(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let kept: String = value.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{kept}…")
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);
    horizontal[1]
}

fn launch_command(command: &str, arg: impl AsRef<Path>) -> Result<(), TuiError> {
    let parts =
        shlex::split(command).ok_or_else(|| TuiError::InvalidCommandLine(command.into()))?;
    let (program, args) =
        parts.split_first().ok_or_else(|| TuiError::InvalidCommandLine(command.into()))?;
    let arg = arg.as_ref();
    if arg.as_os_str().to_string_lossy().starts_with('-') {
        return Err(TuiError::InvalidCommandLine(
            "refusing to pass argument starting with '-'".to_string(),
        ));
    }
    let mut cmd = Command::new(program);
    cmd.args(args).arg(arg);
    let status = cmd.status()?;
    if !status.success() {
        return Err(TuiError::CommandFailed(command.to_string()));
    }
    Ok(())
}
