use std::{
    env, fs, io,
    path::Path,
    sync::Mutex,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use chrono::Utc;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Position, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, Clear, List, ListItem, ListState, Paragraph, Scrollbar,
        ScrollbarOrientation, ScrollbarState, Wrap,
    },
};
use tdoc::InlineStyle;
use tracing_subscriber::EnvFilter;

use ng911_docs::config::Config;
use ng911_docs::dom::{NodeId, decode_entities, escape_text};
use ng911_docs::editor::{
    ClickOutcome, DELETED_NOTICE, EditorKey, EditorSession, HEADER_LEVEL, InsertKind, KeyOutcome,
    NAVIGATION_BLOCKED_NOTICE, SAVED_NOTICE, inline_style_label,
};
use ng911_docs::error::EditorError;
use ng911_docs::identity::{Identity, TOKEN_KEY, User};
use ng911_docs::inline::first_link;
use ng911_docs::page::{Page, PageId, REVISION_PAGE};
use ng911_docs::render::{RenderOptions, RenderedBlock, render_page};
use ng911_docs::revision::{self, EMPTY_LINE_PLACEHOLDER, Reversal, RevisionEntry, RevisionLog};
use ng911_docs::router::{NavEntry, Resolution, Router};
use ng911_docs::search::{self, NO_RESULTS_NOTICE, SearchHit, SearchIndex};
use ng911_docs::storage::{self, FileStorage, Storage};

const STATUS_TIMEOUT: Duration = Duration::from_secs(4);
const EDITOR_REQUIRED_NOTICE: &str = "Editing requires an editor account.";
const REVERTED_NOTICE: &str = "Change reverted.";
const DISCARDED_NOTICE: &str = "All local edits discarded.";

fn main() -> Result<()> {
    run()
}

fn run() -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    init_logging(&config)?;

    let address = env::args().nth(1).unwrap_or_default();
    let mut app = App::new(config)?;
    app.open_address(&address);

    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().ok();

    let res = run_app(&mut terminal, &mut app).context("application error");

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    res
}

/// The terminal belongs to the UI, so events go to a file.
fn init_logging(config: &Config) -> Result<()> {
    if let Some(parent) = config.log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
        .with_context(|| format!("failed to open {}", config.log_file.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn load_search_index(path: &Path) -> SearchIndex {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "search index unavailable");
            return SearchIndex::default();
        }
    };
    SearchIndex::from_json(&json)
        .inspect_err(|err| tracing::warn!(path = %path.display(), error = %err, "search index is unreadable"))
        .unwrap_or_default()
}

/// Stores the configured sign-in unless the same token is already held.
fn sign_in_from_config(config: &Config, storage: &mut FileStorage) -> Result<()> {
    let identity = &config.identity;
    let (Some(username), Some(token)) = (&identity.username, &identity.token) else {
        return Ok(());
    };
    if storage.get(TOKEN_KEY).as_deref() == Some(token.as_str()) {
        return Ok(());
    }
    Identity::sign_in(
        storage,
        token,
        identity.expires_in,
        &User::new(username.clone()),
        &identity.groups,
        Utc::now(),
    )
    .context("failed to store sign-in")
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    while !app.should_quit() {
        terminal
            .draw(|frame| app.draw(frame))
            .context("failed to draw frame")?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if event::poll(timeout).context("event poll failed")? {
            let evt = event::read().context("failed to read event")?;
            app.handle_event(evt);
        }

        if last_tick.elapsed() >= tick_rate {
            app.on_tick();
            last_tick = Instant::now();
        }
    }

    app.shutdown();
    Ok(())
}

#[derive(Clone, Copy)]
enum ToolbarAction {
    Style(InlineStyle),
    Link,
    Undo,
    Redo,
    Add,
    AddHeader,
    Delete,
    Save,
}

#[derive(Clone, Copy)]
struct MenuShortcut {
    key: char,
    requires_shift: bool,
}

impl MenuShortcut {
    const fn new(key: char) -> Self {
        Self {
            key,
            requires_shift: false,
        }
    }

    const fn with_shift(key: char) -> Self {
        Self {
            key,
            requires_shift: true,
        }
    }

    fn matches(&self, code: KeyCode, modifiers: KeyModifiers) -> bool {
        match code {
            KeyCode::Char(ch) if ch == self.key => {
                if self.requires_shift {
                    modifiers == KeyModifiers::SHIFT
                } else {
                    modifiers.is_empty()
                }
            }
            _ => false,
        }
    }
}

#[derive(Clone, Copy)]
struct MenuItem {
    label: &'static str,
    action: ToolbarAction,
    shortcut: MenuShortcut,
    enabled: bool,
}

impl MenuItem {
    const fn new(label: &'static str, action: ToolbarAction, shortcut: MenuShortcut, enabled: bool) -> Self {
        Self {
            label,
            action,
            shortcut,
            enabled,
        }
    }
}

enum MenuEntry {
    Section(&'static str),
    Separator,
    Item(MenuItem),
}

/// The editing toolbar as a popup menu.
struct ToolbarMenu {
    entries: Vec<MenuEntry>,
    selected_index: usize,
}

impl ToolbarMenu {
    fn new(session: &EditorSession) -> Self {
        let entries = build_toolbar_entries(session);
        let selected_index = entries
            .iter()
            .enumerate()
            .find(|(_, entry)| matches!(entry, MenuEntry::Item(item) if item.enabled))
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        Self {
            entries,
            selected_index,
        }
    }

    fn move_selection(&mut self, delta: i32) {
        if self.entries.is_empty() {
            return;
        }

        let len = self.entries.len() as i32;
        let mut idx = self.selected_index as i32;

        for _ in 0..len {
            idx = (idx + delta).rem_euclid(len);
            if matches!(self.entries[idx as usize], MenuEntry::Item(_)) {
                self.selected_index = idx as usize;
                break;
            }
        }
    }

    fn current_action(&self) -> Option<ToolbarAction> {
        match self.entries.get(self.selected_index) {
            Some(MenuEntry::Item(item)) if item.enabled => Some(item.action),
            _ => None,
        }
    }

    fn shortcut_action(&mut self, code: KeyCode, modifiers: KeyModifiers) -> (bool, Option<ToolbarAction>) {
        for (idx, entry) in self.entries.iter().enumerate() {
            if let MenuEntry::Item(item) = entry {
                if item.shortcut.matches(code, modifiers) {
                    self.selected_index = idx;
                    return (true, item.enabled.then_some(item.action));
                }
            }
        }
        (false, None)
    }
}

fn build_toolbar_entries(session: &EditorSession) -> Vec<MenuEntry> {
    let toolbar = session.toolbar();
    let has_block = session.active().is_some();
    let style_item = |style: InlineStyle, shortcut: MenuShortcut| {
        MenuEntry::Item(MenuItem::new(
            inline_style_label(style).unwrap_or("Style"),
            ToolbarAction::Style(style),
            shortcut,
            has_block,
        ))
    };

    let mut entries = vec![
        MenuEntry::Section("Format"),
        style_item(InlineStyle::Bold, MenuShortcut::new('b')),
        style_item(InlineStyle::Italic, MenuShortcut::new('i')),
        style_item(InlineStyle::Underline, MenuShortcut::new('u')),
        style_item(InlineStyle::Strike, MenuShortcut::with_shift('X')),
        MenuEntry::Item(MenuItem::new("Link", ToolbarAction::Link, MenuShortcut::new('k'), has_block)),
        MenuEntry::Item(MenuItem::new("Undo", ToolbarAction::Undo, MenuShortcut::new('z'), true)),
        MenuEntry::Item(MenuItem::new("Redo", ToolbarAction::Redo, MenuShortcut::new('y'), true)),
        MenuEntry::Separator,
        MenuEntry::Section("Blocks"),
        MenuEntry::Item(MenuItem::new(
            toolbar.add_label(),
            ToolbarAction::Add,
            MenuShortcut::new('a'),
            has_block,
        )),
    ];
    if toolbar.shows_header_button() {
        entries.push(MenuEntry::Item(MenuItem::new(
            "Add Header",
            ToolbarAction::AddHeader,
            MenuShortcut::new('h'),
            has_block,
        )));
    }
    entries.push(MenuEntry::Item(MenuItem::new(
        toolbar.delete_label(),
        ToolbarAction::Delete,
        MenuShortcut::new('d'),
        has_block,
    )));
    entries.push(MenuEntry::Separator);
    entries.push(MenuEntry::Item(MenuItem::new(
        "Save Page",
        ToolbarAction::Save,
        MenuShortcut::new('s'),
        true,
    )));
    entries
}

/// Actions that ask before they act.
#[derive(Clone)]
enum ConfirmAction {
    DeleteBlock,
    Reverse(String),
    DiscardAll,
}

#[derive(Default)]
struct SearchState {
    query: String,
    hits: Vec<SearchHit>,
    selected: usize,
}

enum Modal {
    Confirm { message: String, action: ConfirmAction },
    LinkPrompt { message: String, input: String },
    Search(SearchState),
    Toolbar(ToolbarMenu),
    Navigation { entries: Vec<NavEntry>, selected: usize },
}

struct App {
    config: Config,
    storage: FileStorage,
    index: SearchIndex,
    user: Option<User>,
    session: EditorSession,
    /// Route of the page on screen, without any search term.
    route: String,
    title: String,
    /// The page can be edited by this user.
    edit_allowed: bool,
    selected: Option<NodeId>,
    /// Markup of the focused block while editing.
    buffer: Option<String>,
    /// Search mark to bring into view on the next draw.
    pending_reveal: Option<NodeId>,
    follow_selection: bool,
    history_selected: usize,
    blocks: Vec<RenderedBlock>,
    scroll_top: usize,
    last_view_height: usize,
    should_quit: bool,
    status_message: Option<(String, Instant)>,
    modal: Option<Modal>,
}

impl App {
    fn new(config: Config) -> Result<Self> {
        let mut storage = FileStorage::open(config.storage_path.clone())
            .with_context(|| format!("failed to open {}", config.storage_path.display()))?;
        sign_in_from_config(&config, &mut storage)?;
        let user = if Identity::is_authenticated(&mut storage, Utc::now())
            .context("failed to read sign-in")?
        {
            Identity::user(&storage)
        } else {
            None
        };
        let index = load_search_index(&config.search_index);
        tracing::info!(
            user = user.as_ref().map(|u| u.username.as_str()).unwrap_or("anonymous"),
            pages = index.pages().len(),
            "portal started"
        );

        Ok(Self {
            config,
            storage,
            index,
            user,
            session: EditorSession::new(Page::parse(PageId::new(""), "")),
            route: String::new(),
            title: String::new(),
            edit_allowed: false,
            selected: None,
            buffer: None,
            pending_reveal: None,
            follow_selection: false,
            history_selected: 0,
            blocks: Vec::new(),
            scroll_top: 0,
            last_view_height: 1,
            should_quit: false,
            status_message: None,
            modal: None,
        })
    }

    fn should_quit(&self) -> bool {
        self.should_quit
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some((message.into(), Instant::now()));
    }

    fn report(&mut self, err: EditorError) {
        tracing::debug!(error = %err, "action refused");
        self.set_status(err.to_string());
    }

    fn is_history_page(&self) -> bool {
        self.session.page().id().as_str() == REVISION_PAGE
    }

    /// Opens a route or page address, honouring a search term in its
    /// query string.
    fn open_address(&mut self, address: &str) {
        let (term, path) = search::take_search_query(address);
        let route = if path.ends_with(".html") {
            Router::route_for_page(PageId::from_location(&path).as_str()).map(str::to_string)
        } else {
            Some(path.trim_start_matches('#').trim_matches('/').to_string())
        };
        let resolution = match &route {
            Some(route) => Router::resolve(route, self.user.as_ref()),
            None => Resolution::NotFound,
        };
        self.show(resolution, route.unwrap_or_default(), term);
    }

    fn reload(&mut self) {
        let route = self.route.clone();
        self.open_address(&route);
    }

    fn show(&mut self, resolution: Resolution, route: String, term: Option<String>) {
        self.flush_pending_edit();
        let mut page = match &resolution {
            Resolution::Page(file) => match self.read_page(file) {
                Ok(page) => page,
                Err(err) => {
                    tracing::warn!(file = %file, error = %err, "page unavailable");
                    message_page(&Resolution::NotFound)
                }
            },
            other => message_page(other),
        };
        self.edit_allowed = matches!(resolution, Resolution::Page(_))
            && page.id().as_str() != REVISION_PAGE
            && self.user.as_ref().is_some_and(User::is_editor);
        let edit_mode = self.edit_allowed && storage::editor_mode_enabled(&self.storage);

        // Highlights would end up in a saved body, so edit mode goes without.
        self.pending_reveal = match term {
            Some(term) if !edit_mode => page.highlight_keyword(&term),
            _ => None,
        };

        self.title = page_title(&page);
        self.session = EditorSession::new(page);
        if edit_mode {
            let notice = self.session.enable_edit_mode();
            self.set_status(notice);
        }
        tracing::info!(route = %route, page = %self.session.page().id(), edit_mode, "page opened");

        self.route = route;
        self.selected = None;
        self.buffer = None;
        self.blocks.clear();
        self.follow_selection = self.pending_reveal.is_some();
        self.history_selected = 0;
        self.scroll_top = 0;
    }

    fn read_page(&self, file: &str) -> Result<Page> {
        let path = self.config.page_path(file);
        let html = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Page::load(PageId::new(file), &html, &self.storage))
    }

    fn draw(&mut self, frame: &mut Frame) {
        let area = frame.area();
        if area.height == 0 || area.width == 0 {
            return;
        }

        let status_height = if area.height > 2 { 2 } else { 1 };
        let vertical = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(1),
                Constraint::Length(status_height),
            ])
            .split(area);

        frame.render_widget(Paragraph::new(self.title_line()), vertical[0]);

        if self.is_history_page() {
            self.draw_history(frame, vertical[1]);
        } else {
            self.draw_page(frame, vertical[1]);
        }

        let status_widget = Paragraph::new(Line::from(Span::styled(self.status_line(), Style::default())))
            .block(Block::default().borders(Borders::TOP));
        frame.render_widget(status_widget, vertical[2]);

        match &self.modal {
            Some(Modal::Toolbar(menu)) => render_toolbar_menu(frame, area, menu),
            Some(Modal::Confirm { message, .. }) => render_confirm(frame, area, message),
            Some(Modal::LinkPrompt { message, input }) => render_prompt(frame, area, message, input),
            Some(Modal::Search(state)) => render_search(frame, area, state),
            Some(Modal::Navigation { entries, selected }) => {
                render_navigation(frame, area, entries, *selected)
            }
            None => {}
        }
    }

    fn draw_page(&mut self, frame: &mut Frame, area: Rect) {
        let horizontal = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(area);
        let text_area = horizontal[0];
        let scrollbar_area = horizontal[1];

        let editables: Vec<NodeId> = self.session.editables().collect();
        let edit_mode = self.session.is_edit_mode();
        let page = self.session.page();
        let render = render_page(
            page.dom(),
            page.main_root(),
            text_area.width.max(1) as usize,
            RenderOptions {
                editable: edit_mode.then_some(editables.as_slice()),
                focused: self.selected,
                reveal_codes: edit_mode,
                expand_details: false,
            },
        );

        if let Some(mark) = self.pending_reveal.take() {
            let dom = page.dom();
            let holder = render
                .blocks
                .iter()
                .find(|block| dom.is_descendant_of(mark, block.node))
                .map(|block| block.node);
            if holder.is_some() {
                self.selected = holder;
            }
        }

        let viewport_height = text_area.height as usize;
        self.last_view_height = viewport_height.max(1);
        if self.follow_selection {
            if let Some(lines) = self.selected.and_then(|node| render.lines_of(node)) {
                if lines.start < self.scroll_top {
                    self.scroll_top = lines.start;
                } else if lines.end > self.scroll_top + viewport_height {
                    self.scroll_top = lines.end.saturating_sub(viewport_height).min(lines.start);
                }
            }
            self.follow_selection = false;
        }
        let max_scroll = render.total_lines.saturating_sub(1);
        self.scroll_top = self.scroll_top.min(max_scroll);

        let paragraph = Paragraph::new(Text::from(render.lines.clone()))
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::NONE))
            .scroll((self.scroll_top as u16, 0));
        frame.render_widget(paragraph, text_area);

        let mut scrollbar_state = ScrollbarState::new(render.total_lines).position(self.scroll_top);
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight);
        frame.render_stateful_widget(scrollbar, scrollbar_area, &mut scrollbar_state);

        self.blocks = render.blocks;
    }

    fn draw_history(&mut self, frame: &mut Frame, area: Rect) {
        let log = RevisionLog::load(&self.storage);
        let entries = log.entries();
        self.history_selected = self.history_selected.min(entries.len().saturating_sub(1));

        if entries.is_empty() {
            let empty = Paragraph::new("No local edits recorded in this browser.")
                .block(Block::default().title("Version Edits").borders(Borders::ALL));
            frame.render_widget(empty, area);
            return;
        }

        let items: Vec<ListItem> = entries.iter().map(history_item).collect();
        let mut state = ListState::default();
        state.select(Some(self.history_selected));
        let list = List::new(items)
            .highlight_style(Style::default().bg(Color::White).fg(Color::Black))
            .block(
                Block::default()
                    .title(format!("Version Edits ({}) | r reverse | D discard all", entries.len()))
                    .borders(Borders::ALL),
            );
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn title_line(&self) -> Line<'static> {
        let mut spans = vec![Span::styled(
            format!(" {} ", self.title),
            Style::default().add_modifier(Modifier::BOLD),
        )];
        if let Some(user) = &self.user {
            spans.push(Span::styled(
                format!("| {} ", user.username),
                Style::default().fg(Color::DarkGray),
            ));
        }
        if self.session.is_edit_mode() {
            let toolbar = self.session.toolbar();
            let mut tools = vec![toolbar.add_label()];
            if toolbar.shows_header_button() {
                tools.push("Add Header");
            }
            tools.push(toolbar.delete_label());
            tools.push("Save Page");
            spans.push(Span::styled(
                " EDIT ",
                Style::default().bg(Color::Yellow).fg(Color::Black),
            ));
            spans.push(Span::raw(format!(" {} (Ctrl-P)", tools.join(" · "))));
        }
        Line::from(spans)
    }

    fn status_line(&mut self) -> String {
        self.prune_status_message();
        let location = self.session.page().id().to_string();
        if let Some((message, _)) = &self.status_message {
            return format!("{location} | {message}");
        }

        if self.is_history_page() {
            return format!("{location} | Up/Down select | r reverse | D discard all | n navigate | Ctrl-Q quit");
        }
        if self.session.is_edit_mode() {
            let block = self
                .selected
                .and_then(|node| self.session.kind_of(node))
                .map(|kind| kind.label())
                .unwrap_or("no block");
            return format!(
                "{location} | {block} | Ctrl-P toolbar | Ctrl-S save | Ctrl-E leave edit mode | Ctrl-Q quit"
            );
        }
        let edit_hint = if self.edit_allowed { " | Ctrl-E edit" } else { "" };
        format!("{location} | / search | n navigate | Enter open link{edit_hint} | Ctrl-Q quit")
    }

    fn prune_status_message(&mut self) {
        if let Some((_, instant)) = &self.status_message {
            if instant.elapsed() > STATUS_TIMEOUT {
                self.status_message = None;
            }
        }
    }

    fn on_tick(&mut self) {
        self.prune_status_message();
    }

    /// Logs a pending text edit before the terminal closes.
    fn shutdown(&mut self) {
        self.flush_pending_edit();
    }

    /// Logs a text change still pending in the focused block before the
    /// session goes away.
    fn flush_pending_edit(&mut self) {
        if self.session.is_edit_mode() {
            if let Err(err) = self.session.blur(&mut self.storage) {
                tracing::warn!(error = %err, "failed to record last edit");
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind,
            ..
        }) = event
        else {
            return;
        };
        if kind != KeyEventKind::Press {
            return;
        }
        if self.modal.is_some() {
            self.handle_modal_key(code, modifiers);
            return;
        }

        let ctrl = modifiers.contains(KeyModifiers::CONTROL);
        let edit_mode = self.session.is_edit_mode();
        match (code, modifiers) {
            (KeyCode::Char('q') | KeyCode::Char('c'), _) if ctrl => self.should_quit = true,
            (KeyCode::Char('e'), _) if ctrl => self.toggle_edit_mode(),
            (KeyCode::Char('f'), _) if ctrl => self.modal = Some(Modal::Search(SearchState::default())),
            (KeyCode::Char('o'), _) if ctrl => self.follow_link(),
            (KeyCode::Char('p'), _) if ctrl && edit_mode => {
                self.modal = Some(Modal::Toolbar(ToolbarMenu::new(&self.session)));
            }
            (KeyCode::Esc, _) if edit_mode => {
                self.modal = Some(Modal::Toolbar(ToolbarMenu::new(&self.session)));
            }
            (KeyCode::Char('s'), _) if ctrl => self.run_toolbar_action(ToolbarAction::Save),
            (KeyCode::Char('z'), _) if ctrl => self.run_toolbar_action(ToolbarAction::Undo),
            (KeyCode::Char('y'), _) if ctrl => self.run_toolbar_action(ToolbarAction::Redo),
            (KeyCode::Char('b'), _) if ctrl => {
                self.run_toolbar_action(ToolbarAction::Style(InlineStyle::Bold))
            }
            (KeyCode::Char('k'), _) if ctrl => self.run_toolbar_action(ToolbarAction::Link),
            (KeyCode::Up, m) if m.contains(KeyModifiers::CONTROL) => {
                self.scroll_top = self.scroll_top.saturating_sub(self.last_view_height);
            }
            (KeyCode::Down, m) if m.contains(KeyModifiers::CONTROL) => {
                self.scroll_top += self.last_view_height;
            }
            (KeyCode::Up, _) => self.move_selection(-1),
            (KeyCode::Down, _) => self.move_selection(1),
            (KeyCode::Tab, _) => self.move_selection(1),
            (KeyCode::BackTab, _) => self.move_selection(-1),
            (KeyCode::PageUp, _) => {
                self.scroll_top = self.scroll_top.saturating_sub(self.last_view_height.max(1));
            }
            (KeyCode::PageDown, _) => {
                self.scroll_top += self.last_view_height.max(1);
            }
            (KeyCode::Enter, m) if edit_mode => self.press_enter(m.contains(KeyModifiers::SHIFT)),
            (KeyCode::Enter, _) => self.follow_link(),
            (KeyCode::Backspace, _) if edit_mode => self.edit_buffer(|buffer| pop_markup(buffer)),
            (KeyCode::Char(ch), m)
                if edit_mode && !m.contains(KeyModifiers::CONTROL) && !m.contains(KeyModifiers::ALT) =>
            {
                self.edit_buffer(|buffer| {
                    if buffer == EMPTY_LINE_PLACEHOLDER {
                        buffer.clear();
                    }
                    buffer.push(ch);
                });
            }
            (KeyCode::Char('q'), _) => self.should_quit = true,
            (KeyCode::Char('/'), _) => self.modal = Some(Modal::Search(SearchState::default())),
            (KeyCode::Char('n'), _) => {
                self.modal = Some(Modal::Navigation {
                    entries: Router::navigation(self.user.as_ref()),
                    selected: 0,
                });
            }
            (KeyCode::Char('g'), _) => self.open_address(""),
            (KeyCode::Char('r'), _) if self.is_history_page() => {
                let timestamp = RevisionLog::load(&self.storage)
                    .entries()
                    .get(self.history_selected)
                    .map(|entry| entry.timestamp.clone());
                if let Some(timestamp) = timestamp {
                    self.run_confirmable(ConfirmAction::Reverse(timestamp), false);
                }
            }
            (KeyCode::Char('D'), _) if self.is_history_page() => {
                self.run_confirmable(ConfirmAction::DiscardAll, false)
            }
            _ => {}
        }
    }

    fn handle_modal_key(&mut self, code: KeyCode, modifiers: KeyModifiers) {
        let Some(modal) = self.modal.take() else {
            return;
        };
        match modal {
            Modal::Confirm { message, action } => match code {
                KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                    self.run_confirmable(action, true)
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {}
                _ => self.modal = Some(Modal::Confirm { message, action }),
            },
            Modal::LinkPrompt { message, mut input } => match code {
                KeyCode::Esc => {}
                KeyCode::Enter => self.insert_link(Some(input)),
                KeyCode::Backspace => {
                    input.pop();
                    self.modal = Some(Modal::LinkPrompt { message, input });
                }
                KeyCode::Char(ch) => {
                    input.push(ch);
                    self.modal = Some(Modal::LinkPrompt { message, input });
                }
                _ => self.modal = Some(Modal::LinkPrompt { message, input }),
            },
            Modal::Search(mut state) => match code {
                KeyCode::Esc => {}
                KeyCode::Enter => {
                    if let Some(hit) = state.hits.get(state.selected) {
                        let href = hit.href.clone();
                        self.open_address(&href);
                    } else {
                        self.modal = Some(Modal::Search(state));
                    }
                }
                KeyCode::Up => {
                    state.selected = state.selected.saturating_sub(1);
                    self.modal = Some(Modal::Search(state));
                }
                KeyCode::Down => {
                    if state.selected + 1 < state.hits.len() {
                        state.selected += 1;
                    }
                    self.modal = Some(Modal::Search(state));
                }
                KeyCode::Backspace => {
                    state.query.pop();
                    self.refresh_search(&mut state);
                    self.modal = Some(Modal::Search(state));
                }
                KeyCode::Char(ch) if !modifiers.contains(KeyModifiers::CONTROL) => {
                    state.query.push(ch);
                    self.refresh_search(&mut state);
                    self.modal = Some(Modal::Search(state));
                }
                _ => self.modal = Some(Modal::Search(state)),
            },
            Modal::Toolbar(mut menu) => match code {
                KeyCode::Esc => {}
                KeyCode::Char('p') if modifiers.contains(KeyModifiers::CONTROL) => {}
                KeyCode::Up => {
                    menu.move_selection(-1);
                    self.modal = Some(Modal::Toolbar(menu));
                }
                KeyCode::Down => {
                    menu.move_selection(1);
                    self.modal = Some(Modal::Toolbar(menu));
                }
                KeyCode::Enter => match menu.current_action() {
                    Some(action) => self.run_toolbar_action(action),
                    None => self.modal = Some(Modal::Toolbar(menu)),
                },
                KeyCode::Char(_) => {
                    let (handled, action) = menu.shortcut_action(code, modifiers);
                    match (handled, action) {
                        (true, Some(action)) => self.run_toolbar_action(action),
                        _ => self.modal = Some(Modal::Toolbar(menu)),
                    }
                }
                _ => self.modal = Some(Modal::Toolbar(menu)),
            },
            Modal::Navigation { entries, mut selected } => match code {
                KeyCode::Esc => {}
                KeyCode::Enter => {
                    if let Some(entry) = entries.get(selected) {
                        self.open_address(entry.route);
                    }
                }
                KeyCode::Up => {
                    selected = selected.saturating_sub(1);
                    self.modal = Some(Modal::Navigation { entries, selected });
                }
                KeyCode::Down => {
                    selected = (selected + 1).min(entries.len().saturating_sub(1));
                    self.modal = Some(Modal::Navigation { entries, selected });
                }
                _ => self.modal = Some(Modal::Navigation { entries, selected }),
            },
        }
    }

    fn refresh_search(&self, state: &mut SearchState) {
        state.hits = search::search(&self.index, &self.storage, &state.query);
        state.selected = 0;
    }

    fn toggle_edit_mode(&mut self) {
        if !self.edit_allowed {
            self.set_status(EDITOR_REQUIRED_NOTICE);
            return;
        }
        let enabled = !storage::editor_mode_enabled(&self.storage);
        if let Err(err) = storage::set_editor_mode(&mut self.storage, enabled) {
            self.report(err.into());
            return;
        }
        self.reload();
        if !enabled {
            self.set_status("Edit mode off.");
        }
    }

    /// Moves the selection between the blocks laid out on the last draw.
    fn move_selection(&mut self, delta: i32) {
        if self.is_history_page() {
            self.history_selected = if delta < 0 {
                self.history_selected.saturating_sub(1)
            } else {
                self.history_selected + 1
            };
            return;
        }
        if self.blocks.is_empty() {
            return;
        }
        let current = self
            .selected
            .and_then(|node| self.blocks.iter().position(|block| block.node == node));
        let last = self.blocks.len() - 1;
        let next = match (current, delta < 0) {
            (None, false) => 0,
            (None, true) => last,
            (Some(idx), true) => idx.saturating_sub(1),
            (Some(idx), false) => (idx + 1).min(last),
        };
        let node = self.blocks[next].node;

        if self.session.is_edit_mode() {
            if let Err(err) = self.session.focus(node, &mut self.storage) {
                self.report(err);
                return;
            }
            self.sync_focus();
        } else {
            self.selected = Some(node);
        }
        self.follow_selection = true;
    }

    /// Takes selection and buffer from the editor's active block.
    fn sync_focus(&mut self) {
        self.selected = self.session.active();
        self.buffer = self
            .selected
            .map(|node| self.session.page().dom().inner_html(node));
        self.follow_selection = true;
    }

    fn edit_buffer(&mut self, edit: impl FnOnce(&mut String)) {
        let Some(buffer) = self.buffer.as_mut() else {
            self.report(EditorError::NothingToFormat);
            return;
        };
        edit(buffer);
        let markup = buffer.clone();
        if let Err(err) = self.session.set_active_content(&markup) {
            self.report(err);
        }
    }

    fn press_enter(&mut self, shift: bool) {
        match self.session.key_down(EditorKey::Enter { shift }, &mut self.storage) {
            Ok(KeyOutcome::Handled) => self.sync_focus(),
            Ok(KeyOutcome::Default) => self.edit_buffer(|buffer| buffer.push_str("<br>")),
            Err(err) => self.report(err),
        }
    }

    fn follow_link(&mut self) {
        let Some(node) = self.selected else {
            return;
        };
        let Some((anchor, href)) = first_link(self.session.page().dom(), node) else {
            self.set_status("No link in this block.");
            return;
        };
        if self.session.intercept_click(anchor) == ClickOutcome::Blocked {
            self.set_status(NAVIGATION_BLOCKED_NOTICE);
            return;
        }
        if href.starts_with("http://") || href.starts_with("https://") || href.starts_with("mailto:") {
            self.set_status(format!("External link: {href}"));
            return;
        }
        self.open_address(&href);
    }

    fn run_toolbar_action(&mut self, action: ToolbarAction) {
        if !self.session.is_edit_mode() {
            if matches!(action, ToolbarAction::Save) {
                self.set_status(EDITOR_REQUIRED_NOTICE);
            }
            return;
        }
        let result = match action {
            ToolbarAction::Style(style) => self.session.apply_style(style).map(|_| None),
            ToolbarAction::Link => {
                self.insert_link(None);
                return;
            }
            ToolbarAction::Undo => self.session.undo().map(|_| None),
            ToolbarAction::Redo => self.session.redo().map(|_| None),
            ToolbarAction::Add => {
                let kind = self.session.toolbar().add_target();
                self.session.insert(kind, false, &mut self.storage).map(|_| None)
            }
            ToolbarAction::AddHeader => self
                .session
                .insert(InsertKind::Heading(HEADER_LEVEL), false, &mut self.storage)
                .map(|_| None),
            ToolbarAction::Delete => {
                self.run_confirmable(ConfirmAction::DeleteBlock, false);
                return;
            }
            ToolbarAction::Save => self.session.save(&mut self.storage).map(|_| Some(SAVED_NOTICE)),
        };
        match result {
            Ok(notice) => {
                self.sync_focus();
                if let Some(notice) = notice {
                    self.set_status(notice);
                }
            }
            Err(err) => self.report(err),
        }
    }

    /// Runs an action whose confirmation comes from a modal. Unapproved,
    /// the action stops at its prompt and the prompt is shown.
    fn run_confirmable(&mut self, action: ConfirmAction, approved: bool) {
        let mut prompt: Option<String> = None;
        let mut confirm = |message: &str| {
            if !approved {
                prompt = Some(message.to_string());
            }
            approved
        };
        let result = match &action {
            ConfirmAction::DeleteBlock => self.session.delete_active(&mut self.storage, &mut confirm),
            ConfirmAction::Reverse(timestamp) => {
                revision::reverse_edit(&mut self.storage, timestamp, &mut confirm)
                    .map(|reversal| reversal == Reversal::Reverted)
            }
            ConfirmAction::DiscardAll => revision::discard_all(&mut self.storage, &mut confirm),
        };

        match result {
            Err(err) => self.report(err),
            Ok(false) => {
                if let Some(message) = prompt {
                    self.modal = Some(Modal::Confirm { message, action });
                }
            }
            Ok(true) => match action {
                ConfirmAction::DeleteBlock => {
                    self.sync_focus();
                    self.set_status(DELETED_NOTICE);
                }
                ConfirmAction::Reverse(_) => {
                    self.reload();
                    self.set_status(REVERTED_NOTICE);
                }
                ConfirmAction::DiscardAll => {
                    self.reload();
                    self.set_status(DISCARDED_NOTICE);
                }
            },
        }
    }

    /// Without a URL, asks for one through the link prompt.
    fn insert_link(&mut self, url: Option<String>) {
        let answered = url.is_some();
        let mut asked: Option<(String, String)> = None;
        let result = self.session.insert_link(|message, default| {
            if !answered {
                asked = Some((message.to_string(), default.to_string()));
            }
            url
        });
        match result {
            Err(err) => self.report(err),
            Ok(true) => {
                self.sync_focus();
                self.set_status("Link added.");
            }
            Ok(false) => {
                if let Some((message, input)) = asked {
                    self.modal = Some(Modal::LinkPrompt { message, input });
                }
            }
        }
    }
}

/// Stand-in page for routes that cannot be shown.
fn message_page(resolution: &Resolution) -> Page {
    let title = match resolution {
        Resolution::AccessDenied { .. } => "Access Denied",
        _ => "Page Not Found",
    };
    let message = resolution.message().unwrap_or_default();
    let html = format!(
        "<div class=\"main\"><div class=\"content-wrap\"><h1>{}</h1><p>{}</p></div></div>",
        escape_text(title),
        escape_text(&message)
    );
    Page::parse(PageId::new("404.html"), &html)
}

fn page_title(page: &Page) -> String {
    let dom = page.dom();
    dom.find_first(page.content_root(), |dom, node| dom.is_tag(node, "h1"))
        .map(|heading| dom.text_content(heading).trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| page.id().to_string())
}

/// Removes the last character, or the whole tag or entity it ends.
fn pop_markup(buffer: &mut String) {
    let unit_start = if buffer.ends_with('>') {
        buffer.rfind('<')
    } else if buffer.ends_with(';') {
        buffer.rfind('&').filter(|start| {
            let entity = &buffer[*start..];
            !entity.contains(char::is_whitespace) && entity.len() <= 10
        })
    } else {
        None
    };
    match unit_start {
        Some(start) => buffer.truncate(start),
        None => {
            buffer.pop();
        }
    }
}

fn history_item(entry: &RevisionEntry) -> ListItem<'static> {
    let kind_style = if entry.kind.is_structural() {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Green)
    };
    ListItem::new(Line::from(vec![
        Span::raw(format!("{}  ", entry.timestamp)),
        Span::styled(format!("{:<6}", entry.kind.label()), kind_style),
        Span::raw(format!(" {}  ", entry.page)),
        Span::styled(
            truncate(&entry.old_text, 40),
            Style::default().add_modifier(Modifier::CROSSED_OUT),
        ),
        Span::raw(" → "),
        Span::raw(truncate(&entry.new_text, 40)),
    ]))
}

fn truncate(text: &str, max: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let mut out: String = flat.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn popup_area(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width.saturating_sub(width)) / 2,
        area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    )
}

fn popup_block(title: &str) -> Block<'static> {
    Block::default()
        .title(title.to_string())
        .borders(Borders::ALL)
        .style(Style::default().bg(Color::Black).fg(Color::White))
        .border_style(Style::default().fg(Color::Gray))
}

fn render_confirm(frame: &mut Frame, area: Rect, message: &str) {
    let popup = popup_area(area, 60, 7);
    frame.render_widget(Clear, popup);
    let text = Text::from(vec![
        Line::from(message.to_string()),
        Line::from(""),
        Line::from(Span::styled(
            "[y] Yes   [n] No",
            Style::default().add_modifier(Modifier::BOLD),
        )),
    ]);
    let widget = Paragraph::new(text)
        .wrap(Wrap { trim: true })
        .block(popup_block("Confirm"));
    frame.render_widget(widget, popup);
}

fn render_prompt(frame: &mut Frame, area: Rect, message: &str, input: &str) {
    let popup = popup_area(area, 60, 5);
    frame.render_widget(Clear, popup);
    let widget = Paragraph::new(Text::from(vec![
        Line::from(message.to_string()),
        Line::from(Span::styled(input.to_string(), Style::default().fg(Color::Yellow))),
    ]))
    .block(popup_block("Link"));
    frame.render_widget(widget, popup);

    let cursor_x = popup.x + 1 + (input.chars().count() as u16).min(popup.width.saturating_sub(3));
    frame.set_cursor_position(Position::new(cursor_x, popup.y + 2));
}

fn snippet_line(snippet: &str) -> Line<'static> {
    let mut spans = Vec::new();
    for (idx, part) in snippet.split("<mark>").enumerate() {
        let (marked, rest) = match (idx, part.split_once("</mark>")) {
            (0, _) | (_, None) => ("", part),
            (_, Some((marked, rest))) => (marked, rest),
        };
        if !marked.is_empty() {
            spans.push(Span::styled(
                decode_entities(marked),
                Style::default().add_modifier(Modifier::REVERSED),
            ));
        }
        if !rest.is_empty() {
            spans.push(Span::raw(decode_entities(rest)));
        }
    }
    Line::from(spans)
}

fn render_search(frame: &mut Frame, area: Rect, state: &SearchState) {
    let popup = popup_area(area, area.width.saturating_sub(8).max(20), 18);
    frame.render_widget(Clear, popup);
    let block = popup_block("Search documentation");
    let inner = block.inner(popup);
    frame.render_widget(block, popup);
    if inner.height < 2 {
        return;
    }

    let input_area = Rect::new(inner.x, inner.y, inner.width, 1);
    let results_area = Rect::new(inner.x, inner.y + 1, inner.width, inner.height - 1);
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("> ", Style::default().fg(Color::Gray)),
            Span::raw(state.query.clone()),
        ])),
        input_area,
    );
    let cursor_x = input_area.x + 2 + (state.query.chars().count() as u16).min(inner.width.saturating_sub(3));
    frame.set_cursor_position(Position::new(cursor_x, input_area.y));

    if state.hits.is_empty() {
        if search::normalize_query(&state.query).chars().count() >= search::MIN_QUERY_CHARS {
            frame.render_widget(
                Paragraph::new(NO_RESULTS_NOTICE).style(Style::default().fg(Color::DarkGray)),
                results_area,
            );
        }
        return;
    }

    let items: Vec<ListItem> = state
        .hits
        .iter()
        .map(|hit| {
            ListItem::new(Text::from(vec![
                Line::from(Span::styled(
                    hit.title.clone(),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                snippet_line(&hit.snippet),
            ]))
        })
        .collect();
    let mut list_state = ListState::default();
    list_state.select(Some(state.selected));
    let list = List::new(items).highlight_style(Style::default().bg(Color::DarkGray));
    frame.render_stateful_widget(list, results_area, &mut list_state);
}

fn render_navigation(frame: &mut Frame, area: Rect, entries: &[NavEntry], selected: usize) {
    let width = entries
        .iter()
        .map(|entry| entry.label.chars().count() as u16)
        .max()
        .unwrap_or(10)
        + 6;
    let popup = popup_area(area, width, entries.len() as u16 + 2);
    frame.render_widget(Clear, popup);
    let items: Vec<ListItem> = entries
        .iter()
        .map(|entry| ListItem::new(entry.label))
        .collect();
    let mut state = ListState::default();
    state.select(Some(selected));
    let list = List::new(items)
        .highlight_style(Style::default().bg(Color::White).fg(Color::Black))
        .block(popup_block("Navigate"));
    frame.render_stateful_widget(list, popup, &mut state);
}

fn render_toolbar_menu(frame: &mut Frame, area: Rect, menu: &ToolbarMenu) {
    if area.width < 3 || area.height < 3 {
        return;
    }

    let mut max_label_width = 0usize;
    let mut max_section_width = 0usize;
    for entry in &menu.entries {
        match entry {
            MenuEntry::Item(item) => {
                max_label_width = max_label_width.max(item.label.chars().count());
            }
            MenuEntry::Section(title) => {
                max_section_width = max_section_width.max(title.chars().count());
            }
            MenuEntry::Separator => {}
        }
    }
    // Label, two spaces, and a shortcut column of at most "⇧X".
    let shortcut_width = 2;
    let item_width = max_label_width + 2 + shortcut_width;
    let content_width = item_width.max(max_section_width) as u16;
    let popup = popup_area(area, content_width + 4, menu.entries.len() as u16 + 2);

    frame.render_widget(Clear, popup);

    let separator_width = popup.width.saturating_sub(4).max(4) as usize;
    let popup_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut items = Vec::new();
    for entry in &menu.entries {
        match entry {
            MenuEntry::Section(title) => {
                items.push(ListItem::new(Line::from(Span::styled(
                    *title,
                    popup_style.add_modifier(Modifier::BOLD),
                ))));
            }
            MenuEntry::Separator => {
                items.push(ListItem::new(Line::from(Span::styled(
                    "─".repeat(separator_width),
                    Style::default().fg(Color::DarkGray),
                ))));
            }
            MenuEntry::Item(item) => {
                let key = if item.shortcut.requires_shift {
                    format!("⇧{}", item.shortcut.key)
                } else {
                    item.shortcut.key.to_string()
                };
                let content = format!(
                    "{label:<label_width$}  {key:>shortcut_width$}",
                    label = item.label,
                    label_width = max_label_width,
                );
                let style = if item.enabled {
                    Style::default()
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                items.push(ListItem::new(Line::from(Span::styled(content, style))));
            }
        }
    }

    let mut state = ListState::default();
    state.select(Some(menu.selected_index));

    let list = List::new(items)
        .highlight_style(Style::default().bg(Color::White).fg(Color::Black))
        .style(popup_style)
        .block(popup_block("Toolbar"));

    frame.render_stateful_widget(list, popup, &mut state);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backspace_removes_whole_tags_and_entities() {
        let mut buffer = "Line<br>".to_string();
        pop_markup(&mut buffer);
        assert_eq!(buffer, "Line");

        let mut buffer = "A &amp;".to_string();
        pop_markup(&mut buffer);
        assert_eq!(buffer, "A ");

        let mut buffer = "done;".to_string();
        pop_markup(&mut buffer);
        assert_eq!(buffer, "done");
    }

    #[test]
    fn snippet_marks_become_reversed_spans() {
        let line = snippet_line("...the <mark>Road</mark> &amp; <mark>road</mark>s");
        let texts: Vec<&str> = line.spans.iter().map(|span| span.content.as_ref()).collect();
        assert_eq!(texts, ["...the ", "Road", " & ", "road", "s"]);
        assert!(line.spans[1].style.add_modifier.contains(Modifier::REVERSED));
    }

    fn editor_app(dir: &Path) -> App {
        fs::write(
            dir.join("schema-guide.html"),
            "<div class=\"main\"><div class=\"content-wrap\"><p>Road centerlines</p></div></div>",
        )
        .unwrap();
        let mut config = Config {
            docs_dir: dir.to_path_buf(),
            storage_path: dir.join("storage.json"),
            search_index: dir.join("search-index.json"),
            log_file: dir.join("editor.log"),
            ..Config::default()
        };
        config.identity.username = Some("golden_editing".into());
        config.identity.token = Some("token".into());

        let mut app = App::new(config).unwrap();
        storage::set_editor_mode(&mut app.storage, true).unwrap();
        app.open_address("schema-guide");
        assert!(app.session.is_edit_mode());
        app
    }

    fn type_into_first_block(app: &mut App) {
        let paragraph = app.session.editables().next().unwrap();
        app.session.focus(paragraph, &mut app.storage).unwrap();
        app.session.set_active_content("Road centreline features").unwrap();
        assert!(RevisionLog::load(&app.storage).is_empty());
    }

    #[test]
    fn navigating_away_logs_the_pending_text_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = editor_app(dir.path());
        type_into_first_block(&mut app);

        app.open_address("schema-guide");
        let log = RevisionLog::load(&app.storage);
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].new_text, "Road centreline features");
    }

    #[test]
    fn leaving_edit_mode_logs_the_pending_text_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = editor_app(dir.path());
        type_into_first_block(&mut app);

        app.toggle_edit_mode();
        assert!(!app.session.is_edit_mode());
        assert_eq!(RevisionLog::load(&app.storage).len(), 1);
    }

    #[test]
    fn message_pages_explain_the_refusal() {
        let page = message_page(&Resolution::AccessDenied {
            username: "golden_editing".into(),
            municipality: ng911_docs::identity::Municipality::Revelstoke,
        });
        assert_eq!(page_title(&page), "Access Denied");
        assert!(page.content_html().contains("Revelstoke User Guide"));
    }
}
