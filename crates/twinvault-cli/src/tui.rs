//! Terminal dashboard for digital twins: stats, list, creation form, and the
//! signature-gated detail view.

use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::{Alignment, Constraint, Direction, Frame, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Terminal,
};
use std::{
    collections::BTreeMap,
    io::{self, Stdout},
    time::{Duration, Instant},
};
use twinvault_chain::{CastKvClient, CastSigner};
use twinvault_core::{
    dashboard::{AppState, CreateForm, NoticeKind},
    error::{TwinvaultError, TwinvaultResult},
    AuthProof, InterestProfile, Signer, TwinRecord, TwinRepository, TwinStatus,
};

type Backend = ratatui::backend::CrosstermBackend<Stdout>;

const SLIDER_WIDTH: usize = 20;

/// Start the dashboard. Without a signer the list is read-only.
pub fn launch(repo: TwinRepository<CastKvClient>, signer: Option<CastSigner>) -> Result<()> {
    let wallet = match signer.as_ref().map(Signer::address) {
        Some(Ok(address)) => Some(address),
        Some(Err(err)) => {
            log::warn!("wallet address unavailable: {err}");
            None
        }
        None => None,
    };
    let mut app = App::new(repo, signer, wallet);
    app.run()
}

/// Blocking contract call queued by a key press, run after the pending
/// notice has been drawn.
enum Action {
    Create(InterestProfile),
    Decrypt(String),
    Toggle(String, TwinStatus),
}

struct App {
    repo: TwinRepository<CastKvClient>,
    signer: Option<CastSigner>,
    state: AppState,
    pending: Option<Action>,
}

impl App {
    fn new(
        repo: TwinRepository<CastKvClient>,
        signer: Option<CastSigner>,
        wallet: Option<String>,
    ) -> Self {
        let mut state = AppState::new(wallet);
        state.finish_refresh(repo.list());
        Self {
            repo,
            signer,
            state,
            pending: None,
        }
    }

    /// Enter the alternate screen, start the event loop, and clean up on exit.
    fn run(&mut self) -> Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = ratatui::backend::CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let res = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.show_cursor()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;

        res
    }

    fn event_loop(&mut self, terminal: &mut Terminal<Backend>) -> Result<()> {
        loop {
            terminal.draw(|f| self.render(f))?;

            if let Some(action) = self.pending.take() {
                self.perform(action);
                continue;
            }

            if event::poll(Duration::from_millis(200))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && !self.handle_key(key.code) {
                        return Ok(());
                    }
                }
            }

            self.state.tick(Instant::now());
        }
    }

    /// Dispatch a key to the active view. Returns false to quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        let now = Instant::now();

        if let Some(form) = self.state.create_form.as_mut() {
            match code {
                KeyCode::Esc => self.state.close_create(),
                KeyCode::Tab | KeyCode::Down | KeyCode::Char('j') => form.focus_next(),
                KeyCode::BackTab | KeyCode::Up | KeyCode::Char('k') => form.focus_prev(),
                KeyCode::Right | KeyCode::Char('l') => form.step_up(),
                KeyCode::Left | KeyCode::Char('h') => form.step_down(),
                KeyCode::Enter => {
                    if let Some(profile) = self.state.begin_create() {
                        self.pending = Some(Action::Create(profile));
                    }
                }
                _ => {}
            }
            return true;
        }

        if self.state.editing_search {
            match code {
                KeyCode::Enter | KeyCode::Esc => self.state.editing_search = false,
                KeyCode::Backspace => self.state.pop_search_char(),
                KeyCode::Char(c) => self.state.push_search_char(c),
                _ => {}
            }
            return true;
        }

        if self.state.detail.is_some() {
            match code {
                KeyCode::Esc | KeyCode::Char('q') => self.state.close_detail(),
                KeyCode::Char('d') => {
                    let encoded = self
                        .state
                        .detail_twin()
                        .map(|twin| twin.encoded_interests.clone());
                    if let Some(encoded) = encoded {
                        if self.state.begin_decrypt(now) {
                            self.pending = Some(Action::Decrypt(encoded));
                        }
                    }
                }
                KeyCode::Char('t') => self.queue_toggle(now),
                _ => {}
            }
            return true;
        }

        match code {
            KeyCode::Char('q') => return false,
            KeyCode::Esc if !self.state.search.is_empty() => self.state.set_search(""),
            KeyCode::Esc => return false,
            KeyCode::Char('/') => self.state.editing_search = true,
            KeyCode::Up | KeyCode::Char('k') => self.state.select_prev(),
            KeyCode::Down | KeyCode::Char('j') => self.state.select_next(),
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char('n') => {
                self.state.open_create(now);
            }
            KeyCode::Enter => self.state.open_detail(),
            KeyCode::Char('t') => self.queue_toggle(now),
            _ => {}
        }
        true
    }

    fn queue_toggle(&mut self, now: Instant) {
        if let Some((id, status)) = self.state.begin_toggle(now) {
            self.pending = Some(Action::Toggle(id, status));
        }
    }

    fn refresh(&mut self) {
        self.state.begin_refresh();
        self.state.finish_refresh(self.repo.list());
    }

    fn perform(&mut self, action: Action) {
        match action {
            Action::Create(profile) => {
                let result = self.create(&profile);
                let created = result.is_ok();
                self.state.create_finished(result, Instant::now());
                if created {
                    self.refresh();
                }
            }
            Action::Decrypt(encoded) => {
                let result = self.decrypt(&encoded);
                self.state.decrypt_finished(result, Instant::now());
            }
            Action::Toggle(id, status) => {
                let result = self.wallet().and_then(|caller| {
                    self.repo.set_status(&id, &caller, status)
                });
                self.state.toggle_finished(result, Instant::now());
            }
        }
    }

    fn wallet(&self) -> TwinvaultResult<String> {
        self.state
            .wallet
            .clone()
            .ok_or_else(|| TwinvaultError::Signature("no wallet connected".to_string()))
    }

    fn create(&self, profile: &InterestProfile) -> TwinvaultResult<TwinRecord> {
        let owner = self.wallet()?;
        self.repo.create(&owner, profile)
    }

    fn decrypt(&self, encoded: &str) -> TwinvaultResult<BTreeMap<String, f64>> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| TwinvaultError::Signature("no wallet connected".to_string()))?;
        let challenge = self.repo.challenge()?;
        let proof = AuthProof::sign(signer, &challenge)?;
        self.repo.decrypt_interests(encoded, &proof, &challenge)
    }

    /// Header, stats, twin list, and notice footer, with modals on top.
    fn render(&self, f: &mut Frame<'_>) {
        let size = f.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(5),
                Constraint::Length(3),
            ])
            .split(size);

        let header = Paragraph::new(vec![Line::from(vec![
            Span::styled(
                "Twinvault :: Digital Twins",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("  q:quit  ↑/↓:select  /:search  enter:details  n:new  t:toggle  r:refresh"),
        ])])
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::ALL));
        f.render_widget(header, chunks[0]);

        let stats = self.state.stats();
        let stats_line = Line::from(vec![
            Span::raw("Total "),
            Span::styled(stats.total.to_string(), Style::default().fg(Color::White)),
            Span::raw("   Active "),
            Span::styled(stats.active.to_string(), Style::default().fg(Color::Green)),
            Span::raw("   Inactive "),
            Span::styled(stats.inactive.to_string(), Style::default().fg(Color::Red)),
            Span::raw("   Earnings "),
            Span::styled(
                format!("{:.4} ETH", stats.total_earnings),
                Style::default().fg(Color::Yellow),
            ),
        ]);
        f.render_widget(
            Paragraph::new(stats_line).block(Block::default().borders(Borders::ALL).title("Stats")),
            chunks[1],
        );

        self.render_list(f, chunks[2]);
        self.render_footer(f, chunks[3]);

        if let Some(form) = self.state.create_form.as_ref() {
            self.render_create(f, form, size);
        } else if self.state.detail.is_some() {
            self.render_detail(f, size);
        }
    }

    fn render_list(&self, f: &mut Frame<'_>, area: Rect) {
        let visible = self.state.filtered_twins();
        let items: Vec<ListItem> = if self.state.loading {
            vec![ListItem::new("Loading digital twins...")]
        } else if self.state.twins.is_empty() {
            vec![ListItem::new("No digital twins yet. Press n to create one.")]
        } else if visible.is_empty() {
            vec![ListItem::new("No twins match the search.")]
        } else {
            visible
                .iter()
                .map(|twin| {
                    let mut line = vec![
                        Span::styled(&twin.id, Style::default().fg(Color::White)),
                        Span::raw("  "),
                        Span::styled(short_address(&twin.owner), Style::default().fg(Color::Magenta)),
                        Span::raw("  ::  "),
                        status_span(twin.status),
                        Span::raw(format!("  {} ETH", twin.earnings)),
                    ];
                    if self.state.is_owner(twin) {
                        line.push(Span::styled("  (yours)", Style::default().fg(Color::Cyan)));
                    }
                    ListItem::new(Line::from(line))
                })
                .collect()
        };

        let mut title = String::from("Digital Twins");
        if self.state.editing_search || !self.state.search.is_empty() {
            title.push_str(&format!(" [/{}]", self.state.search));
            if self.state.editing_search {
                title.push('_');
            }
        }
        if self.state.refreshing {
            title.push_str(" (refreshing)");
        }
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(Style::default().bg(Color::Blue).fg(Color::Black))
            .highlight_symbol("▶ ");
        let mut list_state = ListState::default();
        list_state.select(if visible.is_empty() {
            None
        } else {
            Some(self.state.selected)
        });
        f.render_stateful_widget(list, area, &mut list_state);
    }

    fn render_footer(&self, f: &mut Frame<'_>, area: Rect) {
        let footer = if let Some(notice) = self.state.notice.as_ref() {
            let color = match notice.kind {
                NoticeKind::Pending => Color::Yellow,
                NoticeKind::Success => Color::Green,
                NoticeKind::Error => Color::Red,
            };
            Paragraph::new(notice.message.as_str()).style(Style::default().fg(color))
        } else if let Some(wallet) = self.state.wallet.as_deref() {
            Paragraph::new(format!("Connected as {wallet}"))
                .style(Style::default().fg(Color::Green))
        } else {
            Paragraph::new("Read-only: configure wallet.key_hex_path to create or update twins")
                .style(Style::default().fg(Color::Yellow))
        };
        f.render_widget(
            footer.block(Block::default().borders(Borders::ALL)),
            area,
        );
    }

    fn render_create(&self, f: &mut Frame<'_>, form: &CreateForm, size: Rect) {
        let area = centered_rect(70, 60, size);
        let focused = form.focused_category();

        let mut lines = vec![
            Line::from("Set each interest from 0 to 100. Values are encoded before storage."),
            Line::from(""),
        ];
        for (category, value, cipher) in form.preview(self.repo.codec()) {
            let marker = if category == focused { "▶ " } else { "  " };
            let filled = usize::from(value) * SLIDER_WIDTH / 100;
            let style = if category == focused {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            lines.push(Line::from(vec![
                Span::styled(format!("{marker}{:<14}", category.label()), style),
                Span::styled("█".repeat(filled), Style::default().fg(Color::Cyan)),
                Span::styled(
                    "░".repeat(SLIDER_WIDTH - filled),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(format!(" {value:>3}  ")),
                Span::styled(cipher, Style::default().fg(Color::DarkGray)),
            ]));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(if form.closes_at.is_some() {
            "Digital twin created."
        } else if form.submitting {
            "Submitting..."
        } else {
            "tab/↑/↓:field  ←/→:adjust  enter:create  esc:cancel"
        }));

        f.render_widget(Clear, area);
        f.render_widget(
            Paragraph::new(lines).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Create Digital Twin"),
            ),
            area,
        );
    }

    fn render_detail(&self, f: &mut Frame<'_>, size: Rect) {
        let (Some(detail), Some(twin)) = (self.state.detail.as_ref(), self.state.detail_twin())
        else {
            return;
        };
        let area = centered_rect(70, 60, size);

        let mut lines = vec![
            Line::from(format!("Owner:    {}", twin.owner)),
            Line::from(vec![Span::raw("Status:   "), status_span(twin.status)]),
            Line::from(format!("Earnings: {} ETH", twin.earnings)),
            Line::from(""),
        ];

        match detail.decrypted.as_ref() {
            Some(values) => {
                lines.push(Line::from("Interests:"));
                for (category, value) in values {
                    let shown = if value.is_finite() {
                        format!("{value}")
                    } else {
                        "<unreadable>".to_string()
                    };
                    lines.push(Line::from(format!("  {category:<14} {shown}")));
                }
            }
            None if detail.decrypting => {
                lines.push(Line::from("Waiting for wallet signature..."));
            }
            None => {
                lines.push(Line::from("Interests are encoded. Press d to sign and decrypt."));
            }
        }

        lines.push(Line::from(""));
        let toggle_hint = if self.state.is_owner(twin) {
            "  t:toggle status"
        } else {
            ""
        };
        let decrypt_hint = if detail.decrypted.is_some() {
            "d:hide"
        } else {
            "d:decrypt"
        };
        lines.push(Line::from(format!("{decrypt_hint}{toggle_hint}  esc:close")));

        f.render_widget(Clear, area);
        f.render_widget(
            Paragraph::new(lines).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("Twin {}", twin.id)),
            ),
            area,
        );
    }
}

fn status_span(status: TwinStatus) -> Span<'static> {
    let color = match status {
        TwinStatus::Active => Color::Green,
        TwinStatus::Inactive => Color::Red,
    };
    Span::styled(status.as_str(), Style::default().fg(color))
}

fn short_address(address: &str) -> String {
    if address.len() <= 12 || !address.is_ascii() {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

/// Rectangle of `percent_x` by `percent_y` centered in `area`.
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
