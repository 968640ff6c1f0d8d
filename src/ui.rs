use crate::config::Config;
use crate::db::Dataset;
use crate::report::{build_dashboard, ChartKind, Dashboard, Panel, Tab};
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, Bar, BarChart, BarGroup, Block, Borders, Cell, Chart, Dataset as ChartSeries,
        GraphType, Paragraph, Row, Table, TableState,
    },
    Frame, Terminal,
};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Products,
    Categories,
    Overview,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Products => Page::Categories,
            Page::Categories => Page::Overview,
            Page::Overview => Page::Products,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Products => Page::Overview,
            Page::Categories => Page::Products,
            Page::Overview => Page::Categories,
        }
    }

    /// Position of this page's tab in the dashboard
    pub fn index(&self) -> usize {
        match self {
            Page::Products => 0,
            Page::Categories => 1,
            Page::Overview => 2,
        }
    }
}

pub struct App {
    dataset: Dataset,
    config: Config,
    pub dashboard: Dashboard,
    pub fingerprint: Option<String>,
    pub current_page: Page,
    /// Panel that receives row navigation
    pub focus: usize,
    pub state: TableState,
}

impl App {
    pub fn new(dataset: Dataset, config: Config) -> Self {
        let dashboard = build_dashboard(&dataset, &config);
        let fingerprint = dashboard.fingerprint().ok();

        let mut app = Self {
            dataset,
            config,
            dashboard,
            fingerprint,
            current_page: Page::Products,
            focus: 0,
            state: TableState::default(),
        };
        app.reset_selection();
        app
    }

    /// Recompute every result from the dataset
    pub fn refresh(&mut self) {
        self.dashboard = build_dashboard(&self.dataset, &self.config);
        self.fingerprint = self.dashboard.fingerprint().ok();
        self.reset_selection();
    }

    pub fn current_tab(&self) -> Option<&Tab> {
        self.dashboard.tabs.get(self.current_page.index())
    }

    fn panel_count(&self) -> usize {
        self.current_tab().map(|t| t.panels.len()).unwrap_or(0)
    }

    fn focused_rows(&self) -> usize {
        self.current_tab()
            .and_then(|t| t.panels.get(self.focus))
            .map(|p| p.table.len())
            .unwrap_or(0)
    }

    fn reset_selection(&mut self) {
        let rows = self.focused_rows();
        self.state.select(if rows == 0 { None } else { Some(0) });
    }

    pub fn next_page(&mut self) {
        self.go_to(self.current_page.next());
    }

    pub fn previous_page(&mut self) {
        self.go_to(self.current_page.previous());
    }

    /// Switching pages re-runs the analyses, like a fresh render
    pub fn go_to(&mut self, page: Page) {
        self.current_page = page;
        self.focus = 0;
        self.refresh();
    }

    pub fn focus_next(&mut self) {
        let count = self.panel_count();
        if count == 0 {
            return;
        }
        self.focus = (self.focus + 1) % count;
        self.reset_selection();
    }

    pub fn focus_previous(&mut self) {
        let count = self.panel_count();
        if count == 0 {
            return;
        }
        self.focus = if self.focus == 0 { count - 1 } else { self.focus - 1 };
        self.reset_selection();
    }

    pub fn next(&mut self) {
        let len = self.focused_rows();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i < len - 1 => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.focused_rows();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Tab if key.modifiers.contains(KeyModifiers::SHIFT) => app.previous_page(),
                KeyCode::Tab => app.next_page(),
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char('1') => app.go_to(Page::Products),
                KeyCode::Char('2') => app.go_to(Page::Categories),
                KeyCode::Char('3') => app.go_to(Page::Overview),
                KeyCode::Char('r') => app.refresh(),
                KeyCode::Right | KeyCode::Char('l') => app.focus_next(),
                KeyCode::Left | KeyCode::Char('h') => app.focus_previous(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Panels
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);
    render_tab(f, chunks[1], app);
    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, tab) in app.dashboard.tabs.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if i == app.current_page.index() {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(tab.title.clone(), style));
    }

    let summary = &app.dashboard.summary;
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Reviews: {}", summary.total_reviews),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("★ {:.2}", summary.mean_rating),
        Style::default().fg(Color::Green),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

/// Split the content area into one cell per panel (two per row)
fn panel_areas(area: Rect, count: usize) -> Vec<Rect> {
    if count == 0 {
        return Vec::new();
    }

    let row_count = (count + 1) / 2;
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Ratio(1, row_count as u32); row_count])
        .split(area);

    let mut areas = Vec::with_capacity(count);
    for (r, row) in rows.iter().enumerate() {
        let in_row = (count - r * 2).min(2);
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(vec![Constraint::Ratio(1, in_row as u32); in_row])
            .split(*row);
        areas.extend(cols.iter().copied());
    }
    areas
}

fn render_tab(f: &mut Frame, area: Rect, app: &mut App) {
    let Some(tab) = app.dashboard.tabs.get(app.current_page.index()) else {
        return;
    };

    let areas = panel_areas(area, tab.panels.len());
    for (i, (panel, cell)) in tab.panels.iter().zip(areas).enumerate() {
        let focused = i == app.focus;
        render_panel(f, cell, panel, focused, &mut app.state);
    }
}

fn render_panel(f: &mut Frame, area: Rect, panel: &Panel, focused: bool, state: &mut TableState) {
    let (table_area, chart_area) = match panel.chart {
        Some(_) => {
            let halves = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(area);
            (halves[0], Some(halves[1]))
        }
        None => (area, None),
    };

    render_result_table(f, table_area, panel, focused, state);

    if let (Some(chart), Some(chart_area)) = (&panel.chart, chart_area) {
        let points = panel.table.series(chart);
        match chart.kind {
            ChartKind::Bar | ChartKind::Pie => {
                render_bar_chart(f, chart_area, &panel.table.title, &points)
            }
            ChartKind::Line => render_line_chart(f, chart_area, &panel.table.title, &points),
        }
    }
}

fn render_result_table(
    f: &mut Frame,
    area: Rect,
    panel: &Panel,
    focused: bool,
    state: &mut TableState,
) {
    let header_cells = panel.table.columns.iter().map(|h| {
        Cell::from(h.clone()).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = panel.table.rows.iter().map(|row| {
        let cells = row.iter().enumerate().map(|(i, value)| {
            let text = value.to_string();
            let cell = Cell::from(if i == 0 { truncate(&text, 28) } else { text });
            match value.as_f64() {
                Some(x) if i > 0 && x < 0.0 => cell.style(Style::default().fg(Color::Red)),
                _ => cell,
            }
        });
        Row::new(cells).height(1)
    });

    let mut widths = vec![Constraint::Min(16)];
    let value_columns = panel.table.columns.len().saturating_sub(1);
    widths.extend(std::iter::repeat(Constraint::Length(12)).take(value_columns));

    let border = if focused { Color::Yellow } else { Color::White };
    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title(format!(" {} ", panel.table.title)),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("→ ");

    if focused {
        f.render_stateful_widget(table, area, state);
    } else {
        f.render_widget(table, area);
    }
}

fn render_bar_chart(f: &mut Frame, area: Rect, title: &str, points: &[(String, f64)]) {
    // bars are unsigned; magnitude drives height, sign drives colour
    let bars: Vec<Bar> = points
        .iter()
        .map(|(label, v)| {
            let color = if *v < 0.0 { Color::Red } else { Color::Green };
            let text = if v.fract() == 0.0 {
                format!("{}", v)
            } else {
                format!("{:.2}", v)
            };
            Bar::default()
                .value((v.abs() * 1000.0).round() as u64)
                .text_value(text)
                .label(Line::from(truncate(label, 12)))
                .style(Style::default().fg(color))
        })
        .collect();

    let slots = bars.len().max(1) as u16;
    let bar_width = (area.width.saturating_sub(2) / slots)
        .saturating_sub(1)
        .clamp(3, 12);

    let chart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", title)),
        )
        .data(BarGroup::default().bars(&bars))
        .bar_width(bar_width)
        .bar_gap(1);

    f.render_widget(chart, area);
}

fn render_line_chart(f: &mut Frame, area: Rect, title: &str, points: &[(String, f64)]) {
    let data: Vec<(f64, f64)> = points
        .iter()
        .enumerate()
        .map(|(i, (_, v))| (i as f64, *v))
        .collect();

    let (lo, hi) = data
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, v)| {
            (lo.min(v), hi.max(v))
        });
    let (lo, hi) = if lo.is_finite() { (lo - 0.5, hi + 0.5) } else { (0.0, 5.0) };

    let first = points.first().map(|p| p.0.clone()).unwrap_or_default();
    let last = points.last().map(|p| p.0.clone()).unwrap_or_default();

    let series = vec![ChartSeries::default()
        .name("Rating")
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Cyan))
        .data(&data)];

    let chart = Chart::new(series)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", title)),
        )
        .x_axis(
            Axis::default()
                .bounds([0.0, data.len().saturating_sub(1).max(1) as f64])
                .labels(vec![Span::raw(first), Span::raw(last)]),
        )
        .y_axis(
            Axis::default()
                .bounds([lo, hi])
                .labels(vec![
                    Span::raw(format!("{:.1}", lo)),
                    Span::raw(format!("{:.1}", hi)),
                ]),
        );

    f.render_widget(chart, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = vec![Span::styled(
        format!(" Panel: {}/{} ", app.focus + 1, app.panel_count()),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(fp) = &app.fingerprint {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(
            format!("#{}", &fp[..fp.len().min(8)]),
            Style::default().fg(Color::DarkGray),
        ));
    }

    status_spans.push(Span::raw(" | "));
    status_spans.push(Span::styled("Tab/1-3", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Page | "));
    status_spans.push(Span::styled("←/→", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Panel | "));
    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Row | "));
    status_spans.push(Span::styled("r", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Refresh | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
