// Controllers for MTR Next Train Finder
use crate::ntf_config::Config;
use crate::ntf_countdown::{Clock, Countdown, CountdownBoard, CountdownTick, SystemClock};
use crate::ntf_directory::StationDirectory;
use crate::ntf_models::{
    ArrivalSlot, Direction, MtrScheduleClient, NTFError, NTFModels, Result, ScheduleKey, ScheduleResult,
    ScheduleSource,
};
use crate::ntf_selection::{Outcome, PendingInterchangeChoice, SelectionMachine};
use crate::ntf_views::{BoardView, NTFViews};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::io::{self, BufRead};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Lines,
    Line(String),
    Stations,
    Station(String),
    Fetch,
    Map,
    Click(String),
    Choose(String),
    Cancel,
    Tab(Direction),
    Close,
    Status,
    Help,
    Quit,
    Empty,
}

impl Command {
    pub fn parse(input: &str) -> Result<Command> {
        let mut parts = input.split_whitespace();
        let Some(verb) = parts.next() else {
            return Ok(Command::Empty);
        };
        let arg = parts.next().map(|a| a.to_ascii_uppercase());
        if parts.next().is_some() {
            return Err(NTFError::InvalidCommand(input.trim().to_string()));
        }

        let command = match (verb.to_ascii_lowercase().as_str(), arg) {
            ("lines", None) => Command::Lines,
            ("line", Some(id)) => Command::Line(id),
            ("stations", None) => Command::Stations,
            ("station", Some(id)) => Command::Station(id),
            ("fetch" | "go", None) => Command::Fetch,
            ("map", None) => Command::Map,
            ("click", Some(id)) => Command::Click(id),
            ("choose", Some(choice)) => Command::Choose(choice),
            ("cancel", None) => Command::Cancel,
            ("up", None) => Command::Tab(Direction::Up),
            ("down", None) => Command::Tab(Direction::Down),
            ("close", None) => Command::Close,
            ("status", None) => Command::Status,
            ("help" | "?", None) => Command::Help,
            ("quit" | "exit" | "q", None) => Command::Quit,
            _ => return Err(NTFError::InvalidCommand(input.trim().to_string())),
        };
        Ok(command)
    }

    /// Commands that act on an open arrivals board. Anything else dismisses it first.
    fn keeps_board(&self) -> bool {
        matches!(self, Command::Tab(_) | Command::Close | Command::Quit | Command::Empty)
    }
}

// ============================================================================
// Session
// ============================================================================

/// Outcome of one schedule request, tagged with the view generation it was issued in.
#[derive(Debug)]
pub struct FetchCompleted {
    pub generation: u64,
    pub key: ScheduleKey,
    pub outcome: Result<ScheduleResult>,
}

/// Receivers the event loop listens on.
pub struct SessionEvents {
    pub fetches: mpsc::UnboundedReceiver<FetchCompleted>,
    pub ticks: mpsc::UnboundedReceiver<CountdownTick>,
}

/// Something to tell the user once the current event is handled.
#[derive(Debug)]
pub enum Notice {
    Menu,
    Lines,
    Stations(String),
    Map,
    Selection,
    Choice(PendingInterchangeChoice),
    Loading(ScheduleKey),
    Info(String),
    Error(NTFError),
}

struct ResultView {
    key: ScheduleKey,
    board: CountdownBoard,
    countdowns: HashMap<ArrivalSlot, Countdown>,
    notice: Option<String>,
}

/// Interactive state: selection, the displayed schedule and its countdowns.
///
/// All mutation happens on the event loop. Fetches run as spawned tasks and
/// report back through `SessionEvents::fetches`; the last one to arrive wins.
pub struct Session<S: ScheduleSource> {
    directory: &'static StationDirectory,
    machine: SelectionMachine<'static>,
    source: Arc<S>,
    clock: Arc<dyn Clock>,
    tick_period: Duration,
    store: watch::Sender<Option<ScheduleResult>>,
    view: Option<ResultView>,
    generation: u64,
    next_board: u64,
    in_flight: usize,
    fetches_tx: mpsc::UnboundedSender<FetchCompleted>,
    ticks_tx: mpsc::UnboundedSender<CountdownTick>,
    notices: Vec<Notice>,
    dirty: bool,
    prompt: bool,
}

impl<S: ScheduleSource> Session<S> {
    pub fn new(
        directory: &'static StationDirectory,
        source: Arc<S>,
        clock: Arc<dyn Clock>,
        tick_period: Duration,
    ) -> (Self, SessionEvents) {
        let (fetches_tx, fetches) = mpsc::unbounded_channel();
        let (ticks_tx, ticks) = mpsc::unbounded_channel();
        let (store, _) = watch::channel(None);

        let session = Session {
            directory,
            machine: SelectionMachine::new(directory),
            source,
            clock,
            tick_period,
            store,
            view: None,
            generation: 0,
            next_board: 0,
            in_flight: 0,
            fetches_tx,
            ticks_tx,
            notices: Vec::new(),
            dirty: false,
            prompt: false,
        };

        (session, SessionEvents { fetches, ticks })
    }

    /// Parse and apply one line of user input.
    pub fn handle_input(&mut self, input: &str) -> ControlFlow<()> {
        self.prompt = true;
        match Command::parse(input) {
            Ok(command) => self.handle_command(command),
            Err(e) => {
                self.report(e);
                ControlFlow::Continue(())
            }
        }
    }

    pub fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        debug!("Command: {:?}", command);
        if self.view.is_some() && !command.keeps_board() {
            self.close_view();
        }

        match command {
            Command::Lines => self.notices.push(Notice::Lines),
            Command::Line(id) => {
                let outcome = self.machine.select_line(&id);
                self.apply(outcome);
            }
            Command::Stations => match self.machine.selection().line_id() {
                Some(line_id) => self.notices.push(Notice::Stations(line_id.to_string())),
                None => self.report(NTFError::Validation("Please select a line first.".to_string())),
            },
            Command::Station(id) => {
                let outcome = self.machine.select_station(&id);
                self.apply(outcome);
            }
            Command::Fetch => {
                let outcome = self.machine.submit();
                self.apply(outcome);
            }
            Command::Map => self.notices.push(Notice::Map),
            Command::Click(id) => {
                let outcome = self.machine.activate_station(&id);
                self.apply(outcome);
            }
            Command::Choose(choice) => {
                let outcome = self.machine.choose_line(&choice);
                self.apply(outcome);
            }
            Command::Cancel => {
                let had_choice = self.machine.pending().is_some();
                let outcome = self.machine.cancel();
                if had_choice {
                    self.apply(Ok(outcome));
                }
            }
            Command::Tab(direction) => self.switch_tab(direction),
            Command::Close => {
                if !self.close_view() && !self.dismiss_pending() {
                    self.notices.push(Notice::Info("No arrivals board open".to_string()));
                }
            }
            Command::Status => {
                self.notices.push(Notice::Selection);
                if self.in_flight > 0 {
                    self.notices.push(Notice::Info(format!("{} request(s) in flight", self.in_flight)));
                }
            }
            Command::Help => self.notices.push(Notice::Menu),
            Command::Quit => return ControlFlow::Break(()),
            Command::Empty => {}
        }

        ControlFlow::Continue(())
    }

    fn apply(&mut self, outcome: Result<Outcome>) {
        match outcome {
            Ok(Outcome::Fetch(key)) => self.dispatch_fetch(key),
            Ok(Outcome::ChooseLine(pending)) => self.notices.push(Notice::Choice(pending)),
            Ok(Outcome::Dismissed) => self.notices.push(Notice::Info("Interchange choice dismissed".to_string())),
            Ok(Outcome::Selected) => self.notices.push(Notice::Selection),
            Err(e) => self.report(e),
        }
    }

    /// Query the schedule in the background. Responses are not sequenced.
    fn dispatch_fetch(&mut self, key: ScheduleKey) {
        let source = Arc::clone(&self.source);
        let tx = self.fetches_tx.clone();
        let generation = self.generation;

        self.in_flight += 1;
        self.notices.push(Notice::Loading(key.clone()));

        tokio::spawn(async move {
            let outcome = NTFModels::fetch_schedule(source.as_ref(), &key.line_id, &key.station_id).await;
            let _ = tx.send(FetchCompleted { generation, key, outcome });
        });
    }

    pub fn handle_fetch_completed(&mut self, done: FetchCompleted) {
        self.in_flight = self.in_flight.saturating_sub(1);

        if done.generation != self.generation {
            info!("Discarding late response for {} (board closed)", done.key.composite());
            return;
        }

        match done.outcome {
            Ok(result) => self.show_result(done.key, result),
            Err(e) => {
                error!("Failed to fetch next train info for {}: {}", done.key.composite(), e);
                self.report(e);
            }
        }
    }

    fn show_result(&mut self, key: ScheduleKey, result: ScheduleResult) {
        let tab = if result.up.is_empty() && !result.down.is_empty() {
            Direction::Down
        } else {
            Direction::Up
        };
        info!(
            "{}: {} up, {} down",
            key.composite(),
            result.up.len(),
            result.down.len()
        );

        // Old timers stop before the new schedule becomes visible
        self.view = None;
        self.store.send_replace(Some(result));
        let board = self.start_board(tab);

        self.view = Some(ResultView {
            key,
            board,
            countdowns: self.countdowns_now(tab),
            notice: None,
        });
        self.dirty = true;
    }

    fn start_board(&mut self, direction: Direction) -> CountdownBoard {
        self.next_board += 1;
        CountdownBoard::start(
            self.next_board,
            direction,
            &self.store.subscribe(),
            Arc::clone(&self.clock),
            self.tick_period,
            &self.ticks_tx,
        )
    }

    /// Countdowns for the first draw, before the timers report in.
    fn countdowns_now(&self, direction: Direction) -> HashMap<ArrivalSlot, Countdown> {
        let now = self.clock.now();
        let store = self.store.borrow();
        let arrivals = store.as_ref().map(|r| r.arrivals(direction)).unwrap_or(&[]);
        arrivals
            .iter()
            .enumerate()
            .map(|(index, arrival)| (ArrivalSlot { direction, index }, Countdown::at(&arrival.scheduled_time, now)))
            .collect()
    }

    fn switch_tab(&mut self, direction: Direction) {
        let Some(current) = self.view.as_ref().map(|v| v.board.direction()) else {
            self.report(NTFError::Validation("No arrivals board open".to_string()));
            return;
        };
        if current == direction {
            return;
        }

        let has_trains = self
            .store
            .borrow()
            .as_ref()
            .is_some_and(|r| !r.arrivals(direction).is_empty());
        if !has_trains {
            if let Some(view) = self.view.as_mut() {
                view.notice = Some(format!("No trains in the {}", direction.label().to_lowercase()));
                self.dirty = true;
            }
            return;
        }

        // Entries of the hidden tab stop ticking
        let board = self.start_board(direction);
        let countdowns = self.countdowns_now(direction);
        if let Some(view) = self.view.as_mut() {
            view.board = board;
            view.countdowns = countdowns;
            view.notice = None;
            self.dirty = true;
        }
    }

    pub fn handle_tick(&mut self, tick: CountdownTick) {
        match self.view.as_mut() {
            Some(view) if view.board.id() == tick.board => {
                view.countdowns.insert(tick.slot, tick.countdown);
                self.dirty = true;
            }
            _ => debug!("Ignoring tick from retired board {}", tick.board),
        }
    }

    /// Close the arrivals board. Outstanding fetches keep running but their
    /// responses are no longer shown.
    pub fn close_view(&mut self) -> bool {
        let Some(view) = self.view.take() else {
            return false;
        };
        self.generation += 1;
        self.store.send_replace(None);
        debug!("Closed board for {} ({} timers stopped)", view.key.composite(), view.board.len());
        true
    }

    /// Drop the responses of requests still loading while no board is open.
    fn dismiss_pending(&mut self) -> bool {
        if self.in_flight == 0 {
            return false;
        }
        self.generation += 1;
        info!("Dismissed {} pending request(s)", self.in_flight);
        self.notices
            .push(Notice::Info(format!("Dismissed {} pending request(s)", self.in_flight)));
        true
    }

    fn report(&mut self, error: NTFError) {
        if error.is_transport() {
            warn!("{}", error);
        }
        match self.view.as_mut() {
            Some(view) => {
                view.notice = Some(error.to_string());
                self.dirty = true;
            }
            None => self.notices.push(Notice::Error(error)),
        }
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    /// Draw pending notices, then the board if anything on it changed.
    pub fn render(&mut self, views: &NTFViews) {
        let notices = std::mem::take(&mut self.notices);
        for notice in &notices {
            self.render_notice(views, notice);
        }

        let redraw = std::mem::take(&mut self.dirty) | std::mem::take(&mut self.prompt);

        match &self.view {
            Some(view) if redraw => {
                let Some(line) = self.directory.line_by_id(&view.key.line_id) else {
                    warn!("Board open for unknown line {}", view.key.line_id);
                    return;
                };
                let store = self.store.borrow();
                let empty = ScheduleResult::default();
                let board = BoardView {
                    line,
                    station_name: self.directory.station_name(&view.key.station_id),
                    result: store.as_ref().unwrap_or(&empty),
                    tab: view.board.direction(),
                    countdowns: &view.countdowns,
                    notice: view.notice.as_deref(),
                };
                views.show_result_board(self.directory, &board);
            }
            Some(_) => {}
            None if !notices.is_empty() || redraw => views.prompt(),
            None => {}
        }
    }

    fn render_notice(&self, views: &NTFViews, notice: &Notice) {
        let directory = self.directory;
        match notice {
            Notice::Menu => views.show_menu(),
            Notice::Lines => views.show_lines(directory, self.machine.selection()),
            Notice::Stations(line_id) => {
                if let Some(line) = directory.line_by_id(line_id) {
                    views.show_stations(directory, line, self.machine.selection());
                }
            }
            Notice::Map => views.show_map(directory),
            Notice::Selection => views.show_selection(directory, self.machine.selection()),
            Notice::Choice(pending) => views.show_interchange_choice(directory, pending),
            Notice::Loading(key) => {
                if let Some(line) = directory.line_by_id(&key.line_id) {
                    views.show_loading(&directory.station_name(&key.station_id), line);
                }
            }
            Notice::Info(message) => views.show_info(message),
            Notice::Error(error) => views.show_error(error),
        }
    }

}

#[cfg(test)]
impl<S: ScheduleSource> Session<S> {
    pub fn current_result(&self) -> Option<ScheduleResult> {
        self.store.borrow().clone()
    }

    pub fn is_view_open(&self) -> bool {
        self.view.is_some()
    }

    pub fn view_key(&self) -> Option<&ScheduleKey> {
        self.view.as_ref().map(|v| &v.key)
    }

    pub fn active_tab(&self) -> Option<Direction> {
        self.view.as_ref().map(|v| v.board.direction())
    }

    pub fn countdown(&self, slot: ArrivalSlot) -> Option<Countdown> {
        self.view.as_ref().and_then(|v| v.countdowns.get(&slot).copied())
    }

    pub fn running_timers(&self) -> usize {
        self.view.as_ref().map(|v| v.board.running()).unwrap_or(0)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn needs_redraw(&self) -> bool {
        self.dirty || self.prompt
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }
}

// ============================================================================
// Event Loop
// ============================================================================

pub struct NTFControllers;

impl NTFControllers {
    /// Main application loop
    pub async fn run(config: Config) -> anyhow::Result<()> {
        let views = NTFViews::new(!config.no_color);
        let client = MtrScheduleClient::new(&config.endpoint, config.request_timeout())?;
        info!("Using schedule endpoint {}", client.endpoint());

        let (mut session, mut events) = Session::new(
            StationDirectory::mtr(),
            Arc::new(client),
            Arc::new(SystemClock),
            config.tick_interval(),
        );
        let mut input = Self::spawn_input_reader();

        views.show_welcome_screen();
        views.show_menu();
        views.prompt();

        loop {
            let flow = tokio::select! {
                line = input.recv() => match line {
                    Some(line) => session.handle_input(&line),
                    None => ControlFlow::Break(()),
                },
                Some(done) = events.fetches.recv() => {
                    session.handle_fetch_completed(done);
                    ControlFlow::Continue(())
                }
                Some(tick) = events.ticks.recv() => {
                    session.handle_tick(tick);
                    ControlFlow::Continue(())
                }
            };

            // One redraw for all ticks of this second
            while let Ok(tick) = events.ticks.try_recv() {
                session.handle_tick(tick);
            }

            if flow.is_break() {
                break;
            }
            session.render(&views);
        }

        session.close_view();
        views.goodbye_message();
        Ok(())
    }

    /// Read stdin on its own thread; the event loop never blocks on input.
    fn spawn_input_reader() -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        thread::spawn(move || {
            let stdin = io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.lock().read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(line.trim().to_string()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Error reading input: {}", e);
                        break;
                    }
                }
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ntf_countdown::tests::{FixedClock, hkt_instant};
    use crate::ntf_models::tests::{FakeSource, TKO_PAYLOAD};

    const TKO_LATER_PAYLOAD: &str = r#"{
        "status": 1,
        "data": {"TKL-TKO": {"UP": [{"dest": "POA", "plat": "1", "seq": "1", "time": "2026-02-04 17:40:00"}]}}
    }"#;

    const DOWN_ONLY_PAYLOAD: &str = r#"{
        "status": 1,
        "data": {"DRL-DIS": {"DOWN": [{"dest": "SUN", "plat": "1", "seq": "1", "time": "2026-02-04 17:33:00"}]}}
    }"#;

    fn session(source: FakeSource) -> (Session<FakeSource>, SessionEvents, Arc<FakeSource>) {
        let source = Arc::new(source);
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(hkt_instant(17, 27, 0)));
        let (session, events) = Session::new(StationDirectory::mtr(), Arc::clone(&source), clock, Duration::from_secs(1));
        (session, events, source)
    }

    async fn complete_next(session: &mut Session<FakeSource>, events: &mut SessionEvents) {
        let done = events.fetches.recv().await.expect("fetch completes");
        session.handle_fetch_completed(done);
    }

    fn errors(notices: &[Notice]) -> Vec<&NTFError> {
        notices
            .iter()
            .filter_map(|n| match n {
                Notice::Error(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn parse_commands() {
        assert_eq!(Command::parse("line tkl").unwrap(), Command::Line("TKL".into()));
        assert_eq!(Command::parse("  click  adm ").unwrap(), Command::Click("ADM".into()));
        assert_eq!(Command::parse("choose 2").unwrap(), Command::Choose("2".into()));
        assert_eq!(Command::parse("DOWN").unwrap(), Command::Tab(Direction::Down));
        assert_eq!(Command::parse("").unwrap(), Command::Empty);
        assert_eq!(Command::parse("q").unwrap(), Command::Quit);
        assert!(matches!(Command::parse("line"), Err(NTFError::InvalidCommand(_))));
        assert!(matches!(Command::parse("fetch now please"), Err(NTFError::InvalidCommand(_))));
        assert!(matches!(Command::parse("teleport"), Err(NTFError::InvalidCommand(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn click_on_single_line_station_fetches_and_opens_board() {
        let (mut session, mut events, source) = session(FakeSource::replying(DOWN_ONLY_PAYLOAD));

        assert!(session.handle_input("click DIS").is_continue());
        assert_eq!(session.in_flight(), 1);
        complete_next(&mut session, &mut events).await;

        assert_eq!(source.call_count(), 1);
        assert_eq!(session.view_key(), Some(&ScheduleKey::new("DRL", "DIS")));
        assert_eq!(session.active_tab(), Some(Direction::Down));
        assert_eq!(session.current_result().map(|r| r.down.len()), Some(1));
        assert_eq!(session.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn click_on_interchange_asks_before_fetching() {
        let (mut session, _events, source) = session(FakeSource::replying(TKO_PAYLOAD));

        session.handle_input("click ADM");
        tokio::task::yield_now().await;

        assert_eq!(source.call_count(), 0);
        assert_eq!(session.in_flight(), 0);
        let notices = session.take_notices();
        assert!(notices.iter().any(|n| matches!(n, Notice::Choice(p) if p.candidate_lines.len() >= 2)));

        session.handle_input("cancel");
        tokio::task::yield_now().await;
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn interchange_choice_fetches_chosen_line() {
        let (mut session, mut events, source) = session(FakeSource::replying(TKO_PAYLOAD));

        session.handle_input("click CEN");
        session.handle_input("choose ISL");
        complete_next(&mut session, &mut events).await;

        assert_eq!(source.keys.lock().unwrap()[0], ScheduleKey::new("ISL", "CEN"));
        // No ISL-CEN entry in the payload: an empty board, not an error
        assert_eq!(session.current_result(), Some(ScheduleResult::default()));
        assert!(errors(&session.take_notices()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_station_is_reported() {
        let (mut session, _events, source) = session(FakeSource::replying(TKO_PAYLOAD));

        session.handle_input("click ZZZ");
        let notices = session.take_notices();
        assert!(matches!(errors(&notices)[..], [NTFError::UnknownStation(_)]));
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_without_station_is_a_validation_failure() {
        let (mut session, _events, source) = session(FakeSource::replying(TKO_PAYLOAD));

        session.handle_input("line TKL");
        session.handle_input("fetch");
        tokio::task::yield_now().await;

        let notices = session.take_notices();
        assert!(matches!(errors(&notices)[..], [NTFError::Validation(_)]));
        assert_eq!(source.call_count(), 0);
        assert_eq!(session.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropdown_selection_fetches_and_ticks() {
        let (mut session, mut events, _source) = session(FakeSource::replying(TKO_PAYLOAD));

        session.handle_input("line TKL");
        session.handle_input("station TKO");
        session.handle_input("fetch");
        complete_next(&mut session, &mut events).await;

        assert_eq!(session.active_tab(), Some(Direction::Up));
        assert_eq!(session.running_timers(), 2);

        for _ in 0..2 {
            let tick = events.ticks.recv().await.unwrap();
            session.handle_tick(tick);
        }
        let first = ArrivalSlot { direction: Direction::Up, index: 0 };
        // 17:27:00 -> 17:28:01
        assert_eq!(session.countdown(first).map(|c| c.display()), Some("1:01".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn switching_tab_retires_old_timers() {
        let (mut session, mut events, _source) = session(FakeSource::replying(TKO_PAYLOAD));

        session.handle_input("click TKO");
        complete_next(&mut session, &mut events).await;
        let stale = events.ticks.recv().await.unwrap();

        session.handle_input("down");
        assert_eq!(session.active_tab(), Some(Direction::Down));
        assert_eq!(session.running_timers(), 1);

        session.handle_tick(stale);
        assert_eq!(session.countdown(stale.slot), None);
        while let Ok(tick) = events.ticks.try_recv() {
            assert_eq!(tick.board, stale.board);
            session.handle_tick(tick);
        }

        let tick = events.ticks.recv().await.unwrap();
        session.handle_tick(tick);
        assert_eq!(tick.slot, ArrivalSlot { direction: Direction::Down, index: 0 });
        assert!(session.countdown(tick.slot).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn closing_board_discards_late_response() {
        let (mut session, mut events, source) = session(FakeSource::replying(TKO_PAYLOAD));

        session.handle_input("line TKL");
        session.handle_input("station TKO");
        session.handle_input("fetch");
        session.handle_input("fetch");
        complete_next(&mut session, &mut events).await;
        assert!(session.is_view_open());

        session.handle_input("close");
        assert!(!session.is_view_open());
        assert_eq!(session.current_result(), None);
        session.take_notices();

        complete_next(&mut session, &mut events).await;
        assert_eq!(source.call_count(), 2);
        assert!(!session.is_view_open());
        assert_eq!(session.current_result(), None);
        assert!(session.take_notices().is_empty());

        // Timers of the closed board are gone
        tokio::time::sleep(Duration::from_secs(3)).await;
        while let Ok(tick) = events.ticks.try_recv() {
            session.handle_tick(tick);
        }
        assert!(!session.is_view_open());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_keeps_displayed_schedule() {
        let source = FakeSource::scripted(vec![Some(TKO_PAYLOAD), None]);
        let (mut session, mut events, _source) = session(source);

        session.handle_input("click TKO");
        session.handle_input("fetch");
        complete_next(&mut session, &mut events).await;
        let shown = session.current_result();
        assert_eq!(shown.as_ref().map(|r| r.up.len()), Some(2));

        complete_next(&mut session, &mut events).await;
        assert!(session.is_view_open());
        assert_eq!(session.current_result(), shown);
    }

    #[tokio::test(start_paused = true)]
    async fn last_response_wins() {
        let source = FakeSource::scripted(vec![Some(TKO_PAYLOAD), Some(TKO_LATER_PAYLOAD)]);
        let (mut session, mut events, _source) = session(source);

        session.handle_input("click TKO");
        session.handle_input("fetch");
        complete_next(&mut session, &mut events).await;
        complete_next(&mut session, &mut events).await;

        let result = session.current_result().unwrap();
        assert_eq!(result.up.len(), 1);
        assert_eq!(result.up[0].scheduled_time, "2026-02-04 17:40:00");
        assert!(result.down.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn new_command_dismisses_open_board() {
        let (mut session, mut events, _source) = session(FakeSource::replying(TKO_PAYLOAD));

        session.handle_input("click TKO");
        complete_next(&mut session, &mut events).await;
        assert!(session.is_view_open());
        session.take_notices();

        session.handle_input("map");
        assert!(!session.is_view_open());
        assert!(matches!(session.take_notices()[..], [Notice::Map]));
    }

    #[tokio::test(start_paused = true)]
    async fn close_while_loading_dismisses_the_request() {
        let (mut session, mut events, _source) = session(FakeSource::replying(TKO_PAYLOAD));

        session.handle_input("click TKO");
        session.take_notices();
        session.handle_input("close");
        let notices = session.take_notices();
        assert!(matches!(&notices[..], [Notice::Info(m)] if m.starts_with("Dismissed 1 pending")));

        complete_next(&mut session, &mut events).await;
        assert!(!session.is_view_open());
        assert!(session.take_notices().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn close_with_nothing_open_keeps_later_requests() {
        let (mut session, mut events, _source) = session(FakeSource::replying(TKO_PAYLOAD));

        session.handle_input("close");
        let notices = session.take_notices();
        assert!(matches!(&notices[..], [Notice::Info(m)] if m == "No arrivals board open"));

        session.handle_input("click TKO");
        complete_next(&mut session, &mut events).await;
        assert!(session.is_view_open());
    }

    #[tokio::test(start_paused = true)]
    async fn render_clears_redraw_flags_even_for_unknown_line() {
        let (mut session, mut events, _source) = session(FakeSource::replying(TKO_PAYLOAD));
        let views = NTFViews::new(false);

        session.handle_input("click TKO");
        complete_next(&mut session, &mut events).await;
        assert!(session.needs_redraw());
        session.render(&views);
        assert!(!session.needs_redraw());

        if let Some(view) = session.view.as_mut() {
            view.key = ScheduleKey::new("XXX", "TKO");
        }
        let tick = events.ticks.recv().await.unwrap();
        session.handle_tick(tick);
        assert!(session.needs_redraw());
        session.render(&views);
        assert!(!session.needs_redraw());
    }

    #[tokio::test(start_paused = true)]
    async fn quit_breaks_the_loop() {
        let (mut session, _events, _source) = session(FakeSource::failing());
        assert!(session.handle_input("quit").is_break());
    }
}
