// Views for MTR Next Train Finder
use crate::ntf_countdown::{self, Countdown, Urgency};
use crate::ntf_directory::StationDirectory;
use crate::ntf_models::{ArrivalRecord, ArrivalSlot, Direction, LineRef, NTFError, ScheduleResult};
use crate::ntf_selection::{PendingInterchangeChoice, SelectionState};
use std::collections::HashMap;
use std::io::{self, Write};

pub const DEFAULT_LINE_COLOR: &str = "333333";

/// Everything needed to draw the live result board.
pub struct BoardView<'a> {
    pub line: &'a LineRef,
    pub station_name: String,
    pub result: &'a ScheduleResult,
    pub tab: Direction,
    pub countdowns: &'a HashMap<ArrivalSlot, Countdown>,
    /// Message from the last failed action, kept on the board.
    pub notice: Option<&'a str>,
}

pub struct NTFViews {
    color: bool,
}

impl NTFViews {
    pub fn new(color: bool) -> Self {
        NTFViews { color }
    }

    /// Show welcome screen
    pub fn show_welcome_screen(&self) {
        println!("\n{}", "═".repeat(70));
        println!("  ╔═══════════════════════════════════════════════════════════╗");
        println!("  ║            🚇 NEXT TRAIN FINDER - HONG KONG MTR           ║");
        println!("  ║                 Live Arrival Countdowns                   ║");
        println!("  ╚═══════════════════════════════════════════════════════════╝");
        println!("{}", "═".repeat(70));
        println!("\n  🌐 Data source: MTR Next Train open data");
        println!("     https://data.gov.hk/");
        println!("\n{}", "═".repeat(70));
    }

    /// Show command overview
    pub fn show_menu(&self) {
        println!("\n{}", "═".repeat(60));
        println!("📋 COMMANDS");
        println!("  lines              List all lines");
        println!("  line <ID>          Select a line (clears the station)");
        println!("  stations           List stations of the selected line");
        println!("  station <ID>       Select a station on the selected line");
        println!("  fetch              Get next trains for the selection");
        println!("  map                Show the station map index");
        println!("  click <STATION>    Activate a station on the map");
        println!("  choose <N|LINE>    Pick a line at an interchange");
        println!("  cancel             Dismiss the interchange choice");
        println!("  up | down          Switch direction tab");
        println!("  close              Close the arrivals board");
        println!("  status             Show current selection");
        println!("  help               Show this menu");
        println!("  quit               Exit");
        println!("{}", "─".repeat(60));
    }

    pub fn prompt(&self) {
        print!("➜ ");
        let _ = io::stdout().flush();
    }

    pub fn show_lines(&self, directory: &StationDirectory, selection: &SelectionState) {
        println!("\n🚇 LINES ({} total)", directory.lines().len());
        println!("{}", "─".repeat(60));
        for line in directory.lines() {
            let marker = if selection.line_id() == Some(line.id.as_str()) { "▶" } else { " " };
            println!(
                " {} {} {} ({} stations)",
                marker,
                self.colorize_line(&line.id, line.color.as_deref()),
                line.name,
                line.stations.len()
            );
        }
        println!("{}", "─".repeat(60));
    }

    pub fn show_stations(&self, directory: &StationDirectory, line: &LineRef, selection: &SelectionState) {
        println!(
            "\n📍 STATIONS ON {} {}",
            self.colorize_line(&line.id, line.color.as_deref()),
            line.name
        );
        println!("{}", "─".repeat(60));
        for station in directory.stations_of(&line.id) {
            let marker = if selection.station_id() == Some(station.id.as_str()) { "▶" } else { " " };
            let interchange = if directory.is_interchange(&station.id) { "  ⇄" } else { "" };
            println!(" {} {}  {}{}", marker, station.id, station.name, interchange);
        }
        println!("{}", "─".repeat(60));
    }

    /// Map index: every station with the lines calling there
    pub fn show_map(&self, directory: &StationDirectory) {
        let index = directory.station_index();
        println!("\n{}", "═".repeat(70));
        println!("🗺️  MTR NETWORK MAP ({} stations)", index.len());
        println!("{}", "═".repeat(70));
        for entry in &index {
            let badges: Vec<String> = entry
                .lines
                .iter()
                .map(|l| self.colorize_line(&l.id, l.color.as_deref()))
                .collect();
            let interchange = if entry.is_interchange() { " ⇄" } else { "" };
            println!("  {}  {:<22} {}{}", entry.station.id, entry.station.name, badges.join(" "), interchange);
        }
        println!("{}", "─".repeat(70));
        println!("💡 Use 'click <STATION>' to see the next trains");
    }

    pub fn show_selection(&self, directory: &StationDirectory, selection: &SelectionState) {
        println!("\n{}", "─".repeat(60));
        match selection.line_id().and_then(|id| directory.line_by_id(id)) {
            Some(line) => println!(
                "  Line:    {} {}",
                self.colorize_line(&line.id, line.color.as_deref()),
                line.name
            ),
            None => println!("  Line:    -- Select a Line --"),
        }
        match selection.station_id() {
            Some(id) => println!("  Station: {} ({})", directory.station_name(id), id),
            None => println!("  Station: -- Select a Station --"),
        }
        println!("{}", "─".repeat(60));
    }

    pub fn show_interchange_choice(&self, directory: &StationDirectory, pending: &PendingInterchangeChoice) {
        println!("\n{}", "─".repeat(60));
        println!(
            "⇄ {} is an interchange. Which line?",
            directory.station_name(&pending.station_id)
        );
        for (i, line) in pending.candidate_lines.iter().enumerate() {
            println!(
                "  {}. {} {}",
                i + 1,
                self.colorize_line(&line.id, line.color.as_deref()),
                line.name
            );
        }
        println!("\n💡 'choose <N>' or 'choose <LINE>', 'cancel' to dismiss");
        println!("{}", "─".repeat(60));
    }

    pub fn show_loading(&self, station_name: &str, line: &LineRef) {
        println!("\n🔄 Fetching next trains at {} ({})...", station_name, line.name);
    }

    pub fn show_info(&self, message: &str) {
        println!("\n✓ {}", message);
    }

    /// Error messages with helpful context
    pub fn show_error(&self, error: &NTFError) {
        println!("\n{}", "─".repeat(60));
        match error {
            NTFError::Validation(message) => println!("⚠️  {}", message),
            NTFError::NetworkError(_) | NTFError::ParseError(_) => {
                println!("❌ Failed to fetch next train info.");
                println!("   {}", error);
                println!("\n💡 Check your connection and try 'fetch' again");
            }
            NTFError::UnknownStation(_) => {
                println!("✗ {}", error);
                println!("\n💡 Use 'map' to browse all stations");
            }
            NTFError::UnknownLine(_) => {
                println!("✗ {}", error);
                println!("\n💡 Use 'lines' to browse all lines");
            }
            NTFError::StationNotOnLine { .. } => {
                println!("✗ {}", error);
                println!("\n💡 Use 'stations' to see the stations of the selected line");
            }
            NTFError::InvalidChoice(_) | NTFError::InvalidCommand(_) => {
                println!("✗ {}", error);
                println!("   Type 'help' for the list of commands");
            }
        }
        println!("{}", "─".repeat(60));
    }

    /// Live arrivals board, redrawn on every countdown tick
    pub fn show_result_board(&self, directory: &StationDirectory, board: &BoardView<'_>) {
        self.clear_screen();
        println!("{}", "═".repeat(70));
        println!(
            "🚆 {} Station   {} {}",
            board.station_name,
            self.colorize_line(&board.line.id, board.line.color.as_deref()),
            board.line.name
        );
        println!("{}", "═".repeat(70));

        let result = board.result;
        if result.is_empty() {
            println!("\n   No train information available.");
        } else {
            if !result.up.is_empty() && !result.down.is_empty() {
                println!("\n{}", Self::format_tabs(board.tab));
            }
            println!();
            for (index, arrival) in result.arrivals(board.tab).iter().enumerate() {
                let slot = ArrivalSlot { direction: board.tab, index };
                let countdown = board.countdowns.get(&slot).copied().unwrap_or(Countdown::new(None));
                println!("{}", self.format_arrival_row(directory, arrival, countdown));
            }
        }

        if let Some(notice) = board.notice {
            println!("\n⚠️  {}", notice);
        }

        println!("\n{}", "─".repeat(70));
        println!("💡 'up' / 'down' switch direction, 'close' returns to the menu");
        self.prompt();
    }

    pub fn format_tabs(active: Direction) -> String {
        let tab = |d: Direction| {
            if d == active {
                format!("[ {} ]", d.label())
            } else {
                format!("  {}  ", d.label())
            }
        };
        format!("   {}   {}", tab(Direction::Up), tab(Direction::Down))
    }

    pub fn format_arrival_row(&self, directory: &StationDirectory, arrival: &ArrivalRecord, countdown: Countdown) -> String {
        let platform = format!("Platform {}", arrival.platform);
        let destination = directory.station_name(&arrival.destination_station_id);
        let clock = ntf_countdown::format_schedule_clock(&arrival.scheduled_time);
        let time = format!("{:>8}", countdown.display());
        format!(
            "   {:<12} {:<22} {}  {}",
            platform,
            destination,
            clock,
            self.paint_urgency(&time, countdown.urgency())
        )
    }

    fn paint_urgency(&self, text: &str, urgency: Urgency) -> String {
        if !self.color {
            return text.to_string();
        }
        let code = match urgency {
            Urgency::Critical => "1;32",
            Urgency::Urgent => "1;38;2;234;88;12",
            Urgency::Normal => "0",
            Urgency::Unknown => "90",
        };
        format!("\x1b[{}m{}\x1b[0m", code, text)
    }

    /// Colorize line code with ANSI colors (improved contrast)
    pub fn colorize_line(&self, code: &str, hex_color: Option<&str>) -> String {
        if !self.color {
            return format!("[{}]", code);
        }
        let (r, g, b) = parse_hex_color(hex_color.unwrap_or(DEFAULT_LINE_COLOR));

        // White text on dark backgrounds, black on light ones
        let luminance = (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32) / 255.0;
        let text_color = if luminance > 0.5 { "30" } else { "97" };

        format!("\x1b[48;2;{};{};{}m\x1b[{}m {} \x1b[0m", r, g, b, text_color, code)
    }

    fn clear_screen(&self) {
        print!("\x1B[2J\x1B[1;1H");
        let _ = io::stdout().flush();
    }

    pub fn goodbye_message(&self) {
        println!("\n{}", "═".repeat(60));
        println!("       👋 Thank you for using Next Train Finder!");
        println!("{}", "═".repeat(60));
        println!();
    }
}

pub fn parse_hex_color(hex_color: &str) -> (u8, u8, u8) {
    let hex = hex_color.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return (0x33, 0x33, 0x33);
    }
    let r = u8::from_str_radix(&hex[0..2], 16).unwrap_or(0x33);
    let g = u8::from_str_radix(&hex[2..4], 16).unwrap_or(0x33);
    let b = u8::from_str_radix(&hex[4..6], 16).unwrap_or(0x33);
    (r, g, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrival(dest: &str, plat: &str, time: &str) -> ArrivalRecord {
        ArrivalRecord {
            destination_station_id: dest.into(),
            platform: plat.into(),
            sequence_number: "1".into(),
            scheduled_time: time.into(),
        }
    }

    #[test]
    fn hex_colors_parse_with_or_without_hash() {
        assert_eq!(parse_hex_color("#ED1D24"), (0xED, 0x1D, 0x24));
        assert_eq!(parse_hex_color("007DC5"), (0x00, 0x7D, 0xC5));
        assert_eq!(parse_hex_color("zz"), (0x33, 0x33, 0x33));
        assert_eq!(parse_hex_color("GGGGGG"), (0x33, 0x33, 0x33));
    }

    #[test]
    fn plain_row_shows_platform_destination_and_countdown() {
        let views = NTFViews::new(false);
        let row = views.format_arrival_row(
            StationDirectory::mtr(),
            &arrival("POA", "1", "2026-02-04 17:28:01"),
            Countdown::new(Some(125)),
        );
        assert!(row.contains("Platform 1"));
        assert!(row.contains("Po Lam"));
        assert!(row.contains("17:28"));
        assert!(row.ends_with("2:05"));
    }

    #[test]
    fn row_uses_raw_id_for_unknown_destination() {
        let views = NTFViews::new(false);
        let row = views.format_arrival_row(StationDirectory::mtr(), &arrival("XXX", "3", ""), Countdown::new(Some(0)));
        assert!(row.contains("XXX"));
        assert!(row.contains("--:--"));
        assert!(row.ends_with("Arriving"));
    }

    #[test]
    fn colored_row_wraps_countdown_in_ansi() {
        let views = NTFViews::new(true);
        let row = views.format_arrival_row(
            StationDirectory::mtr(),
            &arrival("POA", "1", "2026-02-04 17:28:01"),
            Countdown::new(Some(0)),
        );
        assert!(row.contains("\x1b[1;32m"));
    }

    #[test]
    fn tabs_mark_active_direction() {
        let tabs = NTFViews::format_tabs(Direction::Down);
        assert!(tabs.contains("[ Down Direction ]"));
        assert!(!tabs.contains("[ Up Direction ]"));
    }

    #[test]
    fn plain_badge_without_color() {
        let views = NTFViews::new(false);
        assert_eq!(views.colorize_line("TWL", Some("ED1D24")), "[TWL]");
        assert!(NTFViews::new(true).colorize_line("TWL", None).contains("48;2;51;51;51"));
    }
}
