// Line/station selection and interchange resolution
//
// Two entry points feed one fetch action: the line/station "dropdowns" and a
// direct station activation from the map. Both go through `SelectionMachine`.
use crate::ntf_directory::StationDirectory;
use crate::ntf_models::{LineRef, NTFError, Result, ScheduleKey};
use log::debug;

// ============================================================================
// Selection State
// ============================================================================

/// Dropdown selection. Changing the line always clears the station.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    line_id: Option<String>,
    station_id: Option<String>,
}

impl SelectionState {
    pub fn line_id(&self) -> Option<&str> {
        self.line_id.as_deref()
    }

    pub fn station_id(&self) -> Option<&str> {
        self.station_id.as_deref()
    }

    pub fn set_line(&mut self, line_id: &str) {
        self.line_id = Some(line_id.to_string());
        self.station_id = None;
    }

    pub fn set_station(&mut self, station_id: &str) {
        self.station_id = Some(station_id.to_string());
    }

    /// Both halves, once set.
    pub fn key(&self) -> Option<ScheduleKey> {
        match (&self.line_id, &self.station_id) {
            (Some(line), Some(station)) if !line.is_empty() && !station.is_empty() => {
                Some(ScheduleKey::new(line.as_str(), station.as_str()))
            }
            _ => None,
        }
    }
}

// ============================================================================
// Interchange State Machine
// ============================================================================

/// Lines the user has to choose between after activating an interchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInterchangeChoice {
    pub station_id: String,
    pub candidate_lines: Vec<LineRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterchangeState {
    Idle,
    AwaitingInterchangeChoice(PendingInterchangeChoice),
    Resolved(ScheduleKey),
}

/// What the caller has to do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Resolved: query this line and station.
    Fetch(ScheduleKey),
    /// Ask the user which line they meant.
    ChooseLine(PendingInterchangeChoice),
    /// Pending choice dropped, nothing to fetch.
    Dismissed,
    /// Dropdown selection updated.
    Selected,
}

pub struct SelectionMachine<'a> {
    directory: &'a StationDirectory,
    state: InterchangeState,
    selection: SelectionState,
}

impl<'a> SelectionMachine<'a> {
    pub fn new(directory: &'a StationDirectory) -> Self {
        SelectionMachine {
            directory,
            state: InterchangeState::Idle,
            selection: SelectionState::default(),
        }
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn pending(&self) -> Option<&PendingInterchangeChoice> {
        match &self.state {
            InterchangeState::AwaitingInterchangeChoice(pending) => Some(pending),
            _ => None,
        }
    }

    /// A station was activated without line context (map click).
    pub fn activate_station(&mut self, station_id: &str) -> Result<Outcome> {
        let Some(station) = self.directory.station(station_id) else {
            self.state = InterchangeState::Idle;
            return Err(NTFError::UnknownStation(station_id.trim().to_string()));
        };
        let station_id = station.id.clone();

        let candidates = self.directory.lines_serving(&station_id);
        match candidates.as_slice() {
            [] => {
                self.state = InterchangeState::Idle;
                Err(NTFError::UnknownStation(station_id))
            }
            [line] => {
                let line_id = line.id.clone();
                Ok(self.resolve(ScheduleKey::new(line_id, station_id), true))
            }
            lines => {
                let pending = PendingInterchangeChoice {
                    station_id,
                    candidate_lines: lines.iter().map(|l| (*l).clone()).collect(),
                };
                debug!(
                    "{} is an interchange of {} lines, awaiting choice",
                    pending.station_id,
                    pending.candidate_lines.len()
                );
                self.state = InterchangeState::AwaitingInterchangeChoice(pending.clone());
                Ok(Outcome::ChooseLine(pending))
            }
        }
    }

    /// Pick a line for the pending interchange, by 1-based position or by line id.
    pub fn choose_line(&mut self, choice: &str) -> Result<Outcome> {
        let Some(pending) = self.pending() else {
            return Err(NTFError::InvalidChoice(choice.to_string()));
        };

        let choice = choice.trim();
        let chosen = match choice.parse::<usize>() {
            Ok(n) if n >= 1 => pending.candidate_lines.get(n - 1),
            Ok(_) => None,
            Err(_) => pending
                .candidate_lines
                .iter()
                .find(|l| l.id.eq_ignore_ascii_case(choice)),
        };

        match chosen {
            Some(line) => {
                let key = ScheduleKey::new(line.id.as_str(), pending.station_id.as_str());
                Ok(self.resolve(key, true))
            }
            None => Err(NTFError::InvalidChoice(choice.to_string())),
        }
    }

    /// Dismiss the pending interchange choice.
    pub fn cancel(&mut self) -> Outcome {
        if self.pending().is_some() {
            self.state = InterchangeState::Idle;
        }
        Outcome::Dismissed
    }

    /// Line dropdown changed. Clears the station.
    pub fn select_line(&mut self, line_id: &str) -> Result<Outcome> {
        let line = self
            .directory
            .line_by_id(line_id)
            .ok_or_else(|| NTFError::UnknownLine(line_id.trim().to_string()))?;
        self.selection.set_line(&line.id);
        Ok(Outcome::Selected)
    }

    /// Station dropdown changed. Only stations of the selected line are offered.
    pub fn select_station(&mut self, station_id: &str) -> Result<Outcome> {
        let line_id = self
            .selection
            .line_id()
            .ok_or_else(|| NTFError::Validation("Please select a line first.".to_string()))?;
        let station = self
            .directory
            .stations_of(line_id)
            .iter()
            .find(|s| s.id.eq_ignore_ascii_case(station_id.trim()))
            .ok_or_else(|| NTFError::StationNotOnLine {
                line: line_id.to_string(),
                station: station_id.trim().to_string(),
            })?;

        let station_id = station.id.clone();
        self.selection.set_station(&station_id);
        Ok(Outcome::Selected)
    }

    /// "Get Next Train": the line is explicit, so no disambiguation.
    pub fn submit(&mut self) -> Result<Outcome> {
        let key = self
            .selection
            .key()
            .ok_or_else(|| NTFError::Validation("Please select both line and station.".to_string()))?;
        Ok(self.resolve(key, false))
    }

    fn resolve(&mut self, key: ScheduleKey, sync_selection: bool) -> Outcome {
        if sync_selection {
            self.selection.set_line(&key.line_id);
            self.selection.set_station(&key.station_id);
        }
        debug!("Resolved {}", key.composite());
        self.state = InterchangeState::Resolved(key.clone());
        Outcome::Fetch(key)
    }
}

#[cfg(test)]
impl SelectionMachine<'_> {
    pub fn state(&self) -> &InterchangeState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> SelectionMachine<'static> {
        SelectionMachine::new(StationDirectory::mtr())
    }

    #[test]
    fn changing_line_clears_station() {
        let mut m = machine();
        m.select_line("TKL").unwrap();
        m.select_station("TKO").unwrap();
        assert_eq!(m.selection().station_id(), Some("TKO"));

        m.select_line("ISL").unwrap();
        assert_eq!(m.selection().line_id(), Some("ISL"));
        assert_eq!(m.selection().station_id(), None);
    }

    #[test]
    fn reselecting_same_line_still_clears_station() {
        let mut m = machine();
        m.select_line("TKL").unwrap();
        m.select_station("TKO").unwrap();
        m.select_line("TKL").unwrap();
        assert_eq!(m.selection().station_id(), None);
    }

    #[test]
    fn station_must_belong_to_selected_line() {
        let mut m = machine();
        assert!(matches!(m.select_station("TKO"), Err(NTFError::Validation(_))));

        m.select_line("ISL").unwrap();
        let err = m.select_station("TKO").unwrap_err();
        assert!(matches!(err, NTFError::StationNotOnLine { .. }));
        assert_eq!(m.selection().station_id(), None);

        assert!(matches!(m.select_line("XYZ"), Err(NTFError::UnknownLine(_))));
    }

    #[test]
    fn submit_requires_line_and_station() {
        let mut m = machine();
        assert!(matches!(m.submit(), Err(NTFError::Validation(_))));
        m.select_line("TKL").unwrap();
        assert!(matches!(m.submit(), Err(NTFError::Validation(_))));

        m.select_station("tko").unwrap();
        assert_eq!(m.submit().unwrap(), Outcome::Fetch(ScheduleKey::new("TKL", "TKO")));
        assert_eq!(m.state(), &InterchangeState::Resolved(ScheduleKey::new("TKL", "TKO")));
    }

    #[test]
    fn dropdown_submit_skips_disambiguation_at_interchange() {
        let mut m = machine();
        m.select_line("SIL").unwrap();
        m.select_station("ADM").unwrap();
        assert_eq!(m.submit().unwrap(), Outcome::Fetch(ScheduleKey::new("SIL", "ADM")));
    }

    #[test]
    fn single_line_station_resolves_directly() {
        let mut m = machine();
        let outcome = m.activate_station("DIS").unwrap();
        assert_eq!(outcome, Outcome::Fetch(ScheduleKey::new("DRL", "DIS")));
        assert!(m.pending().is_none());
        assert_eq!(m.selection().key(), Some(ScheduleKey::new("DRL", "DIS")));
    }

    #[test]
    fn interchange_awaits_choice_then_resolves() {
        let mut m = machine();
        let pending = match m.activate_station("CEN").unwrap() {
            Outcome::ChooseLine(pending) => pending,
            other => panic!("expected a line choice, got {:?}", other),
        };
        assert_eq!(pending.station_id, "CEN");
        assert_eq!(pending.candidate_lines.len(), 2);
        assert!(matches!(m.state(), InterchangeState::AwaitingInterchangeChoice(_)));

        assert_eq!(m.choose_line("2").unwrap(), Outcome::Fetch(ScheduleKey::new("ISL", "CEN")));
        assert!(m.pending().is_none());
        assert_eq!(m.selection().line_id(), Some("ISL"));
    }

    #[test]
    fn choice_by_line_id() {
        let mut m = machine();
        m.activate_station("ADM").unwrap();
        assert_eq!(m.choose_line("sil").unwrap(), Outcome::Fetch(ScheduleKey::new("SIL", "ADM")));
    }

    #[test]
    fn invalid_choice_keeps_pending() {
        let mut m = machine();
        m.activate_station("ADM").unwrap();
        assert!(matches!(m.choose_line("0"), Err(NTFError::InvalidChoice(_))));
        assert!(matches!(m.choose_line("9"), Err(NTFError::InvalidChoice(_))));
        assert!(matches!(m.choose_line("TKL"), Err(NTFError::InvalidChoice(_))));
        assert!(m.pending().is_some());
    }

    #[test]
    fn cancel_returns_to_idle_without_fetch() {
        let mut m = machine();
        m.activate_station("ADM").unwrap();
        assert_eq!(m.cancel(), Outcome::Dismissed);
        assert_eq!(m.state(), &InterchangeState::Idle);
        assert!(m.choose_line("1").is_err());
    }

    #[test]
    fn unknown_station_returns_to_idle() {
        let mut m = machine();
        m.activate_station("DIS").unwrap();
        let err = m.activate_station("ZZZ").unwrap_err();
        assert!(matches!(err, NTFError::UnknownStation(ref id) if id == "ZZZ"));
        assert_eq!(m.state(), &InterchangeState::Idle);
    }

    #[test]
    fn resolved_reenters_decision_on_new_activation() {
        let mut m = machine();
        m.activate_station("DIS").unwrap();
        assert!(matches!(m.activate_station("ADM").unwrap(), Outcome::ChooseLine(_)));
        assert!(matches!(m.activate_station("POA").unwrap(), Outcome::Fetch(_)));
    }

    #[test]
    fn new_activation_replaces_pending_choice() {
        let mut m = machine();
        m.activate_station("ADM").unwrap();
        m.activate_station("CEN").unwrap();
        assert_eq!(m.pending().map(|p| p.station_id.as_str()), Some("CEN"));
    }

    #[test]
    fn submit_dismisses_pending_choice() {
        let mut m = machine();
        m.select_line("TKL").unwrap();
        m.select_station("POA").unwrap();
        m.activate_station("ADM").unwrap();
        assert_eq!(m.submit().unwrap(), Outcome::Fetch(ScheduleKey::new("TKL", "POA")));
        assert!(m.pending().is_none());
    }
}
