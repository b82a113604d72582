//! End-to-end conversion of schedule documents into a meeting [`Schedule`].
//!
//! The primary document is read first and its rooms are frozen. Supplementary documents are
//! then read against that frozen room set, so they can add detail but never new rooms.
use crate::cache::KeyValueStore;
use crate::config::Config;
use crate::document::Document;
use crate::error::MeetingGridError;
use crate::error::ResultMessage;
use crate::oracle::gateway::Gateway;
use crate::oracle::ContextRoomsRequest;
use crate::schedule::categories::normalize_categories;
use crate::schedule::grid::extract;
use crate::schedule::reconcile::reconcile_slot;
use crate::schedule::rooms::build_room_list;
use crate::schedule::rooms::resolve_from_context;
use crate::schedule::rooms::KnownRooms;
use crate::schedule::rooms::RoomAliases;
use crate::schedule::rooms::RoomResolver;
use crate::schedule::slots::collect_time_slots;
use crate::schedule::slots::SupplementarySource;
use crate::schedule::Day;
use crate::schedule::RawCell;
use crate::schedule::RoomInfo;
use crate::schedule::Session;
use chrono::DateTime;
use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::info;
use tracing::warn;

/// A per-person document given as `NAME=PATH`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupplementaryInput {
    pub person: String,
    pub path: PathBuf,
}

impl FromStr for SupplementaryInput {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (person, path) = value
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=PATH, got '{}'", value))?;
        let person = person.trim();
        if person.is_empty() || path.trim().is_empty() {
            return Err(format!("expected NAME=PATH, got '{}'", value));
        }
        Ok(Self { person: person.to_owned(), path: PathBuf::from(path.trim()) })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DaySchedule {
    pub day: Day,
    pub rooms: Vec<RoomInfo>,
    pub sessions: Vec<Session>,
}

/// Normalized timetable of one meeting
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Schedule {
    pub meeting_name: String,
    pub source_file: String,
    pub generated_at: DateTime<Utc>,
    pub timezone: Option<String>,
    pub days: Vec<DaySchedule>,
}

impl Schedule {
    pub fn session_count(&self) -> usize {
        self.days.iter().map(|day| day.sessions.len()).sum()
    }
}

/// Working-group meeting tag such as `RAN1#124` from a file name, else the file stem
pub fn meeting_name(path: &Path) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"RAN\d+#\d+[a-z]?").expect("meeting pattern"));
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    pattern
        .find(&stem)
        .map(|found| found.as_str().to_owned())
        .unwrap_or(stem)
}

/// Cells and frozen rooms of the primary document
#[derive(Clone, Debug, Default)]
pub struct PrimarySchedule {
    pub cells: Vec<RawCell>,
    pub rooms: BTreeMap<Day, Vec<RoomInfo>>,
    pub known: KnownRooms,
}

/// Phase one: extracts the widest schedule tables of the primary document and names their rooms
pub fn read_primary(document: &Document, config: &Config) -> Result<PrimarySchedule, MeetingGridError> {
    let extraction = extract(document, Some(config.max_primary_tables))?;
    let tables = RoomResolver::new(document, config.color_tolerance).resolve(&extraction.layouts);
    let rooms = build_room_list(&tables);
    let known = KnownRooms::from_room_list(&rooms);
    info!(
        document = %document.name,
        tables = extraction.layouts.len(),
        cells = extraction.cells.len(),
        online = ?known.online,
        offline = ?known.offline,
        "primary schedule read"
    );
    Ok(PrimarySchedule { cells: extraction.cells, rooms, known })
}

/// Phase two: extracts every schedule table of a per-person document and names its rooms from
/// the frozen primary set
pub fn read_supplementary<S: KeyValueStore>(
    person: &str,
    document: &Document,
    known: &KnownRooms,
    config: &Config,
    gateway: &mut Gateway<S>,
) -> Result<SupplementarySource, MeetingGridError> {
    let extraction = extract(document, None)?;
    let mut tables = RoomResolver::new(document, config.color_tolerance).resolve(&extraction.layouts);
    resolve_from_context(&mut tables, known, |context, _, needed| {
        gateway.context_rooms(&ContextRoomsRequest {
            context: context.to_owned(),
            online: known.online.clone(),
            offline: known.offline.clone(),
            needed,
        })
    });
    let rooms = build_room_list(&tables);
    info!(person, document = %document.name, tables = tables.len(), cells = extraction.cells.len(), "supplementary schedule read");
    Ok(SupplementarySource { person: person.to_owned(), cells: extraction.cells, rooms })
}

/// Reconciles every time slot and normalizes the categories of the resulting sessions
pub fn assemble_sessions<S: KeyValueStore>(
    primary: &PrimarySchedule,
    supplementary: &[SupplementarySource],
    gateway: &mut Gateway<S>,
) -> Vec<Session> {
    let slots = collect_time_slots(&primary.cells, &primary.rooms, supplementary);
    info!(slots = slots.len(), sources = supplementary.len() + 1, "time slots collected");

    let mut aliases_by_day: BTreeMap<Day, RoomAliases> = BTreeMap::new();
    let mut sessions = Vec::new();
    for mut slot in slots {
        let aliases = aliases_by_day
            .entry(slot.day)
            .or_insert_with(|| RoomAliases::new(&slot.rooms));
        slot.relabel_with_aliases(aliases);
        let found = reconcile_slot(&slot, aliases, |request| gateway.slot_sessions(request));
        info!(day = %slot.day, start = slot.block.start, sessions = found.len(), "time slot reconciled");
        sessions.extend(found);
    }

    let mapping = normalize_categories(&mut sessions, |labels| gateway.category_mapping(labels));
    if !mapping.is_empty() {
        info!(?mapping, "category mapping");
    }
    sessions
}

/// Groups sessions by day in chronological then column order
pub fn group_by_day(rooms: &BTreeMap<Day, Vec<RoomInfo>>, sessions: Vec<Session>) -> Vec<DaySchedule> {
    let mut days: BTreeMap<Day, DaySchedule> = rooms
        .iter()
        .map(|(day, rooms)| (*day, DaySchedule { day: *day, rooms: rooms.clone(), sessions: Vec::new() }))
        .collect();
    for session in sessions {
        days.entry(session.day)
            .or_insert_with(|| DaySchedule { day: session.day, rooms: Vec::new(), sessions: Vec::new() })
            .sessions
            .push(session);
    }
    let mut days: Vec<DaySchedule> = days.into_values().collect();
    for day in days.iter_mut() {
        day.sessions.sort_by(|a, b| (&a.start_time, a.room_col_start).cmp(&(&b.start_time, b.room_col_start)));
    }
    days
}

/// Converts parsed documents into a schedule.
///
/// # Arguments
///
/// * `source` - Path of the primary document, used for the meeting name
/// * `primary` - Authoritative schedule document
/// * `supplementary` - Per-person documents as (person, document)
/// * `config` - Runtime settings
/// * `gateway` - Text service access
pub fn build_schedule<S: KeyValueStore>(
    source: &Path,
    primary: &Document,
    supplementary: &[(String, Document)],
    config: &Config,
    gateway: &mut Gateway<S>,
) -> Result<Schedule, MeetingGridError> {
    let primary_schedule = read_primary(primary, config).with_prefix(&primary.name)?;

    let mut sources = Vec::with_capacity(supplementary.len());
    for (person, document) in supplementary {
        match read_supplementary(person, document, &primary_schedule.known, config, gateway) {
            Ok(source) => sources.push(source),
            Err(error) => warn!(person = %person, document = %document.name, %error, "supplementary document skipped"),
        }
    }

    let timezone = primary.location_line().and_then(|location| gateway.timezone(location));
    let sessions = assemble_sessions(&primary_schedule, &sources, gateway);
    let schedule = Schedule {
        meeting_name: meeting_name(source),
        source_file: source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string()),
        generated_at: Utc::now(),
        timezone,
        days: group_by_day(&primary_schedule.rooms, sessions),
    };
    info!(
        meeting = %schedule.meeting_name,
        days = schedule.days.len(),
        sessions = schedule.session_count(),
        calls = gateway.calls(),
        cache_hits = gateway.cache_hits(),
        "schedule built"
    );
    Ok(schedule)
}

/// Opens every document and builds the schedule; unreadable supplementary documents are skipped
pub fn run<S: KeyValueStore>(
    primary: &Path,
    supplementary: &[SupplementaryInput],
    config: &Config,
    gateway: &mut Gateway<S>,
) -> Result<Schedule, MeetingGridError> {
    let document = Document::open(primary).with_prefix(&primary.display().to_string())?;

    let mut documents = Vec::with_capacity(supplementary.len());
    for input in supplementary {
        match Document::open(&input.path) {
            Ok(document) => documents.push((input.person.clone(), document)),
            Err(error) => warn!(person = %input.person, path = %input.path.display(), %error, "supplementary document skipped"),
        }
    }
    build_schedule(primary, &document, &documents, config, gateway)
}

/// Writes the schedule as pretty-printed JSON
pub fn write_schedule(schedule: &Schedule, path: &Path) -> Result<(), MeetingGridError> {
    let json = serde_json::to_string_pretty(schedule)?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json).map_err(MeetingGridError::from).with_prefix(&path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::document::Row;
    use crate::document::Table;
    use crate::document::TableCell;
    use crate::oracle::gateway::CallPolicy;
    use crate::oracle::local::LocalOracle;

    fn row(cells: &[(&str, usize)]) -> Row {
        Row::new(cells.iter().map(|(text, span)| TableCell::new(text, *span)).collect())
    }

    fn primary_document() -> Document {
        let schedule = Table {
            grid_cols: 3,
            context: "RAN1#124 Online Session Schedule".to_owned(),
            rows: vec![
                row(&[("Time", 1), ("Monday", 2)]),
                row(&[("8:30\n~\n10:30", 1), ("6GR (120)", 1), ("AI/ML (120)", 1)]),
                row(&[("Coffee Break", 3)]),
                row(&[("11:00", 1), ("R20 (80)\nNTN-NR (40)\nNTN-IoT (40)", 1), ("MIMO (120)", 1)]),
                row(&[("Lunch", 3)]),
            ],
        };
        let legend = Table {
            grid_cols: 1,
            context: String::new(),
            rows: vec![row(&[("RAN1 Meeting Rooms:\nMain session (F1/2/3)\nRAN1_Brk#1 (A1)", 1)])],
        };
        Document { name: "primary.docx".to_owned(), tables: vec![schedule, legend], ..Default::default() }
    }

    fn vice_chair_document() -> Document {
        let schedule = Table {
            grid_cols: 2,
            context: "RAN1_Brk#1 (A1) detailed schedule".to_owned(),
            rows: vec![
                row(&[("Time", 1), ("Monday", 1)]),
                row(&[("8:30", 1), ("AI 9.1 R20 AI/ML (120)\n.AI 9.1.1 (60)\n.AI 9.1.2 (60)", 1)]),
                row(&[("Coffee Break", 2)]),
                row(&[("11:00", 1), ("AI 9.6 R20 NTN-NR (40)", 1)]),
                row(&[("Lunch", 2)]),
            ],
        };
        Document { name: "sorour.docx".to_owned(), tables: vec![schedule], ..Default::default() }
    }

    fn gateway(store: MemoryStore) -> Gateway<MemoryStore> {
        let config = Config::default();
        Gateway::new(Box::new(LocalOracle::new(&config.chairs)), store, CallPolicy::immediate())
    }

    fn summary(schedule: &Schedule) -> Vec<(String, String, String, usize)> {
        schedule.days[0]
            .sessions
            .iter()
            .map(|s| (s.name.clone(), s.start_time.clone(), s.end_time.clone(), s.room_col_start))
            .collect()
    }

    #[test]
    fn supplementary_inputs_parse() {
        let input: SupplementaryInput = "Sorour=docs/sorour.docx".parse().unwrap();
        assert_eq!(input, SupplementaryInput { person: "Sorour".to_owned(), path: PathBuf::from("docs/sorour.docx") });
        assert!("docs/sorour.docx".parse::<SupplementaryInput>().is_err());
        assert!("=x.docx".parse::<SupplementaryInput>().is_err());
    }

    #[test]
    fn meeting_names_come_from_file_names() {
        assert_eq!(meeting_name(Path::new("in/Chair_notes_RAN1#124_v3.docx")), "RAN1#124");
        assert_eq!(meeting_name(Path::new("in/schedule.docx")), "schedule");
    }

    #[test]
    fn documents_merge_into_one_schedule() {
        let config = Config::default();
        let supplementary = vec![("Sorour".to_owned(), vice_chair_document())];
        let mut gateway = gateway(MemoryStore::default());
        let schedule = build_schedule(
            Path::new("RAN1#124_schedule.docx"),
            &primary_document(),
            &supplementary,
            &config,
            &mut gateway,
        )
        .unwrap();

        assert_eq!(schedule.meeting_name, "RAN1#124");
        assert_eq!(schedule.timezone, None);
        assert_eq!(schedule.days.len(), 1);
        let rooms: Vec<&str> = schedule.days[0].rooms.iter().map(|room| room.name.as_str()).collect();
        assert_eq!(rooms, vec!["F1/2/3", "A1"]);
        assert_eq!(
            summary(&schedule),
            vec![
                ("6GR".to_owned(), "08:30".to_owned(), "10:30".to_owned(), 2),
                ("AI 9.1.1".to_owned(), "08:30".to_owned(), "09:30".to_owned(), 3),
                ("AI 9.1.2".to_owned(), "09:30".to_owned(), "10:30".to_owned(), 3),
                ("R20 NTN-NR".to_owned(), "11:00".to_owned(), "11:40".to_owned(), 2),
                ("MIMO".to_owned(), "11:00".to_owned(), "13:00".to_owned(), 3),
                ("NTN-IoT".to_owned(), "11:40".to_owned(), "12:20".to_owned(), 2),
            ]
        );
        let enriched = &schedule.days[0].sessions[3];
        assert_eq!(enriched.agenda_item.as_deref(), Some("9.6"));
        assert_eq!(enriched.group_header, "R20");
    }

    #[test]
    fn second_run_is_served_from_the_store() {
        let config = Config::default();
        let supplementary = vec![("Sorour".to_owned(), vice_chair_document())];
        let source = Path::new("RAN1#124_schedule.docx");

        let mut first = gateway(MemoryStore::default());
        let expected = build_schedule(source, &primary_document(), &supplementary, &config, &mut first).unwrap();
        assert!(first.calls() > 0);

        let mut second = gateway(first.into_store());
        let schedule = build_schedule(source, &primary_document(), &supplementary, &config, &mut second).unwrap();
        assert_eq!(second.calls(), 0);
        assert_eq!(schedule.days, expected.days);
    }

    #[test]
    fn unusable_supplementary_documents_are_skipped() {
        let config = Config::default();
        let broken = Document { name: "empty.docx".to_owned(), ..Default::default() };
        let mut gateway = gateway(MemoryStore::default());
        let schedule = build_schedule(
            Path::new("schedule.docx"),
            &primary_document(),
            &[("Hiroki".to_owned(), broken)],
            &config,
            &mut gateway,
        )
        .unwrap();
        assert_eq!(schedule.session_count(), 5);
    }

    #[test]
    fn primary_without_schedule_tables_fails() {
        let config = Config::default();
        let empty = Document { name: "empty.docx".to_owned(), ..Default::default() };
        let mut gateway = gateway(MemoryStore::default());
        let error = build_schedule(Path::new("empty.docx"), &empty, &[], &config, &mut gateway).unwrap_err();
        assert!(error.to_string().starts_with("empty.docx: "));
    }

    #[test]
    fn schedules_are_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("schedule.json");
        let schedule = Schedule {
            meeting_name: "RAN1#124".to_owned(),
            source_file: "RAN1#124.docx".to_owned(),
            generated_at: Utc::now(),
            timezone: Some("Asia/Kolkata".to_owned()),
            days: Vec::new(),
        };
        write_schedule(&schedule, &path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["meeting_name"], "RAN1#124");
        assert_eq!(value["timezone"], "Asia/Kolkata");
    }
}
