//! Room naming for schedule tables.
//!
//! Each (table, day) gets its names from the first strategy that yields enough of them:
//! colored label shapes matched against the cell shading, the "Meeting Rooms" legend, and
//! finally synthetic placeholders. Supplementary documents may then replace placeholders using
//! the heading above the table and the frozen room set of the primary document.
//!
//! Downstream stages address rooms by [`RoomAliases`], which derive from table and position
//! only, so that merge logic never depends on the physical room names of a meeting.
use crate::document::Document;
use crate::document::Shape;
use crate::document::Table;
use crate::helpers::color::dedup_near;
use crate::helpers::color::Rgb;
use crate::schedule::grid::cells_in_day;
use crate::schedule::grid::data_rows;
use crate::schedule::grid::dedupe_row;
use crate::schedule::grid::DayLayout;
use crate::schedule::grid::TableLayout;
use crate::schedule::grid::LEGEND_MARKER;
use crate::schedule::Day;
use crate::schedule::RoomInfo;
use regex::Regex;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::debug;
use tracing::info;
use tracing::warn;

pub const PRIMARY_ROOM: &str = "primary room";
pub const ALL_ONLINE_ROOMS: &str = "all online rooms";
pub const ALL_ROOMS: &str = "all rooms";
/// Separator of multi-room labels and composite aliases
pub const ROOM_SEPARATOR: &str = " + ";

const OFFLINE_MARKER: &str = "offline";

/// Where the names of a (table, day) came from
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NameSource {
    Colors,
    Legend,
    Placeholder,
    Context,
}

/// Room names of one day of one table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DayRooms {
    pub day: Day,
    pub names: Vec<String>,
    pub source: NameSource,
}

/// Resolved room names of one schedule table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableRooms {
    pub table: usize,
    pub context: String,
    pub days: Vec<DayRooms>,
}

impl TableRooms {
    pub fn has_placeholders(&self) -> bool {
        self.days.iter().any(|day| day.source == NameSource::Placeholder)
    }
}

/// Room names listed under "Meeting Rooms" legend headers
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Legend {
    pub online: Vec<String>,
    pub offline: Vec<String>,
}

impl Legend {
    /// Scans every table for a cell carrying the legend marker
    pub fn find(document: &Document) -> Option<Legend> {
        document.tables
            .iter()
            .flat_map(|table| table.rows.iter())
            .flat_map(dedupe_row)
            .find(|cell| cell.text.to_lowercase().contains(LEGEND_MARKER))
            .map(|cell| Legend::parse(&cell.text))
    }

    /// Splits legend text into blocks at each header line. A block is offline when any of its
    /// lines mentions "offline".
    pub fn parse(text: &str) -> Legend {
        let mut blocks: Vec<(bool, Vec<String>)> = Vec::new();
        for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let lower = line.to_lowercase();
            let offline = lower.contains(OFFLINE_MARKER);
            if lower.contains(LEGEND_MARKER) || blocks.is_empty() {
                blocks.push((offline, Vec::new()));
                if lower.contains(LEGEND_MARKER) {
                    continue;
                }
            }
            if let Some((block_offline, names)) = blocks.last_mut() {
                *block_offline |= offline;
                names.push(room_code(line));
            }
        }

        let mut legend = Legend::default();
        for (offline, names) in blocks {
            if offline {
                legend.offline.extend(names);
            } else {
                legend.online.extend(names);
            }
        }
        legend
    }
}

/// Text after the last comma inside the last parenthesis, or the whole line
fn room_code(line: &str) -> String {
    let inner = line
        .rfind('(')
        .map(|open| &line[open + 1..])
        .map(|rest| rest.split(')').next().unwrap_or(rest));
    match inner {
        Some(inner) => inner.rsplit(',').next().unwrap_or(inner).trim().to_owned(),
        None => line.trim().to_owned(),
    }
}

/// Placeholder names, `Room A`, `Room B`... for the primary table and `Offline A`... otherwise
pub fn placeholder_names(table: usize, count: usize) -> Vec<String> {
    let prefix = if table == 0 { "Room" } else { "Offline" };
    (0..count)
        .map(|index| match u8::try_from(index).ok().filter(|index| *index < 26) {
            Some(letter) => format!("{} {}", prefix, char::from(b'A' + letter)),
            None => format!("{} {}", prefix, index + 1),
        })
        .collect()
}

/// Matches cell shading against colored label shapes
fn names_from_colors(table: &Table, day: &DayLayout, shapes: &[Shape], tolerance: u8) -> Option<Vec<String>> {
    if shapes.is_empty() {
        return None;
    }
    let fills: Vec<Rgb> = data_rows(table)
        .map(|(_, cells)| cells_in_day(&cells, day).iter().map(|cell| cell.fill).collect::<Vec<_>>())
        .filter(|fills| fills.len() == day.rooms)
        .find_map(|fills| fills.into_iter().collect::<Option<Vec<Rgb>>>())?;

    let names: Vec<String> = dedup_near(&fills, tolerance)
        .iter()
        .filter_map(|color| shapes.iter().find(|shape| shape.fill.is_near(color, tolerance)))
        .map(|shape| shape.label.replace('\n', " "))
        .collect();
    (names.len() == day.rooms).then_some(names)
}

fn names_from_legend(legend: Option<&Legend>, table: usize, rooms: usize) -> Option<Vec<String>> {
    let candidates = match table {
        0 => &legend?.online,
        _ => &legend?.offline,
    };
    (candidates.len() >= rooms).then(|| candidates[..rooms].to_vec())
}

/// Names the room columns of every extracted table
pub struct RoomResolver<'a> {
    document: &'a Document,
    legend: Option<Legend>,
    tolerance: u8,
}

impl<'a> RoomResolver<'a> {
    pub fn new(document: &'a Document, tolerance: u8) -> Self {
        Self {
            document,
            legend: Legend::find(document),
            tolerance,
        }
    }

    fn resolve_day(&self, layout: &TableLayout, day: &DayLayout) -> DayRooms {
        let table = &self.document.tables[layout.source_index];
        let (names, source) = names_from_colors(table, day, &self.document.shapes, self.tolerance)
            .map(|names| (names, NameSource::Colors))
            .or_else(|| {
                names_from_legend(self.legend.as_ref(), layout.table, day.rooms)
                    .map(|names| (names, NameSource::Legend))
            })
            .unwrap_or_else(|| (placeholder_names(layout.table, day.rooms), NameSource::Placeholder));
        debug!(table = layout.table, day = %day.day, ?source, ?names, "room names");
        DayRooms { day: day.day, names, source }
    }

    pub fn resolve(&self, layouts: &[TableLayout]) -> Vec<TableRooms> {
        layouts
            .iter()
            .map(|layout| TableRooms {
                table: layout.table,
                context: layout.context.clone(),
                days: layout.days.iter().map(|day| self.resolve_day(layout, day)).collect(),
            })
            .collect()
    }
}

/// Ordered room list per day across all tables
pub fn build_room_list(tables: &[TableRooms]) -> BTreeMap<Day, Vec<RoomInfo>> {
    let mut rooms: BTreeMap<Day, Vec<RoomInfo>> = BTreeMap::new();
    for table in tables {
        for day in &table.days {
            let list = rooms.entry(day.day).or_default();
            for (index, name) in day.names.iter().enumerate() {
                list.push(RoomInfo {
                    name: name.clone(),
                    table_index: table.table,
                    room_index_in_table: index,
                });
            }
        }
    }
    rooms
}

/// Room names of the primary document, frozen before supplementary documents are read
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KnownRooms {
    pub online: Vec<String>,
    pub offline: Vec<String>,
}

impl KnownRooms {
    pub fn from_room_list(rooms: &BTreeMap<Day, Vec<RoomInfo>>) -> Self {
        let mut known = KnownRooms::default();
        for room in rooms.values().flatten() {
            let list = if room.table_index == 0 { &mut known.online } else { &mut known.offline };
            if !list.contains(&room.name) {
                list.push(room.name.clone());
            }
        }
        known
    }

    pub fn all(&self) -> Vec<String> {
        self.online.iter().chain(self.offline.iter()).cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty() && self.offline.is_empty()
    }
}

/// Lowercase room-code tokens, with shorthand such as `F1/2/3` expanded to `f1 f2 f3`
fn room_tokens(text: &str) -> BTreeSet<String> {
    static SHORTHAND: OnceLock<Regex> = OnceLock::new();
    let shorthand = SHORTHAND.get_or_init(|| {
        Regex::new(r"([A-Za-z]+)(\d+)((?:/\d+)+)").expect("shorthand pattern")
    });
    let expanded = shorthand.replace_all(text, |captures: &regex::Captures| {
        let prefix = &captures[1];
        std::iter::once(&captures[2])
            .chain(captures[3].split('/').filter(|digits| !digits.is_empty()))
            .map(|digits| format!("{}{}", prefix, digits))
            .collect::<Vec<_>>()
            .join(" ")
    });
    expanded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Known rooms whose every code token appears in the heading
fn rooms_by_code(context: &str, known: &KnownRooms, _needed: usize) -> Option<Vec<String>> {
    let tokens = room_tokens(context);
    let names: Vec<String> = known
        .all()
        .into_iter()
        .filter(|name| {
            let codes = room_tokens(name);
            !codes.is_empty() && codes.is_subset(&tokens)
        })
        .collect();
    (!names.is_empty()).then_some(names)
}

/// `Brk#N` names the N-th breakout room, which follows the main room in the online list
fn rooms_by_breakout_number(context: &str, known: &KnownRooms, _needed: usize) -> Option<Vec<String>> {
    static BREAKOUT: OnceLock<Regex> = OnceLock::new();
    let breakout = BREAKOUT.get_or_init(|| Regex::new(r"(?i)brk\s*#?\s*(\d+)").expect("breakout pattern"));
    let mut names: Vec<String> = Vec::new();
    for captures in breakout.captures_iter(context) {
        let Ok(number) = captures[1].parse::<usize>() else {
            continue;
        };
        if let Some(name) = known.online.get(number) {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    (!names.is_empty()).then_some(names)
}

fn rooms_by_offline_phrase(context: &str, known: &KnownRooms, needed: usize) -> Option<Vec<String>> {
    if !context.to_lowercase().contains(OFFLINE_MARKER) || known.offline.is_empty() {
        return None;
    }
    Some(known.offline.iter().take(needed).cloned().collect())
}

fn rooms_by_online_phrase(context: &str, known: &KnownRooms, needed: usize) -> Option<Vec<String>> {
    let lower = context.to_lowercase();
    if !(lower.contains("online") || lower.contains("main session")) || known.online.is_empty() {
        return None;
    }
    Some(known.online.iter().take(needed).cloned().collect())
}

/// Deterministic context match: the first rule producing exactly `needed` names wins,
/// otherwise the first partial result is returned
pub fn match_context_rooms(context: &str, known: &KnownRooms, needed: usize) -> Option<Vec<String>> {
    if context.trim().is_empty() || needed == 0 {
        return None;
    }
    let rules = [
        rooms_by_code,
        rooms_by_breakout_number,
        rooms_by_offline_phrase,
        rooms_by_online_phrase,
    ];
    let mut partial: Option<Vec<String>> = None;
    for rule in rules {
        match rule(context, known, needed) {
            Some(names) if names.len() == needed => return Some(names),
            Some(names) if partial.is_none() && names.len() < needed => partial = Some(names),
            _ => (),
        }
    }
    partial
}

/// Detected names padded with the original names up to the original count
pub fn pad_with_originals(detected: &[String], originals: &[String]) -> Vec<String> {
    detected
        .iter()
        .chain(originals.iter().skip(detected.len()))
        .take(originals.len())
        .cloned()
        .collect()
}

/// Replaces placeholder names of supplementary tables using the heading above each table.
///
/// # Arguments
///
/// * `tables` - Resolved tables of a supplementary document
/// * `known` - Frozen rooms of the primary document
/// * `fallback` - Consulted when the deterministic pass does not produce exactly enough names;
///   receives the heading, the available room names and the number of names needed
pub fn resolve_from_context<F>(tables: &mut [TableRooms], known: &KnownRooms, mut fallback: F)
where
    F: FnMut(&str, &[String], usize) -> Option<Vec<String>>,
{
    if known.is_empty() {
        return;
    }
    let available = known.all();
    for table in tables.iter_mut().filter(|table| table.has_placeholders()) {
        if table.context.trim().is_empty() {
            warn!(table = table.table, "placeholder room names and no heading to resolve them");
            continue;
        }
        for day in table.days.iter_mut().filter(|day| day.source == NameSource::Placeholder) {
            let needed = day.names.len();
            let fast = match_context_rooms(&table.context, known, needed);
            let detected = match fast {
                Some(names) if names.len() == needed => Some(names),
                fast => fallback(&table.context, &available, needed)
                    .map(|names| names.into_iter().filter(|name| available.contains(name)).collect::<Vec<_>>())
                    .filter(|names| !names.is_empty())
                    .or(fast),
            };
            let Some(detected) = detected else {
                continue;
            };
            let names = pad_with_originals(&detected, &day.names);
            info!(table = table.table, day = %day.day, from = ?day.names, to = ?names, "rooms resolved from heading");
            day.names = names;
            day.source = NameSource::Context;
        }
    }
}

/// A stable, position-derived room identifier
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomAlias {
    pub alias: String,
    /// Positions in the day's room list
    pub positions: Vec<usize>,
}

/// Aliases of one day's rooms
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoomAliases {
    rooms: Vec<RoomInfo>,
    aliases: Vec<RoomAlias>,
}

impl RoomAliases {
    /// `primary room` and `breakout room N` for the primary table, `offline room N` for the
    /// others, followed by the `all online rooms` and `all rooms` combinators
    pub fn new(rooms: &[RoomInfo]) -> Self {
        let mut aliases = Vec::with_capacity(rooms.len() + 2);
        let mut online = Vec::new();
        let mut offline = 0usize;
        for (position, room) in rooms.iter().enumerate() {
            let alias = if room.table_index == 0 {
                online.push(position);
                match room.room_index_in_table {
                    0 => PRIMARY_ROOM.to_owned(),
                    index => format!("breakout room {}", index),
                }
            } else {
                offline += 1;
                format!("offline room {}", offline)
            };
            aliases.push(RoomAlias { alias, positions: vec![position] });
        }
        aliases.push(RoomAlias { alias: ALL_ONLINE_ROOMS.to_owned(), positions: online });
        aliases.push(RoomAlias { alias: ALL_ROOMS.to_owned(), positions: (0..rooms.len()).collect() });
        Self { rooms: rooms.to_vec(), aliases }
    }

    pub fn rooms(&self) -> &[RoomInfo] {
        &self.rooms
    }

    pub fn aliases(&self) -> &[RoomAlias] {
        &self.aliases
    }

    /// Single-room aliases only
    pub fn room_aliases(&self) -> impl Iterator<Item = &RoomAlias> {
        self.aliases.iter().filter(|alias| alias.positions.len() == 1 && !is_combinator(&alias.alias))
    }

    fn lookup(&self, alias: &str) -> Option<&RoomAlias> {
        let alias = alias.trim();
        self.aliases.iter().find(|candidate| candidate.alias.eq_ignore_ascii_case(alias))
    }

    /// Positions covered by an alias, composite aliases joined with ` + ` included
    pub fn positions(&self, alias: &str) -> Option<Vec<usize>> {
        let mut positions: Vec<usize> = Vec::new();
        for part in alias.split(ROOM_SEPARATOR.trim()) {
            positions.extend(&self.lookup(part)?.positions);
        }
        positions.sort_unstable();
        positions.dedup();
        (!positions.is_empty()).then_some(positions)
    }

    /// Room names of an alias joined with ` + `
    pub fn label(&self, alias: &str) -> Option<String> {
        let positions = self.positions(alias)?;
        Some(self.label_of(&positions))
    }

    fn label_of(&self, positions: &[usize]) -> String {
        positions
            .iter()
            .filter_map(|position| self.rooms.get(*position))
            .map(|room| room.name.as_str())
            .collect::<Vec<_>>()
            .join(ROOM_SEPARATOR)
    }

    /// 1-indexed grid column range of an alias; column 1 holds the time labels
    pub fn columns(&self, alias: &str) -> Option<(usize, usize)> {
        self.positions(alias).map(|positions| columns_of(&positions))
    }

    /// Alias naming exactly the given positions
    pub fn alias_for_positions(&self, positions: &[usize]) -> Option<String> {
        let mut positions = positions.to_vec();
        positions.sort_unstable();
        positions.dedup();
        if positions.is_empty() {
            return None;
        }
        for combinator in [ALL_ONLINE_ROOMS, ALL_ROOMS] {
            if self.lookup(combinator).is_some_and(|alias| alias.positions == positions) {
                return Some(combinator.to_owned());
            }
        }
        let parts: Option<Vec<&str>> = positions
            .iter()
            .map(|position| {
                self.room_aliases()
                    .find(|alias| alias.positions[0] == *position)
                    .map(|alias| alias.alias.as_str())
            })
            .collect();
        parts.map(|parts| parts.join(ROOM_SEPARATOR))
    }

    /// Alias of a room referred to by its display name, exact match first, then containment
    pub fn alias_for_name(&self, name: &str) -> Option<String> {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return None;
        }
        let labels: Vec<(String, String)> = self.aliases
            .iter()
            .map(|alias| (alias.alias.clone(), self.label_of(&alias.positions).to_lowercase()))
            .filter(|(_, label)| !label.is_empty())
            .collect();
        labels
            .iter()
            .find(|(_, label)| *label == name)
            .or_else(|| {
                self.room_aliases()
                    .map(|alias| (alias.alias.clone(), self.label_of(&alias.positions).to_lowercase()))
                    .find(|(_, label)| !label.is_empty() && (name.contains(label.as_str()) || label.contains(&name)))
                    .and_then(|(alias, _)| labels.iter().find(|(candidate, _)| *candidate == alias))
            })
            .map(|(alias, _)| alias.clone())
    }

    /// `alias: names` lines describing every alias
    pub fn legend(&self) -> Vec<(String, String)> {
        self.aliases
            .iter()
            .filter(|alias| !alias.positions.is_empty())
            .map(|alias| (alias.alias.clone(), self.label_of(&alias.positions)))
            .collect()
    }
}

pub fn is_combinator(alias: &str) -> bool {
    alias.eq_ignore_ascii_case(ALL_ONLINE_ROOMS) || alias.eq_ignore_ascii_case(ALL_ROOMS)
}

/// Grid columns `(first + 2, last + 3)` of sorted positions, `(2, 3)` when empty
pub fn columns_of(positions: &[usize]) -> (usize, usize) {
    match (positions.iter().min(), positions.iter().max()) {
        (Some(first), Some(last)) => (first + 2, last + 3),
        _ => (2, 3),
    }
}
