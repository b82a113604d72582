//! Groups the cells of every source document by (day, time block).
use crate::schedule::rooms::RoomAliases;
use crate::schedule::rooms::ROOM_SEPARATOR;
use crate::schedule::Day;
use crate::schedule::RawCell;
use crate::schedule::RoomInfo;
use crate::schedule::TimeBlock;
use crate::schedule::TIME_BLOCKS;
use std::collections::BTreeMap;
use std::collections::HashSet;

/// Label of the authoritative source
pub const PRIMARY_SOURCE: &str = "primary";

/// One cell of one source
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceEntry {
    pub room_label: String,
    pub text: String,
    /// Positions in the day's primary room list, known for primary entries only
    pub positions: Option<Vec<usize>>,
}

/// All cells of one source document within a time slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotSource {
    pub label: String,
    pub entries: Vec<SourceEntry>,
}

impl SlotSource {
    pub fn is_primary(&self) -> bool {
        self.label == PRIMARY_SOURCE
    }
}

/// Everything known about one (day, time block)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeSlotData {
    pub day: Day,
    pub block: TimeBlock,
    /// Primary room list of the day
    pub rooms: Vec<RoomInfo>,
    /// Primary source first
    pub sources: Vec<SlotSource>,
}

impl TimeSlotData {
    pub fn primary(&self) -> Option<&SlotSource> {
        self.sources.first().filter(|source| source.is_primary())
    }

    pub fn supplementary(&self) -> impl Iterator<Item = &SlotSource> {
        self.sources.iter().filter(|source| !source.is_primary())
    }

    /// Rewrites primary room labels into position-derived aliases
    pub fn relabel_with_aliases(&mut self, aliases: &RoomAliases) {
        for source in self.sources.iter_mut().filter(|source| source.is_primary()) {
            for entry in source.entries.iter_mut() {
                let alias = entry
                    .positions
                    .as_deref()
                    .and_then(|positions| aliases.alias_for_positions(positions));
                if let Some(alias) = alias {
                    entry.room_label = alias;
                }
            }
        }
    }
}

/// Cells and rooms of one supplementary (per-person) document
#[derive(Clone, Debug, Default)]
pub struct SupplementarySource {
    pub person: String,
    pub cells: Vec<RawCell>,
    pub rooms: BTreeMap<Day, Vec<RoomInfo>>,
}

impl SupplementarySource {
    pub fn label(&self) -> String {
        format!("{}'s schedule", self.person)
    }
}

fn index_list(indices: &[usize]) -> String {
    indices.iter().map(|index| index.to_string()).collect::<Vec<_>>().join(", ")
}

/// Readable room label of a cell and the day positions it covers
pub fn room_label_for_cell(cell: &RawCell, rooms: &[RoomInfo]) -> (String, Option<Vec<usize>>) {
    if rooms.is_empty() {
        return (format!("Room [{}]", index_list(&cell.rooms)), None);
    }
    let positions: Vec<usize> = rooms
        .iter()
        .enumerate()
        .filter(|(_, room)| room.table_index == cell.table && cell.rooms.contains(&room.room_index_in_table))
        .map(|(position, _)| position)
        .collect();
    if positions.is_empty() {
        return (format!("Table {} Room [{}]", cell.table, index_list(&cell.rooms)), None);
    }
    let label = positions
        .iter()
        .map(|position| rooms[*position].name.as_str())
        .collect::<Vec<_>>()
        .join(ROOM_SEPARATOR);
    (label, Some(positions))
}

fn group_by_slot(cells: &[RawCell]) -> BTreeMap<(Day, usize), Vec<&RawCell>> {
    let mut groups: BTreeMap<(Day, usize), Vec<&RawCell>> = BTreeMap::new();
    for cell in cells {
        groups.entry((cell.day, cell.block)).or_default().push(cell);
    }
    groups
}

/// Builds one record per (day, time block) present in the primary cells, ordered by day and block.
///
/// Supplementary entries repeating a primary text are dropped. Supplementary labels that equal a
/// primary room name are prefixed with the person so they are not taken as room assignments.
pub fn collect_time_slots(
    primary_cells: &[RawCell],
    primary_rooms: &BTreeMap<Day, Vec<RoomInfo>>,
    supplementary: &[SupplementarySource],
) -> Vec<TimeSlotData> {
    let supplementary_groups: Vec<_> = supplementary
        .iter()
        .map(|source| (source, group_by_slot(&source.cells)))
        .collect();

    let mut slots = Vec::new();
    for ((day, block), cells) in group_by_slot(primary_cells) {
        let Some(time_block) = TIME_BLOCKS.get(block) else {
            continue;
        };
        let rooms = primary_rooms.get(&day).cloned().unwrap_or_default();

        let primary = SlotSource {
            label: PRIMARY_SOURCE.to_owned(),
            entries: cells
                .iter()
                .map(|cell| {
                    let (room_label, positions) = room_label_for_cell(cell, &rooms);
                    SourceEntry { room_label, text: cell.text.clone(), positions }
                })
                .collect(),
        };
        let mut sources = vec![primary];

        let primary_texts: HashSet<&str> = cells.iter().map(|cell| cell.text.trim()).collect();
        let primary_names: HashSet<&str> = rooms.iter().map(|room| room.name.as_str()).collect();
        for (source, groups) in &supplementary_groups {
            let Some(cells) = groups.get(&(day, block)) else {
                continue;
            };
            let day_rooms = source.rooms.get(&day).map(Vec::as_slice).unwrap_or_default();
            let entries: Vec<SourceEntry> = cells
                .iter()
                .filter(|cell| !primary_texts.contains(cell.text.trim()))
                .map(|cell| {
                    let (label, _) = room_label_for_cell(cell, day_rooms);
                    let room_label = if primary_names.contains(label.as_str()) {
                        format!("{}: {}", source.person, label)
                    } else {
                        label
                    };
                    SourceEntry { room_label, text: cell.text.clone(), positions: None }
                })
                .collect();
            if !entries.is_empty() {
                sources.push(SlotSource { label: source.label(), entries });
            }
        }

        slots.push(TimeSlotData { day, block: *time_block, rooms, sources });
    }
    slots
}
