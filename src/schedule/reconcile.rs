//! Turns one time slot into timed sessions.
//!
//! The text service proposes sessions per room alias. Proposals are only trusted after
//! validation: the room must be one the primary document fills, durations must be positive,
//! and a session repeated in every room collapses into a single multi-room session. Times are
//! then assigned with one running clock per target room alias.
use crate::oracle::PrimaryEntry;
use crate::oracle::ProposedSession;
use crate::oracle::RoomLegendEntry;
use crate::oracle::SlotRequest;
use crate::oracle::SupplementaryEntry;
use crate::schedule::format_minutes;
use crate::schedule::outline::extract_agenda;
use crate::schedule::outline::fallback_name;
use crate::schedule::outline::normalize_agenda_items;
use crate::schedule::rooms::columns_of;
use crate::schedule::rooms::is_combinator;
use crate::schedule::rooms::RoomAliases;
use crate::schedule::slots::TimeSlotData;
use crate::schedule::Session;
use std::collections::BTreeSet;
use std::collections::HashMap;
use tracing::debug;
use tracing::warn;

/// Builds the service request of a slot whose primary labels are already aliases
pub fn build_request(slot: &TimeSlotData, aliases: &RoomAliases) -> SlotRequest {
    SlotRequest {
        day: slot.day,
        block_start: slot.block.start.to_owned(),
        block_end: slot.block.end.to_owned(),
        block_duration: slot.block.duration,
        rooms: aliases
            .legend()
            .into_iter()
            .map(|(alias, rooms)| RoomLegendEntry { alias, rooms })
            .collect(),
        primary: slot
            .primary()
            .into_iter()
            .flat_map(|source| source.entries.iter())
            .map(|entry| PrimaryEntry { room: entry.room_label.clone(), text: entry.text.clone() })
            .collect(),
        supplementary: slot
            .supplementary()
            .flat_map(|source| {
                source.entries.iter().map(|entry| SupplementaryEntry {
                    source: source.label.clone(),
                    room: entry.room_label.clone(),
                    text: entry.text.clone(),
                })
            })
            .collect(),
    }
}

/// Positions filled by the primary document
fn primary_positions(request: &SlotRequest, aliases: &RoomAliases) -> BTreeSet<usize> {
    request.primary
        .iter()
        .filter(|entry| !entry.text.trim().is_empty())
        .filter_map(|entry| aliases.positions(&entry.room))
        .flatten()
        .collect()
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty() && !value.eq_ignore_ascii_case("null"))
}

/// Canonical alias of a proposal, repaired from a room name when needed
fn canonical_alias(proposal: &ProposedSession, aliases: &RoomAliases) -> Option<(String, Vec<usize>)> {
    let alias = match aliases.positions(&proposal.room_alias) {
        Some(_) => proposal.room_alias.trim().to_owned(),
        None => aliases.alias_for_name(&proposal.room_alias)?,
    };
    let positions = aliases.positions(&alias)?;
    let canonical = aliases.alias_for_positions(&positions).unwrap_or(alias);
    Some((canonical, positions))
}

/// Replaces a session proposed separately for each room of a combinator with one entry
fn collapse_repeated(proposals: Vec<(ProposedSession, Vec<usize>)>, aliases: &RoomAliases) -> Vec<(ProposedSession, Vec<usize>)> {
    let key = |proposal: &ProposedSession| (proposal.name.trim().to_lowercase(), proposal.duration_minutes);
    let mut collapsed: Vec<(ProposedSession, Vec<usize>)> = Vec::with_capacity(proposals.len());
    let mut absorbed: BTreeSet<usize> = BTreeSet::new();

    for (index, (proposal, positions)) in proposals.iter().enumerate() {
        if absorbed.contains(&index) {
            continue;
        }
        let siblings: Vec<usize> = proposals
            .iter()
            .enumerate()
            .filter(|(other, (candidate, candidate_positions))| {
                !absorbed.contains(other) && candidate_positions.len() == 1 && key(candidate) == key(proposal)
            })
            .map(|(other, _)| other)
            .collect();
        let union: Vec<usize> = siblings
            .iter()
            .flat_map(|other| proposals[*other].1.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let combinator = (positions.len() == 1 && union.len() > 1)
            .then(|| aliases.alias_for_positions(&union))
            .flatten()
            .filter(|alias| is_combinator(alias));
        match combinator {
            Some(alias) => {
                debug!(name = %proposal.name, %alias, "repeated session collapsed");
                absorbed.extend(siblings);
                let mut proposal = proposal.clone();
                proposal.room_alias = alias;
                collapsed.push((proposal, union));
            }
            None => collapsed.push((proposal.clone(), positions.clone())),
        }
    }
    collapsed
}

/// Keeps the proposals that respect the primary room assignment, with canonical aliases,
/// normalized agenda items and their day positions
pub fn validate(
    proposals: Vec<ProposedSession>,
    request: &SlotRequest,
    aliases: &RoomAliases,
) -> Vec<(ProposedSession, Vec<usize>)> {
    let backed = primary_positions(request, aliases);
    let mut valid = Vec::with_capacity(proposals.len());
    for mut proposal in proposals {
        if proposal.duration_minutes <= 0 || proposal.name.trim().is_empty() {
            debug!(name = %proposal.name, duration = proposal.duration_minutes, "proposal without duration dropped");
            continue;
        }
        let Some((alias, positions)) = canonical_alias(&proposal, aliases) else {
            warn!(alias = %proposal.room_alias, name = %proposal.name, "proposal for an unknown room dropped");
            continue;
        };
        if !positions.iter().all(|position| backed.contains(position)) {
            warn!(%alias, name = %proposal.name, "proposal for a room without primary content dropped");
            continue;
        }

        proposal.room_alias = alias;
        proposal.chair = clean_optional(proposal.chair);
        proposal.group_header = proposal.group_header.trim().to_owned();
        let agenda = clean_optional(proposal.agenda_item.take());
        proposal.agenda_item = match agenda {
            Some(agenda) => normalize_agenda_items(&agenda).or(Some(agenda)),
            None => {
                let (name, agenda) = extract_agenda(&proposal.name, &proposal.group_header);
                proposal.name = name;
                agenda
            }
        };
        proposal.name = proposal.name.trim().to_owned();
        valid.push((proposal, positions));
    }
    collapse_repeated(valid, aliases)
}

/// One block-long session per primary entry, titled from its first meaningful lines
pub fn fallback_sessions(request: &SlotRequest) -> Vec<ProposedSession> {
    request.primary
        .iter()
        .filter(|entry| !entry.text.trim().is_empty())
        .map(|entry| ProposedSession {
            room_alias: entry.room.clone(),
            name: fallback_name(&entry.text),
            duration_minutes: i64::from(request.block_duration),
            chair: None,
            group_header: String::new(),
            agenda_item: None,
        })
        .collect()
}

/// Assigns start and end times with one clock per target room alias, each seeded by the block
/// start and clipped to the block end
pub fn assign_times(slot: &TimeSlotData, proposals: &[(ProposedSession, Vec<usize>)]) -> Vec<Session> {
    let block_start = slot.block.start_minutes();
    let block_end = slot.block.end_minutes();
    let width = slot.rooms.len().max(1);
    let mut clocks: HashMap<String, u32> = HashMap::new();
    let mut sessions = Vec::with_capacity(proposals.len());

    for (proposal, positions) in proposals {
        let positions: Vec<usize> = positions.iter().copied().filter(|position| *position < width).collect();
        let positions = if positions.is_empty() { vec![0] } else { positions };

        let clock = clocks.entry(proposal.room_alias.to_lowercase()).or_insert(block_start);
        let start = *clock;
        let requested = u32::try_from(proposal.duration_minutes).unwrap_or(u32::MAX);
        let end = start.saturating_add(requested).min(block_end);
        if end <= start {
            warn!(day = %slot.day, block = slot.block.index, name = %proposal.name, "session beyond the block end dropped");
            continue;
        }
        *clock = end;

        let (room_col_start, room_col_end) = columns_of(&positions);
        sessions.push(Session {
            name: proposal.name.clone(),
            duration_minutes: end - start,
            start_time: format_minutes(start),
            end_time: format_minutes(end),
            day: slot.day,
            room_col_start,
            room_col_end,
            chair: proposal.chair.clone(),
            agenda_item: proposal.agenda_item.clone(),
            group_header: proposal.group_header.clone(),
        });
    }
    sessions
}

/// Reconciles one time slot.
///
/// # Arguments
///
/// * `slot` - Time slot with primary labels rewritten into aliases
/// * `aliases` - Aliases of the slot's day
/// * `propose` - Text service call; an empty answer falls back to one session per primary entry
pub fn reconcile_slot<F>(slot: &TimeSlotData, aliases: &RoomAliases, propose: F) -> Vec<Session>
where
    F: FnOnce(&SlotRequest) -> Vec<ProposedSession>,
{
    let request = build_request(slot, aliases);
    let mut proposals = validate(propose(&request), &request, aliases);
    if proposals.is_empty() {
        let fallback = fallback_sessions(&request);
        if !fallback.is_empty() {
            warn!(day = %slot.day, block = slot.block.index, "no usable sessions proposed, using cell titles");
        }
        proposals = fallback
            .into_iter()
            .map(|proposal| {
                let positions = aliases.positions(&proposal.room_alias).unwrap_or_default();
                (proposal, positions)
            })
            .collect();
    }
    assign_times(slot, &proposals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::rooms::ALL_ONLINE_ROOMS;
    use crate::schedule::slots::SlotSource;
    use crate::schedule::slots::SourceEntry;
    use crate::schedule::slots::PRIMARY_SOURCE;
    use crate::schedule::to_minutes;
    use crate::schedule::Day;
    use crate::schedule::RoomInfo;
    use crate::schedule::TIME_BLOCKS;
    use std::collections::BTreeMap;

    fn rooms() -> Vec<RoomInfo> {
        ["F1+F2+F3", "A1", "A3"]
            .iter()
            .enumerate()
            .map(|(index, name)| RoomInfo { name: name.to_string(), table_index: 0, room_index_in_table: index })
            .chain(std::iter::once(RoomInfo { name: "J1".to_owned(), table_index: 1, room_index_in_table: 0 }))
            .collect()
    }

    fn slot(entries: &[(&str, &str, &[usize])]) -> TimeSlotData {
        let mut slot = TimeSlotData {
            day: Day::Monday,
            block: TIME_BLOCKS[0],
            rooms: rooms(),
            sources: vec![SlotSource {
                label: PRIMARY_SOURCE.to_owned(),
                entries: entries
                    .iter()
                    .map(|(label, text, positions)| SourceEntry {
                        room_label: label.to_string(),
                        text: text.to_string(),
                        positions: Some(positions.to_vec()),
                    })
                    .collect(),
            }],
        };
        slot.relabel_with_aliases(&RoomAliases::new(&rooms()));
        slot
    }

    fn proposal(alias: &str, name: &str, duration: i64) -> ProposedSession {
        ProposedSession {
            room_alias: alias.to_owned(),
            name: name.to_owned(),
            duration_minutes: duration,
            chair: None,
            group_header: String::new(),
            agenda_item: None,
        }
    }

    fn times(sessions: &[Session]) -> Vec<(&str, &str, &str, usize, usize)> {
        sessions
            .iter()
            .map(|s| (s.name.as_str(), s.start_time.as_str(), s.end_time.as_str(), s.room_col_start, s.room_col_end))
            .collect()
    }

    #[test]
    fn request_lists_aliases_and_sources() {
        let mut slot = slot(&[("A1", "NTN-NR (40)", &[1])]);
        slot.sources.push(SlotSource {
            label: "Sorour's schedule".to_owned(),
            entries: vec![SourceEntry { room_label: "Room A".into(), text: "AI 9.6 R20 NTN-NR (40)".into(), positions: None }],
        });
        let request = build_request(&slot, &RoomAliases::new(&rooms()));
        assert_eq!(request.block_start, "08:30");
        assert_eq!(request.primary, vec![PrimaryEntry { room: "breakout room 1".into(), text: "NTN-NR (40)".into() }]);
        assert_eq!(request.supplementary[0].source, "Sorour's schedule");
        assert!(request.rooms.iter().any(|entry| entry.alias == ALL_ONLINE_ROOMS && entry.rooms == "F1+F2+F3 + A1 + A3"));
    }

    #[test]
    fn validation_enforces_primary_rooms() {
        let slot = slot(&[("A1", "NTN-NR (40)\nMIMO (80)", &[1]), ("J1", "A-IoT (120)", &[3])]);
        let aliases = RoomAliases::new(&rooms());
        let request = build_request(&slot, &aliases);
        let proposals = vec![
            proposal("breakout room 1", "AI 9.6 R20 NTN-NR", 40),
            proposal("A1", "MIMO", 80),
            proposal("breakout room 2", "Invented", 60),
            proposal("nowhere", "Lost", 60),
            proposal("offline room 1", "Zero", 0),
            ProposedSession { agenda_item: Some("AI 9.1.1, AI 9.1.2".into()), chair: Some("null".into()), ..proposal("offline room 1", "A-IoT", 120) },
        ];
        let valid = validate(proposals, &request, &aliases);
        let summary: Vec<(&str, &str, Option<&str>)> = valid
            .iter()
            .map(|(p, _)| (p.room_alias.as_str(), p.name.as_str(), p.agenda_item.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("breakout room 1", "R20 NTN-NR", Some("9.6")),
                ("breakout room 1", "MIMO", None),
                ("offline room 1", "A-IoT", Some("9.1.1, 9.1.2")),
            ]
        );
        assert_eq!(valid[2].0.chair, None);
    }

    #[test]
    fn all_room_session_is_emitted_once() {
        let slot = slot(&[("all", "Opening Plenary (30)", &[0, 1, 2])]);
        let aliases = RoomAliases::new(&rooms());
        let sessions = reconcile_slot(&slot, &aliases, |_| {
            vec![
                proposal("primary room", "Opening Plenary", 30),
                proposal("breakout room 1", "Opening Plenary", 30),
                proposal("breakout room 2", "Opening Plenary", 30),
            ]
        });
        assert_eq!(times(&sessions), vec![("Opening Plenary", "08:30", "09:00", 2, 5)]);
    }

    /// Sessions sharing a column range run back to back from the block start within the budget
    fn assert_contiguous_per_room(sessions: &[Session], block: &str, budget_end: &str) {
        let block_start = to_minutes(block).unwrap();
        let block_end = to_minutes(budget_end).unwrap();
        let mut by_room: BTreeMap<(usize, usize), Vec<&Session>> = BTreeMap::new();
        for session in sessions {
            by_room.entry((session.room_col_start, session.room_col_end)).or_default().push(session);
        }
        for room_sessions in by_room.values() {
            assert_eq!(to_minutes(&room_sessions[0].start_time), Some(block_start));
            for pair in room_sessions.windows(2) {
                assert_eq!(pair[0].end_time, pair[1].start_time);
            }
            let total: u32 = room_sessions.iter().map(|s| s.duration_minutes).sum();
            assert!(total <= block_end - block_start);
        }
    }

    #[test]
    fn rooms_keep_their_own_clocks() {
        let slot = slot(&[
            ("all", "Opening Plenary (30)\nAI/ML (90)\nISAC (90)", &[0, 1, 2]),
        ]);
        let aliases = RoomAliases::new(&rooms());
        let sessions = reconcile_slot(&slot, &aliases, |_| {
            vec![
                proposal(ALL_ONLINE_ROOMS, "Opening Plenary", 30),
                proposal("breakout room 1", "AI/ML", 90),
                proposal("breakout room 2", "ISAC", 60),
                proposal("breakout room 2", "ISAC overflow", 90),
            ]
        });
        assert_eq!(
            times(&sessions),
            vec![
                ("Opening Plenary", "08:30", "09:00", 2, 5),
                ("AI/ML", "08:30", "10:00", 3, 4),
                ("ISAC", "08:30", "09:30", 4, 5),
                ("ISAC overflow", "09:30", "10:30", 4, 5),
            ]
        );
        assert_eq!(sessions[3].duration_minutes, 60);
        assert_contiguous_per_room(&sessions, "08:30", "10:30");
    }

    #[test]
    fn all_room_session_after_breakout_starts_at_block_start() {
        let slot = slot(&[("all", "AI/ML (60)\nClosing (30)", &[0, 1, 2])]);
        let aliases = RoomAliases::new(&rooms());
        let sessions = reconcile_slot(&slot, &aliases, |_| {
            vec![proposal("breakout room 1", "AI/ML", 60), proposal(ALL_ONLINE_ROOMS, "Closing", 30)]
        });
        assert_eq!(
            times(&sessions),
            vec![("AI/ML", "08:30", "09:30", 3, 4), ("Closing", "08:30", "09:00", 2, 5)]
        );
        assert_contiguous_per_room(&sessions, "08:30", "10:30");
    }

    #[test]
    fn multi_agenda_answers_keep_every_identifier() {
        let slot = slot(&[("A1", "AI/ML (120)", &[1])]);
        let aliases = RoomAliases::new(&rooms());
        let sessions = reconcile_slot(&slot, &aliases, |_| {
            vec![
                ProposedSession {
                    agenda_item: Some("AI 9.1.1, 9.1.2,AI 9.1.3".into()),
                    ..proposal("breakout room 1", "R20 AI/ML", 90)
                },
                ProposedSession { agenda_item: Some("9.1.4 / 9.1.5".into()), ..proposal("breakout room 1", "LCM", 30) },
            ]
        });
        let agenda: Vec<(&str, Option<&str>)> =
            sessions.iter().map(|s| (s.name.as_str(), s.agenda_item.as_deref())).collect();
        assert_eq!(
            agenda,
            vec![("R20 AI/ML", Some("9.1.1, 9.1.2, 9.1.3")), ("LCM", Some("9.1.4, 9.1.5"))]
        );
    }

    #[test]
    fn empty_answer_falls_back_to_cell_titles() {
        let slot = slot(&[("A1", "Plenary\nsession commences at 09:00\nLS review", &[1]), ("A3", "  ", &[2])]);
        let sessions = reconcile_slot(&slot, &RoomAliases::new(&rooms()), |_| Vec::new());
        assert_eq!(times(&sessions), vec![("Plenary / LS review", "08:30", "10:30", 3, 4)]);
        assert_eq!(sessions[0].duration_minutes, 120);
    }
}
