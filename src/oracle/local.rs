//! Deterministic text service used offline and as a baseline.
use crate::oracle::ContextRoomsRequest;
use crate::oracle::OracleError;
use crate::oracle::ProposedSession;
use crate::oracle::SlotRequest;
use crate::oracle::TextOracle;
use crate::schedule::outline::parse_items;
use crate::schedule::outline::OutlineParser;
use crate::schedule::outline::OutlineSession;
use crate::schedule::outline::HEADER_SEPARATOR;
use crate::schedule::rooms::match_context_rooms;
use crate::schedule::rooms::KnownRooms;
use std::collections::BTreeMap;

/// Answers slot requests by reading cell outlines
#[derive(Clone, Debug, Default)]
pub struct LocalOracle {
    parser: OutlineParser,
}

impl LocalOracle {
    pub fn new(chairs: &[String]) -> Self {
        Self { parser: OutlineParser::new(chairs) }
    }

    /// Supplementary breakdown of a primary session: the first timed line of a supplementary
    /// cell must contain the session name and carry the same duration
    fn breakdown(&self, session: &OutlineSession, text: &str) -> Option<Vec<OutlineSession>> {
        let head = parse_items(text).into_iter().find(|item| item.duration.is_some())?;
        let name = session.name.to_lowercase();
        if name.is_empty() || head.duration != Some(session.duration) || !head.name.to_lowercase().contains(&name) {
            return None;
        }
        let leaves = self.parser.parse(text);
        let total: u32 = leaves.iter().map(|leaf| leaf.duration).sum();
        if leaves.is_empty() || total > session.duration {
            return None;
        }
        Some(
            leaves
                .into_iter()
                .map(|mut leaf| {
                    if leaf.chair.is_none() {
                        leaf.chair = session.chair.clone();
                    }
                    if !session.group_header.is_empty() {
                        leaf.group_header = session.group_header.clone();
                    }
                    if leaf.agenda_item.is_none() {
                        leaf.agenda_item = session.agenda_item.clone();
                    }
                    leaf
                })
                .collect(),
        )
    }
}

fn proposal(room_alias: &str, session: OutlineSession) -> ProposedSession {
    ProposedSession {
        room_alias: room_alias.to_owned(),
        name: session.name,
        duration_minutes: i64::from(session.duration),
        chair: session.chair,
        group_header: session.group_header,
        agenda_item: session.agenda_item,
    }
}

/// First segment of a nested label, or the shortest other label it starts with as a word
fn simplify_label(label: &str, labels: &[String]) -> String {
    let segment = label.split(HEADER_SEPARATOR).next().unwrap_or(label).trim();
    labels
        .iter()
        .map(|other| other.trim())
        .filter(|other| !other.is_empty())
        .filter(|other| segment == *other || segment.starts_with(&format!("{} ", other)))
        .min_by_key(|other| other.chars().count())
        .unwrap_or(segment)
        .to_owned()
}

impl TextOracle for LocalOracle {
    fn name(&self) -> &'static str {
        "local"
    }

    fn slot_sessions(&self, request: &SlotRequest) -> Result<Vec<ProposedSession>, OracleError> {
        let mut used = vec![false; request.supplementary.len()];
        let mut proposals = Vec::new();
        for entry in &request.primary {
            for session in self.parser.parse(&entry.text) {
                let found = request
                    .supplementary
                    .iter()
                    .enumerate()
                    .filter(|(index, _)| !used[*index])
                    .find_map(|(index, detail)| self.breakdown(&session, &detail.text).map(|leaves| (index, leaves)));
                match found {
                    Some((index, leaves)) => {
                        used[index] = true;
                        proposals.extend(leaves.into_iter().map(|leaf| proposal(&entry.room, leaf)));
                    }
                    None => proposals.push(proposal(&entry.room, session)),
                }
            }
        }
        Ok(proposals)
    }

    fn category_mapping(&self, labels: &[String]) -> Result<BTreeMap<String, String>, OracleError> {
        Ok(labels
            .iter()
            .map(|label| (label.clone(), simplify_label(label, labels)))
            .collect())
    }

    fn timezone(&self, _location: &str) -> Result<String, OracleError> {
        Err(OracleError::Unsupported("timezone", self.name()))
    }

    fn context_rooms(&self, request: &ContextRoomsRequest) -> Result<Vec<String>, OracleError> {
        let known = KnownRooms { online: request.online.clone(), offline: request.offline.clone() };
        Ok(match_context_rooms(&request.context, &known, request.needed).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::PrimaryEntry;
    use crate::oracle::SupplementaryEntry;
    use crate::schedule::Day;

    fn oracle() -> LocalOracle {
        LocalOracle::new(&["Xiaodong".to_owned(), "Sorour".to_owned(), "Hiroki".to_owned()])
    }

    fn request(primary: &[(&str, &str)], supplementary: &[&str]) -> SlotRequest {
        SlotRequest {
            day: Day::Monday,
            block_start: "08:30".to_owned(),
            block_end: "10:30".to_owned(),
            block_duration: 120,
            rooms: Vec::new(),
            primary: primary
                .iter()
                .map(|(room, text)| PrimaryEntry { room: room.to_string(), text: text.to_string() })
                .collect(),
            supplementary: supplementary
                .iter()
                .map(|text| SupplementaryEntry {
                    source: "Sorour's schedule".to_owned(),
                    room: "Brk#1".to_owned(),
                    text: text.to_string(),
                })
                .collect(),
        }
    }

    fn names(proposals: &[ProposedSession]) -> Vec<(&str, &str, i64)> {
        proposals
            .iter()
            .map(|p| (p.room_alias.as_str(), p.name.as_str(), p.duration_minutes))
            .collect()
    }

    #[test]
    fn coarse_entries_take_the_supplementary_breakdown() {
        let request = request(
            &[("online room 1", "AI/ML (120)"), ("offline room 1", "Hiroki (120)\nR20\nA-IoT (120)")],
            &["AI 9.1 R20 AI/ML (120)\n.AI 9.1.1 (60)\n.AI 9.1.2 (60)"],
        );
        let proposals = oracle().slot_sessions(&request).unwrap();
        assert_eq!(
            names(&proposals),
            vec![
                ("online room 1", "AI 9.1.1", 60),
                ("online room 1", "AI 9.1.2", 60),
                ("offline room 1", "A-IoT", 120),
            ]
        );
        assert_eq!(proposals[0].agenda_item.as_deref(), Some("9.1.1"));
        assert_eq!(proposals[2].chair.as_deref(), Some("Hiroki"));
    }

    #[test]
    fn single_line_details_enrich_the_name() {
        let request = request(
            &[("online room 1", "R20 (80)\nNTN-NR (40)\nNTN-IoT (40)")],
            &["AI 9.6 R20 NTN-NR (40)"],
        );
        let proposals = oracle().slot_sessions(&request).unwrap();
        assert_eq!(names(&proposals), vec![("online room 1", "R20 NTN-NR", 40), ("online room 1", "NTN-IoT", 40)]);
        assert_eq!(proposals[0].agenda_item.as_deref(), Some("9.6"));
        assert_eq!(proposals[0].group_header, "R20");
    }

    #[test]
    fn mismatched_durations_are_ignored() {
        let request = request(&[("primary room", "AI/ML (120)")], &["AI 9.1 R20 AI/ML (90)\n.AI 9.1.1 (90)"]);
        let proposals = oracle().slot_sessions(&request).unwrap();
        assert_eq!(names(&proposals), vec![("primary room", "AI/ML", 120)]);
    }

    #[test]
    fn labels_collapse_to_their_family() {
        let labels = vec!["6GR".to_owned(), "6GR / Overall".to_owned(), "R20 MIMO".to_owned(), "R20".to_owned()];
        let mapping = oracle().category_mapping(&labels).unwrap();
        assert_eq!(mapping["6GR / Overall"], "6GR");
        assert_eq!(mapping["R20 MIMO"], "R20");
        assert_eq!(mapping["R20"], "R20");
        assert_eq!(mapping.len(), 4);
    }

    #[test]
    fn rooms_come_from_heading_codes() {
        let request = ContextRoomsRequest {
            context: "RAN1 online schedule (room: RAN1_Brk#2, A3, Level 1)".to_owned(),
            online: vec!["F1+F2+F3".to_owned(), "A1".to_owned(), "A3".to_owned()],
            offline: vec!["J1".to_owned()],
            needed: 1,
        };
        assert_eq!(oracle().context_rooms(&request).unwrap(), vec!["A3"]);
        assert!(matches!(oracle().timezone("Bengaluru, IN"), Err(OracleError::Unsupported(..))));
    }
}
