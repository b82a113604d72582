//! Reader for the schedule cell grammar.
//!
//! A cell lists one item per line. `(N)` gives a duration in minutes, leading dots nest an item
//! under the previous one and lines without a duration are context labels. An item whose
//! duration equals the sum of the items that follow it is a group header rather than a session;
//! the rule applies at every nesting level.
//!
//! ```text
//! Xiaodong (120)      header, chair (60 + 60)
//! 6GR                 label
//! Overall (60)        session
//! AI/ML (60)          session
//! ```
use regex::Regex;
use std::sync::OnceLock;

/// Lines mentioning these describe the schedule rather than name a session
const META_KEYWORDS: [&str; 4] = ["break", "resume", "commences", "expected to close"];

/// Separator of nested category labels
pub const HEADER_SEPARATOR: &str = " / ";

/// One line of a cell
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutlineItem {
    pub name: String,
    pub duration: Option<u32>,
    /// Number of leading dots
    pub depth: usize,
}

/// A leaf session read from a cell
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutlineSession {
    pub name: String,
    pub duration: u32,
    pub chair: Option<String>,
    pub group_header: String,
    pub agenda_item: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Node {
    Label(String),
    Leaf(OutlineItem),
    Header(OutlineItem, Vec<Node>),
}

#[derive(Copy, Clone)]
struct Level {
    /// Duration the level must add up to, `None` to consume the whole run
    target: Option<u32>,
    min_depth: usize,
    header_first: bool,
}

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(.*?)\s*\(\s*(\d+)\s*(?:min|mins|minutes)?\s*\)\s*$").expect("duration pattern")
    })
}

fn agenda_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(?:AI\s+)?\.?\s*(\d+\.\d[\d.xX]*)\s*(.*)$").expect("agenda pattern"))
}

fn agenda_header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"AI\s+(\d[\d.]*)").expect("agenda header pattern"))
}

fn person_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z][a-z]+$").expect("person pattern"))
}

fn is_meta(line: &str) -> bool {
    let lower = line.to_lowercase();
    META_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Splits cell text into items
pub fn parse_items(text: &str) -> Vec<OutlineItem> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let depth = line.chars().take_while(|c| *c == '.').count();
            let line = line[depth..].trim();
            match duration_pattern().captures(line) {
                Some(captures) => OutlineItem {
                    name: captures[1].trim().to_owned(),
                    duration: captures[2].parse().ok(),
                    depth,
                },
                None => OutlineItem { name: line.to_owned(), duration: None, depth },
            }
        })
        .filter(|item| !item.name.is_empty() || item.duration.is_some())
        .collect()
}

/// Splits a leading agenda identifier off a session name.
/// `"AI 9.1.1 R20 AI/ML"` gives `("R20 AI/ML", Some("9.1.1"))`.
pub fn extract_agenda(name: &str, group_header: &str) -> (String, Option<String>) {
    if let Some(captures) = agenda_pattern().captures(name.trim()) {
        let agenda = captures[1].trim_matches('.').to_owned();
        let rest = captures[2].trim();
        let name = if rest.is_empty() { name.trim().to_owned() } else { rest.to_owned() };
        return (name, Some(agenda));
    }
    let from_header = agenda_header_pattern()
        .captures(group_header)
        .map(|captures| captures[1].trim_matches('.').to_owned())
        .filter(|agenda| !agenda.is_empty());
    (name.trim().to_owned(), from_header)
}

/// Every agenda identifier in `raw`, in order and without repeats, joined with `", "`
pub fn normalize_agenda_items(raw: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"\d+\.\d[\d.xX]*").expect("agenda list pattern"));
    let mut items: Vec<&str> = Vec::new();
    for found in pattern.find_iter(raw) {
        let item = found.as_str().trim_matches('.');
        if !items.contains(&item) {
            items.push(item);
        }
    }
    (!items.is_empty()).then(|| items.join(", "))
}

/// Best-effort title of a cell: up to three meaningful top-level lines
pub fn fallback_name(text: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('.'))
        .collect();
    let meaningful: Vec<&str> = lines.iter().copied().filter(|line| !is_meta(line)).take(3).collect();
    if !meaningful.is_empty() {
        meaningful.join(HEADER_SEPARATOR)
    } else if let Some(first) = lines.first() {
        first.to_string()
    } else {
        text.trim().chars().take(60).collect()
    }
}

/// Cell reader with the list of known chair names
#[derive(Clone, Debug, Default)]
pub struct OutlineParser {
    chairs: Vec<String>,
}

impl OutlineParser {
    pub fn new(chairs: &[String]) -> Self {
        Self { chairs: chairs.to_vec() }
    }

    fn is_known_chair(&self, name: &str) -> bool {
        self.chairs.iter().any(|chair| chair.eq_ignore_ascii_case(name.trim()))
    }

    fn looks_like_chair(&self, name: &str) -> bool {
        self.is_known_chair(name) || person_pattern().is_match(name.trim())
    }

    /// A same-depth header needs two sessions under it, a known chair name or a leading label
    fn may_head(&self, item: &OutlineItem, children: &[Node]) -> bool {
        let timed = children.iter().filter(|node| !matches!(node, Node::Label(_))).count();
        timed >= 2 || self.is_known_chair(&item.name) || matches!(children.first(), Some(Node::Label(_)))
    }

    /// Leaf sessions of a cell, empty when no line carries a duration
    pub fn parse(&self, text: &str) -> Vec<OutlineSession> {
        let items = parse_items(text);
        if items.iter().all(|item| item.duration.is_none()) {
            return Vec::new();
        }
        let top = Level { target: None, min_depth: 0, header_first: true };
        let nodes = self
            .parse_from(&items, 0, 0, top)
            .map(|(nodes, _)| nodes)
            .unwrap_or_default();
        let mut sessions = Vec::new();
        self.flatten(&nodes, &[], None, true, &mut sessions);
        sessions
    }

    fn parse_from(&self, items: &[OutlineItem], index: usize, sum: u32, level: Level) -> Option<(Vec<Node>, usize)> {
        if let Some(target) = level.target {
            if sum == target && sum > 0 {
                return Some((Vec::new(), index));
            }
            if sum > target {
                return None;
            }
        }
        let item = match items.get(index) {
            Some(item) if item.depth >= level.min_depth => item,
            _ => return level.target.is_none().then(|| (Vec::new(), index)),
        };
        let prepend = |node: Node, (mut rest, end): (Vec<Node>, usize)| {
            rest.insert(0, node);
            (rest, end)
        };

        let Some(duration) = item.duration else {
            return self
                .parse_from(items, index + 1, sum, level)
                .map(|rest| prepend(Node::Label(item.name.clone()), rest));
        };

        // dotted items below this one are its children whatever their sum
        if items.get(index + 1).is_some_and(|next| next.depth > item.depth) {
            let nested = Level { target: None, min_depth: item.depth + 1, header_first: false };
            let (children, end) = self.parse_from(items, index + 1, 0, nested)?;
            return self
                .parse_from(items, end, sum + duration, level)
                .map(|rest| prepend(Node::Header(item.clone(), children), rest));
        }

        let as_header = || {
            if duration == 0 {
                return None;
            }
            let inner = Level { target: Some(duration), min_depth: item.depth, header_first: false };
            let (children, end) = self.parse_from(items, index + 1, 0, inner)?;
            if !self.may_head(item, &children) {
                return None;
            }
            self.parse_from(items, end, sum + duration, level)
                .map(|rest| prepend(Node::Header(item.clone(), children), rest))
        };
        let as_leaf = || {
            self.parse_from(items, index + 1, sum + duration, level)
                .map(|rest| prepend(Node::Leaf(item.clone()), rest))
        };

        if level.header_first {
            as_header().or_else(as_leaf)
        } else {
            as_leaf().or_else(as_header)
        }
    }

    fn flatten(&self, nodes: &[Node], path: &[String], chair: Option<&str>, top: bool, out: &mut Vec<OutlineSession>) {
        let mut labels: Vec<String> = Vec::new();
        let mut after_label = false;
        for node in nodes {
            match node {
                Node::Label(label) => {
                    if !after_label {
                        labels.clear();
                    }
                    after_label = true;
                    if !is_meta(label) {
                        labels.push(label.clone());
                    }
                }
                Node::Leaf(item) => {
                    after_label = false;
                    let headers: Vec<String> = path.iter().chain(labels.iter()).cloned().collect();
                    let group_header = headers.join(HEADER_SEPARATOR);
                    let (name, agenda_item) = extract_agenda(&item.name, &group_header);
                    out.push(OutlineSession {
                        name,
                        duration: item.duration.unwrap_or_default(),
                        chair: chair.map(str::to_owned),
                        group_header,
                        agenda_item,
                    });
                }
                Node::Header(item, children) => {
                    after_label = false;
                    let mut inner: Vec<String> = path.iter().chain(labels.iter()).cloned().collect();
                    let mut inner_chair = chair;
                    if top && chair.is_none() && self.looks_like_chair(&item.name) {
                        inner_chair = Some(item.name.as_str());
                    } else {
                        inner.push(item.name.clone());
                    }
                    self.flatten(children, &inner, inner_chair, false, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> OutlineParser {
        OutlineParser::new(&["Xiaodong".to_owned(), "Sorour".to_owned(), "Hiroki".to_owned()])
    }

    fn summary(sessions: &[OutlineSession]) -> Vec<(&str, u32, Option<&str>, &str)> {
        sessions
            .iter()
            .map(|s| (s.name.as_str(), s.duration, s.chair.as_deref(), s.group_header.as_str()))
            .collect()
    }

    #[test]
    fn items_carry_depth_and_duration() {
        let items = parse_items("Xiaodong(120)\n6GR\n.10.6.x (60)\n\n..deep (5 min)");
        assert_eq!(items[0], OutlineItem { name: "Xiaodong".into(), duration: Some(120), depth: 0 });
        assert_eq!(items[1], OutlineItem { name: "6GR".into(), duration: None, depth: 0 });
        assert_eq!(items[2], OutlineItem { name: "10.6.x".into(), duration: Some(60), depth: 1 });
        assert_eq!(items[3], OutlineItem { name: "deep".into(), duration: Some(5), depth: 2 });
    }

    #[test]
    fn chair_header_with_category() {
        let sessions = parser().parse("Xiaodong (120)\n6GR\nOverall (60)\nAI/ML (60)");
        assert_eq!(
            summary(&sessions),
            vec![
                ("Overall", 60, Some("Xiaodong"), "6GR"),
                ("AI/ML", 60, Some("Xiaodong"), "6GR"),
            ]
        );
        assert_eq!(sessions.iter().map(|s| s.duration).sum::<u32>(), 120);
    }

    #[test]
    fn unknown_person_name_is_still_chair() {
        let sessions = OutlineParser::default().parse("Xiaodong (120)\n6GR\nOverall (60)\nAI/ML (60)");
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].chair.as_deref(), Some("Xiaodong"));
    }

    #[test]
    fn category_header_without_chair() {
        let sessions = parser().parse("6GR (150)\nWaveform(50)\nModulation(50)\nEnergy(50)");
        assert_eq!(
            summary(&sessions),
            vec![
                ("Waveform", 50, None, "6GR"),
                ("Modulation", 50, None, "6GR"),
                ("Energy", 50, None, "6GR"),
            ]
        );
    }

    #[test]
    fn consecutive_chair_blocks() {
        let sessions = parser().parse("Hiroki(40)\nR20 ISAC(40)\nSorour(80)\nR20 MIMO(40)\nR20 NR-NTN(40)");
        assert_eq!(
            summary(&sessions),
            vec![
                ("R20 ISAC", 40, Some("Hiroki"), ""),
                ("R20 MIMO", 40, Some("Sorour"), ""),
                ("R20 NR-NTN", 40, Some("Sorour"), ""),
            ]
        );
    }

    #[test]
    fn nested_headers_at_every_level() {
        let sessions = parser().parse("R20 (80)\nNTN-NR (40)\nNTN-IoT (40)\n6GR (40)\n.10.7.1 NTN (40)");
        assert_eq!(
            summary(&sessions),
            vec![
                ("NTN-NR", 40, None, "R20"),
                ("NTN-IoT", 40, None, "R20"),
                ("NTN", 40, None, "6GR"),
            ]
        );
        assert_eq!(sessions[2].agenda_item.as_deref(), Some("10.7.1"));

        let sessions = parser().parse("Xiaodong(120)\n6GR\nOverall(40)\n.TR skeleton(40)\nEvaluation(80)");
        assert_eq!(
            summary(&sessions),
            vec![
                ("TR skeleton", 40, Some("Xiaodong"), "6GR / Overall"),
                ("Evaluation", 80, Some("Xiaodong"), "6GR"),
            ]
        );
    }

    #[test]
    fn equal_neighbours_stay_leaves() {
        let sessions = parser().parse("R20 MIMO (40)\nR20 NR-NTN (40)");
        assert_eq!(summary(&sessions), vec![("R20 MIMO", 40, None, ""), ("R20 NR-NTN", 40, None, "")]);
        assert_eq!(summary(&parser().parse("R20 A-IoT (150)")), vec![("R20 A-IoT", 150, None, "")]);
        assert!(parser().parse("Plenary continues\nsee notes").is_empty());
    }

    #[test]
    fn agenda_identifiers() {
        assert_eq!(extract_agenda("AI 9.1.1 R20 AI/ML", ""), ("R20 AI/ML".to_owned(), Some("9.1.1".to_owned())));
        assert_eq!(extract_agenda(".10.5.4.1", ""), (".10.5.4.1".to_owned(), Some("10.5.4.1".to_owned())));
        assert_eq!(extract_agenda("Overall", "AI 9.6 R20"), ("Overall".to_owned(), Some("9.6".to_owned())));
        assert_eq!(extract_agenda("Overall", "6GR"), ("Overall".to_owned(), None));
        assert_eq!(normalize_agenda_items("AI 9.1.1, 9.1.2; 9.1.1 and 10.x"), Some("9.1.1, 9.1.2".to_owned()));
        assert_eq!(normalize_agenda_items("10.6.x."), Some("10.6.x".to_owned()));
        assert_eq!(normalize_agenda_items("none"), None);
    }

    #[test]
    fn fallback_names() {
        assert_eq!(
            fallback_name("Plenary\nsession commences at 09:00\n.details\nRAN1 wrap-up\nLS review\nextra"),
            "Plenary / RAN1 wrap-up / LS review"
        );
        assert_eq!(fallback_name("Coffee break"), "Coffee break");
    }
}
