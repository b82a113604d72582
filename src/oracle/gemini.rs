//! Hosted text service speaking the Generative Language `generateContent` protocol.
use crate::config::Config;
use crate::oracle::ContextRoomsRequest;
use crate::oracle::OracleError;
use crate::oracle::ProposedSession;
use crate::oracle::SlotRequest;
use crate::oracle::TextOracle;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;
use tracing::debug;
use tracing::info;

const SLOT_TIMEOUT: Duration = Duration::from_secs(120);
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(30);
const SLOT_TEMPERATURE: f32 = 0.1;
const LOOKUP_TEMPERATURE: f32 = 0.0;

const SLOT_INSTRUCTION: &str = r#"You produce the session list of one time slot of a 3GPP RAN1 meeting.

Several schedule tables describe the same time slot. The main schedule is authoritative for
which topic takes place in which target room. Vice-chair schedules only add detail such as
agenda item numbers and sub-session breakdowns; their room labels are unreliable, so match
their entries to target rooms by topic keyword and duration, never by label.

Cell syntax:
- "(N)" after a name is a duration of N minutes.
- A line whose duration equals the sum of the following lines is a group header, not a session.
- Lines starting with "." are sub-items of the preceding item.
- Lines without a duration before sessions are category labels.
- A person name used as a group header is the chair of the sessions under it.

Rules:
- Prefer the most specific name: "AI 9.1.1" over "AI/ML", "AI 9.6 R20 NTN-NR" over "NTN-NR".
- A coarse main schedule entry is replaced by the matching vice-chair breakdown.
- Only emit sessions for rooms the main schedule fills.
- The leaf durations of a room never exceed the time slot duration.
- Use exactly the aliases of the target room legend in room_alias.
- Emit one flat list grouped by room, chronological within each room.
- A session held in every room at once (a plenary, an opening or closing) is emitted once,
  with the combined alias such as "all online rooms" or "all rooms" as room_alias. Never
  repeat it for each single room.
- group_header joins nested category labels with " / ", empty when there is none.
- agenda_item holds every dotted agenda number the session covers, in order and joined with
  ", " such as "9.1.1, 9.1.2". Keep all of them. Use null when there is none."#;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlotAnswer {
    #[serde(default)]
    sessions: Vec<ProposedSession>,
}

#[derive(Debug, Deserialize)]
struct MappingPair {
    original: String,
    simplified: String,
}

#[derive(Debug, Deserialize)]
struct CategoryAnswer {
    #[serde(default)]
    mapping: Vec<MappingPair>,
}

#[derive(Debug, Deserialize)]
struct TimezoneAnswer {
    #[serde(default)]
    timezone: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    country: String,
}

#[derive(Debug, Deserialize)]
struct RoomAnswer {
    #[serde(default)]
    room_names: Vec<String>,
    #[serde(default)]
    reasoning: String,
}

fn slot_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "sessions": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "room_alias": {"type": "STRING"},
                        "name": {"type": "STRING"},
                        "duration_minutes": {"type": "INTEGER"},
                        "chair": {"type": "STRING", "nullable": true},
                        "group_header": {"type": "STRING"},
                        "agenda_item": {"type": "STRING", "nullable": true}
                    },
                    "required": ["room_alias", "name", "duration_minutes", "group_header"]
                }
            }
        },
        "required": ["sessions"]
    })
}

fn category_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "mapping": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "original": {"type": "STRING"},
                        "simplified": {"type": "STRING"}
                    },
                    "required": ["original", "simplified"]
                }
            }
        },
        "required": ["mapping"]
    })
}

fn timezone_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "timezone": {"type": "STRING"},
            "city": {"type": "STRING"},
            "country": {"type": "STRING"}
        },
        "required": ["timezone"]
    })
}

fn room_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "room_names": {"type": "ARRAY", "items": {"type": "STRING"}},
            "reasoning": {"type": "STRING"}
        },
        "required": ["room_names"]
    })
}

/// User prompt of a time slot: target room legend, main schedule cells, then vice-chair cells
pub(crate) fn slot_prompt(request: &SlotRequest, chairs: &[String]) -> String {
    let mut prompt = format!(
        "Day: {}, Time slot: {}-{} ({} min)\n",
        request.day, request.block_start, request.block_end, request.block_duration
    );
    if !chairs.is_empty() {
        prompt.push_str(&format!("Known chairs: {}\n", chairs.join(", ")));
    }

    prompt.push_str("\n## Target rooms (alias: rooms)\n");
    for entry in &request.rooms {
        prompt.push_str(&format!("{}: {}\n", entry.alias, entry.rooms));
    }

    prompt.push_str("\n## Main schedule (defines what goes in each room)\n");
    for entry in &request.primary {
        prompt.push_str(&format!("\n[{}]\n{}\n", entry.room, entry.text));
    }

    if !request.supplementary.is_empty() {
        prompt.push_str("\n## Vice-chair detail (match by content, ignore room labels)\n");
        for entry in &request.supplementary {
            prompt.push_str(&format!("\n[{}, {}]\n{}\n", entry.source, entry.room, entry.text));
        }
    }
    prompt
}

pub(crate) fn category_prompt(labels: &[String]) -> String {
    let mut prompt = String::from(
        "These category labels come from one 3GPP meeting schedule. Map every label to a short \
         canonical category so that the result has a small number of distinct categories.\n\
         - Labels of the same topic family map to the same category, e.g. \"6GR / Overall\" and \
         \"6GR\" both map to \"6GR\".\n\
         - Keep release prefixes such as \"R20\" or \"6GR\" when they identify the family.\n\
         - Return one pair for every label, using the label exactly as given in original.\n\nLabels:\n",
    );
    for label in labels {
        prompt.push_str(&format!("- {label}\n"));
    }
    prompt
}

pub(crate) fn timezone_prompt(location: &str) -> String {
    format!(
        "Given this 3GPP meeting location line, return the IANA timezone identifier of the city.\n\n\
         Location: \"{location}\""
    )
}

pub(crate) fn room_prompt(request: &ContextRoomsRequest) -> String {
    format!(
        "Given this heading of a 3GPP RAN1 meeting schedule table, decide which room(s) the table covers.\n\n\
         Heading:\n\"\"\"{}\"\"\"\n\n\
         Available rooms: {}\n\n\
         Return exactly {} room name(s) from the available rooms.\n\
         - Room codes in the heading match available names, \"F1/2/3\" matches \"F1+F2+F3\".\n\
         - \"Brk#N\" is the N-th break-out room.\n\
         - \"Main Session\" or an online schedule without room details is the combined main room.\n\
         - \"Offline Session Schedule\" refers to the offline rooms.\n\
         - Use names exactly as listed.\n\
         - When undecidable, return the first {} available rooms.",
        request.context,
        request.available().join(", "),
        request.needed,
        request.needed
    )
}

/// First text part of the first candidate
fn answer_text(response: GenerateResponse) -> Result<String, OracleError> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().find_map(|part| part.text))
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
        .ok_or(OracleError::EmptyAnswer)
}

fn parse_answer<T: DeserializeOwned>(text: &str) -> Result<T, OracleError> {
    serde_json::from_str(text).map_err(|e| OracleError::Malformed(e.to_string()))
}

/// Generative Language API client
#[derive(Debug, Clone)]
pub struct GeminiOracle {
    client: reqwest::blocking::Client,
    api_base: String,
    model: String,
    api_key: String,
    chairs: Vec<String>,
}

impl GeminiOracle {
    /// Creates a client with the API key read from `config.api_key_env`
    pub fn new(config: &Config) -> Result<Self, OracleError> {
        let api_key = env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| OracleError::MissingApiKey(config.api_key_env.clone()))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &Config, api_key: String) -> Result<Self, OracleError> {
        let client = reqwest::blocking::Client::builder().timeout(SLOT_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            api_key,
            chairs: config.chairs.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    fn generate<T: DeserializeOwned>(
        &self,
        system: Option<&str>,
        prompt: &str,
        temperature: f32,
        schema: Value,
        timeout: Duration,
    ) -> Result<T, OracleError> {
        let request = GenerateRequest {
            system_instruction: system.map(|text| Content { role: None, parts: vec![Part { text }] }),
            contents: vec![Content { role: Some("user"), parts: vec![Part { text: prompt }] }],
            generation_config: GenerationConfig {
                temperature,
                response_mime_type: "application/json",
                response_schema: schema,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .timeout(timeout)
            .json(&request)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(OracleError::Status(status.as_u16(), body));
        }

        let response: GenerateResponse =
            serde_json::from_str(&body).map_err(|e| OracleError::Malformed(e.to_string()))?;
        let text = answer_text(response)?;
        debug!(model = %self.model, bytes = text.len(), "answer received");
        parse_answer(&text)
    }
}

impl TextOracle for GeminiOracle {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn slot_sessions(&self, request: &SlotRequest) -> Result<Vec<ProposedSession>, OracleError> {
        let answer: SlotAnswer = self.generate(
            Some(SLOT_INSTRUCTION),
            &slot_prompt(request, &self.chairs),
            SLOT_TEMPERATURE,
            slot_schema(),
            SLOT_TIMEOUT,
        )?;
        Ok(answer.sessions)
    }

    fn category_mapping(&self, labels: &[String]) -> Result<BTreeMap<String, String>, OracleError> {
        let answer: CategoryAnswer = self.generate(
            None,
            &category_prompt(labels),
            LOOKUP_TEMPERATURE,
            category_schema(),
            SLOT_TIMEOUT,
        )?;
        Ok(answer
            .mapping
            .into_iter()
            .map(|pair| (pair.original, pair.simplified))
            .collect())
    }

    fn timezone(&self, location: &str) -> Result<String, OracleError> {
        let answer: TimezoneAnswer = self.generate(
            None,
            &timezone_prompt(location),
            LOOKUP_TEMPERATURE,
            timezone_schema(),
            LOOKUP_TIMEOUT,
        )?;
        if answer.timezone.trim().is_empty() {
            return Err(OracleError::EmptyAnswer);
        }
        info!(city = %answer.city, country = %answer.country, timezone = %answer.timezone, "meeting location resolved");
        Ok(answer.timezone.trim().to_owned())
    }

    fn context_rooms(&self, request: &ContextRoomsRequest) -> Result<Vec<String>, OracleError> {
        let answer: RoomAnswer = self.generate(
            None,
            &room_prompt(request),
            LOOKUP_TEMPERATURE,
            room_schema(),
            LOOKUP_TIMEOUT,
        )?;
        if !answer.reasoning.is_empty() {
            debug!(reasoning = %answer.reasoning, "room detection");
        }
        Ok(answer.room_names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::PrimaryEntry;
    use crate::oracle::RoomLegendEntry;
    use crate::oracle::SupplementaryEntry;
    use crate::schedule::Day;

    fn request() -> SlotRequest {
        SlotRequest {
            day: Day::Monday,
            block_start: "08:30".to_owned(),
            block_end: "10:30".to_owned(),
            block_duration: 120,
            rooms: vec![RoomLegendEntry { alias: "primary room".to_owned(), rooms: "F1+F2+F3".to_owned() }],
            primary: vec![PrimaryEntry { room: "primary room".to_owned(), text: "AI/ML (120)".to_owned() }],
            supplementary: vec![SupplementaryEntry {
                source: "Sorour's schedule".to_owned(),
                room: "Brk#1".to_owned(),
                text: "AI 9.1 R20 AI/ML (120)\n.AI 9.1.1 (60)\n.AI 9.1.2 (60)".to_owned(),
            }],
        }
    }

    #[test]
    fn slot_prompt_lists_every_source() {
        let prompt = slot_prompt(&request(), &["Xiaodong".to_owned()]);
        assert!(prompt.starts_with("Day: Monday, Time slot: 08:30-10:30 (120 min)"));
        assert!(prompt.contains("Known chairs: Xiaodong"));
        assert!(prompt.contains("primary room: F1+F2+F3"));
        assert!(prompt.contains("[primary room]\nAI/ML (120)"));
        assert!(prompt.contains("[Sorour's schedule, Brk#1]\nAI 9.1 R20 AI/ML (120)"));
        assert!(prompt.contains("\n## Target rooms (alias: rooms)\nprimary room: F1+F2+F3\n\n## Main schedule"));
        assert!(prompt.ends_with(".AI 9.1.1 (60)\n.AI 9.1.2 (60)\n"));
    }

    #[test]
    fn category_prompt_lists_one_label_per_line() {
        let prompt = category_prompt(&["6GR / Overall".to_owned(), "R20 NTN".to_owned()]);
        assert!(prompt.ends_with("Labels:\n- 6GR / Overall\n- R20 NTN\n"));
    }

    #[test]
    fn slot_instruction_covers_merge_rules() {
        assert!(SLOT_INSTRUCTION.contains("is emitted once"));
        assert!(SLOT_INSTRUCTION.contains("\"all online rooms\""));
        assert!(SLOT_INSTRUCTION.contains("every dotted agenda number"));
        assert!(SLOT_INSTRUCTION.contains("\"9.1.1, 9.1.2\""));
    }

    #[test]
    fn answer_text_takes_first_candidate_part() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": " {\"sessions\": []} "}], "role": "model"}}]
        }))
        .unwrap();
        assert_eq!(answer_text(response).unwrap(), "{\"sessions\": []}");
        assert!(matches!(answer_text(GenerateResponse::default()), Err(OracleError::EmptyAnswer)));
    }

    #[test]
    fn slot_answers_parse_into_proposals() {
        let answer: SlotAnswer = parse_answer(
            r#"{"sessions": [{"room_alias": "primary room", "name": "AI 9.1.1", "duration_minutes": 60,
                "chair": null, "group_header": "R20 AI/ML", "agenda_item": "9.1.1"}]}"#,
        )
        .unwrap();
        assert_eq!(answer.sessions.len(), 1);
        assert_eq!(answer.sessions[0].agenda_item.as_deref(), Some("9.1.1"));
        assert!(matches!(parse_answer::<SlotAnswer>("not json"), Err(OracleError::Malformed(_))));
    }

    #[test]
    fn missing_api_key_is_reported() {
        let config = Config { api_key_env: "MEETING_GRID_TEST_UNSET_KEY".to_owned(), ..Config::default() };
        match GeminiOracle::new(&config) {
            Err(OracleError::MissingApiKey(name)) => assert_eq!(name, "MEETING_GRID_TEST_UNSET_KEY"),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn request_body_uses_camel_case() {
        let body = serde_json::to_value(GenerateRequest {
            system_instruction: Some(Content { role: None, parts: vec![Part { text: "sys" }] }),
            contents: vec![Content { role: Some("user"), parts: vec![Part { text: "hi" }] }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                response_mime_type: "application/json",
                response_schema: timezone_schema(),
            },
        })
        .unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert!(body["systemInstruction"].get("role").is_none());
    }
}
